use clap::Parser;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use whack_domain::config::Framing;
use whack_domain::CliOverrides;
use whack_infrastructure::dns::ServerReport;

mod bootstrap;
mod server;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "whack")]
#[command(version)]
#[command(about = "whack - AF_XDP zero-copy DNS cache-and-echo packet processor")]
struct Cli {
    /// Network interface to bind (e.g. eth0)
    #[arg(short = 'i', long)]
    interface: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Response cache slots
    #[arg(long)]
    cache_size: Option<usize>,

    /// Default cache TTL in seconds
    #[arg(long)]
    cache_ttl: Option<u32>,

    /// Transmits per second, 0 for unlimited
    #[arg(short = 'l', long)]
    rate_limit: Option<u32>,

    /// CPU core to pin the packet I/O thread to
    #[arg(short = 'p', long)]
    cpu_core: Option<usize>,

    /// RX descriptors processed per batch
    #[arg(long)]
    batch_size: Option<u32>,

    /// Frame encapsulation (udp, raw)
    #[arg(long)]
    framing: Option<Framing>,

    /// Bind in copy mode only
    #[arg(long)]
    no_zero_copy: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        interface: cli.interface,
        batch_size: cli.batch_size,
        no_zero_copy: cli.no_zero_copy,
        cache_size: cli.cache_size,
        cache_ttl: cli.cache_ttl,
        rate_limit: cli.rate_limit,
        framing: cli.framing,
        cpu_core: cli.cpu_core,
        log_level: cli.log_level,
    };

    let config = bootstrap::load_config(cli.config.as_deref(), cli_overrides)?;
    bootstrap::init_logging(&config.logging);

    info!("Starting whack v{}", env!("CARGO_PKG_VERSION"));
    info!(
        interface = %config.xsk.interface,
        queue_id = config.xsk.queue_id,
        num_frames = config.xsk.num_frames,
        frame_size = config.xsk.frame_size,
        cache_entries = config.cache.max_entries,
        framing = %config.pipeline.framing,
        rate_limit = config.pipeline.rate_limit,
        "Configuration loaded"
    );

    bootstrap::raise_memlock_limit();

    let shutdown = CancellationToken::new();
    let mut xdp = server::spawn_xdp_server(config, shutdown.clone())?;

    let outcome = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown requested");
            shutdown.cancel();
            (&mut xdp.done).await
        }
        result = &mut xdp.done => result,
    };

    if xdp.handle.join().is_err() {
        error!("XDP thread panicked");
    }

    match outcome {
        Ok(Ok(report)) => {
            log_report(&report);
            info!("Shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "XDP server failed");
            Err(e)
        }
        Err(_) => anyhow::bail!("XDP thread exited without a report"),
    }
}

fn log_report(report: &ServerReport) {
    info!(
        hits = report.cache.hits,
        misses = report.cache.misses,
        hit_ratio = %format!("{:.2}%", report.cache.hit_percent()),
        "Cache statistics"
    );
    info!(
        frames = report.pipeline.frames,
        replayed = report.pipeline.replayed,
        echoed = report.pipeline.echoed,
        dropped = report.pipeline.dropped(),
        rx_packets = report.socket.rx_packets,
        tx_packets = report.socket.tx_packets,
        tx_completions = report.socket.tx_completions,
        tx_invalid_completions = report.socket.tx_invalid_completions,
        wakeups = report.socket.wakeups,
        iterations = report.iterations,
        "Pipeline statistics"
    );
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
