use std::thread::JoinHandle;

use anyhow::Context;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use whack_domain::Config;
use whack_infrastructure::dns::{Pipeline, ResponseCache, ServerReport, XdpServer};
use whack_infrastructure::xsk::XskSocket;

const THREAD_NAME: &str = "whack-xdp";

/// The packet I/O thread and a receiver that resolves when it finishes.
pub struct XdpThread {
    pub handle: JoinHandle<()>,
    pub done: oneshot::Receiver<anyhow::Result<ServerReport>>,
}

/// Opens the socket and runs the event loop on a dedicated, optionally
/// pinned, thread. Socket, cache and pipeline never leave that thread.
pub fn spawn_xdp_server(config: Config, shutdown: CancellationToken) -> anyhow::Result<XdpThread> {
    let (tx, done) = oneshot::channel();

    let handle = std::thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || {
            if let Some(core) = config.runtime.cpu_core {
                pin_to_core(core);
            }
            let result = run(&config, &shutdown);
            let _ = tx.send(result);
        })
        .context("Failed to spawn XDP thread")?;

    Ok(XdpThread { handle, done })
}

fn run(config: &Config, shutdown: &CancellationToken) -> anyhow::Result<ServerReport> {
    let socket = XskSocket::open(&config.xsk)
        .with_context(|| format!("Failed to open AF_XDP socket on {}", config.xsk.interface))?;
    let cache = ResponseCache::from_config(&config.cache);
    let pipeline = Pipeline::new(cache, &config.pipeline, config.xsk.batch_size);
    let mut server = XdpServer::new(
        socket,
        pipeline,
        &config.pipeline,
        config.cache.cleanup_interval,
    );
    Ok(server.run(shutdown))
}

fn pin_to_core(core: usize) {
    let available = core_affinity::get_core_ids().unwrap_or_default();
    match available.into_iter().find(|id| id.id == core) {
        Some(id) if core_affinity::set_for_current(id) => {
            info!(core, "XDP thread pinned");
        }
        _ => warn!(core, "Failed to pin XDP thread, running unpinned"),
    }
}
