use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use whack_domain::config::PipelineConfig;
use whack_domain::{CacheStats, XskError};

use super::cache::Clock;
use super::pipeline::{Pipeline, PipelineStats};
use crate::xsk::{XskSocket, XskStats};

/// Final counters handed back when the event loop stops.
#[derive(Debug, Clone, Copy)]
pub struct ServerReport {
    pub cache: CacheStats,
    pub pipeline: PipelineStats,
    pub socket: XskStats,
    pub iterations: u64,
}

/// Single-threaded event loop: poll, process a batch, reap completions.
///
/// Owns the socket and the pipeline; nothing here is shared across threads
/// except the cancellation token.
pub struct XdpServer<C: Clock> {
    socket: XskSocket,
    pipeline: Pipeline<C>,
    poll_timeout_ms: i32,
    cleanup_interval: Duration,
    stats_interval: Duration,
}

impl<C: Clock> XdpServer<C> {
    pub fn new(
        socket: XskSocket,
        pipeline: Pipeline<C>,
        config: &PipelineConfig,
        cleanup_interval_secs: u64,
    ) -> Self {
        Self {
            socket,
            pipeline,
            poll_timeout_ms: config.poll_timeout_ms,
            cleanup_interval: Duration::from_secs(cleanup_interval_secs.max(1)),
            stats_interval: Duration::from_secs(config.stats_interval.max(1)),
        }
    }

    /// Runs until `shutdown` is cancelled or the socket fails, then drains
    /// and closes the socket.
    pub fn run(&mut self, shutdown: &CancellationToken) -> ServerReport {
        info!(
            interface = %self.socket.interface(),
            queue_id = self.socket.queue_id(),
            framing = %self.pipeline.framing(),
            zero_copy = self.socket.zero_copy(),
            "XDP event loop started"
        );

        let mut iterations = 0u64;
        let mut last_cleanup = Instant::now();
        let mut last_stats = Instant::now();
        let mut reported_pipeline = PipelineStats::default();
        let mut reported_socket = XskStats::default();

        while !shutdown.is_cancelled() {
            iterations += 1;

            match self.socket.poll(self.poll_timeout_ms) {
                Ok(true) => {
                    self.pipeline.process_batch(&mut self.socket);
                }
                Ok(false) => {}
                Err(XskError::Closed) => {
                    warn!("Socket closed underneath the event loop");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Poll failed, stopping event loop");
                    break;
                }
            }
            self.socket.complete_tx();
            self.socket.refill();

            if last_cleanup.elapsed() >= self.cleanup_interval {
                self.pipeline.cache_mut().cleanup();
                last_cleanup = Instant::now();
            }

            if last_stats.elapsed() >= self.stats_interval {
                let pipeline = self.pipeline.stats();
                let socket = self.socket.stats();
                report_interval(
                    &pipeline.since(&reported_pipeline),
                    &socket.since(&reported_socket),
                    &self.pipeline.cache().stats(),
                );
                reported_pipeline = pipeline;
                reported_socket = socket;
                last_stats = Instant::now();
            }
        }

        info!(iterations, "XDP event loop stopping");
        self.socket.close();
        self.report(iterations)
    }

    pub fn report(&self, iterations: u64) -> ServerReport {
        ServerReport {
            cache: self.pipeline.cache().stats(),
            pipeline: self.pipeline.stats(),
            socket: self.socket.stats(),
            iterations,
        }
    }

    pub fn socket(&self) -> &XskSocket {
        &self.socket
    }

    pub fn pipeline(&self) -> &Pipeline<C> {
        &self.pipeline
    }
}

fn report_interval(pipeline: &PipelineStats, socket: &XskStats, cache: &CacheStats) {
    let dropped = pipeline.dropped();
    if dropped > 0 || socket.rx_invalid > 0 || socket.tx_invalid_completions > 0 {
        info!(
            frames = pipeline.frames,
            replayed = pipeline.replayed,
            echoed = pipeline.echoed,
            dropped,
            not_udp = pipeline.not_udp,
            parse_failures = pipeline.parse_failures,
            upstream_errors = pipeline.upstream_errors,
            rate_limited = pipeline.rate_limited,
            tx_ring_full = pipeline.tx_ring_full,
            rx_invalid = socket.rx_invalid,
            tx_invalid_completions = socket.tx_invalid_completions,
            "Pipeline interval with drops"
        );
    } else {
        debug!(
            frames = pipeline.frames,
            replayed = pipeline.replayed,
            echoed = pipeline.echoed,
            rx_bytes = socket.rx_bytes,
            tx_bytes = socket.tx_bytes,
            hit_percent = cache.hit_percent(),
            "Pipeline interval"
        );
    }
}
