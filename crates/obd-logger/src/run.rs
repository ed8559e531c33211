//! `obd-logger run`: stream, display and record

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use obd_protocol::{MockAdapter, ObdError, ResponseObserver};
use obd_session::AdapterSession;
use storage::SessionRecorder;
use tracing::{error, info, warn};

use crate::config::{AppConfig, AUTO_DEVICE, MOCK_DEVICE};
use crate::ports;
use crate::status::LiveStatus;

/// Emulator response time, close to a real adapter on a CAN bus
const MOCK_LATENCY_MS: u64 = 20;

/// Run a logging session until interrupted or the adapter fails
pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let session_config = config.session_config().context("Invalid command schedule")?;
    let mut recorder = SessionRecorder::from_config(&config.recording)
        .with_context(|| format!("Failed to open {}", config.recording.path.display()))?;

    let mut session = match config.adapter.device.as_str() {
        MOCK_DEVICE => {
            info!("Using built-in ELM327 emulator");
            let adapter = MockAdapter::new().with_latency(Duration::from_millis(MOCK_LATENCY_MS));
            AdapterSession::spawn(adapter, session_config)?
        }
        device => {
            let device = if device == AUTO_DEVICE {
                ports::discover()?
            } else {
                device.to_string()
            };
            AdapterSession::open(&device, config.adapter.baud_rate, session_config)
                .with_context(|| format!("Failed to open adapter on {}", device))?
        }
    };

    let mut status = LiveStatus::new();
    consume(
        &mut session,
        &mut recorder,
        &mut status,
        config.status_interval(),
        shutdown_signal(),
    )
    .await;

    if let Err(e) = recorder.close() {
        error!("Failed to close recording: {}", e);
    }
    let outcome = session.shutdown().await;
    status.report();
    info!(
        "Session finished: {} responses, {} frames skipped, {} records written",
        status.received(),
        status.skipped(),
        recorder.records_written()
    );

    outcome.context("Adapter session failed")
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Interrupted, stopping session"),
        _ = terminate => info!("Terminated, stopping session"),
    }
}

async fn consume(
    session: &mut AdapterSession,
    recorder: &mut SessionRecorder<impl std::io::Write>,
    status: &mut LiveStatus,
    report_every: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let responses = session.responses();
    futures::pin_mut!(responses);
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(report_every);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                status.report();
            }
            item = responses.next() => match item {
                Some(Ok(response)) => {
                    metrics::counter!("obd_responses_total").increment(1);
                    let dropped = recorder.records_dropped();
                    recorder.on_response(&response);
                    metrics::counter!("obd_records_dropped_total")
                        .increment(recorder.records_dropped() - dropped);
                    status.on_response(&response);
                }
                Some(Err(ObdError::Decode(e))) => {
                    metrics::counter!("obd_decode_errors_total").increment(1);
                    status.on_decode_error(&e);
                }
                Some(Err(e)) => {
                    error!("Adapter session failed: {}", e);
                    break;
                }
                None => {
                    info!("Adapter stream ended");
                    break;
                }
            },
        }
    }
}
