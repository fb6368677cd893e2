use ranging_sampler::api::{self, ApiState};
use ranging_sampler::config;
use ranging_sampler::error::AppError;
use ranging_sampler::report::{ConsoleSink, StateSink};
use ranging_sampler::sensor::vl53l1x::Vl53l1xFactory;
use ranging_sampler::session::{RangingSession, SessionSummary};
use ranging_sampler::state::AppState;
use ranging_sampler::trigger::{ChannelTrigger, spawn_reader_forwarder};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, mpsc};

fn init_tracing(level: tracing::Level) {
    // Reports go to stdout, so keep logs on stderr.
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// The session logs its own failure before returning it, so main only maps it to a code.
fn exit_status(outcome: &Result<SessionSummary, AppError>) -> u8 {
    match outcome {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let config = config::load_from_path(&config_path)?;
    init_tracing(config.log_level()?);
    let settings = config.session_settings()?;
    tracing::info!(
        config_path = %config_path,
        app = %config.app.name,
        device = %settings.handle,
        "ranging-sampler starting"
    );

    let state = Arc::new(RwLock::new(AppState::new()));
    let stop = Arc::new(AtomicBool::new(false));
    let (trigger_tx, trigger_rx) = mpsc::channel();
    let _stdin_forwarder = spawn_reader_forwarder(std::io::stdin(), trigger_tx.clone());

    if config.server_enabled() {
        let app = api::router(ApiState {
            app: Arc::clone(&state),
            trigger: trigger_tx.clone(),
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port()));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "API server listening");
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error = %err, "API server stopped");
            }
        });
    }
    // Only the forwarder and the API hold senders from here on.
    drop(trigger_tx);

    let factory = Vl53l1xFactory::new(config.io_voltage());
    let session_state = Arc::clone(&state);
    let session_stop = Arc::clone(&stop);
    let mut session_task = tokio::task::spawn_blocking(move || {
        let mut trigger = ChannelTrigger::new(trigger_rx, Arc::clone(&session_stop));
        let mut sink = (
            ConsoleSink::stdout(),
            StateSink::new(Arc::clone(&session_state)),
        );
        RangingSession::new(factory, settings, session_state, session_stop)
            .run(&mut trigger, &mut sink)
    });

    let finished = tokio::select! {
        joined = &mut session_task => Some(joined),
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("Shutdown requested"),
                Err(err) => tracing::warn!(error = %err, "Failed to listen for Ctrl-C, stopping"),
            }
            None
        }
    };
    let outcome = match finished {
        Some(joined) => joined,
        None => {
            stop.store(true, Ordering::Relaxed);
            session_task.await
        }
    };

    let outcome = outcome?;
    if let Ok(summary) = &outcome {
        tracing::info!(
            reports = summary.reports_emitted,
            failed_calls = summary.ledger.failed_calls(),
            "ranging-sampler exiting"
        );
    }
    Ok(ExitCode::from(exit_status(&outcome)))
}
