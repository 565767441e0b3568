use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agency_client::{Client, Config, CsvRecordSource, SessionState};

#[tokio::main]
async fn main() -> Result<()> {
    // Config first: the log level comes from it
    let config = Config::load()?;

    let use_json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "text".to_string())
        .eq_ignore_ascii_case("json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.as_str().into());

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(
        action = "config",
        result = "success",
        agency_id = %config.agency_id,
        server_address = %config.server_address,
        batch_max_amount = config.batch_max_amount,
        batch_max_size = config.batch_max_size,
        log_level = %config.log_level,
        version = env!("CARGO_PKG_VERSION"),
        "Configuration loaded"
    );

    let cancel = CancellationToken::new();
    let client = Client::from_config(&config, cancel.clone())?;

    let data_path = config.data_path();
    let mut source = CsvRecordSource::open(&data_path)
        .with_context(|| format!("cannot open data file {}", data_path.display()))?;

    tokio::spawn(watch_signals(cancel));

    let report = match client.run(&mut source).await {
        Ok(report) => report,
        Err(e) => {
            error!(action = "session", result = "fail", error = %e, "Client finished with error");
            return Err(e.into());
        }
    };

    match report.state {
        SessionState::Done => info!(
            action = "winners_query",
            result = "success",
            winner_count = report.winner_count(),
            batches_sent = report.batches_sent,
            bets_sent = report.bets_sent,
            "Client finished"
        ),
        _ => warn!(
            action = "session",
            result = "aborted",
            reason = ?report.abort_reason,
            batches_sent = report.batches_sent,
            "Client stopped before receiving winners"
        ),
    }

    Ok(())
}

/// Cancel the session on SIGINT or SIGTERM.
async fn watch_signals(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!(action = "stop_sending", result = "in_progress", "Shutdown signal received");
    cancel.cancel();
}
