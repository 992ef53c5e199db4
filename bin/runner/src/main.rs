use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weft_runner::{RunnerConfig, run_workflow};
use weft_workflow::RunState;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Optional config file as the only argument
    let file = std::env::args_os().nth(1).map(std::path::PathBuf::from);
    let config = match RunnerConfig::load(file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling after the current node");
            on_signal.cancel();
        }
    });

    let report = match run_workflow(&config, cancel).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "run could not start");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize report"),
    }

    if report.state == RunState::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
