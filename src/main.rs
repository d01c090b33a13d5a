use alpha_watch::{RunReport, WatchConfig, WatchError, Watcher};
use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use std::env;

async fn scan() -> Result<RunReport, WatchError> {
    let config = WatchConfig::from_env()?;
    let watcher = Watcher::from_config(&config)?;
    Ok(watcher.run().await)
}

async fn handler(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let request_id = event.context.request_id.clone();
    match serde_json::from_value::<CloudWatchEvent>(event.payload) {
        Ok(schedule) => tracing::info!(
            %request_id,
            rule = ?schedule.resources,
            detail_type = ?schedule.detail_type,
            "scheduled invocation"
        ),
        Err(_) => tracing::info!(%request_id, "manual invocation"),
    }

    let report = scan().await.map_err(|e| {
        tracing::error!(error = %e, "scan could not start");
        e
    })?;

    Ok(json!({ "status": "ok", "report": report }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        return lambda_runtime::run(service_fn(handler)).await;
    }

    // Outside Lambda: one scan, then exit.
    match scan().await {
        Ok(report) => {
            tracing::info!(?report, "done");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "scan could not start");
            Err(e.into())
        }
    }
}
