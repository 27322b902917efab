use std::sync::Arc;

use anyhow::Context;
use audiobot_core::convert::Converter;
use audiobot_pipeline::ToolExecutor;
use audiobot_worker::config::WorkerConfig;
use audiobot_worker::console::{ConsoleSession, ConsoleTransport};
use audiobot_worker::JobQueue;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "audiobot_worker=info,audiobot_pipeline=info,audiobot_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = WorkerConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        job_timeout_secs = config.queue.job_timeout.as_secs(),
        input_timeout_secs = config.queue.input_timeout.as_secs(),
        output_dir = %config.output_dir.display(),
        "Audio bot starting"
    );

    let transport = Arc::new(
        ConsoleTransport::new(&config.output_dir)
            .await
            .with_context(|| format!("can't create {}", config.output_dir.display()))?,
    );

    let shutdown = CancellationToken::new();
    let (queue, processor) = JobQueue::start(
        config.queue.clone(),
        ToolExecutor::new(config.tools.clone()),
        Converter::new(&config.ffmpeg),
        transport.clone(),
        transport.clone(),
        shutdown.clone(),
    );

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            ctrl_c.cancel();
        }
    });

    let session = ConsoleSession::new(queue, transport, config.defaults, shutdown.clone());
    let result = session.run().await;
    shutdown.cancel();

    processor.await.context("job queue task failed")?;
    tracing::info!("Audio bot stopped");
    result.context("can't read stdin")
}
