use anyhow::Result;
use netrepro::conf;
use netrepro::sampler::Sampler;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

const LOG_LEVEL: tracing::Level = tracing::Level::INFO;

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout carries only the report stream.
    tracing_subscriber::fmt()
        .with_max_level(LOG_LEVEL)
        .with_writer(std::io::stderr)
        .init();

    let conf = conf::read_conf().await?;
    let sampler = Sampler::new(conf)?;

    let (exit_tx, exit_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping after the current cycle");
            let _ = exit_tx.send(());
        }
    });

    sampler.run(exit_rx).await
}
