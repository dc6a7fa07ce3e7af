use anyhow::{Context, Result};
use huectl::config::{load_config, HueConfig};
use huectl::session::Session;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

const CONFIG_ENV: &str = "HUECTL_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huectl=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("huectl starting...");

    let config = match std::env::args().nth(1).or_else(|| std::env::var(CONFIG_ENV).ok()) {
        Some(path) => {
            info!(path = %path, "Loading configuration");
            load_config(&path).with_context(|| format!("Failed to load {}", path))?
        }
        None => HueConfig::from_env(),
    };
    config.validate().context("Invalid configuration")?;

    let session = Session::connect(config).await?;
    session.start();

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout.write_all(b"> ").await?;
    stdout.flush().await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if matches!(line, "quit" | "exit") {
                    break;
                }
                if !line.is_empty() {
                    let response = session.handle_line(line).await;
                    stdout.write_all(response.message.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                }
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    session.shutdown();
    info!("huectl stopped");
    Ok(())
}
