use clap::Parser;
use tracing::info;

use ftsim_sim::Config;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ftsim=info,ftsim_engine=info,ftsim_sim=info".into()),
        )
        .init();

    let config = Config::parse();
    let report = ftsim_sim::run(&config)?;

    info!(
        sender = ?report.sender.state,
        receiver = ?report.receiver.state,
        latency_secs = ?report.receiver.latency_secs,
        intact = report.intact,
        "Run finished at {:.6}s",
        report.finished_at_secs
    );

    if let Some(path) = &config.report {
        report.write_json(path)?;
        info!("Report written to {}", path.display());
    }
    Ok(())
}
