use anyhow::Result;
use clap::Parser;
use federation_controller::{run, telemetry, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(args.log_format)?;
    telemetry::init_metrics(args.metrics_addr)?;

    if let Err(error) = run(args).await {
        tracing::error!("federation controller failed: {error:#}");
        return Err(error);
    }
    Ok(())
}
