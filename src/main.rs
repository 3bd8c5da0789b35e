// ThermoLink - Serial JSON link tool for temperature controllers
use clap::Parser;
use thermolink::cli::{execute_command, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    execute_command(args).await?;
    Ok(())
}
