mod cli;
mod remote;

use std::process::ExitCode;

use bucket_core::{ConfigUpdate, Decision};
use clap::Parser;
use cli::{Args, Command};
use remote::RemoteController;
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let remote = RemoteController::new(&args.server);

    match args.command {
        Command::Acquire { key, cost } => match remote.acquire(&key, cost)? {
            Decision::Allow(tokens) => println!("allowed, {} tokens left", tokens),
            Decision::Deny => {
                println!("denied");
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Inspect { key } => {
            println!("{}", remote.inspect(&key)?);
        }
        Command::Adjust { key, amount } => {
            remote.adjust_tokens(&key, amount)?;
            println!("adjustment sent");
        }
        Command::Configure {
            max_accumulated,
            refill,
            interval_ms,
        } => {
            let update = ConfigUpdate {
                max_accumulated,
                refill,
                interval_ms,
            };
            if update.is_empty() {
                return Err("nothing to configure".into());
            }
            remote.update_configuration(&update)?;
            println!("configuration sent");
        }
    }

    Ok(ExitCode::SUCCESS)
}
