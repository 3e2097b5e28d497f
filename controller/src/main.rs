use clap::Parser;
use controller::cli::Args;
use controller::{ControllerServer, Directory, start};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let directory = Directory::new();
    let handle = match start(args.options(), &directory) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "controller failed to start");
            return Err(e.into());
        }
    };

    let server = ControllerServer::new(handle.clone(), args.port);
    let runner = server.clone();
    let mut serving = tokio::spawn(async move { runner.start().await });

    tokio::select! {
        result = &mut serving => {
            handle.shutdown();
            result??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown requested");
            server.stop();
            serving.await??;
            handle.shutdown();
        }
    }

    Ok(())
}

/// Logs to stderr, filtered by `RUST_LOG` (default `info`).
fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
