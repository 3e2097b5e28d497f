use bucket_core::BucketKey;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Talk to a running token-bucket controller", long_about = None)]
pub struct Args {
    /// Base URL of the controller's HTTP front-end
    #[arg(short, long, env = "BUCKET_SERVER", default_value = "http://127.0.0.1:7400")]
    pub server: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Request tokens; exits with status 1 when denied
    Acquire {
        /// Bucket key: 42, name, :tag or (a, b)
        key: BucketKey,
        /// Tokens to consume
        #[arg(short, long, default_value_t = 1.0)]
        cost: f64,
    },
    /// Show the tokens available now
    Inspect { key: BucketKey },
    /// Add or remove tokens, ignoring the capacity
    Adjust {
        key: BucketKey,
        #[arg(allow_hyphen_values = true)]
        amount: f64,
    },
    /// Change the controller's configuration
    Configure {
        #[arg(long)]
        max_accumulated: Option<f64>,
        #[arg(long)]
        refill: Option<f64>,
        #[arg(long)]
        interval_ms: Option<f64>,
    },
}
