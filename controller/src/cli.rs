use bucket_core::Configuration;
use clap::Parser;

use crate::address::Address;
use crate::bootstrap::ControllerOptions;
use crate::server::DEFAULT_PORT;

#[derive(Parser, Debug)]
#[command(author, version, about = "Token-bucket admission controller", long_about = None)]
pub struct Args {
    /// Namespace of the bucket table owned by this controller
    #[arg(long, env = "BUCKET_NAMESPACE")]
    pub namespace: Option<String>,

    /// Capacity of every bucket
    #[arg(long, env = "BUCKET_MAX_ACCUMULATED")]
    pub max_accumulated: Option<f64>,

    /// Tokens added per refill interval
    #[arg(long, env = "BUCKET_REFILL")]
    pub refill: Option<f64>,

    /// Length of the refill interval in milliseconds (default 1000)
    #[arg(long, env = "BUCKET_INTERVAL_MS")]
    pub interval_ms: Option<f64>,

    /// Address to register under: local://name, global://name or registry://registry/name
    #[arg(long, default_value_t = Address::default())]
    pub address: Address,

    /// Port for the HTTP front-end
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Args {
    /// Turns the parsed flags into start options. Required fields are checked when
    /// the controller is started, not here.
    pub fn options(&self) -> ControllerOptions {
        let mut config = Configuration::builder();
        if let Some(namespace) = &self.namespace {
            config = config.namespace(namespace.clone());
        }
        if let Some(max) = self.max_accumulated {
            config = config.max_accumulated(max);
        }
        if let Some(refill) = self.refill {
            config = config.refill(refill);
        }
        if let Some(interval_ms) = self.interval_ms {
            config = config.interval_ms(interval_ms);
        }
        ControllerOptions {
            config,
            address: Some(self.address.clone()),
        }
    }
}
