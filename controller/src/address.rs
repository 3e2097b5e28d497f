//! Names under which a controller can be reached.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::registry::RegistryError;

/// Name used when a controller is started without an explicit address.
pub const DEFAULT_NAME: &str = "token_bucket";

/// Where a controller is registered.
///
/// Text forms are `local://name`, `global://name` and `registry://registry/name`;
/// a bare name is local.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Address {
    /// Visible only through the [`Directory`](crate::registry::Directory) it was
    /// registered in.
    Local(String),
    /// Resolved through a named custom [`Registry`](crate::registry::Registry).
    Registry { registry: String, name: String },
    /// Visible from every directory in the process.
    Global(String),
}

impl Default for Address {
    fn default() -> Self {
        Address::Local(DEFAULT_NAME.to_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Local(name) => write!(f, "local://{}", name),
            Address::Registry { registry, name } => write!(f, "registry://{}/{}", registry, name),
            Address::Global(name) => write!(f, "global://{}", name),
        }
    }
}

impl FromStr for Address {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RegistryError::InvalidAddress(format!("{}: {}", s, reason));

        if !s.contains("://") {
            if s.is_empty() || s.contains('/') {
                return Err(invalid("not a valid name"));
            }
            return Ok(Address::Local(s.to_string()));
        }

        let url = Url::parse(s).map_err(|e| invalid(&e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing name"))?
            .to_string();
        let path = url.path().trim_start_matches('/');

        match url.scheme() {
            "local" | "global" if !path.is_empty() => Err(invalid("unexpected path")),
            "local" => Ok(Address::Local(host)),
            "global" => Ok(Address::Global(host)),
            "registry" if path.is_empty() => Err(invalid("missing name after registry")),
            "registry" => Ok(Address::Registry {
                registry: host,
                name: path.to_string(),
            }),
            other => Err(invalid(&format!("unknown scheme `{}`", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schemes() {
        assert_eq!(
            "local://api".parse::<Address>(),
            Ok(Address::Local("api".to_string()))
        );
        assert_eq!(
            "global://api".parse::<Address>(),
            Ok(Address::Global("api".to_string()))
        );
        assert_eq!(
            "registry://tenants/acme".parse::<Address>(),
            Ok(Address::Registry {
                registry: "tenants".to_string(),
                name: "acme".to_string()
            })
        );
        assert_eq!(
            "uploads".parse::<Address>(),
            Ok(Address::Local("uploads".to_string()))
        );
    }

    #[test]
    fn test_default_round_trips_through_text() {
        let address = Address::default();
        assert_eq!(address.to_string(), "local://token_bucket");
        assert_eq!(address.to_string().parse::<Address>(), Ok(address));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("http://api".parse::<Address>().is_err());
        assert!("registry://tenants".parse::<Address>().is_err());
        assert!("local://api/extra".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }
}
