//! Name registration and resolution.
//!
//! The controller itself never knows how it was found. A [`Directory`] maps an
//! [`Address`] onto one of three name scopes (local, custom registry, global) and
//! hands back a [`ControllerHandle`]; everything after that is plain message
//! passing.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use bucket_core::{BucketKey, ConfigUpdate, Decision};
use parking_lot::RwLock;
use thiserror::Error;

use crate::address::Address;
use crate::handle::{ControllerError, ControllerHandle};

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("name `{0}` is already registered")]
    AlreadyRegistered(String),
    #[error("no controller registered at `{0}`")]
    NotFound(String),
    #[error("unknown registry `{0}`")]
    UnknownRegistry(String),
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
}

/// Failure of an address-based call: either the address did not resolve or the
/// controller behind it refused the request.
#[derive(Debug, Error, PartialEq)]
pub enum CallError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// A name service that controllers can register with.
///
/// Implement this to plug in a custom registry and attach it to a directory with
/// [`Directory::add_registry`].
pub trait Registry: Send + Sync {
    fn register(&self, name: &str, handle: ControllerHandle) -> Result<(), RegistryError>;
    fn resolve(&self, name: &str) -> Option<ControllerHandle>;
    fn unregister(&self, name: &str) -> Option<ControllerHandle>;
}

/// In-memory registry. A name held by a controller that has stopped can be taken
/// over by a new registration.
#[derive(Default)]
pub struct NameTable {
    names: RwLock<HashMap<String, ControllerHandle>>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for NameTable {
    fn register(&self, name: &str, handle: ControllerHandle) -> Result<(), RegistryError> {
        let mut names = self.names.write();
        if let Some(existing) = names.get(name) {
            if !existing.is_closed() {
                return Err(RegistryError::AlreadyRegistered(name.to_string()));
            }
        }
        names.insert(name.to_string(), handle);
        Ok(())
    }

    fn resolve(&self, name: &str) -> Option<ControllerHandle> {
        self.names
            .read()
            .get(name)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    fn unregister(&self, name: &str) -> Option<ControllerHandle> {
        self.names.write().remove(name)
    }
}

/// The process-wide scope behind `global://` addresses.
pub fn global_names() -> &'static NameTable {
    static GLOBAL: OnceLock<NameTable> = OnceLock::new();
    GLOBAL.get_or_init(NameTable::new)
}

/// Resolves addresses for one node: its own local names, any custom registries
/// attached to it, and the shared global scope.
#[derive(Default)]
pub struct Directory {
    local: NameTable,
    registries: RwLock<HashMap<String, Arc<dyn Registry>>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `registry` reachable as `registry://<name>/...`.
    pub fn add_registry(&self, name: impl Into<String>, registry: Arc<dyn Registry>) {
        self.registries.write().insert(name.into(), registry);
    }

    fn with_scope<R>(
        &self,
        address: &Address,
        f: impl FnOnce(&dyn Registry, &str) -> R,
    ) -> Result<R, RegistryError> {
        match address {
            Address::Local(name) => Ok(f(&self.local, name.as_str())),
            Address::Global(name) => Ok(f(global_names(), name.as_str())),
            Address::Registry { registry, name } => {
                let scope = self
                    .registries
                    .read()
                    .get(registry)
                    .cloned()
                    .ok_or_else(|| RegistryError::UnknownRegistry(registry.clone()))?;
                Ok(f(scope.as_ref(), name.as_str()))
            }
        }
    }

    pub fn register(&self, address: &Address, handle: ControllerHandle) -> Result<(), RegistryError> {
        self.with_scope(address, |scope, name| scope.register(name, handle))?
    }

    pub fn resolve(&self, address: &Address) -> Result<ControllerHandle, RegistryError> {
        self.with_scope(address, |scope, name| scope.resolve(name))?
            .ok_or_else(|| RegistryError::NotFound(address.to_string()))
    }

    pub fn unregister(&self, address: &Address) -> Result<Option<ControllerHandle>, RegistryError> {
        self.with_scope(address, |scope, name| scope.unregister(name))
    }

    /// Resolves `address` and requests `cost` tokens from `key`.
    pub async fn acquire(
        &self,
        address: &Address,
        key: impl Into<BucketKey>,
        cost: f64,
    ) -> Result<Decision, CallError> {
        let handle = self.resolve(address)?;
        Ok(handle.acquire(key, cost).await?)
    }

    /// Resolves `address` and reports the tokens available for `key`.
    pub async fn inspect(
        &self,
        address: &Address,
        key: impl Into<BucketKey>,
    ) -> Result<f64, CallError> {
        let handle = self.resolve(address)?;
        Ok(handle.inspect(key).await?)
    }

    /// Resolves `address` and enqueues a bypass adjustment. Only resolution can fail.
    pub fn adjust_tokens(
        &self,
        address: &Address,
        key: impl Into<BucketKey>,
        amount: f64,
    ) -> Result<(), RegistryError> {
        self.resolve(address)?.adjust_tokens(key, amount);
        Ok(())
    }

    /// Resolves `address` and enqueues a configuration change. Only resolution can fail.
    pub fn update_configuration(
        &self,
        address: &Address,
        update: ConfigUpdate,
    ) -> Result<(), RegistryError> {
        self.resolve(address)?.update_configuration(update);
        Ok(())
    }
}
