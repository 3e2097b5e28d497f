//! Single-writer token-bucket admission controller.
//!
//! A [`Controller`] owns one bucket table and processes every request for it on a
//! single task. Callers reach it through a [`ControllerHandle`], either directly or
//! by resolving an [`Address`] through a [`Directory`]. [`ControllerServer`]
//! exposes the same operations over HTTP.

pub mod address;
pub mod bootstrap;
pub mod cli;
pub mod controller;
pub mod handle;
pub mod registry;
pub mod server;

pub use address::{Address, DEFAULT_NAME};
pub use bootstrap::{ControllerOptions, StartError, start, start_with_clock};
pub use controller::{Controller, Request};
pub use handle::{ControllerError, ControllerHandle};
pub use registry::{CallError, Directory, NameTable, Registry, RegistryError, global_names};
pub use server::{ControllerServer, DEFAULT_PORT};
