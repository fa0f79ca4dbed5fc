#[macro_use]
extern crate tracing;

pub mod admission;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod context;
pub mod driver;
pub mod errors;
pub mod io_models;
pub mod keys;
pub mod kv_store;
pub mod label;
pub mod locks;
pub mod mcis;
pub mod models;
pub mod namespace;
pub mod resource;
pub mod utilities;

pub use errors::OrchestratorError;
