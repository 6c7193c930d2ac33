pub mod bootstrap;
pub mod config;
pub mod controller;
pub mod crd;
pub mod decision;
pub mod directory;
pub mod error;
pub mod memory;
pub mod namespace;
pub mod policy;
pub mod store;
pub mod trigger;
pub mod types;

pub use error::{PromoterError, Result};
