//! F5 Route Controller: programs Kubernetes Routes onto F5 BIG-IP LTM
//!
//! This crate watches Route, Endpoints and Node objects and converges them
//! onto an appliance through its iControl REST API, staging certificate
//! material over scp.

pub mod appliance;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;

pub use crate::config::RouterConfig;
pub use crate::error::{Error, Result};
