//! Custom Resource Definitions consumed by the route controller

mod route;

pub use route::{Route, RouteSpec, RouteTargetReference, TlsConfig, TlsTermination};
