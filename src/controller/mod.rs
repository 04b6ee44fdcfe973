//! Controller module for programming routes onto the appliance
//!
//! `Ltm` wraps one appliance and exposes the pool, policy rule, SNI,
//! certificate, VTEP and bootstrap operations. `RouterPlugin` maps object
//! events onto those operations and `run_controller` feeds it from the
//! cluster.

mod bootstrap;
pub mod cache;
mod certs;
mod ltm;
#[cfg(test)]
mod mock_appliance;
mod plugin;
mod policy;
mod pool;
mod sni;
mod vtep;
mod watch;

pub use bootstrap::partition_ancestors;
pub use cache::{ApplianceStateCache, SniKind, SniRoute, SniRouteTable};
pub use certs::CertNames;
pub use ltm::{Ltm, VxlanSettings};
pub use plugin::{endpoint_members, node_internal_ip, route_name, EventType, RouterPlugin};
pub use policy::rule_conditions;
pub use pool::pool_name;
pub use sni::datagroup_records;
pub use vtep::vtep_mac;
pub use watch::{run_controller, EventTracker};
