//! iControl REST plumbing for BIG-IP LTM
//!
//! This module owns everything that talks to the appliance directly: the
//! JSON client, the wire payloads, the error taxonomy and the scp/ssh side
//! channel used to stage certificate material.

mod client;
pub mod error;
pub mod payloads;
pub mod transfer;

pub use client::ApplianceClient;
pub use error::ApplianceError;
pub use transfer::{FileTransfer, SshFileTransfer};

/// Partition used when none is configured
pub const DEFAULT_PARTITION_PATH: &str = "/Common";

/// Policy holding the Host/path rules of routes without TLS
pub const HTTP_POLICY_NAME: &str = "openshift_insecure_routes";

/// Policy holding the Host/path rules of edge and reencrypt routes
pub const HTTPS_POLICY_NAME: &str = "openshift_secure_routes";

pub const REENCRYPT_ROUTES_DATAGROUP_NAME: &str = "ssl_reencrypt_route_dg";
pub const REENCRYPT_HOSTS_DATAGROUP_NAME: &str = "ssl_reencrypt_servername_dg";
pub const PASSTHROUGH_ROUTES_DATAGROUP_NAME: &str = "ssl_passthrough_route_dg";
pub const PASSTHROUGH_HOSTS_DATAGROUP_NAME: &str = "ssl_passthrough_servername_dg";

/// iRule that dispatches TLS connections on the ClientHello server name
pub const SNI_IRULE_NAME: &str = "openshift_passthrough_irule";

/// Body of [`SNI_IRULE_NAME`]. Installed verbatim.
pub const SNI_IRULE_CODE: &str = include_str!("../../assets/sni_passthrough.tcl");

pub const VXLAN_PROFILE_NAME: &str = "vxlan-ose";
pub const VXLAN_TUNNEL_NAME: &str = "vxlan5000";
pub const VXLAN_PORT: u16 = 4789;
pub const LOCAL_TRAFFIC_GROUP: &str = "/Common/traffic-group-local-only";

/// Health monitor attached to every pool
pub const POOL_MONITOR: &str = "min 1 of /Common/http /Common/https";

/// Escape a full path for use as a single URI segment.
///
/// iControl REST addresses `/Common/foo` as `~Common~foo`.
pub fn encode_uri_path_component(name: &str) -> String {
    name.replace('/', "~")
}

/// Normalize a partition path into rooted form without a trailing slash.
///
/// `"OSPartA//ShardOne/"` becomes `"/OSPartA/ShardOne"` and an empty path
/// becomes `"/"`.
pub fn normalize_partition_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Join an object name onto a partition path.
pub fn join_partition(partition_path: &str, name: &str) -> String {
    format!("{}/{}", partition_path.trim_end_matches('/'), name)
}
