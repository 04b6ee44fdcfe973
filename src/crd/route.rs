//! Route Custom Resource Definition
//!
//! A Route exposes a service under a host name and optional path prefix,
//! with an optional TLS policy. Only the fields the appliance programming
//! needs are modelled; unknown fields are ignored on deserialization.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    namespaced,
    printcolumn = r#"{"name":"Host","type":"string","jsonPath":".spec.host"}"#,
    printcolumn = r#"{"name":"Path","type":"string","jsonPath":".spec.path"}"#,
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.to.name"}"#,
    printcolumn = r#"{"name":"Termination","type":"string","jsonPath":".spec.tls.termination"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Host name the route answers for
    #[serde(default)]
    pub host: String,

    /// Path prefix; empty or absent matches every path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Backend service
    pub to: RouteTargetReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    #[serde(default = "default_target_kind")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

fn default_target_kind() -> String {
    "Service".to_string()
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TlsTermination {
    /// TLS ends at the appliance, traffic to the pool is plain HTTP
    Edge,
    /// TLS is forwarded untouched to the pool, selected by SNI
    Passthrough,
    /// TLS ends at the appliance and is re-established to the pool
    Reencrypt,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    pub termination: Option<TlsTermination>,

    /// PEM certificate presented to clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    /// PEM private key of `certificate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,

    /// PEM CA used to verify the pool members of a reencrypt route
    #[serde(
        default,
        rename = "destinationCACertificate",
        skip_serializing_if = "Option::is_none"
    )]
    pub destination_ca_certificate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_edge_termination_policy: Option<String>,
}

impl RouteSpec {
    /// Termination policy, `None` for plain HTTP routes
    pub fn termination(&self) -> Option<TlsTermination> {
        self.tls.as_ref().and_then(|tls| tls.termination)
    }
}
