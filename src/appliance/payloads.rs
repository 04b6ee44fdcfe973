//! Wire payloads of the iControl REST endpoints used by the controller

use serde::{Deserialize, Serialize};

/// Collection response (`{"items": [...]}`); an empty collection may omit
/// the field entirely.
#[derive(Deserialize, Debug, Clone)]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NamedItem {
    pub name: String,
}

impl NamedItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Policy reference as listed under `/ltm/virtual/{id}/policies`
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReference {
    pub full_path: String,
}

// ── folders, policies and virtual servers ──────────────────────────────────

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tm_partition: Option<String>,
    pub controls: Vec<String>,
    pub requires: Vec<String>,
    pub strategy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy: Option<bool>,
}

#[derive(Serialize, Debug, Clone)]
pub struct VirtualServerPolicyPayload {
    pub name: String,
    pub partition: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VirtualServerRules {
    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct VirtualServerProfilePayload {
    pub name: String,
    pub context: ProfileContext,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProfileContext {
    Clientside,
    Serverside,
}

// ── datagroups and iRules ──────────────────────────────────────────────────

#[derive(Serialize, Debug, Clone)]
pub struct DatagroupPayload {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DatagroupRecord {
    pub name: String,
    #[serde(default)]
    pub data: String,
}

/// Body of `GET /ltm/data-group/internal/{name}` and of the PATCH that
/// replaces its records
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DatagroupRecords {
    #[serde(default)]
    pub records: Vec<DatagroupRecord>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IRulePayload {
    pub name: String,
    pub partition: String,
    pub api_anonymous: String,
}

// ── pools ──────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PoolPayload {
    pub load_balancing_mode: String,
    pub monitor: String,
    pub partition: String,
    pub name: String,
}

// ── policy rules ───────────────────────────────────────────────────────────

/// Match condition of a policy rule.
///
/// Index 0 matches the Host header, indexes from 1 match URI path segments.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleConditionPayload {
    pub name: String,
    pub case_insensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_host: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_uri: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_segment: Option<bool>,
    pub index: usize,
    pub equals: bool,
    pub request: bool,
    pub values: Vec<String>,
}

impl RuleConditionPayload {
    pub fn host_equals(host: &str) -> Self {
        Self {
            name: "0".to_string(),
            case_insensitive: true,
            http_host: Some(true),
            host: Some(true),
            http_uri: None,
            path_segment: None,
            index: 0,
            equals: true,
            request: true,
            values: vec![host.to_string()],
        }
    }

    pub fn path_segment_equals(index: usize, segment: &str) -> Self {
        Self {
            name: index.to_string(),
            case_insensitive: true,
            http_host: None,
            host: None,
            http_uri: Some(true),
            path_segment: Some(true),
            index,
            equals: true,
            request: true,
            values: vec![segment.to_string()],
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RuleActionPayload {
    pub name: String,
    pub forward: bool,
    pub pool: String,
    pub request: bool,
    pub select: bool,
    pub vlan: u32,
}

impl RuleActionPayload {
    pub fn forward_to(pool_path: &str) -> Self {
        Self {
            name: "0".to_string(),
            forward: true,
            pool: pool_path.to_string(),
            request: true,
            select: true,
            vlan: 0,
        }
    }
}

// ── certificates and SSL profiles ──────────────────────────────────────────

#[derive(Serialize, Debug, Clone)]
pub struct InstallCommandPayload {
    pub command: String,
    pub name: String,
    #[serde(rename = "from-local-file")]
    pub from_local_file: String,
}

impl InstallCommandPayload {
    pub fn install(name: &str, local_file: &str) -> Self {
        Self {
            command: "install".to_string(),
            name: name.to_string(),
            from_local_file: local_file.to_string(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClientSslProfilePayload {
    pub cert: String,
    pub key: String,
    pub name: String,
    pub server_name: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServerSslProfilePayload {
    pub chain: String,
    pub name: String,
    pub server_name: String,
}

// ── VXLAN overlay ──────────────────────────────────────────────────────────

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VxlanProfilePayload {
    pub name: String,
    pub partition: String,
    pub flooding_type: String,
    pub port: u16,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TunnelPayload {
    pub name: String,
    pub partition: String,
    pub key: u32,
    pub local_address: String,
    pub mode: String,
    pub mtu: String,
    pub profile: String,
    pub tos: String,
    pub transparent: String,
    pub use_pmtu: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SelfIpPayload {
    pub name: String,
    pub partition: String,
    pub address: String,
    pub address_source: String,
    pub floating: String,
    pub inherited_traffic_group: String,
    pub traffic_group: String,
    pub unit: u32,
    pub vlan: String,
    pub allow_service: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct FdbRecordPayload {
    pub name: String,
    pub endpoint: String,
}
