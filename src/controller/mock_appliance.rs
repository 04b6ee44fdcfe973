//! Stateful in-process stand-in for a BIG-IP, served through wiremock
//!
//! Implements just enough of iControl REST for the controller: 404 for
//! missing objects, 409 for duplicates, and 400 when an object is created
//! with references to objects that do not exist or deleted while still in
//! use.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::appliance::FileTransfer;
use crate::config::RouterConfig;
use crate::error::{Error, Result};

use super::{Ltm, RouterPlugin};

pub const HTTP_VSERVER: &str = "ose-vserver";
pub const HTTPS_VSERVER: &str = "https-ose-vserver";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MockRule {
    pub conditions: Vec<Value>,
    pub actions: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MockPolicy {
    pub body: Value,
    pub rules: BTreeMap<String, MockRule>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MockVserver {
    pub policies: BTreeSet<String>,
    pub rules: Vec<String>,
    /// Profile name to context
    pub profiles: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MockState {
    pub folders: BTreeSet<String>,
    pub policies: BTreeMap<String, MockPolicy>,
    pub vservers: BTreeMap<String, MockVserver>,
    /// Datagroup name to records
    pub datagroups: BTreeMap<String, BTreeMap<String, String>>,
    pub irules: BTreeMap<String, String>,
    pub pools: BTreeMap<String, BTreeSet<String>>,
    /// Installed certificates, as `<name>.crt`
    pub certs: BTreeSet<String>,
    /// Installed keys, as `<name>.key`
    pub keys: BTreeSet<String>,
    /// Client profile name to (cert, key)
    pub client_profiles: BTreeMap<String, (String, String)>,
    /// Server profile name to chain
    pub server_profiles: BTreeMap<String, String>,
    pub vxlan_profiles: BTreeMap<String, Value>,
    pub tunnels: BTreeMap<String, Value>,
    pub self_ips: BTreeMap<String, Value>,
    /// Tunnel path to MAC to endpoint
    pub fdb: BTreeMap<String, BTreeMap<String, String>>,
}

impl MockState {
    /// Fresh appliance with `/Common` and both virtual servers in
    /// `partition`.
    pub fn new(partition: &str) -> Self {
        let mut state = MockState::default();
        state.folders.insert("/Common".to_string());
        for vserver in [HTTP_VSERVER, HTTPS_VSERVER] {
            state
                .vservers
                .insert(format!("{}/{}", partition, vserver), MockVserver::default());
        }
        state
    }

    /// Rule of the policy named `policy`, in whichever partition it lives
    pub fn rule(&self, policy: &str, rule: &str) -> Option<&MockRule> {
        let suffix = format!("/{}", policy);
        self.policies
            .iter()
            .find(|(path, _)| path.ends_with(&suffix))
            .and_then(|(_, p)| p.rules.get(rule))
    }

    pub fn datagroup(&self, name: &str) -> BTreeMap<String, String> {
        self.datagroups.get(name).cloned().unwrap_or_default()
    }

    pub fn https_vserver(&self) -> &MockVserver {
        &self.vservers[&format!("/Common/{}", HTTPS_VSERVER)]
    }
}

struct Failure {
    method: String,
    fragment: String,
    status: u16,
}

/// Shared handle on the mock; clones see the same state.
#[derive(Clone)]
pub struct MockAppliance {
    state: Arc<Mutex<MockState>>,
    writes: Arc<AtomicUsize>,
    failures: Arc<Mutex<Vec<Failure>>>,
}

fn error(status: u16, message: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "code": status,
        "errorStack": [],
        "message": message.into()
    }))
}

fn ok(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

/// `~OSPartA~pool` and `pool` (in `/Common`) to a full path
fn full_path(id: &str) -> String {
    let path = id.replace('~', "/");
    if path.starts_with('/') {
        path
    } else {
        format!("/Common/{}", path)
    }
}

fn str_field(body: &Value, field: &str) -> String {
    body.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn partition_name(body: &Value) -> String {
    let partition = body
        .get("partition")
        .or_else(|| body.get("tmPartition"))
        .and_then(Value::as_str)
        .unwrap_or("/Common");
    let name = str_field(body, "name");
    if name.starts_with('/') {
        name
    } else {
        format!("{}/{}", partition.trim_end_matches('/'), name)
    }
}

fn names(items: impl IntoIterator<Item = String>) -> Value {
    Value::Array(items.into_iter().map(|n| json!({ "name": n })).collect())
}

impl MockAppliance {
    pub fn new(state: MockState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            writes: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn state(&self) -> MockState {
        self.state.lock().unwrap().clone()
    }

    /// Number of non-GET requests received so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Answer the next `method` request whose path contains `fragment`
    /// with `status`.
    pub fn fail_next(&self, method: &str, fragment: &str, status: u16) {
        self.failures.lock().unwrap().push(Failure {
            method: method.to_string(),
            fragment: fragment.to_string(),
            status,
        });
    }

    fn take_failure(&self, method: &str, path: &str) -> Option<u16> {
        let mut failures = self.failures.lock().unwrap();
        let index = failures
            .iter()
            .position(|f| f.method == method && path.contains(&f.fragment))?;
        Some(failures.remove(index).status)
    }

    fn handle(&self, method: &str, segments: &[&str], body: &Value) -> ResponseTemplate {
        let mut guard = self.state.lock().unwrap();
        let s = &mut *guard;

        match (method, segments) {
            // ── folders ────────────────────────────────────────────────────
            ("GET", ["sys", "folder", id]) => match s.folders.contains(&full_path(id)) {
                true => ok(json!({})),
                false => error(404, format!("folder {} not found", id)),
            },
            ("POST", ["sys", "folder"]) => {
                let name = str_field(body, "name");
                let parent = name.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
                if s.folders.contains(&name) {
                    error(409, format!("folder {} exists", name))
                } else if !parent.is_empty() && !s.folders.contains(parent) {
                    error(400, format!("parent of {} does not exist", name))
                } else {
                    s.folders.insert(name);
                    ok(json!({}))
                }
            }

            // ── policies and rules ─────────────────────────────────────────
            ("GET", ["ltm", "policy", id]) => match s.policies.contains_key(&full_path(id)) {
                true => ok(json!({})),
                false => error(404, format!("The requested Policy ({}) was not found.", id)),
            },
            ("POST", ["ltm", "policy"]) => {
                let name = partition_name(body);
                if s.policies.contains_key(&name) {
                    return error(409, format!("policy {} exists", name));
                }
                s.policies.insert(
                    name,
                    MockPolicy {
                        body: body.clone(),
                        rules: BTreeMap::new(),
                    },
                );
                ok(json!({}))
            }
            ("GET", ["ltm", "policy", id, "rules"]) => match s.policies.get(&full_path(id)) {
                Some(policy) => ok(json!({ "items": names(policy.rules.keys().cloned()) })),
                None => error(404, format!("policy {} not found", id)),
            },
            ("POST", ["ltm", "policy", id, "rules"]) => match s.policies.get_mut(&full_path(id)) {
                Some(policy) => {
                    let rule = str_field(body, "name");
                    if policy.rules.contains_key(&rule) {
                        return error(409, format!("rule {} exists", rule));
                    }
                    policy.rules.insert(rule, MockRule::default());
                    ok(json!({}))
                }
                None => error(404, format!("policy {} not found", id)),
            },
            ("DELETE", ["ltm", "policy", id, "rules", rule]) => {
                match s
                    .policies
                    .get_mut(&full_path(id))
                    .and_then(|p| p.rules.remove(*rule))
                {
                    Some(_) => ok(json!({})),
                    None => error(404, format!("rule {} not found", rule)),
                }
            }
            ("POST", ["ltm", "policy", id, "rules", rule, part @ ("conditions" | "actions")]) => {
                if *part == "actions" {
                    let pool = str_field(body, "pool");
                    if !s.pools.contains_key(&pool) {
                        return error(400, format!("pool {} does not exist", pool));
                    }
                }
                match s
                    .policies
                    .get_mut(&full_path(id))
                    .and_then(|p| p.rules.get_mut(*rule))
                {
                    Some(r) => {
                        let entries = if *part == "conditions" {
                            &mut r.conditions
                        } else {
                            &mut r.actions
                        };
                        if entries.iter().any(|e| e["name"] == body["name"]) {
                            return error(409, format!("{} {} exists", part, body["name"]));
                        }
                        entries.push(body.clone());
                        ok(json!({}))
                    }
                    None => error(404, format!("rule {} not found", rule)),
                }
            }

            // ── virtual servers ────────────────────────────────────────────
            ("GET", ["ltm", "virtual", id, "policies"]) => match s.vservers.get(&full_path(id)) {
                Some(v) => ok(json!({
                    "items": v.policies.iter().map(|p| json!({ "fullPath": p })).collect::<Vec<_>>()
                })),
                None => error(404, format!("virtual {} not found", id)),
            },
            ("POST", ["ltm", "virtual", id, "policies"]) => {
                let policy = str_field(body, "name");
                if !s.policies.contains_key(&policy) {
                    return error(400, format!("policy {} does not exist", policy));
                }
                match s.vservers.get_mut(&full_path(id)) {
                    Some(v) if v.policies.contains(&policy) => error(409, "already attached"),
                    Some(v) => {
                        v.policies.insert(policy);
                        ok(json!({}))
                    }
                    None => error(404, format!("virtual {} not found", id)),
                }
            }
            ("GET", ["ltm", "virtual", id]) => match s.vservers.get(&full_path(id)) {
                Some(v) if v.rules.is_empty() => ok(json!({ "name": id })),
                Some(v) => ok(json!({ "name": id, "rules": v.rules })),
                None => error(404, format!("virtual {} not found", id)),
            },
            ("PATCH", ["ltm", "virtual", id]) => {
                let rules: Vec<String> = body
                    .get("rules")
                    .and_then(|r| serde_json::from_value(r.clone()).ok())
                    .unwrap_or_default();
                if let Some(missing) = rules.iter().find(|r| !s.irules.contains_key(*r)) {
                    return error(400, format!("iRule {} does not exist", missing));
                }
                match s.vservers.get_mut(&full_path(id)) {
                    Some(v) => {
                        v.rules = rules;
                        ok(json!({}))
                    }
                    None => error(404, format!("virtual {} not found", id)),
                }
            }
            ("POST", ["ltm", "virtual", id, "profiles"]) => {
                let profile = str_field(body, "name");
                let context = str_field(body, "context");
                let known = match context.as_str() {
                    "clientside" => s.client_profiles.contains_key(&profile),
                    "serverside" => s.server_profiles.contains_key(&profile),
                    _ => false,
                };
                if !known {
                    return error(400, format!("profile {} does not exist", profile));
                }
                match s.vservers.get_mut(&full_path(id)) {
                    Some(v) if v.profiles.contains_key(&profile) => error(409, "already attached"),
                    Some(v) => {
                        v.profiles.insert(profile, context);
                        ok(json!({}))
                    }
                    None => error(404, format!("virtual {} not found", id)),
                }
            }
            ("DELETE", ["ltm", "virtual", id, "profiles", profile]) => {
                match s
                    .vservers
                    .get_mut(&full_path(id))
                    .and_then(|v| v.profiles.remove(*profile))
                {
                    Some(_) => ok(json!({})),
                    None => error(404, format!("profile {} not attached", profile)),
                }
            }

            // ── datagroups and iRules ──────────────────────────────────────
            ("GET", ["ltm", "data-group", "internal", name]) => match s.datagroups.get(*name) {
                Some(records) if records.is_empty() => ok(json!({ "name": name, "type": "string" })),
                Some(records) => ok(json!({
                    "name": name,
                    "type": "string",
                    "records": records
                        .iter()
                        .map(|(k, v)| json!({ "name": k, "data": v }))
                        .collect::<Vec<_>>()
                })),
                None => error(404, format!("datagroup {} not found", name)),
            },
            ("PATCH", ["ltm", "data-group", "internal", name]) => {
                let records: Vec<Value> = body
                    .get("records")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                match s.datagroups.get_mut(*name) {
                    Some(dg) => {
                        *dg = records
                            .iter()
                            .map(|r| (str_field(r, "name"), str_field(r, "data")))
                            .collect();
                        ok(json!({}))
                    }
                    None => error(404, format!("datagroup {} not found", name)),
                }
            }
            ("POST", ["ltm", "data-group", "internal"]) => {
                let name = str_field(body, "name");
                if s.datagroups.contains_key(&name) {
                    return error(409, format!("datagroup {} exists", name));
                }
                s.datagroups.insert(name, BTreeMap::new());
                ok(json!({}))
            }
            ("GET", ["ltm", "rule", id]) => match s.irules.contains_key(&full_path(id)) {
                true => ok(json!({})),
                false => error(404, format!("iRule {} not found", id)),
            },
            ("POST", ["ltm", "rule"]) => {
                let name = partition_name(body);
                if s.irules.contains_key(&name) {
                    return error(409, format!("iRule {} exists", name));
                }
                s.irules.insert(name, str_field(body, "apiAnonymous"));
                ok(json!({}))
            }

            // ── pools ──────────────────────────────────────────────────────
            ("POST", ["ltm", "pool"]) => {
                let name = partition_name(body);
                if s.pools.contains_key(&name) {
                    return error(409, format!("pool {} exists", name));
                }
                s.pools.insert(name, BTreeSet::new());
                ok(json!({}))
            }
            ("DELETE", ["ltm", "pool", id]) => match s.pools.remove(&full_path(id)) {
                Some(_) => ok(json!({})),
                None => error(404, format!("pool {} not found", id)),
            },
            ("GET", ["ltm", "pool", id, "members"]) => match s.pools.get(&full_path(id)) {
                Some(members) => ok(json!({ "items": names(members.iter().cloned()) })),
                None => error(404, format!("pool {} not found", id)),
            },
            ("POST", ["ltm", "pool", id, "members"]) => match s.pools.get_mut(&full_path(id)) {
                Some(members) => {
                    if !members.insert(str_field(body, "name")) {
                        return error(409, "member exists");
                    }
                    ok(json!({}))
                }
                None => error(404, format!("pool {} not found", id)),
            },
            ("DELETE", ["ltm", "pool", id, "members", member]) => {
                match s.pools.get_mut(&full_path(id)).map(|m| m.remove(*member)) {
                    Some(true) => ok(json!({})),
                    _ => error(404, format!("member {} not found", member)),
                }
            }

            // ── certificates and profiles ──────────────────────────────────
            ("POST", ["sys", "crypto", kind @ ("cert" | "key")]) => {
                let name = str_field(body, "name");
                let local = str_field(body, "from-local-file");
                if str_field(body, "command") != "install" || local.is_empty() {
                    return error(400, "bad install command");
                }
                if *kind == "cert" {
                    s.certs.insert(format!("{}.crt", name));
                } else {
                    s.keys.insert(format!("{}.key", name));
                }
                ok(json!({}))
            }
            ("POST", ["ltm", "profile", "client-ssl"]) => {
                let name = str_field(body, "name");
                let cert = str_field(body, "cert");
                let key = str_field(body, "key");
                if s.client_profiles.contains_key(&name) {
                    return error(409, format!("profile {} exists", name));
                }
                if !s.certs.contains(&cert) || !s.keys.contains(&key) {
                    return error(400, format!("cert {} or key {} not found", cert, key));
                }
                s.client_profiles.insert(name, (cert, key));
                ok(json!({}))
            }
            ("POST", ["ltm", "profile", "server-ssl"]) => {
                let name = str_field(body, "name");
                let chain = str_field(body, "chain");
                if s.server_profiles.contains_key(&name) {
                    return error(409, format!("profile {} exists", name));
                }
                if !s.certs.contains(&chain) {
                    return error(400, format!("chain {} not found", chain));
                }
                s.server_profiles.insert(name, chain);
                ok(json!({}))
            }
            ("DELETE", ["ltm", "profile", kind @ ("client-ssl" | "server-ssl"), name]) => {
                if s.vservers.values().any(|v| v.profiles.contains_key(*name)) {
                    return error(400, format!("profile {} is in use", name));
                }
                let removed = match *kind {
                    "client-ssl" => s.client_profiles.remove(*name).is_some(),
                    _ => s.server_profiles.remove(*name).is_some(),
                };
                match removed {
                    true => ok(json!({})),
                    false => error(404, format!("profile {} not found", name)),
                }
            }
            ("DELETE", ["sys", "file", "ssl-key", name]) => {
                if s.client_profiles.values().any(|(_, key)| key == *name) {
                    return error(400, format!("key {} is in use", name));
                }
                match s.keys.remove(*name) {
                    true => ok(json!({})),
                    false => error(404, format!("key {} not found", name)),
                }
            }
            ("DELETE", ["sys", "file", "ssl-cert", name]) => {
                let in_use = s.client_profiles.values().any(|(cert, _)| cert == *name)
                    || s.server_profiles.values().any(|chain| chain == *name);
                if in_use {
                    return error(400, format!("File object by name ({}) is in use.", name));
                }
                match s.certs.remove(*name) {
                    true => ok(json!({})),
                    false => error(404, format!("cert {} not found", name)),
                }
            }

            // ── VXLAN ──────────────────────────────────────────────────────
            ("GET", ["net", "tunnels", kind @ ("vxlan" | "tunnel"), id]) => {
                let table = if *kind == "vxlan" {
                    &s.vxlan_profiles
                } else {
                    &s.tunnels
                };
                match table.get(&full_path(id)) {
                    Some(object) => ok(object.clone()),
                    None => error(404, format!("{} {} not found", kind, id)),
                }
            }
            ("GET", ["net", "self", id]) => {
                let name = id.rsplit('~').next().unwrap_or(id).replace("%2F", "/");
                match s.self_ips.get(&name) {
                    Some(object) => ok(object.clone()),
                    None => error(404, format!("self {} not found", name)),
                }
            }
            ("POST", ["net", "tunnels", kind @ ("vxlan" | "tunnel")]) => {
                let name = partition_name(body);
                let table = if *kind == "vxlan" {
                    &mut s.vxlan_profiles
                } else {
                    &mut s.tunnels
                };
                if table.contains_key(&name) {
                    return error(409, format!("{} exists", name));
                }
                table.insert(name, body.clone());
                ok(json!({}))
            }
            ("POST", ["net", "self"]) => {
                let name = str_field(body, "name");
                if s.self_ips.contains_key(&name) {
                    return error(409, format!("self {} exists", name));
                }
                s.self_ips.insert(name, body.clone());
                ok(json!({}))
            }
            ("POST", ["net", "fdb", "tunnel", id, "records"]) => {
                let tunnel = full_path(id);
                if !s.tunnels.contains_key(&tunnel) {
                    return error(404, format!("tunnel {} not found", tunnel));
                }
                let records = s.fdb.entry(tunnel).or_default();
                let mac = str_field(body, "name");
                if records.contains_key(&mac) {
                    return error(409, format!("record {} exists", mac));
                }
                records.insert(mac, str_field(body, "endpoint"));
                ok(json!({}))
            }
            ("DELETE", ["net", "fdb", "tunnel", id, "records", mac]) => {
                match s.fdb.get_mut(&full_path(id)).and_then(|r| r.remove(*mac)) {
                    Some(_) => ok(json!({})),
                    None => error(404, format!("record {} not found", mac)),
                }
            }

            _ => error(404, format!("unexpected {} /{}", method, segments.join("/"))),
        }
    }
}

impl Respond for MockAppliance {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let method = request.method.as_str().to_string();
        let path = request.url.path().to_string();

        if method != "GET" {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(status) = self.take_failure(&method, &path) {
            return error(status, format!("injected failure for {} {}", method, path));
        }

        let Some(rest) = path.strip_prefix("/mgmt/tm/") else {
            return error(404, "not a management path");
        };
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        self.handle(&method, &segments, &body)
    }
}

/// [`FileTransfer`] that keeps uploads in memory
#[derive(Default)]
pub struct RecordingTransfer {
    pub staged: Mutex<BTreeMap<String, Vec<u8>>>,
    pub uploads: AtomicUsize,
    pub fail_uploads: AtomicBool,
}

#[async_trait]
impl FileTransfer for RecordingTransfer {
    async fn upload(&self, contents: &[u8], remote_path: &str) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(Error::TransferError(format!("scp to {} refused", remote_path)));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.staged
            .lock()
            .unwrap()
            .insert(remote_path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn remove(&self, remote_path: &str) -> Result<()> {
        self.staged.lock().unwrap().remove(remote_path);
        Ok(())
    }
}

/// Mock server, appliance state and transfer wired together
pub struct Harness {
    pub server: MockServer,
    pub appliance: MockAppliance,
    pub transfer: Arc<RecordingTransfer>,
}

impl Harness {
    pub async fn start(state: MockState) -> Self {
        let server = MockServer::start().await;
        let appliance = MockAppliance::new(state);
        Mock::given(any())
            .respond_with(appliance.clone())
            .mount(&server)
            .await;
        Self {
            server,
            appliance,
            transfer: Arc::new(RecordingTransfer::default()),
        }
    }

    pub fn config(&self, partition: &str) -> RouterConfig {
        RouterConfig {
            host: self.server.uri(),
            username: "admin".to_string(),
            password: "password".to_string(),
            http_vserver: Some(HTTP_VSERVER.to_string()),
            https_vserver: Some(HTTPS_VSERVER.to_string()),
            partition_path: partition.to_string(),
            ..RouterConfig::default()
        }
    }

    pub fn ltm(&self, config: &RouterConfig) -> Ltm {
        let transfer: Arc<dyn FileTransfer> = self.transfer.clone();
        Ltm::new(config, Some(transfer)).unwrap()
    }

    /// A plugin that has already run the bootstrap
    pub async fn plugin(&self, partition: &str) -> RouterPlugin {
        let mut plugin = RouterPlugin::new(self.ltm(&self.config(partition)));
        plugin.initialize().await.unwrap();
        plugin
    }
}
