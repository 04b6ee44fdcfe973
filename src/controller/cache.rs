//! In-memory mirror of appliance state
//!
//! Every series is loaded from the appliance the first time it is needed and
//! afterwards only changed by the reconcilers, after the matching write has
//! been acknowledged. Nothing is persisted; a restarted process rebuilds the
//! cache from the appliance on demand.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::appliance::payloads::{DatagroupRecords, ItemList, NamedItem};
use crate::appliance::{
    ApplianceClient, PASSTHROUGH_HOSTS_DATAGROUP_NAME, PASSTHROUGH_ROUTES_DATAGROUP_NAME,
    REENCRYPT_HOSTS_DATAGROUP_NAME, REENCRYPT_ROUTES_DATAGROUP_NAME,
};
use crate::error::Result;

/// Which pair of SNI datagroups a route lives in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SniKind {
    Passthrough,
    Reencrypt,
}

impl SniKind {
    /// Datagroup mapping route name to host name
    pub fn routes_datagroup(self) -> &'static str {
        match self {
            SniKind::Passthrough => PASSTHROUGH_ROUTES_DATAGROUP_NAME,
            SniKind::Reencrypt => REENCRYPT_ROUTES_DATAGROUP_NAME,
        }
    }

    /// Datagroup mapping host name to pool name, read by the SNI iRule
    pub fn hosts_datagroup(self) -> &'static str {
        match self {
            SniKind::Passthrough => PASSTHROUGH_HOSTS_DATAGROUP_NAME,
            SniKind::Reencrypt => REENCRYPT_HOSTS_DATAGROUP_NAME,
        }
    }
}

impl std::fmt::Display for SniKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SniKind::Passthrough => write!(f, "passthrough"),
            SniKind::Reencrypt => write!(f, "reencrypt"),
        }
    }
}

/// Target of an SNI-dispatched route
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SniRoute {
    pub hostname: String,
    pub pool: String,
}

/// Route name to target, as recorded in one datagroup pair
pub type SniRouteTable = BTreeMap<String, SniRoute>;

#[derive(Default, Debug)]
pub struct ApplianceStateCache {
    pool_members: HashMap<String, BTreeSet<String>>,
    policy_rules: HashMap<String, BTreeSet<String>>,
    passthrough_routes: Option<SniRouteTable>,
    reencrypt_routes: Option<SniRouteTable>,
}

impl ApplianceStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ── pools ──────────────────────────────────────────────────────────────

    /// Members of `pool`, loaded on first access.
    ///
    /// A failed load (including 404 for a missing pool) leaves nothing
    /// cached, so a pool created later is still observed.
    pub async fn pool_members(
        &mut self,
        client: &ApplianceClient,
        pool: &str,
    ) -> Result<&BTreeSet<String>> {
        if !self.pool_members.contains_key(pool) {
            let path = format!("/ltm/pool/{}/members", client.resource_id(pool));
            let list: ItemList<NamedItem> = client.get(&path).await?;
            debug!("Loaded {} member(s) of pool {}", list.items.len(), pool);
            self.pool_members.insert(
                pool.to_string(),
                list.items.into_iter().map(|item| item.name).collect(),
            );
        }
        Ok(&self.pool_members[pool])
    }

    pub fn record_pool_created(&mut self, pool: &str) {
        self.pool_members.insert(pool.to_string(), BTreeSet::new());
    }

    pub fn record_pool_deleted(&mut self, pool: &str) {
        self.pool_members.remove(pool);
    }

    pub fn record_member_added(&mut self, pool: &str, member: &str) {
        if let Some(members) = self.pool_members.get_mut(pool) {
            members.insert(member.to_string());
        }
    }

    pub fn record_member_removed(&mut self, pool: &str, member: &str) {
        if let Some(members) = self.pool_members.get_mut(pool) {
            members.remove(member);
        }
    }

    /// Cached members without touching the appliance
    pub fn cached_pool_members(&self, pool: &str) -> Option<&BTreeSet<String>> {
        self.pool_members.get(pool)
    }

    // ── policy rules ───────────────────────────────────────────────────────

    /// Rule names of `policy`, loaded on first access
    pub async fn policy_rules(
        &mut self,
        client: &ApplianceClient,
        policy: &str,
    ) -> Result<&BTreeSet<String>> {
        if !self.policy_rules.contains_key(policy) {
            let path = format!("/ltm/policy/{}/rules", client.resource_id(policy));
            let list: ItemList<NamedItem> = client.get(&path).await?;
            debug!("Loaded {} rule(s) of policy {}", list.items.len(), policy);
            self.policy_rules.insert(
                policy.to_string(),
                list.items.into_iter().map(|item| item.name).collect(),
            );
        }
        Ok(&self.policy_rules[policy])
    }

    pub fn record_rule_added(&mut self, policy: &str, rule: &str) {
        if let Some(rules) = self.policy_rules.get_mut(policy) {
            rules.insert(rule.to_string());
        }
    }

    pub fn record_rule_removed(&mut self, policy: &str, rule: &str) {
        if let Some(rules) = self.policy_rules.get_mut(policy) {
            rules.remove(rule);
        }
    }

    // ── SNI route tables ───────────────────────────────────────────────────

    /// Route table of `kind`, rebuilt from both datagroups on first access.
    ///
    /// Routes whose host has no pool entry are dropped with a warning; they
    /// disappear from the appliance on the next table write.
    pub async fn sni_routes(
        &mut self,
        client: &ApplianceClient,
        kind: SniKind,
    ) -> Result<&SniRouteTable> {
        let slot = match kind {
            SniKind::Passthrough => &mut self.passthrough_routes,
            SniKind::Reencrypt => &mut self.reencrypt_routes,
        };

        if slot.is_none() {
            let hosts: DatagroupRecords = client
                .get(&format!("/ltm/data-group/internal/{}", kind.hosts_datagroup()))
                .await?;
            let routes: DatagroupRecords = client
                .get(&format!("/ltm/data-group/internal/{}", kind.routes_datagroup()))
                .await?;

            let pools: HashMap<String, String> = hosts
                .records
                .into_iter()
                .map(|record| (record.name, record.data))
                .collect();

            let mut table = SniRouteTable::new();
            for record in routes.records {
                match pools.get(&record.data) {
                    Some(pool) => {
                        table.insert(
                            record.name,
                            SniRoute {
                                hostname: record.data,
                                pool: pool.clone(),
                            },
                        );
                    }
                    None => warn!(
                        "{} maps route {} to host {}, but {} has no pool for that host; dropping the route",
                        kind.routes_datagroup(),
                        record.name,
                        record.data,
                        kind.hosts_datagroup()
                    ),
                }
            }
            debug!("Loaded {} {} route(s)", table.len(), kind);
            *slot = Some(table);
        }

        Ok(slot.get_or_insert_with(SniRouteTable::new))
    }

    pub fn replace_sni_routes(&mut self, kind: SniKind, table: SniRouteTable) {
        match kind {
            SniKind::Passthrough => self.passthrough_routes = Some(table),
            SniKind::Reencrypt => self.reencrypt_routes = Some(table),
        }
    }
}
