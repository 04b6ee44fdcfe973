//! Event handlers translating Route, Endpoints and Node changes into
//! appliance calls

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::{Endpoints, Node};
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::crd::{Route, TlsTermination};
use crate::error::Result;

use super::ltm::Ltm;
use super::pool::pool_name;

/// Kind of change delivered for an object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// Policy rule name (and TLS object prefix) of a route
pub fn route_name(namespace: &str, name: &str) -> String {
    format!("openshift_route_{}_{}", namespace, name)
}

/// Pool members for every address and port of every subset, as `ip:port`
pub fn endpoint_members(endpoints: &Endpoints) -> BTreeSet<String> {
    let mut members = BTreeSet::new();
    for subset in endpoints.subsets.iter().flatten() {
        for port in subset.ports.iter().flatten() {
            for address in subset.addresses.iter().flatten() {
                members.insert(format!("{}:{}", address.ip, port.port));
            }
        }
    }
    members
}

/// First `InternalIP` of a node
pub fn node_internal_ip(node: &Node) -> Option<String> {
    node.status
        .as_ref()?
        .addresses
        .as_ref()?
        .iter()
        .find(|address| address.type_ == "InternalIP")
        .map(|address| address.address.clone())
}

/// Entry point for object events. Owns the appliance handle, so events
/// are applied one at a time.
pub struct RouterPlugin {
    ltm: Ltm,
}

impl RouterPlugin {
    pub fn new(ltm: Ltm) -> Self {
        Self { ltm }
    }

    /// Run the appliance bootstrap.
    pub async fn initialize(&mut self) -> Result<()> {
        self.ltm.initialize().await
    }

    pub fn ltm(&self) -> &Ltm {
        &self.ltm
    }

    pub fn ltm_mut(&mut self) -> &mut Ltm {
        &mut self.ltm
    }

    /// Converge the pool of a service onto its endpoints.
    ///
    /// An empty endpoint set deletes the pool rather than leaving an empty
    /// one behind.
    #[instrument(skip(self, endpoints), fields(name = %endpoints.name_any(), namespace = ?endpoints.namespace()))]
    pub async fn handle_endpoints(
        &mut self,
        event: EventType,
        endpoints: &Endpoints,
    ) -> Result<()> {
        let namespace = endpoints.namespace().unwrap_or_default();
        let pool = pool_name(&namespace, &endpoints.name_any());

        match event {
            EventType::Added | EventType::Modified => {
                let members = endpoint_members(endpoints);
                if members.is_empty() {
                    if self.ltm.pool_exists(&pool).await? {
                        self.ltm.delete_pool(&pool).await?;
                    }
                } else {
                    self.ltm.ensure_pool(&pool).await?;
                    self.ltm.reconcile_pool_members(&pool, &members).await?;
                }
            }
            EventType::Deleted => {
                self.ltm.delete_pool(&pool).await?;
            }
        }

        debug!("Endpoints for pool {} handled", pool);
        Ok(())
    }

    /// Converge the rules, SNI entries and TLS objects of a route.
    ///
    /// Additions and modifications both remove whatever the appliance holds
    /// for the route name and add it again from the current spec. A restarted
    /// process sees every existing route as added, so re-adding must not
    /// depend on the route being absent.
    #[instrument(skip(self, route), fields(name = %route.name_any(), namespace = ?route.namespace()))]
    pub async fn handle_route(&mut self, event: EventType, route: &Route) -> Result<()> {
        let namespace = route.namespace().unwrap_or_default();
        let rule = route_name(&namespace, &route.name_any());
        let pool = pool_name(&namespace, &route.spec.to.name);

        match event {
            EventType::Added | EventType::Modified => {
                self.delete_route(&rule).await?;
                self.add_route(&rule, &pool, route).await?;
            }
            EventType::Deleted => {
                self.delete_route(&rule).await?;
                if self.ltm.delete_pool_if_empty(&pool).await? {
                    debug!("Deleted empty pool {}", pool);
                }
            }
        }

        info!("Route {} handled ({:?})", rule, event);
        Ok(())
    }

    /// Program a route that has nothing on the appliance yet.
    ///
    /// A TLS failure rolls back only the TLS objects; the rule (and for
    /// reencrypt the SNI entry) stays until the next event for the route
    /// clears it.
    async fn add_route(&mut self, rule: &str, pool: &str, route: &Route) -> Result<()> {
        let host = route.spec.host.as_str();
        if host.is_empty() {
            warn!("Route {} has no host; skipping", rule);
            return Ok(());
        }
        let path = route.spec.path.as_deref().unwrap_or("");

        self.ltm.ensure_pool(pool).await?;

        match route.spec.termination() {
            None => {
                self.ltm.add_insecure_route(rule, pool, host, path).await?;
            }
            Some(TlsTermination::Edge) => {
                self.ltm.add_secure_route(rule, pool, host, path).await?;
                self.add_cert(rule, host, route, false).await?;
            }
            Some(TlsTermination::Reencrypt) => {
                self.ltm.add_secure_route(rule, pool, host, path).await?;
                self.ltm.add_reencrypt_route(rule, pool, host).await?;
                self.add_cert(rule, host, route, true).await?;
            }
            Some(TlsTermination::Passthrough) => {
                self.ltm.add_passthrough_route(rule, pool, host).await?;
            }
        }
        Ok(())
    }

    async fn add_cert(
        &mut self,
        rule: &str,
        host: &str,
        route: &Route,
        with_destination_ca: bool,
    ) -> Result<()> {
        let Some(tls) = route.spec.tls.as_ref() else {
            return Ok(());
        };
        let cert = tls.certificate.as_deref().filter(|c| !c.is_empty());
        let key = tls.key.as_deref().filter(|k| !k.is_empty());
        let (Some(cert), Some(key)) = (cert, key) else {
            warn!(
                "Route {} terminates TLS but has no certificate and key; leaving the virtual server default in place",
                rule
            );
            return Ok(());
        };

        let destination_ca = if with_destination_ca {
            tls.destination_ca_certificate
                .as_deref()
                .filter(|ca| !ca.is_empty())
        } else {
            None
        };

        let result = self
            .ltm
            .add_cert(rule, host, cert, key, destination_ca)
            .await;
        if let Err(e) = &result {
            warn!(
                "TLS setup of route {} failed; its rule stays until the next event for the route: {}",
                rule, e
            );
        }
        result
    }

    /// Remove whatever the appliance holds for `rule`.
    async fn delete_route(&mut self, rule: &str) -> Result<()> {
        if self.ltm.insecure_route_exists(rule).await? {
            self.ltm.delete_insecure_route(rule).await?;
        }
        if self.ltm.secure_route_exists(rule).await? {
            self.ltm.delete_secure_route(rule).await?;
            self.ltm.delete_cert(rule).await?;
        }
        if self.ltm.passthrough_route_exists(rule).await? {
            self.ltm.delete_passthrough_route(rule).await?;
        }
        if self.ltm.reencrypt_route_exists(rule).await? {
            self.ltm.delete_reencrypt_route(rule).await?;
        }
        Ok(())
    }

    /// Keep the VXLAN forwarding table in step with cluster nodes.
    #[instrument(skip(self, node), fields(name = %node.name_any()))]
    pub async fn handle_node(&mut self, event: EventType, node: &Node) -> Result<()> {
        if self.ltm.vxlan().is_none() {
            return Ok(());
        }
        let Some(address) = node_internal_ip(node) else {
            warn!("Node {} has no InternalIP; skipping", node.name_any());
            return Ok(());
        };

        match event {
            EventType::Added | EventType::Modified => self.ltm.add_vtep(&address).await,
            EventType::Deleted => self.ltm.remove_vtep(&address).await,
        }
    }
}
