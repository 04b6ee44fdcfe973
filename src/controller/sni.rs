//! SNI-dispatched routes
//!
//! Passthrough and reencrypt routes are not matched by policy rules but by
//! the SNI iRule, which looks the ClientHello server name up in a host to
//! pool datagroup. A second datagroup maps route names to hosts so the
//! table can be rebuilt after a restart. Datagroups can only be replaced as
//! a whole, so every change rewrites both.

use std::collections::BTreeMap;

use tracing::{info, instrument};

use crate::appliance::payloads::{DatagroupRecord, DatagroupRecords};
use crate::error::{Error, Result};

use super::cache::{SniKind, SniRoute, SniRouteTable};
use super::ltm::Ltm;

/// Records of the host datagroup and the route datagroup for `table`
pub fn datagroup_records(table: &SniRouteTable) -> (DatagroupRecords, DatagroupRecords) {
    // One record per host; the last route for a host wins.
    let hosts: BTreeMap<&str, &str> = table
        .values()
        .map(|route| (route.hostname.as_str(), route.pool.as_str()))
        .collect();

    let hosts = DatagroupRecords {
        records: hosts
            .into_iter()
            .map(|(host, pool)| DatagroupRecord {
                name: host.to_string(),
                data: pool.to_string(),
            })
            .collect(),
    };
    let routes = DatagroupRecords {
        records: table
            .iter()
            .map(|(route, target)| DatagroupRecord {
                name: route.clone(),
                data: target.hostname.clone(),
            })
            .collect(),
    };
    (hosts, routes)
}

impl Ltm {
    pub async fn sni_route_exists(&mut self, kind: SniKind, route: &str) -> Result<bool> {
        Ok(self
            .cache
            .sni_routes(&self.client, kind)
            .await?
            .contains_key(route))
    }

    #[instrument(skip(self))]
    pub async fn add_sni_route(
        &mut self,
        kind: SniKind,
        route: &str,
        pool: &str,
        hostname: &str,
    ) -> Result<()> {
        let mut table = self.cache.sni_routes(&self.client, kind).await?.clone();
        table.insert(
            route.to_string(),
            SniRoute {
                hostname: hostname.to_string(),
                pool: pool.to_string(),
            },
        );

        self.write_sni_table(kind, &table).await?;
        self.cache.replace_sni_routes(kind, table);
        info!("Added {} route {} for host {}", kind, route, hostname);
        Ok(())
    }

    /// Remove `route` from the table of `kind`. Fails if the route is not
    /// in the table.
    #[instrument(skip(self))]
    pub async fn delete_sni_route(&mut self, kind: SniKind, route: &str) -> Result<()> {
        let mut table = self.cache.sni_routes(&self.client, kind).await?.clone();
        if table.remove(route).is_none() {
            return Err(Error::RouteNotFound {
                route: route.to_string(),
                table: kind.routes_datagroup().to_string(),
            });
        }

        self.write_sni_table(kind, &table).await?;
        self.cache.replace_sni_routes(kind, table);
        info!("Deleted {} route {}", kind, route);
        Ok(())
    }

    /// Replace both datagroups of `kind`, hosts first.
    async fn write_sni_table(&self, kind: SniKind, table: &SniRouteTable) -> Result<()> {
        let (hosts, routes) = datagroup_records(table);
        self.client
            .patch(
                &format!("/ltm/data-group/internal/{}", kind.hosts_datagroup()),
                &hosts,
            )
            .await?;
        self.client
            .patch(
                &format!("/ltm/data-group/internal/{}", kind.routes_datagroup()),
                &routes,
            )
            .await?;
        Ok(())
    }

    pub async fn passthrough_route_exists(&mut self, route: &str) -> Result<bool> {
        self.sni_route_exists(SniKind::Passthrough, route).await
    }

    pub async fn reencrypt_route_exists(&mut self, route: &str) -> Result<bool> {
        self.sni_route_exists(SniKind::Reencrypt, route).await
    }

    pub async fn add_passthrough_route(
        &mut self,
        route: &str,
        pool: &str,
        hostname: &str,
    ) -> Result<()> {
        self.add_sni_route(SniKind::Passthrough, route, pool, hostname)
            .await
    }

    pub async fn add_reencrypt_route(
        &mut self,
        route: &str,
        pool: &str,
        hostname: &str,
    ) -> Result<()> {
        self.add_sni_route(SniKind::Reencrypt, route, pool, hostname)
            .await
    }

    pub async fn delete_passthrough_route(&mut self, route: &str) -> Result<()> {
        self.delete_sni_route(SniKind::Passthrough, route).await
    }

    pub async fn delete_reencrypt_route(&mut self, route: &str) -> Result<()> {
        self.delete_sni_route(SniKind::Reencrypt, route).await
    }
}
