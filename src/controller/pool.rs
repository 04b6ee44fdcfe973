//! Pool lifecycle and membership reconciliation

use std::collections::BTreeSet;

use tracing::{debug, info, instrument};

use crate::appliance::payloads::{NamedItem, PoolPayload};
use crate::appliance::POOL_MONITOR;
use crate::error::Result;

use super::ltm::{created_or_exists, deleted_or_absent, Ltm};

/// Deterministic pool name for a service
pub fn pool_name(namespace: &str, service: &str) -> String {
    format!("openshift_{}_{}", namespace, service)
}

impl Ltm {
    /// Current members of `pool`. Fails with a 404 error if the pool does
    /// not exist.
    pub async fn pool_members(&mut self, pool: &str) -> Result<BTreeSet<String>> {
        Ok(self.cache.pool_members(&self.client, pool).await?.clone())
    }

    pub async fn pool_exists(&mut self, pool: &str) -> Result<bool> {
        match self.cache.pool_members(&self.client, pool).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn pool_has_member(&mut self, pool: &str, member: &str) -> Result<bool> {
        Ok(self
            .cache
            .pool_members(&self.client, pool)
            .await?
            .contains(member))
    }

    /// Create `pool` with round-robin balancing and the HTTP/HTTPS monitor.
    #[instrument(skip(self))]
    pub async fn create_pool(&mut self, pool: &str) -> Result<()> {
        let payload = PoolPayload {
            load_balancing_mode: "round-robin".to_string(),
            monitor: POOL_MONITOR.to_string(),
            partition: self.client.partition_path().to_string(),
            name: pool.to_string(),
        };

        if created_or_exists(self.client.post("/ltm/pool", &payload).await)? {
            self.cache.record_pool_created(pool);
            info!("Pool {} created", pool);
        } else {
            // Someone else created it; membership is loaded on next access.
            debug!("Pool {} already exists", pool);
        }
        Ok(())
    }

    pub async fn ensure_pool(&mut self, pool: &str) -> Result<()> {
        if !self.pool_exists(pool).await? {
            self.create_pool(pool).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_pool(&mut self, pool: &str) -> Result<()> {
        let path = format!("/ltm/pool/{}", self.client.resource_id(pool));
        if deleted_or_absent(self.client.delete(&path).await)? {
            info!("Pool {} deleted", pool);
        }
        self.cache.record_pool_deleted(pool);
        Ok(())
    }

    /// Delete `pool` if it exists and has no members. Returns whether it was
    /// deleted.
    pub async fn delete_pool_if_empty(&mut self, pool: &str) -> Result<bool> {
        if !self.pool_exists(pool).await? {
            return Ok(false);
        }
        if !self.pool_members(pool).await?.is_empty() {
            return Ok(false);
        }
        self.delete_pool(pool).await?;
        Ok(true)
    }

    pub async fn add_pool_member(&mut self, pool: &str, member: &str) -> Result<()> {
        if self.pool_has_member(pool, member).await? {
            debug!("Pool {} already has member {}", pool, member);
            return Ok(());
        }

        let path = format!("/ltm/pool/{}/members", self.client.resource_id(pool));
        created_or_exists(self.client.post(&path, &NamedItem::new(member)).await)?;
        self.cache.record_member_added(pool, member);
        debug!("Added member {} to pool {}", member, pool);
        Ok(())
    }

    pub async fn delete_pool_member(&mut self, pool: &str, member: &str) -> Result<()> {
        if !self.pool_has_member(pool, member).await? {
            debug!("Pool {} does not have member {}", pool, member);
            return Ok(());
        }

        let path = format!(
            "/ltm/pool/{}/members/{}",
            self.client.resource_id(pool),
            member
        );
        deleted_or_absent(self.client.delete(&path).await)?;
        self.cache.record_member_removed(pool, member);
        debug!("Deleted member {} from pool {}", member, pool);
        Ok(())
    }

    /// Make the members of `pool` equal to `desired`, one call per change.
    #[instrument(skip(self, desired), fields(desired = desired.len()))]
    pub async fn reconcile_pool_members(
        &mut self,
        pool: &str,
        desired: &BTreeSet<String>,
    ) -> Result<()> {
        let current = self.pool_members(pool).await?;

        for member in desired.difference(&current) {
            self.add_pool_member(pool, member).await?;
        }
        for member in current.difference(desired) {
            self.delete_pool_member(pool, member).await?;
        }
        Ok(())
    }
}
