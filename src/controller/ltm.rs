//! Handle on one BIG-IP LTM
//!
//! `Ltm` owns the REST client, the state cache and the optional file
//! transfer. The operations are split by concern across `pool.rs`,
//! `policy.rs`, `sni.rs`, `certs.rs`, `vtep.rs` and `bootstrap.rs`.

use std::sync::Arc;

use tracing::info;

use crate::appliance::error::Result as ApplianceResult;
use crate::appliance::{ApplianceClient, FileTransfer, SshFileTransfer};
use crate::config::RouterConfig;
use crate::error::Result;

use super::cache::ApplianceStateCache;

/// Overlay settings, present only when both values are configured
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VxlanSettings {
    /// Self IP of the appliance on the overlay, in CIDR form
    pub gateway: String,
    /// Local address of the tunnel endpoint
    pub internal_address: String,
}

pub struct Ltm {
    pub(crate) client: ApplianceClient,
    pub(crate) cache: ApplianceStateCache,
    pub(crate) transfer: Option<Arc<dyn FileTransfer>>,
    pub(crate) http_vserver: Option<String>,
    pub(crate) https_vserver: Option<String>,
    pub(crate) vxlan: Option<VxlanSettings>,
}

impl Ltm {
    /// Build an `Ltm` with an explicit file transfer (or none, which
    /// disables TLS routes).
    pub fn new(config: &RouterConfig, transfer: Option<Arc<dyn FileTransfer>>) -> Result<Self> {
        let vxlan = match (&config.vxlan_gateway, &config.internal_address) {
            (Some(gateway), Some(internal_address)) => Some(VxlanSettings {
                gateway: gateway.clone(),
                internal_address: internal_address.clone(),
            }),
            _ => None,
        };

        Ok(Self {
            client: ApplianceClient::new(config)?,
            cache: ApplianceStateCache::new(),
            transfer,
            http_vserver: config.http_vserver.clone(),
            https_vserver: config.https_vserver.clone(),
            vxlan,
        })
    }

    /// Build an `Ltm` that stages certificates over scp when a private key
    /// is configured.
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        let transfer: Option<Arc<dyn FileTransfer>> = match &config.private_key {
            Some(key) => Some(Arc::new(SshFileTransfer::new(
                config.ssh_host(),
                &config.username,
                key,
            )?)),
            None => {
                info!("No SSH private key configured; TLS routes will be rejected");
                None
            }
        };
        Self::new(config, transfer)
    }

    pub fn client(&self) -> &ApplianceClient {
        &self.client
    }

    pub fn cache(&self) -> &ApplianceStateCache {
        &self.cache
    }

    pub fn vxlan(&self) -> Option<&VxlanSettings> {
        self.vxlan.as_ref()
    }
}

/// Fold "already exists" into success. Returns whether the object was
/// created by this call.
pub(crate) fn created_or_exists(result: ApplianceResult<()>) -> ApplianceResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_conflict() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Fold "not found" into success. Returns whether the object was deleted by
/// this call.
pub(crate) fn deleted_or_absent(result: ApplianceResult<()>) -> ApplianceResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Turn an existence probe into a boolean.
pub(crate) fn exists(result: ApplianceResult<()>) -> ApplianceResult<bool> {
    deleted_or_absent(result)
}
