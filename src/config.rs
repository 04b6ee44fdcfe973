//! Router configuration
//!
//! Resolved once at startup from the command line (see `main.rs`) and never
//! changed afterwards.

use std::path::PathBuf;

use crate::appliance::{normalize_partition_path, DEFAULT_PARTITION_PATH};
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Management address of the appliance. A bare host means `https://host`;
    /// a value with a scheme is used as given.
    pub host: String,
    pub username: String,
    pub password: String,
    /// Virtual server that receives plain HTTP traffic
    pub http_vserver: Option<String>,
    /// Virtual server that terminates or inspects HTTPS traffic
    pub https_vserver: Option<String>,
    /// SSH key used to stage certificates. Without it TLS routes are refused.
    pub private_key: Option<PathBuf>,
    /// Skip verification of the management certificate
    pub insecure: bool,
    /// Rooted partition path, `/Common` unless configured
    pub partition_path: String,
    /// Self IP (CIDR) of the appliance on the VXLAN overlay
    pub vxlan_gateway: Option<String>,
    /// Appliance address used as the local tunnel endpoint
    pub internal_address: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            http_vserver: None,
            https_vserver: None,
            private_key: None,
            insecure: false,
            partition_path: DEFAULT_PARTITION_PATH.to_string(),
            vxlan_gateway: None,
            internal_address: None,
        }
    }
}

impl RouterConfig {
    /// Check required settings and normalize the partition path.
    pub fn validate(mut self) -> Result<Self> {
        if self.host.trim().is_empty() {
            return Err(Error::ConfigError("appliance host is required".to_string()));
        }
        if self.username.is_empty() {
            return Err(Error::ConfigError(
                "appliance username is required".to_string(),
            ));
        }

        self.partition_path = if self.partition_path.trim().is_empty() {
            DEFAULT_PARTITION_PATH.to_string()
        } else {
            normalize_partition_path(&self.partition_path)
        };
        if self.partition_path == "/" {
            return Err(Error::ConfigError(
                "partition path must name at least one folder".to_string(),
            ));
        }

        self.http_vserver = self.http_vserver.filter(|v| !v.is_empty());
        self.https_vserver = self.https_vserver.filter(|v| !v.is_empty());
        self.vxlan_gateway = self.vxlan_gateway.filter(|v| !v.is_empty());
        self.internal_address = self.internal_address.filter(|v| !v.is_empty());

        if self.vxlan_gateway.is_some() != self.internal_address.is_some() {
            return Err(Error::ConfigError(
                "VXLAN needs both the gateway and the internal address".to_string(),
            ));
        }

        Ok(self)
    }

    /// Base URL of the management interface, without the `/mgmt/tm` suffix
    pub fn management_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }

    /// Host name for scp/ssh
    pub fn ssh_host(&self) -> &str {
        let host = self
            .host
            .split_once("://")
            .map_or(self.host.as_str(), |(_, rest)| rest);
        let host = host.split('/').next().unwrap_or(host);
        // Drop a management port; ssh uses its own.
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    }

    /// Whether the VXLAN overlay should be programmed
    pub fn setup_vxlan(&self) -> bool {
        self.vxlan_gateway.is_some() && self.internal_address.is_some()
    }
}
