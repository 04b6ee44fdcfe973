//! VXLAN forwarding entries for cluster nodes

use std::net::IpAddr;

use tracing::{debug, instrument};

use crate::appliance::payloads::FdbRecordPayload;
use crate::appliance::VXLAN_TUNNEL_NAME;
use crate::error::{Error, Result};

use super::ltm::{created_or_exists, deleted_or_absent, Ltm};

/// MAC address the overlay uses for a node: `0a:0a` followed by the four
/// IPv4 octets.
pub fn vtep_mac(address: &str) -> Result<String> {
    let ip: IpAddr = address
        .parse()
        .map_err(|_| Error::InvalidVtep(address.to_string(), "not an IP address".to_string()))?;
    let IpAddr::V4(v4) = ip else {
        return Err(Error::InvalidVtep(
            address.to_string(),
            "not an IPv4 address".to_string(),
        ));
    };
    let [a, b, c, d] = v4.octets();
    Ok(format!("0a:0a:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d))
}

impl Ltm {
    fn fdb_records_path(&self) -> String {
        format!(
            "/net/fdb/tunnel/{}/records",
            self.client.resource_id(VXLAN_TUNNEL_NAME)
        )
    }

    /// Add `address` to the tunnel's forwarding table. No-op without VXLAN.
    #[instrument(skip(self))]
    pub async fn add_vtep(&self, address: &str) -> Result<()> {
        if self.vxlan.is_none() {
            return Ok(());
        }
        let mac = vtep_mac(address)?;
        let partition = self.client.partition_path().to_string();
        self.ensure_partition_path_exists(&partition).await?;

        let payload = FdbRecordPayload {
            name: mac.clone(),
            endpoint: address.to_string(),
        };
        created_or_exists(self.client.post(&self.fdb_records_path(), &payload).await)?;
        debug!("VTEP {} ({}) present", address, mac);
        Ok(())
    }

    /// Remove `address` from the tunnel's forwarding table. No-op without
    /// VXLAN.
    #[instrument(skip(self))]
    pub async fn remove_vtep(&self, address: &str) -> Result<()> {
        if self.vxlan.is_none() {
            return Ok(());
        }
        let mac = vtep_mac(address)?;
        let path = format!("{}/{}", self.fdb_records_path(), mac);
        deleted_or_absent(self.client.delete(&path).await)?;
        debug!("VTEP {} ({}) removed", address, mac);
        Ok(())
    }
}
