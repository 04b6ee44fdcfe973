//! One-time idempotent setup of the objects every route depends on
//!
//! Safe to run on every start: each step first probes for its object and
//! only creates what is missing.

use tracing::{debug, info, instrument};

use crate::appliance::payloads::{
    DatagroupPayload, IRulePayload, ItemList, NamedItem, PolicyPayload, PolicyReference,
    SelfIpPayload, TunnelPayload, VirtualServerPolicyPayload, VirtualServerRules,
    VxlanProfilePayload,
};
use crate::appliance::{
    encode_uri_path_component, normalize_partition_path, HTTPS_POLICY_NAME, HTTP_POLICY_NAME,
    LOCAL_TRAFFIC_GROUP, PASSTHROUGH_HOSTS_DATAGROUP_NAME, PASSTHROUGH_ROUTES_DATAGROUP_NAME,
    REENCRYPT_HOSTS_DATAGROUP_NAME, REENCRYPT_ROUTES_DATAGROUP_NAME, SNI_IRULE_CODE,
    SNI_IRULE_NAME, VXLAN_PORT, VXLAN_PROFILE_NAME, VXLAN_TUNNEL_NAME,
};
use crate::error::Result;

use super::ltm::{created_or_exists, exists, Ltm};

/// Name of the placeholder rule every policy needs before it can be
/// attached to a virtual server
const NOOP_RULE_NAME: &str = "default_noop";

/// Every ancestor of a rooted path, shortest first.
///
/// `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
pub fn partition_ancestors(partition_path: &str) -> Vec<String> {
    let normalized = normalize_partition_path(partition_path);
    let mut ancestors = Vec::new();
    let mut current = String::new();
    for segment in normalized.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        ancestors.push(current.clone());
    }
    ancestors
}

impl Ltm {
    /// Bring the appliance into the state routes are programmed against.
    ///
    /// Order: partition, insecure policy (and its HTTP virtual server
    /// attachment), secure policy, the four SNI datagroups, then for the
    /// HTTPS virtual server the secure policy, the SNI iRule and its
    /// attachment, and finally the VXLAN overlay when configured.
    #[instrument(skip(self))]
    pub async fn initialize(&mut self) -> Result<()> {
        let partition = self.client.partition_path().to_string();
        self.ensure_partition_path_exists(&partition).await?;

        self.ensure_policy_exists(HTTP_POLICY_NAME).await?;
        if let Some(vserver) = self.http_vserver.clone() {
            self.ensure_vserver_has_policy(&vserver, HTTP_POLICY_NAME)
                .await?;
        }

        self.ensure_policy_exists(HTTPS_POLICY_NAME).await?;

        for datagroup in [
            REENCRYPT_ROUTES_DATAGROUP_NAME,
            REENCRYPT_HOSTS_DATAGROUP_NAME,
            PASSTHROUGH_ROUTES_DATAGROUP_NAME,
            PASSTHROUGH_HOSTS_DATAGROUP_NAME,
        ] {
            self.ensure_datagroup_exists(datagroup).await?;
        }

        if let Some(vserver) = self.https_vserver.clone() {
            self.ensure_vserver_has_policy(&vserver, HTTPS_POLICY_NAME)
                .await?;
            self.ensure_irule_exists(SNI_IRULE_NAME, SNI_IRULE_CODE)
                .await?;
            self.ensure_vserver_has_irule(&vserver, SNI_IRULE_NAME)
                .await?;
        }

        if self.vxlan.is_some() {
            self.ensure_vxlan_tunnel().await?;
        }

        info!("Appliance initialization complete");
        Ok(())
    }

    /// Create every missing folder of `partition_path`, outermost first.
    pub async fn ensure_partition_path_exists(&self, partition_path: &str) -> Result<()> {
        let folder = |path: &str| format!("/sys/folder/{}", encode_uri_path_component(path));

        if exists(self.client.probe(&folder(partition_path)).await)? {
            debug!("Partition path {} exists", partition_path);
            return Ok(());
        }

        for ancestor in partition_ancestors(partition_path) {
            if exists(self.client.probe(&folder(&ancestor)).await)? {
                continue;
            }
            if created_or_exists(
                self.client
                    .post("/sys/folder", &NamedItem::new(ancestor.as_str()))
                    .await,
            )? {
                info!("Created folder {}", ancestor);
            }
        }
        Ok(())
    }

    pub async fn ensure_policy_exists(&self, policy: &str) -> Result<()> {
        let policy_id = self.client.resource_id(policy);
        if exists(self.client.probe(&format!("/ltm/policy/{}", policy_id)).await)? {
            debug!("Policy {} exists", policy);
            return Ok(());
        }

        let partition = self.client.partition_path().to_string();
        let common = PolicyPayload {
            name: self.client.full_path(policy),
            partition: None,
            tm_partition: None,
            controls: vec!["forwarding".to_string()],
            requires: vec!["http".to_string()],
            strategy: "best-match".to_string(),
            legacy: None,
        };
        // Appliances that run the overlay are v12, which wants the legacy
        // policy format.
        let payload = if self.vxlan.is_some() {
            PolicyPayload {
                tm_partition: Some(partition),
                legacy: Some(true),
                ..common
            }
        } else {
            PolicyPayload {
                partition: Some(partition),
                ..common
            }
        };
        self.client.post("/ltm/policy", &payload).await?;

        self.client
            .post(
                &format!("/ltm/policy/{}/rules", policy_id),
                &NamedItem::new(NOOP_RULE_NAME),
            )
            .await?;
        info!("Created policy {}", policy);
        Ok(())
    }

    pub async fn ensure_vserver_has_policy(&self, vserver: &str, policy: &str) -> Result<()> {
        // The per-policy URL answers 200 even for policies that are not
        // attached, so the whole list has to be read.
        let path = format!("/ltm/virtual/{}/policies", self.client.resource_id(vserver));
        let attached: ItemList<PolicyReference> = self.client.get(&path).await?;

        let policy_path = self.client.full_path(policy);
        if attached.items.iter().any(|p| p.full_path == policy_path) {
            debug!("Virtual server {} has policy {}", vserver, policy);
            return Ok(());
        }

        let payload = VirtualServerPolicyPayload {
            name: policy_path,
            partition: self.client.partition_path().to_string(),
        };
        self.client.post(&path, &payload).await?;
        info!("Attached policy {} to virtual server {}", policy, vserver);
        Ok(())
    }

    pub async fn ensure_datagroup_exists(&self, datagroup: &str) -> Result<()> {
        let path = format!("/ltm/data-group/internal/{}", datagroup);
        if exists(self.client.probe(&path).await)? {
            debug!("Datagroup {} exists", datagroup);
            return Ok(());
        }

        let payload = DatagroupPayload {
            name: datagroup.to_string(),
            kind: "string".to_string(),
        };
        self.client
            .post("/ltm/data-group/internal", &payload)
            .await?;
        info!("Created datagroup {}", datagroup);
        Ok(())
    }

    pub async fn ensure_irule_exists(&self, irule: &str, code: &str) -> Result<()> {
        let path = format!("/ltm/rule/{}", self.client.resource_id(irule));
        if exists(self.client.probe(&path).await)? {
            debug!("iRule {} exists", irule);
            return Ok(());
        }

        let payload = IRulePayload {
            name: irule.to_string(),
            partition: self.client.partition_path().to_string(),
            api_anonymous: code.to_string(),
        };
        self.client.post("/ltm/rule", &payload).await?;
        info!("Created iRule {}", irule);
        Ok(())
    }

    /// Attach `irule` to `vserver`, keeping any iRules already attached.
    pub async fn ensure_vserver_has_irule(&self, vserver: &str, irule: &str) -> Result<()> {
        let path = format!("/ltm/virtual/{}", self.client.resource_id(vserver));
        let current: VirtualServerRules = self.client.get(&path).await?;

        let irule_path = self.client.full_path(irule);
        if current.rules.iter().any(|r| *r == irule_path) {
            debug!("Virtual server {} has iRule {}", vserver, irule);
            return Ok(());
        }

        let mut rules = current.rules;
        rules.push(irule_path);
        self.client
            .patch(&path, &VirtualServerRules { rules })
            .await?;
        info!("Attached iRule {} to virtual server {}", irule, vserver);
        Ok(())
    }

    /// Create whichever of the VXLAN profile, the tunnel and the overlay
    /// self IP is missing.
    pub async fn ensure_vxlan_tunnel(&self) -> Result<()> {
        let Some(vxlan) = &self.vxlan else {
            return Ok(());
        };
        let partition = self.client.partition_path().to_string();

        let profile_path = format!(
            "/net/tunnels/vxlan/{}",
            self.client.resource_id(VXLAN_PROFILE_NAME)
        );
        let tunnel_path = format!(
            "/net/tunnels/tunnel/{}",
            self.client.resource_id(VXLAN_TUNNEL_NAME)
        );
        // The self IP is named after its CIDR, whose slash must stay escaped.
        let self_ip_path = format!(
            "/net/self/{}~{}",
            encode_uri_path_component(&partition),
            vxlan.gateway.replace('/', "%2F")
        );

        let profile = VxlanProfilePayload {
            name: VXLAN_PROFILE_NAME.to_string(),
            partition: partition.clone(),
            flooding_type: "multipoint".to_string(),
            port: VXLAN_PORT,
        };
        if exists(self.client.probe(&profile_path).await)? {
            debug!("VXLAN profile {} exists", VXLAN_PROFILE_NAME);
        } else {
            created_or_exists(self.client.post("/net/tunnels/vxlan", &profile).await)?;
        }

        let tunnel = TunnelPayload {
            name: VXLAN_TUNNEL_NAME.to_string(),
            partition: partition.clone(),
            key: 0,
            local_address: vxlan.internal_address.clone(),
            mode: "bidirectional".to_string(),
            mtu: "0".to_string(),
            profile: self.client.full_path(VXLAN_PROFILE_NAME),
            tos: "preserve".to_string(),
            transparent: "disabled".to_string(),
            use_pmtu: "enabled".to_string(),
        };
        if exists(self.client.probe(&tunnel_path).await)? {
            debug!("VXLAN tunnel {} exists", VXLAN_TUNNEL_NAME);
        } else {
            created_or_exists(self.client.post("/net/tunnels/tunnel", &tunnel).await)?;
        }

        let self_ip = SelfIpPayload {
            name: vxlan.gateway.clone(),
            partition,
            address: vxlan.gateway.clone(),
            address_source: "from-user".to_string(),
            floating: "disabled".to_string(),
            inherited_traffic_group: "false".to_string(),
            traffic_group: LOCAL_TRAFFIC_GROUP.to_string(),
            unit: 0,
            vlan: self.client.full_path(VXLAN_TUNNEL_NAME),
            allow_service: "all".to_string(),
        };
        if exists(self.client.probe(&self_ip_path).await)? {
            debug!("Self IP {} exists", vxlan.gateway);
        } else {
            created_or_exists(self.client.post("/net/self", &self_ip).await)?;
        }

        info!("VXLAN tunnel {} configured", VXLAN_TUNNEL_NAME);
        Ok(())
    }
}
