//! Host/path policy rules for routes without TLS passthrough

use tracing::{debug, info, instrument, warn};

use crate::appliance::payloads::{NamedItem, RuleActionPayload, RuleConditionPayload};
use crate::appliance::{HTTPS_POLICY_NAME, HTTP_POLICY_NAME};
use crate::error::Result;

use super::ltm::{created_or_exists, deleted_or_absent, Ltm};

/// Match conditions for a host and optional path.
///
/// Path segment conditions are indexed by their position in the path, so
/// empty segments (as in `/foo//bar`) leave gaps in the indexes.
pub fn rule_conditions(host: &str, path: &str) -> Vec<RuleConditionPayload> {
    let mut conditions = vec![RuleConditionPayload::host_equals(host)];
    conditions.extend(
        path.split('/')
            .skip(1)
            .enumerate()
            .filter(|(_, segment)| !segment.is_empty())
            .map(|(i, segment)| RuleConditionPayload::path_segment_equals(i + 1, segment)),
    );
    conditions
}

impl Ltm {
    pub async fn route_exists(&mut self, policy: &str, rule: &str) -> Result<bool> {
        Ok(self
            .cache
            .policy_rules(&self.client, policy)
            .await?
            .contains(rule))
    }

    /// Add a rule to `policy` forwarding requests for `host` and `path` to
    /// `pool`. A rule of the same name already on the appliance is replaced.
    /// If any step after the rule itself fails the rule is deleted again.
    #[instrument(skip(self))]
    pub async fn add_route(
        &mut self,
        policy: &str,
        rule: &str,
        pool: &str,
        host: &str,
        path: &str,
    ) -> Result<()> {
        let rules_path = format!("/ltm/policy/{}/rules", self.client.resource_id(policy));

        if !created_or_exists(self.client.post(&rules_path, &NamedItem::new(rule)).await)? {
            warn!("Rule {} already exists in {}; replacing it", rule, policy);
            self.delete_route(policy, rule).await?;
            self.client.post(&rules_path, &NamedItem::new(rule)).await?;
        }

        if let Err(e) = self.populate_rule(&rules_path, rule, pool, host, path).await {
            if let Err(cleanup) = self.delete_route(policy, rule).await {
                warn!(
                    "Creating rule {} failed and deleting it again also failed: {}",
                    rule, cleanup
                );
            }
            return Err(e);
        }

        self.cache.policy_rules(&self.client, policy).await?;
        self.cache.record_rule_added(policy, rule);
        info!("Rule {} added to policy {}", rule, policy);
        Ok(())
    }

    async fn populate_rule(
        &self,
        rules_path: &str,
        rule: &str,
        pool: &str,
        host: &str,
        path: &str,
    ) -> Result<()> {
        let conditions_path = format!("{}/{}/conditions", rules_path, rule);
        for condition in rule_conditions(host, path) {
            self.client.post(&conditions_path, &condition).await?;
        }

        let actions_path = format!("{}/{}/actions", rules_path, rule);
        let action = RuleActionPayload::forward_to(&self.client.full_path(pool));
        self.client.post(&actions_path, &action).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_route(&mut self, policy: &str, rule: &str) -> Result<()> {
        let path = format!(
            "/ltm/policy/{}/rules/{}",
            self.client.resource_id(policy),
            rule
        );
        if deleted_or_absent(self.client.delete(&path).await)? {
            info!("Rule {} deleted from policy {}", rule, policy);
        } else {
            debug!("Rule {} was already absent from policy {}", rule, policy);
        }
        self.cache.record_rule_removed(policy, rule);
        Ok(())
    }

    pub async fn insecure_route_exists(&mut self, rule: &str) -> Result<bool> {
        self.route_exists(HTTP_POLICY_NAME, rule).await
    }

    pub async fn secure_route_exists(&mut self, rule: &str) -> Result<bool> {
        self.route_exists(HTTPS_POLICY_NAME, rule).await
    }

    pub async fn add_insecure_route(
        &mut self,
        rule: &str,
        pool: &str,
        host: &str,
        path: &str,
    ) -> Result<()> {
        self.add_route(HTTP_POLICY_NAME, rule, pool, host, path).await
    }

    pub async fn add_secure_route(
        &mut self,
        rule: &str,
        pool: &str,
        host: &str,
        path: &str,
    ) -> Result<()> {
        self.add_route(HTTPS_POLICY_NAME, rule, pool, host, path).await
    }

    pub async fn delete_insecure_route(&mut self, rule: &str) -> Result<()> {
        self.delete_route(HTTP_POLICY_NAME, rule).await
    }

    pub async fn delete_secure_route(&mut self, rule: &str) -> Result<()> {
        self.delete_route(HTTPS_POLICY_NAME, rule).await
    }
}
