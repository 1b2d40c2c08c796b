//! Cluster operator status reporting

use crate::crd::{
    ClusterOperator, ClusterOperatorSpec, ClusterOperatorStatus, ConditionStatus, ConditionType,
    OperatorCondition,
};
use crate::domain::ports::ClusterStatusHandler;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use kube::api::PostParams;
use kube::{Api, Client};
use tracing::{debug, info};

const KIND: &str = "ClusterOperator";

/// Reports coarse health through the cluster-scoped ClusterOperator
pub struct KubeStatusHandler {
    api: Api<ClusterOperator>,
    name: String,
    version: String,
}

impl KubeStatusHandler {
    pub fn new(client: Client, operator_name: impl Into<String>) -> Self {
        Self {
            api: Api::all(client),
            name: operator_name.into(),
            version: crate::VERSION.to_string(),
        }
    }
}

/// Set one condition and the reporting version. Returns true if anything changed.
fn apply_condition(
    status: &mut ClusterOperatorStatus,
    condition: ConditionType,
    value: ConditionStatus,
    message: &str,
    version: &str,
) -> bool {
    let mut changed = status.set_condition(OperatorCondition {
        r#type: condition,
        status: value,
        message: Some(message.to_string()).filter(|m| !m.is_empty()),
        last_transition_time: Some(Utc::now()),
    });
    if status.version.as_deref() != Some(version) {
        status.version = Some(version.to_string());
        changed = true;
    }
    changed
}

#[async_trait]
impl ClusterStatusHandler for KubeStatusHandler {
    async fn create(&self) -> Result<()> {
        let existing = self
            .api
            .get_opt(&self.name)
            .await
            .map_err(|e| Error::from_kube(KIND, &self.name, e))?;
        if existing.is_some() {
            return Ok(());
        }

        let operator = ClusterOperator::new(&self.name, ClusterOperatorSpec {});
        match self.api.create(&PostParams::default(), &operator).await {
            Ok(_) => {
                info!(name = %self.name, "Created cluster operator status");
                Ok(())
            }
            Err(e) => match Error::from_kube(KIND, &self.name, e) {
                Error::Conflict { .. } => Ok(()),
                other => Err(other),
            },
        }
    }

    async fn update(&self, condition: ConditionType, status: ConditionStatus, message: &str) -> Result<()> {
        let mut operator = self
            .api
            .get(&self.name)
            .await
            .map_err(|e| Error::from_kube(KIND, &self.name, e))?;

        let mut current = operator.status.take().unwrap_or_default();
        if !apply_condition(&mut current, condition, status, message, &self.version) {
            return Ok(());
        }
        operator.status = Some(current);

        debug!(name = %self.name, condition = %condition, status = ?status, "Updating cluster operator status");
        let data = serde_json::to_vec(&operator)?;
        self.api
            .replace_status(&self.name, &PostParams::default(), data)
            .await
            .map_err(|e| Error::from_kube(KIND, &self.name, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_and_version_recorded() {
        let mut status = ClusterOperatorStatus::default();
        assert!(apply_condition(
            &mut status,
            ConditionType::Available,
            ConditionStatus::True,
            "the registry is ready",
            "0.1.0"
        ));
        assert_eq!(status.version.as_deref(), Some("0.1.0"));
        assert_eq!(status.conditions[0].message.as_deref(), Some("the registry is ready"));

        assert!(!apply_condition(
            &mut status,
            ConditionType::Available,
            ConditionStatus::True,
            "the registry is ready",
            "0.1.0"
        ));
    }

    #[test]
    fn test_empty_message_is_omitted() {
        let mut status = ClusterOperatorStatus::default();
        apply_condition(&mut status, ConditionType::Failing, ConditionStatus::False, "", "0.1.0");
        assert!(status.conditions[0].message.is_none());
    }
}
