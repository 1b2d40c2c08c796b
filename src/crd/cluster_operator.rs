//! ClusterOperator CRD
//!
//! Cluster-scoped resource through which the operator reports its coarse
//! health to cluster administrators.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::image_registry::{ConditionStatus, ConditionType};

/// ClusterOperator is named after the operator that owns it
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "registry.billyronks.io",
    version = "v1",
    kind = "ClusterOperator",
    plural = "clusteroperators",
    shortname = "co",
    status = "ClusterOperatorStatus",
    printcolumn = r#"{"name": "Version", "type": "string", "jsonPath": ".status.version"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOperatorSpec {}

/// Reported operator health
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOperatorStatus {
    #[serde(default)]
    pub conditions: Vec<OperatorCondition>,

    /// Version of the reporting operator
    #[serde(default)]
    pub version: Option<String>,
}

/// One operator-level condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperatorCondition {
    pub r#type: ConditionType,
    pub status: ConditionStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl ClusterOperatorStatus {
    /// Replace or append the condition of the same type.
    /// Returns true when the stored condition changed.
    pub fn set_condition(&mut self, condition: OperatorCondition) -> bool {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            if existing.status == condition.status && existing.message == condition.message {
                return false;
            }
            let flipped = existing.status != condition.status;
            let previous = existing.last_transition_time;
            *existing = condition;
            if !flipped {
                existing.last_transition_time = previous;
            }
            true
        } else {
            self.conditions.push(condition);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(status: ConditionStatus, message: &str) -> OperatorCondition {
        OperatorCondition {
            r#type: ConditionType::Available,
            status,
            message: Some(message.into()),
            last_transition_time: Some(Utc::now()),
        }
    }

    #[test]
    fn test_set_condition_replaces_by_type() {
        let mut status = ClusterOperatorStatus::default();
        assert!(status.set_condition(condition(ConditionStatus::False, "starting")));
        assert!(status.set_condition(condition(ConditionStatus::True, "ready")));
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, ConditionStatus::True);
    }

    #[test]
    fn test_set_condition_reports_no_change() {
        let mut status = ClusterOperatorStatus::default();
        status.set_condition(condition(ConditionStatus::True, "ready"));
        assert!(!status.set_condition(condition(ConditionStatus::True, "ready")));
    }
}
