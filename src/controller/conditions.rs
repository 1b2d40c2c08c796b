//! Condition management helpers
//!
//! Conditions are replaced by type and never dropped. The transition time
//! only moves when the status value flips.

use crate::crd::{ConditionStatus, ConditionType, ImageRegistry, RegistryCondition};
use chrono::Utc;

/// Update or add a condition on the object.
/// Returns true if anything about the condition changed.
pub fn set_condition(
    registry: &mut ImageRegistry,
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
) -> bool {
    let conditions = &mut registry.status_mut().conditions;
    let reason = Some(reason.to_string()).filter(|r| !r.is_empty());
    let message = Some(message.to_string()).filter(|m| !m.is_empty());

    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == type_) {
        if existing.status == status && existing.reason == reason && existing.message == message {
            return false;
        }
        if existing.status != status {
            existing.last_transition_time = Some(Utc::now());
        }
        existing.status = status;
        existing.reason = reason;
        existing.message = message;
        return true;
    }

    conditions.push(RegistryCondition {
        r#type: type_,
        status,
        last_transition_time: Some(Utc::now()),
        reason,
        message,
    });
    true
}

/// Status of a condition, Unknown when absent
pub fn condition_status(registry: &ImageRegistry, type_: ConditionType) -> ConditionStatus {
    registry
        .status
        .as_ref()
        .and_then(|s| s.condition(type_))
        .map(|c| c.status)
        .unwrap_or(ConditionStatus::Unknown)
}

/// Message of a condition, empty when absent
pub fn condition_message(registry: &ImageRegistry, type_: ConditionType) -> String {
    registry
        .status
        .as_ref()
        .and_then(|s| s.condition(type_))
        .and_then(|c| c.message.clone())
        .unwrap_or_default()
}
