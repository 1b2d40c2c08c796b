//! Change detection fingerprint
//!
//! SHA-256 over the canonical JSON of `{spec, status}`. Objects are
//! serialized through `serde_json::Value`, whose maps keep keys sorted, so
//! the digest does not depend on field or map iteration order.

use crate::crd::{ImageRegistry, ImageRegistrySpec, ImageRegistryStatus};
use crate::error::Result;
use crate::parameters::CHECKSUM_ANNOTATION;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct ChecksumInput<'a> {
    spec: &'a ImageRegistrySpec,
    status: &'a Option<ImageRegistryStatus>,
}

/// Lowercase hex fingerprint of the object's spec and status
pub fn checksum(registry: &ImageRegistry) -> Result<String> {
    let canonical = serde_json::to_value(ChecksumInput {
        spec: &registry.spec,
        status: &registry.status,
    })?;
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Fingerprint recorded on the object by the last write
pub fn stored_checksum(registry: &ImageRegistry) -> Option<&str> {
    registry
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(CHECKSUM_ANNOTATION))
        .map(String::as_str)
}

/// Record a fingerprint on the object
pub fn set_checksum(registry: &mut ImageRegistry, digest: String) {
    registry
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(CHECKSUM_ANNOTATION.to_string(), digest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ConditionStatus, ConditionType, RegistryCondition};
    use crate::testing::registry;

    #[test]
    fn test_checksum_is_stable_hex() {
        let cr = registry("image-registry");
        let first = checksum(&cr).unwrap();
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(first, checksum(&cr.clone()).unwrap());
    }

    #[test]
    fn test_checksum_ignores_metadata() {
        let cr = registry("image-registry");
        let mut annotated = cr.clone();
        set_checksum(&mut annotated, "abc".into());
        annotated.metadata.resource_version = Some("42".into());
        assert_eq!(checksum(&cr).unwrap(), checksum(&annotated).unwrap());
        assert_eq!(stored_checksum(&annotated), Some("abc"));
    }

    #[test]
    fn test_checksum_tracks_status() {
        let cr = registry("image-registry");
        let mut updated = cr.clone();
        updated.status_mut().conditions.push(RegistryCondition {
            r#type: ConditionType::Available,
            status: ConditionStatus::True,
            last_transition_time: None,
            reason: None,
            message: None,
        });
        assert_ne!(checksum(&cr).unwrap(), checksum(&updated).unwrap());
    }
}
