//! Finalizer handling for ImageRegistry teardown
//!
//! The finalizer is appended on the managed path and removed only after
//! storage and child resources are gone. Both helpers mutate the local copy;
//! the caller writes it back.

use crate::crd::ImageRegistry;
use crate::parameters::FINALIZER;
use kube::ResourceExt;

pub fn has_finalizer(registry: &ImageRegistry) -> bool {
    registry.finalizers().iter().any(|f| f == FINALIZER)
}

/// Append the finalizer if missing. Returns true if it was added.
pub fn add_finalizer(registry: &mut ImageRegistry) -> bool {
    if has_finalizer(registry) {
        return false;
    }
    registry.finalizers_mut().push(FINALIZER.to_string());
    true
}

/// Drop the finalizer. Returns true if it was present.
pub fn remove_finalizer(registry: &mut ImageRegistry) -> bool {
    if !has_finalizer(registry) {
        return false;
    }
    registry.finalizers_mut().retain(|f| f != FINALIZER);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::registry;

    #[test]
    fn test_add_is_idempotent() {
        let mut cr = registry("image-registry");
        assert!(add_finalizer(&mut cr));
        assert!(!add_finalizer(&mut cr));
        assert_eq!(cr.finalizers().len(), 1);
    }

    #[test]
    fn test_remove_keeps_foreign_finalizers() {
        let mut cr = registry("image-registry");
        cr.finalizers_mut().push("example.com/other".to_string());
        add_finalizer(&mut cr);

        assert!(remove_finalizer(&mut cr));
        assert!(!remove_finalizer(&mut cr));
        assert_eq!(cr.finalizers(), &["example.com/other".to_string()]);
    }
}
