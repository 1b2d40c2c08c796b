//! In-process object store backend
//!
//! Tracks buckets and containers in memory. Stands in for the cloud object
//! store SDKs, which the operator does not link.

use crate::domain::ports::{StorageBackend, StorageLocation};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

/// Internal tracking of provisioned locations
#[derive(Debug, Clone)]
struct LocationState {
    created_at: DateTime<Utc>,
}

/// Object store backend holding locations in memory
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    locations: DashMap<StorageLocation, LocationState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of tracked locations
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Creation time of a location
    pub fn created_at(&self, location: &StorageLocation) -> Option<DateTime<Utc>> {
        self.locations.get(location).map(|s| s.created_at)
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn exists(&self, location: &StorageLocation) -> Result<bool> {
        Ok(self.locations.contains_key(location))
    }

    async fn create(&self, location: &StorageLocation) -> Result<bool> {
        if self.locations.contains_key(location) {
            return Ok(false);
        }
        self.locations.insert(
            location.clone(),
            LocationState {
                created_at: Utc::now(),
            },
        );
        debug!(location = %location, "Created in-memory location");
        Ok(true)
    }

    async fn delete(&self, location: &StorageLocation) -> Result<()> {
        if self.locations.remove(location).is_some() {
            debug!(location = %location, "Deleted in-memory location");
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::StorageKind;

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let backend = InMemoryBackend::new();
        let loc = StorageLocation::new(StorageKind::S3, "registry-bucket");

        assert!(backend.create(&loc).await.unwrap());
        assert!(!backend.create(&loc).await.unwrap());
        assert_eq!(backend.len(), 1);
        assert!(backend.created_at(&loc).is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let backend = InMemoryBackend::new();
        let loc = StorageLocation::new(StorageKind::Gcs, "registry-bucket");

        backend.delete(&loc).await.unwrap();
        backend.create(&loc).await.unwrap();
        backend.delete(&loc).await.unwrap();
        assert!(!backend.exists(&loc).await.unwrap());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_locations_differ_by_region() {
        let backend = InMemoryBackend::new();
        let east = StorageLocation::new(StorageKind::S3, "registry-bucket").with_region(Some("us-east-1".into()));
        let west = StorageLocation::new(StorageKind::S3, "registry-bucket").with_region(Some("us-west-2".into()));

        assert!(tokio_test::block_on(backend.create(&east)).unwrap());
        assert!(!tokio_test::block_on(backend.exists(&west)).unwrap());
    }
}
