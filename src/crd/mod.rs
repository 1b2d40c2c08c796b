//! Custom Resource Definitions for the Image Registry Operator
//!
//! - ImageRegistry: the singleton managed object per namespace
//! - ClusterOperator: cluster-wide operator health

pub mod cluster_operator;
pub mod image_registry;

pub use cluster_operator::*;
pub use image_registry::*;
