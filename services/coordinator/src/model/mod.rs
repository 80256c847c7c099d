//! Coordinator data model module.
//!
//! # Purpose
//! Re-exports the persisted entities (clusters, resources, global resources
//! and their per-cluster state rows) shared by the API and store layers.
mod cluster;
mod global_resource;
mod resource;

pub use cluster::{Cluster, ClusterApiKey};
pub use global_resource::{
    ClusterSyncStatus, GlobalResource, GlobalResourceKey, GlobalResourceSyncStatus,
    GlobalResourceSyncedState, NewGlobalResource,
};
pub use resource::{
    AppliedStateUpdate, AppliedStatus, CurrentStateUpdate, NewResource, Resource,
    ResourceAppliedState, ResourceCurrentState, ResourceKey, ResourceWithState,
};
