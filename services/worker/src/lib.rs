//! Worker service library crate.
//!
//! # Purpose
//! The in-cluster half of the control plane: pulls desired state from the
//! coordinator, applies it to Kubernetes, and reports observed state back.
pub mod config;
pub mod global_syncer;
pub mod k8s;
pub mod observability;
pub mod reconciler;
pub mod supervisor;
pub mod watcher;
