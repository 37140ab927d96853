//! kubefleet API library
//!
//! Multi-cluster management core: a registry of live Kubernetes cluster
//! connections, a generic resource operator dispatching CRUD calls to them by
//! name, and the persistence layer that survives restarts.

// Core modules
pub mod config;

// Application state
pub mod state;
pub use state::AppState;

// Account bootstrap and password hashing
pub mod auth;

// Cluster registry, health probing and resource operations
pub mod kubernetes;

// Database
pub mod db;

// Logging configuration
pub mod logging;

// Graceful shutdown handling
pub mod shutdown;
