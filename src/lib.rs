//! convoy - multi-node cluster provisioning
//!
//! convoy reconciles a declared set of hosts and clusters into running
//! machines by driving external tools:
//!
//! - a host provisioning CLI (docker-machine compatible) for host lifecycle
//! - a cluster CLI for cluster creation and host identifiers
//! - a deploy agent, installed on hosts over ssh heredoc scripts
//!
//! Runs are serialized across processes with a marker-file lock.

pub mod cluster;
pub mod config;
pub mod error;
pub mod exec;
pub mod host;
pub mod lock;
pub mod orchestrator;
pub mod script;

pub use cluster::Cluster;
pub use config::{DeploymentContext, Manifest};
pub use error::{ConvoyError, Result};
pub use host::{Host, HostManager, Role};
pub use lock::FileLock;
pub use orchestrator::Orchestrator;
