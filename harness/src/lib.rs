/*!

This library provides the lifecycle plumbing for end-to-end tests of controller components. It can
stand up an ephemeral `kind` management cluster, install controller components into it, wait for
deployments to become ready, capture their logs into an artifacts directory, and tear the cluster
down when the suite is finished.

The entry point for most callers is [`SuiteController`], which owns the suite configuration and
drives setup and teardown. The lower-level pieces ([`Cluster`], [`wait_ready`], [`LogWatcher`]) can
also be used independently.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use cluster::Cluster;
pub use creds::Credentials;
pub use error::{Error, Result};
pub use logs::LogWatcher;
pub use readiness::{
    wait_ready, DeploymentSource, ReadyCriteria, ReplicaCounts, StatusSource, WorkloadRef,
};
pub use report::JunitReport;
pub use suite::{ImageReference, SuiteConfig, SuiteController};

pub mod cluster;
pub mod components;
pub mod constants;
pub mod creds;
mod error;
pub mod logs;
pub mod readiness;
pub mod report;
mod settings;
pub mod suite;
