/*!

The `suite` module coordinates a whole e2e suite run: load credentials, create the management
cluster, install the declared components, optionally watch workload logs in the background, and
tear the cluster down at the end. The [`SuiteController`] owns the suite configuration and the
spawned watcher tasks; there is no package-level shared state.

!*/

use crate::cluster::Cluster;
use crate::components::Component;
use crate::constants::{
    DEFAULT_CLUSTER_NAME, DEFAULT_IMAGE_OFFER, DEFAULT_IMAGE_PUBLISHER, DEFAULT_IMAGE_SKU,
    DEFAULT_IMAGE_VERSION, DEFAULT_K8S_VERSION, DEFAULT_LOCATION, DEFAULT_NAMESPACE,
    DEFAULT_POLL_INTERVAL, DEFAULT_READY_TIMEOUT, DEFAULT_VM_SIZE, ENV_ARTIFACTS,
    ENV_MANAGER_IMAGE,
};
use crate::error::{self, Result};
use crate::logs::LogWatcher;
use crate::readiness::{ReadyCriteria, WorkloadRef};
use crate::report;
use crate::Credentials;
use log::info;
use snafu::{OptionExt, ResultExt};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

/// The image fields used when creating workload clusters.
#[derive(Debug, Clone)]
pub struct ImageReference {
    pub offer: String,
    pub publisher: String,
    pub sku: String,
    pub version: String,
}

impl Default for ImageReference {
    fn default() -> Self {
        Self {
            offer: DEFAULT_IMAGE_OFFER.to_string(),
            publisher: DEFAULT_IMAGE_PUBLISHER.to_string(),
            sku: DEFAULT_IMAGE_SKU.to_string(),
            version: DEFAULT_IMAGE_VERSION.to_string(),
        }
    }
}

/// The explicit context for one suite run. Constructed once and passed by reference into setup and
/// teardown.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Name used in the report filename.
    pub suite_name: String,
    /// Parallel worker index used in the report filename.
    pub worker_index: usize,
    /// Where logs and the report are written. Read from `ARTIFACTS`, defaulting to the current
    /// directory.
    pub artifacts: PathBuf,
    /// Name of the management cluster.
    pub cluster_name: String,
    /// Namespace that workload clusters are created in.
    pub namespace: String,
    /// Region for workload clusters.
    pub location: String,
    /// Default instance size for workload cluster nodes.
    pub vm_size: String,
    /// Target platform version for workload clusters.
    pub k8s_version: String,
    /// Image selection fields for workload cluster nodes.
    pub image: ImageReference,
    /// The readiness predicate used when validating and watching workloads.
    pub ready_criteria: ReadyCriteria,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl SuiteConfig {
    pub fn new<S>(suite_name: S) -> Self
    where
        S: Into<String>,
    {
        let artifacts = std::env::var(ENV_ARTIFACTS)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            suite_name: suite_name.into(),
            worker_index: 1,
            artifacts,
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            vm_size: DEFAULT_VM_SIZE.to_string(),
            k8s_version: DEFAULT_K8S_VERSION.to_string(),
            image: ImageReference::default(),
            ready_criteria: ReadyCriteria::AnyReady,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Orchestrates suite setup and teardown, and supervises background log watchers.
pub struct SuiteController {
    config: SuiteConfig,
    watchers: Vec<JoinHandle<()>>,
}

impl SuiteController {
    pub fn new(config: SuiteConfig) -> Self {
        Self {
            config,
            watchers: Vec::new(),
        }
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// The report file for this suite run.
    pub fn report_path(&self) -> PathBuf {
        report::report_path(
            &self.config.artifacts,
            &self.config.suite_name,
            self.config.worker_index,
        )
    }

    /// Set up the suite: load and validate credentials, create the management cluster with the
    /// manager image from `MANAGER_IMAGE`, and install `components` in order. Any failure aborts
    /// setup and surfaces the underlying error; a cluster created before a later failure is
    /// reclaimed when the handle drops.
    pub async fn set_up(&self, components: &[Box<dyn Component>]) -> Result<Cluster> {
        info!("Loading credentials");
        let creds = Credentials::load().context(error::CredsSnafu)?;

        let manager_image = std::env::var(ENV_MANAGER_IMAGE)
            .ok()
            .filter(|value| !value.is_empty())
            .context(error::EnvNotSetSnafu {
                key: ENV_MANAGER_IMAGE,
            })?;

        info!(
            "Creating management cluster '{}'",
            self.config.cluster_name
        );
        let cluster = Cluster::create(&self.config.cluster_name, Some(&manager_image))?;
        let client = cluster.k8s_client().await?;

        for component in components {
            info!("Installing component '{}'", component.name());
            component
                .install(&client, &creds)
                .await
                .context(error::ComponentSnafu {
                    component: component.name(),
                })?;
        }

        Ok(cluster)
    }

    /// Launch a background log watcher for `workload`. The watcher's failures are logged, never
    /// propagated; its task handle is kept so teardown can cancel it.
    pub async fn watch(&mut self, cluster: &Cluster, workload: WorkloadRef) -> Result<()> {
        let client = cluster.k8s_client().await?;
        let watcher = LogWatcher::new(client, self.config.artifacts.clone())
            .with_criteria(self.config.ready_criteria)
            .with_timing(self.config.ready_timeout, self.config.poll_interval);
        self.watchers.push(watcher.spawn(workload));
        Ok(())
    }

    /// Tear down the suite. Outstanding watchers are cancelled (a watcher still mid-copy is
    /// expected and harmless), then the cluster is torn down exactly once. This must be the last
    /// action of the suite.
    pub async fn tear_down(&mut self, cluster: &mut Cluster) -> Result<()> {
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
        info!(
            "Tearing down management cluster '{}'",
            self.config.cluster_name
        );
        cluster.teardown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_the_suite_conventions() {
        let config = SuiteConfig::new("e2e_suite");
        assert_eq!(config.suite_name, "e2e_suite");
        assert_eq!(config.worker_index, 1);
        assert_eq!(config.namespace, "default");
        assert_eq!(config.ready_criteria, ReadyCriteria::AnyReady);
        assert_eq!(config.ready_timeout, Duration::from_secs(300));
        assert_eq!(config.poll_interval, Duration::from_secs(15));
    }

    #[test]
    fn report_path_uses_suite_name_and_worker_index() {
        let mut config = SuiteConfig::new("e2e_suite");
        config.artifacts = PathBuf::from("/tmp/art");
        config.worker_index = 2;
        let controller = SuiteController::new(config);
        assert_eq!(
            controller.report_path(),
            PathBuf::from("/tmp/art/junit.e2e_suite.2.xml")
        );
    }
}
