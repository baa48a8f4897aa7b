/*!

The `logs` module captures live logs from a deployment's pods into per-pod files under the
artifacts directory, laid out as `<artifacts>/logs/<workload>/<pod>/<container>.log`.

A watcher runs as a supervised background task: it waits for the deployment to become ready,
discovers its pods through the deployment's label selector, and copies each matching container's
following log stream into its own sink file. Each (pod, container) pair is an independent unit of
work, so a failed or slow stream never stops capture for the others, and a watcher failure is
logged rather than propagated into the suite.

!*/

use crate::constants::{DEFAULT_POLL_INTERVAL, DEFAULT_READY_TIMEOUT, LOGS_DIR, MANAGER_CONTAINER};
use crate::error::{self, Result};
use crate::readiness::{wait_ready, DeploymentSource, ReadyCriteria, WorkloadRef};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{ListParams, LogParams};
use kube::{Api, Client, ResourceExt};
use log::{debug, error, warn};
use snafu::ResultExt;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

/// Captures the logs of one deployment's pods into the artifacts directory.
pub struct LogWatcher {
    client: Client,
    artifacts: PathBuf,
    criteria: ReadyCriteria,
    timeout: Duration,
    interval: Duration,
}

impl LogWatcher {
    pub fn new(client: Client, artifacts: PathBuf) -> Self {
        Self {
            client,
            artifacts,
            criteria: ReadyCriteria::AnyReady,
            timeout: DEFAULT_READY_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_criteria(mut self, criteria: ReadyCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_timing(mut self, timeout: Duration, interval: Duration) -> Self {
        self.timeout = timeout;
        self.interval = interval;
        self
    }

    /// Launch the watcher as a supervised background task. Failures are caught at the task
    /// boundary and logged; they never become suite failures.
    pub fn spawn(self, workload: WorkloadRef) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.watch(&workload).await {
                error!("Log watcher for deployment '{}' stopped: {}", workload, e);
            }
        })
    }

    /// Wait for `workload` to become ready, then stream the logs of every matching pod's manager
    /// container into its sink file. Returns after every stream has closed.
    pub async fn watch(&self, workload: &WorkloadRef) -> Result<()> {
        let source = DeploymentSource::new(self.client.clone());
        wait_ready(&source, workload, self.criteria, self.timeout, self.interval).await?;

        let deployments: Api<Deployment> =
            Api::namespaced(self.client.clone(), &workload.namespace);
        let deployment = deployments
            .get(&workload.name)
            .await
            .context(error::KubeSnafu {
                action: format!("get deployment '{}'", workload),
            })?;

        let spec = deployment.spec.unwrap_or_default();
        // An empty label selector would match every pod in the namespace, not the deployment's.
        let selector = match selector_string(&spec.selector) {
            Some(selector) => selector,
            None => {
                warn!(
                    "Deployment '{}' has no match labels, skipping log capture",
                    workload
                );
                return Ok(());
            }
        };
        let containers: Vec<String> = spec
            .template
            .spec
            .map(|pod_spec| {
                pod_spec
                    .containers
                    .into_iter()
                    .map(|container| container.name)
                    // Only the main workload process is captured, sidecars are skipped.
                    .filter(|name| name == MANAGER_CONTAINER)
                    .collect()
            })
            .unwrap_or_default();

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &workload.namespace);
        let pod_names: Vec<String> = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .context(error::KubeSnafu {
                action: format!("list pods of deployment '{}'", workload),
            })?
            .into_iter()
            .map(|pod| pod.name_any())
            .collect();

        let mut units = Vec::new();
        for pod_name in pod_names {
            for container in &containers {
                let path = sink_path(&self.artifacts, &workload.name, &pod_name, container);
                let params = LogParams {
                    container: Some(container.clone()),
                    follow: true,
                    ..Default::default()
                };
                // One unit's failure to attach must not abort capture for other units.
                let stream = match pods.log_stream(&pod_name, &params).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("Unable to open log stream for pod '{}': {}", pod_name, e);
                        continue;
                    }
                };
                units.push(tokio::spawn(async move {
                    copy_stream_to_sink(stream, &path).await
                }));
            }
        }

        for unit in units {
            match unit.await {
                Ok(Ok(copied)) => debug!("Copied {} log byte(s)", copied),
                Ok(Err(e)) => warn!("{}", e),
                Err(e) => warn!("Log copy task did not complete: {}", e),
            }
        }
        Ok(())
    }
}

/// The sink file for one (workload, pod, container) log stream.
pub fn sink_path(artifacts: &Path, workload_name: &str, pod: &str, container: &str) -> PathBuf {
    artifacts
        .join(LOGS_DIR)
        .join(workload_name)
        .join(pod)
        .join(format!("{}.log", container))
}

/// Copy a log stream into an append-mode sink file, creating parent directories on demand.
///
/// A benign "unexpected EOF" from the stream means the pod terminated; the copy completes normally
/// and the bytes already written remain in the sink. Any other stream error is escalated.
pub async fn copy_stream_to_sink<S, E>(stream: S, path: &Path) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Display,
{
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context(error::FileSnafu { path: parent })?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .context(error::FileSnafu { path })?;

    futures::pin_mut!(stream);
    let mut copied = 0u64;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                file.write_all(&bytes)
                    .await
                    .context(error::FileSnafu { path })?;
                copied += bytes.len() as u64;
            }
            // The pod went away mid-follow; treat it as a normal stream closure.
            Err(e) if is_benign_eof(&e) => break,
            Err(e) => {
                let _ = file.flush().await;
                return error::StreamSnafu {
                    path,
                    error: e.to_string(),
                }
                .fail();
            }
        }
    }
    file.flush().await.context(error::FileSnafu { path })?;
    Ok(copied)
}

/// The label selector for a deployment's pods, or `None` when the deployment carries no match
/// labels to select by.
fn selector_string(selector: &LabelSelector) -> Option<String> {
    let labels: Vec<String> = selector
        .match_labels
        .iter()
        .flatten()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    if labels.is_empty() {
        None
    } else {
        Some(labels.join(","))
    }
}

fn is_benign_eof<E>(error: &E) -> bool
where
    E: Display,
{
    let message = error.to_string();
    message.contains("unexpected EOF") || message.contains("unexpected end of file")
}
