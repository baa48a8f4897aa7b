/*!

The `readiness` module blocks until a deployment reaches a ready state. Polling runs at a fixed
interval with a deadline; the ready predicate is a [`ReadyCriteria`] so that callers can choose
between the lenient bootstrap check (any replica ready) and a full-rollout check. Status comes from
a [`StatusSource`] so that tests can drive the loop with a scripted source and a paused clock.

!*/

use crate::error::{self, Result};
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client};
use log::{debug, info};
use snafu::{ensure, ResultExt};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// A `(namespace, name)` pair identifying a managed workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    pub fn new<S1, S2>(namespace: S1, name: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for WorkloadRef {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => error::InvalidWorkloadSnafu { value: s }.fail(),
        }
    }
}

/// The replica counts observed for a workload at one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaCounts {
    pub ready: i32,
    pub desired: i32,
}

/// The predicate that decides when a workload counts as ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyCriteria {
    /// At least one replica is ready. This is a lenient bootstrap check, not a rollout guarantee.
    AnyReady,
    /// At least this many replicas are ready.
    AtLeast(i32),
    /// Every desired replica is ready.
    AllDesired,
}

impl ReadyCriteria {
    pub fn is_met(&self, counts: &ReplicaCounts) -> bool {
        match self {
            Self::AnyReady => counts.ready > 0,
            Self::AtLeast(required) => counts.ready >= *required,
            Self::AllDesired => counts.desired > 0 && counts.ready >= counts.desired,
        }
    }
}

impl Default for ReadyCriteria {
    fn default() -> Self {
        Self::AnyReady
    }
}

/// A source of replica counts for a workload.
#[async_trait::async_trait]
pub trait StatusSource {
    async fn replica_counts(&self, workload: &WorkloadRef) -> Result<ReplicaCounts>;
}

/// The `StatusSource` for deployments, backed by the cluster's API.
#[derive(Clone)]
pub struct DeploymentSource {
    client: Client,
}

impl DeploymentSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl StatusSource for DeploymentSource {
    async fn replica_counts(&self, workload: &WorkloadRef) -> Result<ReplicaCounts> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &workload.namespace);
        let deployment = api.get(&workload.name).await.context(error::KubeSnafu {
            action: format!("get deployment '{}'", workload),
        })?;
        Ok(ReplicaCounts {
            ready: deployment
                .status
                .as_ref()
                .and_then(|status| status.ready_replicas)
                .unwrap_or_default(),
            // An unset replica count means one replica.
            desired: deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(1),
        })
    }
}

/// Poll `source` at `interval` until `criteria` holds for `workload`, returning the ready count.
///
/// A status fetch error terminates the wait immediately; it is distinct from "not yet ready".
/// When `timeout` elapses first, the error names the workload so operators can see which resource
/// failed to stabilize.
pub async fn wait_ready<S>(
    source: &S,
    workload: &WorkloadRef,
    criteria: ReadyCriteria,
    timeout: Duration,
    interval: Duration,
) -> Result<i32>
where
    S: StatusSource,
{
    let deadline = Instant::now() + timeout;
    loop {
        let counts = source.replica_counts(workload).await?;
        if criteria.is_met(&counts) {
            info!(
                "Deployment '{}' is ready with {} replica(s)",
                workload, counts.ready
            );
            return Ok(counts.ready);
        }
        debug!(
            "Deployment '{}' has {}/{} ready replica(s), waiting",
            workload, counts.ready, counts.desired
        );
        ensure!(
            Instant::now() < deadline,
            error::ReadyTimeoutSnafu {
                namespace: &workload.namespace,
                name: &workload.name,
                timeout_secs: timeout.as_secs(),
            }
        );
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// A `StatusSource` that replays a scripted sequence of polls, repeating the last entry once
    /// the script runs out.
    struct ScriptedSource {
        polls: Mutex<VecDeque<Result<ReplicaCounts>>>,
        last: ReplicaCounts,
    }

    impl ScriptedSource {
        fn new<I>(polls: I) -> Self
        where
            I: IntoIterator<Item = Result<ReplicaCounts>>,
        {
            Self {
                polls: Mutex::new(polls.into_iter().collect()),
                last: counts(0, 1),
            }
        }
    }

    #[async_trait::async_trait]
    impl StatusSource for ScriptedSource {
        async fn replica_counts(&self, _workload: &WorkloadRef) -> Result<ReplicaCounts> {
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(self.last))
        }
    }

    fn counts(ready: i32, desired: i32) -> ReplicaCounts {
        ReplicaCounts { ready, desired }
    }

    fn workload() -> WorkloadRef {
        WorkloadRef::new("default", "demo")
    }

    const TIMEOUT: Duration = Duration::from_secs(300);
    const INTERVAL: Duration = Duration::from_secs(15);

    #[tokio::test(start_paused = true)]
    async fn ready_immediately_returns_without_sleeping() {
        let source = ScriptedSource::new([Ok(counts(1, 1))]);
        let start = Instant::now();
        let ready = wait_ready(&source, &workload(), ReadyCriteria::AnyReady, TIMEOUT, INTERVAL)
            .await
            .unwrap();
        assert_eq!(ready, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_at_third_poll_returns_at_second_interval() {
        let source = ScriptedSource::new([Ok(counts(0, 1)), Ok(counts(0, 1)), Ok(counts(1, 1))]);
        let start = Instant::now();
        let ready = wait_ready(&source, &workload(), ReadyCriteria::AnyReady, TIMEOUT, INTERVAL)
            .await
            .unwrap();
        assert_eq!(ready, 1);
        // The transition is observed at the second interval boundary, never before.
        assert_eq!(start.elapsed(), INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_times_out_at_the_deadline() {
        let source = ScriptedSource::new(Vec::new());
        let start = Instant::now();
        let error = wait_ready(&source, &workload(), ReadyCriteria::AnyReady, TIMEOUT, INTERVAL)
            .await
            .unwrap_err();
        let elapsed = start.elapsed();
        assert!(elapsed >= TIMEOUT);
        assert!(elapsed <= TIMEOUT + INTERVAL);
        // The error identifies the workload that failed to stabilize.
        assert!(error.to_string().contains("default/demo"));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_error_terminates_immediately() {
        let source = ScriptedSource::new([
            error::EnvNotSetSnafu { key: "BOOM" }.fail(),
            Ok(counts(1, 1)),
        ]);
        let start = Instant::now();
        let result =
            wait_ready(&source, &workload(), ReadyCriteria::AnyReady, TIMEOUT, INTERVAL).await;
        assert!(result.is_err());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn all_desired_waits_for_full_rollout() {
        let source = ScriptedSource::new([Ok(counts(1, 2)), Ok(counts(2, 2))]);
        let ready = wait_ready(
            &source,
            &workload(),
            ReadyCriteria::AllDesired,
            TIMEOUT,
            INTERVAL,
        )
        .await
        .unwrap();
        assert_eq!(ready, 2);
    }

    #[test]
    fn criteria_any_ready_is_lenient() {
        assert!(ReadyCriteria::AnyReady.is_met(&counts(1, 3)));
        assert!(!ReadyCriteria::AnyReady.is_met(&counts(0, 3)));
    }

    #[test]
    fn criteria_at_least() {
        assert!(ReadyCriteria::AtLeast(2).is_met(&counts(2, 3)));
        assert!(!ReadyCriteria::AtLeast(2).is_met(&counts(1, 3)));
    }

    #[test]
    fn workload_ref_parses_namespace_and_name() {
        let workload: WorkloadRef = "capz-system/capz-controller-manager".parse().unwrap();
        assert_eq!(workload.namespace, "capz-system");
        assert_eq!(workload.name, "capz-controller-manager");
        assert!("no-slash".parse::<WorkloadRef>().is_err());
        assert!("/missing-namespace".parse::<WorkloadRef>().is_err());
    }
}
