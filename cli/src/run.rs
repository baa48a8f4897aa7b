use anyhow::{Context, Result};
use clap::Parser;
use clustertest_harness::components::{Component, CredentialSecretComponent, ManifestComponent};
use clustertest_harness::{
    wait_ready, DeploymentSource, JunitReport, SuiteConfig, SuiteController, WorkloadRef,
};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Instant;

/// Run a full suite lifecycle: load credentials, create the management cluster, install the
/// declared components, wait for the watched workloads to become ready while capturing their logs,
/// then tear the cluster down and write the JUnit report.
#[derive(Debug, Parser)]
pub(crate) struct Run {
    /// Name used in the JUnit report filename.
    #[clap(long = "suite-name", default_value = "e2e_suite")]
    suite_name: String,

    /// Parallel worker index used in the JUnit report filename.
    #[clap(long = "worker-index", default_value = "1")]
    worker_index: usize,

    /// Name of the kind cluster to create.
    #[clap(long = "cluster-name")]
    cluster_name: Option<String>,

    /// A component to install, as `<name>=<path/to/manifest.yaml>`. May be repeated; components
    /// are installed in order.
    #[clap(long = "component", parse(try_from_str = parse_component))]
    components: Vec<(String, PathBuf)>,

    /// Create a secret with this name from the loaded credentials before installing components.
    #[clap(long = "credential-secret")]
    credential_secret: Option<String>,

    /// A deployment to validate and stream logs from, as `<namespace>/<name>`. May be repeated.
    #[clap(long = "watch")]
    watch: Vec<WorkloadRef>,

    /// Leave the cluster running after the suite for debugging.
    #[clap(long = "keep-cluster")]
    keep_cluster: bool,
}

impl Run {
    pub(crate) async fn run(self) -> Result<()> {
        let mut config = SuiteConfig::new(&self.suite_name);
        config.worker_index = self.worker_index;
        if let Some(cluster_name) = &self.cluster_name {
            config.cluster_name = cluster_name.clone();
        }
        let mut controller = SuiteController::new(config);
        let mut report = JunitReport::new(&self.suite_name);

        let mut components: Vec<Box<dyn Component>> = Vec::new();
        if let Some(secret_name) = &self.credential_secret {
            components.push(Box::new(CredentialSecretComponent::new(
                secret_name,
                &controller.config().namespace,
            )));
        }
        for (name, path) in &self.components {
            let component = ManifestComponent::from_file(name, path)
                .await
                .with_context(|| format!("Unable to read component '{}'", name))?;
            components.push(Box::new(component));
        }

        let started = Instant::now();
        let setup = controller.set_up(&components).await;
        report.record(
            "set_up",
            started.elapsed(),
            setup.as_ref().err().map(|e| e.to_string()),
        );

        if let Ok(mut cluster) = setup {
            for workload in &self.watch {
                if let Err(e) = controller.watch(&cluster, workload.clone()).await {
                    warn!("Unable to watch deployment '{}': {}", workload, e);
                }
            }

            // Health validation: every watched workload must reach the ready state.
            if !self.watch.is_empty() {
                let source = DeploymentSource::new(cluster.k8s_client().await?);
                for workload in &self.watch {
                    let started = Instant::now();
                    let ready = wait_ready(
                        &source,
                        workload,
                        controller.config().ready_criteria,
                        controller.config().ready_timeout,
                        controller.config().poll_interval,
                    )
                    .await;
                    report.record(
                        format!("ready {}", workload),
                        started.elapsed(),
                        ready.err().map(|e| e.to_string()),
                    );
                }
            }

            if self.keep_cluster {
                info!("Leaving cluster '{}' running", cluster.name());
                cluster.keep();
            } else {
                let started = Instant::now();
                let teardown = controller.tear_down(&mut cluster).await;
                report.record(
                    "tear_down",
                    started.elapsed(),
                    teardown.err().map(|e| e.to_string()),
                );
            }
        }

        let report_path = controller.report_path();
        report
            .write(&report_path)
            .await
            .with_context(|| format!("Unable to write report to '{}'", report_path.display()))?;
        info!("Wrote report to '{}'", report_path.display());

        if report.has_failures() {
            anyhow::bail!("e2e suite failed; see '{}'", report_path.display());
        }
        Ok(())
    }
}

fn parse_component(s: &str) -> Result<(String, PathBuf)> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => anyhow::bail!("expected '<name>=<path/to/manifest.yaml>', got '{}'", s),
    }
}
