/*!

The `cluster` module owns the ephemeral management cluster for a suite run. A [`Cluster`]
represents one `kind` cluster: it is created once at suite start, hands out API clients while it is
alive, and is torn down exactly once at suite end. If a created cluster is never explicitly torn
down, `Drop` deletes it on a best-effort basis so that a failed setup does not leak clusters.

!*/

use crate::error::{self, Result};
use crate::settings::Settings;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use log::info;
use snafu::{ensure, OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub const KUBECONFIG_FILENAME: &str = "kubeconfig.yaml";

/// An ephemeral `kind` management cluster.
#[derive(Debug)]
pub struct Cluster {
    name: String,
    kubeconfig_dir: TempDir,
    torn_down: bool,
}

impl Cluster {
    /// Create a `kind` cluster named `name` and, when `manager_image` is given, side-load that
    /// image into the cluster's nodes. If a cluster named `name` already exists, it is deleted
    /// first.
    pub fn create(name: &str, manager_image: Option<&str>) -> Result<Cluster> {
        let kubeconfig_dir = TempDir::new().context(error::IoSnafu {
            action: "create kubeconfig temp dir",
        })?;
        Self::delete_kind_cluster(name)?;
        Self::create_kind_cluster(name, &kubeconfig_dir.path().join(KUBECONFIG_FILENAME))?;
        let cluster = Self {
            name: name.into(),
            kubeconfig_dir,
            torn_down: false,
        };
        if let Some(image) = manager_image {
            cluster.load_image(image)?;
        }
        Ok(cluster)
    }

    /// The cluster's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the path to the kubeconfig file in the `TempDir` created for the cluster.
    pub fn kubeconfig(&self) -> PathBuf {
        self.kubeconfig_dir.path().join(KUBECONFIG_FILENAME)
    }

    /// Uses `kind load` to load an image from the machine into the cluster.
    pub fn load_image(&self, image_name: &str) -> Result<()> {
        ensure!(
            !self.torn_down,
            error::ClusterTornDownSnafu { cluster: &self.name }
        );
        info!("Loading image '{}' into cluster '{}'", image_name, self.name);
        let output = Command::new(Settings::kind_path())
            .arg("load")
            .arg("docker-image")
            .arg(image_name)
            .arg("--name")
            .arg(&self.name)
            .output()
            .context(error::IoSnafu {
                action: "run 'kind load docker-image'",
            })?;
        ensure!(
            output.status.success(),
            error::KindCommandSnafu {
                command: "kind load docker-image",
                code: output.status.code().unwrap_or(1),
                stdout: String::from_utf8_lossy(&output.stdout),
                stderr: String::from_utf8_lossy(&output.stderr),
            }
        );
        Ok(())
    }

    /// Create the k8s client for the cluster. Fails if the cluster has been torn down.
    pub async fn k8s_client(&self) -> Result<Client> {
        ensure!(
            !self.torn_down,
            error::ClusterTornDownSnafu { cluster: &self.name }
        );
        let kubeconfig =
            Kubeconfig::read_from(self.kubeconfig()).context(error::KubeconfigReadSnafu)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context(error::KubeconfigClientSnafu)?;
        config.try_into().context(error::ClientCreateSnafu)
    }

    /// Release the cluster's resources by deleting the `kind` cluster. A second call returns a
    /// `ClusterTornDown` error without running any command.
    pub fn teardown(&mut self) -> Result<()> {
        ensure!(
            !self.torn_down,
            error::ClusterTornDownSnafu { cluster: &self.name }
        );
        // Mark before deleting so that a failed delete is not retried by `Drop`.
        self.torn_down = true;
        Self::delete_kind_cluster(&self.name)
    }

    /// Consume the handle without deleting the cluster, e.g. to leave it running for debugging.
    /// The cluster must then be reclaimed with [`Cluster::delete`].
    pub fn keep(mut self) {
        self.torn_down = true;
    }

    /// Delete a `kind` cluster by name, e.g. to reclaim a cluster left behind by an aborted run.
    pub fn delete(name: &str) -> Result<()> {
        Self::delete_kind_cluster(name)
    }

    fn create_kind_cluster(name: &str, kubeconfig: &Path) -> Result<()> {
        let output = Command::new(Settings::kind_path())
            .arg("--kubeconfig")
            .arg(
                kubeconfig
                    .to_str()
                    .context(error::NonUtf8PathSnafu { path: kubeconfig })?,
            )
            .arg("create")
            .arg("cluster")
            .arg("--name")
            .arg(name)
            .output()
            .context(error::IoSnafu {
                action: "run 'kind create cluster'",
            })?;
        ensure!(
            output.status.success(),
            error::KindCommandSnafu {
                command: "kind create cluster",
                code: output.status.code().unwrap_or(1),
                stdout: String::from_utf8_lossy(&output.stdout),
                stderr: String::from_utf8_lossy(&output.stderr),
            }
        );
        Ok(())
    }

    fn delete_kind_cluster(name: &str) -> Result<()> {
        let output = Command::new(Settings::kind_path())
            .arg("delete")
            .arg("cluster")
            .arg("--name")
            .arg(name)
            .output()
            .context(error::IoSnafu {
                action: "run 'kind delete cluster'",
            })?;
        ensure!(
            output.status.success(),
            error::KindCommandSnafu {
                command: "kind delete cluster",
                code: output.status.code().unwrap_or(1),
                stdout: String::from_utf8_lossy(&output.stdout),
                stderr: String::from_utf8_lossy(&output.stderr),
            }
        );
        Ok(())
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        if let Err(e) = Self::delete_kind_cluster(&self.name) {
            eprintln!("unable to delete kind cluster '{}': {}", self.name, e)
        }
    }
}
