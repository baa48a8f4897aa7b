use anyhow::{Context, Result};
use clap::Parser;
use clustertest_harness::Cluster;

/// Delete a management cluster left behind by an aborted run.
#[derive(Debug, Parser)]
pub(crate) struct Teardown {
    /// Name of the kind cluster to delete.
    #[clap(long = "cluster-name")]
    cluster_name: String,
}

impl Teardown {
    pub(crate) async fn run(self) -> Result<()> {
        Cluster::delete(&self.cluster_name)
            .with_context(|| format!("Unable to delete cluster '{}'", self.cluster_name))?;
        println!("cluster '{}' was deleted.", self.cluster_name);
        Ok(())
    }
}
