// These tests require docker and kind. Enable them with `--features integ`.
#![cfg(feature = "integ")]

use clustertest_harness::{Cluster, Error};
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::Api;

#[tokio::test]
async fn create_use_and_teardown() {
    let mut cluster = Cluster::create("clustertest-integ", None).unwrap();

    // The cluster handle produces a working client while the cluster is alive.
    let client = cluster.k8s_client().await.unwrap();
    let nodes: Api<Node> = Api::all(client);
    let node_list = nodes.list(&ListParams::default()).await.unwrap();
    assert!(!node_list.items.is_empty());

    cluster.teardown().unwrap();

    // A second teardown is a well-defined error, and the handle no longer produces clients.
    assert!(matches!(
        cluster.teardown(),
        Err(Error::ClusterTornDown { .. })
    ));
    assert!(cluster.k8s_client().await.is_err());
}
