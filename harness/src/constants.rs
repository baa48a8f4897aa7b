use std::time::Duration;

// Environment variables
pub const ENV_ARTIFACTS: &str = "ARTIFACTS";
pub const ENV_CREDENTIALS_FILE: &str = "AZURE_CREDENTIALS";
pub const ENV_MANAGER_IMAGE: &str = "MANAGER_IMAGE";

// The container whose logs we capture. Sidecars are skipped.
pub const MANAGER_CONTAINER: &str = "manager";

// Subdirectory of the artifacts directory that receives captured logs.
pub const LOGS_DIR: &str = "logs";

// Default cluster and workload parameters
pub const DEFAULT_CLUSTER_NAME: &str = "mgmt";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_LOCATION: &str = "westus2";
pub const DEFAULT_VM_SIZE: &str = "Standard_B2ms";
pub const DEFAULT_K8S_VERSION: &str = "v1.16.2";
pub const DEFAULT_IMAGE_OFFER: &str = "capi";
pub const DEFAULT_IMAGE_PUBLISHER: &str = "cncf-upstream";
pub const DEFAULT_IMAGE_SKU: &str = "k8s-1dot16-ubuntu-1804";
pub const DEFAULT_IMAGE_VERSION: &str = "latest";

// Default readiness polling parameters
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
