use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for the harness library.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to create client: {}", source))]
    ClientCreate { source: kube::Error },

    #[snafu(display("Cluster '{}' has already been torn down", cluster))]
    ClusterTornDown { cluster: String },

    #[snafu(display("Unable to install component '{}': {}", component, source))]
    Component {
        component: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("Error creating {}: {}", what, source))]
    Create { what: String, source: kube::Error },

    #[snafu(display("Unable to load credentials: {}", source))]
    Creds { source: crate::creds::Error },

    #[snafu(display("{} not set", key))]
    EnvNotSet { key: String },

    #[snafu(display("Unable to open '{}': {}", path.display(), source))]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Expected '<namespace>/<name>', got '{}'", value))]
    InvalidWorkload { value: String },

    #[snafu(display("Unable to {}: {}", action, source))]
    Io {
        action: String,
        source: std::io::Error,
    },

    #[snafu(display(
        "'{}' failed with exit status '{}'\n\n{}\n\n{}",
        command,
        code,
        stdout,
        stderr
    ))]
    KindCommand {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[snafu(display("Unable to {}: {}", action, source))]
    Kube { action: String, source: kube::Error },

    #[snafu(display("Unable to create client from kubeconfig: {}", source))]
    KubeconfigClient {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Unable to read kubeconfig: {}", source))]
    KubeconfigRead {
        source: kube::config::KubeconfigError,
    },

    #[snafu(display("Manifest document in component '{}' has no 'kind' field", component))]
    MissingKind { component: String },

    #[snafu(display("non utf-8 path '{}'", path.display()))]
    NonUtf8Path { path: PathBuf },

    #[snafu(display(
        "Deployment '{}/{}' did not become ready within {}s",
        namespace,
        name,
        timeout_secs
    ))]
    ReadyTimeout {
        namespace: String,
        name: String,
        timeout_secs: u64,
    },

    #[snafu(display("Unable to {}: {}", action, source))]
    SerdeYaml {
        action: String,
        source: serde_yaml::Error,
    },

    #[snafu(display("Error streaming logs to '{}': {}", path.display(), error))]
    Stream { path: PathBuf, error: String },

    #[snafu(display("Unsupported kind '{}' in component '{}'", kind, component))]
    UnsupportedKind { kind: String, component: String },
}
