/*!

The `components` module installs controller components into the management cluster. A component is
anything that can be applied to the cluster given an API client and the credential bundle; suite
setup installs the declared components in order and aborts on the first failure.

!*/

use crate::constants::DEFAULT_NAMESPACE;
use crate::creds::Credentials;
use crate::error::{self, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::Path;

/// One installable controller component. Implementations are black boxes to the suite; all it
/// needs is "install completed or failed".
#[async_trait::async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;
    async fn install(&self, client: &Client, creds: &Credentials) -> Result<()>;
}

/// A component declared as a multi-document YAML manifest. The supported kinds are the ones
/// controller deployments are made of: Namespace, CustomResourceDefinition, ServiceAccount,
/// ClusterRole, ClusterRoleBinding, Secret and Deployment.
pub struct ManifestComponent {
    name: String,
    manifest: String,
    namespace: String,
}

impl ManifestComponent {
    pub fn new<S1, S2>(name: S1, manifest: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            name: name.into(),
            manifest: manifest.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// The namespace applied to namespaced objects that do not carry one in their metadata.
    pub fn with_namespace<S>(mut self, namespace: S) -> Self
    where
        S: Into<String>,
    {
        self.namespace = namespace.into();
        self
    }

    pub async fn from_file<S>(name: S, path: &Path) -> Result<Self>
    where
        S: Into<String>,
    {
        let manifest = tokio::fs::read_to_string(path)
            .await
            .context(error::FileSnafu { path })?;
        Ok(Self::new(name, manifest))
    }
}

#[async_trait::async_trait]
impl Component for ManifestComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn install(&self, client: &Client, _creds: &Credentials) -> Result<()> {
        for object in parse_objects(&self.manifest, &self.name)? {
            debug!("Applying {} from component '{}'", object.kind(), self.name);
            match object {
                ManifestObject::Namespace(ns) => {
                    create_or_update(&Api::all(client.clone()), &ns, "namespace").await?
                }
                ManifestObject::CustomResourceDefinition(crd) => {
                    create_or_update(&Api::all(client.clone()), &*crd, "custom resource definition")
                        .await?
                }
                ManifestObject::ClusterRole(role) => {
                    create_or_update(&Api::all(client.clone()), &role, "cluster role").await?
                }
                ManifestObject::ClusterRoleBinding(binding) => {
                    create_or_update(&Api::all(client.clone()), &binding, "cluster role binding")
                        .await?
                }
                ManifestObject::ServiceAccount(account) => {
                    let namespace = account.namespace().unwrap_or_else(|| self.namespace.clone());
                    create_or_update(
                        &Api::namespaced(client.clone(), &namespace),
                        &account,
                        "service account",
                    )
                    .await?
                }
                ManifestObject::Secret(secret) => {
                    let namespace = secret.namespace().unwrap_or_else(|| self.namespace.clone());
                    create_or_update(&Api::namespaced(client.clone(), &namespace), &secret, "secret")
                        .await?
                }
                ManifestObject::Deployment(deployment) => {
                    let namespace = deployment
                        .namespace()
                        .unwrap_or_else(|| self.namespace.clone());
                    create_or_update(
                        &Api::namespaced(client.clone(), &namespace),
                        &*deployment,
                        "deployment",
                    )
                    .await?
                }
            }
        }
        Ok(())
    }
}

/// Materializes the credential bundle as an opaque secret so that infrastructure controllers can
/// mount it.
pub struct CredentialSecretComponent {
    name: String,
    namespace: String,
}

impl CredentialSecretComponent {
    pub fn new<S1, S2>(name: S1, namespace: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

#[async_trait::async_trait]
impl Component for CredentialSecretComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn install(&self, client: &Client, creds: &Credentials) -> Result<()> {
        let mut data = BTreeMap::new();
        data.insert("tenantId".to_string(), creds.tenant_id.clone());
        data.insert("subscriptionId".to_string(), creds.subscription_id.clone());
        data.insert("clientId".to_string(), creds.client_id.clone());
        data.insert("clientSecret".to_string(), creds.client_secret.clone());

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            string_data: Some(data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };

        create_or_update(
            &Api::namespaced(client.clone(), &self.namespace),
            &secret,
            "credential secret",
        )
        .await
    }
}

#[derive(Debug)]
pub(crate) enum ManifestObject {
    Namespace(Namespace),
    CustomResourceDefinition(Box<CustomResourceDefinition>),
    ServiceAccount(ServiceAccount),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    Secret(Secret),
    Deployment(Box<Deployment>),
}

impl ManifestObject {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Namespace(_) => "Namespace",
            Self::CustomResourceDefinition(_) => "CustomResourceDefinition",
            Self::ServiceAccount(_) => "ServiceAccount",
            Self::ClusterRole(_) => "ClusterRole",
            Self::ClusterRoleBinding(_) => "ClusterRoleBinding",
            Self::Secret(_) => "Secret",
            Self::Deployment(_) => "Deployment",
        }
    }
}

/// Parse a multi-document YAML manifest into typed objects.
pub(crate) fn parse_objects(manifest: &str, component: &str) -> Result<Vec<ManifestObject>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(document).context(error::SerdeYamlSnafu {
            action: "deserialize manifest",
        })?;
        if value.is_null() {
            continue;
        }
        let kind = value["kind"]
            .as_str()
            .context(error::MissingKindSnafu { component })?
            .to_string();
        let object = match kind.as_str() {
            "Namespace" => ManifestObject::Namespace(from_value(value, &kind)?),
            "CustomResourceDefinition" => {
                ManifestObject::CustomResourceDefinition(Box::new(from_value(value, &kind)?))
            }
            "ServiceAccount" => ManifestObject::ServiceAccount(from_value(value, &kind)?),
            "ClusterRole" => ManifestObject::ClusterRole(from_value(value, &kind)?),
            "ClusterRoleBinding" => ManifestObject::ClusterRoleBinding(from_value(value, &kind)?),
            "Secret" => ManifestObject::Secret(from_value(value, &kind)?),
            "Deployment" => ManifestObject::Deployment(Box::new(from_value(value, &kind)?)),
            _ => return error::UnsupportedKindSnafu { kind, component }.fail(),
        };
        objects.push(object);
    }
    Ok(objects)
}

fn from_value<T>(value: serde_yaml::Value, kind: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_yaml::from_value(value).context(error::SerdeYamlSnafu {
        action: format!("deserialize {}", kind),
    })
}

/// Retry attempts for creating or updating an object.
const MAX_RETRIES: i32 = 3;
/// Backoff between object creation/update retries.
const BACKOFF_MS: u64 = 500;

/// Create or update an existing k8s object.
pub(crate) async fn create_or_update<T>(api: &Api<T>, data: &T, what: &str) -> Result<()>
where
    T: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let mut error = None;

    for _ in 0..MAX_RETRIES {
        match create_or_update_internal(api, data, what).await {
            Ok(()) => return Ok(()),
            Err(e) => error = Some(e),
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(BACKOFF_MS)).await;
    }
    match error {
        None => Ok(()),
        Some(error) => Err(error),
    }
}

async fn create_or_update_internal<T>(api: &Api<T>, data: &T, what: &str) -> Result<()>
where
    T: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    // If the object already exists, update it with the new one using a `Patch`. If not, create it.
    match api.get(&data.name_any()).await {
        Ok(existing) => {
            debug!("Updating existing {} '{}'", what, existing.name_any());
            api.patch(
                &existing.name_any(),
                &PatchParams::default(),
                &Patch::Merge(data),
            )
            .await
        }
        Err(_err) => api.create(&PostParams::default(), data).await,
    }
    .context(error::CreateSnafu { what })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;

    const MANIFEST: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: capz-system
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: capz-manager
  namespace: capz-system
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: capz-controller-manager
  namespace: capz-system
spec:
  replicas: 1
  selector:
    matchLabels:
      control-plane: capz-controller-manager
  template:
    metadata:
      labels:
        control-plane: capz-controller-manager
    spec:
      containers:
        - name: manager
          image: example.com/capz:latest
"#;

    #[test]
    fn parse_typed_objects_from_manifest() {
        let objects = parse_objects(MANIFEST, "infra").unwrap();
        let kinds: Vec<&str> = objects.iter().map(|object| object.kind()).collect();
        assert_eq!(kinds, vec!["Namespace", "ServiceAccount", "Deployment"]);

        match &objects[2] {
            ManifestObject::Deployment(deployment) => {
                assert_eq!(deployment.name_any(), "capz-controller-manager");
                assert_eq!(deployment.namespace().unwrap(), "capz-system");
            }
            other => panic!("expected a deployment, got {}", other.kind()),
        }
    }

    #[test]
    fn unsupported_kind_is_an_error() {
        let manifest = "kind: DaemonSet\nmetadata:\n  name: nope\n";
        let error = parse_objects(manifest, "infra").unwrap_err();
        assert!(error.to_string().contains("DaemonSet"));
        assert!(error.to_string().contains("infra"));
    }

    #[test]
    fn document_without_kind_is_an_error() {
        let manifest = "metadata:\n  name: nope\n";
        let error = parse_objects(manifest, "infra").unwrap_err();
        assert!(error.to_string().contains("kind"));
    }

    #[test]
    fn empty_documents_are_skipped() {
        let manifest = "---\n---\napiVersion: v1\nkind: Namespace\nmetadata:\n  name: only\n";
        let objects = parse_objects(manifest, "infra").unwrap();
        assert_eq!(objects.len(), 1);
    }
}
