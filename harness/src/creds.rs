/*!

The `creds` module loads the credential bundle that infrastructure components need in order to
manage cloud resources. Credentials come from `AZURE_*` environment variables, or from a JSON
credentials file when `AZURE_CREDENTIALS` points at one.

!*/

use crate::constants::ENV_CREDENTIALS_FILE;
use serde::Deserialize;
use snafu::{ensure, ResultExt, Snafu};
use std::path::{Path, PathBuf};

/// The set of fields required to authenticate with the cloud provider. A `Credentials` returned by
/// [`Credentials::load`] has been validated: all four fields are non-empty.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(alias = "tenantId")]
    pub tenant_id: String,
    #[serde(alias = "subscriptionId")]
    pub subscription_id: String,
    #[serde(alias = "clientId")]
    pub client_id: String,
    #[serde(alias = "clientSecret")]
    pub client_secret: String,
}

/// The public error type for credential loading.
#[derive(Debug, Snafu)]
pub struct Error(InnerError);
type Result<T> = std::result::Result<T, Error>;

/// The private error type for credential loading.
#[derive(Debug, Snafu)]
enum InnerError {
    #[snafu(display("Credentials field '{}' is empty", field))]
    EmptyField { field: &'static str },

    #[snafu(display("Unable to read credentials from the environment: {}", source))]
    Env { source: envy::Error },

    #[snafu(display("Unable to read credentials file '{}': {}", path.display(), source))]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse credentials file '{}': {}", path.display(), source))]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl Credentials {
    /// Load and validate credentials. When `AZURE_CREDENTIALS` is set it names a JSON credentials
    /// file; otherwise the individual `AZURE_*` environment variables are used.
    pub fn load() -> Result<Credentials> {
        let creds = match std::env::var(ENV_CREDENTIALS_FILE).ok() {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::from_env()?,
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Read credentials from `AZURE_TENANT_ID`, `AZURE_SUBSCRIPTION_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_CLIENT_SECRET`.
    pub fn from_env() -> Result<Credentials> {
        Ok(envy::prefixed("AZURE_")
            .from_env::<Credentials>()
            .context(EnvSnafu)?)
    }

    /// Read credentials from a JSON file in the shape produced by
    /// `az ad sp create-for-rbac --sdk-auth` (camelCase keys).
    pub fn from_file(path: &Path) -> Result<Credentials> {
        let contents = std::fs::read_to_string(path).context(FileSnafu { path })?;
        Ok(serde_json::from_str(&contents).context(ParseSnafu { path })?)
    }

    /// Ensure that every required field is non-empty. The error names the first missing field.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("tenant_id", &self.tenant_id),
            ("subscription_id", &self.subscription_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ];
        for (field, value) in fields {
            ensure!(!value.is_empty(), EmptyFieldSnafu { field });
        }
        Ok(())
    }
}

// The secret must not leak through debug formatting.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::io::Write;

    fn creds() -> Credentials {
        Credentials {
            tenant_id: "t".to_string(),
            subscription_id: "s".to_string(),
            client_id: "c".to_string(),
            client_secret: "verysecret".to_string(),
        }
    }

    #[test]
    fn validate_accepts_complete_bundle() {
        assert!(creds().validate().is_ok());
    }

    #[test]
    fn validate_names_the_missing_field() {
        let mut missing_subscription = creds();
        missing_subscription.subscription_id = String::new();
        let error = missing_subscription.validate().unwrap_err();
        assert!(error.to_string().contains("subscription_id"));

        let mut missing_secret = creds();
        missing_secret.client_secret = String::new();
        let error = missing_secret.validate().unwrap_err();
        assert!(error.to_string().contains("client_secret"));
    }

    #[test]
    fn from_file_reads_sdk_auth_format() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "clientId": "client",
                "clientSecret": "secret",
                "subscriptionId": "subscription",
                "tenantId": "tenant",
                "activeDirectoryEndpointUrl": "https://login.microsoftonline.com"
            }}"#
        )
        .unwrap();
        let creds = Credentials::from_file(file.path()).unwrap();
        assert_eq!(creds.tenant_id, "tenant");
        assert_eq!(creds.subscription_id, "subscription");
        assert_eq!(creds.client_id, "client");
        assert_eq!(creds.client_secret, "secret");
    }

    #[test]
    fn from_file_rejects_incomplete_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"clientId": "client"}}"#).unwrap();
        assert!(Credentials::from_file(file.path()).is_err());
    }

    #[test]
    fn debug_redacts_the_secret() {
        let formatted = format!("{:?}", creds());
        assert!(!formatted.contains("verysecret"));
    }
}
