use serde::Deserialize;

/// Settings provides a way to send arguments into the harness using environment variables.
pub(crate) struct Settings {}

impl Settings {
    /// The path or name of the `kind` binary.
    pub(crate) fn kind_path() -> &'static str {
        SETTINGS.kind_path.as_str()
    }
}

#[derive(Debug, Deserialize)]
struct Inner {
    /// The path to the [kind] binary. Defaults to `kind` (i.e. by default the kind binary is
    /// expected to be found via `$PATH`).
    ///
    /// # Example
    ///
    /// ```text
    /// CLUSTERTEST_KIND_PATH=/wherever/kind
    /// ```
    ///
    /// [kind]: https://kind.sigs.k8s.io/
    #[serde(default = "kind")]
    kind_path: String,
}

lazy_static::lazy_static! {
    static ref SETTINGS: Inner = envy::prefixed("CLUSTERTEST_")
        .from_env::<Inner>()
        .unwrap_or_else(|error| {
            log::warn!("Error parsing settings environment variables, using defaults: {}", error);
            Inner { kind_path: kind() }
        });
}

/// We need this to provide a default for serde.
fn kind() -> String {
    String::from("kind")
}
