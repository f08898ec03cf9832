//! per-environment signing policy configuration.
//!
//! the daemon is configured with a JSON file mapping environment names to
//! policies. each policy names the ca key the key-agent must hold, the
//! identities allowed to request certificates, the identities whose
//! endorsements count, and the quorum size.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::KeyFingerprint;

/// signing policy for one environment.
///
/// policies are immutable for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentPolicy {
    /// fingerprint of the ca key the key-agent signs with.
    pub signing_key_fingerprint: KeyFingerprint,

    /// identities whose endorsements count, keyed by fingerprint.
    /// values are human-readable labels used in logs.
    #[serde(default)]
    pub authorized_signers: HashMap<KeyFingerprint, String>,

    /// identities allowed to request certificates, keyed by fingerprint.
    /// values are the canonical principal names stamped into issued certs.
    #[serde(default)]
    pub authorized_users: HashMap<KeyFingerprint, String>,

    /// number of distinct endorsements required before ca signing.
    pub signers_required: usize,
}

/// load per-environment policies from a JSON file.
///
/// the file is a map from environment name to [`EnvironmentPolicy`]. every
/// environment must require a quorum of at least one signer.
pub fn load_environments(
    path: &Path,
) -> Result<HashMap<String, EnvironmentPolicy>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let environments: HashMap<String, EnvironmentPolicy> = serde_json::from_str(&contents)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    for (name, policy) in &environments {
        if policy.signers_required == 0 {
            return Err(ConfigError::ZeroQuorum(name.clone()));
        }
    }

    Ok(environments)
}

/// error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// the config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// path to the config file
        path: PathBuf,
        /// underlying io error
        #[source]
        source: std::io::Error,
    },

    /// the config file is not valid JSON for the expected shape.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// path to the config file
        path: PathBuf,
        /// underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// an environment requires a quorum of zero signers.
    #[error("environment '{0}' must require at least one signer")]
    ZeroQuorum(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("sign_certd_config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn sample_config() -> String {
        let ca = KeyFingerprint::of_blob(b"ca key");
        let user = KeyFingerprint::of_blob(b"user key");
        let signer = KeyFingerprint::of_blob(b"signer key");
        format!(
            r#"{{
                "prod": {{
                    "signing_key_fingerprint": "{ca}",
                    "authorized_users": {{"{user}": "alice"}},
                    "authorized_signers": {{"{signer}": "bob"}},
                    "signers_required": 2
                }}
            }}"#
        )
    }

    #[test]
    fn test_load_valid_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(&dir, &sample_config());

        let environments = load_environments(&path).unwrap();
        assert_eq!(environments.len(), 1);

        let prod = &environments["prod"];
        assert_eq!(prod.signers_required, 2);
        assert_eq!(prod.authorized_users.len(), 1);
        assert_eq!(prod.authorized_signers.len(), 1);
        assert_eq!(
            prod.signing_key_fingerprint,
            KeyFingerprint::of_blob(b"ca key")
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = load_environments(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(&dir, "not json");
        let result = load_environments(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_bad_fingerprint_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{"prod": {"signing_key_fingerprint": "nothex", "signers_required": 1}}"#,
        );
        let result = load_environments(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_zero_quorum_rejected() {
        let ca = KeyFingerprint::of_blob(b"ca key");
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"{{"prod": {{"signing_key_fingerprint": "{ca}", "signers_required": 0}}}}"#
            ),
        );
        let result = load_environments(&path);
        assert!(matches!(result, Err(ConfigError::ZeroQuorum(env)) if env == "prod"));
    }

    #[test]
    fn test_tables_default_empty() {
        let ca = KeyFingerprint::of_blob(b"ca key");
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"{{"prod": {{"signing_key_fingerprint": "{ca}", "signers_required": 1}}}}"#
            ),
        );
        let environments = load_environments(&path).unwrap();
        assert!(environments["prod"].authorized_users.is_empty());
        assert!(environments["prod"].authorized_signers.is_empty());
    }
}
