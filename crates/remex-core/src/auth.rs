//! Resolution of control-plane credentials.
//!
//! Inside a job service container a session token is mounted at
//! [`SESSION_TOKEN_PATH`] and the account coordinates come from environment
//! variables. Everywhere else a named connection is looked up in the local
//! profile store (`~/.remex/connections.toml`):
//!
//! ```toml
//! default_connection_name = "dev"
//!
//! [dev]
//! account = "acme-prod"
//! user = "pipeline"
//! ```
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, trace};

use crate::error::CoreError;

/// Session token mounted into job service containers.
pub const SESSION_TOKEN_PATH: &str = "/remex/session/token";

pub const ENV_ACCOUNT: &str = "REMEX_ACCOUNT";
pub const ENV_HOST: &str = "REMEX_HOST";
pub const ENV_DATABASE: &str = "REMEX_DATABASE";
pub const ENV_SCHEMA: &str = "REMEX_SCHEMA";
pub const ENV_WAREHOUSE: &str = "REMEX_WAREHOUSE";
pub const ENV_DEFAULT_CONNECTION: &str = "REMEX_DEFAULT_CONNECTION_NAME";

/// Top-level key of the profile store naming its default connection.
const PROFILE_DEFAULT_KEY: &str = "default_connection_name";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Parameters handed to [`crate::Connector::connect`].
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionParams {
    /// OAuth session token found in the container.
    Token {
        token: String,
        account: String,
        host: String,
        database: String,
        schema: String,
        warehouse: Option<String>,
    },
    /// Named profile from the local profile store.
    Named {
        name: String,
        options: BTreeMap<String, String>,
    },
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token {
                account,
                host,
                database,
                schema,
                warehouse,
                ..
            } => f
                .debug_struct("Token")
                .field("token", &"<redacted>")
                .field("account", account)
                .field("host", host)
                .field("database", database)
                .field("schema", schema)
                .field("warehouse", warehouse)
                .finish(),
            Self::Named { name, options } => f
                .debug_struct("Named")
                .field("name", name)
                .field("options", &options.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// Where credentials are read from.
///
/// The default reads the real token path, the user's home directory and the
/// process environment; tests swap each piece out.
#[derive(Clone)]
pub struct AuthSource {
    token_path: PathBuf,
    profile_path: Option<PathBuf>,
    env: EnvLookup,
}

impl Default for AuthSource {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from(SESSION_TOKEN_PATH),
            profile_path: dirs::home_dir().map(|h| h.join(".remex").join("connections.toml")),
            env: Arc::new(|key| std::env::var(key).ok()),
        }
    }
}

impl fmt::Debug for AuthSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSource")
            .field("token_path", &self.token_path)
            .field("profile_path", &self.profile_path)
            .finish()
    }
}

impl AuthSource {
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }

    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Resolve connection parameters.
    ///
    /// Order:
    /// 1. session token file plus `REMEX_*` coordinates, when the file exists;
    /// 2. the named profile `connection_name`;
    /// 3. the profile named by `REMEX_DEFAULT_CONNECTION_NAME`;
    /// 4. the profile store's own `default_connection_name`.
    pub fn resolve(&self, connection_name: Option<&str>) -> Result<ConnectionParams, CoreError> {
        if self.token_path.is_file() {
            debug!(path = %self.token_path.display(), "using session token credentials");
            return self.token_params();
        }
        self.named_params(connection_name)
    }

    fn token_params(&self) -> Result<ConnectionParams, CoreError> {
        let token = std::fs::read_to_string(&self.token_path)
            .map_err(|e| CoreError::Auth(format!("read {}: {e}", self.token_path.display())))?
            .trim()
            .to_string();
        if token.is_empty() {
            return Err(CoreError::Auth(format!(
                "session token file {} is empty",
                self.token_path.display()
            )));
        }

        Ok(ConnectionParams::Token {
            token,
            account: self.required_env(ENV_ACCOUNT)?,
            host: self.required_env(ENV_HOST)?,
            database: self.required_env(ENV_DATABASE)?,
            schema: self.required_env(ENV_SCHEMA)?,
            warehouse: self.optional_env(ENV_WAREHOUSE),
        })
    }

    fn named_params(&self, connection_name: Option<&str>) -> Result<ConnectionParams, CoreError> {
        let path = self
            .profile_path
            .as_deref()
            .ok_or_else(|| CoreError::Auth("no profile store location available".into()))?;
        let store = load_profile_store(path)?;

        let name = connection_name
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.optional_env(ENV_DEFAULT_CONNECTION))
            .or_else(|| {
                store
                    .get(PROFILE_DEFAULT_KEY)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                CoreError::Auth(format!("no connection name given and {} has no default", path.display()))
            })?;
        trace!(connection = %name, "resolving named connection");

        let table = store
            .get(&name)
            .and_then(|v| v.as_table())
            .ok_or_else(|| {
                CoreError::Auth(format!("connection '{name}' not found in {}", path.display()))
            })?;

        let options = table
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();
        Ok(ConnectionParams::Named { name, options })
    }

    fn optional_env(&self, key: &str) -> Option<String> {
        (self.env)(key).filter(|v| !v.trim().is_empty())
    }

    fn required_env(&self, key: &str) -> Result<String, CoreError> {
        self.optional_env(key)
            .ok_or_else(|| CoreError::Auth(format!("environment variable {key} is not set")))
    }
}

fn load_profile_store(path: &Path) -> Result<toml::Table, CoreError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CoreError::Auth(format!("read {}: {e}", path.display())))?;
    raw.parse::<toml::Table>()
        .map_err(|e| CoreError::Auth(format!("parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const PROFILES: &str = r#"
default_connection_name = "dev"

[dev]
account = "acme-dev"
port = 443

[prod]
account = "acme-prod"
"#;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn source(dir: &tempfile::TempDir, env: &[(&str, &str)]) -> AuthSource {
        let profiles = dir.path().join("connections.toml");
        std::fs::write(&profiles, PROFILES).unwrap();
        AuthSource::default()
            .with_token_path(dir.path().join("token"))
            .with_profile_path(profiles)
            .with_env(env_of(env))
    }

    fn named(params: ConnectionParams) -> (String, BTreeMap<String, String>) {
        match params {
            ConnectionParams::Named { name, options } => (name, options),
            other => panic!("expected named params, got {other:?}"),
        }
    }

    #[test]
    fn token_file_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("token"), "secret-token\n").unwrap();
        let src = source(
            &dir,
            &[
                (ENV_ACCOUNT, "acct"),
                (ENV_HOST, "acct.example"),
                (ENV_DATABASE, "DB"),
                (ENV_SCHEMA, "PUBLIC"),
            ],
        );

        match src.resolve(Some("prod")).unwrap() {
            ConnectionParams::Token {
                token,
                account,
                warehouse,
                ..
            } => {
                assert_eq!(token, "secret-token");
                assert_eq!(account, "acct");
                assert!(warehouse.is_none());
            }
            other => panic!("expected token params, got {other:?}"),
        }
    }

    #[test]
    fn token_requires_coordinates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("token"), "t").unwrap();
        let src = source(&dir, &[(ENV_ACCOUNT, "acct")]);

        let err = src.resolve(None).unwrap_err();
        assert!(err.to_string().contains(ENV_HOST), "unexpected error: {err}");
    }

    #[test]
    fn explicit_name_beats_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let src = source(&dir, &[(ENV_DEFAULT_CONNECTION, "dev")]);

        let (name, options) = named(src.resolve(Some("prod")).unwrap());
        assert_eq!(name, "prod");
        assert_eq!(options["account"], "acme-prod");
    }

    #[test]
    fn env_default_beats_store_default() {
        let dir = tempfile::tempdir().unwrap();
        let src = source(&dir, &[(ENV_DEFAULT_CONNECTION, "prod")]);

        let (name, _) = named(src.resolve(None).unwrap());
        assert_eq!(name, "prod");
    }

    #[test]
    fn falls_back_to_store_default() {
        let dir = tempfile::tempdir().unwrap();
        let src = source(&dir, &[]);

        let (name, options) = named(src.resolve(None).unwrap());
        assert_eq!(name, "dev");
        assert_eq!(options["port"], "443");
    }

    #[test]
    fn unknown_connection_is_an_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = source(&dir, &[]);

        let err = src.resolve(Some("staging")).unwrap_err();
        assert!(matches!(err, CoreError::Auth(_)));
    }

    #[test]
    fn debug_redacts_token() {
        let params = ConnectionParams::Token {
            token: "super-secret".into(),
            account: "a".into(),
            host: "h".into(),
            database: "d".into(),
            schema: "s".into(),
            warehouse: None,
        };
        assert!(!format!("{params:?}").contains("super-secret"));
    }
}
