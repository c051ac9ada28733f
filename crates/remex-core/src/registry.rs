//! External registry to internal image repository mappings.
//!
//! Configured as `external:internal` pairs, e.g. `docker.io:base_images`.
//! Each internal repository name is looked up once, when the executor is
//! registered, and replaced by the repository URL the job service pulls from.
use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::{
    control::{Connection, quote_literal},
    error::CoreError,
};

/// Column carrying the pullable repository address.
const REPOSITORY_URL_COLUMN: &str = "repository_url";

/// Immutable `external host -> repository url` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryMappings {
    map: HashMap<String, String>,
}

impl RegistryMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split a `ext:int,ext:int` list into trimmed pairs.
    ///
    /// Entries without exactly two non-empty tokens are skipped.
    pub fn parse_pairs(spec: &str) -> Vec<(String, String)> {
        spec.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .filter_map(|entry| {
                let tokens: Vec<&str> = entry.split(':').map(str::trim).collect();
                match tokens.as_slice() {
                    [external, internal] if !external.is_empty() && !internal.is_empty() => {
                        Some((external.to_string(), internal.to_string()))
                    }
                    _ => {
                        debug!(entry = %entry.trim(), "skipping malformed registry mapping");
                        None
                    }
                }
            })
            .collect()
    }

    /// Resolve every configured pair against the repository catalog.
    ///
    /// Pairs whose internal repository does not exist are left out.
    pub async fn resolve(conn: &dyn Connection, spec: Option<&str>) -> Result<Self, CoreError> {
        let Some(spec) = spec.filter(|s| !s.trim().is_empty()) else {
            return Ok(Self::new());
        };

        let mut map = HashMap::new();
        for (external, internal) in Self::parse_pairs(spec) {
            let sql = format!("show image repositories like {}", quote_literal(&internal));
            let rows = conn.query_rows(&sql).await?;

            match rows.iter().find_map(|row| row.get(REPOSITORY_URL_COLUMN)) {
                Some(url) => {
                    debug!(%external, %internal, %url, "registry mapping resolved");
                    map.insert(external, url.clone());
                }
                None => warn!(%external, %internal, "image repository not found; mapping ignored"),
            }
        }
        info!(mappings = map.len(), "registry mappings loaded");
        Ok(Self { map })
    }

    pub fn get(&self, external: &str) -> Option<&str> {
        self.map.get(external).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Replace the registry host of `image` when it has a mapping.
    ///
    /// Only the leading segment (up to the first `/`) is matched, exactly.
    /// Images without a `/` or without a mapping are returned unchanged.
    pub fn rewrite_image(&self, image: &str) -> String {
        match image.split_once('/') {
            Some((host, rest)) => match self.get(host) {
                Some(url) => format!("{}/{rest}", url.trim_end_matches('/')),
                None => image.to_string(),
            },
            None => image.to_string(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for RegistryMappings
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
