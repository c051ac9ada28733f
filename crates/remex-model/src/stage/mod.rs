//! Stage URI handling.
//!
//! Network stages are addressed as `virtualscheme://stage/<name>/<path...>`.
//! Inside a job container every stage is mounted under
//! `/mnt/stage/<lowercased name>`, so a stage URI maps onto a plain
//! filesystem path.
use std::{fmt, str::FromStr};

use crate::{ModelError, STAGE_MOUNT_ROOT, STAGE_SCHEME};

const STAGE_SEGMENT: &str = "stage/";

/// Parsed `virtualscheme://stage/<name>/<path>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUri {
    name: String,
    path: String,
}

impl StageUri {
    /// Parse a stage URI.
    ///
    /// The stage name keeps its original case; the path is everything after
    /// the name segment, without the separating slash.
    pub fn parse(uri: &str) -> Result<Self, ModelError> {
        let malformed = |reason| ModelError::MalformedStageUri {
            uri: uri.to_string(),
            reason,
        };

        let rest = uri
            .strip_prefix(STAGE_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| malformed("unsupported scheme"))?;
        let rest = rest
            .strip_prefix(STAGE_SEGMENT)
            .ok_or_else(|| malformed("missing 'stage/' segment"))?;

        let (name, path) = match rest.split_once('/') {
            Some((name, path)) => (name, path),
            None => (rest, ""),
        };
        if name.is_empty() {
            return Err(malformed("missing stage name"));
        }
        Ok(Self {
            name: name.to_string(),
            path: path.to_string(),
        })
    }

    /// Stage name, case preserved.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path inside the stage, relative to its root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Container path of this URI once the stage is mounted.
    pub fn mount_path(&self) -> String {
        let root = stage_mount_path(&self.name);
        if self.path.is_empty() {
            root
        } else {
            format!("{root}/{}", self.path)
        }
    }
}

impl FromStr for StageUri {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{STAGE_SCHEME}://{STAGE_SEGMENT}{}", self.name)?;
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        Ok(())
    }
}

/// Returns `true` when `uri` is a well-formed stage URI.
pub fn is_stage_uri(uri: &str) -> bool {
    StageUri::parse(uri).is_ok()
}

/// Extract the stage name from a stage URI.
pub fn extract_stage_name(uri: &str) -> Result<String, ModelError> {
    StageUri::parse(uri).map(|u| u.name)
}

/// Rewrite a stage URI into its in-container mount path.
pub fn translate_to_mount(uri: &str) -> Result<String, ModelError> {
    StageUri::parse(uri).map(|u| u.mount_path())
}

/// Mount point of the given stage inside a job container.
pub fn stage_mount_path(name: &str) -> String {
    format!("{STAGE_MOUNT_ROOT}/{}", name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_and_translates_stage_uri() {
        let uri = "virtualscheme://stage/MYSTAGE/work/run1";

        assert!(is_stage_uri(uri));
        assert_eq!(extract_stage_name(uri).unwrap(), "MYSTAGE");
        assert_eq!(translate_to_mount(uri).unwrap(), "/mnt/stage/mystage/work/run1");
    }

    #[test]
    fn rejects_uri_without_stage_segment() {
        let uri = "virtualscheme://MYSTAGE/work";

        assert!(!is_stage_uri(uri));
        let err = translate_to_mount(uri).unwrap_err();
        assert!(matches!(err, ModelError::MalformedStageUri { .. }));
    }

    #[test]
    fn rejects_missing_name_and_foreign_schemes() {
        let bad = [
            "virtualscheme://stage/",
            "virtualscheme://stage//work",
            "s3://stage/MYSTAGE/work",
            "/local/work",
            "",
        ];
        for uri in bad {
            assert!(!is_stage_uri(uri), "expected {uri:?} to be rejected");
        }
    }

    #[test]
    fn bare_stage_mounts_at_root() {
        let uri = StageUri::parse("virtualscheme://stage/Data").unwrap();
        assert_eq!(uri.name(), "Data");
        assert_eq!(uri.path(), "");
        assert_eq!(uri.mount_path(), "/mnt/stage/data");
    }

    #[test]
    fn display_restores_original_form() {
        let raw = "virtualscheme://stage/MYSTAGE/work/ab/cdef";
        let uri: StageUri = raw.parse().unwrap();
        assert_eq!(uri.to_string(), raw);
    }
}
