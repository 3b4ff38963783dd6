//! Qualified resource references

use std::fmt;

use crate::error::KubeError;

/// A qualified cluster object name in `kind/name` form, e.g. `pod/jumper-abc`.
///
/// Produced once by `create` and then consumed verbatim by the wait, delete,
/// copy, exec and get verbs for the rest of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef(String);

impl ResourceRef {
    /// Parse kubectl creation output, trimming the trailing ` created`
    /// confirmation suffix (`pod/jumper-abc created` → `pod/jumper-abc`).
    pub fn from_create_output(output: &str) -> Result<Self, KubeError> {
        let line = output
            .lines()
            .find(|l| l.contains(" created"))
            .ok_or_else(|| KubeError::Parse {
                verb: "create",
                detail: format!("no creation confirmation in {output:?}"),
            })?;
        let qualified = line.trim_end_matches(" created").trim();
        Self::parse(qualified)
    }

    /// Parse a `kind/name` string.
    pub fn parse(qualified: &str) -> Result<Self, KubeError> {
        match qualified.split_once('/') {
            Some((kind, name)) if !kind.is_empty() && !name.is_empty() => {
                Ok(Self(qualified.to_string()))
            }
            _ => Err(KubeError::Parse {
                verb: "create",
                detail: format!("expected kind/name, got {qualified:?}"),
            }),
        }
    }

    /// The full `kind/name` form.
    pub fn qualified(&self) -> &str {
        &self.0
    }

    /// The bare object name with the kind prefix stripped.
    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, name)| name).unwrap_or(&self.0)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
