//! # Capabilities
//!
//! What a registered pipe accepts, produces and supports, and the query used
//! to find pipes by function rather than by name.

use serde::{Deserialize, Serialize};

/// Declared capabilities of a registered pipe.
///
/// An undeclared `accepts`/`produces` list places no constraint on queries;
/// an undeclared `features` list fails any feature query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Role of the pipe, e.g. `"source"`, `"transform"`, `"output"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produces: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
}

impl Capabilities {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn accepting<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepts = Some(items.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn producing<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces = Some(items.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_features<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = Some(items.into_iter().map(Into::into).collect());
        self
    }
}

/// Capability filter. Every present field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produces: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
}

impl CapabilityQuery {
    /// Does a registration with `caps` satisfy this query?
    #[must_use]
    pub fn matches(&self, caps: &Capabilities) -> bool {
        if let (Some(wanted), Some(declared)) = (&self.accepts, &caps.accepts) {
            if !declared.contains(wanted) {
                return false;
            }
        }
        if let (Some(wanted), Some(declared)) = (&self.produces, &caps.produces) {
            if !declared.contains(wanted) {
                return false;
            }
        }
        if let Some(wanted) = &self.features {
            let Some(declared) = &caps.features else {
                return false;
            };
            if !wanted.iter().all(|f| declared.contains(f)) {
                return false;
            }
        }
        true
    }
}
