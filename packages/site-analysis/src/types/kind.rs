//! Work kinds - the categories of analysis the dispatcher can run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The category of analysis to run for a subject.
///
/// Each kind has its own executor and its own rate bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    /// Social profile, contact and feed harvesting from page HTML
    Social,
    /// Text classification of the page content
    Classification,
    /// Domain and server geolocation lookup (URL only)
    Location,
}

impl WorkKind {
    pub const ALL: [WorkKind; 3] = [
        WorkKind::Social,
        WorkKind::Classification,
        WorkKind::Location,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::Social => "social",
            WorkKind::Classification => "classification",
            WorkKind::Location => "location",
        }
    }

    /// Whether this kind's result depends on the payload content.
    ///
    /// Content-keyed kinds are deduplicated by fingerprint; the rest are
    /// keyed on the subject alone.
    pub fn is_content_keyed(&self) -> bool {
        match self {
            WorkKind::Social | WorkKind::Classification => true,
            WorkKind::Location => false,
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a work kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown work kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for WorkKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "social" => Ok(WorkKind::Social),
            "classification" | "classifier" => Ok(WorkKind::Classification),
            "location" => Ok(WorkKind::Location),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}
