//! Data types for the analysis core.

pub mod config;
pub mod fingerprint;
pub mod kind;
pub mod subject;
pub mod task;
pub mod timestamps;

/// What an executor receives for one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkInput {
    /// The subject URL
    pub subject_key: String,
    /// Page content; absent for kinds keyed on the URL alone
    pub payload: Option<String>,
}

impl WorkInput {
    pub fn new(subject_key: impl Into<String>, payload: Option<String>) -> Self {
        Self {
            subject_key: subject_key.into(),
            payload,
        }
    }
}
