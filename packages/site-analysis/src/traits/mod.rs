//! Core trait abstractions for the analysis core.
//!
//! These traits define the interfaces that applications implement
//! to provide storage, analysis engines and completion handling.

pub mod completion;
pub mod executor;
pub mod store;
