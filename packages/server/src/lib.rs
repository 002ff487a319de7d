// Site Analysis - API Core
//
// HTTP request layer over the site-analysis core: validates requests,
// maps them onto `AnalysisService` and turns its errors into status codes.

pub mod config;
pub mod server;

pub use config::*;
