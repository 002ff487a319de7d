//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use site_analysis::executors::{Blacklist, ContactExtractor, DomainLookup, KeywordClassifier};
use site_analysis::{AnalysisService, AnalysisStore, ExecutorSet};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::server::routes::{
    analyze_handler, delete_record_handler, flag_record_handler, get_record_handler,
    get_task_handler, health_handler, list_records_handler, override_task_handler,
    save_record_handler,
};

/// Service type shared by every handler; the store backend is chosen at startup.
pub type SharedService = Arc<AnalysisService<dyn AnalysisStore>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: SharedService,
}

/// The built-in executors, configured from the environment.
pub fn build_executors(config: &Config) -> ExecutorSet {
    let contacts = ContactExtractor::new()
        .with_blacklist(Blacklist::new(config.social_blacklist.iter().cloned()));

    let mut location = DomainLookup::new();
    if let Some(base_url) = &config.ipinfo_base_url {
        location = location.with_ipinfo(base_url.clone());
    }

    ExecutorSet::new(
        Arc::new(contacts),
        Arc::new(KeywordClassifier::new()),
        Arc::new(location),
    )
}

/// Build the Axum application router
pub fn build_app(service: SharedService, allowed_origins: &[String]) -> Router {
    let app_state = AppState { service };

    // Empty origin list allows any origin (development)
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    let api = Router::new()
        .route("/analysis/:kind", post(analyze_handler))
        .route("/tasks/:task_id", get(get_task_handler))
        .route("/tasks/:task_id/override", post(override_task_handler))
        .route("/records", get(list_records_handler))
        .route(
            "/records/lookup",
            get(get_record_handler).delete(delete_record_handler),
        )
        .route("/records/flag", post(flag_record_handler))
        .route("/records/save", post(save_record_handler));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
