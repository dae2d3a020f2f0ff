use axum::{Router, extract::DefaultBodyLimit, http::HeaderValue};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::{Config, CorsPolicy};
use crate::upstream::Upstream;

pub mod handlers;
pub mod proxy;
pub mod routes;

pub type SharedState = Arc<GatewayState>;

pub struct GatewayState {
    pub upstream: Upstream,
    pub public_prefix: String,
    pub upstream_prefix: String,
    pub cors: CorsPolicy,
    pub static_dir: Option<PathBuf>,
}

impl GatewayState {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            upstream: Upstream::new(config.backend.clone(), config.limits)?,
            public_prefix: config.public_prefix.clone(),
            upstream_prefix: config.upstream_prefix.clone(),
            cors: config.cors.clone(),
            static_dir: config.static_dir.clone(),
        })
    }
}

pub fn create_router(state: SharedState) -> Router {
    let api = routes::method_routers()
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(path, method_router)
        })
        // Everything else under the prefix is proxied as-is
        .fallback(proxy::pass_through)
        .layer(DefaultBodyLimit::max(
            state.upstream.limits().max_json_bytes,
        ))
        .with_state(state.clone());

    let app = if state.public_prefix.is_empty() {
        api
    } else {
        let outside = match &state.static_dir {
            Some(dir) => Router::new().fallback_service(ServeDir::new(dir)),
            None => Router::new().fallback(handlers::not_found),
        };
        outside.nest(&state.public_prefix, api)
    };

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&state.cors)),
    )
}

fn cors_layer(policy: &CorsPolicy) -> CorsLayer {
    match policy {
        // No allowed origins: browsers fall back to same-origin
        CorsPolicy::SameOrigin => CorsLayer::new(),
        CorsPolicy::AnyOrigin => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsPolicy::Origins(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(%origin, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}
