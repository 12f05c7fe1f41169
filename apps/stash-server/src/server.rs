use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use stash_analytics::{AnalyticsEvent, Emitter, EventName};
use stash_storage::{Scope, Store};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::caller::ClientInfo;
use crate::config::ServerConfig;
use crate::handlers::secrets;
use crate::metrics::track_requests;

#[derive(Clone)]
pub struct StashServer {
    pub store: Arc<dyn Store>,
    pub analytics: Emitter,
    pub config: ServerConfig,
}

impl StashServer {
    pub fn new(store: Arc<dyn Store>, analytics: Emitter, config: ServerConfig) -> Self {
        Self {
            store,
            analytics,
            config,
        }
    }

    /// Queue an analytics event for a completed operation. A no-op when
    /// analytics are disabled.
    pub fn record(
        &self,
        event: EventName,
        actor_id: String,
        count: usize,
        scope: &Scope,
        client: ClientInfo,
    ) {
        if !self.analytics.is_enabled() {
            return;
        }
        self.analytics.emit(AnalyticsEvent::new(
            event,
            actor_id,
            count,
            scope,
            client.user_agent,
        ));
    }
}

/// The public API router.
pub fn router(server: StashServer) -> Router {
    let body_limit = server.config.max_body_bytes;

    let scoped = Router::new()
        .route(
            "/environment/{environment}/secret",
            post(secrets::create_secret).patch(secrets::update_secret),
        )
        .route(
            "/environment/{environment}/secrets",
            post(secrets::create_secrets)
                .patch(secrets::update_secrets)
                .delete(secrets::delete_secrets),
        )
        .route("/secrets", get(secrets::get_secrets));

    let api = Router::new()
        .nest("/workspace/{workspace_id}", scoped)
        .route(
            "/secret/{id}",
            get(secrets::get_secret).delete(secrets::delete_secret),
        );

    Router::new()
        .nest("/api/v2", api)
        .with_state(server)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
}
