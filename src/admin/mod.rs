//! Management API.
//!
//! A small axum router exposing daemon status, the update settings and a
//! manual subscription refresh. Requests are traced through `tower-http`
//! and guarded by an optional bearer key.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use self::auth::api_key_middleware;
use self::handlers::*;
use crate::lifecycle::{ApiService, ServiceError};
use crate::storage::ConfigStore;
use crate::update::Scheduler;

#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn ConfigStore>,
    pub scheduler: Arc<Scheduler>,
    pub api_key: Option<Arc<str>>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/setting", get(get_setting).put(put_setting))
        .route("/api/subscriptions/update", post(post_update_subscriptions))
        .layer(middleware::from_fn_with_state(state.clone(), api_key_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the management API until the shutdown token fires.
pub struct ApiServer {
    address: String,
    state: AdminState,
    shutdown: CancellationToken,
}

impl ApiServer {
    pub fn new(address: impl Into<String>, state: AdminState, shutdown: CancellationToken) -> Self {
        Self {
            address: address.into(),
            state,
            shutdown,
        }
    }
}

#[async_trait]
impl ApiService for ApiServer {
    async fn run(&self) -> Result<(), ServiceError> {
        let listener = TcpListener::bind(&self.address)
            .await
            .map_err(|source| ServiceError::Bind {
                address: self.address.clone(),
                source,
            })?;

        tracing::info!(address = %self.address, "Management API listening");

        let token = self.shutdown.clone();
        axum::serve(listener, setup_admin_router(self.state.clone()))
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .map_err(ServiceError::Serve)
    }
}
