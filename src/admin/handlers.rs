use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::admin::AdminState;
use crate::config::validation::{validate_setting, ValidationError};
use crate::config::Setting;
use crate::storage::StoreError;
use crate::update::RemoteVersion;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub remote: RemoteVersion,
    pub running: bool,
    pub rule_list_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateSummary {
    pub subscriptions: usize,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid setting")]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Invalid(errors) => {
                let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "invalid setting", "details": details })),
                )
                    .into_response()
            }
            ApiError::Store(e) => {
                tracing::error!(error = %e, "Config store request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let cfg = state.store.configuration().unwrap_or_default();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        remote: state.scheduler.remote_version(),
        running: cfg.running,
        rule_list_version: cfg.rule_list_version,
    })
}

pub async fn get_setting(State(state): State<AdminState>) -> Json<Setting> {
    Json(state.store.setting())
}

pub async fn put_setting(
    State(state): State<AdminState>,
    Json(setting): Json<Setting>,
) -> Result<Json<Setting>, ApiError> {
    validate_setting(&setting).map_err(ApiError::Invalid)?;
    state.store.set_setting(setting.clone())?;
    state.scheduler.apply_setting(&setting);
    tracing::info!("Setting updated through API");
    Ok(Json(setting))
}

pub async fn post_update_subscriptions(State(state): State<AdminState>) -> Json<UpdateSummary> {
    let subscriptions = state.store.subscriptions().len();
    state.scheduler.update_subscriptions().await;
    Json(UpdateSummary { subscriptions })
}
