//! Thin axum handlers: extract, delegate to [`crate::GreetingService`],
//! serialize. All behavior lives in the service.

use axum::Json;
use axum::extract::{Path, State};

use aisatsu_types::api::{
    HistoryResponse, PairRequest, PairResponse, RegisterRequest, RegisterResponse, SendRequest,
    SendResponse, SubscribeRequest, SubscribeResponse, UserResponse, VapidPublicKeyResponse,
};

use crate::{ApiError, AppState};

pub async fn vapid_public_key(State(state): State<AppState>) -> Json<VapidPublicKeyResponse> {
    Json(VapidPublicKeyResponse {
        public_key: state.vapid_public_key.clone(),
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let user = state.service.register(req.name).await?;
    Ok(Json(RegisterResponse { success: true, user }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(state.service.user_with_partner(&id).await?))
}

pub async fn pair(
    State(state): State<AppState>,
    Json(req): Json<PairRequest>,
) -> Result<Json<PairResponse>, ApiError> {
    Ok(Json(state.service.pair(req.user_id, req.partner_id).await?))
}

pub async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    Ok(Json(state.service.subscribe(req.user_id, req.subscription).await?))
}

pub async fn send(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    Ok(Json(state.service.send(req.user_id, req.message_type).await?))
}

pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    Ok(Json(state.service.history(&user_id).await?))
}
