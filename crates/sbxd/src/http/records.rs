//! Record CRUD. Every handler requires a valid session.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::Json;

use sbx_core::types::{Ack, Record, RecordCreated, RecordInput, RecordResponse, RecordUpdateInput};

use super::auth::AuthUser;
use super::error::ApiResult;
use super::AppState;

pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<RecordInput>, JsonRejection>,
) -> ApiResult<Json<RecordCreated>> {
    let Json(input) = payload?;
    let id = state.service.create(user.user_id, input).await?;
    state.metrics.record_op("create");
    Ok(Json(RecordCreated { id }))
}

pub async fn list(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Vec<Record>>> {
    let records = state.service.list(user.user_id).await?;
    state.metrics.record_op("list");
    Ok(Json(records))
}

pub async fn get(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<RecordResponse>> {
    let Path(id) = id?;
    let record = state.service.get(user.user_id, id).await?;
    state.metrics.record_op("get");
    Ok(Json(record))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Ack>> {
    let Path(id) = id?;
    state.service.delete(user.user_id, id).await?;
    state.metrics.record_op("delete");
    Ok(Json(Ack::deleted(id)))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<RecordUpdateInput>, JsonRejection>,
) -> ApiResult<Json<Ack>> {
    let Path(id) = id?;
    let Json(input) = payload?;
    state.service.update(user.user_id, id, input).await?;
    state.metrics.record_op("update");
    Ok(Json(Ack::updated(id)))
}
