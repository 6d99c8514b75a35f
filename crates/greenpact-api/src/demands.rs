use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use greenpact_db::models::{DemandChanges, DemandRow, NewDemand};
use greenpact_gateway::SessionUser;
use greenpact_types::api::{CreateDemandRequest, DemandView, UpdateDemandRequest};

use crate::error::{ApiError, ApiResult, ValidJson};
use crate::state::AppState;
use crate::views;

async fn owned_demand(state: &AppState, id: Uuid, user: &SessionUser) -> ApiResult<DemandRow> {
    let demand = state
        .store(move |db| db.get_demand(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Demand not found"))?;
    if demand.owner.id != user.id && !user.role.is_admin() {
        return Err(ApiError::forbidden("You can only modify your own demands"));
    }
    Ok(demand)
}

pub async fn list_demands(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let rows = state.store(|db| db.list_demands()).await?;
    let data: Vec<DemandView> = rows.into_iter().map(|row| views::demand(&state.media, row)).collect();
    Ok(Json(json!({ "data": data })))
}

pub async fn get_demand(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let row = state
        .store(move |db| db.get_demand(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Demand not found"))?;
    Ok(Json(json!({ "data": views::demand(&state.media, row) })))
}

pub async fn demands_of_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<Vec<DemandView>>> {
    let rows = state.store(move |db| db.list_demands_by_owner(&username)).await?;
    Ok(Json(rows.into_iter().map(|row| views::demand(&state.media, row)).collect()))
}

pub async fn create_demand(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ValidJson(req): ValidJson<CreateDemandRequest>,
) -> ApiResult<impl IntoResponse> {
    if !user.role.has_profile() {
        return Err(ApiError::forbidden("Only farmers and contractors can post demands"));
    }

    let demand = NewDemand {
        crop_name: req.crop_name,
        price: req.crop_price,
        contact_no: req.contact_no,
        quantity: req.quantity,
        description: req.description,
        location: req.location,
        harvested_time: req.harvested_time,
    };
    let owner_id = user.id;
    let row = state.store(move |db| db.create_demand(owner_id, &demand)).await?;

    info!("{} ({}) posted demand {} ({})", user.username, user.id, row.crop_name, row.id);
    Ok((StatusCode::CREATED, Json(views::demand(&state.media, row))))
}

pub async fn update_demand(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateDemandRequest>,
) -> ApiResult<Json<DemandView>> {
    owned_demand(&state, id, &user).await?;

    let changes = DemandChanges {
        crop_name: req.crop_name,
        price: req.crop_price,
        contact_no: req.contact_no,
        quantity: req.quantity,
        description: req.description,
        location: req.location,
        harvested_time: req.harvested_time,
    };
    let row = state
        .store(move |db| db.update_demand(id, &changes))
        .await?
        .ok_or_else(|| ApiError::not_found("Demand not found"))?;
    Ok(Json(views::demand(&state.media, row)))
}

pub async fn delete_demand(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    owned_demand(&state, id, &user).await?;
    state.store(move |db| db.delete_demand(id)).await?;
    info!("{} ({}) removed demand {}", user.username, user.id, id);
    Ok(StatusCode::NO_CONTENT)
}
