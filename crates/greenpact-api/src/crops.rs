use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use greenpact_db::models::{CropChanges, CropRow, NewCrop};
use greenpact_gateway::SessionUser;
use greenpact_gateway::relay::publish_contract_counts;
use greenpact_types::api::{CreateCropRequest, CropView, UpdateCropRequest};

use crate::error::{ApiError, ApiResult, ValidJson};
use crate::media::MediaFolder;
use crate::middleware::require_farmer;
use crate::state::AppState;
use crate::views;

async fn owned_crop(state: &AppState, id: Uuid, user: &SessionUser) -> ApiResult<CropRow> {
    let crop = state
        .store(move |db| db.get_crop(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Crop not found"))?;
    if crop.owner.id != user.id && !user.role.is_admin() {
        return Err(ApiError::forbidden("You can only modify your own crop listings"));
    }
    Ok(crop)
}

pub async fn list_crops(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let rows = state.store(|db| db.list_crops()).await?;
    let data: Vec<CropView> = rows.into_iter().map(|row| views::crop(&state.media, row)).collect();
    Ok(Json(json!({ "data": data })))
}

pub async fn get_crop(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let row = state
        .store(move |db| db.get_crop(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Crop not found"))?;
    Ok(Json(json!({ "data": views::crop(&state.media, row) })))
}

/// A user's listings; an unknown user simply has none.
pub async fn crops_of_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<Vec<CropView>>> {
    let rows = state.store(move |db| db.list_crops_by_owner(&username)).await?;
    Ok(Json(rows.into_iter().map(|row| views::crop(&state.media, row)).collect()))
}

pub async fn create_crop(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ValidJson(req): ValidJson<CreateCropRequest>,
) -> ApiResult<impl IntoResponse> {
    require_farmer(&user)?;

    let crop = NewCrop {
        crop_name: req.crop_name,
        image: state.media.save_opt(MediaFolder::CropImage, "crop_image", req.crop_image.as_ref()).await?,
        price: req.crop_price,
        quantity: req.quantity,
        description: req.description,
        harvested_time: req.harvested_time,
        location: req.location,
    };
    let owner_id = user.id;
    let row = state.store(move |db| db.create_crop(owner_id, &crop)).await?;

    info!("{} ({}) listed crop {} ({})", user.username, user.id, row.crop_name, row.id);
    Ok((StatusCode::CREATED, Json(views::crop(&state.media, row))))
}

pub async fn update_crop(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateCropRequest>,
) -> ApiResult<Json<CropView>> {
    owned_crop(&state, id, &user).await?;

    let changes = CropChanges {
        crop_name: req.crop_name,
        image: state.media.save_opt(MediaFolder::CropImage, "crop_image", req.crop_image.as_ref()).await?,
        price: req.crop_price,
        quantity: req.quantity,
        description: req.description,
        harvested_time: req.harvested_time,
        location: req.location,
    };
    let row = state
        .store(move |db| db.update_crop(id, &changes))
        .await?
        .ok_or_else(|| ApiError::not_found("Crop not found"))?;
    Ok(Json(views::crop(&state.media, row)))
}

pub async fn delete_crop(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let crop = owned_crop(&state, id, &user).await?;

    // Contracts on the crop go with it; their parties get a fresh count.
    let owner_id = crop.owner.id;
    let mut parties = state
        .store(move |db| {
            let mut parties = Vec::new();
            for contract in db.list_contracts_for(owner_id)?.into_iter().filter(|c| c.crop_id == id) {
                parties.push(contract.farmer_username);
                parties.push(contract.buyer_username);
            }
            db.delete_crop(id)?;
            Ok(parties)
        })
        .await?;

    info!("{} ({}) removed crop {}", user.username, user.id, id);
    if !parties.is_empty() {
        parties.sort();
        parties.dedup();
        publish_contract_counts(state.db(), state.dispatcher(), parties).await;
    }
    Ok(StatusCode::NO_CONTENT)
}
