use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use greenpact_db::models::{ProfileChanges, ProfileRow, UserRow};
use greenpact_gateway::SessionUser;
use greenpact_gateway::relay::publish_contract_counts;
use greenpact_types::api::{ProfileResponse, ProfilesByRole, UpdateProfileRequest, VerifyRequest};
use greenpact_types::models::Profile;

use crate::error::{ApiError, ApiResult, ValidJson};
use crate::media::MediaFolder;
use crate::middleware::require_admin;
use crate::state::AppState;
use crate::views;

async fn load_user(state: &AppState, username: String) -> ApiResult<UserRow> {
    state
        .store(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

async fn load_profile(state: &AppState, username: String) -> ApiResult<ProfileRow> {
    let user = load_user(state, username).await?;
    let user_id = user.id;
    state
        .store(move |db| db.get_profile(user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))
}

fn respond(state: &AppState, row: ProfileRow) -> ApiResult<Json<ProfileResponse>> {
    let role = row.user.role;
    let data = views::profile(&state.media, row).ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(Json(ProfileResponse { data, role }))
}

fn group_by_role(state: &AppState, rows: Vec<ProfileRow>) -> ProfilesByRole {
    let mut grouped = ProfilesByRole::default();
    for row in rows {
        match views::profile(&state.media, row) {
            Some(p @ Profile::Farmer(_)) => grouped.farmer.push(p),
            Some(p @ Profile::Contractor(_)) => grouped.contractor.push(p),
            None => {}
        }
    }
    grouped
}

pub async fn own_profile(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<ProfileResponse>> {
    let row = load_profile(&state, user.username).await?;
    respond(&state, row)
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<ProfileResponse>> {
    let row = load_profile(&state, username).await?;
    respond(&state, row)
}

pub async fn update_own_profile(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    let username = user.username.clone();
    apply_profile_update(&state, &user, username, req).await
}

/// Administrators may edit anyone; everyone else only themselves.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(username): Path<String>,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    if username != user.username && !user.role.is_admin() {
        return Err(ApiError::forbidden("You can only update your own profile"));
    }
    apply_profile_update(&state, &user, username, req).await
}

async fn apply_profile_update(
    state: &AppState,
    editor: &SessionUser,
    username: String,
    req: UpdateProfileRequest,
) -> ApiResult<Json<ProfileResponse>> {
    let current = load_profile(state, username).await?;
    let target = current.user.clone();
    let media = &state.media;

    // GSTIN belongs to contractors; screenshot and QR code to farmers.
    let gstin = if target.role.is_contractor() { req.gstin } else { None };
    if let Some(gstin) = gstin.clone().filter(|g| current.gstin.as_deref() != Some(g.as_str())) {
        if state.store(move |db| db.gstin_taken(&gstin)).await? {
            return Err(ApiError::field("gstin", "A contractor with this GSTIN already exists."));
        }
    }

    let image_folder = if target.role.is_farmer() { MediaFolder::FarmerImage } else { MediaFolder::ContractorImage };
    let mut changes = ProfileChanges {
        name: req.name,
        address: req.address,
        gstin,
        image: media.save_opt(image_folder, "image", req.image.as_ref()).await?,
        aadhar_image: media.save_opt(MediaFolder::Aadhar, "aadhar_image", req.aadhar_image.as_ref()).await?,
        signature: media.save_opt(MediaFolder::Signature, "signature", req.signature.as_ref()).await?,
        ..Default::default()
    };
    if target.role.is_farmer() {
        changes.screenshot = media.save_opt(MediaFolder::Screenshot, "screenshot", req.screenshot.as_ref()).await?;
        changes.qr_code_image = media.save_opt(MediaFolder::QrCode, "qr_code_image", req.qr_code_image.as_ref()).await?;
    }

    let target_id = target.id;
    let row = state
        .store(move |db| {
            db.update_profile(target_id, &changes)?;
            db.get_profile(target_id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    info!("{} updated the profile of {}", editor.username, target.username);
    respond(state, row)
}

pub async fn pending_verifications(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<ProfilesByRole>> {
    require_admin(&user)?;
    let rows = state.store(|db| db.list_profiles(false)).await?;
    Ok(Json(group_by_role(&state, rows)))
}

pub async fn verification_detail(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(username): Path<String>,
) -> ApiResult<Json<ProfileResponse>> {
    require_admin(&user)?;
    let row = load_profile(&state, username).await?;
    respond(&state, row)
}

pub async fn set_verification(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(username): Path<String>,
    ValidJson(req): ValidJson<VerifyRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    require_admin(&user)?;
    let target = load_profile(&state, username).await?.user;

    let (target_id, verified) = (target.id, req.is_verified);
    let row = state
        .store(move |db| {
            db.set_verified(target_id, verified)?;
            db.get_profile(target_id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    info!("{} set verification of {} to {}", user.username, target.username, verified);
    respond(&state, row)
}

pub async fn verified_users(State(state): State<AppState>) -> ApiResult<Json<ProfilesByRole>> {
    let rows = state.store(|db| db.list_profiles(true)).await?;
    Ok(Json(group_by_role(&state, rows)))
}

pub async fn remove_user(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(username): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin(&user)?;
    if username == user.username {
        return Err(ApiError::bad_request("You cannot remove your own account"));
    }
    let target = load_user(&state, username).await?;

    let target_id = target.id;
    let counterparties = state
        .store(move |db| {
            let counterparties = db.contract_counterparties(target_id)?;
            db.delete_user(target_id)?;
            Ok(counterparties)
        })
        .await?;

    info!("{} removed account {} ({})", user.username, target.username, target.id);
    publish_contract_counts(state.db(), state.dispatcher(), counterparties).await;
    Ok(StatusCode::NO_CONTENT)
}
