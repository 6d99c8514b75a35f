//! Disputes between users. A complaint is visible only to the two people it
//! concerns and to administrators; everyone else gets a 404 for it.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use greenpact_db::models::{ComplaintChanges, ComplaintRow, NewComplaint};
use greenpact_gateway::SessionUser;
use greenpact_types::api::{ComplaintView, CreateComplaintRequest, UpdateComplaintRequest};

use crate::error::{ApiError, ApiResult, ValidJson};
use crate::media::MediaFolder;
use crate::state::AppState;
use crate::views;

async fn visible_complaint(state: &AppState, id: Uuid, user: &SessionUser) -> ApiResult<ComplaintRow> {
    state
        .store(move |db| db.get_complaint(id))
        .await?
        .filter(|c| c.involves(user.id) || user.role.is_admin())
        .ok_or_else(|| ApiError::not_found("Complaint not found"))
}

/// Complainant or admin.
async fn managed_complaint(state: &AppState, id: Uuid, user: &SessionUser) -> ApiResult<ComplaintRow> {
    let complaint = visible_complaint(state, id, user).await?;
    if complaint.complainant_id != user.id && !user.role.is_admin() {
        return Err(ApiError::forbidden("Only the complainant can change this complaint"));
    }
    Ok(complaint)
}

/// Resolves `accused_username` to a user id. Blank means nobody.
async fn resolve_accused(state: &AppState, username: Option<String>, caller: &SessionUser) -> ApiResult<Option<Uuid>> {
    let Some(username) = username.filter(|u| !u.trim().is_empty()) else {
        return Ok(None);
    };
    let accused = state
        .store(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(|| ApiError::field("accused_username", "No user found with this username."))?;
    if accused.id == caller.id {
        return Err(ApiError::bad_request("You cannot file a complaint against yourself."));
    }
    Ok(Some(accused.id))
}

pub async fn list_complaints(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<Value>> {
    let viewer = (!user.role.is_admin()).then_some(user.id);
    let rows = state.store(move |db| db.list_complaints(viewer)).await?;
    let data: Vec<ComplaintView> = rows.into_iter().map(|row| views::complaint(&state.media, row)).collect();
    Ok(Json(json!({ "data": data })))
}

pub async fn get_complaint(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ComplaintView>> {
    let row = visible_complaint(&state, id, &user).await?;
    Ok(Json(views::complaint(&state.media, row)))
}

pub async fn create_complaint(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ValidJson(req): ValidJson<CreateComplaintRequest>,
) -> ApiResult<impl IntoResponse> {
    let complaint = NewComplaint {
        complainant_id: user.id,
        accused_id: resolve_accused(&state, req.accused_username, &user).await?,
        category: req.category,
        description: req.description,
        proof: state.media.save_opt(MediaFolder::ComplaintProof, "proof", req.proof.as_ref()).await?,
        priority: req.priority,
    };
    let row = state.store(move |db| db.create_complaint(&complaint)).await?;

    info!("{} ({}) filed complaint {} ({})", user.username, user.id, row.id, row.category);
    Ok((StatusCode::CREATED, Json(views::complaint(&state.media, row))))
}

/// Partial update. Status, notes and the accused are admin-only and are
/// ignored when anyone else sends them.
pub async fn update_complaint(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateComplaintRequest>,
) -> ApiResult<Json<ComplaintView>> {
    let complaint = managed_complaint(&state, id, &user).await?;

    let is_admin = user.role.is_admin();
    let mut changes = ComplaintChanges {
        category: req.category,
        description: req.description,
        proof: state.media.save_opt(MediaFolder::ComplaintProof, "proof", req.proof.as_ref()).await?,
        priority: req.priority,
        ..Default::default()
    };
    if is_admin {
        changes.status = req.status;
        changes.admin_notes = req.admin_notes;
        // The complainant can never end up accusing themselves.
        let complainant = SessionUser {
            id: complaint.complainant_id,
            username: complaint.complainant_username,
            role: user.role,
        };
        changes.accused_id = resolve_accused(&state, req.accused_username, &complainant).await?;
    }

    let row = state
        .store(move |db| db.update_complaint(id, &changes))
        .await?
        .ok_or_else(|| ApiError::not_found("Complaint not found"))?;

    if is_admin {
        info!("{} ({}) set complaint {} to {}", user.username, user.id, row.id, row.status);
    }
    Ok(Json(views::complaint(&state.media, row)))
}

pub async fn delete_complaint(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    managed_complaint(&state, id, &user).await?;
    state.store(move |db| db.delete_complaint(id)).await?;
    info!("{} ({}) removed complaint {}", user.username, user.id, id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{account, admin, app};
    use greenpact_types::models::Role;

    fn against(accused: Option<&str>) -> CreateComplaintRequest {
        CreateComplaintRequest {
            accused_username: accused.map(str::to_string),
            category: None,
            description: "Paid half, never collected the rest".into(),
            priority: None,
            proof: None,
        }
    }

    async fn file(state: &AppState, by: &SessionUser, accused: Option<&str>) -> ApiResult<ComplaintView> {
        let resp = create_complaint(State(state.clone()), Extension(by.clone()), ValidJson(against(accused)))
            .await?
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let rows = state.db().list_complaints(Some(by.id)).unwrap();
        Ok(views::complaint(&state.media, rows.into_iter().next().unwrap()))
    }

    #[tokio::test]
    async fn only_parties_and_admins_see_a_complaint() {
        let app = app().await;
        let ravi = account(&app.state, "ravi", Role::Farmer, true);
        let kiran = account(&app.state, "kiran", Role::Contractor, true);
        let meena = account(&app.state, "meena", Role::Farmer, true);
        let root = admin(&app.state);

        let filed = file(&app.state, &ravi, Some("kiran")).await.unwrap();
        assert_eq!(filed.category, "fraud");
        assert_eq!(filed.priority, "Low");
        assert_eq!(filed.status, "pending");
        assert_eq!(filed.accused.as_deref(), Some("kiran"));

        for viewer in [&ravi, &kiran, &root] {
            let Json(list) = list_complaints(State(app.state.clone()), Extension(viewer.clone())).await.unwrap();
            assert_eq!(list["data"].as_array().unwrap().len(), 1);
            get_complaint(State(app.state.clone()), Extension(viewer.clone()), Path(filed.id)).await.unwrap();
        }

        let Json(list) = list_complaints(State(app.state.clone()), Extension(meena.clone())).await.unwrap();
        assert!(list["data"].as_array().unwrap().is_empty());
        let err = get_complaint(State(app.state.clone()), Extension(meena), Path(filed.id)).await.err();
        assert!(matches!(err, Some(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn accused_must_exist_and_differ() {
        let app = app().await;
        let ravi = account(&app.state, "ravi", Role::Farmer, true);

        assert!(matches!(file(&app.state, &ravi, Some("ghost")).await, Err(ApiError::Validation(_))));
        assert!(matches!(file(&app.state, &ravi, Some("ravi")).await, Err(ApiError::BadRequest(_))));
        assert!(file(&app.state, &ravi, None).await.unwrap().accused.is_none());
    }

    #[tokio::test]
    async fn protected_fields_are_admin_only() {
        let app = app().await;
        let ravi = account(&app.state, "ravi", Role::Farmer, true);
        let kiran = account(&app.state, "kiran", Role::Contractor, true);
        let root = admin(&app.state);
        let filed = file(&app.state, &ravi, Some("kiran")).await.unwrap();

        let sneaky = UpdateComplaintRequest {
            status: Some("resolved".into()),
            admin_notes: Some("closed".into()),
            priority: Some("High".into()),
            ..Default::default()
        };
        let Json(view) =
            update_complaint(State(app.state.clone()), Extension(ravi.clone()), Path(filed.id), ValidJson(sneaky))
                .await
                .unwrap();
        assert_eq!(view.status, "pending");
        assert!(view.admin_notes.is_none());
        assert_eq!(view.priority, "High");

        let err = update_complaint(
            State(app.state.clone()),
            Extension(kiran.clone()),
            Path(filed.id),
            ValidJson(UpdateComplaintRequest::default()),
        )
        .await
        .err();
        assert!(matches!(err, Some(ApiError::Forbidden(_))));

        let review = UpdateComplaintRequest {
            status: Some("resolved".into()),
            admin_notes: Some("Refund issued".into()),
            ..Default::default()
        };
        let Json(view) = update_complaint(State(app.state.clone()), Extension(root), Path(filed.id), ValidJson(review))
            .await
            .unwrap();
        assert_eq!(view.status, "resolved");
        assert_eq!(view.admin_notes.as_deref(), Some("Refund issued"));

        let err = delete_complaint(State(app.state.clone()), Extension(kiran), Path(filed.id)).await.err();
        assert!(matches!(err, Some(ApiError::Forbidden(_))));
        delete_complaint(State(app.state.clone()), Extension(ravi), Path(filed.id)).await.unwrap();
    }
}
