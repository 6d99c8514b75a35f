use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use greenpact_db::models::RatingRow;
use greenpact_gateway::SessionUser;
use greenpact_types::api::{Attachment, CreateRatingRequest, RatingView, UpdateRatingRequest};

use crate::error::{ApiError, ApiResult, ValidJson};
use crate::media::MediaFolder;
use crate::state::AppState;
use crate::views;

async fn own_rating(state: &AppState, id: Uuid, user: &SessionUser) -> ApiResult<RatingRow> {
    let rating = state
        .store(move |db| db.get_rating(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Rating not found"))?;
    if rating.rater_id != user.id {
        return Err(ApiError::forbidden("You can only change your own ratings"));
    }
    Ok(rating)
}

async fn save_images(state: &AppState, images: &[Attachment]) -> ApiResult<Vec<String>> {
    let mut stored = Vec::with_capacity(images.len());
    for image in images {
        stored.push(state.media.save(MediaFolder::RatingImage, "images", image).await?);
    }
    Ok(stored)
}

/// Ratings a user has received.
pub async fn ratings_of_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<Value>> {
    let rows = state.store(move |db| db.list_ratings_for(&username)).await?;
    let data: Vec<RatingView> = rows.into_iter().map(|row| views::rating(&state.media, row)).collect();
    Ok(Json(json!({ "data": data })))
}

pub async fn create_rating(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ValidJson(req): ValidJson<CreateRatingRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.rated_user == user.username {
        return Err(ApiError::field("rated_user", "You cannot rate yourself."));
    }

    let rated_name = req.rated_user.clone();
    let rated = state
        .store(move |db| db.get_user_by_username(&rated_name))
        .await?
        .ok_or_else(|| ApiError::field("rated_user", "User not found."))?;

    let images = save_images(&state, &req.images).await?;
    let (rater_id, rate, description) = (user.id, req.rate, req.description);
    let row = state
        .store(move |db| db.create_rating(rated.id, rater_id, rate, &description, &images))
        .await?;

    info!("{} ({}) rated {} with {}", user.username, user.id, row.rated_username, row.rate);
    Ok((StatusCode::CREATED, Json(views::rating(&state.media, row))))
}

/// New images are added next to the existing ones.
pub async fn update_rating(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateRatingRequest>,
) -> ApiResult<Json<RatingView>> {
    own_rating(&state, id, &user).await?;

    let images = save_images(&state, &req.images).await?;
    let (rate, description) = (req.rate, req.description);
    let row = state
        .store(move |db| db.update_rating(id, rate, description.as_deref(), &images))
        .await?
        .ok_or_else(|| ApiError::not_found("Rating not found"))?;
    Ok(Json(views::rating(&state.media, row)))
}

pub async fn delete_rating(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    own_rating(&state, id, &user).await?;
    state.store(move |db| db.delete_rating(id)).await?;
    info!("{} ({}) removed rating {}", user.username, user.id, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_rating_image(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let image = state
        .store(move |db| db.get_rating_image(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Image not found"))?;
    own_rating(&state, image.rating_id, &user).await?;
    state.store(move |db| db.delete_rating_image(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{account, app, attachment};
    use greenpact_types::models::Role;

    fn rating_of(rated: &str, rate: i64) -> CreateRatingRequest {
        CreateRatingRequest {
            rated_user: rated.into(),
            rate,
            description: "On time, good grain".into(),
            images: vec![attachment("field.jpg", b"photo")],
        }
    }

    #[tokio::test]
    async fn rating_lifecycle_belongs_to_the_rater() {
        let app = app().await;
        let ravi = account(&app.state, "ravi", Role::Farmer, true);
        let kiran = account(&app.state, "kiran", Role::Contractor, true);

        create_rating(State(app.state.clone()), Extension(kiran.clone()), ValidJson(rating_of("ravi", 4)))
            .await
            .unwrap();
        let Json(list) = ratings_of_user(State(app.state.clone()), Path("ravi".into())).await.unwrap();
        assert_eq!(list["data"][0]["rating_user"], "kiran");
        assert_eq!(list["data"][0]["rate"], 4);

        let id: Uuid = serde_json::from_value(list["data"][0]["id"].clone()).unwrap();
        let image_id: Uuid = serde_json::from_value(list["data"][0]["images"][0]["id"].clone()).unwrap();

        let change = UpdateRatingRequest { rate: Some(5), ..Default::default() };
        let err = update_rating(State(app.state.clone()), Extension(ravi.clone()), Path(id), ValidJson(change))
            .await
            .err();
        assert!(matches!(err, Some(ApiError::Forbidden(_))));

        let change = UpdateRatingRequest { rate: Some(5), ..Default::default() };
        let Json(updated) =
            update_rating(State(app.state.clone()), Extension(kiran.clone()), Path(id), ValidJson(change))
                .await
                .unwrap();
        assert_eq!(updated.rate, 5);
        assert_eq!(updated.description, "On time, good grain");

        let err = delete_rating_image(State(app.state.clone()), Extension(ravi.clone()), Path(image_id)).await.err();
        assert!(matches!(err, Some(ApiError::Forbidden(_))));
        delete_rating_image(State(app.state.clone()), Extension(kiran.clone()), Path(image_id)).await.unwrap();
        assert!(app.state.db().get_rating(id).unwrap().unwrap().images.is_empty());

        assert_eq!(
            delete_rating(State(app.state.clone()), Extension(kiran), Path(id)).await.unwrap(),
            StatusCode::NO_CONTENT
        );
        assert!(app.state.db().get_rating(id).unwrap().is_none());
    }

    #[tokio::test]
    async fn nobody_rates_themselves_or_a_stranger() {
        let app = app().await;
        let ravi = account(&app.state, "ravi", Role::Farmer, true);

        let err = create_rating(State(app.state.clone()), Extension(ravi.clone()), ValidJson(rating_of("ravi", 3)))
            .await
            .err();
        assert!(matches!(err, Some(ApiError::Validation(ref f)) if f.contains_key("rated_user")));

        let err = create_rating(State(app.state.clone()), Extension(ravi), ValidJson(rating_of("ghost", 3)))
            .await
            .err();
        assert!(matches!(err, Some(ApiError::Validation(_))));
    }
}
