use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use greenpact_db::models::{ContractChanges, ContractRow, NewContract, NewProgress, NewTransaction, TransactionChanges, TransactionRow};
use greenpact_gateway::SessionUser;
use greenpact_gateway::relay::publish_contract_counts;
use greenpact_gateway::store::blocking;
use greenpact_types::api::{
    ContractView, CreateContractRequest, CreateProgressRequest, CreateTransactionRequest, FaceMatchRequest,
    FaceMatchResponse, ProgressView, TransactionView, UpdateContractRequest, UpdateTransactionRequest,
};
use greenpact_types::models::PaymentProgress;

use crate::documents::{ContractSheet, Party};
use crate::error::{ApiError, ApiResult, ValidJson};
use crate::media::{self, MediaFolder};
use crate::middleware::{require_admin, require_contractor, require_farmer};
use crate::state::AppState;
use crate::views;

const NOT_FOUND: &str = "No Contract found";

async fn load_contract(state: &AppState, id: Uuid) -> ApiResult<ContractRow> {
    state
        .store(move |db| db.get_contract(id))
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))
}

/// The contract, if `user` is one of its parties or an administrator.
/// Everyone else is told it does not exist.
async fn visible_contract(state: &AppState, id: Uuid, user: &SessionUser) -> ApiResult<ContractRow> {
    let contract = load_contract(state, id).await?;
    if contract.is_party(user.id) || user.role.is_admin() {
        Ok(contract)
    } else {
        Err(ApiError::not_found(NOT_FOUND))
    }
}

/// The contract, if `user` is its buyer. The farmer gets a 403, others a 404.
async fn buyer_contract(state: &AppState, id: Uuid, user: &SessionUser) -> ApiResult<ContractRow> {
    let contract = visible_contract(state, id, user).await?;
    if contract.buyer_id != user.id {
        return Err(ApiError::forbidden("Only the buyer of this contract can do that"));
    }
    Ok(contract)
}

// -- Contracts --

pub async fn list_contracts(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<Value>> {
    let user_id = user.id;
    let rows = state.store(move |db| db.list_contracts_for(user_id)).await?;
    Ok(Json(json!({ "data": views::contracts(&state.media, rows) })))
}

pub async fn all_contracts(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    let rows = state.store(|db| db.list_contracts()).await?;
    Ok(Json(json!({ "data": views::contracts(&state.media, rows) })))
}

pub async fn get_contract(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let contract = visible_contract(&state, id, &user).await?;
    Ok(Json(json!({ "data": views::contract(&state.media, contract) })))
}

pub async fn create_contract(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ValidJson(req): ValidJson<CreateContractRequest>,
) -> ApiResult<impl IntoResponse> {
    require_contractor(&user)?;

    let (farmer_username, crop_id) = (req.farmer_username.clone(), req.crop_id);
    let (farmer, crop) = state
        .store(move |db| Ok((db.get_user_by_username(&farmer_username)?, db.get_crop(crop_id)?)))
        .await?;
    let farmer = farmer.ok_or_else(|| ApiError::not_found("Farmer not found"))?;
    let crop = crop.ok_or_else(|| ApiError::not_found("Crop not found"))?;

    if farmer.id == user.id {
        return Err(ApiError::field("farmer_username", "Farmer and buyer must be different users"));
    }
    if !farmer.role.is_farmer() {
        return Err(ApiError::field("farmer_username", "The named user is not a farmer"));
    }
    if crop.owner.id != farmer.id {
        return Err(ApiError::field("crop_id", "This crop does not belong to the named farmer"));
    }

    let contract = NewContract {
        farmer_id: farmer.id,
        buyer_id: user.id,
        crop_id: crop.id,
        nego_price: req.nego_price,
        quantity: req.quantity,
        delivery_address: req.delivery_address,
        delivery_date: req.delivery_date,
        terms: req.terms,
    };
    let row = state.store(move |db| db.create_contract(&contract)).await?;

    info!("{} ({}) proposed contract {} to {}", user.username, user.id, row.id, row.farmer_username);
    publish_contract_counts(
        state.db(),
        state.dispatcher(),
        vec![row.farmer_username.clone(), row.buyer_username.clone()],
    )
    .await;
    Ok((StatusCode::CREATED, Json(views::contract(&state.media, row))))
}

/// Parties and crop never change, and approval has its own route. For the
/// farmer the commercial fields are ignored.
pub async fn update_contract(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateContractRequest>,
) -> ApiResult<Json<ContractView>> {
    let contract = load_contract(&state, id).await?;
    if !contract.is_party(user.id) {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    let mut changes = ContractChanges {
        delivery_address: req.delivery_address,
        delivery_date: req.delivery_date,
        ..Default::default()
    };
    if contract.buyer_id == user.id {
        changes.nego_price = req.nego_price;
        changes.quantity = req.quantity;
        changes.terms = req.terms;
    }

    let row = state
        .store(move |db| db.update_contract(id, &changes))
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    info!("{} ({}) updated contract {}", user.username, user.id, id);
    Ok(Json(views::contract(&state.media, row)))
}

pub async fn delete_contract(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let contract = buyer_contract(&state, id, &user).await?;
    if contract.status {
        return Err(ApiError::bad_request("An approved contract cannot be deleted"));
    }

    state.store(move |db| db.delete_contract(id)).await?;
    info!("{} ({}) withdrew contract {}", user.username, user.id, id);
    publish_contract_counts(
        state.db(),
        state.dispatcher(),
        vec![contract.farmer_username, contract.buyer_username],
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ContractView>> {
    let row = approve_contract(&state, &user, id).await?;
    Ok(Json(views::contract(&state.media, row)))
}

/// Approves `id` on behalf of its farmer. Only the call that flips the
/// flag renders the agreement; a rendering failure leaves the contract
/// approved without a document.
pub async fn approve_contract(state: &AppState, user: &SessionUser, id: Uuid) -> ApiResult<ContractRow> {
    let contract = visible_contract(state, id, user).await?;
    if contract.farmer_id != user.id {
        return Err(ApiError::forbidden("Only the farmer of this contract can approve it"));
    }

    let flipped = state.store(move |db| db.approve_contract(id)).await?;
    if flipped {
        info!("{} ({}) approved contract {}", user.username, user.id, id);
        if let Err(e) = attach_document(state, id).await {
            warn!("contract {} approved without a document: {:#}", id, e);
        }
    }

    let contract = load_contract(state, id).await?;
    if flipped {
        // Open contract screens of both parties pick up the new status.
        publish_contract_counts(
            state.db(),
            state.dispatcher(),
            vec![contract.farmer_username.clone(), contract.buyer_username.clone()],
        )
        .await;
    }
    Ok(contract)
}

async fn attach_document(state: &AppState, id: Uuid) -> anyhow::Result<()> {
    let (contract, farmer, buyer) = blocking(state.db(), move |db| {
        let contract = db.get_contract(id)?.context("contract vanished during approval")?;
        let farmer = db.get_profile(contract.farmer_id)?;
        let buyer = db.get_profile(contract.buyer_id)?;
        Ok((contract, farmer, buyer))
    })
    .await?;

    let sheet = ContractSheet {
        farmer: Party::from_profile(farmer.as_ref(), &contract.farmer_username),
        buyer: Party::from_profile(buyer.as_ref(), &contract.buyer_username),
        contract: &contract,
    };
    let pdf = state.renderer.render(&sheet)?;
    let path = state.media.save_bytes(MediaFolder::Contract, "pdf", &pdf).await?;
    blocking(state.db(), move |db| db.attach_contract_document(id, &path)).await
}

// -- Transactions --

/// The payment, if `user` bought the contract it belongs to. Like
/// [`buyer_contract`], strangers are told it does not exist.
async fn buyer_transaction(state: &AppState, id: Uuid, user: &SessionUser) -> ApiResult<TransactionRow> {
    let tx = state
        .store(move |db| db.get_transaction(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Transaction not found"))?;
    match buyer_contract(state, tx.contract_id, user).await {
        Ok(_) => Ok(tx),
        Err(ApiError::NotFound(_)) => Err(ApiError::not_found("Transaction not found")),
        Err(e) => Err(e),
    }
}

fn transaction_list(state: &AppState, rows: Vec<TransactionRow>) -> Json<Value> {
    let data: Vec<TransactionView> = rows.into_iter().map(|row| views::transaction(&state.media, row)).collect();
    Json(json!({ "data": data }))
}

pub async fn contract_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(contract_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    visible_contract(&state, contract_id, &user).await?;
    let rows = state.store(move |db| db.list_transactions_for_contract(contract_id)).await?;
    Ok(transaction_list(&state, rows))
}

pub async fn my_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<Value>> {
    let user_id = user.id;
    let rows = state.store(move |db| db.list_transactions_for_user(user_id)).await?;
    Ok(transaction_list(&state, rows))
}

pub async fn all_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    let rows = state.store(|db| db.list_transactions()).await?;
    Ok(transaction_list(&state, rows))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ValidJson(req): ValidJson<CreateTransactionRequest>,
) -> ApiResult<impl IntoResponse> {
    buyer_contract(&state, req.contract_id, &user).await?;
    let receipt = req.receipt.as_ref().ok_or_else(|| ApiError::field("receipt", "No file was submitted."))?;
    let receipt = state.media.save(MediaFolder::Receipt, "receipt", receipt).await?;

    let tx = NewTransaction {
        contract_id: req.contract_id,
        receipt,
        description: req.description,
        date: req.date,
        amount: req.amount,
        reference_number: req.reference_number,
    };
    let row = state.store(move |db| db.create_transaction(&tx)).await?;

    info!("{} ({}) recorded payment of {} on contract {}", user.username, user.id, row.amount, row.contract_id);
    Ok((StatusCode::CREATED, Json(views::transaction(&state.media, row))))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
    ValidJson(req): ValidJson<UpdateTransactionRequest>,
) -> ApiResult<Json<TransactionView>> {
    buyer_transaction(&state, id, &user).await?;

    let changes = TransactionChanges {
        receipt: state.media.save_opt(MediaFolder::Receipt, "receipt", req.receipt.as_ref()).await?,
        description: req.description,
        date: req.date,
        amount: req.amount,
        reference_number: req.reference_number,
    };
    let row = state
        .store(move |db| db.update_transaction(id, &changes))
        .await?
        .ok_or_else(|| ApiError::not_found("Transaction not found"))?;
    Ok(Json(views::transaction(&state.media, row)))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    buyer_transaction(&state, id, &user).await?;
    state.store(move |db| db.delete_transaction(id)).await?;
    info!("{} ({}) deleted transaction {}", user.username, user.id, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn payment_progress(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(contract_id): Path<Uuid>,
) -> ApiResult<Json<PaymentProgress>> {
    let contract = visible_contract(&state, contract_id, &user).await?;
    let total_paid = state.store(move |db| db.total_paid(contract_id)).await?;
    Ok(Json(PaymentProgress::compute(contract.id, contract.nego_price, contract.quantity, total_paid)))
}

// -- Farmer progress --

pub async fn contract_progress(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(contract_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    visible_contract(&state, contract_id, &user).await?;
    let rows = state.store(move |db| db.list_progress_for_contract(contract_id)).await?;
    let data: Vec<ProgressView> = rows.into_iter().map(|row| views::progress(&state.media, row)).collect();
    Ok(Json(json!({ "data": data })))
}

pub async fn all_progress(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    let rows = state.store(|db| db.list_progress()).await?;
    let data: Vec<ProgressView> = rows.into_iter().map(|row| views::progress(&state.media, row)).collect();
    Ok(Json(json!({ "data": data })))
}

pub async fn create_progress(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ValidJson(req): ValidJson<CreateProgressRequest>,
) -> ApiResult<impl IntoResponse> {
    let contract = visible_contract(&state, req.contract_id, &user).await?;
    if contract.farmer_id != user.id {
        return Err(ApiError::forbidden("Only the farmer of this contract can report progress"));
    }

    let progress = NewProgress {
        farmer_id: user.id,
        contract_id: Some(contract.id),
        current_status: req.current_status,
        date: req.date,
        notes: req.notes,
        image: state.media.save_opt(MediaFolder::ProgressImage, "image", req.image.as_ref()).await?,
    };
    let row = state.store(move |db| db.create_progress(&progress)).await?;

    info!("{} ({}) reported progress on contract {}", user.username, user.id, contract.id);
    Ok((StatusCode::CREATED, Json(views::progress(&state.media, row))))
}

pub async fn delete_progress(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let progress = state
        .store(move |db| db.get_progress(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Progress entry not found"))?;
    if progress.farmer_id != user.id {
        return Err(ApiError::forbidden("Only the author can delete a progress entry"));
    }
    state.store(move |db| db.delete_progress(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Confirms a farmer's live photo against the stored profile image. The
/// comparison itself is delegated; locally both images only have to exist.
pub async fn face_match(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    ValidJson(req): ValidJson<FaceMatchRequest>,
) -> ApiResult<Json<FaceMatchResponse>> {
    require_farmer(&user)?;
    let image = req.image.as_ref().ok_or_else(|| ApiError::bad_request("No image provided"))?;
    media::decode("image", image)?;

    let user_id = user.id;
    let profile = state
        .store(move |db| db.get_profile(user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Farmer profile not found"))?;
    let stored = profile
        .image
        .ok_or_else(|| ApiError::bad_request("No profile image on record to compare against"))?;
    if !state.media.exists(&stored).await {
        return Err(ApiError::Internal(anyhow::anyhow!("Could not read stored image {}", stored)));
    }

    info!("{} ({}) passed face verification", user.username, user.id);
    Ok(Json(FaceMatchResponse { verification: true }))
}
