use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Profile, ProfileSnapshot, Role, User};

// -- JWT Claims --

/// JWT claims shared across greenpact-api (REST middleware) and
/// greenpact-gateway (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub kind: TokenKind,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

// -- Uploads --

/// A file carried inline in a JSON body.
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    pub filename: String,
    /// Base64 (standard alphabet) file content.
    pub data: String,
}

// -- Auth --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignupRole {
    Farmer,
    Contractor,
}

impl From<SignupRole> for Role {
    fn from(role: SignupRole) -> Self {
        match role {
            SignupRole::Farmer => Role::Farmer,
            SignupRole::Contractor => Role::Contractor,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 3, max = 32, message = "Username must be 3 to 32 characters"))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: SignupRole,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 6, max = 15, message = "Phone number must be 6 to 15 characters"))]
    pub phoneno: String,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(equal = 15, message = "GSTIN must be 15 characters"))]
    pub gstin: Option<String>,
    pub image: Option<Attachment>,
    pub aadhar_image: Option<Attachment>,
    pub signature: Option<Attachment>,
    pub screenshot: Option<Attachment>,
    pub qr_code_image: Option<Attachment>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Username, or a phone number when all digits.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(rename = "Success")]
    pub success: String,
    pub data: User,
    pub role: Role,
    pub profile: Option<Profile>,
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginResponse {
    pub role: Role,
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: String,
}

// -- Profiles --

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub address: Option<String>,
    #[validate(length(equal = 15, message = "GSTIN must be 15 characters"))]
    pub gstin: Option<String>,
    pub image: Option<Attachment>,
    pub screenshot: Option<Attachment>,
    pub aadhar_image: Option<Attachment>,
    pub signature: Option<Attachment>,
    pub qr_code_image: Option<Attachment>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub data: Profile,
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    pub is_verified: bool,
}

/// Profiles grouped by role, as returned by the admin listings.
#[derive(Debug, Default, Serialize)]
pub struct ProfilesByRole {
    pub farmer: Vec<Profile>,
    pub contractor: Vec<Profile>,
}

// -- Listings --

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCropRequest {
    #[validate(length(min = 1, max = 256))]
    pub crop_name: String,
    #[validate(range(min = 0))]
    pub crop_price: i64,
    #[validate(range(min = 1))]
    pub quantity: i64,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub description: String,
    pub harvested_time: NaiveDate,
    #[validate(length(min = 1, max = 150))]
    pub location: String,
    pub crop_image: Option<Attachment>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCropRequest {
    #[validate(length(min = 1, max = 256))]
    pub crop_name: Option<String>,
    #[validate(range(min = 0))]
    pub crop_price: Option<i64>,
    #[validate(range(min = 1))]
    pub quantity: Option<i64>,
    #[validate(length(max = 200))]
    pub description: Option<String>,
    pub harvested_time: Option<NaiveDate>,
    #[validate(length(min = 1, max = 150))]
    pub location: Option<String>,
    pub crop_image: Option<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CropView {
    pub crop_id: Uuid,
    pub crop_name: String,
    pub publisher: User,
    pub publisher_profile: Option<ProfileSnapshot>,
    pub crop_image: Option<String>,
    pub crop_price: i64,
    pub quantity: i64,
    pub description: String,
    pub harvested_time: NaiveDate,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDemandRequest {
    #[validate(length(min = 1, max = 256))]
    pub crop_name: String,
    #[validate(range(min = 0))]
    pub crop_price: i64,
    #[validate(length(min = 1, max = 15))]
    pub contact_no: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    #[validate(length(max = 200))]
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, max = 150))]
    pub location: String,
    pub harvested_time: NaiveDate,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateDemandRequest {
    #[validate(length(min = 1, max = 256))]
    pub crop_name: Option<String>,
    #[validate(range(min = 0))]
    pub crop_price: Option<i64>,
    #[validate(length(min = 1, max = 15))]
    pub contact_no: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: Option<i64>,
    #[validate(length(max = 200))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 150))]
    pub location: Option<String>,
    pub harvested_time: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemandView {
    pub demand_id: Uuid,
    pub crop_name: String,
    pub demand_user: User,
    pub contractor_profile: Option<ProfileSnapshot>,
    pub crop_price: i64,
    pub contact_no: String,
    pub quantity: i64,
    pub description: String,
    pub location: String,
    pub harvested_time: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Market prices --

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PricePage {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<serde_json::Value>,
}

// -- Contracts --

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContractRequest {
    #[validate(length(min = 1))]
    pub farmer_username: String,
    pub crop_id: Uuid,
    #[validate(range(min = 1, message = "Price must be positive"))]
    pub nego_price: i64,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i64,
    #[validate(length(min = 1))]
    pub delivery_address: String,
    pub delivery_date: NaiveDate,
    #[serde(default)]
    pub terms: Vec<String>,
}

/// Partial contract update. Parties, crop and approval are not part of it.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateContractRequest {
    #[validate(range(min = 1, message = "Price must be positive"))]
    pub nego_price: Option<i64>,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: Option<i64>,
    #[validate(length(min = 1))]
    pub delivery_address: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub terms: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractView {
    pub contract_id: Uuid,
    pub farmer_username: String,
    pub farmer_name: String,
    pub buyer_username: String,
    pub buyer_name: String,
    pub crop_id: Uuid,
    pub crop_name: String,
    pub nego_price: i64,
    pub quantity: i64,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,
    pub delivery_address: String,
    pub delivery_date: NaiveDate,
    pub terms: Vec<String>,
    pub status: bool,
    pub qr_code: String,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveContractRequest {
    pub contract_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransactionRequest {
    pub contract_id: Uuid,
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount: i64,
    pub date: NaiveDate,
    #[validate(length(min = 1, max = 255))]
    pub reference_number: String,
    #[serde(default)]
    pub description: String,
    pub receipt: Option<Attachment>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTransactionRequest {
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount: Option<i64>,
    pub date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 255))]
    pub reference_number: Option<String>,
    pub description: Option<String>,
    pub receipt: Option<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub buyer: String,
    pub farmer: String,
    pub receipt: String,
    pub description: String,
    pub date: NaiveDate,
    pub amount: i64,
    pub reference_number: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProgressRequest {
    pub contract_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub current_status: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: String,
    pub image: Option<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    pub id: Uuid,
    pub farmer: String,
    pub contract_id: Option<Uuid>,
    pub crop_name: Option<String>,
    pub current_status: String,
    pub date: NaiveDate,
    pub notes: String,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FaceMatchRequest {
    pub image: Option<Attachment>,
}

#[derive(Debug, Serialize)]
pub struct FaceMatchResponse {
    #[serde(rename = "Verification")]
    pub verification: bool,
}

// -- Chat --

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoomRequest {
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    #[serde(rename = "Success")]
    pub success: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomProfile {
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRoomView {
    pub name: String,
    pub chat_user: Option<String>,
    pub profile: Option<RoomProfile>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendChatRequest {
    #[validate(length(min = 1, max = 4000))]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    pub id: i64,
    pub sender: String,
    pub room: String,
    pub message: String,
    pub is_read: bool,
    pub timestamp: DateTime<Utc>,
}

// -- Ratings --

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRatingRequest {
    #[validate(length(min = 1))]
    pub rated_user: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rate: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<Attachment>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateRatingRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rate: Option<i64>,
    pub description: Option<String>,
    /// Appended to the rating's existing images.
    #[serde(default)]
    pub images: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingImageView {
    pub id: Uuid,
    pub image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingView {
    pub id: Uuid,
    pub rated_user: String,
    pub rating_user: String,
    pub rate: i64,
    pub description: String,
    pub images: Vec<RatingImageView>,
    pub created_at: DateTime<Utc>,
}

// -- Complaints --

#[derive(Debug, Deserialize, Validate)]
pub struct CreateComplaintRequest {
    pub accused_username: Option<String>,
    #[validate(length(min = 1, max = 30))]
    pub category: Option<String>,
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(length(min = 1, max = 10))]
    pub priority: Option<String>,
    pub proof: Option<Attachment>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateComplaintRequest {
    pub accused_username: Option<String>,
    #[validate(length(min = 1, max = 30))]
    pub category: Option<String>,
    #[validate(length(min = 1))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 10))]
    pub priority: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub status: Option<String>,
    pub admin_notes: Option<String>,
    pub proof: Option<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplaintView {
    pub id: Uuid,
    pub complainant: String,
    pub accused: Option<String>,
    pub category: String,
    pub description: String,
    pub proof: Option<String>,
    pub priority: String,
    pub status: String,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Greenbot --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GreenbotRequest {
    #[validate(length(min = 1))]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct GreenbotResponse {
    pub reply: String,
    pub history: Vec<ChatTurn>,
}
