//! Database row types. These map directly to SQLite rows, with ids, roles and
//! timestamps already parsed. Media columns hold paths relative to the media
//! root; turning them into URLs is the HTTP layer's job.

use chrono::{DateTime, NaiveDate, Utc};
use greenpact_types::models::Role;
use uuid::Uuid;

// -- Accounts --

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub user: UserRow,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub image: Option<String>,
    pub screenshot: Option<String>,
    pub aadhar_image: Option<String>,
    pub signature: Option<String>,
    pub qr_code_image: Option<String>,
    pub gstin: Option<String>,
    pub is_verified: bool,
}

/// The few profile columns embedded next to listings.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub image: Option<String>,
    pub is_verified: bool,
}

pub struct NewAccount<'a> {
    pub username: &'a str,
    pub email: Option<&'a str>,
    pub password_hash: &'a str,
    pub role: Role,
}

#[derive(Debug, Default)]
pub struct NewProfile {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub image: Option<String>,
    pub screenshot: Option<String>,
    pub aadhar_image: Option<String>,
    pub signature: Option<String>,
    pub qr_code_image: Option<String>,
    pub gstin: Option<String>,
}

/// Self-service profile fields. `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub address: Option<String>,
    pub gstin: Option<String>,
    pub image: Option<String>,
    pub screenshot: Option<String>,
    pub aadhar_image: Option<String>,
    pub signature: Option<String>,
    pub qr_code_image: Option<String>,
}

// -- Listings --

#[derive(Debug, Clone)]
pub struct CropRow {
    pub id: Uuid,
    pub owner: UserRow,
    pub owner_profile: Option<SnapshotRow>,
    pub crop_name: String,
    pub image: Option<String>,
    pub price: i64,
    pub quantity: i64,
    pub description: String,
    pub harvested_time: NaiveDate,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewCrop {
    pub crop_name: String,
    pub image: Option<String>,
    pub price: i64,
    pub quantity: i64,
    pub description: String,
    pub harvested_time: NaiveDate,
    pub location: String,
}

#[derive(Debug, Default)]
pub struct CropChanges {
    pub crop_name: Option<String>,
    pub image: Option<String>,
    pub price: Option<i64>,
    pub quantity: Option<i64>,
    pub description: Option<String>,
    pub harvested_time: Option<NaiveDate>,
    pub location: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DemandRow {
    pub id: Uuid,
    pub owner: UserRow,
    pub owner_profile: Option<SnapshotRow>,
    pub crop_name: String,
    pub price: i64,
    pub contact_no: String,
    pub quantity: i64,
    pub description: String,
    pub location: String,
    pub harvested_time: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewDemand {
    pub crop_name: String,
    pub price: i64,
    pub contact_no: String,
    pub quantity: i64,
    pub description: String,
    pub location: String,
    pub harvested_time: NaiveDate,
}

#[derive(Debug, Default)]
pub struct DemandChanges {
    pub crop_name: Option<String>,
    pub price: Option<i64>,
    pub contact_no: Option<String>,
    pub quantity: Option<i64>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub harvested_time: Option<NaiveDate>,
}

// -- Contracts --

#[derive(Debug, Clone)]
pub struct ContractRow {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub farmer_username: String,
    pub farmer_name: String,
    /// The farmer's payment QR code, shown on every contract view.
    pub farmer_qr: Option<String>,
    pub buyer_id: Uuid,
    pub buyer_username: String,
    pub buyer_name: String,
    pub crop_id: Uuid,
    pub crop_name: String,
    pub nego_price: i64,
    pub quantity: i64,
    pub delivery_address: String,
    pub delivery_date: NaiveDate,
    pub terms: Vec<String>,
    pub status: bool,
    pub document: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ContractRow {
    pub fn total_price(&self) -> i64 {
        self.nego_price.saturating_mul(self.quantity)
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.farmer_id == user_id || self.buyer_id == user_id
    }
}

pub struct NewContract {
    pub farmer_id: Uuid,
    pub buyer_id: Uuid,
    pub crop_id: Uuid,
    pub nego_price: i64,
    pub quantity: i64,
    pub delivery_address: String,
    pub delivery_date: NaiveDate,
    pub terms: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ContractChanges {
    pub nego_price: Option<i64>,
    pub quantity: Option<i64>,
    pub delivery_address: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub terms: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub buyer_id: Uuid,
    pub buyer_username: String,
    pub farmer_username: String,
    pub receipt: String,
    pub description: String,
    pub date: NaiveDate,
    pub amount: i64,
    pub reference_number: String,
}

pub struct NewTransaction {
    pub contract_id: Uuid,
    pub receipt: String,
    pub description: String,
    pub date: NaiveDate,
    pub amount: i64,
    pub reference_number: String,
}

#[derive(Debug, Default)]
pub struct TransactionChanges {
    pub receipt: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<i64>,
    pub reference_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressRow {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub farmer_username: String,
    pub contract_id: Option<Uuid>,
    pub crop_name: Option<String>,
    pub current_status: String,
    pub date: NaiveDate,
    pub notes: String,
    pub image: Option<String>,
}

pub struct NewProgress {
    pub farmer_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub current_status: String,
    pub date: NaiveDate,
    pub notes: String,
    pub image: Option<String>,
}

// -- Chat --

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A room seen from one participant: who sits on the other side.
#[derive(Debug, Clone)]
pub struct RoomPeerRow {
    pub name: String,
    pub peer_username: Option<String>,
    pub peer_name: Option<String>,
    pub peer_image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub seq: i64,
    pub room: String,
    pub sender_username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub seq: i64,
    pub recipient_id: Uuid,
    pub sender_username: String,
    pub room: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of persisting one chat message.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub message: MessageRow,
    /// Every other participant, each of whom got a notification row.
    pub recipients: Vec<UserRow>,
}

// -- Ratings --

#[derive(Debug, Clone)]
pub struct RatingImageRow {
    pub id: Uuid,
    pub rating_id: Uuid,
    pub image: String,
}

#[derive(Debug, Clone)]
pub struct RatingRow {
    pub id: Uuid,
    pub rated_id: Uuid,
    pub rated_username: String,
    pub rater_id: Uuid,
    pub rater_username: String,
    pub rate: i64,
    pub description: String,
    pub images: Vec<RatingImageRow>,
    pub created_at: DateTime<Utc>,
}

// -- Complaints --

#[derive(Debug, Clone)]
pub struct ComplaintRow {
    pub id: Uuid,
    pub complainant_id: Uuid,
    pub complainant_username: String,
    pub accused_id: Option<Uuid>,
    pub accused_username: Option<String>,
    pub category: String,
    pub description: String,
    pub proof: Option<String>,
    pub priority: String,
    pub status: String,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComplaintRow {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.complainant_id == user_id || self.accused_id == Some(user_id)
    }
}

pub struct NewComplaint {
    pub complainant_id: Uuid,
    pub accused_id: Option<Uuid>,
    pub category: Option<String>,
    pub description: String,
    pub proof: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Default)]
pub struct ComplaintChanges {
    pub accused_id: Option<Uuid>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub proof: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub admin_notes: Option<String>,
}
