//! Row -> response conversions. Stored media paths become absolute URLs here.

use greenpact_db::models::{
    ComplaintRow, ContractRow, CropRow, DemandRow, NotificationRow, ProfileRow, ProgressRow, RatingRow,
    RoomPeerRow, SnapshotRow, TransactionRow, UserRow,
};
use greenpact_types::api::{
    ChatRoomView, ComplaintView, ContractView, CropView, DemandView, NotificationView, ProgressView,
    RatingImageView, RatingView, RoomProfile, TransactionView,
};
use greenpact_types::models::{ContractorProfile, FarmerProfile, Profile, ProfileSnapshot, Role, User};

use crate::media::MediaStore;

pub fn user(row: &UserRow) -> User {
    User {
        id: row.id,
        username: row.username.clone(),
        email: row.email.clone(),
        role: row.role,
        date_joined: row.created_at,
    }
}

/// `None` for administrators, who have no profile.
pub fn profile(media: &MediaStore, row: ProfileRow) -> Option<Profile> {
    let user = user(&row.user);
    match row.user.role {
        Role::Farmer => Some(Profile::Farmer(FarmerProfile {
            user,
            name: row.name,
            address: row.address,
            phoneno: row.phone,
            image: media.url_opt(row.image.as_deref()),
            screenshot: media.url_opt(row.screenshot.as_deref()),
            aadhar_image: media.url_opt(row.aadhar_image.as_deref()),
            signature: media.url_opt(row.signature.as_deref()),
            qr_code_image: media.url_opt(row.qr_code_image.as_deref()),
            is_verified: row.is_verified,
        })),
        Role::Contractor => Some(Profile::Contractor(ContractorProfile {
            user,
            name: row.name,
            address: row.address,
            phoneno: row.phone,
            image: media.url_opt(row.image.as_deref()),
            gstin: row.gstin.unwrap_or_default(),
            aadhar_image: media.url_opt(row.aadhar_image.as_deref()),
            signature: media.url_opt(row.signature.as_deref()),
            is_verified: row.is_verified,
        })),
        Role::Admin => None,
    }
}

fn snapshot(media: &MediaStore, row: SnapshotRow) -> ProfileSnapshot {
    ProfileSnapshot {
        name: row.name,
        address: row.address,
        phoneno: row.phone,
        image: media.url_opt(row.image.as_deref()),
        is_verified: row.is_verified,
    }
}

pub fn crop(media: &MediaStore, row: CropRow) -> CropView {
    CropView {
        crop_id: row.id,
        crop_name: row.crop_name,
        publisher: user(&row.owner),
        publisher_profile: row.owner_profile.map(|p| snapshot(media, p)),
        crop_image: media.url_opt(row.image.as_deref()),
        crop_price: row.price,
        quantity: row.quantity,
        description: row.description,
        harvested_time: row.harvested_time,
        location: row.location,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub fn demand(media: &MediaStore, row: DemandRow) -> DemandView {
    // Only contractors carry the profile shown next to a demand.
    let contractor_profile = match row.owner.role {
        Role::Contractor => row.owner_profile.map(|p| snapshot(media, p)),
        _ => None,
    };
    DemandView {
        demand_id: row.id,
        crop_name: row.crop_name,
        demand_user: user(&row.owner),
        contractor_profile,
        crop_price: row.price,
        contact_no: row.contact_no,
        quantity: row.quantity,
        description: row.description,
        location: row.location,
        harvested_time: row.harvested_time,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub fn contract(media: &MediaStore, row: ContractRow) -> ContractView {
    let total_price = row.total_price();
    ContractView {
        contract_id: row.id,
        farmer_username: row.farmer_username,
        farmer_name: row.farmer_name,
        buyer_username: row.buyer_username,
        buyer_name: row.buyer_name,
        crop_id: row.crop_id,
        crop_name: row.crop_name,
        nego_price: row.nego_price,
        quantity: row.quantity,
        total_price,
        created_at: row.created_at,
        delivery_address: row.delivery_address,
        delivery_date: row.delivery_date,
        terms: row.terms,
        status: row.status,
        qr_code: media.url_opt(row.farmer_qr.as_deref()).unwrap_or_default(),
        pdf_url: media.url_opt(row.document.as_deref()),
    }
}

pub fn contracts(media: &MediaStore, rows: Vec<ContractRow>) -> Vec<ContractView> {
    rows.into_iter().map(|row| contract(media, row)).collect()
}

pub fn transaction(media: &MediaStore, row: TransactionRow) -> TransactionView {
    TransactionView {
        id: row.id,
        contract_id: row.contract_id,
        buyer: row.buyer_username,
        farmer: row.farmer_username,
        receipt: media.url(&row.receipt),
        description: row.description,
        date: row.date,
        amount: row.amount,
        reference_number: row.reference_number,
    }
}

pub fn progress(media: &MediaStore, row: ProgressRow) -> ProgressView {
    ProgressView {
        id: row.id,
        farmer: row.farmer_username,
        contract_id: row.contract_id,
        crop_name: row.crop_name,
        current_status: row.current_status,
        date: row.date,
        notes: row.notes,
        image: media.url_opt(row.image.as_deref()),
    }
}

pub fn rating(media: &MediaStore, row: RatingRow) -> RatingView {
    RatingView {
        id: row.id,
        rated_user: row.rated_username,
        rating_user: row.rater_username,
        rate: row.rate,
        description: row.description,
        images: row
            .images
            .into_iter()
            .map(|img| RatingImageView { id: img.id, image: media.url(&img.image) })
            .collect(),
        created_at: row.created_at,
    }
}

pub fn complaint(media: &MediaStore, row: ComplaintRow) -> ComplaintView {
    ComplaintView {
        id: row.id,
        complainant: row.complainant_username,
        accused: row.accused_username,
        category: row.category,
        description: row.description,
        proof: media.url_opt(row.proof.as_deref()),
        priority: row.priority,
        status: row.status,
        admin_notes: row.admin_notes,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub fn notification(row: NotificationRow) -> NotificationView {
    NotificationView {
        id: row.seq,
        sender: row.sender_username,
        room: row.room,
        message: row.message,
        is_read: row.is_read,
        timestamp: row.created_at,
    }
}

pub fn room(media: &MediaStore, row: RoomPeerRow) -> ChatRoomView {
    let profile = row.peer_name.map(|name| RoomProfile {
        name,
        image: media.url_opt(row.peer_image.as_deref()),
    });
    ChatRoomView {
        name: row.name,
        chat_user: row.peer_username,
        profile,
    }
}
