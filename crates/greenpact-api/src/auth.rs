use std::sync::Arc;

use anyhow::Result;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use tracing::{info, warn};

use greenpact_db::Database;
use greenpact_db::models::{NewAccount, NewProfile, UserRow};
use greenpact_gateway::auth::{decode_token, issue_token};
use greenpact_types::api::{
    AdminLoginResponse, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, SignupRequest, TokenKind,
};
use greenpact_types::models::Role;

use crate::config::Config;
use crate::error::{ApiError, ApiResult, FieldErrors, ValidJson};
use crate::media::MediaFolder;
use crate::state::AppState;
use crate::views;

const REQUIRED: &str = "This field is required.";

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("unreadable password hash: {}", e);
            false
        }
    }
}

fn token_pair(config: &Config, user: &UserRow) -> Result<(String, String)> {
    let access = issue_token(
        &config.jwt_secret,
        user.id,
        &user.username,
        user.role,
        TokenKind::Access,
        config.access_ttl,
    )?;
    let refresh = issue_token(
        &config.jwt_secret,
        user.id,
        &user.username,
        user.role,
        TokenKind::Refresh,
        config.refresh_ttl,
    )?;
    Ok((access, refresh))
}

pub async fn signup(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let role = Role::from(req.role);
    let mut errors = FieldErrors::new();
    let mut missing = |field: &str| errors.entry(field.to_string()).or_default().push(REQUIRED.to_string());

    if req.aadhar_image.is_none() {
        missing("aadhar_image");
    }
    if req.signature.is_none() {
        missing("signature");
    }
    match role {
        Role::Farmer if req.qr_code_image.is_none() => missing("qr_code_image"),
        Role::Contractor if req.gstin.is_none() => missing("gstin"),
        _ => {}
    }

    let gstin = if role.is_contractor() { req.gstin.clone() } else { None };
    let (username, phone, gstin_check) = (req.username.clone(), req.phoneno.clone(), gstin.clone());
    let (username_taken, phone_taken, gstin_taken) = state
        .store(move |db| {
            let gstin_taken = match &gstin_check {
                Some(g) => db.gstin_taken(g)?,
                None => false,
            };
            Ok((db.username_taken(&username)?, db.phone_taken(&phone)?, gstin_taken))
        })
        .await?;

    let mut conflict = |field: &str, message: &str| errors.entry(field.to_string()).or_default().push(message.to_string());
    if username_taken {
        conflict("username", "A user with that username already exists.");
    }
    if phone_taken {
        conflict("phoneno", "A user with this phone number already exists.");
    }
    if gstin_taken {
        conflict("gstin", "A contractor with this GSTIN already exists.");
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let media = &state.media;
    let image_folder = if role.is_farmer() { MediaFolder::FarmerImage } else { MediaFolder::ContractorImage };
    let mut profile = NewProfile {
        name: req.name,
        address: req.address,
        phone: req.phoneno,
        image: media.save_opt(image_folder, "image", req.image.as_ref()).await?,
        aadhar_image: media.save_opt(MediaFolder::Aadhar, "aadhar_image", req.aadhar_image.as_ref()).await?,
        signature: media.save_opt(MediaFolder::Signature, "signature", req.signature.as_ref()).await?,
        gstin,
        ..Default::default()
    };
    if role.is_farmer() {
        profile.screenshot = media.save_opt(MediaFolder::Screenshot, "screenshot", req.screenshot.as_ref()).await?;
        profile.qr_code_image = media.save_opt(MediaFolder::QrCode, "qr_code_image", req.qr_code_image.as_ref()).await?;
    }

    let password_hash = hash_password(&req.password)?;
    let (username, email) = (req.username, req.email);
    let user = state
        .store(move |db| {
            db.create_account(
                &NewAccount { username: &username, email: email.as_deref(), password_hash: &password_hash, role },
                Some(profile),
            )
        })
        .await?;

    info!("{} ({}) signed up as {}", user.username, user.id, user.role);
    Ok((StatusCode::CREATED, Json(json!({ "success": "User registered successfully" }))))
}

/// Looks the account up by username, or by phone number when the
/// identifier is all digits, and checks the password.
async fn authenticate(state: &AppState, req: &LoginRequest) -> ApiResult<UserRow> {
    let identifier = req.username.trim().to_string();
    let by_phone = !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit());

    let user = state
        .store(move |db| {
            if by_phone {
                db.get_user_by_phone(&identifier)
            } else {
                db.get_user_by_username(&identifier)
            }
        })
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid credentials"))?;

    if !verify_password(&req.password, &user.password) {
        return Err(ApiError::bad_request("Invalid credentials"));
    }
    Ok(user)
}

pub async fn login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = authenticate(&state, &req).await?;

    let profile = if user.role.has_profile() {
        let user_id = user.id;
        let row = state.store(move |db| db.get_profile(user_id)).await?;
        match row {
            Some(row) if row.is_verified => views::profile(&state.media, row),
            _ => {
                info!("{} ({}) tried to log in before verification", user.username, user.id);
                return Err(ApiError::unauthorized("Wait for the admin to verify your profile"));
            }
        }
    } else {
        None
    };

    let (access, refresh) = token_pair(&state.config, &user)?;
    info!("{} ({}) logged in", user.username, user.id);

    Ok((
        StatusCode::ACCEPTED,
        Json(LoginResponse {
            success: "Login successful".into(),
            data: views::user(&user),
            role: user.role,
            profile,
            access,
            refresh,
        }),
    ))
}

pub async fn admin_login(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> ApiResult<Json<AdminLoginResponse>> {
    let user = authenticate(&state, &req).await?;
    if !user.role.is_admin() {
        return Err(ApiError::forbidden("Only administrators can log in here"));
    }

    let (access, refresh) = token_pair(&state.config, &user)?;
    info!("administrator {} ({}) logged in", user.username, user.id);
    Ok(Json(AdminLoginResponse { role: user.role, access, refresh }))
}

pub async fn refresh(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let claims = decode_token(&state.config.jwt_secret, &req.refresh, TokenKind::Refresh)
        .ok_or_else(|| ApiError::unauthorized("Token is invalid or expired"))?;

    let user_id = claims.sub;
    let user = state
        .store(move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let access = issue_token(
        &state.config.jwt_secret,
        user.id,
        &user.username,
        user.role,
        TokenKind::Access,
        state.config.access_ttl,
    )?;
    Ok(Json(RefreshResponse { access }))
}

/// Creates the configured administrator account if it does not exist yet.
pub fn bootstrap_admin(db: &Arc<Database>, config: &Config) -> Result<()> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    if let Some(existing) = db.get_user_by_username(username)? {
        if !existing.role.is_admin() {
            warn!("configured admin username {} belongs to a {} account", username, existing.role);
        }
        return Ok(());
    }

    let password_hash = hash_password(password)?;
    let admin = db.create_account(
        &NewAccount { username, email: None, password_hash: &password_hash, role: Role::Admin },
        None,
    )?;
    info!("Created administrator {} ({})", admin.username, admin.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_only_their_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn bootstrap_creates_admin_once() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut config = Config::from_lookup(|k| (k == "GREENPACT_JWT_SECRET").then(|| "s".to_string())).unwrap();

        bootstrap_admin(&db, &config).unwrap();
        assert!(!db.any_admin().unwrap());

        config.admin_username = Some("root".into());
        config.admin_password = Some("super-secret".into());
        bootstrap_admin(&db, &config).unwrap();
        bootstrap_admin(&db, &config).unwrap();

        let admin = db.get_user_by_username("root").unwrap().unwrap();
        assert!(admin.role.is_admin());
        assert!(verify_password("super-secret", &admin.password));
        assert!(db.get_profile(admin.id).unwrap().is_none());
    }
}
