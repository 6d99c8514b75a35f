use std::sync::Arc;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, warn};
use uuid::Uuid;

use greenpact_db::Database;
use greenpact_types::api::{Claims, TokenKind};
use greenpact_types::models::Role;

use crate::connection::ChannelError;
use crate::session::SessionUser;
use crate::store::blocking;

pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    username: &str,
    role: Role,
    kind: TokenKind,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        kind,
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Decodes and checks signature, expiry and token kind.
pub fn decode_token(secret: &str, token: &str, kind: TokenKind) -> Option<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| debug!("token rejected: {}", e))
    .ok()?;

    (data.claims.kind == kind).then_some(data.claims)
}

/// Resolves an access token to a live account. Anything invalid, expired
/// or belonging to a removed user resolves to `None`.
pub async fn resolve_user(db: &Arc<Database>, secret: &str, token: &str) -> Option<SessionUser> {
    let claims = decode_token(secret, token, TokenKind::Access)?;
    let user_id = claims.sub;
    match blocking(db, move |db| db.get_user_by_id(user_id)).await {
        Ok(Some(user)) => Some(SessionUser {
            id: user.id,
            username: user.username,
            role: user.role,
        }),
        Ok(None) => {
            warn!("token for removed user {}", user_id);
            None
        }
        Err(e) => {
            warn!("token lookup failed: {}", e);
            None
        }
    }
}

/// Identity offered with a WebSocket upgrade. No token leaves the connection
/// anonymous until a payload carries one; a token that does not resolve is
/// refused outright.
pub async fn handshake_user(
    db: &Arc<Database>,
    secret: &str,
    token: Option<&str>,
) -> Result<Option<SessionUser>, ChannelError> {
    match token {
        None => Ok(None),
        Some(token) => resolve_user(db, secret, token).await.map(Some).ok_or(ChannelError::Rejected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn token(kind: TokenKind, ttl: chrono::Duration) -> String {
        issue_token(SECRET, Uuid::new_v4(), "ravi", Role::Farmer, kind, ttl).unwrap()
    }

    #[test]
    fn access_token_round_trips() {
        let t = token(TokenKind::Access, chrono::Duration::hours(1));
        let claims = decode_token(SECRET, &t, TokenKind::Access).unwrap();
        assert_eq!(claims.username, "ravi");
        assert_eq!(claims.role, Role::Farmer);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let t = token(TokenKind::Refresh, chrono::Duration::hours(1));
        assert!(decode_token(SECRET, &t, TokenKind::Access).is_none());
        assert!(decode_token(SECRET, &t, TokenKind::Refresh).is_some());
    }

    #[test]
    fn expired_wrong_key_and_garbage_are_rejected() {
        let expired = token(TokenKind::Access, chrono::Duration::hours(-2));
        assert!(decode_token(SECRET, &expired, TokenKind::Access).is_none());

        let good = token(TokenKind::Access, chrono::Duration::hours(1));
        assert!(decode_token("other-secret", &good, TokenKind::Access).is_none());
        assert!(decode_token(SECRET, "not-a-jwt", TokenKind::Access).is_none());
    }

    #[tokio::test]
    async fn handshake_refuses_a_bad_token_but_allows_none() {
        let gw = crate::test_support::gateway();
        let kiran = crate::test_support::account(&gw, "kiran", Role::Contractor);
        let good = crate::test_support::token(&gw, &kiran);

        assert!(matches!(handshake_user(&gw.db, &gw.jwt_secret, None).await, Ok(None)));
        assert!(matches!(
            handshake_user(&gw.db, &gw.jwt_secret, Some("not-a-jwt")).await,
            Err(ChannelError::Rejected)
        ));
        let user = handshake_user(&gw.db, &gw.jwt_secret, Some(&good)).await.ok().flatten();
        assert_eq!(user, Some(kiran));
    }

    #[tokio::test]
    async fn removed_user_does_not_resolve() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let t = token(TokenKind::Access, chrono::Duration::hours(1));
        assert!(resolve_user(&db, SECRET, &t).await.is_none());
    }
}
