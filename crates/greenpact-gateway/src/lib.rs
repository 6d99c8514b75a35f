pub mod auth;
pub mod chat;
pub mod connection;
pub mod dispatcher;
pub mod notifications;
pub mod relay;
pub mod session;
pub mod store;

use std::sync::Arc;

use greenpact_db::Database;

pub use connection::{ChannelError, ChannelHandler, ChannelResult, run_channel};
pub use dispatcher::Dispatcher;
pub use session::{Session, SessionUser};

/// What every persistent connection needs: the store, the broadcast fabric
/// and the key that signs access tokens.
#[derive(Clone)]
pub struct Gateway {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: Arc<str>,
}

impl Gateway {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, jwt_secret: &str) -> Self {
        Self {
            db,
            dispatcher,
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use greenpact_db::Database;
    use greenpact_db::models::{NewAccount, NewProfile};
    use greenpact_types::api::TokenKind;
    use greenpact_types::models::Role;

    use crate::auth::issue_token;
    use crate::{Dispatcher, Gateway, SessionUser};

    pub fn gateway() -> Gateway {
        Gateway::new(Arc::new(Database::open_in_memory().unwrap()), Dispatcher::new(), "test-secret")
    }

    pub fn account(gw: &Gateway, username: &str, role: Role) -> SessionUser {
        let profile = NewProfile {
            name: username.to_string(),
            address: "Village road".into(),
            phone: format!("98{:08}", username.len() * 1000 + username.bytes().map(usize::from).sum::<usize>()),
            ..Default::default()
        };
        let row = gw
            .db
            .create_account(&NewAccount { username, email: None, password_hash: "h", role }, Some(profile))
            .unwrap();
        SessionUser { id: row.id, username: row.username, role: row.role }
    }

    pub fn token(gw: &Gateway, user: &SessionUser) -> String {
        issue_token(
            &gw.jwt_secret,
            user.id,
            &user.username,
            user.role,
            TokenKind::Access,
            chrono::Duration::hours(1),
        )
        .unwrap()
    }
}
