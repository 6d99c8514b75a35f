pub mod auth;
pub mod chat;
pub mod complaints;
pub mod config;
pub mod contract_channel;
pub mod contracts;
pub mod crops;
pub mod demands;
pub mod documents;
pub mod error;
pub mod greenbot;
pub mod media;
pub mod middleware;
pub mod prices;
pub mod ratings;
pub mod routes;
pub mod state;
pub mod users;
pub mod views;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as B64;
    use chrono::NaiveDate;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use uuid::Uuid;

    use greenpact_db::Database;
    use greenpact_db::models::{ContractRow, NewAccount, NewContract, NewCrop, NewProfile};
    use greenpact_gateway::auth::issue_token;
    use greenpact_gateway::{Dispatcher, Gateway, SessionUser};
    use greenpact_types::api::{Attachment, ChatTurn, TokenKind};
    use greenpact_types::models::Role;

    use crate::config::Config;
    use crate::documents::{ContractRenderer, ContractSheet, PdfContractRenderer};
    use crate::greenbot::Advisor;
    use crate::media::MediaStore;
    use crate::prices::{PriceFeed, PriceFilter};
    use crate::state::{AppState, AppStateInner};

    /// Replies with the last user turn.
    pub struct EchoAdvisor;

    #[async_trait]
    impl Advisor for EchoAdvisor {
        async fn complete(&self, messages: &[ChatTurn]) -> Result<String> {
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            Ok(format!("echo: {}", last))
        }
    }

    pub struct FailingAdvisor;

    #[async_trait]
    impl Advisor for FailingAdvisor {
        async fn complete(&self, _messages: &[ChatTurn]) -> Result<String> {
            bail!("upstream unavailable")
        }
    }

    /// Three wheat records from one market, whatever the filter.
    pub struct FixedPrices;

    #[async_trait]
    impl PriceFeed for FixedPrices {
        async fn records(&self, _filter: &PriceFilter) -> Result<Vec<Value>> {
            Ok((0..3)
                .map(|i| {
                    json!({
                        "state": "Punjab",
                        "district": "Ludhiana",
                        "market": "Azadpur",
                        "commodity": "Wheat",
                        "variety": "Dara",
                        "grade": "FAQ",
                        "modal_price": 2200 + i,
                    })
                })
                .collect())
        }
    }

    pub struct FailingRenderer;

    impl ContractRenderer for FailingRenderer {
        fn render(&self, _sheet: &ContractSheet<'_>) -> Result<Vec<u8>> {
            bail!("renderer offline")
        }
    }

    pub struct TestApp {
        pub state: AppState,
        _media: TempDir,
    }

    pub async fn app() -> TestApp {
        app_with(Arc::new(EchoAdvisor), Arc::new(FixedPrices), Arc::new(PdfContractRenderer)).await
    }

    pub async fn app_with(
        advisor: Arc<dyn Advisor>,
        prices: Arc<dyn PriceFeed>,
        renderer: Arc<dyn ContractRenderer>,
    ) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let media_dir = dir.path().to_string_lossy().into_owned();
        let config = Config::from_lookup(|key| match key {
            "GREENPACT_JWT_SECRET" => Some("test-secret".into()),
            "GREENPACT_MEDIA_DIR" => Some(media_dir.clone()),
            "GREENPACT_PUBLIC_URL" => Some("http://testserver".into()),
            _ => None,
        })
        .unwrap();

        let db = Arc::new(Database::open_in_memory().unwrap());
        let media = MediaStore::new(config.media_dir.clone(), &config.public_url).await.unwrap();
        let state = Arc::new(AppStateInner {
            gateway: Gateway::new(db, Dispatcher::new(), &config.jwt_secret),
            config,
            media,
            renderer,
            advisor,
            prices,
        });
        TestApp { state, _media: dir }
    }

    /// A farmer or contractor with a profile, optionally already verified.
    pub fn account(state: &AppState, username: &str, role: Role, verified: bool) -> SessionUser {
        let profile = NewProfile {
            name: username.to_string(),
            address: "Village road".into(),
            phone: format!("70{:08}", username.bytes().map(u32::from).sum::<u32>() * 7 + username.len() as u32),
            gstin: role.is_contractor().then(|| format!("{:0>15}", username)),
            ..Default::default()
        };
        let row = state
            .db()
            .create_account(&NewAccount { username, email: None, password_hash: "h", role }, Some(profile))
            .unwrap();
        if verified {
            state.db().set_verified(row.id, true).unwrap();
        }
        SessionUser { id: row.id, username: row.username, role: row.role }
    }

    pub fn admin(state: &AppState) -> SessionUser {
        let row = state
            .db()
            .create_account(
                &NewAccount { username: "root", email: None, password_hash: "h", role: Role::Admin },
                None,
            )
            .unwrap();
        SessionUser { id: row.id, username: row.username, role: row.role }
    }

    pub fn token(state: &AppState, user: &SessionUser) -> String {
        issue_token(
            &state.config.jwt_secret,
            user.id,
            &user.username,
            user.role,
            TokenKind::Access,
            chrono::Duration::hours(1),
        )
        .unwrap()
    }

    pub fn crop_of(state: &AppState, farmer: &SessionUser) -> Uuid {
        let crop = NewCrop {
            crop_name: "Wheat".into(),
            image: None,
            price: 2200,
            quantity: 50,
            description: String::new(),
            harvested_time: NaiveDate::from_ymd_opt(2026, 4, 10).unwrap(),
            location: "Rampur".into(),
        };
        state.db().create_crop(farmer.id, &crop).unwrap().id
    }

    pub fn contract_between(state: &AppState, farmer: &SessionUser, buyer: &SessionUser, crop: Uuid) -> ContractRow {
        let contract = NewContract {
            farmer_id: farmer.id,
            buyer_id: buyer.id,
            crop_id: crop,
            nego_price: 2100,
            quantity: 10,
            delivery_address: "Mandi Road".into(),
            delivery_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            terms: vec!["Moisture below 12%".into()],
        };
        state.db().create_contract(&contract).unwrap()
    }

    pub fn attachment(filename: &str, bytes: &[u8]) -> Attachment {
        Attachment { filename: filename.into(), data: B64.encode(bytes) }
    }

    /// The JSON form of [`attachment`].
    pub fn encoded(filename: &str, bytes: &[u8]) -> Value {
        json!({ "filename": filename, "data": B64.encode(bytes) })
    }
}
