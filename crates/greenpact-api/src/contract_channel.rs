use async_trait::async_trait;
use tracing::info;

use greenpact_gateway::auth::resolve_user;
use greenpact_gateway::connection::parse_payload;
use greenpact_gateway::{ChannelError, ChannelHandler, ChannelResult, Session};
use greenpact_types::api::ContractView;
use greenpact_types::events::{ContractCommand, ContractFrame, Group, RelayEvent};

use crate::contracts::approve_contract;
use crate::state::AppState;
use crate::views;

/// Contract list and approval over a persistent connection. Any payload may
/// carry a token, which (re)authenticates the connection.
pub struct ContractChannel {
    state: AppState,
}

impl ContractChannel {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    async fn contracts(&self, session: &Session) -> Result<Vec<ContractView>, ChannelError> {
        let user_id = session.user().ok_or(ChannelError::Rejected)?.id;
        let rows = self
            .state
            .store(move |db| db.list_contracts_for(user_id))
            .await
            .map_err(|e| ChannelError::Failed(e.to_string()))?;
        Ok(views::contracts(&self.state.media, rows))
    }
}

#[async_trait]
impl ChannelHandler for ContractChannel {
    type Frame = ContractFrame;

    fn name(&self) -> &'static str {
        "contract"
    }

    async fn on_message(&mut self, session: &mut Session, text: &str) -> ChannelResult<ContractFrame> {
        let cmd: ContractCommand = parse_payload(text)?;

        if let Some(token) = cmd.token.as_deref() {
            let user = resolve_user(self.state.db(), &self.state.config.jwt_secret, token)
                .await
                .ok_or(ChannelError::Rejected)?;
            if let Some(previous) = session.user().filter(|current| current.id != user.id).cloned() {
                session.leave(&Group::Contracts(previous.username)).await;
                info!("contract connection switched from {} to {}", previous.id, user.id);
            }
            session.authenticate(user);
        }
        let user = session.user().cloned().ok_or(ChannelError::Rejected)?;

        let group = Group::Contracts(user.username.clone());
        if !session.is_member(&group) {
            session.join(group).await;
            info!("{} ({}) subscribed to contract updates", user.username, user.id);
        }

        match cmd.action.as_deref() {
            Some("fetch_contracts") => Ok(vec![ContractFrame::Contracts { data: self.contracts(session).await? }]),
            Some("approve_contract") | Some("approve_contracts") => {
                let id = cmd
                    .contract_id
                    .ok_or_else(|| ChannelError::Failed("contract_id is required".into()))?;
                approve_contract(&self.state, &user, id)
                    .await
                    .map_err(|e| ChannelError::Failed(e.to_string()))?;
                Ok(vec![ContractFrame::Approved { success: true }])
            }
            _ => Err(ChannelError::Failed("Unknown action".into())),
        }
    }

    async fn on_event(&mut self, session: &mut Session, event: RelayEvent) -> ChannelResult<ContractFrame> {
        match event {
            RelayEvent::ContractCountUpdate { count } => Ok(vec![ContractFrame::CountChanged {
                count,
                data: self.contracts(session).await?,
            }]),
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{account, contract_between, crop_of, token};
    use greenpact_types::models::Role;

    #[tokio::test]
    async fn fetch_requires_a_token_first() {
        let app = crate::test_support::app().await;
        let mut channel = ContractChannel::new(app.state.clone());
        let mut session = Session::new(uuid::Uuid::new_v4(), app.state.dispatcher().clone(), None);

        let result = channel.on_message(&mut session, r#"{"action":"fetch_contracts"}"#).await;
        assert!(matches!(result, Err(ChannelError::Rejected)));

        let result = channel.on_message(&mut session, r#"{"token":"nope","action":"fetch_contracts"}"#).await;
        assert!(matches!(result, Err(ChannelError::Rejected)));
    }

    #[tokio::test]
    async fn approve_over_the_channel_renders_once() {
        let app = crate::test_support::app().await;
        let farmer = account(&app.state, "ravi", Role::Farmer, true);
        let buyer = account(&app.state, "kiran", Role::Contractor, true);
        let crop = crop_of(&app.state, &farmer);
        let contract = contract_between(&app.state, &farmer, &buyer, crop);

        let (conn, mut rx) = app.state.dispatcher().register().await;
        let mut session = Session::new(conn, app.state.dispatcher().clone(), None);
        let mut channel = ContractChannel::new(app.state.clone());

        let fetch = format!(r#"{{"token":"{}","action":"fetch_contracts"}}"#, token(&app.state, &farmer));
        match &channel.on_message(&mut session, &fetch).await.unwrap()[..] {
            [ContractFrame::Contracts { data }] => {
                assert_eq!(data.len(), 1);
                assert!(!data[0].status);
            }
            _ => panic!("expected the contract list"),
        }

        let approve = format!(r#"{{"action":"approve_contracts","contract_id":"{}"}}"#, contract.id);
        let frames = channel.on_message(&mut session, &approve).await.unwrap();
        assert!(matches!(frames[..], [ContractFrame::Approved { success: true }]));

        let event = rx.try_recv().unwrap();
        match &channel.on_event(&mut session, event).await.unwrap()[..] {
            [ContractFrame::CountChanged { count, data }] => {
                assert_eq!(*count, 1);
                assert!(data[0].status);
                assert!(data[0].pdf_url.as_deref().is_some_and(|u| u.ends_with(".pdf")));
            }
            _ => panic!("expected a count update"),
        }

        let row = app.state.db().get_contract(contract.id).unwrap().unwrap();
        let first_document = row.document.clone();
        channel.on_message(&mut session, &approve).await.unwrap();
        assert_eq!(app.state.db().get_contract(contract.id).unwrap().unwrap().document, first_document);
    }

    #[tokio::test]
    async fn a_new_token_moves_the_connection_to_the_new_users_group() {
        let app = crate::test_support::app().await;
        let asha = account(&app.state, "asha", Role::Farmer, true);
        let kiran = account(&app.state, "kiran", Role::Contractor, true);
        let dispatcher = app.state.dispatcher().clone();

        let (conn, _rx) = dispatcher.register().await;
        let mut session = Session::new(conn, dispatcher.clone(), None);
        let mut channel = ContractChannel::new(app.state.clone());

        for user in [&asha, &kiran] {
            let fetch = format!(r#"{{"token":"{}","action":"fetch_contracts"}}"#, token(&app.state, user));
            channel.on_message(&mut session, &fetch).await.unwrap();
        }

        assert!(dispatcher.members(&Group::Contracts("asha".into())).await.is_empty());
        assert_eq!(dispatcher.members(&Group::Contracts("kiran".into())).await, vec![conn]);
        assert_eq!(session.user().map(|u| u.username.as_str()), Some("kiran"));
    }

    #[tokio::test]
    async fn buyer_cannot_approve_and_unknown_actions_fail_in_band() {
        let app = crate::test_support::app().await;
        let farmer = account(&app.state, "ravi", Role::Farmer, true);
        let buyer = account(&app.state, "kiran", Role::Contractor, true);
        let crop = crop_of(&app.state, &farmer);
        let contract = contract_between(&app.state, &farmer, &buyer, crop);

        let mut session = Session::new(uuid::Uuid::new_v4(), app.state.dispatcher().clone(), None);
        let mut channel = ContractChannel::new(app.state.clone());

        let approve = format!(
            r#"{{"token":"{}","action":"approve_contract","contract_id":"{}"}}"#,
            token(&app.state, &buyer),
            contract.id
        );
        assert!(matches!(channel.on_message(&mut session, &approve).await, Err(ChannelError::Failed(_))));
        assert!(!app.state.db().get_contract(contract.id).unwrap().unwrap().status);

        match channel.on_message(&mut session, r#"{"action":"dance"}"#).await {
            Err(ChannelError::Failed(msg)) => assert_eq!(msg, "Unknown action"),
            _ => panic!("expected an in-band error"),
        }
    }
}
