use std::sync::Arc;

use anyhow::Result;

use greenpact_db::Database;
use greenpact_gateway::store::blocking;
use greenpact_gateway::{Dispatcher, Gateway};

use crate::config::Config;
use crate::documents::{ContractRenderer, PdfContractRenderer};
use crate::error::{ApiError, ApiResult};
use crate::greenbot::{Advisor, OpenAiAdvisor};
use crate::media::MediaStore;
use crate::prices::{DataGovFeed, PriceFeed};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub gateway: Gateway,
    pub config: Config,
    pub media: MediaStore,
    pub renderer: Arc<dyn ContractRenderer>,
    pub advisor: Arc<dyn Advisor>,
    pub prices: Arc<dyn PriceFeed>,
}

impl AppStateInner {
    /// Production wiring: PDF renderer, OpenAI-compatible advisor and the
    /// data.gov.in price feed.
    pub async fn new(config: Config, db: Arc<Database>, dispatcher: Dispatcher) -> Result<AppState> {
        let media = MediaStore::new(config.media_dir.clone(), &config.public_url).await?;
        let http = reqwest::Client::new();
        let advisor = Arc::new(OpenAiAdvisor::new(http.clone(), &config));
        let prices = Arc::new(DataGovFeed::new(http, &config));

        Ok(Arc::new(Self {
            gateway: Gateway::new(db, dispatcher, &config.jwt_secret),
            config,
            media,
            renderer: Arc::new(PdfContractRenderer),
            advisor,
            prices,
        }))
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.gateway.db
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.gateway.dispatcher
    }

    /// Runs a store call on the blocking pool. Unique-key conflicts on
    /// account columns come back as field errors.
    pub async fn store<F, T>(&self, f: F) -> ApiResult<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        blocking(self.db(), f).await.map_err(ApiError::from_store)
    }
}
