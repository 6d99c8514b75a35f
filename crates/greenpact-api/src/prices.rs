use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::{Value, json};
use tracing::debug;

use greenpact_types::api::{PageQuery, PricePage};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Columns hidden from the filtered price views.
const HIDDEN_FIELDS: [&str; 3] = ["grade", "variety", "market"];
const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceFilter {
    All,
    State(String),
    Commodity(String),
}

/// Daily mandi price records.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn records(&self, filter: &PriceFilter) -> Result<Vec<Value>>;
}

/// The data.gov.in "current daily price" resource.
pub struct DataGovFeed {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl DataGovFeed {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            url: config.prices_url.clone(),
            api_key: config.prices_api_key.clone(),
        }
    }
}

#[async_trait]
impl PriceFeed for DataGovFeed {
    async fn records(&self, filter: &PriceFilter) -> Result<Vec<Value>> {
        let mut query = vec![
            ("api-key", self.api_key.as_str()),
            ("format", "json"),
            ("offset", "0"),
            ("limit", "10000"),
        ];
        match filter {
            PriceFilter::All => {}
            PriceFilter::State(state) => query.push(("filters[state.keyword]", state.as_str())),
            PriceFilter::Commodity(name) => query.push(("filters[commodity]", name.as_str())),
        }

        let response = self.client.get(&self.url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("Failed to fetch data from API ({})", status);
        }

        let mut body: Value = response.json().await.context("price feed returned invalid JSON")?;
        match body.get_mut("records").map(Value::take) {
            Some(Value::Array(records)) => Ok(records),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => bail!("price feed records field is not a list"),
        }
    }
}

fn strip_hidden(records: Vec<Value>) -> Vec<Value> {
    records
        .into_iter()
        .map(|mut record| {
            if let Value::Object(fields) = &mut record {
                for field in HIDDEN_FIELDS {
                    fields.remove(field);
                }
            }
            record
        })
        .collect()
}

pub async fn all_prices(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let records = state.prices.records(&PriceFilter::All).await?;
    Ok(Json(json!({ "data": records })))
}

pub async fn state_prices(State(state): State<AppState>, Path(region): Path<String>) -> ApiResult<Json<Value>> {
    let records = state.prices.records(&PriceFilter::State(region)).await?;
    Ok(Json(json!({ "data": strip_hidden(records) })))
}

pub async fn commodity_prices(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<PricePage>> {
    let records = strip_hidden(state.prices.records(&PriceFilter::Commodity(name.clone())).await?);
    let base = format!("{}/crops/prices/commodity/{}", state.config.public_url, name);
    Ok(Json(paginate(records, &page, &base)?))
}

fn paginate(records: Vec<Value>, query: &PageQuery, base: &str) -> ApiResult<PricePage> {
    let size = query.page_size.filter(|s| *s > 0).unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let page = query.page.unwrap_or(1);
    let count = records.len();
    let pages = count.div_ceil(size).max(1);

    if page == 0 || page > pages {
        return Err(ApiError::not_found("Invalid page."));
    }
    debug!("price page {}/{} ({} records)", page, pages, count);

    let link = |p: usize| format!("{}?page={}&page_size={}", base, p, size);
    Ok(PricePage {
        count,
        next: (page < pages).then(|| link(page + 1)),
        previous: (page > 1).then(|| link(page - 1)),
        results: records.into_iter().skip((page - 1) * size).take(size).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({ "commodity": "Wheat", "market": "Azadpur", "grade": "FAQ", "variety": "Dara", "modal_price": i }))
            .collect()
    }

    #[test]
    fn hidden_fields_are_removed() {
        let stripped = strip_hidden(records(1));
        assert_eq!(stripped[0], json!({ "commodity": "Wheat", "modal_price": 0 }));
    }

    #[test]
    fn pages_link_to_their_neighbours() {
        let query = PageQuery { page: Some(2), page_size: Some(10) };
        let page = paginate(records(25), &query, "http://h/p").unwrap();
        assert_eq!(page.count, 25);
        assert_eq!(page.results.len(), 10);
        assert_eq!(page.results[0]["modal_price"], 10);
        assert_eq!(page.next.as_deref(), Some("http://h/p?page=3&page_size=10"));
        assert_eq!(page.previous.as_deref(), Some("http://h/p?page=1&page_size=10"));
    }

    #[test]
    fn page_size_is_capped_and_out_of_range_pages_fail() {
        let query = PageQuery { page: None, page_size: Some(1000) };
        let page = paginate(records(150), &query, "b").unwrap();
        assert_eq!(page.results.len(), MAX_PAGE_SIZE);

        let empty = paginate(Vec::new(), &PageQuery::default(), "b").unwrap();
        assert_eq!(empty.count, 0);
        assert!(empty.next.is_none() && empty.previous.is_none());

        let beyond = PageQuery { page: Some(4), page_size: None };
        assert!(matches!(paginate(records(25), &beyond, "b"), Err(ApiError::NotFound(_))));
    }
}
