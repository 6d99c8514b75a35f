use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Known placeholder secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEFAULT_PRICES_URL: &str =
    "https://api.data.gov.in/resource/9ef84268-d588-465a-a308-a864a43d0070";

/// Server settings, read once from `GREENPACT_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub media_dir: PathBuf,
    pub public_url: String,
    pub prices_api_key: String,
    pub prices_url: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("GREENPACT_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("GREENPACT_JWT_SECRET is unset or still a placeholder; set it to a strong random value");
        }

        let port = var("GREENPACT_PORT", "8000")
            .parse()
            .context("GREENPACT_PORT must be a port number")?;

        let allowed_origins = var("GREENPACT_ALLOWED_ORIGINS", "*")
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty() && *origin != "*")
            .map(String::from)
            .collect();

        let hours = |key: &str, default: i64| -> Result<chrono::Duration> {
            match lookup(key) {
                Some(v) => Ok(chrono::Duration::hours(
                    v.parse().with_context(|| format!("{} must be a whole number of hours", key))?,
                )),
                None => Ok(chrono::Duration::hours(default)),
            }
        };

        Ok(Self {
            host: var("GREENPACT_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(var("GREENPACT_DB_PATH", "greenpact.db")),
            jwt_secret,
            allowed_origins,
            media_dir: PathBuf::from(var("GREENPACT_MEDIA_DIR", "./media")),
            public_url: var("GREENPACT_PUBLIC_URL", "http://localhost:8000")
                .trim_end_matches('/')
                .to_string(),
            prices_api_key: var("GREENPACT_PRICES_API_KEY", ""),
            prices_url: var("GREENPACT_PRICES_URL", DEFAULT_PRICES_URL),
            llm_api_key: var("GREENPACT_LLM_API_KEY", ""),
            llm_base_url: var("GREENPACT_LLM_BASE_URL", "https://openrouter.ai/api/v1")
                .trim_end_matches('/')
                .to_string(),
            llm_model: var("GREENPACT_LLM_MODEL", "meta-llama/llama-3.3-8b-instruct"),
            admin_username: lookup("GREENPACT_ADMIN_USERNAME").filter(|v| !v.is_empty()),
            admin_password: lookup("GREENPACT_ADMIN_PASSWORD").filter(|v| !v.is_empty()),
            access_ttl: hours("GREENPACT_ACCESS_TTL_HOURS", 240)?,
            refresh_ttl: hours("GREENPACT_REFRESH_TTL_HOURS", 720)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
