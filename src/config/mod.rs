use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

mod site;

pub use site::{default_core_fields, SiteProfile};

use crate::export::ExportFormat;
use crate::extract::record::BuildOptions;
use crate::extract::reviews::ReviewPolicy;
use crate::logging::LoggingConfig;
use crate::render::user_agent::UserAgentRotator;
use crate::render::Jitter;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub site: SiteProfile,
    pub http: HttpConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub start_url: Option<String>,
    pub max_pages: usize,
    pub concurrency: usize,
    pub element_timeout_ms: u64,
    pub product_timeout_secs: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub review_cap: usize,
    pub review_policy: ReviewPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub user_agents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_path: PathBuf,
    pub format: ExportFormat,
    pub include_source_url: bool,
    pub include_status: bool,
    pub compress: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_url: None,
            max_pages: 3,
            concurrency: 5,
            element_timeout_ms: 5000,
            product_timeout_secs: 120,
            jitter_min_ms: 1000,
            jitter_max_ms: 2000,
            review_cap: 5,
            review_policy: ReviewPolicy::default(),
        }
    }
}

impl CrawlConfig {
    pub fn jitter(&self) -> Jitter {
        Jitter::from_millis(self.jitter_min_ms, self.jitter_max_ms)
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            element_timeout: Duration::from_millis(self.element_timeout_ms),
            product_timeout: Duration::from_secs(self.product_timeout_secs),
            jitter: self.jitter(),
            review_cap: self.review_cap,
            review_policy: self.review_policy,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 30,
            max_retries: 3,
            retry_delay_ms: 2000,
            user_agents: UserAgentRotator::default_user_agents(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("Headphones.csv"),
            format: ExportFormat::Csv,
            include_source_url: false,
            include_status: true,
            compress: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or the default location, or defaults
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path).await;
        }

        let config_path = get_config_path();
        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from specific file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Cannot read config {}: {}", path.display(), e))?;
        let config: AppConfig = toml::from_str(&content)?;

        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save configuration to `path`
    pub async fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, self.to_toml()?).await?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.crawl.max_pages == 0 {
            return Err(anyhow::anyhow!("crawl.max_pages must be > 0"));
        }

        if self.crawl.concurrency == 0 {
            return Err(anyhow::anyhow!("crawl.concurrency must be > 0"));
        }

        if self.crawl.jitter_min_ms > self.crawl.jitter_max_ms {
            return Err(anyhow::anyhow!("crawl.jitter_min_ms must not exceed crawl.jitter_max_ms"));
        }

        if self.crawl.product_timeout_secs == 0 {
            return Err(anyhow::anyhow!("crawl.product_timeout_secs must be > 0"));
        }

        if let Some(start_url) = &self.crawl.start_url {
            url::Url::parse(start_url)
                .map_err(|e| anyhow::anyhow!("crawl.start_url '{}' is invalid: {}", start_url, e))?;
        }

        if self.http.max_retries == 0 {
            return Err(anyhow::anyhow!("http.max_retries must be > 0"));
        }

        self.site.validate()?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("com", "catalog-harvester", "harvester")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Environment-based configuration overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply `HARVEST_*` environment variable overrides to configuration
    pub fn apply(config: &mut AppConfig) {
        Self::apply_from(config, |key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_from(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(start_url) = lookup("HARVEST_START_URL") {
            config.crawl.start_url = Some(start_url);
        }

        if let Some(pages) = lookup("HARVEST_MAX_PAGES").and_then(|v| v.parse().ok()) {
            config.crawl.max_pages = pages;
        }

        if let Some(concurrency) = lookup("HARVEST_CONCURRENCY").and_then(|v| v.parse().ok()) {
            config.crawl.concurrency = concurrency;
        }

        if lookup("HARVEST_NO_JITTER").is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1") {
            config.crawl.jitter_min_ms = 0;
            config.crawl.jitter_max_ms = 0;
        }

        if let Some(base_url) = lookup("HARVEST_BASE_URL") {
            config.site.base_url = base_url;
        }

        if let Some(output) = lookup("HARVEST_OUTPUT") {
            config.export.output_path = PathBuf::from(output);
        }

        if let Some(log_level) = lookup("HARVEST_LOG_LEVEL") {
            config.logging.level = log_level;
        }
    }
}
