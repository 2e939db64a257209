use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per tile (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        let base = if self.base_delay_secs.is_finite() && self.base_delay_secs > 0.0 {
            Duration::from_secs_f64(self.base_delay_secs)
        } else {
            Duration::ZERO
        };
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: base,
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global configuration loaded from `~/.config/omap/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmapConfig {
    /// Size of the tile fetch worker pool.
    pub max_concurrent_fetches: usize,
    /// Timeout for a single tile fetch, in seconds. A timeout is retryable.
    pub fetch_timeout_secs: u64,
    /// How long pause/cancel wait for in-flight tiles before returning, in milliseconds.
    pub pause_grace_ms: u64,
    /// Tile URL with `{z}`, `{x}` and `{y}` placeholders.
    pub tile_url_template: String,
    /// User-Agent sent with tile requests (most public tile servers require one).
    pub user_agent: String,
    /// Tile cache directory; defaults to `~/.local/share/omap/tiles`.
    #[serde(default)]
    pub tile_cache_dir: Option<PathBuf>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for OmapConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 6,
            fetch_timeout_secs: 30,
            pause_grace_ms: 2000,
            tile_url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            user_agent: concat!("omap/", env!("CARGO_PKG_VERSION")).to_string(),
            tile_cache_dir: None,
            retry: None,
        }
    }
}

/// Validated engine settings derived from [`OmapConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub workers: usize,
    pub fetch_timeout: Duration,
    pub grace_period: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        OmapConfig::default().engine()
    }
}

impl OmapConfig {
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            workers: self.max_concurrent_fetches.clamp(1, 64),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            grace_period: Duration::from_millis(self.pause_grace_ms),
            retry: self.retry.clone().unwrap_or_default().to_policy(),
        }
    }

    /// Tile cache directory from config, or the XDG data default.
    pub fn tile_cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.tile_cache_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("omap")?;
        Ok(xdg_dirs.get_data_home().join("tiles"))
    }

    /// Checks that the tile URL template has all placeholders and parses as a URL.
    pub fn validate(&self) -> Result<()> {
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !self.tile_url_template.contains(placeholder) {
                anyhow::bail!(
                    "tile_url_template is missing {} placeholder: {}",
                    placeholder,
                    self.tile_url_template
                );
            }
        }
        let sample = self
            .tile_url_template
            .replace("{z}", "0")
            .replace("{x}", "0")
            .replace("{y}", "0");
        url::Url::parse(&sample)
            .with_context(|| format!("invalid tile_url_template: {}", self.tile_url_template))?;
        Ok(())
    }

    /// `host:port` of the tile server, used by the connectivity probe.
    pub fn probe_addr(&self) -> Option<String> {
        let sample = self
            .tile_url_template
            .replace("{z}", "0")
            .replace("{x}", "0")
            .replace("{y}", "0");
        let url = url::Url::parse(&sample).ok()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some(format!("{}:{}", host, port))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("omap")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<OmapConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = OmapConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: OmapConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
