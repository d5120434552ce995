//! Configuration management for VolBot
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Default venue WebSocket endpoint.
const DEFAULT_WS_URL: &str = "wss://ws.binaryws.com/websockets/v3?app_id=1089";

/// Volatility/Boom/Crash universe traded by the reference configuration.
const DEFAULT_SYMBOLS: &[&str] = &[
    "R_10", "R_25", "R_50", "R_75", "R_100", "BOOM300N", "BOOM500N", "BOOM1000N", "CRASH300N",
    "CRASH500N", "CRASH1000N", "1HZ10V", "1HZ25V", "1HZ50V", "1HZ75V", "1HZ100V",
];

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub venue: VenueConfig,
    pub engine: EngineConfig,
    pub persistence: PersistenceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            venue: VenueConfig::default(),
            engine: EngineConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    /// WebSocket endpoint
    pub ws_url: String,
    /// API credential; also settable at runtime via the engine handle
    pub api_token: String,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Decision loop interval in milliseconds
    pub trade_interval_ms: u64,
    /// Tradeable symbol universe; inbound asset lists are filtered to it
    pub symbols: Vec<String>,
    /// Trailing win rate below which losses tighten the admission threshold
    pub target_win_rate: f64,
    /// Threshold increment applied after a qualifying loss
    pub probability_step: f64,
    /// Lowest admission threshold a settings update may set
    pub probability_floor: f64,
    /// Hard ceiling for the admission threshold
    pub probability_ceiling: f64,
    /// Contract duration in ticks for buy requests
    pub contract_duration: u32,
    /// Settled contracts retained in history
    pub history_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trade_interval_ms: 2_500,
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            target_win_rate: 85.0,
            probability_step: 2.0,
            probability_floor: 50.0,
            probability_ceiling: 95.0,
            contract_duration: 5,
            history_cap: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Directory for settings, trade history and vault lock records
    pub data_dir: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional YAML file and `VOLBOT__` env vars.
    ///
    /// Environment variables override file values, e.g.
    /// `VOLBOT__VENUE__API_TOKEN=...`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = path.unwrap_or("config/default");
        let config = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix("VOLBOT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    /// Sanity checks on ranges the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.engine.trade_interval_ms == 0 {
            bail!("engine.trade_interval_ms must be positive");
        }
        if self.engine.symbols.is_empty() {
            bail!("engine.symbols must not be empty");
        }
        if self.engine.probability_floor > self.engine.probability_ceiling {
            bail!(
                "engine.probability_floor {} exceeds probability_ceiling {}",
                self.engine.probability_floor,
                self.engine.probability_ceiling
            );
        }
        if !(0.0..=100.0).contains(&self.engine.target_win_rate) {
            bail!("engine.target_win_rate must be within 0-100");
        }
        if self.engine.probability_step <= 0.0 {
            bail!("engine.probability_step must be positive");
        }
        if self.engine.history_cap == 0 {
            bail!("engine.history_cap must be positive");
        }
        Ok(())
    }
}
