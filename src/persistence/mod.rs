//! Persistence collaborator - storage-agnostic trait + CSV implementation
//!
//! The engine only needs insert/read operations: named scalar settings,
//! append-only trade-history records, append-only vault-lock records and a
//! change-notification stream the presentation layer uses to refresh. All
//! engine writes are fire-and-forget; a failed write never rolls back
//! in-memory state.

use async_trait::async_trait;
use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, Mutex, RwLock as AsyncRwLock};
use tracing::info;

/// Durable key for the protected balance floor.
pub const SETTING_PROTECTED_FLOOR: &str = "current_protected_floor";
/// Durable key for the admission threshold.
pub const SETTING_MIN_PROBABILITY: &str = "min_probability";

/// Persistence failure taxonomy
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("settings file error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Finalized trade record for the append-only history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistoryRecord {
    pub timestamp: i64,
    pub symbol: String,
    pub contract_type: String,
    pub stake: f64,
    pub profit: f64,
    pub is_win: bool,
    pub currency: String,
}

/// One vault allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultLockRecord {
    pub timestamp: i64,
    pub amount: f64,
}

/// Change notification emitted after a successful write
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    TradeRecorded,
    VaultLockRecorded,
    SettingChanged(String),
}

/// Storage-technology-agnostic persistence boundary
#[async_trait]
pub trait Store: Send + Sync {
    async fn read_setting(&self, key: &str) -> Result<Option<f64>, StoreError>;
    async fn write_setting(&self, key: &str, value: f64) -> Result<(), StoreError>;
    async fn append_trade(&self, record: TradeHistoryRecord) -> Result<(), StoreError>;
    async fn append_vault_lock(&self, record: VaultLockRecord) -> Result<(), StoreError>;
    /// Sum of all persisted vault locks.
    async fn vault_total(&self) -> Result<f64, StoreError>;
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// CSV-backed store: daily trade/vault files plus a JSON settings map
pub struct CsvStore {
    data_dir: PathBuf,
    settings_path: PathBuf,
    settings_lock: Mutex<()>,
    trade_writer: AsyncRwLock<csv::Writer<std::fs::File>>,
    vault_writer: AsyncRwLock<csv::Writer<std::fs::File>>,
    events: broadcast::Sender<StoreEvent>,
}

impl CsvStore {
    pub fn new(data_dir: &str) -> Result<Self, StoreError> {
        let data_dir = PathBuf::from(data_dir);
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(data_dir.join("trades"))?;
        fs::create_dir_all(data_dir.join("vault_locks"))?;

        let today = Utc::now().format("%Y-%m-%d");
        let trade_writer =
            Self::create_writer(&data_dir.join("trades"), &format!("trades_{}.csv", today))?;
        let vault_writer = Self::create_writer(
            &data_dir.join("vault_locks"),
            &format!("vault_locks_{}.csv", today),
        )?;

        let (events, _) = broadcast::channel(64);

        info!(data_dir = %data_dir.display(), "CSV store ready");
        Ok(Self {
            settings_path: data_dir.join("settings.json"),
            data_dir,
            settings_lock: Mutex::new(()),
            trade_writer: AsyncRwLock::new(trade_writer),
            vault_writer: AsyncRwLock::new(vault_writer),
            events,
        })
    }

    fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<std::fs::File>, StoreError> {
        let path = dir.join(filename);
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file))
    }

    fn load_settings(&self) -> Result<HashMap<String, f64>, StoreError> {
        if !self.settings_path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(&self.settings_path)?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load persisted trade history, oldest first, across the last `days`
    /// daily files.
    pub fn load_trade_history(&self, days: u32) -> Result<Vec<TradeHistoryRecord>, StoreError> {
        let mut records = Vec::new();
        for i in 0..days {
            let date = Utc::now() - chrono::Duration::days(i as i64);
            let path = self
                .data_dir
                .join("trades")
                .join(format!("trades_{}.csv", date.format("%Y-%m-%d")));
            if !path.exists() {
                continue;
            }
            let file = std::fs::File::open(&path)?;
            let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
            for result in reader.deserialize() {
                let record: TradeHistoryRecord = result?;
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

#[async_trait]
impl Store for CsvStore {
    async fn read_setting(&self, key: &str) -> Result<Option<f64>, StoreError> {
        let _guard = self.settings_lock.lock().await;
        Ok(self.load_settings()?.get(key).copied())
    }

    async fn write_setting(&self, key: &str, value: f64) -> Result<(), StoreError> {
        {
            let _guard = self.settings_lock.lock().await;
            let mut settings = self.load_settings()?;
            settings.insert(key.to_string(), value);
            fs::write(&self.settings_path, serde_json::to_string_pretty(&settings)?)?;
        }
        let _ = self.events.send(StoreEvent::SettingChanged(key.to_string()));
        Ok(())
    }

    async fn append_trade(&self, record: TradeHistoryRecord) -> Result<(), StoreError> {
        {
            let mut writer = self.trade_writer.write().await;
            writer.serialize(&record)?;
            writer.flush()?;
        }
        let _ = self.events.send(StoreEvent::TradeRecorded);
        Ok(())
    }

    async fn append_vault_lock(&self, record: VaultLockRecord) -> Result<(), StoreError> {
        {
            let mut writer = self.vault_writer.write().await;
            writer.serialize(&record)?;
            writer.flush()?;
        }
        let _ = self.events.send(StoreEvent::VaultLockRecorded);
        Ok(())
    }

    async fn vault_total(&self) -> Result<f64, StoreError> {
        let dir = self.data_dir.join("vault_locks");
        let mut total = 0.0;
        if !dir.exists() {
            return Ok(total);
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if !path.is_file() || !is_csv {
                continue;
            }
            let file = std::fs::File::open(&path)?;
            let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
            for result in reader.deserialize() {
                let record: VaultLockRecord = result?;
                total += record.amount;
            }
        }
        Ok(total)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
