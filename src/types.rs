//! Core types used throughout VolBot
//!
//! Domain structures shared by the engine, the venue session and callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Minimum stake accepted by the venue (account currency units).
pub const MIN_STAKE: f64 = 1.0;

/// Contract direction supported by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Call,
    Put,
}

impl Direction {
    /// Venue contract type string for buy requests
    pub fn contract_type(&self) -> &'static str {
        match self {
            Direction::Call => "CALL",
            Direction::Put => "PUT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.contract_type())
    }
}

/// Tradeable asset as advertised by the venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingAsset {
    /// Venue symbol (e.g. "R_100")
    pub symbol: String,
    /// Human-readable name
    pub display_name: String,
    /// Market display name
    pub market: String,
    /// Whether the exchange is currently open for this asset
    pub is_open: bool,
}

/// Candidate trade produced by a signal generator.
/// Ephemeral: produced and consumed within one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Asset symbol
    pub symbol: String,
    /// Predicted direction
    pub direction: Direction,
    /// Confidence score (0 - 100)
    pub confidence: f64,
    /// Generation time
    pub generated_at: DateTime<Utc>,
}

/// Contract lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    /// Submitted, waiting for the venue acknowledgment
    Pending,
    /// Acknowledged by the venue, waiting for settlement
    Open,
    /// Settled with positive profit (terminal)
    Won,
    /// Settled with non-positive profit (terminal)
    Lost,
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractStatus::Pending => write!(f, "PENDING"),
            ContractStatus::Open => write!(f, "OPEN"),
            ContractStatus::Won => write!(f, "WON"),
            ContractStatus::Lost => write!(f, "LOST"),
        }
    }
}

/// One venue-side trade position from submission to settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// Local id, assigned at creation
    pub id: Uuid,
    /// Venue-assigned contract id, present once acknowledged
    pub contract_id: Option<u64>,
    /// Asset symbol
    pub symbol: String,
    /// Direction
    pub direction: Direction,
    /// Stake in account currency
    pub stake: f64,
    /// Account currency
    pub currency: String,
    /// Current status
    pub status: ContractStatus,
    /// Settlement profit, absent until settled
    pub profit: Option<f64>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Contract {
    pub fn new(signal: &Signal, stake: f64, currency: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            contract_id: None,
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            stake,
            currency: currency.to_string(),
            status: ContractStatus::Pending,
            profit: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, ContractStatus::Won | ContractStatus::Lost)
    }
}

/// Aggregate engine state exposed to callers.
/// Mutated only by the engine actor, never by presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub is_running: bool,
    pub is_connected: bool,
    pub balance: f64,
    pub currency: String,
    /// Minimum balance the engine must preserve before admitting any trade
    pub protected_floor: f64,
    /// Locked profit reserve funded by qualifying wins
    pub vault_balance: f64,
    pub total_profit: f64,
    /// Percentage (0 - 100), 0 while no trades settled
    pub win_rate: f64,
    pub win_streak: u32,
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    /// Current admission threshold (0 - 100)
    pub min_probability: f64,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            is_running: false,
            is_connected: false,
            balance: 0.0,
            currency: "USDT".to_string(),
            protected_floor: 30.03,
            vault_balance: 0.0,
            total_profit: 0.0,
            win_rate: 0.0,
            win_streak: 0,
            total_trades: 0,
            wins: 0,
            losses: 0,
            min_probability: 85.0,
        }
    }
}

impl EngineState {
    /// Fold one settlement into the aggregate counters.
    /// Called exactly once per settled contract.
    pub fn record_settlement(&mut self, is_win: bool, profit: f64) {
        if is_win {
            self.wins += 1;
            self.win_streak += 1;
        } else {
            self.losses += 1;
            self.win_streak = 0;
        }
        self.total_trades += 1;
        self.win_rate = (self.wins as f64 / self.total_trades as f64) * 100.0;
        self.total_profit += profit;
    }
}

/// User-tunable policy inputs, independent of EngineState
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Session profit target in account currency
    pub profit_target: f64,
    /// Stake per contract in account currency
    pub stake: f64,
    /// User-configured admission threshold (0 - 100)
    pub min_probability: f64,
    /// Minimum winning profit that gets swept into the vault
    pub vault_threshold: f64,
    /// Position size as percent of balance
    pub position_size_percent: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            profit_target: 10.0,
            stake: 1.00,
            min_probability: 85.0,
            vault_threshold: 1.00,
            position_size_percent: 2.5,
        }
    }
}

/// Partial settings update; `None` fields keep their current value.
/// Out-of-range values are clamped by the engine, never rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub profit_target: Option<f64>,
    pub stake: Option<f64>,
    pub min_probability: Option<f64>,
    pub vault_threshold: Option<f64>,
    pub position_size_percent: Option<f64>,
}
