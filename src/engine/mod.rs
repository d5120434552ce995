//! Trading engine actor
//!
//! A single task owns all mutable trading state and consumes one event queue:
//! venue events, caller commands and persistence-failure feedback. Producers
//! only enqueue, so no state transition can interleave with another. The
//! decision timer lives on the same loop and is armed only while running.
//!
//! Callers talk to the actor through [`EngineHandle`]; state is published on
//! a watch channel after every transition.

pub mod lifecycle;
mod router;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::activity::{ActivityLog, ActivityLogEntry, LogKind};
use crate::config::{AppConfig, EngineConfig};
use crate::persistence::{
    Store, TradeHistoryRecord, VaultLockRecord, SETTING_MIN_PROBABILITY, SETTING_PROTECTED_FLOOR,
};
use crate::risk::{Admission, RejectReason, RiskGate};
use crate::strategy::SignalGenerator;
use crate::types::{
    Contract, EngineSettings, EngineState, SettingsPatch, Signal, TradingAsset, MIN_STAKE,
};
use crate::venue::session::{self, SessionConfig, SessionHandle};
use crate::venue::{OutboundRequest, VenueEvent};

use lifecycle::TradeBook;

const EVENT_QUEUE_CAPACITY: usize = 256;

/// Caller-issued command, serialized through the event queue
pub enum EngineCommand {
    Start,
    Stop,
    /// Emergency stop: halt trading and tear the session down.
    /// Open contracts are left to expire at the venue.
    Panic,
    UpdateSettings(SettingsPatch),
    UpdateProtectedFloor(f64),
    UpdateApiToken(String),
    Snapshot(oneshot::Sender<EngineSnapshot>),
}

/// Everything the actor reacts to
pub enum EngineEvent {
    Venue(VenueEvent),
    Command(EngineCommand),
    /// A fire-and-forget store write failed; surfaced on the activity log
    StoreFailure(String),
}

/// Point-in-time copy of everything the engine tracks
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub settings: EngineSettings,
    pub assets: Vec<TradingAsset>,
    pub current_signal: Option<Signal>,
    pub active_contracts: Vec<Contract>,
    pub trade_history: Vec<Contract>,
    pub log: Vec<ActivityLogEntry>,
}

/// Cheap cloneable handle to a running engine task
#[derive(Clone)]
pub struct EngineHandle {
    event_tx: mpsc::Sender<EngineEvent>,
    state_rx: watch::Receiver<EngineState>,
}

impl EngineHandle {
    async fn send(&self, event: EngineEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| anyhow!("engine task is gone"))
    }

    pub async fn start(&self) -> Result<()> {
        self.send(EngineEvent::Command(EngineCommand::Start)).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(EngineEvent::Command(EngineCommand::Stop)).await
    }

    pub async fn panic(&self) -> Result<()> {
        self.send(EngineEvent::Command(EngineCommand::Panic)).await
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<()> {
        self.send(EngineEvent::Command(EngineCommand::UpdateSettings(patch)))
            .await
    }

    pub async fn update_protected_floor(&self, value: f64) -> Result<()> {
        self.send(EngineEvent::Command(EngineCommand::UpdateProtectedFloor(
            value,
        )))
        .await
    }

    /// Swap the API credential; takes effect on the next connection.
    pub async fn update_api_token(&self, token: String) -> Result<()> {
        self.send(EngineEvent::Command(EngineCommand::UpdateApiToken(token)))
            .await
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineEvent::Command(EngineCommand::Snapshot(reply_tx)))
            .await?;
        reply_rx.await.map_err(|_| anyhow!("engine task is gone"))
    }

    /// Latest published state, without round-tripping through the actor.
    pub fn state(&self) -> EngineState {
        self.state_rx.borrow().clone()
    }

    /// Watch channel carrying every published state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Inject a venue event directly, bypassing the session task.
    /// Counterpart of [`SessionHandle::detached`] for custom transports.
    pub async fn feed_venue_event(&self, event: VenueEvent) -> Result<()> {
        self.send(EngineEvent::Venue(event)).await
    }
}

/// Spawn an engine that manages its own venue session.
pub fn spawn(
    config: AppConfig,
    generator: Box<dyn SignalGenerator>,
    store: Arc<dyn Store>,
) -> EngineHandle {
    spawn_inner(config, generator, store, None)
}

/// Spawn an engine over a caller-provided session handle. The engine never
/// opens its own connection; feed inbound traffic through
/// [`EngineHandle::feed_venue_event`].
pub fn spawn_with_transport(
    config: AppConfig,
    generator: Box<dyn SignalGenerator>,
    store: Arc<dyn Store>,
    session: SessionHandle,
) -> EngineHandle {
    spawn_inner(config, generator, store, Some(session))
}

fn spawn_inner(
    config: AppConfig,
    generator: Box<dyn SignalGenerator>,
    store: Arc<dyn Store>,
    session: Option<SessionHandle>,
) -> EngineHandle {
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let (state_tx, state_rx) = watch::channel(EngineState::default());

    let engine = Engine {
        ws_url: config.venue.ws_url,
        api_token: config.venue.api_token,
        config: config.engine.clone(),
        state: EngineState::default(),
        settings: EngineSettings::default(),
        assets: Vec::new(),
        current_signal: None,
        book: TradeBook::new(config.engine.history_cap),
        activity: ActivityLog::new(),
        gate: RiskGate::default(),
        generator,
        store,
        session,
        timer: None,
        event_tx: event_tx.clone(),
        event_rx,
        state_tx,
    };
    tokio::spawn(engine.run());

    EngineHandle { event_tx, state_rx }
}

/// Resolves once the armed timer ticks; pends forever while disarmed.
async fn tick_when_armed(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

pub(crate) struct Engine {
    ws_url: String,
    api_token: String,
    config: EngineConfig,
    state: EngineState,
    settings: EngineSettings,
    assets: Vec<TradingAsset>,
    current_signal: Option<Signal>,
    book: TradeBook,
    activity: ActivityLog,
    gate: RiskGate,
    generator: Box<dyn SignalGenerator>,
    store: Arc<dyn Store>,
    session: Option<SessionHandle>,
    timer: Option<Interval>,
    event_tx: mpsc::Sender<EngineEvent>,
    event_rx: mpsc::Receiver<EngineEvent>,
    state_tx: watch::Sender<EngineState>,
}

impl Engine {
    async fn run(mut self) {
        self.hydrate().await;
        self.publish_state();

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
                _ = tick_when_armed(&mut self.timer) => {
                    self.on_tick().await;
                    self.publish_state();
                }
            }
        }
        info!("Engine event loop ended");
    }

    /// Restore durable settings and the vault total before serving events.
    async fn hydrate(&mut self) {
        match self.store.read_setting(SETTING_PROTECTED_FLOOR).await {
            Ok(Some(floor)) => {
                self.state.protected_floor = floor;
                info!(floor, "Restored protected floor");
            }
            Ok(None) => {}
            Err(e) => self.log(LogKind::Err, format!("Failed to load protected floor: {e}")),
        }

        match self.store.read_setting(SETTING_MIN_PROBABILITY).await {
            Ok(Some(min_probability)) => {
                self.state.min_probability = min_probability;
                self.settings.min_probability = min_probability;
                info!(min_probability, "Restored admission threshold");
            }
            Ok(None) => {}
            Err(e) => self.log(
                LogKind::Err,
                format!("Failed to load admission threshold: {e}"),
            ),
        }

        match self.store.vault_total().await {
            Ok(total) => self.state.vault_balance = total,
            Err(e) => self.log(LogKind::Err, format!("Failed to load vault total: {e}")),
        }
    }

    async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Venue(VenueEvent::Connected) => {
                self.log(LogKind::Sys, "WebSocket connected. Authorizing...");
            }
            EngineEvent::Venue(VenueEvent::Disconnected) => {
                self.state.is_connected = false;
                self.log(LogKind::Sys, "WebSocket disconnected");
            }
            EngineEvent::Venue(VenueEvent::TransportError(detail)) => {
                self.log(LogKind::Err, format!("Connection error: {detail}"));
            }
            EngineEvent::Venue(VenueEvent::Frame(message)) => self.handle_frame(message).await,
            EngineEvent::Command(command) => self.handle_command(command).await,
            EngineEvent::StoreFailure(detail) => {
                self.log(LogKind::Err, format!("Persistence failure: {detail}"));
            }
        }
        self.publish_state();
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Start => self.start(),
            EngineCommand::Stop => self.stop(),
            EngineCommand::Panic => self.panic_close().await,
            EngineCommand::UpdateSettings(patch) => self.apply_settings(patch),
            EngineCommand::UpdateProtectedFloor(value) => self.update_protected_floor(value),
            EngineCommand::UpdateApiToken(token) => {
                self.api_token = token;
                self.log(LogKind::Sys, "API token updated");
            }
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Idempotent: a second start while running changes nothing.
    fn start(&mut self) {
        if self.state.is_running {
            return;
        }
        if self.session.is_none() {
            self.connect();
        }
        self.state.is_running = true;

        let period = Duration::from_millis(self.config.trade_interval_ms);
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);

        self.log(LogKind::Sys, "Trading engine STARTED");
    }

    /// Idempotent: a second stop while stopped changes nothing.
    fn stop(&mut self) {
        if !self.state.is_running {
            return;
        }
        self.state.is_running = false;
        self.timer = None;
        self.log(LogKind::Sys, "Trading engine STOPPED");
    }

    async fn panic_close(&mut self) {
        self.stop();
        if let Some(session) = self.session.take() {
            session.shutdown().await;
        }
        self.state.is_connected = false;
        self.log(LogKind::Err, "PANIC CLOSE: All operations terminated");
    }

    fn connect(&mut self) {
        let (venue_tx, mut venue_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let session = session::spawn(
            SessionConfig {
                ws_url: self.ws_url.clone(),
                api_token: self.api_token.clone(),
            },
            venue_tx,
        );

        // Forward session events onto the single actor queue.
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = venue_rx.recv().await {
                if event_tx.send(EngineEvent::Venue(event)).await.is_err() {
                    break;
                }
            }
        });

        self.session = Some(session);
        self.log(LogKind::Sys, format!("Connecting to {}", self.ws_url));
    }

    /// Apply a partial settings update. Out-of-range values are clamped,
    /// never rejected.
    fn apply_settings(&mut self, patch: SettingsPatch) {
        if let Some(profit_target) = patch.profit_target {
            self.settings.profit_target = profit_target.max(0.0);
        }
        if let Some(stake) = patch.stake {
            self.settings.stake = stake.max(MIN_STAKE);
        }
        if let Some(min_probability) = patch.min_probability {
            let clamped = min_probability
                .clamp(self.config.probability_floor, self.config.probability_ceiling);
            self.settings.min_probability = clamped;
            self.state.min_probability = clamped;
            self.persist_setting(SETTING_MIN_PROBABILITY, clamped);
        }
        if let Some(vault_threshold) = patch.vault_threshold {
            self.settings.vault_threshold = vault_threshold.max(0.0);
        }
        if let Some(position_size_percent) = patch.position_size_percent {
            self.settings.position_size_percent = position_size_percent.clamp(0.0, 100.0);
        }
        self.log(LogKind::Sys, "Settings updated");
    }

    fn update_protected_floor(&mut self, value: f64) {
        let floor = value.max(0.0);
        self.state.protected_floor = floor;
        self.persist_setting(SETTING_PROTECTED_FLOOR, floor);
        self.log(LogKind::Sys, format!("Protected floor set to {floor:.2}"));
    }

    /// One decision cycle: generate, gate, submit.
    async fn on_tick(&mut self) {
        if !self.state.is_running || !self.state.is_connected {
            return;
        }

        let Some(signal) = self.generator.generate(&self.assets) else {
            self.log(LogKind::Sys, "No valid trading signals available");
            return;
        };
        self.current_signal = Some(signal.clone());

        match self.gate.admit(
            &signal,
            self.settings.stake,
            self.state.balance,
            self.state.protected_floor,
            self.state.min_probability,
        ) {
            Admission::Rejected(reason @ RejectReason::ConfidenceTooLow { .. }) => {
                self.log(LogKind::Sig, reason.to_string());
            }
            Admission::Rejected(reason @ RejectReason::FloorViolation { .. }) => {
                self.log(LogKind::Err, reason.to_string());
            }
            Admission::Accepted { stake } => {
                self.log(
                    LogKind::Sig,
                    format!(
                        "Signal: {} {} @ {:.1}% confidence",
                        signal.symbol, signal.direction, signal.confidence
                    ),
                );
                self.submit_order(&signal, stake).await;
            }
        }
    }

    async fn submit_order(&mut self, signal: &Signal, stake: f64) {
        let request = OutboundRequest::Buy {
            symbol: signal.symbol.clone(),
            contract_type: signal.direction.contract_type().to_string(),
            stake,
            currency: self.state.currency.clone(),
            duration: self.config.contract_duration,
        };
        match &self.session {
            Some(session) => {
                session.send(request).await;
                self.book
                    .admit(Contract::new(signal, stake, &self.state.currency));
            }
            None => self.log(LogKind::Err, "No venue session; order dropped"),
        }
    }

    /// Fold one terminal settlement into state, history, persistence and the
    /// vault/threshold policies. Unknown venue ids are ignored.
    fn settle_contract(&mut self, contract_id: u64, profit: f64) {
        let is_win = profit > 0.0;
        let Some(contract) = self.book.settle(contract_id, profit, is_win) else {
            debug!(contract_id, "Settlement for unknown contract id ignored");
            return;
        };
        self.state.record_settlement(is_win, profit);

        self.persist_trade(TradeHistoryRecord {
            timestamp: Utc::now().timestamp_millis(),
            symbol: contract.symbol.clone(),
            contract_type: contract.direction.contract_type().to_string(),
            stake: contract.stake,
            profit,
            is_win,
            currency: contract.currency.clone(),
        });

        if is_win {
            self.log(
                LogKind::Trd,
                format!(
                    "WIN: +{:.2} {} | Contract #{}",
                    profit, contract.currency, contract_id
                ),
            );
            if profit >= self.settings.vault_threshold {
                self.allocate_to_vault(profit);
            }
        } else {
            self.log(
                LogKind::Trd,
                format!(
                    "LOSS: {:.2} {} | Contract #{}",
                    profit, contract.currency, contract_id
                ),
            );
            self.adapt_after_loss();
        }
    }

    /// Sweep a qualifying win into the vault and raise the floor by the same
    /// amount. Computed and applied on the actor, so concurrent settlements
    /// can never interleave the floor read-modify-write.
    fn allocate_to_vault(&mut self, profit: f64) {
        let new_floor = self.state.protected_floor + profit;
        self.state.vault_balance += profit;
        self.state.protected_floor = new_floor;

        self.persist_vault_lock(VaultLockRecord {
            timestamp: Utc::now().timestamp_millis(),
            amount: profit,
        });
        self.persist_setting(SETTING_PROTECTED_FLOOR, new_floor);

        self.log(
            LogKind::Vlt,
            format!("Vault Lock: +${profit:.2} | New Floor: ${new_floor:.2}"),
        );
    }

    /// After a loss with the trailing win rate below target, tighten the
    /// admission threshold one step, capped at the ceiling.
    fn adapt_after_loss(&mut self) {
        if self.state.win_rate >= self.config.target_win_rate {
            return;
        }
        let next = (self.state.min_probability + self.config.probability_step)
            .min(self.config.probability_ceiling);
        self.state.min_probability = next;
        self.persist_setting(SETTING_MIN_PROBABILITY, next);
        self.log(
            LogKind::Sys,
            format!("AI Adjustment: Min Probability increased to {next:.0}%"),
        );
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.state.clone(),
            settings: self.settings.clone(),
            assets: self.assets.clone(),
            current_signal: self.current_signal.clone(),
            active_contracts: self.book.active().to_vec(),
            trade_history: self.book.history_to_vec(),
            log: self.activity.to_vec(),
        }
    }

    /// Activity log entry + tracing line in one place.
    fn log(&mut self, kind: LogKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            LogKind::Err => warn!(%kind, "{message}"),
            _ => info!(%kind, "{message}"),
        }
        self.activity.append(kind, message);
    }

    fn publish_state(&self) {
        let _ = self.state_tx.send(self.state.clone());
    }

    // Fire-and-forget store writes. A failure never rolls back in-memory
    // state; it comes back through the queue and lands on the activity log.

    fn persist_setting(&self, key: &'static str, value: f64) {
        let store = Arc::clone(&self.store);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = store.write_setting(key, value).await {
                let _ = event_tx
                    .send(EngineEvent::StoreFailure(format!("{key}: {e}")))
                    .await;
            }
        });
    }

    fn persist_trade(&self, record: TradeHistoryRecord) {
        let store = Arc::clone(&self.store);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = store.append_trade(record).await {
                let _ = event_tx
                    .send(EngineEvent::StoreFailure(format!("trade history: {e}")))
                    .await;
            }
        });
    }

    fn persist_vault_lock(&self, record: VaultLockRecord) {
        let store = Arc::clone(&self.store);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = store.append_vault_lock(record).await {
                let _ = event_tx
                    .send(EngineEvent::StoreFailure(format!("vault lock: {e}")))
                    .await;
            }
        });
    }

    // Accessors used by the frame router.
    async fn send_request(&self, request: OutboundRequest) {
        if let Some(session) = &self.session {
            session.send(request).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::CsvStore;
    use crate::strategy::RandomSignalGenerator;
    use crate::types::Direction;
    use std::path::PathBuf;

    pub(super) fn temp_data_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("volbot_engine_{}_{}", test_name, uuid::Uuid::new_v4()))
    }

    pub(super) fn test_engine(data_dir: &std::path::Path) -> Engine {
        let config = AppConfig::default();
        let (event_tx, event_rx) = mpsc::channel(16);
        let (state_tx, _state_rx) = watch::channel(EngineState::default());
        Engine {
            ws_url: config.venue.ws_url.clone(),
            api_token: String::new(),
            config: config.engine.clone(),
            state: EngineState::default(),
            settings: EngineSettings::default(),
            assets: Vec::new(),
            current_signal: None,
            book: TradeBook::new(config.engine.history_cap),
            activity: ActivityLog::new(),
            gate: RiskGate::default(),
            generator: Box::new(RandomSignalGenerator::seeded(1)),
            store: Arc::new(CsvStore::new(data_dir.to_str().unwrap()).unwrap()),
            session: None,
            timer: None,
            event_tx,
            event_rx,
            state_tx,
        }
    }

    pub(super) fn open_trade(engine: &mut Engine, contract_id: u64) {
        let signal = Signal {
            symbol: "R_100".to_string(),
            direction: Direction::Call,
            confidence: 90.0,
            generated_at: Utc::now(),
        };
        engine
            .book
            .admit(Contract::new(&signal, 1.0, &engine.state.currency));
        engine.book.acknowledge(contract_id);
    }

    fn detached_session() -> SessionHandle {
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let (shutdown_tx, _shutdown_rx) = mpsc::channel(1);
        SessionHandle::detached(outbound_tx, shutdown_tx)
    }

    #[tokio::test]
    async fn losing_below_target_win_rate_tightens_the_threshold() {
        let dir = temp_data_dir("adapt");
        let mut engine = test_engine(&dir);

        open_trade(&mut engine, 1);
        engine.settle_contract(1, 0.95);
        open_trade(&mut engine, 2);
        engine.settle_contract(2, -1.0);

        // win rate 50% < target 85% -> threshold 85 + 2
        assert_eq!(engine.state.total_trades, 2);
        assert!((engine.state.win_rate - 50.0).abs() < f64::EPSILON);
        assert!((engine.state.min_probability - 87.0).abs() < f64::EPSILON);
        assert!(engine
            .activity
            .entries()
            .any(|e| e.message == "AI Adjustment: Min Probability increased to 87%"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn threshold_never_exceeds_the_ceiling() {
        let dir = temp_data_dir("ceiling");
        let mut engine = test_engine(&dir);
        engine.state.min_probability = 94.0;

        open_trade(&mut engine, 1);
        engine.settle_contract(1, -1.0);

        assert!((engine.state.min_probability - 95.0).abs() < f64::EPSILON);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn qualifying_win_locks_profit_and_raises_the_floor() {
        let dir = temp_data_dir("vault");
        let mut engine = test_engine(&dir);
        // floor 30.03, vault threshold 1.00

        open_trade(&mut engine, 7);
        engine.settle_contract(7, 2.0);

        assert!((engine.state.vault_balance - 2.0).abs() < 1e-9);
        assert!((engine.state.protected_floor - 32.03).abs() < 1e-9);
        assert!(engine
            .activity
            .entries()
            .any(|e| e.message == "Vault Lock: +$2.00 | New Floor: $32.03"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn settlement_writes_reach_the_store() {
        let dir = temp_data_dir("persist");
        let mut engine = test_engine(&dir);

        open_trade(&mut engine, 7);
        engine.settle_contract(7, 2.0);

        // Writes are spawned fire-and-forget; poll until they land.
        let store = Arc::clone(&engine.store);
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let vault = store.vault_total().await.unwrap();
            let floor = store.read_setting(SETTING_PROTECTED_FLOOR).await.unwrap();
            if (vault - 2.0).abs() < 1e-9 && floor == Some(32.03) {
                break;
            }
            assert!(Instant::now() < deadline, "store writes not observed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let reader = CsvStore::new(dir.to_str().unwrap()).unwrap();
        let trades = reader.load_trade_history(1).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "R_100");
        assert!(trades[0].is_win);
        assert!((trades[0].profit - 2.0).abs() < 1e-9);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn small_win_below_threshold_leaves_the_vault_alone() {
        let dir = temp_data_dir("small_win");
        let mut engine = test_engine(&dir);

        open_trade(&mut engine, 7);
        engine.settle_contract(7, 0.5);

        assert_eq!(engine.state.wins, 1);
        assert_eq!(engine.state.vault_balance, 0.0);
        assert!((engine.state.protected_floor - 30.03).abs() < 1e-9);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unknown_settlement_leaves_counters_untouched() {
        let dir = temp_data_dir("unknown");
        let mut engine = test_engine(&dir);

        open_trade(&mut engine, 7);
        engine.settle_contract(999, 1.0);

        assert_eq!(engine.state.total_trades, 0);
        assert_eq!(engine.book.active().len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let dir = temp_data_dir("start_stop");
        let mut engine = test_engine(&dir);
        engine.session = Some(detached_session());

        engine.handle_command(EngineCommand::Start).await;
        assert!(engine.state.is_running);
        assert!(engine.timer.is_some());

        let entries_after_start = engine.activity.len();
        engine.handle_command(EngineCommand::Start).await;
        assert_eq!(engine.activity.len(), entries_after_start);

        engine.handle_command(EngineCommand::Stop).await;
        assert!(!engine.state.is_running);
        assert!(engine.timer.is_none());

        let entries_after_stop = engine.activity.len();
        engine.handle_command(EngineCommand::Stop).await;
        assert_eq!(engine.activity.len(), entries_after_stop);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn panic_halts_trading_and_drops_the_session() {
        let dir = temp_data_dir("panic");
        let mut engine = test_engine(&dir);
        engine.session = Some(detached_session());
        engine.handle_command(EngineCommand::Start).await;

        engine.handle_command(EngineCommand::Panic).await;

        assert!(!engine.state.is_running);
        assert!(!engine.state.is_connected);
        assert!(engine.session.is_none());
        assert!(engine.timer.is_none());
        assert!(engine
            .activity
            .entries()
            .any(|e| e.message == "PANIC CLOSE: All operations terminated"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn settings_patch_is_clamped_not_rejected() {
        let dir = temp_data_dir("settings");
        let mut engine = test_engine(&dir);

        engine.apply_settings(SettingsPatch {
            stake: Some(0.25),
            min_probability: Some(120.0),
            ..SettingsPatch::default()
        });
        assert!((engine.settings.stake - MIN_STAKE).abs() < f64::EPSILON);
        assert!((engine.settings.min_probability - 95.0).abs() < f64::EPSILON);
        assert!((engine.state.min_probability - 95.0).abs() < f64::EPSILON);

        engine.apply_settings(SettingsPatch {
            min_probability: Some(10.0),
            ..SettingsPatch::default()
        });
        assert!((engine.settings.min_probability - 50.0).abs() < f64::EPSILON);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn tick_is_a_noop_while_stopped_or_disconnected() {
        let dir = temp_data_dir("gated_tick");
        let mut engine = test_engine(&dir);
        engine.assets = vec![TradingAsset {
            symbol: "R_100".to_string(),
            display_name: "Volatility 100 Index".to_string(),
            market: "Synthetic Indices".to_string(),
            is_open: true,
        }];

        // stopped
        engine.state.is_connected = true;
        engine.on_tick().await;
        assert!(engine.activity.is_empty());

        // disconnected
        engine.state.is_running = true;
        engine.state.is_connected = false;
        engine.on_tick().await;
        assert!(engine.activity.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
