//! Signal Generator - pluggable policy producing candidate trade signals
//!
//! The only intentionally non-deterministic component. Implementations are
//! swappable behind [`SignalGenerator`] without touching any other part of
//! the engine.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{Direction, Signal, TradingAsset};

/// Low end of the confidence band used by the reference policy.
const CONFIDENCE_BASE: f64 = 80.0;
/// Width of the confidence band.
const CONFIDENCE_SPAN: f64 = 15.0;

/// Policy boundary for signal generation.
///
/// Returns at most one signal per invocation, or `None` when nothing is
/// tradeable.
pub trait SignalGenerator: Send + Sync {
    fn generate(&mut self, assets: &[TradingAsset]) -> Option<Signal>;
}

/// Reference policy: uniform choice among open assets, uniform direction,
/// confidence drawn from a high-confidence band (80 - 95).
pub struct RandomSignalGenerator {
    rng: StdRng,
}

impl RandomSignalGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic variant for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSignalGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalGenerator for RandomSignalGenerator {
    fn generate(&mut self, assets: &[TradingAsset]) -> Option<Signal> {
        let open: Vec<&TradingAsset> = assets.iter().filter(|a| a.is_open).collect();
        if open.is_empty() {
            return None;
        }

        let asset = open[self.rng.gen_range(0..open.len())];
        let direction = if self.rng.gen_bool(0.5) {
            Direction::Call
        } else {
            Direction::Put
        };
        let confidence = CONFIDENCE_BASE + self.rng.gen::<f64>() * CONFIDENCE_SPAN;

        Some(Signal {
            symbol: asset.symbol.clone(),
            direction,
            confidence,
            generated_at: Utc::now(),
        })
    }
}
