//! Risk Gate - admission control on signals and stakes
//!
//! Pure decision logic; the caller owns logging and any side effects.
//! Confidence is checked before the protected floor, matching the decision
//! pipeline order.

use std::fmt;

use crate::types::{Signal, MIN_STAKE};

/// Why a signal was turned away
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// Signal confidence below the current admission threshold
    ConfidenceTooLow { confidence: f64, min_probability: f64 },
    /// Accepting the stake would breach the protected floor
    FloorViolation {
        balance: f64,
        stake: f64,
        protected_floor: f64,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ConfidenceTooLow {
                confidence,
                min_probability,
            } => write!(
                f,
                "Signal rejected: {:.1}% < {:.0}% threshold",
                confidence, min_probability
            ),
            RejectReason::FloorViolation {
                balance,
                stake,
                protected_floor,
            } => write!(
                f,
                "Trade blocked: Balance {:.2} - Stake {:.2} < Floor {:.2}",
                balance, stake, protected_floor
            ),
        }
    }
}

/// Admission decision
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Accepted with the effective (floored) stake
    Accepted { stake: f64 },
    Rejected(RejectReason),
}

/// Risk gate configuration
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Stakes below this are raised to it before any check
    pub min_stake: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_stake: MIN_STAKE,
        }
    }
}

/// Admission control over signals and stakes
#[derive(Debug, Clone, Default)]
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Decide whether a signal may become an order.
    ///
    /// The stake is floored to the configured minimum first, so the floor
    /// check always sees the amount that would actually be staked.
    pub fn admit(
        &self,
        signal: &Signal,
        requested_stake: f64,
        balance: f64,
        protected_floor: f64,
        min_probability: f64,
    ) -> Admission {
        let stake = requested_stake.max(self.config.min_stake);

        if signal.confidence < min_probability {
            return Admission::Rejected(RejectReason::ConfidenceTooLow {
                confidence: signal.confidence,
                min_probability,
            });
        }

        if balance - stake < protected_floor {
            return Admission::Rejected(RejectReason::FloorViolation {
                balance,
                stake,
                protected_floor,
            });
        }

        Admission::Accepted { stake }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use chrono::Utc;

    fn signal(confidence: f64) -> Signal {
        Signal {
            symbol: "R_100".to_string(),
            direction: Direction::Call,
            confidence,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn admits_when_floor_preserved() {
        // balance 100, floor 30, stake 5 -> 95 >= 30
        let gate = RiskGate::default();
        let decision = gate.admit(&signal(90.0), 5.0, 100.0, 30.0, 85.0);
        assert_eq!(decision, Admission::Accepted { stake: 5.0 });
    }

    #[test]
    fn rejects_floor_violation() {
        // balance 32, floor 30, stake 5 -> 27 < 30
        let gate = RiskGate::default();
        let decision = gate.admit(&signal(90.0), 5.0, 32.0, 30.0, 85.0);
        assert!(matches!(
            decision,
            Admission::Rejected(RejectReason::FloorViolation { .. })
        ));
    }

    #[test]
    fn rejects_low_confidence_before_touching_floor() {
        let gate = RiskGate::default();
        // Floor would also fail here; the confidence reason must win.
        let decision = gate.admit(&signal(60.0), 5.0, 32.0, 30.0, 85.0);
        assert!(matches!(
            decision,
            Admission::Rejected(RejectReason::ConfidenceTooLow { .. })
        ));
    }

    #[test]
    fn stake_is_floored_to_minimum_before_the_check() {
        let gate = RiskGate::default();
        match gate.admit(&signal(90.0), 0.25, 100.0, 30.0, 85.0) {
            Admission::Accepted { stake } => assert!((stake - MIN_STAKE).abs() < f64::EPSILON),
            other => panic!("expected acceptance, got {:?}", other),
        }

        // A floored stake can still trip the floor check.
        let decision = gate.admit(&signal(90.0), 0.25, 30.5, 30.0, 85.0);
        assert!(matches!(
            decision,
            Admission::Rejected(RejectReason::FloorViolation { stake, .. }) if stake == MIN_STAKE
        ));
    }

    #[test]
    fn boundary_exactly_at_floor_is_admitted() {
        let gate = RiskGate::default();
        // balance - stake == floor is allowed; only strictly below is blocked.
        let decision = gate.admit(&signal(90.0), 5.0, 35.0, 30.0, 85.0);
        assert_eq!(decision, Admission::Accepted { stake: 5.0 });
    }
}
