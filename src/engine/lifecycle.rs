//! Trade Lifecycle Controller - per-contract state machine bookkeeping
//!
//! `(none) --admit--> Pending --order-ack--> Open --settlement--> Won | Lost`
//!
//! Active contracts keep submission order; settled contracts move to a
//! bounded newest-first history. Settlement events for unknown venue ids are
//! no-ops.

use std::collections::VecDeque;

use crate::types::{Contract, ContractStatus};

/// Active set + bounded settled history
#[derive(Debug)]
pub struct TradeBook {
    active: Vec<Contract>,
    history: VecDeque<Contract>,
    history_cap: usize,
}

impl TradeBook {
    pub fn new(history_cap: usize) -> Self {
        Self {
            active: Vec::new(),
            history: VecDeque::with_capacity(history_cap),
            history_cap,
        }
    }

    /// Track a freshly admitted Pending contract.
    pub fn admit(&mut self, contract: Contract) {
        self.active.push(contract);
    }

    /// Attach a venue id to the oldest Pending contract and open it.
    ///
    /// The venue serializes order acks per connection and offers no req_id
    /// correlation on them, so acks are matched in FIFO submission order.
    /// A duplicate ack for an already-attached id is a no-op.
    pub fn acknowledge(&mut self, contract_id: u64) -> Option<Contract> {
        if self
            .active
            .iter()
            .any(|c| c.contract_id == Some(contract_id))
        {
            return None;
        }
        let contract = self
            .active
            .iter_mut()
            .find(|c| c.status == ContractStatus::Pending && c.contract_id.is_none())?;
        contract.contract_id = Some(contract_id);
        contract.status = ContractStatus::Open;
        Some(contract.clone())
    }

    /// Finalize the contract carrying this venue id.
    ///
    /// Removes it from the active set and appends it to the history,
    /// evicting the oldest entry beyond the cap. Unknown ids return `None`.
    pub fn settle(&mut self, contract_id: u64, profit: f64, is_win: bool) -> Option<Contract> {
        let index = self
            .active
            .iter()
            .position(|c| c.contract_id == Some(contract_id))?;
        let mut contract = self.active.remove(index);
        contract.status = if is_win {
            ContractStatus::Won
        } else {
            ContractStatus::Lost
        };
        contract.profit = Some(profit);
        self.history.push_front(contract.clone());
        self.history.truncate(self.history_cap);
        Some(contract)
    }

    /// Drop the oldest Pending contract that never received a venue id.
    ///
    /// A buy the venue rejects gets an error frame instead of an ack; its
    /// Pending entry must leave the book or FIFO ack correlation would skew
    /// for every later order.
    pub fn reject_oldest_pending(&mut self) -> Option<Contract> {
        let index = self
            .active
            .iter()
            .position(|c| c.status == ContractStatus::Pending && c.contract_id.is_none())?;
        Some(self.active.remove(index))
    }

    pub fn active(&self) -> &[Contract] {
        &self.active
    }

    /// Settled contracts, newest first.
    pub fn history(&self) -> impl Iterator<Item = &Contract> {
        self.history.iter()
    }

    pub fn history_to_vec(&self) -> Vec<Contract> {
        self.history.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Signal};
    use chrono::Utc;

    fn pending(symbol: &str) -> Contract {
        let signal = Signal {
            symbol: symbol.to_string(),
            direction: Direction::Call,
            confidence: 90.0,
            generated_at: Utc::now(),
        };
        Contract::new(&signal, 1.0, "USDT")
    }

    #[test]
    fn acks_attach_in_submission_order() {
        let mut book = TradeBook::new(50);
        book.admit(pending("R_10"));
        book.admit(pending("R_25"));

        let first = book.acknowledge(101).expect("first ack");
        assert_eq!(first.symbol, "R_10");
        assert_eq!(first.status, ContractStatus::Open);
        assert_eq!(first.contract_id, Some(101));

        let second = book.acknowledge(102).expect("second ack");
        assert_eq!(second.symbol, "R_25");
    }

    #[test]
    fn duplicate_ack_for_known_id_is_a_noop() {
        let mut book = TradeBook::new(50);
        book.admit(pending("R_10"));
        book.admit(pending("R_25"));
        assert!(book.acknowledge(101).is_some());
        // Same id again must not claim the second pending contract.
        assert!(book.acknowledge(101).is_none());
        assert!(book.active()[1].contract_id.is_none());
    }

    #[test]
    fn ack_without_pending_contract_is_a_noop() {
        let mut book = TradeBook::new(50);
        assert!(book.acknowledge(7).is_none());
    }

    #[test]
    fn rejected_buy_leaves_later_acks_aligned() {
        let mut book = TradeBook::new(50);
        book.admit(pending("R_10"));
        book.admit(pending("R_25"));

        // First buy is rejected by the venue; drop its pending entry.
        let rejected = book.reject_oldest_pending().expect("pending entry");
        assert_eq!(rejected.symbol, "R_10");

        // The surviving ack must attach to the second submission.
        let acked = book.acknowledge(101).expect("ack");
        assert_eq!(acked.symbol, "R_25");
        assert!(book.reject_oldest_pending().is_none());
    }

    #[test]
    fn settlement_moves_contract_to_history() {
        let mut book = TradeBook::new(50);
        book.admit(pending("R_100"));
        book.acknowledge(55);

        let settled = book.settle(55, 0.95, true).expect("settled contract");
        assert_eq!(settled.status, ContractStatus::Won);
        assert_eq!(settled.profit, Some(0.95));
        assert!(book.active().is_empty());
        assert_eq!(book.history().count(), 1);
    }

    #[test]
    fn unknown_settlement_id_is_a_noop() {
        let mut book = TradeBook::new(50);
        book.admit(pending("R_100"));
        book.acknowledge(55);
        assert!(book.settle(999, 1.0, true).is_none());
        assert_eq!(book.active().len(), 1);
    }

    #[test]
    fn history_evicts_oldest_beyond_cap() {
        let mut book = TradeBook::new(3);
        for id in 0..5u64 {
            book.admit(pending(&format!("R_{id}")));
            book.acknowledge(id + 1);
            book.settle(id + 1, -1.0, false);
        }
        let symbols: Vec<_> = book.history().map(|c| c.symbol.clone()).collect();
        assert_eq!(symbols, vec!["R_4", "R_3", "R_2"]);
    }
}
