//! Inbound frame routing
//!
//! Maps parsed venue messages onto engine state transitions. Every arm runs
//! on the actor task; nothing here touches state from outside the loop.

use tracing::debug;

use crate::activity::LogKind;
use crate::types::TradingAsset;
use crate::venue::{InboundMessage, OutboundRequest};

use super::Engine;

/// Universe matching is substring-based in both directions, so a configured
/// "R_10" also admits venue variants like "R_100" listings that embed it.
fn in_universe(universe: &[String], symbol: &str) -> bool {
    universe
        .iter()
        .any(|candidate| symbol.contains(candidate.as_str()) || candidate.contains(symbol))
}

impl Engine {
    pub(super) async fn handle_frame(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Error {
                code,
                message,
                origin,
            } => {
                self.log(LogKind::Err, format!("API Error: {message} ({code})"));
                // A rejected buy never gets an ack; evict its pending entry
                // so later acks attach to the right contracts.
                if origin.as_deref() == Some("buy") {
                    if let Some(contract) = self.book.reject_oldest_pending() {
                        debug!(
                            symbol = %contract.symbol,
                            "Dropped pending contract after buy rejection"
                        );
                    }
                }
            }

            InboundMessage::Authorize(auth) => {
                self.state.is_connected = true;
                self.state.balance = auth.balance;
                self.state.currency = auth.currency.clone();
                self.log(
                    LogKind::Sys,
                    format!(
                        "Authorized: {} | Balance: {} {:.2}",
                        auth.loginid, auth.currency, auth.balance
                    ),
                );
                self.send_request(OutboundRequest::ActiveSymbols).await;
                self.send_request(OutboundRequest::SubscribeBalance).await;
            }

            InboundMessage::ActiveSymbols(symbols) => {
                let universe = &self.config.symbols;
                let assets: Vec<TradingAsset> = symbols
                    .into_iter()
                    .filter(|info| info.exchange_is_open == 1)
                    .filter(|info| in_universe(universe, &info.symbol))
                    .map(|info| TradingAsset {
                        symbol: info.symbol,
                        display_name: info.display_name,
                        market: info.market_display_name,
                        is_open: true,
                    })
                    .collect();
                self.assets = assets;
                self.log(
                    LogKind::Sys,
                    format!("Loaded {} tradeable assets", self.assets.len()),
                );
            }

            InboundMessage::Proposal(proposal) => {
                self.log(
                    LogKind::Sig,
                    format!(
                        "Proposal: {} | Payout: {:.2}",
                        proposal.display_value, proposal.payout
                    ),
                );
            }

            InboundMessage::BuyAck(buy) => {
                if self.book.acknowledge(buy.contract_id).is_some() {
                    self.log(
                        LogKind::Trd,
                        format!(
                            "Contract purchased: #{} | Cost: {:.2}",
                            buy.contract_id, buy.buy_price
                        ),
                    );
                    self.send_request(OutboundRequest::SubscribeContract {
                        contract_id: buy.contract_id,
                    })
                    .await;
                } else {
                    debug!(
                        contract_id = buy.contract_id,
                        "Buy ack without a matching pending contract"
                    );
                }
            }

            InboundMessage::OpenContract(update) => {
                // In-flight updates carry mark-to-market profit; only
                // terminal ones settle.
                if update.is_settled() {
                    self.settle_contract(update.contract_id, update.profit);
                }
            }

            InboundMessage::Balance(balance) => {
                self.state.balance = balance.balance;
                self.state.currency = balance.currency;
            }

            InboundMessage::Ignored => {}
        }
    }
}
