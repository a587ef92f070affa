//! Lending market events as delivered by the event feed.
//!
//! Amounts are raw on-chain integers: cToken amounts carry 8 decimals,
//! underlying amounts carry the market's underlying decimals.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::account::address_id;

/// Fields every event carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Emitting market (cToken contract)
    pub market: String,
    pub tx_hash: B256,
    /// Block timestamp (unix seconds)
    pub timestamp: u64,
    pub block_number: u64,
    /// Log index within the block
    pub log_index: u64,
}

impl EventMeta {
    /// Total order of events: block number, then log index.
    pub fn cursor(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Event body, tagged by `eventType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all_fields = "camelCase")]
pub enum EventKind {
    /// Underlying supplied, cTokens minted
    Mint {
        minter: Address,
        mint_amount: U256,
        mint_tokens: U256,
    },
    /// cTokens redeemed for underlying
    Redeem {
        redeemer: Address,
        redeem_amount: U256,
        redeem_tokens: U256,
    },
    Borrow {
        borrower: Address,
        borrow_amount: U256,
        /// Borrower's total borrow balance after the event
        account_borrows: U256,
    },
    RepayBorrow {
        payer: Address,
        borrower: Address,
        repay_amount: U256,
        /// Borrower's total borrow balance after the event
        account_borrows: U256,
    },
    /// Borrow liquidated. The repay and seize legs arrive as their own
    /// `RepayBorrow` and `Transfer` events.
    LiquidateBorrow {
        liquidator: Address,
        borrower: Address,
        repay_amount: U256,
        ctoken_collateral: Address,
        seize_tokens: U256,
    },
    /// cToken transfer. A transfer from or to the market itself is the
    /// token side of a mint or redeem and carries no position change.
    Transfer {
        from: Address,
        to: Address,
        amount: U256,
    },
    MarketEntered {
        account: Address,
    },
    MarketExited {
        account: Address,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mint { .. } => "Mint",
            Self::Redeem { .. } => "Redeem",
            Self::Borrow { .. } => "Borrow",
            Self::RepayBorrow { .. } => "RepayBorrow",
            Self::LiquidateBorrow { .. } => "LiquidateBorrow",
            Self::Transfer { .. } => "Transfer",
            Self::MarketEntered { .. } => "MarketEntered",
            Self::MarketExited { .. } => "MarketExited",
        }
    }
}

/// One event with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl LedgerEvent {
    /// Accounts whose position in `meta.market` this event may change.
    pub fn affected_accounts(&self) -> SmallVec<[String; 2]> {
        let mut accounts: SmallVec<[String; 2]> = match &self.kind {
            EventKind::Mint { minter, .. } => smallvec![address_id(minter)],
            EventKind::Redeem { redeemer, .. } => smallvec![address_id(redeemer)],
            EventKind::Borrow { borrower, .. }
            | EventKind::RepayBorrow { borrower, .. }
            | EventKind::LiquidateBorrow { borrower, .. } => smallvec![address_id(borrower)],
            EventKind::Transfer { from, to, .. } => {
                let (from, to) = (address_id(from), address_id(to));
                if from == self.meta.market || to == self.meta.market {
                    SmallVec::new()
                } else {
                    smallvec![from, to]
                }
            }
            EventKind::MarketEntered { account } | EventKind::MarketExited { account } => {
                smallvec![address_id(account)]
            }
        };
        accounts.sort();
        accounts.dedup();
        accounts
    }

    /// Every account whose records this event may write: the affected
    /// accounts plus a liquidator. Sorted, so locks taken in this order
    /// cannot deadlock.
    pub fn locked_accounts(&self) -> SmallVec<[String; 2]> {
        let mut accounts = self.affected_accounts();
        if let EventKind::LiquidateBorrow { liquidator, .. } = &self.kind {
            accounts.push(address_id(liquidator));
            accounts.sort();
            accounts.dedup();
        }
        accounts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_borrow_from_feed_json() {
        let json = r#"{
            "market": "0x4ddc2d193948926d02f9b1fe9e1daa0718270ed5",
            "txHash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "timestamp": 1700000000,
            "blockNumber": 100,
            "logIndex": 3,
            "eventType": "Borrow",
            "borrower": "0x00000000000000000000000000000000000000aa",
            "borrowAmount": "1000000000000000000",
            "accountBorrows": "1500000000000000000"
        }"#;

        let event: LedgerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.meta.cursor(), (100, 3));
        assert_eq!(event.kind.name(), "Borrow");
        match event.kind {
            EventKind::Borrow { account_borrows, .. } => {
                assert_eq!(account_borrows, U256::from(1_500_000_000_000_000_000u128));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_transfer_affected_accounts() {
        let market = Address::repeat_byte(0xcc);
        let user = Address::repeat_byte(0x01);
        let other = Address::repeat_byte(0x02);

        let meta = EventMeta {
            market: address_id(&market),
            tx_hash: B256::ZERO,
            timestamp: 0,
            block_number: 1,
            log_index: 0,
        };

        let transfer = LedgerEvent {
            meta: meta.clone(),
            kind: EventKind::Transfer { from: user, to: other, amount: U256::from(1u64) },
        };
        assert_eq!(transfer.affected_accounts().len(), 2);

        let mint_leg = LedgerEvent {
            meta: meta.clone(),
            kind: EventKind::Transfer { from: market, to: user, amount: U256::from(1u64) },
        };
        assert!(mint_leg.affected_accounts().is_empty());

        let self_transfer = LedgerEvent {
            meta,
            kind: EventKind::Transfer { from: user, to: user, amount: U256::from(1u64) },
        };
        assert_eq!(self_transfer.affected_accounts().len(), 1);
    }

    #[test]
    fn test_liquidation_locks_both_parties() {
        let liquidation = LedgerEvent {
            meta: EventMeta {
                market: "0xcc".into(),
                tx_hash: B256::ZERO,
                timestamp: 0,
                block_number: 1,
                log_index: 0,
            },
            kind: EventKind::LiquidateBorrow {
                liquidator: Address::repeat_byte(0x02),
                borrower: Address::repeat_byte(0x01),
                repay_amount: U256::from(1u64),
                ctoken_collateral: Address::repeat_byte(0xdd),
                seize_tokens: U256::from(1u64),
            },
        };

        assert_eq!(liquidation.affected_accounts().len(), 1);
        let locked = liquidation.locked_accounts();
        assert_eq!(locked.len(), 2);
        assert!(locked[0] < locked[1]);
    }
}
