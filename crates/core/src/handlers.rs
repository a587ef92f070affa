//! Event-specific position updates.
//!
//! Each handler resolves the accounts involved, touches the affected
//! position through the repository (which records the transaction and
//! moves the accrual block) and applies the event's own field changes.
//! A touch that finds its transaction key already recorded is a replay:
//! nothing is changed and the stored state stands.

use alloy::primitives::{Address, U256};
use smallvec::SmallVec;
use tracing::debug;

use crate::account::address_id;
use crate::decimal::{Decimal, CTOKEN_DECIMALS};
use crate::error::{LedgerError, Result};
use crate::events::{EventKind, EventMeta, LedgerEvent};
use crate::market::Market;
use crate::position::Position;
use crate::repository::Repository;
use crate::store::Store;

/// Outcome of applying one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Position ids written by this event
    pub touched: SmallVec<[String; 2]>,
    /// Every touched position had already seen this event
    pub replayed: bool,
}

impl Applied {
    fn none() -> Self {
        Self::default()
    }

    fn push(&mut self, position_id: String, replayed: bool) {
        self.replayed = if self.touched.is_empty() {
            replayed
        } else {
            self.replayed && replayed
        };
        self.touched.push(position_id);
    }
}

fn ctokens(raw: U256) -> Result<Decimal> {
    Ok(Decimal::from_raw(raw, CTOKEN_DECIMALS)?.truncate(CTOKEN_DECIMALS))
}

fn underlying(raw: U256, market: &Market) -> Result<Decimal> {
    let decimals = market.underlying_decimals;
    Ok(Decimal::from_raw(raw, decimals)?.truncate(decimals))
}

/// Apply `event` against `market`.
pub fn apply_event<S: Store>(
    repo: &Repository<S>,
    market: &Market,
    event: &LedgerEvent,
) -> Result<Applied> {
    let meta = &event.meta;
    match &event.kind {
        EventKind::Mint {
            minter,
            mint_amount,
            mint_tokens,
        } => {
            let tokens = ctokens(*mint_tokens)?;
            let amount = underlying(*mint_amount, market)?;
            update(repo, market, meta, minter, |pos| {
                pos.ctoken_balance = &pos.ctoken_balance + &tokens;
                pos.total_underlying_supplied = &pos.total_underlying_supplied + &amount;
                Ok(())
            })
        }

        EventKind::Redeem {
            redeemer,
            redeem_amount,
            redeem_tokens,
        } => {
            let tokens = ctokens(*redeem_tokens)?;
            let amount = underlying(*redeem_amount, market)?;
            update(repo, market, meta, redeemer, |pos| {
                pos.ctoken_balance = &pos.ctoken_balance - &tokens;
                pos.total_underlying_redeemed = &pos.total_underlying_redeemed + &amount;
                Ok(())
            })
        }

        EventKind::Borrow {
            borrower,
            borrow_amount,
            account_borrows,
        } => {
            let amount = underlying(*borrow_amount, market)?;
            let balance = underlying(*account_borrows, market)?;
            ensure_borrow_index(market, borrower, &balance)?;

            let applied = update(repo, market, meta, borrower, |pos| {
                pos.stored_borrow_balance = balance;
                pos.account_borrow_index = market.borrow_index.clone();
                pos.total_underlying_borrowed = &pos.total_underlying_borrowed + &amount;
                Ok(())
            })?;
            // Only once the snapshot is stored.
            if !applied.replayed {
                mark_borrowed(repo, borrower)?;
            }
            Ok(applied)
        }

        EventKind::RepayBorrow {
            borrower,
            repay_amount,
            account_borrows,
            ..
        } => {
            let amount = underlying(*repay_amount, market)?;
            let balance = underlying(*account_borrows, market)?;
            ensure_borrow_index(market, borrower, &balance)?;
            let remaining = !balance.is_zero();

            let applied = update(repo, market, meta, borrower, |pos| {
                pos.stored_borrow_balance = balance;
                pos.account_borrow_index = market.borrow_index.clone();
                pos.total_underlying_repaid = &pos.total_underlying_repaid + &amount;
                Ok(())
            })?;
            // A feed that starts mid-history can repay a borrow it never saw.
            if remaining && !applied.replayed {
                mark_borrowed(repo, borrower)?;
            }
            Ok(applied)
        }

        EventKind::LiquidateBorrow {
            liquidator,
            borrower,
            ..
        } => {
            let borrower_id = address_id(borrower);
            let liquidator_id = address_id(liquidator);
            repo.get_or_create_account(&borrower_id)?;
            repo.get_or_create_account(&liquidator_id)?;

            let touched = repo.touch_position(meta, &market.symbol, &borrower_id)?;
            let mut applied = Applied::none();
            applied.push(touched.position.id.clone(), touched.replayed);
            if touched.replayed {
                debug!(position = %touched.position.id, "Replayed liquidation absorbed");
                return Ok(applied);
            }
            repo.save_position(&touched.position)?;

            // Reload after the creates above so a self-liquidation counts both sides.
            if let Some(mut account) = repo.load_account(&borrower_id)? {
                account.count_liquidated += 1;
                repo.save_account(&account)?;
            }
            if let Some(mut account) = repo.load_account(&liquidator_id)? {
                account.count_liquidator += 1;
                repo.save_account(&account)?;
            }
            Ok(applied)
        }

        EventKind::Transfer { from, to, amount } => {
            let tokens = ctokens(*amount)?;
            let value = (&market.exchange_rate * &tokens).truncate(market.underlying_decimals);
            let from_id = address_id(from);
            let to_id = address_id(to);

            // The token side of a mint or redeem; the Mint/Redeem event
            // carries the position change.
            if from_id == meta.market || to_id == meta.market {
                debug!(tx = %meta.tx_hash, log_index = meta.log_index, "Mint/redeem transfer leg skipped");
                return Ok(Applied::none());
            }

            // A self-transfer moves nothing; touch once for the audit log.
            if from_id == to_id {
                return update(repo, market, meta, from, |_| Ok(()));
            }

            let mut applied = update(repo, market, meta, from, |pos| {
                pos.ctoken_balance = &pos.ctoken_balance - &tokens;
                pos.total_underlying_redeemed = &pos.total_underlying_redeemed + &value;
                Ok(())
            })?;
            let to_leg = update(repo, market, meta, to, |pos| {
                pos.ctoken_balance = &pos.ctoken_balance + &tokens;
                pos.total_underlying_supplied = &pos.total_underlying_supplied + &value;
                Ok(())
            })?;
            for id in to_leg.touched {
                applied.push(id, to_leg.replayed);
            }
            Ok(applied)
        }

        EventKind::MarketEntered { account } => update(repo, market, meta, account, |pos| {
            pos.entered_market = true;
            Ok(())
        }),

        EventKind::MarketExited { account } => update(repo, market, meta, account, |pos| {
            pos.entered_market = false;
            Ok(())
        }),
    }
}

/// Touch `account`'s position, apply `change` unless the event is a
/// replay, and persist.
fn update<S, F>(
    repo: &Repository<S>,
    market: &Market,
    meta: &EventMeta,
    account: &Address,
    change: F,
) -> Result<Applied>
where
    S: Store,
    F: FnOnce(&mut Position) -> Result<()>,
{
    let account_id = address_id(account);
    repo.get_or_create_account(&account_id)?;

    let touched = repo.touch_position(meta, &market.symbol, &account_id)?;
    let mut applied = Applied::none();
    applied.push(touched.position.id.clone(), touched.replayed);

    if touched.replayed {
        debug!(
            position = %touched.position.id,
            tx = %meta.tx_hash,
            log_index = meta.log_index,
            "Replayed event absorbed"
        );
        return Ok(applied);
    }

    let mut position = touched.position;
    change(&mut position)?;
    repo.save_position(&position)?;
    Ok(applied)
}

fn mark_borrowed<S: Store>(repo: &Repository<S>, borrower: &Address) -> Result<()> {
    let mut account = repo.get_or_create_account(&address_id(borrower))?;
    if account.mark_borrowed() {
        repo.save_account(&account)?;
    }
    Ok(())
}

/// A non-zero borrow balance needs a non-zero index to snapshot against.
fn ensure_borrow_index(market: &Market, borrower: &Address, balance: &Decimal) -> Result<()> {
    if market.borrow_index.is_zero() && !balance.is_zero() {
        return Err(LedgerError::ZeroBorrowIndex {
            market: market.id.clone(),
            position: crate::position::position_id(&market.id, &address_id(borrower)),
        });
    }
    Ok(())
}
