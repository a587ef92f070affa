//! The ledger service: event application and per-account queries.
//!
//! [`Ledger::apply`] serialises writes per account through a fixed table of
//! lock stripes. Every account an event writes (a liquidator included) is
//! locked in stripe order before the handler runs, so two events on
//! different accounts proceed in parallel and two events on the same
//! position never interleave their read-modify-write.
//!
//! Queries read a [`PortfolioSnapshot`] from the store without locking.

use std::borrow::Cow;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use tracing::debug;

use crate::account::{normalize_id, Account};
use crate::decimal::Decimal;
use crate::error::{LedgerError, Result};
use crate::events::LedgerEvent;
use crate::handlers::{apply_event, Applied};
use crate::market::MarketStateProvider;
use crate::portfolio::PortfolioSnapshot;
use crate::position::position_id;
use crate::report::AccountSummary;
use crate::repository::Repository;
use crate::store::Store;

const LOCK_STRIPES: usize = 64;

/// Position ledger over a store and a market state provider.
pub struct Ledger<S, M> {
    repo: Repository<S>,
    markets: Arc<M>,
    stripes: Vec<Mutex<()>>,
}

impl<S: Store, M: MarketStateProvider> Ledger<S, M> {
    pub fn new(store: Arc<S>, markets: Arc<M>) -> Self {
        Self {
            repo: Repository::new(store),
            markets,
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Attach to a store that already holds positions, rebuilding the
    /// holdings index from it.
    pub fn attach(store: Arc<S>, markets: Arc<M>) -> Result<Self> {
        let ledger = Self::new(store, markets);
        let indexed = ledger.repo.rebuild_holdings()?;
        debug!(positions = indexed, "Ledger attached to existing store");
        Ok(ledger)
    }

    pub fn repository(&self) -> &Repository<S> {
        &self.repo
    }

    pub fn markets(&self) -> &M {
        &self.markets
    }

    /// Apply one event.
    ///
    /// The event's market must be known to the provider. A replayed event
    /// returns `Applied { replayed: true, .. }` and changes nothing.
    pub fn apply(&self, event: &LedgerEvent) -> Result<Applied> {
        let event = normalized(event);
        let market = self
            .markets
            .market(&event.meta.market)
            .ok_or_else(|| LedgerError::MissingMarket(event.meta.market.clone()))?;

        let _guards = self.lock(&event.locked_accounts());
        let applied = apply_event(&self.repo, &market, &event)?;

        debug!(
            event = event.kind.name(),
            market = %market.id,
            block = event.meta.block_number,
            log_index = event.meta.log_index,
            touched = applied.touched.len(),
            replayed = applied.replayed,
            "Event applied"
        );
        Ok(applied)
    }

    /// Whether every position this event writes has already recorded it,
    /// i.e. applying it again would be absorbed as a replay. An event that
    /// writes no position counts as applied.
    pub fn is_applied(&self, event: &LedgerEvent) -> Result<bool> {
        let event = normalized(event);
        for account in event.affected_accounts() {
            let id = position_id(&event.meta.market, &account);
            if !self
                .repo
                .has_transaction(&id, &event.meta.tx_hash, event.meta.log_index)?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn lock(&self, accounts: &[String]) -> SmallVec<[MutexGuard<'_, ()>; 2]> {
        let mut stripes: SmallVec<[usize; 2]> = accounts.iter().map(|id| stripe_of(id)).collect();
        stripes.sort_unstable();
        stripes.dedup();
        stripes.into_iter().map(|i| self.stripes[i].lock()).collect()
    }

    // Queries

    /// Current account, held positions and their markets.
    ///
    /// An unknown account yields a fresh, never-borrowed account with no
    /// holdings.
    pub fn snapshot(&self, account_id: &str) -> Result<PortfolioSnapshot> {
        let account_id = normalize_id(account_id);
        let account = self
            .repo
            .load_account(&account_id)?
            .unwrap_or_else(|| Account::new(account_id.clone()));

        let held = self.repo.held_positions(&account_id);
        let mut positions = HashMap::with_capacity(held.len());
        let mut markets = HashMap::new();
        for id in &held {
            let Some(position) = self.repo.load_position(id)? else {
                continue;
            };
            if !markets.contains_key(&position.market) {
                if let Some(market) = self.markets.market(&position.market) {
                    markets.insert(market.id.clone(), market);
                }
            }
            positions.insert(id.clone(), position);
        }

        Ok(PortfolioSnapshot {
            account,
            held,
            markets,
            positions,
        })
    }

    pub fn total_collateral_value(&self, account_id: &str) -> Result<Decimal> {
        self.snapshot(account_id)?.total_collateral_value()
    }

    pub fn total_borrow_value(&self, account_id: &str) -> Result<Decimal> {
        self.snapshot(account_id)?.total_borrow_value()
    }

    pub fn health(&self, account_id: &str) -> Result<Option<Decimal>> {
        self.snapshot(account_id)?.health()
    }

    pub fn summary(&self, account_id: &str) -> Result<AccountSummary> {
        AccountSummary::from_snapshot(&self.snapshot(account_id)?)
    }

    /// Summaries of every stored account, sorted by account id.
    pub fn summaries(&self) -> Result<Vec<AccountSummary>> {
        self.repo
            .accounts()?
            .iter()
            .map(|account| self.summary(&account.id))
            .collect()
    }
}

/// The event with its market id in normalised form.
fn normalized(event: &LedgerEvent) -> Cow<'_, LedgerEvent> {
    let market_id = normalize_id(&event.meta.market);
    if market_id == event.meta.market {
        return Cow::Borrowed(event);
    }
    let mut owned = event.clone();
    owned.meta.market = market_id;
    Cow::Owned(owned)
}

fn stripe_of(account_id: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    account_id.hash(&mut hasher);
    (hasher.finish() % LOCK_STRIPES as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::address_id;
    use crate::events::{EventKind, EventMeta};
    use crate::health::HealthState;
    use crate::market::{Market, MarketBook};
    use crate::store::MemoryStore;
    use alloy::primitives::{Address, B256, U256};

    const CETH: Address = Address::new([0xe0; 20]);
    const CDAI: Address = Address::new([0xd0; 20]);
    const ALICE: Address = Address::new([0x01; 20]);
    const BOB: Address = Address::new([0x02; 20]);

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn wad(units: u64) -> U256 {
        U256::from(units) * U256::from(1_000_000_000_000_000_000u128)
    }

    fn ctoken_units(units: u64) -> U256 {
        U256::from(units) * U256::from(100_000_000u64)
    }

    fn book() -> Arc<MarketBook> {
        let book = MarketBook::new();
        // 0.5 * 0.02 * 10 = 0.1 per cETH
        book.upsert(Market {
            id: address_id(&CETH),
            symbol: "cETH".into(),
            underlying_decimals: 18,
            exchange_rate: d("0.02"),
            borrow_index: d("1"),
            collateral_factor: d("0.5"),
            underlying_price: d("10"),
        })
        .unwrap();
        book.upsert(Market {
            id: address_id(&CDAI),
            symbol: "cDAI".into(),
            underlying_decimals: 18,
            exchange_rate: d("0.02"),
            borrow_index: d("1"),
            collateral_factor: d("0.75"),
            underlying_price: d("1"),
        })
        .unwrap();
        Arc::new(book)
    }

    fn ledger() -> Ledger<MemoryStore, MarketBook> {
        Ledger::new(Arc::new(MemoryStore::new()), book())
    }

    fn event(market: &Address, block: u64, kind: EventKind) -> LedgerEvent {
        LedgerEvent {
            meta: EventMeta {
                market: address_id(market),
                tx_hash: B256::repeat_byte(block as u8),
                timestamp: 1_700_000_000 + block,
                block_number: block,
                log_index: 0,
            },
            kind,
        }
    }

    fn mint(who: Address, tokens: u64) -> EventKind {
        EventKind::Mint {
            minter: who,
            mint_amount: wad(tokens / 50),
            mint_tokens: ctoken_units(tokens),
        }
    }

    #[test]
    fn test_unknown_account_is_empty() {
        let ledger = ledger();
        let nobody = address_id(&BOB);

        assert!(ledger.total_collateral_value(&nobody).unwrap().is_zero());
        assert!(ledger.total_borrow_value(&nobody).unwrap().is_zero());
        assert_eq!(ledger.health(&nobody).unwrap(), None);
    }

    #[test]
    fn test_unknown_market_is_rejected() {
        let ledger = ledger();
        let err = ledger.apply(&event(&BOB, 1, mint(ALICE, 100))).unwrap_err();
        assert!(matches!(err, LedgerError::MissingMarket(_)));
        assert_eq!(ledger.repository().transaction_count(), 0);
    }

    #[test]
    fn test_market_id_is_normalized() {
        let ledger = ledger();
        let mut e = event(&CETH, 1, mint(ALICE, 100));
        e.meta.market = e.meta.market.to_uppercase().replacen("0X", "0x", 1);

        ledger.apply(&e).unwrap();
        assert_eq!(ledger.total_collateral_value(&address_id(&ALICE)).unwrap(), d("10"));
    }

    #[test]
    fn test_supply_borrow_and_health() {
        let ledger = ledger();
        let alice = address_id(&ALICE);

        ledger.apply(&event(&CETH, 1, mint(ALICE, 100))).unwrap();
        assert_eq!(ledger.health(&alice).unwrap(), None);

        ledger
            .apply(&event(&CDAI, 2, EventKind::Borrow {
                borrower: ALICE,
                borrow_amount: wad(4),
                account_borrows: wad(4),
            }))
            .unwrap();

        // collateral 100 * 0.1 = 10, borrow 4 * 1 = 4
        assert_eq!(ledger.total_collateral_value(&alice).unwrap(), d("10"));
        assert_eq!(ledger.total_borrow_value(&alice).unwrap(), d("4"));
        assert_eq!(ledger.health(&alice).unwrap(), Some(d("2.5")));

        let summary = ledger.summary(&alice).unwrap();
        assert_eq!(summary.state, HealthState::OutstandingDebt);
        assert_eq!(summary.positions.len(), 2);
    }

    #[test]
    fn test_replay_through_ledger_is_absorbed() {
        let ledger = ledger();
        let e = event(&CETH, 1, mint(ALICE, 100));

        assert!(!ledger.apply(&e).unwrap().replayed);
        assert!(ledger.apply(&e).unwrap().replayed);
        assert_eq!(
            ledger.total_collateral_value(&address_id(&ALICE)).unwrap(),
            d("10")
        );
    }

    #[test]
    fn test_is_applied() {
        let ledger = ledger();
        let supply = event(&CETH, 1, mint(ALICE, 100));
        let market_leg = event(&CETH, 1, EventKind::Transfer {
            from: CETH,
            to: ALICE,
            amount: ctoken_units(100),
        });

        assert!(!ledger.is_applied(&supply).unwrap());
        ledger.apply(&supply).unwrap();
        assert!(ledger.is_applied(&supply).unwrap());
        assert!(ledger.is_applied(&market_leg).unwrap());

        let mut upper = supply.clone();
        upper.meta.market = upper.meta.market.to_uppercase().replacen("0X", "0x", 1);
        assert!(ledger.is_applied(&upper).unwrap());
    }

    #[test]
    fn test_summaries_cover_every_account() {
        let ledger = ledger();
        ledger.apply(&event(&CETH, 1, mint(ALICE, 100))).unwrap();
        ledger
            .apply(&event(&CETH, 2, EventKind::LiquidateBorrow {
                liquidator: BOB,
                borrower: ALICE,
                repay_amount: wad(1),
                ctoken_collateral: CETH,
                seize_tokens: ctoken_units(1),
            }))
            .unwrap();

        let summaries = ledger.summaries().unwrap();
        let ids: Vec<&str> = summaries.iter().map(|s| s.account.as_str()).collect();
        assert_eq!(ids, vec![address_id(&ALICE), address_id(&BOB)]);
        assert_eq!(summaries[0].count_liquidated, 1);
        assert_eq!(summaries[1].count_liquidator, 1);
        assert!(summaries[1].positions.is_empty());
    }

    #[test]
    fn test_attach_rebuilds_holdings() {
        let store = Arc::new(MemoryStore::new());
        let markets = book();
        Ledger::new(store.clone(), markets.clone())
            .apply(&event(&CETH, 1, mint(ALICE, 100)))
            .unwrap();

        let attached = Ledger::attach(store, markets).unwrap();
        assert_eq!(
            attached.total_collateral_value(&address_id(&ALICE)).unwrap(),
            d("10")
        );
    }

    #[test]
    fn test_concurrent_mints_on_one_position() {
        let ledger = Arc::new(ledger());
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    let mut e = event(&CETH, 1, mint(ALICE, 10));
                    e.meta.log_index = i;
                    ledger.apply(&e).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = ledger.snapshot(&address_id(&ALICE)).unwrap();
        let position = snapshot.positions.values().next().unwrap();
        assert_eq!(position.ctoken_balance, d("80"));
        assert_eq!(ledger.repository().transaction_count(), 8);
    }
}
