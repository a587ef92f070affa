//! Protocol participant records.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::store::{Entity, EntityKind};

/// One protocol participant, keyed by wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Wallet address (lower-case hex)
    pub id: String,
    /// Times this account was liquidated
    pub count_liquidated: u32,
    /// Times this account acted as liquidator
    pub count_liquidator: u32,
    /// Set on the first borrow; never cleared
    has_borrowed: bool,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            count_liquidated: 0,
            count_liquidator: 0,
            has_borrowed: false,
        }
    }

    pub fn has_borrowed(&self) -> bool {
        self.has_borrowed
    }

    /// Record that this account has borrowed at least once.
    ///
    /// Returns `true` when this call flipped the flag.
    pub fn mark_borrowed(&mut self) -> bool {
        let flipped = !self.has_borrowed;
        self.has_borrowed = true;
        flipped
    }
}

impl Entity for Account {
    const KIND: EntityKind = EntityKind::Account;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Normalise a wallet or contract address into the id form used by every key.
pub fn normalize_id(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Id form of a parsed address.
pub fn address_id(address: &Address) -> String {
    normalize_id(&address.to_string())
}
