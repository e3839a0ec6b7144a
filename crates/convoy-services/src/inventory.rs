//! Inventory bookkeeping — global stock counters, per-client snapshots,
//! and the transaction history behind HISTORY requests.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

/// One recorded stock movement. Positive quantity = stock handed to the
/// client, negative = returned.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub item_id: i64,
    pub quantity: i64,
    pub timestamp: String,
}

#[derive(Clone, Default)]
pub struct InventoryManager {
    /// itemID -> units in stock.
    stock: Arc<DashMap<i64, i64>>,
    /// clientID -> last reported inventory snapshot. Owned JSON trees,
    /// replaced wholesale on update.
    client_inventories: Arc<DashMap<i64, Value>>,
    /// clientID -> stock movements, oldest first.
    history: Arc<DashMap<i64, Vec<Transaction>>>,
}

impl InventoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add stock for an item. Rejects non-positive quantities.
    pub fn increase_stock(&self, item_id: i64, quantity: i64) -> bool {
        if quantity <= 0 {
            return false;
        }
        *self.stock.entry(item_id).or_insert(0) += quantity;
        true
    }

    /// Remove stock for an item. Rejects non-positive quantities and
    /// amounts exceeding what is available.
    pub fn decrease_stock(&self, item_id: i64, quantity: i64) -> bool {
        if quantity <= 0 {
            return false;
        }
        match self.stock.get_mut(&item_id) {
            Some(mut level) if *level >= quantity => {
                *level -= quantity;
                true
            }
            _ => false,
        }
    }

    pub fn stock_level(&self, item_id: i64) -> i64 {
        self.stock.get(&item_id).map(|l| *l).unwrap_or(0)
    }

    /// Replace a client's inventory snapshot with an owned copy.
    pub fn update_client_inventory(&self, client_id: i64, inventory: Value) {
        self.client_inventories.insert(client_id, inventory);
    }

    /// Snapshot of a client's reported inventory, if any.
    pub fn client_inventory(&self, client_id: i64) -> Option<Value> {
        self.client_inventories.get(&client_id).map(|v| v.clone())
    }

    /// Record a stock movement against a client.
    pub fn log_transaction(&self, client_id: i64, item_id: i64, quantity: i64) {
        let entry = Transaction {
            item_id,
            quantity,
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        tracing::debug!(client_id, item_id, quantity, "transaction recorded");
        self.history.entry(client_id).or_default().push(entry);
    }

    pub fn transaction_history(&self, client_id: i64) -> Vec<Transaction> {
        self.history
            .get(&client_id)
            .map(|h| h.clone())
            .unwrap_or_default()
    }
}
