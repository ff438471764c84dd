use crate::broker::Broker;
use crate::error::StoreError;
use crate::transaction::Transaction;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;

// Each list lives as a JSON-encoded array under its own key, mirroring the
// backup file layout.
const TRANSACTIONS_KEY: &str = "transactions";
const BROKERS_KEY: &str = "brokers";

/// What changed in the store. Sent to every live subscriber after a
/// mutation has been flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    TransactionsChanged,
    BrokersChanged,
    Restored,
}

/// Persistent key-value store for the portfolio.
///
/// Passed by reference to everything that needs it; there is no global
/// instance. Consumers that want to recompute on change call [`subscribe`]
/// instead of polling.
///
/// [`subscribe`]: PortfolioStore::subscribe
pub struct PortfolioStore {
    db: sled::Db,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<StoreEvent>>>,
}

impl PortfolioStore {
    pub fn open(path: impl AsRef<Path>) -> Result<PortfolioStore, StoreError> {
        let db = sled::open(path)?;
        Ok(PortfolioStore {
            db,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// An in-memory store that vanishes on drop.
    #[cfg(test)]
    pub fn temporary() -> Result<PortfolioStore, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(PortfolioStore {
            db,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Registers a change listener. The receiver gets one event per
    /// mutation; dropped receivers are cleaned up on the next notify.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("subscriber list poisoned")
            .push(sender);
        receiver
    }

    fn notify(&self, event: StoreEvent) {
        self.subscribers
            .lock()
            .expect("subscriber list poisoned")
            .retain(|sender| sender.send(event).is_ok());
    }

    fn load_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        match self.db.get(key)? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn save_list<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(items)?;
        self.db.insert(key, encoded)?;
        // block until the write is stable on disk
        self.db.flush()?;
        Ok(())
    }

    /// All transactions in insertion order.
    pub fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        self.load_list(TRANSACTIONS_KEY)
    }

    pub fn append_transaction(&self, transaction: Transaction) -> Result<(), StoreError> {
        let mut transactions = self.transactions()?;
        transactions.push(transaction);
        self.save_list(TRANSACTIONS_KEY, &transactions)?;
        self.notify(StoreEvent::TransactionsChanged);
        Ok(())
    }

    /// Replaces the record with the same id, keeping its position in the
    /// list. The replacement keeps the original id.
    pub fn update_transaction(
        &self,
        id: &str,
        mut updated: Transaction,
    ) -> Result<(), StoreError> {
        let mut transactions = self.transactions()?;
        let slot = transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        updated.id = id.to_string();
        *slot = updated;
        self.save_list(TRANSACTIONS_KEY, &transactions)?;
        self.notify(StoreEvent::TransactionsChanged);
        Ok(())
    }

    pub fn remove_transaction(&self, id: &str) -> Result<(), StoreError> {
        let mut transactions = self.transactions()?;
        let before = transactions.len();
        transactions.retain(|t| t.id != id);
        if transactions.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.save_list(TRANSACTIONS_KEY, &transactions)?;
        self.notify(StoreEvent::TransactionsChanged);
        Ok(())
    }

    pub fn brokers(&self) -> Result<Vec<Broker>, StoreError> {
        self.load_list(BROKERS_KEY)
    }

    pub fn save_brokers(&self, brokers: &[Broker]) -> Result<(), StoreError> {
        self.save_list(BROKERS_KEY, brokers)?;
        self.notify(StoreEvent::BrokersChanged);
        Ok(())
    }

    /// Swaps the entire persisted state in one call. Used by restore after
    /// the backup document has been fully parsed.
    pub fn replace_all(
        &self,
        transactions: &[Transaction],
        brokers: &[Broker],
    ) -> Result<(), StoreError> {
        self.save_list(TRANSACTIONS_KEY, transactions)?;
        self.save_list(BROKERS_KEY, brokers)?;
        self.notify(StoreEvent::Restored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Currency, TransactionType};
    use chrono::Utc;

    fn tx(ticker: &str, quantity: f64, price: f64) -> Transaction {
        Transaction::new(
            ticker,
            "Schwab",
            quantity,
            price,
            Utc::now(),
            TransactionType::Buy,
            Currency::Usd,
        )
        .unwrap()
    }

    #[test]
    fn test_append_and_list_keeps_insertion_order() {
        let store = PortfolioStore::temporary().unwrap();
        assert!(store.transactions().unwrap().is_empty());

        store.append_transaction(tx("AAPL", 10.0, 100.0)).unwrap();
        store.append_transaction(tx("MSFT", 5.0, 300.0)).unwrap();
        store.append_transaction(tx("AAPL", 2.0, 110.0)).unwrap();

        let listed = store.transactions().unwrap();
        let tickers: Vec<&str> = listed.iter().map(|t| t.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT", "AAPL"]);
    }

    #[test]
    fn test_update_replaces_in_place_and_keeps_id() {
        let store = PortfolioStore::temporary().unwrap();
        store.append_transaction(tx("AAPL", 10.0, 100.0)).unwrap();
        store.append_transaction(tx("MSFT", 5.0, 300.0)).unwrap();

        let id = store.transactions().unwrap()[0].id.clone();
        store.update_transaction(&id, tx("AAPL", 12.0, 95.0)).unwrap();

        let listed = store.transactions().unwrap();
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].quantity, 12.0);
        assert_eq!(listed[1].ticker, "MSFT");
    }

    #[test]
    fn test_remove_unknown_id_is_not_found() {
        let store = PortfolioStore::temporary().unwrap();
        store.append_transaction(tx("AAPL", 10.0, 100.0)).unwrap();

        assert!(matches!(
            store.remove_transaction("missing"),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.transactions().unwrap().len(), 1);

        let id = store.transactions().unwrap()[0].id.clone();
        store.remove_transaction(&id).unwrap();
        assert!(store.transactions().unwrap().is_empty());
    }

    #[test]
    fn test_subscribers_get_one_event_per_mutation() {
        let store = PortfolioStore::temporary().unwrap();
        let mut events = store.subscribe();

        store.append_transaction(tx("AAPL", 1.0, 1.0)).unwrap();
        store.save_brokers(&[]).unwrap();
        store.replace_all(&[], &[]).unwrap();

        assert_eq!(events.try_recv().unwrap(), StoreEvent::TransactionsChanged);
        assert_eq!(events.try_recv().unwrap(), StoreEvent::BrokersChanged);
        assert_eq!(events.try_recv().unwrap(), StoreEvent::Restored);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let store = PortfolioStore::temporary().unwrap();
        let events = store.subscribe();
        drop(events);

        // must not fail or leak the closed sender
        store.append_transaction(tx("AAPL", 1.0, 1.0)).unwrap();
        assert_eq!(store.subscribers.lock().unwrap().len(), 0);
    }
}
