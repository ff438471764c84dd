use crate::error::{BrokerError, StoreError, ValidationError};
use crate::store::PortfolioStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A brokerage account transactions are attributed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broker {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Broker {
    fn new(name: &str) -> Broker {
        Broker {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Registry of brokers, persisted through the store.
pub struct BrokerRegistry<'a> {
    store: &'a PortfolioStore,
}

impl<'a> BrokerRegistry<'a> {
    pub fn new(store: &'a PortfolioStore) -> BrokerRegistry<'a> {
        BrokerRegistry { store }
    }

    pub fn list(&self) -> Result<Vec<Broker>, StoreError> {
        self.store.brokers()
    }

    pub fn list_active(&self) -> Result<Vec<Broker>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|b| b.is_active)
            .collect())
    }

    /// Adds a broker with a fresh id, active by default. Names must be
    /// non-empty and unique (case-insensitive).
    pub fn add(&self, name: &str) -> Result<Broker, BrokerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::BrokerRequired.into());
        }
        let mut brokers = self.list()?;
        if brokers.iter().any(|b| b.name.eq_ignore_ascii_case(name)) {
            return Err(ValidationError::DuplicateBroker(name.to_string()).into());
        }
        let broker = Broker::new(name);
        brokers.push(broker.clone());
        self.store.save_brokers(&brokers)?;
        Ok(broker)
    }

    pub fn set_active(&self, id: &str, active: bool) -> Result<(), StoreError> {
        let mut brokers = self.list()?;
        let broker = brokers
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        broker.is_active = active;
        self.store.save_brokers(&brokers)
    }

    pub fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut brokers = self.list()?;
        let before = brokers.len();
        brokers.retain(|b| b.id != id);
        if brokers.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.store.save_brokers(&brokers)
    }

    /// Looks a broker up by name for transaction entry: it must exist and
    /// be active.
    pub fn resolve_active(&self, name: &str) -> Result<Broker, BrokerError> {
        let brokers = self.list()?;
        let broker = brokers
            .into_iter()
            .find(|b| b.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ValidationError::UnknownBroker(name.trim().to_string()))?;
        if !broker.is_active {
            return Err(ValidationError::InactiveBroker(broker.name).into());
        }
        Ok(broker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_list() {
        let store = PortfolioStore::temporary().unwrap();
        let registry = BrokerRegistry::new(&store);

        let broker = registry.add("Schwab").unwrap();
        assert!(broker.is_active);
        registry.add("Fidelity").unwrap();

        let names: Vec<String> = registry.list().unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Schwab", "Fidelity"]);
    }

    #[test]
    fn test_add_rejects_empty_and_duplicate_names() {
        let store = PortfolioStore::temporary().unwrap();
        let registry = BrokerRegistry::new(&store);

        assert!(matches!(
            registry.add("   "),
            Err(BrokerError::Validation(ValidationError::BrokerRequired))
        ));

        registry.add("Schwab").unwrap();
        assert!(matches!(
            registry.add("schwab"),
            Err(BrokerError::Validation(ValidationError::DuplicateBroker(_)))
        ));
    }

    #[test]
    fn test_toggle_active_filters_list_active() {
        let store = PortfolioStore::temporary().unwrap();
        let registry = BrokerRegistry::new(&store);

        let schwab = registry.add("Schwab").unwrap();
        registry.add("Fidelity").unwrap();
        registry.set_active(&schwab.id, false).unwrap();

        let active: Vec<String> = registry
            .list_active()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(active, vec!["Fidelity"]);

        registry.set_active(&schwab.id, true).unwrap();
        assert_eq!(registry.list_active().unwrap().len(), 2);
    }

    #[test]
    fn test_remove() {
        let store = PortfolioStore::temporary().unwrap();
        let registry = BrokerRegistry::new(&store);

        let broker = registry.add("Schwab").unwrap();
        registry.remove(&broker.id).unwrap();
        assert!(registry.list().unwrap().is_empty());
        assert!(matches!(
            registry.remove(&broker.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_active() {
        let store = PortfolioStore::temporary().unwrap();
        let registry = BrokerRegistry::new(&store);

        let broker = registry.add("Schwab").unwrap();
        assert_eq!(registry.resolve_active(" schwab ").unwrap().id, broker.id);

        registry.set_active(&broker.id, false).unwrap();
        assert!(matches!(
            registry.resolve_active("Schwab"),
            Err(BrokerError::Validation(ValidationError::InactiveBroker(_)))
        ));
        assert!(matches!(
            registry.resolve_active("Robinhood"),
            Err(BrokerError::Validation(ValidationError::UnknownBroker(_)))
        ));
    }
}
