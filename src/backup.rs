//! Backup export and restore.
//!
//! The backup is one JSON document holding both persisted lists. Restore
//! is all-or-nothing: the document is parsed and validated in full before
//! anything is written, so a corrupt file leaves the store untouched.

use crate::broker::Broker;
use crate::error::BackupError;
use crate::store::PortfolioStore;
use crate::transaction::Transaction;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupFile {
    pub transactions: Vec<Transaction>,
    pub brokers: Vec<Broker>,
}

/// `stock-portfolio-backup-YYYY-MM-DD.json`
pub fn default_backup_filename() -> String {
    format!(
        "stock-portfolio-backup-{}.json",
        Utc::now().format("%Y-%m-%d")
    )
}

/// Writes the full persisted state to `path` as pretty-printed JSON.
/// Returns the counts of exported transactions and brokers.
pub fn export(store: &PortfolioStore, path: &Path) -> Result<(usize, usize), BackupError> {
    let backup = BackupFile {
        transactions: store.transactions()?,
        brokers: store.brokers()?,
    };
    let json = serde_json::to_string_pretty(&backup)
        .map_err(|e| BackupError::CorruptBackup(e.to_string()))?;
    fs::write(path, json)?;
    Ok((backup.transactions.len(), backup.brokers.len()))
}

/// Replaces all persisted state with the contents of a backup file.
/// Returns the counts of restored transactions and brokers.
pub fn restore(store: &PortfolioStore, path: &Path) -> Result<(usize, usize), BackupError> {
    let raw = fs::read_to_string(path)?;
    let backup: BackupFile =
        serde_json::from_str(&raw).map_err(|e| BackupError::CorruptBackup(e.to_string()))?;
    store.replace_all(&backup.transactions, &backup.brokers)?;
    Ok((backup.transactions.len(), backup.brokers.len()))
}
