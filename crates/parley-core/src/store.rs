//! In-memory transaction store
//!
//! The store is the single source of truth for committed transactions. Records
//! are only ever added or replaced whole, so a reader never observes a
//! half-applied edit.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::Transaction;

/// Keyed transaction storage
pub trait TransactionStore: Send + Sync {
    /// Append transactions; ids already present are replaced in place
    fn add(&self, transactions: &[Transaction]) -> Result<()>;

    /// Replace a stored transaction by id
    fn update(&self, transaction: &Transaction) -> Result<()>;

    /// All transactions in insertion order
    fn list(&self) -> Result<Vec<Transaction>>;

    fn get(&self, id: &str) -> Result<Option<Transaction>>;
}

#[derive(Default)]
struct Inner {
    records: Vec<Transaction>,
    index: HashMap<String, usize>,
}

/// Process-local store guarded by a `RwLock`
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|g| g.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::InvalidData("transaction store lock poisoned".to_string())
}

impl TransactionStore for InMemoryStore {
    fn add(&self, transactions: &[Transaction]) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        for tx in transactions {
            match inner.index.get(&tx.id).copied() {
                Some(pos) => inner.records[pos] = tx.clone(),
                None => {
                    let pos = inner.records.len();
                    inner.index.insert(tx.id.clone(), pos);
                    inner.records.push(tx.clone());
                }
            }
        }
        Ok(())
    }

    fn update(&self, transaction: &Transaction) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let pos = inner
            .index
            .get(&transaction.id)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("transaction {}", transaction.id)))?;
        inner.records[pos] = transaction.clone();
        Ok(())
    }

    fn list(&self) -> Result<Vec<Transaction>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.records.clone())
    }

    fn get(&self, id: &str) -> Result<Option<Transaction>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.index.get(id).map(|&pos| inner.records[pos].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, TxDate};

    #[test]
    fn test_add_and_list_preserves_order() {
        let store = InMemoryStore::new();
        let a = Transaction::new(TxDate::Unknown, "A", 1.0, Direction::Out);
        let b = Transaction::new(TxDate::Unknown, "B", 2.0, Direction::In);
        store.add(&[a.clone(), b.clone()]).unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a.id);
        assert_eq!(listed[1].id, b.id);
    }

    #[test]
    fn test_update_replaces_whole_record() {
        let store = InMemoryStore::new();
        let mut tx = Transaction::new(TxDate::Unknown, "Target", 20.0, Direction::Unknown);
        store.add(std::slice::from_ref(&tx)).unwrap();
        tx.direction = Direction::Out;
        tx.notes = "corrected".to_string();
        store.update(&tx).unwrap();
        let stored = store.get(&tx.id).unwrap().unwrap();
        assert_eq!(stored.direction, Direction::Out);
        assert_eq!(stored.notes, "corrected");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let store = InMemoryStore::new();
        let tx = Transaction::new(TxDate::Unknown, "Ghost", 1.0, Direction::Out);
        assert!(matches!(store.update(&tx), Err(Error::NotFound(_))));
    }
}
