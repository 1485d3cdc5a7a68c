use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use stock_ledger_core::{Aggregate, AggregateRoot, ExpectedVersion, ProductId};
use stock_ledger_inventory::{
    MovementFilter, MovementId, MovementRecord, ProductBalance, RecordMovement, StockTerms,
    sort_history,
};

use super::r#trait::{CommittedMovement, LedgerStore, LedgerStoreError, ProductSnapshot};

#[derive(Debug, Clone)]
struct ProductStream {
    balance: ProductBalance,
    history: Vec<MovementRecord>,
}

impl ProductStream {
    fn new(balance: ProductBalance) -> Self {
        Self {
            balance,
            history: Vec::new(),
        }
    }

    /// Check, apply and append one movement. On error the stream is untouched.
    fn append(
        &mut self,
        movement: RecordMovement,
        expected: ExpectedVersion,
        next_id: &AtomicU64,
    ) -> Result<CommittedMovement, LedgerStoreError> {
        let current = self.balance.version();
        if !expected.matches(current) {
            return Err(LedgerStoreError::Concurrency(format!(
                "expected {expected:?}, found {current}"
            )));
        }

        let mut balance = self.balance.clone();
        balance.apply(&movement.change());
        if balance.current_stock() < 0 {
            return Err(LedgerStoreError::Corrupt(format!(
                "movement would leave product {} at {}",
                movement.product_id,
                balance.current_stock()
            )));
        }

        let id = MovementId(next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let record = movement.into_record(id, balance.current_stock());

        self.history.push(record.clone());
        self.balance = balance.clone();

        Ok(CommittedMovement { record, balance })
    }
}

type SharedStream = Arc<RwLock<ProductStream>>;

/// In-memory ledger store.
///
/// Intended for tests/dev and single-process use. Each product's balance and history live
/// behind their own lock, so a commit for one product never blocks reads of another.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    streams: RwLock<HashMap<ProductId, SharedStream>>,
    next_id: AtomicU64,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> LedgerStoreError {
        LedgerStoreError::Backend("lock poisoned".to_string())
    }

    fn stream(&self, product_id: ProductId) -> Result<Option<SharedStream>, LedgerStoreError> {
        let streams = self.streams.read().map_err(|_| Self::poisoned())?;
        Ok(streams.get(&product_id).cloned())
    }

    fn all_streams(&self) -> Result<Vec<SharedStream>, LedgerStoreError> {
        let streams = self.streams.read().map_err(|_| Self::poisoned())?;
        Ok(streams.values().cloned().collect())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load_balance(&self, product_id: ProductId) -> Result<Option<ProductBalance>, LedgerStoreError> {
        let Some(stream) = self.stream(product_id)? else {
            return Ok(None);
        };
        let stream = stream.read().map_err(|_| Self::poisoned())?;
        Ok(Some(stream.balance.clone()))
    }

    fn commit(
        &self,
        movement: RecordMovement,
        expected: ExpectedVersion,
    ) -> Result<CommittedMovement, LedgerStoreError> {
        let product_id = movement.product_id;

        if let Some(stream) = self.stream(product_id)? {
            let mut stream = stream.write().map_err(|_| Self::poisoned())?;
            return stream.append(movement, expected, &self.next_id);
        }

        // First movement of an unseen product: the stream only becomes visible once the
        // movement has been applied.
        let mut streams = self.streams.write().map_err(|_| Self::poisoned())?;
        if let Some(stream) = streams.get(&product_id).cloned() {
            drop(streams);
            let mut stream = stream.write().map_err(|_| Self::poisoned())?;
            return stream.append(movement, expected, &self.next_id);
        }

        let mut stream = ProductStream::new(ProductBalance::empty(product_id));
        let committed = stream.append(movement, expected, &self.next_id)?;
        streams.insert(product_id, Arc::new(RwLock::new(stream)));
        Ok(committed)
    }

    fn upsert_terms(
        &self,
        product_id: ProductId,
        terms: StockTerms,
    ) -> Result<ProductBalance, LedgerStoreError> {
        let stream = {
            let mut streams = self.streams.write().map_err(|_| Self::poisoned())?;
            streams
                .entry(product_id)
                .or_insert_with(|| {
                    Arc::new(RwLock::new(ProductStream::new(ProductBalance::empty(product_id))))
                })
                .clone()
        };

        let mut stream = stream.write().map_err(|_| Self::poisoned())?;
        stream.balance.set_terms(terms);
        Ok(stream.balance.clone())
    }

    fn remove(&self, product_id: ProductId) -> Result<(), LedgerStoreError> {
        let mut streams = self.streams.write().map_err(|_| Self::poisoned())?;
        let stream = streams
            .get(&product_id)
            .ok_or(LedgerStoreError::NotFound(product_id))?;

        let has_history = {
            let stream = stream.read().map_err(|_| Self::poisoned())?;
            stream.balance.has_history() || !stream.history.is_empty()
        };
        if has_history {
            return Err(LedgerStoreError::HasHistory(product_id));
        }

        streams.remove(&product_id);
        Ok(())
    }

    fn list_balances(&self) -> Result<Vec<ProductBalance>, LedgerStoreError> {
        let mut balances = Vec::new();
        for stream in self.all_streams()? {
            let stream = stream.read().map_err(|_| Self::poisoned())?;
            balances.push(stream.balance.clone());
        }
        balances.sort_by_key(ProductBalance::product_id);
        Ok(balances)
    }

    fn movements(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        let streams = match filter.product_id {
            Some(product_id) => self.stream(product_id)?.into_iter().collect(),
            None => self.all_streams()?,
        };

        let mut records = Vec::new();
        for stream in streams {
            let stream = stream.read().map_err(|_| Self::poisoned())?;
            records.extend(stream.history.iter().filter(|r| filter.matches(r)).cloned());
        }

        sort_history(&mut records);
        Ok(records)
    }

    fn snapshot(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>, LedgerStoreError> {
        let Some(stream) = self.stream(product_id)? else {
            return Ok(None);
        };
        let stream = stream.read().map_err(|_| Self::poisoned())?;
        let mut history = stream.history.clone();
        sort_history(&mut history);
        Ok(Some(ProductSnapshot {
            balance: stream.balance.clone(),
            history,
        }))
    }
}
