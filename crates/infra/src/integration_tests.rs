//! Integration tests for the full ledger pipeline.
//!
//! Tests: MovementRequest → LedgerEngine → LedgerStore → EventBus / QueryService
//!
//! Verifies:
//! - Concurrent outbounds never oversell and never lose updates
//! - Per-product history order equals acceptance order
//! - Failed commits leave balance, history and the bus untouched
//! - Low-stock transitions are published once per crossing

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;
    use std::time::{Duration as StdDuration, Instant};

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    use stock_ledger_core::{
        ActorId, AggregateRoot, Clock, ExpectedVersion, LedgerError, ManualClock, ProductId,
    };
    use stock_ledger_events::{EventBus, InMemoryEventBus};
    use stock_ledger_inventory::{
        LedgerEvent, MovementFilter, MovementRecord, MovementRequest, MovementType, ProductBalance,
        RecordMovement, StockTerms,
    };

    use crate::config::LedgerConfig;
    use crate::engine::{LedgerEnvelope, MAX_COMMIT_ATTEMPTS};
    use crate::ledger_store::{
        CommittedMovement, InMemoryLedgerStore, LedgerStore, LedgerStoreError, ProductSnapshot,
    };
    use crate::query::TimeRange;
    use crate::services::{InMemoryLedger, LedgerServices, build_in_memory};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 14, 0, 0).unwrap()
    }

    fn actor() -> ActorId {
        ActorId::from_uuid(Uuid::from_u128(0xA11CE))
    }

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(t0()))
    }

    fn setup_with(config: LedgerConfig) -> (InMemoryLedger, Arc<ManualClock>) {
        let clock = manual_clock();
        let services = build_in_memory(config, clock.clone() as Arc<dyn Clock>);
        (services, clock)
    }

    fn setup() -> (InMemoryLedger, Arc<ManualClock>) {
        setup_with(LedgerConfig::default())
    }

    fn stock_in(ledger: &InMemoryLedger, product_id: ProductId, qty: i64) -> MovementRecord {
        ledger
            .engine
            .apply(MovementRequest::inbound(product_id, qty, "Compra"), actor())
            .unwrap()
    }

    #[test]
    fn concurrent_unit_outbounds_never_oversell() {
        const OPENING: i64 = 20;
        const WORKERS: usize = 50;

        let (ledger, _clock) = setup();
        let ledger = Arc::new(ledger);
        let product = ProductId::new();
        stock_in(&ledger, product, OPENING);

        let barrier = Arc::new(Barrier::new(WORKERS));
        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let ledger = ledger.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    ledger
                        .engine
                        .apply(MovementRequest::outbound(product, 1, "Venda"), actor())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::InsufficientStock { .. })))
            .count();

        assert_eq!(successes, OPENING as usize);
        assert_eq!(insufficient, WORKERS - OPENING as usize);

        let balance = ledger.queries.get_balance(product).unwrap();
        assert_eq!(balance.current_stock(), 0);
        assert_eq!(balance.version(), OPENING as u64 + 1);
        assert_eq!(ledger.queries.reconstruct_balance(product).unwrap(), 0);
        assert!(ledger.queries.verify_integrity().unwrap().is_empty());
    }

    #[test]
    fn different_products_proceed_independently() {
        let (ledger, _clock) = setup();
        let ledger = Arc::new(ledger);
        let products: Vec<ProductId> = (0..8).map(|_| ProductId::new()).collect();

        let handles: Vec<_> = products
            .iter()
            .copied()
            .map(|product| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        stock_in(&ledger, product, 2);
                    }
                    for _ in 0..10 {
                        ledger
                            .engine
                            .apply(MovementRequest::outbound(product, 3, "Venda"), actor())
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for product in products {
            assert_eq!(ledger.queries.get_balance(product).unwrap().current_stock(), 20);
        }

        let all = ledger.queries.list_movements(&MovementFilter::all()).unwrap();
        assert_eq!(all.len(), 8 * 35);
        let mut ids: Vec<u64> = all.iter().map(|r| r.id.0).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), all.len(), "movement ids must be unique");
        assert!(ledger.queries.verify_integrity().unwrap().is_empty());
    }

    #[test]
    fn low_stock_scenario() {
        let (ledger, _clock) = setup();
        let product = ProductId::new();

        ledger
            .engine
            .configure_product(product, StockTerms::new(10, 0, 0))
            .unwrap();
        stock_in(&ledger, product, 5);

        let record = stock_in(&ledger, product, 3);
        assert_eq!(record.resulting_stock, 8);
        let low = ledger.queries.list_low_stock().unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].product_id(), product);

        let err = ledger
            .engine
            .apply(MovementRequest::outbound(product, 20, "Venda"), actor())
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientStock {
                product_id: product,
                available: 8,
                requested: 20,
            }
        );
        assert_eq!(ledger.queries.get_balance(product).unwrap().current_stock(), 8);

        stock_in(&ledger, product, 5);
        assert_eq!(ledger.queries.get_balance(product).unwrap().current_stock(), 13);
        assert!(ledger.queries.list_low_stock().unwrap().is_empty());
    }

    #[test]
    fn low_stock_is_ordered_by_deficit_then_product() {
        let (ledger, _clock) = setup();
        let a = ProductId::from_uuid(Uuid::from_u128(1));
        let b = ProductId::from_uuid(Uuid::from_u128(2));
        let c = ProductId::from_uuid(Uuid::from_u128(3));

        for (product, min, stock) in [(a, 10, 8), (b, 10, 2), (c, 5, 3)] {
            ledger
                .engine
                .configure_product(product, StockTerms::new(min, 0, 0))
                .unwrap();
            stock_in(&ledger, product, stock);
        }

        let order: Vec<ProductId> = ledger
            .queries
            .list_low_stock()
            .unwrap()
            .iter()
            .map(ProductBalance::product_id)
            .collect();
        // Surpluses: a = -2, b = -8, c = -2.
        assert_eq!(order, vec![b, a, c]);
    }

    #[test]
    fn history_follows_acceptance_order() {
        let (ledger, _clock) = setup();
        let ledger = Arc::new(ledger);
        let product = ProductId::new();

        // Hold the product's gate so every submission queues behind it in a known order.
        let gate = ledger.engine.gates().gate(product);
        let held = gate.enter();

        let mut handles = Vec::new();
        for qty in 1..=5 {
            let ledger = ledger.clone();
            handles.push(thread::spawn(move || stock_in(&ledger, product, qty)));

            let deadline = Instant::now() + StdDuration::from_secs(5);
            while gate.occupancy() != qty as u64 + 1 {
                assert!(Instant::now() < deadline, "submission {qty} never queued");
                thread::sleep(StdDuration::from_millis(1));
            }
        }

        drop(held);
        for h in handles {
            h.join().unwrap();
        }

        let history = ledger
            .queries
            .list_movements(&MovementFilter::for_product(product))
            .unwrap();
        let quantities: Vec<u64> = history.iter().map(|r| r.quantity).collect();
        assert_eq!(quantities, vec![1, 2, 3, 4, 5]);
        let running: Vec<i64> = history.iter().map(|r| r.resulting_stock).collect();
        assert_eq!(running, vec![1, 3, 6, 10, 15]);
    }

    #[test]
    fn timestamps_never_go_backwards_when_the_clock_does() {
        let (ledger, clock) = setup();
        let product = ProductId::new();

        let first = stock_in(&ledger, product, 1);
        clock.set(t0() - Duration::minutes(5));
        let second = stock_in(&ledger, product, 1);

        assert_eq!(first.created_at, t0());
        assert_eq!(second.created_at, t0());
        assert!(second.id > first.id);
    }

    #[test]
    fn repeated_reads_are_identical() {
        let (ledger, _clock) = setup();
        let product = ProductId::new();
        stock_in(&ledger, product, 7);

        let first = ledger.queries.get_balance(product).unwrap();
        let second = ledger.queries.get_balance(product).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejected_requests_leave_no_trace() {
        let (ledger, _clock) = setup();
        let events = ledger.bus.subscribe();
        let product = ProductId::new();
        stock_in(&ledger, product, 3);
        events.drain();

        let zero = ledger
            .engine
            .apply(MovementRequest::inbound(product, 0, "Compra"), actor());
        assert_eq!(zero, Err(LedgerError::InvalidQuantity(0)));

        let blank = ledger
            .engine
            .apply(MovementRequest::inbound(product, 2, "  "), actor());
        assert_eq!(blank, Err(LedgerError::MissingReason));

        let oversell = ledger
            .engine
            .apply(MovementRequest::outbound(product, 4, "Venda"), actor());
        assert!(matches!(oversell, Err(LedgerError::InsufficientStock { .. })));

        let balance = ledger.queries.get_balance(product).unwrap();
        assert_eq!(balance.current_stock(), 3);
        assert_eq!(balance.version(), 1);
        assert_eq!(
            ledger
                .queries
                .list_movements(&MovementFilter::for_product(product))
                .unwrap()
                .len(),
            1
        );
        assert!(events.drain().is_empty());
    }

    #[test]
    fn unknown_product_outbound_is_insufficient_and_not_created() {
        let (ledger, _clock) = setup();
        let product = ProductId::new();

        let err = ledger
            .engine
            .apply(MovementRequest::outbound(product, 1, "Venda"), actor())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { available: 0, .. }));
        assert_eq!(ledger.queries.get_balance(product), Err(LedgerError::NotFound(product)));
    }

    #[test]
    fn strict_catalog_rejects_unconfigured_products() {
        let (ledger, _clock) = setup_with(LedgerConfig::default().with_strict_catalog(true));
        let unknown = ProductId::new();
        let known = ProductId::new();

        let err = ledger
            .engine
            .apply(MovementRequest::inbound(unknown, 1, "Compra"), actor())
            .unwrap_err();
        assert_eq!(err, LedgerError::NotFound(unknown));

        ledger
            .engine
            .configure_product(known, StockTerms::new(2, 10, 500))
            .unwrap();
        assert_eq!(stock_in(&ledger, known, 4).resulting_stock, 4);
    }

    #[test]
    fn configure_product_validates_and_keeps_stock() {
        let (ledger, _clock) = setup();
        let product = ProductId::new();
        stock_in(&ledger, product, 6);

        let err = ledger
            .engine
            .configure_product(product, StockTerms::new(-1, 0, 0))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        // Inverted bounds are accepted (soft constraint).
        let balance = ledger
            .engine
            .configure_product(product, StockTerms::new(10, 5, 250))
            .unwrap();
        assert_eq!(balance.current_stock(), 6);
        assert_eq!(balance.version(), 1);
        assert_eq!(balance.maximum_stock(), 5);
        assert_eq!(balance.suggested_reorder(), 0);
    }

    #[test]
    fn remove_product_requires_empty_history() {
        let (ledger, _clock) = setup();
        let idle = ProductId::new();
        let moved = ProductId::new();

        ledger
            .engine
            .configure_product(idle, StockTerms::new(1, 5, 0))
            .unwrap();
        stock_in(&ledger, moved, 1);

        ledger.engine.remove_product(idle).unwrap();
        assert_eq!(ledger.queries.get_balance(idle), Err(LedgerError::NotFound(idle)));
        assert_eq!(
            ledger.engine.remove_product(idle),
            Err(LedgerError::NotFound(idle))
        );
        assert!(matches!(
            ledger.engine.remove_product(moved),
            Err(LedgerError::Conflict(_))
        ));
        assert_eq!(ledger.queries.get_balance(moved).unwrap().current_stock(), 1);
    }

    #[test]
    fn publishes_movements_and_one_event_per_low_stock_crossing() {
        let (ledger, _clock) = setup();
        let events = ledger.bus.subscribe();
        let product = ProductId::new();

        ledger
            .engine
            .configure_product(product, StockTerms::new(5, 20, 0))
            .unwrap();
        stock_in(&ledger, product, 10);
        for _ in 0..3 {
            ledger
                .engine
                .apply(MovementRequest::outbound(product, 2, "Venda"), actor())
                .unwrap();
        }
        stock_in(&ledger, product, 10);

        let published: Vec<LedgerEnvelope> = events.drain();
        let types: Vec<&str> = published.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                // configure: 0 stock with min 5 enters low stock
                "stock.low_stock.reached",
                "stock.movement.recorded",
                "stock.low_stock.cleared",
                "stock.movement.recorded",
                "stock.movement.recorded",
                "stock.movement.recorded",
                "stock.low_stock.reached",
                "stock.movement.recorded",
                "stock.low_stock.cleared",
            ]
        );

        let reached_after_outbound = published
            .iter()
            .filter_map(|e| match e.payload() {
                LedgerEvent::LowStockReached(alert) if e.sequence_number() > 0 => Some(alert),
                _ => None,
            })
            .next()
            .unwrap();
        assert_eq!(reached_after_outbound.current_stock, 4);
        assert_eq!(reached_after_outbound.suggested_reorder, 16);

        let sequences: Vec<u64> = published
            .iter()
            .filter(|e| matches!(e.payload(), LedgerEvent::MovementRecorded(_)))
            .map(|e| e.sequence_number())
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    }

    #[derive(Debug, Default)]
    struct FailingStore {
        inner: InMemoryLedgerStore,
        fail_commits: AtomicBool,
    }

    impl LedgerStore for FailingStore {
        fn load_balance(&self, product_id: ProductId) -> Result<Option<ProductBalance>, LedgerStoreError> {
            self.inner.load_balance(product_id)
        }

        fn commit(
            &self,
            movement: RecordMovement,
            expected: ExpectedVersion,
        ) -> Result<CommittedMovement, LedgerStoreError> {
            if self.fail_commits.load(Ordering::SeqCst) {
                return Err(LedgerStoreError::Backend("disk full".to_string()));
            }
            self.inner.commit(movement, expected)
        }

        fn upsert_terms(
            &self,
            product_id: ProductId,
            terms: StockTerms,
        ) -> Result<ProductBalance, LedgerStoreError> {
            self.inner.upsert_terms(product_id, terms)
        }

        fn remove(&self, product_id: ProductId) -> Result<(), LedgerStoreError> {
            self.inner.remove(product_id)
        }

        fn list_balances(&self) -> Result<Vec<ProductBalance>, LedgerStoreError> {
            self.inner.list_balances()
        }

        fn movements(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, LedgerStoreError> {
            self.inner.movements(filter)
        }

        fn snapshot(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>, LedgerStoreError> {
            self.inner.snapshot(product_id)
        }
    }

    #[test]
    fn storage_failure_is_atomic_and_unpublished() {
        let bus: Arc<InMemoryEventBus<LedgerEnvelope>> = Arc::new(InMemoryEventBus::new());
        let ledger = LedgerServices::new(
            FailingStore::default(),
            bus.clone(),
            manual_clock() as Arc<dyn Clock>,
            LedgerConfig::default(),
        );
        let events = bus.subscribe();
        let product = ProductId::new();

        ledger
            .engine
            .apply(MovementRequest::inbound(product, 4, "Compra"), actor())
            .unwrap();
        events.drain();

        ledger.engine.store().fail_commits.store(true, Ordering::SeqCst);
        let err = ledger
            .engine
            .apply(MovementRequest::outbound(product, 1, "Venda"), actor())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));

        let balance = ledger.queries.get_balance(product).unwrap();
        assert_eq!(balance.current_stock(), 4);
        assert_eq!(balance.version(), 1);
        assert_eq!(
            ledger
                .queries
                .list_movements(&MovementFilter::for_product(product))
                .unwrap()
                .len(),
            1
        );
        assert!(events.drain().is_empty());

        // The gate was released; the product keeps accepting movements.
        ledger.engine.store().fail_commits.store(false, Ordering::SeqCst);
        let record = ledger
            .engine
            .apply(MovementRequest::outbound(product, 1, "Venda"), actor())
            .unwrap();
        assert_eq!(record.resulting_stock, 3);
    }

    /// Store shared with another writer that commits just before each of ours.
    #[derive(Debug, Default)]
    struct SharedWriterStore {
        inner: InMemoryLedgerStore,
        foreign: Mutex<VecDeque<MovementRequest>>,
    }

    impl SharedWriterStore {
        fn queue_foreign(&self, requests: impl IntoIterator<Item = MovementRequest>) {
            self.foreign.lock().unwrap().extend(requests);
        }
    }

    impl LedgerStore for SharedWriterStore {
        fn load_balance(&self, product_id: ProductId) -> Result<Option<ProductBalance>, LedgerStoreError> {
            self.inner.load_balance(product_id)
        }

        fn commit(
            &self,
            movement: RecordMovement,
            expected: ExpectedVersion,
        ) -> Result<CommittedMovement, LedgerStoreError> {
            let foreign = self.foreign.lock().unwrap().pop_front();
            if let Some(request) = foreign {
                let other = request.validate(actor(), movement.accepted_at).unwrap();
                self.inner.commit(other, ExpectedVersion::Any).unwrap();
            }
            self.inner.commit(movement, expected)
        }

        fn upsert_terms(
            &self,
            product_id: ProductId,
            terms: StockTerms,
        ) -> Result<ProductBalance, LedgerStoreError> {
            self.inner.upsert_terms(product_id, terms)
        }

        fn remove(&self, product_id: ProductId) -> Result<(), LedgerStoreError> {
            self.inner.remove(product_id)
        }

        fn list_balances(&self) -> Result<Vec<ProductBalance>, LedgerStoreError> {
            self.inner.list_balances()
        }

        fn movements(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, LedgerStoreError> {
            self.inner.movements(filter)
        }

        fn snapshot(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>, LedgerStoreError> {
            self.inner.snapshot(product_id)
        }
    }

    fn shared_writer_ledger()
    -> (LedgerServices<SharedWriterStore, Arc<InMemoryEventBus<LedgerEnvelope>>>, ProductId) {
        let ledger = LedgerServices::new(
            SharedWriterStore::default(),
            Arc::new(InMemoryEventBus::new()),
            manual_clock() as Arc<dyn Clock>,
            LedgerConfig::default(),
        );
        let product = ProductId::new();
        ledger
            .engine
            .apply(MovementRequest::inbound(product, 5, "Compra"), actor())
            .unwrap();
        (ledger, product)
    }

    #[test]
    fn conflicting_outside_writes_are_redecided_and_retried() {
        let (ledger, product) = shared_writer_ledger();
        let events = ledger.bus.subscribe();
        ledger.engine.store().queue_foreign([
            MovementRequest::inbound(product, 1, "Compra"),
            MovementRequest::inbound(product, 1, "Compra"),
        ]);

        let record = ledger
            .engine
            .apply(MovementRequest::outbound(product, 3, "Venda"), actor())
            .unwrap();
        assert_eq!(record.resulting_stock, 4);

        let balance = ledger.queries.get_balance(product).unwrap();
        assert_eq!(balance.current_stock(), 4);
        assert_eq!(balance.version(), 4);
        assert_eq!(ledger.queries.verify_integrity().unwrap(), vec![]);

        // Only the committed attempt is published.
        let published: Vec<_> = events
            .drain()
            .into_iter()
            .filter(|e| matches!(e.payload(), LedgerEvent::MovementRecorded(_)))
            .map(|e| e.sequence_number())
            .collect();
        assert_eq!(published, vec![4]);
    }

    #[test]
    fn retry_decides_against_the_stock_left_by_the_other_writer() {
        let (ledger, product) = shared_writer_ledger();
        ledger
            .engine
            .store()
            .queue_foreign([MovementRequest::outbound(product, 4, "Venda")]);

        let err = ledger
            .engine
            .apply(MovementRequest::outbound(product, 3, "Venda"), actor())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { available: 1, .. }));
        assert_eq!(ledger.queries.get_balance(product).unwrap().current_stock(), 1);
    }

    #[test]
    fn conflict_surfaces_once_retries_are_exhausted() {
        let (ledger, product) = shared_writer_ledger();
        ledger.engine.store().queue_foreign(
            (0..MAX_COMMIT_ATTEMPTS).map(|_| MovementRequest::inbound(product, 1, "Compra")),
        );

        let err = ledger
            .engine
            .apply(MovementRequest::outbound(product, 2, "Venda"), actor())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));

        let history = ledger
            .queries
            .list_movements(&MovementFilter::for_product(product))
            .unwrap();
        assert_eq!(history.len(), 1 + MAX_COMMIT_ATTEMPTS as usize);
        assert!(history.iter().all(|r| r.movement_type == MovementType::Inbound));
    }

    #[test]
    fn rejected_and_removed_products_leave_no_gates_behind() {
        let (ledger, _clock) = setup();

        for _ in 0..1000 {
            let err = ledger
                .engine
                .apply(MovementRequest::outbound(ProductId::new(), 1, "Venda"), actor())
                .unwrap_err();
            assert_eq!(err.code(), "insufficient_stock");
        }
        assert!(ledger.engine.gates().is_empty());

        let product = ProductId::new();
        ledger
            .engine
            .configure_product(product, StockTerms::new(1, 5, 0))
            .unwrap();
        ledger.engine.remove_product(product).unwrap();
        stock_in(&ledger, ProductId::new(), 3);
        assert!(ledger.engine.gates().is_empty());
        assert_eq!(ledger.queries.get_balance(product), Err(LedgerError::NotFound(product)));
    }

    #[test]
    fn stale_writer_bypassing_the_engine_gets_a_conflict() {
        let (ledger, _clock) = setup();
        let product = ProductId::new();
        stock_in(&ledger, product, 2);

        let command = MovementRequest::inbound(product, 1, "Ajuste")
            .validate(actor(), t0())
            .unwrap();
        let err = ledger
            .engine
            .store()
            .commit(command, ExpectedVersion::Exact(0))
            .unwrap_err();
        assert_eq!(LedgerError::from(err.clone()).code(), "conflict");
        assert!(matches!(err, LedgerStoreError::Concurrency(_)));
    }

    #[test]
    fn report_counts_range_today_value_and_low_stock() {
        // UTC-3: "today" locally is 2024-09-02 03:00 UTC .. 2024-09-03 03:00 UTC.
        let config = LedgerConfig::default().with_utc_offset_minutes(-180).unwrap();
        let (ledger, clock) = setup_with(config);
        let cheap = ProductId::new();
        let pricey = ProductId::new();

        ledger
            .engine
            .configure_product(cheap, StockTerms::new(10, 50, 150))
            .unwrap();
        ledger
            .engine
            .configure_product(pricey, StockTerms::new(0, 0, 10_000))
            .unwrap();

        // 02:30 UTC belongs to the previous local day.
        clock.set(Utc.with_ymd_and_hms(2024, 9, 2, 2, 30, 0).unwrap());
        stock_in(&ledger, cheap, 4);

        clock.set(Utc.with_ymd_and_hms(2024, 9, 2, 12, 0, 0).unwrap());
        stock_in(&ledger, pricey, 3);
        stock_in(&ledger, cheap, 2);

        clock.set(Utc.with_ymd_and_hms(2024, 9, 2, 20, 0, 0).unwrap());
        let report = ledger.queries.report(None).unwrap();

        assert_eq!(report.total_products, 2);
        assert_eq!(report.total_movements, 3);
        assert_eq!(report.movements_today, 2);
        assert_eq!(report.total_stock_value, 6 * 150 + 3 * 10_000);
        assert_eq!(report.low_stock_count, 1);

        let morning = TimeRange::new(
            Utc.with_ymd_and_hms(2024, 9, 2, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 9, 2, 12, 0, 0).unwrap(),
        )
        .unwrap();
        let ranged = ledger.queries.report(Some(morning)).unwrap();
        assert_eq!(ranged.total_movements, 1);
        assert_eq!(ranged.movements_today, 2);
    }

    #[test]
    fn movement_filters_by_type_and_range() {
        let (ledger, clock) = setup();
        let product = ProductId::new();

        stock_in(&ledger, product, 10);
        clock.advance(Duration::hours(1));
        ledger
            .engine
            .apply(
                MovementRequest::outbound(product, 3, "Venda").with_notes("pedido 42"),
                actor(),
            )
            .unwrap();
        clock.advance(Duration::hours(1));
        stock_in(&ledger, product, 1);

        let outbound = ledger
            .queries
            .list_movements(&MovementFilter::for_product(product).of_type(MovementType::Outbound))
            .unwrap();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].notes.as_deref(), Some("pedido 42"));
        assert_eq!(outbound[0].actor, actor());

        let first_hour = ledger
            .queries
            .list_movements(&MovementFilter::all().between(t0(), t0() + Duration::hours(1)))
            .unwrap();
        assert_eq!(first_hour.len(), 1);
        assert_eq!(first_hour[0].movement_type, MovementType::Inbound);
    }
}
