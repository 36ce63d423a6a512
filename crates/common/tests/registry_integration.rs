//! Integration tests for cache groups
//!
//! Models a plugin service that owns several caches over game data and
//! maintains them through one [`CacheGroup`].

#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use sirensong_common::cache::{CacheCollection, CacheGroup, CacheOptions, ExpiringCache};
use sirensong_common::error::CacheResult;
use sirensong_common::testing::{init_test_tracing, EvictionLog, MockClock};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    id: u32,
    name: String,
}

/// A service holding a row cache and a sub-row cache.
struct SheetService {
    rows: Arc<CacheCollection<u32, Arc<Row>, MockClock>>,
    sub_rows: Arc<CacheCollection<(u32, u16), Arc<Row>, MockClock>>,
    group: CacheGroup,
}

impl SheetService {
    fn new(clock: &MockClock, released: &EvictionLog<String, u32>) -> CacheResult<Self> {
        let row_hook = released.hook();
        let rows = Arc::new(CacheCollection::with_clock(
            CacheOptions::builder()
                .name("rows")
                .sliding_expiry(Duration::from_secs(30))
                .use_builtin_expire(false)
                .on_expiry(move |id: u32, _row: Arc<Row>| row_hook("rows".to_string(), id))
                .build()?,
            clock.clone(),
        )?);

        let sub_row_hook = released.hook();
        let sub_rows = Arc::new(CacheCollection::with_clock(
            CacheOptions::builder()
                .name("sub_rows")
                .absolute_expiry(Duration::from_secs(60))
                .use_builtin_expire(false)
                .on_expiry(move |(id, _sub): (u32, u16), _row: Arc<Row>| {
                    sub_row_hook("sub_rows".to_string(), id);
                })
                .build()?,
            clock.clone(),
        )?);

        let group = CacheGroup::new()
            .with("rows", Arc::clone(&rows) as Arc<dyn ExpiringCache>)
            .with("sub_rows", Arc::clone(&sub_rows) as Arc<dyn ExpiringCache>);

        Ok(Self { rows, sub_rows, group })
    }

    fn row(&self, id: u32) -> CacheResult<Arc<Row>> {
        self.rows.get_or_add(id, |id| Arc::new(Row { id: *id, name: format!("Row {id}") }))
    }

    fn sub_row(&self, id: u32, sub: u16) -> CacheResult<Arc<Row>> {
        self.sub_rows.get_or_add((id, sub), |(id, sub)| {
            Arc::new(Row { id: *id, name: format!("Row {id}.{sub}") })
        })
    }
}

/// Verifies a group sweeps members with different expiry policies.
///
/// # Test Steps
/// 1. Populate both caches through the service
/// 2. Advance past the sliding window only; sweep the group
/// 3. Verify only row entries were released
/// 4. Advance past the absolute window; sweep again
/// 5. Verify the sub-row entries were released too
#[test]
fn test_group_sweeps_members_with_own_policies() {
    init_test_tracing();
    let clock = MockClock::new();
    let released = EvictionLog::new();
    let service = SheetService::new(&clock, &released).unwrap();

    assert_eq!(service.row(1).unwrap().name, "Row 1");
    assert_eq!(service.row(2).unwrap().id, 2);
    assert_eq!(service.sub_row(1, 0).unwrap().name, "Row 1.0");
    assert_eq!(service.group.total_entries(), 3);

    clock.advance(Duration::from_secs(31));
    assert_eq!(service.group.sweep_all(), 2);
    assert_eq!(released.count_for(&"rows".to_string()), 2);
    assert_eq!(released.count_for(&"sub_rows".to_string()), 0);

    clock.advance(Duration::from_secs(30));
    assert_eq!(service.group.sweep_all(), 1);
    assert_eq!(released.count_for(&"sub_rows".to_string()), 1);
    assert_eq!(service.group.total_entries(), 0);
}

/// Validates clearing and disposing through the group.
///
/// # Test Steps
/// 1. Populate both caches
/// 2. Clear all and verify each entry was released once
/// 3. Repopulate, dispose all, verify the drain and that members reject use
#[test]
fn test_group_clear_and_dispose() {
    init_test_tracing();
    let clock = MockClock::new();
    let released = EvictionLog::new();
    let service = SheetService::new(&clock, &released).unwrap();

    for id in 0..5 {
        service.row(id).unwrap();
        service.sub_row(id, 1).unwrap();
    }
    assert_eq!(service.group.clear_all(), 10);
    assert_eq!(released.len(), 10);

    service.row(42).unwrap();
    assert_eq!(service.group.dispose_all(), 2);
    assert_eq!(released.len(), 11);
    assert!(service.rows.is_disposed());
    assert!(service.sub_rows.is_disposed());
    assert!(service.row(42).is_err());

    assert_eq!(service.group.dispose_all(), 0);
    assert_eq!(service.group.sweep_all(), 0);
}

/// Ensures members can be looked up and removed by name and that dropping
/// the group leaves the caches alive.
#[test]
fn test_group_membership() {
    init_test_tracing();
    let clock = MockClock::new();
    let released = EvictionLog::new();
    let service = SheetService::new(&clock, &released).unwrap();

    assert_eq!(service.group.names(), vec!["rows".to_string(), "sub_rows".to_string()]);
    let member = service.group.get("sub_rows").unwrap();
    assert_eq!(member.cache_name(), "sub_rows");

    let removed = service.group.unregister("rows").unwrap();
    assert_eq!(removed.cache_name(), "rows");
    assert_eq!(service.group.len(), 1);

    service.row(7).unwrap();
    assert_eq!(service.group.total_entries(), 0);
    assert_eq!(removed.entry_count().unwrap(), 1);

    let SheetService { rows, group, .. } = service;
    drop(group);
    assert!(!rows.is_disposed());
    assert_eq!(rows.get(&7).unwrap().map(|row| row.id), Some(7));
}
