//! 库存投影测试：随机账本重放、并发追加、重启后重算

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ops_server::utils::{RetryPolicy, retry_with_backoff};
use ops_server::{OpsConfig, OpsService, OpsStorage};
use rand::Rng;
use shared::models::{Counter, ProductCreate, ProductKind, QuantityEventKind, ShipmentItem};

fn product(ops: &OpsService, name: &str) -> i64 {
    ops.create_product(ProductCreate {
        name: name.to_string(),
        kind: ProductKind::Jeroan,
        animal_type_id: None,
    })
    .unwrap()
    .id
}

#[test]
fn random_ledger_matches_formula() {
    let ops = OpsService::new(OpsStorage::open_in_memory().unwrap(), OpsConfig::default());
    let pid = product(&ops, "Jeroan Sapi");
    let mut rng = rand::thread_rng();
    let mut expected: i64 = 0;

    for _ in 0..200 {
        let roll: u8 = rng.gen_range(0..10);
        if roll < 6 {
            let qty = rng.gen_range(1..20);
            let counter = if rng.gen_bool(0.5) {
                Counter::Slaughter
            } else {
                Counter::Weighing
            };
            ops.append_quantity_event(pid, QuantityEventKind::Add, counter, qty, None)
                .unwrap();
            expected += qty;
        } else if roll < 8 {
            let delta = rng.gen_range(-5..=5);
            if delta == 0 {
                continue;
            }
            ops.append_quantity_event(pid, QuantityEventKind::Correct, Counter::Inventory, delta, None)
                .unwrap();
            expected += delta;
        } else {
            let qty = rng.gen_range(1..5);
            match ops.create_shipment(vec![ShipmentItem::new(pid, qty)], None) {
                Ok(_) => expected -= qty,
                Err(e) => assert_eq!(e.kind(), ops_server::ErrorKind::InsufficientStock),
            }
        }
        assert_eq!(ops.current_stock(pid).unwrap(), expected);
    }

    assert_eq!(ops.recompute_stock(pid).unwrap(), expected);
    let events = ops.product_events(pid).unwrap();
    assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

#[test]
fn concurrent_appends_on_one_product() {
    let config = OpsConfig {
        lock_timeout: Duration::from_secs(5),
        ..OpsConfig::default()
    };
    let ops = Arc::new(OpsService::new(OpsStorage::open_in_memory().unwrap(), config));
    let pid = product(&ops, "Kulit Sapi");

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let ops = ops.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    retry_with_backoff(RetryPolicy::default(), || {
                        ops.append_quantity_event(
                            pid,
                            QuantityEventKind::Add,
                            Counter::Slaughter,
                            i + 1,
                            None,
                        )
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // 20 * (1 + 2 + ... + 6)
    assert_eq!(ops.current_stock(pid).unwrap(), 420);
    assert_eq!(ops.product_events(pid).unwrap().len(), 120);
}

#[test]
fn stock_recomputed_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("ops.redb");

    let (pid, before) = {
        let ops = OpsService::open(&db_path, OpsConfig::default()).unwrap();
        let pid = product(&ops, "Jeroan Unta");
        ops.append_quantity_event(pid, QuantityEventKind::Add, Counter::Slaughter, 12, None)
            .unwrap();
        ops.append_quantity_event(pid, QuantityEventKind::Correct, Counter::Weighing, -2, None)
            .unwrap();
        ops.create_shipment(vec![ShipmentItem::new(pid, 4)], None)
            .unwrap();
        (pid, ops.current_stock(pid).unwrap())
    };
    assert_eq!(before, 6);

    let ops = OpsService::open(&db_path, OpsConfig::default()).unwrap();
    assert_eq!(ops.current_stock(pid).unwrap(), before);
    assert_eq!(ops.pending_shipments().unwrap().len(), 1);

    // 重启后新商品不能复用旧 id
    let fresh = product(&ops, "Jeroan Domba");
    assert_ne!(fresh, pid);
    assert_eq!(ops.current_stock(fresh).unwrap(), 0);
    assert_eq!(ops.current_stock(pid).unwrap(), before);
    assert_eq!(ops.list_products().unwrap().len(), 2);
}

#[test]
fn unknown_product_is_not_found() {
    let ops = OpsService::new(OpsStorage::open_in_memory().unwrap(), OpsConfig::default());
    let err = ops.current_stock(404).unwrap_err();
    assert_eq!(err.kind(), ops_server::ErrorKind::NotFound);
}
