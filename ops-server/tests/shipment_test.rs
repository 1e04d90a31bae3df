//! 发货原子性测试

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use ops_server::utils::{RetryPolicy, retry_with_backoff};
use ops_server::{ErrorKind, OpsConfig, OpsError, OpsService, OpsStorage};
use shared::models::{
    Counter, ProductCreate, ProductKind, QuantityEventKind, ShipmentItem, ShipmentStatus,
};

fn stocked_product(ops: &OpsService, name: &str, qty: i64) -> i64 {
    let pid = ops
        .create_product(ProductCreate {
            name: name.to_string(),
            kind: ProductKind::Kulit,
            animal_type_id: None,
        })
        .unwrap()
        .id;
    if qty > 0 {
        ops.append_quantity_event(pid, QuantityEventKind::Add, Counter::Slaughter, qty, None)
            .unwrap();
    }
    pid
}

#[test]
fn failed_shipment_leaves_no_trace() {
    let ops = OpsService::new(OpsStorage::open_in_memory().unwrap(), OpsConfig::default());
    let a = stocked_product(&ops, "A", 5);
    let b = stocked_product(&ops, "B", 1);
    let version = ops.hub().version();
    let events_before = ops.stats().unwrap().events;

    let err = ops
        .create_shipment(vec![ShipmentItem::new(a, 3), ShipmentItem::new(b, 2)], None)
        .unwrap_err();
    match err {
        OpsError::InsufficientStock {
            product_id,
            requested,
            available,
        } => {
            assert_eq!(product_id, b);
            assert_eq!(requested, 2);
            assert_eq!(available, 1);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(ops.current_stock(a).unwrap(), 5);
    assert_eq!(ops.current_stock(b).unwrap(), 1);
    assert!(ops.list_shipments().unwrap().is_empty());
    assert_eq!(ops.stats().unwrap().events, events_before);
    assert_eq!(ops.hub().version(), version);
}

#[test]
fn invalid_shipments_rejected() {
    let ops = OpsService::new(OpsStorage::open_in_memory().unwrap(), OpsConfig::default());
    let a = stocked_product(&ops, "A", 5);

    let empty = ops.create_shipment(vec![], None).unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::InvalidArgument);
    let zero = ops.create_shipment(vec![ShipmentItem::new(a, 0)], None).unwrap_err();
    assert_eq!(zero.kind(), ErrorKind::InvalidArgument);
    let missing = ops
        .create_shipment(vec![ShipmentItem::new(a, 1), ShipmentItem::new(999, 1)], None)
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    assert_eq!(ops.current_stock(a).unwrap(), 5);
}

#[test]
fn competing_shipments_never_oversell() {
    let config = OpsConfig {
        lock_timeout: Duration::from_secs(5),
        ..OpsConfig::default()
    };
    let ops = Arc::new(OpsService::new(OpsStorage::open_in_memory().unwrap(), config));
    let pid = stocked_product(&ops, "Jeroan", 10);
    let shipped = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ops = ops.clone();
            let shipped = shipped.clone();
            thread::spawn(move || {
                let result = retry_with_backoff(RetryPolicy::default(), || {
                    ops.create_shipment(vec![ShipmentItem::new(pid, 3)], None)
                });
                match result {
                    Ok(_) => {
                        shipped.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => assert_eq!(e.kind(), ErrorKind::InsufficientStock),
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(shipped.load(Ordering::SeqCst), 3);
    assert_eq!(ops.current_stock(pid).unwrap(), 1);
    assert_eq!(ops.recompute_stock(pid).unwrap(), 1);
}

#[test]
fn receive_records_discrepancies_without_touching_stock() {
    let ops = OpsService::new(OpsStorage::open_in_memory().unwrap(), OpsConfig::default());
    let a = stocked_product(&ops, "A", 5);
    let b = stocked_product(&ops, "B", 5);
    let c = stocked_product(&ops, "C", 0);

    let shipment = ops
        .create_shipment(
            vec![ShipmentItem::new(a, 2), ShipmentItem::new(b, 1)],
            Some("pagi".to_string()),
        )
        .unwrap();
    assert_eq!(shipment.status, ShipmentStatus::Pending);

    let receipt = ops
        .receive_shipment(
            shipment.id,
            vec![ShipmentItem::new(a, 1), ShipmentItem::new(c, 4)],
        )
        .unwrap();
    assert_eq!(receipt.shipment.status, ShipmentStatus::Delivered);
    assert_eq!(receipt.discrepancies.len(), 3);
    assert_eq!(ops.error_logs(10).unwrap().len(), 3);

    assert_eq!(ops.current_stock(a).unwrap(), 3);
    assert_eq!(ops.current_stock(b).unwrap(), 4);
    assert_eq!(ops.current_stock(c).unwrap(), 0);

    let again = ops.receive_shipment(shipment.id, vec![]).unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidArgument);
    let unknown = ops.receive_shipment(shipment.id + 100, vec![]).unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::NotFound);
}
