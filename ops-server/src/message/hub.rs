//! 广播中心
//!
//! # 架构
//!
//! ```text
//!  Ledger / Shipments
//!         │  publish_committed(commit)
//!         ▼
//! ┌─────────────────────────────────────────┐
//! │              BroadcastHub               │
//! │  version ── 单调递增，按提交顺序分配     │
//! │  stations: station_id -> StationQueue   │
//! └──────────────┬──────────────────────────┘
//!        ┌───────┼────────┐
//!        ▼       ▼        ▼
//!    Queue(A) Queue(B) Queue(C)   有界，非阻塞入队
//!        │       │        │
//!   StationStream ...   serve_station → Transport
//! ```
//!
//! # 顺序保证
//!
//! 写操作在 hub 锁内提交事务并发布增量，所以版本号顺序 == 提交顺序。
//! 快照同样在 hub 锁内生成：快照版本号之后的增量从 `version + 1`
//! 开始连续，不会缺失也不会重复。
//!
//! 锁内快照期间所有提交都要等待。`subscribe` / `resync` 先在锁外调用
//! [`SnapshotSource::warm`] 预热库存缓存，锁内只需重算预热后有写入的商品。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use shared::message::{DeltaChange, StateDelta, StationMessage, StationSnapshot};
use shared::models::{ErrorLog, ProductStock, Shipment};
use uuid::Uuid;

use super::station::{PushOutcome, StationQueue, StationSession, StationStream};
use crate::ops::OpsResult;

/// 快照内容 (不含版本号与会话 ID)
#[derive(Debug, Clone, Default)]
pub struct SnapshotState {
    pub stocks: Vec<ProductStock>,
    pub error_logs: Vec<ErrorLog>,
    pub pending_shipments: Vec<Shipment>,
}

/// 快照数据来源
pub trait SnapshotSource: Send + Sync {
    fn snapshot_state(&self) -> OpsResult<SnapshotState>;

    /// 锁外预热，失败不影响随后的快照
    fn warm(&self) {}
}

struct HubInner {
    version: u64,
    stations: HashMap<String, Arc<StationQueue>>,
}

/// 广播中心 - 向所有已连接 station 推送快照与增量
pub struct BroadcastHub {
    inner: Mutex<HubInner>,
    source: Arc<dyn SnapshotSource>,
    queue_capacity: usize,
}

impl BroadcastHub {
    pub fn new(source: Arc<dyn SnapshotSource>, queue_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                version: 0,
                stations: HashMap::new(),
            }),
            source,
            queue_capacity,
        }
    }

    /// 订阅：新会话，第一条消息为当前快照
    ///
    /// 同一 station 重复订阅视为重连，旧会话被关闭。
    pub fn subscribe(self: &Arc<Self>, station_id: &str) -> OpsResult<StationStream> {
        let session_id = Uuid::new_v4().to_string();
        let queue = Arc::new(StationQueue::new(station_id, &session_id, self.queue_capacity));

        self.source.warm();
        let mut inner = self.inner.lock();
        let snapshot = self.snapshot_message(inner.version, &session_id)?;
        queue.reset_with_snapshot(snapshot);
        if let Some(previous) = inner.stations.insert(station_id.to_string(), queue.clone()) {
            previous.close();
            tracing::info!(
                station_id,
                old_session = %previous.session_id,
                "Station reconnected, previous session closed"
            );
        }
        let version = inner.version;
        drop(inner);

        tracing::info!(station_id, session_id = %session_id, version, "Station subscribed");
        Ok(StationStream::new(self.clone(), queue))
    }

    /// 取消订阅；返回该 station 是否在线
    pub fn unsubscribe(&self, station_id: &str) -> bool {
        let removed = self.inner.lock().stations.remove(station_id);
        match removed {
            Some(queue) => {
                queue.close();
                tracing::info!(station_id, session_id = %queue.session_id, "Station unsubscribed");
                true
            }
            None => false,
        }
    }

    /// 仅当会话仍为当前会话时移除 (避免误删重连后的新会话)
    pub(crate) fn remove_session(&self, station_id: &str, session_id: &str) {
        let mut inner = self.inner.lock();
        let is_current = inner
            .stations
            .get(station_id)
            .is_some_and(|q| q.session_id == session_id);
        if is_current && let Some(queue) = inner.stations.remove(station_id) {
            queue.close();
            tracing::debug!(station_id, session_id, "Station session cleaned up");
        }
    }

    /// 溢出后的全量重新同步；会话已失效时返回 false
    pub(crate) fn resync(&self, queue: &Arc<StationQueue>) -> bool {
        self.source.warm();
        let mut inner = self.inner.lock();
        let registered = inner
            .stations
            .get(&queue.station_id)
            .is_some_and(|q| Arc::ptr_eq(q, queue));
        if !registered {
            queue.close();
            return false;
        }

        match self.snapshot_message(inner.version, &queue.session_id) {
            Ok(snapshot) => {
                tracing::info!(
                    station_id = %queue.station_id,
                    version = inner.version,
                    "Station resynced with full snapshot"
                );
                queue.reset_with_snapshot(snapshot);
                true
            }
            Err(e) => {
                tracing::warn!(
                    station_id = %queue.station_id,
                    error = %e,
                    "Snapshot failed during resync, closing session"
                );
                inner.stations.remove(&queue.station_id);
                queue.close();
                false
            }
        }
    }

    /// 在 hub 锁内执行提交并发布增量
    ///
    /// `commit` 负责提交事务并返回本次产生的变更；失败时不发布任何内容。
    /// 每条变更分配一个新版本号，按顺序入队到所有 station。
    pub fn publish_committed<T, E>(
        &self,
        commit: impl FnOnce() -> Result<(T, Vec<DeltaChange>), E>,
    ) -> Result<T, E> {
        let mut inner = self.inner.lock();
        let (value, changes) = commit()?;
        Self::fan_out(&mut inner, changes);
        Ok(value)
    }

    /// 发布与事务无关的变更
    pub fn publish(&self, changes: Vec<DeltaChange>) {
        let mut inner = self.inner.lock();
        Self::fan_out(&mut inner, changes);
    }

    fn fan_out(inner: &mut HubInner, changes: Vec<DeltaChange>) {
        for change in changes {
            inner.version += 1;
            let version = inner.version;
            let msg = StationMessage::Delta(StateDelta { version, change });

            for queue in inner.stations.values() {
                match queue.push(msg.clone()) {
                    PushOutcome::Queued | PushOutcome::Skipped => {}
                    PushOutcome::Overflowed => {
                        tracing::warn!(
                            station_id = %queue.station_id,
                            version,
                            "Station queue overflow, backlog dropped, snapshot replay scheduled"
                        );
                    }
                    PushOutcome::Closed => {
                        tracing::debug!(station_id = %queue.station_id, "Skipping closed station");
                    }
                }
            }
        }
    }

    fn snapshot_message(&self, version: u64, session_id: &str) -> OpsResult<StationMessage> {
        let state = self.source.snapshot_state()?;
        Ok(StationMessage::Snapshot(StationSnapshot {
            session_id: session_id.to_string(),
            version,
            stocks: state.stocks,
            error_logs: state.error_logs,
            pending_shipments: state.pending_shipments,
        }))
    }

    /// 最后发布的版本号
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    pub fn station_count(&self) -> usize {
        self.inner.lock().stations.len()
    }

    pub fn sessions(&self) -> Vec<StationSession> {
        let inner = self.inner.lock();
        let mut sessions: Vec<_> = inner.stations.values().map(|q| q.session()).collect();
        sessions.sort_by(|a, b| a.station_id.cmp(&b.station_id));
        sessions
    }

    /// 关闭所有会话
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        let count = inner.stations.len();
        for (_, queue) in inner.stations.drain() {
            queue.close();
        }
        tracing::info!(stations = count, "Broadcast hub shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpsError;
    use shared::models::ErrorLog;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// 快照中只放一个计数器，便于断言快照内容
    struct CounterSource(AtomicI64);

    impl SnapshotSource for CounterSource {
        fn snapshot_state(&self) -> OpsResult<SnapshotState> {
            Ok(SnapshotState {
                stocks: vec![ProductStock {
                    product_id: 1,
                    name: "p".to_string(),
                    stock: self.0.load(Ordering::SeqCst),
                }],
                ..Default::default()
            })
        }
    }

    fn hub(capacity: usize) -> (Arc<BroadcastHub>, Arc<CounterSource>) {
        let source = Arc::new(CounterSource(AtomicI64::new(0)));
        let hub = Arc::new(BroadcastHub::new(source.clone(), capacity));
        (hub, source)
    }

    fn change(id: u64) -> DeltaChange {
        DeltaChange::ErrorLogged {
            entry: ErrorLog {
                id,
                product_id: 1,
                event: "test".to_string(),
                note: String::new(),
                timestamp: 0,
            },
        }
    }

    fn snapshot_stock(msg: &StationMessage) -> i64 {
        match msg {
            StationMessage::Snapshot(s) => s.stocks[0].stock,
            StationMessage::Delta(_) => panic!("expected snapshot, got delta"),
        }
    }

    #[tokio::test]
    async fn test_snapshot_first_then_contiguous_deltas() {
        let (hub, _) = hub(16);
        hub.publish(vec![change(1)]);

        let mut stream = hub.subscribe("weighing").unwrap();
        hub.publish(vec![change(2), change(3)]);

        let first = stream.recv().await.unwrap();
        assert!(first.is_snapshot());
        assert_eq!(first.version(), 1);
        assert_eq!(stream.recv().await.unwrap().version(), 2);
        assert_eq!(stream.recv().await.unwrap().version(), 3);
        assert!(stream.try_recv().is_none());
        assert_eq!(stream.session().last_version, 3);
    }

    /// 记录预热时 hub 锁是否空闲
    #[derive(Default)]
    struct WarmSource {
        hub: std::sync::OnceLock<std::sync::Weak<BroadcastHub>>,
        warmed_unlocked: std::sync::atomic::AtomicUsize,
    }

    impl SnapshotSource for WarmSource {
        fn snapshot_state(&self) -> OpsResult<SnapshotState> {
            Ok(SnapshotState::default())
        }

        fn warm(&self) {
            let hub = self.hub.get().and_then(|weak| weak.upgrade());
            if hub.is_some_and(|hub| hub.inner.try_lock().is_some()) {
                self.warmed_unlocked.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_warm_runs_outside_hub_lock() {
        let source = Arc::new(WarmSource::default());
        let hub = Arc::new(BroadcastHub::new(source.clone(), 1));
        source.hub.set(Arc::downgrade(&hub)).unwrap();

        let mut stream = hub.subscribe("dashboard").unwrap();
        assert_eq!(source.warmed_unlocked.load(Ordering::SeqCst), 1);
        stream.recv().await.unwrap();

        // 溢出后的重新同步同样在锁外预热
        hub.publish(vec![change(1), change(2)]);
        assert!(stream.recv().await.unwrap().is_snapshot());
        assert_eq!(source.warmed_unlocked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_commit_publishes_nothing() {
        let (hub, _) = hub(16);
        let mut stream = hub.subscribe("inventory").unwrap();
        stream.recv().await.unwrap();

        let result: Result<(), OpsError> = hub.publish_committed(|| {
            Err(OpsError::Unavailable("disk".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(hub.version(), 0);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_overflow_replays_snapshot() {
        let (hub, source) = hub(2);
        let mut stream = hub.subscribe("dashboard").unwrap();
        stream.recv().await.unwrap();

        for id in 1..=5 {
            source.0.store(id as i64, Ordering::SeqCst);
            hub.publish(vec![change(id)]);
        }

        let msg = stream.recv().await.unwrap();
        assert!(msg.is_snapshot());
        assert_eq!(msg.version(), 5);
        assert_eq!(snapshot_stock(&msg), 5);

        hub.publish(vec![change(6)]);
        assert_eq!(stream.recv().await.unwrap().version(), 6);
    }

    #[tokio::test]
    async fn test_reconnect_closes_previous_session() {
        let (hub, _) = hub(16);
        let mut old = hub.subscribe("weighing").unwrap();
        let mut new = hub.subscribe("weighing").unwrap();
        assert_ne!(old.session_id(), new.session_id());
        assert_eq!(hub.station_count(), 1);

        assert!(old.recv().await.is_none());
        assert!(new.recv().await.unwrap().is_snapshot());

        // 旧流被丢弃时不能移除新会话
        drop(old);
        assert_eq!(hub.station_count(), 1);
        assert_eq!(hub.sessions()[0].session_id, new.session_id());
    }

    #[tokio::test]
    async fn test_unsubscribe_and_drop_cleanup() {
        let (hub, _) = hub(16);
        let mut a = hub.subscribe("a").unwrap();
        let b = hub.subscribe("b").unwrap();
        assert_eq!(hub.station_count(), 2);

        assert!(hub.unsubscribe("a"));
        assert!(!hub.unsubscribe("a"));
        assert!(a.recv().await.is_none());
        assert!(a.is_closed());

        drop(b);
        assert_eq!(hub.station_count(), 0);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let (hub, _) = hub(16);
        let mut stream = hub.subscribe("s").unwrap();
        stream.recv().await.unwrap();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                hub.publish(vec![change(1)]);
            })
        };

        let msg = tokio::time::timeout(std::time::Duration::from_secs(2), stream.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.version(), 1);
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_all() {
        let (hub, _) = hub(16);
        let mut stream = hub.subscribe("s").unwrap();
        hub.shutdown();
        assert_eq!(hub.station_count(), 0);
        assert!(stream.recv().await.is_none());
    }
}
