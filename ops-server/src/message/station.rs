//! Station 会话与出站队列
//!
//! 每个连接的 station 拥有一个有界队列。生产者只做非阻塞入队；
//! 队列满时清空积压并标记 `needs_resync`，消费者下次读取时由 hub
//! 重新生成全量快照，而不是带着缺口继续推送增量。

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared::message::StationMessage;
use tokio::sync::Notify;

use super::hub::BroadcastHub;

/// 已连接 station 的会话信息 (仅存在于内存中)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSession {
    pub station_id: String,
    pub session_id: String,
    pub connected_at: i64,
    /// 最后一条已交付消息的版本号
    pub last_version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    /// 本次入队触发溢出，积压已丢弃
    Overflowed,
    /// 已在等待重新同步，增量会被快照覆盖
    Skipped,
    Closed,
}

enum Next {
    Message(StationMessage),
    Resync,
    Closed,
    Empty,
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<StationMessage>,
    needs_resync: bool,
    closed: bool,
    last_version: u64,
    overflows: u64,
}

pub(crate) struct StationQueue {
    pub(crate) station_id: String,
    pub(crate) session_id: String,
    connected_at: i64,
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl StationQueue {
    pub(crate) fn new(station_id: &str, session_id: &str, capacity: usize) -> Self {
        Self {
            station_id: station_id.to_string(),
            session_id: session_id.to_string(),
            connected_at: shared::util::now_millis(),
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub(crate) fn push(&self, msg: StationMessage) -> PushOutcome {
        let mut state = self.state.lock();
        if state.closed {
            return PushOutcome::Closed;
        }
        if state.needs_resync {
            return PushOutcome::Skipped;
        }
        if state.messages.len() >= self.capacity {
            state.messages.clear();
            state.needs_resync = true;
            state.overflows += 1;
            drop(state);
            self.notify.notify_one();
            return PushOutcome::Overflowed;
        }
        state.messages.push_back(msg);
        drop(state);
        self.notify.notify_one();
        PushOutcome::Queued
    }

    /// 丢弃积压，以快照重新开始
    pub(crate) fn reset_with_snapshot(&self, snapshot: StationMessage) {
        let mut state = self.state.lock();
        state.messages.clear();
        state.messages.push_back(snapshot);
        state.needs_resync = false;
        drop(state);
        self.notify.notify_one();
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.messages.clear();
        drop(state);
        self.notify.notify_one();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub(crate) fn overflow_count(&self) -> u64 {
        self.state.lock().overflows
    }

    pub(crate) fn session(&self) -> StationSession {
        StationSession {
            station_id: self.station_id.clone(),
            session_id: self.session_id.clone(),
            connected_at: self.connected_at,
            last_version: self.state.lock().last_version,
        }
    }

    fn pop(&self) -> Next {
        let mut state = self.state.lock();
        if state.closed {
            return Next::Closed;
        }
        if state.needs_resync {
            return Next::Resync;
        }
        match state.messages.pop_front() {
            Some(msg) => {
                state.last_version = msg.version();
                Next::Message(msg)
            }
            None => Next::Empty,
        }
    }
}

/// 订阅者持有的消息流
///
/// 第一条消息总是快照。丢弃该流即断开会话。
pub struct StationStream {
    hub: Arc<BroadcastHub>,
    queue: Arc<StationQueue>,
}

impl StationStream {
    pub(crate) fn new(hub: Arc<BroadcastHub>, queue: Arc<StationQueue>) -> Self {
        Self { hub, queue }
    }

    /// 等待下一条消息；会话关闭后返回 `None`
    pub async fn recv(&mut self) -> Option<StationMessage> {
        loop {
            match self.queue.pop() {
                Next::Message(msg) => return Some(msg),
                Next::Closed => return None,
                Next::Resync => {
                    if !self.hub.resync(&self.queue) {
                        return None;
                    }
                }
                // 入队时 notify_one 会留下许可，不会丢失唤醒
                Next::Empty => self.queue.notify.notified().await,
            }
        }
    }

    /// 非阻塞读取
    pub fn try_recv(&mut self) -> Option<StationMessage> {
        loop {
            match self.queue.pop() {
                Next::Message(msg) => return Some(msg),
                Next::Closed | Next::Empty => return None,
                Next::Resync => {
                    if !self.hub.resync(&self.queue) {
                        return None;
                    }
                }
            }
        }
    }

    pub fn station_id(&self) -> &str {
        &self.queue.station_id
    }

    pub fn session_id(&self) -> &str {
        &self.queue.session_id
    }

    pub fn session(&self) -> StationSession {
        self.queue.session()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl Drop for StationStream {
    fn drop(&mut self) {
        self.hub
            .remove_session(&self.queue.station_id, &self.queue.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::message::{DeltaChange, StateDelta};
    use shared::models::ErrorLog;

    fn delta(version: u64) -> StationMessage {
        StationMessage::Delta(StateDelta {
            version,
            change: DeltaChange::ErrorLogged {
                entry: ErrorLog {
                    id: version,
                    product_id: 1,
                    event: "test".to_string(),
                    note: String::new(),
                    timestamp: 0,
                },
            },
        })
    }

    #[test]
    fn test_overflow_drops_backlog_and_marks_resync() {
        let queue = StationQueue::new("s1", "sess", 2);
        assert_eq!(queue.push(delta(1)), PushOutcome::Queued);
        assert_eq!(queue.push(delta(2)), PushOutcome::Queued);
        assert_eq!(queue.push(delta(3)), PushOutcome::Overflowed);
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.push(delta(4)), PushOutcome::Skipped);
        assert_eq!(queue.overflow_count(), 1);
        assert!(matches!(queue.pop(), Next::Resync));
    }

    #[test]
    fn test_pop_tracks_last_version() {
        let queue = StationQueue::new("s1", "sess", 8);
        queue.push(delta(5));
        queue.push(delta(6));
        assert!(matches!(queue.pop(), Next::Message(_)));
        assert_eq!(queue.session().last_version, 5);
        assert!(matches!(queue.pop(), Next::Message(_)));
        assert!(matches!(queue.pop(), Next::Empty));
        assert_eq!(queue.session().last_version, 6);
    }

    #[test]
    fn test_closed_queue_rejects_pushes() {
        let queue = StationQueue::new("s1", "sess", 8);
        queue.push(delta(1));
        queue.close();
        assert_eq!(queue.push(delta(2)), PushOutcome::Closed);
        assert!(matches!(queue.pop(), Next::Closed));
    }
}
