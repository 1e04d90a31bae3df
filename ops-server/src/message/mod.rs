//! 消息推送模块
//!
//! - [`BroadcastHub`]: 快照 + 增量广播，每个 station 一个有界队列
//! - [`StationStream`]: 订阅者侧的消息流
//! - [`Transport`] / [`serve_station`]: 外部 socket 层接入点

pub mod hub;
pub mod station;
pub mod transport;

pub use hub::{BroadcastHub, SnapshotSource, SnapshotState};
pub use station::{StationSession, StationStream};
pub use transport::{MemoryTransport, Transport, serve_station};
