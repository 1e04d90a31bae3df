//! 消息总线消息类型定义
//!
//! 这些类型在 ops-server 和 stations 之间共享。Hub 产生的
//! [`StationMessage`] 在交给外部 socket 层之前被封装为 [`BusMessage`]。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use uuid::Uuid;

pub mod payload;
pub use payload::*;

/// 协议版本号
pub const PROTOCOL_VERSION: u16 = 1;

/// 消息事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// 全量快照 (连接/重连/溢出后)
    Snapshot = 0,
    /// 增量变更
    Delta = 1,
}

impl TryFrom<u8> for EventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventType::Snapshot),
            1 => Ok(EventType::Delta),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Snapshot => write!(f, "snapshot"),
            EventType::Delta => write!(f, "delta"),
        }
    }
}

/// 消息总线消息体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub request_id: Uuid,
    pub event_type: EventType,
    /// 目标 station
    pub target: Option<String>,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(event_type: EventType, payload: Vec<u8>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            event_type,
            target: None,
            payload,
        }
    }

    /// 设置目标 station
    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    /// 创建快照消息
    pub fn snapshot(payload: &StationSnapshot) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EventType::Snapshot, serde_json::to_vec(payload)?))
    }

    /// 创建增量消息
    pub fn delta(payload: &StateDelta) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EventType::Delta, serde_json::to_vec(payload)?))
    }

    /// 解析载荷为指定类型
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// 解析为 hub 消息
    pub fn to_station_message(&self) -> Result<StationMessage, serde_json::Error> {
        match self.event_type {
            EventType::Snapshot => self.parse_payload().map(StationMessage::Snapshot),
            EventType::Delta => self.parse_payload().map(StationMessage::Delta),
        }
    }
}

impl StationMessage {
    /// 封装为传输层消息
    pub fn to_bus_message(&self) -> Result<BusMessage, serde_json::Error> {
        match self {
            StationMessage::Snapshot(snapshot) => BusMessage::snapshot(snapshot),
            StationMessage::Delta(delta) => BusMessage::delta(delta),
        }
    }
}
