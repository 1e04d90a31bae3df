use serde::{Deserialize, Serialize};

use crate::models::{ErrorLog, ProductId, ProductStock, QuantityEvent, Shipment};

// ==================== Station Stream ====================

/// 全量快照 - station 连接后收到的第一条消息
///
/// `version` 是快照时刻 hub 已发布的最后一个版本号；之后的增量
/// 版本号从 `version + 1` 开始连续递增。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSnapshot {
    /// 本次会话 ID (重连即新会话)
    pub session_id: String,
    pub version: u64,
    /// 所有产品的当前库存
    pub stocks: Vec<ProductStock>,
    /// 最近的错误日志 (新 → 旧)
    pub error_logs: Vec<ErrorLog>,
    /// 未送达的发货单
    pub pending_shipments: Vec<Shipment>,
}

/// 增量变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub version: u64,
    pub change: DeltaChange,
}

/// 变更内容 - 每个受影响实体一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DeltaChange {
    /// 产品库存变化 (携带引起变化的账本事件)
    StockChanged {
        product_id: ProductId,
        stock: i64,
        event: QuantityEvent,
    },
    /// 发货单已提交
    ShipmentCommitted { shipment: Shipment },
    /// 发货单已送达
    ShipmentDelivered { shipment: Shipment },
    /// 新错误日志
    ErrorLogged { entry: ErrorLog },
}

impl DeltaChange {
    /// 变更所属产品 (发货单变更返回 None)
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            DeltaChange::StockChanged { product_id, .. } => Some(*product_id),
            DeltaChange::ErrorLogged { entry } => Some(entry.product_id),
            DeltaChange::ShipmentCommitted { .. } | DeltaChange::ShipmentDelivered { .. } => None,
        }
    }
}

/// Hub 推送给 station 的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StationMessage {
    Snapshot(StationSnapshot),
    Delta(StateDelta),
}

impl StationMessage {
    pub fn version(&self) -> u64 {
        match self {
            StationMessage::Snapshot(snapshot) => snapshot.version,
            StationMessage::Delta(delta) => delta.version,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, StationMessage::Snapshot(_))
    }
}
