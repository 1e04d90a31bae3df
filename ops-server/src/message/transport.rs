//! Transport 传输层抽象
//!
//! Hub 不关心 socket 细节：外部 socket 层实现 [`Transport`]，
//! [`serve_station`] 把一个 station 的消息流泵入该传输。
//!
//! ```text
//! BroadcastHub ──▶ StationStream ──▶ serve_station ──▶ Transport
//!                                                      ├─ socket 层 (外部)
//!                                                      └─ MemoryTransport (同进程)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use shared::error::{AppError, ErrorCode};
use shared::message::BusMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::hub::BroadcastHub;
use crate::ops::{OpsError, OpsResult};

/// Transport 传输层特征
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// 向传输层写入一条消息
    async fn write_message(&self, msg: &BusMessage) -> Result<(), AppError>;

    /// 关闭传输连接
    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }

    /// 获取对端地址
    fn peer_addr(&self) -> Option<String> {
        None
    }
}

/// In-process memory transport for same-process consumers
///
/// 写入的消息进入无界 mpsc 通道，由持有接收端的一方读取。
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<BusMessage>,
}

impl MemoryTransport {
    /// 创建传输及其接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BusMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn write_message(&self, msg: &BusMessage) -> Result<(), AppError> {
        self.tx.send(msg.clone()).map_err(|_| {
            AppError::with_message(ErrorCode::StationDisconnected, "Memory receiver dropped")
        })
    }

    fn peer_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }
}

/// 为一个 station 服务直到断开或关闭
///
/// 订阅 hub，按序写出快照和增量。写失败视为断开：会话立即清理，
/// 重连时由 station 重新订阅并获得新快照。
pub async fn serve_station(
    hub: Arc<BroadcastHub>,
    station_id: String,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
) -> OpsResult<()> {
    let mut stream = hub.subscribe(&station_id)?;
    let session_id = stream.session_id().to_string();
    tracing::info!(
        station_id = %station_id,
        session_id = %session_id,
        peer = ?transport.peer_addr(),
        "Station session started"
    );

    let result = loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!(station_id = %station_id, "Shutdown requested");
                break Ok(());
            }
            msg = stream.recv() => msg,
        };

        let Some(msg) = msg else {
            // 会话被关闭 (重连、取消订阅或 hub 关闭)
            break Ok(());
        };

        let bus_msg = match msg.to_bus_message() {
            Ok(bus_msg) => bus_msg.with_target(&station_id),
            Err(e) => {
                tracing::error!(station_id = %station_id, error = %e, "Failed to encode station message");
                break Err(OpsError::Unavailable(format!("encode failed: {}", e)));
            }
        };

        if let Err(e) = transport.write_message(&bus_msg).await {
            tracing::info!(
                station_id = %station_id,
                error = %e,
                "Station write failed, treating as disconnect"
            );
            break Ok(());
        }
    };

    drop(stream);
    if let Err(e) = transport.close().await {
        tracing::debug!(station_id = %station_id, error = %e, "Transport close failed");
    }
    tracing::info!(station_id = %station_id, session_id = %session_id, "Station session ended");
    result
}
