//! 连接状态与传输层配置

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// 默认单次读等待上限
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// 默认断开时等待接收线程退出的上限
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// 默认波特率
pub const DEFAULT_BITRATE: u32 = 500_000;

/// 传输层配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// 接收线程单次读等待上限，决定其观察退出标志的最大延迟
    pub read_timeout: Duration,
    /// `disconnect` 等待接收线程退出的上限
    pub disconnect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
        }
    }
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransportState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl TransportState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// 原子版本，`connect` 进行中也可以无锁读取
#[derive(Debug, Default)]
pub(crate) struct AtomicTransportState {
    inner: AtomicU8,
}

impl AtomicTransportState {
    pub(crate) fn get(&self) -> TransportState {
        TransportState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: TransportState) {
        self.inner.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.read_timeout, Duration::from_millis(50));
        assert_eq!(config.disconnect_timeout, Duration::from_millis(500));
        assert!(config.read_timeout < config.disconnect_timeout);
    }

    #[test]
    fn test_state_round_trip() {
        let state = AtomicTransportState::default();
        assert_eq!(state.get(), TransportState::Disconnected);
        for s in [
            TransportState::Connecting,
            TransportState::Connected,
            TransportState::Disconnected,
        ] {
            state.set(s);
            assert_eq!(state.get(), s);
        }
        assert_eq!(TransportState::from_u8(9), TransportState::Disconnected);
    }
}
