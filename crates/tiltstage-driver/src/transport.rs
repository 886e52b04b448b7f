//! CAN 传输层
//!
//! 拥有原始 socket、绑定的接口与运行标志，提供：
//! - `connect` / `disconnect` 生命周期管理
//! - 同步发送（调用者线程）
//! - 后台接收线程
//!
//! # 并发模型
//!
//! 共享状态 [`CanConfig`] 只在一把 `parking_lot::Mutex` 下读写，临界区尽量短：
//! - 发送在锁内完成，多个调用者的写入不会交错
//! - 接收线程只在读之前持锁检查运行标志，阻塞读在锁外进行，不会阻塞发送
//!
//! # 关闭协议
//!
//! `disconnect` 分两阶段：先清除运行标志，再限时等待接收线程退出，最后在锁内
//! 释放 socket。接收线程的读带超时（默认 50ms），总能在等待时间内观察到退出标志。
//! socket 以 `Arc` 与接收线程共享，FD 在最后一个持有者释放时关闭，
//! 不会在读进行中被关闭。

use crate::error::DriverError;
use crate::event::{Direction, FrameLog, TransportEvent};
use crate::state::{AtomicTransportState, DEFAULT_BITRATE, TransportConfig, TransportState};
use chrono::Local;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tiltstage_can::{
    CAN_MTU, CanError, InterfaceBringup, RawCanSocket, SocketOpener, is_retryable,
};
use tiltstage_protocol::{
    CommandKind, StageFrame, decode_position, encode_init_sequence, encode_position, pulse_to_mm,
    validate_motor_id,
};
use tracing::{debug, error, info, trace, warn};

/// 带超时的 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 由看门狗线程 join，主线程带超时等待结果
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 传输层共享记录
///
/// 不变量：`socket.is_some() == running`，二者总在同一把锁下修改。
#[derive(Debug)]
struct CanConfig<S> {
    interface: String,
    bitrate: u32,
    socket: Option<Arc<S>>,
    running: bool,
}

impl<S> CanConfig<S> {
    fn connected_socket(&self) -> Option<&Arc<S>> {
        if self.running { self.socket.as_ref() } else { None }
    }
}

/// 调用者线程与接收线程共享的部分
struct Shared<S> {
    config: Mutex<CanConfig<S>>,
    state: AtomicTransportState,
    events: Sender<TransportEvent>,
}

impl<S> Shared<S> {
    fn emit(&self, event: TransportEvent) {
        // 只要 transport 存在，接收端就存在，send 不会失败
        let _ = self.events.send(event);
    }

    /// 记录并上报错误，原样返回以便 `?` 传播
    fn report(&self, err: DriverError) -> DriverError {
        warn!("{}", err);
        self.emit(TransportEvent::Error(err.to_string()));
        err
    }
}

/// CAN 传输层
///
/// # 示例
///
/// ```rust,no_run
/// use tiltstage_driver::SocketCanTransport;
///
/// let transport = SocketCanTransport::socketcan();
/// transport.connect("can0", 500_000)?;
/// transport.send_init_sequence(1)?;
/// transport.send_position(1, 1.5)?;
/// for event in transport.events().try_iter() {
///     println!("{}", event);
/// }
/// transport.disconnect();
/// # Ok::<(), tiltstage_driver::DriverError>(())
/// ```
pub struct CanTransport<O: SocketOpener> {
    opener: O,
    bringup: Box<dyn InterfaceBringup>,
    config: TransportConfig,
    shared: Arc<Shared<O::Socket>>,
    events_rx: Receiver<TransportEvent>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<O: SocketOpener> CanTransport<O> {
    /// 创建传输层（初始状态 Disconnected）
    pub fn new(opener: O, bringup: impl InterfaceBringup, config: TransportConfig) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            opener,
            bringup: Box::new(bringup),
            config,
            shared: Arc::new(Shared {
                config: Mutex::new(CanConfig {
                    interface: String::new(),
                    bitrate: DEFAULT_BITRATE,
                    socket: None,
                    running: false,
                }),
                state: AtomicTransportState::default(),
                events: events_tx,
            }),
            events_rx,
            rx_thread: Mutex::new(None),
        }
    }

    /// 事件接收端（可 clone，多个消费者竞争消费）
    pub fn events(&self) -> Receiver<TransportEvent> {
        self.events_rx.clone()
    }

    pub fn state(&self) -> TransportState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == TransportState::Connected
    }

    /// 最近一次成功连接的接口名（从未连接时为空）
    pub fn interface(&self) -> String {
        self.shared.config.lock().interface.clone()
    }

    pub fn bitrate(&self) -> u32 {
        self.shared.config.lock().bitrate
    }

    /// 上报上层检测到的错误（与传输层自身的错误走同一个事件通道）
    pub fn report_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.shared.emit(TransportEvent::Error(message));
    }

    /// 连接
    ///
    /// 关闭已有连接 → 接口启动 → 打开并绑定 socket → 启动接收线程。
    /// 任一步骤失败都会上报错误事件并回到 Disconnected。
    pub fn connect(&self, interface: &str, bitrate: u32) -> Result<(), DriverError> {
        // 旧的接收线程需要拿锁才能退出，必须在持锁之前等待
        self.stop_receive_loop();

        let mut cfg = self.shared.config.lock();
        if cfg.socket.take().is_some() {
            debug!("Closed previous socket on '{}'", cfg.interface);
        }
        cfg.running = false;
        self.shared.state.set(TransportState::Connecting);
        info!("Connecting to '{}' at {} bps", interface, bitrate);

        let opened = self
            .bringup
            .bring_up(interface, bitrate)
            .map_err(CanError::from)
            .and_then(|()| self.opener.open(interface, self.config.read_timeout));

        let socket = match opened {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                self.shared.state.set(TransportState::Disconnected);
                drop(cfg);
                if e.is_socket_failure() {
                    error!("Opening CAN socket on '{}' failed: {}", interface, e);
                } else {
                    error!("Bringing up '{}' failed: {}", interface, e);
                }
                return Err(self.shared.report(DriverError::Can(e)));
            },
        };

        cfg.interface = interface.to_string();
        cfg.bitrate = bitrate;
        cfg.socket = Some(Arc::clone(&socket));
        cfg.running = true;

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("tiltstage-can-rx".to_string())
            .spawn(move || receive_loop(shared, socket));

        match spawned {
            Ok(handle) => *self.rx_thread.lock() = Some(handle),
            Err(e) => {
                cfg.socket = None;
                cfg.running = false;
                self.shared.state.set(TransportState::Disconnected);
                drop(cfg);
                return Err(self.shared.report(DriverError::IoThread(e.to_string())));
            },
        }

        self.shared.state.set(TransportState::Connected);
        drop(cfg);

        info!("Connected to '{}' at {} bps", interface, bitrate);
        self.shared
            .emit(TransportEvent::StatusChanged { connected: true });
        Ok(())
    }

    /// 断开连接
    ///
    /// 可重复调用；已断开时只会再次发出 `StatusChanged { connected: false }`。
    pub fn disconnect(&self) {
        self.stop_receive_loop();

        let mut cfg = self.shared.config.lock();
        if cfg.socket.take().is_some() {
            info!("Disconnected from '{}'", cfg.interface);
        }
        cfg.running = false;
        self.shared.state.set(TransportState::Disconnected);
        drop(cfg);

        self.shared
            .emit(TransportEvent::StatusChanged { connected: false });
    }

    /// 清除运行标志并限时等待接收线程退出
    fn stop_receive_loop(&self) {
        self.shared.config.lock().running = false;

        let handle = self.rx_thread.lock().take();
        if let Some(handle) = handle {
            let timeout = self.config.disconnect_timeout;
            if let Err(_e) = handle.join_timeout(timeout) {
                error!(
                    "RX thread panicked or failed to shut down within {:?}",
                    timeout
                );
            }
        }
    }

    /// 发送任意帧
    ///
    /// 位置帧写入成功后额外发出 `PositionSent`（位置按脉冲换算回毫米）。
    pub fn send_frame(&self, frame: &StageFrame) -> Result<(), DriverError> {
        let cfg = self.shared.config.lock();
        self.write_locked(&cfg, frame)?;
        drop(cfg);

        if CommandKind::classify(frame) == Some(CommandKind::SetPosition)
            && let Some(pulse) = decode_position(frame)
        {
            self.shared.emit(TransportEvent::PositionSent {
                motor_id: frame.id,
                position_mm: pulse_to_mm(pulse),
            });
        }
        Ok(())
    }

    /// 发送位置指令
    ///
    /// 电机 ID 超出 11 位时返回 `DriverError::Protocol`，不写总线。
    pub fn send_position(&self, motor_id: u16, position_mm: f64) -> Result<(), DriverError> {
        self.check_motor_id(motor_id)?;
        let frame = encode_position(motor_id, position_mm);

        let cfg = self.shared.config.lock();
        self.write_locked(&cfg, &frame)?;
        drop(cfg);

        debug!("Motor {} position sent: {:.3} mm", motor_id, position_mm);
        self.shared.emit(TransportEvent::PositionSent {
            motor_id,
            position_mm,
        });
        Ok(())
    }

    /// 发送驱动器初始化序列（模式帧，然后使能帧）
    ///
    /// 两帧作为一个整体上报：任一帧失败只产生一个错误。
    pub fn send_init_sequence(&self, motor_id: u16) -> Result<(), DriverError> {
        self.check_motor_id(motor_id)?;
        let (mode, enable) = encode_init_sequence(motor_id);

        let cfg = self.shared.config.lock();
        if cfg.connected_socket().is_none() {
            drop(cfg);
            return Err(self.shared.report(DriverError::NotConnected));
        }

        let result = self
            .write_unreported(&cfg, &mode)
            .and_then(|()| self.write_unreported(&cfg, &enable));
        drop(cfg);

        if let Err(e) = result {
            return Err(self.shared.report(DriverError::InitSequence {
                motor_id,
                source: Box::new(e),
            }));
        }

        info!("[SYSTEM] driver initialized (motor {})", motor_id);
        self.shared
            .emit(TransportEvent::DriverInitialized { motor_id });
        Ok(())
    }

    fn check_motor_id(&self, motor_id: u16) -> Result<(), DriverError> {
        validate_motor_id(motor_id)
            .map(|_| ())
            .map_err(|e| self.shared.report(e.into()))
    }

    /// 在锁内写一帧，失败时上报
    fn write_locked(&self, cfg: &CanConfig<O::Socket>, frame: &StageFrame) -> Result<(), DriverError> {
        self.write_unreported(cfg, frame)
            .map_err(|e| self.shared.report(e))
    }

    /// 在锁内写一帧：检查连接、记录 TX 日志、写 socket
    fn write_unreported(
        &self,
        cfg: &CanConfig<O::Socket>,
        frame: &StageFrame,
    ) -> Result<(), DriverError> {
        let socket = cfg.connected_socket().ok_or(DriverError::NotConnected)?;

        let log = FrameLog::now(Direction::Tx, *frame);
        trace!("{}", log);
        self.shared.emit(TransportEvent::FrameLogged(log));

        let written = socket.write_unit(&frame.to_wire()).map_err(DriverError::Write)?;
        if written != CAN_MTU {
            return Err(DriverError::ShortTransfer {
                written,
                expected: CAN_MTU,
            });
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
mod socketcan_transport {
    use super::*;
    use tiltstage_can::{IpLinkBringup, SocketCanOpener};

    /// 基于 Linux SocketCAN 的传输层
    pub type SocketCanTransport = CanTransport<SocketCanOpener>;

    impl CanTransport<SocketCanOpener> {
        /// 使用 SocketCAN 与 `ip link` 接口启动、默认配置
        pub fn socketcan() -> Self {
            Self::new(
                SocketCanOpener,
                IpLinkBringup::default(),
                TransportConfig::default(),
            )
        }
    }
}

#[cfg(target_os = "linux")]
pub use socketcan_transport::SocketCanTransport;

impl<O: SocketOpener> Drop for CanTransport<O> {
    fn drop(&mut self) {
        let connected = self.shared.config.lock().running;
        if connected || self.rx_thread.lock().is_some() {
            self.disconnect();
        }
    }
}

/// 接收线程主循环
///
/// 每次读之前在锁内确认运行标志且 socket 仍是本线程启动时的那个；
/// 读在锁外进行。唯一的正常退出路径是运行标志被清除。
fn receive_loop<S: RawCanSocket>(shared: Arc<Shared<S>>, socket: Arc<S>) {
    let is_current = |shared: &Shared<S>| {
        let cfg = shared.config.lock();
        cfg.connected_socket()
            .is_some_and(|current| Arc::ptr_eq(current, &socket))
    };

    debug!("RX thread started");
    let mut buf = [0u8; CAN_MTU];

    loop {
        if !is_current(&shared) {
            trace!("RX thread: running flag cleared, exiting");
            break;
        }

        let n = match socket.read_unit(&mut buf) {
            Ok(n) => n,
            Err(e) if is_retryable(&e) => continue,
            Err(e) => {
                if is_current(&shared) {
                    shared.report(DriverError::Can(CanError::Io(e)));
                }
                break;
            },
        };

        if n != CAN_MTU {
            trace!("RX thread: ignoring short read ({} bytes)", n);
            continue;
        }

        let timestamp = Local::now();
        let frame = match StageFrame::from_wire(&buf) {
            Ok(frame) => {
                frame.with_timestamp(u64::try_from(timestamp.timestamp_micros()).unwrap_or(0))
            },
            Err(e) => {
                trace!("RX thread: ignoring frame: {}", e);
                continue;
            },
        };

        let log = FrameLog::new(Direction::Rx, frame, timestamp);
        trace!("{}", log);
        shared.emit(TransportEvent::FrameLogged(log));
    }

    debug!("RX thread exited");
}
