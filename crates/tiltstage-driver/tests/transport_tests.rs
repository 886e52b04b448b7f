//! 传输层测试（Mock socket，无需硬件）
//!
//! 覆盖：
//! 1. 未连接时发送不触碰 socket
//! 2. connect 各阶段失败后回到 Disconnected
//! 3. 初始化序列的帧顺序与整体上报
//! 4. 接收线程的帧解码、短读忽略、读错误退出
//! 5. disconnect 幂等且在限时内完成，socket 只关闭一次

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serial_test::serial;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tiltstage_can::{
    BringupError, CAN_MTU, CanError, InterfaceBringup, RawCanSocket, SocketOpener,
};
use tiltstage_driver::{
    CanTransport, Direction, DriverError, TransportConfig, TransportEvent, TransportState,
};
use tiltstage_protocol::{
    ENABLE_FRAME_PAYLOAD, MODE_FRAME_PAYLOAD, StageFrame, encode_position,
};

/// Mock 读结果
enum ReadItem {
    Unit([u8; CAN_MTU]),
    Short(usize),
    Fail(io::ErrorKind),
}

/// Mock 总线：记录写入、提供待读数据
#[derive(Default)]
struct MockBus {
    written: Mutex<Vec<[u8; CAN_MTU]>>,
    incoming: Mutex<VecDeque<ReadItem>>,
    write_limit: Mutex<Option<usize>>,
    in_write: AtomicBool,
    interleaved: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MockBus {
    fn written_frames(&self) -> Vec<StageFrame> {
        self.written
            .lock()
            .iter()
            .map(|unit| StageFrame::from_wire(unit).unwrap())
            .collect()
    }

    fn push_frame(&self, frame: StageFrame) {
        self.incoming.lock().push_back(ReadItem::Unit(frame.to_wire()));
    }
}

struct MockSocket {
    bus: Arc<MockBus>,
    read_timeout: Duration,
}

impl RawCanSocket for MockSocket {
    fn read_unit(&self, buf: &mut [u8; CAN_MTU]) -> io::Result<usize> {
        let item = self.bus.incoming.lock().pop_front();
        match item {
            Some(ReadItem::Unit(unit)) => {
                buf.copy_from_slice(&unit);
                Ok(CAN_MTU)
            },
            Some(ReadItem::Short(n)) => Ok(n),
            Some(ReadItem::Fail(kind)) => Err(io::Error::from(kind)),
            None => {
                thread::sleep(self.read_timeout);
                Err(io::ErrorKind::WouldBlock.into())
            },
        }
    }

    fn write_unit(&self, buf: &[u8; CAN_MTU]) -> io::Result<usize> {
        if self.bus.in_write.swap(true, Ordering::SeqCst) {
            self.bus.interleaved.store(true, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_micros(200));
        self.bus.written.lock().push(*buf);
        self.bus.in_write.store(false, Ordering::SeqCst);

        Ok(self.bus.write_limit.lock().unwrap_or(CAN_MTU))
    }
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.bus.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy)]
enum OpenFailure {
    Create,
    Resolve,
    Bind,
}

struct MockOpener {
    bus: Arc<MockBus>,
    failure: Option<OpenFailure>,
}

impl SocketOpener for MockOpener {
    type Socket = MockSocket;

    fn open(&self, interface: &str, read_timeout: Duration) -> Result<MockSocket, CanError> {
        let os_error = || io::Error::from_raw_os_error(19);
        match self.failure {
            Some(OpenFailure::Create) => Err(CanError::SocketCreate(os_error())),
            Some(OpenFailure::Resolve) => Err(CanError::InterfaceResolve {
                interface: interface.to_string(),
                source: os_error(),
            }),
            Some(OpenFailure::Bind) => Err(CanError::Bind(os_error())),
            None => {
                self.bus.opened.fetch_add(1, Ordering::SeqCst);
                Ok(MockSocket {
                    bus: Arc::clone(&self.bus),
                    read_timeout,
                })
            },
        }
    }
}

#[derive(Clone, Default)]
struct MockBringup {
    fail: bool,
    calls: Arc<Mutex<Vec<(String, u32)>>>,
}

impl InterfaceBringup for MockBringup {
    fn bring_up(&self, interface: &str, bitrate: u32) -> Result<(), BringupError> {
        self.calls.lock().push((interface.to_string(), bitrate));
        if self.fail {
            return Err(BringupError::Failed {
                command: format!("sudo -n ip link set {} down", interface),
                status: "exit status: 1".to_string(),
                stderr: "Cannot find device".to_string(),
            });
        }
        Ok(())
    }
}

fn fast_config() -> TransportConfig {
    TransportConfig {
        read_timeout: Duration::from_millis(10),
        ..TransportConfig::default()
    }
}

fn transport_with(
    failure: Option<OpenFailure>,
    bringup: MockBringup,
) -> (CanTransport<MockOpener>, Arc<MockBus>) {
    let bus = Arc::new(MockBus::default());
    let opener = MockOpener {
        bus: Arc::clone(&bus),
        failure,
    };
    (CanTransport::new(opener, bringup, fast_config()), bus)
}

fn connected() -> (CanTransport<MockOpener>, Arc<MockBus>) {
    let (transport, bus) = transport_with(None, MockBringup::default());
    transport.connect("vcan0", 500_000).unwrap();
    (transport, bus)
}

fn drain(events: &Receiver<TransportEvent>) -> Vec<TransportEvent> {
    events.try_iter().collect()
}

fn errors(events: &[TransportEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            TransportEvent::Error(msg) => Some(msg.clone()),
            _ => None,
        })
        .collect()
}

/// 等待第 `count` 条接收日志
fn wait_for_rx(events: &Receiver<TransportEvent>, count: usize) -> Vec<StageFrame> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut frames = Vec::new();
    while frames.len() < count && Instant::now() < deadline {
        if let Ok(TransportEvent::FrameLogged(log)) =
            events.recv_timeout(Duration::from_millis(50))
            && log.direction == Direction::Rx
        {
            frames.push(log.frame);
        }
    }
    frames
}

#[test]
fn test_send_while_disconnected_never_writes() {
    let (transport, bus) = transport_with(None, MockBringup::default());
    let events = transport.events();

    let result = transport.send_position(1, 1.5);
    assert!(matches!(result, Err(DriverError::NotConnected)));

    let result = transport.send_init_sequence(1);
    assert!(matches!(result, Err(DriverError::NotConnected)));

    assert!(bus.written.lock().is_empty());
    assert_eq!(bus.opened.load(Ordering::SeqCst), 0);
    assert_eq!(
        errors(&drain(&events)),
        vec!["CAN not connected", "CAN not connected"]
    );
}

#[test]
fn test_connect_success_emits_status() {
    let bringup = MockBringup::default();
    let (transport, _bus) = transport_with(None, bringup.clone());
    let events = transport.events();

    assert_eq!(transport.state(), TransportState::Disconnected);
    transport.connect("vcan0", 250_000).unwrap();

    assert!(transport.is_connected());
    assert_eq!(transport.interface(), "vcan0");
    assert_eq!(transport.bitrate(), 250_000);
    assert_eq!(*bringup.calls.lock(), vec![("vcan0".to_string(), 250_000)]);
    assert!(matches!(
        drain(&events).as_slice(),
        [TransportEvent::StatusChanged { connected: true }]
    ));
}

#[test]
fn test_bringup_failure_skips_socket() {
    let bringup = MockBringup {
        fail: true,
        ..MockBringup::default()
    };
    let (transport, bus) = transport_with(None, bringup);
    let events = transport.events();

    let err = transport.connect("can0", 500_000).unwrap_err();
    assert!(err.is_connect_failure());
    assert_eq!(transport.state(), TransportState::Disconnected);
    assert_eq!(bus.opened.load(Ordering::SeqCst), 0);

    let errs = errors(&drain(&events));
    assert_eq!(errs.len(), 1);
    assert!(errs[0].contains("interface bring-up failed"), "{}", errs[0]);
    assert!(errs[0].contains("Cannot find device"), "{}", errs[0]);
}

#[test]
fn test_socket_failures_report_step() {
    for (failure, expected) in [
        (OpenFailure::Create, "socket creation failed"),
        (OpenFailure::Resolve, "interface binding failed (can0)"),
        (OpenFailure::Bind, "bind failed"),
    ] {
        let (transport, _bus) = transport_with(Some(failure), MockBringup::default());
        let events = transport.events();

        assert!(transport.connect("can0", 500_000).is_err());
        assert_eq!(transport.state(), TransportState::Disconnected);

        let errs = errors(&drain(&events));
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains(expected), "{}", errs[0]);

        // 失败后发送仍然被拒绝
        assert!(matches!(
            transport.send_position(1, 0.0),
            Err(DriverError::NotConnected)
        ));
    }
}

#[test]
fn test_send_position_writes_frame_and_events() {
    let (transport, bus) = connected();
    let events = transport.events();
    drain(&events);

    transport.send_position(1, 1.5).unwrap();

    let frames = bus.written_frames();
    assert_eq!(frames, vec![encode_position(1, 1.5)]);
    assert_eq!(
        frames[0].data,
        [0x00, 0x1A, 0x50, 0x00, 0x00, 0x05, 0x0B, 0xB8]
    );

    let got = drain(&events);
    assert!(matches!(
        &got[0],
        TransportEvent::FrameLogged(log) if log.direction == Direction::Tx
    ));
    assert!(matches!(
        got[1],
        TransportEvent::PositionSent { motor_id: 1, position_mm } if position_mm == 1.5
    ));
}

#[test]
fn test_send_frame_reports_decoded_position() {
    let (transport, _bus) = connected();
    let events = transport.events();
    drain(&events);

    transport.send_frame(&encode_position(2, -3.25)).unwrap();
    assert!(drain(&events).iter().any(|e| matches!(
        e,
        TransportEvent::PositionSent { motor_id: 2, position_mm } if *position_mm == -3.25
    )));

    // 非位置帧只记录日志
    transport
        .send_frame(&StageFrame::new_standard(0x10, &[1, 2, 3]))
        .unwrap();
    assert!(
        !drain(&events)
            .iter()
            .any(|e| matches!(e, TransportEvent::PositionSent { .. }))
    );
}

#[test]
fn test_short_write_reported_and_state_kept() {
    let (transport, bus) = connected();
    let events = transport.events();
    drain(&events);

    *bus.write_limit.lock() = Some(8);
    match transport.send_position(1, 2.0) {
        Err(DriverError::ShortTransfer { written, expected }) => {
            assert_eq!(written, 8);
            assert_eq!(expected, CAN_MTU);
        },
        other => panic!("Expected ShortTransfer, got: {:?}", other),
    }
    assert!(transport.is_connected());

    let got = drain(&events);
    assert!(
        !got.iter()
            .any(|e| matches!(e, TransportEvent::PositionSent { .. }))
    );
    assert_eq!(errors(&got).len(), 1);

    // 后续发送不受影响
    *bus.write_limit.lock() = None;
    transport.send_position(1, 2.0).unwrap();
}

#[test]
fn test_init_sequence_writes_two_frames_in_order() {
    let (transport, bus) = connected();
    let events = transport.events();
    drain(&events);

    transport.send_init_sequence(1).unwrap();

    let frames = bus.written_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].id, 1);
    assert_eq!(frames[0].data, MODE_FRAME_PAYLOAD);
    assert_eq!(frames[1].id, 1);
    assert_eq!(frames[1].data, ENABLE_FRAME_PAYLOAD);

    assert!(matches!(
        drain(&events).last(),
        Some(TransportEvent::DriverInitialized { motor_id: 1 })
    ));
}

#[test]
fn test_init_sequence_failure_is_single_report() {
    let (transport, bus) = connected();
    let events = transport.events();
    drain(&events);

    *bus.write_limit.lock() = Some(0);
    let err = transport.send_init_sequence(2).unwrap_err();
    assert!(matches!(
        err,
        DriverError::InitSequence { motor_id: 2, .. }
    ));

    // 第一帧失败后不再写第二帧
    assert_eq!(bus.written.lock().len(), 1);

    let got = drain(&events);
    assert_eq!(errors(&got).len(), 1);
    assert!(
        !got.iter()
            .any(|e| matches!(e, TransportEvent::DriverInitialized { .. }))
    );
}

#[test]
fn test_concurrent_sends_do_not_interleave() {
    let (transport, bus) = connected();
    let transport = Arc::new(transport);

    let handles: Vec<_> = (0..4u16)
        .map(|motor| {
            let transport = Arc::clone(&transport);
            thread::spawn(move || {
                for i in 0..25 {
                    transport.send_position(motor + 1, f64::from(i)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(!bus.interleaved.load(Ordering::SeqCst));
    assert_eq!(bus.written.lock().len(), 100);
}

#[test]
fn test_receive_loop_emits_decoded_frames() {
    let (transport, bus) = connected();
    let events = transport.events();

    bus.push_frame(encode_position(1, 1.5));
    bus.incoming.lock().push_back(ReadItem::Short(7));
    bus.push_frame(StageFrame::new_standard(0x7FF, &[0xAB]));

    let frames = wait_for_rx(&events, 2);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].data, encode_position(1, 1.5).data);
    assert_eq!(frames[1].id, 0x7FF);
    assert_eq!(frames[1].data_slice(), &[0xAB]);
    assert!(frames.iter().all(|f| f.timestamp_us > 0));
}

#[test]
fn test_receive_loop_ignores_invalid_units() {
    let (transport, bus) = connected();
    let events = transport.events();

    // 扩展帧标志：长度正确但不是标准帧
    let mut unit = StageFrame::new_standard(0x1, &[1]).to_wire();
    unit[..4].copy_from_slice(&(0x8000_0001u32).to_ne_bytes());
    bus.incoming.lock().push_back(ReadItem::Unit(unit));
    bus.push_frame(StageFrame::new_standard(0x2, &[2]));

    let frames = wait_for_rx(&events, 1);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].id, 0x2);
}

#[test]
fn test_read_error_stops_loop() {
    let (transport, bus) = connected();
    let events = transport.events();

    bus.incoming
        .lock()
        .push_back(ReadItem::Fail(io::ErrorKind::BrokenPipe));
    bus.push_frame(StageFrame::new_standard(0x3, &[3]));

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut got = Vec::new();
    while errors(&got).is_empty() && Instant::now() < deadline {
        if let Ok(event) = events.recv_timeout(Duration::from_millis(50)) {
            got.push(event);
        }
    }
    assert_eq!(errors(&got).len(), 1);

    // 循环已退出：后续帧不会被读取
    thread::sleep(Duration::from_millis(100));
    assert_eq!(bus.incoming.lock().len(), 1);
    assert!(transport.is_connected());
}

#[test]
#[serial]
fn test_connect_disconnect_within_bound() {
    let (transport, _bus) = transport_with(None, MockBringup::default());
    transport.connect("vcan0", 500_000).unwrap();
    thread::sleep(Duration::from_millis(30));

    let start = Instant::now();
    transport.disconnect();
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(transport.state(), TransportState::Disconnected);
}

#[test]
#[serial]
fn test_disconnect_twice_is_idempotent() {
    let (transport, bus) = connected();
    let events = transport.events();
    drain(&events);

    transport.disconnect();
    transport.disconnect();

    let got = drain(&events);
    assert!(errors(&got).is_empty());
    assert_eq!(
        got.iter()
            .filter(|e| matches!(e, TransportEvent::StatusChanged { connected: false }))
            .count(),
        2
    );
    assert_eq!(bus.closed.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn test_reconnect_closes_previous_socket() {
    let (transport, bus) = connected();
    transport.connect("vcan1", 1_000_000).unwrap();

    assert_eq!(bus.opened.load(Ordering::SeqCst), 2);
    assert_eq!(bus.closed.load(Ordering::SeqCst), 1);
    assert_eq!(transport.interface(), "vcan1");

    transport.disconnect();
    assert_eq!(bus.closed.load(Ordering::SeqCst), 2);
}

#[test]
#[serial]
fn test_drop_disconnects() {
    let (transport, bus) = connected();
    let events = transport.events();
    drop(transport);

    assert_eq!(bus.closed.load(Ordering::SeqCst), 1);
    assert!(
        events
            .try_iter()
            .any(|e| matches!(e, TransportEvent::StatusChanged { connected: false }))
    );
}

#[test]
fn test_out_of_range_motor_id_is_rejected() {
    let (transport, bus) = connected();
    let events = transport.events();
    drain(&events);

    // 0x801 截取 11 位后是 0x001，不能悄悄发给电机 1
    assert!(matches!(
        transport.send_position(0x801, 1.0),
        Err(DriverError::Protocol(_))
    ));
    assert!(matches!(
        transport.send_init_sequence(0x800),
        Err(DriverError::Protocol(_))
    ));
    assert!(bus.written_frames().is_empty());

    let errs = errors(&drain(&events));
    assert_eq!(errs.len(), 2);
    assert!(errs[0].contains("Invalid CAN ID: 0x801"), "{}", errs[0]);

    // 边界 ID 正常发送
    transport.send_position(0x7FF, 1.0).unwrap();
    assert_eq!(bus.written_frames()[0].id, 0x7FF);
}

#[test]
fn test_report_error_emits_event() {
    let (transport, _bus) = connected();
    let events = transport.events();
    drain(&events);

    transport.report_error("calculation or send failed: bad input");
    assert_eq!(
        errors(&drain(&events)),
        vec!["calculation or send failed: bad input".to_string()]
    );
}
