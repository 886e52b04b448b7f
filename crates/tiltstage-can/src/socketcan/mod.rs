//! SocketCAN 原始 socket 实现
//!
//! 打开过程拆成三个独立步骤，便于准确报告失败原因：
//!
//! 1. `socket(PF_CAN, SOCK_RAW, CAN_RAW)` → [`CanError::SocketCreate`]
//! 2. `ioctl(SIOCGIFINDEX)` 解析接口索引 → [`CanError::InterfaceResolve`]
//! 3. `bind(sockaddr_can)` → [`CanError::Bind`]
//!
//! 任一步骤失败时，已创建的 FD 由 `OwnedFd` 自动关闭。
//!
//! ## 读超时
//!
//! `read_unit` 先 `poll` 等待可读（带超时），超时返回 `WouldBlock`。
//! 接收线程因此能在有限时间内观察到退出标志，不会无限阻塞在 `read` 上。
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - **权限要求**：打开 socket 不需要特权，配置接口（波特率）需要

use crate::{CAN_MTU, CanError, RawCanSocket, SocketOpener};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;
use tracing::{debug, trace};

mod interface_check;

pub use interface_check::check_interface_status;

/// 接口名最大长度（IFNAMSIZ - 1）
const MAX_IFACE_NAME_LEN: usize = libc::IFNAMSIZ - 1;

/// 绑定到单个接口的 CAN_RAW socket
#[derive(Debug)]
pub struct SocketCanSocket {
    fd: OwnedFd,
    interface: String,
    ifindex: libc::c_int,
    read_timeout: Duration,
}

impl SocketCanSocket {
    /// 打开并绑定 socket
    ///
    /// # 错误
    /// - `CanError::SocketCreate`: 内核不支持 PF_CAN 或资源不足
    /// - `CanError::InterfaceResolve`: 接口不存在或名称非法
    /// - `CanError::Bind`: 绑定失败
    pub fn open(interface: &str, read_timeout: Duration) -> Result<Self, CanError> {
        // 1. 创建 socket
        let raw = unsafe {
            libc::socket(
                libc::PF_CAN,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                libc::CAN_RAW,
            )
        };
        if raw < 0 {
            return Err(CanError::SocketCreate(io::Error::last_os_error()));
        }
        // 从这里开始 FD 由 OwnedFd 管理，任何提前返回都会关闭它
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // 2. 解析接口索引
        let ifindex =
            resolve_ifindex(&fd, interface).map_err(|source| CanError::InterfaceResolve {
                interface: interface.to_string(),
                source,
            })?;

        // 3. 绑定
        let mut addr: libc::sockaddr_can = unsafe { mem::zeroed() };
        addr.can_family = libc::AF_CAN as libc::sa_family_t;
        addr.can_ifindex = ifindex;

        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_can as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_can>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(CanError::Bind(io::Error::last_os_error()));
        }

        debug!(
            "SocketCAN socket bound to '{}' (ifindex {})",
            interface, ifindex
        );

        Ok(Self {
            fd,
            interface: interface.to_string(),
            ifindex,
            read_timeout,
        })
    }

    /// 获取接口名称
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 获取接口内核索引
    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }

    /// 获取读超时时间
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl RawCanSocket for SocketCanSocket {
    fn read_unit(&self, buf: &mut [u8; CAN_MTU]) -> io::Result<usize> {
        let pollfd = PollFd::new(self.fd.as_fd(), PollFlags::POLLIN);

        // 将 Duration 转换为毫秒数（u16，最大 65535ms）
        let timeout_ms = self.read_timeout.as_millis().min(65535) as u16;
        match poll(&mut [pollfd], PollTimeout::from(timeout_ms)) {
            Ok(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Ok(_) => {},
            Err(e) => return Err(io::Error::from(e)),
        }

        let n = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    fn write_unit(&self, buf: &[u8; CAN_MTU]) -> io::Result<usize> {
        let n = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }
}

impl Drop for SocketCanSocket {
    fn drop(&mut self) {
        trace!("[Auto-Drop] SocketCAN socket on '{}' closed", self.interface);
    }
}

/// 默认的 socket 工厂
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketCanOpener;

impl SocketOpener for SocketCanOpener {
    type Socket = SocketCanSocket;

    fn open(&self, interface: &str, read_timeout: Duration) -> Result<Self::Socket, CanError> {
        SocketCanSocket::open(interface, read_timeout)
    }
}

/// 通过 `SIOCGIFINDEX` 获取接口索引
fn resolve_ifindex(fd: &OwnedFd, interface: &str) -> io::Result<libc::c_int> {
    if interface.is_empty() || interface.len() > MAX_IFACE_NAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "interface name '{}' must be 1..={} characters",
                interface, MAX_IFACE_NAME_LEN
            ),
        ));
    }
    if interface.as_bytes().contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interface name contains NUL",
        ));
    }

    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(interface.as_bytes()) {
        *dst = *src as libc::c_char;
    }

    let ret = unsafe {
        libc::ioctl(
            fd.as_raw_fd(),
            libc::SIOCGIFINDEX,
            &mut ifr as *mut libc::ifreq as *mut libc::c_void,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    // ifr_ifru 是 union，ifru_ifindex (c_int) 位于偏移 0
    let ifindex = unsafe { *(std::ptr::addr_of!(ifr.ifr_ifru) as *const libc::c_int) };
    Ok(ifindex)
}
