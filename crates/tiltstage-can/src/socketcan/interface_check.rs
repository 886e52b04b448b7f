//! 接口状态查询
//!
//! 只读检查，不需要 CAP_NET_ADMIN。用于 `check` 命令以及启动前的诊断。

use crate::CanError;
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tracing::trace;

use super::MAX_IFACE_NAME_LEN;

/// 查询接口是否存在且处于管理态 UP
///
/// # 返回值
/// - `Ok(true)`: 接口存在且 `IFF_UP` 置位
/// - `Ok(false)`: 接口存在但处于 DOWN 状态
/// - `Err(CanError::Interface)`: 接口不存在或名称非法
/// - `Err(CanError::Io)`: socket / ioctl 失败
pub fn check_interface_status(interface: &str) -> Result<bool, CanError> {
    if interface.len() > MAX_IFACE_NAME_LEN {
        return Err(CanError::Interface(format!(
            "interface name '{}' is too long (max {} characters)",
            interface, MAX_IFACE_NAME_LEN
        )));
    }

    let c_iface = CString::new(interface)
        .map_err(|e| CanError::Interface(format!("invalid interface name: {}", e)))?;

    if unsafe { libc::if_nametoindex(c_iface.as_ptr()) } == 0 {
        return Err(CanError::Interface(format!(
            "CAN interface '{}' does not exist ({}). Create it with:\n  sudo ip link add dev {} type can",
            interface,
            io::Error::last_os_error(),
            interface
        )));
    }

    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(c_iface.as_bytes()) {
        *dst = *src as libc::c_char;
    }

    // SIOCGIFFLAGS 可以在任意地址族的 socket 上执行
    let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
    if raw < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let ret = unsafe {
        libc::ioctl(
            fd.as_raw_fd(),
            libc::SIOCGIFFLAGS,
            &mut ifr as *mut libc::ifreq as *mut libc::c_void,
        )
    };
    if ret < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }

    // ifru_flags (c_short) 位于 union 偏移 0
    let flags = unsafe { *(std::ptr::addr_of!(ifr.ifr_ifru) as *const libc::c_short) };
    let is_up = (i32::from(flags) & libc::IFF_UP) != 0;

    trace!(
        "Interface '{}' is {}",
        interface,
        if is_up { "UP" } else { "DOWN" }
    );
    Ok(is_up)
}
