//! TCP reachability probe.
//!
//! A fast pre-check run before authentication so an unreachable host fails
//! with an actionable message instead of a slow SSH timeout. A successful
//! probe says nothing about authentication.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default probe timeout per address.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns true if `host:port` accepts a TCP connection within `timeout`.
///
/// Resolution failures and connection errors both report unreachable.
pub fn is_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(_) => return false,
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
            return true;
        }
    }
    false
}
