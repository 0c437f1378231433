use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use tracing::debug;

/// Address probed to pick the outbound interface; no packet is sent.
const PROBE_ADDR: &str = "10.255.255.255:1";

/// Best guess at this host's LAN address, falling back to loopback.
pub fn resolve_local_host() -> String {
    probe_local_ip()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .to_string()
}

fn probe_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    if let Err(err) = socket.connect(PROBE_ADDR) {
        debug!(error = %err, "local address probe failed, using loopback");
        return None;
    }
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_unspecified() {
        None
    } else {
        Some(ip)
    }
}
