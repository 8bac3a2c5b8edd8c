use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use async_trait::async_trait;
use macaddr::MacAddr6;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Port used when the configured address has none (discard protocol).
pub const DEFAULT_WOL_PORT: u16 = 9;

pub const MAGIC_PACKET_LEN: usize = 6 + 16 * 6;

#[derive(Debug, Error)]
pub enum WakeError {
    #[error("failed to resolve target address {target:?}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("target address {0:?} has no IPv4 address")]
    NoAddress(String),
    #[error("failed to send magic packet to {addr}: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("short write to {addr}: only {written} bytes sent")]
    ShortWrite { addr: SocketAddr, written: usize },
}

/// Anything that can wake a machine given its target address and MAC.
#[async_trait]
pub trait WakeSender: Send + Sync {
    async fn wake(&self, target: &str, mac: MacAddr6) -> Result<(), WakeError>;
}

/// Six 0xFF bytes followed by the MAC repeated sixteen times.
pub fn magic_packet(mac: MacAddr6) -> [u8; MAGIC_PACKET_LEN] {
    let mut packet = [0xFFu8; MAGIC_PACKET_LEN];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(mac.as_bytes());
    }
    packet
}

/// Sends magic packets as UDP datagrams from one broadcast-enabled socket.
pub struct UdpWakeSender {
    socket: UdpSocket,
}

impl UdpWakeSender {
    pub async fn bind() -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("Failed to bind UDP socket for Wake-on-LAN")?;
        socket
            .set_broadcast(true)
            .context("Failed to enable broadcast on Wake-on-LAN socket")?;

        info!(
            "Wake-on-LAN sender bound to {}",
            socket.local_addr().context("Failed to read local address")?
        );
        Ok(Self { socket })
    }
}

#[async_trait]
impl WakeSender for UdpWakeSender {
    async fn wake(&self, target: &str, mac: MacAddr6) -> Result<(), WakeError> {
        let addr = resolve_target(target).await?;
        let packet = magic_packet(mac);

        let written = self
            .socket
            .send_to(&packet, addr)
            .await
            .map_err(|source| WakeError::Send { addr, source })?;
        if written != packet.len() {
            return Err(WakeError::ShortWrite { addr, written });
        }

        debug!("Sent magic packet for {} to {}", mac, addr);
        Ok(())
    }
}

/// Resolve "host:port", "ip:port" or a bare host/IP (port 9) to an IPv4 socket address.
pub async fn resolve_target(target: &str) -> Result<SocketAddr, WakeError> {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_WOL_PORT));
    }

    let resolve_err = |source| WakeError::Resolve {
        target: target.to_string(),
        source,
    };
    let addrs: Vec<SocketAddr> = if target.contains(':') {
        tokio::net::lookup_host(target)
            .await
            .map_err(resolve_err)?
            .collect()
    } else {
        tokio::net::lookup_host((target, DEFAULT_WOL_PORT))
            .await
            .map_err(resolve_err)?
            .collect()
    };

    addrs
        .into_iter()
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| WakeError::NoAddress(target.to_string()))
}
