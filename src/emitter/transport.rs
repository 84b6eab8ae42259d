//! Packet construction and transmission.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use super::pacing::{sleep_until, CancelFlag, Clock, Pacer};

/// One test packet: 4-byte big-endian rank followed by the payload marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq: u64,
    pub rank: i32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(seq: u64, rank: i32, marker: &str) -> Self {
        let mut payload = Vec::with_capacity(4 + marker.len());
        payload.extend_from_slice(&rank.to_be_bytes());
        payload.extend_from_slice(marker.as_bytes());
        Self { seq, rank, payload }
    }
}

/// Something that can put packets on the wire
pub trait Transmit {
    fn send(&mut self, packet: &Packet) -> io::Result<()>;

    /// Send a pre-built sequence at `pps` and return how many went out.
    ///
    /// Stops early when `cancel` is set. Individual send failures are
    /// skipped. A rate whose packet gap does not fit a `Duration` is
    /// `InvalidInput`.
    fn send_bulk(
        &mut self,
        packets: &[Packet],
        pps: f64,
        clock: &dyn Clock,
        cancel: &CancelFlag,
    ) -> io::Result<u64> {
        let interval = Duration::try_from_secs_f64(1.0 / pps).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("bulk send rate {} packets/sec: {}", pps, e))
        })?;
        let mut pacer = Pacer::new(clock.now(), interval);
        let mut sent = 0u64;

        for (i, packet) in packets.iter().enumerate() {
            if i > 0 && !sleep_until(clock, pacer.next_deadline(), cancel) {
                break;
            }
            if cancel.is_cancelled() {
                break;
            }
            match self.send(packet) {
                Ok(()) => sent += 1,
                Err(e) => log::debug!("Bulk send of packet {} failed: {}", packet.seq, e),
            }
            pacer.advance();
        }

        Ok(sent)
    }
}

/// UDP datagrams to a single destination
pub struct UdpTransmitter {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpTransmitter {
    /// Resolve `host` and open a socket connected to `host:port`
    pub fn connect(host: &str, port: u16) -> io::Result<Self> {
        let destination = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("No address found for {}", host))
        })?;

        let bind = if destination.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind)?;
        socket.connect(destination)?;

        log::debug!("UDP socket {} -> {}", socket.local_addr()?, destination);
        Ok(Self { socket, destination })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl Transmit for UdpTransmitter {
    fn send(&mut self, packet: &Packet) -> io::Result<()> {
        self.socket.send(&packet.payload).map(|_| ())
    }
}
