//! Shared pieces of the sensor datagram listener: configuration, error
//! taxonomy, socket construction and the receive loop itself.

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::str::{self, Utf8Error};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Default bind address: every IPv4 interface.
pub const DEFAULT_ADDRESS: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Default UDP port the sensors send to.
pub const DEFAULT_PORT: u16 = 5005;

/// Receive buffer capacity. Anything past this is cut off by the platform
/// when the datagram is delivered.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

// An otherwise-idle receive wakes up this often to look at the stop flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything that can go wrong while listening.
#[derive(Error, Debug)]
pub enum ListenError {
    /// The configured address/port pair was unavailable. Fatal at startup.
    #[error("can't bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: io::Error,
    },
    /// The socket failed while waiting for a datagram. Fatal, no retry.
    #[error("can't receive data: {source}")]
    Receive { source: io::Error },
    /// A payload was not valid UTF-8. Logged and skipped, see [`Listener::run`].
    #[error("payload from {from} is not valid UTF-8: {source}")]
    Decode {
        from: SocketAddr,
        source: Utf8Error,
    },
    /// The output sink rejected a line. Fatal: nobody is reading.
    #[error("can't write received data: {source}")]
    Output { source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl AppConfig {
    /// Builds the configuration from parsed command-line matches. Flags that
    /// were not defined or not given fall back to the defaults; invalid
    /// values exit through clap's usage error.
    pub fn parse(matches: &clap::ArgMatches) -> AppConfig {
        let address = match value_t!(matches, "address", Ipv4Addr) {
            Ok(address) => address,
            Err(ref e) if e.kind == clap::ErrorKind::ArgumentNotFound => DEFAULT_ADDRESS,
            Err(e) => e.exit(),
        };
        let port = match value_t!(matches, "port", u16) {
            Ok(port) => port,
            Err(ref e) if e.kind == clap::ErrorKind::ArgumentNotFound => DEFAULT_PORT,
            Err(e) => e.exit(),
        };
        AppConfig { address, port }
    }

    /// The socket address to bind, `address:port`.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }
}

impl Default for AppConfig {
    fn default() -> AppConfig {
        AppConfig {
            address: DEFAULT_ADDRESS,
            port: DEFAULT_PORT,
        }
    }
}

/// Create the single IPv4 datagram socket and bind it.
fn make_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_read_timeout(Some(STOP_POLL_INTERVAL))?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

fn decode_payload(payload: &[u8], from: SocketAddr) -> Result<&str, ListenError> {
    str::from_utf8(payload).map_err(|source| ListenError::Decode { from, source })
}

/// The listener owns the one socket of the process. The socket is closed
/// when the listener is dropped, on every exit path.
#[derive(Debug)]
pub struct Listener {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl Listener {
    /// Binds the receive socket. A taken or invalid address/port is fatal;
    /// there is no recovery path, the caller should exit non-zero.
    pub fn bind(config: &AppConfig) -> Result<Listener, ListenError> {
        let addr = config.socket_addr();
        let socket = make_socket(addr).map_err(|source| ListenError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| ListenError::Bind { addr, source })?;
        debug!("bound {}", local_addr);
        Ok(Listener { socket, local_addr })
    }

    /// The address the socket actually bound, useful when port 0 was asked.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receives datagrams one at a time, in delivery order, and writes one
    /// `Received: <payload>` line per datagram to `out`, preceded by a
    /// single startup line. Payloads that are not valid UTF-8 are logged at
    /// warn level and skipped; timeouts and interrupted receives only wake
    /// the loop to re-check `stop`. Returns `Ok(())` once `stop` is observed
    /// set, `Err` on the first real socket or output failure.
    pub fn run<W: Write>(&mut self, out: &mut W, stop: &AtomicBool) -> Result<(), ListenError> {
        writeln!(out, "Listening for sensor data...")
            .map_err(|source| ListenError::Output { source })?;

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        while !stop.load(Ordering::SeqCst) {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                // No datagram, re-check the flag: poll timeout, or a signal
                // (with a read timeout set, recv is not restarted after one).
                Err(ref e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::Interrupted =>
                {
                    continue
                }
                Err(source) => return Err(ListenError::Receive { source }),
            };
            debug!("{} bytes from {}", len, from);

            match decode_payload(&buf[..len], from) {
                Ok(text) => writeln!(out, "Received: {}", text)
                    .map_err(|source| ListenError::Output { source })?,
                Err(e) => warn!("{}", e),
            }
        }
        debug!("stop flag set, leaving receive loop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{App, Arg};

    fn matches_from(args: Vec<&str>) -> clap::ArgMatches<'static> {
        App::new("test")
            .arg(Arg::with_name("address").long("address").takes_value(true))
            .arg(Arg::with_name("port").long("port").takes_value(true))
            .get_matches_from(args)
    }

    #[test]
    fn config_defaults_when_flags_absent() {
        let config = AppConfig::parse(&matches_from(vec!["test"]));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:5005");
    }

    #[test]
    fn config_reads_address_and_port_flags() {
        let config = AppConfig::parse(&matches_from(vec![
            "test",
            "--address",
            "127.0.0.1",
            "--port",
            "9000",
        ]));
        assert_eq!(config.address, Ipv4Addr::LOCALHOST);
        assert_eq!(config.port, 9000);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn decode_accepts_utf8_payloads() {
        let from = "127.0.0.1:5005".parse().unwrap();
        assert_eq!(decode_payload(b"hello", from).unwrap(), "hello");
        assert_eq!(decode_payload(b"", from).unwrap(), "");
    }

    #[test]
    fn decode_reports_sender_of_invalid_payloads() {
        let from = "10.0.0.9:40000".parse().unwrap();
        let err = decode_payload(&[0xff, 0xfe], from).unwrap_err();
        assert!(matches!(err, ListenError::Decode { .. }));
        assert!(err.to_string().contains("10.0.0.9:40000"));
    }

    #[test]
    fn bind_error_names_the_address() {
        let err = ListenError::Bind {
            addr: "0.0.0.0:5005".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "can't bind to 0.0.0.0:5005: in use");
    }
}
