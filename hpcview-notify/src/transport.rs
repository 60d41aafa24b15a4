//! Direct transport: connect and handshake.

use hpcview_core::error::TransportError;
use hpcview_wire::{encode_packet, Packet, PacketDecoder};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// Resolve `host:port` with IPv6 addresses ahead of IPv4 ones.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, TransportError> {
    let mut addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Connect {
            address: format!("{}:{}", host, port),
            reason: e.to_string(),
        })?
        .collect();
    addrs.sort_by_key(|a| !a.is_ipv6());
    Ok(addrs)
}

/// Connect to the first reachable address, IPv6 first.
pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TransportError> {
    let addrs = resolve(host, port)?;
    let mut last_error = format!("no addresses for {}", host);
    for addr in addrs {
        trace!(%addr, "connecting notification channel");
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true).ok();
                debug!(%addr, "notification channel connected");
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_error = e.to_string();
            }
        }
    }
    Err(TransportError::Connect {
        address: format!("{}:{}", host, port),
        reason: last_error,
    })
}

/// Send the client Hello and read back the server-assigned connection id.
pub fn handshake<S: Read + Write>(
    stream: &mut S,
    decoder: &PacketDecoder,
) -> Result<i32, TransportError> {
    let hello = encode_packet(&Packet::client_hello()).map_err(|e| TransportError::Handshake {
        reason: e.to_string(),
    })?;
    stream.write_all(&hello).map_err(io_error)?;
    stream.flush().map_err(io_error)?;

    match decoder.read_packet(stream) {
        Ok(Packet::Hello(reply)) => Ok(reply.client_id),
        Ok(other) => Err(TransportError::Handshake {
            reason: format!("expected Hello, got {:?}", other.packet_type()),
        }),
        Err(e) => Err(TransportError::Handshake {
            reason: e.to_string(),
        }),
    }
}

pub(crate) fn io_error(e: std::io::Error) -> TransportError {
    TransportError::Io {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpcview_wire::Hello;
    use std::io::Cursor;

    /// In-memory duplex: reads from `input`, records writes.
    struct Duplex {
        input: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_handshake_reads_connection_id() {
        let reply = encode_packet(&Packet::Hello(Hello {
            client_id: 31,
            token: None,
        }))
        .unwrap();
        let mut duplex = Duplex {
            input: Cursor::new(reply),
            written: Vec::new(),
        };
        let id = handshake(&mut duplex, &PacketDecoder::well_known()).unwrap();
        assert_eq!(id, 31);
        assert_eq!(duplex.written, encode_packet(&Packet::client_hello()).unwrap());
    }

    #[test]
    fn test_handshake_rejects_other_packets() {
        let mut duplex = Duplex {
            input: Cursor::new(encode_packet(&Packet::KeepAlive).unwrap()),
            written: Vec::new(),
        };
        let err = handshake(&mut duplex, &PacketDecoder::well_known()).unwrap_err();
        assert!(matches!(err, TransportError::Handshake { .. }));
    }

    #[test]
    fn test_resolve_literal_address() {
        let addrs = resolve("127.0.0.1", 5970).unwrap();
        assert_eq!(addrs.len(), 1);
        assert!(addrs[0].is_ipv4());
    }
}
