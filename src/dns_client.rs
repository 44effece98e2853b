use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use crate::dns_hdr::{decode_message, encode_query, WireError};
use crate::dns_record::{Query, Response};

// no EDNS0, so responses never exceed the classic UDP limit
const UDP_PAYLOAD_SIZE: usize = 512;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot encode query: {0}")]
    Encode(WireError),
    #[error("malformed response: {0}")]
    Malformed(WireError),
    #[error("response does not match query (id {expected}, got {got})")]
    Mismatch { expected: u16, got: u16 },
}

/// Sends one query to one server and returns the parsed sections.
pub trait Transport {
    fn exchange(&self, query: &Query, server: IpAddr) -> Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn exchange(&self, query: &Query, server: IpAddr) -> Result<Response, TransportError> {
        (**self).exchange(query, server)
    }
}

/// Blocking UDP exchange, one fresh socket per query.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    port: u16,
    timeout: Duration,
}

impl UdpTransport {
    pub fn new(port: u16, timeout: Duration) -> Self {
        UdpTransport { port, timeout }
    }

    fn bind_for(&self, server: IpAddr) -> io::Result<UdpSocket> {
        let local: IpAddr = match server {
            IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };
        let socket = UdpSocket::bind((local, 0))?;
        socket.set_read_timeout(Some(self.timeout))?;
        socket.connect(SocketAddr::new(server, self.port))?;
        Ok(socket)
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        UdpTransport::new(53, Duration::from_secs(5))
    }
}

impl Transport for UdpTransport {
    fn exchange(&self, query: &Query, server: IpAddr) -> Result<Response, TransportError> {
        let id: u16 = rand::random();
        let request = encode_query(id, query).map_err(TransportError::Encode)?;

        let socket = self.bind_for(server)?;
        socket.send(&request)?;

        let mut buf = [0; UDP_PAYLOAD_SIZE];
        let size = socket.recv(&mut buf).map_err(|e| {
            debug!(%server, name = %query.name, error = %e, "No response");
            e
        })?;
        trace!(%server, size, "Received {:?}", &buf[..size]);

        let message = decode_message(&buf[..size]).map_err(TransportError::Malformed)?;
        let header = message.header;
        if header.id != id || header.flags.qr != 1 {
            return Err(TransportError::Mismatch {
                expected: id,
                got: header.id,
            });
        }
        if header.flags.tc == 1 {
            debug!(%server, name = %query.name, "Truncated response, using it as is");
        }
        if header.flags.rcode != 0 {
            debug!(%server, name = %query.name, rcode = header.flags.rcode, "Error response code");
        }

        Ok(message.response)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use anyhow::Result;
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::dns_record::{RecordType, ResourceRecord};

    /// Answers a single query on a loopback socket using `reply`.
    fn serve_once<F>(reply: F) -> Result<(u16, thread::JoinHandle<()>)>
    where
        F: FnOnce(&[u8]) -> Vec<u8> + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0")?;
        let port = socket.local_addr()?.port();
        let handle = thread::spawn(move || {
            let mut buf = [0; 512];
            if let Ok((size, source)) = socket.recv_from(&mut buf) {
                let response = reply(&buf[..size]);
                let _ = socket.send_to(&response, source);
            }
        });
        Ok((port, handle))
    }

    /// Echoes the question back with one A answer.
    fn answer_a(request: &[u8], id_delta: u16) -> Vec<u8> {
        let id = u16::from_be_bytes([request[0], request[1]]).wrapping_add(id_delta);
        let question = &request[12..];

        let mut buf = BytesMut::new();
        buf.put_u16(id);
        buf.put_u16(0x8000);
        buf.put_u16(1);
        buf.put_u16(1);
        buf.put_u16(0);
        buf.put_u16(0);
        buf.extend_from_slice(question);
        buf.put_u16(0xC00C);
        buf.put_u16(1);
        buf.put_u16(1);
        buf.put_u32(300);
        buf.put_u16(4);
        buf.extend_from_slice(&[93, 184, 216, 34]);
        buf.to_vec()
    }

    #[test]
    fn test_udp_exchange() -> Result<()> {
        let (port, handle) = serve_once(|req| answer_a(req, 0))?;
        let transport = UdpTransport::new(port, Duration::from_secs(2));

        let response = transport.exchange(
            &Query::new("example.com", RecordType::A),
            "127.0.0.1".parse()?,
        )?;
        handle.join().map_err(|_| anyhow::anyhow!("server thread panicked"))?;

        assert_eq!(
            response.answer,
            vec![ResourceRecord::A {
                name: "example.com.".to_string(),
                ttl: 300,
                addr: Ipv4Addr::new(93, 184, 216, 34),
            }]
        );
        assert!(response.authority.is_empty());
        assert!(response.additional.is_empty());
        Ok(())
    }

    #[test]
    fn test_udp_rejects_wrong_id() -> Result<()> {
        let (port, handle) = serve_once(|req| answer_a(req, 1))?;
        let transport = UdpTransport::new(port, Duration::from_secs(2));

        let result = transport.exchange(
            &Query::new("example.com", RecordType::A),
            "127.0.0.1".parse()?,
        );
        handle.join().map_err(|_| anyhow::anyhow!("server thread panicked"))?;

        assert!(matches!(result, Err(TransportError::Mismatch { .. })));
        Ok(())
    }

    #[test]
    fn test_udp_malformed_response() -> Result<()> {
        let (port, handle) = serve_once(|_| vec![0xff, 0xff, 0x80])?;
        let transport = UdpTransport::new(port, Duration::from_secs(2));

        let result = transport.exchange(
            &Query::new("example.com", RecordType::A),
            "127.0.0.1".parse()?,
        );
        handle.join().map_err(|_| anyhow::anyhow!("server thread panicked"))?;

        assert!(matches!(result, Err(TransportError::Malformed(_))));
        Ok(())
    }

    #[test]
    fn test_udp_timeout() -> Result<()> {
        // bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0")?;
        let port = silent.local_addr()?.port();
        let transport = UdpTransport::new(port, Duration::from_millis(100));

        let result = transport.exchange(
            &Query::new("example.com", RecordType::A),
            "127.0.0.1".parse()?,
        );
        assert!(matches!(result, Err(TransportError::Io(_))));
        Ok(())
    }

    #[test]
    fn test_encode_error_is_reported() -> Result<()> {
        let transport = UdpTransport::default();
        let name = format!("{}.com", "x".repeat(70));

        let result = transport.exchange(&Query::new(&name, RecordType::A), "127.0.0.1".parse()?);
        assert!(matches!(result, Err(TransportError::Encode(_))));
        Ok(())
    }
}
