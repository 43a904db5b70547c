use super::Link;
use crate::base::{ConnectError, Result};
use log::{debug, info};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// TCP connection to a serial-to-network bridge or a simulator.
pub struct TcpLink {
    stream: TcpStream,
    peer: SocketAddr,
}

fn classify(addr: SocketAddr, source: io::Error) -> ConnectError {
    match source.kind() {
        ErrorKind::ConnectionRefused => ConnectError::Refused { addr },
        ErrorKind::NetworkUnreachable | ErrorKind::HostUnreachable => {
            ConnectError::Unreachable { addr }
        }
        _ => ConnectError::Failed { addr, source },
    }
}

impl TcpLink {
    /// Resolves `host` and connects to the first address that accepts.
    ///
    /// When every address fails, the error of the last attempt is returned.
    pub fn connect(host: &str, port: u16) -> std::result::Result<Self, ConnectError> {
        let resolve_error = || ConnectError::Resolve {
            host: host.to_owned(),
        };
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|_| resolve_error())?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            debug!("Connecting to {}", addr);
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream
                        .set_nodelay(true)
                        .map_err(|source| ConnectError::Failed { addr, source })?;
                    info!("Connected to {}:{} ({})", host, port, addr);
                    return Ok(TcpLink { stream, peer: addr });
                }
                Err(source) => last_error = Some(classify(addr, source)),
            }
        }
        Err(last_error.unwrap_or_else(resolve_error))
    }
}

impl Read for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.read(buf) {
            Ok(0) if !buf.is_empty() => Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("{} closed the connection", self.peer),
            )),
            // platforms report an expired socket timeout as WouldBlock
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(ErrorKind::TimedOut.into()),
            other => other,
        }
    }
}

impl Write for TcpLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Link for TcpLink {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        // a zero duration is rejected by the socket API
        let timeout = timeout.filter(|t| !t.is_zero());
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    fn set_baud_rate(&mut self, _baud_rate: u32) -> Result<()> {
        Ok(())
    }

    fn supports_baud_rate(&self) -> bool {
        false
    }

    fn clear_input(&mut self) -> Result<()> {
        self.stream.set_nonblocking(true)?;
        let mut scratch = [0u8; 256];
        let drained = loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        drained?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.peer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connect_reports_refused_port() {
        // bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        match TcpLink::connect("127.0.0.1", port) {
            Err(ConnectError::Refused { addr }) => assert_eq!(addr.port(), port),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("connected to a closed port"),
        }
    }

    #[test]
    fn read_timeout_is_reported_as_timed_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut link = TcpLink::connect("127.0.0.1", port).unwrap();
        let (_peer, _) = listener.accept().unwrap();

        link.set_read_timeout(Some(Duration::from_millis(10))).unwrap();
        let mut buf = [0u8; 4];
        let err = link.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(!link.supports_baud_rate());
    }

    #[test]
    fn peer_close_is_unexpected_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut link = TcpLink::connect("127.0.0.1", port).unwrap();
        drop(listener.accept().unwrap());

        link.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(
            link.read(&mut buf).unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
    }
}
