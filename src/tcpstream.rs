use openssl::ssl::{SslConnector, SslMethod, SslStream};
use openssl::x509::X509;
use std::io::{Error, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::errors::*;

#[derive(Debug)]
pub enum TcpStreamType {
    Plain(TcpStream),
    SSL(SslStream<TcpStream>),
}

impl Write for TcpStreamType {
    fn write(&mut self, buf: &[u8]) -> ::std::result::Result<usize, Error> {
        match *self {
            TcpStreamType::Plain(ref mut stream) => stream.write(buf),
            TcpStreamType::SSL(ref mut stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> ::std::result::Result<(), Error> {
        match *self {
            TcpStreamType::Plain(ref mut stream) => stream.flush(),
            TcpStreamType::SSL(ref mut stream) => stream.flush(),
        }
    }
}

impl Read for TcpStreamType {
    fn read(&mut self, buf: &mut [u8]) -> ::std::result::Result<usize, Error> {
        match *self {
            TcpStreamType::Plain(ref mut stream) => stream.read(buf),
            TcpStreamType::SSL(ref mut stream) => stream.read(buf),
        }
    }
}

impl TcpStreamType {
    pub fn is_tls(&self) -> bool {
        match *self {
            TcpStreamType::Plain(_) => false,
            TcpStreamType::SSL(_) => true,
        }
    }

    /// Closes the socket. Errors are ignored: the peer may already be gone.
    pub fn shutdown(&mut self) {
        match *self {
            TcpStreamType::Plain(ref mut stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            TcpStreamType::SSL(ref mut stream) => {
                let _ = stream.shutdown();
                let _ = stream.get_ref().shutdown(Shutdown::Both);
            }
        }
    }
}

/// Dials `host:port`, trying every resolved address in turn, and wraps the
/// socket in TLS straight away when `use_tls` is set.
pub fn connect(host: &str,
               port: u16,
               use_tls: bool,
               timeout: Duration,
               ca_pem: Option<&str>)
               -> Result<TcpStreamType> {
    let addr = format!("{}:{}", host, port);
    let resolved = (host, port)
        .to_socket_addrs()
        .chain_err(|| ErrorKind::Connection(format!("cannot resolve {}", addr)))?;

    let mut last_err = None;
    let mut tcp_stream = None;
    for sock_addr in resolved {
        trace!("Dialing {}", sock_addr);
        match TcpStream::connect_timeout(&sock_addr, timeout) {
            Ok(stream) => {
                tcp_stream = Some(stream);
                break;
            }
            Err(e) => last_err = Some(e),
        }
    }
    let tcp_stream = match (tcp_stream, last_err) {
        (Some(stream), _) => stream,
        (None, Some(e)) => {
            return Err(e).chain_err(|| ErrorKind::Connection(format!("dial {}", addr)))
        }
        (None, None) => {
            bail!(ErrorKind::Connection(format!("no address found for {}", addr)))
        }
    };

    if use_tls {
        debug!("Creating a SSL Connection to {}", addr);
        Ok(TcpStreamType::SSL(tls_connect(host, tcp_stream, ca_pem)?))
    } else {
        debug!("Creating a Plain TCP Connection to {}", addr);
        Ok(TcpStreamType::Plain(tcp_stream))
    }
}

/// Runs a client TLS handshake over an already connected socket, verifying
/// the peer certificate against `host`. `ca_pem` is trusted in addition to
/// the system roots.
pub fn tls_connect(host: &str,
                   stream: TcpStream,
                   ca_pem: Option<&str>)
                   -> Result<SslStream<TcpStream>> {
    let mut builder = SslConnector::builder(SslMethod::tls())
        .chain_err(|| ErrorKind::Connection(format!("tls setup for {}", host)))?;
    if let Some(pem) = ca_pem {
        let cert = X509::from_pem(pem.as_bytes())
            .chain_err(|| ErrorKind::Connection("unreadable CA certificate".to_string()))?;
        builder
            .cert_store_mut()
            .add_cert(cert)
            .chain_err(|| ErrorKind::Connection("cannot trust CA certificate".to_string()))?;
    }
    let connector = builder.build();
    connector
        .connect(host, stream)
        .map_err(|e| ErrorKind::Connection(format!("tls handshake with {}: {}", host, e)).into())
}
