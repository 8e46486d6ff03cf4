//! Scripted line-protocol server for driving the clients end to end.
#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::ssl::{SslAcceptor, SslMethod, SslStream};
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

/// One step of a server script.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Write lines without waiting for input (greetings).
    Send(&'static str),
    /// Read one command line, then write the reply.
    Reply(&'static str),
    /// Read lines up to a lone `.`, then write the reply.
    Data(&'static str),
    /// Accept a TLS handshake on the connection.
    Tls,
}

/// Self-signed certificate for `127.0.0.1` and its key.
#[derive(Clone)]
pub struct Identity {
    key: PKey<Private>,
    cert: X509,
}

impl Identity {
    pub fn generate() -> Identity {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "127.0.0.1").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        let san = SubjectAlternativeName::new()
            .ip("127.0.0.1")
            .build(&builder.x509v3_context(None, None))
            .unwrap();
        builder.append_extension(san).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        Identity {
            key: key,
            cert: builder.build(),
        }
    }

    /// The certificate in PEM form, for the client's trust store.
    pub fn cert_pem(&self) -> String {
        String::from_utf8(self.cert.to_pem().unwrap()).unwrap()
    }

    fn acceptor(&self) -> SslAcceptor {
        let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
        builder.set_private_key(&self.key).unwrap();
        builder.set_certificate(&self.cert).unwrap();
        builder.build()
    }
}

pub struct MockServer {
    port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl MockServer {
    /// Accepts a single connection and plays `script` against it. Replies
    /// use `\n` between lines; they go out CRLF-terminated.
    pub fn start(script: Vec<Step>) -> MockServer {
        MockServer::spawn(script, None)
    }

    /// Like `start`, but `Step::Tls` presents `identity`.
    pub fn start_with_identity(script: Vec<Step>, identity: &Identity) -> MockServer {
        MockServer::spawn(script, Some(identity.acceptor()))
    }

    fn spawn(script: Vec<Step>, acceptor: Option<SslAcceptor>) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            play(stream, &script, acceptor.as_ref())
        });
        MockServer {
            port: port,
            handle: handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the script to finish and returns every line the client sent.
    pub fn transcript(self) -> Vec<String> {
        self.handle.join().unwrap()
    }
}

enum Conn {
    Plain(TcpStream),
    Tls(SslStream<TcpStream>),
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            Conn::Plain(ref mut stream) => stream.read(buf),
            Conn::Tls(ref mut stream) => stream.read(buf),
        }
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            Conn::Plain(ref mut stream) => stream.write(buf),
            Conn::Tls(ref mut stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            Conn::Plain(ref mut stream) => stream.flush(),
            Conn::Tls(ref mut stream) => stream.flush(),
        }
    }
}

fn play(stream: TcpStream, script: &[Step], acceptor: Option<&SslAcceptor>) -> Vec<String> {
    let mut conn = BufReader::new(Conn::Plain(stream));
    let mut received = Vec::new();

    for step in script {
        match *step {
            Step::Send(text) => respond(&mut conn, text),
            Step::Reply(text) => {
                match read_line(&mut conn) {
                    Some(line) => received.push(line),
                    None => return received,
                }
                respond(&mut conn, text);
            }
            Step::Data(text) => {
                loop {
                    match read_line(&mut conn) {
                        Some(line) => {
                            let done = line == ".";
                            received.push(line);
                            if done {
                                break;
                            }
                        }
                        None => return received,
                    }
                }
                respond(&mut conn, text);
            }
            Step::Tls => {
                let acceptor = acceptor.expect("Step::Tls needs start_with_identity");
                let plain = match conn.into_inner() {
                    Conn::Plain(stream) => stream,
                    Conn::Tls(_) => panic!("connection is already encrypted"),
                };
                match acceptor.accept(plain) {
                    Ok(tls) => conn = BufReader::new(Conn::Tls(tls)),
                    Err(_) => return received,
                }
            }
        }
    }
    received
}

fn read_line(conn: &mut BufReader<Conn>) -> Option<String> {
    let mut line = String::new();
    match conn.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches("\r\n").to_string()),
    }
}

fn respond(conn: &mut BufReader<Conn>, text: &str) {
    let mut payload = String::new();
    for line in text.split('\n') {
        payload.push_str(line);
        payload.push_str("\r\n");
    }
    // The client may already have hung up.
    let writer = conn.get_mut();
    let _ = writer.write_all(payload.as_bytes());
    let _ = writer.flush();
}
