//! Line framing shared by the POP3 and SMTP sessions.
//!
//! A [`CommandChannel`] owns the socket behind a `BufReader`; writes go
//! straight to the underlying stream, so there is never more than one
//! command in flight.

use std::io::{self, BufRead, BufReader, Write};

use crate::errors::*;
use crate::tcpstream::{self, TcpStreamType};
use crate::utils::{dot_stuff, dot_unstuff};

const LF: u8 = 0x0a;

/// One complete SMTP reply, continuation lines included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status code of the final line, or 0 when it carries none.
    pub code: u16,
    /// Raw reply lines without line terminators.
    pub lines: Vec<String>,
}

impl Reply {
    fn from_lines(lines: Vec<String>) -> Reply {
        let code = lines
            .last()
            .and_then(|line| line.get(..3))
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0);
        Reply { code: code, lines: lines }
    }

    pub fn last_line(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or("")
    }

    /// Transient (4xx) or permanent (5xx) failure.
    pub fn is_error(&self) -> bool {
        match self.last_line().as_bytes().first() {
            Some(b'4') | Some(b'5') => true,
            _ => false,
        }
    }

    pub fn is_positive_completion(&self) -> bool {
        self.code / 100 == 2
    }

    pub fn is_positive_intermediate(&self) -> bool {
        self.code / 100 == 3
    }

    /// Text of each line with the status code and separator removed.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.get(4..).unwrap_or(""))
    }

    pub fn into_result(self) -> Result<Reply> {
        if self.is_error() {
            bail!(ErrorKind::Protocol(self.last_line().to_string()));
        }
        Ok(self)
    }
}

/// Turns a rejected reply into the error kind of the phase it happened in.
pub fn reclassify(e: Error, kind: fn(String) -> ErrorKind) -> Error {
    match e {
        Error(ErrorKind::Protocol(line), _) => kind(line).into(),
        other => other,
    }
}

/// Reads one line and strips its CRLF (or bare LF). Invalid UTF-8 is
/// replaced rather than rejected.
pub fn read_line<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut buff = Vec::new();
    if reader.read_until(LF, &mut buff)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server")
            .into());
    }
    if buff.last() == Some(&LF) {
        buff.pop();
        if buff.last() == Some(&b'\r') {
            buff.pop();
        }
    }
    Ok(String::from_utf8_lossy(&buff).into_owned())
}

/// Reads a block terminated by a lone `.` line, unstuffing as it goes.
pub fn read_dot_block<R: BufRead>(reader: &mut R) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    loop {
        let line = read_line(reader)?;
        if line == "." {
            break;
        }
        trace!("S: {}", line);
        lines.push(dot_unstuff(&line).to_string());
    }
    Ok(lines)
}

/// Aggregates a multi-line reply: a `-` in the fourth column means another
/// line follows.
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = read_line(reader)?;
        let more = line.as_bytes().get(3) == Some(&b'-');
        lines.push(line);
        if !more {
            break;
        }
    }
    Ok(Reply::from_lines(lines))
}

pub struct CommandChannel {
    reader: BufReader<TcpStreamType>,
}

impl CommandChannel {
    pub fn new(stream: TcpStreamType) -> CommandChannel {
        CommandChannel { reader: BufReader::new(stream) }
    }

    pub fn is_tls(&self) -> bool {
        self.reader.get_ref().is_tls()
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        info!("C: {}", line);
        self.send(line)
    }

    /// Like `write_line`, but logs `shown` in place of the real line.
    pub fn write_sensitive(&mut self, line: &str, shown: &str) -> Result<()> {
        info!("C: {}", shown);
        self.send(line)
    }

    fn send(&mut self, line: &str) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(format!("{}\r\n", line).as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    /// Transmits a message body with dot-stuffing, followed by the lone `.`
    /// terminator.
    pub fn write_data<'a, I>(&mut self, lines: I) -> Result<()>
        where I: IntoIterator<Item = &'a str>
    {
        let mut payload = String::new();
        for line in lines {
            trace!("C: {}", line);
            payload.push_str(&dot_stuff(line));
            payload.push_str("\r\n");
        }
        payload.push_str(".\r\n");
        info!("C: <{} bytes of message data>", payload.len());
        let stream = self.reader.get_mut();
        stream.write_all(payload.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    pub fn read_line(&mut self) -> Result<String> {
        let line = read_line(&mut self.reader)?;
        info!("S: {}", line);
        Ok(line)
    }

    pub fn read_dot_block(&mut self) -> Result<Vec<String>> {
        read_dot_block(&mut self.reader)
    }

    pub fn read_reply(&mut self) -> Result<Reply> {
        let reply = read_reply(&mut self.reader)?;
        for line in &reply.lines {
            info!("S: {}", line);
        }
        Ok(reply)
    }

    /// Sends one SMTP command; a 4xx or 5xx reply becomes
    /// `ErrorKind::Protocol` with the server's final line.
    pub fn command(&mut self, line: &str) -> Result<Reply> {
        self.write_line(line)?;
        self.read_reply()?.into_result()
    }

    /// Upgrades a plaintext channel to TLS in place after a STARTTLS reply.
    ///
    /// The client speaks first in a TLS handshake, so any byte still sitting
    /// in the read buffer came from the plaintext stream. Such bytes would be
    /// silently dropped by `into_inner` and could have been injected by a
    /// man in the middle; the upgrade is refused instead.
    pub fn starttls(self, host: &str, ca_pem: Option<&str>) -> Result<CommandChannel> {
        if !self.reader.buffer().is_empty() {
            bail!(ErrorKind::Protocol(format!("{} bytes received ahead of the TLS handshake",
                                              self.reader.buffer().len())));
        }
        match self.reader.into_inner() {
            TcpStreamType::Plain(stream) => {
                debug!("Upgrading connection to {} to TLS", host);
                let tls = tcpstream::tls_connect(host, stream, ca_pem)?;
                Ok(CommandChannel::new(TcpStreamType::SSL(tls)))
            }
            TcpStreamType::SSL(_) => {
                bail!(ErrorKind::State("connection is already encrypted".to_string()))
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.reader.get_mut().shutdown();
    }
}
