use crate::channel::{reclassify, CommandChannel};
use crate::config::POP3Config;
use crate::errors::*;
use crate::pop3result::{EmailMetadata, Message, POP3Stat};
use crate::tcpstream;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum POP3State {
    AUTHORIZATION,
    TRANSACTION,
    END,
}

/// Splits a POP3 status line. `+OK` yields the remaining text, anything else
/// is an error carrying the raw line.
fn check_status(line: &str) -> Result<&str> {
    if line == "+OK" {
        Ok("")
    } else if line.starts_with("+OK ") {
        Ok(&line[4..])
    } else {
        bail!(ErrorKind::Protocol(line.to_string()))
    }
}

/// A POP3 session over one connection.
///
/// The connection is released when the value is closed or dropped; dropping
/// an open session sends `QUIT` just like [`POP3Connection::close`].
pub struct POP3Connection {
    account: POP3Config,
    channel: Option<CommandChannel>,
    state: POP3State,
}

impl POP3Connection {
    /// Dials the server and consumes its greeting.
    pub fn connect(account: POP3Config) -> Result<POP3Connection> {
        trace!("Initiate POP3 Connection");
        let stream = tcpstream::connect(&account.host,
                                        account.port,
                                        account.use_tls,
                                        account.connect_timeout,
                                        account.ca_certificate.as_deref())?;
        let mut channel = CommandChannel::new(stream);
        trace!("Connection Established");

        let greeting = channel.read_line()?;
        if let Err(e) = check_status(&greeting) {
            channel.shutdown();
            return Err(e);
        }

        let ctx = POP3Connection {
            account: account,
            channel: Some(channel),
            state: POP3State::AUTHORIZATION,
        };
        debug!("POP3State::{:?}", ctx.state);
        Ok(ctx)
    }

    pub fn state(&self) -> POP3State {
        self.state
    }

    /// Authenticates with the credentials from the configuration.
    pub fn login(&mut self) -> Result<()> {
        let username = self.account.username.clone();
        let password = self.account.password.clone();
        self.auth(&username, &password)
    }

    /// USER/PASS authentication. The first rejected step fails with
    /// `ErrorKind::Auth` carrying the server's reply.
    pub fn auth(&mut self, username: &str, password: &str) -> Result<()> {
        self.require(POP3State::AUTHORIZATION)?;
        trace!("Attempting to Login");

        self.send_command(&format!("USER {}", username), None)
            .map_err(|e| reclassify(e, ErrorKind::Auth))?;
        self.send_command(&format!("PASS {}", password), Some("PASS ****"))
            .map_err(|e| reclassify(e, ErrorKind::Auth))?;

        self.state = POP3State::TRANSACTION;
        debug!("POP3State::{:?}", self.state);
        Ok(())
    }

    pub fn stat(&mut self) -> Result<POP3Stat> {
        self.require(POP3State::TRANSACTION)?;
        trace!("Cmd: STAT");
        let text = self.send_command("STAT", None)?;
        POP3Stat::parse(&text)
            .ok_or_else(|| ErrorKind::Protocol(format!("+OK {}", text)).into())
    }

    /// Scan listing of every message in the mailbox. Lines that are not of
    /// the form `<id> <size>` are skipped.
    pub fn list(&mut self) -> Result<Vec<EmailMetadata>> {
        self.require(POP3State::TRANSACTION)?;
        trace!("Cmd: LIST");
        self.send_command("LIST", None)?;
        let lines = self.channel()?.read_dot_block()?;
        Ok(EmailMetadata::parse_listing(&lines))
    }

    /// Scan listing of a single message.
    pub fn list_message(&mut self, id: u32) -> Result<EmailMetadata> {
        self.require(POP3State::TRANSACTION)?;
        trace!("Cmd: LIST {}", id);
        let text = self.send_command(&format!("LIST {}", id), None)?;
        EmailMetadata::parse(&text)
            .ok_or_else(|| ErrorKind::Protocol(format!("+OK {}", text)).into())
    }

    /// Fetches the header block plus `preview_lines` lines of body and
    /// extracts From, Subject and Date.
    pub fn top(&mut self, id: u32, preview_lines: u32) -> Result<Message> {
        self.require(POP3State::TRANSACTION)?;
        trace!("Cmd: TOP");
        self.send_command(&format!("TOP {} {}", id, preview_lines), None)?;
        let lines = self.channel()?.read_dot_block()?;
        Ok(Message::from_top(id, &lines, preview_lines))
    }

    /// Downloads a complete message as raw CRLF-joined text.
    pub fn retrieve(&mut self, id: u32) -> Result<String> {
        self.require(POP3State::TRANSACTION)?;
        trace!("Cmd: RETR");
        self.send_command(&format!("RETR {}", id), None)?;
        let lines = self.channel()?.read_dot_block()?;
        Ok(lines.join("\r\n"))
    }

    /// Header previews of the `limit` newest messages, newest first.
    ///
    /// Messages whose TOP fails are left out rather than failing the whole
    /// call. Sizes come from the scan listing.
    pub fn recent(&mut self, limit: usize) -> Result<Vec<Message>> {
        let listing = self.list()?;
        let start = listing.len().saturating_sub(limit);
        let mut messages = Vec::with_capacity(listing.len() - start);
        for meta in listing[start..].iter().rev() {
            match self.top(meta.id, 0) {
                Ok(mut msg) => {
                    msg.size = meta.size;
                    messages.push(msg);
                }
                Err(Error(ErrorKind::Protocol(line), _)) => {
                    warn!("Skipping message {}: {}", meta.id, line);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(messages)
    }

    pub fn delete(&mut self, id: u32) -> Result<()> {
        self.require(POP3State::TRANSACTION)?;
        trace!("Cmd: DELE");
        self.send_command(&format!("DELE {}", id), None)?;
        Ok(())
    }

    pub fn noop(&mut self) -> Result<()> {
        self.require(POP3State::TRANSACTION)?;
        trace!("Cmd: NOOP");
        self.send_command("NOOP", None)?;
        Ok(())
    }

    /// Unmarks every message deleted in this session.
    pub fn reset(&mut self) -> Result<()> {
        self.require(POP3State::TRANSACTION)?;
        trace!("Cmd: RSET");
        self.send_command("RSET", None)?;
        Ok(())
    }

    /// Sends QUIT and closes the connection. A failing QUIT is only logged.
    pub fn close(mut self) {
        self.quit();
    }

    fn quit(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            trace!("Cmd: QUIT");
            let outcome = channel
                .write_line("QUIT")
                .and_then(|_| channel.read_line())
                .and_then(|line| check_status(&line).map(|_| ()));
            if let Err(e) = outcome {
                warn!("POP3 QUIT failed: {}", e);
            }
            channel.shutdown();
            self.state = POP3State::END;
            debug!("POP3State::{:?}", self.state);
        }
    }

    fn require(&self, expected: POP3State) -> Result<()> {
        if self.state != expected {
            bail!(ErrorKind::State(format!("expected {:?}, session is in {:?}",
                                           expected,
                                           self.state)));
        }
        Ok(())
    }

    fn channel(&mut self) -> Result<&mut CommandChannel> {
        self.channel
            .as_mut()
            .ok_or_else(|| ErrorKind::State("connection is closed".to_string()).into())
    }

    /// Writes one command and returns the text of its `+OK` status line.
    fn send_command(&mut self, command: &str, shown: Option<&str>) -> Result<String> {
        let channel = self.channel()?;
        match shown {
            Some(shown) => channel.write_sensitive(command, shown)?,
            None => channel.write_line(command)?,
        }
        let line = channel.read_line()?;
        check_status(&line).map(str::to_string)
    }
}

impl Drop for POP3Connection {
    fn drop(&mut self) {
        self.quit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_classification() {
        assert_eq!(check_status("+OK").unwrap(), "");
        assert_eq!(check_status("+OK 2 320").unwrap(), "2 320");
        assert!(check_status("-ERR no such message").is_err());
        assert!(check_status("+OKAY").is_err());
        assert!(check_status("").is_err());
    }
}
