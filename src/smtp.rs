use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channel::{reclassify, CommandChannel, Reply};
use crate::config::SMTPConfig;
use crate::errors::*;
use crate::tcpstream;
use crate::utils::{base64_line, sasl_plain, single_line};

/// RFC 5322 date with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SMTPState {
    /// Greeting received, EHLO not yet sent.
    GREETED,
    /// EHLO or HELO accepted; the connection is in plaintext unless it was
    /// dialed with implicit TLS.
    IDENTIFIED,
    /// Upgraded with STARTTLS.
    SECURED,
    AUTHENTICATED,
    CLOSED,
}

/// A single message to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SendRequest {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl SendRequest {
    pub fn new<F, S, B>(from: F, to: Vec<String>, subject: S, body: B) -> SendRequest
        where F: Into<String>,
              S: Into<String>,
              B: Into<String>
    {
        SendRequest {
            from: from.into(),
            to: to,
            subject: subject.into(),
            body: body.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            bail!(ErrorKind::InvalidInput("no recipients".to_string()));
        }
        for address in Some(&self.from).into_iter().chain(self.to.iter()) {
            if address.contains(|c: char| c == '\r' || c == '\n' || c == '<' || c == '>') {
                bail!(ErrorKind::InvalidInput(format!("malformed address {:?}", address)));
            }
        }
        Ok(())
    }

    /// Renders the message handed over in the DATA phase, one entry per
    /// line, before dot-stuffing.
    pub fn message_lines<Tz>(&self, date: &DateTime<Tz>) -> Vec<String>
        where Tz: TimeZone,
              Tz::Offset: Display
    {
        let mut lines = vec![format!("From: {}", single_line(&self.from)),
                             format!("To: {}", single_line(&self.to.join(", "))),
                             format!("Subject: {}", single_line(&self.subject)),
                             format!("Date: {}", date.format(DATE_FORMAT)),
                             "MIME-Version: 1.0".to_string(),
                             "Content-Type: text/plain; charset=UTF-8".to_string(),
                             String::new()];
        lines.extend(self.body.lines().map(str::to_string));
        lines
    }
}

/// An SMTP submission session over one connection.
///
/// Like [`POP3Connection`](crate::POP3Connection), dropping an open session
/// sends `QUIT` and closes the socket.
pub struct SMTPConnection {
    account: SMTPConfig,
    channel: Option<CommandChannel>,
    state: SMTPState,
    capabilities: Vec<String>,
}

impl SMTPConnection {
    /// Dials the server and consumes its greeting, which must be 2xx.
    pub fn connect(account: SMTPConfig) -> Result<SMTPConnection> {
        trace!("Initiate SMTP Connection");
        let stream = tcpstream::connect(&account.host,
                                        account.port,
                                        account.use_tls,
                                        account.connect_timeout,
                                        account.ca_certificate.as_deref())?;
        let mut channel = CommandChannel::new(stream);

        let greeting = channel.read_reply()?;
        if !greeting.is_positive_completion() {
            channel.shutdown();
            bail!(ErrorKind::Protocol(greeting.last_line().to_string()));
        }

        let ctx = SMTPConnection {
            account: account,
            channel: Some(channel),
            state: SMTPState::GREETED,
            capabilities: Vec::new(),
        };
        debug!("SMTPState::{:?}", ctx.state);
        Ok(ctx)
    }

    pub fn state(&self) -> SMTPState {
        self.state
    }

    pub fn is_tls(&self) -> bool {
        self.channel.as_ref().map_or(false, CommandChannel::is_tls)
    }

    /// Extension keywords from the last accepted EHLO, e.g. `"STARTTLS"` or
    /// `"SIZE 35882577"`. Empty after a HELO fallback.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// EHLO (falling back to HELO), then an opportunistic STARTTLS when the
    /// connection is still in plaintext.
    ///
    /// A server that refuses or does not know STARTTLS leaves the session in
    /// plaintext without error. A TLS handshake that fails after the server
    /// agreed to it is an error.
    pub fn handshake(&mut self) -> Result<()> {
        self.require(&[SMTPState::GREETED])?;
        let name = self.account.client_name.clone();

        match self.ehlo(&name) {
            Ok(()) => {}
            Err(Error(ErrorKind::Protocol(line), _)) => {
                debug!("EHLO refused ({}), falling back to HELO", line);
                self.channel()?.command(&format!("HELO {}", name))?;
                self.capabilities.clear();
            }
            Err(e) => return Err(e),
        }
        self.state = SMTPState::IDENTIFIED;
        debug!("SMTPState::{:?}", self.state);

        if !self.is_tls() {
            self.starttls(&name)?;
        }
        Ok(())
    }

    fn ehlo(&mut self, name: &str) -> Result<()> {
        let reply = self.channel()?.command(&format!("EHLO {}", name))?;
        // The first line carries the server's domain, the rest are keywords.
        self.capabilities = reply.messages().skip(1).map(str::to_string).collect();
        Ok(())
    }

    fn starttls(&mut self, name: &str) -> Result<()> {
        let reply = {
            let channel = self.channel()?;
            channel.write_line("STARTTLS")?;
            channel.read_reply()?
        };
        if reply.code != 220 {
            debug!("STARTTLS unavailable ({}), continuing in plaintext", reply.last_line());
            return Ok(());
        }

        let channel = self.take_channel()?;
        self.channel = Some(channel.starttls(&self.account.host,
                                             self.account.ca_certificate.as_deref())?);
        self.state = SMTPState::SECURED;
        debug!("SMTPState::{:?}", self.state);
        // Anything learnt over plaintext is void once the upgrade succeeds.
        self.capabilities.clear();

        if let Err(e) = self.ehlo(name) {
            warn!("EHLO after STARTTLS failed: {}", e);
        }
        Ok(())
    }

    /// Authenticates with the credentials from the configuration.
    pub fn login(&mut self) -> Result<()> {
        let username = self.account.username.clone();
        let password = self.account.password.clone();
        self.auth(&username, &password)
    }

    /// AUTH PLAIN, falling back to AUTH LOGIN when PLAIN is not answered
    /// with 235. Fails with `ErrorKind::Auth` once both are exhausted.
    pub fn auth(&mut self, username: &str, password: &str) -> Result<()> {
        self.require(&[SMTPState::IDENTIFIED, SMTPState::SECURED])?;
        trace!("Attempting to Login");

        let reply = {
            let channel = self.channel()?;
            channel.write_sensitive(&format!("AUTH PLAIN {}", sasl_plain(username, password)),
                                    "AUTH PLAIN ****")?;
            let reply = channel.read_reply()?;
            if reply.code == 334 {
                // Server wants the credentials in a second round; cancel it.
                channel.write_line("*")?;
                channel.read_reply()?;
            }
            reply
        };

        if reply.code != 235 {
            debug!("AUTH PLAIN refused ({}), trying AUTH LOGIN", reply.last_line());
            self.auth_login(username, password).map_err(|e| reclassify(e, ErrorKind::Auth))?;
        }

        self.state = SMTPState::AUTHENTICATED;
        debug!("SMTPState::{:?}", self.state);
        Ok(())
    }

    fn auth_login(&mut self, username: &str, password: &str) -> Result<()> {
        let channel = self.channel()?;
        channel.command("AUTH LOGIN")?;
        channel.write_sensitive(&base64_line(username), "****")?;
        channel.read_reply()?.into_result()?;
        channel.write_sensitive(&base64_line(password), "****")?;
        let reply = channel.read_reply()?.into_result()?;
        if !reply.is_positive_completion() {
            bail!(ErrorKind::Auth(reply.last_line().to_string()));
        }
        Ok(())
    }

    /// Submits one message.
    ///
    /// The first rejected recipient aborts the whole transaction before DATA;
    /// there is no partial delivery. Rejections are `ErrorKind::Send`.
    pub fn send(&mut self, req: &SendRequest) -> Result<()> {
        self.require(&[SMTPState::IDENTIFIED, SMTPState::SECURED, SMTPState::AUTHENTICATED])?;
        req.validate()?;
        trace!("Sending message from {} to {} recipient(s)", req.from, req.to.len());

        if let Err(e) = self.envelope(req) {
            self.abort_transaction();
            return Err(e);
        }

        let lines = req.message_lines(&Local::now());
        let channel = self.channel()?;
        channel.write_data(lines.iter().map(String::as_str))?;
        channel.read_reply()?
            .into_result()
            .map_err(|e| reclassify(e, ErrorKind::Send))?;
        Ok(())
    }

    fn envelope(&mut self, req: &SendRequest) -> Result<()> {
        let channel = self.channel()?;
        channel.command(&format!("MAIL FROM:<{}>", req.from))
            .map_err(|e| reclassify(e, ErrorKind::Send))?;
        for to in &req.to {
            channel.command(&format!("RCPT TO:<{}>", to))
                .map_err(|e| reclassify(e, ErrorKind::Send))?;
        }
        let reply = channel.command("DATA").map_err(|e| reclassify(e, ErrorKind::Send))?;
        if !reply.is_positive_intermediate() {
            bail!(ErrorKind::Send(reply.last_line().to_string()));
        }
        Ok(())
    }

    /// Resets a half-built transaction so the session stays usable.
    fn abort_transaction(&mut self) {
        let outcome: Result<Reply> = self.channel().and_then(|channel| channel.command("RSET"));
        if let Err(e) = outcome {
            warn!("SMTP RSET failed: {}", e);
        }
    }

    /// Sends QUIT and closes the connection. A failing QUIT is only logged.
    pub fn close(mut self) {
        self.quit();
    }

    fn quit(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            trace!("Cmd: QUIT");
            if let Err(e) = channel.command("QUIT") {
                warn!("SMTP QUIT failed: {}", e);
            }
            channel.shutdown();
            self.state = SMTPState::CLOSED;
            debug!("SMTPState::{:?}", self.state);
        }
    }

    fn require(&self, allowed: &[SMTPState]) -> Result<()> {
        if !allowed.contains(&self.state) {
            bail!(ErrorKind::State(format!("expected one of {:?}, session is in {:?}",
                                           allowed,
                                           self.state)));
        }
        Ok(())
    }

    fn channel(&mut self) -> Result<&mut CommandChannel> {
        self.channel
            .as_mut()
            .ok_or_else(|| ErrorKind::State("connection is closed".to_string()).into())
    }

    fn take_channel(&mut self) -> Result<CommandChannel> {
        self.channel
            .take()
            .ok_or_else(|| ErrorKind::State("connection is closed".to_string()).into())
    }
}

impl Drop for SMTPConnection {
    fn drop(&mut self) {
        self.quit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use pretty_assertions::assert_eq;

    fn request() -> SendRequest {
        SendRequest::new("alice@example.com",
                         vec!["bob@example.com".to_string(), "carol@example.com".to_string()],
                         "Status",
                         "Hello,\r\n.hidden\r\n\r\nBye\r\n")
    }

    #[test]
    fn message_has_envelope_headers_in_order() {
        let date = FixedOffset::west_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2006, 1, 2, 15, 4, 5)
            .unwrap();
        assert_eq!(request().message_lines(&date),
                   vec!["From: alice@example.com",
                        "To: bob@example.com, carol@example.com",
                        "Subject: Status",
                        "Date: Mon, 02 Jan 2006 15:04:05 -0700",
                        "MIME-Version: 1.0",
                        "Content-Type: text/plain; charset=UTF-8",
                        "",
                        "Hello,",
                        ".hidden",
                        "",
                        "Bye"]);
    }

    #[test]
    fn subject_cannot_inject_headers() {
        let mut req = request();
        req.subject = "Hi\r\nBcc: mallory@example.com".to_string();
        let lines = req.message_lines(&Local::now());
        assert_eq!(lines[2], "Subject: Hi Bcc: mallory@example.com");
        assert!(!lines.iter().any(|line| line.starts_with("Bcc:")));
    }

    #[test]
    fn requests_are_validated() {
        assert!(request().validate().is_ok());

        let mut empty = request();
        empty.to.clear();
        assert!(empty.validate().is_err());

        let mut injected = request();
        injected.to.push("eve@example.com>\r\nRCPT TO:<x@example.com".to_string());
        match injected.validate() {
            Err(Error(ErrorKind::InvalidInput(_), _)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
