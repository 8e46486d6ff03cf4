use std::fmt;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const POP3_PORT: u16 = 110;
pub const POP3S_PORT: u16 = 995;
pub const SMTP_PORT: u16 = 25;
pub const SUBMISSION_PORT: u16 = 587;
pub const SUBMISSIONS_PORT: u16 = 465;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CLIENT_NAME: &str = "localhost";

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}

/// Connection parameters for a POP3 mailbox.
///
/// `use_tls` selects implicit TLS (port 995). The password is expected in
/// clear text; decrypting stored credentials is the caller's job.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct POP3Config {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub use_tls: bool,
    #[cfg_attr(feature = "serde", serde(default = "default_connect_timeout"))]
    pub connect_timeout: Duration,
    /// Extra PEM root certificate trusted next to the system store.
    #[cfg_attr(feature = "serde", serde(default))]
    pub ca_certificate: Option<String>,
}

impl POP3Config {
    pub fn new<H, U, P>(host: H, port: u16, username: U, password: P) -> POP3Config
        where H: Into<String>,
              U: Into<String>,
              P: Into<String>
    {
        POP3Config {
            host: host.into(),
            port: port,
            username: username.into(),
            password: password.into(),
            use_tls: false,
            connect_timeout: default_connect_timeout(),
            ca_certificate: None,
        }
    }

    pub fn with_tls(mut self, use_tls: bool) -> POP3Config {
        self.use_tls = use_tls;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> POP3Config {
        self.connect_timeout = timeout;
        self
    }

    /// Trusts `pem` as an additional root, e.g. a private CA.
    pub fn with_ca_certificate<C: Into<String>>(mut self, pem: C) -> POP3Config {
        self.ca_certificate = Some(pem.into());
        self
    }
}

impl fmt::Debug for POP3Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("POP3Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("connect_timeout", &self.connect_timeout)
            .field("ca_certificate", &self.ca_certificate.is_some())
            .finish()
    }
}

/// Connection parameters for an SMTP submission server.
///
/// With `use_tls` the connection is encrypted from the first byte (port 465);
/// otherwise the session dials in plaintext and tries STARTTLS during the
/// handshake.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SMTPConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub use_tls: bool,
    #[cfg_attr(feature = "serde", serde(default = "default_connect_timeout"))]
    pub connect_timeout: Duration,
    /// Extra PEM root certificate trusted next to the system store.
    #[cfg_attr(feature = "serde", serde(default))]
    pub ca_certificate: Option<String>,
    /// Name announced in EHLO / HELO.
    #[cfg_attr(feature = "serde", serde(default = "default_client_name"))]
    pub client_name: String,
}

impl SMTPConfig {
    pub fn new<H, U, P>(host: H, port: u16, username: U, password: P) -> SMTPConfig
        where H: Into<String>,
              U: Into<String>,
              P: Into<String>
    {
        SMTPConfig {
            host: host.into(),
            port: port,
            username: username.into(),
            password: password.into(),
            use_tls: false,
            connect_timeout: default_connect_timeout(),
            ca_certificate: None,
            client_name: default_client_name(),
        }
    }

    pub fn with_tls(mut self, use_tls: bool) -> SMTPConfig {
        self.use_tls = use_tls;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> SMTPConfig {
        self.connect_timeout = timeout;
        self
    }

    /// Trusts `pem` as an additional root, e.g. a private CA.
    pub fn with_ca_certificate<C: Into<String>>(mut self, pem: C) -> SMTPConfig {
        self.ca_certificate = Some(pem.into());
        self
    }

    pub fn with_client_name<N: Into<String>>(mut self, name: N) -> SMTPConfig {
        self.client_name = name.into();
        self
    }
}

impl fmt::Debug for SMTPConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SMTPConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("connect_timeout", &self.connect_timeout)
            .field("ca_certificate", &self.ca_certificate.is_some())
            .field("client_name", &self.client_name)
            .finish()
    }
}
