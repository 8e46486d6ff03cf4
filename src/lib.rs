//! Blocking client implementations of POP3 (RFC 1939) and SMTP submission
//! (RFC 5321) over a single TCP or TLS connection per session.
//!
//! ```no_run
//! use mailwire::{POP3Config, POP3Connection};
//!
//! # fn main() -> mailwire::errors::Result<()> {
//! let config = POP3Config::new("pop.example.com", mailwire::POP3S_PORT, "bob", "secret")
//!     .with_tls(true);
//! let mut pop3 = POP3Connection::connect(config)?;
//! pop3.login()?;
//! for meta in pop3.list()? {
//!     println!("{} {}", meta.id, meta.size);
//! }
//! pop3.close();
//! # Ok(())
//! # }
//! ```
//!
//! Sessions hold no read timeout: a server that stops responding blocks the
//! calling thread until the peer closes the socket.

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;

pub mod errors {
    error_chain! {
        foreign_links {
            Io(::std::io::Error);
            Ssl(::openssl::error::ErrorStack);
        }

        errors {
            Connection(detail: String) {
                description("connection failed")
                display("connection failed: {}", detail)
            }
            Protocol(line: String) {
                description("server rejected command")
                display("server replied: {}", line)
            }
            Auth(line: String) {
                description("authentication failed")
                display("authentication failed: {}", line)
            }
            Send(line: String) {
                description("message was not accepted")
                display("message was not accepted: {}", line)
            }
            State(detail: String) {
                description("invalid session state")
                display("invalid session state: {}", detail)
            }
            InvalidInput(detail: String) {
                description("invalid input")
                display("invalid input: {}", detail)
            }
        }
    }
}

mod channel;
mod config;
mod headers;
mod pop3;
pub mod pop3result;
mod pop3resultimpl;
mod smtp;
mod tcpstream;
mod utils;

pub use channel::Reply;
pub use config::{POP3Config, SMTPConfig, POP3S_PORT, POP3_PORT, SMTP_PORT, SUBMISSIONS_PORT,
                 SUBMISSION_PORT};
pub use headers::{parse_headers, Headers};
pub use pop3::{POP3Connection, POP3State};
pub use pop3result::{EmailMetadata, Message, POP3Stat};
pub use smtp::{SMTPConnection, SMTPState, SendRequest};
pub use utils::{dot_stuff, dot_unstuff};
