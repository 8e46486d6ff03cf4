use regex::Regex;

use crate::headers::parse_headers;
use crate::pop3result::{EmailMetadata, Message, POP3Stat};

lazy_static! {
    // "<number> <size>", optionally followed by server-specific extras.
    static ref STAT_REGEX: Regex = Regex::new(r"^(?P<nmsg>\d+) +(?P<size>\d+)(?:\s.*)?$").unwrap();
}

fn parse_pair(line: &str) -> Option<(u32, u64)> {
    let cap = STAT_REGEX.captures(line.trim())?;
    let first = cap.name("nmsg")?.as_str().parse::<u32>().ok()?;
    let second = cap.name("size")?.as_str().parse::<u64>().ok()?;
    Some((first, second))
}

impl EmailMetadata {
    /// Parses a scan listing line such as `"3 1205"`.
    pub fn parse(line: &str) -> Option<EmailMetadata> {
        parse_pair(line).map(|(id, size)| EmailMetadata { id: id, size: size })
    }

    /// Keeps every well-formed line of a LIST block, in order.
    pub fn parse_listing<S: AsRef<str>>(lines: &[S]) -> Vec<EmailMetadata> {
        lines
            .iter()
            .filter_map(|line| {
                let parsed = EmailMetadata::parse(line.as_ref());
                if parsed.is_none() {
                    debug!("Skipping malformed LIST line {:?}", line.as_ref());
                }
                parsed
            })
            .collect()
    }
}

impl POP3Stat {
    /// Parses the text of a STAT reply following `+OK`.
    pub fn parse(stat_line: &str) -> Option<POP3Stat> {
        parse_pair(stat_line).map(|(num_mails, mbox_size)| {
            POP3Stat {
                num_mails: num_mails,
                mbox_size: mbox_size,
            }
        })
    }
}

impl Message {
    /// Builds a preview from the lines of a TOP reply. The body is only
    /// filled in when body lines were requested.
    pub fn from_top(id: u32, lines: &[String], preview_lines: u32) -> Message {
        let content = lines.join("\r\n");
        let headers = parse_headers(&content);
        let body = if preview_lines > 0 {
            content.splitn(2, "\r\n\r\n").nth(1).map(str::to_string)
        } else {
            None
        };
        Message {
            id: id,
            size: 0,
            from: headers.get("from").map(str::to_string),
            subject: headers.get("subject").map(str::to_string),
            date: headers.get("date").map(str::to_string),
            body: body,
        }
    }
}
