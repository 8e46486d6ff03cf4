/// Header fields pulled out of a raw message, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Case-insensitive lookup; the first occurrence wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|&&(ref key, _)| key.eq_ignore_ascii_case(name))
            .map(|&(_, ref value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Best-effort parse of the header section of `raw`.
///
/// Parsing stops at the first empty line. Folded values are unfolded and
/// RFC 2047 encoded words are decoded. Fields whose name contains
/// whitespace are dropped, and a block that cannot be parsed at all yields
/// no headers.
pub fn parse_headers(raw: &str) -> Headers {
    let parsed = match mailparse::parse_headers(raw.as_bytes()) {
        Ok((parsed, _)) => parsed,
        Err(e) => {
            debug!("Ignoring unparsable header block: {}", e);
            return Headers::default();
        }
    };

    let fields = parsed
        .iter()
        .filter_map(|header| {
            let key = header.get_key();
            if key.is_empty() || key.contains(|c: char| c.is_whitespace()) {
                trace!("Skipping malformed header field {:?}", key);
                return None;
            }
            Some((key, header.get_value().trim().to_string()))
        })
        .collect();

    Headers { fields: fields }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_common_fields() {
        let raw = "Return-Path: <a@example.com>\r\n\
                   From: Alice <a@example.com>\r\n\
                   Subject: Lunch?\r\n\
                   Date: Mon, 02 Jan 2006 15:04:05 -0700\r\n\
                   \r\n\
                   From: not a header\r\n";
        let headers = parse_headers(raw);
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get("from"), Some("Alice <a@example.com>"));
        assert_eq!(headers.get("SUBJECT"), Some("Lunch?"));
        assert_eq!(headers.get("Date"), Some("Mon, 02 Jan 2006 15:04:05 -0700"));
        assert_eq!(headers.get("to"), None);
    }

    #[test]
    fn folded_values_are_joined() {
        let raw = "Subject: a very\r\n\tlong subject\r\nFrom: b@example.com\r\n";
        let headers = parse_headers(raw);
        assert_eq!(headers.get("subject"), Some("a very long subject"));
        assert_eq!(headers.get("from"), Some("b@example.com"));
    }

    #[test]
    fn names_with_whitespace_are_skipped() {
        let raw = "bad key: x\r\nSubject:tight\r\n";
        let headers = parse_headers(raw);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("subject"), Some("tight"));
    }

    #[test]
    fn overhanging_first_line_yields_no_headers() {
        let headers = parse_headers(" stray continuation\r\nSubject: lost\r\n");
        assert!(headers.is_empty());
        assert_eq!(headers.get("subject"), None);
    }

    #[test]
    fn encoded_words_are_decoded() {
        let raw = "Subject: =?UTF-8?B?SGVsbG8gV29ybGQ=?=\r\n\
                   From: =?UTF-8?Q?Andr=C3=A9?= <andre@example.com>\r\n\
                   \r\n";
        let headers = parse_headers(raw);
        assert_eq!(headers.get("subject"), Some("Hello World"));
        assert_eq!(headers.get("from"), Some("Andr\u{e9} <andre@example.com>"));
    }

    #[test]
    fn first_occurrence_wins() {
        let headers = parse_headers("Date: one\nDate: two\n");
        assert_eq!(headers.get("date"), Some("one"));
    }
}
