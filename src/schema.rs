use bytes::Bytes;

/// Fields recovered from a query name that fit the exfil schema.
#[derive(Debug, Clone)]
pub struct SchemaMatch {
    /// Payload chunk, verbatim bytes from the leading label.
    pub data: Bytes,
    /// Sequence number of this chunk within its context.
    pub line: u64,
    /// Session identifier, the 32 hex characters as ASCII text.
    pub context: String,
}

/// Compiled matcher for query names carrying smuggled records under one
/// parent domain.
///
/// A cooperating client encodes each record as the three leading labels of
/// a query name:
///
/// ```text
/// <data>.<line>.<context><host>
/// aGVsbG8.42.0123456789abcdef0123456789abcdef.example.com.
/// ```
///
/// where `data` is one or more bytes of `[A-Za-z0-9_-]`, `line` is a
/// decimal integer and `context` is exactly 32 hex characters. The grammar
/// is walked label by label rather than handed to a regex engine so that
/// the edge cases (empty host, zero-length labels) stay explicit.
#[derive(Debug, Clone)]
pub struct Matcher {
    host: Bytes,
}

impl Matcher {
    /// Compile a matcher for the given parent domain.
    ///
    /// The host is normalized to carry exactly one leading and one trailing
    /// dot, so the match anchors on whole-label boundaries and
    /// `notexample.com` cannot collide with `example.com`. Normalizing an
    /// already-normalized host changes nothing. Construction never fails;
    /// an empty host normalizes to `.` and anchors on the root label.
    pub fn new(host: &[u8]) -> Self {
        let mut normalized = Vec::with_capacity(host.len() + 2);
        if host.first() != Some(&b'.') {
            normalized.push(b'.');
        }
        normalized.extend_from_slice(host);
        if normalized.last() != Some(&b'.') {
            normalized.push(b'.');
        }
        Self {
            host: Bytes::from(normalized),
        }
    }

    /// The normalized parent domain this matcher anchors on.
    pub fn host(&self) -> &[u8] {
        &self.host
    }

    /// Apply the schema to a query name, anchored at its start.
    ///
    /// Trailing bytes after the matched host suffix are not validated; a
    /// prefix match is sufficient. Non-matching names and names whose line
    /// label overflows or whose context label is not ASCII all yield `None`;
    /// ordinary traffic sharing the interface is expected to land here
    /// constantly, so there is no error path.
    pub fn decode(&self, qname: &[u8]) -> Option<SchemaMatch> {
        let (data, rest) = take_label(qname, is_data_byte)?;
        let rest = rest.strip_prefix(b".")?;
        let (line_label, rest) = take_label(rest, |b| b.is_ascii_digit())?;
        let rest = rest.strip_prefix(b".")?;
        if rest.len() < 32 {
            return None;
        }
        let (context_label, rest) = rest.split_at(32);
        if !context_label.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        if !rest.starts_with(&self.host) {
            return None;
        }

        // Structural match done; validate the two typed fields in order.
        let line = std::str::from_utf8(line_label).ok()?.parse::<u64>().ok()?;
        let context = std::str::from_utf8(context_label)
            .ok()
            .filter(|s| s.is_ascii())?
            .to_string();

        Some(SchemaMatch {
            data: Bytes::copy_from_slice(data),
            line,
            context,
        })
    }
}

fn is_data_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Split off the longest non-empty prefix of bytes accepted by `pred`.
fn take_label(input: &[u8], pred: impl Fn(u8) -> bool) -> Option<(&[u8], &[u8])> {
    let len = input.iter().take_while(|&&b| pred(b)).count();
    if len == 0 {
        return None;
    }
    Some(input.split_at(len))
}
