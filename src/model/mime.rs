//! The MIME part tree of a message and its serialization back to bytes.
//!
//! Leaf parts hold their body in wire form, encoded as their tag says, and
//! are written back byte for byte. Only [`LeafPart::set_encoding`] with a
//! different tag re-encodes a body.

use std::borrow::Cow;
use std::io::{self, Write};

use chrono::{DateTime, Utc};

use super::encoding::TransferEncoding;
use crate::parser::header;

/// One header field, stored as the raw bytes it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    name: String,
    raw: Vec<u8>,
    colon: usize,
}

impl Header {
    /// Build a header from a raw field (`Name: value`, folding allowed).
    ///
    /// Returns `None` when there is no colon or the name is empty.
    pub fn from_raw(raw: Vec<u8>) -> Option<Self> {
        let colon = raw.iter().position(|&b| b == b':')?;
        let name = String::from_utf8_lossy(&raw[..colon]).trim().to_string();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return None;
        }
        Some(Self { name, raw, colon })
    }

    /// Build a header from a name and an unfolded value.
    pub fn new(name: &str, value: &str) -> Self {
        let raw = format!("{name}: {value}").into_bytes();
        Self {
            name: name.to_string(),
            raw,
            colon: name.len(),
        }
    }

    /// The unfolded value (RFC 2047 words are *not* decoded).
    pub fn value(&self) -> String {
        header::unfold_value(&self.raw[self.colon + 1..])
    }

    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// An ordered list of header fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn push(&mut self, header: Header) {
        self.0.push(header);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unfolded value of the first field with this name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<String> {
        self.0.iter().find(|h| h.is(name)).map(Header::value)
    }

    /// Replace the first field with this name in place, dropping any
    /// duplicates, or append it if absent.
    pub fn set(&mut self, name: &str, value: &str) {
        let replacement = Header::new(name, value);
        match self.0.iter().position(|h| h.is(name)) {
            Some(pos) => {
                self.0[pos] = replacement;
                let mut idx = 0;
                self.0.retain(|h| {
                    let keep = idx <= pos || !h.is(name);
                    idx += 1;
                    keep
                });
            }
            None => self.0.push(replacement),
        }
    }

    pub fn write_to(&self, w: &mut dyn Write) -> io::Result<()> {
        for h in &self.0 {
            w.write_all(&h.raw)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// A parsed `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentType {
    /// Primary type, lowercase (`text`, `multipart`, ...).
    pub mime_type: String,
    /// Subtype, lowercase (`plain`, `mixed`, ...).
    pub subtype: String,
    /// Parameters with lowercase names, values unquoted.
    pub params: Vec<(String, String)>,
}

impl Default for ContentType {
    fn default() -> Self {
        Self {
            mime_type: "text".to_string(),
            subtype: "plain".to_string(),
            params: Vec::new(),
        }
    }
}

impl ContentType {
    /// Build a parameterless type such as `message/rfc822`.
    pub fn new(mime_type: &str, subtype: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            subtype: subtype.to_string(),
            params: Vec::new(),
        }
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.mime_type, self.subtype)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Any `text/*` type.
    pub fn is_text(&self) -> bool {
        self.mime_type == "text"
    }

    pub fn is_multipart(&self) -> bool {
        self.mime_type == "multipart"
    }

    /// An embedded message that can be walked as a part tree.
    pub fn is_message(&self) -> bool {
        self.mime_type == "message" && matches!(self.subtype.as_str(), "rfc822" | "global")
    }
}

/// A node of a message's content tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MimePart {
    /// A part carrying content bytes.
    Leaf(LeafPart),
    /// A `multipart/*` container.
    Multipart(MultipartPart),
    /// A `message/rfc822` part wrapping a whole message.
    Nested(NestedPart),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafPart {
    pub headers: Headers,
    pub content_type: ContentType,
    encoding: TransferEncoding,
    /// Body bytes as they appear on the wire, encoded per `encoding`.
    body: Vec<u8>,
}

impl LeafPart {
    /// Build a leaf from its encoded `body`, as read from a message.
    pub fn new(
        headers: Headers,
        content_type: ContentType,
        encoding: TransferEncoding,
        body: Vec<u8>,
    ) -> Self {
        Self {
            headers,
            content_type,
            encoding,
            body,
        }
    }

    pub fn encoding(&self) -> &TransferEncoding {
        &self.encoding
    }

    /// The encoded body, exactly as it will be written.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The decoded content.
    pub fn content(&self) -> Cow<'_, [u8]> {
        match self.encoding {
            TransferEncoding::Base64 | TransferEncoding::QuotedPrintable => {
                Cow::Owned(self.encoding.decode(&self.body))
            }
            _ => Cow::Borrowed(&self.body),
        }
    }

    /// Change the transfer encoding, keeping `Content-Transfer-Encoding` in step.
    ///
    /// The body is re-encoded only when the wire form actually changes.
    pub fn set_encoding(&mut self, encoding: TransferEncoding) {
        let same_wire_form =
            encoding == self.encoding || (encoding.is_identity() && self.encoding.is_identity());
        if !same_wire_form {
            let content = self.encoding.decode(&self.body);
            self.body = encoding.encode(&content);
        }
        self.headers
            .set("Content-Transfer-Encoding", encoding.as_str());
        self.encoding = encoding;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultipartPart {
    pub headers: Headers,
    pub content_type: ContentType,
    pub boundary: String,
    pub preamble: Vec<u8>,
    pub children: Vec<MimePart>,
    pub epilogue: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedPart {
    pub headers: Headers,
    pub message: Box<Message>,
}

impl MimePart {
    pub fn headers(&self) -> &Headers {
        match self {
            Self::Leaf(p) => &p.headers,
            Self::Multipart(p) => &p.headers,
            Self::Nested(p) => &p.headers,
        }
    }

    /// Serialize headers, blank line, and body.
    pub fn write_to(&self, w: &mut dyn Write) -> io::Result<()> {
        self.headers().write_to(w)?;
        w.write_all(b"\n")?;
        match self {
            Self::Leaf(leaf) => w.write_all(&leaf.body),
            Self::Multipart(multi) => multi.write_body(w),
            Self::Nested(nested) => nested.message.write_to(w),
        }
    }
}

impl MultipartPart {
    fn write_body(&self, w: &mut dyn Write) -> io::Result<()> {
        w.write_all(&self.preamble)?;
        if !self.preamble.is_empty() {
            w.write_all(b"\n")?;
        }
        for child in &self.children {
            writeln!(w, "--{}", self.boundary)?;
            child.write_to(w)?;
            w.write_all(b"\n")?;
        }
        writeln!(w, "--{}--", self.boundary)?;
        w.write_all(&self.epilogue)
    }
}

/// A complete message: its root part carries the message headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub root: MimePart,
}

impl Message {
    pub fn new(root: MimePart) -> Self {
        Self { root }
    }

    pub fn headers(&self) -> &Headers {
        self.root.headers()
    }

    /// Decoded `Subject`, if present and not blank.
    pub fn subject(&self) -> Option<String> {
        self.headers()
            .get("subject")
            .map(|s| header::decode_encoded_words(&s).trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Bare address of the author: `From`, else `Sender`.
    pub fn sender_address(&self) -> Option<String> {
        ["from", "sender"]
            .iter()
            .find_map(|name| self.headers().get(name).and_then(|v| header::first_address(&v)))
    }

    /// Parsed `Date` header.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.headers()
            .get("date")
            .and_then(|d| header::parse_date(&d))
    }

    /// Serialize the whole message as RFC 5322 bytes with `\n` line breaks
    /// between generated lines (body bytes are written as stored).
    pub fn write_to(&self, w: &mut dyn Write) -> io::Result<()> {
        self.root.write_to(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_leaf(body: &str, encoding: TransferEncoding) -> MimePart {
        let mut headers = Headers::default();
        headers.push(Header::new("Content-Type", "text/plain"));
        headers.push(Header::new("Content-Transfer-Encoding", encoding.as_str()));
        MimePart::Leaf(LeafPart::new(
            headers,
            ContentType::default(),
            encoding,
            body.as_bytes().to_vec(),
        ))
    }

    #[test]
    fn test_header_from_raw_rejects_garbage() {
        assert!(Header::from_raw(b"no colon here".to_vec()).is_none());
        assert!(Header::from_raw(b": empty name".to_vec()).is_none());
        assert!(Header::from_raw(b"Bad Name: x".to_vec()).is_none());
        let h = Header::from_raw(b"X-Test:  value ".to_vec()).unwrap();
        assert!(h.is("x-test"));
        assert_eq!(h.value(), "value");
    }

    #[test]
    fn test_headers_set_replaces_in_place_and_dedups() {
        let mut headers = Headers::default();
        headers.push(Header::new("A", "1"));
        headers.push(Header::new("Content-Transfer-Encoding", "base64"));
        headers.push(Header::new("B", "2"));
        headers.push(Header::new("content-transfer-encoding", "7bit"));

        headers.set("Content-Transfer-Encoding", "8bit");

        let mut out = Vec::new();
        headers.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "A: 1\nContent-Transfer-Encoding: 8bit\nB: 2\n"
        );
        assert_eq!(headers.get("content-transfer-encoding").as_deref(), Some("8bit"));
    }

    #[test]
    fn test_headers_set_appends_when_absent() {
        let mut headers = Headers::default();
        headers.set("Content-Transfer-Encoding", "8bit");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_set_encoding_changes_wire_form() {
        let MimePart::Leaf(mut leaf) = text_leaf("aMOpbGxv", TransferEncoding::Base64) else {
            unreachable!()
        };
        leaf.set_encoding(TransferEncoding::EightBit);
        let mut out = Vec::new();
        MimePart::Leaf(leaf).write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Content-Type: text/plain\nContent-Transfer-Encoding: 8bit\n\nhéllo"
        );
    }

    #[test]
    fn test_unchanged_encoding_keeps_body_bytes() {
        // Unwrapped base64 and a QP-escaped CRLF must not be rewritten.
        let wrapped = "QUFB".repeat(30);
        for (body, encoding) in [
            (wrapped.as_str(), TransferEncoding::Base64),
            ("a=0D=0Ab=0D=0A", TransferEncoding::QuotedPrintable),
        ] {
            let MimePart::Leaf(mut leaf) = text_leaf(body, encoding.clone()) else {
                unreachable!()
            };
            leaf.set_encoding(encoding);
            assert_eq!(leaf.body(), body.as_bytes());
        }

        let MimePart::Leaf(leaf) = text_leaf("a=0D=0Ab=0D=0A", TransferEncoding::QuotedPrintable)
        else {
            unreachable!()
        };
        assert_eq!(&*leaf.content(), b"a\r\nb\r\n");
    }

    #[test]
    fn test_multipart_write_layout() {
        let part = MimePart::Multipart(MultipartPart {
            headers: Headers::default(),
            content_type: ContentType::new("multipart", "mixed"),
            boundary: "XX".into(),
            preamble: b"preamble".to_vec(),
            children: vec![text_leaf("one", TransferEncoding::SevenBit)],
            epilogue: b"tail\n".to_vec(),
        });
        let mut out = Vec::new();
        part.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\npreamble\n--XX\nContent-Type: text/plain\nContent-Transfer-Encoding: 7bit\n\none\n--XX--\ntail\n"
        );
    }

    #[test]
    fn test_message_metadata() {
        let mut headers = Headers::default();
        headers.push(Header::new("From", "\"Alice A.\" <alice@example.com>"));
        headers.push(Header::new("Subject", "=?UTF-8?B?SG9sYQ==?="));
        headers.push(Header::new("Date", "Thu, 04 Jan 2024 10:00:00 +0000"));
        let msg = Message::new(MimePart::Leaf(LeafPart::new(
            headers,
            ContentType::default(),
            TransferEncoding::SevenBit,
            Vec::new(),
        )));
        assert_eq!(msg.subject().as_deref(), Some("Hola"));
        assert_eq!(msg.sender_address().as_deref(), Some("alice@example.com"));
        assert!(msg.date().is_some());
    }

    #[test]
    fn test_content_type_kinds() {
        assert!(ContentType::new("text", "html").is_text());
        assert!(ContentType::new("message", "rfc822").is_message());
        assert!(!ContentType::new("message", "delivery-status").is_message());
        assert!(ContentType::new("multipart", "alternative").is_multipart());
    }
}
