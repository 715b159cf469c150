//! MIME structure parsing: turns raw RFC 5322 bytes into a [`Message`] tree.
//!
//! `mail-parser` does the splitting. Its byte offsets are then used to cut
//! header fields and leaf bodies out of the raw input, so everything that is
//! not explicitly rewritten is serialized again exactly as it was read.

use mail_parser::{Encoding, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::debug;

use crate::model::encoding::TransferEncoding;
use crate::model::mime::{
    ContentType, Header, Headers, LeafPart, Message, MimePart, MultipartPart, NestedPart,
};

/// Maximum container nesting that is turned into a tree. Deeper parts are
/// kept as opaque leaves.
const MAX_DEPTH: usize = 64;

/// Parse a complete raw message (headers + body).
///
/// A leading mbox `From ` envelope line and a UTF-8 BOM are skipped. Input
/// without any header block becomes a single `text/plain` leaf.
pub fn parse_message(raw: &[u8]) -> Message {
    let data = skip_envelope(raw);
    let parsed = MessageParser::default().parse(data);
    match parsed.as_ref().and_then(|msg| convert_message(msg, 0)) {
        Some(message) => message,
        None => {
            debug!(len = data.len(), "No header block found, keeping body as text");
            Message::new(MimePart::Leaf(LeafPart::new(
                Headers::default(),
                ContentType::default(),
                TransferEncoding::SevenBit,
                data.to_vec(),
            )))
        }
    }
}

fn convert_message(message: &mail_parser::Message<'_>, depth: usize) -> Option<Message> {
    if message.parts.is_empty() {
        return None;
    }
    let root = convert_part(message, 0, &ContentType::default(), depth);
    Some(Message::new(root))
}

/// Build the subtree rooted at part `id` of `message`.
///
/// Offsets of inline nested messages index into their own `raw_message`,
/// which `mail-parser` points at the enclosing input.
fn convert_part(
    message: &mail_parser::Message<'_>,
    id: usize,
    default_type: &ContentType,
    depth: usize,
) -> MimePart {
    let raw = message.raw_message.as_ref();
    let Some(part) = message.parts.get(id) else {
        debug!(id, "Dangling MIME part reference");
        return MimePart::Leaf(LeafPart::new(
            Headers::default(),
            default_type.clone(),
            TransferEncoding::SevenBit,
            Vec::new(),
        ));
    };

    let headers = collect_headers(raw, part);
    let content_type = part
        .content_type()
        .and_then(convert_content_type)
        .unwrap_or_else(|| default_type.clone());
    let encoding = TransferEncoding::parse(part.content_transfer_encoding());

    if depth >= MAX_DEPTH {
        debug!(depth, "MIME nesting too deep, keeping part opaque");
    } else {
        match &part.body {
            PartType::Multipart(ids) => {
                let child_default = if content_type.subtype == "digest" {
                    // RFC 2046 §5.1.5
                    ContentType::new("message", "rfc822")
                } else {
                    ContentType::default()
                };
                let children: Vec<MimePart> = ids
                    .iter()
                    .map(|&child| convert_part(message, child, &child_default, depth + 1))
                    .collect();
                let boundary = content_type.param("boundary").unwrap_or_default().to_string();
                let first = ids.first().and_then(|&c| message.parts.get(c));
                let last = ids.last().and_then(|&c| message.parts.get(c));
                let (preamble, epilogue) = framing(raw, part, first, last, &boundary);
                return MimePart::Multipart(MultipartPart {
                    headers,
                    content_type,
                    boundary,
                    preamble,
                    children,
                    epilogue,
                });
            }
            // Only an unencoded message/rfc822 shares its bytes with the parent.
            PartType::Message(nested) if part.encoding == Encoding::None => {
                if let Some(inner) = convert_message(nested, depth + 1) {
                    return MimePart::Nested(NestedPart {
                        headers,
                        message: Box::new(inner),
                    });
                }
                debug!("Embedded message has no parts, keeping it opaque");
            }
            _ => {}
        }
    }

    let body = slice(raw, part.raw_body_offset(), part.raw_end_offset()).to_vec();
    MimePart::Leaf(LeafPart::new(headers, content_type, encoding, body))
}

/// The part's header fields, cut from the raw input with folding intact.
fn collect_headers(raw: &[u8], part: &MessagePart<'_>) -> Headers {
    let mut headers = Headers::default();
    for field in &part.headers {
        let bytes = slice(raw, field.offset_field, field.offset_end);
        match Header::from_raw(field_bytes(bytes)) {
            Some(header) => headers.push(header),
            None => debug!(name = field.name.as_str(), "Dropping malformed header field"),
        }
    }
    headers
}

/// Normalize a raw header field: CRLF becomes LF and the trailing line
/// break is dropped.
fn field_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            continue;
        }
        out.push(b);
    }
    while out.last() == Some(&b'\n') {
        out.pop();
    }
    out
}

fn convert_content_type(ct: &mail_parser::ContentType<'_>) -> Option<ContentType> {
    let subtype = ct.subtype()?;
    Some(ContentType {
        mime_type: ct.ctype().to_ascii_lowercase(),
        subtype: subtype.to_ascii_lowercase(),
        params: ct
            .attributes()
            .unwrap_or_default()
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect(),
    })
}

/// Preamble and epilogue of a multipart, taken from the raw bytes before
/// its first child and after its last one.
///
/// The line break in front of a delimiter belongs to the delimiter, so it
/// is not part of the preamble.
fn framing(
    raw: &[u8],
    part: &MessagePart<'_>,
    first: Option<&MessagePart<'_>>,
    last: Option<&MessagePart<'_>>,
    boundary: &str,
) -> (Vec<u8>, Vec<u8>) {
    let delimiter = format!("--{boundary}");
    let close = format!("--{boundary}--");

    let head_end = first.map_or(part.raw_end_offset(), MessagePart::raw_header_offset);
    let head = slice(raw, part.raw_body_offset(), head_end);
    let preamble = match find(head, delimiter.as_bytes()) {
        Some(pos) => trim_line_break(&head[..pos]).to_vec(),
        None => Vec::new(),
    };

    let tail_start = last.map_or(part.raw_body_offset(), MessagePart::raw_end_offset);
    let tail = slice(raw, tail_start, part.raw_end_offset());
    let epilogue = find(tail, close.as_bytes())
        .map(|pos| &tail[pos + close.len()..])
        .and_then(|rest| rest.iter().position(|&b| b == b'\n').map(|nl| &rest[nl + 1..]))
        .unwrap_or_default()
        .to_vec();

    (preamble, epilogue)
}

/// `raw[start..end]`, or an empty slice when the range is out of bounds.
fn slice(raw: &[u8], start: usize, end: usize) -> &[u8] {
    raw.get(start..end).unwrap_or_default()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn trim_line_break(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Skip a UTF-8 BOM and the mbox `From ` separator line at the start of a message.
fn skip_envelope(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "From: a@b.com\nSubject: Mixed\nContent-Type: multipart/mixed; boundary=\"b1\"\n\nThis is a preamble\n--b1\nContent-Type: text/plain; charset=utf-8\nContent-Transfer-Encoding: base64\n\nSGVsbG8gd29ybGQ=\n--b1\nContent-Type: image/png\nContent-Transfer-Encoding: base64\n\niVBORw0KGgo=\n--b1--\nepilogue\n";

    fn render(msg: &Message) -> String {
        let mut out = Vec::new();
        msg.write_to(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_skip_envelope() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_envelope(data).starts_with(b"Subject:"));
        let data = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_envelope(data), data);
    }

    #[test]
    fn test_field_bytes() {
        assert_eq!(
            field_bytes(b"Subject: This is a long\r\n\tsubject line\r\n"),
            b"Subject: This is a long\n\tsubject line"
        );
        assert_eq!(field_bytes(b"X-Ok: yes\n"), b"X-Ok: yes");
    }

    #[test]
    fn test_parse_simple_message_roundtrips() {
        let raw = "Subject: Hi\nFrom: a@b.com\n\nHello\nWorld\n";
        let msg = parse_message(raw.as_bytes());
        let MimePart::Leaf(leaf) = &msg.root else {
            panic!("expected leaf");
        };
        assert!(leaf.content_type.is_text());
        assert_eq!(leaf.encoding(), &TransferEncoding::SevenBit);
        assert_eq!(render(&msg), raw);
    }

    #[test]
    fn test_folded_header_survives() {
        let raw = "Subject: This is a long\r\n\tsubject line\r\nFrom: user@example.com\r\n\r\nbody\r\n";
        let msg = parse_message(raw.as_bytes());
        assert_eq!(
            msg.headers().get("subject").as_deref(),
            Some("This is a long subject line")
        );
        assert!(render(&msg).starts_with("Subject: This is a long\n\tsubject line\nFrom:"));
    }

    #[test]
    fn test_headers_only_message() {
        let msg = parse_message(b"Subject: no body");
        assert_eq!(msg.subject().as_deref(), Some("no body"));
        let MimePart::Leaf(leaf) = &msg.root else {
            panic!("expected leaf");
        };
        assert!(leaf.body().is_empty());
    }

    #[test]
    fn test_parse_multipart_tree() {
        let msg = parse_message(MIXED.as_bytes());
        let MimePart::Multipart(multi) = &msg.root else {
            panic!("expected multipart");
        };
        assert_eq!(multi.boundary, "b1");
        assert_eq!(multi.preamble, b"This is a preamble");
        assert_eq!(multi.epilogue, b"epilogue\n");
        assert_eq!(multi.children.len(), 2);

        let MimePart::Leaf(text) = &multi.children[0] else {
            panic!("expected text leaf");
        };
        assert_eq!(&*text.content(), b"Hello world");
        assert_eq!(text.body(), b"SGVsbG8gd29ybGQ=");
        assert_eq!(text.encoding(), &TransferEncoding::Base64);

        let MimePart::Leaf(image) = &multi.children[1] else {
            panic!("expected image leaf");
        };
        assert_eq!(image.content_type.essence(), "image/png");
    }

    #[test]
    fn test_content_type_params_are_unquoted() {
        let raw = "Content-Type: Multipart/Mixed; boundary=\"a;b=c\"; charset=utf-8\n\n--a;b=c\n\nx\n--a;b=c--\n";
        let msg = parse_message(raw.as_bytes());
        let MimePart::Multipart(multi) = &msg.root else {
            panic!("expected multipart");
        };
        assert_eq!(multi.content_type.essence(), "multipart/mixed");
        assert_eq!(multi.boundary, "a;b=c");
        assert_eq!(multi.content_type.param("CHARSET"), Some("utf-8"));
    }

    #[test]
    fn test_malformed_content_type_defaults_to_text_plain() {
        let msg = parse_message(b"Content-Type: garbage\n\nbody\n");
        let MimePart::Leaf(leaf) = &msg.root else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.content_type.essence(), "text/plain");
    }

    #[test]
    fn test_multipart_roundtrip_keeps_structure() {
        let msg = parse_message(MIXED.as_bytes());
        let rendered = render(&msg);
        assert_eq!(rendered, MIXED);
        assert_eq!(parse_message(rendered.as_bytes()), msg);
    }

    #[test]
    fn test_parse_nested_message() {
        let raw = "Subject: Fwd\nContent-Type: message/rfc822\n\nSubject: Inner\nContent-Type: text/html\nContent-Transfer-Encoding: quoted-printable\n\n<p>caf=C3=A9</p>\n";
        let msg = parse_message(raw.as_bytes());
        let MimePart::Nested(nested) = &msg.root else {
            panic!("expected nested message");
        };
        assert_eq!(nested.message.subject().as_deref(), Some("Inner"));
        let MimePart::Leaf(inner) = &nested.message.root else {
            panic!("expected inner leaf");
        };
        assert_eq!(&*inner.content(), "<p>café</p>\n".as_bytes());
        assert_eq!(render(&msg), raw);
    }

    #[test]
    fn test_digest_children_default_to_messages() {
        let raw = "Content-Type: multipart/digest; boundary=d\n\n--d\n\nSubject: One\n\nfirst\n--d--\n";
        let msg = parse_message(raw.as_bytes());
        let MimePart::Multipart(multi) = &msg.root else {
            panic!("expected multipart");
        };
        assert!(matches!(multi.children[0], MimePart::Nested(_)));
    }

    #[test]
    fn test_missing_boundary_degrades_to_leaf() {
        let raw = "Content-Type: multipart/mixed; boundary=zz\n\nno delimiters here\n";
        let msg = parse_message(raw.as_bytes());
        assert!(matches!(msg.root, MimePart::Leaf(_)));
    }

    #[test]
    fn test_truncated_multipart_keeps_last_part() {
        let raw = "Content-Type: multipart/mixed; boundary=zz\n\n--zz\n\ncut off";
        let msg = parse_message(raw.as_bytes());
        let MimePart::Multipart(multi) = &msg.root else {
            panic!("expected multipart");
        };
        assert_eq!(multi.children.len(), 1);
        assert!(multi.epilogue.is_empty());
    }

    #[test]
    fn test_empty_header_block_is_a_plain_leaf() {
        let msg = parse_message(b"\njust some words");
        let MimePart::Leaf(leaf) = &msg.root else {
            panic!("expected leaf");
        };
        assert!(msg.headers().is_empty());
        assert_eq!(leaf.body(), b"just some words");
    }

    #[test]
    fn test_deep_nesting_is_bounded() {
        let mut raw = String::from("Subject: leaf\n\nbottom\n");
        for _ in 0..(MAX_DEPTH * 2) {
            raw = format!("Content-Type: message/rfc822\n\n{raw}");
        }
        let msg = parse_message(raw.as_bytes());
        assert!(matches!(msg.root, MimePart::Nested(_)));
    }
}
