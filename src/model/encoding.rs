//! Content-Transfer-Encoding tags and the codecs behind them.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use tracing::warn;

/// Maximum encoded line length for base64 and quoted-printable (RFC 2045 §6.7/§6.8).
const MAX_LINE_LEN: usize = 76;

/// Decoder used for message bodies: ignores padding and stray trailing bits,
/// both of which are common in real-world mail.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// The transfer encoding of a MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
    /// Anything else (`x-uuencode`, typos, ...). The body is kept verbatim.
    Other(String),
}

impl TransferEncoding {
    /// Parse a `Content-Transfer-Encoding` header value. Absent means `7bit`.
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::SevenBit;
        };
        let token = value.trim().trim_matches('"').to_ascii_lowercase();
        match token.as_str() {
            "" | "7bit" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            "quoted-printable" => Self::QuotedPrintable,
            "base64" => Self::Base64,
            _ => Self::Other(token),
        }
    }

    /// Header token for this encoding.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::QuotedPrintable => "quoted-printable",
            Self::Base64 => "base64",
            Self::Other(s) => s,
        }
    }

    /// Encodings whose bodies are the content bytes themselves.
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::SevenBit | Self::EightBit | Self::Binary)
    }

    /// Turn an encoded body into raw content bytes.
    pub fn decode(&self, body: &[u8]) -> Vec<u8> {
        match self {
            Self::Base64 => decode_base64(body),
            Self::QuotedPrintable => decode_quoted_printable(body),
            _ => body.to_vec(),
        }
    }

    /// Encode raw content bytes for the wire.
    pub fn encode(&self, content: &[u8]) -> Vec<u8> {
        match self {
            Self::Base64 => encode_base64(content),
            Self::QuotedPrintable => encode_quoted_printable(content),
            _ => content.to_vec(),
        }
    }
}

impl std::fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn decode_base64(body: &[u8]) -> Vec<u8> {
    let mut cleaned: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
        .collect();
    // A single dangling sextet cannot encode a byte.
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }
    match LENIENT_BASE64.decode(&cleaned) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Undecodable base64 body, keeping it verbatim");
            body.to_vec()
        }
    }
}

fn encode_base64(content: &[u8]) -> Vec<u8> {
    let encoded = STANDARD.encode(content);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LEN + 1);
    for line in encoded.as_bytes().chunks(MAX_LINE_LEN) {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    out
}

/// Decode quoted-printable with `mail-parser`'s decoder, keeping the body
/// verbatim when it is malformed.
fn decode_quoted_printable(body: &[u8]) -> Vec<u8> {
    match quoted_printable_decode(body) {
        Some(bytes) => bytes,
        None => {
            warn!("Undecodable quoted-printable body, keeping it verbatim");
            body.to_vec()
        }
    }
}

/// Encode as quoted-printable, keeping existing line breaks as hard breaks.
///
/// A `\r` before a line break is escaped as `=0D`, so CRLF content survives.
fn encode_quoted_printable(content: &[u8]) -> Vec<u8> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = Vec::with_capacity(content.len() + content.len() / 8);
    let mut line_len = 0;

    let mut lines = content.split(|&b| b == b'\n').peekable();
    while let Some(line) = lines.next() {
        for (idx, &b) in line.iter().enumerate() {
            let last = idx + 1 == line.len();
            let literal = match b {
                b'=' => false,
                b' ' | b'\t' => !last,
                33..=126 => true,
                _ => false,
            };
            let width = if literal { 1 } else { 3 };
            if line_len + width > MAX_LINE_LEN - 1 {
                out.extend_from_slice(b"=\n");
                line_len = 0;
            }
            if literal {
                out.push(b);
            } else {
                out.extend_from_slice(&[b'=', HEX[(b >> 4) as usize], HEX[(b & 0x0F) as usize]]);
            }
            line_len += width;
        }
        if lines.peek().is_some() {
            out.push(b'\n');
            line_len = 0;
        }
    }
    out
}
