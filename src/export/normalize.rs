//! Content normalization applied to every message before it is archived.

use crate::model::encoding::TransferEncoding;
use crate::model::mime::MimePart;

/// Rewrite every textual leaf of the tree under `part` to `8bit`, so that
/// archived bodies are human-readable instead of base64 or quoted-printable.
///
/// Multipart children are visited in order and embedded messages are
/// descended into. Non-text leaves are left alone: re-encoding binary
/// content as 8-bit could corrupt it.
///
/// The walk uses an explicit stack, so arbitrarily deep trees are safe.
pub fn normalize(part: &mut MimePart) {
    let mut stack: Vec<&mut MimePart> = vec![part];

    while let Some(part) = stack.pop() {
        match part {
            MimePart::Multipart(multi) => stack.extend(multi.children.iter_mut().rev()),
            MimePart::Nested(nested) => stack.push(&mut nested.message.root),
            MimePart::Leaf(leaf) => {
                if leaf.content_type.is_text() {
                    leaf.set_encoding(TransferEncoding::EightBit);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mime::{LeafPart, Message};
    use crate::parser::mime::parse_message;

    fn leaves(part: &MimePart) -> Vec<&LeafPart> {
        match part {
            MimePart::Leaf(leaf) => vec![leaf],
            MimePart::Multipart(multi) => multi.children.iter().flat_map(leaves).collect(),
            MimePart::Nested(nested) => leaves(&nested.message.root),
        }
    }

    fn normalized(raw: &str) -> Message {
        let mut msg = parse_message(raw.as_bytes());
        normalize(&mut msg.root);
        msg
    }

    #[test]
    fn test_text_leaf_becomes_8bit() {
        let msg = normalized(
            "Content-Type: text/plain\nContent-Transfer-Encoding: quoted-printable\n\ncaf=C3=A9\n",
        );
        let leaf = leaves(&msg.root)[0];
        assert_eq!(leaf.encoding(), &TransferEncoding::EightBit);
        assert_eq!(
            msg.headers().get("content-transfer-encoding").as_deref(),
            Some("8bit")
        );
    }

    #[test]
    fn test_message_without_headers_is_text_plain() {
        let msg = normalized("\njust a body\n");
        assert_eq!(leaves(&msg.root)[0].encoding(), &TransferEncoding::EightBit);
    }

    #[test]
    fn test_only_textual_leaves_change() {
        let raw = "Content-Type: multipart/mixed; boundary=b\n\n--b\nContent-Type: text/html\nContent-Transfer-Encoding: base64\n\nPGI+aGk8L2I+\n--b\nContent-Type: application/pdf\nContent-Transfer-Encoding: base64\n\nJVBERi0=\n--b\nContent-Type: message/rfc822\n\nContent-Type: multipart/alternative; boundary=c\n\n--c\nContent-Type: text/plain\nContent-Transfer-Encoding: base64\n\naGk=\n--c\nContent-Type: image/gif\nContent-Transfer-Encoding: base64\n\nR0lGOA==\n--c--\n--b--\n";
        let before = parse_message(raw.as_bytes());
        let after = normalized(raw);

        let before_leaves = leaves(&before.root);
        let after_leaves = leaves(&after.root);
        assert_eq!(after_leaves.len(), 4);

        for (b, a) in before_leaves.iter().zip(&after_leaves) {
            if a.content_type.is_text() {
                assert_eq!(a.encoding(), &TransferEncoding::EightBit);
                assert_eq!(a.content(), b.content());
            } else {
                assert_eq!(*a, *b);
            }
        }
    }

    #[test]
    fn test_deeply_nested_tree() {
        let mut part = MimePart::Leaf(LeafPart::new(
            Default::default(),
            Default::default(),
            TransferEncoding::Base64,
            b"deep".to_vec(),
        ));
        for _ in 0..10_000 {
            part = MimePart::Nested(crate::model::mime::NestedPart {
                headers: Default::default(),
                message: Box::new(Message::new(part)),
            });
        }
        normalize(&mut part);

        let mut cursor = &part;
        while let MimePart::Nested(nested) = cursor {
            cursor = &nested.message.root;
        }
        let MimePart::Leaf(leaf) = cursor else {
            unreachable!()
        };
        assert_eq!(leaf.encoding(), &TransferEncoding::EightBit);

        // Unwind iteratively; the derived drop would recurse 10k frames deep.
        let mut current = part;
        while let MimePart::Nested(nested) = current {
            current = nested.message.root;
        }
    }
}
