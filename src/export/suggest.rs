//! Default file name offered for a new archive.

use crate::i18n;
use crate::store::MessageStore;

/// Longest subject-derived base name, in characters.
const MAX_BASE_LEN: usize = 120;

/// Suggest a file name for saving `uids` from `store`.
///
/// The first message's subject is used when it has one; otherwise a
/// localized "Message" or "Messages" depending on how many are saved.
/// `extension` may be given with or without its leading dot.
pub fn suggest_filename(store: &dyn MessageStore, uids: &[String], extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    let base = uids
        .first()
        .and_then(|uid| store.subject(uid))
        .map(|subject| sanitize_filename_part(&subject, MAX_BASE_LEN))
        .filter(|base| !base.is_empty())
        .unwrap_or_else(|| i18n::generic_message_name(uids.len()).to_string());

    if extension.is_empty() {
        base
    } else {
        format!("{base}.{extension}")
    }
}

/// Make `s` safe as a single path component.
///
/// Path separators, control characters and characters reserved on Windows
/// become `_`; runs of whitespace collapse to one space; leading and
/// trailing dots and spaces are dropped.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_len));
    let mut last_space = false;

    for c in s.chars() {
        if out.chars().count() >= max_len {
            break;
        }
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
            continue;
        }
        last_space = false;
        let safe = match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        };
        out.push(safe);
    }

    out.trim_matches(|c| c == '.' || c == ' ').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn uids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanitize_filename_part() {
        assert_eq!(sanitize_filename_part("Re: Budget 2024", 50), "Re_ Budget 2024");
        assert_eq!(sanitize_filename_part("a/b\\c*d", 20), "a_b_c_d");
        assert_eq!(sanitize_filename_part("  tabs\tand\n\nnewlines ", 50), "tabs and newlines");
        assert_eq!(sanitize_filename_part("...", 20), "");
        assert_eq!(sanitize_filename_part("caf\u{e9} \u{2603}", 20), "caf\u{e9} \u{2603}");
        assert_eq!(sanitize_filename_part("abcdef", 3), "abc");
    }

    #[test]
    fn test_suggest_uses_first_subject() {
        let mut store = MemoryStore::new();
        store.insert("1", "Subject: =?UTF-8?Q?Caf=C3=A9_plans?=\n\nx\n");
        store.insert("2", "Subject: other\n\ny\n");
        assert_eq!(
            suggest_filename(&store, &uids(&["1", "2"]), "mbox"),
            "Caf\u{e9} plans.mbox"
        );
    }

    #[test]
    fn test_suggest_generic_name() {
        let mut store = MemoryStore::new();
        store.insert("1", "From: a@example.com\n\nno subject\n");
        store.insert("2", "Subject:   \n\nblank subject\n");

        assert_eq!(suggest_filename(&store, &uids(&["1"]), ".mbox"), "Message.mbox");
        assert_eq!(
            suggest_filename(&store, &uids(&["2", "1"]), "mbox"),
            "Messages.mbox"
        );
        assert_eq!(suggest_filename(&store, &uids(&["missing"]), "mbox"), "Message.mbox");
    }

    #[test]
    fn test_suggest_without_extension() {
        let mut store = MemoryStore::new();
        store.insert("1", "Subject: hello\n\nx\n");
        assert_eq!(suggest_filename(&store, &uids(&["1"]), ""), "hello");
    }
}
