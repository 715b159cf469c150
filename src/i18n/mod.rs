//! Localized strings for CLI output and generated file names.
//!
//! English is the default language; Spanish is available as an alternative.

use std::sync::OnceLock;

static CURRENT_LANG: OnceLock<Lang> = OnceLock::new();

/// Supported languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    /// English (default)
    En,
    /// Spanish
    Es,
}

impl Lang {
    /// Parse a language code such as `en`, `es_ES` or `es-MX`.
    pub fn from_code(code: &str) -> Option<Self> {
        let normalized = code.to_lowercase();
        match normalized.split(['_', '-', '.']).next().unwrap_or("") {
            "en" => Some(Self::En),
            "es" => Some(Self::Es),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }
}

/// Set the process-wide language. Only the first call has an effect.
pub fn set_lang(lang: Lang) {
    let _ = CURRENT_LANG.set(lang);
}

/// Current language, English until [`set_lang`] is called.
pub fn lang() -> Lang {
    CURRENT_LANG.get().copied().unwrap_or(Lang::En)
}

/// Detect the language from `MBOXSAVE_LANG`, `LC_MESSAGES`, then `LANG`.
pub fn detect_system_lang() -> Lang {
    ["MBOXSAVE_LANG", "LC_MESSAGES", "LANG"]
        .iter()
        .find_map(|var| std::env::var(var).ok().and_then(|v| Lang::from_code(&v)))
        .unwrap_or(Lang::En)
}

macro_rules! msg {
    ($name:ident, $en:expr, $es:expr) => {
        pub fn $name() -> &'static str {
            match lang() {
                Lang::En => $en,
                Lang::Es => $es,
            }
        }
    };
}

/// Base file name for an archive whose first message has no subject.
pub fn generic_message_name(count: usize) -> &'static str {
    match (lang(), count) {
        (Lang::En, 1) => "Message",
        (Lang::En, _) => "Messages",
        (Lang::Es, 1) => "Mensaje",
        (Lang::Es, _) => "Mensajes",
    }
}

/// Progress bar label for a save of `count` messages.
pub fn saving_messages(count: usize) -> String {
    match (lang(), count) {
        (Lang::En, 1) => "Saving 1 message".to_string(),
        (Lang::En, n) => format!("Saving {n} messages"),
        (Lang::Es, 1) => "Guardando 1 mensaje".to_string(),
        (Lang::Es, n) => format!("Guardando {n} mensajes"),
    }
}

// ── General ──────────────────────────────────────────────────────

msg!(
    app_about,
    "mboxsave: save messages from a mail folder into a single mbox archive.",
    "mboxsave: guarda mensajes de una carpeta de correo en un \u{fa}nico archivo mbox."
);

// ── CLI help strings ─────────────────────────────────────────────

msg!(
    help_cmd_save,
    "Save messages to an mbox file",
    "Guardar mensajes en un fichero mbox"
);
msg!(
    help_cmd_suggest,
    "Print the suggested archive file name",
    "Mostrar el nombre de fichero sugerido"
);
msg!(
    help_cmd_list,
    "List message identifiers and subjects",
    "Listar identificadores y asuntos de los mensajes"
);

// ── CLI output ───────────────────────────────────────────────────

msg!(msg_save_complete, "Save complete", "Guardado completado");
msg!(msg_messages, "Messages", "Mensajes");
msg!(msg_output_size, "Output size", "Tama\u{f1}o de salida");
msg!(msg_output_file, "Output file", "Fichero de salida");
msg!(msg_elapsed, "Elapsed", "Tiempo");
msg!(
    msg_cancelled,
    "Save cancelled; the archive holds the messages written so far.",
    "Guardado cancelado; el archivo contiene los mensajes escritos hasta ahora."
);
msg!(msg_no_messages, "No messages found.", "No se encontraron mensajes.");

// ── Errors ───────────────────────────────────────────────────────

msg!(
    err_store_not_found,
    "Message folder not found",
    "No se encontr\u{f3} la carpeta de mensajes"
);
msg!(
    err_save_failed,
    "Could not save messages",
    "No se pudieron guardar los mensajes"
);
