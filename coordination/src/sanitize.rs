//! Reply cleanup for model output.
//!
//! Models in a multi-party chat tend to echo the transcript format back
//! (`[Name]: ...`), narrate actions (`*smiles*`, `(pauses)`), and wrap the
//! answer in quotes. `clean_reply` strips those artifacts so only the spoken
//! text is stored.

use std::sync::LazyLock;

use regex::Regex;

/// Backend provenance markers that survive cleanup.
static MARKER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(?:simulated:[^\]]*|fallback)\]\s*").expect("marker regex should compile")
});

/// `Someone says:` / `Fulano diz:` leaked at the start of a reply.
static SAYS_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[^:\n]{1,40}?\s(?:says|diz)\s*:\s*").expect("says regex should compile")
});

/// `[Anything]:` or `[Anything]` at the start of a reply.
static BRACKET_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[[^\]\n]*\]\s*:?\s*").expect("bracket prefix regex should compile")
});

/// Anonymous speaker labels such as `Entity 3:`.
static ENTITY_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)entity\s*\d+\s*:\s*").expect("entity regex should compile"));

static ASTERISK_NARRATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*[^*\n]*\*").expect("asterisk regex should compile"));

static PAREN_NARRATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)\n]*\)").expect("paren regex should compile"));

static BRACKET_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]\n]*\]").expect("bracket regex should compile"));

static QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["“”«»]"#).expect("quote regex should compile"));

static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("space regex should compile"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n+").expect("blank line regex should compile"));

/// Strip transcript artifacts from a model reply.
///
/// `speaker_name` is the persona's display name; a leading `Name:` echo is
/// removed. Returns an empty string when nothing speakable remains.
pub fn clean_reply(raw: &str, speaker_name: &str) -> String {
    let mut text = raw.trim();

    let marker = match MARKER_PREFIX.find(text) {
        Some(m) => {
            let marker = m.as_str().trim_end().to_string();
            text = &text[m.end()..];
            Some(marker)
        }
        None => None,
    };

    let mut body = strip_leading_labels(text, speaker_name);
    body = ENTITY_LABEL.replace_all(&body, "").into_owned();
    body = ASTERISK_NARRATION.replace_all(&body, "").into_owned();
    body = PAREN_NARRATION.replace_all(&body, "").into_owned();
    body = BRACKET_TAG.replace_all(&body, "").into_owned();
    body = QUOTES.replace_all(&body, "").into_owned();
    body = body.replace('*', "");
    body = INLINE_SPACE.replace_all(&body, " ").into_owned();
    body = BLANK_LINES.replace_all(&body, "\n\n").into_owned();

    let body = body
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    match marker {
        Some(marker) if !body.is_empty() => format!("{marker} {body}"),
        _ => body,
    }
}

/// Remove any stack of leading speaker labels (`[Name]:`, `Name:`, `X says:`).
fn strip_leading_labels(text: &str, speaker_name: &str) -> String {
    let mut current = text.trim_start().to_string();
    loop {
        let before = current.len();

        if let Some(rest) = strip_name_prefix(&current, speaker_name) {
            current = rest.to_string();
        }
        current = BRACKET_PREFIX.replace(&current, "").into_owned();
        current = SAYS_PREFIX.replace(&current, "").into_owned();
        current = current.trim_start().to_string();

        if current.len() == before {
            return current;
        }
    }
}

fn strip_name_prefix<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let name = name.trim();
    if name.is_empty() || text.len() < name.len() {
        return None;
    }
    let head = text.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    let rest = text[name.len()..].trim_start();
    rest.strip_prefix(':').map(str::trim_start)
}
