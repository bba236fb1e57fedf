use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

fn think_block() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").ok())
        .as_ref()
}

/// Normalize raw model output before it is validated and written.
pub fn normalize_response(raw: &str) -> String {
    let mut s = raw.replace("\r\n", "\n");
    if let Some(re) = think_block() {
        s = re.replace_all(&s, "").into_owned();
    }
    s = s.nfc().collect::<String>();
    s = strip_code_fences(&s);

    s.lines()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Some models wrap the whole answer in a ``` block.
fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let mut inner = Vec::new();
    let mut in_block = false;
    for line in trimmed.lines() {
        if line.starts_with("```") {
            if in_block {
                break;
            }
            in_block = true;
            continue;
        }
        if in_block {
            inner.push(line);
        }
    }

    if inner.is_empty() {
        trimmed.to_string()
    } else {
        inner.join("\n")
    }
}
