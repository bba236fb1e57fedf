use crate::config::Validation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    TooShort,
    TooLong,
    Gibberish,
    ExcessiveRepetition,
    LowAlnumRatio,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::TooShort => "too short",
            RejectReason::TooLong => "too long",
            RejectReason::Gibberish => "gibberish",
            RejectReason::ExcessiveRepetition => "excessive repetition",
            RejectReason::LowAlnumRatio => "low alphanumeric ratio",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    Rejected { reason: RejectReason, detail: String },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected { reason, .. } => Some(*reason),
        }
    }

    fn reject(reason: RejectReason, detail: String) -> Self {
        Verdict::Rejected { reason, detail }
    }
}

/// Classify a generated description. Rules run in a fixed order and the first
/// failing rule decides the verdict.
pub fn validate(rules: &Validation, text: &str) -> Verdict {
    let text = text.trim();

    let chars = text.chars().count();
    if chars < rules.min_chars {
        return Verdict::reject(
            RejectReason::TooShort,
            format!("{chars} chars, minimum {}", rules.min_chars),
        );
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > rules.max_words {
        return Verdict::reject(
            RejectReason::TooLong,
            format!("{} words, maximum {}", words.len(), rules.max_words),
        );
    }

    if let Some(detail) = gibberish(rules, &words) {
        return Verdict::reject(RejectReason::Gibberish, detail);
    }

    if let Some(detail) = repetition(rules, &words) {
        return Verdict::reject(RejectReason::ExcessiveRepetition, detail);
    }

    let non_ws = text.chars().filter(|c| !c.is_whitespace()).count();
    let share = |n: usize| if non_ws == 0 { 0.0 } else { n as f32 / non_ws as f32 };
    let alnum = share(text.chars().filter(|c| c.is_alphanumeric()).count());
    if alnum < rules.min_alnum_ratio {
        return Verdict::reject(
            RejectReason::LowAlnumRatio,
            format!(
                "alphanumeric ratio {:.2}, minimum {:.2}",
                alnum, rules.min_alnum_ratio
            ),
        );
    }
    let alpha = share(text.chars().filter(|c| c.is_alphabetic()).count());
    if alpha < rules.min_alpha_ratio {
        return Verdict::reject(
            RejectReason::LowAlnumRatio,
            format!(
                "alphabetic ratio {:.2}, minimum {:.2}",
                alpha, rules.min_alpha_ratio
            ),
        );
    }

    Verdict::Accepted
}

fn gibberish(rules: &Validation, words: &[&str]) -> Option<String> {
    let cleaned: Vec<String> = words
        .iter()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| w.chars().count() > 1)
        .collect();

    if !cleaned.is_empty() {
        let total: usize = cleaned.iter().map(|w| w.chars().count()).sum();
        let avg = total as f32 / cleaned.len() as f32;
        if avg < rules.min_avg_word_length {
            return Some(format!("average word length {avg:.1} is too low"));
        }
        if avg > rules.max_avg_word_length {
            return Some(format!("average word length {avg:.1} is too high"));
        }
    }

    let alpha: Vec<&String> = cleaned
        .iter()
        .filter(|w| {
            w.chars().all(char::is_alphabetic) && w.chars().count() >= rules.vowel_check_min_len
        })
        .collect();
    if alpha.len() >= rules.vowel_check_min_words.max(1) {
        let vowelless = alpha.iter().filter(|w| !w.chars().any(is_vowel)).count();
        let ratio = vowelless as f32 / alpha.len() as f32;
        if ratio > rules.max_vowelless_ratio {
            return Some(format!(
                "{vowelless} of {} words have no vowels",
                alpha.len()
            ));
        }
    }

    None
}

fn is_vowel(c: char) -> bool {
    // Non-ASCII letters are mostly accented vowels or non-Latin scripts.
    !c.is_ascii() || matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u' | 'y')
}

fn repetition(rules: &Validation, words: &[&str]) -> Option<String> {
    let tokens: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

    if tokens.len() >= rules.repetition_min_tokens.max(1) {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for t in &tokens {
            *counts.entry(t.as_str()).or_insert(0) += 1;
        }
        let (top, n) = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(t, n)| (*t, *n))
            .unwrap_or(("", 0));
        let share = n as f32 / tokens.len() as f32;
        if share > rules.max_token_fraction {
            return Some(format!(
                "'{top}' is {:.0}% of {} words",
                share * 100.0,
                tokens.len()
            ));
        }
    }

    for n in 1..=rules.max_ngram {
        if let Some((at, run)) = contiguous_run(&tokens, n, rules.max_contiguous_repeats) {
            return Some(format!(
                "'{}' repeats {run} times in a row",
                tokens[at..at + n].join(" ")
            ));
        }
    }

    None
}

/// First n-gram that repeats back to back more than `limit` times, as
/// `(start, run length)`.
fn contiguous_run(tokens: &[String], n: usize, limit: usize) -> Option<(usize, usize)> {
    if n == 0 || tokens.len() < n * 2 {
        return None;
    }
    for i in 0..=tokens.len() - n {
        let gram = &tokens[i..i + n];
        let mut run = 1;
        let mut j = i + n;
        while j + n <= tokens.len() && &tokens[j..j + n] == gram {
            run += 1;
            j += n;
        }
        if run > limit {
            return Some((i, run));
        }
    }
    None
}
