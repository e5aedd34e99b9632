use regex::{Regex, RegexBuilder};
use sha2::{Digest, Sha256};
use tracing::warn;

use pagewatch_common::ScrubPattern;

const ZERO_WIDTH: [char; 4] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

/// Scrubbed, normalized page text plus its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub text: String,
    pub digest: String,
}

/// Strip zero-width characters, collapse whitespace runs to one space, trim.
pub fn normalize(text: &str) -> String {
    let visible: String = text.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect();
    visible.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Delete every match of each pattern, in order. Bad patterns are skipped.
pub fn scrub(text: &str, patterns: &[ScrubPattern]) -> String {
    let mut out = text.to_string();
    for pattern in patterns {
        if let Some(re) = compile(pattern) {
            out = re.replace_all(&out, "").into_owned();
        }
    }
    out
}

/// Lowercase hex SHA-256 of the UTF-8 bytes.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Scrub, then normalize, then hash. The order matters: patterns see raw whitespace.
pub fn fingerprint_content(raw: &str, patterns: &[ScrubPattern]) -> Fingerprint {
    let text = normalize(&scrub(raw, patterns));
    let digest = fingerprint(&text);
    Fingerprint { text, digest }
}

fn compile(pattern: &ScrubPattern) -> Option<Regex> {
    let mut builder = RegexBuilder::new(&pattern.pattern);
    for flag in pattern.flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'U' => builder.swap_greed(true),
            'g' => &mut builder,
            other => {
                warn!(pattern = %pattern.pattern, flag = %other, "Ignoring unknown scrub flag");
                &mut builder
            }
        };
    }

    match builder.build() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(pattern = %pattern.pattern, error = %e, "Skipping invalid scrub pattern");
            None
        }
    }
}
