//! Intent specification: the structured form an instruction is resolved into
//! before any source text exists.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Structured description of a capability: a name, ordered parameter
/// identifiers, and the body as ordered statement lines. There is no
/// implicit context parameter here; the synthesizer prepends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSpec {
    pub name: String,
    pub args: Vec<String>,
    pub body: Vec<String>,
}

impl IntentSpec {
    pub fn new(name: &str, args: &[&str], body: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            body: body.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Canonicalize raw instruction text: case-fold, drop everything that is not
/// a word character or whitespace, collapse whitespace runs to one space.
pub fn normalize_instruction(raw: &str) -> String {
    static STRIP: OnceLock<Regex> = OnceLock::new();
    static SQUASH: OnceLock<Regex> = OnceLock::new();
    let strip = STRIP.get_or_init(|| Regex::new(r"[^\w\s]").unwrap());
    let squash = SQUASH.get_or_init(|| Regex::new(r"\s+").unwrap());

    let lowered = raw.to_lowercase();
    let stripped = strip.replace_all(&lowered, "");
    squash.replace_all(stripped.trim(), " ").to_string()
}
