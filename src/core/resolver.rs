//! Intent resolution: normalized text in, IntentSpec out.
//!
//! Resolution order is fixed: exact memory lookup, then the ordered rule
//! table, then the optional semantic matcher, then interactive teaching.
//! The rule table is grouped by category and evaluation stops at the first
//! pattern that matches anywhere in the normalized text, so rule order is
//! load-bearing.
//!
//! Deliberate quirk in the rule table: addition and
//! multiplication honor a captured count token ("add three numbers" takes
//! three arguments), while subtraction and division are always exactly two
//! arguments no matter what the instruction says. Tests pin this down;
//! do not "fix" it.

use crate::core::error::CapsmithError;
use crate::core::matcher::SemanticMatcher;
use crate::core::memory::IntentMemory;
use crate::core::spec::{IntentSpec, normalize_instruction};
use crate::core::teach::{Instructor, TeachingError};
use regex::{Captures, Regex};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Teaching(#[from] TeachingError),
    #[error(transparent)]
    Storage(#[from] CapsmithError),
}

/// Where a resolution came from. Surfaced in run envelopes and trace logs.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOrigin {
    Memory,
    Rule(&'static str),
    Semantic { prompt: String, score: f32 },
    Taught,
}

impl ResolutionOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            ResolutionOrigin::Memory => "memory",
            ResolutionOrigin::Rule(_) => "rule",
            ResolutionOrigin::Semantic { .. } => "semantic",
            ResolutionOrigin::Taught => "taught",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub spec: IntentSpec,
    pub normalized: String,
    pub origin: ResolutionOrigin,
}

pub struct Resolver<'a> {
    memory: &'a IntentMemory,
    matcher: Option<&'a SemanticMatcher>,
    instructor: Option<&'a dyn Instructor>,
}

impl<'a> Resolver<'a> {
    pub fn new(memory: &'a IntentMemory) -> Self {
        Self {
            memory,
            matcher: None,
            instructor: None,
        }
    }

    pub fn with_matcher(mut self, matcher: &'a SemanticMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn with_instructor(mut self, instructor: &'a dyn Instructor) -> Self {
        self.instructor = Some(instructor);
        self
    }

    pub fn resolve(&self, raw: &str) -> Result<Resolution, ResolveError> {
        let normalized = normalize_instruction(raw);

        if let Some(spec) = self.memory.lookup(&normalized)? {
            return Ok(Resolution {
                spec,
                normalized,
                origin: ResolutionOrigin::Memory,
            });
        }

        if let Some((category, spec)) = match_rules(&normalized) {
            return Ok(Resolution {
                spec,
                normalized,
                origin: ResolutionOrigin::Rule(category),
            });
        }

        if let Some(matcher) = self.matcher {
            let prompts = self.memory.prompts()?;
            if let Some(hit) = matcher.best_match(&normalized, &prompts) {
                if let Some(spec) = self.memory.lookup(&hit.prompt)? {
                    return Ok(Resolution {
                        spec,
                        normalized,
                        origin: ResolutionOrigin::Semantic {
                            prompt: hit.prompt,
                            score: hit.score,
                        },
                    });
                }
            }
        }

        let instructor = self.instructor.ok_or(TeachingError::Unavailable)?;
        let spec = instructor.teach(&normalized)?;
        // Persist before returning: the next identical instruction resolves
        // from memory without consulting the operator again.
        self.memory.insert_if_absent(&normalized, &spec)?;
        Ok(Resolution {
            spec,
            normalized,
            origin: ResolutionOrigin::Taught,
        })
    }
}

// ── Rule table ─────────────────────────────────────────────────────────

struct Rule {
    pattern: Regex,
    handler: fn(&Captures) -> IntentSpec,
}

struct RuleCategory {
    name: &'static str,
    rules: Vec<Rule>,
}

fn rule_table() -> &'static [RuleCategory] {
    static TABLE: OnceLock<Vec<RuleCategory>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let rule = |pattern: &str, handler: fn(&Captures) -> IntentSpec| Rule {
            pattern: Regex::new(pattern).unwrap(),
            handler,
        };
        vec![
            RuleCategory {
                name: "arithmetic",
                rules: vec![
                    rule(r"(add|sum|total)\s+(?:(\w+)\s+)?numbers?", handle_addition),
                    rule(
                        r"(multiply|product)\s+(?:(\w+)\s+)?numbers?",
                        handle_multiplication,
                    ),
                    rule(r"subtract\s+(?:(\w+)\s+)?numbers?", handle_subtraction),
                    rule(r"divide\s+(?:(\w+)\s+)?numbers?", handle_division),
                ],
            },
            RuleCategory {
                name: "list_operations",
                rules: vec![
                    rule(r"sort\s+(?:a\s)?list", handle_sort_list),
                    rule(
                        r"find\s+(?:the\s)?(max|maximum|min|minimum)\s+in\s+a\s+list",
                        handle_list_extremes,
                    ),
                    rule(r"reverse\s+(?:a\s)?list", handle_reverse_list),
                    rule(r"filter\s+list", handle_filter_list),
                ],
            },
            RuleCategory {
                name: "string_operations",
                rules: vec![
                    rule(r"reverse\s+string", handle_reverse_string),
                    rule(r"uppercase\s+string", handle_uppercase),
                    rule(r"lowercase\s+string", handle_lowercase),
                ],
            },
            RuleCategory {
                name: "comparisons",
                rules: vec![
                    rule(r"compare\s+two\s+numbers", handle_compare_numbers),
                    rule(r"check\s+if\s+equal", handle_check_equality),
                ],
            },
        ]
    })
}

/// First match anywhere in the normalized text wins; categories and rules
/// are scanned in table order.
fn match_rules(normalized: &str) -> Option<(&'static str, IntentSpec)> {
    for category in rule_table() {
        for rule in &category.rules {
            if let Some(caps) = rule.pattern.captures(normalized) {
                return Some((category.name, (rule.handler)(&caps)));
            }
        }
    }
    None
}

fn parse_count(token: Option<&str>) -> Option<usize> {
    match token? {
        "two" | "2" => Some(2),
        "three" | "3" => Some(3),
        "four" | "4" => Some(4),
        "five" | "5" => Some(5),
        "six" | "6" => Some(6),
        "seven" | "7" => Some(7),
        "eight" | "8" => Some(8),
        "nine" | "9" => Some(9),
        "ten" | "10" => Some(10),
        _ => None,
    }
}

/// Count-aware fold: `numN` argument names joined by the operator.
fn arithmetic_spec(operation: &str, count: usize, operator: &str) -> IntentSpec {
    let args: Vec<String> = (1..=count).map(|i| format!("num{i}")).collect();
    let body = format!("return {}", args.join(&format!(" {operator} ")));
    IntentSpec {
        name: operation.to_string(),
        args,
        body: vec![body],
    }
}

fn handle_addition(caps: &Captures) -> IntentSpec {
    let count = parse_count(caps.get(2).map(|m| m.as_str())).unwrap_or(2);
    arithmetic_spec("add", count, "+")
}

fn handle_multiplication(caps: &Captures) -> IntentSpec {
    let count = parse_count(caps.get(2).map(|m| m.as_str())).unwrap_or(2);
    arithmetic_spec("multiply", count, "*")
}

// Subtraction and division ignore any captured count. Two arguments, always.
fn handle_subtraction(_caps: &Captures) -> IntentSpec {
    IntentSpec::new("subtract", &["a", "b"], &["return a - b"])
}

fn handle_division(_caps: &Captures) -> IntentSpec {
    IntentSpec::new("divide", &["a", "b"], &["return a / b"])
}

fn handle_sort_list(_caps: &Captures) -> IntentSpec {
    IntentSpec::new("sort_list", &["input_list"], &["return sorted(input_list)"])
}

fn handle_list_extremes(caps: &Captures) -> IntentSpec {
    let op = if caps[1].starts_with("max") { "max" } else { "min" };
    IntentSpec {
        name: format!("find_{op}_in_list"),
        args: vec!["input_list".to_string()],
        body: vec![format!("return {op}(input_list)")],
    }
}

fn handle_reverse_list(_caps: &Captures) -> IntentSpec {
    IntentSpec::new(
        "reverse_list",
        &["input_list"],
        &["return reversed(input_list)"],
    )
}

fn handle_filter_list(_caps: &Captures) -> IntentSpec {
    IntentSpec::new(
        "filter_list",
        &["input_list"],
        &[
            "kept = []",
            "for item in input_list:",
            "    if item > 0:",
            "        kept = kept + [item]",
            "return kept",
        ],
    )
}

fn handle_reverse_string(_caps: &Captures) -> IntentSpec {
    IntentSpec::new(
        "reverse_string",
        &["input_str"],
        &["return reversed(input_str)"],
    )
}

fn handle_uppercase(_caps: &Captures) -> IntentSpec {
    IntentSpec::new(
        "to_uppercase",
        &["input_str"],
        &["return input_str.upper()"],
    )
}

fn handle_lowercase(_caps: &Captures) -> IntentSpec {
    IntentSpec::new(
        "to_lowercase",
        &["input_str"],
        &["return input_str.lower()"],
    )
}

fn handle_compare_numbers(_caps: &Captures) -> IntentSpec {
    IntentSpec::new(
        "compare_numbers",
        &["a", "b"],
        &[
            "if a == b:",
            "    return \"equal\"",
            "elif a > b:",
            "    return \"a > b\"",
            "else:",
            "    return \"a < b\"",
        ],
    )
}

fn handle_check_equality(_caps: &Captures) -> IntentSpec {
    IntentSpec::new("check_equality", &["a", "b"], &["return a == b"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::teach::ChannelInstructor;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn addition_defaults_to_two_arguments() {
        let (_, spec) = match_rules("add numbers").expect("rule");
        assert_eq!(spec.name, "add");
        assert_eq!(spec.args, vec!["num1", "num2"]);
        assert_eq!(spec.body, vec!["return num1 + num2"]);
    }

    #[test]
    fn addition_honors_count_token() {
        let (_, spec) = match_rules("sum three numbers").expect("rule");
        assert_eq!(spec.args, vec!["num1", "num2", "num3"]);
        assert_eq!(spec.body, vec!["return num1 + num2 + num3"]);
    }

    #[test]
    fn unrecognized_count_falls_back_to_two() {
        let (_, spec) = match_rules("add several numbers").expect("rule");
        assert_eq!(spec.args.len(), 2);
    }

    #[test]
    fn subtraction_ignores_count_token() {
        // Documented asymmetry: a count is captured but never honored.
        let (_, spec) = match_rules("subtract three numbers").expect("rule");
        assert_eq!(spec.name, "subtract");
        assert_eq!(spec.args, vec!["a", "b"]);
        assert_eq!(spec.body, vec!["return a - b"]);
    }

    #[test]
    fn division_is_always_binary() {
        let (_, spec) = match_rules("divide ten numbers").expect("rule");
        assert_eq!(spec.args, vec!["a", "b"]);
    }

    #[test]
    fn list_and_string_templates_resolve() {
        assert_eq!(match_rules("sort a list").unwrap().1.name, "sort_list");
        assert_eq!(
            match_rules("find the maximum in a list").unwrap().1.name,
            "find_max_in_list"
        );
        assert_eq!(
            match_rules("find min in a list").unwrap().1.name,
            "find_min_in_list"
        );
        assert_eq!(match_rules("reverse string").unwrap().1.name, "reverse_string");
        assert_eq!(match_rules("uppercase string").unwrap().1.name, "to_uppercase");
        assert_eq!(match_rules("check if equal").unwrap().1.name, "check_equality");
    }

    #[test]
    fn rule_order_breaks_overlaps() {
        // "reverse" appears in both the list and string categories; the
        // list category is scanned first, so the list rule wins.
        let (category, spec) = match_rules("reverse a list").expect("rule");
        assert_eq!(category, "list_operations");
        assert_eq!(spec.name, "reverse_list");
    }

    #[test]
    fn memory_wins_over_rules() {
        let tmp = tempdir().expect("tempdir");
        let memory = IntentMemory::open(tmp.path()).expect("open");
        let custom = IntentSpec::new("my_add", &["x", "y"], &["return x + y + 1"]);
        memory.insert_if_absent("add two numbers", &custom).expect("insert");

        let resolver = Resolver::new(&memory);
        let resolution = resolver.resolve("Add two numbers!").expect("resolve");
        assert_eq!(resolution.origin, ResolutionOrigin::Memory);
        assert_eq!(resolution.spec.name, "my_add");
    }

    #[test]
    fn teaching_persists_before_returning() {
        let tmp = tempdir().expect("tempdir");
        let memory = IntentMemory::open(tmp.path()).expect("open");
        let (tx, rx) = mpsc::channel();
        tx.send(IntentSpec::new("square", &["x"], &["return x * x"]))
            .expect("send");
        let instructor = ChannelInstructor::new(rx, Duration::from_secs(1));

        let resolver = Resolver::new(&memory).with_instructor(&instructor);
        let first = resolver.resolve("square a number").expect("resolve");
        assert_eq!(first.origin, ResolutionOrigin::Taught);

        // Resubmission resolves from memory; the empty channel would have
        // timed out if teaching were consulted again.
        let second = resolver.resolve("Square a number?").expect("resolve");
        assert_eq!(second.origin, ResolutionOrigin::Memory);
        assert_eq!(second.spec.name, "square");
    }

    #[test]
    fn teaching_timeout_leaves_no_memory_entry() {
        let tmp = tempdir().expect("tempdir");
        let memory = IntentMemory::open(tmp.path()).expect("open");
        let (_tx, rx) = mpsc::channel::<IntentSpec>();
        let instructor = ChannelInstructor::new(rx, Duration::from_millis(10));

        let resolver = Resolver::new(&memory).with_instructor(&instructor);
        let err = resolver.resolve("conjure a novelty").unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Teaching(TeachingError::TimedOut(_))
        ));
        assert!(memory.lookup("conjure a novelty").expect("lookup").is_none());
    }

    #[test]
    fn no_instructor_is_a_typed_failure() {
        let tmp = tempdir().expect("tempdir");
        let memory = IntentMemory::open(tmp.path()).expect("open");
        let resolver = Resolver::new(&memory);
        let err = resolver.resolve("conjure a novelty").unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Teaching(TeachingError::Unavailable)
        ));
    }
}
