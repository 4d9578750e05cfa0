//! Structural safety gate over candidate capability source.
//!
//! Validation is fail-closed and runs in a fixed order, short-circuiting on
//! the first violation: parse, node-kind allow-list, import allow-list,
//! call deny-list, single-definition arity. The policy is an explicit
//! immutable value handed in at construction so tests can tighten or loosen
//! it without touching module state.
//!
//! Verdicts are never cached. A record fetched from the vault is
//! re-validated on every load because policy may have tightened since the
//! record was written.

use crate::core::ast::{self, NodeKind};
use crate::core::parser::{self, ParseError};
use std::collections::BTreeSet;
use std::fmt;

/// Why a candidate source was rejected. Carries the offending construct
/// where one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Syntax(ParseError),
    Structural { kind: &'static str },
    Import { module: String },
    Call { callee: String },
    Arity { found: usize },
}

impl RejectReason {
    /// Stable reason code, the taxonomy surfaced to callers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Syntax(_) => "SyntaxError",
            RejectReason::Structural { .. } => "StructuralViolation",
            RejectReason::Import { .. } => "ImportViolation",
            RejectReason::Call { .. } => "CallViolation",
            RejectReason::Arity { .. } => "ArityViolation",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Syntax(e) => write!(f, "SyntaxError: {e}"),
            RejectReason::Structural { kind } => {
                write!(f, "StructuralViolation: node kind {kind} is not allowed")
            }
            RejectReason::Import { module } => {
                write!(f, "ImportViolation: module '{module}' is not allowed")
            }
            RejectReason::Call { callee } => {
                write!(f, "CallViolation: call to '{callee}' is denied")
            }
            RejectReason::Arity { found } => write!(
                f,
                "ArityViolation: expected exactly 1 function definition, found {found}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected(reason) => Some(reason),
        }
    }
}

/// Metadata read off an accepted definition. Only meaningful after the
/// validator has accepted the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnMetadata {
    pub name: String,
    /// Parameters excluding the leading bound-context parameter.
    pub args: Vec<String>,
    pub has_return: bool,
    pub line_count: usize,
}

/// Immutable validation policy: which node kinds may appear, which module
/// roots may be imported, which bare callees are denied outright.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub allowed_kinds: BTreeSet<NodeKind>,
    pub allowed_modules: BTreeSet<String>,
    pub denied_callees: BTreeSet<String>,
}

impl SandboxPolicy {
    /// The stock policy: definitional, control-flow, expression, literal,
    /// operator, and access kinds only; a handful of pure computation
    /// modules; dynamic-execution and raw-I/O callees denied.
    pub fn baseline() -> Self {
        use NodeKind::*;
        let allowed_kinds = BTreeSet::from([
            Module, FunctionDef, Param, Return, Assign, ExprStmt, If, For, While, Break, Continue,
            Pass, Import, BoolOp, BinOp, UnaryOp, Compare, Call, Attribute, Index, Name, NumberLit,
            StringLit, FString, BoolLit, NoneLit, ListLit, DictLit,
        ]);
        let allowed_modules = [
            "math",
            "random",
            "datetime",
            "json",
            "hashlib",
            "itertools",
            "functools",
            "collections",
            "re",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let denied_callees = [
            "exec",
            "eval",
            "compile",
            "__import__",
            "open",
            "input",
            "raw_input",
            "file",
            "execfile",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        Self {
            allowed_kinds,
            allowed_modules,
            denied_callees,
        }
    }
}

pub struct SandboxValidator {
    policy: SandboxPolicy,
}

impl SandboxValidator {
    pub fn new(policy: SandboxPolicy) -> Self {
        Self { policy }
    }

    pub fn baseline() -> Self {
        Self::new(SandboxPolicy::baseline())
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Run the full check sequence. Fail-closed, first violation wins.
    pub fn validate(&self, source: &str) -> Verdict {
        let module = match parser::parse_module(source) {
            Ok(m) => m,
            Err(e) => return Verdict::Rejected(RejectReason::Syntax(e)),
        };

        let mut offending: Option<&'static str> = None;
        module.walk_kinds(&mut |kind| {
            if offending.is_none() && !self.policy.allowed_kinds.contains(&kind) {
                offending = Some(kind.as_str());
            }
        });
        if let Some(kind) = offending {
            return Verdict::Rejected(RejectReason::Structural { kind });
        }

        for root in module.import_roots() {
            if !self.policy.allowed_modules.contains(&root) {
                return Verdict::Rejected(RejectReason::Import { module: root });
            }
        }

        for callee in module.bare_callees() {
            if self.policy.denied_callees.contains(&callee) {
                return Verdict::Rejected(RejectReason::Call { callee });
            }
        }

        let found = module.function_defs().len();
        if found != 1 {
            return Verdict::Rejected(RejectReason::Arity { found });
        }

        Verdict::Accepted
    }

    /// Read the accepted definition's metadata. Re-parses rather than
    /// trusting any earlier verdict.
    pub fn extract_metadata(&self, source: &str) -> Result<FnMetadata, RejectReason> {
        let module = parser::parse_module(source).map_err(RejectReason::Syntax)?;
        let defs = module.function_defs();
        if defs.len() != 1 {
            return Err(RejectReason::Arity { found: defs.len() });
        }
        let def = defs[0];
        let args = if def.params.is_empty() {
            Vec::new()
        } else {
            def.params[1..].to_vec()
        };
        Ok(FnMetadata {
            name: def.name.clone(),
            args,
            has_return: ast::contains_return(&def.body),
            line_count: source.lines().count(),
        })
    }
}

/// Root module names declared by the source's imports, deduplicated and
/// sorted. Stored with the record as dependency tags; never enforced by
/// the store itself.
pub fn declared_dependencies(source: &str) -> Vec<String> {
    match parser::parse_module(source) {
        Ok(module) => {
            let mut roots = module.import_roots();
            roots.sort();
            roots.dedup();
            roots
        }
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFE: &str = "def greet(self, name):\n    return f'Hello, {name}!'\n";

    #[test]
    fn accepts_safe_definition() {
        let validator = SandboxValidator::baseline();
        assert!(validator.validate(SAFE).is_accepted());
    }

    #[test]
    fn unparseable_source_is_a_syntax_rejection() {
        let validator = SandboxValidator::baseline();
        let verdict = validator.validate("def broken(self:\n    return 1\n");
        assert_eq!(verdict.reject_reason().unwrap().code(), "SyntaxError");
    }

    #[test]
    fn lambda_is_a_structural_violation() {
        let validator = SandboxValidator::baseline();
        let verdict = validator.validate("def f(self, xs):\n    g = lambda x: x\n    return g\n");
        match verdict.reject_reason().unwrap() {
            RejectReason::Structural { kind } => assert_eq!(*kind, "Lambda"),
            other => panic!("expected structural violation, got {other}"),
        }
    }

    #[test]
    fn unused_bad_import_is_still_rejected() {
        let validator = SandboxValidator::baseline();
        let verdict = validator.validate("import os\ndef f(self):\n    return 1\n");
        match verdict.reject_reason().unwrap() {
            RejectReason::Import { module } => assert_eq!(module, "os"),
            other => panic!("expected import violation, got {other}"),
        }
    }

    #[test]
    fn nested_denied_call_is_rejected() {
        let src = "def f(self, xs):\n    for x in xs:\n        if x > 0:\n            eval('x')\n    return xs\n";
        let validator = SandboxValidator::baseline();
        match validator.validate(src).reject_reason().unwrap() {
            RejectReason::Call { callee } => assert_eq!(callee, "eval"),
            other => panic!("expected call violation, got {other}"),
        }
    }

    #[test]
    fn two_defs_violate_arity() {
        let src = "def a(self):\n    return 1\ndef b(self):\n    return 2\n";
        let validator = SandboxValidator::baseline();
        match validator.validate(src).reject_reason().unwrap() {
            RejectReason::Arity { found } => assert_eq!(*found, 2),
            other => panic!("expected arity violation, got {other}"),
        }
    }

    #[test]
    fn zero_defs_violate_arity() {
        let validator = SandboxValidator::baseline();
        match validator.validate("x = 1\n").reject_reason().unwrap() {
            RejectReason::Arity { found } => assert_eq!(*found, 0),
            other => panic!("expected arity violation, got {other}"),
        }
    }

    #[test]
    fn check_order_puts_structure_before_imports() {
        // Both violations present; the structural one must win.
        let src = "import os\ndef f(self):\n    g = lambda x: x\n    return g\n";
        let validator = SandboxValidator::baseline();
        assert_eq!(
            validator.validate(src).reject_reason().unwrap().code(),
            "StructuralViolation"
        );
    }

    #[test]
    fn policy_substitution_tightens_the_gate() {
        let mut policy = SandboxPolicy::baseline();
        policy.allowed_kinds.remove(&NodeKind::For);
        let validator = SandboxValidator::new(policy);
        let src = "def f(self, xs):\n    for x in xs:\n        pass\n    return xs\n";
        match validator.validate(src).reject_reason().unwrap() {
            RejectReason::Structural { kind } => assert_eq!(*kind, "For"),
            other => panic!("expected structural violation, got {other}"),
        }
        // Baseline still accepts the same source.
        assert!(SandboxValidator::baseline().validate(src).is_accepted());
    }

    #[test]
    fn metadata_skips_context_parameter() {
        let validator = SandboxValidator::baseline();
        let meta = validator.extract_metadata(SAFE).expect("metadata");
        assert_eq!(meta.name, "greet");
        assert_eq!(meta.args, vec!["name"]);
        assert!(meta.has_return);
        assert_eq!(meta.line_count, 2);
    }

    #[test]
    fn dependency_tags_are_sorted_unique_roots() {
        let src = "import math\nimport collections.abc\nimport math\ndef f(self):\n    return 1\n";
        assert_eq!(declared_dependencies(src), vec!["collections", "math"]);
    }
}
