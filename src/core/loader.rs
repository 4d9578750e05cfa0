//! Capability loader: from stored hash to a bound callable.
//!
//! Defense in depth is the point of this module. A record in the vault may
//! predate a policy tightening, so the stored source is pushed through the
//! full validator again on every load; acceptance is never cached. The
//! bind itself is atomic: the agent registry is only touched after the
//! program has compiled.

use crate::core::agent::{Agent, BoundCapability};
use crate::core::error::CapsmithError;
use crate::core::interp::Program;
use crate::core::parser;
use crate::core::sandbox::{RejectReason, SandboxValidator, Verdict};
use crate::core::store::CapabilityStore;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no capability stored under hash {0}")]
    Miss(String),
    #[error("stored source failed re-validation: {0}")]
    Rejected(RejectReason),
    #[error("attachment failed: {0}")]
    Attachment(String),
    #[error(transparent)]
    Storage(#[from] CapsmithError),
}

pub struct CapabilityLoader<'a> {
    store: &'a CapabilityStore,
    validator: &'a SandboxValidator,
}

impl<'a> CapabilityLoader<'a> {
    pub fn new(store: &'a CapabilityStore, validator: &'a SandboxValidator) -> Self {
        Self { store, validator }
    }

    /// Retrieve, re-validate, compile, and bind. Returns the bound name.
    /// On any failure the target agent is left exactly as it was.
    pub fn load(&self, hash: &str, target: &Agent) -> Result<String, LoadError> {
        let record = self
            .store
            .retrieve(hash)?
            .ok_or_else(|| LoadError::Miss(hash.to_string()))?;

        if let Verdict::Rejected(reason) = self.validator.validate(&record.source) {
            return Err(LoadError::Rejected(reason));
        }
        let meta = self
            .validator
            .extract_metadata(&record.source)
            .map_err(LoadError::Rejected)?;

        let module =
            parser::parse_module(&record.source).map_err(|e| LoadError::Attachment(e.to_string()))?;
        let program =
            Program::compile(&module).map_err(|e| LoadError::Attachment(e.to_string()))?;

        target.bind(BoundCapability {
            name: meta.name.clone(),
            params: meta.args,
            program,
        });
        Ok(meta.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::NodeKind;
    use crate::core::interp::Value;
    use crate::core::sandbox::SandboxPolicy;
    use tempfile::tempdir;

    #[test]
    fn load_binds_under_extracted_name() {
        let tmp = tempdir().expect("tempdir");
        let store = CapabilityStore::open(tmp.path()).expect("open");
        let validator = SandboxValidator::baseline();
        let hash = store
            .store("def double(self, x):\n    return x * 2\n", &[])
            .expect("store");

        let agent = Agent::new("tama");
        let loader = CapabilityLoader::new(&store, &validator);
        let name = loader.load(&hash, &agent).expect("load");
        assert_eq!(name, "double");
        let out = agent.invoke("double", &[Value::Int(21)], &[]).expect("invoke");
        assert_eq!(out, Value::Int(42));
    }

    #[test]
    fn unknown_hash_is_a_miss() {
        let tmp = tempdir().expect("tempdir");
        let store = CapabilityStore::open(tmp.path()).expect("open");
        let validator = SandboxValidator::baseline();
        let agent = Agent::new("tama");
        let loader = CapabilityLoader::new(&store, &validator);
        let err = loader.load("deadbeef", &agent).unwrap_err();
        assert!(matches!(err, LoadError::Miss(_)));
    }

    #[test]
    fn tightened_policy_rejects_a_stored_record_without_binding() {
        let tmp = tempdir().expect("tempdir");
        let store = CapabilityStore::open(tmp.path()).expect("open");
        let src = "def count(self, xs):\n    n = 0\n    for x in xs:\n        n = n + 1\n    return n\n";
        let hash = store.store(src, &[]).expect("store");

        // The record was accepted under the baseline policy; loading under
        // a stricter one must fail and leave the agent untouched.
        let mut policy = SandboxPolicy::baseline();
        policy.allowed_kinds.remove(&NodeKind::For);
        let strict = SandboxValidator::new(policy);

        let agent = Agent::new("tama");
        let loader = CapabilityLoader::new(&store, &strict);
        let err = loader.load(&hash, &agent).unwrap_err();
        assert!(matches!(err, LoadError::Rejected(RejectReason::Structural { .. })));
        assert!(!agent.has_capability("count"));
    }
}
