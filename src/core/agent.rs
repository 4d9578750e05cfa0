//! The live agent object and its capability registry.
//!
//! "Attaching a method" is an insert into a per-agent name→callable map
//! consulted at invocation time; no object-model mutation is involved.
//! Binding replaces any previous capability under the same name in one
//! registry operation, so an invoker sees either the old behavior or the
//! new one, never a half-replaced state.

use crate::core::interp::{EvalError, Program, Value};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    #[error("agent has no capability named '{0}'")]
    Unknown(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// A fully compiled capability attached to one agent.
#[derive(Debug, Clone)]
pub struct BoundCapability {
    pub name: String,
    pub params: Vec<String>,
    pub program: Program,
}

pub struct Agent {
    name: String,
    registry: Mutex<FxHashMap<String, Arc<BoundCapability>>>,
    // One active orchestrator run per agent; see Orchestrator::run_instruction.
    run_gate: Mutex<()>,
}

impl Agent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            registry: Mutex::new(FxHashMap::default()),
            run_gate: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a capability, replacing any previous binding under the same
    /// name. All-or-nothing: callers only reach this with a fully compiled
    /// program in hand.
    pub fn bind(&self, capability: BoundCapability) {
        let mut registry = self.registry.lock().unwrap();
        registry.insert(capability.name.clone(), Arc::new(capability));
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.registry.lock().unwrap().contains_key(name)
    }

    pub fn capability(&self, name: &str) -> Option<Arc<BoundCapability>> {
        self.registry.lock().unwrap().get(name).cloned()
    }

    pub fn capability_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn unbind(&self, name: &str) -> bool {
        self.registry.lock().unwrap().remove(name).is_some()
    }

    /// Invoke a bound capability by name. The registry lock is released
    /// before evaluation so a long-running capability does not block
    /// unrelated lookups.
    pub fn invoke(
        &self,
        name: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<Value, InvokeError> {
        let capability = self
            .capability(name)
            .ok_or_else(|| InvokeError::Unknown(name.to_string()))?;
        Ok(capability.program.invoke(args, kwargs)?)
    }

    /// Serialize orchestrator runs targeting this agent.
    pub fn acquire_run_slot(&self) -> MutexGuard<'_, ()> {
        self.run_gate.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interp::Program;
    use crate::core::parser::parse_module;

    fn capability(src: &str) -> BoundCapability {
        let module = parse_module(src).expect("parse");
        let program = Program::compile(&module).expect("compile");
        BoundCapability {
            name: program.name().to_string(),
            params: program.params().to_vec(),
            program,
        }
    }

    #[test]
    fn bind_then_invoke_by_name() {
        let agent = Agent::new("tama");
        agent.bind(capability("def add(self, a, b):\n    return a + b\n"));
        assert!(agent.has_capability("add"));
        let out = agent
            .invoke("add", &[Value::Int(3), Value::Int(5)], &[])
            .expect("invoke");
        assert_eq!(out, Value::Int(8));
    }

    #[test]
    fn unknown_capability_is_a_typed_error() {
        let agent = Agent::new("tama");
        let err = agent.invoke("missing", &[], &[]).unwrap_err();
        assert_eq!(err, InvokeError::Unknown("missing".to_string()));
    }

    #[test]
    fn rebinding_replaces_behavior_for_this_agent_only() {
        let a = Agent::new("a");
        let b = Agent::new("b");
        a.bind(capability("def add(self, a, b):\n    return a + b\n"));
        b.bind(capability("def add(self, a, b):\n    return a + b\n"));

        a.bind(capability("def add(self, a, b):\n    return a + b + 100\n"));
        let from_a = a.invoke("add", &[Value::Int(1), Value::Int(2)], &[]).unwrap();
        let from_b = b.invoke("add", &[Value::Int(1), Value::Int(2)], &[]).unwrap();
        assert_eq!(from_a, Value::Int(103));
        assert_eq!(from_b, Value::Int(3));
    }

    #[test]
    fn capability_names_are_sorted() {
        let agent = Agent::new("tama");
        agent.bind(capability("def zeta(self):\n    return 1\n"));
        agent.bind(capability("def alpha(self):\n    return 2\n"));
        assert_eq!(agent.capability_names(), vec!["alpha", "zeta"]);
    }
}
