//! One instruction, one sequential run:
//! resolve → synthesize → validate → store → load → invoke.
//!
//! Strictly ordered, no automatic retries. The first stage failure aborts
//! everything after it and is surfaced verbatim with the stage it happened
//! in. Runs targeting the same agent are serialized through the agent's
//! run gate; the store can serve many agents concurrently because its own
//! writes are transactional.

use crate::core::agent::{Agent, InvokeError};
use crate::core::error::CapsmithError;
use crate::core::interp::Value;
use crate::core::loader::{CapabilityLoader, LoadError};
use crate::core::matcher::SemanticMatcher;
use crate::core::memory::IntentMemory;
use crate::core::resolver::{Resolution, ResolveError, Resolver};
use crate::core::sandbox::{RejectReason, SandboxValidator, Verdict};
use crate::core::store::CapabilityStore;
use crate::core::teach::Instructor;
use crate::core::trace::RunRecorder;
use crate::core::{sandbox, synth, time};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Synthesizing,
    Validating,
    Storing,
    Loading,
    Invoking,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolving => "resolving",
            Stage::Synthesizing => "synthesizing",
            Stage::Validating => "validating",
            Stage::Storing => "storing",
            Stage::Loading => "loading",
            Stage::Invoking => "invoking",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum FailureReason {
    #[error(transparent)]
    Resolve(ResolveError),
    #[error("{0}")]
    Rejected(RejectReason),
    #[error(transparent)]
    Storage(CapsmithError),
    #[error(transparent)]
    Load(LoadError),
    #[error(transparent)]
    Invoke(InvokeError),
}

/// A failed run: which stage, and the stage's own reason, unmodified.
#[derive(Error, Debug)]
#[error("run failed while {stage}: {reason}")]
pub struct RunError {
    pub stage: Stage,
    pub reason: FailureReason,
}

/// A completed run and the bookkeeping a caller may want to render.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub capability: String,
    pub hash: String,
    pub origin_label: &'static str,
    pub value: Value,
}

pub struct Orchestrator<'a> {
    memory: &'a IntentMemory,
    store: &'a CapabilityStore,
    validator: &'a SandboxValidator,
    recorder: &'a RunRecorder,
    matcher: Option<&'a SemanticMatcher>,
    instructor: Option<&'a dyn Instructor>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        memory: &'a IntentMemory,
        store: &'a CapabilityStore,
        validator: &'a SandboxValidator,
        recorder: &'a RunRecorder,
    ) -> Self {
        Self {
            memory,
            store,
            validator,
            recorder,
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

    /// Execute the full pipeline for one instruction against one agent.
    pub fn run_instruction(
        &self,
        agent: &Agent,
        raw: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<RunOutcome, RunError> {
        let _slot = agent.acquire_run_slot();
        let run_id = time::new_event_id();

        let resolution = self.stage_resolve(&run_id, raw)?;
        let source = self.stage_synthesize(&run_id, &resolution)?;
        self.stage_validate(&run_id, &source)?;
        let hash = self.stage_store(&run_id, &source)?;
        let capability = self.stage_load(&run_id, &hash, agent)?;
        let value = self.stage_invoke(&run_id, agent, &capability, args, kwargs)?;

        Ok(RunOutcome {
            run_id,
            capability,
            hash,
            origin_label: resolution.origin.label(),
            value,
        })
    }

    fn record(&self, run_id: &str, stage: Stage, status: &str, detail: Option<&str>) {
        // The trace is an audit surface, not a gate; a full disk must not
        // change run semantics.
        let _ = self.recorder.record(run_id, stage.as_str(), status, detail);
    }

    fn fail(&self, run_id: &str, stage: Stage, reason: FailureReason) -> RunError {
        self.record(run_id, stage, "fail", Some(&reason.to_string()));
        RunError { stage, reason }
    }

    fn stage_resolve(&self, run_id: &str, raw: &str) -> Result<Resolution, RunError> {
        let mut resolver = Resolver::new(self.memory);
        if let Some(matcher) = self.matcher {
            resolver = resolver.with_matcher(matcher);
        }
        if let Some(instructor) = self.instructor {
            resolver = resolver.with_instructor(instructor);
        }
        match resolver.resolve(raw) {
            Ok(resolution) => {
                self.record(
                    run_id,
                    Stage::Resolving,
                    "ok",
                    Some(resolution.origin.label()),
                );
                Ok(resolution)
            }
            Err(e) => Err(self.fail(run_id, Stage::Resolving, FailureReason::Resolve(e))),
        }
    }

    fn stage_synthesize(
        &self,
        run_id: &str,
        resolution: &Resolution,
    ) -> Result<String, RunError> {
        let source = synth::synthesize(&resolution.spec);
        self.record(
            run_id,
            Stage::Synthesizing,
            "ok",
            Some(&resolution.spec.name),
        );
        Ok(source)
    }

    fn stage_validate(&self, run_id: &str, source: &str) -> Result<(), RunError> {
        match self.validator.validate(source) {
            Verdict::Accepted => {
                self.record(run_id, Stage::Validating, "ok", None);
                Ok(())
            }
            Verdict::Rejected(reason) => {
                Err(self.fail(run_id, Stage::Validating, FailureReason::Rejected(reason)))
            }
        }
    }

    fn stage_store(&self, run_id: &str, source: &str) -> Result<String, RunError> {
        let tags = sandbox::declared_dependencies(source);
        match self.store.store(source, &tags) {
            Ok(hash) => {
                self.record(run_id, Stage::Storing, "ok", Some(&hash));
                Ok(hash)
            }
            Err(e) => Err(self.fail(run_id, Stage::Storing, FailureReason::Storage(e))),
        }
    }

    fn stage_load(&self, run_id: &str, hash: &str, agent: &Agent) -> Result<String, RunError> {
        let loader = CapabilityLoader::new(self.store, self.validator);
        match loader.load(hash, agent) {
            Ok(name) => {
                self.record(run_id, Stage::Loading, "ok", Some(&name));
                Ok(name)
            }
            Err(e) => Err(self.fail(run_id, Stage::Loading, FailureReason::Load(e))),
        }
    }

    fn stage_invoke(
        &self,
        run_id: &str,
        agent: &Agent,
        capability: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<Value, RunError> {
        match agent.invoke(capability, args, kwargs) {
            Ok(value) => {
                self.record(run_id, Stage::Invoking, "ok", None);
                Ok(value)
            }
            Err(e) => Err(self.fail(run_id, Stage::Invoking, FailureReason::Invoke(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::teach::TeachingError;
    use tempfile::{TempDir, tempdir};

    struct Harness {
        _tmp: TempDir,
        memory: IntentMemory,
        store: CapabilityStore,
        validator: SandboxValidator,
        recorder: RunRecorder,
    }

    fn harness() -> Harness {
        let tmp = tempdir().expect("tempdir");
        let memory = IntentMemory::open(tmp.path()).expect("memory");
        let store = CapabilityStore::open(tmp.path()).expect("store");
        let recorder = RunRecorder::new(tmp.path());
        Harness {
            _tmp: tmp,
            memory,
            store,
            validator: SandboxValidator::baseline(),
            recorder,
        }
    }

    #[test]
    fn full_pipeline_from_rule_to_value() {
        let h = harness();
        let orch = Orchestrator::new(&h.memory, &h.store, &h.validator, &h.recorder);
        let agent = Agent::new("tama");
        let outcome = orch
            .run_instruction(&agent, "add two numbers", &[Value::Int(3), Value::Int(5)], &[])
            .expect("run");
        assert_eq!(outcome.value, Value::Int(8));
        assert_eq!(outcome.capability, "add");
        assert_eq!(outcome.origin_label, "rule");
        assert!(h.store.exists(&outcome.hash).expect("exists"));
        assert!(agent.has_capability("add"));
    }

    #[test]
    fn every_stage_leaves_a_trace_event() {
        let h = harness();
        let orch = Orchestrator::new(&h.memory, &h.store, &h.validator, &h.recorder);
        let agent = Agent::new("tama");
        let outcome = orch
            .run_instruction(&agent, "sort a list", &[Value::List(vec![Value::Int(2), Value::Int(1)])], &[])
            .expect("run");

        let stages: Vec<String> = h
            .recorder
            .events()
            .expect("events")
            .into_iter()
            .filter(|ev| ev.run_id == outcome.run_id)
            .map(|ev| ev.stage)
            .collect();
        assert_eq!(
            stages,
            vec!["resolving", "synthesizing", "validating", "storing", "loading", "invoking"]
        );
    }

    #[test]
    fn unresolvable_instruction_fails_in_the_resolving_stage() {
        let h = harness();
        let orch = Orchestrator::new(&h.memory, &h.store, &h.validator, &h.recorder);
        let agent = Agent::new("tama");
        let err = orch
            .run_instruction(&agent, "conjure a novelty", &[], &[])
            .unwrap_err();
        assert_eq!(err.stage, Stage::Resolving);
        assert!(matches!(
            err.reason,
            FailureReason::Resolve(ResolveError::Teaching(TeachingError::Unavailable))
        ));

        let events = h.recorder.events().expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, "fail");
    }

    #[test]
    fn arity_mismatch_surfaces_as_an_invoking_failure() {
        let h = harness();
        let orch = Orchestrator::new(&h.memory, &h.store, &h.validator, &h.recorder);
        let agent = Agent::new("tama");
        let err = orch
            .run_instruction(&agent, "add two numbers", &[Value::Int(3)], &[])
            .unwrap_err();
        assert_eq!(err.stage, Stage::Invoking);
        // The capability still bound; only the call itself failed.
        assert!(agent.has_capability("add"));
    }
}
