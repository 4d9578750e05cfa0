use capsmith::core::agent::Agent;
use capsmith::core::interp::Value;
use capsmith::core::memory::IntentMemory;
use capsmith::core::orchestrator::{FailureReason, Orchestrator, Stage};
use capsmith::core::sandbox::SandboxValidator;
use capsmith::core::spec::IntentSpec;
use capsmith::core::store::CapabilityStore;
use capsmith::core::teach::ChannelInstructor;
use capsmith::core::trace::RunRecorder;
use std::sync::mpsc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

struct Workspace {
    _tmp: TempDir,
    memory: IntentMemory,
    store: CapabilityStore,
    validator: SandboxValidator,
    recorder: RunRecorder,
}

impl Workspace {
    fn new() -> Self {
        let tmp = tempdir().expect("tempdir");
        let memory = IntentMemory::open(tmp.path()).expect("memory");
        let store = CapabilityStore::open(tmp.path()).expect("store");
        let recorder = RunRecorder::new(tmp.path());
        Self {
            _tmp: tmp,
            memory,
            store,
            validator: SandboxValidator::baseline(),
            recorder,
        }
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.memory, &self.store, &self.validator, &self.recorder)
    }
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|v| Value::Int(*v)).collect()
}

#[test]
fn add_two_numbers_end_to_end() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");
    let outcome = ws
        .orchestrator()
        .run_instruction(&agent, "add two numbers", &ints(&[3, 5]), &[])
        .expect("run");

    assert_eq!(outcome.value, Value::Int(8));
    assert_eq!(outcome.capability, "add");
    assert_eq!(outcome.origin_label, "rule");
    assert!(ws.store.exists(&outcome.hash).expect("exists"));
    assert!(agent.has_capability("add"));
}

#[test]
fn division_always_produces_a_float() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");
    let outcome = ws
        .orchestrator()
        .run_instruction(&agent, "divide two numbers", &ints(&[16, 4]), &[])
        .expect("run");
    assert_eq!(outcome.value, Value::Float(4.0));
}

#[test]
fn subtraction_is_binary_regardless_of_the_count_word() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");
    // Three arguments must be an arity error: the subtraction template
    // always takes exactly two.
    let err = ws
        .orchestrator()
        .run_instruction(&agent, "subtract three numbers", &ints(&[10, 3, 1]), &[])
        .unwrap_err();
    assert_eq!(err.stage, Stage::Invoking);

    let outcome = ws
        .orchestrator()
        .run_instruction(&agent, "subtract three numbers", &ints(&[10, 3]), &[])
        .expect("run");
    assert_eq!(outcome.value, Value::Int(7));
}

#[test]
fn sort_and_filter_list_instructions() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");
    let unsorted = Value::List(ints(&[4, 2, 1]));
    let outcome = ws
        .orchestrator()
        .run_instruction(&agent, "sort a list", &[unsorted], &[])
        .expect("run");
    assert_eq!(outcome.value, Value::List(ints(&[1, 2, 4])));

    let mixed = Value::List(ints(&[3, -1, 0, 7]));
    let outcome = ws
        .orchestrator()
        .run_instruction(&agent, "filter list", &[mixed], &[])
        .expect("run");
    assert_eq!(outcome.value, Value::List(ints(&[3, 7])));
}

#[test]
fn string_and_comparison_instructions() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");
    let outcome = ws
        .orchestrator()
        .run_instruction(
            &agent,
            "uppercase string",
            &[Value::Str("hello".to_string())],
            &[],
        )
        .expect("run");
    assert_eq!(outcome.value, Value::Str("HELLO".to_string()));

    let outcome = ws
        .orchestrator()
        .run_instruction(&agent, "compare two numbers", &ints(&[9, 4]), &[])
        .expect("run");
    assert_eq!(outcome.value, Value::Str("a > b".to_string()));
}

#[test]
fn keyword_arguments_reach_the_capability() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");
    let outcome = ws
        .orchestrator()
        .run_instruction(
            &agent,
            "add two numbers",
            &[Value::Int(3)],
            &[("num2".to_string(), Value::Int(5))],
        )
        .expect("run");
    assert_eq!(outcome.value, Value::Int(8));
}

#[test]
fn identical_instructions_share_one_vault_record() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");
    let first = ws
        .orchestrator()
        .run_instruction(&agent, "add two numbers", &ints(&[1, 2]), &[])
        .expect("run");
    let second = ws
        .orchestrator()
        .run_instruction(&agent, "Add two numbers!", &ints(&[3, 4]), &[])
        .expect("run");

    assert_eq!(first.hash, second.hash);
    assert_eq!(ws.store.list().expect("list").len(), 1);
}

#[test]
fn taught_instruction_resolves_from_memory_on_resubmission() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");

    let (tx, rx) = mpsc::channel();
    tx.send(IntentSpec::new("square", &["x"], &["return x * x"]))
        .expect("send");
    let instructor = ChannelInstructor::new(rx, Duration::from_secs(1));

    let outcome = ws
        .orchestrator()
        .with_instructor(&instructor)
        .run_instruction(&agent, "square a number", &ints(&[7]), &[])
        .expect("run");
    assert_eq!(outcome.value, Value::Int(49));
    assert_eq!(outcome.origin_label, "taught");

    // No instructor this time: memory must answer.
    let outcome = ws
        .orchestrator()
        .run_instruction(&agent, "Square a number?", &ints(&[9]), &[])
        .expect("run");
    assert_eq!(outcome.value, Value::Int(81));
    assert_eq!(outcome.origin_label, "memory");
}

#[test]
fn rejected_source_stores_nothing_and_binds_nothing() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");

    let (tx, rx) = mpsc::channel();
    tx.send(IntentSpec::new(
        "sneak",
        &["x"],
        &["return eval(x)"],
    ))
    .expect("send");
    let instructor = ChannelInstructor::new(rx, Duration::from_secs(1));

    let err = ws
        .orchestrator()
        .with_instructor(&instructor)
        .run_instruction(&agent, "run arbitrary code", &[Value::Str("1".into())], &[])
        .unwrap_err();
    assert_eq!(err.stage, Stage::Validating);
    assert!(matches!(err.reason, FailureReason::Rejected(_)));

    assert!(ws.store.list().expect("list").is_empty());
    assert!(!agent.has_capability("sneak"));
}

#[test]
fn trace_records_the_full_stage_sequence_and_failures() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");
    let outcome = ws
        .orchestrator()
        .run_instruction(&agent, "multiply two numbers", &ints(&[6, 7]), &[])
        .expect("run");

    let ok_stages: Vec<String> = ws
        .recorder
        .events()
        .expect("events")
        .into_iter()
        .filter(|ev| ev.run_id == outcome.run_id && ev.status == "ok")
        .map(|ev| ev.stage)
        .collect();
    assert_eq!(
        ok_stages,
        vec![
            "resolving",
            "synthesizing",
            "validating",
            "storing",
            "loading",
            "invoking"
        ]
    );

    let err = ws
        .orchestrator()
        .run_instruction(&agent, "conjure a novelty", &[], &[])
        .unwrap_err();
    assert_eq!(err.stage, Stage::Resolving);
    let failures: Vec<_> = ws
        .recorder
        .events()
        .expect("events")
        .into_iter()
        .filter(|ev| ev.status == "fail")
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].stage, "resolving");
}

#[test]
fn concurrent_runs_against_one_agent_all_complete() {
    let ws = Workspace::new();
    let agent = Agent::new("tama");

    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for i in 0i64..4 {
            let ws = &ws;
            let agent = &agent;
            handles.push(scope.spawn(move || {
                ws.orchestrator()
                    .run_instruction(agent, "add two numbers", &ints(&[i, i]), &[])
                    .expect("run")
                    .value
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().expect("join"), Value::Int(2 * i as i64));
        }
    });

    assert_eq!(ws.store.list().expect("list").len(), 1);
}
