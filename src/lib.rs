//! Capsmith: runtime capability acquisition for agents
//!
//! **Capsmith turns natural-language instructions into validated, bound
//! agent behaviors at runtime.**
//!
//! An instruction like "add two numbers" is resolved to an [`core::spec::IntentSpec`],
//! rendered into capability source, screened by a structural sandbox,
//! stored content-addressed, and only then compiled and bound onto a live
//! agent for invocation. Nothing an agent can call has skipped the gate.
//!
//! # Core Principles
//!
//! - **Local-first**: one SQLite workspace plus an append-only run log
//! - **Write-once memory**: the first meaning recorded for an instruction sticks
//! - **Gate on every load**: stored source is re-validated before each bind
//! - **Content-addressed**: identical source is one record, whatever produced it
//!
//! # Pipeline
//!
//! ```text
//! instruction ─▶ resolve ─▶ synthesize ─▶ validate ─▶ store ─▶ load ─▶ invoke
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: the pipeline stages and shared primitives (db, time, trace)

pub mod cli;
pub mod core;

use crate::cli::{
    CheckCli, Cli, Command, MemoryCli, MemoryCommand, RunCli, TeachCli, VaultCli, VaultCommand,
};
use crate::core::agent::Agent;
use crate::core::interp::Value;
use crate::core::memory::IntentMemory;
use crate::core::orchestrator::Orchestrator;
use crate::core::sandbox::{SandboxValidator, Verdict};
use crate::core::spec::normalize_instruction;
use crate::core::store::CapabilityStore;
use crate::core::teach::{StdioInstructor, spec_from_fields};
use crate::core::trace::RunRecorder;
use crate::core::{db, sandbox};

use anyhow::{Context, bail};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => db::default_root()?,
    };

    match cli.command {
        Command::Run(run_cli) => cmd_run(&root, run_cli),
        Command::Teach(teach_cli) => cmd_teach(&root, teach_cli),
        Command::Memory(memory_cli) => cmd_memory(&root, memory_cli),
        Command::Vault(vault_cli) => cmd_vault(&root, vault_cli),
        Command::Check(check_cli) => cmd_check(check_cli),
    }
}

/// Each `--arg` is JSON when it parses as JSON, a plain string otherwise,
/// so `--arg 3` is an integer and `--arg hello` is a string.
fn parse_arg(raw: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(&json),
        Err(_) => Value::Str(raw.to_string()),
    }
}

fn parse_kwarg(raw: &str) -> anyhow::Result<(String, Value)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("kwarg '{raw}' is not in name=value form");
    };
    Ok((name.to_string(), parse_arg(value)))
}

fn cmd_run(root: &PathBuf, run_cli: RunCli) -> anyhow::Result<()> {
    let memory = IntentMemory::open(root)?;
    let store = CapabilityStore::open(root)?;
    let validator = SandboxValidator::baseline();
    let recorder = RunRecorder::new(root);

    let args: Vec<Value> = run_cli.args.iter().map(|raw| parse_arg(raw)).collect();
    let mut kwargs = Vec::new();
    for raw in &run_cli.kwargs {
        kwargs.push(parse_kwarg(raw)?);
    }

    let instructor = StdioInstructor;
    let mut orchestrator = Orchestrator::new(&memory, &store, &validator, &recorder);
    if run_cli.interactive {
        orchestrator = orchestrator.with_instructor(&instructor);
    }

    let agent = Agent::new(&run_cli.agent);
    let outcome = orchestrator
        .run_instruction(&agent, &run_cli.instruction, &args, &kwargs)
        .with_context(|| format!("instruction '{}'", run_cli.instruction))?;

    if run_cli.format == "json" {
        let envelope = serde_json::json!({
            "run_id": outcome.run_id,
            "agent": agent.name(),
            "capability": outcome.capability,
            "hash": outcome.hash,
            "origin": outcome.origin_label,
            "value": outcome.value.to_json(),
        });
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        println!(
            "{} {} {} {}",
            "●".bright_green(),
            outcome.capability.bright_white().bold(),
            format!("({})", outcome.origin_label).bright_black(),
            short_hash(&outcome.hash).bright_black()
        );
        println!("{}", outcome.value);
    }
    Ok(())
}

fn cmd_teach(root: &PathBuf, teach_cli: TeachCli) -> anyhow::Result<()> {
    let memory = IntentMemory::open(root)?;
    let spec = spec_from_fields(&teach_cli.name, &teach_cli.args, &teach_cli.body)?;
    let normalized = normalize_instruction(&teach_cli.instruction);
    let inserted = memory.insert_if_absent(&normalized, &spec)?;
    if inserted {
        println!(
            "{} learned '{}' as {}",
            "●".bright_green(),
            normalized,
            spec.name.bright_white().bold()
        );
    } else {
        // Write-once: the first recorded meaning sticks.
        println!(
            "{} '{}' already has a meaning; use `capsmith memory forget` first",
            "✗".bright_yellow(),
            normalized
        );
    }
    Ok(())
}

fn cmd_memory(root: &PathBuf, memory_cli: MemoryCli) -> anyhow::Result<()> {
    let memory = IntentMemory::open(root)?;
    match memory_cli.command {
        MemoryCommand::List { format } => {
            let entries = memory.entries()?;
            if format == "json" {
                let rows: Vec<serde_json::Value> = entries
                    .iter()
                    .map(|(prompt, spec)| {
                        serde_json::json!({
                            "prompt": prompt,
                            "name": spec.name,
                            "args": spec.args,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if entries.is_empty() {
                println!("No learned instructions.");
            } else {
                for (prompt, spec) in entries {
                    println!(
                        "{} {} {}",
                        "▸".bright_cyan(),
                        prompt.bright_white(),
                        format!("→ {}({})", spec.name, spec.args.join(", ")).bright_black()
                    );
                }
            }
        }
        MemoryCommand::Show {
            instruction,
            format,
        } => {
            let normalized = normalize_instruction(&instruction);
            let Some(spec) = memory.lookup(&normalized)? else {
                bail!("no meaning recorded for '{normalized}'");
            };
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&spec)?);
            } else {
                println!("{} {}({})", "●".bright_green(), spec.name, spec.args.join(", "));
                for line in &spec.body {
                    println!("    {line}");
                }
            }
        }
        MemoryCommand::Forget { instruction } => {
            let normalized = normalize_instruction(&instruction);
            if memory.forget(&normalized)? {
                println!("{} forgot '{}'", "●".bright_green(), normalized);
            } else {
                println!("{} nothing recorded for '{}'", "✗".bright_yellow(), normalized);
            }
        }
    }
    Ok(())
}

fn cmd_vault(root: &PathBuf, vault_cli: VaultCli) -> anyhow::Result<()> {
    let store = CapabilityStore::open(root)?;
    match vault_cli.command {
        VaultCommand::List { format } => {
            let records = store.list()?;
            if format == "json" {
                let rows: Vec<serde_json::Value> = records
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "hash": r.hash,
                            "dependency_tags": r.dependency_tags,
                            "created_at": r.created_at,
                            "last_used_at": r.last_used_at,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if records.is_empty() {
                println!("Vault is empty.");
            } else {
                for record in records {
                    let tags = if record.dependency_tags.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", record.dependency_tags.join(","))
                    };
                    println!(
                        "{} {}{} {}",
                        "▸".bright_cyan(),
                        short_hash(&record.hash).bright_white(),
                        tags.bright_black(),
                        record.created_at.bright_black()
                    );
                }
            }
        }
        VaultCommand::Show { hash, format } => {
            // Prefix match so short hashes from `vault list` work; listing
            // does not bump last_used_at.
            let records = store.list()?;
            let mut hits = records.iter().filter(|r| r.hash.starts_with(&hash));
            let Some(record) = hits.next() else {
                bail!("no record under hash '{hash}'");
            };
            if hits.next().is_some() {
                bail!("hash prefix '{hash}' is ambiguous");
            }
            if format == "json" {
                let row = serde_json::json!({
                    "hash": record.hash,
                    "source": record.source,
                    "dependency_tags": record.dependency_tags,
                    "created_at": record.created_at,
                    "last_used_at": record.last_used_at,
                });
                println!("{}", serde_json::to_string_pretty(&row)?);
            } else {
                println!("{} {}", "●".bright_green(), record.hash.bright_white());
                print!("{}", record.source);
            }
        }
        VaultCommand::Purge { hash } => {
            if store.purge(&hash)? {
                println!("{} purged {}", "●".bright_green(), short_hash(&hash));
            } else {
                println!("{} no record under hash '{}'", "✗".bright_yellow(), hash);
            }
        }
    }
    Ok(())
}

fn cmd_check(check_cli: CheckCli) -> anyhow::Result<()> {
    let source = match &check_cli.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let validator = SandboxValidator::baseline();
    match validator.validate(&source) {
        Verdict::Accepted => {
            let meta = match validator.extract_metadata(&source) {
                Ok(meta) => meta,
                Err(reason) => bail!("{reason}"),
            };
            let tags = sandbox::declared_dependencies(&source);
            if check_cli.format == "json" {
                let envelope = serde_json::json!({
                    "verdict": "accepted",
                    "name": meta.name,
                    "args": meta.args,
                    "has_return": meta.has_return,
                    "line_count": meta.line_count,
                    "dependency_tags": tags,
                    "hash": CapabilityStore::content_hash(&source),
                });
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            } else {
                println!(
                    "{} {}({}) would be accepted",
                    "●".bright_green(),
                    meta.name.bright_white().bold(),
                    meta.args.join(", ")
                );
            }
            Ok(())
        }
        Verdict::Rejected(reason) => {
            if check_cli.format == "json" {
                let envelope = serde_json::json!({
                    "verdict": "rejected",
                    "code": reason.code(),
                    "detail": reason.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            } else {
                println!("{} {}: {}", "✗".bright_red(), reason.code().bold(), reason);
            }
            bail!("source rejected: {}", reason.code());
        }
    }
}

fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
