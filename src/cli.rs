//! CLI struct definitions for the capsmith command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "capsmith",
    version = env!("CARGO_PKG_VERSION"),
    about = "Runtime capability acquisition: natural-language instructions become validated, content-addressed, hot-bound agent behaviors."
)]
pub(crate) struct Cli {
    /// Workspace root (defaults to $CAPSMITH_HOME, then ~/.capsmith).
    #[clap(long)]
    pub root: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run one instruction end to end against an agent
    #[clap(name = "run", visible_alias = "r")]
    Run(RunCli),

    /// Record the meaning of an instruction ahead of time
    #[clap(name = "teach", visible_alias = "t")]
    Teach(TeachCli),

    /// Inspect the learned instruction memory
    #[clap(name = "memory", visible_alias = "m")]
    Memory(MemoryCli),

    /// Inspect the capability vault
    #[clap(name = "vault", visible_alias = "v")]
    Vault(VaultCli),

    /// Validate capability source without storing it
    #[clap(name = "check", visible_alias = "c")]
    Check(CheckCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct RunCli {
    /// The instruction, e.g. "add two numbers".
    pub instruction: String,
    /// Positional argument for the capability; JSON if it parses, string
    /// otherwise. Repeatable.
    #[clap(long = "arg")]
    pub args: Vec<String>,
    /// Keyword argument as name=value. Repeatable.
    #[clap(long = "kwarg")]
    pub kwargs: Vec<String>,
    /// Agent to bind and invoke on.
    #[clap(long, default_value = "default")]
    pub agent: String,
    /// Prompt on stdin when the instruction cannot be resolved.
    #[clap(long)]
    pub interactive: bool,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct TeachCli {
    /// The instruction being given a meaning.
    pub instruction: String,
    /// Capability name, e.g. "add".
    #[clap(long)]
    pub name: String,
    /// Whitespace-delimited argument names, e.g. "a b".
    #[clap(long, default_value = "")]
    pub args: String,
    /// Body lines joined with literal "\n".
    #[clap(long)]
    pub body: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct MemoryCli {
    #[clap(subcommand)]
    pub command: MemoryCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum MemoryCommand {
    /// List all learned instructions
    List {
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Show the recorded meaning for one instruction
    Show {
        instruction: String,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Remove one learned instruction
    Forget { instruction: String },
}

#[derive(clap::Args, Debug)]
pub(crate) struct VaultCli {
    #[clap(subcommand)]
    pub command: VaultCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum VaultCommand {
    /// List stored capability records
    List {
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Show one record by content hash
    Show {
        hash: String,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Delete one record by content hash
    Purge { hash: String },
}

#[derive(clap::Args, Debug)]
pub(crate) struct CheckCli {
    /// File containing capability source; stdin when omitted.
    pub file: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}
