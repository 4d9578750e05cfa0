//! Interactive teaching: the operator-facing fallback for instructions no
//! rule, memory entry, or semantic neighbor can resolve.
//!
//! The exchange is three fields: capability name, whitespace-delimited
//! argument names, and a body using `\n` as the line-break convention.
//! The wait is always bounded: a timed-out or cancelled request surfaces
//! as a resolver failure instead of hanging the run indefinitely.

use crate::core::spec::IntentSpec;
use std::io::{BufRead, Write};
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TeachingError {
    #[error("teaching request timed out after {0:?}")]
    TimedOut(Duration),
    #[error("teaching request was cancelled")]
    Cancelled,
    #[error("no instructor is attached")]
    Unavailable,
    #[error("malformed teaching response: {0}")]
    Malformed(String),
}

/// External authority that can supply a spec for an unrecognized prompt.
pub trait Instructor: Send + Sync {
    fn teach(&self, normalized_prompt: &str) -> Result<IntentSpec, TeachingError>;
}

/// Parse the three-field teaching response into a spec. Argument names are
/// whitespace-delimited; the body uses literal `\n` as its line-break
/// convention.
pub fn spec_from_fields(name: &str, args: &str, body: &str) -> Result<IntentSpec, TeachingError> {
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(TeachingError::Malformed(format!(
            "capability name '{name}' is not an identifier"
        )));
    }
    let args: Vec<String> = args.split_whitespace().map(String::from).collect();
    for (i, arg) in args.iter().enumerate() {
        if !arg.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(TeachingError::Malformed(format!(
                "argument '{arg}' is not an identifier"
            )));
        }
        if args[..i].contains(arg) {
            return Err(TeachingError::Malformed(format!(
                "duplicate argument '{arg}'"
            )));
        }
    }
    let body: Vec<String> = body.split("\\n").map(|s| s.trim_end().to_string()).collect();
    if body.iter().all(|line| line.trim().is_empty()) {
        return Err(TeachingError::Malformed("empty body".to_string()));
    }
    Ok(IntentSpec {
        name: name.to_string(),
        args,
        body,
    })
}

/// Instructor fed over an in-process channel, with a bounded wait. The
/// sender side is the operator surface; dropping it cancels outstanding
/// requests.
pub struct ChannelInstructor {
    rx: Mutex<Receiver<IntentSpec>>,
    timeout: Duration,
}

impl ChannelInstructor {
    pub fn new(rx: Receiver<IntentSpec>, timeout: Duration) -> Self {
        Self {
            rx: Mutex::new(rx),
            timeout,
        }
    }
}

impl Instructor for ChannelInstructor {
    fn teach(&self, _normalized_prompt: &str) -> Result<IntentSpec, TeachingError> {
        let rx = self.rx.lock().unwrap();
        match rx.recv_timeout(self.timeout) {
            Ok(spec) => Ok(spec),
            Err(RecvTimeoutError::Timeout) => Err(TeachingError::TimedOut(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(TeachingError::Cancelled),
        }
    }
}

/// Instructor backed by an interactive terminal. Used by the CLI's
/// `--interactive` path; the operator at the prompt is the bound on the
/// wait here.
pub struct StdioInstructor;

impl Instructor for StdioInstructor {
    fn teach(&self, normalized_prompt: &str) -> Result<IntentSpec, TeachingError> {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        let mut read_field = |label: &str| -> Result<String, TeachingError> {
            write!(stdout, "{label}: ").map_err(|e| TeachingError::Malformed(e.to_string()))?;
            stdout
                .flush()
                .map_err(|e| TeachingError::Malformed(e.to_string()))?;
            let mut line = String::new();
            stdin
                .lock()
                .read_line(&mut line)
                .map_err(|_| TeachingError::Cancelled)?;
            if line.is_empty() {
                return Err(TeachingError::Cancelled);
            }
            Ok(line.trim_end_matches(['\r', '\n']).to_string())
        };

        println!("No rule or memory matches '{normalized_prompt}'. Teach it:");
        let name = read_field("name")?;
        let args = read_field("args (whitespace-delimited)")?;
        let body = read_field("body (use \\n for line breaks)")?;
        spec_from_fields(&name, &args, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn fields_parse_into_a_spec() {
        let spec = spec_from_fields("square", "x", "return x * x").expect("spec");
        assert_eq!(spec.name, "square");
        assert_eq!(spec.args, vec!["x"]);
        assert_eq!(spec.body, vec!["return x * x"]);
    }

    #[test]
    fn body_line_break_convention_splits_lines() {
        let spec = spec_from_fields("clamp", "x", "if x < 0:\\n    return 0\\nreturn x")
            .expect("spec");
        assert_eq!(spec.body.len(), 3);
        assert_eq!(spec.body[1], "    return 0");
    }

    #[test]
    fn bad_name_and_duplicate_args_are_malformed() {
        assert!(matches!(
            spec_from_fields("not a name", "x", "return x"),
            Err(TeachingError::Malformed(_))
        ));
        assert!(matches!(
            spec_from_fields("f", "x x", "return x"),
            Err(TeachingError::Malformed(_))
        ));
    }

    #[test]
    fn channel_instructor_times_out() {
        let (_tx, rx) = mpsc::channel::<IntentSpec>();
        let instructor = ChannelInstructor::new(rx, Duration::from_millis(10));
        let err = instructor.teach("whatever").unwrap_err();
        assert!(matches!(err, TeachingError::TimedOut(_)));
    }

    #[test]
    fn dropped_sender_is_a_cancellation() {
        let (tx, rx) = mpsc::channel::<IntentSpec>();
        drop(tx);
        let instructor = ChannelInstructor::new(rx, Duration::from_secs(1));
        assert_eq!(instructor.teach("whatever").unwrap_err(), TeachingError::Cancelled);
    }

    #[test]
    fn queued_spec_is_delivered() {
        let (tx, rx) = mpsc::channel::<IntentSpec>();
        tx.send(IntentSpec::new("square", &["x"], &["return x * x"]))
            .expect("send");
        let instructor = ChannelInstructor::new(rx, Duration::from_secs(1));
        let spec = instructor.teach("square a number").expect("spec");
        assert_eq!(spec.name, "square");
    }
}
