//! # Signal script interpreter module
//!
//! This module provides an interpreter for signal scripts, which drive the
//! signal bus from a timed list of writes instead of a live operator. A script
//! is a sequence of entries of the form
//!
//! ```text
//! 1.5: {"signal": "JogForward", "value": 1.0};
//! ```
//!
//! where the leading number is the session time in seconds at which the write
//! becomes due. The interpreter is generic over the entry type, so executables
//! can accept entries other than signal writes in the same script.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use regex::RegexBuilder;
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal
use crate::session::get_elapsed_seconds;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single write of a value onto a named signal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SignalWrite {
    /// Name of the signal to write to
    pub signal: String,

    /// The value to publish
    pub value: f64,
}

/// An entry which is scripted to occur at a specific time.
struct Command<T> {
    /// The time the command is supposed to execute at
    exec_time_s: f64,

    entry: T,
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending`
/// to acquire the list of entries that are due.
pub struct ScriptInterpreter<T = SignalWrite> {
    script_path: PathBuf,
    cmds: VecDeque<Command<T>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)"
    )]
    InvalidTimestamp(String),

    #[error("Script contains an invalid signal write at {0} s: {1}")]
    InvalidWrite(f64, serde_json::Error),
}

#[derive(Debug, PartialEq)]
pub enum PendingWrites<T = SignalWrite> {
    None,
    Some(Vec<T>),
    EndOfScript,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: DeserializeOwned> ScriptInterpreter<T> {
    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let path = script_path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        let script = fs::read_to_string(&path).map_err(ScriptError::ScriptLoadError)?;

        let cmds = parse_script(&script)?;

        Ok(ScriptInterpreter {
            script_path: path,
            cmds,
        })
    }

    /// Path the script was loaded from.
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Return the writes due at the current session time.
    pub fn get_pending(&mut self) -> PendingWrites<T> {
        self.get_pending_at(get_elapsed_seconds())
    }

    /// Return the writes due at the given time, in script order.
    pub fn get_pending_at(&mut self, current_time_s: f64) -> PendingWrites<T> {
        if self.cmds.is_empty() {
            return PendingWrites::EndOfScript;
        }

        let mut writes = vec![];

        while let Some(cmd) = self.cmds.front() {
            if cmd.exec_time_s >= current_time_s {
                break;
            }
            if let Some(cmd) = self.cmds.pop_front() {
                writes.push(cmd.entry);
            }
        }

        if writes.is_empty() {
            PendingWrites::None
        } else {
            PendingWrites::Some(writes)
        }
    }

    /// Get the number of writes remaining in the script
    pub fn get_num_writes(&self) -> usize {
        self.cmds.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.cmds.back() {
            Some(c) => c.exec_time_s,
            None => 0f64,
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_script<T: DeserializeOwned>(script: &str) -> Result<VecDeque<Command<T>>, ScriptError> {
    let mut queue = VecDeque::new();

    // The pattern is a literal so building it cannot fail, an error here
    // would only surface as an empty script.
    let re = match RegexBuilder::new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
        .multi_line(true)
        .build()
    {
        Ok(r) => r,
        Err(_) => return Err(ScriptError::ScriptEmpty),
    };

    for cap in re.captures_iter(script) {
        let time_str = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let exec_time_s: f64 = time_str
            .parse()
            .map_err(|e| ScriptError::InvalidTimestamp(format!("{}: {}", time_str, e)))?;

        let payload = cap.get(3).map(|m| m.as_str()).unwrap_or("");
        let entry: T = serde_json::from_str(payload)
            .map_err(|e| ScriptError::InvalidWrite(exec_time_s, e))?;

        queue.push_back(Command { exec_time_s, entry });
    }

    if queue.is_empty() {
        return Err(ScriptError::ScriptEmpty);
    }

    Ok(queue)
}
