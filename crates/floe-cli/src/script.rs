//! JSON-lines request scripts.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::warn;

use floe_common::FloeError;
use floe_ingest::{IngestRequest, IngestService};

/// Outcome counts of a script run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub handled: usize,
    pub failed: usize,
}

/// Feeds script lines to a service.
pub struct ScriptRunner<'a> {
    service: &'a IngestService,
    keep_going: bool,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(service: &'a IngestService, keep_going: bool) -> Self {
        Self {
            service,
            keep_going,
        }
    }

    /// Handles every request in `input`, writing one JSON line per request
    /// to `out`. Blank lines and lines starting with `#` are skipped.
    pub fn run(&self, input: impl BufRead, out: &mut impl Write) -> Result<Summary> {
        let mut summary = Summary::default();
        for (index, line) in input.lines().enumerate() {
            let line = line.context("failed to read script")?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            summary.handled += 1;
            let result = match serde_json::from_str::<IngestRequest>(line) {
                Ok(request) => self.service.handle(&request).map_err(|e| error_json(&e)),
                Err(e) => Err(json!({
                    "op": "error",
                    "kind": "parse",
                    "message": e.to_string(),
                })),
            };

            let output = match result {
                Ok(response) => serde_json::to_value(&response)?,
                Err(error) => {
                    summary.failed += 1;
                    warn!("Request on line {} failed: {}", index + 1, error);
                    error
                }
            };
            writeln!(out, "{output}")?;

            if summary.failed > 0 && !self.keep_going {
                break;
            }
        }
        Ok(summary)
    }
}

fn error_json(error: &FloeError) -> Value {
    json!({
        "op": "error",
        "code": error.code().to_string(),
        "kind": error.kind().to_string(),
        "retryable": error.is_retryable(),
        "message": error.to_string(),
    })
}
