//! Strict-control / deprecation registry (glossary: "Strict control").
//!
//! Not present in the teacher (`so0k-oxid` has no include/deprecation
//! system); modeled on the same named-registry shape as the cache layer,
//! with `colored`-driven warning output in the same style as
//! `so0k-oxid::dag::validation::print_validation_errors`.

use std::collections::HashMap;

use colored::Colorize;

use crate::error::{CoreError, CoreResult};

/// What a strict control does when triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The control is fully suppressed: no warning, no error.
    Allow,
    /// Emit a warning and continue.
    Warn,
    /// Fail the operation.
    Error,
}

/// A single named deprecation control (spec §7: "evaluation decides whether
/// the warning is a hard error").
#[derive(Debug, Clone)]
pub struct StrictControl {
    pub name: &'static str,
    pub description: &'static str,
    pub disposition: Disposition,
}

/// The session-wide registry of strict controls.
#[derive(Debug, Clone)]
pub struct StrictControls {
    controls: HashMap<&'static str, StrictControl>,
}

pub const BARE_INCLUDE: &str = "bare-include";
pub const DEPENDENCY_INPUTS: &str = "dependency-inputs";

impl Default for StrictControls {
    fn default() -> Self {
        let mut controls = HashMap::new();
        controls.insert(
            BARE_INCLUDE,
            StrictControl {
                name: BARE_INCLUDE,
                description: "unlabeled `include {}` blocks are deprecated; use `include \"name\" {}`",
                disposition: Disposition::Warn,
            },
        );
        controls.insert(
            DEPENDENCY_INPUTS,
            StrictControl {
                name: DEPENDENCY_INPUTS,
                description: "`dependency.*.inputs.*` is deprecated; read outputs via `dependency.*.outputs.*`",
                disposition: Disposition::Warn,
            },
        );
        Self { controls }
    }
}

impl StrictControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a registry where every control is a hard error (strict mode).
    pub fn strict() -> Self {
        let mut s = Self::default();
        for control in s.controls.values_mut() {
            control.disposition = Disposition::Error;
        }
        s
    }

    pub fn set(&mut self, name: &'static str, disposition: Disposition) {
        if let Some(control) = self.controls.get_mut(name) {
            control.disposition = disposition;
        }
    }

    pub fn suppress(&mut self, name: &'static str) {
        self.set(name, Disposition::Allow);
    }

    /// Evaluate a control: log/print a warning or return an error, per its
    /// current disposition.
    pub fn evaluate(&self, name: &'static str, context: &str) -> CoreResult<()> {
        let Some(control) = self.controls.get(name) else {
            return Ok(());
        };
        match control.disposition {
            Disposition::Allow => Ok(()),
            Disposition::Warn => {
                tracing::warn!(control = name, context, "{}", control.description);
                eprintln!(
                    "{} {} ({})",
                    "Deprecation warning:".yellow().bold(),
                    control.description,
                    context.dimmed()
                );
                Ok(())
            }
            Disposition::Error => Err(CoreError::Other(format!(
                "strict control '{name}' violated: {} ({context})",
                control.description
            ))),
        }
    }
}
