//! Configuration failure modes.

use std::path::PathBuf;

use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

/// Failures while assembling the layered configuration. File I/O never
/// surfaces directly: figment owns the reads and reports through
/// [`ConfigError::Assemble`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("no configuration file at {}", .0.display())]
    Missing(PathBuf),

    /// The merged file/env layers could not be deserialized.
    #[error("could not assemble configuration: {0}")]
    Assemble(#[from] figment::Error),

    /// One or more sections failed their range or value checks.
    #[error("configuration rejected:{}", render_failures(.0))]
    Rejected(#[source] ValidationErrors),
}

/// Renders every failed check as ` section.field: detail;`, descending into
/// nested sections so engine/replay/telemetry failures keep their full path.
fn render_failures(errors: &ValidationErrors) -> String {
    let mut rendered = String::new();
    collect_failures(errors, "", &mut rendered);
    rendered
}

fn collect_failures(errors: &ValidationErrors, prefix: &str, out: &mut String) {
    use std::fmt::Write;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            (*field).to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(failures) => {
                for failure in failures {
                    let detail = failure
                        .message
                        .as_ref()
                        .map_or_else(|| failure.code.to_string(), ToString::to_string);
                    let _ = write!(out, " {path}: {detail};");
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_failures(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_failures(nested, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        ConfigError::Rejected(errors)
    }
}
