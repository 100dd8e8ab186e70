//! Line-oriented operator panel.
//!
//! Commands, one per line:
//! - `set <path> <value>` assigns a field of the live detection config
//! - `get [path]` prints one field or all of them
//! - `fields` prints every field with its accepted values
//! - `quit` stops the render loop

use std::fmt::Write as _;

use crate::error::{OverlayError, Result};
use crate::scheduler::StopHandle;
use crate::store::{ConfigField, ConfigStore, FieldDescriptor, FieldHint};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PanelCommand {
    Set { path: String, value: String },
    Get(Option<String>),
    Fields,
    Quit,
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<PanelCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut parts = line.splitn(3, char::is_whitespace);
    let verb = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).filter(|s| !s.is_empty());
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let command = match (verb, arg, rest) {
        ("set", Some(path), Some(value)) => PanelCommand::Set {
            path: path.to_string(),
            value: value.to_string(),
        },
        ("set", _, _) => {
            return Err(OverlayError::InvalidConfig(
                "usage: set <path> <value>".to_string(),
            ))
        }
        ("get", path, None) => PanelCommand::Get(path.map(str::to_string)),
        ("fields", None, None) => PanelCommand::Fields,
        ("quit" | "exit", None, None) => PanelCommand::Quit,
        _ => {
            return Err(OverlayError::InvalidConfig(format!(
                "unknown command {:?} (expected set, get, fields or quit)",
                line
            )))
        }
    };
    Ok(Some(command))
}

/// Apply a command and return the reply to print.
pub fn apply_command(
    store: &ConfigStore,
    stop: &StopHandle,
    command: PanelCommand,
) -> Result<String> {
    match command {
        PanelCommand::Set { path, value } => {
            store.set(&path, &value)?;
            let reply = if path == ConfigField::Architecture.path() {
                format!("ok ({} takes effect on the next frame)", path)
            } else {
                "ok".to_string()
            };
            Ok(reply)
        }
        PanelCommand::Get(None) => Ok(store
            .fields()
            .iter()
            .map(|f| format!("{} = {}", f.path, f.value))
            .collect::<Vec<_>>()
            .join("\n")),
        PanelCommand::Get(Some(path)) => store
            .fields()
            .into_iter()
            .find(|f| f.path == path)
            .map(|f| format!("{} = {}", f.path, f.value))
            .ok_or_else(|| OverlayError::InvalidConfig(format!("unknown field {:?}", path))),
        PanelCommand::Fields => Ok(store
            .fields()
            .iter()
            .map(describe)
            .collect::<Vec<_>>()
            .join("\n")),
        PanelCommand::Quit => {
            stop.request_stop();
            Ok("stopping".to_string())
        }
    }
}

fn describe(field: &FieldDescriptor) -> String {
    let mut line = format!("{} = {} ", field.path, field.value);
    match field.hint {
        FieldHint::Options(options) => {
            let _ = write!(line, "[{}]", options.join("|"));
        }
        FieldHint::Range { min, max, step } => {
            let _ = write!(line, "[{}..{}", min, max);
            if let Some(step) = step {
                let _ = write!(line, " step {}", step);
            }
            line.push(']');
        }
        FieldHint::Toggle => line.push_str("[true|false]"),
    }
    line
}
