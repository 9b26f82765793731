//! Request validation, ported from `QueryHandler::syntax_checker` and the
//! blob-count check in `QueryHandler::parse_commands`
//! (`original_source/src/QueryHandler.cc`). No JSON-schema crate is used —
//! the teacher never depends on one, and this command set is small and
//! closed enough that direct `match` arms over `serde_json::Value` are
//! both simpler and a better fit for "never fabricate dependencies".

use serde_json::Value;

use crate::error::AppError;

use super::registry::{CommandKind, Registry};

/// One parsed, validated command from an envelope's command list, paired
/// with its single-key body (`query[cmd.name()]`).
pub struct ParsedCommand {
    pub kind: CommandKind,
    pub body: Value,
}

/// Validate a whole envelope's command list: each element must be a JSON
/// object with exactly one key naming a known command, and the number of
/// blob-consuming commands must match the envelope's actual blob count.
pub fn validate_command_list(commands: &Value, registry: &Registry, blob_count: usize) -> Result<Vec<ParsedCommand>, AppError> {
    let array = commands
        .as_array()
        .ok_or_else(|| AppError::protocol("malformed_envelope", "command list must be a JSON array".to_string()))?;

    let mut parsed = Vec::with_capacity(array.len());
    let mut needed_blobs = 0usize;

    for element in array {
        let obj = element
            .as_object()
            .ok_or_else(|| AppError::protocol("malformed_envelope", "each command must be a JSON object".to_string()))?;
        if obj.len() != 1 {
            return Err(AppError::command("malformed_command", "only one command per element is allowed".to_string()));
        }
        let (name, body) = obj.iter().next().unwrap();
        let kind = registry
            .lookup(name)
            .ok_or_else(|| AppError::command("unknown_command", format!("{name}: command not found")))?;

        validate_shape(kind, body)?;

        if kind.needs_blob() {
            needed_blobs += 1;
        }
        parsed.push(ParsedCommand { kind, body: body.clone() });
    }

    if needed_blobs != blob_count {
        return Err(AppError::protocol(
            "blob_count_mismatch",
            format!("expected {needed_blobs} blobs, received {blob_count}"),
        ));
    }

    Ok(parsed)
}

/// Per-command structural checks: the minimal set of required keys and
/// their expected JSON kind, matching what each handler
/// (`handlers/{entity,connection,image,video,descriptor}.rs`) actually
/// reads out of the command body.
fn validate_shape(kind: CommandKind, body: &Value) -> Result<(), AppError> {
    let require_string = |key: &str| -> Result<(), AppError> {
        match body.get(key).and_then(|v| v.as_str()) {
            Some(_) => Ok(()),
            None => Err(AppError::command("missing_field", format!("{}: '{key}' must be a string", kind.name()))),
        }
    };
    let require_ref = |key: &str| -> Result<(), AppError> {
        match body.get(key).and_then(|v| v.as_i64()) {
            Some(_) => Ok(()),
            None => Err(AppError::command("missing_field", format!("{}: '{key}' must be an integer reference", kind.name()))),
        }
    };

    match kind {
        CommandKind::AddNode => require_string("class"),
        CommandKind::UpdateNode | CommandKind::FindNode => Ok(()),
        CommandKind::AddEdge => {
            require_ref("ref1")?;
            require_ref("ref2")?;
            require_string("class")
        }
        CommandKind::UpdateEdge | CommandKind::FindEdge => Ok(()),
        CommandKind::AddImage | CommandKind::AddVideo => Ok(()),
        CommandKind::UpdateImage | CommandKind::FindImage | CommandKind::UpdateVideo | CommandKind::FindVideo => Ok(()),
        CommandKind::AddDescriptorSet => {
            require_string("name")?;
            match body.get("dimensions").and_then(|v| v.as_u64()) {
                Some(_) => Ok(()),
                None => Err(AppError::command("missing_field", "AddDescriptorSet: 'dimensions' must be an integer".to_string())),
            }
        }
        CommandKind::AddDescriptor => require_string("set"),
        CommandKind::FindDescriptor | CommandKind::ClassifyDescriptor => require_string("set"),
        CommandKind::TrainDescriptorSet => require_string("set"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_command_list() {
        let registry = Registry::new();
        let commands = serde_json::json!([
            {"AddNode": {"class": "Person", "properties": {"Name": "Bob"}}}
        ]);
        let parsed = validate_command_list(&commands, &registry, 0).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].kind, CommandKind::AddNode);
    }

    #[test]
    fn rejects_unknown_command() {
        let registry = Registry::new();
        let commands = serde_json::json!([{"DropDatabase": {}}]);
        assert!(validate_command_list(&commands, &registry, 0).is_err());
    }

    #[test]
    fn rejects_multiple_keys_per_element() {
        let registry = Registry::new();
        let commands = serde_json::json!([{"AddNode": {}, "AddEdge": {}}]);
        assert!(validate_command_list(&commands, &registry, 0).is_err());
    }

    #[test]
    fn rejects_blob_count_mismatch() {
        let registry = Registry::new();
        let commands = serde_json::json!([{"AddImage": {}}]);
        assert!(validate_command_list(&commands, &registry, 0).is_err());
        assert!(validate_command_list(&commands, &registry, 1).is_ok());
    }
}
