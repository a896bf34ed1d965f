//! Outbound request construction.

use lyssna_protocols::Value;
use lyssna_registry::{ActionRegistry, ParamError};

/// Builds the `{cmd, action, data}` envelope for `action`.
///
/// `data` is checked against the action's declared parameters first. Actions
/// without a command id carry `cmd: null`.
pub fn build_request(registry: &ActionRegistry, action: &str, data: Value) -> Result<Value, ParamError> {
    registry.validate_params(action, &data)?;
    let definition = registry
        .lookup(action)
        .ok_or_else(|| ParamError::UnknownAction(action.to_owned()))?;

    let cmd = definition
        .command_id
        .and_then(|id| i32::try_from(id).ok())
        .map_or(Value::Null, Value::Integer);
    Ok(Value::object([
        ("cmd", cmd),
        ("action", Value::String(definition.name.clone())),
        ("data", data),
    ]))
}
