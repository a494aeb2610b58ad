//! MCP method handlers.

pub mod lifecycle;
pub mod resources;
pub mod tools;

use serde_json::Value;

use crate::errors::RpcError;
use crate::registry::MethodRegistry;

/// Register all RPC handlers with the registry.
pub fn register_all(registry: &mut MethodRegistry) {
    // Lifecycle
    registry.register("initialize", lifecycle::InitializeHandler);
    registry.register("notifications/initialized", lifecycle::InitializedHandler);
    registry.register("ping", lifecycle::PingHandler);

    // Tools
    registry.register("tools/list", tools::ListToolsHandler);
    registry.register("tools/call", tools::CallToolHandler);

    // Resources
    registry.register("resources/list", resources::ListResourcesHandler);
    registry.register("resources/read", resources::ReadResourceHandler);
}

/// Extract a required parameter from the params object.
pub(crate) fn require_param<'a>(params: Option<&'a Value>, key: &str) -> Result<&'a Value, RpcError> {
    params
        .and_then(|p| p.get(key))
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Missing required parameter: {key}"),
        })
}

/// Extract a required string parameter.
pub(crate) fn require_string_param<'a>(
    params: Option<&'a Value>,
    key: &str,
) -> Result<&'a str, RpcError> {
    require_param(params, key)?
        .as_str()
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Parameter '{key}' must be a string"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_all_populates_registry() {
        let mut reg = MethodRegistry::new();
        register_all(&mut reg);
        assert_eq!(
            reg.methods(),
            vec![
                "initialize",
                "notifications/initialized",
                "ping",
                "resources/list",
                "resources/read",
                "tools/call",
                "tools/list",
            ]
        );
    }

    #[test]
    fn require_param_present() {
        let params = json!({"name": "add"});
        let val = require_param(Some(&params), "name").unwrap();
        assert_eq!(val, "add");
    }

    #[test]
    fn require_param_missing() {
        let params = json!({"other": 1});
        let err = require_param(Some(&params), "name").unwrap_err();
        assert_eq!(err.code(), crate::errors::INVALID_PARAMS);
    }

    #[test]
    fn require_param_none_params() {
        let err = require_param(None, "name").unwrap_err();
        assert_eq!(err.code(), crate::errors::INVALID_PARAMS);
    }

    #[test]
    fn require_string_param_wrong_type() {
        let params = json!({"name": 5});
        let err = require_string_param(Some(&params), "name").unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }
}
