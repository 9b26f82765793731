//! In-process Lua dispatch for `UserOp`, grounded on the teacher's
//! `ScriptRegistry` (`scripts.rs`): named scripts are loaded once and
//! invoked synchronously by name with JSON-compatible arguments
//! (`ScriptRegistry::call_function_json`), here specialized to functions
//! of the shape `fn(params_json) -> bytes`.

use std::collections::HashMap;
use std::sync::Arc;

use mlua::{Lua, MultiValue, Value as LuaValue};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::error::AppError;

#[derive(Clone, Default)]
pub struct UserOpRegistry {
    sources: Arc<Mutex<HashMap<String, String>>>,
}

impl UserOpRegistry {
    pub fn new() -> Self {
        UserOpRegistry::default()
    }

    pub fn load(&self, name: &str, lua_source: &str) {
        self.sources.lock().insert(name.to_string(), lua_source.to_string());
    }

    pub fn has(&self, name: &str) -> bool {
        self.sources.lock().contains_key(name)
    }

    /// Calls the named function with `params` and the raw input bytes,
    /// returning the bytes the function produced. The Lua function
    /// signature is `function(params_json_string, input_bytes) -> bytes`.
    pub fn call(&self, name: &str, params: &JsonValue, input: &[u8]) -> Result<Vec<u8>, AppError> {
        let source = self.sources.lock().get(name).cloned().ok_or_else(|| AppError::media("unknown_user_op", format!("no registered user operation '{name}'")))?;

        let lua = Lua::new();
        lua.load(&source).exec().map_err(|e| AppError::media("user_op_load_failed", format!("failed to load user op '{name}': {e}")))?;

        let func: mlua::Function = lua
            .globals()
            .get(name)
            .map_err(|e| AppError::media("unknown_user_op", format!("lua source for '{name}' did not define a function named '{name}': {e}")))?;

        let params_json = serde_json::to_string(params).map_err(|e| AppError::media("bad_params", e.to_string()))?;
        let mut args = MultiValue::new();
        args.push_back(LuaValue::String(lua.create_string(input).map_err(|e| AppError::media("lua_error", e.to_string()))?));
        args.push_back(LuaValue::String(lua.create_string(&params_json).map_err(|e| AppError::media("lua_error", e.to_string()))?));

        let result: LuaValue = func.call(args).map_err(|e| AppError::media("user_op_failed", format!("user op '{name}' raised an error: {e}")))?;
        match result {
            LuaValue::String(s) => Ok(s.as_bytes().to_vec()),
            other => Err(AppError::media("bad_user_op_return", format!("user op '{name}' must return a string of bytes, got {}", other.type_name()))),
        }
    }
}
