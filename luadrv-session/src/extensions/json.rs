//! `json.encode(value)` / `json.decode(text)` backed by serde_json.

use mlua::{Lua, LuaSerdeExt, Table, Value};

use super::Extension;

pub struct JsonExtension;

impl Extension for JsonExtension {
    fn name(&self) -> &str {
        "json"
    }

    fn open(&self, lua: &Lua) -> mlua::Result<Table> {
        let module = lua.create_table()?;

        module.set(
            "encode",
            lua.create_function(|_, value: Value| {
                serde_json::to_string(&value).map_err(mlua::Error::external)
            })?,
        )?;

        module.set(
            "decode",
            lua.create_function(|lua, text: mlua::String| {
                let parsed: serde_json::Value =
                    serde_json::from_slice(&text.as_bytes()).map_err(mlua::Error::external)?;
                lua.to_value(&parsed)
            })?,
        )?;

        Ok(module)
    }
}
