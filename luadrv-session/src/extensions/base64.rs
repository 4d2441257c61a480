//! `base64.encode(s)` / `base64.decode(s)` using the standard alphabet.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use mlua::{Lua, Table};

use super::Extension;

pub struct Base64Extension;

impl Extension for Base64Extension {
    fn name(&self) -> &str {
        "base64"
    }

    fn open(&self, lua: &Lua) -> mlua::Result<Table> {
        let module = lua.create_table()?;

        module.set(
            "encode",
            lua.create_function(|_, input: mlua::String| Ok(STANDARD.encode(&*input.as_bytes())))?,
        )?;

        module.set(
            "decode",
            lua.create_function(|lua, input: mlua::String| {
                let bytes = STANDARD
                    .decode(&*input.as_bytes())
                    .map_err(mlua::Error::external)?;
                lua.create_string(&bytes)
            })?,
        )?;

        Ok(module)
    }
}
