//! Pluggable extension modules registered into each session's interpreter.
//!
//! Modules are registered before the `load` function is resolved, both as a
//! global and as a `package.loaded` entry so `require` finds them too.

#[cfg(feature = "base64")]
mod base64;
#[cfg(feature = "json")]
mod json;

use std::sync::Arc;

use luadrv_config::ExtensionName;
use mlua::{Lua, Table};

#[cfg(feature = "base64")]
pub use self::base64::Base64Extension;
#[cfg(feature = "json")]
pub use self::json::JsonExtension;

/// A set of functions exposed to scripts under one module name.
pub trait Extension: Send + Sync {
    /// Global name the module is bound to.
    fn name(&self) -> &str;

    /// Build the module table inside `lua`.
    fn open(&self, lua: &Lua) -> mlua::Result<Table>;
}

/// Look up a built-in extension module.
///
/// Returns `None` when the module's cargo feature was not enabled.
pub fn builtin(name: ExtensionName) -> Option<Arc<dyn Extension>> {
    match name {
        #[cfg(feature = "base64")]
        ExtensionName::Base64 => Some(Arc::new(Base64Extension)),
        #[cfg(feature = "json")]
        ExtensionName::Json => Some(Arc::new(JsonExtension)),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Open `extension` and bind it as a global and in `package.loaded`.
pub(crate) fn register(lua: &Lua, extension: &dyn Extension) -> mlua::Result<()> {
    let name = extension.name();
    let module = extension.open(lua)?;
    let globals = lua.globals();

    // `package` is absent when the package library is not loaded
    if let Ok(package) = globals.get::<Table>("package") {
        let loaded: Table = package.get("loaded")?;
        loaded.set(name, module.clone())?;
    }
    globals.set(name, module)?;

    log::debug!("registered extension module '{}'", name);
    Ok(())
}
