//! Built-in checker plugins. Each submodule implements the `Checker`
//! contract (see `crate::checker`) for one probe kind and registers a
//! construction factory under its kind string.

pub mod command;
pub mod http;
pub mod marathon;
pub mod process;
pub mod registry;
pub mod ssl;
pub mod supervisor;

/// Helper shared by every checker's config loader: decode a `serde_json`
/// blob into a typed config, surfacing failures as `CheckerConstructError`.
pub(crate) fn decode_config<T: serde::de::DeserializeOwned>(
    kind: &str,
    value: &serde_json::Value,
) -> Result<T, crate::error::CheckerConstructError> {
    serde_json::from_value(value.clone()).map_err(|err| {
        crate::error::CheckerConstructError::InvalidConfig {
            kind: kind.to_string(),
            reason: err.to_string(),
        }
    })
}
