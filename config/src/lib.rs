//! Configuration loading for the anvil mediator.
//!
//! Raw TOML deserialization structs (with `Option` fields and millisecond
//! integers) stay private in this crate. The public surface is the resolved
//! [`Options`]/[`EngineConfig`] types, validated at the parse boundary.

mod options;

pub use options::{
    ConfigError, CoordinateBase, EngineConfig, EngineConfigError, Options, OptionsError,
};
