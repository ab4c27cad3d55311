//! Canonical default values shared across crates.

/// Version string written into the `protocolVersion` header field.
pub const PROTOCOL_VERSION: &str = "1.0";
pub const DEFAULT_LOG_FILTER: &str = "collecta=info,collecta_wire=info,collecta_schema=info";
pub const DEFAULT_CONFIG_FILE: &str = "collecta.toml";
/// Tag holding a `key=value` composite inside a `result`.
pub const DEFAULT_COMPOSITE_TAG: &str = "sampInfo";
/// Column receiving the right-hand side of the composite.
pub const DEFAULT_COMPOSITE_COLUMN: &str = "sampInfoValue";
