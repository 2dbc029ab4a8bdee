/// API path prefix for the server control surface
pub const API_PREFIX: &str = "/server";

/// Filename advertised when the panel database is exported
pub const DEFAULT_EXPORT_FILENAME: &str = "proxy-panel.db";

/// Multipart field carrying the database image on import
pub const IMPORT_FIELD: &str = "db";

/// Log source selectors accepted by the logs endpoint
pub const LOG_SOURCE_FILE: &str = "file";
pub const LOG_SOURCE_JOURNAL: &str = "journal";
