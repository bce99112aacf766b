//! Constants for request configuration (defaults and validation bounds).

/// Canonical field holding the business result code after normalization.
pub const DEFAULT_RETCODE_KEY: &str = "retcode";

/// Default payload field holding the business error message.
pub const DEFAULT_LOGIC_ERROR_MSG_KEY: &str = "retmsg";

/// Fallback message for logic errors whose payload carries no message.
pub const DEFAULT_LOGIC_ERROR_MSG_UNKNOWN: &str = "unknown error";

/// Default retry budget (two extra attempts after the first).
pub const DEFAULT_REPEAT_NUM: u32 = 2;

/// Largest accepted retry budget in a config file.
pub const MAX_REPEAT_NUM: u32 = 10;

/// Largest accepted timeout in a config file (1 hour).
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Header carrying the generated request identifier.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Header carrying the request start time in milliseconds since the Unix epoch.
pub const REQUEST_TIME_HEADER: &str = "X-Request-Time";
