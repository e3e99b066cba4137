/// The command succeeded.
pub const NO_ERROR: i32 = 0;

/// The command ran to the end, but some of its checks failed.
pub const NON_FATAL_ERROR: i32 = 1;

/// The command aborted.
pub const FATAL_ERROR: i32 = 2;
