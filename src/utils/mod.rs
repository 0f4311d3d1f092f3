//! Utility modules.

pub mod file;
pub mod retry;
pub mod text;

pub use file::{calculate_checksum, is_text_extension, read_file_bytes};
pub use retry::{RetryConfig, RetryResult, Retryable, with_retry};
pub use text::{char_suffix, truncate_with_ellipsis};
