pub use facegate_core::errors::{AppError, AppResult, ErrorKind};
