//! External process execution.
//!
//! [`ToolCommand`] runs one program with captured output and a timeout;
//! [`RetryPolicy`] wraps any fallible async action with the bounded retry
//! used for recoverable conditions.

mod command;
mod retry;

pub use command::{ToolCommand, ToolOutput};
pub use retry::RetryPolicy;
