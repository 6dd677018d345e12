//! Types shared between the TaskQ library and its binaries.

pub mod constants;
pub mod errors;
mod message;

pub use errors::{TaskqError, TaskqResult};
pub use message::{Message, Payload};
