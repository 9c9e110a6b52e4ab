//! Email command pipeline: classification and processing.

pub mod parser;
pub mod processor;
pub mod types;

pub use processor::EmailProcessor;
pub use types::{Command, InboundEmail, Outcome, ProcessReply};
