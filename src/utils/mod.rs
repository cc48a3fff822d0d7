//! Cross-cutting helpers.
//!
//! - `logging`: tracing initialisation and secret redaction.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
