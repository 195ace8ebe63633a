//!
//! Record lifecycle orchestration for the namekit naming system.
//!
//! The heart of the crate is [`Machine`], a pure finite state machine that
//! owns all mutable session context and turns user events and task
//! completions into state transitions plus side-effect descriptions.
//! [`Session`] drives that machine on tokio, launching each effect as a
//! task and funnelling its completion back through one serial event queue.
//!

mod client;
mod import;
mod machine;
mod memory;
mod session;

pub use client::*;
pub use import::*;
pub use machine::*;
pub use memory::*;
pub use session::*;
