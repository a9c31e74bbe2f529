//! Client-side agents.
//!
//! SYSTEM CONTEXT
//! ==============
//! These modules run on the consumer side of the broadcast surface: a
//! reconnecting sync agent that keeps a connection subscribed to its
//! rooms, an idle monitor that stops a running sandbox after a quiet
//! period, and a cache of local canvas edits awaiting upload.

pub mod changes;
pub mod idle;
pub mod sync;
