//! Inbound side: bind, accept, hand each connection to its own task.

pub mod listener;
