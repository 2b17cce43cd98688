//! Reusable view components.

pub mod flow;
