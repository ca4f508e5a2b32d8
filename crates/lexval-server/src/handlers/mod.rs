//! Request handlers.

pub mod validation;
