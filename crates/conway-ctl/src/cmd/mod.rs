//! CLI command modules.

pub mod index;
pub mod submit;
