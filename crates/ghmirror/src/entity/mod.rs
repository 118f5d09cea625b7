//! SeaORM entity definitions for the ghmirror database schema.

pub mod document;
pub mod prelude;
