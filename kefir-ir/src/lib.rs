//! The typed IR: type system and AMD64 ABI layout, the per-module tables
//! (types, bigints, strings, functions), and the per-function optimizer IR
//! container (`opt_code`) that every pass and the backend mutate in place.

pub mod bigint;
pub mod debug;
pub mod error;
pub mod function;
pub mod module;
pub mod types;

pub use debug::SourceLocation;
pub use error::{Error, ErrorKind, Result};
pub use module::Module;
