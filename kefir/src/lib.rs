//! Facade crate: wires the optimizer pipeline (`kefir-opt`) and the AMD64
//! backend (`kefir-codegen-amd64`) together over one `Config`.

pub mod config;
pub mod exit;
pub mod pipeline;

pub use config::Config;
pub use pipeline::compile_module;
