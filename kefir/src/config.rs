//! Compiler-wide configuration, per spec §6. Every knob here is read-only
//! input to `compile_function`/`compile_module`; nothing in the pipeline
//! mutates it.

use kefir_codegen_amd64::{xasmgen::Syntax, DEFAULT_CODEGEN_PIPELINE};
use kefir_opt::passes::DEFAULT_OPTIMIZER_PIPELINE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptLevel {
    O0,
    O1,
    O2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TentativeDefinitionPlacement {
    Common,
    NoCommon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolVisibility {
    Default,
    Protected,
    Hidden,
    Internal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorFormat {
    PlainText,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub opt_level: OptLevel,
    pub pic: bool,
    pub omit_frame_pointer: bool,
    pub emulated_tls: bool,
    pub tls_common: bool,
    /// Force x87 stores through memory rather than keeping values in x87
    /// registers across calls, avoiding a class of false positives Valgrind
    /// raises on uninitialized x87 register reads.
    pub valgrind_compatible_x87: bool,
    pub tentative_definition_placement: TentativeDefinitionPlacement,
    pub symbol_visibility: SymbolVisibility,
    pub optimizer_pipeline: String,
    pub codegen_pipeline: String,
    pub syntax: Syntax,
    pub error_format: ErrorFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::O1,
            pic: true,
            omit_frame_pointer: false,
            emulated_tls: false,
            tls_common: true,
            valgrind_compatible_x87: false,
            tentative_definition_placement: TentativeDefinitionPlacement::Common,
            symbol_visibility: SymbolVisibility::Default,
            optimizer_pipeline: DEFAULT_OPTIMIZER_PIPELINE.to_string(),
            codegen_pipeline: DEFAULT_CODEGEN_PIPELINE.to_string(),
            syntax: Syntax::AttPrefix,
            error_format: ErrorFormat::PlainText,
        }
    }
}
