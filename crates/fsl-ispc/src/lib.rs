//! ISPC backend of the platform-neutral shading language translator.
//!
//! The front end hands over an already preprocessed line stream in which structural
//! constructs are still spelled as macros (`STRUCT`, `DATA`, `RES`, `GroupShared`,
//! `*_MAIN`, `RETURN`). This crate rewrites that stream in a single pass into ISPC source:
//!
//! - vector types, constructors and casts are lowered to ISPC spelling ([`symbols`]);
//! - struct blocks become native aggregates ([`structs`]);
//! - resource declarations are collected and turned into explicit entry-point
//!   parameters ([`resources`]);
//! - the entry point becomes an internal `_impl` function plus an exported wrapper that
//!   walks the dispatch grid with `foreach` ([`entry`]).
//!
//! [`translate_shader`] runs the pass in memory; [`generate`] writes the result next to
//! the other backends' outputs.

#![forbid(unsafe_code)]

pub mod entry;
pub mod macros;
pub mod resources;
pub mod shader;
pub mod structs;
pub mod symbols;
mod translate;

pub use entry::{DispatchGrid, EntryPointRewrite, MainArgDescriptor};
pub use resources::{ResourceDescriptor, ResourceEmission};
pub use shader::{
    Features, Platform, ShaderBinary, ShaderSource, ShaderStage, SourceLine, WaveopsFlags,
};
pub use symbols::lower_symbols;
pub use translate::{
    generate, translate_shader, GenerateError, IspcOptions, NativeHeader, TranslatedShader,
    NATIVE_HEADER_FILE,
};
