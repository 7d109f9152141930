//! Inputs handed over by the shading-language front end.
//!
//! The front end preprocesses a platform-neutral shader, classifies it and produces one
//! [`ShaderSource`] per platform instantiation. This crate only reads these values.

use std::collections::HashMap;
use std::path::PathBuf;

use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vert,
    Frag,
    Comp,
    Geom,
    Tesc,
    Tese,
}

impl ShaderStage {
    /// Name used by the `STAGE_*` preprocessor definition.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vert => "VERT",
            ShaderStage::Frag => "FRAG",
            ShaderStage::Comp => "COMP",
            ShaderStage::Geom => "GEOM",
            ShaderStage::Tesc => "TESC",
            ShaderStage::Tese => "TESE",
        }
    }
}

/// Target platform of a preprocessed source. Only the ISPC source is read here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Ispc,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Platform::Ispc => "ISPC",
        }
    }
}

bitflags! {
    /// Optional capabilities enabled for a shader binary.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Features: u32 {
        /// Keep the canonical position output bit-exact across invocations.
        const INVARIANT = 1 << 0;
    }
}

bitflags! {
    /// Wave intrinsic usage. The backend only distinguishes "none" from "some".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WaveopsFlags: u32 {
        const BASIC = 1 << 0;
    }
}

/// One preprocessed line together with its position in the original sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// Index of the source file the line came from (0 is the shader itself, higher
    /// indices are includes).
    pub file_index: usize,
    /// 1-based line number inside that file.
    pub line_number: usize,
    pub text: String,
}

/// Preprocessed source of one shader for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub name: String,
    pub stage: ShaderStage,
    /// Declared return type of the entry point; `None` for `void` entry points.
    pub return_type: Option<String>,
    pub waveops_flags: WaveopsFlags,
    /// Struct-typed entry parameters as `(type, variable)` pairs, e.g. `("VSOutput", "In")`.
    pub struct_args: Vec<(String, String)>,
    /// Builtin entry parameters as `(type, variable)` pairs, e.g.
    /// `("SV_DispatchThreadID(uint3)", "id")`.
    pub flat_args: Vec<(String, String)>,
    pub lines: Vec<SourceLine>,
}

impl ShaderSource {
    pub fn new(name: impl Into<String>, stage: ShaderStage) -> Self {
        Self {
            name: name.into(),
            stage,
            return_type: None,
            waveops_flags: WaveopsFlags::empty(),
            struct_args: Vec::new(),
            flat_args: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Builds the line list of a single-file shader, numbering lines from 1.
    pub fn with_text(mut self, text: &str) -> Self {
        self.lines = text
            .lines()
            .enumerate()
            .map(|(idx, line)| SourceLine {
                file_index: 0,
                line_number: idx + 1,
                text: line.to_owned(),
            })
            .collect();
        self
    }

    /// True when `name` is a struct passed to or returned from the entry point.
    pub fn is_interface_struct(&self, name: &str) -> bool {
        self.struct_args.iter().any(|(ty, _)| ty == name)
            || self.return_type.as_deref() == Some(name)
    }
}

/// Build-level description of a shader binary shared by every platform backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderBinary {
    /// Output file name, e.g. `particles.comp`.
    pub filename: String,
    pub features: Features,
    pub preprocessed_srcs: HashMap<Platform, PathBuf>,
    /// Filled in by the backend from the translated [`ShaderSource`].
    pub waveops_flags: WaveopsFlags,
}

impl ShaderBinary {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Identifier suffix derived from the output file name: the text before the first
    /// `.`, upper-cased, with anything that cannot appear in an identifier replaced by `_`.
    pub fn name_mangle(&self) -> String {
        let stem = self.filename.split('.').next().unwrap_or_default();
        stem.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}
