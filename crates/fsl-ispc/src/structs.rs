//! `STRUCT(...)` blocks to native ISPC aggregates.

use crate::macros::{FieldDecl, StructOpen};
use crate::shader::Features;

/// Line-level parser mode.
///
/// The only structural state the translator tracks across lines: whether it is inside a
/// struct block and, if so, whether platform semantics are ignored for that struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParserMode {
    #[default]
    Normal,
    InsideStruct {
        name: String,
        skip_semantics: bool,
    },
}

impl ParserMode {
    pub fn open_struct(&mut self, name: &str, skip_semantics: bool) {
        *self = ParserMode::InsideStruct {
            name: name.to_owned(),
            skip_semantics,
        };
    }

    /// Leaves the current struct and returns its name. Closing outside of a struct is a
    /// no-op and returns `None`.
    pub fn close_struct(&mut self) -> Option<String> {
        match std::mem::take(self) {
            ParserMode::InsideStruct { name, .. } => Some(name),
            ParserMode::Normal => None,
        }
    }

    pub fn is_inside_struct(&self) -> bool {
        matches!(self, ParserMode::InsideStruct { .. })
    }

    pub fn skip_semantics(&self) -> bool {
        matches!(
            self,
            ParserMode::InsideStruct {
                skip_semantics: true,
                ..
            }
        )
    }
}

/// Replaces the `STRUCT(Name)` call in `line` with `struct Name`, keeping whatever follows
/// it (usually nothing; the opening brace sits on the next line).
pub fn struct_open_line(decl: &StructOpen<'_>, line: &str) -> String {
    let rest = line.find(')').map_or("", |close| &line[close + 1..]);
    format!("{}struct {}{}", indentation(line), decl.name, rest.trim_end())
}

fn is_position_semantic(semantic: &str) -> bool {
    semantic.eq_ignore_ascii_case("SV_Position")
}

/// Native member declaration for a `DATA(...)` field, or `None` when the field only
/// carries a platform semantic and must be dropped.
pub fn transcribe_field(
    field: &FieldDecl<'_>,
    indent: &str,
    skip_semantics: bool,
    features: Features,
) -> Option<String> {
    if field.semantic.is_some() && !skip_semantics {
        return None;
    }
    let precise = features.contains(Features::INVARIANT)
        && field.semantic.is_some_and(is_position_semantic);
    Some(format!(
        "{indent}{}{} {};",
        if precise { "precise " } else { "" },
        field.ty,
        field.name
    ))
}

/// Leading whitespace of `line`.
pub fn indentation(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}
