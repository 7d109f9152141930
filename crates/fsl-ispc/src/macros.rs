//! Matchers for the macro forms that survive preprocessing.
//!
//! Every matcher is a prefix/substring test on a single line followed by a balanced
//! parenthesis split of the macro arguments. The upstream front end guarantees that macro
//! usage is well formed, so the matchers only report [`MalformedMacro`] for the few cases
//! where the argument count makes the line impossible to rewrite.

use std::ops::Range;

use thiserror::Error;

pub const STRUCT_OPEN: &str = "STRUCT(";
pub const FIELD_DECL: &str = "DATA(";
pub const STRUCT_CLOSE: &str = "};";
pub const RESOURCE_DECL: &str = "RES(";
pub const GROUP_SHARED_DECL: &str = "GroupShared(";
pub const ENTRY_POINT: &str = "_MAIN(";
pub const RETURN_STMT: &str = "RETURN";
pub const OUTPUT_FORMAT_HINT: &str = "SET_OUTPUT_FORMAT(";

/// Builtin name of the per-invocation dispatch coordinate.
pub const DISPATCH_THREAD_ID: &str = "SV_DispatchThreadID";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {macro_name} macro: {message}")]
pub struct MalformedMacro {
    pub macro_name: &'static str,
    pub message: String,
}

fn malformed(macro_name: &'static str, message: impl Into<String>) -> MalformedMacro {
    MalformedMacro {
        macro_name,
        message: message.into(),
    }
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A macro invocation located inside a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCall<'a> {
    pub name: &'a str,
    pub args: Vec<&'a str>,
    /// Byte range of the whole invocation, from the name to the closing parenthesis.
    pub span: Range<usize>,
}

impl<'a> MacroCall<'a> {
    /// Finds the first invocation of `name` in `text` that starts on an identifier boundary.
    ///
    /// Returns `None` when the macro is absent or its parentheses never balance.
    pub fn find(text: &'a str, name: &str) -> Option<Self> {
        let needle_len = name.len();
        let mut search_from = 0;
        while let Some(rel) = text[search_from..].find(name) {
            let start = search_from + rel;
            let open = start + needle_len;
            let boundary = text[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !is_ident_char(c));
            if boundary && text[open..].starts_with('(') {
                let (args, close) = split_args(text, open)?;
                return Some(MacroCall {
                    name: &text[start..open],
                    args,
                    span: start..close + 1,
                });
            }
            search_from = open;
        }
        None
    }
}

/// Splits the arguments of the parenthesised list starting at `open` (which must index a
/// `(`). Returns the trimmed arguments and the index of the matching `)`.
fn split_args(text: &str, open: usize) -> Option<(Vec<&str>, usize)> {
    let mut depth = 0usize;
    let mut args = Vec::new();
    let mut arg_start = open + 1;
    for (i, c) in text[open..].char_indices() {
        let i = open + i;
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    if c != ')' {
                        return None;
                    }
                    let last = text[arg_start..i].trim();
                    if !(args.is_empty() && last.is_empty()) {
                        args.push(last);
                    }
                    return Some((args, i));
                }
            }
            ',' if depth == 1 => {
                args.push(text[arg_start..i].trim());
                arg_start = i + 1;
            }
            _ => {}
        }
    }
    None
}

/// Unwraps one layer of macro nesting: `Buffer(float4)` -> `float4`.
///
/// Text without a parenthesised tail is returned trimmed.
pub fn macro_inner(text: &str) -> &str {
    let text = text.trim();
    match (text.find('('), text.rfind(')')) {
        (Some(open), Some(close)) if open < close && close == text.len() - 1 => {
            text[open + 1..close].trim()
        }
        _ => text,
    }
}

/// Name of the outermost macro of `text`: `SV_DispatchThreadID(uint3)` -> `SV_DispatchThreadID`.
pub fn macro_name(text: &str) -> &str {
    let text = text.trim();
    text.find('(').map_or(text, |open| text[..open].trim_end())
}

/// Strips array syntax from an identifier: `gData[4]` -> `gData`.
pub fn array_base_name(name: &str) -> &str {
    name.find('[').map_or(name, |idx| &name[..idx]).trim()
}

pub fn is_array(name: &str) -> bool {
    name.contains('[')
}

fn macro_args<'a>(line: &'a str, marker: &str) -> Option<MacroCall<'a>> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with(marker) {
        return None;
    }
    MacroCall::find(trimmed, &marker[..marker.len() - 1])
}

/// `STRUCT(Name)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructOpen<'a> {
    pub name: &'a str,
}

impl<'a> StructOpen<'a> {
    pub fn parse(line: &'a str) -> Option<Result<Self, MalformedMacro>> {
        let call = macro_args(line, STRUCT_OPEN)?;
        Some(match call.args[..] {
            [name] if !name.is_empty() => Ok(StructOpen { name }),
            _ => Err(malformed(
                "STRUCT",
                format!("expected 1 argument, got {}", call.args.len()),
            )),
        })
    }
}

/// `DATA(type, name, semantic)`; a missing semantic or the literal `None` means "no
/// semantic".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDecl<'a> {
    pub ty: &'a str,
    pub name: &'a str,
    pub semantic: Option<&'a str>,
}

impl<'a> FieldDecl<'a> {
    pub fn parse(line: &'a str) -> Option<Result<Self, MalformedMacro>> {
        let call = macro_args(line, FIELD_DECL)?;
        Some(match call.args[..] {
            [ty, name] => Ok(FieldDecl {
                ty,
                name,
                semantic: None,
            }),
            [ty, name, semantic] => Ok(FieldDecl {
                ty,
                name,
                semantic: (!semantic.is_empty() && !semantic.eq_ignore_ascii_case("none"))
                    .then_some(semantic),
            }),
            _ => Err(malformed(
                "DATA",
                format!("expected 2 or 3 arguments, got {}", call.args.len()),
            )),
        })
    }
}

pub fn is_struct_close(line: &str) -> bool {
    line.contains(STRUCT_CLOSE)
}

/// `RES(declared_type, name, frequency, register, binding)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDecl<'a> {
    pub declared_type: &'a str,
    pub name: &'a str,
    pub frequency: &'a str,
    pub register: &'a str,
    pub binding: &'a str,
}

impl<'a> ResourceDecl<'a> {
    pub fn parse(line: &'a str) -> Option<Result<Self, MalformedMacro>> {
        let call = macro_args(line, RESOURCE_DECL)?;
        Some(match call.args[..] {
            [declared_type, name, frequency, register, binding] => Ok(ResourceDecl {
                declared_type,
                name,
                frequency,
                register,
                binding,
            }),
            _ => Err(malformed(
                "RES",
                format!("expected 5 arguments, got {}", call.args.len()),
            )),
        })
    }
}

/// `GroupShared(element_type, declared_name)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSharedDecl<'a> {
    pub element_type: &'a str,
    pub declared_name: &'a str,
}

impl<'a> GroupSharedDecl<'a> {
    pub fn parse(line: &'a str) -> Option<Result<Self, MalformedMacro>> {
        let call = macro_args(line, GROUP_SHARED_DECL)?;
        Some(match call.args[..] {
            [element_type, declared_name] => Ok(GroupSharedDecl {
                element_type,
                declared_name,
            }),
            _ => Err(malformed(
                "GroupShared",
                format!("expected 2 arguments, got {}", call.args.len()),
            )),
        })
    }
}

/// Location of the entry-point function name (`CS_MAIN`, `PS_MAIN`, ...) inside a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointMarker {
    pub name_span: Range<usize>,
}

impl EntryPointMarker {
    pub fn find(line: &str) -> Option<Self> {
        let marker = line.find(ENTRY_POINT)?;
        let end = marker + ENTRY_POINT.len() - 1;
        let start = line[..marker]
            .char_indices()
            .rev()
            .take_while(|&(_, c)| is_ident_char(c))
            .last()
            .map_or(marker, |(i, _)| i);
        Some(EntryPointMarker {
            name_span: start..end,
        })
    }

    pub fn name<'a>(&self, line: &'a str) -> &'a str {
        &line[self.name_span.clone()]
    }
}

pub fn is_return_stmt(line: &str) -> bool {
    line.trim_start()
        .strip_prefix(RETURN_STMT)
        .is_some_and(|rest| !rest.starts_with(is_ident_char))
}

pub fn is_output_format_hint(line: &str) -> bool {
    line.contains(OUTPUT_FORMAT_HINT)
}

/// Matches the preprocessor's line directives, e.g. `# 418 "<built-in>" 3`.
pub fn is_line_directive(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('#') else {
        return false;
    };
    let rest = rest.trim_start();
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return false;
    }
    let after_digits = &rest[digits..];
    let quoted = after_digits.trim_start();
    if quoted.len() == after_digits.len() {
        return false;
    }
    quoted
        .strip_prefix('"')
        .is_some_and(|tail| tail.contains('"'))
}
