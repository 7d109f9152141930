//! Lowering of short vector names, vector constructors and scalar casts to ISPC spelling.
//!
//! `float4` becomes `float<4>`, `float<4>(...)` becomes `make_float4(...)` (provided by
//! the native header) and `int(...)` becomes `(int)(...)`. All rewrites are whole-word and
//! leave already-lowered text untouched, so lowering a line twice is the same as lowering
//! it once.

use std::borrow::Cow;

use crate::macros::is_ident_char;

const VECTOR_ELEMENT_KINDS: [&str; 4] = ["int", "uint", "float", "bool"];
const CAST_KINDS: [&str; 3] = ["int", "uint", "float"];

/// Runs `rewrite` on every identifier-like word of `line`.
///
/// `rewrite` receives the word and the text that follows it. It returns the replacement
/// and how many bytes of the following text the replacement consumes.
fn rewrite_words<'a, F>(line: &'a str, mut rewrite: F) -> Cow<'a, str>
where
    F: FnMut(&str, &str) -> Option<(String, usize)>,
{
    let mut out: Option<String> = None;
    let mut copied_to = 0;
    let mut chars = line.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if !is_ident_char(c) {
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(i, c)) = chars.peek() {
            if !is_ident_char(c) {
                break;
            }
            end = i + c.len_utf8();
            chars.next();
        }

        let Some((replacement, consumed)) = rewrite(&line[start..end], &line[end..]) else {
            continue;
        };
        let buf = out.get_or_insert_with(|| String::with_capacity(line.len() + 16));
        buf.push_str(&line[copied_to..start]);
        buf.push_str(&replacement);
        copied_to = end + consumed;
        while chars.peek().is_some_and(|&(i, _)| i < copied_to) {
            chars.next();
        }
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&line[copied_to..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(line),
    }
}

fn vector_arity(digit: &str) -> Option<char> {
    match digit {
        "2" | "3" | "4" => digit.chars().next(),
        _ => None,
    }
}

/// `int3` -> `int<3>` for the `int`, `uint`, `float` and `bool` element kinds.
pub fn lower_vector_types(line: &str) -> Cow<'_, str> {
    rewrite_words(line, |word, _| {
        VECTOR_ELEMENT_KINDS.iter().find_map(|kind| {
            let arity = vector_arity(word.strip_prefix(kind)?)?;
            Some((format!("{kind}<{arity}>"), 0))
        })
    })
}

/// `float<3>(` -> `make_float3(`. Expects vector types to be lowered already.
pub fn lower_vector_constructors(line: &str) -> Cow<'_, str> {
    rewrite_words(line, |word, rest| {
        if !VECTOR_ELEMENT_KINDS.contains(&word) {
            return None;
        }
        let bytes = rest.as_bytes();
        if bytes.len() < 4 || bytes[0] != b'<' || bytes[2] != b'>' || bytes[3] != b'(' {
            return None;
        }
        let arity = vector_arity(&rest[1..2])?;
        Some((format!("make_{word}{arity}("), 4))
    })
}

/// `float(` -> `(float)(`.
pub fn lower_casts(line: &str) -> Cow<'_, str> {
    rewrite_words(line, |word, rest| {
        (CAST_KINDS.contains(&word) && rest.starts_with('(')).then(|| (format!("({word})("), 1))
    })
}

/// Applies every symbol rewrite to `line`, constructors after vector types.
pub fn lower_symbols(line: &str) -> String {
    let types = lower_vector_types(line);
    let ctors = lower_vector_constructors(&types);
    lower_casts(&ctors).into_owned()
}
