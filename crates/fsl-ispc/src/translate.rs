use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::entry::{rewrite_entry_point, EntryPointRewrite};
use crate::macros::{
    is_line_directive, is_output_format_hint, is_return_stmt, is_struct_close, EntryPointMarker,
    FieldDecl, GroupSharedDecl, MalformedMacro, ResourceDecl, StructOpen, RETURN_STMT,
};
use crate::resources::{group_shared_lines, resource_lines, ResourceDescriptor, ResourceEmission};
use crate::shader::{Platform, ShaderBinary, ShaderSource, SourceLine};
use crate::structs::{indentation, struct_open_line, transcribe_field, ParserMode};
use crate::symbols::lower_symbols;

/// File name of the native header shipped with this crate.
pub const NATIVE_HEADER_FILE: &str = "ispc.h";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IspcOptions {
    pub resource_emission: ResourceEmission,
    /// Append the output file stem to the exported entry name.
    pub mangle_entry_name: bool,
}

impl Default for IspcOptions {
    fn default() -> Self {
        Self {
            resource_emission: ResourceEmission::default(),
            mangle_entry_name: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("shader binary `{filename}` has no preprocessed {} source", platform.name())]
    MissingSource { filename: String, platform: Platform },
    #[error("failed to read native header {}: {source}", path.display())]
    ReadHeader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Native helper definitions copied verbatim into every generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeHeader {
    text: String,
}

impl NativeHeader {
    /// Location of the header bundled with this crate.
    pub fn default_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("includes")
            .join(NATIVE_HEADER_FILE)
    }

    pub fn load(path: &Path) -> Result<Self, GenerateError> {
        let text = fs::read_to_string(path).map_err(|source| GenerateError::ReadHeader {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self { text })
    }

    pub fn load_default() -> Result<Self, GenerateError> {
        Self::load(&Self::default_path())
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Result of translating one shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedShader {
    pub source: String,
    /// Resources in declaration order, as passed to the entry point.
    pub resources: Vec<ResourceDescriptor>,
    pub entry: Option<EntryPointRewrite>,
}

/// Mutable state of a single translation pass.
///
/// A context is created for one shader and dropped with the pass; nothing here is shared
/// between shaders.
struct TranslateContext<'a> {
    shader: &'a ShaderSource,
    binary: &'a ShaderBinary,
    options: IspcOptions,
    mode: ParserMode,
    resources: Vec<ResourceDescriptor>,
    entry: Option<EntryPointRewrite>,
    out: Vec<String>,
}

impl<'a> TranslateContext<'a> {
    fn new(shader: &'a ShaderSource, binary: &'a ShaderBinary, options: IspcOptions) -> Self {
        Self {
            shader,
            binary,
            options,
            mode: ParserMode::default(),
            resources: Vec::new(),
            entry: None,
            out: Vec::with_capacity(shader.lines.len() + 32),
        }
    }

    fn preamble(&mut self, header: &NativeHeader) {
        let source = self
            .binary
            .preprocessed_srcs
            .get(&Platform::Ispc)
            .map_or_else(|| self.shader.name.clone(), |p| p.display().to_string());
        self.out.push(format!(
            "// {} shader generated for {} from {source}",
            self.shader.name,
            Platform::Ispc.name()
        ));
        self.out.push(format!("#define STAGE_{}", self.shader.stage.name()));
        if !self.shader.waveops_flags.is_empty() {
            self.out.push("#define ENABLE_WAVEOPS(flags)".to_owned());
        }
        self.out.extend(header.text().lines().map(str::to_owned));
        self.out.push(String::new());
    }

    fn malformed(&self, source: &SourceLine, err: &MalformedMacro) {
        warn!(
            line = source.line_number,
            file = source.file_index,
            "{err}; passing line through"
        );
    }

    fn process_line(&mut self, source: &SourceLine) {
        let text = source.text.as_str();
        let before = self.out.len();

        if is_line_directive(text) {
            return;
        }

        let mut line = text.to_owned();

        if let Some(decl) = StructOpen::parse(text) {
            match decl {
                Ok(decl) => {
                    let skip = !self.shader.is_interface_struct(decl.name);
                    self.mode.open_struct(decl.name, skip);
                    line = struct_open_line(&decl, text);
                }
                Err(err) => self.malformed(source, &err),
            }
        }

        if self.mode.is_inside_struct() {
            if let Some(field) = FieldDecl::parse(text) {
                match field {
                    Ok(field) => {
                        let Some(member) = transcribe_field(
                            &field,
                            indentation(text),
                            self.mode.skip_semantics(),
                            self.binary.features,
                        ) else {
                            return;
                        };
                        line = member;
                    }
                    Err(err) => self.malformed(source, &err),
                }
            }

            if is_struct_close(text) {
                self.mode.close_struct();
                self.out.push(format!("//line {}", source.line_number));
                self.out.push(lower_symbols(&line));
                return;
            }
        }

        if let Some(decl) = ResourceDecl::parse(text) {
            match decl {
                Ok(decl) => {
                    let resource = ResourceDescriptor::from_decl(&decl);
                    debug!(
                        line = source.line_number,
                        name = %resource.name,
                        declared_type = %resource.declared_type,
                        readonly = resource.is_readonly,
                        "extracted resource"
                    );
                    let [alias, declaration] =
                        resource_lines(&resource, text, self.options.resource_emission);
                    self.out.push(alias);
                    line = declaration;
                    self.resources.push(resource);
                }
                Err(err) => self.malformed(source, &err),
            }
        }

        if let Some(decl) = GroupSharedDecl::parse(text) {
            match decl {
                Ok(decl) => {
                    let [alias, declaration] = group_shared_lines(&decl);
                    self.out.push(alias);
                    line = declaration;
                }
                Err(err) => self.malformed(source, &err),
            }
        }

        if let Some(marker) = EntryPointMarker::find(text) {
            if self.entry.is_some() {
                warn!(
                    line = source.line_number,
                    "second entry point `{}` in one shader; passing line through",
                    marker.name(text)
                );
            } else {
                let mangle = self
                    .options
                    .mangle_entry_name
                    .then(|| self.binary.name_mangle());
                let rewrite = rewrite_entry_point(
                    text,
                    &marker,
                    &self.resources,
                    self.shader,
                    mangle.as_deref(),
                    self.options.resource_emission,
                    source.line_number,
                );
                line = rewrite.line.clone();
                self.entry = Some(rewrite);
            }
        } else if is_return_stmt(text) {
            line = self.rewrite_return(text);
        }

        if is_output_format_hint(text) {
            line = format!("//{line}");
        }

        // Keep expansions traceable to the line they came from.
        let expanded = self.out.len() != before;
        self.out.push(lower_symbols(&line));
        if expanded {
            self.out.push(format!("//line {}", source.line_number));
        }
    }

    fn rewrite_return(&self, text: &str) -> String {
        if self.shader.return_type.is_some() {
            text.replacen(RETURN_STMT, "return ", 1)
        } else {
            text.replacen("RETURN()", "return", 1)
        }
    }

    fn finish(mut self) -> TranslatedShader {
        if let Some(entry) = &self.entry {
            self.out
                .extend(entry.wrapper.iter().map(|line| lower_symbols(line)));
        }
        let mut source = self.out.join("\n");
        source.push('\n');
        TranslatedShader {
            source,
            resources: self.resources,
            entry: self.entry,
        }
    }
}

/// Translates one preprocessed shader into ISPC source, in memory.
pub fn translate_shader(
    shader: &ShaderSource,
    binary: &ShaderBinary,
    header: &NativeHeader,
    options: IspcOptions,
) -> TranslatedShader {
    let mut ctx = TranslateContext::new(shader, binary, options);
    ctx.preamble(header);
    for line in &shader.lines {
        ctx.process_line(line);
    }
    if ctx.entry.is_none() {
        warn!(shader = %shader.name, "no entry point found; no dispatch wrapper generated");
    }
    ctx.finish()
}

/// Translates `shader` and writes the result to `dst`.
///
/// Returns the exit code (always 0 once the file is written) and the list of files the
/// output depends on, which this backend leaves empty.
pub fn generate(
    binary: &mut ShaderBinary,
    shader: &ShaderSource,
    header: &NativeHeader,
    options: IspcOptions,
    dst: &Path,
) -> Result<(i32, Vec<PathBuf>), GenerateError> {
    if !binary.preprocessed_srcs.contains_key(&Platform::Ispc) {
        return Err(GenerateError::MissingSource {
            filename: binary.filename.clone(),
            platform: Platform::Ispc,
        });
    }
    binary.waveops_flags = shader.waveops_flags;

    let translated = translate_shader(shader, binary, header, options);
    fs::write(dst, translated.source).map_err(|source| GenerateError::WriteOutput {
        path: dst.to_owned(),
        source,
    })?;
    debug!(dst = %dst.display(), resources = translated.resources.len(), "wrote ISPC shader");

    Ok((0, Vec::new()))
}
