//! Translate one preprocessed shader to ISPC.
//!
//! Debugging front end for the backend: the shader description the production driver
//! derives from the descriptor-set model is passed on the command line instead.

#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use fsl_ispc::{
    generate, Features, IspcOptions, NativeHeader, Platform, ResourceEmission, ShaderBinary,
    ShaderSource, ShaderStage, WaveopsFlags,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StageArg {
    Vert,
    Frag,
    Comp,
    Geom,
    Tesc,
    Tese,
}

impl From<StageArg> for ShaderStage {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::Vert => ShaderStage::Vert,
            StageArg::Frag => ShaderStage::Frag,
            StageArg::Comp => ShaderStage::Comp,
            StageArg::Geom => ShaderStage::Geom,
            StageArg::Tesc => ShaderStage::Tesc,
            StageArg::Tese => ShaderStage::Tese,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmissionArg {
    /// Comment resource declarations out
    Comment,
    /// Replace resource declarations with file-scope handles
    Alias,
}

impl From<EmissionArg> for ResourceEmission {
    fn from(emission: EmissionArg) -> Self {
        match emission {
            EmissionArg::Comment => ResourceEmission::CommentOut,
            EmissionArg::Alias => ResourceEmission::GlobalAlias,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "fsl-ispc",
    about = "Translate a preprocessed platform-neutral shader into ISPC source."
)]
struct Args {
    /// Preprocessed shader source
    input: PathBuf,

    /// Output file (its name also determines the exported entry-point suffix)
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = StageArg::Comp)]
    stage: StageArg,

    /// Entry-point return type (omit for void)
    #[arg(long, value_name = "TYPE")]
    return_type: Option<String>,

    /// Struct entry parameter as TYPE:VAR (repeatable)
    #[arg(long = "struct-arg", value_name = "TYPE:VAR")]
    struct_args: Vec<String>,

    /// Builtin entry parameter as TYPE:VAR, e.g. "SV_DispatchThreadID(uint3):id" (repeatable)
    #[arg(long = "flat-arg", value_name = "TYPE:VAR")]
    flat_args: Vec<String>,

    /// Mark the position output `precise`
    #[arg(long, action = clap::ArgAction::SetTrue)]
    invariant: bool,

    /// The shader uses wave intrinsics
    #[arg(long, action = clap::ArgAction::SetTrue)]
    waveops: bool,

    #[arg(long, value_enum, default_value_t = EmissionArg::Alias)]
    resource_emission: EmissionArg,

    /// Keep the entry-point name as written instead of appending the output file stem
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_mangle: bool,

    /// Native header to embed (defaults to the bundled ispc.h)
    #[arg(long, value_name = "PATH")]
    header: Option<PathBuf>,
}

fn parse_param(param: &str) -> anyhow::Result<(String, String)> {
    let Some((ty, var)) = param.rsplit_once(':') else {
        bail!("invalid parameter {param:?}: expected TYPE:VAR");
    };
    let (ty, var) = (ty.trim(), var.trim());
    if ty.is_empty() || var.is_empty() {
        bail!("invalid parameter {param:?}: expected TYPE:VAR");
    }
    Ok((ty.to_owned(), var.to_owned()))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("read {}", args.input.display()))?;

    let filename = args
        .output
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid output path {}", args.output.display()))?
        .to_owned();

    let mut shader = ShaderSource::new(filename.clone(), args.stage.into()).with_text(&text);
    shader.return_type = args.return_type;
    if args.waveops {
        shader.waveops_flags = WaveopsFlags::BASIC;
    }
    shader.struct_args = args
        .struct_args
        .iter()
        .map(|param| parse_param(param))
        .collect::<anyhow::Result<_>>()?;
    shader.flat_args = args
        .flat_args
        .iter()
        .map(|param| parse_param(param))
        .collect::<anyhow::Result<_>>()?;

    let mut binary = ShaderBinary::new(filename);
    if args.invariant {
        binary.features |= Features::INVARIANT;
    }
    binary
        .preprocessed_srcs
        .insert(Platform::Ispc, args.input.clone());

    let header = match &args.header {
        Some(path) => NativeHeader::load(path)?,
        None => NativeHeader::load_default()?,
    };
    let options = IspcOptions {
        resource_emission: args.resource_emission.into(),
        mangle_entry_name: !args.no_mangle,
    };

    let (code, dependencies) = generate(&mut binary, &shader, &header, options, &args.output)
        .with_context(|| format!("translate {}", args.input.display()))?;
    tracing::info!(
        output = %args.output.display(),
        dependencies = dependencies.len(),
        "generated ISPC shader"
    );
    if code != 0 {
        process::exit(code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_split_on_last_colon() {
        assert_eq!(
            parse_param("SV_DispatchThreadID(uint3):id").unwrap(),
            ("SV_DispatchThreadID(uint3)".to_owned(), "id".to_owned())
        );
        assert!(parse_param("uint3").is_err());
        assert!(parse_param("uint3:").is_err());
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from([
            "fsl-ispc",
            "in.fsl",
            "-o",
            "test.comp.ispc",
            "--flat-arg",
            "SV_DispatchThreadID(uint3):id",
            "--resource-emission",
            "comment",
        ])
        .unwrap();
        assert_eq!(args.flat_args.len(), 1);
        assert!(matches!(args.resource_emission, EmissionArg::Comment));
        assert!(matches!(args.stage, StageArg::Comp));
    }
}
