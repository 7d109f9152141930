use std::path::PathBuf;

use fsl_ispc::{
    generate, translate_shader, DispatchGrid, Features, GenerateError, IspcOptions,
    NativeHeader, Platform, ResourceEmission, ShaderBinary, ShaderSource, ShaderStage,
};
use pretty_assertions::assert_eq;

const COMPUTE_SHADER: &str = "\
# 1 \"blur.comp.fsl\"
STRUCT(Params)
{
    DATA(float4, tint, None);
    DATA(uint2, size, None);
};
RES(CBUFFER(Params), gParams, UPDATE_FREQ_PER_FRAME, b0, binding = 0);
RES(Buffer(float4), Buf, UPDATE_FREQ_NONE, t0, binding = 1);
RES(RWBuffer(float4), gOut, UPDATE_FREQ_NONE, u0, binding = 2);
GroupShared(float4, gs_Cache[64]);
NUM_THREADS(64, 1, 1)
void CS_MAIN(SV_DispatchThreadID(uint3) id)
{
    INIT_MAIN;
    float4 c = Buf[id.x] * gParams.tint;
    gOut[id.x] = float4(c.xyz, float(id.y));
    RETURN();
}
";

fn compute_shader() -> ShaderSource {
    let mut shader = ShaderSource::new("blur.comp", ShaderStage::Comp).with_text(COMPUTE_SHADER);
    shader
        .flat_args
        .push(("SV_DispatchThreadID(uint3)".into(), "id".into()));
    shader
}

fn compute_binary() -> ShaderBinary {
    let mut binary = ShaderBinary::new("blur.comp");
    binary
        .preprocessed_srcs
        .insert(Platform::Ispc, PathBuf::from("blur.comp.fsl"));
    binary
}

fn body_lines(source: &str) -> Vec<&str> {
    let start = source.find("#endif // FSL_ISPC_H").unwrap();
    source[start..].lines().skip(2).collect()
}

#[test]
fn compute_shader_end_to_end() {
    let header = NativeHeader::load_default().unwrap();
    let translated = translate_shader(
        &compute_shader(),
        &compute_binary(),
        &header,
        IspcOptions::default(),
    );

    assert!(translated
        .source
        .starts_with("// blur.comp shader generated for ISPC from blur.comp.fsl\n#define STAGE_COMP\n"));
    assert!(translated.source.contains(header.text()));
    assert!(!translated.source.contains("ENABLE_WAVEOPS"));

    assert_eq!(
        body_lines(&translated.source),
        vec![
            "struct Params",
            "{",
            "    float<4> tint;",
            "    uint<2> size;",
            "//line 6",
            "};",
            "#define _GetgParams gParams",
            "uniform Params gParams; // RES(CBUFFER(Params), gParams, UPDATE_FREQ_PER_FRAME, b0, binding = 0);",
            "//line 7",
            "#define _GetBuf Buf",
            "uniform const float<4> * uniform Buf; // RES(Buffer(float<4>), Buf, UPDATE_FREQ_NONE, t0, binding = 1);",
            "//line 8",
            "#define _GetgOut gOut",
            "uniform float<4> * uniform gOut; // RES(RWBuffer(float<4>), gOut, UPDATE_FREQ_NONE, u0, binding = 2);",
            "//line 9",
            "#define _Getgs_Cache gs_Cache",
            "uniform float<4> gs_Cache[64];",
            "//line 10",
            "NUM_THREADS(64, 1, 1)",
            "void CS_MAIN_BLUR_impl(uniform const Params& gParams, uniform const float<4> Buf[], uniform float<4> gOut[], uint<3> id)",
            "{",
            "    INIT_MAIN;",
            "    float<4> c = Buf[id.x] * gParams.tint;",
            "    gOut[id.x] = make_float4(c.xyz, (float)(id.y));",
            "    return;",
            "}",
            "export void CS_MAIN_BLUR(uniform const Params& gParams_arg, uniform const float<4> Buf_arg[], uniform float<4> gOut_arg[], uniform uint dispatch_x, uniform uint dispatch_y, uniform uint dispatch_z) {",
            "    gParams = gParams_arg;",
            "    Buf = Buf_arg;",
            "    gOut = gOut_arg;",
            "    uniform uint total_invocations = dispatch_x * dispatch_y * dispatch_z;",
            "    foreach (invocation = 0 ... total_invocations) {",
            "        uint x = invocation % dispatch_x;",
            "        uint y = (invocation / dispatch_x) % dispatch_y;",
            "        uint z = invocation / (dispatch_x * dispatch_y);",
            "        uint<3> id = { x, y, z };",
            "        CS_MAIN_BLUR_impl(gParams_arg, Buf_arg, gOut_arg, id);",
            "    }",
            "}",
        ]
    );

    let names: Vec<_> = translated.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["gParams", "Buf", "gOut"]);
    let entry = translated.entry.unwrap();
    assert_eq!(entry.main_name, "CS_MAIN_BLUR");
    assert_eq!(entry.main_args.len(), 1);
}

#[test]
fn single_buffer_dispatch_example() {
    let mut shader = ShaderSource::new("fill.comp", ShaderStage::Comp).with_text(
        "RES(Buffer(float4), Buf, UPDATE_FREQ_NONE, t0, binding = 0);\n\
         void CS_MAIN(SV_DispatchThreadID(uint3) id)\n{\n}\n",
    );
    shader
        .flat_args
        .push(("SV_DispatchThreadID(uint3)".into(), "id".into()));
    let mut binary = ShaderBinary::new("fill.comp");
    binary
        .preprocessed_srcs
        .insert(Platform::Ispc, PathBuf::from("fill.comp.fsl"));

    let options = IspcOptions {
        resource_emission: ResourceEmission::CommentOut,
        mangle_entry_name: true,
    };
    let out = translate_shader(&shader, &binary, &NativeHeader::from_text(""), options).source;

    assert!(out.contains("// RES(Buffer(float<4>), Buf, UPDATE_FREQ_NONE, t0, binding = 0);"));
    assert!(out.contains("void CS_MAIN_FILL_impl(uniform const float<4> Buf[], uint<3> id)"));
    assert!(out.contains("export void CS_MAIN_FILL(uniform const float<4> Buf_arg[], uniform uint dispatch_x"));
    assert!(out.contains("        uint<3> id = { x, y, z };"));
    assert!(out.contains("        CS_MAIN_FILL_impl(Buf_arg, id);"));
    assert!(!out.contains("Buf = Buf_arg;"));

    let visited: Vec<_> = DispatchGrid::new(4, 1, 1).invocations().collect();
    assert_eq!(visited, vec![[0, 0, 0], [1, 0, 0], [2, 0, 0], [3, 0, 0]]);
}

#[test]
fn get_accessor_resolves_for_resources_and_group_shared() {
    let mut shader = ShaderSource::new("sum.comp", ShaderStage::Comp).with_text(
        "RES(Buffer(float), Buf, UPDATE_FREQ_NONE, t0, binding = 0);\n\
         RES(RWBuffer(float), gOut[2], UPDATE_FREQ_NONE, u0, binding = 1);\n\
         GroupShared(float, gs[4]);\n\
         void CS_MAIN(SV_DispatchThreadID(uint3) id)\n\
         {\n\
         \x20   Get(gOut)[0] = Get(Buf)[0] + Get(gs)[0];\n\
         }\n",
    );
    shader
        .flat_args
        .push(("SV_DispatchThreadID(uint3)".into(), "id".into()));
    let mut binary = ShaderBinary::new("sum.comp");
    binary
        .preprocessed_srcs
        .insert(Platform::Ispc, PathBuf::from("sum.comp.fsl"));

    for resource_emission in [ResourceEmission::CommentOut, ResourceEmission::GlobalAlias] {
        let options = IspcOptions {
            resource_emission,
            mangle_entry_name: true,
        };
        let out = translate_shader(&shader, &binary, &NativeHeader::from_text(""), options).source;
        let lines: Vec<_> = out.lines().collect();
        for alias in [
            "#define _GetBuf Buf",
            "#define _GetgOut gOut",
            "#define _Getgs gs",
        ] {
            assert!(lines.contains(&alias), "{resource_emission:?}: missing {alias}");
        }
        assert!(lines.contains(&"    Get(gOut)[0] = Get(Buf)[0] + Get(gs)[0];"));
    }
}

#[test]
fn invariant_feature_gates_precise() {
    let text = "STRUCT(VSOutput)\n{\n    DATA(float4, Position, SV_Position);\n};\n";
    let shader = ShaderSource::new("v.vert", ShaderStage::Vert).with_text(text);
    let header = NativeHeader::from_text("");

    let mut binary = ShaderBinary::new("v.vert");
    let plain = translate_shader(&shader, &binary, &header, IspcOptions::default()).source;
    assert!(plain.contains("    float<4> Position;"));
    assert!(!plain.contains("precise"));

    binary.features = Features::INVARIANT;
    let invariant = translate_shader(&shader, &binary, &header, IspcOptions::default()).source;
    assert!(invariant.contains("    precise float<4> Position;"));
}

#[test]
fn generate_writes_output_and_reports_no_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let dst = dir.path().join("blur.comp.ispc");
    let mut shader = compute_shader();
    shader.waveops_flags = fsl_ispc::WaveopsFlags::BASIC;
    let mut binary = compute_binary();

    let (code, dependencies) = generate(
        &mut binary,
        &shader,
        &NativeHeader::load_default().unwrap(),
        IspcOptions::default(),
        &dst,
    )
    .unwrap();
    assert_eq!(code, 0);
    assert!(dependencies.is_empty());
    assert_eq!(binary.waveops_flags, fsl_ispc::WaveopsFlags::BASIC);

    let written = std::fs::read_to_string(&dst).unwrap();
    assert!(written.contains("#define ENABLE_WAVEOPS(flags)\n"));
    assert!(written.ends_with("        CS_MAIN_BLUR_impl(gParams_arg, Buf_arg, gOut_arg, id);\n    }\n}\n"));
}

#[test]
fn generate_requires_ispc_source() {
    let dir = tempfile::tempdir().unwrap();
    let mut binary = ShaderBinary::new("blur.comp");
    let err = generate(
        &mut binary,
        &compute_shader(),
        &NativeHeader::from_text(""),
        IspcOptions::default(),
        &dir.path().join("out.ispc"),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        GenerateError::MissingSource {
            platform: Platform::Ispc,
            ..
        }
    ));
}

#[test]
fn io_failures_are_surfaced() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("missing.h");
    let err = NativeHeader::load(&missing).unwrap_err();
    assert!(matches!(err, GenerateError::ReadHeader { ref path, .. } if path == &missing));

    let dst = dir.path().join("no_such_dir").join("out.ispc");
    let err = generate(
        &mut compute_binary(),
        &compute_shader(),
        &NativeHeader::from_text(""),
        IspcOptions::default(),
        &dst,
    )
    .unwrap_err();
    match err {
        GenerateError::WriteOutput { path, source } => {
            assert_eq!(path, dst);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error: {other}"),
    }
}
