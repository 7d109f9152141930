//! Entry-point rewriting and dispatch wrapper synthesis.
//!
//! The platform-neutral entry point (`void CS_MAIN(SV_DispatchThreadID(uint3) id)`) is
//! turned into an internal `<main>_impl` function that receives every resource as an
//! explicit parameter. An exported `<main>` wrapper then walks the flattened dispatch
//! grid with a `foreach` loop, materializes the builtin inputs per lane and calls the
//! implementation. The wrapper and the implementation agree on argument order: resources
//! in declaration order, then the recorded builtin arguments in signature order.

use tracing::{debug, warn};

use crate::macros::{is_ident_char, macro_inner, macro_name, EntryPointMarker, DISPATCH_THREAD_ID};
use crate::resources::{ResourceDescriptor, ResourceEmission};
use crate::shader::ShaderSource;

const COORD_COMPONENTS: [&str; 3] = ["x", "y", "z"];
const WRAPPER_ARG_SUFFIX: &str = "_arg";

/// A builtin input the wrapper must materialize before calling the implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainArgDescriptor {
    pub base_type: String,
    pub name: String,
    /// Declaration statement emitted inside the wrapper's loop.
    pub arg_needed: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointRewrite {
    /// The rewritten signature line of the implementation function.
    pub line: String,
    pub main_name: String,
    pub main_args: Vec<MainArgDescriptor>,
    /// The exported wrapper, one line per element.
    pub wrapper: Vec<String>,
}

impl EntryPointRewrite {
    pub fn impl_name(&self) -> String {
        format!("{}_impl", self.main_name)
    }
}

/// Number of components of a vector type name (`uint3` -> 3); scalars are 1.
fn component_count(ty: &str) -> usize {
    ty.chars()
        .next_back()
        .and_then(|c| c.to_digit(10))
        .map_or(1, |d| d as usize)
}

/// Declaration of the dispatch coordinate inside the wrapper loop.
///
/// The second value is `true` when the declared type has more components than the grid
/// has axes; the initializer then only covers `x`, `y` and `z`.
fn dispatch_coordinate_arg(base_type: &str, name: &str) -> (MainArgDescriptor, bool) {
    let count = component_count(base_type);
    let truncated = count > COORD_COMPONENTS.len();
    let components = &COORD_COMPONENTS[..count.min(COORD_COMPONENTS.len())];
    let arg_needed = if count == 1 {
        format!("{base_type} {name} = {};", components[0])
    } else {
        format!("{base_type} {name} = {{ {} }};", components.join(", "))
    };
    let arg = MainArgDescriptor {
        base_type: base_type.to_owned(),
        name: name.to_owned(),
        arg_needed,
    };
    (arg, truncated)
}

/// Finds `<dtype> <var>` in `params` and returns the byte range covering both.
fn find_flat_param(params: &str, dtype: &str, var: &str) -> Option<std::ops::Range<usize>> {
    let mut search_from = 0;
    while let Some(rel) = params[search_from..].find(dtype) {
        let start = search_from + rel;
        let after_type = start + dtype.len();
        let tail = &params[after_type..];
        let var_start = after_type + (tail.len() - tail.trim_start().len());
        let var_end = var_start + var.len();
        if var_start > after_type
            && params[var_start..].starts_with(var)
            && !params[var_end..].starts_with(is_ident_char)
        {
            return Some(start..var_end);
        }
        search_from = after_type;
    }
    None
}

/// Rewrites the entry-point line and builds the dispatch wrapper.
///
/// `name_mangle` is appended to the entry name (`CS_MAIN` -> `CS_MAIN_<MANGLE>`) so that
/// shaders compiled into the same directory export distinct symbols.
pub fn rewrite_entry_point(
    line: &str,
    marker: &EntryPointMarker,
    resources: &[ResourceDescriptor],
    shader: &ShaderSource,
    name_mangle: Option<&str>,
    emission: ResourceEmission,
    line_number: usize,
) -> EntryPointRewrite {
    let entry_name = marker.name(line);
    let main_name = match name_mangle {
        Some(mangle) => format!("{entry_name}_{mangle}"),
        None => entry_name.to_owned(),
    };

    // Everything after the opening parenthesis of the entry point.
    let mut params = line[marker.name_span.end + 1..].to_owned();

    for (ty, var) in &shader.struct_args {
        params = params.replace(&format!("{ty}({var})"), &format!("{ty} {var}"));
    }

    let mut main_args = Vec::new();
    for (dtype, var) in &shader.flat_args {
        let Some(range) = find_flat_param(&params, dtype, var) else {
            warn!(
                line = line_number,
                "entry parameter `{dtype} {var}` not found in `{}`",
                line.trim()
            );
            continue;
        };
        let inner = macro_inner(dtype);
        if macro_name(dtype).eq_ignore_ascii_case(DISPATCH_THREAD_ID) {
            let (arg, truncated) = dispatch_coordinate_arg(inner, var);
            if truncated {
                warn!(
                    line = line_number,
                    "{DISPATCH_THREAD_ID} `{var}` has {} components but it must be 2 or 3",
                    component_count(inner)
                );
            }
            main_args.push(arg);
        } else {
            warn!(
                line = line_number,
                "builtin `{dtype}` has no CPU equivalent; `{var}` is not supplied by the dispatch wrapper"
            );
        }
        params.replace_range(range, &format!("{inner} {var}"));
    }

    let leading: Vec<String> = resources.iter().map(|res| res.param_decl("")).collect();
    let mut rewritten = String::with_capacity(line.len() + leading.len() * 32);
    rewritten.push_str(&line[..marker.name_span.start]);
    rewritten.push_str(&main_name);
    rewritten.push_str("_impl(");
    rewritten.push_str(&leading.join(", "));
    if !leading.is_empty() && !params.trim_start().starts_with(')') {
        rewritten.push_str(", ");
    }
    rewritten.push_str(&params);

    debug!(
        line = line_number,
        entry = entry_name,
        main = %main_name,
        resources = resources.len(),
        main_args = main_args.len(),
        "rewrote entry point"
    );

    let wrapper = dispatch_wrapper(&main_name, resources, &main_args, emission);
    EntryPointRewrite {
        line: rewritten,
        main_name,
        main_args,
        wrapper,
    }
}

/// The exported function mapping a flat invocation index onto the dispatch grid.
///
/// The coordinate math mirrors [`DispatchGrid::coords`].
fn dispatch_wrapper(
    main_name: &str,
    resources: &[ResourceDescriptor],
    main_args: &[MainArgDescriptor],
    emission: ResourceEmission,
) -> Vec<String> {
    let mut params = String::new();
    for res in resources {
        params.push_str(&res.param_decl(WRAPPER_ARG_SUFFIX));
        params.push_str(", ");
    }

    let call_args: Vec<String> = resources
        .iter()
        .map(|res| format!("{}{WRAPPER_ARG_SUFFIX}", res.binding_name()))
        .chain(main_args.iter().map(|arg| arg.name.clone()))
        .collect();

    let mut out = vec![format!(
        "export void {main_name}({params}uniform uint dispatch_x, uniform uint dispatch_y, uniform uint dispatch_z) {{"
    )];
    if emission.binds_globals() {
        for res in resources {
            let name = res.binding_name();
            out.push(format!("    {name} = {name}{WRAPPER_ARG_SUFFIX};"));
        }
    }
    out.extend([
        "    uniform uint total_invocations = dispatch_x * dispatch_y * dispatch_z;".to_owned(),
        "    foreach (invocation = 0 ... total_invocations) {".to_owned(),
        "        uint x = invocation % dispatch_x;".to_owned(),
        "        uint y = (invocation / dispatch_x) % dispatch_y;".to_owned(),
        "        uint z = invocation / (dispatch_x * dispatch_y);".to_owned(),
    ]);
    for arg in main_args {
        out.push(format!("        {}", arg.arg_needed));
    }
    out.push(format!("        {main_name}_impl({});", call_args.join(", ")));
    out.push("    }".to_owned());
    out.push("}".to_owned());
    out
}

/// Extent of a compute dispatch, and the flattening the generated wrapper uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchGrid {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl DispatchGrid {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn total_invocations(&self) -> u64 {
        u64::from(self.x) * u64::from(self.y) * u64::from(self.z)
    }

    /// Grid coordinates of a flat invocation index, or `None` when the index lies outside
    /// the grid (which includes every index of an empty grid).
    pub fn coords(&self, invocation: u64) -> Option<[u32; 3]> {
        if invocation >= self.total_invocations() {
            return None;
        }
        let (dx, dy) = (u64::from(self.x), u64::from(self.y));
        Some([
            (invocation % dx) as u32,
            ((invocation / dx) % dy) as u32,
            (invocation / (dx * dy)) as u32,
        ])
    }

    /// Inverse of [`DispatchGrid::coords`].
    pub fn invocation_index(&self, [x, y, z]: [u32; 3]) -> u64 {
        u64::from(x) + u64::from(self.x) * (u64::from(y) + u64::from(self.y) * u64::from(z))
    }

    /// Coordinates in the order the wrapper visits them.
    pub fn invocations(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        (0..self.total_invocations()).filter_map(|i| self.coords(i))
    }
}
