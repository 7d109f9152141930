//! Resource and group-shared declarations.

use crate::macros::{array_base_name, is_array, macro_inner, GroupSharedDecl, ResourceDecl};

/// How `RES(...)` declaration lines are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceEmission {
    /// Comment the declaration out. The entry point receives every resource as a
    /// parameter, so nothing else is needed at file scope.
    CommentOut,
    /// Replace the declaration with a file-scope handle (plain variable for uniform
    /// buffers, pointer for everything else) followed by the original line as a comment.
    /// The dispatch wrapper binds the handles before iterating.
    #[default]
    GlobalAlias,
}

impl ResourceEmission {
    pub fn binds_globals(self) -> bool {
        matches!(self, ResourceEmission::GlobalAlias)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Type as written in the macro, e.g. `RWBuffer(float4)`.
    pub declared_type: String,
    /// Element type, e.g. `float4`.
    pub base_type: String,
    /// Name as written in the macro, possibly with array syntax.
    pub name: String,
    pub base_name: String,
    pub is_array: bool,
    pub is_readonly: bool,
}

impl ResourceDescriptor {
    pub fn from_decl(decl: &ResourceDecl<'_>) -> Self {
        let declared_type = decl.declared_type;
        Self {
            declared_type: declared_type.to_owned(),
            base_type: macro_inner(declared_type).to_owned(),
            name: decl.name.to_owned(),
            base_name: array_base_name(decl.name).to_owned(),
            is_array: is_array(decl.name),
            is_readonly: !(declared_type.contains("RW") || declared_type.starts_with('W')),
        }
    }

    pub fn is_uniform_buffer(&self) -> bool {
        self.declared_type.contains("CBUFFER")
    }

    /// A single uniform buffer is passed by reference; arrays of them go through the
    /// pointer path like every other resource.
    fn is_by_reference(&self) -> bool {
        self.is_uniform_buffer() && !self.is_array
    }

    fn const_qualifier(&self) -> &'static str {
        if self.is_readonly {
            "const "
        } else {
            ""
        }
    }

    /// Name of the file-scope handle and of the implementation-function parameter.
    pub fn binding_name(&self) -> &str {
        &self.base_name
    }

    pub fn global_decl(&self) -> String {
        if self.is_by_reference() {
            format!("uniform {} {};", self.base_type, self.name)
        } else {
            format!(
                "uniform {}{} * uniform {};",
                self.const_qualifier(),
                self.base_type,
                self.base_name
            )
        }
    }

    /// Parameter declaration named `<binding name><suffix>`.
    pub fn param_decl(&self, suffix: &str) -> String {
        if self.is_by_reference() {
            format!("uniform const {}& {}{suffix}", self.base_type, self.base_name)
        } else {
            format!(
                "uniform {}{} {}{suffix}[]",
                self.const_qualifier(),
                self.base_type,
                self.base_name
            )
        }
    }
}

/// `Get(name)` resolves through this alias (see `Get` in the native header).
fn accessor_alias(base_name: &str) -> String {
    format!("#define _Get{base_name} {base_name}")
}

/// The accessor alias and the rewritten text of a resource declaration line.
pub fn resource_lines(
    resource: &ResourceDescriptor,
    original: &str,
    emission: ResourceEmission,
) -> [String; 2] {
    let declaration = match emission {
        ResourceEmission::CommentOut => format!("// {}", original.trim_start()),
        ResourceEmission::GlobalAlias => {
            format!("{} // {}", resource.global_decl(), original.trim_start())
        }
    };
    [accessor_alias(resource.binding_name()), declaration]
}

/// The accessor alias and the native declaration for a group-shared variable.
pub fn group_shared_lines(decl: &GroupSharedDecl<'_>) -> [String; 2] {
    [
        accessor_alias(array_base_name(decl.declared_name)),
        format!("uniform {} {};", decl.element_type, decl.declared_name),
    ]
}
