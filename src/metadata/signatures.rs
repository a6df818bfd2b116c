//! Bound references to types, methods, fields and call-site signatures.
//!
//! These are the operand values carried by rewritten instructions. A [`TypeSig`] is a
//! structural type signature whose leaves are [`TypeName`]s scoped to a module; a
//! [`MethodRef`], [`FieldRef`] or [`CallSiteSig`] is an immutable member reference built
//! from such signatures.
//!
//! All of them render in IL assembler notation through [`std::fmt::Display`], e.g.
//! `System.Int32 System.Math::Max(System.Int32,System.Int32)`. That rendering is what
//! diagnostics show and what the marker vocabulary classification matches against.
//!
//! # Equality
//!
//! Two [`TypeName`]s are equal when their namespace, enclosing types and name match,
//! regardless of the resolution scope. A type reached through a forwarder therefore
//! compares equal to the same type referenced from its real home.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// A named type, possibly nested, together with the module scope it resolves in.
#[derive(Debug, Clone)]
pub struct TypeName {
    /// Name of the assembly (module) that defines the type
    pub scope: String,
    /// Namespace of the outermost type, empty for the global namespace
    pub namespace: String,
    /// Names of the enclosing types, outermost first
    pub enclosing: Vec<String>,
    /// Simple name, including any generic arity suffix (`List`1`)
    pub name: String,
    /// Whether the type is a value type
    pub is_value_type: bool,
}

impl TypeName {
    /// Creates a new top-level reference type name.
    pub fn new(
        scope: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        TypeName {
            scope: scope.into(),
            namespace: namespace.into(),
            enclosing: Vec::new(),
            name: name.into(),
            is_value_type: false,
        }
    }

    /// Marks this type name as a value type.
    #[must_use]
    pub fn value_type(mut self) -> Self {
        self.is_value_type = true;
        self
    }

    /// Returns the name of a type nested directly inside this one.
    #[must_use]
    pub fn nested(&self, name: impl Into<String>) -> Self {
        let mut enclosing = self.enclosing.clone();
        enclosing.push(self.name.clone());
        TypeName {
            scope: self.scope.clone(),
            namespace: self.namespace.clone(),
            enclosing,
            name: name.into(),
            is_value_type: false,
        }
    }

    /// The full IL name: `Namespace.Outer/Inner`.
    #[must_use]
    pub fn full_name(&self) -> String {
        let mut full = String::new();
        if !self.namespace.is_empty() {
            full.push_str(&self.namespace);
            full.push('.');
        }
        for outer in &self.enclosing {
            full.push_str(outer);
            full.push('/');
        }
        full.push_str(&self.name);
        full
    }

    /// Returns `true` if this type lives in `namespace` or one of its sub-namespaces.
    #[must_use]
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace == namespace
            || (self.namespace.len() > namespace.len()
                && self.namespace.starts_with(namespace)
                && self.namespace.as_bytes()[namespace.len()] == b'.')
    }

    /// Returns `true` if this is the named type in the given namespace.
    #[must_use]
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.enclosing.is_empty() && self.namespace == namespace && self.name == name
    }
}

impl PartialEq for TypeName {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace
            && self.name == other.name
            && self.enclosing == other.enclosing
    }
}

impl Eq for TypeName {}

impl Hash for TypeName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.enclosing.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Who owns a generic parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericParamOwner {
    /// Declared on the enclosing type (`!N`)
    Type,
    /// Declared on the method (`!!N`)
    Method,
}

/// A structural type signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// A named class or value type
    Named(Arc<TypeName>),
    /// A generic parameter placeholder
    GenericParam {
        /// Type or method parameter
        owner: GenericParamOwner,
        /// Position in the owner's generic parameter list
        index: u32,
    },
    /// Unmanaged pointer `T*`
    Pointer(Box<TypeSig>),
    /// Managed reference `T&`
    ByRef(Box<TypeSig>),
    /// Array of the given rank; rank 1 is the vector form `T[]`
    Array {
        /// Element type
        element: Box<TypeSig>,
        /// Number of dimensions, at least 1
        rank: u32,
    },
    /// A closed or partially open generic instantiation
    GenericInstance {
        /// The generic type definition
        definition: Arc<TypeName>,
        /// One argument per generic parameter of the definition
        arguments: Vec<TypeSig>,
    },
    /// A type with a custom modifier attached
    Modified {
        /// `modreq` when true, `modopt` otherwise
        required: bool,
        /// The modifier type
        modifier: Box<TypeSig>,
        /// The modified type
        element: Box<TypeSig>,
    },
    /// A pinned local type
    Pinned(Box<TypeSig>),
}

impl TypeSig {
    /// Creates a named type signature.
    #[must_use]
    pub fn named(name: TypeName) -> Self {
        TypeSig::Named(Arc::new(name))
    }

    /// Shorthand for a type in the core library.
    #[must_use]
    pub fn corlib(scope: &str, namespace: &str, name: &str) -> Self {
        TypeSig::named(TypeName::new(scope, namespace, name))
    }

    /// Shorthand for a value type in the core library.
    #[must_use]
    pub fn corlib_value(scope: &str, namespace: &str, name: &str) -> Self {
        TypeSig::named(TypeName::new(scope, namespace, name).value_type())
    }

    /// Wraps this type in a pointer.
    #[must_use]
    pub fn pointer(self) -> Self {
        TypeSig::Pointer(Box::new(self))
    }

    /// Wraps this type in a managed reference.
    #[must_use]
    pub fn by_ref(self) -> Self {
        TypeSig::ByRef(Box::new(self))
    }

    /// Wraps this type in an array of the given rank.
    #[must_use]
    pub fn array(self, rank: u32) -> Self {
        TypeSig::Array {
            element: Box::new(self),
            rank,
        }
    }

    /// Returns the named type at the root of this signature, if any.
    ///
    /// For a generic instance this is the generic definition.
    #[must_use]
    pub fn type_name(&self) -> Option<&Arc<TypeName>> {
        match self {
            TypeSig::Named(name) => Some(name),
            TypeSig::GenericInstance { definition, .. } => Some(definition),
            _ => None,
        }
    }

    /// Returns `true` for `T&`, looking through custom modifiers.
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        match self {
            TypeSig::ByRef(_) => true,
            TypeSig::Modified { element, .. } => element.is_by_ref(),
            _ => false,
        }
    }

    /// Returns `true` for `System.Void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSig::Named(name) if name.is("System", "Void"))
    }

    /// Returns `true` for a pinned signature.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        matches!(self, TypeSig::Pinned(_))
    }

    /// Returns `true` if any type in this signature lives in `namespace`.
    #[must_use]
    pub fn references_namespace(&self, namespace: &str) -> bool {
        match self {
            TypeSig::Named(name) => name.in_namespace(namespace),
            TypeSig::GenericParam { .. } => false,
            TypeSig::Pointer(inner) | TypeSig::ByRef(inner) | TypeSig::Pinned(inner) => {
                inner.references_namespace(namespace)
            }
            TypeSig::Array { element, .. } => element.references_namespace(namespace),
            TypeSig::GenericInstance {
                definition,
                arguments,
            } => {
                definition.in_namespace(namespace)
                    || arguments.iter().any(|a| a.references_namespace(namespace))
            }
            TypeSig::Modified {
                modifier, element, ..
            } => modifier.references_namespace(namespace) || element.references_namespace(namespace),
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Named(name) => write!(f, "{name}"),
            TypeSig::GenericParam {
                owner: GenericParamOwner::Type,
                index,
            } => write!(f, "!{index}"),
            TypeSig::GenericParam {
                owner: GenericParamOwner::Method,
                index,
            } => write!(f, "!!{index}"),
            TypeSig::Pointer(inner) => write!(f, "{inner}*"),
            TypeSig::ByRef(inner) => write!(f, "{inner}&"),
            TypeSig::Array { element, rank } => {
                write!(f, "{element}[")?;
                for _ in 1..*rank {
                    f.write_str(",")?;
                }
                f.write_str("]")
            }
            TypeSig::GenericInstance {
                definition,
                arguments,
            } => {
                write!(f, "{definition}<")?;
                write_list(f, arguments)?;
                f.write_str(">")
            }
            TypeSig::Modified {
                required,
                modifier,
                element,
            } => {
                let keyword = if *required { "modreq" } else { "modopt" };
                write!(f, "{element} {keyword}({modifier})")
            }
            TypeSig::Pinned(inner) => write!(f, "{inner} pinned"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[TypeSig]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Managed and unmanaged calling conventions (ECMA-335 II.23.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    /// Managed default convention
    #[default]
    Default,
    /// Managed vararg convention
    VarArg,
    /// Unmanaged cdecl
    C,
    /// Unmanaged stdcall
    StdCall,
    /// Unmanaged thiscall
    ThisCall,
    /// Unmanaged fastcall
    FastCall,
    /// Platform default unmanaged convention
    Unmanaged,
}

impl CallingConvention {
    fn keyword(self) -> Option<&'static str> {
        match self {
            CallingConvention::Default => None,
            CallingConvention::VarArg => Some("vararg"),
            CallingConvention::C => Some("unmanaged cdecl"),
            CallingConvention::StdCall => Some("unmanaged stdcall"),
            CallingConvention::ThisCall => Some("unmanaged thiscall"),
            CallingConvention::FastCall => Some("unmanaged fastcall"),
            CallingConvention::Unmanaged => Some("unmanaged"),
        }
    }
}

/// A reference to a method, as carried by `call`, `newobj`, `ldftn` and friends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// The type declaring the method (possibly a generic instance)
    pub declaring_type: TypeSig,
    /// Method name
    pub name: String,
    /// Instance method
    pub has_this: bool,
    /// The `this` parameter is listed explicitly in `parameters`
    pub explicit_this: bool,
    /// Calling convention
    pub calling_convention: CallingConvention,
    /// Return type
    pub return_type: TypeSig,
    /// Declared parameter types
    pub parameters: Vec<TypeSig>,
    /// Number of generic parameters of the method definition
    pub generic_arity: u32,
    /// Generic arguments, empty unless this is a generic method instantiation
    pub generic_arguments: Vec<TypeSig>,
    /// Optional trailing parameter types supplied at a vararg call site
    pub optional_parameters: Option<Vec<TypeSig>>,
}

impl MethodRef {
    /// Number of stack slots consumed by a `call` to this method.
    #[must_use]
    pub fn call_pops(&self) -> usize {
        let this = usize::from(self.has_this && !self.explicit_this);
        this + self.parameters.len() + self.optional_parameters.as_ref().map_or(0, Vec::len)
    }

    /// Number of stack slots consumed by a `newobj` of this constructor.
    #[must_use]
    pub fn newobj_pops(&self) -> usize {
        self.parameters.len()
    }

    /// Returns `true` if the method returns a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }

    /// Returns `true` if any type in this reference lives in `namespace`.
    #[must_use]
    pub fn references_namespace(&self, namespace: &str) -> bool {
        self.declaring_type.references_namespace(namespace)
            || self.return_type.references_namespace(namespace)
            || self
                .parameters
                .iter()
                .chain(self.generic_arguments.iter())
                .chain(self.optional_parameters.iter().flatten())
                .any(|t| t.references_namespace(namespace))
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(keyword) = self.calling_convention.keyword() {
            write!(f, "{keyword} ")?;
        }
        if self.has_this {
            f.write_str("instance ")?;
        }
        write!(f, "{} {}::{}", self.return_type, self.declaring_type, self.name)?;
        if !self.generic_arguments.is_empty() {
            f.write_str("<")?;
            write_list(f, &self.generic_arguments)?;
            f.write_str(">")?;
        }
        f.write_str("(")?;
        write_list(f, &self.parameters)?;
        if let Some(optional) = &self.optional_parameters {
            f.write_str(",...")?;
            if !optional.is_empty() {
                f.write_str(",")?;
                write_list(f, optional)?;
            }
        }
        f.write_str(")")
    }
}

/// A reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// The type declaring the field
    pub declaring_type: TypeSig,
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: TypeSig,
    /// Static field
    pub is_static: bool,
}

impl FieldRef {
    /// Returns `true` if any type in this reference lives in `namespace`.
    #[must_use]
    pub fn references_namespace(&self, namespace: &str) -> bool {
        self.declaring_type.references_namespace(namespace)
            || self.field_type.references_namespace(namespace)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.field_type, self.declaring_type, self.name)
    }
}

/// A stand-alone method signature, the operand of `calli`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSiteSig {
    /// Calling convention
    pub calling_convention: CallingConvention,
    /// Instance signature
    pub has_this: bool,
    /// The `this` parameter is listed explicitly in `parameters`
    pub explicit_this: bool,
    /// Return type
    pub return_type: TypeSig,
    /// Declared parameter types
    pub parameters: Vec<TypeSig>,
    /// Optional trailing parameter types for vararg signatures
    pub optional_parameters: Option<Vec<TypeSig>>,
}

impl CallSiteSig {
    /// Number of stack slots consumed by `calli`, including the function pointer.
    #[must_use]
    pub fn call_pops(&self) -> usize {
        let this = usize::from(self.has_this && !self.explicit_this);
        1 + this + self.parameters.len() + self.optional_parameters.as_ref().map_or(0, Vec::len)
    }

    /// Returns `true` if any type in this signature lives in `namespace`.
    #[must_use]
    pub fn references_namespace(&self, namespace: &str) -> bool {
        self.return_type.references_namespace(namespace)
            || self
                .parameters
                .iter()
                .chain(self.optional_parameters.iter().flatten())
                .any(|t| t.references_namespace(namespace))
    }
}

impl fmt::Display for CallSiteSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(keyword) = self.calling_convention.keyword() {
            write!(f, "{keyword} ")?;
        }
        if self.has_this {
            f.write_str("instance ")?;
        }
        write!(f, "{} *(", self.return_type)?;
        write_list(f, &self.parameters)?;
        if let Some(optional) = &self.optional_parameters {
            f.write_str(",...")?;
            if !optional.is_empty() {
                f.write_str(",")?;
                write_list(f, optional)?;
            }
        }
        f.write_str(")")
    }
}
