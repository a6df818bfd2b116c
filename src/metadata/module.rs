//! In-memory symbol model of a module: types and their members.
//!
//! This is the view the rewriter needs of a parsed module, not a full metadata model:
//! names, generic parameter counts, member signatures and type forwarders. Hosts
//! build it from whatever metadata reader they use (see
//! [`crate::metadata::ModuleReader`]); tests build it directly.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::metadata::{MethodDef, MethodModifiers, Module, TypeDef, TypeSig};
//!
//! let int32 = TypeSig::corlib_value("System.Runtime", "System", "Int32");
//! let math = TypeDef::new("Demo", "Math").with_method(
//!     MethodDef::new("Twice", int32.clone())
//!         .with_modifiers(MethodModifiers::STATIC)
//!         .with_parameter("value", int32),
//! );
//!
//! let module = Module::new("Demo.dll", "Demo").with_type(math);
//! assert!(module.find_type("Demo.Math").is_some());
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

use bitflags::bitflags;

use crate::metadata::{CallingConvention, TypeName, TypeSig};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    /// Method modifiers and properties
    pub struct MethodModifiers: u32 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, depending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
    }
}

/// A method parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub param_type: TypeSig,
}

/// A method definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Modifiers
    pub modifiers: MethodModifiers,
    /// Calling convention
    pub calling_convention: CallingConvention,
    /// Return type
    pub return_type: TypeSig,
    /// Parameters, excluding `this`
    pub parameters: Vec<ParamDef>,
    /// Generic parameter names
    pub generic_parameters: Vec<String>,
}

impl MethodDef {
    /// Creates an instance method without parameters.
    pub fn new(name: impl Into<String>, return_type: TypeSig) -> Self {
        MethodDef {
            name: name.into(),
            modifiers: MethodModifiers::HIDE_BY_SIG,
            calling_convention: CallingConvention::Default,
            return_type,
            parameters: Vec::new(),
            generic_parameters: Vec::new(),
        }
    }

    /// Adds modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: MethodModifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    /// Appends a parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, param_type: TypeSig) -> Self {
        self.parameters.push(ParamDef {
            name: name.into(),
            param_type,
        });
        self
    }

    /// Declares generic parameters.
    #[must_use]
    pub fn with_generic_parameters(mut self, names: &[&str]) -> Self {
        self.generic_parameters = names.iter().map(ToString::to_string).collect();
        self
    }

    /// Sets the calling convention.
    #[must_use]
    pub fn with_calling_convention(mut self, calling_convention: CallingConvention) -> Self {
        self.calling_convention = calling_convention;
        self
    }

    /// True for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(MethodModifiers::STATIC)
    }

    /// True if the method takes an implicit `this` argument.
    #[must_use]
    pub fn has_this(&self) -> bool {
        !self.is_static()
    }

    /// True if the method returns a value.
    #[must_use]
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }

    /// Parameter types, in order.
    #[must_use]
    pub fn parameter_types(&self) -> Vec<TypeSig> {
        self.parameters.iter().map(|p| p.param_type.clone()).collect()
    }

    /// Number of arguments including `this`.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.parameters.len() + usize::from(self.has_this())
    }
}

/// A field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: TypeSig,
    /// Static field
    pub is_static: bool,
}

impl FieldDef {
    /// Creates an instance field.
    pub fn new(name: impl Into<String>, field_type: TypeSig) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
            is_static: false,
        }
    }

    /// Creates a static field.
    pub fn new_static(name: impl Into<String>, field_type: TypeSig) -> Self {
        FieldDef {
            is_static: true,
            ..FieldDef::new(name, field_type)
        }
    }
}

/// A property and its accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    /// Property name
    pub name: String,
    /// Getter method
    pub getter: Option<Arc<MethodDef>>,
    /// Setter method
    pub setter: Option<Arc<MethodDef>>,
}

/// An event and its accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDef {
    /// Event name
    pub name: String,
    /// `add` accessor
    pub adder: Option<Arc<MethodDef>>,
    /// `remove` accessor
    pub remover: Option<Arc<MethodDef>>,
    /// `raise` accessor
    pub raiser: Option<Arc<MethodDef>>,
}

/// A type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Namespace, empty for nested types and the global namespace
    pub namespace: String,
    /// Simple name, including any generic arity suffix
    pub name: String,
    /// Whether this is a value type
    pub is_value_type: bool,
    /// Generic parameter names
    pub generic_parameters: Vec<String>,
    /// Methods
    pub methods: Vec<Arc<MethodDef>>,
    /// Fields
    pub fields: Vec<FieldDef>,
    /// Properties
    pub properties: Vec<PropertyDef>,
    /// Events
    pub events: Vec<EventDef>,
    /// Nested types
    pub nested_types: Vec<Arc<TypeDef>>,
}

impl TypeDef {
    /// Creates an empty class.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeDef {
            namespace: namespace.into(),
            name: name.into(),
            is_value_type: false,
            generic_parameters: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            nested_types: Vec::new(),
        }
    }

    /// Marks the type as a value type.
    #[must_use]
    pub fn value_type(mut self) -> Self {
        self.is_value_type = true;
        self
    }

    /// Declares generic parameters.
    #[must_use]
    pub fn with_generic_parameters(mut self, names: &[&str]) -> Self {
        self.generic_parameters = names.iter().map(ToString::to_string).collect();
        self
    }

    /// Adds a method.
    #[must_use]
    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a property backed by the given accessors, which are added as methods too.
    #[must_use]
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        getter: Option<MethodDef>,
        setter: Option<MethodDef>,
    ) -> Self {
        let getter = getter.map(|m| self.add_accessor(m));
        let setter = setter.map(|m| self.add_accessor(m));
        self.properties.push(PropertyDef {
            name: name.into(),
            getter,
            setter,
        });
        self
    }

    /// Adds an event backed by the given accessors, which are added as methods too.
    #[must_use]
    pub fn with_event(
        mut self,
        name: impl Into<String>,
        adder: Option<MethodDef>,
        remover: Option<MethodDef>,
        raiser: Option<MethodDef>,
    ) -> Self {
        let adder = adder.map(|m| self.add_accessor(m));
        let remover = remover.map(|m| self.add_accessor(m));
        let raiser = raiser.map(|m| self.add_accessor(m));
        self.events.push(EventDef {
            name: name.into(),
            adder,
            remover,
            raiser,
        });
        self
    }

    /// Adds a nested type.
    #[must_use]
    pub fn with_nested(mut self, nested: TypeDef) -> Self {
        self.nested_types.push(Arc::new(nested));
        self
    }

    /// The full name of a top-level type: `Namespace.Name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Looks up a directly nested type by name.
    #[must_use]
    pub fn nested(&self, name: &str) -> Option<&Arc<TypeDef>> {
        self.nested_types.iter().find(|t| t.name == name)
    }

    /// Methods with the given name.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<MethodDef>> {
        self.methods.iter().filter(move |m| m.name == name)
    }

    fn add_accessor(&mut self, method: MethodDef) -> Arc<MethodDef> {
        let method = Arc::new(
            method.with_modifiers(MethodModifiers::SPECIAL_NAME | MethodModifiers::HIDE_BY_SIG),
        );
        self.methods.push(method.clone());
        method
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// A parsed module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module file name, e.g. `Demo.dll`
    pub name: String,
    /// Name of the assembly this module belongs to
    pub assembly: String,
    /// Top-level types
    pub types: Vec<Arc<TypeDef>>,
    /// Exported types forwarded to another assembly: full name -> assembly name
    pub forwarders: HashMap<String, String>,
    /// Whether the module was compiled with optimizations
    pub optimized: bool,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>, assembly: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            assembly: assembly.into(),
            types: Vec::new(),
            forwarders: HashMap::new(),
            optimized: false,
        }
    }

    /// Adds a top-level type.
    #[must_use]
    pub fn with_type(mut self, type_def: TypeDef) -> Self {
        self.types.push(Arc::new(type_def));
        self
    }

    /// Adds a type forwarder.
    #[must_use]
    pub fn with_forwarder(mut self, full_name: impl Into<String>, target: impl Into<String>) -> Self {
        self.forwarders.insert(full_name.into(), target.into());
        self
    }

    /// Marks the module as optimized (release build).
    #[must_use]
    pub fn optimized(mut self, optimized: bool) -> Self {
        self.optimized = optimized;
        self
    }

    /// Looks up a type by full name; nested types use `Outer/Inner` or `Outer+Inner`.
    ///
    /// Returns the definition and its [`TypeName`] scoped to this module's assembly.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<(TypeName, Arc<TypeDef>)> {
        let mut path = full_name.split(['/', '+']);
        let top = path.next()?;
        let mut current = self.types.iter().find(|t| t.full_name() == top)?.clone();
        let mut name = TypeName::new(&self.assembly, &current.namespace, &current.name);
        name.is_value_type = current.is_value_type;

        for nested in path {
            let inner = current.nested(nested)?.clone();
            name = name.nested(&inner.name);
            name.is_value_type = inner.is_value_type;
            current = inner;
        }

        Some((name, current))
    }

    /// The assembly a type has been forwarded to, if any.
    #[must_use]
    pub fn forwarded_to(&self, full_name: &str) -> Option<&str> {
        let top = full_name.split(['/', '+']).next().unwrap_or(full_name);
        self.forwarders.get(top).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn void() -> TypeSig {
        TypeSig::corlib_value("System.Runtime", "System", "Void")
    }

    fn module() -> Module {
        let outer = TypeDef::new("Ns", "Outer")
            .with_nested(TypeDef::new("", "Inner").with_nested(TypeDef::new("", "Deep").value_type()));
        Module::new("Lib.dll", "Lib")
            .with_type(outer)
            .with_forwarder("Ns.Moved", "Other")
    }

    #[test]
    fn nested_lookup_accepts_both_separators() {
        let module = module();
        let (name, def) = module.find_type("Ns.Outer/Inner").unwrap();
        assert_eq!(name.full_name(), "Ns.Outer/Inner");
        assert_eq!(def.name, "Inner");

        let (name, def) = module.find_type("Ns.Outer+Inner+Deep").unwrap();
        assert_eq!(name.full_name(), "Ns.Outer/Inner/Deep");
        assert!(name.is_value_type);
        assert!(def.is_value_type);
        assert_eq!(name.scope, "Lib");
    }

    #[test]
    fn missing_types() {
        let module = module();
        assert!(module.find_type("Ns.Missing").is_none());
        assert!(module.find_type("Ns.Outer/Missing").is_none());
        assert_eq!(module.forwarded_to("Ns.Moved"), Some("Other"));
        assert_eq!(module.forwarded_to("Ns.Moved/Nested"), Some("Other"));
    }

    #[test]
    fn accessors_become_methods() {
        let def = TypeDef::new("Ns", "T").with_property(
            "Value",
            Some(MethodDef::new("get_Value", void())),
            None,
        );
        assert_eq!(def.methods.len(), 1);
        let getter = def.properties[0].getter.as_ref().unwrap();
        assert!(getter.modifiers.contains(MethodModifiers::SPECIAL_NAME));
        assert_eq!(def.methods_named("get_Value").count(), 1);
    }

    #[test]
    fn argument_count_includes_this() {
        let method = MethodDef::new("M", void()).with_parameter("a", void());
        assert_eq!(method.argument_count(), 2);
        let method = method.with_modifiers(MethodModifiers::STATIC);
        assert_eq!(method.argument_count(), 1);
    }
}
