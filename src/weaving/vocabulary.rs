//! Classification of calls into the marker vocabulary.
//!
//! Every call site is classified exactly once into a [`MarkerCall`]. The classification
//! looks at the declaring type of the called method (relative to the marker namespace),
//! the method name and the parameter types, so overloads such as
//! `MethodRef(TypeRef, string)` and `MethodRef(TypeRef, string, TypeRef[])` map to
//! distinct variants.
//!
//! Three groups of calls are recognized:
//!
//! - [`IlCall`] - the `IL` primitives (push, pop, labels, locals, returns)
//! - `IL.Emit` methods - one per opcode, see [`EmitArgument`]
//! - [`BuilderCall`] - reference builders (`TypeRef`, `MethodRef`, `FieldRef`,
//!   `StandAloneMethodSig`, `LocalVar`) together with the `System.Type` and
//!   `System.Array` helpers the compiler emits for `typeof` and empty `params` arrays
//!
//! Builders never appear on their own: they are argument expressions, consumed while
//! rewriting the `IL` or `IL.Emit` call they feed.

use crate::{
    assembly::OpCode,
    metadata::{MethodRef, TypeSig},
    Result,
};

/// An `IL` primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IlCall {
    /// `IL.Push<T>(T)`
    Push,
    /// `IL.PushInRef<T>(in T)`
    PushInRef,
    /// `IL.PushOutRef<T>(out T)`
    PushOutRef,
    /// `IL.Pop<T>(out T)`
    Pop,
    /// `IL.Unreachable()`
    Unreachable,
    /// `IL.Return<T>()`
    Return,
    /// `IL.ReturnRef<T>()`
    ReturnRef,
    /// `IL.ReturnPointer<T>()` and `IL.ReturnPointer()`
    ReturnPointer,
    /// `IL.MarkLabel(string)`
    MarkLabel,
    /// `IL.DeclareLocals(...)`
    DeclareLocals {
        /// The overload with a leading `bool init` parameter
        has_init_flag: bool,
    },
}

/// The parameter kind of an `IL.Emit` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmitArgument {
    /// No parameter
    None,
    /// `sbyte`
    Int8,
    /// `byte`
    UInt8,
    /// `short`
    Int16,
    /// `ushort`
    UInt16,
    /// `int`
    Int32,
    /// `uint`
    UInt32,
    /// `long`
    Int64,
    /// `ulong`
    UInt64,
    /// `float`
    Float32,
    /// `double`
    Float64,
    /// `string`: literal, label, local or parameter name depending on the opcode
    String,
    /// `string[]`: switch labels
    StringArray,
    /// `TypeRef`
    TypeRef,
    /// `MethodRef`
    MethodRef,
    /// `FieldRef`
    FieldRef,
    /// `StandAloneMethodSig`
    StandAloneSig,
}

impl EmitArgument {
    /// Returns `true` for the integer kinds.
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            EmitArgument::Int8
                | EmitArgument::UInt8
                | EmitArgument::Int16
                | EmitArgument::UInt16
                | EmitArgument::Int32
                | EmitArgument::UInt32
                | EmitArgument::Int64
                | EmitArgument::UInt64
        )
    }

    fn from_parameter(parameter: &str) -> Option<Self> {
        Some(match parameter {
            "System.SByte" => EmitArgument::Int8,
            "System.Byte" => EmitArgument::UInt8,
            "System.Int16" => EmitArgument::Int16,
            "System.UInt16" => EmitArgument::UInt16,
            "System.Int32" => EmitArgument::Int32,
            "System.UInt32" => EmitArgument::UInt32,
            "System.Int64" => EmitArgument::Int64,
            "System.UInt64" => EmitArgument::UInt64,
            "System.Single" => EmitArgument::Float32,
            "System.Double" => EmitArgument::Float64,
            "System.String" => EmitArgument::String,
            "System.String[]" => EmitArgument::StringArray,
            "TypeRef" => EmitArgument::TypeRef,
            "MethodRef" => EmitArgument::MethodRef,
            "FieldRef" => EmitArgument::FieldRef,
            "StandAloneMethodSig" => EmitArgument::StandAloneSig,
            _ => return None,
        })
    }
}

/// A reference builder call, only valid as an argument expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuilderCall {
    /// `new TypeRef(Type)` and the implicit conversion from `Type`
    TypeRefFromType,
    /// `new TypeRef(string assemblyName, string typeName)`
    TypeRefFromName,
    /// `TypeRef.Type<T>()`
    TypeRefOf,
    /// `TypeRef.MakePointerType()`
    TypeRefPointer,
    /// `TypeRef.MakeByRefType()`
    TypeRefByRef,
    /// `TypeRef.MakeArrayType()`
    TypeRefArray,
    /// `TypeRef.MakeArrayType(int rank)`
    TypeRefArrayRank,
    /// `TypeRef.MakeGenericType(params TypeRef[])`
    TypeRefGeneric,
    /// `TypeRef.WithOptionalModifier(TypeRef)` / `WithRequiredModifier(TypeRef)`
    TypeRefModifier {
        /// `modreq` rather than `modopt`
        required: bool,
    },
    /// `TypeRef.TypeGenericParameters`
    TypeGenericParameters,
    /// `TypeRef.MethodGenericParameters`
    MethodGenericParameters,
    /// `GenericParameters[int]`
    GenericParameter,
    /// `Type.GetTypeFromHandle(RuntimeTypeHandle)`, the tail of `typeof(T)`
    TypeFromHandle,
    /// `Type.MakePointerType()`
    TypePointer,
    /// `Type.MakeByRefType()`
    TypeByRef,
    /// `Type.MakeArrayType()`
    TypeArray,
    /// `Type.MakeArrayType(int rank)`
    TypeArrayRank,
    /// `Type.MakeGenericType(params Type[])`
    TypeGeneric,
    /// `Array.Empty<T>()`, emitted for empty `params` arrays
    ArrayEmpty,
    /// `new MethodRef(...)` / `MethodRef.Method(...)`
    MethodRefByName {
        /// Takes a generic parameter count
        generic_arity: bool,
        /// Takes a parameter type list
        parameters: bool,
    },
    /// `MethodRef.PropertyGet(TypeRef, string)`
    PropertyGet,
    /// `MethodRef.PropertySet(TypeRef, string)`
    PropertySet,
    /// `MethodRef.EventAdd(TypeRef, string)`
    EventAdd,
    /// `MethodRef.EventRemove(TypeRef, string)`
    EventRemove,
    /// `MethodRef.EventRaise(TypeRef, string)`
    EventRaise,
    /// `MethodRef.Constructor(TypeRef, params TypeRef[])`
    Constructor,
    /// `MethodRef.TypeInitializer(TypeRef)`
    TypeInitializer,
    /// `MethodRef.Operator(TypeRef, UnaryOperator)`
    UnaryOperator,
    /// `MethodRef.Operator(TypeRef, BinaryOperator, TypeRef, TypeRef)`
    BinaryOperator,
    /// `MethodRef.Operator(TypeRef, ConversionOperator, ConversionDirection, TypeRef)`
    ConversionOperator,
    /// `MethodRef.MakeGenericMethod(params TypeRef[])`
    MethodRefGeneric,
    /// `MethodRef.WithOptionalParameters(params TypeRef[])`
    MethodRefOptionalParameters,
    /// `new FieldRef(TypeRef, string)` / `FieldRef.Field(TypeRef, string)`
    FieldRef,
    /// `StandAloneMethodSig.ManagedMethod(CallingConventions, TypeRef, params TypeRef[])`
    ManagedSignature,
    /// `StandAloneMethodSig.UnmanagedMethod(CallingConvention, TypeRef, params TypeRef[])`
    UnmanagedSignature,
    /// `StandAloneMethodSig.WithOptionalParameters(params TypeRef[])`
    SignatureOptionalParameters,
    /// `new LocalVar(...)`
    LocalVar {
        /// Takes a name first
        named: bool,
        /// The type is a `System.Type` rather than a `TypeRef`
        system_type: bool,
    },
    /// `LocalVar.Pinned()`
    LocalVarPinned,
}

/// A classified marker vocabulary call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerCall {
    /// An `IL` primitive
    Il(IlCall),
    /// An `IL.Emit` method
    Emit {
        /// The opcode named by the method
        opcode: OpCode,
        /// Kind of the single parameter
        argument: EmitArgument,
    },
    /// A reference builder
    Builder(BuilderCall),
}

/// Classifies a called method.
///
/// Returns `Ok(None)` for calls outside the vocabulary.
///
/// # Errors
///
/// Returns a pattern mismatch error for a method of the marker namespace that is not
/// part of the known vocabulary, e.g. a newer API version.
pub fn classify(method: &MethodRef, namespace: &str) -> Result<Option<MarkerCall>> {
    let Some(owner) = method.declaring_type.type_name() else {
        return Ok(None);
    };

    if owner.is("System", "Type") {
        return Ok(system_type(&method.name, method.parameters.len()).map(MarkerCall::Builder));
    }
    if owner.is("System", "Array") {
        return Ok((method.name == "Empty" && method.generic_arguments.len() == 1)
            .then_some(MarkerCall::Builder(BuilderCall::ArrayEmpty)));
    }
    if !owner.in_namespace(namespace) {
        return Ok(None);
    }

    let full_name = owner.full_name();
    let relative = full_name
        .strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(&full_name);
    let parameters: Vec<String> = method
        .parameters
        .iter()
        .map(|p| parameter_key(p, namespace))
        .collect();
    let parameters: Vec<&str> = parameters.iter().map(String::as_str).collect();
    let name = method.name.as_str();

    let call = match relative {
        "IL" => il(name, &parameters).map(MarkerCall::Il),
        "IL/Emit" => emit(name, &parameters),
        "TypeRef" => type_ref(name, &parameters).map(MarkerCall::Builder),
        "GenericParameters" => (name == "get_Item")
            .then_some(MarkerCall::Builder(BuilderCall::GenericParameter)),
        "MethodRef" => method_ref(name, &parameters).map(MarkerCall::Builder),
        "FieldRef" => matches!(name, ".ctor" | "Field")
            .then_some(MarkerCall::Builder(BuilderCall::FieldRef)),
        "StandAloneMethodSig" => signature(name).map(MarkerCall::Builder),
        "LocalVar" => local_var(name, &parameters).map(MarkerCall::Builder),
        _ => None,
    };

    call.map(Some).ok_or_else(|| {
        weaving_error!(
            PatternMismatch,
            None,
            "Unsupported method of the {} vocabulary: {}",
            namespace,
            method
        )
    })
}

/// Parameter display with marker types shortened to their namespace-relative name.
fn parameter_key(parameter: &TypeSig, namespace: &str) -> String {
    parameter
        .to_string()
        .replace(&format!("{namespace}."), "")
}

fn il(name: &str, parameters: &[&str]) -> Option<IlCall> {
    Some(match name {
        "Push" => IlCall::Push,
        "PushInRef" => IlCall::PushInRef,
        "PushOutRef" => IlCall::PushOutRef,
        "Pop" => IlCall::Pop,
        "Unreachable" => IlCall::Unreachable,
        "Return" => IlCall::Return,
        "ReturnRef" => IlCall::ReturnRef,
        "ReturnPointer" => IlCall::ReturnPointer,
        "MarkLabel" => IlCall::MarkLabel,
        "DeclareLocals" => IlCall::DeclareLocals {
            has_init_flag: parameters.first() == Some(&"System.Boolean"),
        },
        _ => return None,
    })
}

fn emit(name: &str, parameters: &[&str]) -> Option<MarkerCall> {
    let opcode = OpCode::from_emit_name(name)?;
    let argument = match parameters {
        [] => EmitArgument::None,
        [parameter] => EmitArgument::from_parameter(parameter)?,
        _ => return None,
    };
    Some(MarkerCall::Emit { opcode, argument })
}

fn type_ref(name: &str, parameters: &[&str]) -> Option<BuilderCall> {
    Some(match (name, parameters) {
        (".ctor" | "op_Implicit", ["System.Type"]) => BuilderCall::TypeRefFromType,
        (".ctor", ["System.String", "System.String"]) => BuilderCall::TypeRefFromName,
        ("Type", []) => BuilderCall::TypeRefOf,
        ("MakePointerType", []) => BuilderCall::TypeRefPointer,
        ("MakeByRefType", []) => BuilderCall::TypeRefByRef,
        ("MakeArrayType", []) => BuilderCall::TypeRefArray,
        ("MakeArrayType", ["System.Int32"]) => BuilderCall::TypeRefArrayRank,
        ("MakeGenericType", ["TypeRef[]"]) => BuilderCall::TypeRefGeneric,
        ("WithOptionalModifier", ["TypeRef"]) => BuilderCall::TypeRefModifier { required: false },
        ("WithRequiredModifier", ["TypeRef"]) => BuilderCall::TypeRefModifier { required: true },
        ("get_TypeGenericParameters", []) => BuilderCall::TypeGenericParameters,
        ("get_MethodGenericParameters", []) => BuilderCall::MethodGenericParameters,
        _ => return None,
    })
}

fn system_type(name: &str, parameters: usize) -> Option<BuilderCall> {
    Some(match (name, parameters) {
        ("GetTypeFromHandle", 1) => BuilderCall::TypeFromHandle,
        ("MakePointerType", 0) => BuilderCall::TypePointer,
        ("MakeByRefType", 0) => BuilderCall::TypeByRef,
        ("MakeArrayType", 0) => BuilderCall::TypeArray,
        ("MakeArrayType", 1) => BuilderCall::TypeArrayRank,
        ("MakeGenericType", 1) => BuilderCall::TypeGeneric,
        _ => return None,
    })
}

fn method_ref(name: &str, parameters: &[&str]) -> Option<BuilderCall> {
    Some(match (name, parameters) {
        (".ctor" | "Method", ["TypeRef", "System.String"]) => BuilderCall::MethodRefByName {
            generic_arity: false,
            parameters: false,
        },
        (".ctor" | "Method", ["TypeRef", "System.String", "TypeRef[]"]) => {
            BuilderCall::MethodRefByName {
                generic_arity: false,
                parameters: true,
            }
        }
        (".ctor" | "Method", ["TypeRef", "System.String", "System.Int32", "TypeRef[]"]) => {
            BuilderCall::MethodRefByName {
                generic_arity: true,
                parameters: true,
            }
        }
        ("PropertyGet", [_, _]) => BuilderCall::PropertyGet,
        ("PropertySet", [_, _]) => BuilderCall::PropertySet,
        ("EventAdd", [_, _]) => BuilderCall::EventAdd,
        ("EventRemove", [_, _]) => BuilderCall::EventRemove,
        ("EventRaise", [_, _]) => BuilderCall::EventRaise,
        ("Constructor", ["TypeRef", "TypeRef[]"]) => BuilderCall::Constructor,
        ("TypeInitializer", ["TypeRef"]) => BuilderCall::TypeInitializer,
        ("Operator", ["TypeRef", "UnaryOperator"]) => BuilderCall::UnaryOperator,
        ("Operator", ["TypeRef", "BinaryOperator", "TypeRef", "TypeRef"]) => {
            BuilderCall::BinaryOperator
        }
        ("Operator", ["TypeRef", "ConversionOperator", "ConversionDirection", "TypeRef"]) => {
            BuilderCall::ConversionOperator
        }
        ("MakeGenericMethod", ["TypeRef[]"]) => BuilderCall::MethodRefGeneric,
        ("WithOptionalParameters", ["TypeRef[]"]) => BuilderCall::MethodRefOptionalParameters,
        _ => return None,
    })
}

fn signature(name: &str) -> Option<BuilderCall> {
    Some(match name {
        "ManagedMethod" => BuilderCall::ManagedSignature,
        "UnmanagedMethod" => BuilderCall::UnmanagedSignature,
        "WithOptionalParameters" => BuilderCall::SignatureOptionalParameters,
        _ => return None,
    })
}

fn local_var(name: &str, parameters: &[&str]) -> Option<BuilderCall> {
    Some(match (name, parameters) {
        (".ctor", ["TypeRef"]) => BuilderCall::LocalVar {
            named: false,
            system_type: false,
        },
        (".ctor", ["System.Type"]) => BuilderCall::LocalVar {
            named: false,
            system_type: true,
        },
        (".ctor", ["System.String", "TypeRef"]) => BuilderCall::LocalVar {
            named: true,
            system_type: false,
        },
        (".ctor", ["System.String", "System.Type"]) => BuilderCall::LocalVar {
            named: true,
            system_type: true,
        },
        ("Pinned", []) => BuilderCall::LocalVarPinned,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{self, marker_type, static_method};

    #[test]
    fn il_primitives() {
        let push = test::il_method("Push", vec![test::method_param(0)]);
        assert_eq!(
            classify(&push, "InlineIL").unwrap(),
            Some(MarkerCall::Il(IlCall::Push))
        );

        let declare = test::il_method(
            "DeclareLocals",
            vec![test::boolean(), marker_type("LocalVar").array(1)],
        );
        assert_eq!(
            classify(&declare, "InlineIL").unwrap(),
            Some(MarkerCall::Il(IlCall::DeclareLocals { has_init_flag: true }))
        );
    }

    #[test]
    fn emit_methods() {
        let method = test::emit_method("Ldc_I4_S", Some(test::corlib_value("SByte")));
        assert_eq!(
            classify(&method, "InlineIL").unwrap(),
            Some(MarkerCall::Emit {
                opcode: OpCode::LdcI4S,
                argument: EmitArgument::Int8
            })
        );

        let method = test::emit_method("Tail", None);
        assert_eq!(
            classify(&method, "InlineIL").unwrap(),
            Some(MarkerCall::Emit {
                opcode: OpCode::Tail,
                argument: EmitArgument::None
            })
        );

        let method = test::emit_method("Switch", Some(test::string().array(1)));
        assert!(matches!(
            classify(&method, "InlineIL").unwrap(),
            Some(MarkerCall::Emit {
                argument: EmitArgument::StringArray,
                ..
            })
        ));
    }

    #[test]
    fn builder_overloads() {
        let by_name = static_method(
            marker_type("MethodRef"),
            "Method",
            marker_type("MethodRef"),
            vec![marker_type("TypeRef"), test::string(), marker_type("TypeRef").array(1)],
        );
        assert_eq!(
            classify(&by_name, "InlineIL").unwrap(),
            Some(MarkerCall::Builder(BuilderCall::MethodRefByName {
                generic_arity: false,
                parameters: true
            }))
        );

        let from_handle = static_method(
            test::corlib("Type"),
            "GetTypeFromHandle",
            test::corlib("Type"),
            vec![test::corlib_value("RuntimeTypeHandle")],
        );
        assert_eq!(
            classify(&from_handle, "InlineIL").unwrap(),
            Some(MarkerCall::Builder(BuilderCall::TypeFromHandle))
        );
    }

    #[test]
    fn unrelated_and_unknown_calls() {
        let max = static_method(
            test::corlib("Math"),
            "Max",
            test::int32(),
            vec![test::int32(), test::int32()],
        );
        assert_eq!(classify(&max, "InlineIL").unwrap(), None);

        let unknown = test::il_method("Frobnicate", vec![]);
        let error = classify(&unknown, "InlineIL").unwrap_err();
        assert_eq!(error.kind(), Some(crate::ErrorKind::PatternMismatch));

        let other_namespace = test::il_method("Push", vec![test::method_param(0)]);
        assert_eq!(classify(&other_namespace, "Other").unwrap(), None);
    }
}
