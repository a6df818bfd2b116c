//! Shared fixtures for unit tests.
//!
//! Provides a small symbol space with a reference library (`TestLib`), builders for
//! marker vocabulary method references and the instruction shapes a C# compiler emits
//! for their arguments.

pub(crate) mod eval;

use std::sync::Arc;

use crate::{
    assembly::{Instruction, OpCode, Operand},
    metadata::{
        CallingConvention, FieldDef, GenericParamOwner, MethodDef, MethodModifiers, MethodRef,
        Module, SymbolSpace, TypeDef, TypeName, TypeSig,
    },
};

pub const CORE_LIBRARY: &str = "System.Runtime";
pub const MARKER_NAMESPACE: &str = "InlineIL";

pub fn corlib(name: &str) -> TypeSig {
    TypeSig::corlib(CORE_LIBRARY, "System", name)
}

pub fn corlib_value(name: &str) -> TypeSig {
    TypeSig::corlib_value(CORE_LIBRARY, "System", name)
}

pub fn int32() -> TypeSig {
    corlib_value("Int32")
}

pub fn boolean() -> TypeSig {
    corlib_value("Boolean")
}

pub fn string() -> TypeSig {
    corlib("String")
}

pub fn void() -> TypeSig {
    corlib_value("Void")
}

pub fn method_param(index: u32) -> TypeSig {
    TypeSig::GenericParam {
        owner: GenericParamOwner::Method,
        index,
    }
}

/// A type of the marker namespace, e.g. `TypeRef`.
pub fn marker_type(name: &str) -> TypeSig {
    TypeSig::named(TypeName::new(MARKER_NAMESPACE, MARKER_NAMESPACE, name))
}

fn method(declaring_type: TypeSig, name: &str, has_this: bool, ret: TypeSig, params: Vec<TypeSig>) -> MethodRef {
    MethodRef {
        declaring_type,
        name: name.to_string(),
        has_this,
        explicit_this: false,
        calling_convention: CallingConvention::Default,
        return_type: ret,
        parameters: params,
        generic_arity: 0,
        generic_arguments: Vec::new(),
        optional_parameters: None,
    }
}

pub fn static_method(declaring_type: TypeSig, name: &str, ret: TypeSig, params: Vec<TypeSig>) -> MethodRef {
    method(declaring_type, name, false, ret, params)
}

/// A static method of `InlineIL.IL`.
pub fn il_method(name: &str, params: Vec<TypeSig>) -> MethodRef {
    static_method(marker_type("IL"), name, void(), params)
}

/// `IL.Return<int>()`
pub fn il_return() -> MethodRef {
    MethodRef {
        generic_arity: 1,
        generic_arguments: vec![int32()],
        ..static_method(marker_type("IL"), "Return", method_param(0), vec![])
    }
}

/// A method of the nested `InlineIL.IL/Emit` type.
pub fn emit_method(name: &str, param: Option<TypeSig>) -> MethodRef {
    let owner = TypeName::new(MARKER_NAMESPACE, MARKER_NAMESPACE, "IL").nested("Emit");
    static_method(TypeSig::named(owner), name, void(), param.into_iter().collect())
}

pub fn marker_ctor(owner: &str, params: Vec<TypeSig>) -> MethodRef {
    method(marker_type(owner), ".ctor", true, void(), params)
}

pub fn marker_instance_method(owner: &str, name: &str, ret: TypeSig, params: Vec<TypeSig>) -> MethodRef {
    method(marker_type(owner), name, true, ret, params)
}

pub fn marker_static_method(owner: &str, name: &str, ret: TypeSig, params: Vec<TypeSig>) -> MethodRef {
    static_method(marker_type(owner), name, ret, params)
}

/// `Type.GetTypeFromHandle(RuntimeTypeHandle)`
pub fn type_from_handle() -> MethodRef {
    static_method(
        corlib("Type"),
        "GetTypeFromHandle",
        corlib("Type"),
        vec![corlib_value("RuntimeTypeHandle")],
    )
}

/// The implicit `Type` to `TypeRef` conversion.
pub fn type_ref_from_type() -> MethodRef {
    marker_static_method("TypeRef", "op_Implicit", marker_type("TypeRef"), vec![corlib("Type")])
}

/// An instance method of `System.Type` returning a `Type`.
pub fn system_type_method(name: &str, params: Vec<TypeSig>) -> MethodRef {
    method(corlib("Type"), name, true, corlib("Type"), params)
}

/// `Array.Empty<T>()`
pub fn array_empty(element: TypeSig) -> MethodRef {
    MethodRef {
        generic_arity: 1,
        generic_arguments: vec![element],
        ..static_method(corlib("Array"), "Empty", method_param(0).array(1), vec![])
    }
}

fn with_operand(opcode: OpCode, operand: Operand) -> Instruction {
    Instruction::create(opcode, operand).unwrap()
}

pub fn call(method: MethodRef) -> Instruction {
    with_operand(OpCode::Call, Operand::Method(Arc::new(method)))
}

pub fn callvirt(method: MethodRef) -> Instruction {
    with_operand(OpCode::Callvirt, Operand::Method(Arc::new(method)))
}

pub fn newobj(method: MethodRef) -> Instruction {
    with_operand(OpCode::Newobj, Operand::Method(Arc::new(method)))
}

pub fn il_call(name: &str, params: Vec<TypeSig>) -> Instruction {
    call(il_method(name, params))
}

pub fn emit_call(name: &str, param: Option<TypeSig>) -> Instruction {
    call(emit_method(name, param))
}

pub fn ldstr(value: &str) -> Instruction {
    with_operand(OpCode::Ldstr, Operand::String(value.to_string()))
}

pub fn ldc(value: i32) -> Instruction {
    with_operand(OpCode::LdcI4, Operand::Int32(value))
}

/// `IL.DeclareLocals(new LocalVar(name, typeof(T)), ...)`
pub fn declare_locals(locals: &[(&str, TypeSig)]) -> Vec<Instruction> {
    let local_var = marker_type("LocalVar");
    let count = i32::try_from(locals.len()).unwrap();
    let mut code = vec![
        ldc(count),
        with_operand(OpCode::Newarr, Operand::Type(local_var.clone())),
    ];
    for (index, (name, local_type)) in locals.iter().enumerate() {
        code.push(Instruction::new(OpCode::Dup));
        code.push(ldc(i32::try_from(index).unwrap()));
        code.push(ldstr(name));
        code.push(with_operand(OpCode::Ldtoken, Operand::Type(local_type.clone())));
        code.push(call(type_from_handle()));
        code.push(newobj(marker_ctor("LocalVar", vec![string(), corlib("Type")])));
        code.push(Instruction::new(OpCode::StelemRef));
    }
    code.push(il_call("DeclareLocals", vec![local_var.array(1)]));
    code
}

fn static_def(name: &str, ret: TypeSig) -> MethodDef {
    MethodDef::new(name, ret).with_modifiers(MethodModifiers::STATIC | MethodModifiers::HIDE_BY_SIG)
}

fn calculator() -> TypeDef {
    let this = TypeSig::named(TypeName::new("TestLib", "TestLib", "Calculator"));

    TypeDef::new("TestLib", "Calculator")
        .with_method(
            static_def("Add", int32())
                .with_parameter("a", int32())
                .with_parameter("b", int32()),
        )
        .with_method(
            static_def("Add", corlib_value("Double"))
                .with_parameter("a", corlib_value("Double"))
                .with_parameter("b", corlib_value("Double")),
        )
        .with_method(
            static_def("Identity", method_param(0))
                .with_generic_parameters(&["T"])
                .with_parameter("value", method_param(0)),
        )
        .with_method(
            static_def("Sum", int32())
                .with_calling_convention(CallingConvention::VarArg)
                .with_parameter("count", int32()),
        )
        .with_method(MethodDef::new(".ctor", void()).with_parameter("seed", int32()))
        .with_method(static_def(".cctor", void()))
        .with_method(static_def("op_UnaryNegation", this.clone()).with_parameter("value", this.clone()))
        .with_method(
            static_def("op_Addition", this.clone())
                .with_parameter("left", this.clone())
                .with_parameter("right", int32()),
        )
        .with_method(static_def("op_Implicit", this.clone()).with_parameter("value", int32()))
        .with_method(static_def("op_Explicit", int32()).with_parameter("value", this))
        .with_property("Value", Some(MethodDef::new("get_Value", int32())), None)
        .with_event(
            "Changed",
            Some(MethodDef::new("add_Changed", void()).with_parameter("value", corlib("EventHandler"))),
            Some(MethodDef::new("remove_Changed", void()).with_parameter("value", corlib("EventHandler"))),
            None,
        )
        .with_field(FieldDef::new("Total", int32()))
}

/// A symbol space weaving `App`, with `TestLib` available as a reference.
pub fn symbols() -> SymbolSpace {
    let app = Module::new("App.dll", "App").with_type(TypeDef::new("App", "Program"));
    let library = Module::new("TestLib.dll", "TestLib")
        .with_type(TypeDef::new("TestLib", "Box`1").with_generic_parameters(&["T"]))
        .with_type(calculator());

    SymbolSpace::new(Arc::new(app), CORE_LIBRARY).with_module(library)
}
