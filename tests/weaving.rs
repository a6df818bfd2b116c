//! Integration tests for whole weaving passes.
//!
//! Bodies are built the way a C# compiler lays out calls into the marker vocabulary,
//! then woven through the public API and checked instruction by instruction.

use std::sync::Arc;

use cilweave::{prelude::*, weaving::STUB_MESSAGE};

const CORE: &str = "System.Runtime";

fn int32() -> TypeSig {
    TypeSig::corlib_value(CORE, "System", "Int32")
}

fn system(name: &str) -> TypeSig {
    TypeSig::corlib(CORE, "System", name)
}

fn void() -> TypeSig {
    TypeSig::corlib_value(CORE, "System", "Void")
}

fn marker(name: &str) -> TypeSig {
    TypeSig::named(TypeName::new("InlineIL", "InlineIL", name))
}

fn method_ref(declaring_type: TypeSig, name: &str, has_this: bool, ret: TypeSig, params: Vec<TypeSig>) -> MethodRef {
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

/// Appends compiler-shaped code to a body under construction.
struct Code {
    builder: BodyBuilder,
}

impl Code {
    fn new() -> Self {
        Code {
            builder: BodyBuilder::new(),
        }
    }

    fn op(&mut self, opcode: OpCode) -> &mut Self {
        self.builder.emit(opcode).unwrap();
        self
    }

    fn with(&mut self, opcode: OpCode, operand: Operand) -> &mut Self {
        self.builder.emit_with(opcode, operand).unwrap();
        self
    }

    fn call(&mut self, method: MethodRef) -> &mut Self {
        self.with(OpCode::Call, Operand::Method(Arc::new(method)))
    }

    fn ldstr(&mut self, value: &str) -> &mut Self {
        self.with(OpCode::Ldstr, Operand::String(value.to_string()))
    }

    fn ldc(&mut self, value: i32) -> &mut Self {
        self.with(OpCode::LdcI4, Operand::Int32(value))
    }

    fn push(&mut self) -> &mut Self {
        let method = MethodRef {
            generic_arity: 1,
            ..method_ref(
                marker("IL"),
                "Push",
                false,
                void(),
                vec![TypeSig::GenericParam {
                    owner: GenericParamOwner::Method,
                    index: 0,
                }],
            )
        };
        self.call(method)
    }

    fn ret_value(&mut self) -> &mut Self {
        let method = MethodRef {
            generic_arity: 1,
            generic_arguments: vec![int32()],
            ..method_ref(
                marker("IL"),
                "Return",
                false,
                TypeSig::GenericParam {
                    owner: GenericParamOwner::Method,
                    index: 0,
                },
                vec![],
            )
        };
        self.call(method).op(OpCode::Ret)
    }

    fn emit(&mut self, name: &str, param: Option<TypeSig>) -> &mut Self {
        let owner = TypeName::new("InlineIL", "InlineIL", "IL").nested("Emit");
        self.call(method_ref(
            TypeSig::named(owner),
            name,
            false,
            void(),
            param.into_iter().collect(),
        ))
    }

    /// `(TypeRef)typeof(T)`
    fn type_ref(&mut self, sig: TypeSig) -> &mut Self {
        self.with(OpCode::Ldtoken, Operand::Type(sig))
            .call(method_ref(
                system("Type"),
                "GetTypeFromHandle",
                false,
                system("Type"),
                vec![TypeSig::corlib_value(CORE, "System", "RuntimeTypeHandle")],
            ))
            .call(method_ref(
                marker("TypeRef"),
                "op_Implicit",
                false,
                marker("TypeRef"),
                vec![system("Type")],
            ))
    }

    /// `new TypeRef[] { typeof(A), typeof(B), ... }`
    fn type_refs(&mut self, sigs: Vec<TypeSig>) -> &mut Self {
        self.ldc(i32::try_from(sigs.len()).unwrap())
            .with(OpCode::Newarr, Operand::Type(marker("TypeRef")));
        for (index, sig) in sigs.into_iter().enumerate() {
            self.op(OpCode::Dup)
                .ldc(i32::try_from(index).unwrap())
                .type_ref(sig)
                .op(OpCode::StelemRef);
        }
        self
    }

    fn finish(&mut self) -> MethodBody {
        std::mem::replace(&mut self.builder, BodyBuilder::new())
            .finish()
            .unwrap()
    }
}

fn calculator_sig() -> TypeSig {
    TypeSig::named(TypeName::new("TestLib", "TestLib", "Calculator"))
}

fn symbols() -> SymbolSpace {
    let calculator = TypeDef::new("TestLib", "Calculator")
        .with_method(
            MethodDef::new("Add", int32())
                .with_modifiers(MethodModifiers::STATIC)
                .with_parameter("a", int32())
                .with_parameter("b", int32()),
        )
        .with_field(FieldDef::new_static("Total", int32()));
    let library = Module::new("TestLib.dll", "TestLib").with_type(calculator);
    let app = Module::new("App.dll", "App").with_type(TypeDef::new("App", "Program"));

    SymbolSpace::new(Arc::new(app), CORE).with_module(library)
}

fn static_int(name: &str) -> MethodDef {
    MethodDef::new(name, int32()).with_modifiers(MethodModifiers::STATIC)
}

fn listing(body: &MethodBody) -> Vec<String> {
    body.iter().map(|(_, i)| i.to_string()).collect()
}

#[test]
fn test_emit_call_with_method_reference() -> Result<()> {
    let symbols = symbols();
    let program = TypeDef::new("App", "Program");
    let method = static_int("Sum");
    let mut body = Code::new()
        .op(OpCode::LdcI42)
        .push()
        .op(OpCode::LdcI43)
        .push()
        .type_ref(calculator_sig())
        .ldstr("Add")
        .type_refs(vec![int32(), int32()])
        .call(method_ref(
            marker("MethodRef"),
            "Method",
            false,
            marker("MethodRef"),
            vec![marker("TypeRef"), system("String"), marker("TypeRef").array(1)],
        ))
        .emit("Call", Some(marker("MethodRef")))
        .ret_value()
        .finish();

    let config = WeaverConfig::default();
    let outcome = MethodWeaver::new(&config, &symbols, &program, &method).weave(&mut body)?;

    assert_eq!(outcome.status, MethodStatus::Rewritten);
    assert_eq!(
        listing(&body),
        vec![
            "ldc.i4.2",
            "ldc.i4.3",
            "call System.Int32 TestLib.Calculator::Add(System.Int32,System.Int32)",
            "ret",
        ]
    );
    Ok(())
}

#[test]
fn test_emit_field_reference() -> Result<()> {
    let symbols = symbols();
    let program = TypeDef::new("App", "Program");
    let method = static_int("Total");
    let mut body = Code::new()
        .type_ref(calculator_sig())
        .ldstr("Total")
        .with(
            OpCode::Newobj,
            Operand::Method(Arc::new(method_ref(
                marker("FieldRef"),
                ".ctor",
                true,
                void(),
                vec![marker("TypeRef"), system("String")],
            ))),
        )
        .emit("Ldsfld", Some(marker("FieldRef")))
        .ret_value()
        .finish();

    let config = WeaverConfig::default();
    let outcome = MethodWeaver::new(&config, &symbols, &program, &method).weave(&mut body)?;

    assert_eq!(outcome.status, MethodStatus::Rewritten);
    assert_eq!(
        listing(&body),
        vec!["ldsfld System.Int32 TestLib.Calculator::Total", "ret"]
    );
    Ok(())
}

#[test]
fn test_unknown_method_is_stubbed() -> Result<()> {
    let symbols = symbols();
    let program = TypeDef::new("App", "Program");
    let method = static_int("Broken");
    let mut body = Code::new()
        .type_ref(calculator_sig())
        .ldstr("Subtract")
        .call(method_ref(
            marker("MethodRef"),
            "Method",
            false,
            marker("MethodRef"),
            vec![marker("TypeRef"), system("String")],
        ))
        .emit("Call", Some(marker("MethodRef")))
        .ret_value()
        .finish();

    let config = WeaverConfig::default();
    let outcome = MethodWeaver::new(&config, &symbols, &program, &method).weave(&mut body)?;

    assert_eq!(outcome.status, MethodStatus::Stubbed);
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].kind, Some(ErrorKind::NotFound));
    assert!(outcome.diagnostics[0]
        .message
        .starts_with("System.Int32 App.Program::Broken(): "));

    let code = listing(&body);
    assert_eq!(code.len(), 3);
    assert_eq!(code[0], format!("ldstr {STUB_MESSAGE:?}"));
    assert!(code[1].contains("System.InvalidProgramException::.ctor(System.String)"));
    assert_eq!(code[2], "throw");
    Ok(())
}

#[test]
fn test_module_pass_reports_in_order() -> Result<()> {
    let symbols = symbols();
    let program = TypeDef::new("App", "Program");
    let methods: Vec<MethodDef> = ["First", "Second", "Third"]
        .iter()
        .map(|name| static_int(name))
        .collect();
    let mut bodies = vec![
        Code::new().op(OpCode::LdcI41).push().ret_value().finish(),
        Code::new().op(OpCode::LdcI41).op(OpCode::Ret).finish(),
        Code::new().push().ret_value().finish(),
    ];

    let config = WeaverConfig::from_xml(r#"<InlineIL SequencePoints="False" />"#)?;
    let jobs = methods
        .iter()
        .zip(bodies.iter_mut())
        .map(|(method, body)| MethodJob::new(&program, method, body))
        .collect();
    let report = ModuleWeaver::new(&config, &symbols).weave(jobs)?;

    let statuses: Vec<MethodStatus> = report.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(
        statuses,
        vec![
            MethodStatus::Rewritten,
            MethodStatus::Unchanged,
            MethodStatus::Stubbed
        ]
    );
    assert!(report.has_errors());
    assert_eq!(report.errors()[0].kind, Some(ErrorKind::StackSafety));
    assert!(report
        .summary()
        .starts_with("Weaving: 1 rewritten, 1 stubbed, 1 unchanged; 1 error(s), 0 warning(s)"));
    assert_eq!(listing(&bodies[0]), vec!["ldc.i4.1", "ret"]);
    Ok(())
}

#[test]
fn test_custom_marker_namespace() -> Result<()> {
    let symbols = symbols();
    let program = TypeDef::new("App", "Program");
    let method = static_int("Run");
    let mut body = Code::new().op(OpCode::LdcI41).push().ret_value().finish();

    let config = WeaverConfig::default().with_marker_namespace("Other");
    let outcome = MethodWeaver::new(&config, &symbols, &program, &method).weave(&mut body)?;

    assert_eq!(outcome.status, MethodStatus::Unchanged);
    assert_eq!(body.len(), 4);
    Ok(())
}
