//! Rewriting of a single method body.
//!
//! [`MethodWeaver`] scans the instruction stream once, front to back. Every call into
//! the marker vocabulary is classified and handed to the matching handler, which
//! consumes the argument expressions before the call and leaves the literal
//! instructions the call describes in its place. Scanning resumes right after the
//! rewritten site.
//!
//! A recoverable failure stops the rewrite of the method: its body is replaced by a
//! stub throwing `System.InvalidProgramException`, and the failure is reported as an
//! error diagnostic. Internal errors are returned to the caller wrapped in
//! [`crate::Error::MethodFailed`].
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use cilweave::{
//!     assembly::{Instruction, MethodBody, OpCode},
//!     metadata::{MethodDef, Module, SymbolSpace, TypeDef, TypeSig},
//!     MethodStatus, MethodWeaver, WeaverConfig,
//! };
//!
//! let symbols = SymbolSpace::new(Arc::new(Module::new("App.dll", "App")), "System.Runtime");
//! let program = TypeDef::new("App", "Program");
//! let method = MethodDef::new("Run", symbols.core_type("System", "Void"));
//!
//! let mut body = MethodBody::new();
//! body.push(Instruction::new(OpCode::Ret));
//!
//! let config = WeaverConfig::default();
//! let outcome = MethodWeaver::new(&config, &symbols, &program, &method).weave(&mut body)?;
//! assert_eq!(outcome.status, MethodStatus::Unchanged);
//! # Ok::<(), cilweave::Error>(())
//! ```

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::{
    assembly::{BasicBlocks, InstrId, Instruction, MethodBody, OpCode, Operand, OperandType},
    config::WeaverConfig,
    metadata::{
        CallSiteSig, CallingConvention, FieldRef, MethodDef, MethodRef, SymbolSpace, TypeDef,
        TypeSig,
    },
    weaving::{
        consumer::Consumer,
        diagnostics::{Diagnostic, MethodStatus, Severity, WeaveOutcome},
        labels::LabelMapper,
        locals::LocalTable,
        sequence::{SequenceMapper, SourceLocator},
        stack,
        vocabulary::{self, EmitArgument, IlCall, MarkerCall},
    },
    Error, Result,
};

/// Message of the exception thrown by the body of a method that failed to rewrite.
pub const STUB_MESSAGE: &str =
    "This method could not be rewritten by cilweave and must not be called.";

/// Warning messages with the instruction they refer to.
type Warnings = Vec<(String, Option<InstrId>)>;

/// Rewrites the marker calls of one method.
pub struct MethodWeaver<'a> {
    config: &'a WeaverConfig,
    symbols: &'a SymbolSpace,
    declaring_type: &'a TypeDef,
    method: &'a MethodDef,
}

impl<'a> MethodWeaver<'a> {
    /// Creates a weaver for `method`, declared on `declaring_type`.
    #[must_use]
    pub fn new(
        config: &'a WeaverConfig,
        symbols: &'a SymbolSpace,
        declaring_type: &'a TypeDef,
        method: &'a MethodDef,
    ) -> Self {
        MethodWeaver {
            config,
            symbols,
            declaring_type,
            method,
        }
    }

    /// The name used to prefix diagnostics: `ret Namespace.Type::Name(params)`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let parameters = self
            .method
            .parameters
            .iter()
            .map(|p| p.param_type.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{} {}::{}({})",
            self.method.return_type,
            self.declaring_type.full_name(),
            self.method.name,
            parameters
        )
    }

    /// Returns `true` if the method refers to the marker namespace anywhere: in an
    /// operand, a local type or its own signature.
    #[must_use]
    pub fn uses_markers(&self, body: &MethodBody) -> bool {
        let namespace = self.config.marker_namespace.as_str();
        body.iter()
            .any(|(_, instruction)| instruction.operand.references_namespace(namespace))
            || body
                .locals
                .iter()
                .any(|local| local.local_type.references_namespace(namespace))
            || self.method.return_type.references_namespace(namespace)
            || self
                .method
                .parameters
                .iter()
                .any(|p| p.param_type.references_namespace(namespace))
    }

    /// Rewrites `body` in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodFailed`] if an internal invariant breaks. Recoverable
    /// failures are not errors: they stub the body and are reported in the outcome.
    pub fn weave(&self, body: &mut MethodBody) -> Result<WeaveOutcome> {
        let method = self.display_name();
        if !self.uses_markers(body) {
            debug!(
                "Skipping {method}: no reference to {}",
                self.config.marker_namespace
            );
            return Ok(WeaveOutcome {
                method,
                status: MethodStatus::Unchanged,
                diagnostics: Vec::new(),
            });
        }

        let optimized = self
            .symbols
            .current_module()
            .map_err(|e| failed(&method, e))?
            .optimized;
        let locator = SourceLocator::new(body);
        let rewrite = Rewrite::new(
            self.config,
            self.symbols,
            self.method,
            &method,
            body,
            self.config.sequence_points.enabled(optimized),
        );

        match rewrite.run() {
            Ok(warnings) => {
                let severity = if self.config.warnings_as_errors {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                let diagnostics: Vec<Diagnostic> = warnings
                    .into_iter()
                    .map(|(message, at)| {
                        Diagnostic::new(severity, format!("{method}: {message}"))
                            .with_location(at.and_then(|id| locator.locate(id)))
                    })
                    .collect();

                let status = if severity == Severity::Error && !diagnostics.is_empty() {
                    warn!("Stubbing {method}: warnings are treated as errors");
                    self.stub(body).map_err(|e| failed(&method, e))?;
                    MethodStatus::Stubbed
                } else {
                    debug!("Rewrote {method}");
                    MethodStatus::Rewritten
                };
                Ok(WeaveOutcome {
                    method,
                    status,
                    diagnostics,
                })
            }
            Err(error) if error.is_recoverable() => {
                warn!("Stubbing {method}: {error}");
                let diagnostic = Diagnostic::new(Severity::Error, format!("{method}: {error}"))
                    .with_location(error.instruction().and_then(|id| locator.locate(id)))
                    .with_kind(error.kind());
                self.stub(body).map_err(|e| failed(&method, e))?;
                Ok(WeaveOutcome {
                    method,
                    status: MethodStatus::Stubbed,
                    diagnostics: vec![diagnostic],
                })
            }
            Err(error) => Err(failed(&method, error)),
        }
    }

    /// Replaces the body with `throw new InvalidProgramException(STUB_MESSAGE)`.
    fn stub(&self, body: &mut MethodBody) -> Result<()> {
        let constructor = MethodRef {
            declaring_type: self.symbols.core_type("System", "InvalidProgramException"),
            name: ".ctor".to_string(),
            has_this: true,
            explicit_this: false,
            calling_convention: CallingConvention::Default,
            return_type: self.symbols.core_type("System", "Void"),
            parameters: vec![self.symbols.core_type("System", "String")],
            generic_arity: 0,
            generic_arguments: Vec::new(),
            optional_parameters: None,
        };

        body.clear();
        body.locals.clear();
        body.init_locals = true;
        body.push(Instruction::create(
            OpCode::Ldstr,
            Operand::String(STUB_MESSAGE.to_string()),
        )?);
        body.push(Instruction::create(
            OpCode::Newobj,
            Operand::Method(Arc::new(constructor)),
        )?);
        body.push(Instruction::new(OpCode::Throw));
        Ok(())
    }
}

fn failed(method: &str, error: Error) -> Error {
    Error::MethodFailed {
        method: method.to_string(),
        source: Box::new(error),
    }
}

fn is_push(instruction: &Instruction, namespace: &str) -> bool {
    instruction.method().is_some_and(|method| {
        matches!(
            vocabulary::classify(method, namespace),
            Ok(Some(MarkerCall::Il(IlCall::Push)))
        )
    })
}

/// The general `ldloc`/`stloc`/`ldloca` form of a local access, if `opcode` is one.
fn local_access(opcode: OpCode) -> Option<OpCode> {
    match opcode {
        OpCode::Ldloc | OpCode::Stloc | OpCode::Ldloca => Some(opcode),
        _ => opcode.general_local_form(),
    }
}

/// The operand value of an `IL.Emit` call, as consumed from its argument.
#[derive(Debug)]
enum EmitValue {
    None,
    Integer(i64),
    Float(f64),
    String(String),
    Labels(Vec<String>),
    Type(TypeSig),
    Method(MethodRef),
    Field(FieldRef),
    Signature(CallSiteSig),
}

impl EmitValue {
    fn consume(args: &mut Consumer<'_>, argument: EmitArgument) -> Result<Self> {
        Ok(match argument {
            EmitArgument::None => EmitValue::None,
            EmitArgument::Int8
            | EmitArgument::UInt8
            | EmitArgument::Int16
            | EmitArgument::UInt16
            | EmitArgument::Int32
            | EmitArgument::UInt32
            | EmitArgument::Int64
            | EmitArgument::UInt64 => EmitValue::Integer(args.integer()?),
            EmitArgument::Float32 | EmitArgument::Float64 => EmitValue::Float(args.float()?),
            EmitArgument::String => EmitValue::String(args.string()?),
            EmitArgument::StringArray => EmitValue::Labels(args.array(Consumer::string)?),
            EmitArgument::TypeRef => EmitValue::Type(args.type_ref()?),
            EmitArgument::MethodRef => EmitValue::Method(args.method_ref()?),
            EmitArgument::FieldRef => EmitValue::Field(args.field_ref()?),
            EmitArgument::StandAloneSig => EmitValue::Signature(args.signature()?),
        })
    }
}

fn out_of_range(opcode: OpCode, value: i64) -> Error {
    weaving_error!(
        PatternMismatch,
        None,
        "Value {} is out of range for {}",
        value,
        opcode
    )
}

/// State of one rewrite pass over a method body.
struct Rewrite<'w, 'b> {
    config: &'w WeaverConfig,
    symbols: &'w SymbolSpace,
    method: &'w MethodDef,
    name: &'w str,
    body: &'b mut MethodBody,
    blocks: BasicBlocks,
    labels: LabelMapper,
    locals: LocalTable,
    sequence: SequenceMapper,
}

impl<'w, 'b> Rewrite<'w, 'b> {
    fn new(
        config: &'w WeaverConfig,
        symbols: &'w SymbolSpace,
        method: &'w MethodDef,
        name: &'w str,
        body: &'b mut MethodBody,
        sequence_points: bool,
    ) -> Self {
        let blocks = BasicBlocks::compute(body);
        Rewrite {
            config,
            symbols,
            method,
            name,
            body,
            blocks,
            labels: LabelMapper::new(),
            locals: LocalTable::new(),
            sequence: SequenceMapper::new(sequence_points),
        }
    }

    fn run(mut self) -> Result<Warnings> {
        let mut cursor = self.body.first();
        while let Some(id) = cursor {
            cursor = self.visit(id)?;
        }
        self.finish()
    }

    /// Handles the instruction at `id` and returns where scanning resumes.
    fn visit(&mut self, id: InstrId) -> Result<Option<InstrId>> {
        let instruction = self.body.instruction(id)?;
        let call = match (instruction.is_call(), instruction.method()) {
            (true, Some(method)) => vocabulary::classify(method, &self.config.marker_namespace)
                .map_err(|e| e.at(id))?,
            _ => None,
        };
        let Some(call) = call else {
            return Ok(self.body.next(id));
        };
        trace!("{}: rewriting {} at {}", self.name, instruction, id);

        match call {
            MarkerCall::Il(IlCall::Push | IlCall::PushInRef | IlCall::PushOutRef) => {
                self.push(id)
            }
            MarkerCall::Il(IlCall::Pop) => self.pop(id),
            MarkerCall::Il(IlCall::Unreachable) => self.unreachable(id),
            MarkerCall::Il(IlCall::Return | IlCall::ReturnRef | IlCall::ReturnPointer) => {
                self.ret(id)
            }
            MarkerCall::Il(IlCall::MarkLabel) => self.mark_label(id),
            MarkerCall::Il(IlCall::DeclareLocals { has_init_flag }) => {
                self.declare_locals(id, has_init_flag)
            }
            MarkerCall::Emit { opcode, argument } => self.emit(id, opcode, argument),
            // Builders are consumed by the call they feed; a stray one is left for
            // the unconsumed reference check.
            MarkerCall::Builder(_) => Ok(self.body.next(id)),
        }
    }

    fn consumer(&mut self, call: InstrId) -> Consumer<'_> {
        Consumer::new(
            self.body,
            &self.blocks,
            self.symbols,
            &self.config.marker_namespace,
            call,
        )
    }

    /// Removes `call`, moving the debug information of the site to what follows.
    fn remove_call(&mut self, call: InstrId, consumed: Vec<InstrId>) -> Result<Option<InstrId>> {
        let next = self.body.next(call);
        self.body.remove(call)?;

        let mut site = consumed;
        site.push(call);
        self.sequence.map_site(self.body, &site, next);
        Ok(next)
    }

    /// `IL.Push*`: the argument is already on the stack, the call goes.
    fn push(&mut self, call: InstrId) -> Result<Option<InstrId>> {
        if self.config.validate_push {
            let namespace = self.config.marker_namespace.as_str();
            let flagged = stack::unsafe_pushes(self.body, self.method.returns_value(), |i| {
                is_push(i, namespace)
            });
            if flagged.contains(&call) {
                return Err(weaving_error!(
                    StackSafety,
                    Some(call),
                    "IL.Push cannot be used here because the value on the evaluation stack may have been spilled by the compiler. Store the value into a local variable first and push that local instead"
                ));
            }
        }

        self.remove_call(call, Vec::new())
    }

    /// `IL.Pop(out x)`: the address load before the call becomes a store.
    fn pop(&mut self, call: InstrId) -> Result<Option<InstrId>> {
        let Some(address) = self.body.prev(call) else {
            return Err(weaving_error!(
                PatternMismatch,
                Some(call),
                "IL.Pop requires the address of a local, a parameter or a static field"
            ));
        };
        if !self.blocks.same_block(address, call) {
            return Err(weaving_error!(
                Structural,
                Some(address),
                "An expression used as an argument is not in the same basic block as the call"
            ));
        }

        let instruction = self.body.instruction(address)?;
        let store = match instruction.opcode {
            OpCode::Ldloca => OpCode::Stloc,
            OpCode::LdlocaS => OpCode::StlocS,
            OpCode::Ldarga => OpCode::Starg,
            OpCode::LdargaS => OpCode::StargS,
            OpCode::Ldsflda => OpCode::Stsfld,
            _ => {
                return Err(weaving_error!(
                    PatternMismatch,
                    Some(address),
                    "IL.Pop expects the address of a local, a parameter or a static field, but found {}",
                    instruction
                ))
            }
        };
        let replacement = Instruction::create(store, instruction.operand.clone())?;
        self.body.replace(address, replacement)?;

        let next = self.body.next(call);
        self.body.remove(call)?;
        self.sequence
            .map_site(self.body, &[address, call], Some(address));
        Ok(next)
    }

    /// `throw IL.Unreachable()`: both the call and the `throw` go.
    fn unreachable(&mut self, call: InstrId) -> Result<Option<InstrId>> {
        let throw = self
            .body
            .next(call)
            .filter(|id| self.body.get(*id).is_some_and(|i| i.opcode == OpCode::Throw))
            .ok_or_else(|| {
                weaving_error!(
                    Structural,
                    Some(call),
                    "IL.Unreachable must be followed by a throw instruction"
                )
            })?;

        let next = self.body.next(throw);
        self.body.remove(call)?;
        self.body.remove(throw)?;
        self.sequence.map_site(self.body, &[call, throw], next);
        Ok(next)
    }

    /// `return IL.Return<T>()`: the value on the stack is returned as is.
    fn ret(&mut self, call: InstrId) -> Result<Option<InstrId>> {
        self.check_return_chain(call)?;
        self.remove_call(call, Vec::new())
    }

    /// The call must be followed by `ret`, or by the `stloc N; [br L; L:] ldloc N; ret`
    /// sequence debug builds produce.
    fn check_return_chain(&self, call: InstrId) -> Result<()> {
        let fail = || {
            weaving_error!(
                Structural,
                Some(call),
                "IL.Return must be immediately followed by a ret instruction"
            )
        };
        let following = |id: InstrId| {
            self.body
                .next(id)
                .and_then(|next| self.body.get(next).map(|i| (next, i)))
        };

        let (first, instruction) = following(call).ok_or_else(fail)?;
        if instruction.opcode == OpCode::Ret {
            return Ok(());
        }
        if local_access(instruction.opcode) != Some(OpCode::Stloc) {
            return Err(fail());
        }
        let stored = instruction.local_index();

        let (mut current, mut instruction) = following(first).ok_or_else(fail)?;
        if matches!(instruction.opcode, OpCode::Br | OpCode::BrS) {
            let (target, next) = following(current).ok_or_else(fail)?;
            if instruction.targets() != [target] {
                return Err(fail());
            }
            current = target;
            instruction = next;
        }
        if local_access(instruction.opcode) != Some(OpCode::Ldloc)
            || instruction.local_index() != stored
        {
            return Err(fail());
        }

        match following(current) {
            Some((_, ret)) if ret.opcode == OpCode::Ret => Ok(()),
            _ => Err(fail()),
        }
    }

    /// `IL.MarkLabel(name)`: the call becomes the label's placeholder.
    fn mark_label(&mut self, call: InstrId) -> Result<Option<InstrId>> {
        let (name, mut site) = {
            let mut args = self.consumer(call);
            let name = args.string().map_err(|e| e.at(call))?;
            (name, args.finish())
        };

        let placeholder = self
            .labels
            .define(self.body, &name, call)
            .map_err(|e| e.at(call))?;
        site.push(call);
        self.sequence.map_site(self.body, &site, Some(placeholder));
        Ok(self.body.next(placeholder))
    }

    /// `IL.DeclareLocals([init,] locals)`
    fn declare_locals(&mut self, call: InstrId, has_init_flag: bool) -> Result<Option<InstrId>> {
        let (decls, init_locals, consumed) = {
            let mut args = self.consumer(call);
            let decls = args.array(Consumer::local_var).map_err(|e| e.at(call))?;
            let init_locals = if has_init_flag {
                args.boolean().map_err(|e| e.at(call))?
            } else {
                true
            };
            (decls, init_locals, args.finish())
        };

        self.locals
            .declare(self.body, decls, init_locals, call)?;
        self.remove_call(call, consumed)
    }

    /// `IL.Emit.Op(operand)`: the call is overwritten with the instruction.
    fn emit(
        &mut self,
        call: InstrId,
        opcode: OpCode,
        argument: EmitArgument,
    ) -> Result<Option<InstrId>> {
        let (value, mut site) = {
            let mut args = self.consumer(call);
            let value = EmitValue::consume(&mut args, argument).map_err(|e| e.at(call))?;
            (value, args.finish())
        };

        let instruction = self
            .instruction(call, opcode, value)
            .map_err(|e| e.at(call))?;
        self.body.replace(call, instruction)?;
        site.push(call);
        self.sequence.map_site(self.body, &site, Some(call));
        Ok(self.body.next(call))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn instruction(&mut self, call: InstrId, opcode: OpCode, value: EmitValue) -> Result<Instruction> {
        if let Some(index) = opcode.implicit_local() {
            if !self.locals.is_declared() {
                return Ok(Instruction::new(opcode));
            }
            let index = self.locals.by_index(i64::from(index))?;
            let general = opcode
                .general_local_form()
                .ok_or_else(|| internal_error!("{} has no general form", opcode))?;
            return Instruction::create(general, Operand::Local(index));
        }

        let kind = opcode.operand_type();
        let operand = match (kind, value) {
            (OperandType::None, EmitValue::None) => Operand::None,
            (OperandType::Int8, EmitValue::Integer(v)) => {
                Operand::Int8(i8::try_from(v).map_err(|_| out_of_range(opcode, v))?)
            }
            (OperandType::UInt8, EmitValue::Integer(v)) => {
                Operand::UInt8(u8::try_from(v).map_err(|_| out_of_range(opcode, v))?)
            }
            (OperandType::Int32, EmitValue::Integer(v)) => Operand::Int32(
                i32::try_from(v)
                    .or_else(|_| u32::try_from(v).map(|bits| bits as i32))
                    .map_err(|_| out_of_range(opcode, v))?,
            ),
            (OperandType::Int64, EmitValue::Integer(v)) => Operand::Int64(v),
            (OperandType::Float32, EmitValue::Float(v)) => Operand::Float32(v as f32),
            (OperandType::Float64, EmitValue::Float(v)) => Operand::Float64(v),
            (OperandType::String, EmitValue::String(v)) => Operand::String(v),
            (OperandType::Type | OperandType::Token, EmitValue::Type(sig)) => Operand::Type(sig),
            (OperandType::Method | OperandType::Token, EmitValue::Method(method)) => {
                Operand::Method(Arc::new(method))
            }
            (OperandType::Field | OperandType::Token, EmitValue::Field(field)) => {
                Operand::Field(Arc::new(field))
            }
            (OperandType::Signature, EmitValue::Signature(sig)) => Operand::Signature(Arc::new(sig)),
            (kind, EmitValue::String(label)) if kind.is_branch_target() => {
                Operand::Target(self.labels.reference(self.body, &label, call)?)
            }
            (OperandType::Switch, EmitValue::Labels(labels)) => {
                let mut targets = Vec::with_capacity(labels.len());
                for label in &labels {
                    targets.push(self.labels.reference(self.body, label, call)?);
                }
                Operand::Switch(targets)
            }
            (kind, EmitValue::String(name)) if kind.is_local() => {
                let index = self.locals.by_name(&name)?;
                return local_instruction(opcode, index);
            }
            (kind, EmitValue::Integer(v)) if kind.is_local() => {
                let index = self.locals.by_index(v)?;
                return local_instruction(opcode, index);
            }
            (kind, EmitValue::String(name)) if kind.is_argument() => {
                Operand::Argument(self.parameter(&name)?)
            }
            (kind, EmitValue::Integer(v)) if kind.is_argument() => {
                Operand::Argument(u16::try_from(v).map_err(|_| out_of_range(opcode, v))?)
            }
            (kind, value) => {
                return Err(weaving_error!(
                    PatternMismatch,
                    Some(call),
                    "Opcode {} expects an operand of kind {:?}, but the argument is {:?}",
                    opcode,
                    kind,
                    value
                ))
            }
        };

        Instruction::create(opcode, operand)
    }

    /// Argument index of a named parameter, counting the implicit `this`.
    fn parameter(&self, name: &str) -> Result<u16> {
        let position = self
            .method
            .parameters
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| weaving_error!(NotFound, None, "Parameter {} is not defined", name))?;
        u16::try_from(position + usize::from(self.method.has_this()))
            .map_err(|_| internal_error!("Parameter index of {} overflows", name))
    }

    fn finish(self) -> Result<Warnings> {
        let mut warnings = self.labels.finish()?;
        warnings.extend(self.locals.unused());

        let namespace = self.config.marker_namespace.as_str();
        if let Some((id, instruction)) = self
            .body
            .iter()
            .find(|(_, i)| i.operand.references_namespace(namespace))
        {
            return Err(weaving_error!(
                UnconsumedReference,
                Some(id),
                "Unconsumed reference to {}: {}",
                namespace,
                instruction
            ));
        }
        if let Some(local) = self
            .body
            .locals
            .iter()
            .find(|l| l.local_type.references_namespace(namespace))
        {
            return Err(weaving_error!(
                UnconsumedReference,
                None,
                "Unconsumed reference to {}: local of type {}",
                namespace,
                local.local_type
            ));
        }

        self.sequence.finish(self.body);
        self.body.validate()?;
        Ok(warnings)
    }
}

/// A short-form local access falls back to the general form when the slot does not fit.
fn local_instruction(opcode: OpCode, index: u16) -> Result<Instruction> {
    let opcode = match opcode.general_local_form() {
        Some(general) if index > u16::from(u8::MAX) => general,
        _ => opcode,
    };
    Instruction::create(opcode, Operand::Local(index))
}
