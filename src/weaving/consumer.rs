//! Consumption of the argument expressions of a marker call.
//!
//! The arguments of a call are the instructions right before it, last argument
//! closest to the call. [`Consumer`] walks backwards from the call, matching each
//! argument against the shape the caller expects and unlinking every instruction it
//! accepts. Nested builder calls are consumed recursively: the arguments of a nested
//! call sit right before it, and because the nested call is already unlinked they end
//! up directly before the outer call's cursor.
//!
//! Every consumed instruction must belong to the basic block of the call. An argument
//! computed in another block means control flow happens between the argument and the
//! call, which the rewrite cannot preserve.

use crate::{
    assembly::{BasicBlocks, InstrId, Instruction, MethodBody, OpCode, Operand},
    metadata::{CallSiteSig, FieldRef, GenericParamOwner, MethodRef, SymbolSpace, TypeSig},
    weaving::{
        callsite, fieldref,
        locals::LocalDecl,
        methodref::{self, Accessor},
        typeref,
        vocabulary::{self, BuilderCall, MarkerCall},
    },
    Error, Result,
};

/// A numeric literal, after any conversion wrappers have been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Constant {
    Int32(i32),
    Int64(i64),
    Float(f64),
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int32(v) => write!(f, "{v}"),
            Constant::Int64(v) => write!(f, "{v}L"),
            Constant::Float(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl Width {
    fn is_unsigned(self) -> bool {
        matches!(self, Width::U8 | Width::U16 | Width::U32 | Width::U64)
    }

    fn range(self) -> (i128, i128) {
        match self {
            Width::I8 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            Width::U8 => (0, i128::from(u8::MAX)),
            Width::I16 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            Width::U16 => (0, i128::from(u16::MAX)),
            Width::I32 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            Width::U32 => (0, i128::from(u32::MAX)),
            Width::I64 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            Width::U64 | Width::F32 | Width::F64 => (0, i128::from(u64::MAX)),
        }
    }
}

/// `(target width, overflow checked, source read as unsigned)`
fn conversion(opcode: OpCode) -> Option<(Width, bool, bool)> {
    Some(match opcode {
        OpCode::ConvI1 => (Width::I8, false, false),
        OpCode::ConvI2 => (Width::I16, false, false),
        OpCode::ConvI4 => (Width::I32, false, false),
        OpCode::ConvI8 | OpCode::ConvI => (Width::I64, false, false),
        OpCode::ConvU1 => (Width::U8, false, false),
        OpCode::ConvU2 => (Width::U16, false, false),
        OpCode::ConvU4 => (Width::U32, false, false),
        OpCode::ConvU8 | OpCode::ConvU => (Width::U64, false, false),
        OpCode::ConvR4 => (Width::F32, false, false),
        OpCode::ConvR8 => (Width::F64, false, false),
        OpCode::ConvRUn => (Width::F64, false, true),
        OpCode::ConvOvfI1 => (Width::I8, true, false),
        OpCode::ConvOvfU1 => (Width::U8, true, false),
        OpCode::ConvOvfI2 => (Width::I16, true, false),
        OpCode::ConvOvfU2 => (Width::U16, true, false),
        OpCode::ConvOvfI4 => (Width::I32, true, false),
        OpCode::ConvOvfU4 => (Width::U32, true, false),
        OpCode::ConvOvfI8 | OpCode::ConvOvfI => (Width::I64, true, false),
        OpCode::ConvOvfU8 | OpCode::ConvOvfU => (Width::U64, true, false),
        OpCode::ConvOvfI1Un => (Width::I8, true, true),
        OpCode::ConvOvfU1Un => (Width::U8, true, true),
        OpCode::ConvOvfI2Un => (Width::I16, true, true),
        OpCode::ConvOvfU2Un => (Width::U16, true, true),
        OpCode::ConvOvfI4Un => (Width::I32, true, true),
        OpCode::ConvOvfU4Un => (Width::U32, true, true),
        OpCode::ConvOvfI8Un | OpCode::ConvOvfIUn => (Width::I64, true, true),
        OpCode::ConvOvfU8Un | OpCode::ConvOvfUUn => (Width::U64, true, true),
        _ => return None,
    })
}

/// Applies a `conv.*` opcode to a constant the way the runtime would.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn convert(opcode: OpCode, value: Constant) -> Result<Constant> {
    let Some((width, checked, unsigned_source)) = conversion(opcode) else {
        return Err(internal_error!("{} is not a conversion", opcode));
    };
    let unsigned = unsigned_source || (!checked && width.is_unsigned());

    let source = match value {
        Constant::Int32(v) if unsigned => i128::from(v as u32),
        Constant::Int32(v) => i128::from(v),
        Constant::Int64(v) if unsigned => i128::from(v as u64),
        Constant::Int64(v) => i128::from(v),
        Constant::Float(v) => match width {
            Width::F32 => return Ok(Constant::Float(f64::from(v as f32))),
            Width::F64 => return Ok(Constant::Float(v)),
            _ if checked && !v.is_finite() => return Err(overflow(opcode, value)),
            _ => v.trunc() as i128,
        },
    };

    if checked {
        let (min, max) = width.range();
        if source < min || source > max {
            return Err(overflow(opcode, value));
        }
    }

    Ok(match width {
        Width::I8 => Constant::Int32(i32::from(source as i8)),
        Width::U8 => Constant::Int32(i32::from(source as u8)),
        Width::I16 => Constant::Int32(i32::from(source as i16)),
        Width::U16 => Constant::Int32(i32::from(source as u16)),
        Width::I32 | Width::U32 => Constant::Int32(source as u32 as i32),
        Width::I64 | Width::U64 => Constant::Int64(source as u64 as i64),
        Width::F32 => Constant::Float(f64::from(source as f32)),
        Width::F64 => Constant::Float(source as f64),
    })
}

fn overflow(opcode: OpCode, value: Constant) -> Error {
    weaving_error!(
        PatternMismatch,
        None,
        "Constant {} overflows {}",
        value,
        opcode
    )
}

fn is_array_store(opcode: OpCode) -> bool {
    matches!(
        opcode,
        OpCode::StelemRef
            | OpCode::Stelem
            | OpCode::StelemI
            | OpCode::StelemI1
            | OpCode::StelemI2
            | OpCode::StelemI4
            | OpCode::StelemI8
            | OpCode::StelemR4
            | OpCode::StelemR8
    )
}

/// Consumes the arguments of one call, last argument first.
pub(crate) struct Consumer<'a> {
    body: &'a mut MethodBody,
    blocks: &'a BasicBlocks,
    symbols: &'a SymbolSpace,
    namespace: &'a str,
    call: InstrId,
    consumed: Vec<InstrId>,
}

impl<'a> Consumer<'a> {
    pub(crate) fn new(
        body: &'a mut MethodBody,
        blocks: &'a BasicBlocks,
        symbols: &'a SymbolSpace,
        namespace: &'a str,
        call: InstrId,
    ) -> Self {
        Consumer {
            body,
            blocks,
            symbols,
            namespace,
            call,
            consumed: Vec::new(),
        }
    }

    /// The instructions consumed so far, in consumption order.
    pub(crate) fn finish(self) -> Vec<InstrId> {
        self.consumed
    }

    fn take(&mut self) -> Result<(InstrId, Instruction)> {
        let Some(id) = self.body.prev(self.call) else {
            return Err(weaving_error!(
                PatternMismatch,
                Some(self.call),
                "Missing argument before {}",
                self.body.instruction(self.call)?
            ));
        };
        if !self.blocks.same_block(id, self.call) {
            return Err(weaving_error!(
                Structural,
                Some(id),
                "An expression used as an argument is not in the same basic block as the call"
            ));
        }

        let instruction = self.body.remove(id)?;
        self.consumed.push(id);
        Ok((id, instruction))
    }

    fn mismatch(id: InstrId, instruction: &Instruction, expected: &str) -> Error {
        if instruction.opcode == OpCode::Ldnull {
            weaving_error!(
                NullNotAllowed,
                Some(id),
                "A null value is not allowed here, expected {}",
                expected
            )
        } else {
            weaving_error!(
                PatternMismatch,
                Some(id),
                "Unexpected instruction, expected {} but found {}",
                expected,
                instruction
            )
        }
    }

    fn builder(&self, id: InstrId, instruction: &Instruction, expected: &str) -> Result<BuilderCall> {
        if let (true, Some(method)) = (instruction.is_call(), instruction.method()) {
            if let Some(MarkerCall::Builder(call)) =
                vocabulary::classify(method, self.namespace).map_err(|e| e.at(id))?
            {
                return Ok(call);
            }
        }
        Err(Self::mismatch(id, instruction, expected))
    }

    /// A numeric literal, unwrapping `conv.*` instructions.
    pub(crate) fn constant(&mut self) -> Result<Constant> {
        let (id, instruction) = self.take()?;
        match (instruction.opcode, &instruction.operand) {
            (OpCode::LdcI8, Operand::Int64(v)) => Ok(Constant::Int64(*v)),
            (OpCode::LdcR4, Operand::Float32(v)) => Ok(Constant::Float(f64::from(*v))),
            (OpCode::LdcR8, Operand::Float64(v)) => Ok(Constant::Float(*v)),
            (opcode, _) if conversion(opcode).is_some() => {
                let inner = self.constant()?;
                convert(opcode, inner).map_err(|e| e.at(id))
            }
            _ => instruction
                .ldc_i4()
                .map(Constant::Int32)
                .ok_or_else(|| Self::mismatch(id, &instruction, "a constant value")),
        }
    }

    /// An integer literal, sign-extended to 64 bits.
    pub(crate) fn integer(&mut self) -> Result<i64> {
        let location = self.body.prev(self.call);
        match self.constant()? {
            Constant::Int32(v) => Ok(i64::from(v)),
            Constant::Int64(v) => Ok(v),
            Constant::Float(v) => Err(weaving_error!(
                PatternMismatch,
                location,
                "Expected an integer constant but found {}",
                v
            )),
        }
    }

    /// A floating point literal; integer literals are widened.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn float(&mut self) -> Result<f64> {
        Ok(match self.constant()? {
            Constant::Int32(v) => f64::from(v),
            Constant::Int64(v) => v as f64,
            Constant::Float(v) => v,
        })
    }

    pub(crate) fn boolean(&mut self) -> Result<bool> {
        Ok(self.integer()? != 0)
    }

    /// A string literal.
    pub(crate) fn string(&mut self) -> Result<String> {
        let (id, instruction) = self.take()?;
        match instruction.operand {
            Operand::String(value) if instruction.opcode == OpCode::Ldstr => Ok(value),
            _ => Err(Self::mismatch(id, &instruction, "a string literal")),
        }
    }

    /// An array literal: `newarr` followed by `dup; index; value; stelem` groups, or
    /// `Array.Empty<T>()`.
    pub(crate) fn array<T>(
        &mut self,
        mut element: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let (id, instruction) = self.take()?;
        if instruction.opcode == OpCode::Newarr {
            return match self.integer()? {
                0 => Ok(Vec::new()),
                count => Err(weaving_error!(
                    NullNotAllowed,
                    Some(id),
                    "A null value is not allowed here, the {} elements of the array are not initialized",
                    count
                )),
            };
        }
        if !is_array_store(instruction.opcode) {
            return match self.builder(id, &instruction, "an array") {
                Ok(BuilderCall::ArrayEmpty) => Ok(Vec::new()),
                Ok(_) => Err(Self::mismatch(id, &instruction, "an array")),
                Err(error) => Err(error),
            };
        }

        let mut elements = Vec::new();
        let newarr = loop {
            let value = element(self)?;
            let index = self.integer()?;
            let (dup_id, dup) = self.take()?;
            if dup.opcode != OpCode::Dup {
                return Err(Self::mismatch(dup_id, &dup, "an array element initializer"));
            }
            elements.push((index, value));

            let (next_id, next) = self.take()?;
            match next.opcode {
                OpCode::Newarr => break next_id,
                opcode if is_array_store(opcode) => {}
                _ => return Err(Self::mismatch(next_id, &next, "an array element initializer")),
            }
        };

        let count = self.integer()?;
        let count = usize::try_from(count).map_err(|_| {
            weaving_error!(Structural, Some(newarr), "Invalid array length {}", count)
        })?;
        if count > elements.len() {
            let unset = (0..=elements.len())
                .find(|&i| !elements.iter().any(|(index, _)| usize::try_from(*index) == Ok(i)))
                .unwrap_or(elements.len());
            return Err(weaving_error!(
                NullNotAllowed,
                Some(newarr),
                "A null value is not allowed here, array element {} is not set",
                unset
            ));
        }
        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(count).collect();
        for (index, value) in elements {
            let slot = usize::try_from(index)
                .ok()
                .and_then(|i| slots.get_mut(i))
                .ok_or_else(|| {
                    weaving_error!(
                        Structural,
                        Some(newarr),
                        "Array index {} is out of range",
                        index
                    )
                })?;
            if slot.is_some() {
                return Err(weaving_error!(
                    Structural,
                    Some(newarr),
                    "Array element {} is initialized more than once",
                    index
                ));
            }
            *slot = Some(value);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    weaving_error!(
                        NullNotAllowed,
                        Some(newarr),
                        "A null value is not allowed here, array element {} is not set",
                        index
                    )
                })
            })
            .collect()
    }

    /// A `System.Type` expression: `typeof(T)` optionally followed by `Make*Type` calls.
    pub(crate) fn type_value(&mut self) -> Result<TypeSig> {
        let (id, instruction) = self.take()?;
        let result = match self.builder(id, &instruction, "a type")? {
            BuilderCall::TypeFromHandle => {
                let (token_id, token) = self.take()?;
                match token {
                    Instruction {
                        opcode: OpCode::Ldtoken,
                        operand: Operand::Type(sig),
                    } => Ok(sig),
                    other => Err(Self::mismatch(token_id, &other, "ldtoken of a type")),
                }
            }
            BuilderCall::TypePointer => self.type_value().and_then(typeref::pointer),
            BuilderCall::TypeByRef => self.type_value().and_then(typeref::by_ref),
            BuilderCall::TypeArray => self.type_value().and_then(|t| typeref::array(t, 1)),
            BuilderCall::TypeArrayRank => {
                let rank = self.integer()?;
                let element = self.type_value()?;
                typeref::array(element, rank)
            }
            BuilderCall::TypeGeneric => {
                let arguments = self.array(Self::type_value)?;
                let definition = self.type_value()?;
                typeref::generic_instance(self.symbols, definition, arguments)
            }
            _ => Err(Self::mismatch(id, &instruction, "a type")),
        };
        result.map_err(|e| e.at(id))
    }

    /// A `TypeRef` expression.
    pub(crate) fn type_ref(&mut self) -> Result<TypeSig> {
        let (id, instruction) = self.take()?;
        let result = match self.builder(id, &instruction, "a type reference")? {
            BuilderCall::TypeRefFromType => self.type_value(),
            BuilderCall::TypeRefFromName => {
                let type_name = self.string()?;
                let assembly = self.string()?;
                typeref::from_name(self.symbols, &assembly, &type_name)
            }
            BuilderCall::TypeRefOf => instruction
                .method()
                .and_then(|m| m.generic_arguments.first().cloned())
                .ok_or_else(|| Self::mismatch(id, &instruction, "TypeRef.Type<T>()")),
            BuilderCall::TypeRefPointer => self.type_ref().and_then(typeref::pointer),
            BuilderCall::TypeRefByRef => self.type_ref().and_then(typeref::by_ref),
            BuilderCall::TypeRefArray => self.type_ref().and_then(|t| typeref::array(t, 1)),
            BuilderCall::TypeRefArrayRank => {
                let rank = self.integer()?;
                let element = self.type_ref()?;
                typeref::array(element, rank)
            }
            BuilderCall::TypeRefGeneric => {
                let arguments = self.array(Self::type_ref)?;
                let definition = self.type_ref()?;
                typeref::generic_instance(self.symbols, definition, arguments)
            }
            BuilderCall::TypeRefModifier { required } => {
                let modifier = self.type_ref()?;
                let element = self.type_ref()?;
                Ok(typeref::modified(element, modifier, required))
            }
            BuilderCall::GenericParameter => {
                let index = self.integer()?;
                let (owner_id, owner) = self.take()?;
                match self.builder(owner_id, &owner, "generic parameters")? {
                    BuilderCall::TypeGenericParameters => {
                        typeref::generic_parameter(GenericParamOwner::Type, index)
                    }
                    BuilderCall::MethodGenericParameters => {
                        typeref::generic_parameter(GenericParamOwner::Method, index)
                    }
                    _ => Err(Self::mismatch(owner_id, &owner, "generic parameters")),
                }
            }
            _ => Err(Self::mismatch(id, &instruction, "a type reference")),
        };
        result.map_err(|e| e.at(id))
    }

    fn type_refs(&mut self) -> Result<Vec<TypeSig>> {
        self.array(Self::type_ref)
    }

    /// A `MethodRef` expression.
    pub(crate) fn method_ref(&mut self) -> Result<MethodRef> {
        let (id, instruction) = self.take()?;
        let result = match self.builder(id, &instruction, "a method reference")? {
            BuilderCall::MethodRefByName {
                generic_arity,
                parameters,
            } => {
                let parameters = if parameters {
                    Some(self.type_refs()?)
                } else {
                    None
                };
                let arity = if generic_arity {
                    Some(self.integer()?)
                } else {
                    None
                };
                let name = self.string()?;
                let declaring_type = self.type_ref()?;
                methodref::by_name(
                    self.symbols,
                    &declaring_type,
                    &name,
                    arity,
                    parameters.as_deref(),
                )
            }
            call @ (BuilderCall::PropertyGet
            | BuilderCall::PropertySet
            | BuilderCall::EventAdd
            | BuilderCall::EventRemove
            | BuilderCall::EventRaise) => {
                let kind = match call {
                    BuilderCall::PropertyGet => Accessor::Get,
                    BuilderCall::PropertySet => Accessor::Set,
                    BuilderCall::EventAdd => Accessor::Add,
                    BuilderCall::EventRemove => Accessor::Remove,
                    _ => Accessor::Raise,
                };
                let member = self.string()?;
                let declaring_type = self.type_ref()?;
                methodref::accessor(self.symbols, &declaring_type, &member, kind)
            }
            BuilderCall::Constructor => {
                let parameters = self.type_refs()?;
                let declaring_type = self.type_ref()?;
                methodref::constructor(self.symbols, &declaring_type, &parameters)
            }
            BuilderCall::TypeInitializer => {
                let declaring_type = self.type_ref()?;
                methodref::type_initializer(self.symbols, &declaring_type)
            }
            BuilderCall::UnaryOperator => {
                let operator = self.integer()?;
                let declaring_type = self.type_ref()?;
                methodref::unary_operator(self.symbols, &declaring_type, operator)
            }
            BuilderCall::BinaryOperator => {
                let right = self.type_ref()?;
                let left = self.type_ref()?;
                let operator = self.integer()?;
                let declaring_type = self.type_ref()?;
                methodref::binary_operator(self.symbols, &declaring_type, operator, &left, &right)
            }
            BuilderCall::ConversionOperator => {
                let other = self.type_ref()?;
                let direction = self.integer()?;
                let kind = self.integer()?;
                let declaring_type = self.type_ref()?;
                methodref::conversion_operator(
                    self.symbols,
                    &declaring_type,
                    kind,
                    direction,
                    &other,
                )
            }
            BuilderCall::MethodRefGeneric => {
                let arguments = self.type_refs()?;
                let method = self.method_ref()?;
                methodref::make_generic(method, arguments)
            }
            BuilderCall::MethodRefOptionalParameters => {
                let parameters = self.type_refs()?;
                let method = self.method_ref()?;
                methodref::with_optional_parameters(method, parameters)
            }
            _ => Err(Self::mismatch(id, &instruction, "a method reference")),
        };
        result.map_err(|e| e.at(id))
    }

    /// A `FieldRef` expression.
    pub(crate) fn field_ref(&mut self) -> Result<FieldRef> {
        let (id, instruction) = self.take()?;
        let result = match self.builder(id, &instruction, "a field reference")? {
            BuilderCall::FieldRef => {
                let name = self.string()?;
                let declaring_type = self.type_ref()?;
                fieldref::find(self.symbols, &declaring_type, &name)
            }
            _ => Err(Self::mismatch(id, &instruction, "a field reference")),
        };
        result.map_err(|e| e.at(id))
    }

    /// A `StandAloneMethodSig` expression.
    pub(crate) fn signature(&mut self) -> Result<CallSiteSig> {
        let (id, instruction) = self.take()?;
        let result = match self.builder(id, &instruction, "a method signature")? {
            BuilderCall::ManagedSignature => {
                let parameters = self.type_refs()?;
                let return_type = self.type_ref()?;
                let flags = self.integer()?;
                callsite::managed(flags, return_type, parameters)
            }
            BuilderCall::UnmanagedSignature => {
                let parameters = self.type_refs()?;
                let return_type = self.type_ref()?;
                let convention = self.integer()?;
                callsite::unmanaged(convention, return_type, parameters)
            }
            BuilderCall::SignatureOptionalParameters => {
                let parameters = self.type_refs()?;
                let signature = self.signature()?;
                callsite::with_optional_parameters(signature, parameters)
            }
            _ => Err(Self::mismatch(id, &instruction, "a method signature")),
        };
        result.map_err(|e| e.at(id))
    }

    /// A `LocalVar` expression.
    pub(crate) fn local_var(&mut self) -> Result<LocalDecl> {
        let (id, instruction) = self.take()?;
        let result = match self.builder(id, &instruction, "a local variable")? {
            BuilderCall::LocalVar { named, system_type } => {
                let local_type = if system_type {
                    self.type_value()?
                } else {
                    self.type_ref()?
                };
                let name = if named { Some(self.string()?) } else { None };
                Ok(LocalDecl {
                    name,
                    local_type,
                    pinned: false,
                })
            }
            BuilderCall::LocalVarPinned => {
                let mut local = self.local_var()?;
                if local.pinned {
                    Err(weaving_error!(Structural, Some(id), "Local is already pinned"))
                } else {
                    local.pinned = true;
                    Ok(local)
                }
            }
            _ => Err(Self::mismatch(id, &instruction, "a local variable")),
        };
        result.map_err(|e| e.at(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{self, marker_type},
        ErrorKind,
    };

    struct Fixture {
        body: MethodBody,
        call: InstrId,
        symbols: SymbolSpace,
    }

    impl Fixture {
        fn new(arguments: Vec<Instruction>) -> Self {
            let mut body = MethodBody::new();
            for argument in arguments {
                body.push(argument);
            }
            let call = body.push(test::call(test::il_method("Push", vec![test::method_param(0)])));
            Fixture {
                body,
                call,
                symbols: test::symbols(),
            }
        }

        fn run<T>(&mut self, f: impl FnOnce(&mut Consumer<'_>) -> Result<T>) -> Result<T> {
            let blocks = BasicBlocks::compute(&self.body);
            let mut consumer =
                Consumer::new(&mut self.body, &blocks, &self.symbols, "InlineIL", self.call);
            f(&mut consumer)
        }
    }

    fn ldc(value: i32) -> Instruction {
        Instruction::create(OpCode::LdcI4, Operand::Int32(value)).unwrap()
    }

    fn ldstr(value: &str) -> Instruction {
        Instruction::create(OpCode::Ldstr, Operand::String(value.into())).unwrap()
    }

    fn type_of(sig: TypeSig) -> Vec<Instruction> {
        vec![
            Instruction::create(OpCode::Ldtoken, Operand::Type(sig)).unwrap(),
            test::call(test::type_from_handle()),
        ]
    }

    fn type_ref_of(sig: TypeSig) -> Vec<Instruction> {
        let mut code = type_of(sig);
        code.push(test::call(test::type_ref_from_type()));
        code
    }

    fn type_ref_array(types: Vec<TypeSig>) -> Vec<Instruction> {
        let mut code = vec![
            ldc(i32::try_from(types.len()).unwrap()),
            Instruction::create(OpCode::Newarr, Operand::Type(marker_type("TypeRef"))).unwrap(),
        ];
        for (index, sig) in types.into_iter().enumerate() {
            code.push(Instruction::new(OpCode::Dup));
            code.push(ldc(i32::try_from(index).unwrap()));
            code.extend(type_ref_of(sig));
            code.push(Instruction::new(OpCode::StelemRef));
        }
        code
    }

    #[test]
    fn constants_with_conversions() {
        let mut fixture = Fixture::new(vec![
            Instruction::new(OpCode::LdcI4M1),
            Instruction::new(OpCode::ConvU8),
        ]);
        assert_eq!(
            fixture.run(|c| c.constant()).unwrap(),
            Constant::Int64(0xFFFF_FFFF)
        );
        assert!(fixture.body.prev(fixture.call).is_none());

        let mut fixture = Fixture::new(vec![
            Instruction::new(OpCode::LdcI4M1),
            Instruction::new(OpCode::ConvI8),
        ]);
        assert_eq!(fixture.run(|c| c.integer()).unwrap(), -1);

        let mut fixture = Fixture::new(vec![ldc(300), Instruction::new(OpCode::ConvOvfU1)]);
        let error = fixture.run(|c| c.constant()).unwrap_err();
        assert!(error.to_string().contains("overflows conv.ovf.u1"));

        let mut fixture = Fixture::new(vec![ldc(300), Instruction::new(OpCode::ConvU1)]);
        assert_eq!(fixture.run(|c| c.integer()).unwrap(), 44);

        let mut fixture = Fixture::new(vec![
            Instruction::create(OpCode::LdcR8, Operand::Float64(2.5)).unwrap(),
        ]);
        assert!(fixture.run(|c| c.integer()).is_err());
    }

    #[test]
    fn string_arrays() {
        let mut fixture = Fixture::new(vec![
            ldc(2),
            Instruction::create(OpCode::Newarr, Operand::Type(test::string())).unwrap(),
            Instruction::new(OpCode::Dup),
            ldc(0),
            ldstr("a"),
            Instruction::new(OpCode::StelemRef),
            Instruction::new(OpCode::Dup),
            ldc(1),
            ldstr("b"),
            Instruction::new(OpCode::StelemRef),
        ]);
        let values = fixture.run(|c| c.array(Consumer::string)).unwrap();
        assert_eq!(values, vec!["a".to_string(), "b".to_string()]);
        assert!(fixture.body.prev(fixture.call).is_none());

        let mut fixture = Fixture::new(vec![
            ldc(2),
            Instruction::create(OpCode::Newarr, Operand::Type(test::string())).unwrap(),
            Instruction::new(OpCode::Dup),
            ldc(0),
            ldstr("a"),
            Instruction::new(OpCode::StelemRef),
        ]);
        let error = fixture.run(|c| c.array(Consumer::string)).unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::NullNotAllowed));

        let mut fixture = Fixture::new(vec![test::call(test::array_empty(test::string()))]);
        assert!(fixture.run(|c| c.array(Consumer::string)).unwrap().is_empty());
    }

    #[test]
    fn array_length_beyond_initializers() {
        let mut fixture = Fixture::new(vec![
            ldc(i32::MAX),
            Instruction::create(OpCode::Newarr, Operand::Type(test::string())).unwrap(),
            Instruction::new(OpCode::Dup),
            ldc(0),
            ldstr("a"),
            Instruction::new(OpCode::StelemRef),
        ]);
        let error = fixture.run(|c| c.array(Consumer::string)).unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::NullNotAllowed));
        assert!(error.to_string().contains("array element 1 is not set"));

        let mut fixture = Fixture::new(vec![
            ldc(3),
            Instruction::create(OpCode::Newarr, Operand::Type(test::string())).unwrap(),
            Instruction::new(OpCode::Dup),
            ldc(1),
            ldstr("b"),
            Instruction::new(OpCode::StelemRef),
        ]);
        let error = fixture.run(|c| c.array(Consumer::string)).unwrap_err();
        assert!(error.to_string().contains("array element 0 is not set"));
    }

    #[test]
    fn type_values_and_refs() {
        let mut code = type_of(test::int32());
        code.push(test::callvirt(test::system_type_method("MakeArrayType", vec![])));
        let mut fixture = Fixture::new(code);
        assert_eq!(
            fixture.run(|c| c.type_value()).unwrap().to_string(),
            "System.Int32[]"
        );

        let mut code = vec![
            ldstr("TestLib"),
            ldstr("TestLib.Box`1"),
            test::newobj(test::marker_ctor(
                "TypeRef",
                vec![test::string(), test::string()],
            )),
        ];
        code.extend(type_ref_array(vec![test::int32()]));
        code.push(test::callvirt(test::marker_instance_method(
            "TypeRef",
            "MakeGenericType",
            marker_type("TypeRef"),
            vec![marker_type("TypeRef").array(1)],
        )));
        let mut fixture = Fixture::new(code);
        assert_eq!(
            fixture.run(|c| c.type_ref()).unwrap().to_string(),
            "TestLib.Box`1<System.Int32>"
        );
        assert!(fixture.body.prev(fixture.call).is_none());
    }

    #[test]
    fn null_literals_are_reported() {
        let mut fixture = Fixture::new(vec![Instruction::new(OpCode::Ldnull)]);
        let error = fixture.run(|c| c.string()).unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::NullNotAllowed));
        assert_eq!(
            error.to_string(),
            "A null value is not allowed here, expected a string literal"
        );

        let mut fixture = Fixture::new(vec![ldc(1)]);
        let error = fixture.run(|c| c.string()).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Unexpected instruction, expected a string literal but found ldc.i4 1"
        );
    }

    #[test]
    fn arguments_must_share_the_call_block() {
        let mut fixture = Fixture::new(vec![ldstr("a")]);
        fixture
            .body
            .push(Instruction::create(OpCode::BrS, Operand::Target(fixture.call)).unwrap());
        let error = fixture.run(|c| c.string()).unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::Structural));
        assert!(error.to_string().contains("not in the same basic block"));
    }

    #[test]
    fn method_refs_by_name() {
        let symbols = test::symbols();
        let calculator = symbols.find_type("TestLib", "TestLib.Calculator").unwrap();

        let mut code = type_ref_of(calculator);
        code.push(ldstr("Add"));
        code.extend(type_ref_array(vec![test::int32(), test::int32()]));
        code.push(test::call(test::marker_static_method(
            "MethodRef",
            "Method",
            marker_type("MethodRef"),
            vec![
                marker_type("TypeRef"),
                test::string(),
                marker_type("TypeRef").array(1),
            ],
        )));
        let mut fixture = Fixture::new(code);
        assert_eq!(
            fixture.run(|c| c.method_ref()).unwrap().to_string(),
            "System.Int32 TestLib.Calculator::Add(System.Int32,System.Int32)"
        );
    }

    #[test]
    fn pinned_locals() {
        let mut code = vec![ldstr("buffer")];
        code.extend(type_of(test::int32().by_ref()));
        code.push(test::newobj(test::marker_ctor(
            "LocalVar",
            vec![test::string(), test::corlib("Type")],
        )));
        let pinned = test::marker_instance_method(
            "LocalVar",
            "Pinned",
            marker_type("LocalVar"),
            vec![],
        );
        code.push(test::callvirt(pinned.clone()));
        let mut fixture = Fixture::new(code.clone());
        let local = fixture.run(|c| c.local_var()).unwrap();
        assert_eq!(local.name.as_deref(), Some("buffer"));
        assert!(local.pinned);

        code.push(test::callvirt(pinned));
        let mut fixture = Fixture::new(code);
        let error = fixture.run(|c| c.local_var()).unwrap_err();
        assert_eq!(error.to_string(), "Local is already pinned");
    }
}
