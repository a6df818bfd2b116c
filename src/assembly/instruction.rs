//! CIL instruction representation, operand kinds and stack effects.
//!
//! This module defines the value types stored in a [`crate::assembly::MethodBody`]:
//! an [`Instruction`] is an [`OpCode`] plus a strongly typed [`Operand`]. Instructions
//! refer to each other only through [`InstrId`]s, which stay valid while the body is
//! being rewritten.
//!
//! # Key Components
//!
//! - [`InstrId`] - Stable identity of an instruction inside one method body
//! - [`Operand`] - Typed operand slot (constants, symbols, targets, locals, arguments)
//! - [`OperandType`] - The operand kind an opcode expects
//! - [`FlowType`] - Control flow behaviour classification
//! - [`StackBehavior`] - Resolved stack effect of one instruction
//!
//! # Examples
//!
//! ```rust
//! use cilweave::assembly::{Instruction, OpCode, Operand};
//!
//! let load = Instruction::create(OpCode::LdcI4, Operand::Int32(42))?;
//! assert_eq!(load.to_string(), "ldc.i4 42");
//! assert!(Instruction::create(OpCode::LdcI4, Operand::String("x".into())).is_err());
//! # Ok::<(), cilweave::Error>(())
//! ```

use std::{fmt, sync::Arc};

use crate::{
    assembly::OpCode,
    metadata::{CallSiteSig, FieldRef, MethodRef, TypeSig},
    Result,
};

/// Stable identity of an instruction within one method body.
///
/// Identities are never reused: removing an instruction unlinks it but keeps its slot,
/// so an id held by a label, handler or sequence point can always be checked for
/// liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(u32);

impl InstrId {
    /// Creates an id from its raw arena index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        InstrId(index)
    }

    /// The raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kinds of inline operands for CIL instructions.
///
/// # Examples
///
/// ```rust
/// use cilweave::assembly::{OpCode, OperandType};
///
/// assert_eq!(OpCode::LdcI4S.operand_type(), OperandType::Int8);
/// assert_eq!(OpCode::Br.operand_type(), OperandType::BranchTarget);
/// assert_eq!(OperandType::Switch.size(3), 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// No operand
    None,
    /// Signed 8-bit immediate (`ldc.i4.s`)
    Int8,
    /// Unsigned 8-bit immediate (`unaligned.`, `no.`)
    UInt8,
    /// Signed 32-bit immediate
    Int32,
    /// Signed 64-bit immediate
    Int64,
    /// 32-bit float immediate
    Float32,
    /// 64-bit float immediate
    Float64,
    /// User string
    String,
    /// Type token
    Type,
    /// Method token
    Method,
    /// Field token
    Field,
    /// Type, method or field token (`ldtoken`)
    Token,
    /// Stand-alone signature token (`calli`)
    Signature,
    /// 1-byte relative branch target
    ShortBranchTarget,
    /// 4-byte relative branch target
    BranchTarget,
    /// Switch jump table
    Switch,
    /// 1-byte local index
    ShortLocal,
    /// 2-byte local index
    Local,
    /// 1-byte argument index
    ShortArgument,
    /// 2-byte argument index
    Argument,
}

impl OperandType {
    /// Encoded size in bytes of an operand of this kind.
    ///
    /// `targets` is only used for [`OperandType::Switch`].
    #[must_use]
    pub const fn size(self, targets: usize) -> u32 {
        match self {
            OperandType::None => 0,
            OperandType::Int8
            | OperandType::UInt8
            | OperandType::ShortBranchTarget
            | OperandType::ShortLocal
            | OperandType::ShortArgument => 1,
            OperandType::Local | OperandType::Argument => 2,
            OperandType::Int32
            | OperandType::Float32
            | OperandType::String
            | OperandType::Type
            | OperandType::Method
            | OperandType::Field
            | OperandType::Token
            | OperandType::Signature
            | OperandType::BranchTarget => 4,
            OperandType::Int64 | OperandType::Float64 => 8,
            OperandType::Switch => 4 + 4 * targets as u32,
        }
    }

    /// Returns `true` for the two branch target kinds.
    #[must_use]
    pub const fn is_branch_target(self) -> bool {
        matches!(self, OperandType::ShortBranchTarget | OperandType::BranchTarget)
    }

    /// Returns `true` for the two local index kinds.
    #[must_use]
    pub const fn is_local(self) -> bool {
        matches!(self, OperandType::ShortLocal | OperandType::Local)
    }

    /// Returns `true` for the two argument index kinds.
    #[must_use]
    pub const fn is_argument(self) -> bool {
        matches!(self, OperandType::ShortArgument | OperandType::Argument)
    }
}

/// Control flow behaviour of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally or filter block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Resolved stack effect of one instruction.
///
/// Unlike [`OpCode::pops`], this is always known: call-like instructions compute it
/// from their signature operand and `ret` from the enclosing method's return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u16,
    /// Number of items pushed to stack
    pub pushes: u16,
    /// Clears the whole evaluation stack (`leave`, `endfinally`, `throw`, ...)
    pub clears: bool,
}

/// The operand slot of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Signed 8-bit constant
    Int8(i8),
    /// Unsigned 8-bit constant
    UInt8(u8),
    /// Signed 32-bit constant
    Int32(i32),
    /// Signed 64-bit constant
    Int64(i64),
    /// 32-bit float constant
    Float32(f32),
    /// 64-bit float constant
    Float64(f64),
    /// String literal
    String(String),
    /// Type reference
    Type(TypeSig),
    /// Method reference
    Method(Arc<MethodRef>),
    /// Field reference
    Field(Arc<FieldRef>),
    /// Stand-alone call-site signature
    Signature(Arc<CallSiteSig>),
    /// Branch target
    Target(InstrId),
    /// Switch jump table
    Switch(Vec<InstrId>),
    /// Index into the local variable table
    Local(u16),
    /// Index into the argument list, including `this`
    Argument(u16),
}

impl Operand {
    /// Returns `true` if this operand is acceptable for an opcode expecting `kind`.
    #[must_use]
    pub fn matches(&self, kind: OperandType) -> bool {
        match (self, kind) {
            (Operand::None, OperandType::None)
            | (Operand::Int8(_), OperandType::Int8)
            | (Operand::UInt8(_), OperandType::UInt8)
            | (Operand::Int32(_), OperandType::Int32)
            | (Operand::Int64(_), OperandType::Int64)
            | (Operand::Float32(_), OperandType::Float32)
            | (Operand::Float64(_), OperandType::Float64)
            | (Operand::String(_), OperandType::String)
            | (Operand::Type(_), OperandType::Type | OperandType::Token)
            | (Operand::Method(_), OperandType::Method | OperandType::Token)
            | (Operand::Field(_), OperandType::Field | OperandType::Token)
            | (Operand::Signature(_), OperandType::Signature)
            | (Operand::Switch(_), OperandType::Switch) => true,
            (Operand::Target(_), kind) => kind.is_branch_target(),
            (Operand::Argument(index), OperandType::ShortArgument)
            | (Operand::Local(index), OperandType::ShortLocal) => *index <= u16::from(u8::MAX),
            (Operand::Argument(_), OperandType::Argument)
            | (Operand::Local(_), OperandType::Local) => true,
            _ => false,
        }
    }

    /// Returns `true` if any symbol in this operand lives in `namespace`.
    #[must_use]
    pub fn references_namespace(&self, namespace: &str) -> bool {
        match self {
            Operand::Type(sig) => sig.references_namespace(namespace),
            Operand::Method(method) => method.references_namespace(namespace),
            Operand::Field(field) => field.references_namespace(namespace),
            Operand::Signature(sig) => sig.references_namespace(namespace),
            _ => false,
        }
    }
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand, matching `opcode.operand_type()`
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction without operand.
    ///
    /// The caller is responsible for `opcode` not requiring one; use
    /// [`Instruction::create`] for validated construction.
    #[must_use]
    pub const fn new(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// Creates an instruction, checking that the operand fits the opcode.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Weaving`] if `operand` does not match the operand kind of `opcode`.
    pub fn create(opcode: OpCode, operand: Operand) -> Result<Self> {
        if !operand.matches(opcode.operand_type()) {
            return Err(weaving_error!(
                PatternMismatch,
                None,
                "Opcode {} expects an operand of kind {:?}",
                opcode,
                opcode.operand_type()
            ));
        }

        Ok(Instruction { opcode, operand })
    }

    /// The control flow behaviour of this instruction.
    #[must_use]
    pub const fn flow_type(&self) -> FlowType {
        self.opcode.flow_type()
    }

    /// Check if this instruction is a branch (conditional, unconditional or switch).
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Switch
        )
    }

    /// Check if this instruction ends a basic block.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self.flow_type(), FlowType::Sequential | FlowType::Call)
    }

    /// Check if control can never reach the next instruction from this one.
    #[must_use]
    pub fn ends_flow(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }

    /// Returns `true` for prefix instructions.
    #[must_use]
    pub const fn is_prefix(&self) -> bool {
        self.opcode.is_prefix()
    }

    /// Returns `true` for `call`, `callvirt` and `newobj`.
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self.opcode, OpCode::Call | OpCode::Callvirt | OpCode::Newobj)
    }

    /// The method operand of this instruction, if any.
    #[must_use]
    pub fn method(&self) -> Option<&Arc<MethodRef>> {
        match &self.operand {
            Operand::Method(method) => Some(method),
            _ => None,
        }
    }

    /// The branch and switch targets of this instruction.
    #[must_use]
    pub fn targets(&self) -> Vec<InstrId> {
        match &self.operand {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// The local index this instruction accesses, covering the macro forms.
    #[must_use]
    pub fn local_index(&self) -> Option<u16> {
        match self.operand {
            Operand::Local(index) => Some(index),
            _ => self.opcode.implicit_local(),
        }
    }

    /// The argument index this instruction accesses, covering the macro forms.
    #[must_use]
    pub fn argument_index(&self) -> Option<u16> {
        match self.operand {
            Operand::Argument(index) => Some(index),
            _ => self.opcode.implicit_argument(),
        }
    }

    /// The `int32` constant loaded by any `ldc.i4` form.
    #[must_use]
    pub fn ldc_i4(&self) -> Option<i32> {
        match (self.opcode, &self.operand) {
            (OpCode::LdcI4S, Operand::Int8(value)) => Some(i32::from(*value)),
            (OpCode::LdcI4, Operand::Int32(value)) => Some(*value),
            (opcode, _) => opcode.implicit_i4(),
        }
    }

    /// Encoded size of this instruction in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        let targets = match &self.operand {
            Operand::Switch(targets) => targets.len(),
            _ => 0,
        };
        self.opcode.size() + self.opcode.operand_type().size(targets)
    }

    /// Resolves the stack effect of this instruction.
    ///
    /// `returns_value` tells whether the enclosing method returns a value, which
    /// determines what `ret` pops.
    #[must_use]
    pub fn stack_behavior(&self, returns_value: bool) -> StackBehavior {
        let clears = matches!(
            self.opcode,
            OpCode::Leave
                | OpCode::LeaveS
                | OpCode::Endfinally
                | OpCode::Endfilter
                | OpCode::Throw
                | OpCode::Rethrow
                | OpCode::Ret
                | OpCode::Jmp
        );

        let count = |n: usize| u16::try_from(n).unwrap_or(u16::MAX);
        let (pops, pushes) = match (self.opcode, &self.operand) {
            (OpCode::Call | OpCode::Callvirt, Operand::Method(method)) => (
                count(method.call_pops()),
                u16::from(method.returns_value()),
            ),
            (OpCode::Newobj, Operand::Method(method)) => (count(method.newobj_pops()), 1),
            (OpCode::Calli, Operand::Signature(sig)) => {
                (count(sig.call_pops()), u16::from(!sig.return_type.is_void()))
            }
            (OpCode::Ret, _) => (u16::from(returns_value), 0),
            (opcode, _) => (
                u16::from(opcode.pops().unwrap_or(0)),
                u16::from(opcode.pushes().unwrap_or(0)),
            ),
        };

        StackBehavior {
            pops,
            pushes,
            clears,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.name())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int8(value) => write!(f, " {value}"),
            Operand::UInt8(value) => write!(f, " {value}"),
            Operand::Int32(value) => write!(f, " {value}"),
            Operand::Int64(value) => write!(f, " {value}"),
            Operand::Float32(value) => write!(f, " {value}"),
            Operand::Float64(value) => write!(f, " {value}"),
            Operand::String(value) => write!(f, " {value:?}"),
            Operand::Type(sig) => write!(f, " {sig}"),
            Operand::Method(method) => write!(f, " {method}"),
            Operand::Field(field) => write!(f, " {field}"),
            Operand::Signature(sig) => write!(f, " {sig}"),
            Operand::Target(target) => write!(f, " {target}"),
            Operand::Switch(targets) => {
                f.write_str(" (")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{target}")?;
                }
                f.write_str(")")
            }
            Operand::Local(index) => write!(f, " V_{index}"),
            Operand::Argument(index) => write!(f, " A_{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CallingConvention, TypeSig};

    fn int32() -> TypeSig {
        TypeSig::corlib_value("System.Runtime", "System", "Int32")
    }

    fn void() -> TypeSig {
        TypeSig::corlib_value("System.Runtime", "System", "Void")
    }

    #[test]
    fn create_validates_operand() {
        assert!(Instruction::create(OpCode::LdcI4S, Operand::Int8(3)).is_ok());
        assert!(Instruction::create(OpCode::LdcI4S, Operand::Int32(3)).is_err());
        assert!(Instruction::create(OpCode::Br, Operand::Target(InstrId::new(1))).is_ok());
        assert!(Instruction::create(OpCode::LdlocS, Operand::Local(300)).is_err());
        assert!(Instruction::create(OpCode::Ldloc, Operand::Local(300)).is_ok());
        assert!(Instruction::create(OpCode::Ldtoken, Operand::Type(int32())).is_ok());
    }

    #[test]
    fn flow_classification() {
        assert!(Instruction::new(OpCode::Ret).is_terminal());
        assert!(Instruction::new(OpCode::Ret).ends_flow());
        assert!(!Instruction::new(OpCode::Add).is_terminal());
        let brtrue = Instruction::create(OpCode::Brtrue, Operand::Target(InstrId::new(0))).unwrap();
        assert!(brtrue.is_branch());
        assert!(brtrue.is_terminal());
        assert!(!brtrue.ends_flow());
    }

    #[test]
    fn constant_forms() {
        assert_eq!(Instruction::new(OpCode::LdcI45).ldc_i4(), Some(5));
        let short = Instruction::create(OpCode::LdcI4S, Operand::Int8(-7)).unwrap();
        assert_eq!(short.ldc_i4(), Some(-7));
        assert_eq!(Instruction::new(OpCode::Add).ldc_i4(), None);
    }

    #[test]
    fn call_stack_effects() {
        let method = MethodRef {
            declaring_type: TypeSig::corlib("Lib", "Lib", "Calc"),
            name: "Add".into(),
            has_this: true,
            explicit_this: false,
            calling_convention: CallingConvention::Default,
            return_type: int32(),
            parameters: vec![int32(), int32()],
            generic_arity: 0,
            generic_arguments: vec![],
            optional_parameters: None,
        };
        let call = Instruction::create(OpCode::Callvirt, Operand::Method(Arc::new(method))).unwrap();
        let effect = call.stack_behavior(false);
        assert_eq!((effect.pops, effect.pushes), (3, 1));

        let ret = Instruction::new(OpCode::Ret);
        assert_eq!(ret.stack_behavior(true).pops, 1);
        assert_eq!(ret.stack_behavior(false).pops, 0);
        assert!(ret.stack_behavior(false).clears);

        let ctor = MethodRef {
            declaring_type: TypeSig::corlib("Lib", "Lib", "Calc"),
            name: ".ctor".into(),
            has_this: true,
            explicit_this: false,
            calling_convention: CallingConvention::Default,
            return_type: void(),
            parameters: vec![int32()],
            generic_arity: 0,
            generic_arguments: vec![],
            optional_parameters: None,
        };
        let newobj = Instruction::create(OpCode::Newobj, Operand::Method(Arc::new(ctor))).unwrap();
        let effect = newobj.stack_behavior(false);
        assert_eq!((effect.pops, effect.pushes), (1, 1));
    }

    #[test]
    fn sizes() {
        assert_eq!(Instruction::new(OpCode::Nop).size(), 1);
        let switch = Instruction::create(
            OpCode::Switch,
            Operand::Switch(vec![InstrId::new(0), InstrId::new(1)]),
        )
        .unwrap();
        assert_eq!(switch.size(), 1 + 4 + 8);
        let stloc = Instruction::create(OpCode::Stloc, Operand::Local(4)).unwrap();
        assert_eq!(stloc.size(), 4);
    }

    #[test]
    fn display() {
        let ldstr = Instruction::create(OpCode::Ldstr, Operand::String("hi".into())).unwrap();
        assert_eq!(ldstr.to_string(), "ldstr \"hi\"");
        assert_eq!(Instruction::new(OpCode::Add).to_string(), "add");
    }
}
