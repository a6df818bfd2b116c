//! The mutable CIL instruction stream.
//!
//! This module holds everything the rewriter needs to represent and edit method code:
//!
//! - [`OpCode`] - The full ECMA-335 opcode table with operand kinds, flow and stack effects
//! - [`Instruction`] / [`Operand`] - One instruction and its typed operand
//! - [`MethodBody`] - Arena of instructions linked in program order, with the exception
//!   handler table, locals and sequence points
//! - [`BasicBlocks`] - Basic block membership, used for argument locality checks
//! - [`BodyBuilder`] - Label-based assembler for constructing bodies
//!
//! Instructions are addressed by [`InstrId`], which stays stable while the body is edited.

mod blocks;
mod body;
mod builder;
mod debug;
mod exceptions;
mod instruction;
mod opcodes;

pub use blocks::BasicBlocks;
pub use body::{LocalVariable, MethodBody};
pub use builder::BodyBuilder;
pub use debug::{SequencePoint, HIDDEN_LINE};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use instruction::{
    FlowType, InstrId, Instruction, Operand, OperandType, StackBehavior,
};
pub use opcodes::OpCode;
