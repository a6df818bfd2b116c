//! CIL opcode table (ECMA-335 Partition III).
//!
//! Every opcode is a variant of [`OpCode`]. The table generated below carries, per
//! opcode, the mnemonic, the encoded value (two-byte opcodes are `0xFEnn`), the
//! operand kind, the control flow behaviour and the fixed stack effect. Opcodes whose
//! stack effect depends on a method signature (`call`, `newobj`, `ret`, ...) report
//! `None` from [`OpCode::pops`] / [`OpCode::pushes`]; the instruction computes those
//! from its operand.
//!
//! The inline IL vocabulary names opcodes after their mnemonic with `.` replaced by
//! `_` (`Ldc_I4_S`, `Br_S`, `Tail`); [`OpCode::from_emit_name`] performs that mapping.
#![allow(missing_docs)]

use std::{collections::HashMap, sync::OnceLock};

use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::assembly::instruction::{FlowType, OperandType};

/// Marker for a stack count that depends on the operand.
const VAR: i8 = -1;

macro_rules! opcodes {
    ($($variant:ident = $name:literal, $value:literal, $operand:ident, $flow:ident, $pops:expr, $pushes:expr;)*) => {
        /// A CIL opcode.
        ///
        /// Variants are named after the mnemonic in camel case, e.g. [`OpCode::LdcI4S`] is
        /// `ldc.i4.s` and [`OpCode::ConvOvfI1Un`] is `conv.ovf.i1.un`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
        pub enum OpCode {
            $($variant,)*
        }

        impl OpCode {
            /// The IL mnemonic, e.g. `ldc.i4.s`.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(OpCode::$variant => $name,)*
                }
            }

            /// The encoded opcode value; two-byte opcodes carry the `0xFE` prefix in the high byte.
            #[must_use]
            pub const fn value(self) -> u16 {
                match self {
                    $(OpCode::$variant => $value,)*
                }
            }

            /// The kind of inline operand this opcode takes.
            #[must_use]
            pub const fn operand_type(self) -> OperandType {
                match self {
                    $(OpCode::$variant => OperandType::$operand,)*
                }
            }

            /// How this opcode affects control flow.
            #[must_use]
            pub const fn flow_type(self) -> FlowType {
                match self {
                    $(OpCode::$variant => FlowType::$flow,)*
                }
            }

            const fn stack_counts(self) -> (i8, i8) {
                match self {
                    $(OpCode::$variant => ($pops, $pushes),)*
                }
            }
        }
    };
}

opcodes! {
    Nop = "nop", 0x00, None, Sequential, 0, 0;
    Break = "break", 0x01, None, Sequential, 0, 0;
    Ldarg0 = "ldarg.0", 0x02, None, Sequential, 0, 1;
    Ldarg1 = "ldarg.1", 0x03, None, Sequential, 0, 1;
    Ldarg2 = "ldarg.2", 0x04, None, Sequential, 0, 1;
    Ldarg3 = "ldarg.3", 0x05, None, Sequential, 0, 1;
    Ldloc0 = "ldloc.0", 0x06, None, Sequential, 0, 1;
    Ldloc1 = "ldloc.1", 0x07, None, Sequential, 0, 1;
    Ldloc2 = "ldloc.2", 0x08, None, Sequential, 0, 1;
    Ldloc3 = "ldloc.3", 0x09, None, Sequential, 0, 1;
    Stloc0 = "stloc.0", 0x0A, None, Sequential, 1, 0;
    Stloc1 = "stloc.1", 0x0B, None, Sequential, 1, 0;
    Stloc2 = "stloc.2", 0x0C, None, Sequential, 1, 0;
    Stloc3 = "stloc.3", 0x0D, None, Sequential, 1, 0;
    LdargS = "ldarg.s", 0x0E, ShortArgument, Sequential, 0, 1;
    LdargaS = "ldarga.s", 0x0F, ShortArgument, Sequential, 0, 1;
    StargS = "starg.s", 0x10, ShortArgument, Sequential, 1, 0;
    LdlocS = "ldloc.s", 0x11, ShortLocal, Sequential, 0, 1;
    LdlocaS = "ldloca.s", 0x12, ShortLocal, Sequential, 0, 1;
    StlocS = "stloc.s", 0x13, ShortLocal, Sequential, 1, 0;
    Ldnull = "ldnull", 0x14, None, Sequential, 0, 1;
    LdcI4M1 = "ldc.i4.m1", 0x15, None, Sequential, 0, 1;
    LdcI40 = "ldc.i4.0", 0x16, None, Sequential, 0, 1;
    LdcI41 = "ldc.i4.1", 0x17, None, Sequential, 0, 1;
    LdcI42 = "ldc.i4.2", 0x18, None, Sequential, 0, 1;
    LdcI43 = "ldc.i4.3", 0x19, None, Sequential, 0, 1;
    LdcI44 = "ldc.i4.4", 0x1A, None, Sequential, 0, 1;
    LdcI45 = "ldc.i4.5", 0x1B, None, Sequential, 0, 1;
    LdcI46 = "ldc.i4.6", 0x1C, None, Sequential, 0, 1;
    LdcI47 = "ldc.i4.7", 0x1D, None, Sequential, 0, 1;
    LdcI48 = "ldc.i4.8", 0x1E, None, Sequential, 0, 1;
    LdcI4S = "ldc.i4.s", 0x1F, Int8, Sequential, 0, 1;
    LdcI4 = "ldc.i4", 0x20, Int32, Sequential, 0, 1;
    LdcI8 = "ldc.i8", 0x21, Int64, Sequential, 0, 1;
    LdcR4 = "ldc.r4", 0x22, Float32, Sequential, 0, 1;
    LdcR8 = "ldc.r8", 0x23, Float64, Sequential, 0, 1;
    Dup = "dup", 0x25, None, Sequential, 1, 2;
    Pop = "pop", 0x26, None, Sequential, 1, 0;
    Jmp = "jmp", 0x27, Method, Return, 0, 0;
    Call = "call", 0x28, Method, Call, VAR, VAR;
    Calli = "calli", 0x29, Signature, Call, VAR, VAR;
    Ret = "ret", 0x2A, None, Return, VAR, 0;
    BrS = "br.s", 0x2B, ShortBranchTarget, UnconditionalBranch, 0, 0;
    BrfalseS = "brfalse.s", 0x2C, ShortBranchTarget, ConditionalBranch, 1, 0;
    BrtrueS = "brtrue.s", 0x2D, ShortBranchTarget, ConditionalBranch, 1, 0;
    BeqS = "beq.s", 0x2E, ShortBranchTarget, ConditionalBranch, 2, 0;
    BgeS = "bge.s", 0x2F, ShortBranchTarget, ConditionalBranch, 2, 0;
    BgtS = "bgt.s", 0x30, ShortBranchTarget, ConditionalBranch, 2, 0;
    BleS = "ble.s", 0x31, ShortBranchTarget, ConditionalBranch, 2, 0;
    BltS = "blt.s", 0x32, ShortBranchTarget, ConditionalBranch, 2, 0;
    BneUnS = "bne.un.s", 0x33, ShortBranchTarget, ConditionalBranch, 2, 0;
    BgeUnS = "bge.un.s", 0x34, ShortBranchTarget, ConditionalBranch, 2, 0;
    BgtUnS = "bgt.un.s", 0x35, ShortBranchTarget, ConditionalBranch, 2, 0;
    BleUnS = "ble.un.s", 0x36, ShortBranchTarget, ConditionalBranch, 2, 0;
    BltUnS = "blt.un.s", 0x37, ShortBranchTarget, ConditionalBranch, 2, 0;
    Br = "br", 0x38, BranchTarget, UnconditionalBranch, 0, 0;
    Brfalse = "brfalse", 0x39, BranchTarget, ConditionalBranch, 1, 0;
    Brtrue = "brtrue", 0x3A, BranchTarget, ConditionalBranch, 1, 0;
    Beq = "beq", 0x3B, BranchTarget, ConditionalBranch, 2, 0;
    Bge = "bge", 0x3C, BranchTarget, ConditionalBranch, 2, 0;
    Bgt = "bgt", 0x3D, BranchTarget, ConditionalBranch, 2, 0;
    Ble = "ble", 0x3E, BranchTarget, ConditionalBranch, 2, 0;
    Blt = "blt", 0x3F, BranchTarget, ConditionalBranch, 2, 0;
    BneUn = "bne.un", 0x40, BranchTarget, ConditionalBranch, 2, 0;
    BgeUn = "bge.un", 0x41, BranchTarget, ConditionalBranch, 2, 0;
    BgtUn = "bgt.un", 0x42, BranchTarget, ConditionalBranch, 2, 0;
    BleUn = "ble.un", 0x43, BranchTarget, ConditionalBranch, 2, 0;
    BltUn = "blt.un", 0x44, BranchTarget, ConditionalBranch, 2, 0;
    Switch = "switch", 0x45, Switch, Switch, 1, 0;
    LdindI1 = "ldind.i1", 0x46, None, Sequential, 1, 1;
    LdindU1 = "ldind.u1", 0x47, None, Sequential, 1, 1;
    LdindI2 = "ldind.i2", 0x48, None, Sequential, 1, 1;
    LdindU2 = "ldind.u2", 0x49, None, Sequential, 1, 1;
    LdindI4 = "ldind.i4", 0x4A, None, Sequential, 1, 1;
    LdindU4 = "ldind.u4", 0x4B, None, Sequential, 1, 1;
    LdindI8 = "ldind.i8", 0x4C, None, Sequential, 1, 1;
    LdindI = "ldind.i", 0x4D, None, Sequential, 1, 1;
    LdindR4 = "ldind.r4", 0x4E, None, Sequential, 1, 1;
    LdindR8 = "ldind.r8", 0x4F, None, Sequential, 1, 1;
    LdindRef = "ldind.ref", 0x50, None, Sequential, 1, 1;
    StindRef = "stind.ref", 0x51, None, Sequential, 2, 0;
    StindI1 = "stind.i1", 0x52, None, Sequential, 2, 0;
    StindI2 = "stind.i2", 0x53, None, Sequential, 2, 0;
    StindI4 = "stind.i4", 0x54, None, Sequential, 2, 0;
    StindI8 = "stind.i8", 0x55, None, Sequential, 2, 0;
    StindR4 = "stind.r4", 0x56, None, Sequential, 2, 0;
    StindR8 = "stind.r8", 0x57, None, Sequential, 2, 0;
    Add = "add", 0x58, None, Sequential, 2, 1;
    Sub = "sub", 0x59, None, Sequential, 2, 1;
    Mul = "mul", 0x5A, None, Sequential, 2, 1;
    Div = "div", 0x5B, None, Sequential, 2, 1;
    DivUn = "div.un", 0x5C, None, Sequential, 2, 1;
    Rem = "rem", 0x5D, None, Sequential, 2, 1;
    RemUn = "rem.un", 0x5E, None, Sequential, 2, 1;
    And = "and", 0x5F, None, Sequential, 2, 1;
    Or = "or", 0x60, None, Sequential, 2, 1;
    Xor = "xor", 0x61, None, Sequential, 2, 1;
    Shl = "shl", 0x62, None, Sequential, 2, 1;
    Shr = "shr", 0x63, None, Sequential, 2, 1;
    ShrUn = "shr.un", 0x64, None, Sequential, 2, 1;
    Neg = "neg", 0x65, None, Sequential, 1, 1;
    Not = "not", 0x66, None, Sequential, 1, 1;
    ConvI1 = "conv.i1", 0x67, None, Sequential, 1, 1;
    ConvI2 = "conv.i2", 0x68, None, Sequential, 1, 1;
    ConvI4 = "conv.i4", 0x69, None, Sequential, 1, 1;
    ConvI8 = "conv.i8", 0x6A, None, Sequential, 1, 1;
    ConvR4 = "conv.r4", 0x6B, None, Sequential, 1, 1;
    ConvR8 = "conv.r8", 0x6C, None, Sequential, 1, 1;
    ConvU4 = "conv.u4", 0x6D, None, Sequential, 1, 1;
    ConvU8 = "conv.u8", 0x6E, None, Sequential, 1, 1;
    Callvirt = "callvirt", 0x6F, Method, Call, VAR, VAR;
    Cpobj = "cpobj", 0x70, Type, Sequential, 2, 0;
    Ldobj = "ldobj", 0x71, Type, Sequential, 1, 1;
    Ldstr = "ldstr", 0x72, String, Sequential, 0, 1;
    Newobj = "newobj", 0x73, Method, Call, VAR, 1;
    Castclass = "castclass", 0x74, Type, Sequential, 1, 1;
    Isinst = "isinst", 0x75, Type, Sequential, 1, 1;
    ConvRUn = "conv.r.un", 0x76, None, Sequential, 1, 1;
    Unbox = "unbox", 0x79, Type, Sequential, 1, 1;
    Throw = "throw", 0x7A, None, Throw, 1, 0;
    Ldfld = "ldfld", 0x7B, Field, Sequential, 1, 1;
    Ldflda = "ldflda", 0x7C, Field, Sequential, 1, 1;
    Stfld = "stfld", 0x7D, Field, Sequential, 2, 0;
    Ldsfld = "ldsfld", 0x7E, Field, Sequential, 0, 1;
    Ldsflda = "ldsflda", 0x7F, Field, Sequential, 0, 1;
    Stsfld = "stsfld", 0x80, Field, Sequential, 1, 0;
    Stobj = "stobj", 0x81, Type, Sequential, 2, 0;
    ConvOvfI1Un = "conv.ovf.i1.un", 0x82, None, Sequential, 1, 1;
    ConvOvfI2Un = "conv.ovf.i2.un", 0x83, None, Sequential, 1, 1;
    ConvOvfI4Un = "conv.ovf.i4.un", 0x84, None, Sequential, 1, 1;
    ConvOvfI8Un = "conv.ovf.i8.un", 0x85, None, Sequential, 1, 1;
    ConvOvfU1Un = "conv.ovf.u1.un", 0x86, None, Sequential, 1, 1;
    ConvOvfU2Un = "conv.ovf.u2.un", 0x87, None, Sequential, 1, 1;
    ConvOvfU4Un = "conv.ovf.u4.un", 0x88, None, Sequential, 1, 1;
    ConvOvfU8Un = "conv.ovf.u8.un", 0x89, None, Sequential, 1, 1;
    ConvOvfIUn = "conv.ovf.i.un", 0x8A, None, Sequential, 1, 1;
    ConvOvfUUn = "conv.ovf.u.un", 0x8B, None, Sequential, 1, 1;
    Box = "box", 0x8C, Type, Sequential, 1, 1;
    Newarr = "newarr", 0x8D, Type, Sequential, 1, 1;
    Ldlen = "ldlen", 0x8E, None, Sequential, 1, 1;
    Ldelema = "ldelema", 0x8F, Type, Sequential, 2, 1;
    LdelemI1 = "ldelem.i1", 0x90, None, Sequential, 2, 1;
    LdelemU1 = "ldelem.u1", 0x91, None, Sequential, 2, 1;
    LdelemI2 = "ldelem.i2", 0x92, None, Sequential, 2, 1;
    LdelemU2 = "ldelem.u2", 0x93, None, Sequential, 2, 1;
    LdelemI4 = "ldelem.i4", 0x94, None, Sequential, 2, 1;
    LdelemU4 = "ldelem.u4", 0x95, None, Sequential, 2, 1;
    LdelemI8 = "ldelem.i8", 0x96, None, Sequential, 2, 1;
    LdelemI = "ldelem.i", 0x97, None, Sequential, 2, 1;
    LdelemR4 = "ldelem.r4", 0x98, None, Sequential, 2, 1;
    LdelemR8 = "ldelem.r8", 0x99, None, Sequential, 2, 1;
    LdelemRef = "ldelem.ref", 0x9A, None, Sequential, 2, 1;
    StelemI = "stelem.i", 0x9B, None, Sequential, 3, 0;
    StelemI1 = "stelem.i1", 0x9C, None, Sequential, 3, 0;
    StelemI2 = "stelem.i2", 0x9D, None, Sequential, 3, 0;
    StelemI4 = "stelem.i4", 0x9E, None, Sequential, 3, 0;
    StelemI8 = "stelem.i8", 0x9F, None, Sequential, 3, 0;
    StelemR4 = "stelem.r4", 0xA0, None, Sequential, 3, 0;
    StelemR8 = "stelem.r8", 0xA1, None, Sequential, 3, 0;
    StelemRef = "stelem.ref", 0xA2, None, Sequential, 3, 0;
    Ldelem = "ldelem", 0xA3, Type, Sequential, 2, 1;
    Stelem = "stelem", 0xA4, Type, Sequential, 3, 0;
    UnboxAny = "unbox.any", 0xA5, Type, Sequential, 1, 1;
    ConvOvfI1 = "conv.ovf.i1", 0xB3, None, Sequential, 1, 1;
    ConvOvfU1 = "conv.ovf.u1", 0xB4, None, Sequential, 1, 1;
    ConvOvfI2 = "conv.ovf.i2", 0xB5, None, Sequential, 1, 1;
    ConvOvfU2 = "conv.ovf.u2", 0xB6, None, Sequential, 1, 1;
    ConvOvfI4 = "conv.ovf.i4", 0xB7, None, Sequential, 1, 1;
    ConvOvfU4 = "conv.ovf.u4", 0xB8, None, Sequential, 1, 1;
    ConvOvfI8 = "conv.ovf.i8", 0xB9, None, Sequential, 1, 1;
    ConvOvfU8 = "conv.ovf.u8", 0xBA, None, Sequential, 1, 1;
    Refanyval = "refanyval", 0xC2, Type, Sequential, 1, 1;
    Ckfinite = "ckfinite", 0xC3, None, Sequential, 1, 1;
    Mkrefany = "mkrefany", 0xC6, Type, Sequential, 1, 1;
    Ldtoken = "ldtoken", 0xD0, Token, Sequential, 0, 1;
    ConvU2 = "conv.u2", 0xD1, None, Sequential, 1, 1;
    ConvU1 = "conv.u1", 0xD2, None, Sequential, 1, 1;
    ConvI = "conv.i", 0xD3, None, Sequential, 1, 1;
    ConvOvfI = "conv.ovf.i", 0xD4, None, Sequential, 1, 1;
    ConvOvfU = "conv.ovf.u", 0xD5, None, Sequential, 1, 1;
    AddOvf = "add.ovf", 0xD6, None, Sequential, 2, 1;
    AddOvfUn = "add.ovf.un", 0xD7, None, Sequential, 2, 1;
    MulOvf = "mul.ovf", 0xD8, None, Sequential, 2, 1;
    MulOvfUn = "mul.ovf.un", 0xD9, None, Sequential, 2, 1;
    SubOvf = "sub.ovf", 0xDA, None, Sequential, 2, 1;
    SubOvfUn = "sub.ovf.un", 0xDB, None, Sequential, 2, 1;
    Endfinally = "endfinally", 0xDC, None, EndFinally, 0, 0;
    Leave = "leave", 0xDD, BranchTarget, Leave, 0, 0;
    LeaveS = "leave.s", 0xDE, ShortBranchTarget, Leave, 0, 0;
    StindI = "stind.i", 0xDF, None, Sequential, 2, 0;
    ConvU = "conv.u", 0xE0, None, Sequential, 1, 1;
    Arglist = "arglist", 0xFE00, None, Sequential, 0, 1;
    Ceq = "ceq", 0xFE01, None, Sequential, 2, 1;
    Cgt = "cgt", 0xFE02, None, Sequential, 2, 1;
    CgtUn = "cgt.un", 0xFE03, None, Sequential, 2, 1;
    Clt = "clt", 0xFE04, None, Sequential, 2, 1;
    CltUn = "clt.un", 0xFE05, None, Sequential, 2, 1;
    Ldftn = "ldftn", 0xFE06, Method, Sequential, 0, 1;
    Ldvirtftn = "ldvirtftn", 0xFE07, Method, Sequential, 1, 1;
    Ldarg = "ldarg", 0xFE09, Argument, Sequential, 0, 1;
    Ldarga = "ldarga", 0xFE0A, Argument, Sequential, 0, 1;
    Starg = "starg", 0xFE0B, Argument, Sequential, 1, 0;
    Ldloc = "ldloc", 0xFE0C, Local, Sequential, 0, 1;
    Ldloca = "ldloca", 0xFE0D, Local, Sequential, 0, 1;
    Stloc = "stloc", 0xFE0E, Local, Sequential, 1, 0;
    Localloc = "localloc", 0xFE0F, None, Sequential, 1, 1;
    Endfilter = "endfilter", 0xFE11, None, EndFinally, 1, 0;
    Unaligned = "unaligned.", 0xFE12, UInt8, Sequential, 0, 0;
    Volatile = "volatile.", 0xFE13, None, Sequential, 0, 0;
    Tail = "tail.", 0xFE14, None, Sequential, 0, 0;
    Initobj = "initobj", 0xFE15, Type, Sequential, 1, 0;
    Constrained = "constrained.", 0xFE16, Type, Sequential, 0, 0;
    Cpblk = "cpblk", 0xFE17, None, Sequential, 3, 0;
    Initblk = "initblk", 0xFE18, None, Sequential, 3, 0;
    No = "no.", 0xFE19, UInt8, Sequential, 0, 0;
    Rethrow = "rethrow", 0xFE1A, None, Throw, 0, 0;
    Sizeof = "sizeof", 0xFE1C, Type, Sequential, 0, 1;
    Refanytype = "refanytype", 0xFE1D, None, Sequential, 1, 1;
    Readonly = "readonly.", 0xFE1E, None, Sequential, 0, 0;
}

static MNEMONIC_TO_OPCODE: OnceLock<HashMap<&'static str, OpCode>> = OnceLock::new();

fn mnemonic_table() -> &'static HashMap<&'static str, OpCode> {
    MNEMONIC_TO_OPCODE.get_or_init(|| {
        let mut map = HashMap::with_capacity(OpCode::COUNT);
        for opcode in OpCode::iter() {
            map.insert(opcode.name(), opcode);
        }
        map
    })
}

impl OpCode {
    /// Looks up an opcode by its IL mnemonic (`"ldc.i4.s"`).
    #[must_use]
    pub fn from_mnemonic(mnemonic: &str) -> Option<OpCode> {
        mnemonic_table().get(mnemonic).copied()
    }

    /// Looks up an opcode by its inline IL method name (`"Ldc_I4_S"`, `"Tail"`).
    ///
    /// Prefix opcodes carry a trailing `.` in their mnemonic which the method name
    /// cannot express, so a second lookup with the dot appended is attempted.
    #[must_use]
    pub fn from_emit_name(name: &str) -> Option<OpCode> {
        let mnemonic = name.to_ascii_lowercase().replace('_', ".");
        OpCode::from_mnemonic(&mnemonic).or_else(|| OpCode::from_mnemonic(&format!("{mnemonic}.")))
    }

    /// The fixed number of stack slots this opcode pops, or `None` if it depends on the operand.
    #[must_use]
    pub const fn pops(self) -> Option<u8> {
        match self.stack_counts().0 {
            VAR => None,
            n => Some(n as u8),
        }
    }

    /// The fixed number of stack slots this opcode pushes, or `None` if it depends on the operand.
    #[must_use]
    pub const fn pushes(self) -> Option<u8> {
        match self.stack_counts().1 {
            VAR => None,
            n => Some(n as u8),
        }
    }

    /// Encoded size of the opcode itself, without operand.
    #[must_use]
    pub const fn size(self) -> u32 {
        if self.value() > 0xFF {
            2
        } else {
            1
        }
    }

    /// Returns `true` for the prefix opcodes (`tail.`, `volatile.`, `unaligned.`, ...).
    #[must_use]
    pub const fn is_prefix(self) -> bool {
        matches!(
            self,
            OpCode::Unaligned
                | OpCode::Volatile
                | OpCode::Tail
                | OpCode::Constrained
                | OpCode::No
                | OpCode::Readonly
        )
    }

    /// Returns `true` for the macro forms that encode a local index in the opcode (`ldloc.0` .. `stloc.3`).
    #[must_use]
    pub const fn is_short_local(self) -> bool {
        matches!(
            self,
            OpCode::Ldloc0
                | OpCode::Ldloc1
                | OpCode::Ldloc2
                | OpCode::Ldloc3
                | OpCode::Stloc0
                | OpCode::Stloc1
                | OpCode::Stloc2
                | OpCode::Stloc3
        )
    }

    /// The local index encoded in the opcode for `ldloc.N` / `stloc.N`.
    #[must_use]
    pub const fn implicit_local(self) -> Option<u16> {
        match self {
            OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
            OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
            OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
            OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
            _ => None,
        }
    }

    /// The argument index encoded in the opcode for `ldarg.N`.
    #[must_use]
    pub const fn implicit_argument(self) -> Option<u16> {
        match self {
            OpCode::Ldarg0 => Some(0),
            OpCode::Ldarg1 => Some(1),
            OpCode::Ldarg2 => Some(2),
            OpCode::Ldarg3 => Some(3),
            _ => None,
        }
    }

    /// The constant encoded in the opcode for `ldc.i4.m1` .. `ldc.i4.8`.
    #[must_use]
    pub const fn implicit_i4(self) -> Option<i32> {
        match self {
            OpCode::LdcI4M1 => Some(-1),
            OpCode::LdcI40 => Some(0),
            OpCode::LdcI41 => Some(1),
            OpCode::LdcI42 => Some(2),
            OpCode::LdcI43 => Some(3),
            OpCode::LdcI44 => Some(4),
            OpCode::LdcI45 => Some(5),
            OpCode::LdcI46 => Some(6),
            OpCode::LdcI47 => Some(7),
            OpCode::LdcI48 => Some(8),
            _ => None,
        }
    }

    /// The general indexed form of a short local opcode (`ldloc.1` -> `ldloc`).
    #[must_use]
    pub const fn general_local_form(self) -> Option<OpCode> {
        match self {
            OpCode::Ldloc0 | OpCode::Ldloc1 | OpCode::Ldloc2 | OpCode::Ldloc3 | OpCode::LdlocS => {
                Some(OpCode::Ldloc)
            }
            OpCode::Stloc0 | OpCode::Stloc1 | OpCode::Stloc2 | OpCode::Stloc3 | OpCode::StlocS => {
                Some(OpCode::Stloc)
            }
            OpCode::LdlocaS => Some(OpCode::Ldloca),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_are_unique() {
        assert_eq!(mnemonic_table().len(), OpCode::COUNT);
    }

    #[test]
    fn values_are_unique() {
        let mut values: Vec<u16> = OpCode::iter().map(OpCode::value).collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), OpCode::COUNT);
    }

    #[test]
    fn emit_names() {
        assert_eq!(OpCode::from_emit_name("Ldc_I4_S"), Some(OpCode::LdcI4S));
        assert_eq!(OpCode::from_emit_name("Br_S"), Some(OpCode::BrS));
        assert_eq!(OpCode::from_emit_name("Tail"), Some(OpCode::Tail));
        assert_eq!(OpCode::from_emit_name("Conv_Ovf_U1_Un"), Some(OpCode::ConvOvfU1Un));
        assert_eq!(OpCode::from_emit_name("Unaligned"), Some(OpCode::Unaligned));
        assert_eq!(OpCode::from_emit_name("Frobnicate"), None);
    }

    #[test]
    fn stack_counts() {
        assert_eq!(OpCode::Add.pops(), Some(2));
        assert_eq!(OpCode::Add.pushes(), Some(1));
        assert_eq!(OpCode::Call.pops(), None);
        assert_eq!(OpCode::Newobj.pushes(), Some(1));
        assert_eq!(OpCode::Ret.pops(), None);
        assert_eq!(OpCode::StelemRef.pops(), Some(3));
    }

    #[test]
    fn sizes_and_prefixes() {
        assert_eq!(OpCode::Nop.size(), 1);
        assert_eq!(OpCode::Ceq.size(), 2);
        assert!(OpCode::Tail.is_prefix());
        assert!(!OpCode::Call.is_prefix());
        assert_eq!(OpCode::Stloc2.general_local_form(), Some(OpCode::Stloc));
        assert_eq!(OpCode::Ldloc3.implicit_local(), Some(3));
        assert_eq!(OpCode::LdcI4M1.implicit_i4(), Some(-1));
    }
}
