//! CIL opcode mnemonics understood by the walker.
//!
//! Opcodes are grouped by their effect on the abstract stack rather than
//! listed one variant per encoding: `stelem.ref` and `stelem.i4` behave the
//! same for our purposes, so both parse to [`OpCode::Stelem`].

use strum::EnumString;

/// Stack-effect class of a CIL instruction
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum OpCode {
    #[strum(serialize = "nop")]
    Nop,
    #[strum(
        serialize = "constrained.",
        serialize = "volatile.",
        serialize = "readonly.",
        serialize = "tail.",
        serialize = "unaligned."
    )]
    Prefix,

    // Arguments and locals
    #[strum(serialize = "ldarg.0")]
    Ldarg0,
    #[strum(serialize = "ldarg.1")]
    Ldarg1,
    #[strum(serialize = "ldarg.2")]
    Ldarg2,
    #[strum(serialize = "ldarg.3")]
    Ldarg3,
    #[strum(serialize = "ldarg", serialize = "ldarg.s")]
    Ldarg,
    #[strum(serialize = "ldarga", serialize = "ldarga.s")]
    Ldarga,
    #[strum(serialize = "starg", serialize = "starg.s")]
    Starg,
    #[strum(serialize = "ldloc.0")]
    Ldloc0,
    #[strum(serialize = "ldloc.1")]
    Ldloc1,
    #[strum(serialize = "ldloc.2")]
    Ldloc2,
    #[strum(serialize = "ldloc.3")]
    Ldloc3,
    #[strum(serialize = "ldloc", serialize = "ldloc.s")]
    Ldloc,
    #[strum(serialize = "ldloca", serialize = "ldloca.s")]
    Ldloca,
    #[strum(serialize = "stloc.0")]
    Stloc0,
    #[strum(serialize = "stloc.1")]
    Stloc1,
    #[strum(serialize = "stloc.2")]
    Stloc2,
    #[strum(serialize = "stloc.3")]
    Stloc3,
    #[strum(serialize = "stloc", serialize = "stloc.s")]
    Stloc,

    // Constants
    #[strum(serialize = "ldnull")]
    Ldnull,
    #[strum(serialize = "ldc.i4.m1", serialize = "ldc.i4.M1")]
    LdcI4M1,
    #[strum(serialize = "ldc.i4.0")]
    LdcI40,
    #[strum(serialize = "ldc.i4.1")]
    LdcI41,
    #[strum(serialize = "ldc.i4.2")]
    LdcI42,
    #[strum(serialize = "ldc.i4.3")]
    LdcI43,
    #[strum(serialize = "ldc.i4.4")]
    LdcI44,
    #[strum(serialize = "ldc.i4.5")]
    LdcI45,
    #[strum(serialize = "ldc.i4.6")]
    LdcI46,
    #[strum(serialize = "ldc.i4.7")]
    LdcI47,
    #[strum(serialize = "ldc.i4.8")]
    LdcI48,
    #[strum(serialize = "ldc.i4", serialize = "ldc.i4.s", serialize = "ldc.i8")]
    LdcInt,
    #[strum(serialize = "ldc.r4", serialize = "ldc.r8")]
    LdcFloat,
    #[strum(serialize = "ldstr")]
    Ldstr,

    // Stack manipulation
    #[strum(serialize = "dup")]
    Dup,
    #[strum(serialize = "pop")]
    Pop,

    // Calls
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "callvirt")]
    Callvirt,
    #[strum(serialize = "newobj")]
    Newobj,
    #[strum(serialize = "ret")]
    Ret,

    // Branches; the walker never follows them
    #[strum(serialize = "br", serialize = "br.s")]
    Br,
    #[strum(serialize = "leave", serialize = "leave.s")]
    Leave,
    #[strum(
        serialize = "brtrue",
        serialize = "brtrue.s",
        serialize = "brinst",
        serialize = "brinst.s",
        serialize = "brfalse",
        serialize = "brfalse.s",
        serialize = "brnull",
        serialize = "brnull.s",
        serialize = "brzero",
        serialize = "brzero.s",
        serialize = "switch"
    )]
    BranchUnary,
    #[strum(
        serialize = "beq",
        serialize = "beq.s",
        serialize = "bne.un",
        serialize = "bne.un.s",
        serialize = "bge",
        serialize = "bge.s",
        serialize = "bge.un",
        serialize = "bge.un.s",
        serialize = "bgt",
        serialize = "bgt.s",
        serialize = "bgt.un",
        serialize = "bgt.un.s",
        serialize = "ble",
        serialize = "ble.s",
        serialize = "ble.un",
        serialize = "ble.un.s",
        serialize = "blt",
        serialize = "blt.s",
        serialize = "blt.un",
        serialize = "blt.un.s"
    )]
    BranchBinary,
    #[strum(serialize = "endfinally", serialize = "endfault")]
    Endfinally,
    #[strum(serialize = "throw")]
    Throw,
    #[strum(serialize = "rethrow")]
    Rethrow,

    // Fields
    #[strum(serialize = "ldfld")]
    Ldfld,
    #[strum(serialize = "ldflda")]
    Ldflda,
    #[strum(serialize = "stfld")]
    Stfld,
    #[strum(serialize = "ldsfld")]
    Ldsfld,
    #[strum(serialize = "ldsflda")]
    Ldsflda,
    #[strum(serialize = "stsfld")]
    Stsfld,

    // Arrays
    #[strum(serialize = "newarr")]
    Newarr,
    #[strum(
        serialize = "stelem",
        serialize = "stelem.ref",
        serialize = "stelem.i",
        serialize = "stelem.i1",
        serialize = "stelem.i2",
        serialize = "stelem.i4",
        serialize = "stelem.i8",
        serialize = "stelem.r4",
        serialize = "stelem.r8"
    )]
    Stelem,
    #[strum(
        serialize = "ldelem",
        serialize = "ldelem.ref",
        serialize = "ldelem.i",
        serialize = "ldelem.i1",
        serialize = "ldelem.u1",
        serialize = "ldelem.i2",
        serialize = "ldelem.u2",
        serialize = "ldelem.i4",
        serialize = "ldelem.u4",
        serialize = "ldelem.i8",
        serialize = "ldelem.r4",
        serialize = "ldelem.r8"
    )]
    Ldelem,
    #[strum(serialize = "ldelema")]
    Ldelema,
    #[strum(serialize = "ldlen")]
    Ldlen,

    // Tokens and type operations
    #[strum(serialize = "ldtoken")]
    Ldtoken,
    #[strum(serialize = "ldftn")]
    Ldftn,
    #[strum(serialize = "ldvirtftn")]
    Ldvirtftn,
    #[strum(serialize = "box")]
    Box,
    #[strum(serialize = "unbox", serialize = "unbox.any")]
    Unbox,
    #[strum(serialize = "castclass")]
    Castclass,
    #[strum(serialize = "isinst")]
    Isinst,
    #[strum(serialize = "initobj")]
    Initobj,
    #[strum(serialize = "sizeof")]
    Sizeof,

    // Value transformations
    #[strum(
        serialize = "conv.i",
        serialize = "conv.i1",
        serialize = "conv.i2",
        serialize = "conv.i4",
        serialize = "conv.i8",
        serialize = "conv.u",
        serialize = "conv.u1",
        serialize = "conv.u2",
        serialize = "conv.u4",
        serialize = "conv.u8",
        serialize = "conv.r4",
        serialize = "conv.r8",
        serialize = "conv.r.un",
        serialize = "conv.ovf.i4",
        serialize = "conv.ovf.u4",
        serialize = "conv.ovf.i8",
        serialize = "conv.ovf.u8"
    )]
    Convert,
    #[strum(
        serialize = "add",
        serialize = "add.ovf",
        serialize = "add.ovf.un",
        serialize = "sub",
        serialize = "sub.ovf",
        serialize = "sub.ovf.un",
        serialize = "mul",
        serialize = "mul.ovf",
        serialize = "mul.ovf.un",
        serialize = "div",
        serialize = "div.un",
        serialize = "rem",
        serialize = "rem.un",
        serialize = "and",
        serialize = "or",
        serialize = "xor",
        serialize = "shl",
        serialize = "shr",
        serialize = "shr.un",
        serialize = "ceq",
        serialize = "cgt",
        serialize = "cgt.un",
        serialize = "clt",
        serialize = "clt.un"
    )]
    Binary,
    #[strum(serialize = "neg", serialize = "not")]
    Unary,
    #[strum(
        serialize = "ldind.i",
        serialize = "ldind.i1",
        serialize = "ldind.u1",
        serialize = "ldind.i2",
        serialize = "ldind.u2",
        serialize = "ldind.i4",
        serialize = "ldind.u4",
        serialize = "ldind.i8",
        serialize = "ldind.r4",
        serialize = "ldind.r8",
        serialize = "ldind.ref",
        serialize = "ldobj"
    )]
    Ldind,
    #[strum(
        serialize = "stind.i",
        serialize = "stind.i1",
        serialize = "stind.i2",
        serialize = "stind.i4",
        serialize = "stind.i8",
        serialize = "stind.r4",
        serialize = "stind.r8",
        serialize = "stind.ref",
        serialize = "stobj"
    )]
    Stind,
}
