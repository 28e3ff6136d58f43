//! Data-driven instruction table.
//!
//! One table entry per mnemonic — opcode byte, opcode map, mandatory
//! SIMD prefix, W bit, tuple type, and required feature tier — drives
//! the generic emitters in the parent module. Adding an instruction is a
//! table row, not a new function.

use super::attr::{Feature, InputSize, OpcodeMap, SimdPrefix, TupleType};

/// One instruction definition.
#[derive(Debug, Clone, Copy)]
pub struct InsnDef {
    /// Mnemonic.
    pub name: &'static str,
    /// Opcode byte within the map.
    pub opcode: u8,
    /// Opcode map (escape) selector.
    pub map: OpcodeMap,
    /// Mandatory SIMD prefix.
    pub prefix: SimdPrefix,
    /// W bit.
    pub wide: bool,
    /// EVEX tuple type for disp8 compression.
    pub tuple: TupleType,
    /// Element input size (scalar tuple types).
    pub input: InputSize,
    /// Minimum feature tier the instruction exists at.
    pub feature: Feature,
    /// Defined only in the EVEX encoding space.
    pub evex_only: bool,
    /// EVEX-eligible but may downgrade to VEX when no operand forces
    /// EVEX (the AVX-512VL code-density rule).
    pub allow_legacy: bool,
}

macro_rules! insn {
    ($name:literal, $op:literal, $map:ident, $pfx:ident, w=$w:literal,
     $tuple:ident, $input:ident, $feat:ident, evex_only=$eo:literal, vl=$vl:literal) => {
        InsnDef {
            name: $name,
            opcode: $op,
            map: OpcodeMap::$map,
            prefix: SimdPrefix::$pfx,
            wide: $w,
            tuple: TupleType::$tuple,
            input: InputSize::$input,
            feature: Feature::$feat,
            evex_only: $eo,
            allow_legacy: $vl,
        }
    };
}

/// The instruction table. Kept representative rather than exhaustive:
/// every encoding path of the generic emitters (legacy, VEX2, VEX3,
/// EVEX, scalar tuples, EVEX-only, broadcastable full-vector) has rows
/// exercising it.
pub const TABLE: &[InsnDef] = &[
    // Packed single-precision arithmetic (0F map, no prefix).
    insn!("vaddps", 0x58, Map0F, None, w = false, Fv, I32, Sse, evex_only = false, vl = true),
    insn!("vsubps", 0x5C, Map0F, None, w = false, Fv, I32, Sse, evex_only = false, vl = true),
    insn!("vmulps", 0x59, Map0F, None, w = false, Fv, I32, Sse, evex_only = false, vl = true),
    insn!("vdivps", 0x5E, Map0F, None, w = false, Fv, I32, Sse, evex_only = false, vl = true),
    insn!("vminps", 0x5D, Map0F, None, w = false, Fv, I32, Sse, evex_only = false, vl = true),
    insn!("vmaxps", 0x5F, Map0F, None, w = false, Fv, I32, Sse, evex_only = false, vl = true),
    insn!("vxorps", 0x57, Map0F, None, w = false, Fv, I32, Sse, evex_only = false, vl = true),
    // Packed double-precision (66 prefix, W1 under EVEX).
    insn!("vaddpd", 0x58, Map0F, P66, w = true, Fv, I64, Sse, evex_only = false, vl = true),
    insn!("vmulpd", 0x59, Map0F, P66, w = true, Fv, I64, Sse, evex_only = false, vl = true),
    // Scalar forms (tuple-1 scalar: disp8 scales by element size).
    insn!("vaddss", 0x58, Map0F, PF3, w = false, T1s, I32, Sse, evex_only = false, vl = true),
    insn!("vaddsd", 0x58, Map0F, PF2, w = true, T1s, I64, Sse, evex_only = false, vl = true),
    // Packed integer.
    insn!("vpaddd", 0xFE, Map0F, P66, w = false, Fv, I32, Sse, evex_only = false, vl = true),
    insn!("vpaddq", 0xD4, Map0F, P66, w = true, Fv, I64, Sse, evex_only = false, vl = true),
    insn!("vpand", 0xDB, Map0F, P66, w = false, Fv, I32, Sse, evex_only = false, vl = true),
    // EVEX-only: the quadword-masked AND only exists in EVEX space.
    insn!("vpandq", 0xDB, Map0F, P66, w = true, Fv, I64, Avx512, evex_only = true, vl = false),
    // 0F 38 map rows (never 2-byte VEX).
    insn!("vpmulld", 0x40, Map0F38, P66, w = false, Fv, I32, Avx, evex_only = false, vl = true),
    insn!("vfmadd231ps", 0xB8, Map0F38, P66, w = false, Fv, I32, Avx, evex_only = false, vl = true),
    // Full-vector moves.
    insn!("vmovups", 0x10, Map0F, None, w = false, Fvm, I32, Sse, evex_only = false, vl = true),
    insn!("vmovdqu", 0x6F, Map0F, PF3, w = false, Fvm, I32, Avx, evex_only = false, vl = true),
    insn!("vmovdqu64", 0x6F, Map0F, PF3, w = true, Fvm, I64, Avx512, evex_only = true, vl = false),
];

/// Look up a table entry by mnemonic.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static InsnDef> {
    TABLE.iter().find(|def| def.name == name)
}
