//! Per-instruction encoding attributes and prefix-generation selection.
//!
//! [`InstrAttributes`] is an immutable value built once per instruction
//! and threaded explicitly through the prefix and ModR/M emitters — it
//! carries no back-reference to the emitter and must never be shared
//! across instructions.

use crate::reg::Register;

/// Maximum instruction-set extension tier the emitter may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Feature {
    /// Legacy SSE encodings only (66/F2/F3 + 0F escapes, REX).
    Sse,
    /// VEX encodings up to 256-bit vectors.
    Avx,
    /// EVEX encodings: 512-bit vectors, opmasks, registers 16–31.
    Avx512,
}

/// Vector length of a SIMD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VectorLen {
    /// 128-bit (XMM).
    L128,
    /// 256-bit (YMM).
    L256,
    /// 512-bit (ZMM).
    L512,
}

impl VectorLen {
    /// The 2-bit L′L field value.
    #[must_use]
    pub const fn ll(self) -> u8 {
        match self {
            VectorLen::L128 => 0,
            VectorLen::L256 => 1,
            VectorLen::L512 => 2,
        }
    }

    /// Vector width in bytes.
    #[must_use]
    pub const fn bytes(self) -> i64 {
        match self {
            VectorLen::L128 => 16,
            VectorLen::L256 => 32,
            VectorLen::L512 => 64,
        }
    }
}

/// Opcode map selector packed into VEX.mmmmm / EVEX.mm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpcodeMap {
    /// 0F escape map.
    Map0F = 1,
    /// 0F 38 escape map.
    Map0F38 = 2,
    /// 0F 3A escape map.
    Map0F3A = 3,
}

impl OpcodeMap {
    /// The map selector bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// The legacy escape byte sequence for non-VEX encodings.
    #[must_use]
    pub const fn escape_bytes(self) -> &'static [u8] {
        match self {
            OpcodeMap::Map0F => &[0x0F],
            OpcodeMap::Map0F38 => &[0x0F, 0x38],
            OpcodeMap::Map0F3A => &[0x0F, 0x3A],
        }
    }
}

/// Mandatory SIMD prefix folded into the pp field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SimdPrefix {
    /// No mandatory prefix.
    None = 0,
    /// 0x66.
    P66 = 1,
    /// 0xF3.
    PF3 = 2,
    /// 0xF2.
    PF2 = 3,
}

impl SimdPrefix {
    /// The 2-bit pp field value.
    #[must_use]
    pub const fn pp(self) -> u8 {
        self as u8
    }

    /// The literal prefix byte for legacy encodings, if any.
    #[must_use]
    pub const fn legacy_byte(self) -> Option<u8> {
        match self {
            SimdPrefix::None => None,
            SimdPrefix::P66 => Some(0x66),
            SimdPrefix::PF3 => Some(0xF3),
            SimdPrefix::PF2 => Some(0xF2),
        }
    }
}

/// EVEX tuple type: the memory-operand element pattern that decides the
/// disp8 compression factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TupleType {
    /// Full vector.
    Fv,
    /// Half vector.
    Hv,
    /// Full vector memory.
    Fvm,
    /// Tuple-1 scalar (factor follows the element input size).
    T1s,
    /// Tuple-1 fixed (32- or 64-bit element).
    T1f,
    /// Tuple-2.
    T2,
    /// Tuple-4.
    T4,
    /// Tuple-8.
    T8,
    /// Half vector memory.
    Hvm,
    /// Quarter vector memory.
    Qvm,
    /// Eighth vector memory.
    Ovm,
    /// Fixed 128-bit memory.
    M128,
    /// MOVDDUP pattern.
    Dup,
}

/// Element input size, used by the scalar tuple types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InputSize {
    /// 8-bit elements.
    I8,
    /// 16-bit elements.
    I16,
    /// 32-bit elements.
    I32,
    /// 64-bit elements.
    I64,
}

/// Which prefix generation an instruction encodes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixForm {
    /// Legacy SSE: mandatory prefix byte + 0F escape(s), optional REX.
    Legacy,
    /// 2-byte VEX (C5).
    Vex2,
    /// 3-byte VEX (C4).
    Vex3,
    /// 4-byte EVEX (62).
    Evex,
}

/// Immutable per-instruction attribute set.
///
/// Built fresh for every instruction emission and consumed once by the
/// prefix and ModR/M emitters.
#[derive(Debug, Clone, Copy)]
pub struct InstrAttributes {
    vector_len: VectorLen,
    wide: bool,
    evex_only: bool,
    legacy_ok: bool,
    opmask: Option<Register>,
    zero_masking: bool,
    tuple: TupleType,
    input_size: InputSize,
    broadcast: bool,
}

impl InstrAttributes {
    /// Attributes for an instruction of the given vector length, with
    /// every optional feature off: W clear, no opmask, merge semantics,
    /// full-vector tuple.
    #[must_use]
    pub const fn new(vector_len: VectorLen) -> Self {
        Self {
            vector_len,
            wide: false,
            evex_only: false,
            legacy_ok: false,
            opmask: None,
            zero_masking: false,
            tuple: TupleType::Fvm,
            input_size: InputSize::I32,
            broadcast: false,
        }
    }

    /// Set the W bit (64-bit element width / wide operation).
    #[must_use]
    pub const fn wide(mut self, w: bool) -> Self {
        self.wide = w;
        self
    }

    /// Mark the instruction as defined only in the EVEX encoding space.
    #[must_use]
    pub const fn evex_only(mut self) -> Self {
        self.evex_only = true;
        self
    }

    /// Allow downgrading an EVEX-eligible instruction to the shorter
    /// VEX/legacy form when no operand forces EVEX (code density).
    #[must_use]
    pub const fn allow_legacy(mut self) -> Self {
        self.legacy_ok = true;
        self
    }

    /// Attach an opmask register.
    ///
    /// # Panics
    ///
    /// Panics if `k` is not a mask register, or is `k0` (the encoding for
    /// "no masking").
    #[must_use]
    pub fn opmask(mut self, k: Register) -> Self {
        assert!(k.is_mask(), "opmask must be a mask register");
        assert!(k.num() != 0, "k0 means no masking; omit the opmask instead");
        self.opmask = Some(k);
        self
    }

    /// Select zeroing-masking instead of merge-masking. Only meaningful
    /// when an opmask is attached.
    #[must_use]
    pub const fn zeroing(mut self) -> Self {
        self.zero_masking = true;
        self
    }

    /// Set the tuple type and element input size used for disp8
    /// compression.
    #[must_use]
    pub const fn tuple(mut self, tuple: TupleType, input: InputSize) -> Self {
        self.tuple = tuple;
        self.input_size = input;
        self
    }

    /// Mark the memory operand as element-broadcast.
    #[must_use]
    pub const fn broadcast(mut self) -> Self {
        self.broadcast = true;
        self
    }

    /// Requested vector length.
    #[must_use]
    pub const fn vector_len(&self) -> VectorLen {
        self.vector_len
    }

    /// W bit.
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        self.wide
    }

    /// Whether the instruction exists only as an EVEX encoding.
    #[must_use]
    pub const fn is_evex_only(&self) -> bool {
        self.evex_only
    }

    /// Whether downgrading to VEX/legacy is permitted.
    #[must_use]
    pub const fn legacy_allowed(&self) -> bool {
        self.legacy_ok
    }

    /// Attached opmask register, if any.
    #[must_use]
    pub const fn opmask_reg(&self) -> Option<Register> {
        self.opmask
    }

    /// The 3-bit aaa opmask field (0 = no masking).
    #[must_use]
    pub fn opmask_field(&self) -> u8 {
        self.opmask.map_or(0, |k| k.num() & 0x7)
    }

    /// Whether zeroing-masking is selected. Only meaningful together
    /// with an opmask.
    #[must_use]
    pub const fn is_zeroing(&self) -> bool {
        self.zero_masking
    }

    /// Whether the memory operand broadcasts a single element.
    #[must_use]
    pub const fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    /// EVEX disp8 compression factor for this tuple/length/width
    /// combination (Intel SDM table 2-34/2-35).
    #[must_use]
    pub fn disp8_scale(&self) -> i64 {
        let len = self.vector_len.bytes();
        match self.tuple {
            TupleType::Fv => {
                if self.broadcast {
                    if self.wide {
                        8
                    } else {
                        4
                    }
                } else {
                    len
                }
            }
            TupleType::Hv => {
                if self.broadcast {
                    4
                } else {
                    len / 2
                }
            }
            TupleType::Fvm => len,
            TupleType::T1s => match self.input_size {
                InputSize::I8 => 1,
                InputSize::I16 => 2,
                InputSize::I32 => 4,
                InputSize::I64 => 8,
            },
            TupleType::T1f => {
                if self.wide {
                    8
                } else {
                    4
                }
            }
            TupleType::T2 => {
                if self.wide {
                    16
                } else {
                    8
                }
            }
            TupleType::T4 => {
                if self.wide {
                    32
                } else {
                    16
                }
            }
            TupleType::T8 => 32,
            TupleType::Hvm => len / 2,
            TupleType::Qvm => len / 4,
            TupleType::Ovm => len / 8,
            TupleType::M128 => 16,
            TupleType::Dup => match self.vector_len {
                VectorLen::L128 => 8,
                VectorLen::L256 => 32,
                VectorLen::L512 => 64,
            },
        }
    }
}

/// Decide the prefix generation for one instruction.
///
/// `regs` are all register operands (including the vvvv source and any
/// VSIB index); `x_ext`/`b_ext` are the bit-3 extension flags of the
/// index and r/m (or base) positions, which rule out the 2-byte VEX form.
///
/// # Panics
///
/// Panics when EVEX semantics are required but `feature` reports no
/// AVX-512 support — a build/target misconfiguration in the caller.
#[must_use]
pub fn select_prefix(
    attrs: &InstrAttributes,
    feature: Feature,
    map: OpcodeMap,
    regs: &[Register],
    x_ext: bool,
    b_ext: bool,
) -> PrefixForm {
    let upper_bank = regs.iter().any(|r| r.needs_evex_ext());
    let masked = attrs.opmask_reg().is_some();

    // Operands can force EVEX no matter what the table says.
    let forced = upper_bank || masked || attrs.vector_len() == VectorLen::L512;
    if forced || (attrs.is_evex_only() && !attrs.legacy_allowed()) {
        assert!(
            feature >= Feature::Avx512,
            "EVEX encoding required but feature tier is {feature:?}"
        );
        return PrefixForm::Evex;
    }

    if feature == Feature::Sse {
        return PrefixForm::Legacy;
    }

    // 2-byte VEX only covers the 0F map with W clear and no X/B extension.
    if map == OpcodeMap::Map0F && !attrs.is_wide() && !x_ext && !b_ext {
        PrefixForm::Vex2
    } else {
        PrefixForm::Vex3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: u8) -> Register {
        Register::vec(n)
    }

    #[test]
    fn upper_bank_forces_evex() {
        let attrs = InstrAttributes::new(VectorLen::L128);
        let form = select_prefix(
            &attrs,
            Feature::Avx512,
            OpcodeMap::Map0F,
            &[v(16), v(1), v(2)],
            false,
            false,
        );
        assert_eq!(form, PrefixForm::Evex);
    }

    #[test]
    fn opmask_forces_evex() {
        let attrs = InstrAttributes::new(VectorLen::L128).opmask(Register::mask(1));
        let form = select_prefix(
            &attrs,
            Feature::Avx512,
            OpcodeMap::Map0F,
            &[v(0), v(1), v(2)],
            false,
            false,
        );
        assert_eq!(form, PrefixForm::Evex);
    }

    #[test]
    fn evex_only_downgrades_when_allowed() {
        let attrs = InstrAttributes::new(VectorLen::L128).evex_only().allow_legacy();
        let form = select_prefix(
            &attrs,
            Feature::Avx512,
            OpcodeMap::Map0F,
            &[v(0), v(1), v(2)],
            false,
            false,
        );
        assert_eq!(form, PrefixForm::Vex2);
    }

    #[test]
    fn vex3_when_w_or_map_or_ext() {
        let attrs = InstrAttributes::new(VectorLen::L128).wide(true);
        let form = select_prefix(
            &attrs,
            Feature::Avx,
            OpcodeMap::Map0F,
            &[v(0), v(1), v(2)],
            false,
            false,
        );
        assert_eq!(form, PrefixForm::Vex3);

        let attrs = InstrAttributes::new(VectorLen::L128);
        let form = select_prefix(
            &attrs,
            Feature::Avx,
            OpcodeMap::Map0F38,
            &[v(0), v(1), v(2)],
            false,
            false,
        );
        assert_eq!(form, PrefixForm::Vex3);
    }

    #[test]
    #[should_panic(expected = "EVEX encoding required")]
    fn evex_without_avx512_is_a_misconfiguration() {
        let attrs = InstrAttributes::new(VectorLen::L512);
        let _ = select_prefix(&attrs, Feature::Avx, OpcodeMap::Map0F, &[], false, false);
    }

    #[test]
    fn disp8_scale_table() {
        let fv512 = InstrAttributes::new(VectorLen::L512).tuple(TupleType::Fv, InputSize::I32);
        assert_eq!(fv512.disp8_scale(), 64);
        let fv128 = InstrAttributes::new(VectorLen::L128).tuple(TupleType::Fv, InputSize::I32);
        assert_eq!(fv128.disp8_scale(), 16);
        let bcast = InstrAttributes::new(VectorLen::L512)
            .tuple(TupleType::Fv, InputSize::I32)
            .broadcast();
        assert_eq!(bcast.disp8_scale(), 4);
        let t1s8 = InstrAttributes::new(VectorLen::L128).tuple(TupleType::T1s, InputSize::I8);
        assert_eq!(t1s8.disp8_scale(), 1);
        let t1s64 = InstrAttributes::new(VectorLen::L128).tuple(TupleType::T1s, InputSize::I64);
        assert_eq!(t1s64.disp8_scale(), 8);
        let ovm = InstrAttributes::new(VectorLen::L128).tuple(TupleType::Ovm, InputSize::I8);
        assert_eq!(ovm.disp8_scale(), 2);
    }
}
