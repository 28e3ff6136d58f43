//! Memory-operand descriptor and the ModR/M + SIB + displacement emitter.
//!
//! The emitter is a state machine over four mutually exclusive addressing
//! shapes, always choosing the shortest legal encoding:
//!
//! 1. `[base]` with mod=00 — only when disp is 0, no relocation pins the
//!    field, and the base does not collide with the reserved
//!    "disp32 follows" encoding (RBP/R13).
//! 2. `[base+disp8]` with mod=01 — when the (possibly EVEX-compressed)
//!    displacement fits a signed byte.
//! 3. `[base+disp32]` with mod=10 — the universal fallback.
//! 4. No base — mod=00 with the reserved r/m=101 encoding and a mandatory
//!    disp32, interpreted on x86-64 as RIP-relative.
//!
//! A SIB byte is appended whenever an index is present (including VSIB)
//! or the base collides with the reserved "SIB follows" encoding
//! (RSP/R12).

use alloc::rc::Rc;
use alloc::string::String;

use crate::buffer::{CodeBuffer, RelocFormat, Relocation};
use crate::error::EmitError;
use crate::reg::{RegClass, Register};

/// Index scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Scale {
    /// ×1
    S1 = 0,
    /// ×2
    S2 = 1,
    /// ×4
    S4 = 2,
    /// ×8
    S8 = 3,
}

impl Scale {
    /// The 2-bit SIB.ss field.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Parse a scale factor.
    #[must_use]
    pub const fn from_factor(factor: u8) -> Option<Self> {
        match factor {
            1 => Some(Scale::S1),
            2 => Some(Scale::S2),
            4 => Some(Scale::S4),
            8 => Some(Scale::S8),
            _ => None,
        }
    }
}

/// x86-64 memory-operand descriptor.
///
/// `base`/`index` are optional; the index may be a vector register
/// (VSIB, gather/scatter). An attached symbol pins the displacement to a
/// 32-bit field and records a [`Relocation`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    base: Option<Register>,
    index: Option<Register>,
    scale: Scale,
    disp: i32,
    symbol: Option<Rc<str>>,
}

impl Address {
    /// `[base]`
    ///
    /// # Panics
    ///
    /// Panics if `base` is not a general-purpose register.
    #[must_use]
    pub fn base(base: Register) -> Self {
        assert!(base.is_gp(), "addressing base must be a GP register");
        Self {
            base: Some(base),
            index: None,
            scale: Scale::S1,
            disp: 0,
            symbol: None,
        }
    }

    /// RIP-relative reference to a buffer offset: the stored disp32 is
    /// corrected so the effective address lands on `target_offset` bytes
    /// from the start of the output buffer.
    #[must_use]
    pub fn pcrel(target_offset: i32) -> Self {
        Self {
            base: None,
            index: None,
            scale: Scale::S1,
            disp: target_offset,
            symbol: None,
        }
    }

    /// `[index*scale]` with no base: mod=00 with the reserved SIB base
    /// encoding and a mandatory disp32.
    ///
    /// # Panics
    ///
    /// Same index restrictions as [`Address::index`].
    #[must_use]
    pub fn index_only(index: Register, scale: Scale) -> Self {
        let addr = Self {
            base: None,
            index: None,
            scale: Scale::S1,
            disp: 0,
            symbol: None,
        };
        addr.index(index, scale)
    }

    /// RIP-relative reference to a symbol resolved by the patching pass.
    #[must_use]
    pub fn pcrel_symbol(symbol: &str) -> Self {
        Self {
            base: None,
            index: None,
            scale: Scale::S1,
            disp: 0,
            symbol: Some(Rc::from(symbol)),
        }
    }

    /// Attach `index*scale`.
    ///
    /// # Panics
    ///
    /// Panics if `index` uses the reserved "no index" encoding (GP
    /// register 4, the stack pointer) or is not a GP/vector register.
    #[must_use]
    pub fn index(mut self, index: Register, scale: Scale) -> Self {
        match index.class() {
            RegClass::Gp => assert!(
                index.num() != 4,
                "GP register 4 is the reserved \"no index\" encoding"
            ),
            RegClass::Vec => {}
            RegClass::Mask | RegClass::Fp => panic!("index must be a GP or vector register"),
        }
        self.index = Some(index);
        self.scale = scale;
        self
    }

    /// Attach a displacement.
    #[must_use]
    pub const fn disp(mut self, disp: i32) -> Self {
        self.disp = disp;
        self
    }

    /// Pin the displacement field to a symbol; forces the 32-bit form and
    /// records a [`Relocation`] when emitted.
    #[must_use]
    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(Rc::from(symbol));
        self
    }

    /// Checked constructor mirroring the builder's assertions; intended
    /// for fuzzing and property tests.
    ///
    /// # Errors
    ///
    /// Rejects reserved index encodings, invalid scales, wrong register
    /// banks, and displacements outside the signed 32-bit field.
    pub fn try_new(
        base: Option<Register>,
        index: Option<Register>,
        scale: u8,
        disp: i64,
    ) -> Result<Self, EmitError> {
        let scale = Scale::from_factor(scale).ok_or(EmitError::InvalidScale { scale })?;
        if i32::try_from(disp).is_err() {
            return Err(EmitError::DisplacementOverflow { disp });
        }
        if let Some(b) = base {
            if !b.is_gp() {
                return Err(EmitError::WrongRegisterClass);
            }
        }
        if let Some(idx) = index {
            match idx.class() {
                RegClass::Gp => {
                    if idx.num() == 4 {
                        return Err(EmitError::ReservedIndexEncoding { num: 4 });
                    }
                }
                // A vector index is VSIB; any base already passed the GP
                // check above, and a base-less VSIB is legal (mod=00,
                // base=101).
                RegClass::Vec => {}
                RegClass::Mask | RegClass::Fp => return Err(EmitError::WrongRegisterClass),
            }
        }
        Ok(Self {
            base,
            index,
            scale,
            disp: disp as i32,
            symbol: None,
        })
    }

    /// Base register, if any.
    #[must_use]
    pub const fn base_reg(&self) -> Option<Register> {
        self.base
    }

    /// Index register, if any.
    #[must_use]
    pub const fn index_reg(&self) -> Option<Register> {
        self.index
    }

    /// Displacement.
    #[must_use]
    pub const fn displacement(&self) -> i32 {
        self.disp
    }

    /// Symbol pinning the displacement, if any.
    #[must_use]
    pub fn symbol_name(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    /// Whether the index is a vector register (gather/scatter form).
    #[must_use]
    pub fn is_vsib(&self) -> bool {
        self.index.is_some_and(|r| r.is_vec())
    }

    /// REX.X equivalent: index needs an extension bit.
    #[must_use]
    pub fn index_ext(&self) -> bool {
        self.index.is_some_and(|r| r.needs_ext())
    }

    /// REX.B equivalent: base needs an extension bit.
    #[must_use]
    pub fn base_ext(&self) -> bool {
        self.base.is_some_and(|r| r.needs_ext())
    }

    /// EVEX V′ position for a VSIB index in the upper register bank.
    #[must_use]
    pub fn index_evex_ext(&self) -> bool {
        self.index.is_some_and(|r| r.needs_evex_ext())
    }
}

/// Build a ModR/M byte.
#[inline]
#[must_use]
pub(crate) const fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
    (mod_ << 6) | ((reg & 7) << 3) | (rm & 7)
}

/// Build a SIB byte.
#[inline]
#[must_use]
pub(crate) const fn sib(scale: Scale, index: u8, base: u8) -> u8 {
    (scale.bits() << 6) | ((index & 7) << 3) | (base & 7)
}

/// Displacement width decision for the base-register shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispEnc {
    None,
    D8(i8),
    D32(i32),
}

/// Pick the shortest legal displacement encoding.
///
/// `evex_scale` is `Some(N)` when the instruction encodes EVEX and its
/// tuple type compresses disp8 by factor N: the 8-bit form is then legal
/// iff `disp % N == 0` and the quotient fits a signed byte. A pinned
/// symbol always forces the 32-bit form.
fn choose_disp(disp: i32, base_low3: u8, pinned: bool, evex_scale: Option<i64>) -> DispEnc {
    if pinned {
        return DispEnc::D32(disp);
    }
    // mod=00 with r/m=101 means "disp32, no base", so RBP/R13 always
    // carry an explicit displacement even when it is zero.
    if disp == 0 && base_low3 != 5 {
        return DispEnc::None;
    }
    match evex_scale {
        Some(n) => {
            let d = i64::from(disp);
            if d % n == 0 && i8::try_from(d / n).is_ok() {
                DispEnc::D8((d / n) as i8)
            } else {
                DispEnc::D32(disp)
            }
        }
        None => match i8::try_from(disp) {
            Ok(d8) => DispEnc::D8(d8),
            Err(_) => DispEnc::D32(disp),
        },
    }
}

/// Emit ModR/M + SIB + displacement for `addr`, with `reg_field` in the
/// ModR/M reg position.
///
/// `evex_scale` carries the disp8 compression factor for EVEX-encoded
/// instructions (`None` for legacy/VEX). `trailing` is the number of
/// instruction bytes still to be emitted after the displacement field
/// (immediates, is4 bytes); RIP-relative displacements are corrected by
/// it so the effective address is computed from the end of the whole
/// instruction.
///
/// Returns the buffer offset of the displacement field, if one was
/// emitted.
pub(crate) fn emit_operand(
    buf: &mut CodeBuffer,
    reg_field: u8,
    addr: &Address,
    evex_scale: Option<i64>,
    trailing: usize,
) -> Option<usize> {
    let pinned = addr.symbol.is_some();

    match (addr.base, addr.index) {
        // RIP-relative: mod=00, r/m=101, mandatory disp32.
        (None, None) => {
            buf.emit_u8(modrm(0b00, reg_field, 0b101));
            let disp_off = buf.pos();
            if let Some(sym) = &addr.symbol {
                buf.emit_u32(0);
                buf.add_relocation(Relocation {
                    offset: disp_off,
                    size: 4,
                    target: Rc::clone(sym),
                    format: RelocFormat::Disp32,
                    addend: i64::from(addr.disp),
                    trailing_bytes: trailing as u8,
                });
            } else {
                // disp landed on a known buffer offset: correct for the
                // disp32 field itself plus any trailing bytes.
                let next = disp_off as i64 + 4 + trailing as i64;
                let rel = i64::from(addr.disp) - next;
                let rel = i32::try_from(rel).expect("RIP-relative target out of disp32 range");
                buf.emit_u32(rel as u32);
            }
            Some(disp_off)
        }

        // Index but no base: SIB with the reserved base=101, mod=00,
        // mandatory disp32. Covers both GP scaled-index and base-less
        // VSIB forms.
        (None, Some(idx)) => {
            buf.emit_u8(modrm(0b00, reg_field, 0b100));
            buf.emit_u8(sib(addr.scale, idx.low3(), 0b101));
            let disp_off = buf.pos();
            emit_pinned_or(buf, addr, disp_off);
            Some(disp_off)
        }

        (Some(base), index) => {
            if let Some(idx) = index {
                if idx.is_vec() {
                    assert!(
                        base.is_gp(),
                        "VSIB base must be a GP register distinct from the vector index"
                    );
                }
            }
            // SIB is mandatory with an index, and for RSP/R12 bases
            // (their encoding is the "SIB follows" sentinel).
            let need_sib = index.is_some() || base.low3() == 4;
            let enc = choose_disp(addr.disp, base.low3(), pinned, evex_scale);
            let mod_bits = match enc {
                DispEnc::None => 0b00,
                DispEnc::D8(_) => 0b01,
                DispEnc::D32(_) => 0b10,
            };

            if need_sib {
                buf.emit_u8(modrm(mod_bits, reg_field, 0b100));
                // SIB index 0b100 is the "no index" sentinel.
                let idx_field = index.map_or(0b100, Register::low3);
                buf.emit_u8(sib(addr.scale, idx_field, base.low3()));
            } else {
                buf.emit_u8(modrm(mod_bits, reg_field, base.low3()));
            }

            let disp_off = buf.pos();
            match enc {
                DispEnc::None => None,
                DispEnc::D8(d) => {
                    buf.emit_u8(d as u8);
                    Some(disp_off)
                }
                DispEnc::D32(d) => {
                    if let Some(sym) = &addr.symbol {
                        buf.emit_u32(0);
                        buf.add_relocation(Relocation {
                            offset: disp_off,
                            size: 4,
                            target: Rc::clone(sym),
                            format: RelocFormat::Disp32,
                            addend: i64::from(addr.disp),
                            trailing_bytes: trailing as u8,
                        });
                    } else {
                        buf.emit_u32(d as u32);
                    }
                    Some(disp_off)
                }
            }
        }
    }
}

/// disp32 for the base-less shapes: placeholder + relocation when a
/// symbol pins the field, the literal value otherwise.
fn emit_pinned_or(buf: &mut CodeBuffer, addr: &Address, disp_off: usize) {
    if let Some(sym) = &addr.symbol {
        buf.emit_u32(0);
        buf.add_relocation(Relocation {
            offset: disp_off,
            size: 4,
            target: Rc::clone(sym),
            format: RelocFormat::Disp32,
            addend: i64::from(addr.disp),
            trailing_bytes: 0,
        });
    } else {
        buf.emit_u32(addr.disp as u32);
    }
}

impl core::fmt::Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut parts: alloc::vec::Vec<String> = alloc::vec::Vec::new();
        if let Some(b) = self.base {
            parts.push(alloc::format!("{b}"));
        }
        if let Some(i) = self.index {
            parts.push(alloc::format!("{i}*{}", 1u8 << self.scale.bits()));
        }
        if self.disp != 0 || parts.is_empty() {
            parts.push(alloc::format!("{:#x}", self.disp));
        }
        write!(f, "[{}]", parts.join("+"))
    }
}
