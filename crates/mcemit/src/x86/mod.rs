//! x86-64 instruction emitter.
//!
//! The generic engine: prefix selection (legacy / 2-byte VEX / 3-byte
//! VEX / 4-byte EVEX), ModR/M + SIB + displacement emission with EVEX
//! compressed displacements, and vendor NOP padding. Individual
//! mnemonics are rows in [`table::TABLE`] driving the generic emitters —
//! there is one encoding engine, not one function per instruction.

pub mod attr;
pub mod modrm;
pub mod nop;
pub mod table;

pub use attr::{
    select_prefix, Feature, InputSize, InstrAttributes, OpcodeMap, PrefixForm, SimdPrefix,
    TupleType, VectorLen,
};
pub use modrm::{Address, Scale};
pub use nop::Vendor;
pub use table::{lookup, InsnDef};

use crate::buffer::CodeBuffer;
use crate::reg::Register;
use modrm::{emit_operand, modrm};

// ─── x86-64 GP register constants ────────────────────────────────────

/// RAX.
pub const RAX: Register = Register::gp(0);
/// RCX.
pub const RCX: Register = Register::gp(1);
/// RDX.
pub const RDX: Register = Register::gp(2);
/// RBX.
pub const RBX: Register = Register::gp(3);
/// RSP. Encoding 4 is the "SIB follows" / "no index" sentinel.
pub const RSP: Register = Register::gp(4);
/// RBP. Encoding 5 is the "disp32, no base" sentinel under mod=00.
pub const RBP: Register = Register::gp(5);
/// RSI.
pub const RSI: Register = Register::gp(6);
/// RDI.
pub const RDI: Register = Register::gp(7);
/// R8.
pub const R8: Register = Register::gp(8);
/// R9.
pub const R9: Register = Register::gp(9);
/// R10.
pub const R10: Register = Register::gp(10);
/// R11.
pub const R11: Register = Register::gp(11);
/// R12. Shares the SIB sentinel low bits with RSP.
pub const R12: Register = Register::gp(12);
/// R13. Shares the disp32 sentinel low bits with RBP.
pub const R13: Register = Register::gp(13);
/// R14.
pub const R14: Register = Register::gp(14);
/// R15.
pub const R15: Register = Register::gp(15);

/// Vector register XMMn/YMMn/ZMMn (the width comes from the
/// instruction's [`VectorLen`], not the register).
#[must_use]
pub const fn xmm(n: u8) -> Register {
    Register::vec(n)
}

/// Opmask register kn.
#[must_use]
pub const fn k(n: u8) -> Register {
    Register::mask(n)
}

// ─── Prefix byte packing ─────────────────────────────────────────────

/// Build a REX prefix byte.
#[inline]
#[must_use]
const fn rex(w: bool, r: bool, x: bool, b: bool) -> u8 {
    0x40 | ((w as u8) << 3) | ((r as u8) << 2) | ((x as u8) << 1) | (b as u8)
}

/// Emit a 2-byte VEX prefix: C5 [R̄ v̄v̄v̄v̄ L pp].
fn emit_vex2(buf: &mut CodeBuffer, r: bool, vvvv: u8, l: bool, pp: u8) {
    let byte1 = (if r { 0 } else { 0x80 })
        | (((!vvvv) & 0x0F) << 3)
        | (if l { 0x04 } else { 0 })
        | (pp & 0x03);
    buf.emit_u8(0xC5);
    buf.emit_u8(byte1);
}

/// Emit a 3-byte VEX prefix: C4 [R̄ X̄ B̄ mmmmm] [W v̄v̄v̄v̄ L pp].
#[allow(clippy::too_many_arguments)]
fn emit_vex3(
    buf: &mut CodeBuffer,
    r: bool,
    x: bool,
    b: bool,
    map: OpcodeMap,
    w: bool,
    vvvv: u8,
    l: bool,
    pp: u8,
) {
    let byte1 = (if r { 0 } else { 0x80 })
        | (if x { 0 } else { 0x40 })
        | (if b { 0 } else { 0x20 })
        | (map.bits() & 0x1F);
    let byte2 = (if w { 0x80 } else { 0 })
        | (((!vvvv) & 0x0F) << 3)
        | (if l { 0x04 } else { 0 })
        | (pp & 0x03);
    buf.emit_u8(0xC4);
    buf.emit_u8(byte1);
    buf.emit_u8(byte2);
}

/// Emit a 4-byte EVEX prefix:
/// 62 [R̄ X̄ B̄ R̄′ 0 0 mm] [W v̄v̄v̄v̄ 1 pp] [z L′L b V̄′ aaa].
#[allow(clippy::too_many_arguments)]
fn emit_evex(
    buf: &mut CodeBuffer,
    r_ext: bool,
    x_ext: bool,
    b_ext: bool,
    r_prime: bool,
    map: OpcodeMap,
    w: bool,
    vvvv: u8,
    v_prime: bool,
    pp: u8,
    z: bool,
    ll: u8,
    b_bit: bool,
    aaa: u8,
) {
    let p0 = (if r_ext { 0 } else { 0x80 })
        | (if x_ext { 0 } else { 0x40 })
        | (if b_ext { 0 } else { 0x20 })
        | (if r_prime { 0 } else { 0x10 })
        | (map.bits() & 0x03);
    let p1 = (if w { 0x80 } else { 0 })
        | (((!vvvv) & 0x0F) << 3)
        | 0x04 // fixed bit
        | (pp & 0x03);
    let p2 = (if z { 0x80 } else { 0 })
        | ((ll & 0x03) << 5)
        | (if b_bit { 0x10 } else { 0 })
        | (if v_prime { 0 } else { 0x08 })
        | (aaa & 0x07);
    buf.emit_u8(0x62);
    buf.emit_u8(p0);
    buf.emit_u8(p1);
    buf.emit_u8(p2);
}

// ─── Assembler ───────────────────────────────────────────────────────

/// ModR/M r/m position: a register or a memory operand.
#[derive(Debug, Clone, Copy)]
enum Rm<'a> {
    Reg(Register),
    Mem(&'a Address),
}

/// x86-64 machine-code emitter over an owned [`CodeBuffer`].
///
/// One emitter per compilation task; the cursor advances monotonically.
#[derive(Debug)]
pub struct Assembler {
    buf: CodeBuffer,
    feature: Feature,
    vendor: Vendor,
}

impl Assembler {
    /// Create an emitter for the given maximum feature tier.
    #[must_use]
    pub fn new(feature: Feature) -> Self {
        Self {
            buf: CodeBuffer::new(),
            feature,
            vendor: Vendor::default(),
        }
    }

    /// Select the NOP-padding vendor table.
    #[must_use]
    pub fn vendor(mut self, vendor: Vendor) -> Self {
        self.vendor = vendor;
        self
    }

    /// Configured feature tier.
    #[must_use]
    pub fn feature(&self) -> Feature {
        self.feature
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.buf.pos()
    }

    /// Borrow the output buffer.
    #[must_use]
    pub fn buffer(&self) -> &CodeBuffer {
        &self.buf
    }

    /// Finish, yielding the output buffer.
    #[must_use]
    pub fn finish(self) -> CodeBuffer {
        self.buf
    }

    // ── Padding ──────────────────────────────────────────────────────

    /// Emit exactly `n` bytes of vendor-appropriate NOP padding.
    pub fn pad(&mut self, n: usize) {
        nop::pad(&mut self.buf, n, self.vendor);
    }

    /// Pad with NOPs until the cursor is a multiple of `modulus`.
    ///
    /// # Panics
    ///
    /// Panics if `modulus` is not a power of two.
    pub fn align(&mut self, modulus: usize) {
        assert!(modulus.is_power_of_two(), "alignment must be a power of two");
        let rem = self.buf.pos() & (modulus - 1);
        if rem != 0 {
            self.pad(modulus - rem);
        }
    }

    // ── GP integer operations (legacy + REX path) ────────────────────

    /// `mov dst, [addr]` (64-bit load, REX.W 8B /r).
    pub fn mov_load(&mut self, dst: Register, addr: &Address) {
        assert!(dst.is_gp(), "mov_load destination must be GP");
        assert!(!addr.is_vsib(), "GP load cannot take a VSIB operand");
        self.buf
            .emit_u8(rex(true, dst.needs_ext(), addr.index_ext(), addr.base_ext()));
        self.buf.emit_u8(0x8B);
        emit_operand(&mut self.buf, dst.low3(), addr, None, 0);
    }

    /// `mov [addr], src` (64-bit store, REX.W 89 /r).
    pub fn mov_store(&mut self, addr: &Address, src: Register) {
        assert!(src.is_gp(), "mov_store source must be GP");
        assert!(!addr.is_vsib(), "GP store cannot take a VSIB operand");
        self.buf
            .emit_u8(rex(true, src.needs_ext(), addr.index_ext(), addr.base_ext()));
        self.buf.emit_u8(0x89);
        emit_operand(&mut self.buf, src.low3(), addr, None, 0);
    }

    /// `lea dst, [addr]` (REX.W 8D /r).
    pub fn lea(&mut self, dst: Register, addr: &Address) {
        assert!(dst.is_gp(), "lea destination must be GP");
        assert!(!addr.is_vsib(), "lea cannot take a VSIB operand");
        self.buf
            .emit_u8(rex(true, dst.needs_ext(), addr.index_ext(), addr.base_ext()));
        self.buf.emit_u8(0x8D);
        emit_operand(&mut self.buf, dst.low3(), addr, None, 0);
    }

    /// `add dst, imm` (64-bit), choosing the cheapest immediate form:
    /// nothing for zero, sign-extended imm8 (83 /0), imm32 (81 /0).
    pub fn add_imm(&mut self, dst: Register, imm: i32) {
        assert!(dst.is_gp(), "add_imm destination must be GP");
        if imm == 0 {
            return;
        }
        self.buf.emit_u8(rex(true, false, false, dst.needs_ext()));
        if let Ok(imm8) = i8::try_from(imm) {
            self.buf.emit_u8(0x83);
            self.buf.emit_u8(modrm(0b11, 0, dst.low3()));
            self.buf.emit_u8(imm8 as u8);
        } else {
            self.buf.emit_u8(0x81);
            self.buf.emit_u8(modrm(0b11, 0, dst.low3()));
            self.buf.emit_u32(imm as u32);
        }
    }

    // ── Table-driven SIMD operations ─────────────────────────────────

    /// Three-register form: `op dst, src1, src2`.
    pub fn simd_rrr(&mut self, name: &str, len: VectorLen, dst: Register, src1: Register, src2: Register) {
        let def = Self::def(name);
        self.emit_simd(def, len, dst, Some(src1), Rm::Reg(src2), None, false, false);
    }

    /// Three-register form with an opmask: `op dst{k}{z}, src1, src2`.
    #[allow(clippy::too_many_arguments)]
    pub fn simd_rrr_masked(
        &mut self,
        name: &str,
        len: VectorLen,
        dst: Register,
        src1: Register,
        src2: Register,
        mask: Register,
        zeroing: bool,
    ) {
        let def = Self::def(name);
        self.emit_simd(def, len, dst, Some(src1), Rm::Reg(src2), Some(mask), zeroing, false);
    }

    /// Register–register–memory form: `op dst, src1, [addr]`.
    pub fn simd_rrm(&mut self, name: &str, len: VectorLen, dst: Register, src1: Register, addr: &Address) {
        let def = Self::def(name);
        self.emit_simd(def, len, dst, Some(src1), Rm::Mem(addr), None, false, false);
    }

    /// Full-control memory form: opmask, zeroing, and element broadcast.
    #[allow(clippy::too_many_arguments)]
    pub fn simd_rrm_full(
        &mut self,
        name: &str,
        len: VectorLen,
        dst: Register,
        src1: Register,
        addr: &Address,
        mask: Option<Register>,
        zeroing: bool,
        broadcast: bool,
    ) {
        let def = Self::def(name);
        self.emit_simd(def, len, dst, Some(src1), Rm::Mem(addr), mask, zeroing, broadcast);
    }

    /// Two-operand load form: `op dst, [addr]` (moves; vvvv unused).
    pub fn simd_rm(&mut self, name: &str, len: VectorLen, dst: Register, addr: &Address) {
        let def = Self::def(name);
        self.emit_simd(def, len, dst, None, Rm::Mem(addr), None, false, false);
    }

    /// Two-operand masked load form: `op dst{k}{z}, [addr]`.
    #[allow(clippy::too_many_arguments)]
    pub fn simd_rm_masked(
        &mut self,
        name: &str,
        len: VectorLen,
        dst: Register,
        addr: &Address,
        mask: Register,
        zeroing: bool,
    ) {
        let def = Self::def(name);
        self.emit_simd(def, len, dst, None, Rm::Mem(addr), Some(mask), zeroing, false);
    }

    /// Check whether this emitter's feature tier can encode `name` at
    /// all. The emitters themselves assert; this is the checked surface
    /// for callers doing instruction selection.
    ///
    /// # Errors
    ///
    /// [`EmitError::FeatureUnavailable`] when the instruction needs a
    /// tier above the configured one.
    pub fn supports(&self, name: &str) -> Result<&'static InsnDef, crate::EmitError> {
        let def = Self::def(name);
        if self.feature >= def.feature {
            Ok(def)
        } else {
            Err(crate::EmitError::FeatureUnavailable)
        }
    }

    fn def(name: &str) -> &'static InsnDef {
        table::lookup(name).unwrap_or_else(|| panic!("unknown mnemonic `{name}`"))
    }

    /// The generic SIMD encoding engine all table rows share.
    #[allow(clippy::too_many_arguments)]
    fn emit_simd(
        &mut self,
        def: &InsnDef,
        len: VectorLen,
        dst: Register,
        vvvv_reg: Option<Register>,
        rm: Rm<'_>,
        mask: Option<Register>,
        zeroing: bool,
        broadcast: bool,
    ) {
        assert!(
            self.feature >= def.feature,
            "`{}` needs {:?} but the emitter is configured for {:?}",
            def.name,
            def.feature,
            self.feature
        );
        assert!(dst.is_vec(), "SIMD destination must be a vector register");

        let mut attrs = InstrAttributes::new(len)
            .wide(def.wide)
            .tuple(def.tuple, def.input);
        if def.evex_only {
            attrs = attrs.evex_only();
        }
        if def.allow_legacy {
            attrs = attrs.allow_legacy();
        }
        if let Some(kreg) = mask {
            attrs = attrs.opmask(kreg);
            if zeroing {
                attrs = attrs.zeroing();
            }
        }
        if broadcast {
            attrs = attrs.broadcast();
        }

        // Collect every register operand: any encoding >= 16 forces EVEX.
        let mut regs = [dst; 4];
        let mut nregs = 1;
        if let Some(v) = vvvv_reg {
            regs[nregs] = v;
            nregs += 1;
        }
        match rm {
            Rm::Reg(r) => {
                regs[nregs] = r;
                nregs += 1;
            }
            Rm::Mem(a) => {
                if let Some(idx) = a.index_reg() {
                    if idx.is_vec() {
                        regs[nregs] = idx;
                        nregs += 1;
                    }
                }
            }
        }
        let (x_ext, b_ext) = match rm {
            Rm::Reg(r) => (false, r.needs_ext()),
            Rm::Mem(a) => (a.index_ext(), a.base_ext()),
        };

        let form = select_prefix(&attrs, self.feature, def.map, &regs[..nregs], x_ext, b_ext);
        let vvvv = vvvv_reg.map_or(0, |r| r.num() & 0x0F);
        let v_prime = vvvv_reg.is_some_and(Register::needs_evex_ext);
        let pp = def.prefix.pp();
        let l = len == VectorLen::L256;

        match form {
            PrefixForm::Legacy => {
                // Legacy SSE is destructive: dst doubles as first source.
                assert!(
                    vvvv_reg.is_none() || vvvv_reg == Some(dst),
                    "legacy encoding of `{}` requires dst == src1",
                    def.name
                );
                assert!(
                    len == VectorLen::L128,
                    "legacy encoding of `{}` is 128-bit only",
                    def.name
                );
                if let Some(p) = def.prefix.legacy_byte() {
                    self.buf.emit_u8(p);
                }
                let r = dst.needs_ext();
                if r || x_ext || b_ext {
                    self.buf.emit_u8(rex(false, r, x_ext, b_ext));
                }
                self.buf.emit_bytes(def.map.escape_bytes());
                self.buf.emit_u8(def.opcode);
            }
            PrefixForm::Vex2 => {
                emit_vex2(&mut self.buf, dst.needs_ext(), vvvv, l, pp);
                self.buf.emit_u8(def.opcode);
            }
            PrefixForm::Vex3 => {
                emit_vex3(
                    &mut self.buf,
                    dst.needs_ext(),
                    x_ext,
                    b_ext,
                    def.map,
                    def.wide,
                    vvvv,
                    l,
                    pp,
                );
                self.buf.emit_u8(def.opcode);
            }
            PrefixForm::Evex => {
                // In the register-register form, EVEX.X extends the r/m
                // register into the upper bank; for VSIB, V' extends the
                // vector index instead of vvvv.
                let (evex_x, vsib_vprime) = match rm {
                    Rm::Reg(r) => (r.needs_evex_ext(), false),
                    Rm::Mem(a) => {
                        if a.is_vsib() {
                            assert!(
                                vvvv_reg.is_none(),
                                "VSIB uses V' for the index; vvvv must be unused"
                            );
                            (a.index_ext(), a.index_evex_ext())
                        } else {
                            (a.index_ext(), false)
                        }
                    }
                };
                emit_evex(
                    &mut self.buf,
                    dst.needs_ext(),
                    evex_x,
                    b_ext,
                    dst.needs_evex_ext(),
                    def.map,
                    def.wide,
                    vvvv,
                    v_prime || vsib_vprime,
                    pp,
                    attrs.is_zeroing() && attrs.opmask_reg().is_some(),
                    len.ll(),
                    attrs.is_broadcast(),
                    attrs.opmask_field(),
                );
                self.buf.emit_u8(def.opcode);
            }
        }

        // Addressing bytes (or the register-direct ModR/M).
        match rm {
            Rm::Reg(r) => self.buf.emit_u8(modrm(0b11, dst.low3(), r.low3())),
            Rm::Mem(a) => {
                let scale = (form == PrefixForm::Evex).then(|| attrs.disp8_scale());
                emit_operand(&mut self.buf, dst.low3(), a, scale, 0);
            }
        }
    }
}
