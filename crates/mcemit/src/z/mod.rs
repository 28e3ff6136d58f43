//! z/Architecture (s390x) instruction emitter.
//!
//! Instructions are big-endian, 2/4/6 bytes long. Memory operands carry
//! either a 12-bit unsigned displacement (the classic RX/RS families)
//! or a 20-bit signed displacement (the RXY/RSY families); the
//! optimized emitters in [`Assembler`] pick between the two forms and
//! fall back to scratch-register synthesis when neither range covers
//! the displacement.

pub mod bits;

pub use bits::{make_mask, BitCombine};

use crate::buffer::CodeBuffer;
use crate::error::EmitError;
use crate::reg::Register;

// ─── Register constants ──────────────────────────────────────────────

/// General-purpose register r0. Reserved as a base/index sentinel in
/// memory operands; still usable as a data register.
pub const R0: Register = Register::gp(0);
/// r1.
pub const R1: Register = Register::gp(1);
/// r2.
pub const R2: Register = Register::gp(2);
/// r3.
pub const R3: Register = Register::gp(3);
/// r4.
pub const R4: Register = Register::gp(4);
/// r5.
pub const R5: Register = Register::gp(5);
/// r6.
pub const R6: Register = Register::gp(6);
/// r7.
pub const R7: Register = Register::gp(7);
/// r8.
pub const R8: Register = Register::gp(8);
/// r9.
pub const R9: Register = Register::gp(9);
/// r10.
pub const R10: Register = Register::gp(10);
/// r11.
pub const R11: Register = Register::gp(11);
/// r12.
pub const R12: Register = Register::gp(12);
/// r13.
pub const R13: Register = Register::gp(13);
/// r14.
pub const R14: Register = Register::gp(14);
/// r15 (stack pointer by convention).
pub const R15: Register = Register::gp(15);

/// Floating-point register fn.
#[must_use]
pub const fn f(n: u8) -> Register {
    Register::fp(n)
}

// ─── Immediate ranges ────────────────────────────────────────────────

/// Fits the 12-bit unsigned displacement of the classic forms.
#[must_use]
pub const fn is_uimm12(v: i64) -> bool {
    v >= 0 && v < 4096
}

/// Fits a signed 16-bit immediate.
#[must_use]
pub const fn is_simm16(v: i64) -> bool {
    v >= i16::MIN as i64 && v <= i16::MAX as i64
}

/// Fits the 20-bit signed displacement of the long-displacement forms.
#[must_use]
pub const fn is_simm20(v: i64) -> bool {
    v >= -(1 << 19) && v < (1 << 19)
}

/// Fits a signed 32-bit immediate.
#[must_use]
pub const fn is_simm32(v: i64) -> bool {
    v >= i32::MIN as i64 && v <= i32::MAX as i64
}

// ─── Memory operand ──────────────────────────────────────────────────

/// A base + optional index + displacement memory operand.
///
/// The displacement is kept at full width; the emitter decides at
/// encoding time whether it fits a 12-bit, a 20-bit, or no directly
/// encodable field at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZAddress {
    base: Register,
    index: Option<Register>,
    disp: i64,
}

impl ZAddress {
    /// `disp(base)` with no index.
    ///
    /// # Panics
    ///
    /// Panics if `base` is not GP or is r0 (encoding 0 in the base
    /// field means "no base" and would silently drop the register).
    #[must_use]
    pub fn new(base: Register, disp: i64) -> Self {
        assert!(base.is_gp(), "base must be a GP register");
        assert!(base.num() != 0, "r0 cannot be used as a base register");
        Self {
            base,
            index: None,
            disp,
        }
    }

    /// Add an index register.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not GP or is r0 (encoding 0 in the index
    /// field means "no index").
    #[must_use]
    pub fn index(mut self, index: Register) -> Self {
        assert!(index.is_gp(), "index must be a GP register");
        assert!(index.num() != 0, "r0 cannot be used as an index register");
        self.index = Some(index);
        self
    }

    /// Base register.
    #[must_use]
    pub const fn base_reg(&self) -> Register {
        self.base
    }

    /// Index register, if any.
    #[must_use]
    pub const fn index_reg(&self) -> Option<Register> {
        self.index
    }

    /// Displacement.
    #[must_use]
    pub const fn displacement(&self) -> i64 {
        self.disp
    }

    const fn x2(&self) -> u8 {
        match self.index {
            Some(r) => r.num(),
            None => 0,
        }
    }

    const fn with_disp(self, disp: i64) -> Self {
        Self { disp, ..self }
    }

    const fn with_base(self, base: Register) -> Self {
        Self { base, ..self }
    }
}

// ─── Instruction format emitters ─────────────────────────────────────
//
// Field layouts follow the Principles of Operation format names. All
// multi-byte values are emitted big-endian.

/// RX: op(8) r1(4) x2(4) b2(4) d2(12).
fn emit_rx(buf: &mut CodeBuffer, op: u8, r1: u8, x2: u8, b2: u8, d2: i64) {
    assert!(is_uimm12(d2), "RX displacement {d2} out of uimm12 range");
    let word = (u32::from(op) << 24)
        | (u32::from(r1 & 0xF) << 20)
        | (u32::from(x2 & 0xF) << 16)
        | (u32::from(b2 & 0xF) << 12)
        | (d2 as u32 & 0xFFF);
    buf.emit_u32_be(word);
}

/// RXY: op1(8) r1(4) x2(4) b2(4) dl2(12) dh2(8) op2(8).
fn emit_rxy(buf: &mut CodeBuffer, op1: u8, op2: u8, r1: u8, x2: u8, b2: u8, d2: i64) {
    assert!(is_simm20(d2), "RXY displacement {d2} out of simm20 range");
    let dl = (d2 as u32) & 0xFFF;
    let dh = ((d2 >> 12) as u32) & 0xFF;
    let word = (u64::from(op1) << 40)
        | (u64::from(r1 & 0xF) << 36)
        | (u64::from(x2 & 0xF) << 32)
        | (u64::from(b2 & 0xF) << 28)
        | (u64::from(dl) << 16)
        | (u64::from(dh) << 8)
        | u64::from(op2);
    buf.emit_u48_be(word);
}

/// RSY: op1(8) r1(4) r3(4) b2(4) dl2(12) dh2(8) op2(8).
fn emit_rsy(buf: &mut CodeBuffer, op1: u8, op2: u8, r1: u8, r3: u8, b2: u8, d2: i64) {
    // Same field layout as RXY with r3 in the index position.
    emit_rxy(buf, op1, op2, r1, r3, b2, d2);
}

/// RRE: op(16) ----(8) r1(4) r2(4).
fn emit_rre(buf: &mut CodeBuffer, op: u16, r1: u8, r2: u8) {
    let word = (u32::from(op) << 16) | (u32::from(r1 & 0xF) << 4) | u32::from(r2 & 0xF);
    buf.emit_u32_be(word);
}

/// RRF-a: op(16) r3(4) m4(4) r1(4) r2(4).
fn emit_rrf_a(buf: &mut CodeBuffer, op: u16, r1: u8, r2: u8, r3: u8) {
    let word = (u32::from(op) << 16)
        | (u32::from(r3 & 0xF) << 12)
        | (u32::from(r1 & 0xF) << 4)
        | u32::from(r2 & 0xF);
    buf.emit_u32_be(word);
}

/// RI: op1(8) r1(4) op2(4) i2(16).
fn emit_ri(buf: &mut CodeBuffer, op1: u8, op2: u8, r1: u8, i2: i64) {
    assert!(is_simm16(i2), "RI immediate {i2} out of simm16 range");
    let word = (u32::from(op1) << 24)
        | (u32::from(r1 & 0xF) << 20)
        | (u32::from(op2 & 0xF) << 16)
        | (i2 as u32 & 0xFFFF);
    buf.emit_u32_be(word);
}

/// RIL: op1(8) r1(4) op2(4) i2(32).
fn emit_ril(buf: &mut CodeBuffer, op1: u8, op2: u8, r1: u8, i2: u32) {
    let word = (u64::from(op1) << 40)
        | (u64::from(r1 & 0xF) << 36)
        | (u64::from(op2 & 0xF) << 32)
        | u64::from(i2);
    buf.emit_u48_be(word);
}

/// RIE-f: op1(8) r1(4) r2(4) i3(8) i4(8) i5(8) op2(8).
fn emit_rie_f(buf: &mut CodeBuffer, op2: u8, r1: u8, r2: u8, i3: u8, i4: u8, i5: u8) {
    let word = (0xECu64 << 40)
        | (u64::from(r1 & 0xF) << 36)
        | (u64::from(r2 & 0xF) << 32)
        | (u64::from(i3) << 24)
        | (u64::from(i4) << 16)
        | (u64::from(i5) << 8)
        | u64::from(op2);
    buf.emit_u48_be(word);
}

/// RIE-d: op1(8) r1(4) r3(4) i2(16) ----(8) op2(8).
fn emit_rie_d(buf: &mut CodeBuffer, op2: u8, r1: u8, r3: u8, i2: i64) {
    assert!(is_simm16(i2), "RIE immediate {i2} out of simm16 range");
    let word = (0xECu64 << 40)
        | (u64::from(r1 & 0xF) << 36)
        | (u64::from(r3 & 0xF) << 32)
        | ((i2 as u64 & 0xFFFF) << 16)
        | u64::from(op2);
    buf.emit_u48_be(word);
}

// ─── Memory instruction table ────────────────────────────────────────

/// A reg↔mem operation with a classic (12-bit displacement, 4-byte)
/// form and a modern (20-bit displacement, 6-byte) form. The 64-bit
/// integer operations exist only in the modern family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemInsn {
    /// 32-bit integer load (L / LY).
    Load32,
    /// 64-bit integer load (LG).
    Load64,
    /// 32-bit integer store (ST / STY).
    Store32,
    /// 64-bit integer store (STG).
    Store64,
    /// Short float load (LE / LEY).
    LoadFloat32,
    /// Long float load (LD / LDY).
    LoadFloat64,
    /// Short float store (STE / STEY).
    StoreFloat32,
    /// Long float store (STD / STDY).
    StoreFloat64,
}

impl MemInsn {
    /// Opcode of the classic 12-bit-displacement form, if one exists.
    #[must_use]
    pub const fn classic_op(self) -> Option<u8> {
        match self {
            Self::Load32 => Some(0x58),
            Self::Store32 => Some(0x50),
            Self::LoadFloat32 => Some(0x78),
            Self::LoadFloat64 => Some(0x68),
            Self::StoreFloat32 => Some(0x70),
            Self::StoreFloat64 => Some(0x60),
            Self::Load64 | Self::Store64 => None,
        }
    }

    /// (op1, op2) of the modern 20-bit-displacement form.
    #[must_use]
    pub const fn modern_op(self) -> (u8, u8) {
        match self {
            Self::Load32 => (0xE3, 0x58),
            Self::Load64 => (0xE3, 0x04),
            Self::Store32 => (0xE3, 0x50),
            Self::Store64 => (0xE3, 0x24),
            Self::LoadFloat32 => (0xED, 0x64),
            Self::LoadFloat64 => (0xED, 0x65),
            Self::StoreFloat32 => (0xED, 0x66),
            Self::StoreFloat64 => (0xED, 0x67),
        }
    }

    /// True for the store direction.
    #[must_use]
    pub const fn is_store(self) -> bool {
        matches!(self, Self::Store32 | Self::Store64 | Self::StoreFloat32 | Self::StoreFloat64)
    }

    /// True for the floating-point register file.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            Self::LoadFloat32 | Self::LoadFloat64 | Self::StoreFloat32 | Self::StoreFloat64
        )
    }
}

// ─── Assembler ───────────────────────────────────────────────────────

/// z/Architecture machine-code emitter over an owned [`CodeBuffer`].
#[derive(Debug)]
pub struct Assembler {
    buf: CodeBuffer,
    /// Three-operand arithmetic (AGHIK, AGRK) is available.
    distinct_operands: bool,
    /// Use LA/LAY as an addition when the immediate is in range.
    prefer_la: bool,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// Emitter with the distinct-operands facility enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: CodeBuffer::new(),
            distinct_operands: true,
            prefer_la: false,
        }
    }

    /// Toggle the distinct-operands facility (AGHIK/AGRK).
    #[must_use]
    pub fn distinct_operands(mut self, on: bool) -> Self {
        self.distinct_operands = on;
        self
    }

    /// Prefer LA/LAY over add-immediate forms when the value fits.
    /// LA does not disturb the condition code; the add forms do.
    #[must_use]
    pub fn prefer_la(mut self, on: bool) -> Self {
        self.prefer_la = on;
        self
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

    // ── Raw mnemonics ────────────────────────────────────────────────

    /// `la r1, d2(x2, b2)` (12-bit unsigned displacement).
    pub fn la(&mut self, r1: Register, addr: &ZAddress) {
        emit_rx(&mut self.buf, 0x41, r1.num(), addr.x2(), addr.base.num(), addr.disp);
    }

    /// `lay r1, d2(x2, b2)` (20-bit signed displacement).
    pub fn lay(&mut self, r1: Register, addr: &ZAddress) {
        emit_rxy(&mut self.buf, 0xE3, 0x71, r1.num(), addr.x2(), addr.base.num(), addr.disp);
    }

    /// `lgr r1, r2` (64-bit register move).
    pub fn lgr(&mut self, r1: Register, r2: Register) {
        emit_rre(&mut self.buf, 0xB904, r1.num(), r2.num());
    }

    /// `agr r1, r2` (64-bit add).
    pub fn agr(&mut self, r1: Register, r2: Register) {
        emit_rre(&mut self.buf, 0xB908, r1.num(), r2.num());
    }

    /// `agrk r1, r2, r3` (64-bit three-operand add).
    pub fn agrk(&mut self, r1: Register, r2: Register, r3: Register) {
        emit_rrf_a(&mut self.buf, 0xB9E8, r1.num(), r2.num(), r3.num());
    }

    /// `aghi r1, i2` (add halfword immediate).
    pub fn aghi(&mut self, r1: Register, i2: i64) {
        emit_ri(&mut self.buf, 0xA7, 0xB, r1.num(), i2);
    }

    /// `aghik r1, r3, i2` (three-operand add halfword immediate).
    pub fn aghik(&mut self, r1: Register, r3: Register, i2: i64) {
        emit_rie_d(&mut self.buf, 0xD9, r1.num(), r3.num(), i2);
    }

    /// `agfi r1, i2` (add 32-bit immediate).
    pub fn agfi(&mut self, r1: Register, i2: i32) {
        emit_ril(&mut self.buf, 0xC2, 0x8, r1.num(), i2 as u32);
    }

    /// `l r1, d2(x2, b2)` (32-bit load, classic).
    pub fn l(&mut self, r1: Register, addr: &ZAddress) {
        emit_rx(&mut self.buf, 0x58, r1.num(), addr.x2(), addr.base.num(), addr.disp);
    }

    /// `ly r1, d2(x2, b2)` (32-bit load, long displacement).
    pub fn ly(&mut self, r1: Register, addr: &ZAddress) {
        emit_rxy(&mut self.buf, 0xE3, 0x58, r1.num(), addr.x2(), addr.base.num(), addr.disp);
    }

    /// `lg r1, d2(x2, b2)` (64-bit load).
    pub fn lg(&mut self, r1: Register, addr: &ZAddress) {
        emit_rxy(&mut self.buf, 0xE3, 0x04, r1.num(), addr.x2(), addr.base.num(), addr.disp);
    }

    /// `st r1, d2(x2, b2)` (32-bit store, classic).
    pub fn st(&mut self, r1: Register, addr: &ZAddress) {
        emit_rx(&mut self.buf, 0x50, r1.num(), addr.x2(), addr.base.num(), addr.disp);
    }

    /// `sty r1, d2(x2, b2)` (32-bit store, long displacement).
    pub fn sty(&mut self, r1: Register, addr: &ZAddress) {
        emit_rxy(&mut self.buf, 0xE3, 0x50, r1.num(), addr.x2(), addr.base.num(), addr.disp);
    }

    /// `stg r1, d2(x2, b2)` (64-bit store).
    pub fn stg(&mut self, r1: Register, addr: &ZAddress) {
        emit_rxy(&mut self.buf, 0xE3, 0x24, r1.num(), addr.x2(), addr.base.num(), addr.disp);
    }

    /// `sllg r1, r3, d2(b2)` (64-bit shift left logical).
    pub fn sllg(&mut self, r1: Register, r3: Register, amount: i64) {
        emit_rsy(&mut self.buf, 0xEB, 0x0D, r1.num(), r3.num(), 0, amount);
    }

    /// `srlg r1, r3, d2(b2)` (64-bit shift right logical).
    pub fn srlg(&mut self, r1: Register, r3: Register, amount: i64) {
        emit_rsy(&mut self.buf, 0xEB, 0x0C, r1.num(), r3.num(), 0, amount);
    }

    /// `rllg r1, r3, d2(b2)` (64-bit rotate left).
    pub fn rllg(&mut self, r1: Register, r3: Register, amount: i64) {
        emit_rsy(&mut self.buf, 0xEB, 0x1C, r1.num(), r3.num(), 0, amount);
    }

    /// `rll r1, r3, d2(b2)` (32-bit rotate left).
    pub fn rll(&mut self, r1: Register, r3: Register, amount: i64) {
        emit_rsy(&mut self.buf, 0xEB, 0x1D, r1.num(), r3.num(), 0, amount);
    }

    /// `risbg r1, r2, i3, i4, i5` (rotate then insert selected bits).
    pub fn risbg(&mut self, r1: Register, r2: Register, i3: u8, i4: u8, i5: u8) {
        emit_rie_f(&mut self.buf, 0x55, r1.num(), r2.num(), i3, i4, i5);
    }

    /// `rnsbg r1, r2, i3, i4, i5` (rotate then AND selected bits).
    pub fn rnsbg(&mut self, r1: Register, r2: Register, i3: u8, i4: u8, i5: u8) {
        emit_rie_f(&mut self.buf, 0x54, r1.num(), r2.num(), i3, i4, i5);
    }

    /// `rosbg r1, r2, i3, i4, i5` (rotate then OR selected bits).
    pub fn rosbg(&mut self, r1: Register, r2: Register, i3: u8, i4: u8, i5: u8) {
        emit_rie_f(&mut self.buf, 0x56, r1.num(), r2.num(), i3, i4, i5);
    }

    /// `rxsbg r1, r2, i3, i4, i5` (rotate then XOR selected bits).
    pub fn rxsbg(&mut self, r1: Register, r2: Register, i3: u8, i4: u8, i5: u8) {
        emit_rie_f(&mut self.buf, 0x57, r1.num(), r2.num(), i3, i4, i5);
    }

    /// `nihf r1, i2` (AND immediate into bits 0-31).
    pub fn nihf(&mut self, r1: Register, i2: u32) {
        emit_ril(&mut self.buf, 0xC0, 0xA, r1.num(), i2);
    }

    /// `nilf r1, i2` (AND immediate into bits 32-63).
    pub fn nilf(&mut self, r1: Register, i2: u32) {
        emit_ril(&mut self.buf, 0xC0, 0xB, r1.num(), i2);
    }

    /// `oihf r1, i2` (OR immediate into bits 0-31).
    pub fn oihf(&mut self, r1: Register, i2: u32) {
        emit_ril(&mut self.buf, 0xC0, 0xC, r1.num(), i2);
    }

    /// `oilf r1, i2` (OR immediate into bits 32-63).
    pub fn oilf(&mut self, r1: Register, i2: u32) {
        emit_ril(&mut self.buf, 0xC0, 0xD, r1.num(), i2);
    }

    // ── Optimized reg↔mem selection ──────────────────────────────────

    /// Emit `insn` with the cheapest form its displacement allows:
    /// classic when the displacement fits uimm12 and a classic form
    /// exists, modern when it fits simm20.
    ///
    /// Returns `true` on success, `false` when the displacement fits
    /// neither directly encodable range.
    fn try_emit_mem(&mut self, insn: MemInsn, reg: Register, addr: &ZAddress) -> bool {
        let d = addr.disp;
        if is_uimm12(d) {
            if let Some(op) = insn.classic_op() {
                emit_rx(&mut self.buf, op, reg.num(), addr.x2(), addr.base.num(), d);
                return true;
            }
        }
        if is_simm20(d) {
            let (op1, op2) = insn.modern_op();
            emit_rxy(&mut self.buf, op1, op2, reg.num(), addr.x2(), addr.base.num(), d);
            return true;
        }
        false
    }

    /// Store `reg` to `addr`, choosing the shortest legal form.
    ///
    /// When the displacement exceeds the 20-bit signed range the store
    /// is synthesized through `scratch`: the displacement is folded
    /// into the scratch register (or into the base itself, which is
    /// then restored). A scratch equal to the data register or the
    /// index register cannot be used.
    ///
    /// # Panics
    ///
    /// Panics if the displacement exceeds the signed 32-bit range, or
    /// if synthesis is required but no usable scratch is available.
    pub fn reg2mem_opt(
        &mut self,
        reg: Register,
        addr: &ZAddress,
        insn: MemInsn,
        scratch: Option<Register>,
    ) {
        assert!(insn.is_store(), "reg2mem_opt requires a store operation");
        assert_eq!(insn.is_float(), reg.is_fp(), "register class does not match operation");
        if self.try_emit_mem(insn, reg, addr) {
            return;
        }

        assert!(is_simm32(addr.disp), "displacement {} exceeds simm32", addr.disp);
        let usable = scratch.filter(|s| {
            s.is_gp()
                && s.num() != 0
                && *s != reg
                && Some(*s) != addr.index
                // Folding into the base needs the restore step to fit too.
                && (*s != addr.base || is_simm32(-addr.disp))
        });
        let Some(scratch) = usable else {
            panic!(
                "displacement {} needs scratch synthesis but no usable scratch register",
                addr.disp
            );
        };

        if scratch == addr.base {
            // Fold the displacement into the base, store, undo.
            self.add_immediate(addr.base, addr.disp, addr.base);
            let ok = self.try_emit_mem(insn, reg, &addr.with_disp(0));
            debug_assert!(ok);
            self.add_immediate(addr.base, -addr.disp, addr.base);
        } else {
            self.add_immediate(scratch, addr.disp, addr.base);
            let ok = self.try_emit_mem(insn, reg, &addr.with_base(scratch).with_disp(0));
            debug_assert!(ok);
        }
    }

    /// Load `reg` from `addr`, choosing the shortest legal form.
    ///
    /// When the displacement exceeds the 20-bit signed range and `reg`
    /// is a GP register distinct from the index, the destination itself
    /// serves as the scratch (it is about to be overwritten anyway);
    /// the base is never modified.
    ///
    /// # Panics
    ///
    /// Panics if the displacement exceeds the signed 32-bit range, or
    /// if the destination cannot serve as scratch (float destination,
    /// r0, or destination aliasing the index register).
    pub fn mem2reg_opt(&mut self, reg: Register, addr: &ZAddress, insn: MemInsn) {
        assert!(!insn.is_store(), "mem2reg_opt requires a load operation");
        assert_eq!(insn.is_float(), reg.is_fp(), "register class does not match operation");
        if self.try_emit_mem(insn, reg, addr) {
            return;
        }

        assert!(is_simm32(addr.disp), "displacement {} exceeds simm32", addr.disp);
        assert!(
            reg.is_gp() && reg.num() != 0 && Some(reg) != addr.index,
            "displacement {} needs a work register and the destination cannot serve",
            addr.disp
        );
        self.add_immediate(reg, addr.disp, addr.base);
        let ok = self.try_emit_mem(insn, reg, &addr.with_base(reg).with_disp(0));
        debug_assert!(ok);
    }

    // ── Immediate arithmetic ─────────────────────────────────────────

    /// `dst = src + value`, as the cheapest available sequence.
    ///
    /// Zero adds collapse to a register move (or nothing when `dst ==
    /// src`). Otherwise: halfword-immediate add, the LA/LAY addressing
    /// trick when enabled and in range, or the full 32-bit-immediate
    /// add. The condition code is left in an unspecified state.
    ///
    /// # Panics
    ///
    /// Panics unless `value` fits the signed 32-bit range.
    pub fn add_immediate(&mut self, dst: Register, value: i64, src: Register) {
        assert!(dst.is_gp() && src.is_gp(), "add_immediate operates on GP registers");
        assert!(is_simm32(value), "immediate {value} exceeds simm32");

        if value == 0 {
            if dst != src {
                self.lgr(dst, src);
            }
            return;
        }

        // LA computes an address, so a base of r0 would read as zero
        // instead of the register contents.
        let la_usable = self.prefer_la && src.num() != 0;

        if dst == src {
            if la_usable && is_uimm12(value) {
                self.la(dst, &ZAddress::new(src, value));
            } else if is_simm16(value) {
                self.aghi(dst, value);
            } else {
                self.agfi(dst, value as i32);
            }
            return;
        }

        if self.distinct_operands && is_simm16(value) {
            self.aghik(dst, src, value);
        } else if la_usable && is_uimm12(value) {
            self.la(dst, &ZAddress::new(src, value));
        } else if la_usable && is_simm20(value) {
            self.lay(dst, &ZAddress::new(src, value));
        } else {
            self.lgr(dst, src);
            if is_simm16(value) {
                self.aghi(dst, value);
            } else {
                self.agfi(dst, value as i32);
            }
        }
    }

    /// Checked variant of [`add_immediate`](Self::add_immediate) for
    /// callers feeding unvalidated values.
    ///
    /// # Errors
    ///
    /// [`EmitError::ImmediateOverflow`] when `value` misses the signed
    /// 32-bit range; nothing is emitted in that case.
    pub fn try_add_immediate(
        &mut self,
        dst: Register,
        value: i64,
        src: Register,
    ) -> Result<(), EmitError> {
        if !is_simm32(value) {
            return Err(EmitError::ImmediateOverflow {
                value,
                min: i64::from(i32::MIN),
                max: i64::from(i32::MAX),
            });
        }
        self.add_immediate(dst, value, src);
        Ok(())
    }

    /// `dst = base + index + value`.
    ///
    /// The register sum goes through LA/LAY when the immediate fits the
    /// addressing range, through AGRK with the distinct-operands
    /// facility, or through a move-and-add sequence. `index == base`
    /// becomes a doubling shift, and an index of `r0` folds away.
    ///
    /// # Panics
    ///
    /// Panics unless `value` fits the signed 20-bit range.
    pub fn add_with_index(&mut self, dst: Register, value: i64, index: Register, base: Register) {
        assert!(
            dst.is_gp() && index.is_gp() && base.is_gp(),
            "add_with_index operates on GP registers"
        );
        assert!(is_simm20(value), "immediate {value} exceeds simm20");

        // r0 as index reads as zero in address arithmetic, so there is
        // nothing to add.
        if index.num() == 0 {
            self.add_immediate(dst, value, base);
            return;
        }

        if index == base {
            // base + index == 2 * base.
            self.sllg(dst, base, 1);
            self.add_immediate(dst, value, dst);
            return;
        }

        if index.num() != 0 && base.num() != 0 && (self.prefer_la || is_uimm12(value)) {
            let addr = ZAddress::new(base, value).index(index);
            if is_uimm12(value) {
                self.la(dst, &addr);
            } else {
                self.lay(dst, &addr);
            }
            return;
        }

        if self.distinct_operands {
            self.agrk(dst, base, index);
        } else if dst == base {
            self.agr(dst, index);
        } else if dst == index {
            self.agr(dst, base);
        } else {
            self.lgr(dst, base);
            self.agr(dst, index);
        }
        self.add_immediate(dst, value, dst);
    }

    // ── Rotate-then-combine ──────────────────────────────────────────

    /// Rotate `src` left by `rotate` (mod 64), then combine the bits in
    /// the MSB-first range `left..=right` of the rotated value into
    /// `dst` according to `op`.
    ///
    /// The AND/OR/XOR/insert flavors are single RIE-f instructions. The
    /// mask flavors substitute a plain shift for the rotate when no
    /// selected bit wraps around, and skip mask halves the shift
    /// already zeroed.
    ///
    /// # Panics
    ///
    /// Panics unless `left <= right <= 63`.
    pub fn rotate_then_combine(
        &mut self,
        dst: Register,
        src: Register,
        left: u32,
        right: u32,
        rotate: u32,
        op: BitCombine,
    ) {
        assert!(left <= right && right <= 63, "bad bit range {left}..={right}");
        let rot = (rotate % 64) as u8;
        let (l, r) = (left as u8, right as u8);
        match op {
            // Insert-and-clear: I4 bit 0 is the zero-remaining flag.
            BitCombine::Insert => self.risbg(dst, src, l, r | 0x80, rot),
            BitCombine::And => self.rnsbg(dst, src, l, r, rot),
            BitCombine::Or => self.rosbg(dst, src, l, r, rot),
            BitCombine::Xor => self.rxsbg(dst, src, l, r, rot),
            BitCombine::MaskZero => self.rotate_then_mask(dst, src, left, right, u32::from(rot), false),
            BitCombine::MaskOne => self.rotate_then_mask(dst, src, left, right, u32::from(rot), true),
        }
    }

    /// `dst = rotate(src) & mask`, with the bits outside the range set
    /// to `one_bits`. Shift-for-rotate substitution and mask elision.
    fn rotate_then_mask(
        &mut self,
        dst: Register,
        src: Register,
        left: u32,
        right: u32,
        rotate: u32,
        one_bits: bool,
    ) {
        let range = make_mask(left, right);
        // Bits of the result known to be zero after the rotate/shift
        // step, before any explicit masking.
        let known_zero: u64;

        if rotate == 0 {
            if dst != src {
                self.lgr(dst, src);
            }
            known_zero = 0;
        } else if right + rotate <= 63 {
            // Selected source bits sit at left+rotate..=right+rotate;
            // none wraps, so a left shift reproduces the rotate within
            // the range and zero-fills from the right.
            self.sllg(dst, src, i64::from(rotate));
            known_zero = !make_mask(0, 63 - rotate);
        } else if left + rotate >= 64 {
            // All selected source bits wrap; a right shift by the
            // complement reproduces the rotate and zero-fills from the
            // left.
            let shift = 64 - rotate;
            self.srlg(dst, src, i64::from(shift));
            known_zero = make_mask(0, shift - 1);
        } else {
            self.rllg(dst, src, i64::from(rotate));
            known_zero = 0;
        }

        // Clear everything outside the range that the shift did not
        // already zero, one 32-bit immediate half at a time.
        let need_clear = !range & !known_zero;
        if (need_clear >> 32) as u32 != 0 {
            self.nihf(dst, (range >> 32) as u32);
        }
        if need_clear as u32 != 0 {
            self.nilf(dst, range as u32);
        }

        if one_bits {
            let outside = !range;
            if (outside >> 32) as u32 != 0 {
                self.oihf(dst, (outside >> 32) as u32);
            }
            if outside as u32 != 0 {
                self.oilf(dst, outside as u32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(f: impl FnOnce(&mut Assembler)) -> alloc::vec::Vec<u8> {
        let mut asm = Assembler::new();
        f(&mut asm);
        asm.finish().into_parts().0
    }

    #[test]
    fn rre_and_ri_encodings() {
        assert_eq!(bytes(|a| a.lgr(R1, R2)), [0xB9, 0x04, 0x00, 0x12]);
        assert_eq!(bytes(|a| a.aghi(R3, -8)), [0xA7, 0x3B, 0xFF, 0xF8]);
        assert_eq!(
            bytes(|a| a.aghik(R2, R3, 16)),
            [0xEC, 0x23, 0x00, 0x10, 0x00, 0xD9]
        );
        assert_eq!(
            bytes(|a| a.agfi(R1, 0x0001_2345)),
            [0xC2, 0x18, 0x00, 0x01, 0x23, 0x45]
        );
    }

    #[test]
    fn rx_and_rxy_encodings() {
        assert_eq!(
            bytes(|a| a.la(R1, &ZAddress::new(R2, 8))),
            [0x41, 0x10, 0x20, 0x08]
        );
        assert_eq!(
            bytes(|a| a.lay(R1, &ZAddress::new(R2, -8))),
            [0xE3, 0x10, 0x2F, 0xF8, 0xFF, 0x71]
        );
        assert_eq!(
            bytes(|a| a.st(R1, &ZAddress::new(R2, 0))),
            [0x50, 0x10, 0x20, 0x00]
        );
        assert_eq!(
            bytes(|a| a.sty(R1, &ZAddress::new(R2, 4096))),
            [0xE3, 0x10, 0x20, 0x00, 0x01, 0x50]
        );
    }

    #[test]
    fn shift_encoding() {
        assert_eq!(
            bytes(|a| a.sllg(R1, R2, 3)),
            [0xEB, 0x12, 0x00, 0x03, 0x00, 0x0D]
        );
    }

    #[test]
    fn classic_preferred_when_disp_fits() {
        let out = bytes(|a| a.reg2mem_opt(R1, &ZAddress::new(R2, 100), MemInsn::Store32, None));
        assert_eq!(out, [0x50, 0x10, 0x20, 0x64]);
    }

    #[test]
    fn modern_chosen_for_negative_disp() {
        let out = bytes(|a| a.reg2mem_opt(R1, &ZAddress::new(R2, -4), MemInsn::Store32, None));
        assert_eq!(out[0], 0xE3);
        assert_eq!(out[5], 0x50);
    }

    #[test]
    fn store64_has_no_classic_form() {
        let out = bytes(|a| a.reg2mem_opt(R1, &ZAddress::new(R2, 0), MemInsn::Store64, None));
        assert_eq!(out, [0xE3, 0x10, 0x20, 0x00, 0x00, 0x24]);
    }

    #[test]
    fn synthesis_through_distinct_scratch() {
        // Disp 0x80000 is one past simm20.
        let out = bytes(|a| {
            a.reg2mem_opt(R1, &ZAddress::new(R2, 0x8_0000), MemInsn::Store32, Some(R5))
        });
        // aghik r5, r2, ... does not fit simm16; agfi path: lgr + agfi,
        // then classic store with zero disp off r5.
        assert_eq!(&out[..4], [0xB9, 0x04, 0x00, 0x52]); // lgr r5, r2
        assert_eq!(&out[4..10], [0xC2, 0x58, 0x00, 0x08, 0x00, 0x00]); // agfi r5, 0x80000
        assert_eq!(&out[10..], [0x50, 0x10, 0x50, 0x00]); // st r1, 0(r5)
    }

    #[test]
    fn synthesis_through_base_restores_it() {
        let out = bytes(|a| {
            a.reg2mem_opt(R1, &ZAddress::new(R2, 0x8_0000), MemInsn::Store32, Some(R2))
        });
        assert_eq!(&out[..6], [0xC2, 0x28, 0x00, 0x08, 0x00, 0x00]); // agfi r2, 0x80000
        assert_eq!(&out[6..10], [0x50, 0x10, 0x20, 0x00]); // st r1, 0(r2)
        assert_eq!(&out[10..], [0xC2, 0x28, 0xFF, 0xF8, 0x00, 0x00]); // agfi r2, -0x80000
    }

    #[test]
    #[should_panic(expected = "no usable scratch")]
    fn synthesis_rejects_scratch_aliasing_data_reg() {
        let mut asm = Assembler::new();
        asm.reg2mem_opt(R1, &ZAddress::new(R2, 0x8_0000), MemInsn::Store32, Some(R1));
    }

    #[test]
    fn load_uses_destination_as_work_register() {
        let out = bytes(|a| a.mem2reg_opt(R3, &ZAddress::new(R2, 0x8_0000), MemInsn::Load64));
        assert_eq!(&out[..4], [0xB9, 0x04, 0x00, 0x32]); // lgr r3, r2
        assert_eq!(&out[4..10], [0xC2, 0x38, 0x00, 0x08, 0x00, 0x00]); // agfi r3, 0x80000
        assert_eq!(&out[10..], [0xE3, 0x30, 0x30, 0x00, 0x00, 0x04]); // lg r3, 0(r3)
    }

    #[test]
    fn in_range_but_beyond_classic_selects_modern_not_synthesis() {
        // Destination aliasing everything is irrelevant when the
        // displacement fits the long form directly.
        let out = bytes(|a| a.mem2reg_opt(R2, &ZAddress::new(R2, 4500), MemInsn::Load32));
        assert_eq!(out, [0xE3, 0x20, 0x21, 0x94, 0x00, 0x58]);
    }

    #[test]
    fn add_immediate_forms() {
        assert!(bytes(|a| a.add_immediate(R1, 0, R1)).is_empty());
        assert_eq!(
            bytes(|a| a.add_immediate(R1, 0, R2)),
            [0xB9, 0x04, 0x00, 0x12]
        );
        assert_eq!(
            bytes(|a| a.add_immediate(R3, -8, R3)),
            [0xA7, 0x3B, 0xFF, 0xF8]
        );
        assert_eq!(
            bytes(|a| a.add_immediate(R2, 16, R3)),
            [0xEC, 0x23, 0x00, 0x10, 0x00, 0xD9]
        );
        assert_eq!(
            bytes(|a| a.add_immediate(R1, 0x0001_2345, R1)),
            [0xC2, 0x18, 0x00, 0x01, 0x23, 0x45]
        );
    }

    #[test]
    fn try_add_immediate_rejects_wide_values() {
        let mut asm = Assembler::new();
        let err = asm.try_add_immediate(R1, 1 << 40, R1).unwrap_err();
        assert!(matches!(err, crate::EmitError::ImmediateOverflow { .. }));
        assert_eq!(asm.pos(), 0);
        asm.try_add_immediate(R1, 16, R1).unwrap();
        assert_eq!(asm.pos(), 4);
    }

    #[test]
    fn add_immediate_prefers_la_when_asked() {
        let mut asm = Assembler::new().distinct_operands(false).prefer_la(true);
        asm.add_immediate(R1, 8, R2);
        assert_eq!(asm.finish().into_parts().0, [0x41, 0x10, 0x20, 0x08]);
    }

    #[test]
    fn add_with_index_doubles_aliased_base() {
        let out = bytes(|a| a.add_with_index(R1, 0, R2, R2));
        assert_eq!(out, [0xEB, 0x12, 0x00, 0x01, 0x00, 0x0D]); // sllg r1, r2, 1
    }

    #[test]
    fn add_with_index_uses_la_for_short_imm() {
        let out = bytes(|a| a.add_with_index(R1, 8, R3, R2));
        assert_eq!(out, [0x41, 0x13, 0x20, 0x08]); // la r1, 8(r3, r2)
    }

    #[test]
    fn rotate_then_insert_sets_zero_flag() {
        let out = bytes(|a| a.rotate_then_combine(R1, R2, 48, 63, 0, BitCombine::Insert));
        assert_eq!(out, [0xEC, 0x12, 0x30, 0xBF, 0x00, 0x55]);
    }

    #[test]
    fn rotate_then_and_encoding() {
        let out = bytes(|a| a.rotate_then_combine(R1, R2, 0, 31, 32, BitCombine::And));
        assert_eq!(out, [0xEC, 0x12, 0x00, 0x1F, 0x20, 0x54]);
    }

    #[test]
    fn mask_zero_substitutes_left_shift() {
        // Range 32..=55, rotate 8: no selected bit wraps, so sllg by 8;
        // the shift zeroes bits 56..=63 and the high half still needs
        // clearing.
        let out = bytes(|a| a.rotate_then_combine(R1, R2, 32, 55, 8, BitCombine::MaskZero));
        assert_eq!(&out[..6], [0xEB, 0x12, 0x00, 0x08, 0x00, 0x0D]); // sllg r1, r2, 8
        assert_eq!(&out[6..], [0xC0, 0x1A, 0x00, 0x00, 0x00, 0x00]); // nihf r1, 0
    }

    #[test]
    fn mask_zero_elides_mask_when_shift_covers_it() {
        // Range 0..=55, rotate 8: sllg zeroes exactly the bits outside
        // the range, so no mask instruction follows.
        let out = bytes(|a| a.rotate_then_combine(R1, R2, 0, 55, 8, BitCombine::MaskZero));
        assert_eq!(out, [0xEB, 0x12, 0x00, 0x08, 0x00, 0x0D]);
    }

    #[test]
    fn mask_one_sets_outside_bits() {
        let out = bytes(|a| a.rotate_then_combine(R1, R2, 32, 63, 0, BitCombine::MaskOne));
        // lgr elided (dst != src so present), nihf clears the high
        // half, oihf sets it.
        assert_eq!(&out[..4], [0xB9, 0x04, 0x00, 0x12]); // lgr r1, r2
        assert_eq!(&out[4..10], [0xC0, 0x1A, 0x00, 0x00, 0x00, 0x00]); // nihf r1, 0
        assert_eq!(&out[10..], [0xC0, 0x1C, 0xFF, 0xFF, 0xFF, 0xFF]); // oihf r1, -1
    }
}
