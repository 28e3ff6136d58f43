//! Output code buffer: a monotonically advancing byte cursor plus the
//! relocation records accumulated while emitting.
//!
//! One compilation task owns one buffer. Emission only ever appends; the
//! cursor never rewinds. When a literal cannot be resolved to its final
//! byte value at emission time, the emitter writes a placeholder and
//! records a [`Relocation`] for the external patching pass.

use alloc::rc::Rc;
use alloc::vec::Vec;

/// How the patching pass must interpret the bytes a relocation covers.
///
/// The format tag must match the exact width and position the emitter
/// actually wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelocFormat {
    /// Embedded 32-bit immediate operand.
    Imm32,
    /// Embedded 64-bit immediate operand.
    Imm64,
    /// 32-bit displacement inside an addressing encoding. On x86-64 this
    /// is RIP-relative: the CPU adds it to the address of the *next*
    /// instruction.
    Disp32,
    /// 32-bit self-relative call/jump displacement.
    CallDisp32,
    /// 32-bit compressed pointer immediate.
    NarrowPtr,
}

/// A deferred patch: binds an emitted byte range to a symbolic target.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relocation {
    /// Byte offset in the output stream where the field starts.
    pub offset: usize,
    /// Width of the field in bytes.
    pub size: u8,
    /// Symbolic target. `Rc<str>` so propagation is a refcount bump, not
    /// a fresh heap allocation.
    pub target: Rc<str>,
    /// Byte interpretation of the field.
    pub format: RelocFormat,
    /// Constant offset added to the resolved target.
    pub addend: i64,
    /// Instruction bytes that follow the field. RIP-relative patching
    /// needs this: the effective RIP is `offset + size + trailing_bytes`.
    pub trailing_bytes: u8,
}

/// Append-only machine-code buffer with relocation bookkeeping.
#[derive(Debug, Default, Clone)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
    relocs: Vec<Relocation>,
}

impl CodeBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with a pre-sized backing allocation.
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(cap),
            relocs: Vec::new(),
        }
    }

    /// Current cursor position (number of bytes emitted so far).
    #[must_use]
    pub fn pos(&self) -> usize {
        self.bytes.len()
    }

    /// The emitted bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The accumulated relocation records.
    #[must_use]
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocs
    }

    /// Consume the buffer, yielding bytes and relocations.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, Vec<Relocation>) {
        (self.bytes, self.relocs)
    }

    /// Append one byte.
    #[inline]
    pub fn emit_u8(&mut self, b: u8) {
        self.bytes.push(b);
    }

    /// Append a byte slice verbatim.
    #[inline]
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Append a 16-bit value, little-endian.
    #[inline]
    pub fn emit_u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a 32-bit value, little-endian.
    #[inline]
    pub fn emit_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a 64-bit value, little-endian.
    #[inline]
    pub fn emit_u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a 16-bit value, big-endian (z/Architecture is big-endian).
    #[inline]
    pub fn emit_u16_be(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    /// Append a 32-bit value, big-endian.
    #[inline]
    pub fn emit_u32_be(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_be_bytes());
    }

    /// Append the low 48 bits of `v`, big-endian (6-byte z instructions).
    #[inline]
    pub fn emit_u48_be(&mut self, v: u64) {
        debug_assert!(v >> 48 == 0, "value wider than 48 bits");
        self.bytes.extend_from_slice(&v.to_be_bytes()[2..8]);
    }

    /// Record a relocation for bytes already emitted.
    ///
    /// # Panics
    ///
    /// Panics if the covered range extends past the cursor — a relocation
    /// must describe bytes that exist.
    pub fn add_relocation(&mut self, reloc: Relocation) {
        assert!(
            reloc.offset + reloc.size as usize <= self.bytes.len(),
            "relocation range {}..{} past cursor {}",
            reloc.offset,
            reloc.offset + reloc.size as usize,
            self.bytes.len()
        );
        self.relocs.push(reloc);
    }
}
