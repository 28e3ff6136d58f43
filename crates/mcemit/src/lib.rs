//! # mcemit — Pure Rust JIT Machine-Code Emitter
//!
//! `mcemit` is a pure Rust, zero-C-dependency instruction encoder for
//! JIT compiler backends. It computes bit-exact legacy/REX/VEX/EVEX
//! prefixes, ModR/M + SIB + displacement bytes with EVEX compressed
//! displacements, vendor NOP padding, and the z/Architecture 12-bit vs
//! 20-bit displacement-form selection, writing everything into a plain
//! byte buffer with relocation records for position-dependent literals.
//!
//! ## Quick Start
//!
//! ```rust
//! use mcemit::x86::{Assembler, Feature, VectorLen, xmm};
//!
//! let mut asm = Assembler::new(Feature::Avx);
//! asm.simd_rrr("vaddps", VectorLen::L128, xmm(0), xmm(1), xmm(2));
//! assert_eq!(asm.buffer().bytes(), [0xC5, 0xF0, 0x58, 0xC2]);
//! ```
//!
//! ## Features
//!
//! - **Pure Rust** — no C/C++ FFI, no LLVM, no system assembler.
//! - **Prefix selection** — legacy SSE, 2/3-byte VEX, 4-byte EVEX,
//!   picked per instruction from operands and the feature tier.
//! - **Compressed displacements** — EVEX disp8*N from the tuple table,
//!   with a disp32 fallback that never truncates.
//! - **Multi-arch** — x86-64 and z/Architecture (feature-gated).
//! - **`no_std` + `alloc`** — embeddable in runtimes and kernels.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// An instruction encoder intentionally performs many narrowing /
// sign-changing casts between integer widths and uses dense hex
// literals without separators (0x0F38, 0xB9E8).  The lints below are
// expected and acceptable in this context.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::bool_to_int_with_if,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::fn_params_excessive_bools,
    clippy::too_many_lines,
    clippy::single_match_else,
    clippy::return_self_not_must_use,
    clippy::missing_panics_doc,
    clippy::many_single_char_names
)]

extern crate alloc;

pub mod buffer;
pub mod error;
pub mod reg;

#[cfg(feature = "x86_64")]
pub mod x86;

#[cfg(feature = "systemz")]
pub mod z;

pub use buffer::{CodeBuffer, RelocFormat, Relocation};
pub use error::EmitError;
pub use reg::{RegClass, Register};
