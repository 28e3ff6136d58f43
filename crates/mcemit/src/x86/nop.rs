//! Multi-byte NOP padding.
//!
//! `pad(n)` fills exactly `n` bytes with instructions the CPU decodes as
//! no-operations, using the vendor-documented multi-byte forms. The
//! output is deterministic for a given `(n, vendor)` pair and no
//! instruction ever straddles the requested boundary.

use crate::buffer::CodeBuffer;

/// CPU vendor, selecting the recommended NOP sequence table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Vendor {
    /// Intel: multi-byte 0F 1F forms, operand-size prefixes stack freely.
    #[default]
    Intel,
    /// AMD: interleave single-byte NOPs between 0F 1F address forms, per
    /// the optimization guide's advice against consecutive address-form
    /// NOPs.
    Amd,
}

/// Longest single NOP encoding in the table.
const MAX_FORM: usize = 11;

/// Vendor-documented NOP encodings, indexed by length 1–11. Lengths
/// 9–11 repeat the operand-size prefix on the 8-byte address form.
fn nop_form(len: usize) -> &'static [u8] {
    match len {
        1 => &[0x90],
        2 => &[0x66, 0x90],
        3 => &[0x0F, 0x1F, 0x00],
        4 => &[0x0F, 0x1F, 0x40, 0x00],
        5 => &[0x0F, 0x1F, 0x44, 0x00, 0x00],
        6 => &[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00],
        7 => &[0x0F, 0x1F, 0x80, 0x00, 0x00, 0x00, 0x00],
        8 => &[0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        9 => &[0x66, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        10 => &[0x66, 0x66, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        11 => &[0x66, 0x66, 0x66, 0x0F, 0x1F, 0x84, 0x00, 0x00, 0x00, 0x00, 0x00],
        _ => unreachable!("no NOP form of length {len}"),
    }
}

/// Whether a form of this length uses the 0F 1F address encoding.
const fn is_addr_form(len: usize) -> bool {
    len >= 3
}

/// Emit exactly `n` bytes of NOP padding.
///
/// Greedy: prefers the largest single encoding that fits the remaining
/// byte count. For AMD, a single-byte NOP separates consecutive
/// address-form encodings.
pub fn pad(buf: &mut CodeBuffer, n: usize, vendor: Vendor) {
    let mut left = n;
    let mut last_was_addr_form = false;
    while left > 0 {
        if vendor == Vendor::Amd && last_was_addr_form && left >= 3 {
            buf.emit_u8(0x90);
            left -= 1;
            last_was_addr_form = false;
            continue;
        }
        let take = left.min(MAX_FORM);
        buf.emit_bytes(nop_form(take));
        last_was_addr_form = is_addr_form(take);
        left -= take;
    }
}
