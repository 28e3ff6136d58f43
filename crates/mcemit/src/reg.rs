//! Register model shared by the architecture backends.
//!
//! A [`Register`] is a plain value: a bank tag plus a numeric encoding.
//! The encoding carries everything the emitters need — the 3-bit field
//! that lands in ModR/M/SIB/opcode positions and the extension bits that
//! select the REX/VEX/EVEX prefix flags.

use core::fmt;

/// Register bank a [`Register`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegClass {
    /// General-purpose integer register.
    Gp,
    /// Vector register (XMM/YMM/ZMM on x86-64).
    Vec,
    /// Opmask register (k0–k7, AVX-512).
    Mask,
    /// Floating-point register (z/Architecture F0–F15).
    Fp,
}

/// A machine register: bank tag + numeric encoding.
///
/// x86-64 general-purpose registers span 0–15 (8–15 need REX.B/R/X),
/// vector registers span 0–31 (16–31 need the EVEX bank-extension bits),
/// opmask registers span 0–7. z/Architecture uses 0–15 in both banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Register {
    class: RegClass,
    num: u8,
}

impl Register {
    /// Create a register from a bank tag and numeric encoding.
    ///
    /// # Panics
    ///
    /// Panics if `num` is outside the bank's encoding space
    /// (Gp/Fp: 0–15, Vec: 0–31, Mask: 0–7).
    #[must_use]
    pub const fn new(class: RegClass, num: u8) -> Self {
        let limit = match class {
            RegClass::Vec => 32,
            RegClass::Mask => 8,
            RegClass::Gp | RegClass::Fp => 16,
        };
        assert!(num < limit, "register encoding out of range for bank");
        Self { class, num }
    }

    /// General-purpose register `n`.
    #[must_use]
    pub const fn gp(num: u8) -> Self {
        Self::new(RegClass::Gp, num)
    }

    /// Vector register `n` (XMM/YMM/ZMM bank).
    #[must_use]
    pub const fn vec(num: u8) -> Self {
        Self::new(RegClass::Vec, num)
    }

    /// Opmask register `kn`.
    #[must_use]
    pub const fn mask(num: u8) -> Self {
        Self::new(RegClass::Mask, num)
    }

    /// Floating-point register `Fn` (z/Architecture).
    #[must_use]
    pub const fn fp(num: u8) -> Self {
        Self::new(RegClass::Fp, num)
    }

    /// The bank this register belongs to.
    #[must_use]
    pub const fn class(self) -> RegClass {
        self.class
    }

    /// Full numeric encoding (0–31).
    #[must_use]
    pub const fn num(self) -> u8 {
        self.num
    }

    /// The 3-bit field used in ModR/M, SIB, and opcode-extension positions.
    #[must_use]
    pub const fn low3(self) -> u8 {
        self.num & 0x7
    }

    /// Encoding bit 3 — set iff the register needs a REX/VEX extension bit
    /// (REX.B/X/R or the inverted VEX equivalents).
    #[must_use]
    pub const fn needs_ext(self) -> bool {
        self.num & 0x8 != 0
    }

    /// Encoding bit 4 — set iff the register lives in the upper AVX-512
    /// bank (16–31) and needs the EVEX R′/V′/X extension bit.
    #[must_use]
    pub const fn needs_evex_ext(self) -> bool {
        self.num & 0x10 != 0
    }

    /// Whether this is a general-purpose register.
    #[must_use]
    pub const fn is_gp(self) -> bool {
        matches!(self.class, RegClass::Gp)
    }

    /// Whether this is a vector register.
    #[must_use]
    pub const fn is_vec(self) -> bool {
        matches!(self.class, RegClass::Vec)
    }

    /// Whether this is an opmask register.
    #[must_use]
    pub const fn is_mask(self) -> bool {
        matches!(self.class, RegClass::Mask)
    }

    /// Whether this is a floating-point register.
    #[must_use]
    pub const fn is_fp(self) -> bool {
        matches!(self.class, RegClass::Fp)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.class {
            RegClass::Gp => "r",
            RegClass::Vec => "v",
            RegClass::Mask => "k",
            RegClass::Fp => "f",
        };
        write!(f, "{}{}", prefix, self.num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_bits() {
        assert!(!Register::gp(7).needs_ext());
        assert!(Register::gp(8).needs_ext());
        assert!(!Register::vec(15).needs_evex_ext());
        assert!(Register::vec(16).needs_evex_ext());
        assert_eq!(Register::vec(27).low3(), 3);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn gp_encoding_limit() {
        let _ = Register::gp(16);
    }
}
