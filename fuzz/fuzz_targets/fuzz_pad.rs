#![no_main]
use libfuzzer_sys::fuzz_target;
use mcemit::x86::{Assembler, Feature, Vendor};

// Padding must emit exactly n bytes for any n and either vendor.
fuzz_target!(|input: (u16, bool)| {
    let (n, amd) = input;
    let n = usize::from(n);
    let vendor = if amd { Vendor::Amd } else { Vendor::Intel };
    let mut asm = Assembler::new(Feature::Avx).vendor(vendor);
    asm.pad(n);
    assert_eq!(asm.pos(), n);
});
