#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mcemit::x86::{Address, Assembler, Feature, RAX};
use mcemit::Register;

#[derive(Debug, Arbitrary)]
struct Input {
    base: Option<(u8, u8)>,
    index: Option<(u8, u8)>,
    scale: u8,
    disp: i64,
}

fn reg(class: u8, num: u8) -> Register {
    match class % 4 {
        0 => Register::gp(num % 16),
        1 => Register::vec(num % 32),
        2 => Register::mask(num % 8),
        _ => Register::fp(num % 16),
    }
}

// The checked constructor must never panic, and every address it
// accepts must emit without panicking.
fuzz_target!(|input: Input| {
    let base = input.base.map(|(c, n)| reg(c, n));
    let index = input.index.map(|(c, n)| reg(c, n));
    if let Ok(addr) = Address::try_new(base, index, input.scale, input.disp) {
        let gp_index = addr.index_reg().is_none_or(|r| r.is_gp());
        let anchored = addr.base_reg().is_some() || addr.index_reg().is_some();
        if gp_index && anchored {
            let mut asm = Assembler::new(Feature::Avx512);
            asm.mov_load(RAX, &addr);
            assert!(asm.pos() > 0);
        }
    }
});
