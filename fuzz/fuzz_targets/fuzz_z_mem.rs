#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mcemit::z::{Assembler, MemInsn, ZAddress};
use mcemit::Register;

#[derive(Debug, Arbitrary)]
struct Input {
    base: u8,
    index: Option<u8>,
    disp: i32,
    reg: u8,
    scratch: Option<u8>,
    store64: bool,
}

// Displacement-form selection must never panic while a usable scratch
// register exists and the displacement fits simm32.
fuzz_target!(|input: Input| {
    let base = Register::gp(input.base % 15 + 1);
    let reg = Register::gp(input.reg % 16);
    let mut addr = ZAddress::new(base, i64::from(input.disp));
    if let Some(i) = input.index {
        addr = addr.index(Register::gp(i % 15 + 1));
    }
    let insn = if input.store64 {
        MemInsn::Store64
    } else {
        MemInsn::Store32
    };

    let scratch = input.scratch.map(|s| Register::gp(s % 15 + 1));
    let scratch_usable = scratch
        .is_some_and(|s| s != reg && Some(s) != addr.index_reg());
    let needs_scratch = !(-524_288..524_288).contains(&i64::from(input.disp));
    if needs_scratch && !scratch_usable {
        return;
    }

    let mut asm = Assembler::new();
    asm.reg2mem_opt(reg, &addr, insn, scratch);
    assert!(asm.pos() >= 4);
});
