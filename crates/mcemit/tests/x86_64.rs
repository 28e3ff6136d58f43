//! x86-64 integration tests: exact-byte checks for the GP operations
//! and every addressing shape, including the RBP/R13 and RSP/R12
//! reserved encodings.

use mcemit::x86::{
    Address, Assembler, Feature, Scale, RAX, RBP, RBX, RCX, RDX, R12, R13, R8,
    RSP,
};

fn emit(f: impl FnOnce(&mut Assembler)) -> Vec<u8> {
    let mut asm = Assembler::new(Feature::Avx512);
    f(&mut asm);
    asm.finish().into_parts().0
}

// ─── Plain base addressing ───────────────────────────────────────────

#[test]
fn load_base_no_disp() {
    assert_eq!(
        emit(|a| a.mov_load(RAX, &Address::base(RBX))),
        [0x48, 0x8B, 0x03]
    );
}

#[test]
fn store_base_no_disp() {
    assert_eq!(
        emit(|a| a.mov_store(&Address::base(RAX), RCX)),
        [0x48, 0x89, 0x08]
    );
}

#[test]
fn disp8_boundary() {
    assert_eq!(
        emit(|a| a.mov_load(RAX, &Address::base(RAX).disp(127))),
        [0x48, 0x8B, 0x40, 0x7F]
    );
    // One past the signed 8-bit range forces disp32.
    assert_eq!(
        emit(|a| a.mov_load(RAX, &Address::base(RAX).disp(128))),
        [0x48, 0x8B, 0x80, 0x80, 0x00, 0x00, 0x00]
    );
    assert_eq!(
        emit(|a| a.mov_load(RAX, &Address::base(RAX).disp(-128))),
        [0x48, 0x8B, 0x40, 0x80]
    );
}

// ─── Reserved base encodings ─────────────────────────────────────────

#[test]
fn rbp_zero_disp_still_emits_disp8() {
    // mod=00 with base 101 means RIP-relative, so [rbp] must encode as
    // mod=01 with an explicit zero displacement.
    assert_eq!(
        emit(|a| a.mov_load(RAX, &Address::base(RBP))),
        [0x48, 0x8B, 0x45, 0x00]
    );
}

#[test]
fn r13_shares_the_rbp_rule() {
    assert_eq!(
        emit(|a| a.mov_load(RAX, &Address::base(R13))),
        [0x49, 0x8B, 0x45, 0x00]
    );
}

#[test]
fn rsp_requires_sib_with_no_index_sentinel() {
    assert_eq!(
        emit(|a| a.mov_load(RAX, &Address::base(RSP))),
        [0x48, 0x8B, 0x04, 0x24]
    );
}

#[test]
fn r12_shares_the_rsp_rule() {
    assert_eq!(
        emit(|a| a.mov_load(RAX, &Address::base(R12))),
        [0x49, 0x8B, 0x04, 0x24]
    );
}

// ─── SIB forms ───────────────────────────────────────────────────────

#[test]
fn base_index_scale_disp8() {
    let addr = Address::base(RBX).index(RCX, Scale::S4).disp(0x10);
    assert_eq!(emit(|a| a.mov_load(R8, &addr)), [0x4C, 0x8B, 0x44, 0x8B, 0x10]);
}

#[test]
fn index_without_base_forces_disp32() {
    // Base field 101 under mod=00 inside a SIB means "no base".
    let addr = Address::index_only(RCX, Scale::S8);
    assert_eq!(
        emit(|a| a.mov_load(RAX, &addr)),
        [0x48, 0x8B, 0x04, 0xCD, 0x00, 0x00, 0x00, 0x00]
    );
}

#[test]
#[should_panic(expected = "reserved")]
fn rsp_as_index_is_rejected() {
    let _ = Address::base(RAX).index(RSP, Scale::S1);
}

// ─── RIP-relative ────────────────────────────────────────────────────

#[test]
fn rip_relative_corrects_for_instruction_end() {
    // lea rax, [rip+rel]: the stored disp32 is target minus the end of
    // the instruction (disp field offset 3, plus 4 disp bytes).
    let out = emit(|a| a.lea(RAX, &Address::pcrel(0x100)));
    assert_eq!(&out[..3], [0x48, 0x8D, 0x05]);
    let rel = i32::from_le_bytes(out[3..7].try_into().unwrap());
    assert_eq!(rel, 0x100 - 7);
}

#[test]
fn rip_relative_symbol_records_relocation() {
    let mut asm = Assembler::new(Feature::Avx);
    asm.mov_load(RAX, &Address::pcrel_symbol("jump_table"));
    let buf = asm.finish();
    assert_eq!(buf.bytes()[3..7], [0, 0, 0, 0]);
    let relocs = buf.relocations();
    assert_eq!(relocs.len(), 1);
    assert_eq!(relocs[0].offset, 3);
    assert_eq!(relocs[0].size, 4);
    assert_eq!(&*relocs[0].target, "jump_table");
}

// ─── GP arithmetic ───────────────────────────────────────────────────

#[test]
fn add_imm_picks_cheapest_form() {
    assert!(emit(|a| a.add_imm(RAX, 0)).is_empty());
    assert_eq!(emit(|a| a.add_imm(RAX, 8)), [0x48, 0x83, 0xC0, 0x08]);
    assert_eq!(emit(|a| a.add_imm(RDX, -1)), [0x48, 0x83, 0xC2, 0xFF]);
    assert_eq!(
        emit(|a| a.add_imm(RAX, 0x1000)),
        [0x48, 0x81, 0xC0, 0x00, 0x10, 0x00, 0x00]
    );
    assert_eq!(emit(|a| a.add_imm(R12, 8)), [0x49, 0x83, 0xC4, 0x08]);
}

// ─── Alignment ───────────────────────────────────────────────────────

#[test]
fn align_pads_to_boundary() {
    let mut asm = Assembler::new(Feature::Avx);
    asm.mov_load(RAX, &Address::base(RBX));
    asm.align(16);
    assert_eq!(asm.pos(), 16);
    asm.align(16);
    assert_eq!(asm.pos(), 16);
}
