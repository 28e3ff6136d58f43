//! Cross-validation tests: encode with mcemit, decode with iced-x86.
//!
//! Every encoding is verified by decoding the output with iced-x86 and
//! checking the decoded mnemonic against expectations. This provides
//! gold-standard validation against an independent, battle-tested
//! x86-64 decoder.

use iced_x86::{Code, Decoder, DecoderOptions, Formatter, IntelFormatter, Mnemonic};
use mcemit::x86::{
    k, xmm, Address, Assembler, Feature, Scale, Vendor, RAX, RBP, RBX, RCX, RSP,
};

// ─── Helpers ─────────────────────────────────────────────────────────

/// Decode one instruction, asserting the whole byte stream is consumed.
fn decode_one(bytes: &[u8]) -> (Mnemonic, String) {
    assert!(!bytes.is_empty());
    let mut decoder = Decoder::with_ip(64, bytes, 0, DecoderOptions::NONE);
    let instr = decoder.decode();
    assert_ne!(
        instr.mnemonic(),
        Mnemonic::INVALID,
        "iced-x86 decoded INVALID for {bytes:02X?}"
    );
    assert_eq!(
        instr.len(),
        bytes.len(),
        "iced-x86 consumed {} of {} bytes for {bytes:02X?}",
        instr.len(),
        bytes.len()
    );
    let mut formatter = IntelFormatter::new();
    let mut output = String::new();
    formatter.format(&instr, &mut output);
    (instr.mnemonic(), output)
}

fn emit(feature: Feature, f: impl FnOnce(&mut Assembler)) -> Vec<u8> {
    let mut asm = Assembler::new(feature);
    f(&mut asm);
    asm.finish().into_parts().0
}

fn verify(feature: Feature, expected: Mnemonic, f: impl FnOnce(&mut Assembler)) -> String {
    let bytes = emit(feature, f);
    let (mnemonic, formatted) = decode_one(&bytes);
    assert_eq!(
        mnemonic, expected,
        "mnemonic mismatch: iced decoded `{formatted}` from {bytes:02X?}"
    );
    formatted
}

// ─── GP operations ───────────────────────────────────────────────────

#[test]
fn gp_loads_and_stores() {
    let f = verify(Feature::Avx, Mnemonic::Mov, |a| {
        a.mov_load(RAX, &Address::base(RBP));
    });
    assert_eq!(f, "mov rax,[rbp]");

    let f = verify(Feature::Avx, Mnemonic::Mov, |a| {
        a.mov_store(&Address::base(RSP).disp(8), RCX);
    });
    assert_eq!(f, "mov [rsp+8],rcx");

    let f = verify(Feature::Avx, Mnemonic::Lea, |a| {
        a.lea(RAX, &Address::base(RBX).index(RCX, Scale::S4).disp(-4));
    });
    assert_eq!(f, "lea rax,[rbx+rcx*4-4]");
}

#[test]
fn add_forms_decode_with_correct_immediates() {
    let f = verify(Feature::Avx, Mnemonic::Add, |a| a.add_imm(RAX, 8));
    assert_eq!(f, "add rax,8");
    let f = verify(Feature::Avx, Mnemonic::Add, |a| a.add_imm(RAX, 0x1000));
    assert_eq!(f, "add rax,1000h");
}

// ─── SIMD encodings across prefix forms ──────────────────────────────

#[test]
fn vex_and_evex_forms_of_the_same_mnemonic() {
    verify(Feature::Avx, Mnemonic::Vaddps, |a| {
        a.simd_rrr("vaddps", mcemit::x86::VectorLen::L128, xmm(0), xmm(1), xmm(2));
    });
    verify(Feature::Avx, Mnemonic::Vaddps, |a| {
        a.simd_rrr("vaddps", mcemit::x86::VectorLen::L256, xmm(0), xmm(1), xmm(2));
    });
    verify(Feature::Avx512, Mnemonic::Vaddps, |a| {
        a.simd_rrr("vaddps", mcemit::x86::VectorLen::L512, xmm(0), xmm(1), xmm(2));
    });
    // Legacy downgrade decodes as the SSE mnemonic.
    verify(Feature::Sse, Mnemonic::Addps, |a| {
        a.simd_rrr("vaddps", mcemit::x86::VectorLen::L128, xmm(1), xmm(1), xmm(2));
    });
}

#[test]
fn masked_instruction_decodes_with_the_opmask() {
    let bytes = emit(Feature::Avx512, |a| {
        a.simd_rrr_masked(
            "vaddps",
            mcemit::x86::VectorLen::L512,
            xmm(0),
            xmm(1),
            xmm(2),
            k(3),
            true,
        );
    });
    let (_, formatted) = decode_one(&bytes);
    assert_eq!(formatted, "vaddps zmm0{k3}{z},zmm1,zmm2");
}

#[test]
fn upper_bank_registers_decode_correctly() {
    let bytes = emit(Feature::Avx512, |a| {
        a.simd_rrr("vaddps", mcemit::x86::VectorLen::L128, xmm(16), xmm(17), xmm(18));
    });
    let (_, formatted) = decode_one(&bytes);
    assert_eq!(formatted, "vaddps xmm16,xmm17,xmm18");
}

#[test]
fn compressed_displacement_round_trips_through_the_decoder() {
    let bytes = emit(Feature::Avx512, |a| {
        a.simd_rrm(
            "vaddps",
            mcemit::x86::VectorLen::L512,
            xmm(0),
            xmm(1),
            &Address::base(RAX).disp(0x40),
        );
    });
    let mut decoder = Decoder::with_ip(64, &bytes, 0, DecoderOptions::NONE);
    let instr = decoder.decode();
    assert_eq!(instr.code(), Code::EVEX_Vaddps_zmm_k1z_zmm_zmmm512b32_er);
    assert_eq!(instr.memory_displacement64(), 0x40);
}

#[test]
fn evex_only_move_decodes() {
    let f = verify(Feature::Avx512, Mnemonic::Vmovdqu64, |a| {
        a.simd_rm(
            "vmovdqu64",
            mcemit::x86::VectorLen::L512,
            xmm(0),
            &Address::base(RAX),
        );
    });
    assert_eq!(f, "vmovdqu64 zmm0,[rax]");
}

// ─── NOP padding ─────────────────────────────────────────────────────

/// Decode an entire stream, asserting every instruction is a complete
/// NOP and nothing straddles the end.
fn assert_all_nops(bytes: &[u8]) {
    let mut decoder = Decoder::with_ip(64, bytes, 0, DecoderOptions::NONE);
    let mut consumed = 0;
    while consumed < bytes.len() {
        let instr = decoder.decode();
        assert!(
            matches!(instr.mnemonic(), Mnemonic::Nop),
            "non-NOP {:?} in padding {bytes:02X?}",
            instr.mnemonic()
        );
        consumed += instr.len();
    }
    assert_eq!(consumed, bytes.len(), "instruction straddles the padding end");
}

#[test]
fn padding_decodes_as_complete_nops() {
    for n in 0..=64 {
        let mut asm = Assembler::new(Feature::Avx);
        asm.pad(n);
        let bytes = asm.finish().into_parts().0;
        assert_eq!(bytes.len(), n);
        assert_all_nops(&bytes);
    }
}

#[test]
fn amd_padding_decodes_as_complete_nops() {
    for n in 0..=64 {
        let mut asm = Assembler::new(Feature::Avx).vendor(Vendor::Amd);
        asm.pad(n);
        let bytes = asm.finish().into_parts().0;
        assert_eq!(bytes.len(), n);
        assert_all_nops(&bytes);
    }
}
