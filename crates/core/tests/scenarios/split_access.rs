//! Cache-line-crossing accesses split into multiple packets.

use oocore::arch::demo::asm;
use oocore::config::Config;

use crate::common::TestContextBuilder;

#[test]
fn test_line_crossing_vector_load_reassembles() {
    // A 16-byte load at offset 56 of a 64-byte line spans two packets; the
    // payloads must concatenate in offset order. The register result is the
    // low half, i.e. bytes 56..64.
    let bytes: Vec<u8> = (1u8..=16).collect();
    let program = [asm::ldv(2, 1, 0), asm::sys(0)];
    let mut ctx = TestContextBuilder::new(&program)
        .data_bytes(56, &bytes)
        .build();
    ctx.set_reg(1, 56);

    assert!(ctx.run_to_halt(200));
    assert_eq!(ctx.reg(2), u64::from_le_bytes(bytes[..8].try_into().unwrap()));
    assert_eq!(ctx.core.stats().retired, 1);
}

#[test]
fn test_narrow_line_width_still_reassembles() {
    // Shrink the line to 16 bytes so even the 8-byte load at offset 12 splits.
    let mut config = Config::default();
    config.memory_hierarchy.cache_line_width = 16;

    let program = [asm::ld(2, 1, 0), asm::sys(0)];
    let mut ctx = TestContextBuilder::new(&program)
        .config(config)
        .data_u64(12, 0x0123_4567_89AB_CDEF)
        .build();
    ctx.set_reg(1, 12);

    assert!(ctx.run_to_halt(200));
    assert_eq!(ctx.reg(2), 0x0123_4567_89AB_CDEF);
}
