//! Load/store queue ordering: forwarding deferral and violation recovery.

use oocore::arch::demo::asm;

use crate::common::{TestContext, TestContextBuilder};

#[test]
fn test_store_then_load_same_address() {
    // The load's base is ready at the same time as the store's, so the LSQ
    // sees the older store's targets and defers the load behind it.
    let program = [
        asm::st(2, 1, 0),  // mem[x1] = x2
        asm::ld(3, 1, 0),  // x3 = mem[x1]
        asm::sys(0),
    ];
    let mut ctx = TestContext::new(&program);
    ctx.set_reg(1, 0x200);
    ctx.set_reg(2, 77);

    assert!(ctx.run_to_halt(200));
    assert_eq!(ctx.reg(3), 77);
    let stats = ctx.core.stats();
    assert_eq!(stats.retired, 2);
}

#[test]
fn test_speculative_load_violation_flushes_and_recovers() {
    // The store's address hangs behind a multiply chain while the load's base
    // is ready immediately, so the load issues speculatively, reads the stale
    // value, and is caught when the store commits.
    let program = [
        asm::mul(5, 6, 7),  // x5 = 0x10 * 0x20 = 0x200 (3-cycle latency)
        asm::st(2, 5, 0),   // mem[x5] = x2  (address late)
        asm::ld(4, 1, 0),   // x4 = mem[x1]  (same address, base ready)
        asm::sys(0),
    ];
    let mut ctx = TestContext::new(&program);
    ctx.set_reg(1, 0x200);
    ctx.set_reg(2, 99);
    ctx.set_reg(6, 0x10);
    ctx.set_reg(7, 0x20);

    assert!(ctx.run_to_halt(300));
    // The re-fetched load observes the store's data.
    assert_eq!(ctx.reg(4), 99);

    let stats = ctx.core.stats();
    assert_eq!(stats.lsq_load_violations, 1);
    assert!(stats.flushes >= 1, "flushes = {}", stats.flushes);
    assert_eq!(stats.retired, 3);
}

#[test]
fn test_disjoint_store_and_load_do_not_interfere() {
    let program = [
        asm::st(2, 1, 0),   // mem[0x200] = x2
        asm::ld(4, 3, 0),   // x4 = mem[0x300]
        asm::sys(0),
    ];
    let mut ctx = TestContextBuilder::new(&program)
        .data_u64(0x300, 4242)
        .build();
    ctx.set_reg(1, 0x200);
    ctx.set_reg(2, 7);
    ctx.set_reg(3, 0x300);

    assert!(ctx.run_to_halt(200));
    assert_eq!(ctx.reg(4), 4242);
    assert_eq!(ctx.core.stats().lsq_load_violations, 0);
}

#[test]
fn test_store_data_reaches_memory_for_later_load() {
    // Store, spacer work, then an independent load of the same address whose
    // base arrives late enough to miss the store queue entirely.
    let program = [
        asm::st(2, 1, 0),      // mem[0x400] = 55
        asm::addi(6, 6, 1),
        asm::addi(6, 6, 1),
        asm::addi(6, 6, 1),
        asm::addi(6, 6, 1),
        asm::add(7, 1, 0),     // x7 = x1 (address via ALU)
        asm::ld(3, 7, 0),      // x3 = mem[x7]
        asm::sys(0),
    ];
    let mut ctx = TestContext::new(&program);
    ctx.set_reg(1, 0x400);
    ctx.set_reg(2, 55);

    assert!(ctx.run_to_halt(300));
    assert_eq!(ctx.reg(3), 55);
    assert_eq!(ctx.reg(6), 4);
}
