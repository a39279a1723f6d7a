//! Backpressure from a small reorder buffer.

use oocore::arch::demo::asm;
use oocore::config::Config;

use crate::common::TestContextBuilder;

#[test]
fn test_small_rob_stalls_rename() {
    let mut config = Config::default();
    config.queue_sizes.rob = 4;

    // A long serial chain keeps the head uncommittable while the frontend
    // keeps feeding.
    let mut program: Vec<u32> = (0..16).map(|_| asm::addi(1, 1, 1)).collect();
    program.push(asm::sys(0));
    let mut ctx = TestContextBuilder::new(&program).config(config).build();

    assert!(ctx.run_to_halt(500));
    assert_eq!(ctx.reg(1), 16);

    let stats = ctx.core.stats();
    assert!(stats.rename_rob_stalls >= 1, "robStalls = {}", stats.rename_rob_stalls);
    assert!(
        stats.issue_backend_stalls >= 1,
        "backendStalls = {}",
        stats.issue_backend_stalls
    );
    assert_eq!(stats.retired, 16);
}

#[test]
fn test_large_rob_removes_the_stalls() {
    let mut program: Vec<u32> = (0..16).map(|_| asm::addi(1, 1, 1)).collect();
    program.push(asm::sys(0));
    let mut ctx = TestContextBuilder::new(&program).build();

    assert!(ctx.run_to_halt(500));
    assert_eq!(ctx.reg(1), 16);
    // The default 32-entry buffer never fills on this program.
    assert_eq!(ctx.core.stats().rename_rob_stalls, 0);
}
