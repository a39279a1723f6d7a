//! Branch resolution, misprediction flushes, and predictor training.

use oocore::arch::demo::asm;
use oocore::config::{BranchPredictorKind, Config};

use crate::common::TestContextBuilder;

fn static_predictor_config() -> Config {
    let mut config = Config::default();
    config.branch_predictor.kind = BranchPredictorKind::Static;
    config
}

#[test]
fn test_backward_taken_branch_mispredicts_and_recovers() {
    // x2 counts to 3; the backward branch is taken twice. Under the static
    // not-taken predictor both taken iterations mispredict and flush.
    let program = [
        asm::addi(2, 2, 1),     // 0x0: x2 += 1
        asm::bne(2, 3, -1),     // 0x4: loop to 0x0 while x2 != x3
        asm::sys(0),            // 0x8
    ];
    let mut ctx = TestContextBuilder::new(&program)
        .config(static_predictor_config())
        .build();
    ctx.set_reg(3, 3);

    assert!(ctx.run_to_halt(400));
    assert_eq!(ctx.reg(2), 3);

    let stats = ctx.core.stats();
    assert_eq!(stats.branches_executed, 3);
    assert_eq!(stats.branches_mispredicted, 2);
    assert!(stats.flushes >= 2, "flushes = {}", stats.flushes);
    // 3 iterations of addi+bne; the halting syscall raises instead.
    assert_eq!(stats.retired, 6);
}

#[test]
fn test_wrong_path_work_is_squashed() {
    // On the taken path the addi at 0x8 must never commit.
    let program = [
        asm::beq(1, 1, 2),      // 0x0: always taken, target 0x8
        asm::addi(5, 5, 1),     // 0x4: wrong path under not-taken prediction
        asm::sys(0),            // 0x8: taken target
    ];
    let mut ctx = TestContextBuilder::new(&program)
        .config(static_predictor_config())
        .build();

    assert!(ctx.run_to_halt(200));
    // The wrong-path addi was fetched, maybe executed, but never committed.
    assert_eq!(ctx.reg(5), 0);

    let stats = ctx.core.stats();
    assert_eq!(stats.branches_mispredicted, 1);
    assert!(stats.flushes >= 1);
    assert_eq!(stats.retired, 1); // just the branch; the syscall raises
}

#[test]
fn test_bimodal_predictor_learns_the_loop() {
    // With the default bimodal predictor the loop branch trains quickly; the
    // only misprediction left at steady state is the final exit.
    let program = [
        asm::addi(2, 2, 1),
        asm::bne(2, 3, -1),
        asm::sys(0),
    ];
    let mut ctx = TestContextBuilder::new(&program).build();
    ctx.set_reg(3, 20);

    assert!(ctx.run_to_halt(2000));
    assert_eq!(ctx.reg(2), 20);

    let stats = ctx.core.stats();
    assert_eq!(stats.branches_executed, 20);
    // Cold misses at the start plus the exit; far fewer than the 19 a static
    // predictor would take.
    assert!(
        stats.branches_mispredicted <= 4,
        "mispredicted {} of {}",
        stats.branches_mispredicted,
        stats.branches_executed
    );
}
