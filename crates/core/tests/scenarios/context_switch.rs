//! Context switching and the yielding syscall.

use oocore::arch::demo::asm;
use oocore::CoreStatus;

use crate::common::TestContext;

#[test]
fn test_yield_syscall_idles_and_resumes() {
    let program = [
        asm::addi(1, 1, 5),
        asm::sys(1),            // yield
        asm::addi(2, 2, 7),
        asm::sys(0),            // exit
    ];
    let mut ctx = TestContext::new(&program);

    assert!(ctx.run_to_idle(300));
    assert_eq!(ctx.reg(1), 5);
    assert_eq!(ctx.reg(2), 0); // nothing past the yield has run
    assert_eq!(ctx.core.stats().context_switches, 1);

    let idle_before = ctx.core.stats().idle_ticks;
    ctx.run(5);
    assert!(ctx.core.stats().idle_ticks > idle_before);

    // The scheduler hands the context straight back; execution resumes at
    // the instruction after the yield.
    let context = ctx.core.current_context();
    assert_eq!(context.pc, 0x8);
    ctx.core.schedule(context);

    assert!(ctx.run_to_halt(300));
    assert_eq!(ctx.reg(2), 7);
}

#[test]
fn test_interrupt_drains_and_exposes_context() {
    let program = [
        asm::addi(1, 1, 1),
        asm::addi(1, 1, 1),
        asm::addi(1, 1, 1),
        asm::sys(0),
    ];
    let mut ctx = TestContext::new(&program);

    // Let the frontend get some work in flight, then ask for a switch.
    ctx.run(3);
    assert!(ctx.core.interrupt());
    assert!(ctx.run_to_idle(300));

    // Everything in flight drained before idling; the saved context carries
    // the committed architectural state.
    let context = ctx.core.current_context();
    let x1 = context
        .registers
        .iter()
        .find(|(reg, _)| reg.tag == 1 && reg.file == oocore::common::RegisterFileKind::GeneralPurpose)
        .map(|(_, value)| value.as_u64())
        .unwrap();
    assert_eq!(x1, ctx.reg(1));
    assert_eq!(ctx.core.stats().context_switches, 1);

    // Rescheduling the same context finishes the program.
    ctx.core.schedule(context);
    assert!(ctx.run_to_halt(300));
    assert_eq!(ctx.reg(1), 3);
}

#[test]
fn test_idle_core_counts_idle_ticks() {
    let program = [asm::addi(1, 1, 1), asm::sys(1)];
    let mut ctx = TestContext::new(&program);
    assert!(ctx.run_to_idle(300));
    assert_eq!(ctx.core.status(), CoreStatus::Idle);

    ctx.run(10);
    let stats = ctx.core.stats();
    assert_eq!(stats.idle_ticks, 10);
    assert_eq!(ctx.core.status(), CoreStatus::Idle);
}
