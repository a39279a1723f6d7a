//! Precise exceptions: data aborts, illegal encodings, misaligned fetch.

use oocore::arch::demo::asm;
use oocore::memory::{Translation, Translator};
use oocore::CoreStatus;

use crate::common::{CountingHandler, TestContextBuilder};

/// Identity translation below 0x1000; everything above data-aborts.
fn aborting_translator() -> Translator {
    Box::new(|vaddr| {
        if vaddr >= 0x1000 {
            Translation::DataAbort
        } else {
            Translation::Mapped(vaddr)
        }
    })
}

#[test]
fn test_faulting_load_raises_data_abort_at_commit() {
    let program = [
        asm::addi(3, 3, 1),     // older work commits normally
        asm::ld(2, 1, 0),       // x1 points into the aborting region
        asm::addi(4, 4, 9),     // younger work must be squashed
        asm::sys(0),
    ];
    let (handler, invocations) = CountingHandler::new();
    let mut ctx = TestContextBuilder::new(&program)
        .translator(aborting_translator())
        .handler(Box::new(handler))
        .build();
    ctx.set_reg(1, 0x2000);

    ctx.run(300);
    // The abort is fatal under the demo handler.
    assert_eq!(ctx.core.status(), CoreStatus::Halted);
    assert_eq!(invocations.get(), 1);

    // Commit stopped exactly before the load: the older addi retired, the
    // younger one never touched architectural state.
    assert_eq!(ctx.reg(3), 1);
    assert_eq!(ctx.reg(2), 0);
    assert_eq!(ctx.reg(4), 0);
    assert_eq!(ctx.core.stats().retired, 1);
}

#[test]
fn test_illegal_instruction_halts() {
    let program = [asm::addi(1, 1, 5), 0xDEAD_BEEF, asm::addi(2, 2, 7)];
    let (handler, invocations) = CountingHandler::new();
    let mut ctx = TestContextBuilder::new(&program)
        .handler(Box::new(handler))
        .build();

    ctx.run(300);
    assert_eq!(ctx.core.status(), CoreStatus::Halted);
    assert_eq!(invocations.get(), 1);
    assert_eq!(ctx.reg(1), 5);
    assert_eq!(ctx.reg(2), 0);
}

#[test]
fn test_misaligned_pc_raises() {
    let program = [asm::addi(1, 1, 2), asm::sys(0)];
    let (handler, invocations) = CountingHandler::new();
    let mut ctx = TestContextBuilder::new(&program)
        .handler(Box::new(handler))
        .build();
    // Start fetching from a misaligned address; fetch emits a fault macro
    // that commits precisely.
    ctx.core.set_pc(2);

    ctx.run(300);
    assert_eq!(ctx.core.status(), CoreStatus::Halted);
    assert_eq!(invocations.get(), 1);
    assert_eq!(ctx.core.stats().retired, 0);
}
