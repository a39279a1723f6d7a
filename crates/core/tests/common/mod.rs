//! Shared harness for core integration tests.

use std::cell::Cell;
use std::rc::Rc;

use oocore::arch::demo::{DemoArchitecture, DemoExceptionHandler};
use oocore::arch::ExceptionHandler;
use oocore::common::{ExceptionResult, Register, RegisterFileSet, RegisterValue};
use oocore::config::Config;
use oocore::memory::{FixedLatencyMemory, Translation, Translator};
use oocore::uop::Uop;
use oocore::{Core, CoreStatus};

/// Builder-style context around a fully assembled core.
pub struct TestContext {
    pub core: Core,
}

/// Assembles cores for tests: demo ISA, flat memory, identity translation
/// unless overridden.
pub struct TestContextBuilder {
    config: Config,
    program: Vec<u32>,
    data: Vec<(u64, Vec<u8>)>,
    memory_size: usize,
    memory_latency: u64,
    translator: Option<Translator>,
    handler: Option<Box<dyn ExceptionHandler>>,
}

impl TestContextBuilder {
    pub fn new(program: &[u32]) -> Self {
        Self {
            config: Config::default(),
            program: program.to_vec(),
            data: Vec::new(),
            memory_size: 64 * 1024,
            memory_latency: 1,
            translator: None,
            handler: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Seeds memory with a little-endian u64 at `addr`.
    pub fn data_u64(mut self, addr: u64, value: u64) -> Self {
        self.data.push((addr, value.to_le_bytes().to_vec()));
        self
    }

    /// Seeds memory with raw bytes at `addr`.
    pub fn data_bytes(mut self, addr: u64, bytes: &[u8]) -> Self {
        self.data.push((addr, bytes.to_vec()));
        self
    }

    pub fn translator(mut self, translator: Translator) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn handler(mut self, handler: Box<dyn ExceptionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> TestContext {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut memory = FixedLatencyMemory::new(self.memory_size, self.memory_latency);
        let mut image = Vec::with_capacity(self.program.len() * 4);
        for word in &self.program {
            image.extend_from_slice(&word.to_le_bytes());
        }
        memory.write_block(0, &image);
        for (addr, bytes) in &self.data {
            memory.write_block(*addr, bytes);
        }

        let translator = self
            .translator
            .unwrap_or_else(|| Box::new(Translation::Mapped));
        let handler = self
            .handler
            .unwrap_or_else(|| Box::new(DemoExceptionHandler::default()));

        let mut core = Core::new(
            self.config,
            Box::new(DemoArchitecture),
            handler,
            translator,
            Box::new(memory),
        )
        .expect("core construction");
        core.set_program_length(image.len() as u64);
        core.set_pc(0);
        TestContext { core }
    }
}

impl TestContext {
    /// One-step constructor with the default machine.
    pub fn new(program: &[u32]) -> Self {
        TestContextBuilder::new(program).build()
    }

    /// Runs for exactly `cycles` cycles (or until halt).
    pub fn run(&mut self, cycles: u64) {
        for _ in 0..cycles {
            if self.core.status() == CoreStatus::Halted {
                return;
            }
            self.core.tick();
        }
    }

    /// Runs until the core halts; false if `max_cycles` elapsed first.
    pub fn run_to_halt(&mut self, max_cycles: u64) -> bool {
        for _ in 0..max_cycles {
            if self.core.status() == CoreStatus::Halted {
                return true;
            }
            self.core.tick();
        }
        self.core.status() == CoreStatus::Halted
    }

    /// Runs until the core goes idle; false if `max_cycles` elapsed first.
    pub fn run_to_idle(&mut self, max_cycles: u64) -> bool {
        for _ in 0..max_cycles {
            if self.core.status() == CoreStatus::Idle {
                return true;
            }
            self.core.tick();
        }
        self.core.status() == CoreStatus::Idle
    }

    /// Architectural read of a general-purpose register.
    pub fn reg(&self, reg: u8) -> u64 {
        self.core
            .architectural_value(Register::gp(reg as u16))
            .as_u64()
    }

    /// Architectural write of a general-purpose register.
    pub fn set_reg(&mut self, reg: u8, value: u64) {
        self.core
            .set_architectural_value(Register::gp(reg as u16), RegisterValue::from_u64(value));
    }
}

/// Handler wrapper counting how many exceptions reach registration.
pub struct CountingHandler {
    inner: DemoExceptionHandler,
    invocations: Rc<Cell<u32>>,
}

impl CountingHandler {
    pub fn new() -> (Self, Rc<Cell<u32>>) {
        let invocations = Rc::new(Cell::new(0));
        (
            Self {
                inner: DemoExceptionHandler::default(),
                invocations: invocations.clone(),
            },
            invocations,
        )
    }
}

impl ExceptionHandler for CountingHandler {
    fn register_exception(&mut self, uop: &Uop) {
        self.invocations.set(self.invocations.get() + 1);
        self.inner.register_exception(uop);
    }

    fn tick(&mut self, files: &RegisterFileSet) -> Option<ExceptionResult> {
        self.inner.tick(files)
    }
}
