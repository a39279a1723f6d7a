//! The out-of-order core: unit ownership, cycle ordering, flush
//! orchestration, the exception latch, and context switching.
//!
//! Every component advances exactly once per `tick`, in a fixed order:
//! timers, exception processing, port allocator, writeback, the frontend and
//! backend units, late issue, buffer rotation, commit, and finally flush
//! resolution and the next fetch request. Cross-unit communication happens by
//! direct routing inside the tick, never by ownership cycles.

use crate::arch::{Architecture, ExceptionHandler};
use crate::branch::{AlwaysNotTaken, BimodalPredictor, BranchPredictor};
use crate::common::reg::{Register, RegisterFileKind, RegisterFileSet, RegisterValue};
use crate::common::StateChange;
use crate::config::{BranchPredictorKind, Config};
use crate::memory::{Memory, Mmu, Translator};
use crate::pipeline::{
    BalancedPortAllocator, DecodeUnit, DispatchIssueUnit, ExecuteEffect, ExecuteUnit,
    FetchUnit, FetchedMacro, LoadStoreQueue, PipelineBuffer, PortAllocator, RegisterAliasTable,
    RenameUnit, ReorderBuffer, WritebackUnit,
};
use crate::stats::CoreStats;
use crate::uop::{UopId, UopPool};

/// Core lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreStatus {
    /// Running the simulated program.
    Executing,
    /// Draining the pipeline ahead of a context switch.
    Switching,
    /// Parked with no work (post-switch or after a yielding syscall).
    Idle,
    /// Stopped by a fatal exception.
    Halted,
}

/// A saved execution context: the architectural register state and PC.
#[derive(Clone, Debug)]
pub struct CoreContext {
    /// Program counter to resume from.
    pub pc: u64,
    /// Architectural register values.
    pub registers: Vec<(Register, RegisterValue)>,
}

/// The out-of-order superscalar core.
pub struct Core {
    config: Config,
    arch: Box<dyn Architecture>,
    predictor: Box<dyn BranchPredictor>,
    handler: Box<dyn ExceptionHandler>,
    pool: UopPool,
    register_files: RegisterFileSet,
    rat: RegisterAliasTable,
    mmu: Mmu,
    fetch: FetchUnit,
    decode: DecodeUnit,
    rename: RenameUnit,
    dispatch: DispatchIssueUnit,
    port_allocator: BalancedPortAllocator,
    exec_units: Vec<ExecuteUnit>,
    lsq: LoadStoreQueue,
    rob: ReorderBuffer,
    writeback: WritebackUnit,
    fetch_to_decode: PipelineBuffer<FetchedMacro>,
    decode_to_rename: PipelineBuffer<UopId>,
    rename_to_dispatch: PipelineBuffer<UopId>,
    issue_ports: Vec<PipelineBuffer<UopId>>,
    completion_slots: Vec<PipelineBuffer<UopId>>,
    /// At most one latched exception, owned by the core once raised.
    exception: Option<UopId>,
    status: CoreStatus,
    ticks: u64,
    flushes: u64,
    idle_ticks: u64,
    context_switches: u64,
    trace: bool,
    effects: Vec<ExecuteEffect>,
}

impl Core {
    /// Builds a core from configuration and its external collaborators.
    pub fn new(
        config: Config,
        arch: Box<dyn Architecture>,
        handler: Box<dyn ExceptionHandler>,
        translator: Translator,
        memory: Box<dyn Memory>,
    ) -> Result<Self, String> {
        config.validate()?;

        let arch_files = arch.register_files();
        let mut phys_counts = [0u16; RegisterFileKind::COUNT];
        for kind in RegisterFileKind::ALL {
            phys_counts[kind.index()] = config.register_set.count(kind);
        }
        let rat = RegisterAliasTable::new(&arch_files, &phys_counts);
        let totals = rat.physical_counts();
        for file in &arch_files {
            if (totals[file.kind.index()] as usize) < file.count as usize {
                return Err(format!(
                    "Register-Set provides fewer {:?} registers than the architecture needs",
                    file.kind
                ));
            }
        }

        let register_files = RegisterFileSet::new(&totals);
        let dispatch = DispatchIssueUnit::new(&config, &totals);
        let mmu = Mmu::new(&config, translator, memory);

        let predictor: Box<dyn BranchPredictor> = match config.branch_predictor.kind {
            BranchPredictorKind::Static => Box::new(AlwaysNotTaken),
            BranchPredictorKind::Bimodal => Box::new(BimodalPredictor::new(
                config.branch_predictor.btb_tag_bits,
                config.branch_predictor.saturating_count_bits,
            )),
        };

        let fetch = FetchUnit::new(
            config.fetch.fetch_block_size,
            config.branch_predictor.loop_buffer_size,
        );
        let exec_units = config
            .execution_units
            .iter()
            .map(ExecuteUnit::new)
            .collect::<Vec<_>>();
        let issue_ports = (0..exec_units.len())
            .map(|_| PipelineBuffer::new(1))
            .collect();
        let completion_slots = (0..exec_units.len() + config.pipeline_widths.lsq_completion)
            .map(|_| PipelineBuffer::new(1))
            .collect();
        let front_end = config.pipeline_widths.front_end;

        Ok(Self {
            lsq: LoadStoreQueue::new(&config),
            rob: ReorderBuffer::new(&config),
            port_allocator: BalancedPortAllocator::new(exec_units.len()),
            rename: RenameUnit::new(),
            decode: DecodeUnit::new(),
            writeback: WritebackUnit::new(),
            fetch_to_decode: PipelineBuffer::new(front_end),
            decode_to_rename: PipelineBuffer::new(front_end),
            rename_to_dispatch: PipelineBuffer::new(front_end),
            issue_ports,
            completion_slots,
            config,
            arch,
            predictor,
            handler,
            pool: UopPool::new(),
            register_files,
            rat,
            mmu,
            fetch,
            dispatch,
            exec_units,
            exception: None,
            status: CoreStatus::Executing,
            ticks: 0,
            flushes: 0,
            idle_ticks: 0,
            context_switches: 0,
            trace: false,
            effects: Vec::new(),
        })
    }

    /// Current lifecycle state.
    pub fn status(&self) -> CoreStatus {
        self.status
    }

    /// Cycles simulated.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Current fetch program counter.
    pub fn pc(&self) -> u64 {
        self.fetch.pc()
    }

    /// Points fetch at `pc` (program entry).
    pub fn set_pc(&mut self, pc: u64) {
        self.fetch.update_pc(pc);
    }

    /// Limits fetch to the first `bytes` of memory.
    pub fn set_program_length(&mut self, bytes: u64) {
        self.fetch.set_program_length(bytes);
    }

    /// Enables stage-tagged trace output on stderr.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Reads a register through the architectural (mapped) view.
    pub fn architectural_value(&self, reg: Register) -> RegisterValue {
        self.register_files.get(self.rat.rename_source(reg)).clone()
    }

    /// Writes a register through the architectural (mapped) view.
    pub fn set_architectural_value(&mut self, reg: Register, value: RegisterValue) {
        let phys = self.rat.rename_source(reg);
        self.register_files.set(phys, value);
    }

    /// Advances the core by one clock cycle.
    pub fn tick(&mut self) {
        self.ticks += 1;
        self.arch
            .update_system_timers(&mut self.register_files, self.ticks);

        match self.status {
            CoreStatus::Idle => {
                self.idle_ticks += 1;
                return;
            }
            CoreStatus::Halted => return,
            CoreStatus::Switching => {
                if self.pipeline_drained() {
                    self.fetch.flush_loop_buffer();
                    self.decode.purge_flushed(&mut self.pool);
                    self.dispatch.purge_flushed(&self.pool, &mut self.port_allocator);
                    self.dispatch.flush();
                    for port in &mut self.issue_ports {
                        port.fill_none();
                    }
                    for slot in &mut self.completion_slots {
                        slot.fill_none();
                    }
                    self.status = CoreStatus::Idle;
                    return;
                }
                // Keep ticking so the pipeline drains.
            }
            CoreStatus::Executing => {}
        }

        // Deliver memory responses before any unit looks for them.
        self.mmu.tick(&mut self.pool);

        if self.exception.is_some() {
            self.process_exception();
            return;
        }

        self.port_allocator.tick();

        // Writeback first so same-cycle operand reads see the new values.
        self.writeback.tick(
            &mut self.pool,
            &mut self.register_files,
            &mut self.completion_slots,
            &mut self.rob,
        );

        self.fetch.tick(
            &mut self.fetch_to_decode,
            &mut self.mmu,
            &mut *self.predictor,
            &*self.arch,
        );
        self.decode.tick(
            &mut self.pool,
            &mut self.fetch_to_decode,
            &mut self.decode_to_rename,
            &self.config,
            &*self.arch,
        );
        self.rename.tick(
            &mut self.pool,
            &mut self.decode_to_rename,
            &mut self.rename_to_dispatch,
            &mut self.rob,
            &mut self.rat,
            &mut self.lsq,
        );
        self.dispatch.tick(
            &mut self.pool,
            &self.register_files,
            &mut self.rename_to_dispatch,
            &mut self.port_allocator,
        );

        let mut effects = std::mem::take(&mut self.effects);
        for index in 0..self.exec_units.len() {
            self.exec_units[index].tick(
                &mut self.pool,
                &mut self.issue_ports[index],
                &mut self.completion_slots[index],
                &self.config,
                &mut *self.predictor,
                &mut effects,
            );
        }
        for effect in effects.drain(..) {
            match effect {
                ExecuteEffect::StartLoad(id) => self.lsq.start_load(&mut self.pool, id),
                ExecuteEffect::SupplyStoreData(id) => {
                    self.lsq.supply_store_data(&self.pool, id)
                }
                ExecuteEffect::Completed(id) => {
                    self.dispatch
                        .forward_operands(&mut self.pool, &*self.arch, id)
                }
            }
        }
        self.effects = effects;

        let port_count = self.exec_units.len();
        let (_, lsq_slots) = self.completion_slots.split_at_mut(port_count);
        self.lsq.tick(
            &mut self.pool,
            &mut self.mmu,
            &mut self.dispatch,
            &*self.arch,
            lsq_slots,
        );

        // Late issue: uops woken by this cycle's forwards may go now.
        self.dispatch
            .issue(&mut self.pool, &mut self.issue_ports, &mut self.port_allocator);

        self.fetch_to_decode.tick();
        self.decode_to_rename.tick();
        self.rename_to_dispatch.tick();
        for port in &mut self.issue_ports {
            port.tick();
        }
        for slot in &mut self.completion_slots {
            slot.tick();
        }

        let outcome = self.rob.commit(
            self.config.pipeline_widths.commit,
            &mut self.pool,
            &mut self.rat,
            &mut self.lsq,
        );
        if let Some(boundary) = outcome.loop_boundary {
            self.fetch.register_loop_boundary(boundary);
        }
        if let Some(raised) = outcome.raised {
            self.raise_exception(raised);
        }

        if self.exception.is_some() {
            self.handle_exception();
            self.fetch.request_from_pc(&mut self.mmu);
            return;
        }

        self.flush_if_needed();
        self.fetch.request_from_pc(&mut self.mmu);
    }

    /// Latches a raised exception, keeping only the youngest unhandled raise.
    fn raise_exception(&mut self, id: UopId) {
        let Some(new_seq) = self.pool.get(id).map(|u| u.seq_id) else {
            return;
        };
        match self.exception {
            None => self.exception = Some(id),
            Some(current) => {
                let current_seq = self.pool.get(current).map_or(u64::MAX, |u| u.seq_id);
                if new_seq < current_seq {
                    let _ = self.pool.remove(current);
                    self.exception = Some(id);
                } else {
                    let _ = self.pool.remove(id);
                }
            }
        }
    }

    /// Flushes everything younger than the raising uop, then starts handling.
    fn handle_exception(&mut self) {
        let exception = self.exception.expect("exception latched");
        let insn_id = self
            .pool
            .get(exception)
            .expect("exception uop is live")
            .insn_id;
        if self.trace {
            eprintln!(
                "CO  exception {:?} at insn {}",
                self.pool.get(exception).and_then(|u| u.exception),
                insn_id
            );
        }

        // The raising uop left the reorder buffer but may still own LSQ
        // entries (a faulting load); mark it flushed so the purge releases
        // them. The pool slot stays alive for the handler.
        if let Some(uop) = self.pool.get_mut(exception) {
            uop.flushed = true;
        }
        let flushed = self.rob.flush(&mut self.pool, &mut self.rat, insn_id);
        self.purge_pipeline(flushed);

        let uop = self
            .pool
            .get(exception)
            .expect("exception uop is live")
            .clone();
        self.handler.register_exception(&uop);
        self.process_exception();
    }

    /// Advances the exception handler; may span multiple cycles.
    fn process_exception(&mut self) {
        if self.mmu.has_pending_requests() {
            // All memory traffic must settle before the handler acts.
            return;
        }
        let Some(result) = self.handler.tick(&self.register_files) else {
            return;
        };

        let exception = self.exception.take().expect("exception latched");
        let _ = self.pool.remove(exception);

        if result.fatal {
            if self.trace {
                eprintln!("CO  halting on fatal exception");
            }
            self.status = CoreStatus::Halted;
            return;
        }

        self.apply_state_change(&result.state_change);
        self.fetch.flush_loop_buffer();
        self.fetch.update_pc(result.target_pc);
        if result.idle_after_syscall {
            self.dispatch.flush();
            self.status = CoreStatus::Idle;
            self.context_switches += 1;
        }
    }

    /// Applies handler-directed register and memory updates.
    fn apply_state_change(&mut self, change: &StateChange) {
        for (reg, value) in &change.registers {
            let phys = self.rat.rename_source(*reg);
            self.register_files.set(phys, value.clone());
        }
        for (vaddr, data) in &change.memory {
            self.mmu.write_untimed(*vaddr, data.clone());
        }
    }

    /// Resolves the oldest flush demand across execution units and the
    /// reorder buffer, or an early decode redirect when nothing older asks.
    fn flush_if_needed(&mut self) {
        // Units are scanned in port order; a strictly-older id is required to
        // displace an earlier claim, so equal ids favour the lowest port.
        let mut target: Option<(u64, u64)> = None;
        for unit in &self.exec_units {
            if unit.should_flush()
                && target.is_none_or(|(insn, _)| unit.flush_insn_id() < insn)
            {
                target = Some((unit.flush_insn_id(), unit.flush_address()));
            }
        }
        if self.rob.should_flush()
            && target.is_none_or(|(insn, _)| self.rob.flush_insn_id() < insn)
        {
            target = Some((self.rob.flush_insn_id(), self.rob.flush_address()));
        }

        if let Some((after_insn, address)) = target {
            if self.trace {
                eprintln!("CO  flush to {:#x} after insn {}", address, after_insn);
            }
            self.fetch.flush_loop_buffer();
            self.fetch.update_pc(address);

            let flushed = self.rob.flush(&mut self.pool, &mut self.rat, after_insn);
            self.purge_pipeline(flushed);

            // An exception whose owner was just squashed is abandoned.
            if let Some(exception) = self.exception {
                if self.pool.is_gone(exception) {
                    self.exception = None;
                }
            }
            self.flushes += 1;
        } else if self.decode.should_flush() {
            if self.trace {
                eprintln!("CO  early flush to {:#x}", self.decode.flush_address());
            }
            self.fetch.flush_loop_buffer();
            self.fetch.update_pc(self.decode.flush_address());
            self.fetch_to_decode.fill_none();
            self.fetch_to_decode.stall(false);
            self.flushes += 1;
        }
    }

    /// Wipes the in-order buffers and purges every unit after a flush.
    fn purge_pipeline(&mut self, flushed: Vec<UopId>) {
        self.fetch_to_decode.fill_none();
        self.fetch_to_decode.stall(false);

        self.decode.purge_flushed(&mut self.pool);
        self.dispatch
            .purge_flushed(&self.pool, &mut self.port_allocator);
        self.lsq.purge_flushed(&self.pool);
        for unit in &mut self.exec_units {
            unit.purge_flushed(&self.pool);
        }
        for id in flushed {
            let _ = self.pool.remove(id);
        }

        // Renamed uops in flight between buffers were freed above; decoded
        // but unrenamed ones are freed here.
        for id in self.decode_to_rename.drain_all() {
            let _ = self.pool.remove(id);
        }
        self.decode_to_rename.stall(false);
        for id in self.rename_to_dispatch.drain_all() {
            let _ = self.pool.remove(id);
        }
        self.rename_to_dispatch.stall(false);
    }

    fn pipeline_drained(&self) -> bool {
        self.fetch_to_decode.is_empty()
            && !self.decode.has_pending()
            && self.decode_to_rename.is_empty()
            && self.rename_to_dispatch.is_empty()
            && self.rob.is_empty()
            && self.lsq.is_empty()
            && !self.mmu.has_pending_requests()
            && self.exception.is_none()
    }

    /// Asks the core to context-switch out. Refused while an exception is
    /// being handled.
    pub fn interrupt(&mut self) -> bool {
        if self.exception.is_some() {
            return false;
        }
        self.status = CoreStatus::Switching;
        self.context_switches += 1;
        self.fetch.pause();
        true
    }

    /// The architectural register state and PC, for the scheduler.
    pub fn current_context(&self) -> CoreContext {
        let mut registers = Vec::new();
        for file in self.arch.register_files() {
            for tag in 0..file.count {
                let reg = Register::new(file.kind, tag);
                registers.push((reg, self.architectural_value(reg)));
            }
        }
        CoreContext {
            pc: self.fetch.pc(),
            registers,
        }
    }

    /// Installs a context and resumes execution.
    pub fn schedule(&mut self, context: CoreContext) {
        self.rat.reset();
        for (reg, value) in context.registers {
            self.set_architectural_value(reg, value);
        }
        self.fetch.update_pc(context.pc);
        self.fetch.unpause();
        self.status = CoreStatus::Executing;
    }

    /// Snapshot of the statistics surface.
    pub fn stats(&self) -> CoreStats {
        let mut branches_executed = 0;
        let mut branches_mispredicted = 0;
        for unit in &self.exec_units {
            branches_executed += unit.branches_executed();
            branches_mispredicted += unit.branches_mispredicted();
        }
        CoreStats {
            cycles: self.ticks,
            retired: self.rob.instructions_committed(),
            flushes: self.flushes,
            fetch_branch_stalls: self.fetch.branch_stalls(),
            decode_early_flushes: self.decode.early_flushes(),
            rename_allocation_stalls: self.rename.allocation_stalls(),
            rename_rob_stalls: self.rename.rob_stalls(),
            rename_lq_stalls: self.rename.lq_stalls(),
            rename_sq_stalls: self.rename.sq_stalls(),
            dispatch_rs_stalls: self.dispatch.rs_stalls(),
            issue_frontend_stalls: self.dispatch.frontend_stalls(),
            issue_backend_stalls: self.dispatch.backend_stalls(),
            issue_port_busy_stalls: self.dispatch.port_busy_stalls(),
            branches_executed,
            branches_mispredicted,
            lsq_load_violations: self.rob.load_violations(),
            idle_ticks: self.idle_ticks,
            context_switches: self.context_switches,
        }
    }
}
