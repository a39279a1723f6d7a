//! Dispatch/issue unit: scoreboard, dependency matrix, reservation stations.
//!
//! Dispatch accepts renamed uops in program order, reads ready operands from
//! the register files, and parks not-yet-ready uops in the dependency matrix
//! keyed by the producing physical register. Forwarded results wake dependents
//! according to the bypass-latency model: immediate supply, a timed wait, or
//! no forwarding at all (re-read the register file once the scoreboard says
//! ready). Issue drains one ready uop per unstalled port per cycle.

use std::collections::{HashSet, VecDeque};

use crate::arch::Architecture;
use crate::common::reg::{RegisterFileKind, RegisterFileSet, RegisterValue};
use crate::config::Config;
use crate::uop::{UopId, UopPool};

use super::buffer::PipelineBuffer;
use super::ports::PortAllocator;

/// A uop waiting in the dependency matrix for one operand.
#[derive(Clone, Copy, Debug)]
struct DependencyEntry {
    uop: UopId,
    operand: usize,
    port: usize,
}

struct StationPort {
    issue_port: usize,
    ready: VecDeque<UopId>,
}

struct ReservationStation {
    capacity: usize,
    dispatch_rate: usize,
    current_size: usize,
    ports: Vec<StationPort>,
}

/// The dispatch/issue unit.
pub struct DispatchIssueUnit {
    /// Per-physical-register ready bit: true iff no in-flight producer.
    scoreboard: Vec<Vec<bool>>,
    /// Per-physical-register list of waiting consumers.
    dependency_matrix: Vec<Vec<Vec<DependencyEntry>>>,
    stations: Vec<ReservationStation>,
    /// Issue port -> (station index, station-local port index).
    port_mapping: Vec<(usize, usize)>,
    /// Consumers whose producers may not forward; re-check the scoreboard.
    dependents: Vec<DependencyEntry>,
    /// Timed forwards, tagged with the tick they arrive.
    waiting: Vec<(u64, DependencyEntry, RegisterValue)>,
    /// Per-station dispatches made this cycle.
    dispatches: Vec<usize>,
    ticks: u64,
    rs_stalls: u64,
    frontend_stalls: u64,
    backend_stalls: u64,
    port_busy_stalls: u64,
}

impl DispatchIssueUnit {
    /// Builds the unit from the reservation station and port configuration,
    /// with a scoreboard sized for `phys_counts` registers per file.
    pub fn new(config: &Config, phys_counts: &[u16; RegisterFileKind::COUNT]) -> Self {
        let scoreboard = phys_counts.iter().map(|&n| vec![true; n as usize]).collect();
        let dependency_matrix = phys_counts
            .iter()
            .map(|&n| vec![Vec::new(); n as usize])
            .collect();

        // The global Pipeline-Widths rate caps each station's own rate.
        let global_rate = config.pipeline_widths.dispatch_rate;
        let mut stations: Vec<ReservationStation> = config
            .reservation_stations
            .iter()
            .map(|rs| ReservationStation {
                capacity: rs.size,
                dispatch_rate: rs.dispatch_rate.min(global_rate),
                current_size: 0,
                ports: Vec::new(),
            })
            .collect();
        let mut port_mapping = vec![(0, 0); config.ports.len()];
        for (rs_index, rs) in config.reservation_stations.iter().enumerate() {
            for &issue_port in &rs.ports {
                port_mapping[issue_port] = (rs_index, stations[rs_index].ports.len());
                stations[rs_index].ports.push(StationPort {
                    issue_port,
                    ready: VecDeque::new(),
                });
            }
        }

        let dispatches = vec![0; stations.len()];
        Self {
            scoreboard,
            dependency_matrix,
            stations,
            port_mapping,
            dependents: Vec::new(),
            waiting: Vec::new(),
            dispatches,
            ticks: 0,
            rs_stalls: 0,
            frontend_stalls: 0,
            backend_stalls: 0,
            port_busy_stalls: 0,
        }
    }

    fn push_ready(&mut self, port: usize, id: UopId) {
        let (rs_index, rs_port) = self.port_mapping[port];
        self.stations[rs_index].ports[rs_port].ready.push_back(id);
    }

    /// Dispatch step: wake timed and scoreboard-gated waiters, then accept
    /// renamed uops from the input buffer in program order.
    pub fn tick(
        &mut self,
        pool: &mut UopPool,
        files: &RegisterFileSet,
        input: &mut PipelineBuffer<UopId>,
        allocator: &mut dyn PortAllocator,
    ) {
        input.stall(false);
        self.ticks += 1;
        self.dispatches.iter_mut().for_each(|d| *d = 0);

        // Timed forwards that arrive this cycle.
        let mut index = 0;
        while index < self.waiting.len() {
            if self.waiting[index].0 != self.ticks {
                index += 1;
                continue;
            }
            let (_, entry, value) = self.waiting.remove(index);
            let Some(uop) = pool.get_mut(entry.uop) else { continue };
            if uop.flushed {
                continue;
            }
            uop.supply_operand(entry.operand, value);
            if uop.can_execute() {
                self.push_ready(entry.port, entry.uop);
            }
        }

        // Forward-forbidden consumers poll the scoreboard for their register.
        let mut index = 0;
        while index < self.dependents.len() {
            let entry = self.dependents[index];
            let Some(uop) = pool.get(entry.uop) else {
                self.dependents.remove(index);
                continue;
            };
            let reg = uop.sources[entry.operand];
            if !self.scoreboard[reg.file.index()][reg.tag as usize] {
                index += 1;
                continue;
            }
            let value = files.get(reg).clone();
            let uop = pool.get_mut(entry.uop).expect("dependent resolved above");
            uop.supply_operand(entry.operand, value);
            if uop.can_execute() {
                self.push_ready(entry.port, entry.uop);
            }
            self.dependents.remove(index);
        }

        // Dispatch from the input buffer, in program order.
        for slot in 0..input.width() {
            let Some(id) = input.head_slots()[slot] else { continue };
            let Some(uop) = pool.get_mut(id) else {
                input.head_slots_mut()[slot] = None;
                continue;
            };

            if uop.exception.is_some() {
                // Exceptions bypass execution; commit raises them.
                uop.commit_ready = true;
                input.head_slots_mut()[slot] = None;
                continue;
            }

            let port = allocator.allocate(&uop.supported_ports);
            let (rs_index, rs_port) = self.port_mapping[port];
            debug_assert!(rs_index < self.stations.len(), "allocated port inaccessible");

            if self.stations[rs_index].current_size == self.stations[rs_index].capacity
                || self.dispatches[rs_index] == self.stations[rs_index].dispatch_rate
            {
                allocator.deallocate(port);
                input.stall(true);
                self.rs_stalls += 1;
                return;
            }

            // Supply operands that are ready; register the rest.
            let mut ready = true;
            for operand in 0..uop.sources.len() {
                if uop.operand_ready(operand) {
                    continue;
                }
                let reg = uop.sources[operand];
                if self.scoreboard[reg.file.index()][reg.tag as usize] {
                    uop.supply_operand(operand, files.get(reg).clone());
                } else {
                    self.dependency_matrix[reg.file.index()][reg.tag as usize].push(
                        DependencyEntry {
                            uop: id,
                            operand,
                            port,
                        },
                    );
                    ready = false;
                }
            }

            for reg in &uop.destinations {
                self.scoreboard[reg.file.index()][reg.tag as usize] = false;
            }

            self.dispatches[rs_index] += 1;
            self.stations[rs_index].current_size += 1;
            if ready {
                self.stations[rs_index].ports[rs_port].ready.push_back(id);
            }
            input.head_slots_mut()[slot] = None;
        }
    }

    /// Issue step: one ready uop per unstalled port.
    pub fn issue(
        &mut self,
        pool: &mut UopPool,
        issue_ports: &mut [PipelineBuffer<UopId>],
        allocator: &mut dyn PortAllocator,
    ) {
        let mut issued = 0;
        for port in 0..issue_ports.len() {
            let (rs_index, rs_port) = self.port_mapping[port];
            if issue_ports[port].is_stalled() {
                if !self.stations[rs_index].ports[rs_port].ready.is_empty() {
                    self.port_busy_stalls += 1;
                }
                continue;
            }

            if let Some(id) = self.stations[rs_index].ports[rs_port].ready.pop_front() {
                if let Some(uop) = pool.get_mut(id) {
                    uop.issued = true;
                }
                issue_ports[port].tail_slots_mut()[0] = Some(id);
                allocator.issued(port);
                issued += 1;

                assert!(self.stations[rs_index].current_size > 0);
                self.stations[rs_index].current_size -= 1;
            }
        }

        if issued == 0 {
            if self.stations.iter().any(|rs| rs.current_size != 0) {
                self.backend_stalls += 1;
            } else {
                self.frontend_stalls += 1;
            }
        }
    }

    /// Publishes a completed producer's results to its dependents.
    ///
    /// Sets the scoreboard ready bit per destination, then wakes each matrix
    /// entry according to the bypass latency between the producer's and
    /// consumer's groups.
    pub fn forward_operands(
        &mut self,
        pool: &mut UopPool,
        arch: &dyn Architecture,
        producer: UopId,
    ) {
        let Some(prod) = pool.get(producer) else { return };
        debug_assert_eq!(
            prod.destinations.len(),
            prod.results.len(),
            "mismatched register and value counts"
        );
        let producer_group = prod.group;
        let pairs: Vec<_> = prod
            .destinations
            .iter()
            .copied()
            .zip(prod.results.iter().cloned())
            .collect();

        for (reg, value) in pairs {
            self.scoreboard[reg.file.index()][reg.tag as usize] = true;

            let entries =
                std::mem::take(&mut self.dependency_matrix[reg.file.index()][reg.tag as usize]);
            for entry in entries {
                let Some(consumer) = pool.get(entry.uop) else { continue };
                if consumer.flushed {
                    continue;
                }
                match arch.bypass_latency(producer_group, consumer.group) {
                    0 => {
                        let uop = pool.get_mut(entry.uop).expect("consumer resolved above");
                        uop.supply_operand(entry.operand, value.clone());
                        if uop.can_execute() {
                            self.push_ready(entry.port, entry.uop);
                        }
                    }
                    -1 => self.dependents.push(entry),
                    latency => {
                        debug_assert!(latency > 0);
                        self.waiting
                            .push((self.ticks + latency as u64, entry, value.clone()));
                    }
                }
            }
        }
    }

    /// Removes flushed uops from every ready queue, matrix entry, and wait
    /// list, releasing their ports and reservation station slots.
    pub fn purge_flushed(&mut self, pool: &UopPool, allocator: &mut dyn PortAllocator) {
        // Ready queues: flushed uops release their port and slot directly.
        for rs_index in 0..self.stations.len() {
            for rs_port in 0..self.stations[rs_index].ports.len() {
                let issue_port = self.stations[rs_index].ports[rs_port].issue_port;
                let mut queue =
                    std::mem::take(&mut self.stations[rs_index].ports[rs_port].ready);
                let mut removed = 0;
                queue.retain(|&id| {
                    if pool.is_gone(id) {
                        allocator.deallocate(issue_port);
                        removed += 1;
                        false
                    } else {
                        true
                    }
                });
                self.stations[rs_index].ports[rs_port].ready = queue;
                assert!(self.stations[rs_index].current_size >= removed);
                self.stations[rs_index].current_size -= removed;
            }
        }

        // Matrix and wait lists: a uop may appear once per operand, but holds
        // one port and one station slot.
        let port_mapping = self.port_mapping.clone();
        let mut flushed_per_rs: Vec<HashSet<UopId>> =
            vec![HashSet::new(); self.stations.len()];
        let mut note_flushed =
            |entry: &DependencyEntry, allocator: &mut dyn PortAllocator| {
                let rs_index = port_mapping[entry.port].0;
                if flushed_per_rs[rs_index].insert(entry.uop) {
                    allocator.deallocate(entry.port);
                }
            };

        for file in &mut self.dependency_matrix {
            for list in file {
                list.retain(|entry| {
                    if pool.is_gone(entry.uop) {
                        note_flushed(entry, allocator);
                        false
                    } else {
                        true
                    }
                });
            }
        }
        self.dependents.retain(|entry| {
            if pool.is_gone(entry.uop) {
                note_flushed(entry, allocator);
                false
            } else {
                true
            }
        });
        self.waiting.retain(|(_, entry, _)| {
            if pool.is_gone(entry.uop) {
                note_flushed(entry, allocator);
                false
            } else {
                true
            }
        });

        for (rs_index, flushed) in flushed_per_rs.iter().enumerate() {
            assert!(self.stations[rs_index].current_size >= flushed.len());
            self.stations[rs_index].current_size -= flushed.len();
        }
    }

    /// Full reset for a context switch: every structure cleared, every
    /// register marked ready.
    pub fn flush(&mut self) {
        for file in &mut self.scoreboard {
            file.iter_mut().for_each(|bit| *bit = true);
        }
        for file in &mut self.dependency_matrix {
            file.iter_mut().for_each(|list| list.clear());
        }
        for rs in &mut self.stations {
            rs.current_size = 0;
            rs.ports.iter_mut().for_each(|p| p.ready.clear());
        }
        self.dependents.clear();
        self.waiting.clear();
    }

    /// Free space per reservation station.
    pub fn rs_free_sizes(&self) -> Vec<usize> {
        self.stations
            .iter()
            .map(|rs| rs.capacity - rs.current_size)
            .collect()
    }

    /// Cycles the input stalled on a full reservation station.
    pub fn rs_stalls(&self) -> u64 {
        self.rs_stalls
    }

    /// Cycles nothing issued with every station empty.
    pub fn frontend_stalls(&self) -> u64 {
        self.frontend_stalls
    }

    /// Cycles nothing issued with uops waiting in a station.
    pub fn backend_stalls(&self) -> u64 {
        self.backend_stalls
    }

    /// Times a ready uop was held behind a stalled issue port.
    pub fn port_busy_stalls(&self) -> u64 {
        self.port_busy_stalls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::demo::DemoArchitecture;
    use crate::common::reg::Register;
    use crate::pipeline::ports::BalancedPortAllocator;
    use crate::uop::{InstructionGroup, Op, Uop};

    struct Bench {
        unit: DispatchIssueUnit,
        pool: UopPool,
        files: RegisterFileSet,
        input: PipelineBuffer<UopId>,
        ports: Vec<PipelineBuffer<UopId>>,
        allocator: BalancedPortAllocator,
        config: Config,
    }

    fn bench() -> Bench {
        let config = Config::default();
        let mut phys = [0u16; RegisterFileKind::COUNT];
        phys[RegisterFileKind::GeneralPurpose.index()] = 64;
        let unit = DispatchIssueUnit::new(&config, &phys);
        let ports = (0..config.ports.len()).map(|_| PipelineBuffer::new(1)).collect();
        Bench {
            unit,
            pool: UopPool::new(),
            files: RegisterFileSet::new(&phys),
            input: PipelineBuffer::new(config.pipeline_widths.front_end),
            ports,
            allocator: BalancedPortAllocator::new(config.ports.len()),
            config,
        }
    }

    fn add_uop(bench: &mut Bench, dst: u16, src1: u16, src2: u16) -> UopId {
        let mut uop = Uop::new(
            0x100,
            Op::Add,
            InstructionGroup::IntSimple,
            vec![Register::gp(src1), Register::gp(src2)],
            vec![Register::gp(dst)],
        );
        uop.supported_ports = bench.config.supported_ports(uop.group, uop.op.mnemonic());
        bench.pool.insert(uop)
    }

    fn feed(bench: &mut Bench, id: UopId) {
        let slot = bench
            .input
            .tail_slots_mut()
            .iter_mut()
            .position(|s| s.is_none())
            .expect("input full");
        bench.input.tail_slots_mut()[slot] = Some(id);
        bench.input.tick();
    }

    fn run_dispatch(bench: &mut Bench) {
        bench.unit.tick(
            &mut bench.pool,
            &bench.files,
            &mut bench.input,
            &mut bench.allocator,
        );
    }

    fn run_issue(bench: &mut Bench) {
        bench
            .unit
            .issue(&mut bench.pool, &mut bench.ports, &mut bench.allocator);
    }

    #[test]
    fn test_ready_uop_dispatches_and_issues() {
        let mut bench = bench();
        bench.files.set(Register::gp(1), RegisterValue::from_u64(40));
        bench.files.set(Register::gp(2), RegisterValue::from_u64(2));

        let id = add_uop(&mut bench, 3, 1, 2);
        feed(&mut bench, id);
        run_dispatch(&mut bench);

        // Destination marked not-ready; operands read from the file.
        assert!(bench.pool.get(id).unwrap().can_execute());
        run_issue(&mut bench);
        let issued: Vec<_> = bench
            .ports
            .iter_mut()
            .filter_map(|p| p.tail_slots_mut()[0])
            .collect();
        assert_eq!(issued, vec![id]);
        assert!(bench.pool.get(id).unwrap().issued);
    }

    #[test]
    fn test_dependent_uop_waits_in_matrix_and_wakes_on_forward() {
        let mut bench = bench();
        let producer = add_uop(&mut bench, 1, 2, 3);
        let consumer = add_uop(&mut bench, 4, 1, 5);

        feed(&mut bench, producer);
        run_dispatch(&mut bench);
        feed(&mut bench, consumer);
        run_dispatch(&mut bench);

        // Consumer is missing x1 (producer in flight).
        assert!(!bench.pool.get(consumer).unwrap().can_execute());

        // Producer completes; forward its result.
        {
            let uop = bench.pool.get_mut(producer).unwrap();
            uop.operands = vec![Some(RegisterValue::from_u64(1)), Some(RegisterValue::from_u64(2))];
            uop.execute();
        }
        let arch = DemoArchitecture;
        bench
            .unit
            .forward_operands(&mut bench.pool, &arch, producer);

        let consumer_uop = bench.pool.get(consumer).unwrap();
        assert!(consumer_uop.operand_ready(0));
        assert_eq!(consumer_uop.operands[0].as_ref().unwrap().as_u64(), 3);
    }

    #[test]
    fn test_rs_full_stalls_input() {
        let mut bench = bench();
        // Shrink station 0 (ports 0 and 1) to one entry.
        bench.config.reservation_stations[0].size = 1;
        let mut phys = [0u16; RegisterFileKind::COUNT];
        phys[RegisterFileKind::GeneralPurpose.index()] = 64;
        bench.unit = DispatchIssueUnit::new(&bench.config, &phys);

        let a = add_uop(&mut bench, 1, 2, 3);
        let b = add_uop(&mut bench, 4, 5, 6);
        let c = add_uop(&mut bench, 7, 8, 9);
        feed(&mut bench, a);
        run_dispatch(&mut bench);

        bench.input.tail_slots_mut()[0] = Some(b);
        bench.input.tail_slots_mut()[1] = Some(c);
        bench.input.tick();
        run_dispatch(&mut bench);

        assert!(bench.input.is_stalled());
        assert_eq!(bench.unit.rs_stalls(), 1);
        // The stalled uop stays in the input buffer head.
        assert!(bench.input.head_slots().iter().flatten().count() >= 1);
    }

    #[test]
    fn test_exception_uop_bypasses_to_commit() {
        let mut bench = bench();
        let id = add_uop(&mut bench, 1, 2, 3);
        bench.pool.get_mut(id).unwrap().exception =
            Some(crate::common::ExceptionKind::IllegalInstruction);

        feed(&mut bench, id);
        run_dispatch(&mut bench);

        assert!(bench.pool.get(id).unwrap().commit_ready);
        assert_eq!(bench.unit.rs_free_sizes(), vec![16, 8]);
    }

    #[test]
    fn test_stall_counters_classify_empty_and_waiting() {
        let mut bench = bench();
        run_issue(&mut bench);
        assert_eq!(bench.unit.frontend_stalls(), 1);

        // Park a dependent uop in a station, then fail to issue.
        let id = add_uop(&mut bench, 4, 1, 5);
        {
            let uop = bench.pool.get_mut(id).unwrap();
            uop.operands[0] = None;
        }
        // x1 not ready: mark a producer in flight first.
        let producer = add_uop(&mut bench, 1, 2, 3);
        feed(&mut bench, producer);
        run_dispatch(&mut bench);
        feed(&mut bench, id);
        run_dispatch(&mut bench);
        run_issue(&mut bench); // producer issues
        run_issue(&mut bench); // consumer still waiting
        assert_eq!(bench.unit.backend_stalls(), 1);
    }

    #[test]
    fn test_port_busy_stall_counts() {
        let mut bench = bench();
        bench.files.set(Register::gp(1), RegisterValue::from_u64(1));
        bench.files.set(Register::gp(2), RegisterValue::from_u64(2));
        let id = add_uop(&mut bench, 3, 1, 2);
        feed(&mut bench, id);
        run_dispatch(&mut bench);

        for port in &mut bench.ports {
            port.stall(true);
        }
        run_issue(&mut bench);
        assert_eq!(bench.unit.port_busy_stalls(), 1);
        assert_eq!(bench.unit.backend_stalls(), 1);
    }

    #[test]
    fn test_purge_flushed_releases_slots() {
        let mut bench = bench();
        let producer = add_uop(&mut bench, 1, 2, 3);
        let consumer = add_uop(&mut bench, 4, 1, 5);
        feed(&mut bench, producer);
        run_dispatch(&mut bench);
        feed(&mut bench, consumer);
        run_dispatch(&mut bench);
        assert_eq!(bench.unit.rs_free_sizes()[0], 14);

        bench.pool.get_mut(producer).unwrap().flushed = true;
        bench.pool.get_mut(consumer).unwrap().flushed = true;
        bench.unit.purge_flushed(&bench.pool, &mut bench.allocator);

        assert_eq!(bench.unit.rs_free_sizes(), vec![16, 8]);
        // Nothing left to issue.
        run_issue(&mut bench);
        assert_eq!(bench.unit.frontend_stalls(), 1);
    }
}
