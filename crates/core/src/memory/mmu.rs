//! Packet-based MMU: the core's only outward memory surface.
//!
//! The MMU accepts whole-instruction read/write requests from the LSQ, cracks
//! them into cache-line-sized packets, translates addresses, and reassembles
//! split responses into a single data supply per target. Back-pressure is
//! expressed by rejecting a request outright: the caller keeps it queued and
//! may retry next cycle with identical effects.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::common::RegisterValue;
use crate::config::Config;
use crate::uop::{Uop, UopId, UopPool};

use super::packet::{MemPacket, PacketKind};
use super::{Memory, MemoryTarget};

/// Outcome of a virtual-to-physical translation.
pub enum Translation {
    /// Synchronously translated.
    Mapped(u64),
    /// The access faults; a data abort is reported on the response.
    DataAbort,
    /// Translation is being resolved asynchronously; the request parks until
    /// `supply_delayed_translation` re-issues it.
    Pending,
    /// The access should be silently dropped (no data returned).
    Ignored,
}

/// Translation callback supplied by the simulated OS / page tables.
pub type Translator = Box<dyn FnMut(u64) -> Translation>;

struct LoadTracking {
    uop: UopId,
    remaining: u16,
    responses: BTreeMap<(u16, u16), MemPacket>,
}

struct StoreTracking {
    remaining: u16,
    failed: bool,
    cond_uop: Option<UopId>,
}

/// Bandwidth-gated memory management unit.
pub struct Mmu {
    cache_line_width: u64,
    load_bandwidth: u64,
    store_bandwidth: u64,
    request_limit: usize,
    load_request_limit: usize,
    store_request_limit: usize,
    exclusive: bool,
    translator: Translator,
    memory: Box<dyn Memory>,
    /// Per-instruction packet groups awaiting bandwidth, loads and stores.
    queued_loads: VecDeque<Vec<MemPacket>>,
    queued_stores: VecDeque<Vec<MemPacket>>,
    requested_loads: HashMap<u64, LoadTracking>,
    requested_stores: HashMap<u64, StoreTracking>,
    pending_translations: HashMap<u64, Vec<MemPacket>>,
    /// Responses produced without visiting memory (faults, drops).
    responses: VecDeque<MemPacket>,
    completed_instr_reads: Vec<(MemoryTarget, RegisterValue)>,
    pending_data_requests: usize,
}

impl Mmu {
    /// Creates an MMU from configuration with the given translator and store.
    pub fn new(config: &Config, translator: Translator, memory: Box<dyn Memory>) -> Self {
        let iface = &config.lsq_memory_interface;
        Self {
            cache_line_width: config.memory_hierarchy.cache_line_width,
            load_bandwidth: iface.load_bandwidth,
            store_bandwidth: iface.store_bandwidth,
            request_limit: iface.permitted_requests_per_cycle,
            load_request_limit: iface.permitted_loads_per_cycle,
            store_request_limit: iface.permitted_stores_per_cycle,
            exclusive: iface.exclusive,
            translator,
            memory,
            queued_loads: VecDeque::new(),
            queued_stores: VecDeque::new(),
            requested_loads: HashMap::new(),
            requested_stores: HashMap::new(),
            pending_translations: HashMap::new(),
            responses: VecDeque::new(),
            completed_instr_reads: Vec::new(),
            pending_data_requests: 0,
        }
    }

    /// Offers a load instruction's read requests.
    ///
    /// Returns false (rejecting idempotently) when the per-cycle request
    /// limits are saturated or exclusivity forbids loads right now.
    pub fn request_read(&mut self, uop: &Uop, id: UopId) -> bool {
        if self.exclusive && !self.queued_stores.is_empty() {
            return false;
        }
        if !self.exclusive
            && self.queued_loads.len() + self.queued_stores.len() >= self.request_limit
        {
            return false;
        }
        if self.queued_loads.len() >= self.load_request_limit {
            return false;
        }

        let seq_id = uop.seq_id;
        let mut packets = Vec::new();
        for (order, target) in uop.targets.iter().enumerate() {
            self.create_read_packets(target, seq_id, order as u16, &mut packets);
        }
        let total = packets.len() as u16;
        self.pending_data_requests += packets.len();
        self.requested_loads.insert(
            seq_id,
            LoadTracking {
                uop: id,
                remaining: total,
                responses: BTreeMap::new(),
            },
        );
        self.queued_loads.push_back(packets);
        true
    }

    /// Offers a store instruction's write requests with one payload per target.
    pub fn request_write(
        &mut self,
        seq_id: u64,
        targets: &[MemoryTarget],
        data: &[RegisterValue],
        cond_uop: Option<UopId>,
    ) -> bool {
        debug_assert_eq!(targets.len(), data.len(), "address/data count mismatch");
        if self.exclusive && !self.queued_loads.is_empty() {
            return false;
        }
        if !self.exclusive
            && self.queued_loads.len() + self.queued_stores.len() >= self.request_limit
        {
            return false;
        }
        if self.queued_stores.len() >= self.store_request_limit {
            return false;
        }

        let mut packets = Vec::new();
        for (order, (target, value)) in targets.iter().zip(data.iter()).enumerate() {
            self.create_write_packets(target, value, seq_id, order as u16, &mut packets);
        }
        self.pending_data_requests += packets.len();
        self.requested_stores.insert(
            seq_id,
            StoreTracking {
                remaining: packets.len() as u16,
                failed: false,
                cond_uop,
            },
        );
        self.queued_stores.push_back(packets);
        true
    }

    /// Issues an untimed write immediately (exception-handler state changes).
    pub fn write_untimed(&mut self, vaddr: u64, data: RegisterValue) {
        let mut packets = Vec::new();
        let target = MemoryTarget {
            vaddr,
            size: data.len() as u16,
        };
        self.create_write_packets(&target, &data, 0, 0, &mut packets);
        self.pending_data_requests += packets.len();
        for mut packet in packets {
            packet.untimed = true;
            self.issue_request(packet);
        }
    }

    /// Issues an untimed, unsplit instruction read.
    ///
    /// Fetch requests are block-aligned, so they never cross a cache line.
    pub fn request_instr_read(&mut self, target: MemoryTarget) {
        debug_assert!(
            self.is_aligned(target.vaddr, target.size),
            "instruction reads must not cross a cache line"
        );
        let packet = MemPacket::instr_read_request(target.vaddr, target.size);
        self.issue_request(packet);
    }

    /// Completed instruction reads since the last clear.
    pub fn completed_instr_reads(&self) -> &[(MemoryTarget, RegisterValue)] {
        &self.completed_instr_reads
    }

    /// Discards delivered instruction reads.
    pub fn clear_completed_instr_reads(&mut self) {
        self.completed_instr_reads.clear();
    }

    /// Whether any data request has not yet produced its response.
    pub fn has_pending_requests(&self) -> bool {
        self.pending_data_requests != 0
    }

    /// Re-issues requests that were parked on a pending translation.
    pub fn supply_delayed_translation(&mut self, vaddr: u64) {
        if let Some(packets) = self.pending_translations.remove(&vaddr) {
            for packet in packets {
                self.issue_request(packet);
            }
        }
    }

    /// Advances the MMU one cycle: sends queued packets within bandwidth,
    /// ticks the backing store, and assembles responses.
    pub fn tick(&mut self, pool: &mut UopPool) {
        if self.exclusive {
            let is_store = !self.queued_stores.is_empty();
            self.send_queued(is_store);
        } else {
            self.send_queued(true);
            self.send_queued(false);
        }

        self.memory.tick();

        while let Some(packet) = self.responses.pop_front() {
            self.receive(packet, pool);
        }
        while let Some(packet) = self.memory.poll() {
            self.receive(packet, pool);
        }
    }

    fn send_queued(&mut self, is_store: bool) {
        let limit = if is_store {
            self.store_bandwidth
        } else {
            self.load_bandwidth
        };
        let mut used = 0u64;
        loop {
            let packet = {
                let queue = if is_store {
                    &mut self.queued_stores
                } else {
                    &mut self.queued_loads
                };
                let Some(group) = queue.front_mut() else { break };
                if group.is_empty() {
                    queue.pop_front();
                    continue;
                }
                if used + group[0].size as u64 > limit {
                    return; // bandwidth exhausted this cycle
                }
                used += group[0].size as u64;
                let packet = group.remove(0);
                if group.is_empty() {
                    queue.pop_front();
                }
                packet
            };
            self.issue_request(packet);
        }
    }

    fn issue_request(&mut self, mut packet: MemPacket) {
        match (self.translator)(packet.vaddr) {
            Translation::Mapped(paddr) => {
                packet.paddr = paddr;
                self.memory.send(packet);
            }
            Translation::DataAbort => {
                packet.faulty = true;
                packet.payload = None;
                self.responses.push_back(packet);
            }
            Translation::Pending => {
                self.pending_translations
                    .entry(packet.vaddr)
                    .or_default()
                    .push(packet);
            }
            Translation::Ignored => {
                packet.ignored = true;
                packet.payload = None;
                self.responses.push_back(packet);
            }
        }
    }

    fn receive(&mut self, packet: MemPacket, pool: &mut UopPool) {
        match packet.kind {
            PacketKind::InstrRead => {
                let value = if packet.faulty || packet.ignored {
                    RegisterValue::empty()
                } else {
                    packet.payload.clone().unwrap_or_default()
                };
                self.completed_instr_reads.push((
                    MemoryTarget {
                        vaddr: packet.vaddr,
                        size: packet.size,
                    },
                    value,
                ));
            }
            PacketKind::Read => {
                self.pending_data_requests = self.pending_data_requests.saturating_sub(1);
                let seq_id = packet.insn_seq_id;
                let Some(tracking) = self.requested_loads.get_mut(&seq_id) else {
                    return;
                };
                tracking.remaining -= 1;
                tracking
                    .responses
                    .insert((packet.packet_order_id, packet.packet_split_id), packet);
                if tracking.remaining == 0 {
                    let tracking = self.requested_loads.remove(&seq_id).expect("tracked load");
                    Self::supply_load_data(tracking, pool);
                }
            }
            PacketKind::Write => {
                self.pending_data_requests = self.pending_data_requests.saturating_sub(1);
                let seq_id = packet.insn_seq_id;
                let Some(tracking) = self.requested_stores.get_mut(&seq_id) else {
                    return;
                };
                tracking.remaining -= 1;
                if packet.faulty {
                    tracking.failed = true;
                }
                if tracking.remaining == 0 {
                    let tracking = self
                        .requested_stores
                        .remove(&seq_id)
                        .expect("tracked store");
                    if let Some(id) = tracking.cond_uop {
                        if let Some(uop) = pool.get_mut(id) {
                            uop.cond_result_ready = true;
                            if !uop.results.is_empty() {
                                uop.results[0] =
                                    RegisterValue::from_u64(u64::from(!tracking.failed));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Merges a completed load's split responses and supplies its uop.
    fn supply_load_data(tracking: LoadTracking, pool: &mut UopPool) {
        let Some(uop) = pool.get_mut(tracking.uop) else {
            return; // squashed while the request was in flight
        };
        if uop.flushed {
            return;
        }

        let mut by_order: BTreeMap<u16, Vec<&MemPacket>> = BTreeMap::new();
        for ((order, _split), packet) in &tracking.responses {
            by_order.entry(*order).or_default().push(packet);
        }
        for packets in by_order.values() {
            let addr = packets[0].vaddr;
            let mut merged = RegisterValue::empty();
            let mut faulty = false;
            for packet in packets {
                if packet.faulty || packet.ignored {
                    faulty = true;
                    break;
                }
                merged.append(packet.payload.as_ref().expect("read response payload"));
            }
            let value = if faulty { RegisterValue::empty() } else { merged };
            uop.supply_data(addr, value);
        }
    }

    fn down_align(&self, addr: u64) -> u64 {
        addr & !(self.cache_line_width - 1)
    }

    fn is_aligned(&self, vaddr: u64, size: u16) -> bool {
        debug_assert!(size != 0, "zero-size memory target");
        self.down_align(vaddr) == self.down_align(vaddr + size as u64 - 1)
    }

    fn create_read_packets(
        &self,
        target: &MemoryTarget,
        seq_id: u64,
        order: u16,
        out: &mut Vec<MemPacket>,
    ) {
        if self.is_aligned(target.vaddr, target.size) {
            out.push(MemPacket::read_request(target.vaddr, target.size, seq_id, order));
            return;
        }
        let mut next = target.vaddr;
        let mut remaining = target.size as u64;
        let mut split = 0;
        while remaining != 0 {
            let line_end = self.down_align(next) + self.cache_line_width;
            let size = (line_end - next).min(remaining) as u16;
            let mut packet = MemPacket::read_request(next, size, seq_id, order);
            packet.packet_split_id = split;
            out.push(packet);
            next += size as u64;
            remaining -= size as u64;
            split += 1;
        }
    }

    fn create_write_packets(
        &self,
        target: &MemoryTarget,
        data: &RegisterValue,
        seq_id: u64,
        order: u16,
        out: &mut Vec<MemPacket>,
    ) {
        if self.is_aligned(target.vaddr, target.size) {
            out.push(MemPacket::write_request(
                target.vaddr,
                target.size,
                seq_id,
                order,
                data.clone(),
            ));
            return;
        }
        let bytes = data.bytes();
        let mut next = target.vaddr;
        let mut remaining = target.size as u64;
        let mut offset = 0usize;
        let mut split = 0;
        while remaining != 0 {
            let line_end = self.down_align(next) + self.cache_line_width;
            let size = (line_end - next).min(remaining) as u16;
            let end = (offset + size as usize).min(bytes.len());
            let chunk = RegisterValue::new(bytes[offset..end].to_vec());
            let mut packet = MemPacket::write_request(next, size, seq_id, order, chunk);
            packet.packet_split_id = split;
            out.push(packet);
            next += size as u64;
            remaining -= size as u64;
            offset = end;
            split += 1;
        }
    }
}
