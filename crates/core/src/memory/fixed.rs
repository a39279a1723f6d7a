//! Flat fixed-latency backing store.
//!
//! Serves every request after a constant delay; untimed requests complete on
//! the next tick. This is the bundled `Memory` implementation for tests and
//! the CLI; a cache hierarchy would slot in behind the same trait.

use std::collections::VecDeque;

use crate::common::RegisterValue;

use super::packet::MemPacket;
use super::Memory;

/// Fixed-latency flat RAM.
pub struct FixedLatencyMemory {
    ram: Vec<u8>,
    latency: u64,
    ticks: u64,
    inflight: VecDeque<(u64, MemPacket)>,
    completed: VecDeque<MemPacket>,
}

impl FixedLatencyMemory {
    /// Creates `size` bytes of zeroed RAM with the given access latency.
    pub fn new(size: usize, latency: u64) -> Self {
        Self {
            ram: vec![0; size],
            latency,
            ticks: 0,
            inflight: VecDeque::new(),
            completed: VecDeque::new(),
        }
    }

    /// Copies `bytes` into RAM at `addr`. Used for program/data loading.
    pub fn write_block(&mut self, addr: u64, bytes: &[u8]) {
        let start = addr as usize;
        let end = (start + bytes.len()).min(self.ram.len());
        if start < end {
            self.ram[start..end].copy_from_slice(&bytes[..end - start]);
        }
    }

    /// Reads `size` bytes at `addr`. Out-of-range reads return zeros.
    pub fn read_block(&self, addr: u64, size: usize) -> Vec<u8> {
        let mut out = vec![0u8; size];
        let start = addr as usize;
        if start < self.ram.len() {
            let end = (start + size).min(self.ram.len());
            out[..end - start].copy_from_slice(&self.ram[start..end]);
        }
        out
    }

    fn perform(&mut self, mut packet: MemPacket) -> MemPacket {
        if packet.is_write() {
            let payload = packet.payload.take().unwrap_or_default();
            let bytes = payload.bytes();
            let start = packet.paddr as usize;
            let end = (start + packet.size as usize).min(self.ram.len());
            if start < end {
                let n = end - start;
                self.ram[start..end].copy_from_slice(&bytes[..n.min(bytes.len())]);
            }
        } else {
            let data = self.read_block(packet.paddr, packet.size as usize);
            packet.payload = Some(RegisterValue::new(data));
        }
        packet
    }
}

impl Memory for FixedLatencyMemory {
    fn send(&mut self, packet: MemPacket) {
        let delay = if packet.untimed { 0 } else { self.latency };
        self.inflight.push_back((self.ticks + delay, packet));
    }

    fn tick(&mut self) {
        self.ticks += 1;
        while let Some((due, _)) = self.inflight.front() {
            if *due > self.ticks {
                break;
            }
            let (_, packet) = self.inflight.pop_front().expect("due entry");
            let response = self.perform(packet);
            self.completed.push_back(response);
        }
    }

    fn poll(&mut self) -> Option<MemPacket> {
        self.completed.pop_front()
    }
}
