//! Memory packet wire format.
//!
//! Requests flow from the LSQ/fetch through the MMU to the backing store;
//! responses echo the identifying fields and add fault/payload state. A
//! single access that crosses a cache line is carried by several packets
//! sharing `packet_order_id` and numbered by `packet_split_id`.

use crate::common::RegisterValue;

/// Request/response direction and class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    /// Data read.
    Read,
    /// Data write.
    Write,
    /// Instruction fetch read.
    InstrRead,
}

/// One memory request or response.
#[derive(Clone, Debug)]
pub struct MemPacket {
    /// Virtual address of the access.
    pub vaddr: u64,
    /// Physical address, filled by translation.
    pub paddr: u64,
    /// Access size in bytes.
    pub size: u16,
    /// Sequence id of the owning instruction.
    pub insn_seq_id: u64,
    /// Index of the memory target within the instruction.
    pub packet_order_id: u16,
    /// Index of this packet within a cache-line split (0 when unsplit).
    pub packet_split_id: u16,
    /// Access class.
    pub kind: PacketKind,
    /// Write payload on requests; read data on responses.
    pub payload: Option<RegisterValue>,
    /// Whether the access is part of an atomic operation.
    pub atomic: bool,
    /// Untimed accesses bypass latency modelling.
    pub untimed: bool,
    /// Set on responses when translation or the access faulted.
    pub faulty: bool,
    /// Set when translation says the access should be silently dropped.
    pub ignored: bool,
}

impl MemPacket {
    /// Creates a data read request.
    pub fn read_request(vaddr: u64, size: u16, insn_seq_id: u64, packet_order_id: u16) -> Self {
        Self {
            vaddr,
            paddr: 0,
            size,
            insn_seq_id,
            packet_order_id,
            packet_split_id: 0,
            kind: PacketKind::Read,
            payload: None,
            atomic: false,
            untimed: false,
            faulty: false,
            ignored: false,
        }
    }

    /// Creates a data write request carrying `payload`.
    pub fn write_request(
        vaddr: u64,
        size: u16,
        insn_seq_id: u64,
        packet_order_id: u16,
        payload: RegisterValue,
    ) -> Self {
        Self {
            vaddr,
            paddr: 0,
            size,
            insn_seq_id,
            packet_order_id,
            packet_split_id: 0,
            kind: PacketKind::Write,
            payload: Some(payload),
            atomic: false,
            untimed: false,
            faulty: false,
            ignored: false,
        }
    }

    /// Creates an untimed instruction read request.
    pub fn instr_read_request(vaddr: u64, size: u16) -> Self {
        Self {
            vaddr,
            paddr: 0,
            size,
            insn_seq_id: 0,
            packet_order_id: 0,
            packet_split_id: 0,
            kind: PacketKind::InstrRead,
            payload: None,
            atomic: false,
            untimed: true,
            faulty: false,
            ignored: false,
        }
    }

    /// Returns true for data reads.
    #[inline]
    pub fn is_read(&self) -> bool {
        self.kind == PacketKind::Read
    }

    /// Returns true for data writes.
    #[inline]
    pub fn is_write(&self) -> bool {
        self.kind == PacketKind::Write
    }

    /// Returns true for instruction reads.
    #[inline]
    pub fn is_instr_read(&self) -> bool {
        self.kind == PacketKind::InstrRead
    }
}
