//! Micro-op record and the generational in-flight pool.
//!
//! A micro-op (uop) is the unit of work flowing through the pipeline. Uops are
//! shared between the fetch/decode buffers, reservation stations, reorder
//! buffer, load/store queue, and execution pipelines; rather than reference
//! counting, all of them live in a single `UopPool` slab and every container
//! holds a copyable `UopId`. Retiring or squashing a uop frees its slot and
//! bumps the slot generation, so stale handles resolve to `None` and read as
//! "gone" everywhere.

pub mod op;

pub use op::Op;

use serde::Deserialize;

use crate::branch::BranchPrediction;
use crate::common::{ExceptionKind, Register, RegisterValue};
use crate::memory::MemoryTarget;

/// Instruction classification used for port binding and latency lookup.
///
/// Groups form a hierarchy (`IntSimple` ⊂ `Int` ⊂ `All`); latency table
/// entries naming a parent group apply to all of its children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstructionGroup {
    /// Every instruction.
    All,
    /// Integer operations (simple and multiply).
    Int,
    /// Single-cycle integer ALU operations.
    IntSimple,
    /// Integer multiply operations.
    IntMul,
    /// Memory loads.
    Load,
    /// Memory stores (address and data micro-ops).
    Store,
    /// Branches and jumps.
    Branch,
    /// System operations (supervisor calls, halts).
    System,
}

impl InstructionGroup {
    /// Returns the parent group, or `None` for the root.
    pub fn parent(self) -> Option<InstructionGroup> {
        match self {
            InstructionGroup::All => None,
            InstructionGroup::Int
            | InstructionGroup::Load
            | InstructionGroup::Store
            | InstructionGroup::Branch
            | InstructionGroup::System => Some(InstructionGroup::All),
            InstructionGroup::IntSimple | InstructionGroup::IntMul => Some(InstructionGroup::Int),
        }
    }

    /// Iterates this group and its ancestors, most specific first.
    pub fn self_and_ancestors(self) -> impl Iterator<Item = InstructionGroup> {
        std::iter::successors(Some(self), |g| g.parent())
    }
}

/// A single micro-op in flight.
#[derive(Clone, Debug)]
pub struct Uop {
    /// Macro-op order identifier, assigned at fetch. Stable across uop splits.
    pub insn_id: u64,
    /// Total uop program order, assigned when the reorder buffer reserves a slot.
    pub seq_id: u64,
    /// Address of the instruction this uop was cracked from.
    pub address: u64,
    /// The decoded operation.
    pub op: Op,
    /// Group tag for port binding and latency classification.
    pub group: InstructionGroup,
    /// Index of this uop within its macro-op. Store-data uops share the index
    /// of their address uop so the load/store queue can pair them.
    pub micro_idx: u8,
    /// Whether this is the last uop of its macro-op (retire counting).
    pub micro_last: bool,
    /// Source registers. Architectural at decode, physical after rename.
    pub sources: Vec<Register>,
    /// Destination registers. Architectural at decode, physical after rename.
    pub destinations: Vec<Register>,
    /// Supplied operand values; `Some` doubles as the per-source ready bit.
    pub operands: Vec<Option<RegisterValue>>,
    /// Result values, one per destination, filled by `execute`.
    pub results: Vec<RegisterValue>,
    /// Memory targets, generated at address-compute time.
    pub targets: Vec<MemoryTarget>,
    /// Memory data, one slot per target (load responses or store payloads).
    pub data: Vec<Option<RegisterValue>>,
    /// Issue ports that can execute this uop.
    pub supported_ports: Vec<usize>,
    /// Branch prediction attached at fetch.
    pub prediction: BranchPrediction,
    /// Resolved branch direction (valid once executed).
    pub branch_taken: bool,
    /// Resolved branch target (valid once executed).
    pub branch_target: u64,
    /// Exception raised by this uop, if any.
    pub exception: Option<ExceptionKind>,
    /// Set once the uop has been issued to an execution pipeline.
    pub issued: bool,
    /// Set once the uop has executed (results/addresses are valid).
    pub executed: bool,
    /// Set once results have been written back (micro-op commit gate).
    pub written_back: bool,
    /// Set once the reorder buffer may retire this uop.
    pub commit_ready: bool,
    /// Set when a flush squashed this uop.
    pub flushed: bool,
    /// Conditional store marker.
    pub store_cond: bool,
    /// Whether a conditional store's success result has arrived.
    pub cond_result_ready: bool,
}

impl Uop {
    /// Creates a uop for `op` at `address` with the given register lists.
    pub fn new(
        address: u64,
        op: Op,
        group: InstructionGroup,
        sources: Vec<Register>,
        destinations: Vec<Register>,
    ) -> Self {
        let operands = vec![None; sources.len()];
        let results = vec![RegisterValue::empty(); destinations.len()];
        Self {
            insn_id: 0,
            seq_id: 0,
            address,
            op,
            group,
            micro_idx: 0,
            micro_last: true,
            sources,
            destinations,
            operands,
            results,
            targets: Vec::new(),
            data: Vec::new(),
            supported_ports: Vec::new(),
            prediction: BranchPrediction::not_taken(),
            branch_taken: false,
            branch_target: 0,
            exception: None,
            issued: false,
            executed: false,
            written_back: false,
            commit_ready: false,
            flushed: false,
            store_cond: false,
            cond_result_ready: false,
        }
    }

    /// Returns true if this uop loads from memory.
    #[inline]
    pub fn is_load(&self) -> bool {
        matches!(self.op, Op::Load { .. })
    }

    /// Returns true if this is a store-address uop (owns the store queue entry).
    #[inline]
    pub fn is_store_address(&self) -> bool {
        matches!(self.op, Op::StoreAddress { .. })
    }

    /// Returns true if this is a store-data uop.
    #[inline]
    pub fn is_store_data(&self) -> bool {
        matches!(self.op, Op::StoreData)
    }

    /// Returns true if this uop is a branch or jump.
    #[inline]
    pub fn is_branch(&self) -> bool {
        matches!(self.op, Op::BranchEq { .. } | Op::BranchNe { .. } | Op::Jump { .. })
    }

    /// Supplies the value for operand `index`.
    pub fn supply_operand(&mut self, index: usize, value: RegisterValue) {
        debug_assert!(self.operands[index].is_none(), "operand supplied twice");
        self.operands[index] = Some(value);
    }

    /// Returns whether operand `index` has been supplied.
    #[inline]
    pub fn operand_ready(&self, index: usize) -> bool {
        self.operands[index].is_some()
    }

    /// Returns whether every source operand has been supplied.
    pub fn can_execute(&self) -> bool {
        self.operands.iter().all(|o| o.is_some())
    }

    /// Supplies memory data for the target starting at `vaddr`.
    ///
    /// An invalid (empty) value records a data abort for that target.
    pub fn supply_data(&mut self, vaddr: u64, value: RegisterValue) {
        for (i, target) in self.targets.iter().enumerate() {
            if target.vaddr == vaddr {
                self.data[i] = Some(value);
                return;
            }
        }
        debug_assert!(false, "no memory target at {:#x}", vaddr);
    }

    /// Returns whether all requested memory data has arrived.
    pub fn has_all_data(&self) -> bool {
        !self.data.is_empty() && self.data.iter().all(|d| d.is_some())
    }

    /// Was the attached prediction wrong? Valid only once executed.
    pub fn mispredicted(&self) -> bool {
        debug_assert!(self.executed, "misprediction queried before execution");
        if self.prediction.taken != self.branch_taken {
            return true;
        }
        self.branch_taken && self.prediction.target != self.branch_target
    }
}

/// Handle to a uop in the pool. Stale handles resolve to `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UopId {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    uop: Option<Uop>,
}

/// Generational slab holding every in-flight uop.
pub struct UopPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Default for UopPool {
    fn default() -> Self {
        Self::new()
    }
}

impl UopPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Inserts a uop and returns its handle.
    pub fn insert(&mut self, uop: Uop) -> UopId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.uop = Some(uop);
            UopId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                uop: Some(uop),
            });
            UopId {
                index,
                generation: 0,
            }
        }
    }

    /// Resolves a handle. `None` means the uop has retired or been squashed.
    pub fn get(&self, id: UopId) -> Option<&Uop> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.uop.as_ref()
    }

    /// Resolves a handle mutably.
    pub fn get_mut(&mut self, id: UopId) -> Option<&mut Uop> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.uop.as_mut()
    }

    /// Frees a slot, invalidating all copies of its handle.
    pub fn remove(&mut self, id: UopId) -> Option<Uop> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let uop = slot.uop.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(uop)
    }

    /// Returns the number of live uops.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no uops are in flight.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns true if the handle is live and its uop is flushed, or the
    /// handle is dead. Containers use this to drop squashed entries.
    pub fn is_gone(&self, id: UopId) -> bool {
        match self.get(id) {
            Some(uop) => uop.flushed,
            None => true,
        }
    }
}
