//! Tickable pipeline buffer.
//!
//! A two-stage latch: producers write the tail slots, consumers read the head
//! slots, and `tick` swaps the two so values take exactly one cycle to cross.
//! A stalled buffer keeps both rows in place until the stall clears.

/// Inter-stage buffer with `width` slots per row.
pub struct PipelineBuffer<T> {
    slots: Vec<Option<T>>,
    width: usize,
    head_is_start: bool,
    stalled: bool,
}

impl<T> PipelineBuffer<T> {
    /// Creates an empty buffer with `width` slots per row.
    pub fn new(width: usize) -> Self {
        let mut slots = Vec::with_capacity(width * 2);
        slots.resize_with(width * 2, || None);
        Self {
            slots,
            width,
            head_is_start: false,
            stalled: false,
        }
    }

    /// Swaps head and tail rows, unless stalled.
    pub fn tick(&mut self) {
        if self.stalled {
            return;
        }
        self.head_is_start = !self.head_is_start;
    }

    /// Slots the consumer reads this cycle.
    pub fn head_slots(&self) -> &[Option<T>] {
        let offset = usize::from(!self.head_is_start) * self.width;
        &self.slots[offset..offset + self.width]
    }

    /// Mutable access to the head row (consumers clear processed slots).
    pub fn head_slots_mut(&mut self) -> &mut [Option<T>] {
        let offset = usize::from(!self.head_is_start) * self.width;
        &mut self.slots[offset..offset + self.width]
    }

    /// Slots the producer writes this cycle.
    pub fn tail_slots_mut(&mut self) -> &mut [Option<T>] {
        let offset = usize::from(self.head_is_start) * self.width;
        &mut self.slots[offset..offset + self.width]
    }

    /// Whether the buffer is stalled.
    #[inline]
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Sets the stall flag.
    pub fn stall(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    /// Clears every slot in both rows.
    pub fn fill_none(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Whether both rows are empty.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    /// Slot count per row.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Empties both rows, returning every held value.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.slots.iter_mut().filter_map(|s| s.take()).collect()
    }
}
