//! Simulation statistics collection and reporting.
//!
//! The core assembles a `CoreStats` snapshot from its units each time it is
//! asked. It provides:
//! 1. **Headline numbers:** cycles, retired macro-ops, IPC, flushes.
//! 2. **Stall breakdown:** frontend, rename, dispatch, and issue stalls.
//! 3. **Branching:** executed, mispredicted, and the miss rate.
//! 4. **A stable name → string surface** for external reporting.

/// Snapshot of core statistics.
#[derive(Clone, Debug, Default)]
pub struct CoreStats {
    /// Total simulated cycles.
    pub cycles: u64,
    /// Macro-ops retired.
    pub retired: u64,
    /// Pipeline flushes (mispredictions, violations, early redirects).
    pub flushes: u64,
    /// Cycles fetch ended early behind a predicted-taken branch.
    pub fetch_branch_stalls: u64,
    /// Mis-speculations corrected at decode.
    pub decode_early_flushes: u64,
    /// Rename stalls on empty free lists.
    pub rename_allocation_stalls: u64,
    /// Rename stalls on a full reorder buffer.
    pub rename_rob_stalls: u64,
    /// Rename stalls on a full load queue.
    pub rename_lq_stalls: u64,
    /// Rename stalls on a full store queue.
    pub rename_sq_stalls: u64,
    /// Dispatch stalls on a full reservation station.
    pub dispatch_rs_stalls: u64,
    /// Cycles with nothing to issue anywhere.
    pub issue_frontend_stalls: u64,
    /// Cycles with waiting uops but nothing issued.
    pub issue_backend_stalls: u64,
    /// Ready uops held behind a stalled issue port.
    pub issue_port_busy_stalls: u64,
    /// Branches resolved.
    pub branches_executed: u64,
    /// Branches mispredicted.
    pub branches_mispredicted: u64,
    /// Speculative loads caught violating memory order.
    pub lsq_load_violations: u64,
    /// Cycles spent idle.
    pub idle_ticks: u64,
    /// Context switches taken.
    pub context_switches: u64,
}

impl CoreStats {
    /// Instructions per cycle.
    pub fn ipc(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.retired as f64 / self.cycles as f64
        }
    }

    /// Branch misprediction rate in percent.
    pub fn branch_miss_rate(&self) -> f64 {
        if self.branches_executed == 0 {
            0.0
        } else {
            100.0 * self.branches_mispredicted as f64 / self.branches_executed as f64
        }
    }

    /// The stable name → string statistics surface.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("cycles", self.cycles.to_string()),
            ("retired", self.retired.to_string()),
            ("ipc", format!("{:.2}", self.ipc())),
            ("flushes", self.flushes.to_string()),
            ("fetch.branchStalls", self.fetch_branch_stalls.to_string()),
            ("decode.earlyFlushes", self.decode_early_flushes.to_string()),
            (
                "rename.allocationStalls",
                self.rename_allocation_stalls.to_string(),
            ),
            ("rename.robStalls", self.rename_rob_stalls.to_string()),
            ("rename.lqStalls", self.rename_lq_stalls.to_string()),
            ("rename.sqStalls", self.rename_sq_stalls.to_string()),
            ("dispatch.rsStalls", self.dispatch_rs_stalls.to_string()),
            (
                "issue.frontendStalls",
                self.issue_frontend_stalls.to_string(),
            ),
            ("issue.backendStalls", self.issue_backend_stalls.to_string()),
            (
                "issue.portBusyStalls",
                self.issue_port_busy_stalls.to_string(),
            ),
            ("branch.executed", self.branches_executed.to_string()),
            ("branch.mispredict", self.branches_mispredicted.to_string()),
            ("branch.missrate", format!("{:.3}%", self.branch_miss_rate())),
            ("lsq.loadViolations", self.lsq_load_violations.to_string()),
            ("idle.ticks", self.idle_ticks.to_string()),
            ("context.switches", self.context_switches.to_string()),
        ]
    }

    /// Prints all statistics to stdout.
    pub fn print(&self) {
        println!("\n==========================================================");
        println!("OUT-OF-ORDER CORE SIMULATION STATISTICS");
        println!("==========================================================");
        for (name, value) in self.entries() {
            println!("{:<24} {}", name, value);
        }
        println!("==========================================================");
    }
}
