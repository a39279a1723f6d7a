//! Configuration system for the out-of-order core simulator.
//!
//! This module defines all configuration structures and enums used to
//! parameterize the simulator. It provides:
//! 1. **Defaults:** A small but fully out-of-order baseline machine.
//! 2. **Structures:** Hierarchical config for the core, frontend, queues,
//!    register files, issue ports, execution units, and the memory interface.
//! 3. **Lookup:** Group-inheriting latency resolution and port binding.
//!
//! Configuration is supplied as JSON (field names match the simulator's
//! hierarchical option tree, e.g. `Pipeline-Widths.FrontEnd`) or built
//! programmatically from `Config::default()`.

use serde::Deserialize;

use crate::common::reg::RegisterFileKind;
use crate::uop::InstructionGroup;

/// Default configuration constants.
mod defaults {
    /// Instructions fetched, decoded, and renamed per cycle.
    pub const FRONTEND_WIDTH: usize = 2;

    /// Instructions committed from the reorder buffer per cycle.
    pub const COMMIT_WIDTH: usize = 2;

    /// Per-reservation-station dispatches per cycle.
    pub const DISPATCH_RATE: usize = 2;

    /// Load/store queue completion slots feeding writeback.
    pub const LSQ_COMPLETION_WIDTH: usize = 1;

    /// Reorder buffer capacity.
    pub const ROB_SIZE: usize = 32;

    /// Load queue capacity.
    pub const LOAD_QUEUE_SIZE: usize = 8;

    /// Store queue capacity.
    pub const STORE_QUEUE_SIZE: usize = 8;

    /// Physical general-purpose registers.
    pub const GP_COUNT: u16 = 64;

    /// Physical condition-flag registers.
    pub const CONDITIONAL_COUNT: u16 = 8;

    /// Fetch block size in bytes. Must be a power of two.
    pub const FETCH_BLOCK_SIZE: u64 = 16;

    /// Loop buffer capacity in macro-ops.
    pub const LOOP_BUFFER_SIZE: usize = 32;

    /// Contiguous retirements of the same branch before loop mode engages.
    pub const LOOP_DETECTION_THRESHOLD: u64 = 5;

    /// Cache line width in bytes; memory requests never cross a line.
    pub const CACHE_LINE_WIDTH: u64 = 64;

    /// Load bandwidth in bytes per cycle.
    pub const LOAD_BANDWIDTH: u64 = 32;

    /// Store bandwidth in bytes per cycle.
    pub const STORE_BANDWIDTH: u64 = 32;

    /// Total memory requests accepted per cycle.
    pub const REQUEST_LIMIT: usize = 2;

    /// Load requests accepted per cycle.
    pub const LOAD_REQUEST_LIMIT: usize = 2;

    /// Store requests accepted per cycle.
    pub const STORE_REQUEST_LIMIT: usize = 1;

    /// Cycles between load request and response in the LSQ schedule.
    pub const LOAD_LATENCY: u64 = 1;

    /// Branch target buffer index bits (2^n entries).
    pub const BTB_TAG_BITS: u32 = 8;

    /// Saturating counter width in bits.
    pub const SATURATING_COUNT_BITS: u32 = 2;

    /// Global history length (reserved for richer predictors).
    pub const GLOBAL_HISTORY_LENGTH: u32 = 8;

    /// Return address stack entries (reserved for richer predictors).
    pub const RAS_ENTRIES: u32 = 8;
}

/// Instruction set architecture selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
pub enum Isa {
    /// 64-bit Arm.
    AArch64,
    /// 64-bit RISC-V.
    #[default]
    RV64,
}

/// Core simulation model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// Pure emulation, no timing.
    Emulation,
    /// Simple in-order pipeline.
    InOrderPipelined,
    /// Out-of-order superscalar pipeline (the model this crate implements).
    #[default]
    OutOfOrder,
}

/// `Core` section: ISA and simulation model selection.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Target instruction set.
    #[serde(rename = "ISA")]
    pub isa: Isa,
    /// Simulation model to run.
    #[serde(rename = "Simulation-Mode")]
    pub simulation_mode: SimulationMode,
    /// Streaming vector length in bits; must be a multiple of 128.
    #[serde(rename = "Streaming-Vector-Length")]
    pub streaming_vector_length: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            isa: Isa::RV64,
            simulation_mode: SimulationMode::OutOfOrder,
            streaming_vector_length: 128,
        }
    }
}

/// `Fetch` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Bytes fetched per instruction-memory request. Power of two.
    #[serde(rename = "Fetch-Block-Size")]
    pub fetch_block_size: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fetch_block_size: defaults::FETCH_BLOCK_SIZE,
        }
    }
}

/// `Pipeline-Widths` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PipelineWidths {
    /// Reorder buffer commits per cycle.
    #[serde(rename = "Commit")]
    pub commit: usize,
    /// Dispatches per reservation station per cycle.
    #[serde(rename = "Dispatch-Rate")]
    pub dispatch_rate: usize,
    /// Fetch/decode/rename width.
    #[serde(rename = "FrontEnd")]
    pub front_end: usize,
    /// Load/store queue completion slots.
    #[serde(rename = "LSQ-Completion")]
    pub lsq_completion: usize,
}

impl Default for PipelineWidths {
    fn default() -> Self {
        Self {
            commit: defaults::COMMIT_WIDTH,
            dispatch_rate: defaults::DISPATCH_RATE,
            front_end: defaults::FRONTEND_WIDTH,
            lsq_completion: defaults::LSQ_COMPLETION_WIDTH,
        }
    }
}

/// `Queue-Sizes` section.
///
/// Setting `LSQ` selects a combined load/store queue with one shared
/// capacity; otherwise `Load` and `Store` size two split queues.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QueueSizes {
    /// Reorder buffer entries.
    #[serde(rename = "ROB")]
    pub rob: usize,
    /// Load queue entries (split configuration).
    #[serde(rename = "Load")]
    pub load: usize,
    /// Store queue entries (split configuration).
    #[serde(rename = "Store")]
    pub store: usize,
    /// Combined load/store queue entries, if used.
    #[serde(rename = "LSQ")]
    pub combined: Option<usize>,
}

impl Default for QueueSizes {
    fn default() -> Self {
        Self {
            rob: defaults::ROB_SIZE,
            load: defaults::LOAD_QUEUE_SIZE,
            store: defaults::STORE_QUEUE_SIZE,
            combined: None,
        }
    }
}

/// `Register-Set` section: physical register quantities per file.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RegisterSet {
    /// Physical general-purpose registers.
    #[serde(rename = "GeneralPurpose-Count")]
    pub general_purpose_count: u16,
    /// Physical floating-point registers.
    #[serde(rename = "FloatingPoint-Count")]
    pub floating_point_count: u16,
    /// Physical vector registers.
    #[serde(rename = "Vector-Count")]
    pub vector_count: u16,
    /// Physical predicate registers.
    #[serde(rename = "Predicate-Count")]
    pub predicate_count: u16,
    /// Physical condition-flag registers.
    #[serde(rename = "Conditional-Count")]
    pub conditional_count: u16,
    /// Physical matrix registers.
    #[serde(rename = "Matrix-Count")]
    pub matrix_count: u16,
}

impl Default for RegisterSet {
    fn default() -> Self {
        Self {
            general_purpose_count: defaults::GP_COUNT,
            floating_point_count: 0,
            vector_count: 0,
            predicate_count: 0,
            conditional_count: defaults::CONDITIONAL_COUNT,
            matrix_count: 0,
        }
    }
}

impl RegisterSet {
    /// Configured physical quantity for a register file kind.
    ///
    /// The system file is not configurable; its size follows the
    /// architecture's declared register count.
    pub fn count(&self, kind: RegisterFileKind) -> u16 {
        match kind {
            RegisterFileKind::GeneralPurpose => self.general_purpose_count,
            RegisterFileKind::FloatingPoint => self.floating_point_count,
            RegisterFileKind::Vector => self.vector_count,
            RegisterFileKind::Predicate => self.predicate_count,
            RegisterFileKind::Conditional => self.conditional_count,
            RegisterFileKind::Matrix => self.matrix_count,
            RegisterFileKind::System => 0,
        }
    }
}

/// One `Reservation-Stations` entry.
#[derive(Clone, Debug, Deserialize)]
pub struct ReservationStationConfig {
    /// Station capacity in uops.
    #[serde(rename = "Size")]
    pub size: usize,
    /// Dispatches into this station per cycle.
    #[serde(rename = "Dispatch-Rate")]
    pub dispatch_rate: usize,
    /// Issue ports bound to this station.
    #[serde(rename = "Ports")]
    pub ports: Vec<usize>,
}

/// One `Ports` entry.
#[derive(Clone, Debug, Deserialize)]
pub struct PortConfig {
    /// Human-readable port name.
    #[serde(rename = "Portname")]
    pub portname: String,
    /// Instruction groups this port can execute.
    #[serde(rename = "Instruction-Group-Support", default)]
    pub instruction_group_support: Vec<InstructionGroup>,
    /// Extra opcode mnemonics this port can execute.
    #[serde(rename = "Instruction-Opcode-Support", default)]
    pub instruction_opcode_support: Vec<String>,
}

/// One `Execution-Units` entry. Units pair 1:1 with ports.
#[derive(Clone, Debug, Deserialize)]
pub struct ExecutionUnitConfig {
    /// Whether the unit accepts a new uop while older ones are in flight.
    #[serde(rename = "Pipelined")]
    pub pipelined: bool,
    /// Groups that occupy the unit for their full latency even when pipelined.
    #[serde(rename = "Blocking-Groups", default)]
    pub blocking_groups: Vec<InstructionGroup>,
}

/// One `Latencies` entry.
#[derive(Clone, Debug, Deserialize)]
pub struct LatencyConfig {
    /// Groups this entry applies to (children inherit from parents).
    #[serde(rename = "Instruction-Group", default)]
    pub instruction_groups: Vec<InstructionGroup>,
    /// Opcode mnemonics this entry applies to. Opcode matches win over groups.
    #[serde(rename = "Instruction-Opcode", default)]
    pub instruction_opcodes: Vec<String>,
    /// Cycles from issue to result.
    #[serde(rename = "Execution-Latency")]
    pub execution_latency: u64,
    /// Cycles before another uop of the same group may issue.
    #[serde(rename = "Execution-Throughput")]
    pub execution_throughput: u64,
}

/// `LSQ-Memory-Interface` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LsqMemoryInterface {
    /// Load bytes the MMU accepts per cycle.
    #[serde(rename = "Load-Bandwidth")]
    pub load_bandwidth: u64,
    /// Store bytes the MMU accepts per cycle.
    #[serde(rename = "Store-Bandwidth")]
    pub store_bandwidth: u64,
    /// Total in-flight instruction requests the MMU tracks at once.
    #[serde(rename = "Permitted-Requests-Per-Cycle")]
    pub permitted_requests_per_cycle: usize,
    /// Load instruction requests tracked at once.
    #[serde(rename = "Permitted-Loads-Per-Cycle")]
    pub permitted_loads_per_cycle: usize,
    /// Store instruction requests tracked at once.
    #[serde(rename = "Permitted-Stores-Per-Cycle")]
    pub permitted_stores_per_cycle: usize,
    /// Whether loads and stores may never be in flight simultaneously.
    #[serde(rename = "Exclusive")]
    pub exclusive: bool,
    /// Cycles between address resolution and the load request firing.
    #[serde(rename = "Load-Latency")]
    pub load_latency: u64,
}

impl Default for LsqMemoryInterface {
    fn default() -> Self {
        Self {
            load_bandwidth: defaults::LOAD_BANDWIDTH,
            store_bandwidth: defaults::STORE_BANDWIDTH,
            permitted_requests_per_cycle: defaults::REQUEST_LIMIT,
            permitted_loads_per_cycle: defaults::LOAD_REQUEST_LIMIT,
            permitted_stores_per_cycle: defaults::STORE_REQUEST_LIMIT,
            exclusive: false,
            load_latency: defaults::LOAD_LATENCY,
        }
    }
}

/// `Memory-Hierarchy` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MemoryHierarchy {
    /// Cache line width in bytes; requests crossing a line are split.
    #[serde(rename = "Cache-Line-Width")]
    pub cache_line_width: u64,
}

impl Default for MemoryHierarchy {
    fn default() -> Self {
        Self {
            cache_line_width: defaults::CACHE_LINE_WIDTH,
        }
    }
}

/// Branch predictor implementation selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
pub enum BranchPredictorKind {
    /// Static fallback (always not-taken).
    Static,
    /// BTB + saturating-counter bimodal predictor.
    #[default]
    Bimodal,
}

/// `Branch-Predictor` section.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BranchPredictorConfig {
    /// Predictor implementation.
    #[serde(rename = "Type")]
    pub kind: BranchPredictorKind,
    /// BTB index width (2^n entries).
    #[serde(rename = "BTB-Tag-Bits")]
    pub btb_tag_bits: u32,
    /// Saturating counter width in bits.
    #[serde(rename = "Saturating-Count-Bits")]
    pub saturating_count_bits: u32,
    /// Global history length in branches.
    #[serde(rename = "Global-History-Length")]
    pub global_history_length: u32,
    /// Return address stack entries.
    #[serde(rename = "RAS-entries")]
    pub ras_entries: u32,
    /// Fallback direction when no dynamic state exists.
    #[serde(rename = "Fallback-Static-Predictor")]
    pub fallback_static_predictor: String,
    /// Loop buffer capacity in macro-ops.
    #[serde(rename = "Loop-Buffer-Size")]
    pub loop_buffer_size: usize,
    /// Contiguous retirements of one branch before loop mode engages.
    #[serde(rename = "Loop-Detection-Threshold")]
    pub loop_detection_threshold: u64,
}

impl Default for BranchPredictorConfig {
    fn default() -> Self {
        Self {
            kind: BranchPredictorKind::Bimodal,
            btb_tag_bits: defaults::BTB_TAG_BITS,
            saturating_count_bits: defaults::SATURATING_COUNT_BITS,
            global_history_length: defaults::GLOBAL_HISTORY_LENGTH,
            ras_entries: defaults::RAS_ENTRIES,
            fallback_static_predictor: "Always-Not-Taken".to_string(),
            loop_buffer_size: defaults::LOOP_BUFFER_SIZE,
            loop_detection_threshold: defaults::LOOP_DETECTION_THRESHOLD,
        }
    }
}

/// `CPU-Info` section.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CpuInfo {
    /// Whether to generate a special CPU info directory for the simulated OS.
    #[serde(rename = "Generate-Special-Dir")]
    pub generate_special_dir: bool,
}

/// Root configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ISA and simulation model.
    #[serde(rename = "Core")]
    pub core: CoreConfig,
    /// Fetch unit parameters.
    #[serde(rename = "Fetch")]
    pub fetch: FetchConfig,
    /// Per-stage widths.
    #[serde(rename = "Pipeline-Widths")]
    pub pipeline_widths: PipelineWidths,
    /// ROB and load/store queue capacities.
    #[serde(rename = "Queue-Sizes")]
    pub queue_sizes: QueueSizes,
    /// Physical register quantities.
    #[serde(rename = "Register-Set")]
    pub register_set: RegisterSet,
    /// Reservation stations and their port bindings.
    #[serde(rename = "Reservation-Stations")]
    pub reservation_stations: Vec<ReservationStationConfig>,
    /// Issue ports.
    #[serde(rename = "Ports")]
    pub ports: Vec<PortConfig>,
    /// Execution units, one per port.
    #[serde(rename = "Execution-Units")]
    pub execution_units: Vec<ExecutionUnitConfig>,
    /// Per-group and per-opcode execution latencies.
    #[serde(rename = "Latencies")]
    pub latencies: Vec<LatencyConfig>,
    /// MMU bandwidth and request limits.
    #[serde(rename = "LSQ-Memory-Interface")]
    pub lsq_memory_interface: LsqMemoryInterface,
    /// Memory hierarchy geometry.
    #[serde(rename = "Memory-Hierarchy")]
    pub memory_hierarchy: MemoryHierarchy,
    /// Branch predictor parameters.
    #[serde(rename = "Branch-Predictor")]
    pub branch_predictor: BranchPredictorConfig,
    /// Simulated-OS CPU info options.
    #[serde(rename = "CPU-Info")]
    pub cpu_info: CpuInfo,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            fetch: FetchConfig::default(),
            pipeline_widths: PipelineWidths::default(),
            queue_sizes: QueueSizes::default(),
            register_set: RegisterSet::default(),
            reservation_stations: vec![
                ReservationStationConfig {
                    size: 16,
                    dispatch_rate: defaults::DISPATCH_RATE,
                    ports: vec![0, 1],
                },
                ReservationStationConfig {
                    size: 8,
                    dispatch_rate: defaults::DISPATCH_RATE,
                    ports: vec![2, 3],
                },
            ],
            ports: vec![
                PortConfig {
                    portname: "INT0".to_string(),
                    instruction_group_support: vec![
                        InstructionGroup::Int,
                        InstructionGroup::System,
                    ],
                    instruction_opcode_support: Vec::new(),
                },
                PortConfig {
                    portname: "INT1-BR".to_string(),
                    instruction_group_support: vec![
                        InstructionGroup::Int,
                        InstructionGroup::Branch,
                    ],
                    instruction_opcode_support: Vec::new(),
                },
                PortConfig {
                    portname: "LD".to_string(),
                    instruction_group_support: vec![InstructionGroup::Load],
                    instruction_opcode_support: Vec::new(),
                },
                PortConfig {
                    portname: "ST".to_string(),
                    instruction_group_support: vec![InstructionGroup::Store],
                    instruction_opcode_support: Vec::new(),
                },
            ],
            execution_units: vec![
                ExecutionUnitConfig {
                    pipelined: true,
                    blocking_groups: Vec::new(),
                },
                ExecutionUnitConfig {
                    pipelined: true,
                    blocking_groups: Vec::new(),
                },
                ExecutionUnitConfig {
                    pipelined: true,
                    blocking_groups: Vec::new(),
                },
                ExecutionUnitConfig {
                    pipelined: true,
                    blocking_groups: Vec::new(),
                },
            ],
            latencies: vec![LatencyConfig {
                instruction_groups: vec![InstructionGroup::IntMul],
                instruction_opcodes: Vec::new(),
                execution_latency: 3,
                execution_throughput: 1,
            }],
            lsq_memory_interface: LsqMemoryInterface::default(),
            memory_hierarchy: MemoryHierarchy::default(),
            branch_predictor: BranchPredictorConfig::default(),
            cpu_info: CpuInfo::default(),
        }
    }
}

impl Config {
    /// Checks structural constraints the pipeline relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.core.simulation_mode != SimulationMode::OutOfOrder {
            return Err("only the out-of-order simulation mode is supported".to_string());
        }
        if !self.fetch.fetch_block_size.is_power_of_two() {
            return Err(format!(
                "Fetch.Fetch-Block-Size must be a power of two, got {}",
                self.fetch.fetch_block_size
            ));
        }
        if self.core.streaming_vector_length % 128 != 0 {
            return Err(format!(
                "Core.Streaming-Vector-Length must be a multiple of 128, got {}",
                self.core.streaming_vector_length
            ));
        }
        if self.ports.is_empty() {
            return Err("at least one issue port is required".to_string());
        }
        if self.execution_units.len() != self.ports.len() {
            return Err(format!(
                "Execution-Units entries ({}) must match Ports entries ({})",
                self.execution_units.len(),
                self.ports.len()
            ));
        }
        let mut bound = vec![false; self.ports.len()];
        for (i, rs) in self.reservation_stations.iter().enumerate() {
            if rs.size == 0 || rs.dispatch_rate == 0 {
                return Err(format!("Reservation-Stations[{}] sizes must be non-zero", i));
            }
            for &port in &rs.ports {
                if port >= self.ports.len() {
                    return Err(format!(
                        "Reservation-Stations[{}] binds unknown port {}",
                        i, port
                    ));
                }
                if bound[port] {
                    return Err(format!("port {} bound to more than one station", port));
                }
                bound[port] = true;
            }
        }
        if bound.iter().any(|b| !b) {
            return Err("every port must be bound to a reservation station".to_string());
        }
        if self.queue_sizes.rob == 0 {
            return Err("Queue-Sizes.ROB must be non-zero".to_string());
        }
        match self.queue_sizes.combined {
            Some(0) => return Err("Queue-Sizes.LSQ must be non-zero".to_string()),
            None if self.queue_sizes.load == 0 || self.queue_sizes.store == 0 => {
                return Err("Queue-Sizes.Load and Queue-Sizes.Store must be non-zero".to_string());
            }
            _ => {}
        }
        if !self.memory_hierarchy.cache_line_width.is_power_of_two() {
            return Err(format!(
                "Memory-Hierarchy.Cache-Line-Width must be a power of two, got {}",
                self.memory_hierarchy.cache_line_width
            ));
        }
        Ok(())
    }

    /// Resolves `(latency, throughput)` for a group/opcode pair.
    ///
    /// Opcode entries take precedence; otherwise the group and its ancestors
    /// are searched most-specific first. Unconfigured operations take 1/1.
    pub fn latency_for(&self, group: InstructionGroup, mnemonic: &str) -> (u64, u64) {
        for entry in &self.latencies {
            if entry.instruction_opcodes.iter().any(|m| m == mnemonic) {
                return (entry.execution_latency, entry.execution_throughput);
            }
        }
        for candidate in group.self_and_ancestors() {
            for entry in &self.latencies {
                if entry.instruction_groups.contains(&candidate) {
                    return (entry.execution_latency, entry.execution_throughput);
                }
            }
        }
        (1, 1)
    }

    /// Returns the issue ports able to execute a group/opcode pair.
    ///
    /// A port supports a uop when it names the uop's group (or an ancestor)
    /// in its group support, or lists the opcode explicitly.
    pub fn supported_ports(&self, group: InstructionGroup, mnemonic: &str) -> Vec<usize> {
        let mut ports = Vec::new();
        for (index, port) in self.ports.iter().enumerate() {
            let by_group = group.self_and_ancestors().any(|candidate| {
                port.instruction_group_support
                    .iter()
                    .any(|&supported| supported == candidate)
            });
            let by_opcode = port.instruction_opcode_support.iter().any(|m| m == mnemonic);
            if by_group || by_opcode {
                ports.push(index);
            }
        }
        ports
    }
}
