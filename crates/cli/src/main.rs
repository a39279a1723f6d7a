//! Out-of-order core simulator CLI.
//!
//! Runs a raw demo-ISA program image on the out-of-order core model:
//! 1. **Direct run:** Load a binary at address zero and run to the halting
//!    syscall (or a cycle limit).
//! 2. **Configured run:** The same with a JSON configuration file overriding
//!    the default machine.

use clap::{Parser, Subcommand};
use std::{fs, process};

use oocore::arch::demo::{DemoArchitecture, DemoExceptionHandler};
use oocore::memory::{FixedLatencyMemory, Translation};
use oocore::{Config, Core, CoreStatus};

#[derive(Parser, Debug)]
#[command(
    name = "oocore",
    author,
    version,
    about = "Cycle-accurate out-of-order core simulator",
    long_about = "Run a raw demo-ISA binary on the out-of-order core model.\n\n\
Configuration is JSON with the simulator's hierarchical option names\n\
(Pipeline-Widths, Queue-Sizes, Reservation-Stations, ...). Without a config\n\
file the built-in default machine is used.\n\nExamples:\n  \
oocore run -f program.bin\n  oocore run -f program.bin -c machine.json --trace"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a raw binary image.
    Run {
        /// Program image (little-endian 32-bit words, loaded at 0).
        #[arg(short, long)]
        file: String,

        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<String>,

        /// Memory size in bytes.
        #[arg(long, default_value_t = 1024 * 1024)]
        memory: usize,

        /// Backing memory latency in cycles.
        #[arg(long, default_value_t = 2)]
        memory_latency: u64,

        /// Stop after this many cycles even if the program has not halted.
        #[arg(long, default_value_t = 1_000_000)]
        max_cycles: u64,

        /// Stage-tagged trace output on stderr.
        #[arg(long)]
        trace: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            file,
            config,
            memory,
            memory_latency,
            max_cycles,
            trace,
        } => cmd_run(
            &file,
            config.as_deref(),
            memory,
            memory_latency,
            max_cycles,
            trace,
        ),
    }
}

fn load_config(path: Option<&str>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading config {}: {}", path, e);
        process::exit(1);
    });
    serde_json::from_str(&text).unwrap_or_else(|e| {
        eprintln!("Error parsing config {}: {}", path, e);
        process::exit(1);
    })
}

fn cmd_run(
    file: &str,
    config_path: Option<&str>,
    memory_size: usize,
    memory_latency: u64,
    max_cycles: u64,
    trace: bool,
) {
    let config = load_config(config_path);

    let image = fs::read(file).unwrap_or_else(|e| {
        eprintln!("Error reading program {}: {}", file, e);
        process::exit(1);
    });

    let mut memory = FixedLatencyMemory::new(memory_size, memory_latency);
    memory.write_block(0, &image);

    let core = Core::new(
        config,
        Box::new(DemoArchitecture),
        Box::new(DemoExceptionHandler::default()),
        Box::new(Translation::Mapped),
        Box::new(memory),
    );
    let mut core = core.unwrap_or_else(|e| {
        eprintln!("Error building core: {}", e);
        process::exit(1);
    });
    core.set_program_length(image.len() as u64);
    core.set_pc(0);
    core.set_trace(trace);

    println!("[*] Running {} ({} bytes)", file, image.len());
    while core.status() != CoreStatus::Halted {
        core.tick();
        if core.ticks() >= max_cycles {
            eprintln!("[!] Cycle limit ({}) reached before halt", max_cycles);
            break;
        }
    }

    core.stats().print();
    if core.status() != CoreStatus::Halted {
        process::exit(2);
    }
}
