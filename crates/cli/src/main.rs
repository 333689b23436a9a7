// Ironic Bridge - Remote MMIO bridge for the Ironic emulator
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::{error, info, warn};

use ironic_bridge_config::BridgeConfig;
use ironic_bridge_core::keys::{KeyBlob, KeyError};
use ironic_bridge_core::{
    AccessWidth, BridgeError, FaultKind, IronicClient, RegionDispatcher, WindowMap,
};

#[cfg(feature = "unicorn")]
mod unicorn_engine;

const EXIT_PASS: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

fn parse_u32(s: &str) -> Result<u32, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u32::from_str_radix(&hex.replace('_', ""), 16)
            .map_err(|e| format!("Invalid hex value '{}': {}", s, e))
    } else {
        u32::from_str(trimmed).map_err(|e| format!("Invalid value '{}': {}", s, e))
    }
}

fn parse_width(s: &str) -> Result<AccessWidth, String> {
    let bytes = usize::from_str(s.trim()).map_err(|e| format!("Invalid width '{}': {}", s, e))?;
    AccessWidth::try_from(bytes).map_err(|w| format!("Unsupported width {} (expected 1, 2 or 4)", w))
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Remote MMIO bridge between a PowerPC core and Ironic",
    long_about = None
)]
struct Cli {
    /// Enable debug logging, including every dispatched access
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the CPU engine against the remote hardware model.
    Run(RunArgs),
    /// Read remote memory through the window map and hexdump it.
    Peek(PeekArgs),
    /// Write one value to remote memory through the window map.
    Poke(PokeArgs),
    /// Print the configured windows and their translations.
    Windows(WindowsArgs),
    /// Pull the key blob out of a firmware dump.
    ExtractKeys(ExtractKeysArgs),
}

#[derive(Args, Debug)]
struct RemoteArgs {
    /// Bridge configuration (YAML); defaults to the Broadway map
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path of the Ironic PPC socket (overrides the config)
    #[arg(long)]
    socket: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    remote: RemoteArgs,

    /// Stop after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,

    /// Initial PC (overrides the config reset vector)
    #[arg(long, value_parser = parse_u32)]
    entry: Option<u32>,

    /// Print the run outcome as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PeekArgs {
    #[command(flatten)]
    remote: RemoteArgs,

    /// CPU address to start reading at
    #[arg(value_parser = parse_u32)]
    addr: u32,

    /// Access width in bytes (1, 2 or 4)
    #[arg(short, long, default_value = "4", value_parser = parse_width)]
    width: AccessWidth,

    /// Number of accesses
    #[arg(short = 'n', long, default_value_t = 1)]
    count: u32,
}

#[derive(Args, Debug)]
struct PokeArgs {
    #[command(flatten)]
    remote: RemoteArgs,

    /// CPU address to write
    #[arg(value_parser = parse_u32)]
    addr: u32,

    /// Value to write
    #[arg(value_parser = parse_u32)]
    value: u32,

    /// Access width in bytes (1, 2 or 4)
    #[arg(short, long, default_value = "4", value_parser = parse_width)]
    width: AccessWidth,
}

#[derive(Args, Debug)]
struct WindowsArgs {
    /// Bridge configuration (YAML); defaults to the Broadway map
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the window map as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ExtractKeysArgs {
    /// Firmware dump to read the key blob from
    dump: PathBuf,

    /// Directory for keys.bin, secret_a.bin and secret_b.bin
    #[arg(short, long, default_value = ".")]
    out: PathBuf,
}

#[derive(Serialize)]
struct WindowReport<'a> {
    name: &'a str,
    cpu_start: u32,
    cpu_end: u64,
    remote_start: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays clean.
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_bridge(args, cli.trace),
        Commands::Peek(args) => run_peek(args, cli.trace),
        Commands::Poke(args) => run_poke(args, cli.trace),
        Commands::Windows(args) => run_windows(args),
        Commands::ExtractKeys(args) => run_extract_keys(args),
    }
}

fn exit_for(kind: FaultKind) -> ExitCode {
    match kind {
        FaultKind::Transport => ExitCode::from(EXIT_RUNTIME_ERROR),
        FaultKind::Configuration => ExitCode::from(EXIT_CONFIG_ERROR),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => {
            info!("Loading bridge config from {:?}", path);
            BridgeConfig::from_file(path)
        }
        None => Ok(BridgeConfig::default()),
    }
}

fn load_windows(config: &BridgeConfig) -> anyhow::Result<WindowMap> {
    WindowMap::from_config(&config.windows).context("Invalid window map")
}

/// Effective config and window map, or the exit code to stop with.
fn prepare(remote: &RemoteArgs) -> Result<(BridgeConfig, WindowMap), ExitCode> {
    let mut config = load_config(remote.config.as_deref()).map_err(|e| {
        error!("{:#}", e);
        ExitCode::from(EXIT_CONFIG_ERROR)
    })?;
    if let Some(socket) = &remote.socket {
        config.socket = Some(socket.clone());
    }
    let windows = load_windows(&config).map_err(|e| {
        error!("{:#}", e);
        ExitCode::from(EXIT_CONFIG_ERROR)
    })?;
    Ok((config, windows))
}

fn connect(
    config: &BridgeConfig,
    windows: WindowMap,
    trace: bool,
) -> Result<RegionDispatcher<IronicClient>, ExitCode> {
    let client = IronicClient::connect(config.resolved_socket()).map_err(|e| {
        error!("{}", e);
        ExitCode::from(EXIT_RUNTIME_ERROR)
    })?;
    Ok(RegionDispatcher::new(windows, client, config.wire_order.into())
        .with_access_log(config.log_accesses || trace))
}

fn run_bridge(args: RunArgs, trace: bool) -> ExitCode {
    let (config, windows) = match prepare(&args.remote) {
        Ok(parts) => parts,
        Err(code) => return code,
    };
    let entry = args.entry.unwrap_or(config.reset_vector);
    let max_steps = args.max_steps.or(config.max_steps);
    drive(&config, windows, entry, max_steps, args.json, trace)
}

#[cfg(not(feature = "unicorn"))]
fn drive(
    _config: &BridgeConfig,
    _windows: WindowMap,
    _entry: u32,
    _max_steps: Option<u64>,
    _json: bool,
    _trace: bool,
) -> ExitCode {
    error!("No execution engine compiled in; rebuild ironic-bridge-cli with --features unicorn");
    ExitCode::from(EXIT_CONFIG_ERROR)
}

#[cfg(feature = "unicorn")]
fn drive(
    config: &BridgeConfig,
    windows: WindowMap,
    entry: u32,
    max_steps: Option<u64>,
    json: bool,
    trace: bool,
) -> ExitCode {
    use ironic_bridge_core::{Bridge, StopReason};

    let dispatcher = match connect(config, windows, trace) {
        Ok(dispatcher) => dispatcher,
        Err(code) => return code,
    };

    let engine = match unicorn_engine::UnicornEngine::new() {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to set up Unicorn: {}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    let mut bridge = Bridge::new(engine, dispatcher, entry);
    if let Err(e) = bridge.setup() {
        error!("Failed to map windows: {}", e);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    info!("Starting Broadway emulation at {:#010x}", entry);
    let outcome = bridge.run(max_steps);
    hang_up(bridge.dispatcher_mut().transport_mut());

    if json {
        match serde_json::to_string(&outcome) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize run outcome: {}", e),
        }
    }

    match &outcome.stop_reason {
        StopReason::MaxStepsReached => {
            info!(
                "Stopped after {} steps at pc={:#010x}",
                outcome.steps, outcome.final_pc
            );
            ExitCode::from(EXIT_PASS)
        }
        reason => {
            error!("Bridge halted: {:?}\n{}", reason, outcome.cpu);
            let stats = bridge.dispatcher().stats().clone();
            info!("{} reads, {} writes dispatched", stats.reads, stats.writes);
            match reason {
                StopReason::ConfigurationFault(_) => ExitCode::from(EXIT_CONFIG_ERROR),
                _ => ExitCode::from(EXIT_RUNTIME_ERROR),
            }
        }
    }
}

/// Lines of 16 bytes: `addr: value value ...`
fn hexdump(start: u32, width: AccessWidth, values: &[u32]) -> Vec<String> {
    let per_line = 16 / width.bytes();
    let digits = width.bytes() * 2;
    values
        .chunks(per_line)
        .enumerate()
        .map(|(i, chunk)| {
            let addr = start.wrapping_add((i * 16) as u32);
            let words: Vec<String> = chunk
                .iter()
                .map(|v| format!("{:0digits$x}", v, digits = digits))
                .collect();
            format!("{:08x}: {}", addr, words.join(" "))
        })
        .collect()
}

fn report_access_error(err: &BridgeError) -> ExitCode {
    error!("{}", err);
    exit_for(err.kind())
}

/// Close the socket explicitly so the remote sees the session end.
fn hang_up(client: &mut IronicClient) {
    if let Err(e) = client.shutdown() {
        warn!("Failed to shut down Ironic connection: {}", e);
    }
}

fn run_peek(args: PeekArgs, trace: bool) -> ExitCode {
    let mut dispatcher = match prepare(&args.remote)
        .and_then(|(config, windows)| connect(&config, windows, trace))
    {
        Ok(dispatcher) => dispatcher,
        Err(code) => return code,
    };

    let step = args.width.bytes() as u64;
    let mut values = Vec::new();
    let mut failure = None;
    for i in 0..args.count as u64 {
        let addr = args.addr as u64 + i * step;
        match dispatcher.try_read(addr, args.width) {
            Ok(value) => values.push(value),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    hang_up(dispatcher.transport_mut());

    if let Some(e) = failure {
        return report_access_error(&e);
    }
    for line in hexdump(args.addr, args.width, &values) {
        println!("{}", line);
    }
    ExitCode::from(EXIT_PASS)
}

fn run_poke(args: PokeArgs, trace: bool) -> ExitCode {
    if args.value as u64 > args.width.mask() {
        error!("Value {:#x} does not fit a {} access", args.value, args.width);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let mut dispatcher = match prepare(&args.remote)
        .and_then(|(config, windows)| connect(&config, windows, trace))
    {
        Ok(dispatcher) => dispatcher,
        Err(code) => return code,
    };

    let written = dispatcher.try_write(args.addr as u64, args.width, args.value);
    hang_up(dispatcher.transport_mut());
    if let Err(e) = written {
        return report_access_error(&e);
    }
    info!("Wrote {:#x} to {:#010x}", args.value, args.addr);
    ExitCode::from(EXIT_PASS)
}

fn run_windows(args: WindowsArgs) -> ExitCode {
    let windows = match load_config(args.config.as_deref()).and_then(|c| load_windows(&c)) {
        Ok(windows) => windows,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if args.json {
        let report: Vec<WindowReport> = windows
            .windows()
            .iter()
            .map(|w| WindowReport {
                name: &w.name,
                cpu_start: w.cpu_base(),
                cpu_end: w.cpu_end(),
                remote_start: w.translate(w.cpu_base()),
            })
            .collect();
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize window map: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    } else {
        for window in windows.windows() {
            println!("{}", window);
        }
    }
    ExitCode::from(EXIT_PASS)
}

fn run_extract_keys(args: ExtractKeysArgs) -> ExitCode {
    let blob = match KeyBlob::from_dump(&args.dump) {
        Ok(blob) => blob,
        Err(e @ KeyError::Truncated { .. }) => {
            error!("{:?}: {}", args.dump, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
        Err(e) => {
            error!("Failed to read {:?}: {}", args.dump, e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    println!("{}", blob.label());
    match blob.write_to(&args.out) {
        Ok(paths) => {
            for path in paths {
                println!("{}", path.display());
            }
            ExitCode::from(EXIT_PASS)
        }
        Err(e) => {
            error!("Failed to write keys to {:?}: {}", args.out, e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}
