//! irqlab-run - drive the interrupt test engines from the command line
//!
//! The flags mirror the knobs of the original rig. `edges` runs the
//! mask/unmask sequencer on a jumpered pin pair; `flow` attaches a square
//! wave to an interrupt pin and prints one statistics line per batch.
//! A TOML manifest can supply the whole configuration; flags override it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use irqlab_hal::{Level, MonotonicClock, SimGpio, SquareWave};
use irqlab_irqtest::{
    config, format_report, EngineError, MaskMode, Sequencer, SequencerConfig, Validator,
    ValidatorConfig,
};

#[derive(Parser)]
#[command(name = "irqlab-run", version, about = "GPIO interrupt test bench")]
struct Cli {
    /// Log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML manifest with default configuration
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mask/unmask edge sequencer on a jumpered pin pair
    Edges {
        /// Interrupt input pin
        #[arg(long, default_value_t = 16)]
        irq_pin: u32,
        /// Drive output pin, jumpered to the input
        #[arg(long, default_value_t = 21)]
        drive_pin: u32,
        /// First level to send (0 or 1)
        #[arg(long)]
        value: Option<u8>,
        /// Interval before and after each event or action, ms
        #[arg(long)]
        cadence: Option<u64>,
        /// Disable/enable cycles to run
        #[arg(long)]
        cycles: Option<u32>,
        /// Events before the first enable
        #[arg(long)]
        ni: Option<u32>,
        /// Events while enabled
        #[arg(long)]
        enab: Option<u32>,
        /// Events while disabled
        #[arg(long)]
        disab: Option<u32>,
        /// Masking mechanism: gate or retype
        #[arg(long, value_enum)]
        mode: Option<MaskModeArg>,
    },
    /// Level-triggered flow validator on a square-wave-fed pin
    Flow {
        /// Interrupt input pin
        #[arg(long, default_value_t = 16)]
        pin: u32,
        /// Events per statistics batch
        #[arg(long)]
        setsize: Option<u32>,
        /// Expected interrupt-to-interrupt interval, us
        #[arg(long)]
        cadence: Option<u64>,
        /// Allowed skew, us
        #[arg(long)]
        tolerance: Option<u64>,
        /// Batches to report before stopping
        #[arg(long, default_value_t = 5)]
        batches: u32,
    },
}

/// CLI spelling of [`MaskMode`]
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum MaskModeArg {
    Gate,
    Retype,
}

impl From<MaskModeArg> for MaskMode {
    fn from(arg: MaskModeArg) -> Self {
        match arg {
            MaskModeArg::Gate => MaskMode::Gate,
            MaskModeArg::Retype => MaskMode::Retype,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let defaults = match &cli.manifest {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading manifest {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("parsing manifest {}", path.display()))?
        }
        None => config::defaults(),
    };

    match cli.command {
        Command::Edges {
            irq_pin,
            drive_pin,
            value,
            cadence,
            cycles,
            ni,
            enab,
            disab,
            mode,
        } => {
            let mut cfg = defaults.sequencer;
            if let Some(value) = value {
                cfg.initial_level = Level::from_bool(value != 0);
            }
            if let Some(cadence) = cadence {
                cfg.pacing_ms = cadence;
            }
            if let Some(cycles) = cycles {
                cfg.cycles = cycles;
            }
            if let Some(ni) = ni {
                cfg.pre_events = ni;
            }
            if let Some(enab) = enab {
                cfg.enabled_events = enab;
            }
            if let Some(disab) = disab {
                cfg.disabled_events = disab;
            }
            if let Some(mode) = mode {
                cfg.mask_mode = mode.into();
            }
            run_edges(irq_pin, drive_pin, cfg)
        }
        Command::Flow {
            pin,
            setsize,
            cadence,
            tolerance,
            batches,
        } => {
            let mut cfg = defaults.validator;
            if let Some(setsize) = setsize {
                cfg.batch_size = setsize;
            }
            if let Some(cadence) = cadence {
                cfg.expected_interval_us = cadence;
            }
            if let Some(tolerance) = tolerance {
                cfg.tolerance_us = tolerance;
            }
            run_flow(pin, cfg, batches)
        }
    }
}

fn run_edges(irq_pin: u32, drive_pin: u32, cfg: SequencerConfig) -> Result<()> {
    let gpio = SimGpio::new();
    gpio.wire(drive_pin, irq_pin);

    info!(
        "edges test on pins {irq_pin}:{drive_pin} - {} injections, {} expected deliveries",
        cfg.total_injected(),
        cfg.expected_hits()
    );

    let mut sequencer = Sequencer::open(&gpio, (irq_pin, drive_pin), cfg)
        .context("opening sequencer session")?;
    match sequencer.run() {
        Err(EngineError::Interrupted) => {}
        Err(other) => return Err(other.into()),
        Ok(()) => {}
    }
    info!(
        "sequence complete: {} interrupts delivered",
        sequencer.hits()
    );
    sequencer.close();
    Ok(())
}

fn run_flow(pin: u32, cfg: ValidatorConfig, batches: u32) -> Result<()> {
    let gpio = SimGpio::new();
    let clock = Arc::new(MonotonicClock::new());

    info!(
        "flow test on pin {pin} - {} events per batch, {} +/- {} us",
        cfg.batch_size, cfg.expected_interval_us, cfg.tolerance_us
    );

    let validator =
        Validator::open(&gpio, clock, pin, cfg).context("opening validator session")?;

    // The square wave stands in for the external generator: each half
    // period is one expected interrupt interval.
    let wave = SquareWave::start(
        gpio.clone(),
        pin,
        Duration::from_micros(cfg.expected_interval_us),
        Level::High,
    );

    for _ in 0..batches {
        let report = validator.next_report().context("waiting for a batch")?;
        print!("{}", format_report(&report));
    }

    drop(wave);
    validator.close();
    Ok(())
}
