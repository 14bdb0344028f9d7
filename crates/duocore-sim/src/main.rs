use std::time::Duration;

use clap::{Parser, Subcommand};
use duocore_sim::scenario::SuspendOutcome;
use duocore_sim::{run_shutdown, run_suspend, run_traffic, SimConfig};

#[derive(Parser)]
#[command(name = "duocore-sim")]
#[command(about = "Simulate the inter-core queues, dispatcher and power handshake", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress all non-warning output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream messages from the slave into a master delivery queue
    Traffic {
        /// Messages to send
        #[arg(short, long, default_value = "64")]
        messages: u32,

        /// Depth of the master's delivery queue
        #[arg(long, default_value = "8", value_parser = clap::value_parser!(u32).range(1..=128))]
        depth: u32,
    },
    /// Run one deep-sleep round with the companion core
    Suspend {
        /// Time the SoC stays asleep, in milliseconds
        #[arg(long, default_value = "50")]
        sleep_ms: u64,

        /// Acknowledge deadline, in milliseconds
        #[arg(long, default_value = "200")]
        ack_timeout_ms: u64,

        /// Make device suspend fail with this status
        #[arg(long, allow_hyphen_values = true)]
        fail_devices: Option<i32>,

        /// Give the companion a wake-up sooner than the requested one
        #[arg(long)]
        stale: bool,
    },
    /// Shut the companion core down
    Shutdown {
        /// Request a reboot instead of a shutdown
        #[arg(long)]
        reboot: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = SimConfig::default();
    match cli.command {
        Commands::Traffic { messages, depth } => {
            config.messages = messages;
            config.queue_depth = depth;
            let report = run_traffic(&config)?;
            log::info!(
                "delivered {} messages on port {} ({} overflow retries, {} unclaimed frames, masked word {:#010x})",
                report.delivered,
                report.granted_port,
                report.overflows,
                report.unclaimed_frames,
                report.masked_word
            );
        }
        Commands::Suspend {
            sleep_ms,
            ack_timeout_ms,
            fail_devices,
            stale,
        } => {
            config.sleep = Duration::from_millis(sleep_ms);
            config.ack_timeout = Duration::from_millis(ack_timeout_ms);
            config.device_failure = fail_devices;
            config.stale_wakeup = stale;
            match run_suspend(&config)? {
                SuspendOutcome::Slept {
                    os_ticks,
                    elapsed_ms,
                } => log::info!("companion slept {} ms ({} os ticks)", elapsed_ms, os_ticks),
                SuspendOutcome::Refused => log::warn!("companion refused to suspend"),
                SuspendOutcome::Aborted => log::warn!("suspend aborted, request withdrawn"),
            }
        }
        Commands::Shutdown { reboot } => {
            config.reboot = reboot;
            run_shutdown(&config)?;
            log::info!("companion core shut down");
        }
    }

    Ok(())
}
