#![deny(
    clippy::all,
    clippy::cargo,
    clippy::nursery,
    clippy::must_use_candidate,
    clippy::perf
    // clippy::restriction,
    // clippy::pedantic
)]
// now allow a few rules which are denied by the above statement
// --> they are ridiculous and not necessary
#![allow(
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::fallible_impl_from
)]
#![deny(missing_debug_implementations)]

use assert2::check;
use clap::Parser;
use log::{LevelFilter, error, info};
use rendezvous_gate::sink::{Event, Journal, WriterSink};
use rendezvous_gate::worker::DEFAULT_BOUND;
use rendezvous_gate::{DriverError, EpisodeConfig, Report, Role, run_episode};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Count up on one thread, open a gate, count down on another.
#[derive(Parser, Debug)]
#[command(name = "rendezvous-gate")]
#[command(version)]
struct Args {
    /// Upper end N of the range [0, N] both workers count through
    #[arg(short, long, default_value_t = DEFAULT_BOUND)]
    bound: u32,

    /// Delay after every step, in milliseconds
    #[arg(long, default_value_t = 5)]
    pacing_ms: u64,

    /// Random extra delay after every step, up to this many microseconds
    #[arg(long)]
    jitter_us: Option<u64>,

    /// Make the producer fail on reaching this value
    #[arg(long)]
    producer_fail_at: Option<u32>,

    /// Make the consumer fail on reaching this value
    #[arg(long)]
    consumer_fail_at: Option<u32>,

    /// Give up waiting for the producer's signal after this many milliseconds
    #[arg(long)]
    wait_timeout_ms: Option<u64>,

    /// Give up waiting for both workers after this many milliseconds
    #[arg(long)]
    join_timeout_ms: Option<u64>,

    /// Run this many episodes without output and print an analysis instead
    #[arg(short, long)]
    rounds: Option<usize>,

    /// Log level (off, error, warn, info, debug, trace); RUST_LOG overrides it
    #[arg(long, default_value = "warn")]
    log_level: LevelFilter,
}

impl Args {
    fn episode_config(&self) -> EpisodeConfig {
        let mut config = EpisodeConfig::with_bound(self.bound);
        config.join_timeout = self.join_timeout_ms.map(Duration::from_millis);
        for worker in [&mut config.producer, &mut config.consumer] {
            worker.pacing = Duration::from_millis(self.pacing_ms);
            worker.jitter = self.jitter_us.map(Duration::from_micros);
        }
        config.producer.fail_at = self.producer_fail_at;
        config.consumer.fail_at = self.consumer_fail_at;
        config.consumer.wait_timeout = self.wait_timeout_ms.map(Duration::from_millis);
        config
    }
}

#[derive(Debug, Default)]
struct Analysis {
    rounds: usize,
    all_completed: usize,
    elapsed: Vec<Duration>,
    signalled_after: Vec<Duration>,
}

fn calc_mean(data: &[Duration]) -> Duration {
    let len = data.len();
    if len == 0 {
        Duration::ZERO
    } else {
        data.iter().sum::<Duration>() / (len as u32)
    }
}

/// Runs `rounds` episodes into a [`Journal`] each and verifies that the
/// consumer never observed anything before the producer's signal.
fn stress_runs(rounds: usize, config: &EpisodeConfig) -> Result<Analysis, DriverError> {
    let mut analysis = Analysis {
        rounds,
        ..Analysis::default()
    };

    for _ in 0..rounds {
        let journal = Arc::new(Journal::new());
        let report = run_episode(config, journal.clone())?;

        let signal = journal.first_tick(Role::Producer, |e| *e == Event::Signal);
        let consumer_first = journal.first_tick_of(Role::Consumer);
        if let (Some(signal), Some(consumer_first)) = (signal, consumer_first) {
            check!(signal < consumer_first);
        }

        if report.all_completed() {
            analysis.all_completed += 1;
        }
        analysis.elapsed.push(report.elapsed);
        analysis.signalled_after.extend(report.signalled_after);
    }

    Ok(analysis)
}

fn print_analysis(analysis: &Analysis) {
    println!("Rounds          (#): {}", analysis.rounds);
    println!("  all completed (#): {}", analysis.all_completed);
    println!(
        "  |- mean episode  : {:>8} µs",
        calc_mean(&analysis.elapsed).as_micros()
    );
    println!(
        "  |- mean signal   : {:>8} µs",
        calc_mean(&analysis.signalled_after).as_micros()
    );
}

fn print_report(report: &Report) {
    println!();
    println!("{report}");
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .parse_default_env()
        .init();

    let config = args.episode_config();
    info!("configuration: {config:?}");

    if let Some(rounds) = args.rounds {
        return match stress_runs(rounds, &config) {
            Ok(analysis) => {
                print_analysis(&analysis);
                if analysis.all_completed == analysis.rounds {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(e) => {
                error!("{e}");
                ExitCode::from(2)
            }
        };
    }

    println!("Thread 1: counting up to {}", config.producer.bound);
    println!("Thread 2: counting down after thread 1 completes");
    println!();
    match run_episode(&config, Arc::new(WriterSink::stdout())) {
        Ok(report) => {
            print_report(&report);
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    }
}
