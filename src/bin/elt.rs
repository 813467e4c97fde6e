// src/bin/elt.rs

//! Driver program _elt_ drives the [_eltlib_].
//!
//! Processes user-passed command-line arguments, then tails one Windows
//! Event Log channel. Each poll cycle runs an [`EventLogTailer`] which
//! forwards every matching event to a [`PrinterSink`] on stdout.
//! Between cycles the checkpoint is optionally saved to a file so a later
//! run resumes after the last record processed.
//!
//! Runs until passed `--cycles` poll cycles completed, or a signal
//! (ctrl+c) is received.
//!
//! If passed CLI option `--summary`, prints a [`SummaryEventLogTailer`]
//! to stderr before exiting.
//!
//! [_eltlib_]: eltlib
//! [`EventLogTailer`]: eltlib::readers::eventlogtailer::EventLogTailer
//! [`PrinterSink`]: eltlib::printer::printers::PrinterSink
//! [`SummaryEventLogTailer`]: eltlib::readers::eventlogtailer::SummaryEventLogTailer

#![allow(non_camel_case_types)]
#![cfg_attr(not(windows), allow(dead_code, unused_imports))]

use std::path::{
    Path,
    PathBuf,
};
use std::process::ExitCode;
use std::sync::RwLock;
use std::thread;
use std::time::{
    Duration,
    Instant,
};

use ::anyhow::Context;
use ::clap::{
    Parser,
    ValueEnum,
};
use ::const_format::concatcp;
use ::lazy_static::lazy_static;
#[allow(unused_imports)]
use ::si_trace_print::{
    defn,
    defo,
    defx,
    defñ,
};

use ::eltlib::common::{
    Checkpoint,
    Count,
};
use ::eltlib::printer::printers::{
    timestamp_format_is_valid,
    ColorChoice,
    PrinterSink,
    TIMESTAMP_FORMAT_DEFAULT,
};
use ::eltlib::printer::summary::print_summary;
use ::eltlib::readers::api::EventLogApi;
use ::eltlib::readers::dispatch::SinkTarget;
use ::eltlib::readers::eventlogtailer::{
    EventLogTailer,
    TailerConfig,
    RATE_DEFAULT,
    REFRESH_INTERVAL_SECS_DEFAULT,
};
use ::eltlib::readers::filter::FilterSpec;
use ::eltlib::readers::logsession::BackendPreference;
use ::eltlib::{
    de_err,
    e_err,
    e_wrn,
};

// --------------------
// command-line parsing

/// Exit code when the command-line arguments are invalid.
const EXIT_ERR: i32 = 1;

/// Sleep slice while waiting for the next poll cycle; `EXIT_EARLY` is
/// checked after each.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

const CLI_HELP_AFTER: &str = concatcp!(
    "\
Checkpoint:
  The checkpoint is the record id of the last record processed. Records after
  it are read each poll cycle. A checkpoint outside the log's current record
  range is reset to the oldest record.
  With --checkpoint-file the checkpoint is read at start and written after
  each poll cycle.

Rate:
  Each poll cycle sends at most RATE × REFRESH records and processes at most
  4 × RATE × REFRESH records.

Filters:
  Patterns are regular expressions, searched not anchored.
  --message and --event-id are case-sensitive; --severity and --source are not.
  Severity names are: Information, Warning, Error, Critical, Verbose,
  Success Audit, Failure Audit.

Timestamp format default is \"",
    TIMESTAMP_FORMAT_DEFAULT,
    "\"
"
);

/// `--backend`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum CLI_Backend {
    #[default]
    Auto,
    Modern,
    Legacy,
}

/// `--color`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum CLI_Color_Choice {
    Always,
    #[default]
    Auto,
    Never,
}

#[derive(Parser, Debug)]
#[clap(
    about = env!("CARGO_PKG_DESCRIPTION"),
    author = env!("CARGO_PKG_AUTHORS"),
    name = "elt",
    // write expanded information for the `--version` output
    version = concatcp!(
        "(Event Log Tailer)\n",
        "Version: ",
        env!("CARGO_PKG_VERSION_MAJOR"), ".",
        env!("CARGO_PKG_VERSION_MINOR"), ".",
        env!("CARGO_PKG_VERSION_PATCH"), "\n",
        "MSRV: ", env!("CARGO_PKG_RUST_VERSION"), "\n",
        "License: ", env!("CARGO_PKG_LICENSE"), "\n",
        "Repository: ", env!("CARGO_PKG_REPOSITORY"), "\n",
        "Author: ", env!("CARGO_PKG_AUTHORS"), "\n",
    ),
    after_help = CLI_HELP_AFTER,
    verbatim_doc_comment,
)]
struct CLI_Args {
    /// Event log channel name, e.g. "System" or "Application".
    #[clap(required = true, verbatim_doc_comment)]
    log_name: String,

    /// Start after this record id.
    /// Ignored if --checkpoint-file holds a checkpoint.
    #[clap(short = 'c', long, default_value_t = 0, verbatim_doc_comment)]
    checkpoint: Checkpoint,

    /// File holding the checkpoint; read at start, written after each
    /// poll cycle.
    #[clap(short = 'f', long, verbatim_doc_comment)]
    checkpoint_file: Option<PathBuf>,

    /// Begin at the newest record; older records are not sent.
    #[clap(long, verbatim_doc_comment)]
    skip_old_data: bool,

    /// Records sent per second of refresh interval.
    #[clap(short = 'r', long, default_value_t = RATE_DEFAULT, verbatim_doc_comment)]
    rate: Count,

    /// Seconds between poll cycles.
    #[clap(short = 'i', long, default_value_t = REFRESH_INTERVAL_SECS_DEFAULT, verbatim_doc_comment)]
    refresh: Count,

    /// Number of poll cycles to run, 0 runs until interrupted.
    #[clap(short = 'n', long, default_value_t = 0, verbatim_doc_comment)]
    cycles: Count,

    /// Message filter pattern.
    #[clap(short = 'm', long, default_value_t, verbatim_doc_comment)]
    message: String,

    /// Severity filter pattern.
    #[clap(short = 's', long, default_value_t, verbatim_doc_comment)]
    severity: String,

    /// Source filter pattern.
    #[clap(short = 'o', long, default_value_t, verbatim_doc_comment)]
    source: String,

    /// Event id filter pattern.
    #[clap(short = 'e', long, default_value_t, verbatim_doc_comment)]
    event_id: String,

    /// Event log API to read with.
    #[clap(short = 'b', long, value_enum, default_value_t = CLI_Backend::Auto, verbatim_doc_comment)]
    backend: CLI_Backend,

    /// Host name attached to each forwarded record.
    #[clap(long, default_value_t, verbatim_doc_comment)]
    host: String,

    /// Item key attached to each forwarded record.
    #[clap(long, default_value = "eventlog", verbatim_doc_comment)]
    key: String,

    /// Timestamp strftime format.
    #[clap(short = 't', long, default_value = TIMESTAMP_FORMAT_DEFAULT, verbatim_doc_comment)]
    timestamp_format: String,

    /// Print timestamps in UTC, not the local timezone.
    #[clap(short = 'u', long, verbatim_doc_comment)]
    utc: bool,

    /// Prepend each record's id.
    #[clap(short = 'p', long, verbatim_doc_comment)]
    prepend_checkpoint: bool,

    /// Choose to print to terminal using colors.
    #[clap(required = false, short = 'C', long, value_enum, default_value_t = CLI_Color_Choice::Auto)]
    color: CLI_Color_Choice,

    /// Print a summary of the run to stderr before exiting.
    #[clap(short = 'S', long, verbatim_doc_comment)]
    summary: bool,
}

impl CLI_Args {
    fn tailer_config(&self) -> TailerConfig {
        TailerConfig {
            log_name: self.log_name.clone(),
            filter: FilterSpec {
                message_pattern: self.message.clone(),
                severity_pattern: self.severity.clone(),
                source_pattern: self.source.clone(),
                event_id_pattern: self.event_id.clone(),
            },
            rate: self.rate,
            refresh_interval_secs: self.refresh,
            skip_old_data: self.skip_old_data,
            target: SinkTarget {
                host: self.host.clone(),
                item_key: self.key.clone(),
                flags: 0,
            },
            backend: match self.backend {
                CLI_Backend::Auto => BackendPreference::Auto,
                CLI_Backend::Modern => BackendPreference::Modern,
                CLI_Backend::Legacy => BackendPreference::Legacy,
            },
        }
    }

    const fn color_choice(&self) -> ColorChoice {
        match self.color {
            CLI_Color_Choice::Always => ColorChoice::Always,
            CLI_Color_Choice::Auto => ColorChoice::Auto,
            CLI_Color_Choice::Never => ColorChoice::Never,
        }
    }
}

lazy_static! {
    /// flag to signal to main thread should return ASAP.
    /// Polled by function `tail_loop`.
    static ref EXIT_EARLY: RwLock<bool> = {
        defñ!("lazy_static! exit_early");

        RwLock::new(false)
    };
}

/// set a process signal handler
pub fn set_signal_handler() -> anyhow::Result<(), ctrlc::Error> {
    defn!();

    ctrlc::set_handler(move || {
        defn!();
        // signal the `tail_loop` to return early
        match EXIT_EARLY.write() {
            Ok(mut exit_early) => {
                *exit_early = true;
            }
            Err(_err) => {
                de_err!("EXIT_EARLY.write() failed {}", _err);
            }
        }
        defx!();
    })?;

    defx!();

    Ok(())
}

/// Has a signal asked to exit?
fn exit_early() -> bool {
    match EXIT_EARLY.read() {
        Ok(exit_early) => *exit_early,
        Err(err) => {
            e_err!("EXIT_EARLY.read() failed: {:?}", err);
            true
        }
    }
}

/// Read the checkpoint saved in `path`; `None` if there is no such file.
fn checkpoint_load(path: &Path) -> anyhow::Result<Option<Checkpoint>> {
    if !path.exists() {
        return Ok(None);
    }
    let text: String =
        std::fs::read_to_string(path).with_context(|| format!("Cannot read checkpoint file {:?}", path))?;
    let checkpoint: Checkpoint = text
        .trim()
        .parse::<Checkpoint>()
        .with_context(|| format!("Cannot parse checkpoint file {:?} value {:?}", path, text.trim()))?;
    defñ!("checkpoint {} from {:?}", checkpoint, path);

    Ok(Some(checkpoint))
}

/// Write `checkpoint` to `path`.
fn checkpoint_save(
    path: &Path,
    checkpoint: Checkpoint,
) -> anyhow::Result<()> {
    std::fs::write(path, format!("{}\n", checkpoint))
        .with_context(|| format!("Cannot write checkpoint file {:?}", path))
}

/// Sleep `secs`, returning early if a signal asks to exit.
fn sleep_interruptible(secs: Count) {
    let until = Instant::now() + Duration::from_secs(secs);
    while Instant::now() < until {
        if exit_early() {
            return;
        }
        thread::sleep(SLEEP_SLICE);
    }
}

/// Run poll cycles until done. Returns `true` if every cycle succeeded.
fn tail_loop<A: EventLogApi>(
    api: A,
    args: &CLI_Args,
    start_time: Instant,
) -> anyhow::Result<bool> {
    defn!();
    let color_choice: ColorChoice = args.color_choice();
    let mut checkpoint: Checkpoint = args.checkpoint;
    if let Some(path) = args.checkpoint_file.as_ref() {
        if let Some(saved) = checkpoint_load(path)? {
            checkpoint = saved;
        }
    }
    let mut tailer = EventLogTailer::new(api, args.tailer_config())?;
    let stdout = termcolor::StandardStream::stdout(color_choice);
    let mut sink = PrinterSink::new(stdout, &args.timestamp_format, args.utc, args.prepend_checkpoint);

    set_signal_handler()?;

    let mut ret: bool = true;
    let mut cycles: Count = 0;
    while !exit_early() {
        match tailer.poll_cycle(&mut checkpoint, &mut sink) {
            Ok(_report) => {
                defo!("{:?}", _report);
            }
            Err(err) => {
                e_err!("{}", err);
                ret = false;
            }
        }
        if let Some(path) = args.checkpoint_file.as_ref() {
            if let Err(err) = checkpoint_save(path, checkpoint) {
                e_wrn!("{:?}", err);
            }
        }
        cycles += 1;
        if args.cycles != 0 && cycles >= args.cycles {
            break;
        }
        sleep_interruptible(args.refresh);
    }

    if args.summary {
        print_summary(tailer.config(), tailer.summary(), checkpoint, start_time.elapsed(), color_choice);
    }
    defx!("return {}", ret);

    Ok(ret)
}

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        /// Tail the log with the operating system's event log API.
        fn run(
            args: &CLI_Args,
            start_time: Instant,
        ) -> ExitCode {
            let api = ::eltlib::native::WindowsEventLogApi::new();
            match tail_loop(api, args, start_time) {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::FAILURE,
                Err(err) => {
                    e_err!("{:?}", err);
                    ExitCode::FAILURE
                }
            }
        }
    } else {
        fn run(
            args: &CLI_Args,
            _start_time: Instant,
        ) -> ExitCode {
            e_err!("Cannot open eventlog '{}': this platform has no Windows Event Log", args.log_name);
            ExitCode::FAILURE
        }
    }
}

/// Process the user-passed command-line arguments.
/// Start function `tail_loop`.
/// Determine a process return code.
pub fn main() -> ExitCode {
    let start_time = Instant::now();
    defn!();

    let args = CLI_Args::parse();
    defo!("{:?}", args);
    if !timestamp_format_is_valid(&args.timestamp_format) {
        e_err!("Invalid --timestamp-format {:?}", args.timestamp_format);
        std::process::exit(EXIT_ERR);
    }

    let exitcode: ExitCode = run(&args, start_time);
    defx!("exitcode {:?}", exitcode);

    exitcode
}
