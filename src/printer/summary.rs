// src/printer/summary.rs

//! CLI option `--summary` printing functions.
//! Only used by `elt.rs`.

use std::time::Duration;

use crate::common::{
    Checkpoint,
    Count,
    NONE_STR,
};
use crate::printer::printers::{
    print_colored_stderr,
    Color,
    ColorChoice,
};
use crate::readers::eventlogtailer::{
    SummaryEventLogTailer,
    TailerConfig,
};

const OPT_SUMMARY_PRINT_INDENT1: &str = "  ";
const OPT_SUMMARY_PRINT_INDENT2: &str = "      ";

/// `hit / (hit + miss)` as a percentage, `0` if there were no lookups.
pub fn percent64(
    hit: Count,
    miss: Count,
) -> f64 {
    match hit + miss {
        0 => 0.0,
        total => (hit as f64) / (total as f64) * 100.0,
    }
}

fn print_error_summary(
    summary: &SummaryEventLogTailer,
    color_choice: ColorChoice,
) {
    match summary.eventlogtailer_error.as_ref() {
        Some(err) => {
            eprint!("{}Error: ", OPT_SUMMARY_PRINT_INDENT1);
            _ = print_colored_stderr(Some(Color::Red), color_choice, err.as_bytes());
            eprintln!();
        }
        None => {}
    }
}

/// Print the `--summary` of one tailer to stderr.
pub fn print_summary(
    config: &TailerConfig,
    summary: &SummaryEventLogTailer,
    checkpoint: Checkpoint,
    elapsed: Duration,
    color_choice: ColorChoice,
) {
    eprintln!();
    eprintln!("Summary:");
    eprintln!("{}Log: {:?}", OPT_SUMMARY_PRINT_INDENT1, config.log_name);
    match summary.eventlogtailer_backend {
        Some(backend) => eprintln!("{}Backend: {}", OPT_SUMMARY_PRINT_INDENT1, backend),
        None => eprintln!("{}Backend: {}", OPT_SUMMARY_PRINT_INDENT1, NONE_STR),
    }
    eprintln!("{}Checkpoint: {}", OPT_SUMMARY_PRINT_INDENT1, checkpoint);
    match summary.eventlogtailer_last_sent {
        Some(last_sent) => eprintln!("{}Last sent: {}", OPT_SUMMARY_PRINT_INDENT1, last_sent),
        None => eprintln!("{}Last sent: {}", OPT_SUMMARY_PRINT_INDENT1, NONE_STR),
    }
    eprintln!(
        "{}Poll cycles: {} ({} failed)",
        OPT_SUMMARY_PRINT_INDENT1, summary.eventlogtailer_cycles, summary.eventlogtailer_cycles_failed,
    );
    eprintln!("{}Records:", OPT_SUMMARY_PRINT_INDENT1);
    eprintln!("{}processed   : {}", OPT_SUMMARY_PRINT_INDENT2, summary.eventlogtailer_records_processed);
    eprintln!("{}sent        : {}", OPT_SUMMARY_PRINT_INDENT2, summary.eventlogtailer_records_sent);
    eprintln!("{}id mismatch : {}", OPT_SUMMARY_PRINT_INDENT2, summary.eventlogtailer_id_discrepancies);
    eprintln!("{}Checkpoint resets: {}", OPT_SUMMARY_PRINT_INDENT1, summary.eventlogtailer_checkpoint_resets);
    eprintln!("{}Fallback seeks: {}", OPT_SUMMARY_PRINT_INDENT1, summary.eventlogtailer_fallback_seeks);
    eprintln!("{}Sink refusals: {}", OPT_SUMMARY_PRINT_INDENT1, summary.eventlogtailer_sink_refusals);
    eprintln!("{}Synthesized messages: {}", OPT_SUMMARY_PRINT_INDENT1, summary.eventlogtailer_message_fallbacks);
    eprintln!("{}Buffer growths: {}", OPT_SUMMARY_PRINT_INDENT1, summary.eventlogtailer_buffer_growths);
    eprintln!(
        "{}Message files cache: hit {:2.1}% ({} of {})",
        OPT_SUMMARY_PRINT_INDENT1,
        percent64(summary.eventlogtailer_message_files_cache_hit, summary.eventlogtailer_message_files_cache_miss),
        summary.eventlogtailer_message_files_cache_hit,
        summary.eventlogtailer_message_files_cache_hit + summary.eventlogtailer_message_files_cache_miss,
    );
    print_error_summary(summary, color_choice);
    eprintln!("{}Elapsed: {:?}", OPT_SUMMARY_PRINT_INDENT1, elapsed);
}
