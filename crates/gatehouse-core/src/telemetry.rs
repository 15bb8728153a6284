//! Log setup for the `gatehouse` command.
//!
//! Lifecycle events (`run.started`, `job.finished`, `gate.evaluated`, ...) and
//! step output go to stderr. Stdout carries only the job breakdown and the
//! verdict, so `gatehouse run > summary.txt` captures the report alone.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log targets of the gatehouse binary and its library crates.
const GATEHOUSE_TARGETS: &[&str] = &["gatehouse", "gatehouse_core", "gatehouse_ci"];

/// Filter used when `RUST_LOG` is unset: gatehouse crates log at `level`,
/// dependencies only at `warn`.
pub fn default_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_ascii_lowercase();
    let directives: Vec<String> = std::iter::once("warn".to_string())
        .chain(GATEHOUSE_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect();
    EnvFilter::new(directives.join(","))
}

/// Install the global subscriber for a `gatehouse` invocation.
///
/// `json` selects newline-delimited JSON (`--json`), for CI systems that
/// ingest structured logs; `level` is `debug` under `--verbose`, else `info`.
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let text = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let structured = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(structured)
        .try_init()
        .ok();
}
