//! Logging setup and signal-handler crash dump.

use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;
use std::sync::OnceLock;

use crate::pool::DebugRegistry;

/// `-v`/`-vv`-controlled verbosity, colorized the same way across warn/error vs info/debug.
pub fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME");
            let line = match record.level() {
                Level::Error | Level::Warn => {
                    let level_str = match record.level() {
                        Level::Warn => "WARN".yellow(),
                        Level::Error => "ERROR".red(),
                        _ => unreachable!(),
                    };
                    let path = record.target().to_string().white();
                    format!("[{} {} {}] {}", name.cyan(), level_str, path, record.args())
                }
                _ => format!("[{}] {}", name.cyan(), record.args()),
            };
            writeln!(buf, "{line}")
        })
        .init();
}

struct PoolRegistries {
    parse: DebugRegistry,
    writer: DebugRegistry,
}

static CRASH_REGISTRIES: OnceLock<PoolRegistries> = OnceLock::new();

/// Best-effort crash-dump: logs each worker's in-flight job just before re-raising the signal
/// to its default disposition. Reads the pools' own debug registries, never a process-global
/// table (the pools are the only owners of this state).
#[cfg(unix)]
pub fn install_crash_handlers(parse_pool_debug: DebugRegistry, writer_pool_debug: DebugRegistry) {
    let _ = CRASH_REGISTRIES.set(PoolRegistries {
        parse: parse_pool_debug,
        writer: writer_pool_debug,
    });

    unsafe {
        libc::signal(libc::SIGSEGV, dump_and_reraise as libc::sighandler_t);
        libc::signal(libc::SIGABRT, dump_and_reraise as libc::sighandler_t);
    }
}

#[cfg(unix)]
extern "C" fn dump_and_reraise(sig: libc::c_int) {
    if let Some(registries) = CRASH_REGISTRIES.get() {
        for (label, registry) in [("parse", &registries.parse), ("writer", &registries.writer)] {
            if let Ok(jobs) = registry.lock() {
                for (worker_id, job) in jobs.iter().enumerate() {
                    if let Some(description) = job {
                        eprintln!("[{label} pool worker {worker_id}] in flight: {description}");
                    }
                }
            }
        }
    }
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}

#[cfg(not(unix))]
pub fn install_crash_handlers(_parse_pool_debug: DebugRegistry, _writer_pool_debug: DebugRegistry) {}
