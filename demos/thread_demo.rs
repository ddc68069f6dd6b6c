//! Small end-to-end demonstration of the concurrency core: spawns a handful
//! of `EvalThread`s, joins them, and prints their outcomes. The concurrency-
//! core analogue of this crate's own `examples/shadow.rs` sketch of shared
//! object-graph ownership (SPEC_FULL §10.7), using `clap`/`anyhow` the way
//! `src/main/core/main.rs` and `src/main/core/support/configuration.rs` do
//! in the rest of this pack.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use lispkit_concurrency::gc::{GcVisitor, Traceable};
use lispkit_concurrency::{ConcurrencyError, EvalThread, ThreadRegistry, Value};

#[derive(Debug, Clone, Parser)]
#[clap(name = "thread-demo", about = "Spawn and join a handful of evaluator threads")]
struct CliOptions {
    /// Number of worker threads to spawn.
    #[clap(long, short = 'n', default_value_t = 4)]
    workers: u32,

    /// Log level passed to `env_logger`.
    #[clap(long, default_value = "info")]
    log_level: String,

    /// Make one worker raise instead of returning normally, to exercise the
    /// uncaught-exception join path.
    #[clap(long)]
    with_failure: bool,
}

#[derive(Debug)]
struct IntValue(i64);

impl Traceable for IntValue {
    fn trace(&self, _visitor: &mut dyn GcVisitor) {}
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn int_value(v: i64) -> Value {
    Arc::new(IntValue(v))
}

fn main() -> anyhow::Result<()> {
    let options = CliOptions::parse();
    env_logger::Builder::new()
        .parse_filters(&options.log_level)
        .init();

    let registry = Arc::new(ThreadRegistry::new());
    let mut threads = Vec::new();

    for i in 0..options.workers {
        let should_fail = options.with_failure && i == options.workers.saturating_sub(1);
        let thread = EvalThread::new(
            Box::new(move || {
                std::thread::sleep(Duration::from_millis(10 * i as u64));
                if should_fail {
                    Err(int_value(-1))
                } else {
                    Ok(int_value(i as i64 * i as i64))
                }
            }),
            None,
            None,
        );
        thread
            .start(&registry)
            .with_context(|| format!("starting worker {i}"))?;
        threads.push(thread);
    }

    for thread in threads {
        match thread.join(Some(Duration::from_secs(5)), None) {
            Ok(v) => {
                let v = v.as_ref().as_any().downcast_ref::<IntValue>().unwrap();
                println!("thread {:?} returned {}", thread.id(), v.0);
            }
            Err(ConcurrencyError::UncaughtException(id, reason)) => {
                let reason = reason.as_ref().as_any().downcast_ref::<IntValue>().unwrap();
                println!("thread {id:?} raised {}", reason.0);
            }
            Err(other) => return Err(other.into()),
        }
    }

    println!("all workers joined");
    Ok(())
}
