//! Runs the build-configured measurement on simulated cores, one OS thread
//! per configured hardware thread, and prints the report lines.

use std::fmt;
use std::io::Write as _;
use std::process;
use std::thread;

use rust_opcost_bare_metal::config::{BenchConfig, UNROLL};
use rust_opcost_bare_metal::coordinator::Coordinator;
use rust_opcost_bare_metal::sim::{CostModel, SimulatedCore};
use rust_opcost_bare_metal::Error;
use spin::Mutex;

struct Stdout;

impl fmt::Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        std::io::stdout().lock().write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

fn main() {
    env_logger::init();

    let config = BenchConfig::BUILD;
    let spec = config.loop_spec::<UNROLL>();
    log::info!(
        "{} op1={:#x} op2={:#x} trips={} unroll={} fence={} threads={}",
        spec.operation().kind(),
        spec.operation().operands().0,
        spec.operation().operands().1,
        spec.trip_count(),
        UNROLL,
        spec.fence(),
        config.threads
    );

    let sink = Mutex::new(Stdout);
    let coordinator = Coordinator::new(config.threads, &sink, config.format);

    let code = thread::scope(|scope| {
        let handles: Vec<_> = (0..coordinator.threads())
            .map(|id| {
                let coordinator = &coordinator;
                let spec = &spec;
                scope.spawn(move || -> Result<_, Error> {
                    let context = coordinator.context(id)?;
                    let core = SimulatedCore::new(CostModel::in_order());
                    Ok(coordinator.run(context, &core, spec))
                })
            })
            .collect();

        let mut code = 0;
        for handle in handles {
            match handle.join() {
                Ok(Ok(outcome)) if outcome.measurement.is_err() => code = 1,
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    log::error!("{err}");
                    code = 1;
                }
                Err(_) => code = 101,
            }
        }
        code
    });

    let _ = std::io::stdout().flush();
    process::exit(code);
}
