//! Multi-thread coordination: every participating hardware thread runs
//! its own calibrate / measure / report sequence, then waits at a
//! counting barrier. The last thread to arrive is the leader and owns
//! process-wide exit.
//!
//! A thread that never reaches the barrier hangs the others. There is no
//! timeout.

use core::fmt::{self, Write};
use core::num::NonZeroUsize;

use spin::{Barrier, Mutex};

use crate::calibrate::{calibrate, measure};
use crate::counter::Measurement;
use crate::error::Error;
use crate::report::ReportFormat;
use crate::shape::LoopSpec;
use crate::Backend;

/// Identity of one participating hardware thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadContext {
    id: usize,
    total: usize,
}

impl ThreadContext {
    pub fn new(id: usize, total: usize) -> Result<Self, Error> {
        if id < total {
            Ok(Self { id, total })
        } else {
            Err(Error::ThreadOutOfRange { id, total })
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Start,
    Calibrate,
    Measure,
    Report,
    BarrierWait,
    Terminated,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadState::Start => "START",
            ThreadState::Calibrate => "CALIBRATE",
            ThreadState::Measure => "MEASURE",
            ThreadState::Report => "REPORT",
            ThreadState::BarrierWait => "BARRIER-WAIT",
            ThreadState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

struct Progress {
    context: ThreadContext,
    state: ThreadState,
}

impl Progress {
    fn enter(&mut self, next: ThreadState) {
        log::trace!("thread {}/{}: {} -> {}", self.context.id, self.context.total, self.state, next);
        self.state = next;
    }
}

/// What one thread produced. Only the leader may end the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadOutcome {
    pub context: ThreadContext,
    pub measurement: Result<Measurement, Error>,
    pub leader: bool,
}

/// Shared by every participating thread. The sink lock is held for one
/// whole line, never while a region is timed.
pub struct Coordinator<'a, W> {
    barrier: Barrier,
    threads: NonZeroUsize,
    sink: &'a Mutex<W>,
    format: ReportFormat,
}

impl<'a, W: Write> Coordinator<'a, W> {
    pub fn new(threads: NonZeroUsize, sink: &'a Mutex<W>, format: ReportFormat) -> Self {
        Self { barrier: Barrier::new(threads.get()), threads, sink, format }
    }

    pub fn threads(&self) -> usize {
        self.threads.get()
    }

    pub fn context(&self, id: usize) -> Result<ThreadContext, Error> {
        ThreadContext::new(id, self.threads.get())
    }

    /// Calibrate, measure and report on the calling thread, then wait for
    /// every peer. A failed measurement is reported in place of a result
    /// and the thread still arrives at the barrier.
    pub fn run<B, const UNROLL: usize>(
        &self,
        context: ThreadContext,
        backend: &B,
        spec: &LoopSpec<UNROLL>,
    ) -> ThreadOutcome
    where
        B: Backend + ?Sized,
    {
        let mut progress = Progress { context, state: ThreadState::Start };

        progress.enter(ThreadState::Calibrate);
        let measurement = calibrate(backend, spec).and_then(|baseline| {
            progress.enter(ThreadState::Measure);
            measure(backend, spec, baseline)
        });

        self.conclude(progress, spec, measurement)
    }

    /// Report `err` for a thread that could not measure at all, then wait
    /// for every peer like [`Coordinator::run`] does.
    pub fn abandon<const UNROLL: usize>(
        &self,
        context: ThreadContext,
        spec: &LoopSpec<UNROLL>,
        err: Error,
    ) -> ThreadOutcome {
        let progress = Progress { context, state: ThreadState::Start };
        self.conclude(progress, spec, Err(err))
    }

    fn conclude<const UNROLL: usize>(
        &self,
        mut progress: Progress,
        spec: &LoopSpec<UNROLL>,
        measurement: Result<Measurement, Error>,
    ) -> ThreadOutcome {
        let context = progress.context;

        progress.enter(ThreadState::Report);
        let measurement = match self.report(spec, measurement) {
            Ok(()) => measurement,
            Err(err) => measurement.and(Err(err)),
        };
        if let Err(err) = measurement {
            log::error!("thread {}: {} failed: {}", context.id, spec.operation().kind(), err);
        }

        progress.enter(ThreadState::BarrierWait);
        let leader = self.barrier.wait().is_leader();
        progress.enter(ThreadState::Terminated);

        ThreadOutcome { context, measurement, leader }
    }

    fn report<const UNROLL: usize>(
        &self,
        spec: &LoopSpec<UNROLL>,
        measurement: Result<Measurement, Error>,
    ) -> Result<(), Error> {
        let mut sink = self.sink.lock();
        match measurement {
            Ok(m) => writeln!(sink, "{}", self.format.line(spec.operation(), m))?,
            Err(err) => writeln!(sink, "error\t{}", err)?,
        }
        Ok(())
    }
}
