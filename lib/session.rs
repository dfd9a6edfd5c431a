//! Ties validation, sampling, and binning together around a single density
//! that the user edits over time.
//!
//! A [`Session`] owns the current density and every sample drawn so far.
//! Sampling is done in [`Batch`]es, which hold their own handle to the density
//! and their own RNG and are worked through one chunk at a time by whoever
//! drives them; nothing is added to the session until a finished batch is
//! [committed](Session::commit). Chunk boundaries are the only points at which
//! the driver regains control, so a batch can be cancelled or reported on
//! there but not in the middle of a chunk.
//!
//! Because a batch does not borrow the session, the session can still be
//! edited or cleared while a batch is outstanding. Such a batch keeps drawing
//! from the density it was started with, and committing it appends to whatever
//! the session holds at that moment: samples cleared in the meantime stay
//! cleared, and under [`StalePolicy::Keep`] samples from an older density end
//! up binned alongside newer ones.

use std::{
    ops::ControlFlow,
    rc::Rc,
};
use rand::{
    rngs::StdRng,
    Rng,
    SeedableRng,
};
use thiserror::Error;
use tracing::{
    debug,
    info,
    warn,
};
use crate::{
    curve::{
        self,
        Curve,
        CURVE_SPACING,
    },
    expr::{
        Compiler,
        Evaluator,
        ExprCompiler,
    },
    math::{
        histogram::{
            self,
            HistError,
        },
        probability::{
            InverseCdf,
            RandomContinuous,
        },
    },
    settings::{
        Settings,
        StalePolicy,
    },
    status::{
        Notify,
        Silent,
        Status,
    },
    validate::{
        self,
        Report,
        Validation,
    },
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("session: no valid density has been set")]
    NoDensity,

    #[error("session: sample count must be at least 1")]
    NoSamples,

    #[error("session: batch is unfinished ({done}/{total})")]
    Unfinished { done: usize, total: usize },

    #[error("session: {0}")]
    Hist(#[from] HistError),
}
pub type SessionResult<T> = Result<T, SessionError>;

/// A single draw, tagged with the version of the density it came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub version: u64,
}

#[derive(Clone)]
struct Density {
    evaluator: Rc<dyn Evaluator>,
    text: String,
    version: u64,
}

/// How far a [`Batch`] has come.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Draws attempted so far, failed ones included.
    pub done: usize,
    pub total: usize,
    pub failures: usize,
}

/// An in-flight request for samples.
pub struct Batch {
    sampler: InverseCdf<Rc<dyn Evaluator>>,
    version: u64,
    requested: usize,
    attempted: usize,
    drawn: Vec<f64>,
    failures: usize,
    chunk_size: usize,
    rng: StdRng,
    cancelled: bool,
}

impl Batch {
    /// Draw the next chunk of samples.
    ///
    /// Draws that fail are skipped and counted. Results above one, which occur
    /// when the density's integral over $`[0, 1]`$ falls slightly short of the
    /// target, are clamped to one.
    pub fn step(&mut self) -> Progress {
        if self.is_finished() {
            return self.progress();
        }
        let n: usize = self.chunk_size.min(self.requested - self.attempted);
        for _ in 0..n {
            match self.sampler.sample_rng(&mut self.rng) {
                Ok(x) => { self.drawn.push(x.clamp(0.0, 1.0)); },
                Err(err) => {
                    if self.failures == 0 {
                        warn!(%err, "skipping failed sample");
                    } else {
                        debug!(%err, "skipping failed sample");
                    }
                    self.failures += 1;
                },
            }
        }
        self.attempted += n;
        debug!(
            done = self.attempted,
            total = self.requested,
            failures = self.failures,
            "sampling chunk finished",
        );
        return self.progress();
    }

    /// Stop the batch; its draws are discarded when committed.
    pub fn cancel(&mut self) { self.cancelled = true; }

    pub fn is_cancelled(&self) -> bool { self.cancelled }

    pub fn is_finished(&self) -> bool {
        return self.cancelled || self.attempted >= self.requested;
    }

    pub fn progress(&self) -> Progress {
        return Progress {
            done: self.attempted,
            total: self.requested,
            failures: self.failures,
        };
    }

    /// Version of the density this batch draws from.
    pub fn version(&self) -> u64 { self.version }

    /// Successful draws so far.
    pub fn drawn(&self) -> &[f64] { &self.drawn }
}

/// Interactive state: the current density, the samples drawn so far, and the
/// histogram bucket count.
pub struct Session<C = ExprCompiler>
where C: Compiler
{
    compiler: C,
    settings: Settings,
    density: Option<Density>,
    next_version: u64,
    samples: Vec<Sample>,
    buckets: usize,
    rng: StdRng,
    notify: Box<dyn Notify>,
}

impl Session<ExprCompiler> {
    pub fn new(settings: Settings) -> Self {
        return Self::with_compiler(ExprCompiler::new(), settings);
    }
}

impl Default for Session<ExprCompiler> {
    fn default() -> Self { Self::new(Settings::default()) }
}

impl<C> Session<C>
where C: Compiler
{
    pub fn with_compiler(compiler: C, settings: Settings) -> Self {
        let rng: StdRng
            = match settings.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
        let buckets: usize = settings.buckets.max(1);
        return Self {
            compiler,
            settings,
            density: None,
            next_version: 0,
            samples: Vec::new(),
            buckets,
            rng,
            notify: Box::new(Silent),
        };
    }

    /// Send notifications to `notify` from now on.
    pub fn with_notify<N>(mut self, notify: N) -> Self
    where N: Notify + 'static
    {
        self.notify = Box::new(notify);
        return self;
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    /// Text of the current density, if one has been accepted.
    pub fn expression(&self) -> Option<&str> {
        return self.density.as_ref().map(|d| d.text.as_str());
    }

    /// Version of the current density, if one has been accepted. Versions
    /// increase with every accepted edit.
    pub fn version(&self) -> Option<u64> {
        return self.density.as_ref().map(|d| d.version);
    }

    /// Every stored sample, in the order drawn.
    pub fn samples(&self) -> &[Sample] { &self.samples }

    pub fn bucket_count(&self) -> usize { self.buckets }

    /// Validate `text` and, if it describes a normalized density, make it the
    /// current one.
    ///
    /// A rejected expression leaves the current density and samples in place.
    pub fn set_expression(&mut self, text: &str) -> Report {
        let outcome: Validation<C::Output>
            = validate::validate(
                &self.compiler, text, &self.settings.validate_options());
        let report: Report = outcome.report();
        self.notify.validation(&report);
        if let Validation::Valid(valid) = outcome {
            let version: u64 = self.next_version;
            self.next_version += 1;
            self.density = Some(
                Density {
                    evaluator: Rc::new(valid.density),
                    text: text.to_string(),
                    version,
                }
            );
            info!(text, version, "density replaced");
            if self.settings.stale == StalePolicy::Clear && !self.samples.is_empty() {
                self.samples.clear();
                self.notify.status(&Status::Cleared);
            }
            self.notify.curve_changed();
        }
        return report;
    }

    /// Start a batch of `count` draws from the current density.
    pub fn generate(&mut self, count: usize) -> SessionResult<Batch> {
        let density: &Density
            = self.density.as_ref().ok_or(SessionError::NoDensity)?;
        if count == 0 {
            return Err(SessionError::NoSamples);
        }
        let batch = Batch {
            sampler: InverseCdf::new(
                Rc::clone(&density.evaluator),
                self.settings.inverse_options(),
            ),
            version: density.version,
            requested: count,
            attempted: 0,
            drawn: Vec::with_capacity(count),
            failures: 0,
            chunk_size: self.settings.chunk_size.max(1),
            rng: StdRng::seed_from_u64(self.rng.gen()),
            cancelled: false,
        };
        self.notify.status(&Status::Generating { requested: count });
        return Ok(batch);
    }

    /// Store the draws of a finished batch.
    ///
    /// A cancelled batch is dropped without touching the stored samples.
    pub fn commit(&mut self, batch: Batch) -> SessionResult<Status> {
        if batch.is_cancelled() {
            let status = Status::Cancelled { discarded: batch.drawn.len() };
            info!(discarded = batch.drawn.len(), "sampling batch cancelled");
            self.notify.status(&status);
            return Ok(status);
        }
        if !batch.is_finished() {
            let Progress { done, total, .. } = batch.progress();
            return Err(SessionError::Unfinished { done, total });
        }
        self.notify.status(&Status::Updating);
        let Batch { drawn, version, failures, .. } = batch;
        let stored: usize = drawn.len();
        self.samples.extend(
            drawn.into_iter().map(|value| Sample { value, version })
        );
        info!(stored, failures, total = self.samples.len(), "samples stored");
        let status = Status::Done { stored, failures };
        self.notify.status(&status);
        return Ok(status);
    }

    /// Work through `batch` chunk by chunk, then commit it.
    ///
    /// `on_chunk` is called after every chunk and may return
    /// `ControlFlow::Break` to cancel the rest of the batch.
    pub fn run_batch<P>(&mut self, mut batch: Batch, mut on_chunk: P)
        -> SessionResult<Status>
    where P: FnMut(&Progress) -> ControlFlow<()>
    {
        while !batch.is_finished() {
            let progress: Progress = batch.step();
            self.notify.status(
                &Status::Progress {
                    done: progress.done,
                    total: progress.total,
                    failures: progress.failures,
                }
            );
            if on_chunk(&progress).is_break() {
                batch.cancel();
            }
        }
        return self.commit(batch);
    }

    /// Draw `count` samples from the current density and store them.
    pub fn sample(&mut self, count: usize) -> SessionResult<Status> {
        let batch: Batch = self.generate(count)?;
        return self.run_batch(batch, |_| ControlFlow::Continue(()));
    }

    /// Discard every stored sample.
    pub fn clear(&mut self) {
        info!(discarded = self.samples.len(), "samples cleared");
        self.samples.clear();
        self.notify.status(&Status::Cleared);
    }

    /// Change the number of histogram buckets and rebin the stored samples.
    pub fn set_bucket_count(&mut self, buckets: usize)
        -> SessionResult<Vec<(f64, f64)>>
    {
        if buckets == 0 {
            return Err(HistError::NoBuckets.into());
        }
        self.notify.status(&Status::Updating);
        self.buckets = buckets;
        let hist: Vec<(f64, f64)> = self.histogram()?;
        let stored: usize = self.active_samples().count();
        self.notify.status(&Status::Done { stored, failures: 0 });
        return Ok(hist);
    }

    fn active_samples(&self) -> impl Iterator<Item = &Sample> + '_ {
        let current: Option<u64>
            = match self.settings.stale {
                StalePolicy::Filter => self.version(),
                StalePolicy::Keep | StalePolicy::Clear => None,
            };
        return self.samples.iter()
            .filter(move |s| current.map_or(true, |v| s.version == v));
    }

    /// Bin the stored samples; under [`StalePolicy::Filter`] only those drawn
    /// from the current density are counted.
    pub fn histogram(&self) -> SessionResult<Vec<(f64, f64)>> {
        let values: Vec<f64> = self.active_samples().map(|s| s.value).collect();
        return Ok(histogram::histogram(&values, self.buckets)?);
    }

    /// Plot points of the current density.
    pub fn curve(&self) -> Option<Curve> {
        return self.density.as_ref()
            .map(|d| {
                curve::sample_curve(
                    d.evaluator.as_ref(), self.settings.curve_end, CURVE_SPACING)
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{ Event, Recorder };

    fn seeded(stale: StalePolicy) -> Settings {
        return Settings {
            seed: Some(1234),
            chunk_size: 100,
            stale,
            ..Settings::default()
        };
    }

    #[test]
    fn sampling_requires_a_density() {
        let mut session = Session::new(seeded(StalePolicy::Clear));
        assert_eq!(session.generate(10).err(), Some(SessionError::NoDensity));
        assert!(!session.set_expression("x").ok);
        assert_eq!(session.generate(10).err(), Some(SessionError::NoDensity));
        assert!(session.set_expression("2x").ok);
        assert_eq!(session.generate(0).err(), Some(SessionError::NoSamples));
    }

    #[test]
    fn batches_are_chunked() {
        let mut session = Session::new(seeded(StalePolicy::Clear));
        session.set_expression("1");
        let mut batch = session.generate(250).unwrap();
        assert_eq!(batch.step(), Progress { done: 100, total: 250, failures: 0 });
        assert_eq!(batch.step().done, 200);
        assert!(!batch.is_finished());
        assert_eq!(batch.step().done, 250);
        assert!(batch.is_finished());
        assert_eq!(batch.step().done, 250);
        assert_eq!(batch.drawn().len(), 250);
        assert!(batch.drawn().iter().all(|x| (0.0..=1.0).contains(x)));
    }

    #[test]
    fn unfinished_batches_cannot_be_committed() {
        let mut session = Session::new(seeded(StalePolicy::Clear));
        session.set_expression("1");
        let mut batch = session.generate(250).unwrap();
        batch.step();
        assert_eq!(
            session.commit(batch).err(),
            Some(SessionError::Unfinished { done: 100, total: 250 }),
        );
        assert!(session.samples().is_empty());
    }

    #[test]
    fn cancelling_discards_the_batch() {
        let rec = Recorder::new();
        let mut session = Session::new(seeded(StalePolicy::Clear)).with_notify(rec.clone());
        session.set_expression("1");
        let batch = session.generate(1000).unwrap();
        let mut chunks: usize = 0;
        let status = session.run_batch(batch, |_| {
            chunks += 1;
            if chunks == 3 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
        }).unwrap();
        assert_eq!(chunks, 3);
        assert_eq!(status, Status::Cancelled { discarded: 300 });
        assert!(session.samples().is_empty());
        assert_eq!(rec.statuses().last(), Some(&Status::Cancelled { discarded: 300 }));
    }

    #[test]
    fn stale_samples_are_cleared_by_default() {
        let rec = Recorder::new();
        let mut session = Session::new(seeded(StalePolicy::Clear)).with_notify(rec.clone());
        session.set_expression("1");
        session.sample(50).unwrap();
        assert_eq!(session.samples().len(), 50);
        rec.clear();
        assert!(session.set_expression("2x").ok);
        assert!(session.samples().is_empty());
        let events = rec.events();
        assert!(matches!(events[0], Event::Validation(ref r) if r.ok));
        assert_eq!(events[1], Event::Status(Status::Cleared));
        assert_eq!(events[2], Event::CurveChanged);
    }

    #[test]
    fn rejected_edits_keep_the_old_density() {
        let mut session = Session::new(seeded(StalePolicy::Clear));
        session.set_expression("2x");
        session.sample(20).unwrap();
        let report = session.set_expression("x");
        assert!(!report.ok);
        assert_eq!(session.expression(), Some("2x"));
        assert_eq!(session.version(), Some(0));
        assert_eq!(session.samples().len(), 20);
    }

    #[test]
    fn kept_samples_accumulate_across_edits() {
        let mut session = Session::new(seeded(StalePolicy::Keep));
        session.set_expression("1");
        session.sample(30).unwrap();
        session.set_expression("2x");
        session.sample(20).unwrap();
        assert_eq!(session.samples().len(), 50);
        assert_eq!(session.samples()[0].version, 0);
        assert_eq!(session.samples()[49].version, 1);
        let total: f64 = session.histogram().unwrap().iter().map(|(_, f)| f).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn filtered_samples_bin_only_the_current_density() {
        let mut session = Session::new(seeded(StalePolicy::Filter));
        session.set_expression("1");
        session.sample(30).unwrap();
        session.set_expression("2x");
        assert_eq!(session.samples().len(), 30);
        let hist = session.histogram().unwrap();
        assert!(hist.iter().all(|(_, f)| *f == 0.0));
        session.sample(10).unwrap();
        assert_eq!(session.set_bucket_count(1).unwrap(), vec![(1.0, 1.0)]);
    }

    #[test]
    fn clearing_mid_batch_keeps_the_batch() {
        let mut session = Session::new(seeded(StalePolicy::Keep));
        session.set_expression("1");
        session.sample(40).unwrap();
        let mut batch = session.generate(10).unwrap();
        session.clear();
        while !batch.is_finished() {
            batch.step();
        }
        session.commit(batch).unwrap();
        assert_eq!(session.samples().len(), 10);
    }

    #[test]
    fn batch_outlives_an_edit() {
        let mut session = Session::new(seeded(StalePolicy::Keep));
        session.set_expression("1");
        let mut batch = session.generate(10).unwrap();
        session.set_expression("2x");
        batch.step();
        assert_eq!(batch.version(), 0);
        session.commit(batch).unwrap();
        assert!(session.samples().iter().all(|s| s.version == 0));
        assert_eq!(session.version(), Some(1));
    }

    #[test]
    fn bucket_count_is_reapplied() {
        let mut session = Session::new(seeded(StalePolicy::Clear));
        assert_eq!(session.bucket_count(), 20);
        session.set_expression("1");
        session.sample(100).unwrap();
        let hist = session.set_bucket_count(4).unwrap();
        assert_eq!(hist.len(), 4);
        assert_eq!(session.bucket_count(), 4);
        assert_eq!(session.set_bucket_count(0).err(), Some(SessionError::Hist(HistError::NoBuckets)));
        assert_eq!(session.bucket_count(), 4);
    }

    #[test]
    fn curve_follows_the_density() {
        let mut session = Session::new(seeded(StalePolicy::Clear));
        assert!(session.curve().is_none());
        session.set_expression("2x");
        let curve = session.curve().unwrap();
        assert_eq!(curve.points.len(), 111);
        assert_eq!(curve.skipped, 0);
    }

    #[test]
    fn seeded_sessions_repeat_themselves() {
        let draw = || {
            let mut session = Session::new(seeded(StalePolicy::Clear));
            session.set_expression("3x^2");
            session.sample(25).unwrap();
            session.samples().iter().map(|s| s.value).collect::<Vec<f64>>()
        };
        assert_eq!(draw(), draw());
    }
}
