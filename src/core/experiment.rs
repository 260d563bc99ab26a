//! Experiment orchestration: many independent simulations of one subject,
//! run on a bounded worker pool and aggregated into time series.
//!
//! Each experiment owns a deep copy of the subject and a private PRNG seeded
//! from `(spec.seed, index)`, so results depend only on the spec and the
//! experiment index, never on scheduling. Experiments share nothing but a
//! read-only spec and a cancellation flag.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::activation::Activation;
use crate::assembly::sparse_random;
use crate::config::SimulationConfig;
use crate::error::{AssemblyError, ExperimentError};
use crate::metrics::{convergence, interconnection_density, interconnection_measure};
use crate::network::Network;
use crate::prng::Prng;
use crate::region::{checked_step, Region, RegionOutput};

/// The thing being simulated.
#[derive(Debug, Clone)]
pub enum Subject {
    Region(Box<dyn Region>),
    Network(Network),
}

impl Subject {
    /// Number of stimuli consumed per step.
    pub fn input_count(&self) -> usize {
        match self {
            Subject::Region(_) => 1,
            Subject::Network(net) => net.input_count(),
        }
    }

    /// Expected stimulus widths; `None` where any width is accepted.
    pub fn input_widths(&self) -> Vec<Option<usize>> {
        match self {
            Subject::Region(r) => vec![Some(r.input_width())],
            Subject::Network(net) => (0..net.input_count()).map(|k| net.input_width(k)).collect(),
        }
    }

    pub fn region_count(&self) -> usize {
        match self {
            Subject::Region(_) => 1,
            Subject::Network(net) => net.region_count(),
        }
    }

    pub fn region(&self, index: usize) -> Option<&dyn Region> {
        match self {
            Subject::Region(r) if index == 0 => Some(r.as_ref()),
            Subject::Region(_) => None,
            Subject::Network(net) => net.region(index),
        }
    }

    fn advance(
        &mut self,
        stimuli: &[Activation],
    ) -> Result<(Vec<RegionOutput>, Vec<Activation>), ExperimentError> {
        match self {
            Subject::Region(region) => {
                let [stimulus] = stimuli else {
                    return Err(ExperimentError::InvalidSpec(
                        "a region subject takes exactly one stimulus",
                    ));
                };
                let out = checked_step(region.as_mut(), stimulus, true)?;
                let external = vec![out.active.clone()];
                Ok((vec![out], external))
            }
            Subject::Network(net) => {
                let tick = net.step(stimuli)?;
                Ok((tick.regions, tick.outputs))
            }
        }
    }
}

/// Where each step's stimuli come from.
#[derive(Debug, Clone, PartialEq)]
pub enum StimulusPolicy {
    /// The same stimuli (one per input) for every step of every experiment.
    Fixed(Vec<Activation>),
    /// Sampled once per experiment from its own PRNG, then held fixed.
    PerExperiment { density: f32 },
    /// Freshly sampled at every step.
    PerStep { density: f32 },
    /// Caller-provided stimuli, indexed by experiment.
    Explicit(Vec<Vec<Activation>>),
}

/// Optional per-node measurements. Activations are always recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurements {
    pub interconnection: bool,
    pub density: bool,
}

impl Measurements {
    pub fn all() -> Self {
        Self {
            interconnection: true,
            density: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExperimentSpec {
    pub subject: Subject,
    pub stimulus: StimulusPolicy,
    /// Steps per experiment.
    pub horizon: usize,
    pub measurements: Measurements,
    /// Base seed; experiment `i` runs with `derive_seed(seed, i)`.
    pub seed: u64,
}

impl ExperimentSpec {
    pub fn new(subject: Subject, stimulus: StimulusPolicy, horizon: usize) -> Self {
        Self {
            subject,
            stimulus,
            horizon,
            measurements: Measurements::default(),
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_measurements(mut self, measurements: Measurements) -> Self {
        self.measurements = measurements;
        self
    }

    pub fn experiment_seed(&self, index: usize) -> u64 {
        Prng::derive_seed(self.seed, index as u64)
    }

    /// Checks that do not depend on the experiment index. Explicit stimuli
    /// are checked when they are used, so one bad entry fails one experiment.
    pub fn validate(&self) -> Result<(), ExperimentError> {
        if self.horizon == 0 {
            return Err(ExperimentError::InvalidSpec("horizon must be positive"));
        }
        match &self.stimulus {
            StimulusPolicy::Fixed(stimuli) => {
                if stimuli.len() != self.subject.input_count() {
                    return Err(ExperimentError::InvalidSpec(
                        "fixed stimuli must match the subject's input count",
                    ));
                }
            }
            StimulusPolicy::PerExperiment { density } | StimulusPolicy::PerStep { density } => {
                if !(0.0..=1.0).contains(density) {
                    return Err(AssemblyError::DensityOutOfRange(*density).into());
                }
                if self.subject.input_widths().iter().any(Option::is_none) {
                    return Err(ExperimentError::InvalidSpec(
                        "cannot sample stimuli for an input that feeds no region",
                    ));
                }
            }
            StimulusPolicy::Explicit(_) => {}
        }
        Ok(())
    }
}

/// Measurements of one real node at one step.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub active: Activation,
    pub predictive: Activation,
    pub interconnection: Option<f32>,
    pub density: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    /// One entry per real region, in declaration order.
    pub nodes: Vec<NodeRecord>,
    /// External outputs. A bare region's output is its active set.
    pub outputs: Vec<Activation>,
}

#[derive(Debug, Clone)]
pub struct ExperimentResult {
    pub index: usize,
    pub seed: u64,
    pub steps: Vec<StepRecord>,
    /// Subject after the last step, learned state included.
    pub final_state: Subject,
}

impl ExperimentResult {
    /// Active sets of region `node` over time.
    pub fn active_series(&self, node: usize) -> Vec<Activation> {
        self.steps
            .iter()
            .filter_map(|s| s.nodes.get(node).map(|n| n.active.clone()))
            .collect()
    }

    pub fn output_series(&self, output: usize) -> Vec<Activation> {
        self.steps
            .iter()
            .filter_map(|s| s.outputs.get(output).cloned())
            .collect()
    }
}

/// Cooperative cancellation, checked at step boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear the flag so the token can govern another batch.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Run experiment `index` of `spec` on the calling thread.
pub fn run_experiment(
    spec: &ExperimentSpec,
    index: usize,
    cancel: &CancelToken,
) -> Result<ExperimentResult, ExperimentError> {
    spec.validate()?;
    let seed = spec.experiment_seed(index);
    let mut rng = Prng::new(seed);
    let mut subject = spec.subject.clone();
    let widths = subject.input_widths();

    let held: Option<Vec<Activation>> = match &spec.stimulus {
        StimulusPolicy::Fixed(stimuli) => Some(stimuli.clone()),
        StimulusPolicy::PerExperiment { density } => Some(sample(&widths, *density, &mut rng)?),
        StimulusPolicy::PerStep { .. } => None,
        StimulusPolicy::Explicit(per_experiment) => Some(
            per_experiment
                .get(index)
                .cloned()
                .ok_or(ExperimentError::InvalidSpec("no explicit stimuli for this experiment"))?,
        ),
    };

    debug!(index, seed, horizon = spec.horizon, "experiment started");
    let mut steps = Vec::with_capacity(spec.horizon);
    for step in 0..spec.horizon {
        if cancel.is_cancelled() {
            return Err(ExperimentError::Cancelled { step });
        }
        let fresh;
        let stimuli = match (&held, &spec.stimulus) {
            (Some(held), _) => held.as_slice(),
            (None, StimulusPolicy::PerStep { density }) => {
                fresh = sample(&widths, *density, &mut rng)?;
                fresh.as_slice()
            }
            (None, _) => return Err(ExperimentError::InvalidSpec("no stimulus source")),
        };

        let (outputs, external) = subject.advance(stimuli)?;
        let nodes = outputs
            .into_iter()
            .enumerate()
            .map(|(i, out)| measure(&subject, i, out, spec.measurements))
            .collect();
        steps.push(StepRecord {
            step,
            nodes,
            outputs: external,
        });
    }
    debug!(index, "experiment finished");

    Ok(ExperimentResult {
        index,
        seed,
        steps,
        final_state: subject,
    })
}

fn sample(
    widths: &[Option<usize>],
    density: f32,
    rng: &mut Prng,
) -> Result<Vec<Activation>, ExperimentError> {
    widths
        .iter()
        .map(|w| {
            let w = w.ok_or(ExperimentError::InvalidSpec(
                "cannot sample stimuli for an input that feeds no region",
            ))?;
            Ok(sparse_random(w, density, rng)?)
        })
        .collect()
}

fn measure(subject: &Subject, node: usize, out: RegionOutput, m: Measurements) -> NodeRecord {
    let weights = subject.region(node).map(|r| r.distal_weights());
    let interconnection = match weights {
        Some(w) if m.interconnection => Some(interconnection_measure(&out.active, w)),
        _ => None,
    };
    let density = match weights {
        Some(w) if m.density => Some(interconnection_density(&out.active, w)),
        _ => None,
    };
    NodeRecord {
        active: out.active,
        predictive: out.predictive,
        interconnection,
        density,
    }
}

/// `run_experiment` with panics turned into that experiment's failure.
fn run_guarded(
    spec: &ExperimentSpec,
    index: usize,
    cancel: &CancelToken,
) -> Result<ExperimentResult, ExperimentError> {
    match catch_unwind(AssertUnwindSafe(|| run_experiment(spec, index, cancel))) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ExperimentError::Panicked(msg))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentFailure {
    pub index: usize,
    pub error: ExperimentError,
}

/// Outcome of a batch: successes sorted by experiment index, plus failures.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub experiments: Vec<ExperimentResult>,
    pub failures: Vec<ExperimentFailure>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Regroup per-step values as `[time][experiment]`, truncated to the
    /// shortest experiment.
    pub fn transpose<T, F>(&self, f: F) -> Vec<Vec<T>>
    where
        F: Fn(&StepRecord) -> T,
    {
        let len = self
            .experiments
            .iter()
            .map(|e| e.steps.len())
            .min()
            .unwrap_or(0);
        (0..len)
            .map(|t| self.experiments.iter().map(|e| f(&e.steps[t])).collect())
            .collect()
    }

    /// Cross-experiment median of a scalar per step.
    pub fn median_series<F>(&self, f: F) -> Vec<f32>
    where
        F: Fn(&StepRecord) -> f32,
    {
        self.transpose(f).iter().map(|col| median(col)).collect()
    }

    /// Convergence series of region `node`, one per experiment.
    pub fn convergence(&self, node: usize, window: usize) -> Vec<Vec<f32>> {
        self.experiments
            .iter()
            .map(|e| convergence(&e.active_series(node), window))
            .collect()
    }

    pub fn median_convergence(&self, node: usize, window: usize) -> Vec<f32> {
        let series = self.convergence(node, window);
        let len = series.iter().map(Vec::len).min().unwrap_or(0);
        (0..len)
            .map(|t| {
                let col: Vec<f32> = series.iter().map(|s| s[t]).collect();
                median(&col)
            })
            .collect()
    }
}

/// Median under IEEE total order; NaN for an empty slice.
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Runs batches of experiments on at most `max_parallelism` threads.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    max_parallelism: usize,
    cancel: CancelToken,
}

impl Default for Orchestrator {
    fn default() -> Self {
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(threads)
    }
}

impl Orchestrator {
    pub fn new(max_parallelism: usize) -> Self {
        Self {
            max_parallelism: max_parallelism.max(1),
            cancel: CancelToken::new(),
        }
    }

    pub fn from_config(cfg: &SimulationConfig) -> Self {
        Self::new(cfg.max_parallelism)
    }

    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Shared flag; cancelling it stops every experiment of the running batch
    /// at its next step boundary. Each `run` clears it before starting.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run experiments `0..count`. An invalid spec fails the whole batch;
    /// anything else fails only the experiment it happens in.
    pub fn run(&self, spec: &ExperimentSpec, count: usize) -> Result<BatchResult, ExperimentError> {
        spec.validate()?;
        self.cancel.reset();
        info!(
            experiments = count,
            threads = self.max_parallelism,
            horizon = spec.horizon,
            "batch started"
        );

        let mut batch = BatchResult::default();
        for (index, outcome) in self.run_all(spec, count) {
            match outcome {
                Ok(result) => batch.experiments.push(result),
                Err(error) => {
                    warn!(index, %error, "experiment failed");
                    batch.failures.push(ExperimentFailure { index, error });
                }
            }
        }
        batch.experiments.sort_by_key(|e| e.index);
        batch.failures.sort_by_key(|f| f.index);

        info!(
            succeeded = batch.experiments.len(),
            failed = batch.failures.len(),
            "batch finished"
        );
        Ok(batch)
    }

    fn run_sequential(
        &self,
        spec: &ExperimentSpec,
        count: usize,
    ) -> Vec<(usize, Result<ExperimentResult, ExperimentError>)> {
        (0..count)
            .map(|i| (i, run_guarded(spec, i, &self.cancel)))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn run_all(
        &self,
        spec: &ExperimentSpec,
        count: usize,
    ) -> Vec<(usize, Result<ExperimentResult, ExperimentError>)> {
        use rayon::prelude::*;

        if count <= 1 || self.max_parallelism <= 1 {
            return self.run_sequential(spec, count);
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_parallelism)
            .build()
        {
            Ok(pool) => pool.install(|| {
                (0..count)
                    .into_par_iter()
                    .map(|i| (i, run_guarded(spec, i, &self.cancel)))
                    .collect()
            }),
            Err(err) => {
                warn!(%err, "worker pool unavailable, running sequentially");
                self.run_sequential(spec, count)
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn run_all(
        &self,
        spec: &ExperimentSpec,
        count: usize,
    ) -> Vec<(usize, Result<ExperimentResult, ExperimentError>)> {
        if count <= 1 || self.max_parallelism <= 1 {
            return self.run_sequential(spec, count);
        }

        let threads = self.max_parallelism.min(count);
        let chunk = count.div_ceil(threads);
        let cancel = &self.cancel;
        let mut slots: Vec<Option<Result<ExperimentResult, ExperimentError>>> =
            (0..count).map(|_| None).collect();

        std::thread::scope(|scope| {
            for (c, segment) in slots.chunks_mut(chunk).enumerate() {
                scope.spawn(move || {
                    for (j, slot) in segment.iter_mut().enumerate() {
                        *slot = Some(run_guarded(spec, c * chunk + j, cancel));
                    }
                });
            }
        });

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    Err(ExperimentError::Panicked("worker exited early".to_string()))
                });
                (i, outcome)
            })
            .collect()
    }
}
