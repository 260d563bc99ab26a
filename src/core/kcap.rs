//! Reference region: k-cap competitive activation with Hebbian plasticity.
//!
//! This is a small, self-contained implementation of the [`Region`] contract
//! used to exercise the network and orchestration layers. It does not model
//! any particular substrate's learning rule.
//!
//! Each step:
//! - every minicolumn sums its proximal weights over the active input bits;
//! - every neuron sums distal weights from the previous step's active set;
//! - a column scores `feedforward + best distal drive of its cells`, and the
//!   `cap` best columns with a positive score fire, one cell each (the cell with
//!   the strongest distal drive, lowest index on ties);
//! - when learning, synapses from active inputs / previously active neurons onto
//!   the winners are scaled by `1 + plasticity`.
//!
//! Zero drive produces no spikes, so a silent input on a silent context is a
//! no-op.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::error::RegionError;
use crate::prng::Prng;
use crate::region::{Region, RegionOutput, SynapseMatrix};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KCapConfig {
    pub input_width: usize,
    pub neuron_count: usize,
    /// Neurons per minicolumn. Must divide `neuron_count`.
    pub column_width: usize,
    /// Number of winning columns per step.
    pub cap: usize,

    // Connection probabilities for the random initial wiring.
    pub proximal_density: f32,
    pub distal_density: f32,

    // Multiplicative Hebbian rates.
    pub proximal_plasticity: f32,
    pub distal_plasticity: f32,

    /// Minimum distal drive from the active set for a neuron to be predictive.
    pub predictive_threshold: f32,
    /// Upper bound on any single synapse weight.
    pub max_weight: f32,

    // If set, makes wiring reproducible for evaluation.
    pub seed: Option<u64>,
}

impl Default for KCapConfig {
    /// 1000 inputs onto 1000 neurons, 30 winners per step.
    fn default() -> Self {
        Self {
            input_width: 1000,
            neuron_count: 1000,
            column_width: 1,
            cap: 30,
            proximal_density: 0.1,
            distal_density: 0.05,
            proximal_plasticity: 0.1,
            distal_plasticity: 0.1,
            predictive_threshold: 3.0,
            max_weight: 1000.0,
            seed: None,
        }
    }
}

impl KCapConfig {
    pub fn with_size(input_width: usize, neuron_count: usize, cap: usize) -> Self {
        Self {
            input_width,
            neuron_count,
            cap,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_column_width(mut self, column_width: usize) -> Self {
        self.column_width = column_width;
        self
    }

    pub fn column_count(&self) -> usize {
        self.neuron_count / self.column_width.max(1)
    }

    /// Validate the configuration, returning an error message if invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.input_width == 0 {
            return Err("input_width must be > 0");
        }
        if self.neuron_count == 0 {
            return Err("neuron_count must be > 0");
        }
        if self.column_width == 0 || self.neuron_count % self.column_width != 0 {
            return Err("column_width must divide neuron_count");
        }
        if self.cap == 0 || self.cap > self.column_count() {
            return Err("cap must be in [1, column_count]");
        }
        for p in [self.proximal_density, self.distal_density] {
            if !(0.0..=1.0).contains(&p) {
                return Err("connection densities must be in [0, 1]");
            }
        }
        for rate in [self.proximal_plasticity, self.distal_plasticity] {
            if !rate.is_finite() || rate < 0.0 {
                return Err("plasticity must be finite and >= 0");
            }
        }
        if !self.predictive_threshold.is_finite() || self.predictive_threshold <= 0.0 {
            return Err("predictive_threshold must be finite and > 0");
        }
        if !self.max_weight.is_finite() || self.max_weight < 1.0 {
            return Err("max_weight must be finite and >= 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct KCapRegion {
    cfg: KCapConfig,
    /// Row per column, `input_width` entries each.
    proximal: Vec<f32>,
    distal: SynapseMatrix,
    /// Active set of the previous step: source of distal drive.
    context: Activation,
}

impl KCapRegion {
    pub fn new(cfg: KCapConfig) -> Result<Self, RegionError> {
        cfg.validate().map_err(RegionError::InvalidConfig)?;
        let mut rng = Prng::new(cfg.seed.unwrap_or(1));

        let columns = cfg.column_count();
        let mut proximal = Vec::with_capacity(columns * cfg.input_width);
        for _ in 0..columns * cfg.input_width {
            proximal.push(if rng.gen_bool(cfg.proximal_density) {
                1.0
            } else {
                0.0
            });
        }

        // Random recurrent wiring, no autapses.
        let n = cfg.neuron_count;
        let mut distal = SynapseMatrix::zeros(n);
        for pre in 0..n {
            for post in 0..n {
                if pre != post && rng.gen_bool(cfg.distal_density) {
                    distal.set(pre, post, 1.0);
                }
            }
        }

        Ok(Self {
            cfg,
            proximal,
            distal,
            context: Activation::silent(n),
        })
    }

    pub fn config(&self) -> &KCapConfig {
        &self.cfg
    }

    /// Active set that will provide distal drive on the next step.
    pub fn context(&self) -> &Activation {
        &self.context
    }

    pub fn proximal_weight(&self, column: usize, input: usize) -> f32 {
        self.proximal[column * self.cfg.input_width + input]
    }

    /// Winning `(column, cell)` pairs, best first.
    fn compete(&self, input: &Activation, context: &Activation) -> Vec<(usize, usize)> {
        let iw = self.cfg.input_width;
        let cw = self.cfg.column_width;
        let inputs: Vec<usize> = input.active_indices().take_while(|&i| i < iw).collect();

        let mut distal_drive = vec![0.0f32; self.cfg.neuron_count];
        for pre in context.active_indices() {
            for (acc, w) in distal_drive.iter_mut().zip(self.distal.row(pre)) {
                *acc += w;
            }
        }

        let mut scored: Vec<(f32, usize, usize)> = Vec::new();
        for col in 0..self.cfg.column_count() {
            let row = &self.proximal[col * iw..(col + 1) * iw];
            let feedforward: f32 = inputs.iter().map(|&i| row[i]).sum();

            let mut best = col * cw;
            for cell in (col * cw + 1)..((col + 1) * cw) {
                if distal_drive[cell] > distal_drive[best] {
                    best = cell;
                }
            }

            let score = feedforward + distal_drive[best];
            if score > 0.0 {
                scored.push((score, col, best));
            }
        }

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(self.cfg.cap);
        scored.into_iter().map(|(_, col, cell)| (col, cell)).collect()
    }

    fn predict(&self, active: &Activation) -> Activation {
        let mut drive = vec![0.0f32; self.cfg.neuron_count];
        for pre in active.active_indices() {
            for (acc, w) in drive.iter_mut().zip(self.distal.row(pre)) {
                *acc += w;
            }
        }
        let thr = self.cfg.predictive_threshold;
        Activation::from_indices(
            self.cfg.neuron_count,
            drive
                .iter()
                .enumerate()
                .filter(|(_, d)| **d >= thr)
                .map(|(i, _)| i),
        )
    }

    fn learn(&mut self, input: &Activation, winners: &[(usize, usize)]) {
        let iw = self.cfg.input_width;
        let max_w = self.cfg.max_weight;
        let grow_p = 1.0 + self.cfg.proximal_plasticity;
        let grow_d = 1.0 + self.cfg.distal_plasticity;
        let inputs: Vec<usize> = input.active_indices().take_while(|&i| i < iw).collect();
        let prev: Vec<usize> = self.context.active_indices().collect();

        for &(col, cell) in winners {
            let row = &mut self.proximal[col * iw..(col + 1) * iw];
            for &i in &inputs {
                if row[i] > 0.0 {
                    row[i] = (row[i] * grow_p).min(max_w);
                }
            }
            for &pre in &prev {
                let w = &mut self.distal.row_mut(pre)[cell];
                if *w > 0.0 {
                    *w = (*w * grow_d).min(max_w);
                }
            }
        }
    }

    fn activation_of(&self, winners: &[(usize, usize)]) -> Activation {
        Activation::from_indices(
            self.cfg.neuron_count,
            winners.iter().map(|&(_, cell)| cell),
        )
    }
}

impl Region for KCapRegion {
    fn input_width(&self) -> usize {
        self.cfg.input_width
    }

    fn width(&self) -> usize {
        self.cfg.neuron_count
    }

    fn column_width(&self) -> usize {
        self.cfg.column_width
    }

    fn step(&mut self, input: &Activation, learn: bool) -> RegionOutput {
        let winners = self.compete(input, &self.context);
        if learn {
            self.learn(input, &winners);
        }
        let active = self.activation_of(&winners);
        let predictive = self.predict(&active);
        self.context = active.clone();
        RegionOutput { active, predictive }
    }

    fn read(&self, input: &Activation) -> RegionOutput {
        let winners = self.compete(input, &self.context);
        let active = self.activation_of(&winners);
        let predictive = self.predict(&active);
        RegionOutput { active, predictive }
    }

    fn reset(&mut self) {
        self.context = Activation::silent(self.cfg.neuron_count);
    }

    fn distal_weights(&self) -> &SynapseMatrix {
        &self.distal
    }

    fn clone_region(&self) -> Box<dyn Region> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::sparse_random;
    use crate::metrics::convergence;

    fn small(seed: u64) -> KCapRegion {
        let mut cfg = KCapConfig::with_size(64, 120, 8).with_seed(seed);
        cfg.distal_density = 0.2;
        KCapRegion::new(cfg).unwrap()
    }

    fn stimulus(len: usize, seed: u64) -> Activation {
        sparse_random(len, 0.15, &mut Prng::new(seed)).unwrap()
    }

    #[test]
    fn validate_rejects_bad_shapes() {
        let mut cfg = KCapConfig::with_size(10, 12, 3);
        assert!(cfg.validate().is_ok());
        cfg.column_width = 5;
        assert!(cfg.validate().is_err());
        cfg.column_width = 4;
        cfg.cap = 4;
        assert!(cfg.validate().is_err());
        assert!(matches!(
            KCapRegion::new(cfg),
            Err(RegionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn silent_input_on_fresh_region_is_a_noop() {
        let mut region = small(1);
        let before = region.clone();
        let out = region.step(&Activation::silent(64), true);
        assert!(out.active.is_silent());
        assert_eq!(region.distal.as_slice(), before.distal.as_slice());
        assert_eq!(region.proximal, before.proximal);
        assert!(region.context().is_silent());
    }

    #[test]
    fn step_fires_at_most_cap_neurons() {
        let mut region = small(2);
        let x = stimulus(64, 9);
        for _ in 0..5 {
            let out = region.step(&x, true);
            assert!(out.active.count() <= 8);
            assert!(out.active.count() > 0);
            assert_eq!(out.active.len(), 120);
        }
    }

    #[test]
    fn one_cell_per_minicolumn() {
        let cfg = KCapConfig::with_size(64, 120, 10)
            .with_column_width(4)
            .with_seed(3);
        let mut region = KCapRegion::new(cfg).unwrap();
        let x = stimulus(64, 4);
        for _ in 0..6 {
            let out = region.step(&x, true);
            let cells: Vec<usize> = out.active.active_indices().collect();
            let mut columns: Vec<usize> = cells.iter().map(|c| c / 4).collect();
            columns.dedup();
            assert_eq!(columns.len(), cells.len());
        }
    }

    #[test]
    fn read_leaves_state_untouched() {
        let mut region = small(5);
        let x = stimulus(64, 6);
        region.step(&x, true);
        let before = region.clone();
        let first = region.read(&x);
        let second = region.read(&x);
        assert_eq!(first, second);
        assert_eq!(region.context(), before.context());
        assert_eq!(region.distal.as_slice(), before.distal.as_slice());
    }

    #[test]
    fn learning_is_gated() {
        let x = stimulus(64, 8);
        let mut frozen = small(7);
        let mut plastic = small(7);
        frozen.step(&x, false);
        frozen.step(&x, false);
        plastic.step(&x, true);
        plastic.step(&x, true);
        assert_eq!(frozen.distal.as_slice(), small(7).distal.as_slice());
        assert_ne!(plastic.proximal, small(7).proximal);
        assert_ne!(plastic.distal.as_slice(), small(7).distal.as_slice());

        let fresh = small(7);
        let columns = fresh.config().column_count();
        let pairs = || (0..columns).flat_map(|c| (0..64).map(move |i| (c, i)));
        assert!(pairs().all(|(c, i)| {
            frozen.proximal_weight(c, i) == fresh.proximal_weight(c, i)
        }));
        assert!(pairs().any(|(c, i)| {
            plastic.proximal_weight(c, i) > fresh.proximal_weight(c, i)
        }));
        assert!(pairs().all(|(c, i)| {
            plastic.proximal_weight(c, i) >= fresh.proximal_weight(c, i)
        }));
    }

    #[test]
    fn reset_clears_context_only() {
        let mut region = small(9);
        let x = stimulus(64, 10);
        region.step(&x, true);
        let learned = region.distal.clone();
        region.reset();
        assert!(region.context().is_silent());
        assert_eq!(region.distal, learned);
    }

    #[test]
    fn fixed_stimulus_converges() {
        let density = 1.0 / (20000.0f32 / 15.0).sqrt();
        let mut region = KCapRegion::new(KCapConfig::default().with_seed(42)).unwrap();
        let x = sparse_random(1000, density, &mut Prng::new(4242)).unwrap();

        let outputs: Vec<Activation> = (0..60).map(|_| region.step(&x, true).active).collect();
        let c = convergence(&outputs, 5);
        assert_eq!(c.len(), 60);
        for (t, v) in c.iter().enumerate().skip(20) {
            assert!(*v < 0.05, "convergence {v} at step {t}");
        }
    }
}
