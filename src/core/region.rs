//! The region capability contract.
//!
//! A region is an opaque, stateful processing unit: it takes a sparse input,
//! produces a sparse active set (plus a predictive set), and optionally learns.
//! Everything in this crate consumes regions only through [`Region`], so the
//! memory substrate can be swapped or mocked without touching the network,
//! metric or orchestration code.

use crate::activation::Activation;
use crate::error::RegionError;

/// Result of presenting one input to a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionOutput {
    /// Neurons firing this step.
    pub active: Activation,
    /// Neurons depolarized by distal input from `active` (expected to fire next).
    pub predictive: Activation,
}

impl RegionOutput {
    pub fn silent(width: usize) -> Self {
        Self {
            active: Activation::silent(width),
            predictive: Activation::silent(width),
        }
    }
}

/// Dense square matrix of recurrent (distal) synapse weights.
///
/// `weight(pre, post)` is the strength of the synapse from neuron `pre` onto
/// neuron `post`; zero means no synapse.
#[derive(Debug, Clone, PartialEq)]
pub struct SynapseMatrix {
    size: usize,
    weights: Vec<f32>,
}

impl SynapseMatrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            weights: vec![0.0; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn weight(&self, pre: usize, post: usize) -> f32 {
        self.weights[pre * self.size + post]
    }

    #[inline]
    pub fn set(&mut self, pre: usize, post: usize, weight: f32) {
        self.weights[pre * self.size + post] = weight;
    }

    /// Outgoing weights of `pre`, indexed by postsynaptic neuron.
    #[inline]
    pub fn row(&self, pre: usize) -> &[f32] {
        &self.weights[pre * self.size..(pre + 1) * self.size]
    }

    #[inline]
    pub(crate) fn row_mut(&mut self, pre: usize) -> &mut [f32] {
        &mut self.weights[pre * self.size..(pre + 1) * self.size]
    }

    /// Flat row-major view, for bitwise comparisons of learned state.
    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    /// Number of existing (non-zero) synapses.
    pub fn synapse_count(&self) -> usize {
        self.weights.iter().filter(|w| **w != 0.0).count()
    }
}

/// Capability contract of an external memory substrate.
///
/// Implementations must keep `step` as the only way persistent learned state
/// changes. `read` is a pure function of the current state. `clone_region`
/// must produce a deep copy that never aliases mutable state with its source;
/// the orchestrator relies on this to run experiments without locks.
pub trait Region: Send + Sync {
    /// Width of the proximal input this region accepts.
    fn input_width(&self) -> usize;

    /// Number of neurons, i.e. the width of every produced [`Activation`].
    fn width(&self) -> usize;

    /// Neurons per minicolumn (neurons sharing the same feedforward input).
    fn column_width(&self) -> usize {
        1
    }

    /// Advance one time step. With `learn == false` synapses are left alone,
    /// but the predictive context still advances.
    fn step(&mut self, input: &Activation, learn: bool) -> RegionOutput;

    /// Output for `input` under the current context, without learning and
    /// without advancing the context.
    fn read(&self, input: &Activation) -> RegionOutput;

    /// Clear transient/sequential context. Learned synapses are kept.
    fn reset(&mut self);

    /// Recurrent synapse weights over this region's neurons.
    fn distal_weights(&self) -> &SynapseMatrix;

    fn clone_region(&self) -> Box<dyn Region>;
}

impl Clone for Box<dyn Region> {
    fn clone(&self) -> Self {
        self.clone_region()
    }
}

impl core::fmt::Debug for dyn Region {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Region")
            .field("input_width", &self.input_width())
            .field("width", &self.width())
            .field("column_width", &self.column_width())
            .finish()
    }
}

/// `step` with the contract checked on both sides of the call.
pub fn checked_step(
    region: &mut dyn Region,
    input: &Activation,
    learn: bool,
) -> Result<RegionOutput, RegionError> {
    check_input(region, input)?;
    let out = region.step(input, learn);
    check_output(region, &out)?;
    Ok(out)
}

/// `read` with the contract checked on both sides of the call.
pub fn checked_read(region: &dyn Region, input: &Activation) -> Result<RegionOutput, RegionError> {
    check_input(region, input)?;
    let out = region.read(input);
    check_output(region, &out)?;
    Ok(out)
}

fn check_input(region: &dyn Region, input: &Activation) -> Result<(), RegionError> {
    if input.len() != region.input_width() {
        return Err(RegionError::InputWidth {
            expected: region.input_width(),
            found: input.len(),
        });
    }
    Ok(())
}

fn check_output(region: &dyn Region, out: &RegionOutput) -> Result<(), RegionError> {
    let width = region.width();
    for found in [out.active.len(), out.predictive.len()] {
        if found != width {
            return Err(RegionError::OutputWidth {
                expected: width,
                found,
            });
        }
    }
    Ok(())
}
