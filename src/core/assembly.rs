//! Assembly operations built on the region contract and the network.

use tracing::trace;

use crate::activation::Activation;
use crate::error::AssemblyError;
use crate::network::{Network, NetworkTick};
use crate::prng::Prng;
use crate::region::{checked_read, checked_step, Region, RegionOutput};

/// Projection horizon that comfortably exceeds the measured convergence radius
/// of a single region under a fixed stimulus.
pub const DEFAULT_PROJECTION_STEPS: usize = 30;

/// Stimulate `region` with `stimulus` for `horizon` learning steps and return
/// the final output.
pub fn project(
    region: &mut dyn Region,
    stimulus: &Activation,
    horizon: usize,
) -> Result<RegionOutput, AssemblyError> {
    if horizon == 0 {
        return Err(AssemblyError::ZeroHorizon);
    }
    let mut out = checked_step(region, stimulus, true)?;
    for _ in 1..horizon {
        out = checked_step(region, stimulus, true)?;
    }
    trace!(horizon, active = out.active.count(), "projection settled");
    Ok(out)
}

/// Reciprocal projection: drive a whole network with fixed stimuli for
/// `horizon` ticks and return the final tick.
pub fn project_network(
    network: &mut Network,
    stimuli: &[Activation],
    horizon: usize,
) -> Result<NetworkTick, AssemblyError> {
    if horizon == 0 {
        return Err(AssemblyError::ZeroHorizon);
    }
    let mut tick = network.step(stimuli)?;
    for _ in 1..horizon {
        tick = network.step(stimuli)?;
    }
    Ok(tick)
}

/// What `region` would output for `stimulus` under its predictive context,
/// without altering its synapses.
///
/// Works on a private clone: the stimulus is presented once without learning
/// to establish context, then read. `region` itself is never touched.
pub fn probe(region: &dyn Region, stimulus: &Activation) -> Result<RegionOutput, AssemblyError> {
    let mut scratch = region.clone_region();
    checked_step(scratch.as_mut(), stimulus, false)?;
    Ok(checked_read(scratch.as_ref(), stimulus)?)
}

/// Uniformly random subset of the firing neurons of `activation`, of size
/// `round(fraction * count)`.
pub fn subset(
    activation: &Activation,
    fraction: f32,
    rng: &mut Prng,
) -> Result<Activation, AssemblyError> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(AssemblyError::FractionOutOfRange(fraction));
    }
    let keep = (fraction as f64 * activation.count() as f64).round() as usize;
    let mut out = activation.clone();
    out.subsample_in_place(keep, rng);
    Ok(out)
}

/// Activation of `length` neurons, each firing independently with
/// probability `density`.
pub fn sparse_random(
    length: usize,
    density: f32,
    rng: &mut Prng,
) -> Result<Activation, AssemblyError> {
    if !(0.0..=1.0).contains(&density) {
        return Err(AssemblyError::DensityOutOfRange(density));
    }
    Ok(Activation::from_indices(
        length,
        (0..length).filter(|_| rng.gen_bool(density)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kcap::{KCapConfig, KCapRegion};
    use crate::metrics::overlap;
    use crate::network::NetworkBuilder;
    use crate::region::testing::EchoRegion;

    fn region(seed: u64) -> KCapRegion {
        let mut cfg = KCapConfig::with_size(80, 160, 10).with_seed(seed);
        cfg.distal_density = 0.1;
        KCapRegion::new(cfg).unwrap()
    }

    #[test]
    fn project_returns_final_step() {
        let mut a = region(1);
        let mut b = region(1);
        let x = sparse_random(80, 0.1, &mut Prng::new(2)).unwrap();

        let projected = project(&mut a, &x, 5).unwrap();
        let mut last = None;
        for _ in 0..5 {
            last = Some(b.step(&x, true));
        }
        assert_eq!(Some(projected), last);
    }

    #[test]
    fn project_rejects_zero_horizon() {
        let mut a = region(1);
        let x = Activation::silent(80);
        assert_eq!(project(&mut a, &x, 0), Err(AssemblyError::ZeroHorizon));
    }

    #[test]
    fn project_surfaces_contract_violations() {
        let mut a = region(1);
        let err = project(&mut a, &Activation::silent(3), 2).unwrap_err();
        assert!(matches!(err, AssemblyError::Region(_)));
    }

    #[test]
    fn probe_is_idempotent_and_leaves_weights_untouched() {
        let mut a = region(3);
        let x = sparse_random(80, 0.1, &mut Prng::new(4)).unwrap();
        project(&mut a, &x, DEFAULT_PROJECTION_STEPS).unwrap();

        let weights = a.distal_weights().clone();
        let context = a.context().clone();
        let first = probe(&a, &x).unwrap();
        let second = probe(&a, &x).unwrap();

        assert_eq!(first, second);
        let bits = |m: &crate::region::SynapseMatrix| {
            m.as_slice().iter().map(|w| w.to_bits()).collect::<Vec<_>>()
        };
        assert_eq!(bits(a.distal_weights()), bits(&weights));
        assert_eq!(a.context(), &context);
    }

    #[test]
    fn probe_recovers_assembly_from_partial_cue() {
        let mut a = region(5);
        let mut rng = Prng::new(6);
        let x = sparse_random(80, 0.15, &mut rng).unwrap();
        let assembly = project(&mut a, &x, DEFAULT_PROJECTION_STEPS).unwrap().active;

        let cue = subset(&x, 0.7, &mut rng).unwrap();
        let recalled = probe(&a, &cue).unwrap().active;
        assert!(overlap(&recalled, &assembly) > 0);
    }

    #[test]
    fn subset_cardinality_is_exact() {
        let mut rng = Prng::new(8);
        let x = sparse_random(300, 0.1, &mut rng).unwrap();
        let n = x.count();
        assert_eq!(subset(&x, 1.0, &mut rng).unwrap(), x);
        assert!(subset(&x, 0.0, &mut rng).unwrap().is_silent());
        for f in [0.1f32, 0.25, 0.5, 0.33, 0.9] {
            let s = subset(&x, f, &mut rng).unwrap();
            assert_eq!(s.count(), (f as f64 * n as f64).round() as usize);
            assert_eq!(overlap(&s, &x), s.count());
        }
        assert!(subset(&x, 1.5, &mut rng).is_err());
    }

    #[test]
    fn sparse_random_density_is_approximate() {
        let mut rng = Prng::new(10);
        let x = sparse_random(10_000, 0.05, &mut rng).unwrap();
        assert_eq!(x.len(), 10_000);
        assert!((400..600).contains(&x.count()), "count {}", x.count());
        assert!(sparse_random(10, -0.1, &mut rng).is_err());
    }

    #[test]
    fn project_network_runs_reciprocal_loop() {
        let mut b = NetworkBuilder::new();
        let a = b.add_region(Box::new(EchoRegion::new(6)));
        let c = b.add_region(Box::new(EchoRegion::new(6)));
        let input = b.add_input();
        let output = b.add_output();
        b.connect(input, a);
        b.connect(a, c);
        b.connect(c, a);
        b.connect(c, output);
        let mut net = b.build().unwrap();

        let x = Activation::from_indices(6, [2]);
        let tick = project_network(&mut net, &[x.clone()], 3).unwrap();
        assert_eq!(tick.outputs[0], x);
        assert_eq!(net.tick(), 3);
        assert!(matches!(
            project_network(&mut net, &[x], 0),
            Err(AssemblyError::ZeroHorizon)
        ));
    }
}
