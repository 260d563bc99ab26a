//! Metric library over activations.
//!
//! Every function here is pure and total. Where a ratio could divide by zero
//! (silent activations, regions without synapses) the function returns a
//! documented sentinel instead of failing, since silent steps are a normal
//! transient during simulation.
//!
//! Relative distance uses the harmonic-mean normalisation throughout. The
//! min-cardinality variant produces different convergence thresholds and is
//! deliberately not offered alongside it.

use crate::activation::Activation;
use crate::region::SynapseMatrix;

/// Number of neurons firing in both `x` and `y`.
pub fn overlap(x: &Activation, y: &Activation) -> usize {
    x.and_count(y)
}

/// `1 - overlap(x, y) / harmonic_mean(|x|, |y|)`, in `[0, 1]`.
///
/// Returns `1.0` when either activation is silent.
pub fn relative_distance(x: &Activation, y: &Activation) -> f32 {
    let (cx, cy) = (x.count(), y.count());
    if cx == 0 || cy == 0 {
        return 1.0;
    }
    // overlap * mean(1/cx, 1/cy) == overlap * (cx + cy) / (2 * cx * cy), kept in
    // integers so identical and swapped inputs give exact results.
    let (cx, cy) = (cx as u64, cy as u64);
    let num = overlap(x, y) as u64 * (cx + cy);
    let den = 2 * cx * cy;
    let d = 1.0 - num as f64 / den as f64;
    d.clamp(0.0, 1.0) as f32
}

/// Sliding union: element `t` is the OR of `series[t - window ..= t]`
/// (clamped at the start of the series).
pub fn moving_union(series: &[Activation], window: usize) -> Vec<Activation> {
    (0..series.len())
        .map(|t| {
            let start = t.saturating_sub(window);
            let mut acc = series[start].clone();
            for a in &series[start + 1..=t] {
                acc = acc.union(a);
            }
            acc
        })
        .collect()
}

/// Relative distance between consecutive elements; element 0 is `0.0`.
pub fn stepwise_delta(series: &[Activation]) -> Vec<f32> {
    let mut out = Vec::with_capacity(series.len());
    if series.is_empty() {
        return out;
    }
    out.push(0.0);
    out.extend(series.windows(2).map(|w| relative_distance(&w[0], &w[1])));
    out
}

/// Primary convergence diagnostic: near zero once the series stops recruiting
/// new neurons over the trailing `window` steps.
pub fn convergence(series: &[Activation], window: usize) -> Vec<f32> {
    stepwise_delta(&moving_union(series, window))
}

/// First index from which `series` stays strictly below `threshold`.
pub fn convergence_step(series: &[f32], threshold: f32) -> Option<usize> {
    let last_above = series.iter().rposition(|&v| v >= threshold);
    match last_above {
        None if series.is_empty() => None,
        None => Some(0),
        Some(i) if i + 1 < series.len() => Some(i + 1),
        Some(_) => None,
    }
}

/// `xᵀ·D·x`: total weight of recurrent synapses with both endpoints in `x`.
///
/// Neurons of `x` outside the matrix are ignored.
pub fn interconnection_measure(x: &Activation, weights: &SynapseMatrix) -> f32 {
    let members: Vec<usize> = x
        .active_indices()
        .take_while(|&i| i < weights.size())
        .collect();
    let mut total = 0.0f64;
    for &pre in &members {
        let row = weights.row(pre);
        for &post in &members {
            total += row[post] as f64;
        }
    }
    total as f32
}

/// Ratio of within-set recurrent weight to weight entering the set from outside.
///
/// Sentinels: `0.0` when there is no within-set weight (including a silent
/// `x`), `f32::INFINITY` when the set has internal weight but nothing from
/// outside projects into it.
pub fn interconnection_density(x: &Activation, weights: &SynapseMatrix) -> f32 {
    let within = interconnection_measure(x, weights);
    if within <= 0.0 {
        return 0.0;
    }
    let members: Vec<usize> = x
        .active_indices()
        .take_while(|&i| i < weights.size())
        .collect();
    let mut inbound = 0.0f64;
    for pre in 0..weights.size() {
        if x.get(pre) {
            continue;
        }
        let row = weights.row(pre);
        for &post in &members {
            inbound += row[post] as f64;
        }
    }
    if inbound <= 0.0 {
        return f32::INFINITY;
    }
    (within as f64 / inbound) as f32
}

/// Columns of `column_width` neurons active ("any neuron fires") in both inputs.
///
/// Returns `0` when `column_width` is zero.
pub fn minicolumn_overlap(x: &Activation, y: &Activation, column_width: usize) -> usize {
    if column_width == 0 {
        return 0;
    }
    let columns = |a: &Activation| {
        let len = a.len().div_ceil(column_width);
        Activation::from_indices(len, a.active_indices().map(|i| i / column_width))
    };
    overlap(&columns(x), &columns(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Prng;

    fn random_activation(rng: &mut Prng, len: usize, density: f32) -> Activation {
        Activation::from_indices(len, (0..len).filter(|_| rng.gen_bool(density)))
    }

    #[test]
    fn relative_distance_is_bounded_and_symmetric() {
        let mut rng = Prng::new(17);
        for _ in 0..200 {
            let x = random_activation(&mut rng, 120, 0.08);
            let y = random_activation(&mut rng, 120, 0.08);
            let d = relative_distance(&x, &y);
            assert!((0.0..=1.0).contains(&d), "distance {d} out of range");
            assert_eq!(d, relative_distance(&y, &x));
            if x.count() > 0 {
                assert_eq!(relative_distance(&x, &x), 0.0);
            }
        }
    }

    #[test]
    fn relative_distance_sentinels() {
        let silent = Activation::silent(10);
        let x = Activation::from_indices(10, [1, 2]);
        let disjoint = Activation::from_indices(10, [5, 6]);
        assert_eq!(relative_distance(&silent, &x), 1.0);
        assert_eq!(relative_distance(&silent, &silent), 1.0);
        assert_eq!(relative_distance(&x, &disjoint), 1.0);
    }

    #[test]
    fn relative_distance_uses_harmonic_mean() {
        // |x| = 2, |y| = 4, overlap 2: 1 - 2 * (1/2 + 1/4) / 2 = 0.25
        let x = Activation::from_indices(10, [1, 2]);
        let y = Activation::from_indices(10, [1, 2, 3, 4]);
        assert!((relative_distance(&x, &y) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn overlap_bounds() {
        let mut rng = Prng::new(23);
        for _ in 0..200 {
            let x = random_activation(&mut rng, 90, 0.1);
            let y = random_activation(&mut rng, 90, 0.1);
            assert_eq!(overlap(&x, &x), x.count());
            assert_eq!(overlap(&x, &y), overlap(&y, &x));
            assert!(overlap(&x, &y) <= x.count().min(y.count()));
        }
    }

    #[test]
    fn moving_union_is_an_envelope() {
        let series = vec![
            Activation::from_indices(8, [0]),
            Activation::from_indices(8, [1]),
            Activation::from_indices(8, [2]),
            Activation::from_indices(8, [3]),
        ];
        let u = moving_union(&series, 2);
        assert_eq!(u[0].active_indices().collect::<Vec<_>>(), vec![0]);
        assert_eq!(u[1].active_indices().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(u[2].active_indices().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(u[3].active_indices().collect::<Vec<_>>(), vec![1, 2, 3]);
        for (t, a) in series.iter().enumerate() {
            assert_eq!(overlap(a, &u[t]), a.count());
        }
        assert!(moving_union(&[], 3).is_empty());
    }

    #[test]
    fn stepwise_delta_starts_at_zero() {
        let a = Activation::from_indices(8, [0, 1]);
        let b = Activation::from_indices(8, [2, 3]);
        assert_eq!(stepwise_delta(&[a.clone(), b, a]), vec![0.0, 1.0, 1.0]);
        assert!(stepwise_delta(&[]).is_empty());
    }

    #[test]
    fn constant_series_converges_immediately() {
        let a = Activation::from_indices(50, [3, 9, 27]);
        let series = vec![a; 12];
        let c = convergence(&series, 5);
        assert!(c.iter().all(|&v| v == 0.0));
        assert_eq!(convergence_step(&c, 0.05), Some(0));
    }

    #[test]
    fn convergence_step_finds_tail() {
        assert_eq!(convergence_step(&[0.0, 0.5, 0.2, 0.01, 0.0], 0.05), Some(3));
        assert_eq!(convergence_step(&[0.0, 0.5], 0.05), None);
        assert_eq!(convergence_step(&[], 0.05), None);
    }

    #[test]
    fn interconnection_counts_internal_weight() {
        let mut d = SynapseMatrix::zeros(4);
        d.set(0, 1, 1.0);
        d.set(1, 0, 2.0);
        d.set(2, 1, 4.0);
        d.set(3, 3, 8.0);
        let x = Activation::from_indices(4, [0, 1]);
        assert_eq!(interconnection_measure(&x, &d), 3.0);
        assert_eq!(interconnection_density(&x, &d), 0.75);
    }

    #[test]
    fn interconnection_density_sentinels() {
        let mut d = SynapseMatrix::zeros(3);
        assert_eq!(interconnection_density(&Activation::silent(3), &d), 0.0);
        d.set(0, 1, 1.0);
        let closed = Activation::from_indices(3, [0, 1]);
        assert_eq!(interconnection_density(&closed, &d), f32::INFINITY);
        let open = Activation::from_indices(3, [1, 2]);
        assert_eq!(interconnection_density(&open, &d), 0.0);
    }

    #[test]
    fn minicolumn_overlap_groups_neurons() {
        // Columns of 4: x fires in columns 0 and 2, y in columns 0 and 1.
        let x = Activation::from_indices(12, [1, 9]);
        let y = Activation::from_indices(12, [3, 5]);
        assert_eq!(overlap(&x, &y), 0);
        assert_eq!(minicolumn_overlap(&x, &y, 4), 1);
        assert_eq!(minicolumn_overlap(&x, &y, 0), 0);
    }
}
