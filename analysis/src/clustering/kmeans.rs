//! k-means with Lloyd iterations and k-means++ seeding.

use log::{debug, trace};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::{
    Rng,
    distributions::{Distribution, WeightedIndex},
    seq::index,
};
use serde::{Deserialize, Serialize};

use super::RunOptions;
use crate::{
    Feature,
    errors::{ClusteringError, ClusteringResult, NonConvergenceWarning},
    utils::{distance, squared_distance},
};

/// How the initial centroids are chosen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KMeansInit {
    /// First centroid uniformly at random, each next one with probability proportional to the
    /// squared distance to the nearest centroid chosen so far.
    #[default]
    PlusPlus,
    /// `k` distinct voters chosen uniformly at random.
    Random,
    /// The given voters (by zero-based index), in order. Deterministic, so only run once.
    Indexes(Vec<usize>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct KMeansFit {
    /// The cluster of each sample.
    pub labels: Array1<usize>,
    /// The centroids, as a `k`x`d` array.
    pub centroids: Array2<Feature>,
    /// Sum of squared distances from each sample to its centroid.
    pub inertia: Feature,
    pub iterations: u64,
    pub converged: bool,
}

impl KMeansFit {
    #[must_use]
    #[inline]
    pub const fn warning(&self, options: &RunOptions) -> Option<NonConvergenceWarning> {
        if self.converged {
            None
        } else {
            Some(NonConvergenceWarning {
                max_iterations: options.max_iterations,
            })
        }
    }
}

/// Cluster `samples` into `k` clusters, keeping the lowest-inertia of `options.n_runs` restarts.
///
/// # Errors
///
/// Returns an error if `k` is out of range, or if [`KMeansInit::Indexes`] does not name exactly
/// `k` valid voters.
#[allow(clippy::missing_inline_in_public_items)]
pub fn kmeans<R: Rng>(
    samples: ArrayView2<Feature>,
    k: usize,
    init: &KMeansInit,
    options: &RunOptions,
    rng: &mut R,
) -> ClusteringResult<KMeansFit> {
    let n = samples.nrows();
    if k == 0 || k > n {
        return Err(ClusteringError::InvalidK { k, n });
    }

    let runs = match init {
        KMeansInit::Indexes(_) => 1,
        _ => options.n_runs.max(1),
    };

    let mut best: Option<KMeansFit> = None;
    for run in 0..runs {
        let centroids = initial_centroids(samples, k, init, rng)?;
        let fit = lloyd(samples, centroids, options.max_iterations, options.tolerance);
        trace!(
            "k-means run {run}: inertia={}, iterations={}, converged={}",
            fit.inertia, fit.iterations, fit.converged
        );
        if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }

    let best = best.ok_or_else(|| ClusteringError::InvalidInput("no k-means run".into()))?;
    debug!(
        "k-means with k={k}: inertia={}, iterations={}",
        best.inertia, best.iterations
    );
    Ok(best)
}

fn initial_centroids<R: Rng>(
    samples: ArrayView2<Feature>,
    k: usize,
    init: &KMeansInit,
    rng: &mut R,
) -> ClusteringResult<Array2<Feature>> {
    let n = samples.nrows();
    let chosen: Vec<usize> = match init {
        KMeansInit::PlusPlus => plus_plus(samples, k, rng),
        KMeansInit::Random => index::sample(rng, n, k).into_vec(),
        KMeansInit::Indexes(indexes) => {
            if indexes.len() != k {
                return Err(ClusteringError::InvalidInput(format!(
                    "expected {k} initial centroid indexes, got {}",
                    indexes.len()
                )));
            }
            if let Some(bad) = indexes.iter().find(|&&i| i >= n) {
                return Err(ClusteringError::InvalidInput(format!(
                    "initial centroid index {bad} is out of range for {n} voters"
                )));
            }
            indexes.clone()
        }
    };

    Ok(samples.select(Axis(0), &chosen))
}

fn plus_plus<R: Rng>(samples: ArrayView2<Feature>, k: usize, rng: &mut R) -> Vec<usize> {
    let n = samples.nrows();
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..n));

    let mut closest = samples
        .outer_iter()
        .map(|x| squared_distance(x, samples.row(chosen[0])))
        .collect::<Vec<_>>();

    while chosen.len() < k {
        // all weights are zero when every sample coincides with a centroid
        let next = match WeightedIndex::new(&closest) {
            Ok(weights) => weights.sample(rng),
            Err(_) => rng.gen_range(0..n),
        };
        chosen.push(next);

        for (d, x) in closest.iter_mut().zip(samples.outer_iter()) {
            *d = d.min(squared_distance(x, samples.row(next)));
        }
    }

    chosen
}

fn lloyd(
    samples: ArrayView2<Feature>,
    mut centroids: Array2<Feature>,
    max_iterations: u64,
    tolerance: Feature,
) -> KMeansFit {
    let mut labels = Array1::from_elem(samples.nrows(), usize::MAX);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;

        if !assign(samples, centroids.view(), &mut labels) {
            converged = true;
            break;
        }

        let updated = update_centroids(samples, &labels, &centroids);
        let shift = updated
            .outer_iter()
            .zip(centroids.outer_iter())
            .map(|(new, old)| distance(new, old))
            .fold(0.0, Feature::max);
        centroids = updated;

        if shift <= tolerance {
            converged = true;
            break;
        }
    }

    // make the labels agree with the final centroids
    assign(samples, centroids.view(), &mut labels);
    let inertia = inertia(samples, centroids.view(), &labels);

    KMeansFit {
        labels,
        centroids,
        inertia,
        iterations,
        converged,
    }
}

/// Assign each sample to its nearest centroid (lowest index on ties), returns whether any
/// label changed.
fn assign(
    samples: ArrayView2<Feature>,
    centroids: ArrayView2<Feature>,
    labels: &mut Array1<usize>,
) -> bool {
    let mut changed = false;
    for (sample, label) in samples.outer_iter().zip(labels.iter_mut()) {
        let nearest = centroids
            .outer_iter()
            .map(|c| squared_distance(sample, c))
            .enumerate()
            .fold((0, Feature::INFINITY), |best, (i, d)| {
                if d < best.1 { (i, d) } else { best }
            })
            .0;
        if *label != nearest {
            *label = nearest;
            changed = true;
        }
    }
    changed
}

/// Move each centroid to the mean of its samples, empty clusters keep their old centroid.
fn update_centroids(
    samples: ArrayView2<Feature>,
    labels: &Array1<usize>,
    previous: &Array2<Feature>,
) -> Array2<Feature> {
    let mut sums = Array2::<Feature>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; previous.nrows()];
    for (sample, &label) in samples.outer_iter().zip(labels.iter()) {
        let mut row = sums.row_mut(label);
        row += &sample;
        counts[label] += 1;
    }

    let mut centroids = previous.clone();
    for ((mut centroid, sum), count) in centroids
        .outer_iter_mut()
        .zip(sums.outer_iter())
        .zip(counts)
    {
        if count > 0 {
            #[allow(clippy::cast_precision_loss)]
            centroid.assign(&(&sum / count as Feature));
        }
    }
    centroids
}

/// Within-cluster sum of squares.
#[must_use]
#[inline]
pub fn inertia(
    samples: ArrayView2<Feature>,
    centroids: ArrayView2<Feature>,
    labels: &Array1<usize>,
) -> Feature {
    samples
        .outer_iter()
        .zip(labels.iter())
        .map(|(sample, &label)| squared_distance(sample, centroids.row(label)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::tests::three_blobs;
    use ndarray::arr2;
    use pretty_assertions::assert_eq;
    use rand::{SeedableRng, rngs::SmallRng};
    use rstest::rstest;

    #[test]
    fn test_k_one_is_the_global_centroid() {
        let samples = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 0.0], [-1.0, 2.0]]);
        let mut rng = SmallRng::seed_from_u64(7);

        let fit = kmeans(
            samples.view(),
            1,
            &KMeansInit::default(),
            &RunOptions::default(),
            &mut rng,
        )
        .unwrap();

        let mean = samples.mean_axis(Axis(0)).unwrap();
        let expected: f64 = samples
            .outer_iter()
            .map(|x| squared_distance(x, mean.view()))
            .sum();

        assert!(fit.labels.iter().all(|&l| l == 0));
        assert!((fit.inertia - expected).abs() < 1e-9);
        assert!(fit.converged);
    }

    #[rstest]
    #[case::plus_plus(KMeansInit::PlusPlus)]
    #[case::random(KMeansInit::Random)]
    fn test_same_seed_same_assignment(#[case] init: KMeansInit) {
        let data = three_blobs();
        let options = RunOptions {
            n_runs: 3,
            ..Default::default()
        };

        let first = kmeans(
            data.view(),
            4,
            &init,
            &options,
            &mut SmallRng::seed_from_u64(1234),
        )
        .unwrap();
        let second = kmeans(
            data.view(),
            4,
            &init,
            &options,
            &mut SmallRng::seed_from_u64(1234),
        )
        .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_fixed_indexes() {
        let data = three_blobs();
        let mut rng = SmallRng::seed_from_u64(0);

        let fit = kmeans(
            data.view(),
            3,
            &KMeansInit::Indexes(vec![0, 5, 10]),
            &RunOptions::default(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(fit.labels.to_vec(), [[0; 5], [1; 5], [2; 5]].concat());
    }

    #[rstest]
    #[case::wrong_count(KMeansInit::Indexes(vec![0, 1]))]
    #[case::out_of_range(KMeansInit::Indexes(vec![0, 1, 99]))]
    fn test_bad_indexes(#[case] init: KMeansInit) {
        let data = three_blobs();
        let mut rng = SmallRng::seed_from_u64(0);

        let result = kmeans(data.view(), 3, &init, &RunOptions::default(), &mut rng);

        assert!(matches!(result, Err(ClusteringError::InvalidInput(_))));
    }

    #[test]
    fn test_duplicate_samples_do_not_break_seeding() {
        let samples = arr2(&[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]);
        let mut rng = SmallRng::seed_from_u64(3);

        let fit = kmeans(
            samples.view(),
            3,
            &KMeansInit::default(),
            &RunOptions::default(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(fit.inertia, 0.0);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(42)]
    fn test_plus_plus_picks_distinct_samples(#[case] seed: u64) {
        let data = three_blobs();
        let mut rng = SmallRng::seed_from_u64(seed);

        let mut chosen = plus_plus(data.view(), 6, &mut rng);

        chosen.sort_unstable();
        chosen.dedup();
        assert_eq!(chosen.len(), 6);
    }

    #[rstest]
    #[case(0)]
    #[case(5)]
    fn test_plus_plus_never_repeats_a_coinciding_sample(#[case] seed: u64) {
        let samples = arr2(&[[0.0, 0.0], [0.0, 0.0], [4.0, 4.0]]);
        let mut rng = SmallRng::seed_from_u64(seed);

        let chosen = plus_plus(samples.view(), 2, &mut rng);

        assert!(chosen.contains(&2), "{chosen:?}");
        assert!(chosen.contains(&0) || chosen.contains(&1), "{chosen:?}");
    }

    #[test]
    fn test_empty_cluster_keeps_centroid() {
        let samples = arr2(&[[0.0], [1.0]]);
        let labels = Array1::from_vec(vec![0, 0]);
        let previous = arr2(&[[5.0], [9.0]]);

        let updated = update_centroids(samples.view(), &labels, &previous);

        assert_eq!(updated, arr2(&[[0.5], [9.0]]));
    }
}
