//! Geographic store selection via k-medoids clustering.
//!
//! Store coordinates are min-max normalized per axis before any distance
//! is computed, so latitude and longitude contribute on equal footing.
//! Clustering is PAM (partitioning around medoids): a greedy BUILD phase
//! seeds the medoid set, then SWAP applies the single best improving
//! exchange until none remains. Medoids are always actual input stores,
//! never synthetic averages. Every tie resolves to the lowest index, so
//! the fit is fully deterministic with no seed to manage.

use std::collections::HashSet;

use anyhow::bail;
use log::{debug, info, warn};
use ndarray::Array2;

use crate::data::{StoreGeo, TransactionLine};

/// Result of clustering the eligible stores.
#[derive(Debug)]
pub struct StoreClusters {
    /// The clustered stores, in input order.
    pub stores: Vec<StoreGeo>,
    /// Indices into `stores` of the k medoids, ascending.
    pub medoid_indices: Vec<usize>,
    /// Cluster index (position within `medoid_indices`) for each store.
    pub assignments: Vec<usize>,
    /// Sum of normalized distances from each store to its medoid.
    pub total_deviation: f64,
}

impl StoreClusters {
    /// Number of clusters actually fitted.
    pub fn k(&self) -> usize {
        self.medoid_indices.len()
    }

    /// Store ids of the medoids, ascending by store index.
    pub fn medoid_store_ids(&self) -> Vec<u32> {
        self.medoid_indices
            .iter()
            .map(|&i| self.stores[i].store_id)
            .collect()
    }

    /// The medoid stores themselves, for reporting and plotting.
    pub fn medoid_stores(&self) -> Vec<&StoreGeo> {
        self.medoid_indices
            .iter()
            .map(|&i| &self.stores[i])
            .collect()
    }

    /// Number of stores assigned to each cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.medoid_indices.len()];
        for &assignment in &self.assignments {
            if assignment < sizes.len() {
                sizes[assignment] += 1;
            }
        }
        sizes
    }
}

/// Restrict the store set to stores that actually appear in the
/// transaction data; stores without a single transaction line carry no
/// basket signal and are excluded from clustering.
pub fn stores_in_transactions(
    stores: Vec<StoreGeo>,
    lines: &[TransactionLine],
) -> Vec<StoreGeo> {
    let present: HashSet<u32> = lines.iter().map(|line| line.store_id).collect();
    let total = stores.len();
    let retained: Vec<StoreGeo> = stores
        .into_iter()
        .filter(|store| present.contains(&store.store_id))
        .collect();
    if retained.len() < total {
        debug!(
            "store selection: {} of {} stores have no transactions and were excluded",
            total - retained.len(),
            total
        );
    }
    retained
}

/// Cluster stores into `k` geographic groups and pick their medoids.
///
/// # Arguments
/// * `stores` - eligible stores with resolved coordinates
/// * `k` - requested number of medoids; clamped to the store count
/// * `max_swaps` - upper bound on SWAP iterations
pub fn cluster_stores(
    stores: Vec<StoreGeo>,
    k: usize,
    max_swaps: usize,
) -> crate::Result<StoreClusters> {
    if k == 0 {
        bail!("cluster count must be at least 1");
    }
    if stores.is_empty() {
        bail!("no stores are eligible for clustering");
    }

    let n = stores.len();
    let k = if k > n {
        warn!(
            "requested {} clusters but only {} stores are eligible; using {}",
            k, n, n
        );
        n
    } else {
        k
    };

    let points = normalize_coordinates(&stores);
    let dist = distance_matrix(&points);

    let mut medoids = pam_build(&dist, k);
    let swaps = pam_swap(&dist, &mut medoids, max_swaps);
    medoids.sort_unstable();

    let (assignments, total_deviation) = assign_to_medoids(&dist, &medoids);
    debug!(
        "PAM settled after {} swaps; total deviation {:.4}",
        swaps, total_deviation
    );

    Ok(StoreClusters {
        stores,
        medoid_indices: medoids,
        assignments,
        total_deviation,
    })
}

/// Drop all transaction lines whose store is not one of the medoids.
pub fn restrict_to_medoids(
    lines: Vec<TransactionLine>,
    clusters: &StoreClusters,
) -> Vec<TransactionLine> {
    let selected: HashSet<u32> = clusters.medoid_store_ids().into_iter().collect();
    let total = lines.len();
    let retained: Vec<TransactionLine> = lines
        .into_iter()
        .filter(|line| selected.contains(&line.store_id))
        .collect();
    info!(
        "store selection: kept {} of {} transaction lines across {} medoid stores",
        retained.len(),
        total,
        selected.len()
    );
    retained
}

/// Min-max normalize (latitude, longitude) per axis into [0, 1].
///
/// A degenerate axis (all stores at the same coordinate) normalizes to
/// 0.0 rather than dividing by zero.
pub fn normalize_coordinates(stores: &[StoreGeo]) -> Array2<f64> {
    let n = stores.len();
    let mut points = Array2::zeros((n, 2));
    for (i, store) in stores.iter().enumerate() {
        points[[i, 0]] = store.latitude;
        points[[i, 1]] = store.longitude;
    }
    for axis in 0..2 {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for i in 0..n {
            lo = lo.min(points[[i, axis]]);
            hi = hi.max(points[[i, axis]]);
        }
        let range = hi - lo;
        for i in 0..n {
            points[[i, axis]] = if range > 0.0 {
                (points[[i, axis]] - lo) / range
            } else {
                0.0
            };
        }
    }
    points
}

/// Pairwise Euclidean distances between normalized points.
fn distance_matrix(points: &Array2<f64>) -> Array2<f64> {
    let n = points.nrows();
    let mut dist = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = points[[i, 0]] - points[[j, 0]];
            let dy = points[[i, 1]] - points[[j, 1]];
            let d = (dx * dx + dy * dy).sqrt();
            dist[[i, j]] = d;
            dist[[j, i]] = d;
        }
    }
    dist
}

/// Greedy BUILD phase: seed with the point of minimum total distance,
/// then repeatedly add the point yielding the largest cost reduction.
fn pam_build(dist: &Array2<f64>, k: usize) -> Vec<usize> {
    let n = dist.nrows();

    let mut first = 0;
    let mut first_cost = f64::INFINITY;
    for j in 0..n {
        let cost: f64 = (0..n).map(|i| dist[[i, j]]).sum();
        if cost < first_cost {
            first_cost = cost;
            first = j;
        }
    }

    let mut medoids = vec![first];
    let mut nearest: Vec<f64> = (0..n).map(|i| dist[[i, first]]).collect();

    while medoids.len() < k {
        let mut best_gain = f64::NEG_INFINITY;
        let mut best_candidate = 0;
        for candidate in 0..n {
            if medoids.contains(&candidate) {
                continue;
            }
            let gain: f64 = (0..n)
                .map(|i| (nearest[i] - dist[[i, candidate]]).max(0.0))
                .sum();
            if gain > best_gain {
                best_gain = gain;
                best_candidate = candidate;
            }
        }
        medoids.push(best_candidate);
        for i in 0..n {
            nearest[i] = nearest[i].min(dist[[i, best_candidate]]);
        }
    }
    medoids
}

/// SWAP phase: apply the single best strictly-improving exchange of a
/// medoid for a non-medoid until no exchange improves the cost or the
/// iteration budget runs out. Returns the number of swaps applied.
fn pam_swap(dist: &Array2<f64>, medoids: &mut [usize], max_swaps: usize) -> usize {
    let n = dist.nrows();
    let mut swaps = 0;

    for _ in 0..max_swaps {
        let (d1, n1, d2) = nearest_two(dist, medoids);

        let mut best_delta = -1e-12;
        let mut best_pair: Option<(usize, usize)> = None;
        for pos in 0..medoids.len() {
            for candidate in 0..n {
                if medoids.contains(&candidate) {
                    continue;
                }
                let mut delta = 0.0;
                for i in 0..n {
                    let current = d1[i];
                    let replaced = if n1[i] == pos {
                        d2[i].min(dist[[i, candidate]])
                    } else {
                        current.min(dist[[i, candidate]])
                    };
                    delta += replaced - current;
                }
                if delta < best_delta {
                    best_delta = delta;
                    best_pair = Some((pos, candidate));
                }
            }
        }

        match best_pair {
            Some((pos, candidate)) => {
                medoids[pos] = candidate;
                swaps += 1;
            }
            None => break,
        }
    }
    swaps
}

/// Per point: distance to the nearest medoid, that medoid's position in
/// the medoid list, and the distance to the second-nearest medoid.
fn nearest_two(dist: &Array2<f64>, medoids: &[usize]) -> (Vec<f64>, Vec<usize>, Vec<f64>) {
    let n = dist.nrows();
    let mut d1 = vec![f64::INFINITY; n];
    let mut n1 = vec![0usize; n];
    let mut d2 = vec![f64::INFINITY; n];
    for i in 0..n {
        for (pos, &m) in medoids.iter().enumerate() {
            let d = dist[[i, m]];
            if d < d1[i] {
                d2[i] = d1[i];
                d1[i] = d;
                n1[i] = pos;
            } else if d < d2[i] {
                d2[i] = d;
            }
        }
    }
    (d1, n1, d2)
}

/// Assign every point to its nearest medoid (lowest index on ties) and
/// total up the cost.
fn assign_to_medoids(dist: &Array2<f64>, medoids: &[usize]) -> (Vec<usize>, f64) {
    let n = dist.nrows();
    let mut assignments = vec![0usize; n];
    let mut cost = 0.0;
    for i in 0..n {
        let mut best_pos = 0;
        let mut best_d = f64::INFINITY;
        for (pos, &m) in medoids.iter().enumerate() {
            let d = dist[[i, m]];
            if d < best_d {
                best_d = d;
                best_pos = pos;
            }
        }
        assignments[i] = best_pos;
        cost += best_d;
    }
    (assignments, cost)
}
