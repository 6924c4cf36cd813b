//! Semantic grouping of chunk summaries.
//!
//! Summaries are embedded with tf-idf over their feature text, reduced by
//! a seeded random projection when the vocabulary is wide, and grouped
//! with k-means. When no cluster count is requested, candidate counts are
//! scored by mean silhouette and the best one wins. Everything is seeded,
//! so the same inputs always produce the same grouping.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const CLUSTER_SEED: u64 = 42;
const MAX_AUTO_K: usize = 10;
const PROJECTION_THRESHOLD: usize = 100;
const PROJECTION_DIMS: usize = 50;
const KMEANS_MAX_ITERS: usize = 100;

/// Group `features` (one text per item) into clusters of item indices.
///
/// Order is preserved: within each cluster, indices appear in input order,
/// and clusters are ordered by their smallest member. Degenerate inputs
/// (a single item, empty vocabulary, or identical vectors) collapse to a
/// single cluster rather than failing.
pub fn cluster(features: &[String], k: Option<usize>) -> Vec<Vec<usize>> {
    let n = features.len();
    if n == 0 {
        return Vec::new();
    }
    if n < 2 {
        return vec![(0..n).collect()];
    }

    let vectors = match tfidf_vectors(features) {
        Some(v) => v,
        None => {
            debug!("empty vocabulary, keeping all items in one cluster");
            return vec![(0..n).collect()];
        }
    };

    let dims = vectors[0].len();
    let vectors = if dims > PROJECTION_THRESHOLD {
        project(&vectors, PROJECTION_DIMS)
    } else {
        vectors
    };

    if is_degenerate(&vectors) {
        debug!("feature vectors indistinguishable, keeping one cluster");
        return vec![(0..n).collect()];
    }

    let chosen_k = match k {
        Some(k) => k.clamp(1, n),
        None => auto_k(&vectors),
    };
    if chosen_k <= 1 {
        return vec![(0..n).collect()];
    }

    let labels = kmeans(&vectors, chosen_k, CLUSTER_SEED);
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); chosen_k];
    for (idx, label) in labels.iter().enumerate() {
        groups[*label].push(idx);
    }
    groups.retain(|g| !g.is_empty());
    groups.sort_by_key(|g| g[0]);
    debug!(items = n, clusters = groups.len(), "clustering complete");
    groups
}

/// Pick the cluster count with the best mean silhouette, falling back to 2
/// when nothing scores (including n = 2, where no candidate is scorable).
fn auto_k(vectors: &[Vec<f64>]) -> usize {
    let n = vectors.len();
    let upper = MAX_AUTO_K.min(n - 1);
    let mut best = (2usize, f64::NEG_INFINITY);
    for k in 2..=upper {
        let labels = kmeans(vectors, k, CLUSTER_SEED);
        let occupied = labels.iter().collect::<std::collections::HashSet<_>>().len();
        if occupied < 2 {
            continue;
        }
        let score = silhouette(vectors, &labels, k);
        debug!(k, score, "silhouette candidate");
        if score > best.1 {
            best = (k, score);
        }
    }
    best.0
}

/// L2-normalized tf-idf vectors. Returns None when no document contributes
/// a single term.
fn tfidf_vectors(features: &[String]) -> Option<Vec<Vec<f64>>> {
    let n = features.len();
    let mut vocab: HashMap<String, usize> = HashMap::new();
    let mut doc_terms: Vec<Vec<usize>> = Vec::with_capacity(n);

    for text in features {
        let mut terms = Vec::new();
        for raw in text.split_whitespace() {
            let term: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if term.len() < 2 {
                continue;
            }
            let next_id = vocab.len();
            let id = *vocab.entry(term).or_insert(next_id);
            terms.push(id);
        }
        doc_terms.push(terms);
    }

    let dims = vocab.len();
    if dims == 0 {
        return None;
    }

    let mut doc_freq = vec![0usize; dims];
    for terms in &doc_terms {
        let mut seen = vec![false; dims];
        for &t in terms {
            if !seen[t] {
                seen[t] = true;
                doc_freq[t] += 1;
            }
        }
    }

    let mut vectors = Vec::with_capacity(n);
    for terms in &doc_terms {
        let mut vec = vec![0.0f64; dims];
        for &t in terms {
            vec[t] += 1.0;
        }
        for (t, value) in vec.iter_mut().enumerate() {
            if *value > 0.0 {
                let idf = ((1.0 + n as f64) / (1.0 + doc_freq[t] as f64)).ln() + 1.0;
                *value *= idf;
            }
        }
        let norm = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vectors.push(vec);
    }
    Some(vectors)
}

/// Seeded Gaussian random projection down to `dims`.
fn project(vectors: &[Vec<f64>], dims: usize) -> Vec<Vec<f64>> {
    let input_dims = vectors[0].len();
    let mut rng = StdRng::seed_from_u64(CLUSTER_SEED);
    let scale = (dims as f64).sqrt().recip();
    // Box-Muller from uniform samples keeps us off extra distribution deps.
    let mut gaussian = move || -> f64 {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen_range(0.0..1.0);
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    };
    let matrix: Vec<Vec<f64>> = (0..input_dims)
        .map(|_| (0..dims).map(|_| gaussian() * scale).collect())
        .collect();

    vectors
        .iter()
        .map(|vec| {
            let mut out = vec![0.0; dims];
            for (i, &value) in vec.iter().enumerate() {
                if value != 0.0 {
                    for (j, out_j) in out.iter_mut().enumerate() {
                        *out_j += value * matrix[i][j];
                    }
                }
            }
            out
        })
        .collect()
}

fn is_degenerate(vectors: &[Vec<f64>]) -> bool {
    let first = &vectors[0];
    vectors
        .iter()
        .all(|v| distance_sq(v, first) < 1e-18)
}

fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Lloyd's algorithm with a seeded k-means++ init.
fn kmeans(vectors: &[Vec<f64>], k: usize, seed: u64) -> Vec<usize> {
    let n = vectors.len();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = init_centroids(vectors, k, &mut rng);
    let mut labels = vec![0usize; n];

    for _ in 0..KMEANS_MAX_ITERS {
        let mut changed = false;
        for (i, vec) in vectors.iter().enumerate() {
            let nearest = centroids
                .iter()
                .enumerate()
                .map(|(c, centroid)| (c, distance_sq(vec, centroid)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(c, _)| c)
                .unwrap_or(0);
            if labels[i] != nearest {
                labels[i] = nearest;
                changed = true;
            }
        }

        let dims = vectors[0].len();
        let mut sums = vec![vec![0.0f64; dims]; k];
        let mut counts = vec![0usize; k];
        for (i, vec) in vectors.iter().enumerate() {
            counts[labels[i]] += 1;
            for (d, &value) in vec.iter().enumerate() {
                sums[labels[i]][d] += value;
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                for d in 0..dims {
                    centroids[c][d] = sums[c][d] / counts[c] as f64;
                }
            }
        }

        if !changed {
            break;
        }
    }
    labels
}

/// k-means++ seeding: first centroid uniform, the rest proportional to
/// squared distance from the nearest chosen centroid.
fn init_centroids(vectors: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = vectors.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(vectors[rng.gen_range(0..n)].clone());

    while centroids.len() < k {
        let weights: Vec<f64> = vectors
            .iter()
            .map(|v| {
                centroids
                    .iter()
                    .map(|c| distance_sq(v, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            // All remaining points sit on existing centroids.
            centroids.push(vectors[rng.gen_range(0..n)].clone());
            continue;
        }
        let mut target = rng.gen_range(0.0..total);
        let mut chosen = n - 1;
        for (i, w) in weights.iter().enumerate() {
            if target < *w {
                chosen = i;
                break;
            }
            target -= w;
        }
        centroids.push(vectors[chosen].clone());
    }
    centroids
}

/// Mean silhouette coefficient; singleton clusters contribute zero.
fn silhouette(vectors: &[Vec<f64>], labels: &[usize], k: usize) -> f64 {
    let n = vectors.len();
    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        let mut intra = 0.0;
        let mut intra_count = 0usize;
        let mut inter = vec![(0.0f64, 0usize); k];
        for j in 0..n {
            if i == j {
                continue;
            }
            let d = distance_sq(&vectors[i], &vectors[j]).sqrt();
            if labels[j] == own {
                intra += d;
                intra_count += 1;
            } else {
                inter[labels[j]].0 += d;
                inter[labels[j]].1 += 1;
            }
        }
        if intra_count == 0 {
            continue; // singleton, contributes 0
        }
        let a = intra / intra_count as f64;
        let b = inter
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(sum, count)| sum / *count as f64)
            .fold(f64::INFINITY, f64::min);
        if b.is_finite() {
            let s = (b - a) / a.max(b).max(f64::MIN_POSITIVE);
            total += s;
        }
    }
    total / n as f64
}
