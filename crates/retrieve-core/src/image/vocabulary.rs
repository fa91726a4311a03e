//! Visual vocabulary training (C6).
//!
//! Grounded on `offline_indexer.py`'s Phase 1 (sample images, stack
//! descriptors, run `MiniBatchKMeans`) and on the donor's
//! `kmeans_tree.rs` for the Rust shape of k-means++ seeding and
//! flat `(k * dimension)` centroid storage. Training is streaming
//! mini-batch k-means rather than full-batch Lloyd's algorithm, matching
//! `MiniBatchKMeans`'s per-cluster learning-rate update.

use crate::error::{RetrieveError, RetrieveResult};
use crate::persistence::Directory;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configuration for [`VocabularyTrainer`].
#[derive(Debug, Clone, Copy)]
pub struct VocabularyConfig {
    pub k: usize,
    pub sample_size: usize,
    pub batch_size: usize,
    pub max_iterations: usize,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        // Matches offline_indexer.py's K_CLUSTERS / SAMPLE_SIZE_FOR_TRAINING
        // and MiniBatchKMeans(batch_size=1000) defaults.
        Self {
            k: 1000,
            sample_size: 3000,
            batch_size: 1000,
            max_iterations: 100,
        }
    }
}

/// K centroids in D-dimensional space, stored flat (`k * dimension`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Codebook {
    pub k: usize,
    pub dimension: usize,
    centroids: Vec<f32>,
}

impl Codebook {
    fn centroid(&self, idx: usize) -> &[f32] {
        let start = idx * self.dimension;
        &self.centroids[start..start + self.dimension]
    }

    /// Index of the nearest centroid to `descriptor`, by squared Euclidean
    /// distance.
    pub fn assign(&self, descriptor: &[f32]) -> usize {
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for idx in 0..self.k {
            let dist = squared_distance(descriptor, self.centroid(idx));
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        best
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn codebook_path(corpus: &str) -> String {
    format!("{}/codebook.json", corpus)
}

/// Trains (or loads) a [`Codebook`] for one corpus.
#[derive(Debug)]
pub struct VocabularyTrainer {
    config: VocabularyConfig,
}

impl VocabularyTrainer {
    pub fn new(config: VocabularyConfig) -> RetrieveResult<Self> {
        if config.k == 0 {
            return Err(RetrieveError::ConfigError("k must be > 0".to_string()));
        }
        Ok(Self { config })
    }

    /// If a codebook already exists for `corpus`, load and return it.
    /// Otherwise sample `sample_size` image ids, pull their descriptors via
    /// `descriptors_for`, and train a fresh codebook.
    pub fn train_or_load(
        &self,
        directory: &dyn Directory,
        corpus: &str,
        image_ids: &[String],
        descriptors_for: impl Fn(&str) -> RetrieveResult<Option<Vec<Vec<f32>>>>,
    ) -> RetrieveResult<Codebook> {
        let path = codebook_path(corpus);
        if directory.exists(&path) {
            return self.load(directory, corpus);
        }

        let mut rng = rand::thread_rng();
        let mut shuffled: Vec<&String> = image_ids.iter().collect();
        shuffled.shuffle(&mut rng);
        let sample = shuffled.into_iter().take(self.config.sample_size);

        let mut descriptors: Vec<Vec<f32>> = Vec::new();
        for image_id in sample {
            if let Some(rows) = descriptors_for(image_id)? {
                descriptors.extend(rows);
            }
        }
        if descriptors.is_empty() {
            return Err(RetrieveError::InputError(
                "no descriptors extracted from training sample".to_string(),
            ));
        }

        let codebook = train_minibatch_kmeans(&descriptors, &self.config, &mut rng);
        self.save(directory, corpus, &codebook)?;
        Ok(codebook)
    }

    fn save(&self, directory: &dyn Directory, corpus: &str, codebook: &Codebook) -> RetrieveResult<()> {
        let writer = directory.create_file(&codebook_path(corpus))?;
        serde_json::to_writer(writer, codebook)
            .map_err(|e| RetrieveError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
    }

    pub fn load(&self, directory: &dyn Directory, corpus: &str) -> RetrieveResult<Codebook> {
        let reader = directory
            .open_file(&codebook_path(corpus))
            .map_err(|_| RetrieveError::MissingArtifact {
                corpus: corpus.to_string(),
                artifact: "codebook".to_string(),
            })?;
        serde_json::from_reader(reader)
            .map_err(|e| RetrieveError::CorruptIndex(format!("malformed codebook: {}", e)))
    }
}

fn train_minibatch_kmeans(
    data: &[Vec<f32>],
    config: &VocabularyConfig,
    rng: &mut impl Rng,
) -> Codebook {
    let dimension = data[0].len();
    let k = config.k.min(data.len());

    let mut centroids = kmeans_plus_plus_init(data, k, rng);
    let mut counts = vec![0u32; k];

    let batch_size = config.batch_size.min(data.len());
    for _ in 0..config.max_iterations {
        let batch: Vec<&Vec<f32>> = (0..batch_size)
            .map(|_| &data[rng.gen_range(0..data.len())])
            .collect();

        let assignments: Vec<usize> = batch
            .iter()
            .map(|point| nearest(&centroids, dimension, point))
            .collect();

        for (point, cluster) in batch.iter().zip(assignments.iter()) {
            counts[*cluster] += 1;
            let eta = 1.0 / counts[*cluster] as f32;
            let center = &mut centroids[*cluster * dimension..*cluster * dimension + dimension];
            for (c, p) in center.iter_mut().zip(point.iter()) {
                *c += eta * (p - *c);
            }
        }
    }

    Codebook {
        k,
        dimension,
        centroids,
    }
}

fn nearest(centroids: &[f32], dimension: usize, point: &[f32]) -> usize {
    let k = centroids.len() / dimension;
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for idx in 0..k {
        let center = &centroids[idx * dimension..idx * dimension + dimension];
        let dist = squared_distance(point, center);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    best
}

/// k-means++ seeding: first center uniform at random, subsequent centers
/// chosen with probability proportional to squared distance from the
/// nearest already-chosen center.
fn kmeans_plus_plus_init(data: &[Vec<f32>], k: usize, rng: &mut impl Rng) -> Vec<f32> {
    let dimension = data[0].len();
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..data.len()));

    while chosen.len() < k {
        let distances: Vec<f32> = data
            .iter()
            .map(|point| {
                chosen
                    .iter()
                    .map(|&c| squared_distance(point, &data[c]))
                    .fold(f32::INFINITY, f32::min)
            })
            .collect();
        let total: f32 = distances.iter().sum();
        if total <= 0.0 {
            chosen.push(rng.gen_range(0..data.len()));
            continue;
        }
        let mut target = rng.gen_range(0.0..total);
        let mut selected = distances.len() - 1;
        for (idx, &d) in distances.iter().enumerate() {
            if target < d {
                selected = idx;
                break;
            }
            target -= d;
        }
        chosen.push(selected);
    }

    let mut centroids = Vec::with_capacity(k * dimension);
    for &idx in &chosen {
        centroids.extend_from_slice(&data[idx]);
    }
    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::directory::MemoryDirectory;

    fn clustered_points() -> Vec<Vec<f32>> {
        let mut rng = rand::thread_rng();
        let mut points = Vec::new();
        for _ in 0..50 {
            points.push(vec![
                0.0 + rng.gen_range(-0.1..0.1),
                0.0 + rng.gen_range(-0.1..0.1),
            ]);
        }
        for _ in 0..50 {
            points.push(vec![
                10.0 + rng.gen_range(-0.1..0.1),
                10.0 + rng.gen_range(-0.1..0.1),
            ]);
        }
        points
    }

    #[test]
    fn separates_two_well_separated_clusters() {
        let data = clustered_points();
        let config = VocabularyConfig {
            k: 2,
            sample_size: 100,
            batch_size: 20,
            max_iterations: 50,
        };
        let mut rng = rand::thread_rng();
        let codebook = train_minibatch_kmeans(&data, &config, &mut rng);

        let assignment_low = codebook.assign(&[0.0, 0.0]);
        let assignment_high = codebook.assign(&[10.0, 10.0]);
        assert_ne!(assignment_low, assignment_high);
    }

    #[test]
    fn train_or_load_is_idempotent() {
        let dir = MemoryDirectory::new();
        let trainer = VocabularyTrainer::new(VocabularyConfig {
            k: 2,
            sample_size: 10,
            batch_size: 10,
            max_iterations: 10,
        })
        .unwrap();
        let ids: Vec<String> = (0..10).map(|i| format!("img{}", i)).collect();
        let descriptors_for = |_: &str| Ok(Some(vec![vec![1.0, 2.0], vec![3.0, 4.0]]));

        let first = trainer
            .train_or_load(&dir, "c1", &ids, descriptors_for)
            .unwrap();
        let second = trainer
            .train_or_load(&dir, "c1", &ids, |_: &str| {
                panic!("should not re-extract descriptors once codebook exists")
            })
            .unwrap();
        assert_eq!(first.k, second.k);
    }

    #[test]
    fn zero_k_is_a_config_error() {
        let err = VocabularyTrainer::new(VocabularyConfig {
            k: 0,
            ..VocabularyConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, RetrieveError::ConfigError(_)));
    }
}
