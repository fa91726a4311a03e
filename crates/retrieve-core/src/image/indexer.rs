//! Two-pass histogram / inverted-index builder (C7).
//!
//! Grounded on `offline_indexer.py`'s Phase 2/3: assign descriptors to
//! their nearest codebook entry, build a TF histogram per image, derive
//! `idf[w] = ln(N / (df[w] + 1))` over the whole corpus, then re-walk the
//! histograms to produce the weighted inverted index and per-image norms.
//! The `+1` smoothing is intentional and distinct from the text side's
//! unsmoothed `ln(N/df)` — see [`crate::text::merge`].

use crate::error::{RetrieveError, RetrieveResult};
use crate::image::vocabulary::Codebook;
use crate::persistence::Directory;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBuildSummary {
    pub num_images: usize,
    pub k: usize,
}

fn histograms_path(corpus: &str) -> String {
    format!("{}/histograms.json", corpus)
}
fn inverted_index_path(corpus: &str) -> String {
    format!("{}/inverted_index.json", corpus)
}
fn idf_path(corpus: &str) -> String {
    format!("{}/idf_weights.json", corpus)
}
fn norms_path(corpus: &str) -> String {
    format!("{}/norms.json", corpus)
}

/// Build histograms, IDF weights, an inverted index, and norms for every
/// image in `image_ids`, using `codebook` to assign descriptors.
pub fn build_image_index(
    directory: &dyn Directory,
    corpus: &str,
    codebook: &Codebook,
    image_ids: &[String],
    descriptors_for: impl Fn(&str) -> RetrieveResult<Option<Vec<Vec<f32>>>>,
) -> RetrieveResult<ImageBuildSummary> {
    let k = codebook.k;
    let n = image_ids.len();
    if n == 0 {
        return Err(RetrieveError::InputError(
            "image corpus is empty".to_string(),
        ));
    }

    let mut histograms: HashMap<String, Vec<f32>> = HashMap::with_capacity(n);
    let mut doc_freq = vec![0u32; k];

    for image_id in image_ids {
        let descriptors = descriptors_for(image_id)?;
        let hist = match descriptors {
            Some(rows) if !rows.is_empty() => {
                let mut counts = vec![0u32; k];
                for descriptor in &rows {
                    let word = codebook.assign(descriptor);
                    counts[word] += 1;
                }
                let total: u32 = counts.iter().sum();
                let mut tf = vec![0.0f32; k];
                for (word, &count) in counts.iter().enumerate() {
                    if count > 0 {
                        tf[word] = count as f32 / total as f32;
                        doc_freq[word] += 1;
                    }
                }
                tf
            }
            _ => vec![0.0f32; k],
        };
        histograms.insert(image_id.clone(), hist);
    }

    let idf: Vec<f32> = doc_freq
        .iter()
        .map(|&df| (n as f32 / (df as f32 + 1.0)).ln())
        .collect();

    let mut norms: HashMap<String, f32> = HashMap::with_capacity(n);
    let mut inverted: BTreeMap<usize, Vec<(String, f32)>> = BTreeMap::new();

    for image_id in image_ids {
        let hist = &histograms[image_id];
        let mut sum_sq = 0.0f32;
        for (word, &tf) in hist.iter().enumerate() {
            if tf <= 0.0 {
                continue;
            }
            let weight = tf * idf[word];
            sum_sq += weight * weight;
            inverted.entry(word).or_default().push((image_id.clone(), weight));
        }
        norms.insert(image_id.clone(), sum_sq.sqrt());
    }

    write_json(directory, &histograms_path(corpus), &histograms)?;
    write_json(directory, &inverted_index_path(corpus), &inverted)?;
    write_json(directory, &idf_path(corpus), &idf)?;
    write_json(directory, &norms_path(corpus), &norms)?;

    Ok(ImageBuildSummary { num_images: n, k })
}

fn write_json<T: serde::Serialize>(
    directory: &dyn Directory,
    path: &str,
    value: &T,
) -> RetrieveResult<()> {
    let writer = directory.create_file(path)?;
    serde_json::to_writer(writer, value)
        .map_err(|e| RetrieveError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
}
