//! Argument-to-library wiring for each subcommand, kept free of `clap` so
//! it can be exercised directly in tests.

use anyhow::{bail, Context, Result};
use retrieve_core::image::{
    build_image_index, ImageRetriever, SearchMode, VocabularyConfig, VocabularyTrainer,
};
use retrieve_core::persistence::FsDirectory;
use retrieve_core::text::{
    build_from_csv, FlushPolicy, Language, NormalizeConfig, Normalizer, SpimiConfig,
    TextRetriever,
};
use retrieve_core::RetrieveResult;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

pub fn run_text_build(
    corpus_path: &Path,
    doc_id_col: usize,
    text_col: usize,
    out_dir: &Path,
    language: Option<&str>,
    memory_budget_mb: Option<usize>,
) -> Result<()> {
    let csv_bytes = std::fs::read(corpus_path)
        .with_context(|| format!("reading corpus file {}", corpus_path.display()))?;

    let language = match language {
        Some(tag) => {
            Language::from_tag(tag).with_context(|| format!("unknown --language '{}'", tag))?
        }
        None => Language::default(),
    };
    let normalize_config = NormalizeConfig {
        language,
        stopwords: None,
    };
    let flush = match memory_budget_mb {
        Some(mb) => FlushPolicy::MemoryBudget(mb * 1024 * 1024),
        None => FlushPolicy::default(),
    };

    let directory = FsDirectory::new(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let summary = build_from_csv(
        &directory,
        "corpus",
        &csv_bytes,
        doc_id_col,
        text_col,
        normalize_config,
        SpimiConfig { flush },
    )?;

    println!(
        "indexed {} documents, {} terms, {} blocks",
        summary.num_docs, summary.num_terms, summary.num_blocks
    );
    Ok(())
}

pub fn run_text_search(index_dir: &Path, query: &str, k: usize) -> Result<()> {
    let directory = FsDirectory::new(index_dir)
        .with_context(|| format!("opening index directory {}", index_dir.display()))?;
    let normalizer = Normalizer::new(NormalizeConfig::default());
    let retriever = TextRetriever::open(&directory, "corpus", &normalizer)?;
    let hits = retriever.search(query, k)?;

    if hits.is_empty() {
        println!("no results");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{:>3}. {:<24} {:.4}  {}",
            rank + 1,
            hit.doc_id,
            hit.score,
            hit.snippet
        );
    }
    Ok(())
}

pub fn run_image_build(
    images_dir: &Path,
    descriptors_dir: &Path,
    out_dir: &Path,
    k: usize,
    sample_size: usize,
) -> Result<()> {
    let image_ids = list_image_ids(images_dir)?;
    if image_ids.is_empty() {
        bail!("no images found under {}", images_dir.display());
    }

    let descriptors_for = |image_id: &str| -> RetrieveResult<Option<Vec<Vec<f32>>>> {
        let path = descriptors_dir.join(format!("{}.desc", image_id));
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_descriptor_file(&path).map_err(|e| {
            retrieve_core::RetrieveError::InputError(e.to_string())
        })?))
    };

    let directory = FsDirectory::new(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let trainer = VocabularyTrainer::new(VocabularyConfig {
        k,
        sample_size,
        ..VocabularyConfig::default()
    })?;
    let codebook = trainer.train_or_load(&directory, "corpus", &image_ids, descriptors_for)?;

    let summary =
        build_image_index(&directory, "corpus", &codebook, &image_ids, descriptors_for)?;
    println!(
        "indexed {} images against a {}-word vocabulary",
        summary.num_images, summary.k
    );
    Ok(())
}

pub fn run_image_search(
    index_dir: &Path,
    query_descriptors: &Path,
    k: usize,
    method: &str,
    metadata_csv: Option<&Path>,
) -> Result<()> {
    let mode = match method {
        "sequential" => SearchMode::Sequential,
        "inverted" => SearchMode::Inverted,
        other => bail!("unknown --method '{}' (expected sequential|inverted)", other),
    };

    let directory = FsDirectory::new(index_dir)
        .with_context(|| format!("opening index directory {}", index_dir.display()))?;
    let trainer = VocabularyTrainer::new(VocabularyConfig::default())?;
    let codebook = trainer.load(&directory, "corpus")?;
    let retriever = ImageRetriever::open(&directory, "corpus", codebook)?;

    let descriptors = read_descriptor_file(query_descriptors)
        .with_context(|| format!("reading {}", query_descriptors.display()))?;

    let metadata = metadata_csv.map(load_metadata_csv).transpose()?;
    let hits = retriever.search(&descriptors, k, mode, metadata.as_ref())?;

    if hits.is_empty() {
        println!("no results");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        match &hit.metadata {
            Some(meta) => println!("{:>3}. {:<24} {:.4}  {}", rank + 1, hit.image_id, hit.score, meta),
            None => println!("{:>3}. {:<24} {:.4}", rank + 1, hit.image_id, hit.score),
        }
    }
    Ok(())
}

fn list_image_ids(images_dir: &Path) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(images_dir)
        .with_context(|| format!("listing {}", images_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
            ids.push(stem.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Parse a `<imageId>.desc` file: one descriptor per line, space-separated
/// floats. Blank lines are skipped.
fn read_descriptor_file(path: &Path) -> Result<Vec<Vec<f32>>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut descriptors = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: Result<Vec<f32>, _> = line.split_whitespace().map(str::parse::<f32>).collect();
        let row = row.with_context(|| format!("malformed descriptor line in {}", path.display()))?;
        descriptors.push(row);
    }
    Ok(descriptors)
}

/// Load a metadata CSV with an `id` column and arbitrary other columns,
/// keyed by id with extensions already stripped by the caller's ids.
fn load_metadata_csv(path: &Path) -> Result<HashMap<String, Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("reading metadata csv {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut metadata = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let mut row = serde_json::Map::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), Value::String(value.to_string()));
        }
        let Some(id) = row.get("id").and_then(|v| v.as_str()).map(str::to_string) else {
            continue;
        };
        metadata.insert(id, Value::Object(row));
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn text_build_then_search_round_trips() {
        let corpus_dir = tempfile::tempdir().unwrap();
        let corpus_path = corpus_dir.path().join("corpus.csv");
        fs::write(
            &corpus_path,
            "id,body\nd1,the quick brown fox\nd2,lazy dogs sleep\n",
        )
        .unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        run_text_build(&corpus_path, 0, 1, out_dir.path(), Some("en"), None).unwrap();
        run_text_search(out_dir.path(), "fox", 5).unwrap();
    }

    #[test]
    fn image_build_then_search_round_trips() {
        let images_dir = tempfile::tempdir().unwrap();
        let descriptors_dir = tempfile::tempdir().unwrap();
        for (id, rows) in [("a", "0.1 0.1\n0.2 0.0\n"), ("b", "9.9 9.9\n")] {
            fs::write(images_dir.path().join(format!("{}.jpg", id)), "").unwrap();
            fs::write(descriptors_dir.path().join(format!("{}.desc", id)), rows).unwrap();
        }

        let out_dir = tempfile::tempdir().unwrap();
        run_image_build(images_dir.path(), descriptors_dir.path(), out_dir.path(), 2, 2).unwrap();

        let query_path = descriptors_dir.path().join("query.desc");
        fs::write(&query_path, "0.1 0.1\n").unwrap();
        run_image_search(out_dir.path(), &query_path, 2, "sequential", None).unwrap();
    }

    #[test]
    fn image_search_rejects_unknown_method() {
        let images_dir = tempfile::tempdir().unwrap();
        let descriptors_dir = tempfile::tempdir().unwrap();
        fs::write(images_dir.path().join("a.jpg"), "").unwrap();
        fs::write(descriptors_dir.path().join("a.desc"), "0.1 0.1\n").unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        run_image_build(images_dir.path(), descriptors_dir.path(), out_dir.path(), 1, 1).unwrap();

        let query_path = descriptors_dir.path().join("a.desc");
        let err = run_image_search(out_dir.path(), &query_path, 1, "bogus", None).unwrap_err();
        assert!(err.to_string().contains("unknown --method"));
    }
}
