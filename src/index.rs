//! Vector index build and search.
//!
//! Two interchangeable search implementations sit behind [`VectorSearch`]:
//! a packed snapshot (vectors unit-normalized at build time, stored as one
//! contiguous little-endian f32 matrix, searched by dot product) and a
//! plain linear scan over raw vectors kept as JSON. Which one serves a
//! process is decided once at startup by artifact detection, never
//! per-call. Both return cosine distance `1 - similarity` ascending with
//! ties broken by ascending ordinal, so the two paths produce identical
//! orderings for the same corpus and query.
//!
//! The build driver scans the corpus in sorted filename order, so the
//! ordinal of a vector in the index equals the position of its document
//! in `doc_map.json`. That join is the only link between a search hit and
//! its citation metadata; see [`crate::models::DocEntry`].

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::corpus::{self, CorpusFile};
use crate::embedding;
use crate::models::{Category, DocEntry};
use crate::progress::{PipelineEvent, ProgressReporter};

const PACKED_MAGIC: &[u8; 4] = b"RVX1";
const PACKED_HEADER_LEN: usize = 12;

/// Path of the packed binary snapshot.
pub fn packed_path(config: &Config) -> PathBuf {
    config.index_dir().join("index.bin")
}

/// Path of the raw-vector JSON artifact used by the linear scan.
pub fn scan_path(config: &Config) -> PathBuf {
    config.index_dir().join("vectors.json")
}

/// Path of the ordinal-ordered document metadata map.
pub fn doc_map_path(config: &Config) -> PathBuf {
    config.index_dir().join("doc_map.json")
}

/// True when a built index (either backend) and its doc map are on disk.
pub fn artifacts_present(config: &Config) -> bool {
    (packed_path(config).exists() || scan_path(config).exists())
        && doc_map_path(config).exists()
}

/// Nearest-neighbor search over the corpus embeddings.
pub trait VectorSearch: Send + Sync {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn dims(&self) -> usize;
    fn backend(&self) -> &'static str;
    /// Top-`k` hits as `(cosine distance, ordinal)`, distance ascending,
    /// ties by ascending ordinal. `k >= len()` returns everything.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(f32, usize)>>;
}

fn normalize(vec: &[f32]) -> Vec<f32> {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt() + 1e-10;
    vec.iter().map(|v| v / norm).collect()
}

fn rank_hits(mut hits: Vec<(f32, usize)>, k: usize) -> Vec<(f32, usize)> {
    hits.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    hits.truncate(k);
    hits
}

// ============ Packed snapshot ============

/// Unit-normalized vectors packed into one row-major matrix. Search is a
/// dot product per row against the normalized query.
pub struct PackedIndex {
    dims: usize,
    count: usize,
    data: Vec<f32>,
}

impl PackedIndex {
    pub fn build(vectors: &[Vec<f32>], dims: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(vectors.len() * dims);
        for vec in vectors {
            embedding::check_dims(vec, dims)?;
            data.extend(normalize(vec));
        }
        Ok(Self {
            dims,
            count: vectors.len(),
            data,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::with_capacity(PACKED_HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(PACKED_MAGIC);
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.count as u32).to_le_bytes());
        bytes.extend_from_slice(&embedding::vec_to_blob(&self.data));
        std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        if bytes.len() < PACKED_HEADER_LEN || &bytes[0..4] != PACKED_MAGIC {
            bail!("Not a packed index file: {}", path.display());
        }
        let dims = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let count = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let expected = PACKED_HEADER_LEN + dims * count * 4;
        if bytes.len() != expected {
            bail!(
                "Corrupt packed index {}: expected {} bytes, got {}",
                path.display(),
                expected,
                bytes.len()
            );
        }
        let data = embedding::blob_to_vec(&bytes[PACKED_HEADER_LEN..]);
        Ok(Self { dims, count, data })
    }
}

impl VectorSearch for PackedIndex {
    fn len(&self) -> usize {
        self.count
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn backend(&self) -> &'static str {
        "packed"
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(f32, usize)>> {
        embedding::check_dims(query, self.dims)?;
        let q = normalize(query);
        let hits = (0..self.count)
            .map(|i| {
                let row = &self.data[i * self.dims..(i + 1) * self.dims];
                let dot: f32 = row.iter().zip(q.iter()).map(|(a, b)| a * b).sum();
                (1.0 - dot, i)
            })
            .collect();
        Ok(rank_hits(hits, k))
    }
}

// ============ Linear scan ============

/// Raw vectors kept as written; each search computes cosine similarity on
/// the fly. Slower but has no build-time transform to go wrong.
pub struct ScanIndex {
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl ScanIndex {
    pub fn build(vectors: Vec<Vec<f32>>, dims: usize) -> Result<Self> {
        for vec in &vectors {
            embedding::check_dims(vec, dims)?;
        }
        Ok(Self { dims, vectors })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(&self.vectors).context("Failed to encode vectors")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let vectors: Vec<Vec<f32>> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        for vec in &vectors {
            embedding::check_dims(vec, dims)?;
        }
        Ok(Self { dims, vectors })
    }
}

impl VectorSearch for ScanIndex {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn backend(&self) -> &'static str {
        "scan"
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(f32, usize)>> {
        embedding::check_dims(query, self.dims)?;
        let hits = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, vec)| {
                let similarity = embedding::cosine_similarity(query, vec);
                (1.0 - similarity, i)
            })
            .collect();
        Ok(rank_hits(hits, k))
    }
}

// ============ Startup detection ============

/// Open whichever index artifact is on disk, preferring the packed one.
pub fn open_search(config: &Config) -> Result<Box<dyn VectorSearch>> {
    let packed = packed_path(config);
    if packed.exists() {
        return Ok(Box::new(PackedIndex::load(&packed)?));
    }
    let scan = scan_path(config);
    if scan.exists() {
        return Ok(Box::new(ScanIndex::load(&scan)?));
    }
    bail!(
        "No index artifact found in {}. Run `raia index build` first",
        config.index_dir().display()
    );
}

/// Retrieval state loaded once and shared across queries: the searcher
/// plus the doc map joined to it by ordinal.
pub struct RagState {
    pub searcher: Box<dyn VectorSearch>,
    pub doc_map: Vec<DocEntry>,
}

pub fn load_state(config: &Config) -> Result<RagState> {
    let doc_map_file = doc_map_path(config);
    let raw = std::fs::read_to_string(&doc_map_file)
        .with_context(|| format!("Failed to read doc map: {}", doc_map_file.display()))?;
    let doc_map: Vec<DocEntry> = serde_json::from_str(&raw).context("Failed to parse doc map")?;
    let searcher = open_search(config)?;
    Ok(RagState { searcher, doc_map })
}

// ============ Build driver ============

/// Derive the doc-map rows from parsed corpus files, in scan order.
/// The stored `text` is the first 1000 chars of the body; it is also the
/// text that gets embedded, so a hit's excerpt is exactly what matched.
pub fn doc_entries(files: &[CorpusFile]) -> Vec<DocEntry> {
    files
        .iter()
        .enumerate()
        .map(|(idx, file)| {
            let stem = file.filename.trim_end_matches(".md").to_string();
            let title = file.meta.title.clone().unwrap_or_else(|| stem.clone());
            let source = file.meta.source.clone().unwrap_or_default();
            let category = file
                .meta
                .category
                .as_deref()
                .and_then(Category::parse)
                .unwrap_or_default();
            let url_path = if source.is_empty() {
                String::new()
            } else {
                source.rsplit('/').next().unwrap_or_default().to_string()
            };
            DocEntry {
                title,
                filename: file.filename.clone(),
                text: file.body.chars().take(1000).collect(),
                source,
                category,
                word_count: file.body.split_whitespace().count(),
                chunk_index: idx,
                last_scraped: file.meta.last_updated.clone().unwrap_or_default(),
                url_path,
            }
        })
        .collect()
}

fn remove_stale(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).with_context(|| {
            format!("Failed to remove stale index artifact: {}", path.display())
        })?;
    }
    Ok(())
}

/// Run the index build: corpus documents → embeddings → index artifact +
/// doc map. A rebuild replaces the artifacts wholesale; the previous
/// backend's artifact is removed so detection can never load stale data.
pub async fn run_index_build(config: &Config, reporter: &dyn ProgressReporter) -> Result<()> {
    let corpus_dir = config.corpus_dir();
    if !corpus_dir.exists() {
        bail!(
            "Corpus dir not found: {}. Run `raia chunk` first",
            corpus_dir.display()
        );
    }
    let files = corpus::scan_corpus(&corpus_dir)?;
    if files.is_empty() {
        bail!("No corpus documents found in {}", corpus_dir.display());
    }

    let entries = doc_entries(&files);
    let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();

    let embedder = embedding::create_embedder(&config.embedding)?;
    let dims = embedder.dims();
    let total = texts.len();

    reporter.report(PipelineEvent::Stage {
        stage: "index".to_string(),
        total: total as u64,
    });

    let batch = config.embedding.batch_size.max(1);
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);
    for batch_texts in texts.chunks(batch) {
        let embedded = embedder.embed(batch_texts).await?;
        vectors.extend(embedded);
        reporter.report(PipelineEvent::Step {
            stage: "index".to_string(),
            n: vectors.len() as u64,
            total: total as u64,
            detail: embedder.model_name().to_string(),
        });
    }
    for vec in &vectors {
        embedding::check_dims(vec, dims)?;
    }

    let index_dir = config.index_dir();
    std::fs::create_dir_all(&index_dir)
        .with_context(|| format!("Failed to create index dir: {}", index_dir.display()))?;

    let doc_map_file = doc_map_path(config);
    let json = serde_json::to_string_pretty(&entries).context("Failed to encode doc map")?;
    std::fs::write(&doc_map_file, json)
        .with_context(|| format!("Failed to write {}", doc_map_file.display()))?;

    let backend = config.index.backend.as_str();
    match backend {
        "packed" => {
            let index = PackedIndex::build(&vectors, dims)?;
            index.save(&packed_path(config))?;
            remove_stale(&scan_path(config))?;
        }
        "scan" => {
            let index = ScanIndex::build(vectors, dims)?;
            index.save(&scan_path(config))?;
            remove_stale(&packed_path(config))?;
        }
        other => bail!("Unknown index backend: {}", other),
    }

    println!("index");
    println!("  documents: {}", total);
    println!("  dimension: {}", dims);
    println!("  backend: {}", backend);
    println!("  artifacts: {}", index_dir.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::FrontMatter;

    fn vectors4() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.7, 0.7, 0.0],
            vec![0.0, 0.0, 1.0],
        ]
    }

    fn test_config(dir: &Path) -> Config {
        let mut config: Config = toml::from_str("").unwrap();
        config.workspace.dir = dir.to_path_buf();
        config
    }

    #[test]
    fn packed_orders_by_distance() {
        let index = PackedIndex::build(&vectors4(), 3).unwrap();
        let hits = index.search(&[1.0, 0.0, 0.0], 4).unwrap();
        assert_eq!(hits[0].1, 0);
        assert!(hits[0].0 < 1e-5);
        assert_eq!(hits[1].1, 2);
        let distances: Vec<f32> = hits.iter().map(|h| h.0).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn equal_distances_resolve_by_ordinal() {
        // Vectors 1 and 3 are both orthogonal to the query.
        let index = PackedIndex::build(&vectors4(), 3).unwrap();
        let hits = index.search(&[1.0, 0.0, 0.0], 4).unwrap();
        assert_eq!(hits[2].1, 1);
        assert_eq!(hits[3].1, 3);
    }

    #[test]
    fn scan_matches_packed_ordering() {
        let packed = PackedIndex::build(&vectors4(), 3).unwrap();
        let scan = ScanIndex::build(vectors4(), 3).unwrap();
        let query = [0.2, 0.9, 0.1];

        let p = packed.search(&query, 4).unwrap();
        let s = scan.search(&query, 4).unwrap();

        let p_ord: Vec<usize> = p.iter().map(|h| h.1).collect();
        let s_ord: Vec<usize> = s.iter().map(|h| h.1).collect();
        assert_eq!(p_ord, s_ord);
        for (a, b) in p.iter().zip(s.iter()) {
            assert!((a.0 - b.0).abs() < 1e-4);
        }
    }

    #[test]
    fn k_beyond_corpus_returns_all() {
        let index = PackedIndex::build(&vectors4(), 3).unwrap();
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 50).unwrap().len(), 4);
    }

    #[test]
    fn packed_roundtrips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let index = PackedIndex::build(&vectors4(), 3).unwrap();
        index.save(&path).unwrap();

        let loaded = PackedIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.dims(), 3);
        assert_eq!(
            index.search(&[0.5, 0.5, 0.0], 2).unwrap(),
            loaded.search(&[0.5, 0.5, 0.0], 2).unwrap()
        );
    }

    #[test]
    fn load_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        std::fs::write(&path, b"JUNKxxxxyyyy").unwrap();
        assert!(PackedIndex::load(&path).is_err());
    }

    #[test]
    fn load_rejects_truncated_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        PackedIndex::build(&vectors4(), 3)
            .unwrap()
            .save(&path)
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(PackedIndex::load(&path).is_err());
    }

    #[test]
    fn mismatched_query_dims_is_an_error() {
        let index = PackedIndex::build(&vectors4(), 3).unwrap();
        assert!(index.search(&[1.0, 0.0], 2).is_err());
        let scan = ScanIndex::build(vectors4(), 3).unwrap();
        assert!(scan.search(&[1.0, 0.0], 2).is_err());
    }

    #[test]
    fn ragged_vectors_rejected_at_build() {
        let mut vecs = vectors4();
        vecs[2] = vec![1.0, 0.0];
        assert!(PackedIndex::build(&vecs, 3).is_err());
        assert!(ScanIndex::build(vecs, 3).is_err());
    }

    #[test]
    fn zero_query_is_maximally_distant() {
        let index = PackedIndex::build(&vectors4(), 3).unwrap();
        let hits = index.search(&[0.0, 0.0, 0.0], 1).unwrap();
        assert!((hits[0].0 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn detection_prefers_packed_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(config.index_dir()).unwrap();
        PackedIndex::build(&vectors4(), 3)
            .unwrap()
            .save(&packed_path(&config))
            .unwrap();
        ScanIndex::build(vectors4(), 3)
            .unwrap()
            .save(&scan_path(&config))
            .unwrap();

        let searcher = open_search(&config).unwrap();
        assert_eq!(searcher.backend(), "packed");
    }

    #[test]
    fn detection_falls_back_to_scan_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(config.index_dir()).unwrap();
        ScanIndex::build(vectors4(), 3)
            .unwrap()
            .save(&scan_path(&config))
            .unwrap();

        let searcher = open_search(&config).unwrap();
        assert_eq!(searcher.backend(), "scan");
        assert!(!artifacts_present(&config));
    }

    #[test]
    fn doc_entries_derive_fields() {
        let file = CorpusFile {
            filename: "001_nhif_registration.md".to_string(),
            meta: FrontMatter {
                title: Some("NHIF Registration".to_string()),
                source: Some("https://www.nhif.or.ke/services/register".to_string()),
                category: Some("ministry_faq".to_string()),
                last_updated: Some("2026-08-24".to_string()),
                ..Default::default()
            },
            body: "Register at any branch. ".repeat(300),
        };

        let entries = doc_entries(&[file]);
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.title, "NHIF Registration");
        assert_eq!(e.category, Category::MinistryFaq);
        assert_eq!(e.chunk_index, 0);
        assert_eq!(e.url_path, "register");
        assert_eq!(e.text.chars().count(), 1000);
        assert_eq!(e.word_count, 1200);
        assert_eq!(e.last_scraped, "2026-08-24");
    }

    #[test]
    fn doc_entries_default_missing_meta() {
        let file = CorpusFile {
            filename: "misc_notes.md".to_string(),
            meta: FrontMatter::default(),
            body: "Some text.".to_string(),
        };

        let e = &doc_entries(&[file])[0];
        assert_eq!(e.title, "misc_notes");
        assert_eq!(e.category, Category::ServiceWorkflow);
        assert_eq!(e.source, "");
        assert_eq!(e.url_path, "");
        assert_eq!(e.last_scraped, "");
    }
}
