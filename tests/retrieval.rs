//! Ranking behavior of the vector search backends, exercised with a
//! deterministic bag-of-words embedder so relevance orderings are
//! predictable without a real model.

use anyhow::Result;
use async_trait::async_trait;

use raia_assist::answer;
use raia_assist::config::Config;
use raia_assist::embedding::{embed_query, Embedder};
use raia_assist::index::{PackedIndex, RagState, ScanIndex, VectorSearch};
use raia_assist::models::{Category, DocEntry};

const VOCAB: &[&str] = &[
    "nhif", "register", "registration", "contribution", "hospital", "kra", "pin", "tax", "itax",
    "huduma", "centre", "location", "passport", "visa", "permit", "id",
];

/// Counts vocabulary-word occurrences: texts about the same service land
/// near each other in vector space, unrelated texts do not.
struct BagOfWords;

#[async_trait]
impl Embedder for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        VOCAB.len()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let words: Vec<&str> = lower
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                    .collect();
                VOCAB
                    .iter()
                    .map(|term| words.iter().filter(|w| *w == term).count() as f32)
                    .collect()
            })
            .collect())
    }
}

fn doc(title: &str, text: &str, source: &str, ordinal: usize) -> DocEntry {
    DocEntry {
        title: title.to_string(),
        filename: format!("{:03}.md", ordinal),
        text: text.to_string(),
        source: source.to_string(),
        category: Category::default(),
        word_count: text.split_whitespace().count(),
        chunk_index: ordinal,
        last_scraped: "2026-08-27".to_string(),
        url_path: String::new(),
    }
}

fn service_corpus() -> Vec<DocEntry> {
    vec![
        doc(
            "NHIF Registration",
            "To register for NHIF, visit an NHIF branch with your national id. \
             NHIF registration is free and the monthly contribution depends on income. \
             Any accredited hospital accepts NHIF cards.",
            "https://www.nhif.or.ke/register",
            0,
        ),
        doc(
            "KRA PIN Guide",
            "A KRA pin is issued through the itax portal. The pin is required for \
             tax returns and most government services. Apply on itax with your id.",
            "https://www.kra.go.ke/pin",
            1,
        ),
        doc(
            "Huduma Centre Locations",
            "Every huduma centre offers passport, id and permit services under one \
             roof. Find the nearest centre location on the huduma portal.",
            "https://www.hudumakenya.go.ke/centres",
            2,
        ),
    ]
}

async fn corpus_vectors(docs: &[DocEntry]) -> Vec<Vec<f32>> {
    let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
    BagOfWords.embed(&texts).await.unwrap()
}

#[tokio::test]
async fn relevant_document_ranks_first() {
    let docs = service_corpus();
    let vectors = corpus_vectors(&docs).await;
    let index = PackedIndex::build(&vectors, VOCAB.len()).unwrap();

    let query = embed_query(&BagOfWords, "how do i register for nhif")
        .await
        .unwrap();
    let hits = index.search(&query, 3).unwrap();

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].1, 0, "NHIF document must rank first");

    let query = embed_query(&BagOfWords, "where is the nearest huduma centre")
        .await
        .unwrap();
    let hits = index.search(&query, 1).unwrap();
    assert_eq!(hits[0].1, 2);
}

#[tokio::test]
async fn distances_are_cosine_and_ascending() {
    let docs = service_corpus();
    let vectors = corpus_vectors(&docs).await;
    let index = PackedIndex::build(&vectors, VOCAB.len()).unwrap();

    let query = embed_query(&BagOfWords, "kra pin itax tax").await.unwrap();
    let hits = index.search(&query, 3).unwrap();

    for pair in hits.windows(2) {
        assert!(pair[0].0 <= pair[1].0, "distances must be non-decreasing");
    }
    for (distance, _) in &hits {
        assert!(*distance >= -1e-5 && *distance <= 2.0 + 1e-5);
    }
    // The best hit is a near-exact keyword match, so its distance is small.
    assert!(hits[0].0 < 0.5);
}

#[tokio::test]
async fn packed_and_scan_backends_agree() {
    let docs = service_corpus();
    let vectors = corpus_vectors(&docs).await;

    let packed = PackedIndex::build(&vectors, VOCAB.len()).unwrap();
    let scan = ScanIndex::build(vectors, VOCAB.len()).unwrap();
    assert_eq!(packed.backend(), "packed");
    assert_eq!(scan.backend(), "scan");

    for question in [
        "how do i register for nhif",
        "apply for kra pin on itax",
        "passport services at huduma centre",
    ] {
        let query = embed_query(&BagOfWords, question).await.unwrap();
        let from_packed = packed.search(&query, 3).unwrap();
        let from_scan = scan.search(&query, 3).unwrap();

        let packed_order: Vec<usize> = from_packed.iter().map(|(_, o)| *o).collect();
        let scan_order: Vec<usize> = from_scan.iter().map(|(_, o)| *o).collect();
        assert_eq!(packed_order, scan_order, "question: {}", question);

        for (a, b) in from_packed.iter().zip(from_scan.iter()) {
            assert!((a.0 - b.0).abs() < 1e-4);
        }
    }
}

#[tokio::test]
async fn oversized_k_returns_whole_corpus() {
    let docs = service_corpus();
    let vectors = corpus_vectors(&docs).await;
    let index = PackedIndex::build(&vectors, VOCAB.len()).unwrap();

    let query = embed_query(&BagOfWords, "nhif").await.unwrap();
    let hits = index.search(&query, 50).unwrap();
    assert_eq!(hits.len(), docs.len());
}

#[tokio::test]
async fn equidistant_hits_break_ties_by_ordinal() {
    // Two identical documents are exactly equidistant from any query.
    let vectors = vec![
        vec![1.0, 0.0, 0.0],
        vec![1.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0],
    ];
    let index = PackedIndex::build(&vectors, 3).unwrap();
    let hits = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
    assert_eq!(hits[0].1, 0);
    assert_eq!(hits[1].1, 1);

    let scan = ScanIndex::build(vectors, 3).unwrap();
    let hits = scan.search(&[1.0, 0.0, 0.0], 3).unwrap();
    assert_eq!(hits[0].1, 0);
    assert_eq!(hits[1].1, 1);
}

#[tokio::test]
async fn answer_path_produces_citations_and_debug() {
    let docs = service_corpus();
    let vectors = corpus_vectors(&docs).await;
    let state = RagState {
        searcher: Box::new(PackedIndex::build(&vectors, VOCAB.len()).unwrap()),
        doc_map: docs,
    };

    let config = Config::default();
    let answer = answer::answer_message(
        &config,
        &state,
        &BagOfWords,
        "how do i register for nhif",
        None,
        true,
    )
    .await;

    assert!(answer.reply.contains("NHIF"));
    assert_eq!(answer.citations[0], "https://www.nhif.or.ke/register");

    let debug = answer.debug.expect("debug info requested");
    assert_eq!(debug.query_embedding_shape, vec![VOCAB.len()]);
    assert_eq!(debug.top_k_results[0].rank, 1);
    assert_eq!(debug.top_k_results[0].title, "NHIF Registration");
}

#[tokio::test]
async fn empty_reply_when_nothing_matches() {
    let state = RagState {
        searcher: Box::new(PackedIndex::build(&[], VOCAB.len()).unwrap()),
        doc_map: Vec::new(),
    };

    let config = Config::default();
    let answer = answer::answer_message(&config, &state, &BagOfWords, "anything", None, false).await;
    assert_eq!(answer.reply, answer::NO_RESULTS_REPLY);
    assert!(answer.citations.is_empty());
}
