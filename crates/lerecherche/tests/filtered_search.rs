// Filtered vector search across store backends

use chrono::{TimeZone, Utc};
use lerecherche::vector::MetadataPredicate;
use lerecherche::{
    EmbeddingRecord, Filter, FilterSet, HashingEmbedder, HnswParams, HnswVectorStore, InMemoryVectorStore,
    RecordMetadata, VectorIndex, VectorStore, DEFAULT_DIMENSION,
};
use leparse::grammar::LanguageId;
use leparse::symbol::{SymbolId, SymbolKind};
use rstest::rstest;

fn records(embedder: &HashingEmbedder) -> Vec<EmbeddingRecord> {
    let modified_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
    (0..30)
        .map(|i| {
            let (language, ext) = if i % 2 == 0 {
                (LanguageId::Python, "py")
            } else {
                (LanguageId::Rust, "rs")
            };
            let name = format!("handler_{}_{}", ext, i);
            EmbeddingRecord {
                id: SymbolId::from(name.as_str()),
                vector: embedder.embed_text(&name),
                metadata: RecordMetadata {
                    language,
                    path: format!("src/mod{}/{}.{}", i % 3, name, ext),
                    kind: SymbolKind::Function,
                    modified_at,
                    author: None,
                },
            }
        })
        .collect()
}

fn store(backend: &str) -> Box<dyn VectorStore> {
    match backend {
        "hnsw" => Box::new(HnswVectorStore::with_params(
            DEFAULT_DIMENSION,
            HnswParams::default().with_ef_search(128),
        )),
        _ => Box::new(InMemoryVectorStore::new(DEFAULT_DIMENSION)),
    }
}

#[rstest]
#[case("exact")]
#[case("hnsw")]
fn test_filtered_search_returns_only_matching_records(#[case] backend: &str) {
    let embedder = HashingEmbedder::default();
    let mut index = VectorIndex::new(store(backend)).with_overfetch(2, 6);
    for record in records(&embedder) {
        index.upsert(record).expect("upsert");
    }

    let filters = FilterSet::new(vec![
        Filter::Language(LanguageId::Rust),
        Filter::Directory("src/mod1".to_string()),
    ])
    .expect("filters");
    let matches = |m: &RecordMetadata| filters.matches_metadata(m);
    let predicate: MetadataPredicate<'_> = &matches;

    let query = embedder.embed_text("handler_rs_7");
    let hits = index.filtered_search(&query, 3, Some(predicate)).expect("search");

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, SymbolId::from("handler_rs_7"));
    assert!(hits
        .iter()
        .all(|h| h.metadata.language == LanguageId::Rust && h.metadata.path.starts_with("src/mod1/")));
    assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
}

#[rstest]
#[case("exact")]
#[case("hnsw")]
fn test_deleted_records_are_not_returned(#[case] backend: &str) {
    let embedder = HashingEmbedder::default();
    let mut index = VectorIndex::new(store(backend));
    for record in records(&embedder) {
        index.upsert(record).expect("upsert");
    }
    let target = SymbolId::from("handler_py_4");
    assert!(index.delete(&target));
    assert!(!index.delete(&target));

    let query = embedder.embed_text("handler_py_4");
    let hits = index.filtered_search(&query, 10, None).expect("search");
    assert!(hits.iter().all(|h| h.id != target));
    assert_eq!(index.len(), 29);
}
