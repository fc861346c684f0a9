//! Golden tests - fixture-based tests that lock expected behavior
//!
//! A fixed library snapshot is searched with recorded parameter sets; any
//! change in filtering, ordering or validation messages fails here.
//!
//! Run with: cargo test --test golden_tests

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use zotero_bridge::storage::MemoryLibrary;

fn fixture_library() -> Arc<MemoryLibrary> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/library.json");
    Arc::new(MemoryLibrary::load(Path::new(path)).expect("Failed to load library.json fixture"))
}

// ============================================================================
// SEARCH GOLDEN TESTS
// ============================================================================

mod search_golden {
    use super::*;
    use zotero_bridge::search::SearchEngine;
    use zotero_bridge::types::QueryParams;

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        params: BTreeMap<String, String>,
        expected: Expected,
    }

    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    enum Expected {
        Ok { keys: Vec<String>, total: usize },
        Err { error: String },
    }

    #[derive(Debug, Deserialize)]
    struct Fixture {
        test_cases: Vec<TestCase>,
    }

    #[test]
    fn test_search_golden() {
        let fixture_path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/search_cases.json");
        let content =
            fs::read_to_string(fixture_path).expect("Failed to read search_cases.json fixture");
        let fixture: Fixture = serde_json::from_str(&content).expect("Failed to parse fixture JSON");
        let engine = SearchEngine::new(fixture_library());

        for case in fixture.test_cases {
            let params = case
                .params
                .iter()
                .fold(QueryParams::new(), |p, (k, v)| p.with(k.as_str(), v.as_str()));
            let result = engine.search_params(&params);

            match case.expected {
                Expected::Ok { keys, total } => {
                    let result = result.unwrap_or_else(|e| {
                        panic!("Case '{}': expected results, got error {}", case.name, e)
                    });
                    let actual: Vec<&str> = result.results.iter().map(|r| r.key.as_str()).collect();
                    assert_eq!(actual, keys, "Case '{}': result keys mismatch", case.name);
                    assert_eq!(
                        result.pagination.total, total,
                        "Case '{}': total mismatch",
                        case.name
                    );
                }
                Expected::Err { error } => {
                    let err = match result {
                        Ok(r) => panic!(
                            "Case '{}': expected error '{}', got {} results",
                            case.name,
                            error,
                            r.results.len()
                        ),
                        Err(e) => e,
                    };
                    assert_eq!(err.status_code(), 400, "Case '{}': status", case.name);
                    assert!(
                        err.to_string().starts_with(&error),
                        "Case '{}': '{}' does not start with '{}'",
                        case.name,
                        err,
                        error
                    );
                }
            }
        }
    }

    #[test]
    fn test_matched_tag_counts() {
        let engine = SearchEngine::new(fixture_library());
        let params = QueryParams::new()
            .with("tags", "transformers,deep learning")
            .with("tagMode", "any");
        let result = engine.search_params(&params).unwrap();

        assert_eq!(result.pagination.total, 3);
        assert_eq!(result.matched_tags.get("transformers"), Some(&2));
        assert_eq!(result.matched_tags.get("deep learning"), Some(&2));

        let first = &result.results[0];
        assert_eq!(first.key, "PAPER003");
        assert_eq!(first.matched_tags.as_deref(), Some(&["transformers".to_string()][..]));
    }
}

// ============================================================================
// COLLECTION GOLDEN TESTS
// ============================================================================

mod collection_golden {
    use super::*;
    use zotero_bridge::content::{CollectionListOptions, CollectionService};

    #[test]
    fn test_collection_listing_order_and_counts() {
        let service = CollectionService::new(fixture_library());
        let listing = service.list(&CollectionListOptions::default()).unwrap();

        assert_eq!(listing.total, 3);
        let names: Vec<&str> = listing
            .entries
            .iter()
            .filter_map(|c| c["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec!["Computer Vision", "Machine Learning", "Programming Languages"]
        );

        let ml = &listing.entries[1];
        assert_eq!(ml["itemCount"], 2);
        assert_eq!(ml["childCollectionCount"], 1);
        assert_eq!(listing.entries[0]["parentCollection"], "COLLML01");
    }

    #[test]
    fn test_collection_items_fields() {
        let service = CollectionService::new(fixture_library());
        let listing = service
            .items("COLLML01", 10, 0, &["title".to_string()])
            .unwrap();
        assert_eq!(listing.total, 2);
        for entry in &listing.entries {
            assert!(entry["title"].is_string());
        }
    }
}

// ============================================================================
// CONTENT GOLDEN TESTS
// ============================================================================

mod content_golden {
    use super::*;
    use zotero_bridge::content::FulltextSections;
    use zotero_bridge::Services;

    #[test]
    fn test_item_fulltext_bundle() {
        let services = Services::with_file_extractor(fixture_library());
        let bundle = services
            .fulltext
            .item_fulltext("PAPER001", FulltextSections::default())
            .unwrap();

        assert_eq!(bundle.item_key, "PAPER001");
        assert_eq!(bundle.title, "Attention Is All You Need");
        assert_eq!(bundle.fulltext.attachments.len(), 1);
        assert_eq!(bundle.fulltext.notes.len(), 1);
        let abstract_text = bundle.abstract_text.expect("fixture item has an abstract");
        assert!(abstract_text.content.starts_with("The dominant sequence"));
        assert_eq!(abstract_text.length, abstract_text.content.chars().count());
    }

    #[test]
    fn test_notes_are_plain_text() {
        let services = Services::with_file_extractor(fixture_library());
        let page = services.content.notes("PAPER001", 20, 0).unwrap();
        assert_eq!(page.total_count, 1);
        let note = &page.notes[0];
        assert_eq!(note.note_key, "NOTE0001");
        assert!(note.content.contains("Key idea: self-attention replaces recurrence"));
        assert!(!note.content.contains("<p>"));
        assert!(note.html_content.starts_with("<p>"));
    }
}
