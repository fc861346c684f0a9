//! Property-based tests for the Zotero bridge
//!
//! These tests verify invariants that must hold for all inputs:
//! - Parsers never panic
//! - Pagination windows stay inside the result set
//! - Tag combinators agree with their set definitions
//! - Responses always advertise their exact byte length
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// PAGINATION TESTS
// ============================================================================

mod pagination_tests {
    use super::*;
    use zotero_bridge::search::paginate;
    use zotero_bridge::types::Pagination;

    proptest! {
        /// Invariant: a page never holds more than `limit` entries or runs past the end
        #[test]
        fn page_is_bounded(len in 0usize..200, offset in 0usize..300, limit in 0usize..150) {
            let items: Vec<usize> = (0..len).collect();
            let page = paginate(items, offset, limit);
            prop_assert!(page.len() <= limit);
            prop_assert_eq!(page.len(), len.saturating_sub(offset).min(limit));
            if let Some(first) = page.first() {
                prop_assert_eq!(*first, offset);
            }
        }

        /// Invariant: hasMore is true exactly when entries remain after this page
        #[test]
        fn has_more_matches_remaining(total in 0usize..1000, offset in 0usize..1000, limit in 0usize..500) {
            let p = Pagination::new(limit, offset, total);
            prop_assert_eq!(p.has_more, offset + limit < total);
            prop_assert_eq!(p.total, total);
        }

        /// Invariant: no overflow on extreme values
        #[test]
        fn has_more_never_overflows(offset in any::<usize>(), limit in any::<usize>()) {
            let p = Pagination::new(limit, offset, usize::MAX);
            prop_assert!(!p.has_more || offset.saturating_add(limit) < usize::MAX);
        }
    }
}

// ============================================================================
// REQUEST PARSING TESTS
// ============================================================================

mod request_tests {
    use super::*;
    use zotero_bridge::http::{parse_query, parse_request};

    proptest! {
        /// Invariant: parse_request never panics on any input
        #[test]
        fn parse_request_never_panics(s in "\\PC*") {
            let _ = parse_request(&s);
        }

        /// Invariant: parse_query never panics, including on broken escapes
        #[test]
        fn parse_query_never_panics(s in "[a-z%=&+0-9A-F]{0,64}") {
            let _ = parse_query(&s);
        }

        /// Invariant: a well-formed request line always parses, method upper-cased
        #[test]
        fn valid_request_line_parses(
            method in "(get|GET|post|POST|Put|delete)",
            segment in "[a-zA-Z0-9]{1,12}",
        ) {
            let raw = format!("{} /{} HTTP/1.1\r\nHost: x\r\n\r\n", method, segment);
            let request = parse_request(&raw).unwrap();
            prop_assert_eq!(request.method, method.to_ascii_uppercase());
            prop_assert_eq!(request.path, format!("/{}", segment));
        }

        /// Invariant: encoded values decode back to the original text
        #[test]
        fn query_values_decode(value in "\\PC{1,32}") {
            let encoded = urlencoding::encode(&value);
            let params = parse_query(&format!("q={}", encoded));
            prop_assert_eq!(params.get("q"), Some(value.as_str()));
        }
    }
}

// ============================================================================
// TAG FILTER TESTS
// ============================================================================

mod tag_tests {
    use super::*;
    use zotero_bridge::search::{filter_by_tags, TagQuery};
    use zotero_bridge::types::{TagMatch, TagMode};

    fn tag_sets() -> impl Strategy<Value = Vec<Vec<String>>> {
        prop::collection::vec(prop::collection::vec("[a-d]{1,3}", 0..4), 0..12)
    }

    fn query_tags() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-d]{1,3}", 1..4)
    }

    fn has(item: &[String], tag: &str) -> bool {
        item.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    proptest! {
        /// Invariant: any, all and none agree with their set definitions for exact matching
        #[test]
        fn combinators_follow_set_semantics(items in tag_sets(), tags in query_tags()) {
            let any = TagQuery::new(tags.clone(), TagMode::Any, TagMatch::Exact);
            let all = TagQuery::new(tags.clone(), TagMode::All, TagMatch::Exact);
            let none = TagQuery::new(tags.clone(), TagMode::None, TagMatch::Exact);

            let kept_any = filter_by_tags(items.clone(), &any).items.len();
            let kept_all = filter_by_tags(items.clone(), &all).items.len();
            let kept_none = filter_by_tags(items.clone(), &none).items.len();

            let expect_any = items.iter().filter(|i| tags.iter().any(|t| has(i, t))).count();
            let expect_all = items.iter().filter(|i| tags.iter().all(|t| has(i, t))).count();

            prop_assert_eq!(kept_any, expect_any);
            prop_assert_eq!(kept_all, expect_all);
            prop_assert_eq!(kept_none, items.len() - expect_any);
        }

        /// Invariant: filtering preserves input order
        #[test]
        fn filter_is_order_preserving(items in tag_sets(), tags in query_tags()) {
            let query = TagQuery::new(tags, TagMode::Any, TagMatch::Contains);
            let indexed: Vec<Vec<String>> = items
                .iter()
                .enumerate()
                .map(|(i, tags)| {
                    let mut tags = tags.clone();
                    tags.push(format!("#{:03}", i));
                    tags
                })
                .collect();
            let kept = filter_by_tags(indexed, &query).items;
            let order: Vec<String> = kept
                .iter()
                .filter_map(|(tags, _)| tags.last().cloned())
                .collect();
            let mut sorted = order.clone();
            sorted.sort();
            prop_assert_eq!(order, sorted);
        }

        /// Invariant: a looser match style never keeps fewer items
        #[test]
        fn contains_keeps_superset_of_exact(items in tag_sets(), tags in query_tags()) {
            let exact = TagQuery::new(tags.clone(), TagMode::Any, TagMatch::Exact);
            let prefix = TagQuery::new(tags.clone(), TagMode::Any, TagMatch::StartsWith);
            let contains = TagQuery::new(tags, TagMode::Any, TagMatch::Contains);

            let exact = filter_by_tags(items.clone(), &exact).items.len();
            let prefix = filter_by_tags(items.clone(), &prefix).items.len();
            let contains = filter_by_tags(items, &contains).items.len();
            prop_assert!(exact <= prefix);
            prop_assert!(prefix <= contains);
        }
    }
}

// ============================================================================
// RESPONSE FRAMING TESTS
// ============================================================================

mod response_tests {
    use super::*;
    use zotero_bridge::http::HttpResponse;

    proptest! {
        /// Invariant: Content-Length counts bytes of the body, not characters
        #[test]
        fn content_length_is_byte_length(body in "\\PC{0,64}", status in prop::sample::select(vec![200u16, 400, 404, 500])) {
            let bytes = HttpResponse::text(status, body.clone()).to_bytes();
            let wire = String::from_utf8(bytes).unwrap();
            let (head, sent_body) = wire.split_once("\r\n\r\n").unwrap();
            let expected = format!("Content-Length: {}\r\n", body.len());
            let head_lines = format!("{}\r\n", head);
            prop_assert!(head_lines.contains(&expected), "header line missing");
            prop_assert_eq!(sent_body, body.as_str());
        }

        /// Invariant: JSON error bodies always round-trip the message
        #[test]
        fn error_body_is_json(message in "\\PC{0,64}") {
            let response = HttpResponse::error(400, &message);
            let value: serde_json::Value = serde_json::from_str(&response.body).unwrap();
            prop_assert_eq!(value["error"].as_str(), Some(message.as_str()));
        }
    }
}
