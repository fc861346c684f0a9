//! Tag-set filtering
//!
//! Item store queries carry no tag conditions; any/all/none logic over
//! several tags runs here, in memory, over the candidate set.

use std::collections::HashMap;

use crate::types::{Item, TagMatch, TagMode};

/// Anything carrying a list of tags
pub trait Tagged {
    fn tags(&self) -> &[String];
}

impl Tagged for Item {
    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl Tagged for Vec<String> {
    fn tags(&self) -> &[String] {
        self
    }
}

/// Tags to filter on, with combinator and comparison style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagQuery {
    tags: Vec<String>,
    pub mode: TagMode,
    pub match_style: TagMatch,
}

impl TagQuery {
    /// Duplicate query tags (compared case-insensitively) are dropped
    pub fn new(tags: impl IntoIterator<Item = String>, mode: TagMode, match_style: TagMatch) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for tag in tags {
            if !unique.iter().any(|t| t.to_lowercase() == tag.to_lowercase()) {
                unique.push(tag);
            }
        }
        Self {
            tags: unique,
            mode,
            match_style,
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    fn tag_matches(&self, query_tag: &str, item_tag: &str) -> bool {
        let query_tag = query_tag.to_lowercase();
        let item_tag = item_tag.to_lowercase();
        match self.match_style {
            TagMatch::Exact => item_tag == query_tag,
            TagMatch::Contains => item_tag.contains(&query_tag),
            TagMatch::StartsWith => item_tag.starts_with(&query_tag),
        }
    }

    /// Query tags satisfied by at least one of `item_tags`, in query order
    pub fn matched_tags(&self, item_tags: &[String]) -> Vec<String> {
        self.tags
            .iter()
            .filter(|q| item_tags.iter().any(|t| self.tag_matches(q, t)))
            .cloned()
            .collect()
    }

    /// Apply the combinator to a matched set
    pub fn accepts(&self, matched: &[String]) -> bool {
        match self.mode {
            TagMode::Any => !matched.is_empty(),
            TagMode::All => matched.len() == self.tags.len(),
            TagMode::None => matched.is_empty(),
        }
    }
}

/// Items that passed the tag filter, with diagnostics
#[derive(Debug, Clone)]
pub struct TagFilterOutcome<T> {
    /// Kept items paired with the query tags each one matched
    pub items: Vec<(T, Vec<String>)>,
    /// Query tag to number of kept items matching it
    pub matched_counts: HashMap<String, usize>,
}

/// Filter `items` by `query`, preserving input order
pub fn filter_by_tags<T: Tagged>(items: Vec<T>, query: &TagQuery) -> TagFilterOutcome<T> {
    let mut kept = Vec::new();
    let mut matched_counts: HashMap<String, usize> = HashMap::new();

    for item in items {
        let matched = query.matched_tags(item.tags());
        if query.accepts(&matched) {
            for tag in &matched {
                *matched_counts.entry(tag.clone()).or_insert(0) += 1;
            }
            kept.push((item, matched));
        }
    }

    TagFilterOutcome {
        items: kept,
        matched_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn query(list: &[&str], mode: TagMode) -> TagQuery {
        TagQuery::new(tags(list), mode, TagMatch::Exact)
    }

    #[test]
    fn test_mode_semantics() {
        let item = tags(&["A", "B"]);
        let ac = |mode| {
            let q = query(&["A", "C"], mode);
            q.accepts(&q.matched_tags(&item))
        };
        assert!(ac(TagMode::Any));
        assert!(!ac(TagMode::All));
        assert!(!ac(TagMode::None));

        let q = query(&["D"], TagMode::None);
        assert!(q.accepts(&q.matched_tags(&item)));
    }

    #[test]
    fn test_all_with_duplicate_query_tags() {
        let q = query(&["A", "a", "B"], TagMode::All);
        assert_eq!(q.tags().len(), 2);
        assert!(q.accepts(&q.matched_tags(&tags(&["a", "b"]))));
    }

    #[test]
    fn test_match_styles_case_insensitive() {
        let item = tags(&["Machine Learning"]);
        let contains = TagQuery::new(tags(&["learn"]), TagMode::Any, TagMatch::Contains);
        assert_eq!(contains.matched_tags(&item), vec!["learn"]);
        let starts = TagQuery::new(tags(&["MACHINE"]), TagMode::Any, TagMatch::StartsWith);
        assert_eq!(starts.matched_tags(&item), vec!["MACHINE"]);
        let exact = TagQuery::new(tags(&["machine"]), TagMode::Any, TagMatch::Exact);
        assert!(exact.matched_tags(&item).is_empty());
    }

    #[test]
    fn test_filter_counts_and_order() {
        let items = vec![tags(&["A"]), tags(&["B"]), tags(&["A", "B"]), tags(&["C"])];
        let outcome = filter_by_tags(items, &query(&["A", "B"], TagMode::Any));
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.items[2].1, vec!["A", "B"]);
        assert_eq!(outcome.matched_counts["A"], 2);
        assert_eq!(outcome.matched_counts["B"], 2);

        let outcome = filter_by_tags(vec![tags(&["C"])], &query(&["A"], TagMode::None));
        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.matched_counts.is_empty());
    }
}
