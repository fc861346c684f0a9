//! Result ordering and pagination

use std::cmp::Ordering;

use crate::types::{Item, SortField, SortOrder};

/// Case-normalized sort key for an item
pub fn sort_key(item: &Item, field: SortField) -> String {
    match field {
        SortField::Creator => item
            .creators
            .iter()
            .map(|c| c.last_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
            .to_lowercase(),
        SortField::Title => item.display_title().to_lowercase(),
        SortField::Date => item.field("date").to_lowercase(),
        SortField::DateAdded => item.date_added.to_rfc3339(),
        SortField::DateModified => item.date_modified.to_rfc3339(),
    }
}

/// Stable sort; items with equal keys keep their relative order in both directions
pub fn sort_by_field<T, F>(items: Vec<T>, field: SortField, order: SortOrder, item_of: F) -> Vec<T>
where
    F: Fn(&T) -> &Item,
{
    let mut keyed: Vec<(String, T)> = items
        .into_iter()
        .map(|entry| (sort_key(item_of(&entry), field), entry))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| compare(a, b, order));
    keyed.into_iter().map(|(_, entry)| entry).collect()
}

fn compare(a: &str, b: &str, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => a.cmp(b),
        SortOrder::Desc => b.cmp(a),
    }
}

/// `[offset, offset + limit)` clipped to the slice
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Creator;
    use chrono::{TimeZone, Utc};

    fn item(id: i64, title: &str, last: &str, day: u32) -> Item {
        Item {
            id,
            key: format!("KEY{:05}", id),
            library_id: 1,
            item_type: "journalArticle".into(),
            fields: [("title".to_string(), title.to_string())].into_iter().collect(),
            creators: vec![Creator {
                first_name: "A".into(),
                last_name: last.into(),
                creator_type: "author".into(),
            }],
            tags: vec![],
            collections: vec![],
            parent_id: None,
            date_added: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            date_modified: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            attachment: None,
            note: None,
        }
    }

    fn ids(items: &[Item]) -> Vec<i64> {
        items.iter().map(|i| i.id).collect()
    }

    #[test]
    fn test_title_sort_case_insensitive() {
        let items = vec![item(1, "beta", "X", 1), item(2, "Alpha", "Y", 2), item(3, "gamma", "Z", 3)];
        let items = sort_by_field(items, SortField::Title, SortOrder::Asc, |i| i);
        assert_eq!(ids(&items), vec![2, 1, 3]);
    }

    #[test]
    fn test_stable_in_both_directions() {
        let items = vec![item(1, "same", "X", 1), item(2, "same", "X", 1), item(3, "other", "X", 1)];
        let items = sort_by_field(items, SortField::Title, SortOrder::Desc, |i| i);
        assert_eq!(ids(&items), vec![1, 2, 3]);
        let items = sort_by_field(items, SortField::Title, SortOrder::Asc, |i| i);
        assert_eq!(ids(&items), vec![3, 1, 2]);
    }

    #[test]
    fn test_creator_and_date_added() {
        let items = vec![item(1, "t", "Zed", 3), item(2, "t", "adams", 1), item(3, "t", "Moss", 2)];
        let items = sort_by_field(items, SortField::Creator, SortOrder::Asc, |i| i);
        assert_eq!(ids(&items), vec![2, 3, 1]);
        let items = sort_by_field(items, SortField::DateAdded, SortOrder::Desc, |i| i);
        assert_eq!(ids(&items), vec![1, 3, 2]);
    }

    #[test]
    fn test_paginate() {
        let items: Vec<usize> = (0..37).collect();
        assert_eq!(paginate(items.clone(), 30, 10).len(), 7);
        assert_eq!(paginate(items.clone(), 20, 10).len(), 10);
        assert!(paginate(items, 50, 10).is_empty());
    }
}
