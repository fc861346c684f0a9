//! Item detail formatting with field selection

use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::storage::LibraryStore;
use crate::types::Item;

use super::extractor::has_extractable_text;

/// Fields returned when the caller does not pick any
pub const DEFAULT_ITEM_FIELDS: &[&str] = &[
    "title",
    "creators",
    "date",
    "itemType",
    "publicationTitle",
    "volume",
    "issue",
    "pages",
    "DOI",
    "url",
    "abstractNote",
    "tags",
    "notes",
    "attachments",
];

/// Render one item as a JSON object holding the requested fields
///
/// `key`, `itemType` and `zoteroUrl` are always present. Unknown field names
/// produce an empty string, like an unset bibliographic field.
pub fn format_item(store: &dyn LibraryStore, item: &Item, fields: &[String]) -> Result<Value> {
    let mut out = Map::new();
    out.insert("key".into(), json!(item.key));
    out.insert("itemType".into(), json!(item.item_type));
    out.insert(
        "zoteroUrl".into(),
        json!(format!("zotero://select/library/items/{}", item.key)),
    );

    let requested: Vec<&str> = if fields.is_empty() {
        DEFAULT_ITEM_FIELDS.to_vec()
    } else {
        fields.iter().map(String::as_str).collect()
    };

    let children = if requested.iter().any(|f| *f == "notes" || *f == "attachments") {
        store.child_items(item.id)?
    } else {
        Vec::new()
    };

    for field in requested {
        let value = match field {
            "itemType" | "key" => continue,
            "creators" => json!(item
                .creators
                .iter()
                .map(|c| json!({
                    "firstName": c.first_name,
                    "lastName": c.last_name,
                    "creatorType": c.creator_type,
                }))
                .collect::<Vec<_>>()),
            "tags" => json!(item.tags),
            "notes" => json!(children
                .iter()
                .filter(|c| c.is_note())
                .filter_map(|c| c.note.clone())
                .collect::<Vec<_>>()),
            "attachments" => json!(children
                .iter()
                .filter_map(attachment_summary)
                .collect::<Vec<_>>()),
            "dateAdded" => json!(item.date_added.to_rfc3339()),
            "dateModified" => json!(item.date_modified.to_rfc3339()),
            other => json!(item.field(other)),
        };
        out.insert(field.to_string(), value);
    }
    Ok(Value::Object(out))
}

/// Attachments without a local file are left out
fn attachment_summary(child: &Item) -> Option<Value> {
    let info = child.attachment.as_ref().filter(|_| child.is_attachment())?;
    let path = info.path.as_deref().filter(|p| !p.is_empty())?;
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    Some(json!({
        "key": child.key,
        "title": child.field("title"),
        "path": path,
        "contentType": info.content_type,
        "filename": info.filename,
        "url": child.field("url"),
        "linkMode": info.link_mode,
        "hasFulltext": has_extractable_text(info),
        "size": size,
    }))
}

pub fn format_items(store: &dyn LibraryStore, items: &[Item], fields: &[String]) -> Result<Vec<Value>> {
    items.iter().map(|item| format_item(store, item, fields)).collect()
}
