//! Flat query parameters to a structured [`SearchQuery`]

use regex::Regex;

use crate::error::{BridgeError, Result};
use crate::types::{QueryParams, SearchQuery, SortField, SortOrder, TitleOperator, YearRange};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 500;

/// Build a [`SearchQuery`] from request parameters.
///
/// Sort field and direction are checked first so an unsupported sort is
/// reported before anything else is looked at.
pub fn parse_search_params(params: &QueryParams) -> Result<SearchQuery> {
    let sort = match params.get_non_empty("sort") {
        Some(raw) => raw.parse::<SortField>().map_err(BridgeError::Validation)?,
        None => SortField::default(),
    };
    let direction = match params.get_non_empty("direction") {
        Some(raw) => raw.parse::<SortOrder>().map_err(BridgeError::Validation)?,
        None => SortOrder::default(),
    };

    let limit = params
        .parse_usize("limit", DEFAULT_LIMIT)
        .map_err(BridgeError::Validation)?
        .min(MAX_LIMIT);
    let offset = params
        .parse_usize("offset", 0)
        .map_err(BridgeError::Validation)?;

    let library_id = match params.get_non_empty("libraryID") {
        Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
            BridgeError::validation(format!("Invalid libraryID: '{}'", raw))
        })?),
        None => None,
    };

    let title_operator = match params.get_non_empty("titleOperator") {
        Some(raw) => raw.parse::<TitleOperator>().map_err(BridgeError::Validation)?,
        None => TitleOperator::default(),
    };
    let title = params.get_non_empty("title").map(str::to_string);
    if let (Some(pattern), TitleOperator::Regex) = (&title, title_operator) {
        Regex::new(pattern).map_err(|e| {
            BridgeError::validation(format!("Invalid title regex '{}': {}", pattern, e))
        })?;
    }

    let year_range = params
        .get_non_empty("yearRange")
        .map(parse_year_range)
        .transpose()?;

    let mut tags = params.get_list("tags");
    if tags.is_empty() && !params.contains_key("tags") {
        tags = params.get_list("tag");
    }

    Ok(SearchQuery {
        q: params.get_non_empty("q").map(str::to_string),
        key: params.get_non_empty("key").map(str::to_string),
        title,
        title_operator,
        creator: params.get_non_empty("creator").map(str::to_string),
        year: params.get_non_empty("year").map(str::to_string),
        year_range,
        item_type: params.get_non_empty("itemType").map(str::to_string),
        doi: params.get_non_empty("doi").map(str::to_string),
        isbn: params.get_non_empty("isbn").map(str::to_string),
        collection: params.get_non_empty("collection").map(str::to_string),
        has_attachment: params
            .get_non_empty("hasAttachment")
            .map(|raw| parse_presence(raw, "hasAttachment"))
            .transpose()?,
        has_note: params
            .get_non_empty("hasNote")
            .map(|raw| parse_presence(raw, "hasNote"))
            .transpose()?,
        include_attachments: params.flag("includeAttachments"),
        include_notes: params.flag("includeNotes"),
        tags,
        tag_mode: match params.get_non_empty("tagMode") {
            Some(raw) => raw.parse().map_err(BridgeError::Validation)?,
            None => Default::default(),
        },
        tag_match: match params.get_non_empty("tagMatch") {
            Some(raw) => raw.parse().map_err(BridgeError::Validation)?,
            None => Default::default(),
        },
        sort,
        direction,
        limit,
        offset,
        library_id,
    })
}

fn parse_presence(raw: &str, name: &str) -> Result<bool> {
    match raw.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(BridgeError::validation(format!(
            "Invalid {}: '{}'. Use 'true' or 'false'.",
            name, other
        ))),
    }
}

/// `"2020-2023"`, `"2020-"`, `"-2023"` or a single `"2020"`
pub fn parse_year_range(raw: &str) -> Result<YearRange> {
    let invalid = || {
        BridgeError::validation(format!(
            "Invalid yearRange: '{}'. Expected 'YYYY-YYYY', 'YYYY-' or '-YYYY'.",
            raw
        ))
    };
    let parse_bound = |s: &str| -> Result<Option<i32>> {
        let s = s.trim();
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse::<i32>().map(Some).map_err(|_| invalid())
        }
    };

    let range = match raw.trim().split_once('-') {
        Some((from, to)) => YearRange {
            from: parse_bound(from)?,
            to: parse_bound(to)?,
        },
        None => {
            let year = parse_bound(raw)?;
            YearRange { from: year, to: year }
        }
    };
    if range.from.is_none() && range.to.is_none() {
        return Err(invalid());
    }
    if let (Some(from), Some(to)) = (range.from, range.to) {
        if from > to {
            return Err(invalid());
        }
    }
    Ok(range)
}
