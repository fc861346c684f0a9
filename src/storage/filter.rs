//! Search conditions for item store queries
//!
//! A query is a conjunction of conditions, each naming a searchable field,
//! an operator and a string value:
//!
//! ```text
//! quicksearch contains "neural"
//! itemType    isNot    "attachment"
//! date        isAtLeast "2020"
//! ```
//!
//! Tag-set logic (any/all/none across several tags) is not expressible here;
//! see [`crate::search::tags`].

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Searchable item fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchField {
    /// Title, creators, year and tags at once
    #[serde(rename = "quicksearch")]
    QuickSearch,
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "creator")]
    Creator,
    /// Four-digit year of the date field
    #[serde(rename = "year")]
    Year,
    #[serde(rename = "itemType")]
    ItemType,
    #[serde(rename = "DOI")]
    Doi,
    #[serde(rename = "ISBN")]
    Isbn,
    /// Collection key
    #[serde(rename = "collection")]
    Collection,
    /// "true" or "false"
    #[serde(rename = "attachment")]
    HasAttachment,
    /// "true" or "false"
    #[serde(rename = "note")]
    HasNote,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchOperator {
    Is,
    IsNot,
    Contains,
    DoesNotContain,
    BeginsWith,
    EndsWith,
    /// Case-insensitive regular expression
    Matches,
    /// Numeric comparison (years)
    IsAtLeast,
    IsAtMost,
}

impl SearchOperator {
    fn is_negated(&self) -> bool {
        matches!(self, SearchOperator::IsNot | SearchOperator::DoesNotContain)
    }
}

/// A single field condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: SearchField,
    pub operator: SearchOperator,
    pub value: String,
}

/// Conjunctive query against the item store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemQuery {
    /// Library to search; `None` means the user library
    pub library_id: Option<i64>,
    pub conditions: Vec<Condition>,
}

impl ItemQuery {
    pub fn new(library_id: Option<i64>) -> Self {
        Self {
            library_id,
            conditions: Vec::new(),
        }
    }

    pub fn add(&mut self, field: SearchField, operator: SearchOperator, value: impl Into<String>) {
        self.conditions.push(Condition {
            field,
            operator,
            value: value.into(),
        });
    }

    /// Builder form of [`add`](Self::add)
    pub fn with(mut self, field: SearchField, operator: SearchOperator, value: impl Into<String>) -> Self {
        self.add(field, operator, value);
        self
    }

    /// Compile every condition, rejecting invalid regexes and non-numeric bounds
    pub fn compile(&self) -> Result<Vec<CompiledCondition>> {
        self.conditions.iter().map(CompiledCondition::new).collect()
    }
}

/// A condition ready for repeated evaluation
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    pub field: SearchField,
    pub operator: SearchOperator,
    needle: String,
    regex: Option<Regex>,
    number: Option<i64>,
}

impl CompiledCondition {
    fn new(condition: &Condition) -> Result<Self> {
        let regex = match condition.operator {
            SearchOperator::Matches => Some(
                RegexBuilder::new(&condition.value)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        BridgeError::validation(format!(
                            "Invalid regular expression '{}': {}",
                            condition.value, e
                        ))
                    })?,
            ),
            _ => None,
        };
        let number = match condition.operator {
            SearchOperator::IsAtLeast | SearchOperator::IsAtMost => {
                Some(condition.value.trim().parse::<i64>().map_err(|_| {
                    BridgeError::validation(format!(
                        "Expected a number for {:?}, got '{}'",
                        condition.field, condition.value
                    ))
                })?)
            }
            _ => None,
        };
        Ok(Self {
            field: condition.field,
            operator: condition.operator,
            needle: condition.value.to_lowercase(),
            regex,
            number,
        })
    }

    /// Raw (lowercased) comparison value
    pub fn value(&self) -> &str {
        &self.needle
    }

    /// Evaluate against a set of candidate strings for the field.
    ///
    /// Positive operators pass when any candidate matches; negated operators
    /// pass when no candidate matches the positive form.
    pub fn matches_any<'a, I>(&self, candidates: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut any = false;
        for candidate in candidates {
            if self.matches_one(candidate) {
                any = true;
                break;
            }
        }
        if self.operator.is_negated() {
            !any
        } else {
            any
        }
    }

    /// Evaluate against a numeric field value (years)
    pub fn matches_number(&self, value: Option<i64>) -> bool {
        match (self.operator, value, self.number) {
            (SearchOperator::IsAtLeast, Some(v), Some(bound)) => v >= bound,
            (SearchOperator::IsAtMost, Some(v), Some(bound)) => v <= bound,
            (SearchOperator::IsAtLeast | SearchOperator::IsAtMost, _, _) => false,
            (_, Some(v), _) => self.matches_any([v.to_string().as_str()]),
            (_, None, _) => self.matches_any([""]),
        }
    }

    /// Positive form of the operator against one candidate
    fn matches_one(&self, candidate: &str) -> bool {
        if let Some(regex) = &self.regex {
            return regex.is_match(candidate);
        }
        let candidate = candidate.to_lowercase();
        match self.operator {
            SearchOperator::Is | SearchOperator::IsNot => candidate == self.needle,
            SearchOperator::Contains | SearchOperator::DoesNotContain => {
                candidate.contains(&self.needle)
            }
            SearchOperator::BeginsWith => candidate.starts_with(&self.needle),
            SearchOperator::EndsWith => candidate.ends_with(&self.needle),
            SearchOperator::Matches => false,
            SearchOperator::IsAtLeast | SearchOperator::IsAtMost => candidate
                .trim()
                .parse::<i64>()
                .ok()
                .zip(self.number)
                .map(|(v, bound)| {
                    if self.operator == SearchOperator::IsAtLeast {
                        v >= bound
                    } else {
                        v <= bound
                    }
                })
                .unwrap_or(false),
        }
    }
}
