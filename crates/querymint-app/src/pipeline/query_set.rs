//! Generated search phrases for a single hit.
//!
//! The generation service returns five independent phrase lists. They stay
//! pure data here; validation and normalization live next to the types so the
//! provider adapters can refuse or clean payloads before they reach a
//! checkpoint.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phrase lists produced for one hit. Order inside a list is the order the
/// provider returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySet {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub problems: Vec<String>,
}

/// Phrase category, used to label flattened export rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryCategory {
    Keyword,
    Entity,
    Concept,
    Question,
    Problem,
}

impl QueryCategory {
    pub const ALL: [QueryCategory; 5] = [
        QueryCategory::Keyword,
        QueryCategory::Entity,
        QueryCategory::Concept,
        QueryCategory::Question,
        QueryCategory::Problem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryCategory::Keyword => "keyword",
            QueryCategory::Entity => "entity",
            QueryCategory::Concept => "concept",
            QueryCategory::Question => "question",
            QueryCategory::Problem => "problem",
        }
    }
}

impl Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QuerySet {
    pub fn phrases(&self, category: QueryCategory) -> &[String] {
        match category {
            QueryCategory::Keyword => &self.keywords,
            QueryCategory::Entity => &self.entities,
            QueryCategory::Concept => &self.concepts,
            QueryCategory::Question => &self.questions,
            QueryCategory::Problem => &self.problems,
        }
    }

    /// Iterate categories in export order.
    pub fn categories(&self) -> impl Iterator<Item = (QueryCategory, &[String])> + '_ {
        QueryCategory::ALL
            .into_iter()
            .map(move |category| (category, self.phrases(category)))
    }

    pub fn total_phrases(&self) -> usize {
        self.categories().map(|(_, phrases)| phrases.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_phrases() == 0
    }

    /// Trim every phrase and drop the blank ones, keeping provider order.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            keywords: clean(self.keywords),
            entities: clean(self.entities),
            concepts: clean(self.concepts),
            questions: clean(self.questions),
            problems: clean(self.problems),
        }
    }

    /// Reject payloads where the provider returned nothing usable at all.
    pub fn validate(&self) -> Result<(), QuerySetValidationError> {
        let mut issues = Vec::new();
        if self.is_empty() {
            issues.push("all phrase lists are empty".to_string());
        }
        for (category, phrases) in self.categories() {
            for (idx, phrase) in phrases.iter().enumerate() {
                if phrase.contains('\n') {
                    issues.push(format!("{category}[{idx}] spans multiple lines"));
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(QuerySetValidationError { issues })
        }
    }
}

fn clean(phrases: Vec<String>) -> Vec<String> {
    phrases
        .into_iter()
        .map(|phrase| phrase.trim().to_string())
        .filter(|phrase| !phrase.is_empty())
        .collect()
}

/// Validation failures aggregated into a single error.
#[derive(Debug, Error)]
#[error("query set validation failed: {issues:?}")]
pub struct QuerySetValidationError {
    pub issues: Vec<String>,
}
