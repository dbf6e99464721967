use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Vector similarity only: fusion runs with the keyword weight zeroed.
    Semantic,
    /// Vector similarity fused with keyword matching (the default).
    Hybrid,
    /// Hybrid, with a caller-supplied document/section predicate applied
    /// before ranking.
    Contextual,
}

impl Default for SearchMethod {
    fn default() -> Self {
        Self::Hybrid
    }
}

impl std::str::FromStr for SearchMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            "contextual" => Ok(Self::Contextual),
            other => Err(format!("unknown search method '{other}'")),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SearchMethod::Semantic => "semantic",
            SearchMethod::Hybrid => "hybrid",
            SearchMethod::Contextual => "contextual",
        };
        f.write_str(label)
    }
}
