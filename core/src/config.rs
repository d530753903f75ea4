use serde::{Deserialize, Serialize};

/// Engine tunables. Defaults follow the listing sizes the book catalogue has
/// always served.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Separator between labels in `Document::categories`.
    pub category_delimiter: String,
    pub popular_limit: usize,
    pub categories_limit: usize,
    pub by_category_limit: usize,
    pub suggestions_limit: usize,
    /// Log recompute progress every this many percent of rows.
    pub progress_every_pct: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            category_delimiter: ", ".to_string(),
            popular_limit: 15,
            categories_limit: 20,
            by_category_limit: 20,
            suggestions_limit: 10,
            progress_every_pct: 10,
        }
    }
}
