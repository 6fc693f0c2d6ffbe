//! Category and tag breakdown

use crate::filters::FilterSet;
use crate::range::DateRange;
use crate::result::{Breakdown, FilterData};
use crate::store::{OrderStore, StoreResult};

/// Name of the store's catch-all category
pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, Default)]
pub struct DesignationProcessor;

impl DesignationProcessor {
    pub fn new() -> Self {
        Self
    }

    fn is_excluded(term_id: u64, name: &str, default_id: Option<u64>) -> bool {
        default_id == Some(term_id) || name.trim().eq_ignore_ascii_case(UNCATEGORIZED)
    }

    pub async fn process(
        &self,
        store: &dyn OrderStore,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<FilterData> {
        let default_id = store.default_designation_id();
        let rows = store.designation_rows(range, filters).await?;

        let mut breakdown = Breakdown::new(false);
        breakdown.drop_empty = true;

        for row in rows {
            if Self::is_excluded(row.term_id, &row.name, default_id) {
                continue;
            }
            let entry = breakdown.entry(row.name.clone(), row.name);
            entry.taxonomy.get_or_insert(row.taxonomy);
            entry.record(row.day, row.item_count, row.total_amount);
            entry.add_items(row.item_count);
        }

        // zero count or total entries are dropped once chunks are merged
        Ok(FilterData::Breakdown(breakdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusions() {
        assert!(DesignationProcessor::is_excluded(15, "Anything", Some(15)));
        assert!(DesignationProcessor::is_excluded(3, "UnCategorized", Some(15)));
        assert!(DesignationProcessor::is_excluded(3, " uncategorized ", None));
        assert!(!DesignationProcessor::is_excluded(3, "Water Wells", Some(15)));
    }
}
