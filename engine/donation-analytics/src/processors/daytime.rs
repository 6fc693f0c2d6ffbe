//! Weekday/hour heatmap

use crate::filters::FilterSet;
use crate::range::DateRange;
use crate::result::{FilterData, Heatmap};
use crate::store::{OrderStore, StoreResult};
use tracing::warn;

/// Map store day numbering (1 = Sunday .. 7 = Saturday) to 0 = Monday .. 6 = Sunday
pub fn remap_weekday(store_day: i32) -> Option<u8> {
    if (1..=7).contains(&store_day) {
        Some(((store_day + 5) % 7) as u8)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct DaytimeProcessor;

impl DaytimeProcessor {
    pub fn new() -> Self {
        Self
    }

    pub async fn process(
        &self,
        store: &dyn OrderStore,
        range: &DateRange,
        filters: &FilterSet,
    ) -> StoreResult<FilterData> {
        let rows = store.daytime_rows(range, filters).await?;
        let mut heatmap = Heatmap::dense();

        for row in rows {
            let day = remap_weekday(row.day_of_week);
            let hour = u8::try_from(row.hour).ok().filter(|h| *h < Heatmap::HOURS);
            match (day, hour) {
                (Some(day), Some(hour)) => {
                    heatmap.add(day, hour, row.order_count, row.total_amount);
                }
                _ => warn!(
                    day_of_week = row.day_of_week,
                    hour = row.hour,
                    %range,
                    "Discarding heatmap row outside the weekday/hour grid"
                ),
            }
        }

        Ok(FilterData::Heatmap(heatmap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_weekday() {
        assert_eq!(remap_weekday(1), Some(6)); // Sunday
        assert_eq!(remap_weekday(2), Some(0)); // Monday
        assert_eq!(remap_weekday(7), Some(5)); // Saturday
        assert_eq!(remap_weekday(0), None);
        assert_eq!(remap_weekday(8), None);
    }
}
