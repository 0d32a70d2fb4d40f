//! News item storage port.

use crate::domain::error::StockportError;
use crate::domain::news::NewsItem;
use chrono::NaiveDateTime;

pub trait NewsPort {
    /// Stores items, skipping any whose URL is already present. Returns the
    /// number of new rows.
    fn store_news(&self, items: &[NewsItem]) -> Result<usize, StockportError>;

    /// Items for `symbols` published at or after `since`, newest first.
    fn fetch_news(
        &self,
        symbols: &[String],
        since: NaiveDateTime,
        limit: usize,
    ) -> Result<Vec<NewsItem>, StockportError>;
}
