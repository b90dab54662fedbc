pub mod cache;
pub mod documents;
pub mod handle;
pub mod schema;
pub mod series;
pub mod util;

pub use cache::BlobCache;
pub use documents::{Collection, Condition, DocumentStore, FindOptions, SortOrder};
pub use handle::DbHandle;
pub use series::{
    Aggregator, LabelMatch, LabelValue, RangeOptions, SeriesFilter, SeriesRange, SeriesStore,
};
