pub mod catalog;
pub mod engine;
pub mod index_spec;
pub mod query_spec;
pub mod soup;
pub mod soup_spec;
pub mod transaction;

pub use catalog::{Catalog, SoupMeta};
pub use engine::SmartStore;
pub use index_spec::{project, FtsExtension, IndexSpec, IndexType};
pub use query_spec::{Order, QuerySpec, QueryType};
pub use soup_spec::{SoupSpec, FEATURE_EXTERNAL_STORAGE};
pub use transaction::TransactionScope;
