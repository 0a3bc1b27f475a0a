pub mod alter;
pub mod config;
pub mod error;
pub mod registry;
pub mod storage;

pub use alter::{AlterSoupOperation, AlterSoupStep, LongOperation};
pub use config::StoreConfig;
pub use error::{DbError, DbResult};
pub use registry::StoreRegistry;
pub use storage::{
    FtsExtension, IndexSpec, IndexType, Order, QuerySpec, QueryType, SmartStore, SoupSpec,
    TransactionScope,
};
