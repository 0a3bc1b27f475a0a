//! Smart SQL Core - Storage-independent compiler for soup-qualified queries.
//!
//! Smart SQL is read-only SQL extended with `{soup}` table references and
//! `{soup:path}` column references. This crate rewrites those references into
//! physical identifiers without knowing anything about the storage engine;
//! names are resolved through the [`SoupResolver`] trait.
//!
//! # Main Components
//!
//! - **Compiler**: rewrites references and rejects write statements
//! - **Derived forms**: count, id-only and paged variants of a query
//! - **Resolver**: the seam between the compiler and a soup catalog
//!
//! # Example
//!
//! ```rust
//! use smartsql_core::{InMemoryResolver, SmartSqlCompiler};
//!
//! let mut resolver = InMemoryResolver::new();
//! resolver
//!     .add_soup("contacts", "TABLE_1", false)
//!     .add_column("contacts", "name", "TABLE_1_0")
//!     .add_column("contacts", "age", "TABLE_1_1");
//!
//! let compiler = SmartSqlCompiler::new(&resolver);
//! let compiled = compiler
//!     .compile("select {contacts:name} from {contacts} order by {contacts:age}")
//!     .unwrap();
//! assert_eq!(compiled.sql, "select TABLE_1_0 from TABLE_1 order by TABLE_1_1");
//! ```

pub mod compiler;
pub mod error;
pub mod lexer;
pub mod resolver;

// Re-export main types for convenience
pub use compiler::{
    check_read_only, count_sql, ids_smart_sql, is_reserved_path, page_sql, strip_order_and_limit,
    BodyColumn, CompiledSql, SmartSqlCompiler, CREATED_COLUMN, CREATED_PATH, ENTRY_ID_PATH,
    ID_COLUMN, LAST_MODIFIED_COLUMN, LAST_MODIFIED_PATH, SOUP_COLUMN, SOUP_PATH,
};
pub use error::{SmartSqlError, SmartSqlResult};
pub use resolver::{InMemoryResolver, PathTarget, SoupResolver, SoupTarget};
