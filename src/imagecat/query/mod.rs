//! # Listing Query Compiler
//!
//! Turns caller-supplied filters, sort and page window into parameterized SQL
//! over the image hierarchy.
//!
//! ## Pipeline
//!
//! 1. [`filter`]: the untrusted request (`name[ilike]=kid*`, sort, offset, max).
//! 2. [`columns`]: property names are resolved against closed allow-lists,
//!    with synonyms (`name`, `numberOfAnnotations`, `tag`, ...) rewritten first.
//! 3. [`predicate`]: each filter becomes an [`expr::Expr`] node, with operator
//!    semantics and value coercion applied.
//! 4. [`redaction`]: name filters and name sorts are rewritten per project
//!    according to blind mode.
//! 5. [`listing`]: the tree is rendered into a page query and a count query
//!    that share one FROM/WHERE, joining only what is referenced.
//! 6. [`projection`] and [`page`]: result rows are shaped, redacted and
//!    wrapped in a page envelope.

pub mod columns;
pub mod expr;
pub mod filter;
pub mod listing;
pub mod page;
pub mod predicate;
pub mod projection;
pub mod redaction;

pub use filter::{FilterValue, ListRequest, Operator, SearchParameter, SortDirection};
pub use listing::{CompiledListing, InstanceScope};
pub use page::Page;
pub use projection::ProjectedRow;
pub use redaction::{Redaction, Visibility};
