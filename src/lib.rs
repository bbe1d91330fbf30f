//! gqlforge: the document pipeline of a build-time GraphQL compiler.
//!
//! gqlforge finds GraphQL documents embedded in project sources, parses them
//! into a relational intermediate representation kept in SQLite, validates
//! them against the project schema, and hands flattened documents to
//! whatever generates artifacts from them.
//!
//! # Phases
//!
//! A build runs these phases in order, each through [`Compiler`]:
//!
//! 1. **schema**: load the schema file plus the framework's own directives,
//!    and persist the project configuration.
//! 2. **extract**: scan files for `graphql(\`…\`)` calls, `GraphQL<\`…\`>`
//!    component fields, and standalone `.graphql`/`.gql` files.
//! 3. **after extract**: parse every raw document into the IR, register
//!    component fields, and rewrite runtime scalars.
//! 4. **validate**: run the rule catalogue concurrently and record the lists
//!    found on `@list`/`@paginate` fields.
//! 5. **after validate**: add `__typename` and key fields to composite
//!    selection sets.
//!
//! # Position Conventions
//!
//! Every line and column stored in the IR or reported in a [`Diagnostic`] is
//! 1-based and absolute within its file: offsets of embedded documents are
//! already applied.
//!
//! # Concurrency
//!
//! One writer and many readers share the [`Store`]. Extraction and loading use
//! bounded channels between CPU-count workers; validation rules run on the
//! rayon pool. Every long-running phase observes a [`CancellationToken`].

pub mod cancel;
pub mod collect;
pub mod config;
pub mod diagnostics;
pub mod documents;
pub mod extract;
pub mod filesystem;
pub mod graphql;
pub mod paths;
pub mod pipeline;
pub mod schema;
pub mod store;
pub mod transforms;
pub mod validate;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancellationToken;
pub use collect::{CollectedDocument, CollectedSelection, CollectedValue, Collector};
pub use config::{LogLevel, ProjectConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Location, PipelineError};
pub use extract::{scan_source, ExtractedDocument};
pub use filesystem::{FileStat, FileSystem, OsFileSystem};
pub use pipeline::Compiler;
pub use store::Store;
pub use validate::{DiscoveredList, RULES};
