//! Codemorph Core - Whole-codebase refactoring engine
//!
//! This crate provides:
//! - Tree-sitter parsing of Python and TypeScript into a typed code graph
//! - Import, export, inheritance and usage resolution across files
//! - Transactional byte-range edits committed atomically per file
//! - Incremental graph sync driven by per-file diffs
//! - An editable surface (`Session`, `Symbol`, `Import`, `SourceFile`, ...)
//!   through which codemods query the graph and queue edits

pub mod codebase;
pub mod diff;
pub mod directory;
pub mod editable;
pub mod graph;
pub mod io;
pub mod lang;
pub mod language;
pub mod node;
pub mod parser;
pub mod references;
pub mod resolver;
pub mod sync;
pub mod syntax;
pub mod transaction;
pub mod verify;

// Façade re-exports
pub use codebase::{CancelHandle, Codebase, CodebaseError, SessionOutcome};

// Editable surface re-exports
pub use editable::{
    DirectoryHandle, Editable, Export, ExternalModule, Import, MoveStrategy, NodeHandle, Session,
    SourceFile, Symbol,
};

// Graph re-exports
pub use diff::{ChangeType, Diff};
pub use graph::{
    CodebaseGraph, EdgeData, EdgeType, GraphError, GraphStats, Usage, UsageKind, UsageKinds,
};
pub use language::{Language, LanguageSelection};
pub use node::{ImportKind, Node, NodeId, NodeType, SymbolKind};
pub use resolver::{ResolverOptions, UsageRecord};
pub use sync::{SyncAction, SyncResult};
pub use syntax::ByteRange;
pub use verify::VerifyReport;
