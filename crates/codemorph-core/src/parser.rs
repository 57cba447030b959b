//! Parser adapter.
//!
//! Turns one file's bytes into a fully-formed, detached file subtree
//! ([`ParsedFile`]): the FILE node plus every SYMBOL, IMPORT and EXPORT
//! node it owns, with ids already allocated. Parsing is independent per
//! file, so callers fan it out over a thread pool and merge the results on
//! one thread.
//!
//! ## Usage
//!
//! ```ignore
//! let parsed = parse_file("pkg/mod.py", content, None, generation)?;
//! graph.insert_file(parsed)?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use tree_sitter::{Parser, Tree};

use crate::io::content_hash;
use crate::lang::{Entity, EntityKind};
use crate::language::{Grammar, Language};
use crate::node::{FileData, Node, NodeData, NodeId};
use crate::syntax::{ByteRange, SyntaxNode};

// ============================================================================
// Parser Errors
// ============================================================================

/// Errors that can occur during parsing.
#[derive(Debug, Error)]
pub enum ParserError {
    /// Failed to set language
    #[error("Failed to set language: {0}")]
    LanguageSet(String),

    /// Tree-sitter returned no tree
    #[error("Failed to parse {path}")]
    ParseFailed { path: String },

    /// Unsupported language
    #[error("Unsupported language for file: {0}")]
    UnsupportedLanguage(String),
}

pub type Result<T> = std::result::Result<T, ParserError>;

// ============================================================================
// Code Parser
// ============================================================================

/// A tree-sitter parser bound to one grammar.
pub struct CodeParser {
    parser: Parser,
    grammar: Grammar,
}

impl CodeParser {
    /// Create a new parser for the specified grammar.
    pub fn new(grammar: Grammar) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&grammar.tree_sitter_language())
            .map_err(|e| ParserError::LanguageSet(e.to_string()))?;
        Ok(Self { parser, grammar })
    }

    /// Create a parser for the given file path.
    ///
    /// Detects the grammar from the file extension.
    pub fn for_path(path: &str) -> Result<Self> {
        let grammar = Grammar::from_path(Path::new(path))
            .ok_or_else(|| ParserError::UnsupportedLanguage(path.to_string()))?;
        Self::new(grammar)
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Parse source code into a syntax tree.
    pub fn parse(&mut self, path: &str, source: &str) -> Result<Tree> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| ParserError::ParseFailed {
                path: path.to_string(),
            })
    }
}

/// Parse `source` into the typed syntax tree for `grammar`.
pub fn syntax_tree(path: &str, grammar: Grammar, source: &str) -> Result<SyntaxNode> {
    let mut parser = CodeParser::new(grammar)?;
    let tree = parser.parse(path, source)?;
    let table = grammar.language().support().class_table();
    Ok(SyntaxNode::build(tree.root_node(), table))
}

// ============================================================================
// Parsed files
// ============================================================================

/// A file subtree ready to be merged into the graph.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub file: Node,
    /// Owned nodes in source order (parents before children)
    pub nodes: Vec<Node>,
}

impl ParsedFile {
    pub fn path(&self) -> &str {
        self.file.as_file().map(|f| f.path.as_str()).unwrap_or("")
    }

    pub fn has_errors(&self) -> bool {
        self.file.as_file().is_some_and(|f| f.has_errors)
    }
}

/// Parse one file into a detached subtree.
///
/// `file_id` keeps the identity of a FILE node across a reparse. Syntax
/// errors never fail the parse: the file is flagged and the broken regions
/// become inert `Value` nodes.
pub fn parse_file(
    path: &str,
    content: Arc<str>,
    file_id: Option<NodeId>,
    generation: u64,
) -> Result<ParsedFile> {
    let grammar = Grammar::from_path(Path::new(path))
        .ok_or_else(|| ParserError::UnsupportedLanguage(path.to_string()))?;
    let language = grammar.language();
    let support = language.support();

    let root = syntax_tree(path, grammar, &content)?;
    let has_errors = root.has_error();
    if has_errors {
        warn!(file = %path, "ParseWarning: syntax errors preserved as values");
    }

    let extraction = support.extract(&root, &content);
    let file_id = file_id.unwrap_or_else(NodeId::next);

    let mut builder = SubtreeBuilder {
        file: file_id,
        language,
        generation,
        nodes: Vec::new(),
    };
    builder.materialize(extraction.entities, None);

    let mut locals = HashMap::new();
    for node in builder.nodes.iter().filter(|n| n.parent.is_none()) {
        let name = match &node.data {
            NodeData::Symbol(s) => Some(s.name.as_str()),
            NodeData::Import(i) => i.local_name(),
            _ => None,
        };
        if let Some(name) = name {
            locals.insert(name.to_string(), node.id);
        }
    }

    let hash = content_hash(&content);
    let file = Node {
        id: file_id,
        language,
        range: ByteRange::new(0, content.len()),
        ts_kind: root.kind,
        file: Some(file_id),
        parent: None,
        generation,
        data: NodeData::File(FileData {
            path: path.to_string(),
            grammar,
            content,
            hash,
            has_errors,
            docstring_range: extraction.docstring_range,
            statements: extraction.statements,
            references: extraction.references,
            nodes: builder.nodes.iter().map(|n| n.id).collect(),
            locals,
        }),
    };

    debug!(file = %path, nodes = builder.nodes.len(), "Parsed file");
    Ok(ParsedFile {
        file,
        nodes: builder.nodes,
    })
}

/// Allocates ids for extracted entities and flattens them into nodes.
struct SubtreeBuilder {
    file: NodeId,
    language: Language,
    generation: u64,
    nodes: Vec<Node>,
}

impl SubtreeBuilder {
    fn node(
        &self,
        id: NodeId,
        range: ByteRange,
        ts_kind: &'static str,
        parent: Option<NodeId>,
        data: NodeData,
    ) -> Node {
        Node {
            id,
            language: self.language,
            range,
            ts_kind,
            file: Some(self.file),
            parent,
            generation: self.generation,
            data,
        }
    }

    /// Push `entities` and their descendants; returns the ids of the
    /// symbols created at this level.
    fn materialize(&mut self, entities: Vec<Entity>, parent: Option<NodeId>) -> Vec<NodeId> {
        let mut symbols = Vec::new();
        for entity in entities {
            let id = NodeId::next();
            match entity.kind {
                EntityKind::Symbol { mut data, export } => {
                    let slot = self.nodes.len();
                    let placeholder = self.node(
                        id,
                        entity.range,
                        entity.ts_kind,
                        parent,
                        NodeData::Symbol(data.clone()),
                    );
                    self.nodes.push(placeholder);
                    data.children = self.materialize(entity.children, Some(id));
                    self.nodes[slot].data = NodeData::Symbol(data);
                    symbols.push(id);

                    if let Some(mut export) = export {
                        export.declaration = Some(id);
                        let export_id = NodeId::next();
                        let node = self.node(
                            export_id,
                            export.statement_range,
                            entity.ts_kind,
                            parent,
                            NodeData::Export(export),
                        );
                        self.nodes.push(node);
                    }
                }
                EntityKind::Import(data) => {
                    let node =
                        self.node(id, entity.range, entity.ts_kind, parent, NodeData::Import(data));
                    self.nodes.push(node);
                }
                EntityKind::Export(data) => {
                    let node =
                        self.node(id, entity.range, entity.ts_kind, parent, NodeData::Export(data));
                    self.nodes.push(node);
                }
            }
        }
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ImportKind, NodeType, SymbolKind};

    fn parse(path: &str, source: &str) -> ParsedFile {
        parse_file(path, Arc::from(source), None, 1).unwrap()
    }

    #[test]
    fn test_parse_python_file() {
        let parsed = parse(
            "pkg/mod.py",
            "import os\n\nclass A:\n    def m(self):\n        pass\n\ndef f():\n    return os.getcwd()\n",
        );
        let file = parsed.file.as_file().unwrap();
        assert_eq!(file.path, "pkg/mod.py");
        assert!(!file.has_errors);
        assert_eq!(file.nodes.len(), parsed.nodes.len());
        assert_eq!(parsed.nodes.len(), 4);

        let names: Vec<(NodeType, &str)> = parsed
            .nodes
            .iter()
            .map(|n| (n.node_type(), n.name().unwrap_or("")))
            .collect();
        assert_eq!(
            names,
            vec![
                (NodeType::Import, "os"),
                (NodeType::Symbol, "A"),
                (NodeType::Symbol, "m"),
                (NodeType::Symbol, "f"),
            ]
        );

        let class = &parsed.nodes[1];
        let method = &parsed.nodes[2];
        assert_eq!(method.parent, Some(class.id));
        assert_eq!(class.as_symbol().unwrap().children, vec![method.id]);
        assert!(parsed.nodes.iter().all(|n| n.file == Some(parsed.file.id)));

        assert_eq!(file.locals.get("os"), Some(&parsed.nodes[0].id));
        assert_eq!(file.locals.get("f"), Some(&parsed.nodes[3].id));
        assert!(!file.locals.contains_key("m"));
    }

    #[test]
    fn test_reparse_keeps_file_id() {
        let first = parse("a.py", "x = 1\n");
        let second = parse_file("a.py", Arc::from("x = 2\n"), Some(first.file.id), 2).unwrap();
        assert_eq!(first.file.id, second.file.id);
        assert_eq!(second.file.generation, 2);
        assert!(second.nodes.iter().all(|n| n.generation == 2));
        assert_ne!(first.nodes[0].id, second.nodes[0].id);
    }

    #[test]
    fn test_syntax_errors_do_not_fail() {
        let parsed = parse("bad.py", "def broken(:\n    pass\n\ndef ok():\n    pass\n");
        assert!(parsed.has_errors());
        assert!(parsed
            .nodes
            .iter()
            .any(|n| n.name() == Some("ok") && n.symbol_kind() == Some(SymbolKind::Function)));
    }

    #[test]
    fn test_exported_declaration_links_export_node() {
        let parsed = parse("src/a.ts", "export function f() {}\nimport { g } from \"./b\";\n");
        let symbol = parsed.nodes.iter().find(|n| n.is_symbol()).unwrap();
        let export = parsed.nodes.iter().find(|n| n.is_export()).unwrap();
        assert_eq!(export.as_export().unwrap().declaration, Some(symbol.id));
        let import = parsed.nodes.iter().find(|n| n.is_import()).unwrap();
        assert_eq!(import.as_import().unwrap().kind, ImportKind::Named);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = parse_file("README.md", Arc::from("# hi"), None, 1).unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedLanguage(_)));
    }
}
