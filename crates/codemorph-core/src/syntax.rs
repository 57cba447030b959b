//! Typed syntax layer over tree-sitter concrete syntax trees.
//!
//! Every named CST node is wrapped in a [`SyntaxNode`] whose [`NodeClass`]
//! comes from the language's [`NodeClassTable`]. The table has three layers
//! (statements, expressions and types); any kind missing from it becomes a
//! [`NodeClass::Value`], which keeps its bytes and children but is never
//! treated as a definition or a reference site.
//!
//! ## Usage
//!
//! ```ignore
//! let tree = parser.parse(source)?;
//! let root = SyntaxNode::build(tree.root_node(), table);
//! for stmt in &root.children { ... }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Byte ranges
// ============================================================================

/// Half-open byte range `[start, end)` into a file's source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width range at `offset`.
    pub fn empty(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether `other` lies entirely within this range.
    pub fn contains(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether `offset` lies strictly inside this range.
    pub fn strictly_contains_offset(&self, offset: usize) -> bool {
        self.start < offset && offset < self.end
    }

    /// Whether two non-empty ranges share at least one byte.
    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Slice `source` by this range, if it is in bounds and on char boundaries.
    pub fn slice<'s>(&self, source: &'s str) -> Option<&'s str> {
        source.get(self.start..self.end)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ============================================================================
// Node classes
// ============================================================================

/// Statement-level node classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementClass {
    Import,
    ClassDefinition,
    FunctionDefinition,
    InterfaceDefinition,
    TypeAliasDefinition,
    EnumDefinition,
    NamespaceDefinition,
    VariableDeclaration,
    Assignment,
    Decorated,
    Export,
    ExpressionStatement,
    Return,
    /// Conditional or loop whose body may hold dynamic imports
    Conditional,
    Try,
    With,
    Block,
    Comment,
    /// Any other statement
    Other,
}

/// Expression-level node classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionClass {
    Identifier,
    /// `self` / `this`
    SelfReference,
    Call,
    /// `obj.attr` / `obj.prop`
    MemberAccess,
    Subscript,
    BinaryOp,
    Lambda,
    StringLiteral,
    /// Interpolated segment inside a string literal
    Interpolation,
    Literal,
    KeywordArgument,
    Decorator,
    /// Property name, keyword argument name, or other non-reference identifier
    PropertyName,
    /// Expression whose children are visited without special handling
    Other,
}

/// Type-level node classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    /// Annotation wrapper; everything below is in a typed position
    Annotation,
    Named,
    Generic,
    /// Arguments of a generic type
    TypeArguments,
    Union,
    Array,
    /// `module.Type`
    Qualified,
    /// Built-in type keyword (`string`, `number`, ...)
    Predefined,
    Other,
}

/// The class of a syntax node, looked up by tree-sitter kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Statement(StatementClass),
    Expression(ExpressionClass),
    Type(TypeClass),
    /// Unclassified node: preserved, never a definition or reference site
    Value,
}

impl NodeClass {
    pub fn is_statement(&self) -> bool {
        matches!(self, NodeClass::Statement(_))
    }

    pub fn is_value(&self) -> bool {
        matches!(self, NodeClass::Value)
    }
}

/// Mapping from tree-sitter node kind to [`NodeClass`].
#[derive(Debug, Default)]
pub struct NodeClassTable {
    classes: HashMap<&'static str, NodeClass>,
}

impl NodeClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register statement kinds.
    pub fn statements(mut self, entries: &[(&'static str, StatementClass)]) -> Self {
        for (kind, class) in entries {
            self.classes.insert(*kind, NodeClass::Statement(*class));
        }
        self
    }

    /// Register expression kinds.
    pub fn expressions(mut self, entries: &[(&'static str, ExpressionClass)]) -> Self {
        for (kind, class) in entries {
            self.classes.insert(*kind, NodeClass::Expression(*class));
        }
        self
    }

    /// Register type kinds.
    pub fn types(mut self, entries: &[(&'static str, TypeClass)]) -> Self {
        for (kind, class) in entries {
            self.classes.insert(*kind, NodeClass::Type(*class));
        }
        self
    }

    /// Class for a kind; unknown kinds are [`NodeClass::Value`].
    pub fn classify(&self, kind: &str) -> NodeClass {
        self.classes.get(kind).copied().unwrap_or(NodeClass::Value)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

// ============================================================================
// Syntax nodes
// ============================================================================

/// A classified named node of the concrete syntax tree.
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    /// Tree-sitter node kind
    pub kind: &'static str,
    pub class: NodeClass,
    /// Field name under which this node hangs off its parent
    pub field: Option<&'static str>,
    pub range: ByteRange,
    /// Node is an ERROR/MISSING node or its range is malformed
    pub error: bool,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    /// Build the typed tree from a tree-sitter node.
    ///
    /// Only named nodes are kept. Error and missing nodes, and nodes whose
    /// range escapes their parent, are downgraded to `Value` with the error
    /// flag set.
    pub fn build(node: tree_sitter::Node<'_>, table: &NodeClassTable) -> SyntaxNode {
        Self::build_inner(node, None, table, None)
    }

    fn build_inner(
        node: tree_sitter::Node<'_>,
        field: Option<&'static str>,
        table: &NodeClassTable,
        parent_range: Option<ByteRange>,
    ) -> SyntaxNode {
        let range = ByteRange::new(node.start_byte(), node.end_byte());
        let malformed = range.end < range.start
            || parent_range.is_some_and(|parent| !parent.contains(&range));
        let error = node.is_error() || node.is_missing() || malformed;
        let class = if error {
            NodeClass::Value
        } else {
            table.classify(node.kind())
        };

        let mut children = Vec::new();
        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                if child.is_named() {
                    children.push(Self::build_inner(
                        child,
                        cursor.field_name(),
                        table,
                        Some(range),
                    ));
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }

        SyntaxNode {
            kind: node.kind(),
            class,
            field,
            range,
            error,
            children,
        }
    }

    /// Source text of this node.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        self.range.slice(source).unwrap_or("")
    }

    /// First child attached under `field`.
    pub fn child_by_field(&self, field: &str) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| c.field == Some(field))
    }

    /// All children attached under `field`.
    pub fn children_by_field<'a>(
        &'a self,
        field: &'a str,
    ) -> impl Iterator<Item = &'a SyntaxNode> + 'a {
        self.children.iter().filter(move |c| c.field == Some(field))
    }

    /// First child of the given kind.
    pub fn child_of_kind(&self, kind: &str) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| c.kind == kind)
    }

    /// Whether this node or any descendant carries the error flag.
    pub fn has_error(&self) -> bool {
        self.error || self.children.iter().any(SyntaxNode::has_error)
    }

    /// Depth-first pre-order traversal.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

/// Lazy pre-order iterator over a syntax subtree.
pub struct Descendants<'a> {
    stack: Vec<&'a SyntaxNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Grammar;

    fn python_tree(source: &str) -> SyntaxNode {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&Grammar::Python.tree_sitter_language())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        SyntaxNode::build(tree.root_node(), crate::lang::python::support().class_table())
    }

    #[test]
    fn test_byte_range_relations() {
        let outer = ByteRange::new(0, 10);
        let inner = ByteRange::new(2, 5);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.overlaps(&inner));
        assert!(!ByteRange::new(0, 2).overlaps(&ByteRange::new(2, 4)));
        assert!(ByteRange::new(0, 4).strictly_contains_offset(2));
        assert!(!ByteRange::new(0, 4).strictly_contains_offset(4));
        assert_eq!(ByteRange::empty(3).len(), 0);
    }

    #[test]
    fn test_table_classifies_and_defaults_to_value() {
        let table = NodeClassTable::new()
            .statements(&[("import_statement", StatementClass::Import)])
            .types(&[("generic_type", TypeClass::Generic)]);
        assert_eq!(
            table.classify("import_statement"),
            NodeClass::Statement(StatementClass::Import)
        );
        assert_eq!(table.classify("generic_type"), NodeClass::Type(TypeClass::Generic));
        assert_eq!(table.classify("something_new"), NodeClass::Value);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_build_keeps_fields() {
        let source = "def foo(x):\n    return x\n";
        let root = python_tree(source);
        let func = &root.children[0];
        assert_eq!(func.kind, "function_definition");
        assert_eq!(
            func.class,
            NodeClass::Statement(StatementClass::FunctionDefinition)
        );
        let name = func.child_by_field("name").unwrap();
        assert_eq!(name.text(source), "foo");
        assert!(func.child_by_field("body").is_some());
        assert!(!root.has_error());
    }

    #[test]
    fn test_syntax_error_preserved_as_value() {
        let source = "def broken(:\n    pass\nx = 1\n";
        let root = python_tree(source);
        assert!(root.has_error());
        assert!(root
            .descendants()
            .filter(|n| n.error)
            .all(|n| n.class == NodeClass::Value));
    }

    #[test]
    fn test_descendants_preorder() {
        let source = "a = b\n";
        let root = python_tree(source);
        let kinds: Vec<&str> = root.descendants().map(|n| n.kind).collect();
        assert_eq!(kinds[0], "module");
        assert!(kinds.contains(&"assignment"));
        let idx_assign = kinds.iter().position(|k| *k == "assignment").unwrap();
        let idx_ident = kinds.iter().position(|k| *k == "identifier").unwrap();
        assert!(idx_assign < idx_ident);
    }
}
