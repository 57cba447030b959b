//! Use-position detection.
//!
//! Walks a typed syntax subtree and records every identifier that sits in a
//! use position, dispatching on [`NodeClass`]. Names bound locally (function
//! parameters, local assignments, comprehension variables, ...) are filtered
//! out so that only module-scope lookups remain.

use std::collections::HashSet;

use crate::node::{Ident, Reference, UsagePosition};
use crate::syntax::{ByteRange, ExpressionClass, NodeClass, StatementClass, SyntaxNode, TypeClass};

/// Language hooks the collector needs.
pub trait ScopeRules {
    /// Names bound inside a function-like node (parameters, locals, nested
    /// definitions). Nested function bodies are not descended into.
    fn function_bindings(&self, node: &SyntaxNode, source: &str) -> HashSet<String>;

    /// Field holding the object of a member access.
    fn member_object_field(&self) -> &'static str;

    /// Field holding the property of a member access.
    fn member_property_field(&self) -> &'static str;

    /// Field holding the return type of a function-like node.
    fn return_type_field(&self) -> &'static str {
        "return_type"
    }

    /// Field holding the name of a generic type.
    fn generic_name_field(&self) -> Option<&'static str> {
        None
    }

    /// Identifiers that denote the receiver (`self`, `cls`).
    fn self_keywords(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Collects [`Reference`]s from a subtree.
pub struct ReferenceCollector<'a> {
    rules: &'a dyn ScopeRules,
    source: &'a str,
    skip: &'a [ByteRange],
    bound: Vec<HashSet<String>>,
    out: Vec<Reference>,
}

impl<'a> ReferenceCollector<'a> {
    /// Create a collector. Nodes whose range equals one of `skip` are not
    /// visited (they belong to child symbols or imports).
    pub fn new(rules: &'a dyn ScopeRules, source: &'a str, skip: &'a [ByteRange]) -> Self {
        Self {
            rules,
            source,
            skip,
            bound: Vec::new(),
            out: Vec::new(),
        }
    }

    /// Push a scope of locally bound names.
    pub fn with_bindings(mut self, names: HashSet<String>) -> Self {
        self.bound.push(names);
        self
    }

    /// Visit a node in the given position.
    pub fn visit(&mut self, node: &SyntaxNode, position: UsagePosition) {
        self.walk(node, position, false);
    }

    /// Finish and return the collected references in source order.
    pub fn finish(mut self) -> Vec<Reference> {
        self.out.sort_by_key(|r| (r.head.range.start, r.head.range.end));
        self.out
    }

    fn is_bound(&self, name: &str) -> bool {
        self.bound.iter().any(|scope| scope.contains(name))
    }

    fn push(&mut self, head: Ident, chain: Vec<Ident>, position: UsagePosition, in_generic: bool) {
        self.out.push(Reference {
            head,
            chain,
            position,
            self_reference: false,
            in_generic,
        });
    }

    fn walk(&mut self, node: &SyntaxNode, position: UsagePosition, in_generic: bool) {
        if node.error || self.skip.contains(&node.range) {
            return;
        }

        match node.class {
            NodeClass::Value => {}
            NodeClass::Statement(class) => self.walk_statement(node, class, position, in_generic),
            NodeClass::Expression(class) => {
                self.walk_expression(node, class, position, in_generic)
            }
            NodeClass::Type(class) => self.walk_type(node, class, position, in_generic),
        }
    }

    fn walk_children(&mut self, node: &SyntaxNode, position: UsagePosition, in_generic: bool) {
        for child in &node.children {
            self.walk(child, position, in_generic);
        }
    }

    fn walk_statement(
        &mut self,
        node: &SyntaxNode,
        class: StatementClass,
        position: UsagePosition,
        in_generic: bool,
    ) {
        match class {
            StatementClass::Import | StatementClass::Comment => {}
            StatementClass::FunctionDefinition => self.walk_function(node, position),
            StatementClass::ClassDefinition
            | StatementClass::InterfaceDefinition
            | StatementClass::TypeAliasDefinition
            | StatementClass::EnumDefinition
            | StatementClass::NamespaceDefinition => {
                for child in node.children.iter().filter(|c| c.field != Some("name")) {
                    self.walk(child, position, in_generic);
                }
            }
            _ => self.walk_children(node, position, in_generic),
        }
    }

    fn walk_function(&mut self, node: &SyntaxNode, position: UsagePosition) {
        let bindings = self.rules.function_bindings(node, self.source);
        let return_field = self.rules.return_type_field();

        for child in &node.children {
            if child.field == Some(return_field) {
                self.walk(child, UsagePosition::Return, false);
            }
        }

        self.bound.push(bindings);
        for child in &node.children {
            if child.field == Some(return_field) || child.field == Some("name") {
                continue;
            }
            self.walk(child, position, false);
        }
        self.bound.pop();
    }

    fn walk_expression(
        &mut self,
        node: &SyntaxNode,
        class: ExpressionClass,
        position: UsagePosition,
        in_generic: bool,
    ) {
        match class {
            ExpressionClass::Identifier => {
                let name = node.text(self.source);
                if !name.is_empty() && !self.is_bound(name) {
                    self.push(Ident::new(name, node.range), Vec::new(), position, in_generic);
                }
            }
            ExpressionClass::MemberAccess => self.walk_member(node, position, in_generic),
            ExpressionClass::SelfReference
            | ExpressionClass::PropertyName
            | ExpressionClass::Literal => {}
            ExpressionClass::StringLiteral => self.walk_string(node, position, in_generic),
            ExpressionClass::KeywordArgument => {
                if let Some(value) = node.child_by_field("value") {
                    self.walk(value, position, in_generic);
                }
            }
            ExpressionClass::Decorator => {
                self.walk_children(node, UsagePosition::Decorator, in_generic)
            }
            ExpressionClass::Lambda => self.walk_function(node, position),
            ExpressionClass::Call
            | ExpressionClass::Subscript
            | ExpressionClass::BinaryOp
            | ExpressionClass::Interpolation
            | ExpressionClass::Other => self.walk_children(node, position, in_generic),
        }
    }

    /// Only interpolated segments of a string are code.
    fn walk_string(&mut self, node: &SyntaxNode, position: UsagePosition, in_generic: bool) {
        for child in &node.children {
            match child.class {
                NodeClass::Expression(ExpressionClass::Interpolation) => {
                    self.walk_children(child, position, in_generic)
                }
                NodeClass::Expression(ExpressionClass::StringLiteral) => {
                    self.walk_string(child, position, in_generic)
                }
                _ => {}
            }
        }
    }

    fn walk_member(&mut self, node: &SyntaxNode, position: UsagePosition, in_generic: bool) {
        let object_field = self.rules.member_object_field();
        let property_field = self.rules.member_property_field();

        let mut chain = Vec::new();
        let mut current = node;
        loop {
            let Some(property) = current.child_by_field(property_field) else {
                self.walk_children(current, position, in_generic);
                return;
            };
            chain.push(Ident::new(property.text(self.source), property.range));

            let Some(object) = current.child_by_field(object_field) else {
                return;
            };
            match object.class {
                NodeClass::Expression(ExpressionClass::MemberAccess) => current = object,
                NodeClass::Expression(ExpressionClass::Identifier)
                    if self.rules.self_keywords().contains(&object.text(self.source)) =>
                {
                    chain.reverse();
                    self.out.push(Reference {
                        head: Ident::new(object.text(self.source), object.range),
                        chain,
                        position,
                        self_reference: true,
                        in_generic,
                    });
                    return;
                }
                NodeClass::Expression(ExpressionClass::Identifier) => {
                    chain.reverse();
                    let name = object.text(self.source);
                    if !self.is_bound(name) {
                        self.push(Ident::new(name, object.range), chain, position, in_generic);
                    }
                    return;
                }
                NodeClass::Expression(ExpressionClass::SelfReference) => {
                    chain.reverse();
                    self.out.push(Reference {
                        head: Ident::new(object.text(self.source), object.range),
                        chain,
                        position,
                        self_reference: true,
                        in_generic,
                    });
                    return;
                }
                _ => {
                    self.walk(object, position, in_generic);
                    return;
                }
            }
        }
    }

    fn walk_type(
        &mut self,
        node: &SyntaxNode,
        class: TypeClass,
        position: UsagePosition,
        in_generic: bool,
    ) {
        let typed = match position {
            UsagePosition::Body => UsagePosition::Typed,
            other => other,
        };
        match class {
            TypeClass::Annotation | TypeClass::Union | TypeClass::Array | TypeClass::Other => {
                self.walk_children(node, typed, in_generic)
            }
            TypeClass::Named => {
                if node.children.is_empty() {
                    let name = node.text(self.source);
                    if !name.is_empty() && !self.is_bound(name) {
                        self.push(Ident::new(name, node.range), Vec::new(), typed, in_generic);
                    }
                } else {
                    self.walk_children(node, typed, in_generic);
                }
            }
            TypeClass::Generic => {
                let name_field = self.rules.generic_name_field();
                for child in &node.children {
                    let is_name = match name_field {
                        Some(field) => child.field == Some(field),
                        None => !matches!(child.class, NodeClass::Type(TypeClass::TypeArguments)),
                    };
                    self.walk(child, typed, in_generic || !is_name);
                }
            }
            TypeClass::TypeArguments => self.walk_children(node, typed, true),
            TypeClass::Qualified => {
                let mut parts: Vec<Ident> = node
                    .descendants()
                    .filter(|n| n.children.is_empty())
                    .map(|n| Ident::new(n.text(self.source), n.range))
                    .collect();
                if parts.is_empty() {
                    return;
                }
                let head = parts.remove(0);
                if !self.is_bound(&head.name) {
                    self.push(head, parts, typed, in_generic);
                }
            }
            TypeClass::Predefined => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::python;
    use crate::language::Grammar;

    fn parse(source: &str) -> SyntaxNode {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&Grammar::Python.tree_sitter_language())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        SyntaxNode::build(tree.root_node(), python::support().class_table())
    }

    fn heads(source: &str) -> Vec<String> {
        let root = parse(source);
        let mut collector = ReferenceCollector::new(python::rules(), source, &[]);
        collector.visit(&root, UsagePosition::Body);
        collector
            .finish()
            .into_iter()
            .map(|r| {
                let mut parts = vec![r.head.name];
                parts.extend(r.chain.into_iter().map(|c| c.name));
                parts.join(".")
            })
            .collect()
    }

    #[test]
    fn test_call_and_attribute_chain() {
        assert_eq!(heads("foo()\nos.path.join(a)\n"), vec!["foo", "os.path.join", "a"]);
    }

    #[test]
    fn test_locals_filtered() {
        let source = "def f(x, y=DEFAULT):\n    z = x + helper(y)\n    return z\n";
        assert_eq!(heads(source), vec!["DEFAULT", "helper"]);
    }

    #[test]
    fn test_keyword_names_and_strings_skipped() {
        let source = "call(key=value, other='text')\n";
        assert_eq!(heads(source), vec!["call", "value"]);
    }

    #[test]
    fn test_annotation_positions() {
        let source = "def f(a: Model) -> Result:\n    pass\n";
        let root = parse(source);
        let mut collector = ReferenceCollector::new(python::rules(), source, &[]);
        collector.visit(&root, UsagePosition::Body);
        let refs = collector.finish();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].head.name, "Model");
        assert_eq!(refs[0].position, UsagePosition::Typed);
        assert_eq!(refs[1].head.name, "Result");
        assert_eq!(refs[1].position, UsagePosition::Return);
    }

    #[test]
    fn test_self_reference_chain() {
        let source = "def m(self):\n    self.helper()\n";
        let root = parse(source);
        let mut collector = ReferenceCollector::new(python::rules(), source, &[]);
        collector.visit(&root, UsagePosition::Body);
        let refs = collector.finish();
        assert_eq!(refs.len(), 1);
        assert!(refs[0].self_reference);
        assert_eq!(refs[0].chain[0].name, "helper");
    }

    #[test]
    fn test_skip_ranges() {
        let source = "a()\nb()\n";
        let root = parse(source);
        let skip = vec![root.children[1].range];
        let mut collector = ReferenceCollector::new(python::rules(), source, &skip);
        collector.visit(&root, UsagePosition::Body);
        let names: Vec<String> = collector.finish().into_iter().map(|r| r.head.name).collect();
        assert_eq!(names, vec!["a"]);
    }
}
