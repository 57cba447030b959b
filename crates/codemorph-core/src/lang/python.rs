//! Python support.
//!
//! Symbols are top-level classes, functions, assignments and `type` aliases;
//! class bodies contribute methods and attributes as children. Every
//! top-level name is importable, so Python files carry no EXPORT nodes.

use std::collections::HashSet;
use std::sync::OnceLock;

use super::{
    comment_text, entity_ranges, leading_comments, trailing_comment, unquote, Entity, EntityKind,
    Extraction, LanguageSupport,
};
use crate::io::parent_dir;
use crate::language::Language;
use crate::node::{Ident, ImportData, ImportKind, Reference, SymbolData, SymbolKind, UsagePosition};
use crate::references::{ReferenceCollector, ScopeRules};
use crate::syntax::{
    ByteRange, ExpressionClass, NodeClass, NodeClassTable, StatementClass, SyntaxNode, TypeClass,
};

/// Python language hooks.
pub struct PythonSupport;

static SUPPORT: PythonSupport = PythonSupport;
static CLASS_TABLE: OnceLock<NodeClassTable> = OnceLock::new();

/// The Python [`LanguageSupport`].
pub fn support() -> &'static dyn LanguageSupport {
    &SUPPORT
}

/// The Python [`ScopeRules`].
pub fn rules() -> &'static dyn ScopeRules {
    &SUPPORT
}

const COMPREHENSIONS: &[&str] = &[
    "list_comprehension",
    "set_comprehension",
    "dictionary_comprehension",
    "generator_expression",
];

fn class_table() -> &'static NodeClassTable {
    CLASS_TABLE.get_or_init(|| {
        use ExpressionClass as E;
        use StatementClass as S;
        use TypeClass as T;

        NodeClassTable::new()
            .statements(&[
                ("module", S::Block),
                ("block", S::Block),
                ("import_statement", S::Import),
                ("import_from_statement", S::Import),
                ("future_import_statement", S::Import),
                ("class_definition", S::ClassDefinition),
                ("function_definition", S::FunctionDefinition),
                ("decorated_definition", S::Decorated),
                ("type_alias_statement", S::TypeAliasDefinition),
                ("expression_statement", S::ExpressionStatement),
                ("assignment", S::Assignment),
                ("augmented_assignment", S::Assignment),
                ("return_statement", S::Return),
                ("if_statement", S::Conditional),
                ("elif_clause", S::Conditional),
                ("else_clause", S::Conditional),
                ("for_statement", S::Conditional),
                ("while_statement", S::Conditional),
                ("match_statement", S::Conditional),
                ("case_clause", S::Conditional),
                ("try_statement", S::Try),
                ("except_clause", S::Try),
                ("except_group_clause", S::Try),
                ("finally_clause", S::Try),
                ("with_statement", S::With),
                ("with_clause", S::Other),
                ("with_item", S::Other),
                ("delete_statement", S::Other),
                ("raise_statement", S::Other),
                ("assert_statement", S::Other),
                ("print_statement", S::Other),
                ("exec_statement", S::Other),
                ("comment", S::Comment),
            ])
            .expressions(&[
                ("identifier", E::Identifier),
                ("attribute", E::MemberAccess),
                ("call", E::Call),
                ("subscript", E::Subscript),
                ("binary_operator", E::BinaryOp),
                ("boolean_operator", E::BinaryOp),
                ("comparison_operator", E::BinaryOp),
                ("not_operator", E::BinaryOp),
                ("unary_operator", E::BinaryOp),
                ("lambda", E::Lambda),
                ("list_comprehension", E::Lambda),
                ("set_comprehension", E::Lambda),
                ("dictionary_comprehension", E::Lambda),
                ("generator_expression", E::Lambda),
                ("string", E::StringLiteral),
                ("concatenated_string", E::StringLiteral),
                ("interpolation", E::Interpolation),
                ("integer", E::Literal),
                ("float", E::Literal),
                ("true", E::Literal),
                ("false", E::Literal),
                ("none", E::Literal),
                ("keyword_argument", E::KeywordArgument),
                ("decorator", E::Decorator),
                ("argument_list", E::Other),
                ("parenthesized_expression", E::Other),
                ("conditional_expression", E::Other),
                ("named_expression", E::Other),
                ("await", E::Other),
                ("yield", E::Other),
                ("list", E::Other),
                ("tuple", E::Other),
                ("set", E::Other),
                ("dictionary", E::Other),
                ("pair", E::Other),
                ("expression_list", E::Other),
                ("pattern_list", E::Other),
                ("tuple_pattern", E::Other),
                ("list_pattern", E::Other),
                ("list_splat", E::Other),
                ("dictionary_splat", E::Other),
                ("parenthesized_list_splat", E::Other),
                ("list_splat_pattern", E::Other),
                ("dictionary_splat_pattern", E::Other),
                ("slice", E::Other),
                ("for_in_clause", E::Other),
                ("if_clause", E::Other),
                ("parameters", E::Other),
                ("lambda_parameters", E::Other),
                ("typed_parameter", E::Other),
                ("default_parameter", E::Other),
                ("typed_default_parameter", E::Other),
                ("as_pattern", E::Other),
                ("as_pattern_target", E::Other),
            ])
            .types(&[
                ("type", T::Annotation),
                ("generic_type", T::Generic),
                ("type_parameter", T::TypeArguments),
                ("union_type", T::Union),
                ("member_type", T::Qualified),
                ("constrained_type", T::Other),
                ("splat_type", T::Other),
            ])
    })
}

// ============================================================================
// Extraction
// ============================================================================

impl PythonSupport {
    fn collect(&self, node: &SyntaxNode, source: &str, skip: &[ByteRange]) -> Vec<Reference> {
        let mut collector = ReferenceCollector::new(self, source, skip);
        collector.visit(node, UsagePosition::Body);
        collector.finish()
    }

    /// Symbol entity for `siblings[index]`, with comments attached.
    fn definition(&self, siblings: &[SyntaxNode], index: usize, source: &str) -> Option<Entity> {
        let stmt = siblings.get(index)?;
        let def = if stmt.kind == "decorated_definition" {
            stmt.child_by_field("definition")?
        } else {
            stmt
        };
        let mut entity = match def.kind {
            "class_definition" => self.class(stmt, def, source),
            "function_definition" => self.function(stmt, def, source),
            "expression_statement" => self.assignment(stmt, source),
            "type_alias_statement" => self.type_alias(stmt, source),
            _ => None,
        }?;

        if let EntityKind::Symbol { data, .. } = &mut entity.kind {
            if data.docstring.is_none() {
                data.docstring = leading_comments(siblings, index, source);
            }
            data.inline_comment = trailing_comment(siblings, index, source)
                .or_else(|| header_comment(def, source));
        }
        Some(entity)
    }

    fn class(&self, stmt: &SyntaxNode, def: &SyntaxNode, source: &str) -> Option<Entity> {
        let name = def.child_by_field("name")?;
        let mut data = SymbolData::new(name.text(source), SymbolKind::Class, name.range);
        let body = def.child_by_field("body");
        data.body_range = body.map(|b| b.range);
        data.docstring = body.and_then(|b| body_docstring(b, source));

        if let Some(args) = def.child_by_field("superclasses") {
            data.superclass_list_range = Some(args.range);
            data.superclasses = args
                .children
                .iter()
                .filter_map(|arg| dotted_reference(arg, source))
                .collect();
        }

        let mut children = Vec::new();
        if let Some(body) = body {
            for index in 0..body.children.len() {
                if let Some(child) = self.definition(&body.children, index, source) {
                    children.push(child);
                }
            }
            let skip = entity_ranges(&children);
            nested_imports(body, source, false, &skip, &mut children);
        }
        children.sort_by_key(|c| c.range.start);

        let skip = entity_ranges(&children);
        data.references = self.collect(stmt, source, &skip);

        let mut entity = Entity::symbol(stmt.range, stmt.kind, data);
        entity.children = children;
        Some(entity)
    }

    fn function(&self, stmt: &SyntaxNode, def: &SyntaxNode, source: &str) -> Option<Entity> {
        let name = def.child_by_field("name")?;
        let mut data = SymbolData::new(name.text(source), SymbolKind::Function, name.range);
        let body = def.child_by_field("body");
        data.body_range = body.map(|b| b.range);
        data.docstring = body.and_then(|b| body_docstring(b, source));
        data.references = self.collect(stmt, source, &[]);

        let mut children = Vec::new();
        nested_imports(def, source, true, &[], &mut children);

        let mut entity = Entity::symbol(stmt.range, stmt.kind, data);
        entity.children = children;
        Some(entity)
    }

    fn assignment(&self, stmt: &SyntaxNode, source: &str) -> Option<Entity> {
        let [assign] = stmt.children.as_slice() else {
            return None;
        };
        if assign.kind != "assignment" {
            return None;
        }
        let left = assign.child_by_field("left")?;
        if left.kind != "identifier" {
            return None;
        }
        let mut data = SymbolData::new(left.text(source), SymbolKind::Variable, left.range);
        data.references = self.collect(stmt, source, &[left.range]);
        Some(Entity::symbol(stmt.range, stmt.kind, data))
    }

    fn type_alias(&self, stmt: &SyntaxNode, source: &str) -> Option<Entity> {
        let left = stmt.child_by_field("left")?;
        let name = left.descendants().find(|n| n.kind == "identifier")?;
        let mut data = SymbolData::new(name.text(source), SymbolKind::TypeAlias, name.range);
        let skip = [left.range];
        data.references = self.collect(stmt, source, &skip);
        Some(Entity::symbol(stmt.range, stmt.kind, data))
    }
}

/// Comment on the `def`/`class` header line. The grammar puts it ahead of
/// the body or as the body's first child.
fn header_comment(def: &SyntaxNode, source: &str) -> Option<String> {
    let body = def.child_by_field("body")?;
    let header_end = def
        .children
        .iter()
        .filter(|c| c.kind != "comment" && c.range.end <= body.range.start)
        .map(|c| c.range.end)
        .max()?;
    let comment = def
        .children
        .iter()
        .chain(body.children.first())
        .find(|c| c.kind == "comment" && c.range.start >= header_end)?;
    let gap = source.get(header_end..comment.range.start)?;
    if gap.contains('\n') {
        return None;
    }
    Some(comment_text(comment.text(source)))
}

/// Docstring of a class or function body.
fn body_docstring(body: &SyntaxNode, source: &str) -> Option<String> {
    let first = body.children.iter().find(|c| c.kind != "comment")?;
    docstring_string(first).map(|s| unquote(s.text(source)).trim().to_string())
}

/// The string of a docstring statement.
fn docstring_string(stmt: &SyntaxNode) -> Option<&SyntaxNode> {
    if stmt.kind != "expression_statement" {
        return None;
    }
    match stmt.children.as_slice() {
        [string] if string.kind == "string" => Some(string),
        _ => None,
    }
}

/// `a`, `a.b.c` or `a.b[T]` as a reference.
fn dotted_reference(node: &SyntaxNode, source: &str) -> Option<Reference> {
    match node.kind {
        "identifier" => Some(Reference::simple(
            Ident::new(node.text(source), node.range),
            UsagePosition::Body,
        )),
        "attribute" => {
            let mut reference = dotted_reference(node.child_by_field("object")?, source)?;
            let attr = node.child_by_field("attribute")?;
            reference.chain.push(Ident::new(attr.text(source), attr.range));
            Some(reference)
        }
        "subscript" => dotted_reference(node.child_by_field("value")?, source),
        _ => None,
    }
}

/// Import entities of one import statement, one per imported name.
fn import_entities(stmt: &SyntaxNode, source: &str, is_dynamic: bool) -> Vec<Entity> {
    let mut specs: Vec<(&SyntaxNode, ImportData)> = Vec::new();
    let base = |module: String, module_range: Option<ByteRange>, kind: ImportKind| ImportData {
        module,
        module_range,
        name: None,
        name_range: None,
        alias: None,
        alias_range: None,
        kind,
        statement_range: stmt.range,
        is_dynamic,
        is_type_only: false,
    };

    match stmt.kind {
        "import_statement" => {
            for spec in stmt.children_by_field("name") {
                let (target, alias) = split_alias(spec);
                let mut data = base(
                    target.text(source).to_string(),
                    Some(target.range),
                    ImportKind::Module,
                );
                if let Some(alias) = alias {
                    data.alias = Some(alias.text(source).to_string());
                    data.alias_range = Some(alias.range);
                }
                specs.push((spec, data));
            }
        }
        "import_from_statement" | "future_import_statement" => {
            let (module, module_range) = match stmt.child_by_field("module_name") {
                Some(m) => (m.text(source).to_string(), Some(m.range)),
                None => ("__future__".to_string(), None),
            };
            if let Some(wildcard) = stmt.child_of_kind("wildcard_import") {
                specs.push((wildcard, base(module.clone(), module_range, ImportKind::Wildcard)));
            }
            for spec in stmt.children_by_field("name") {
                let (target, alias) = split_alias(spec);
                let mut data = base(module.clone(), module_range, ImportKind::Named);
                data.name = Some(target.text(source).to_string());
                data.name_range = Some(target.range);
                if let Some(alias) = alias {
                    data.alias = Some(alias.text(source).to_string());
                    data.alias_range = Some(alias.range);
                }
                specs.push((spec, data));
            }
        }
        _ => {}
    }

    let single = specs.len() == 1;
    specs
        .into_iter()
        .map(|(spec, data)| {
            if single {
                Entity::import(stmt.range, stmt.kind, data)
            } else {
                Entity::import(spec.range, spec.kind, data)
            }
        })
        .collect()
}

fn split_alias(spec: &SyntaxNode) -> (&SyntaxNode, Option<&SyntaxNode>) {
    if spec.kind == "aliased_import" {
        if let Some(name) = spec.child_by_field("name") {
            return (name, spec.child_by_field("alias"));
        }
    }
    (spec, None)
}

/// Imports below `node`, skipping `skip` ranges.
///
/// Imports under a function body, conditional, loop, try or with block are
/// dynamic.
fn nested_imports(
    node: &SyntaxNode,
    source: &str,
    dynamic: bool,
    skip: &[ByteRange],
    out: &mut Vec<Entity>,
) {
    for child in &node.children {
        if skip.contains(&child.range) {
            continue;
        }
        match child.class {
            NodeClass::Statement(StatementClass::Import) => {
                out.extend(import_entities(child, source, dynamic))
            }
            NodeClass::Statement(
                StatementClass::Conditional
                | StatementClass::Try
                | StatementClass::With
                | StatementClass::FunctionDefinition,
            ) => nested_imports(child, source, true, skip, out),
            NodeClass::Statement(_) => nested_imports(child, source, dynamic, skip, out),
            _ => {}
        }
    }
}

// ============================================================================
// Scoping
// ============================================================================

/// Names bound by assignment-like targets.
fn targets(node: &SyntaxNode, source: &str, names: &mut HashSet<String>) {
    match node.kind {
        "identifier" => {
            names.insert(node.text(source).to_string());
        }
        "attribute" | "subscript" => {}
        _ => {
            for child in &node.children {
                targets(child, source, names);
            }
        }
    }
}

fn parameter_names(params: &SyntaxNode, source: &str, names: &mut HashSet<String>) {
    for param in &params.children {
        match param.kind {
            "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = param.child_by_field("name") {
                    targets(name, source, names);
                }
            }
            "typed_parameter" => {
                for child in param.children.iter().filter(|c| c.field.is_none()) {
                    targets(child, source, names);
                }
            }
            _ => targets(param, source, names),
        }
    }
}

fn body_bindings(
    node: &SyntaxNode,
    source: &str,
    names: &mut HashSet<String>,
    globals: &mut HashSet<String>,
) {
    for child in &node.children {
        match child.kind {
            "function_definition" | "class_definition" => {
                if let Some(name) = child.child_by_field("name") {
                    names.insert(name.text(source).to_string());
                }
                continue;
            }
            "decorated_definition" => {
                if let Some(name) = child
                    .child_by_field("definition")
                    .and_then(|d| d.child_by_field("name"))
                {
                    names.insert(name.text(source).to_string());
                }
                continue;
            }
            "lambda" | "import_statement" | "import_from_statement" | "future_import_statement" => {
                continue
            }
            kind if COMPREHENSIONS.contains(&kind) => continue,
            "assignment" | "augmented_assignment" | "for_statement" => {
                if let Some(left) = child.child_by_field("left") {
                    targets(left, source, names);
                }
            }
            "named_expression" => {
                if let Some(name) = child.child_by_field("name") {
                    targets(name, source, names);
                }
            }
            "as_pattern" => {
                if let Some(alias) = child.child_by_field("alias") {
                    targets(alias, source, names);
                }
            }
            "except_clause" => {
                // `except E as e` on grammars without as_pattern
                let exprs: Vec<&SyntaxNode> =
                    child.children.iter().filter(|c| c.kind != "block").collect();
                if let [_, alias] = exprs.as_slice() {
                    if alias.kind == "identifier" {
                        names.insert(alias.text(source).to_string());
                    }
                }
            }
            "global_statement" => {
                for name in child.children.iter().filter(|c| c.kind == "identifier") {
                    globals.insert(name.text(source).to_string());
                }
                continue;
            }
            _ => {}
        }
        body_bindings(child, source, names, globals);
    }
}

impl ScopeRules for PythonSupport {
    fn function_bindings(&self, node: &SyntaxNode, source: &str) -> HashSet<String> {
        let mut names = HashSet::new();
        let mut globals = HashSet::new();
        match node.kind {
            "function_definition" | "lambda" => {
                if let Some(params) = node.child_by_field("parameters") {
                    parameter_names(params, source, &mut names);
                }
                if node.kind == "function_definition" {
                    if let Some(body) = node.child_by_field("body") {
                        body_bindings(body, source, &mut names, &mut globals);
                    }
                }
            }
            _ => {
                for clause in node.children.iter().filter(|c| c.kind == "for_in_clause") {
                    for left in clause.children_by_field("left") {
                        targets(left, source, &mut names);
                    }
                }
            }
        }
        for name in &globals {
            names.remove(name);
        }
        names
    }

    fn member_object_field(&self) -> &'static str {
        "object"
    }

    fn member_property_field(&self) -> &'static str {
        "attribute"
    }

    fn self_keywords(&self) -> &'static [&'static str] {
        &["self", "cls"]
    }
}

// ============================================================================
// Language hooks
// ============================================================================

impl LanguageSupport for PythonSupport {
    fn language(&self) -> Language {
        Language::Python
    }

    fn class_table(&self) -> &'static NodeClassTable {
        class_table()
    }

    fn scope_rules(&self) -> &'static dyn ScopeRules {
        rules()
    }

    fn extract(&self, root: &SyntaxNode, source: &str) -> Extraction {
        let mut out = Extraction::default();
        let stmts = &root.children;

        out.docstring_range = stmts
            .iter()
            .find(|s| s.kind != "comment")
            .filter(|s| docstring_string(s).is_some())
            .map(|s| s.range);

        for (index, stmt) in stmts.iter().enumerate() {
            if stmt.kind == "comment" {
                continue;
            }
            out.statements.push(stmt.range);

            match stmt.class {
                NodeClass::Statement(StatementClass::Import) => {
                    out.entities.extend(import_entities(stmt, source, false));
                    continue;
                }
                NodeClass::Statement(
                    StatementClass::Conditional | StatementClass::Try | StatementClass::With,
                ) => nested_imports(stmt, source, true, &[], &mut out.entities),
                _ => {}
            }

            if let Some(entity) = self.definition(stmts, index, source) {
                out.entities.push(entity);
                continue;
            }
            if Some(stmt.range) == out.docstring_range {
                continue;
            }
            out.references.extend(self.collect(stmt, source, &[]));
        }

        out.entities.sort_by_key(|e| e.range.start);
        out
    }

    fn module_name(&self, path: &str) -> String {
        let stem = path
            .strip_suffix(".py")
            .or_else(|| path.strip_suffix(".pyi"))
            .unwrap_or(path);
        let stem = if stem == "__init__" {
            ""
        } else {
            stem.strip_suffix("/__init__").unwrap_or(stem)
        };
        stem.replace('/', ".")
    }

    fn absolute_module(&self, importer: &str, module: &str) -> String {
        let dots = module.chars().take_while(|c| *c == '.').count();
        if dots == 0 {
            return module.to_string();
        }
        let rest = &module[dots..];
        let mut dir = parent_dir(importer);
        for _ in 1..dots {
            if dir.is_empty() {
                // escapes the repository; keep it unresolvable
                return module.to_string();
            }
            dir = parent_dir(dir);
        }
        let package = dir.replace('/', ".");
        match (package.is_empty(), rest.is_empty()) {
            (true, _) => rest.to_string(),
            (false, true) => package,
            (false, false) => format!("{}.{}", package, rest),
        }
    }

    fn module_separator(&self) -> char {
        '.'
    }

    fn module_candidates(&self, module: &str) -> Vec<String> {
        if module.starts_with('.') {
            return Vec::new();
        }
        let mut bases = vec![module.replace('.', "/")];
        match module.strip_prefix("src.") {
            Some(stripped) => bases.push(stripped.replace('.', "/")),
            None if module.is_empty() => bases.push("src".to_string()),
            None => bases.push(format!("src/{}", module.replace('.', "/"))),
        }

        let mut candidates = Vec::new();
        for base in bases {
            if base.is_empty() {
                candidates.push("__init__.py".to_string());
                continue;
            }
            candidates.push(format!("{}.py", base));
            candidates.push(format!("{}/__init__.py", base));
            candidates.push(format!("{}.pyi", base));
            candidates.push(format!("{}/__init__.pyi", base));
        }
        candidates
    }

    fn submodule_candidates(&self, module: &str, name: &str) -> Vec<String> {
        if module.is_empty() {
            self.module_candidates(name)
        } else {
            self.module_candidates(&format!("{}.{}", module, name))
        }
    }

    fn exports_all_top_level(&self) -> bool {
        true
    }

    fn import_string(
        &self,
        module: &str,
        name: Option<&str>,
        alias: Option<&str>,
        _is_type_only: bool,
    ) -> String {
        let alias = alias.filter(|a| Some(*a) != name);
        match (name, alias) {
            (None, None) => format!("import {}", module),
            (None, Some(alias)) => format!("import {} as {}", module, alias),
            (Some(name), None) => format!("from {} import {}", module, name),
            (Some(name), Some(alias)) => format!("from {} import {} as {}", module, name, alias),
        }
    }

    fn module_specifier(&self, _importer: &str, target: &str) -> String {
        self.module_name(target)
    }

    fn is_leading_import(&self, import: &ImportData) -> bool {
        import.module == "__future__"
    }

    fn is_leading_import_source(&self, text: &str) -> bool {
        text.trim_start()
            .strip_prefix("from")
            .is_some_and(|rest| rest.trim_start().starts_with("__future__"))
    }

    fn comment_prefix(&self) -> &'static str {
        "#"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Grammar;

    fn extract(source: &str) -> Extraction {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&Grammar::Python.tree_sitter_language())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        let root = SyntaxNode::build(tree.root_node(), class_table());
        support().extract(&root, source)
    }

    fn symbol(entity: &Entity) -> &SymbolData {
        match &entity.kind {
            EntityKind::Symbol { data, .. } => data,
            other => panic!("expected symbol, got {:?}", other),
        }
    }

    fn import(entity: &Entity) -> &ImportData {
        match &entity.kind {
            EntityKind::Import(data) => data,
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn test_module_names() {
        let py = support();
        assert_eq!(py.module_name("a/b/c.py"), "a.b.c");
        assert_eq!(py.module_name("pkg/__init__.py"), "pkg");
        assert_eq!(py.module_name("__init__.py"), "");
        assert_eq!(py.module_name("top.py"), "top");
    }

    #[test]
    fn test_relative_modules() {
        let py = support();
        assert_eq!(py.absolute_module("pkg/sub/mod.py", ".x"), "pkg.sub.x");
        assert_eq!(py.absolute_module("pkg/sub/mod.py", "..x"), "pkg.x");
        assert_eq!(py.absolute_module("pkg/sub/mod.py", ".."), "pkg");
        assert_eq!(py.absolute_module("pkg/__init__.py", ".util"), "pkg.util");
        assert_eq!(py.absolute_module("mod.py", ".util"), "util");
        assert_eq!(py.absolute_module("mod.py", "..util"), "..util");
    }

    #[test]
    fn test_candidates_include_src_spellings() {
        let py = support();
        let candidates = py.module_candidates("a.b");
        assert_eq!(candidates[0], "a/b.py");
        assert_eq!(candidates[1], "a/b/__init__.py");
        assert!(candidates.contains(&"src/a/b.py".to_string()));
        assert!(py.module_candidates("src.a").contains(&"a.py".to_string()));
    }

    #[test]
    fn test_extracts_definitions_and_imports() {
        let source = "import os\nfrom a import b as c, d\n\nclass K(Base):\n    x = 1\n    def m(self):\n        return helper()\n\ndef f():\n    import json\n    return json\n\nVALUE = 3\n";
        let out = extract(source);
        let kinds: Vec<String> = out
            .entities
            .iter()
            .map(|e| match &e.kind {
                EntityKind::Symbol { data, .. } => data.name.clone(),
                EntityKind::Import(i) => format!("import:{}", i.local_name().unwrap_or("")),
                EntityKind::Export(_) => "export".to_string(),
            })
            .collect();
        assert_eq!(kinds, vec!["import:os", "import:c", "import:d", "K", "f", "VALUE"]);

        let class = symbol(&out.entities[3]);
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.superclasses[0].head.name, "Base");
        let methods: Vec<&str> = out.entities[3]
            .children
            .iter()
            .filter_map(|c| c.symbol_name())
            .collect();
        assert_eq!(methods, vec!["x", "m"]);
        assert_eq!(symbol(&out.entities[3].children[1]).references[0].head.name, "helper");

        let func = &out.entities[4];
        let nested = import(&func.children[0]);
        assert_eq!(nested.module, "json");
        assert!(nested.is_dynamic);
        assert!(!import(&out.entities[0]).is_dynamic);
    }

    #[test]
    fn test_multi_name_import_ranges_do_not_overlap() {
        let source = "from m import a, b\n";
        let out = extract(source);
        assert_eq!(out.entities.len(), 2);
        assert!(!out.entities[0].range.overlaps(&out.entities[1].range));
        assert_eq!(import(&out.entities[0]).statement_range, ByteRange::new(0, 18));
    }

    #[test]
    fn test_conditional_imports_are_dynamic() {
        let source = "try:\n    import ujson as json\nexcept ImportError:\n    import json\n";
        let out = extract(source);
        assert_eq!(out.entities.len(), 2);
        assert!(out.entities.iter().all(|e| import(e).is_dynamic));
    }

    #[test]
    fn test_docstrings_and_comments() {
        let source = "# Adds things\n# together\ndef add(a, b):  # inline\n    return a + b\n\ndef g():\n    \"\"\"Body doc.\"\"\"\n    pass\n";
        let out = extract(source);
        let add = symbol(&out.entities[0]);
        assert_eq!(add.docstring.as_deref(), Some("Adds things\ntogether"));
        let g = symbol(&out.entities[1]);
        assert_eq!(g.docstring.as_deref(), Some("Body doc."));
        assert_eq!(g.inline_comment, None);
    }

    #[test]
    fn test_header_line_comments() {
        let source = "def foo():  # note\n    return 1\n\nclass A(Base):  # model\n    def m(self) -> int:  # method\n        return 2\n\ndef bar():\n    # body comment\n    pass\n";
        let out = extract(source);
        let foo = symbol(&out.entities[0]);
        assert_eq!(foo.inline_comment.as_deref(), Some("note"));
        let class = symbol(&out.entities[1]);
        assert_eq!(class.inline_comment.as_deref(), Some("model"));
        let method = symbol(&out.entities[1].children[0]);
        assert_eq!(method.inline_comment.as_deref(), Some("method"));
        assert_eq!(method.docstring, None);
        let bar = symbol(&out.entities[2]);
        assert_eq!(bar.inline_comment, None);
    }

    #[test]
    fn test_module_docstring_and_statements() {
        let source = "\"\"\"Module doc.\"\"\"\nx = 1\nprint(x)\n";
        let out = extract(source);
        assert_eq!(out.docstring_range, Some(ByteRange::new(0, 17)));
        assert_eq!(out.statements.len(), 3);
        assert_eq!(out.references.len(), 2);
        assert_eq!(out.references[0].head.name, "print");
    }

    #[test]
    fn test_import_strings() {
        let py = support();
        assert_eq!(py.import_string("a.b", None, None, false), "import a.b");
        assert_eq!(py.import_string("u", Some("h"), None, false), "from u import h");
        assert_eq!(
            py.import_string("u", Some("h"), Some("g"), false),
            "from u import h as g"
        );
    }
}
