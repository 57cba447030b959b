//! TypeScript / TSX / JavaScript support.
//!
//! Top-level functions, classes, interfaces, type aliases, enums,
//! namespaces and `const`/`let`/`var` declarators become symbols. Every
//! `export` form produces an EXPORT entity; exported declarations carry the
//! export alongside the symbol so the parser can link the two.

use std::collections::HashSet;
use std::sync::OnceLock;

use super::{
    entity_ranges, leading_comments, trailing_comment, unquote, Entity, EntityKind, Extraction,
    LanguageSupport,
};
use crate::io::{join_relative, parent_dir};
use crate::language::Language;
use crate::node::{
    ExportData, ExportKind, Ident, ImportData, ImportKind, Reference, SymbolData, SymbolKind,
    UsagePosition,
};
use crate::references::{ReferenceCollector, ScopeRules};
use crate::syntax::{
    ByteRange, ExpressionClass, NodeClassTable, StatementClass, SyntaxNode, TypeClass,
};

/// TypeScript language hooks.
pub struct TypeScriptSupport;

static SUPPORT: TypeScriptSupport = TypeScriptSupport;
static CLASS_TABLE: OnceLock<NodeClassTable> = OnceLock::new();

/// Resolution order for relative specifiers.
const EXTENSIONS: &[&str] = &[".ts", ".tsx", ".d.ts", ".js", ".jsx"];

const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "method_definition",
];

/// The TypeScript [`LanguageSupport`].
pub fn support() -> &'static dyn LanguageSupport {
    &SUPPORT
}

/// The TypeScript [`ScopeRules`].
pub fn rules() -> &'static dyn ScopeRules {
    &SUPPORT
}

fn class_table() -> &'static NodeClassTable {
    CLASS_TABLE.get_or_init(|| {
        use ExpressionClass as E;
        use StatementClass as S;
        use TypeClass as T;

        NodeClassTable::new()
            .statements(&[
                ("program", S::Block),
                ("statement_block", S::Block),
                ("class_body", S::Block),
                ("import_statement", S::Import),
                ("export_statement", S::Export),
                ("class_declaration", S::ClassDefinition),
                ("abstract_class_declaration", S::ClassDefinition),
                ("class", S::ClassDefinition),
                ("function_declaration", S::FunctionDefinition),
                ("generator_function_declaration", S::FunctionDefinition),
                ("method_definition", S::FunctionDefinition),
                ("interface_declaration", S::InterfaceDefinition),
                ("type_alias_declaration", S::TypeAliasDefinition),
                ("enum_declaration", S::EnumDefinition),
                ("internal_module", S::NamespaceDefinition),
                ("module", S::NamespaceDefinition),
                ("ambient_declaration", S::Other),
                ("lexical_declaration", S::VariableDeclaration),
                ("variable_declaration", S::VariableDeclaration),
                ("public_field_definition", S::VariableDeclaration),
                ("expression_statement", S::ExpressionStatement),
                ("return_statement", S::Return),
                ("if_statement", S::Conditional),
                ("else_clause", S::Conditional),
                ("for_statement", S::Conditional),
                ("for_in_statement", S::Conditional),
                ("while_statement", S::Conditional),
                ("do_statement", S::Conditional),
                ("switch_statement", S::Conditional),
                ("switch_body", S::Conditional),
                ("switch_case", S::Conditional),
                ("switch_default", S::Conditional),
                ("try_statement", S::Try),
                ("catch_clause", S::Try),
                ("finally_clause", S::Try),
                ("throw_statement", S::Other),
                ("labeled_statement", S::Other),
                ("comment", S::Comment),
            ])
            .expressions(&[
                ("identifier", E::Identifier),
                ("shorthand_property_identifier", E::Identifier),
                ("this", E::SelfReference),
                ("super", E::SelfReference),
                ("property_identifier", E::PropertyName),
                ("private_property_identifier", E::PropertyName),
                ("shorthand_property_identifier_pattern", E::PropertyName),
                ("member_expression", E::MemberAccess),
                ("call_expression", E::Call),
                ("new_expression", E::Call),
                ("subscript_expression", E::Subscript),
                ("binary_expression", E::BinaryOp),
                ("unary_expression", E::BinaryOp),
                ("update_expression", E::BinaryOp),
                ("ternary_expression", E::BinaryOp),
                ("arrow_function", E::Lambda),
                ("function_expression", E::Lambda),
                ("function", E::Lambda),
                ("generator_function", E::Lambda),
                ("template_string", E::StringLiteral),
                ("template_substitution", E::Interpolation),
                ("string", E::Literal),
                ("number", E::Literal),
                ("true", E::Literal),
                ("false", E::Literal),
                ("null", E::Literal),
                ("undefined", E::Literal),
                ("regex", E::Literal),
                ("arguments", E::Other),
                ("parenthesized_expression", E::Other),
                ("assignment_expression", E::Other),
                ("augmented_assignment_expression", E::Other),
                ("await_expression", E::Other),
                ("yield_expression", E::Other),
                ("spread_element", E::Other),
                ("sequence_expression", E::Other),
                ("array", E::Other),
                ("object", E::Other),
                ("pair", E::Other),
                ("as_expression", E::Other),
                ("satisfies_expression", E::Other),
                ("non_null_expression", E::Other),
                ("type_assertion", E::Other),
                ("variable_declarator", E::Other),
                ("formal_parameters", E::Other),
                ("required_parameter", E::Other),
                ("optional_parameter", E::Other),
                ("rest_pattern", E::Other),
                ("assignment_pattern", E::Other),
                ("object_pattern", E::Other),
                ("array_pattern", E::Other),
                ("pair_pattern", E::Other),
                ("class_heritage", E::Other),
                ("extends_clause", E::Other),
                ("implements_clause", E::Other),
                ("enum_body", E::Other),
                ("enum_assignment", E::Other),
                ("decorator", E::Decorator),
                ("jsx_element", E::Other),
                ("jsx_self_closing_element", E::Other),
                ("jsx_opening_element", E::Other),
                ("jsx_closing_element", E::Other),
                ("jsx_expression", E::Other),
                ("jsx_attribute", E::Other),
                ("jsx_fragment", E::Other),
            ])
            .types(&[
                ("type_annotation", T::Annotation),
                ("type_identifier", T::Named),
                ("generic_type", T::Generic),
                ("type_arguments", T::TypeArguments),
                ("union_type", T::Union),
                ("intersection_type", T::Union),
                ("array_type", T::Array),
                ("nested_type_identifier", T::Qualified),
                ("predefined_type", T::Predefined),
                ("tuple_type", T::Other),
                ("function_type", T::Other),
                ("constructor_type", T::Other),
                ("parenthesized_type", T::Other),
                ("object_type", T::Other),
                ("property_signature", T::Other),
                ("method_signature", T::Other),
                ("index_signature", T::Other),
                ("call_signature", T::Other),
                ("type_query", T::Other),
                ("index_type_query", T::Other),
                ("lookup_type", T::Other),
                ("conditional_type", T::Other),
                ("readonly_type", T::Other),
                ("type_parameters", T::Other),
                ("type_parameter", T::Other),
                ("constraint", T::Other),
                ("default_type", T::Other),
                ("extends_type_clause", T::Other),
                ("interface_body", T::Other),
                ("optional_type", T::Other),
                ("rest_type", T::Other),
            ])
    })
}

// ============================================================================
// Extraction
// ============================================================================

impl TypeScriptSupport {
    fn collect(&self, node: &SyntaxNode, source: &str, skip: &[ByteRange]) -> Vec<Reference> {
        let mut collector = ReferenceCollector::new(self, source, skip);
        collector.visit(node, UsagePosition::Body);
        collector.finish()
    }

    /// Symbol entities declared by `decl`; `outer` is the statement that
    /// owns the full range (an `export` wrapper or `decl` itself).
    fn declaration(&self, outer: &SyntaxNode, decl: &SyntaxNode, source: &str) -> Vec<Entity> {
        match decl.kind {
            "function_declaration" | "generator_function_declaration" | "function_signature" => {
                self.named(outer, decl, SymbolKind::Function, source)
            }
            "class_declaration" | "abstract_class_declaration" | "class" => {
                self.class(outer, decl, source)
            }
            "interface_declaration" => self.interface(outer, decl, source),
            "type_alias_declaration" => self.named(outer, decl, SymbolKind::TypeAlias, source),
            "enum_declaration" => self.named(outer, decl, SymbolKind::Enum, source),
            "internal_module" | "module" => {
                self.named(outer, decl, SymbolKind::Namespace, source)
            }
            "lexical_declaration" | "variable_declaration" => {
                self.variables(outer, decl, source)
            }
            "expression_statement" | "ambient_declaration" => decl
                .children
                .iter()
                .find(|c| !c.class.is_value() || c.kind == "function_signature")
                .map(|inner| self.declaration(outer, inner, source))
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn named(
        &self,
        outer: &SyntaxNode,
        decl: &SyntaxNode,
        kind: SymbolKind,
        source: &str,
    ) -> Vec<Entity> {
        let Some(name) = decl.child_by_field("name") else {
            return Vec::new();
        };
        let mut data = SymbolData::new(name.text(source), kind, name.range);
        data.body_range = decl.child_by_field("body").map(|b| b.range);
        data.references = self.collect(outer, source, &[]);
        vec![Entity::symbol(outer.range, outer.kind, data)]
    }

    fn class(&self, outer: &SyntaxNode, decl: &SyntaxNode, source: &str) -> Vec<Entity> {
        let Some(name) = decl.child_by_field("name") else {
            return Vec::new();
        };
        let mut data = SymbolData::new(name.text(source), SymbolKind::Class, name.range);
        let body = decl.child_by_field("body");
        data.body_range = body.map(|b| b.range);

        if let Some(heritage) = decl.child_of_kind("class_heritage") {
            data.superclass_list_range = Some(heritage.range);
            for clause in &heritage.children {
                data.superclasses
                    .extend(clause.children.iter().filter_map(|t| type_reference(t, source)));
            }
        }

        let mut children = Vec::new();
        if let Some(body) = body {
            for (index, member) in body.children.iter().enumerate() {
                let kind = match member.kind {
                    "method_definition" | "abstract_method_signature" | "method_signature" => {
                        SymbolKind::Function
                    }
                    "public_field_definition" => {
                        if member
                            .child_by_field("value")
                            .is_some_and(|v| FUNCTION_KINDS.contains(&v.kind))
                        {
                            SymbolKind::Function
                        } else {
                            SymbolKind::Variable
                        }
                    }
                    _ => continue,
                };
                let Some(member_name) = member.child_by_field("name") else {
                    continue;
                };
                let mut member_data =
                    SymbolData::new(member_name.text(source), kind, member_name.range);
                member_data.body_range = member.child_by_field("body").map(|b| b.range);
                member_data.references = self.collect(member, source, &[]);
                member_data.docstring = leading_comments(&body.children, index, source);
                member_data.inline_comment = trailing_comment(&body.children, index, source);
                children.push(Entity::symbol(member.range, member.kind, member_data));
            }
        }

        let skip = entity_ranges(&children);
        data.references = self.collect(outer, source, &skip);
        let mut entity = Entity::symbol(outer.range, outer.kind, data);
        entity.children = children;
        vec![entity]
    }

    fn interface(&self, outer: &SyntaxNode, decl: &SyntaxNode, source: &str) -> Vec<Entity> {
        let Some(name) = decl.child_by_field("name") else {
            return Vec::new();
        };
        let mut data = SymbolData::new(name.text(source), SymbolKind::Interface, name.range);
        data.body_range = decl.child_by_field("body").map(|b| b.range);
        if let Some(clause) = decl.child_of_kind("extends_type_clause") {
            data.superclass_list_range = Some(clause.range);
            data.superclasses = clause
                .children
                .iter()
                .filter_map(|t| type_reference(t, source))
                .collect();
        }
        data.references = self.collect(outer, source, &[]);
        vec![Entity::symbol(outer.range, outer.kind, data)]
    }

    fn variables(&self, outer: &SyntaxNode, decl: &SyntaxNode, source: &str) -> Vec<Entity> {
        let declarators: Vec<&SyntaxNode> = decl
            .children
            .iter()
            .filter(|c| c.kind == "variable_declarator")
            .collect();
        let single = declarators.len() == 1;

        let mut entities = Vec::new();
        for declarator in declarators {
            let Some(name) = declarator.child_by_field("name") else {
                continue;
            };
            if name.kind != "identifier" {
                continue;
            }
            let value = declarator.child_by_field("value");
            let kind = if value.is_some_and(|v| FUNCTION_KINDS.contains(&v.kind)) {
                SymbolKind::Function
            } else {
                SymbolKind::Variable
            };
            let mut data = SymbolData::new(name.text(source), kind, name.range);
            data.body_range = value.and_then(|v| v.child_by_field("body")).map(|b| b.range);
            let owner = if single { outer } else { declarator };
            data.references = self.collect(owner, source, &[name.range]);
            entities.push(Entity::symbol(owner.range, owner.kind, data));
        }
        entities
    }

    fn export(&self, stmt: &SyntaxNode, source: &str) -> Vec<Entity> {
        let after_export = source
            .get(stmt.range.start..stmt.range.end)
            .and_then(|t| t.trim_start().strip_prefix("export"))
            .unwrap_or("")
            .trim_start();
        let is_default = after_export.starts_with("default");
        let module = stmt.child_by_field("source").map(|s| module_of(s, source));

        let export = |kind: ExportKind| ExportData {
            kind,
            exported_name: None,
            local_name: None,
            local_range: None,
            module: module.as_ref().map(|(m, _)| m.clone()),
            module_range: module.as_ref().and_then(|(_, r)| *r),
            statement_range: stmt.range,
            declaration: None,
        };

        if let Some(decl) = stmt.child_by_field("declaration") {
            let mut entities = self.declaration(stmt, decl, source);
            for entity in &mut entities {
                if let EntityKind::Symbol { data, export: slot } = &mut entity.kind {
                    data.is_exported = true;
                    let mut record = export(if is_default {
                        ExportKind::Default
                    } else {
                        ExportKind::Declaration
                    });
                    record.exported_name = Some(if is_default {
                        "default".to_string()
                    } else {
                        data.name.clone()
                    });
                    record.local_name = Some(data.name.clone());
                    record.local_range = Some(data.name_range);
                    *slot = Some(record);
                }
            }
            if !entities.is_empty() {
                return entities;
            }
        }

        if is_default {
            let mut record = export(ExportKind::Default);
            record.exported_name = Some("default".to_string());
            if let Some(value) = stmt.child_by_field("value") {
                if value.kind == "identifier" {
                    record.local_name = Some(value.text(source).to_string());
                    record.local_range = Some(value.range);
                }
            }
            return vec![Entity::export(stmt.range, stmt.kind, record)];
        }

        if let Some(clause) = stmt.child_of_kind("export_clause") {
            let specifiers: Vec<&SyntaxNode> = clause
                .children
                .iter()
                .filter(|c| c.kind == "export_specifier")
                .collect();
            let single = specifiers.len() == 1;
            return specifiers
                .into_iter()
                .filter_map(|spec| {
                    let name = spec.child_by_field("name")?;
                    let alias = spec.child_by_field("alias");
                    let mut record = export(if module.is_some() {
                        ExportKind::ReExport
                    } else {
                        ExportKind::Named
                    });
                    record.local_name = Some(name.text(source).to_string());
                    record.local_range = Some(name.range);
                    record.exported_name =
                        Some(alias.unwrap_or(name).text(source).to_string());
                    let (range, kind) = if single {
                        (stmt.range, stmt.kind)
                    } else {
                        (spec.range, spec.kind)
                    };
                    Some(Entity::export(range, kind, record))
                })
                .collect();
        }

        if module.is_some() {
            let record = match stmt.child_of_kind("namespace_export") {
                Some(ns) => {
                    let mut record = export(ExportKind::Namespace);
                    let name = ns.children.first().unwrap_or(ns);
                    record.exported_name = Some(unquote(name.text(source)).to_string());
                    record
                }
                None => export(ExportKind::Wildcard),
            };
            return vec![Entity::export(stmt.range, stmt.kind, record)];
        }

        Vec::new()
    }
}

/// Module string and the range of its text inside the quotes.
fn module_of(string: &SyntaxNode, source: &str) -> (String, Option<ByteRange>) {
    match string.child_of_kind("string_fragment") {
        Some(fragment) => (fragment.text(source).to_string(), Some(fragment.range)),
        None => (
            unquote(string.text(source)).to_string(),
            Some(ByteRange::empty(string.range.start + 1)),
        ),
    }
}

/// Superclass or extended type as a reference.
fn type_reference(node: &SyntaxNode, source: &str) -> Option<Reference> {
    match node.kind {
        "identifier" | "type_identifier" => Some(Reference::simple(
            Ident::new(node.text(source), node.range),
            UsagePosition::Body,
        )),
        "member_expression" => {
            let mut reference = type_reference(node.child_by_field("object")?, source)?;
            let property = node.child_by_field("property")?;
            reference
                .chain
                .push(Ident::new(property.text(source), property.range));
            Some(reference)
        }
        "nested_type_identifier" => {
            let mut parts = node
                .descendants()
                .filter(|n| n.children.is_empty())
                .map(|n| Ident::new(n.text(source), n.range));
            let head = parts.next()?;
            let mut reference = Reference::simple(head, UsagePosition::Body);
            reference.chain = parts.collect();
            Some(reference)
        }
        "generic_type" => type_reference(node.child_by_field("name")?, source),
        "call_expression" => None,
        _ => None,
    }
}

fn import_entities(stmt: &SyntaxNode, source: &str) -> Vec<Entity> {
    let Some(string) = stmt.child_by_field("source") else {
        return Vec::new();
    };
    let (module, module_range) = module_of(string, source);
    let is_type_only = source
        .get(stmt.range.start..string.range.start)
        .is_some_and(|head| {
            head.trim_start()
                .strip_prefix("import")
                .is_some_and(|rest| rest.trim_start().starts_with("type "))
        });

    let base = |kind: ImportKind| ImportData {
        module: module.clone(),
        module_range,
        name: None,
        name_range: None,
        alias: None,
        alias_range: None,
        kind,
        statement_range: stmt.range,
        is_dynamic: false,
        is_type_only,
    };

    let mut specs: Vec<(&SyntaxNode, ImportData)> = Vec::new();
    match stmt.child_of_kind("import_clause") {
        None => specs.push((stmt, base(ImportKind::SideEffect))),
        Some(clause) => {
            for part in &clause.children {
                match part.kind {
                    "identifier" => {
                        let mut data = base(ImportKind::Default);
                        data.name = Some(part.text(source).to_string());
                        data.name_range = Some(part.range);
                        specs.push((part, data));
                    }
                    "namespace_import" => {
                        let mut data = base(ImportKind::Namespace);
                        if let Some(alias) = part.children.first() {
                            data.alias = Some(alias.text(source).to_string());
                            data.alias_range = Some(alias.range);
                        }
                        specs.push((part, data));
                    }
                    "named_imports" => {
                        for spec in part.children.iter().filter(|s| s.kind == "import_specifier")
                        {
                            let Some(name) = spec.child_by_field("name") else {
                                continue;
                            };
                            let mut data = base(ImportKind::Named);
                            data.name = Some(name.text(source).to_string());
                            data.name_range = Some(name.range);
                            if let Some(alias) = spec.child_by_field("alias") {
                                data.alias = Some(alias.text(source).to_string());
                                data.alias_range = Some(alias.range);
                            }
                            specs.push((spec, data));
                        }
                    }
                    _ => {}
                }
            }
        }
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

/// `import("...")` calls anywhere under a statement.
fn dynamic_imports(stmt: &SyntaxNode, source: &str) -> Vec<Entity> {
    stmt.descendants()
        .filter(|n| n.kind == "call_expression")
        .filter_map(|call| {
            let function = call.child_by_field("function")?;
            if function.kind != "import" {
                return None;
            }
            let [string] = call.child_by_field("arguments")?.children.as_slice() else {
                return None;
            };
            if string.kind != "string" {
                return None;
            }
            let (module, module_range) = module_of(string, source);
            let data = ImportData {
                module,
                module_range,
                name: None,
                name_range: None,
                alias: None,
                alias_range: None,
                kind: ImportKind::SideEffect,
                statement_range: call.range,
                is_dynamic: true,
                is_type_only: false,
            };
            Some(Entity::import(call.range, call.kind, data))
        })
        .collect()
}

/// Hand `import` to the innermost symbol enclosing it. Returns it back when
/// no symbol does.
fn nest_import(entities: &mut [Entity], import: Entity) -> Option<Entity> {
    let Some(owner) = entities
        .iter_mut()
        .find(|e| e.symbol_name().is_some() && e.range.contains(&import.range))
    else {
        return Some(import);
    };
    if let Some(import) = nest_import(&mut owner.children, import) {
        owner.children.push(import);
        owner.children.sort_by_key(|c| c.range.start);
    }
    None
}

// ============================================================================
// Scoping
// ============================================================================

fn pattern_names(node: &SyntaxNode, source: &str, names: &mut HashSet<String>) {
    match node.kind {
        "identifier" | "shorthand_property_identifier_pattern" => {
            names.insert(node.text(source).to_string());
        }
        "type_annotation" | "member_expression" => {}
        "assignment_pattern" => {
            if let Some(left) = node.child_by_field("left") {
                pattern_names(left, source, names);
            }
        }
        "pair_pattern" => {
            if let Some(value) = node.child_by_field("value") {
                pattern_names(value, source, names);
            }
        }
        _ => {
            for child in &node.children {
                if child.field == Some("value") && node.kind != "rest_pattern" {
                    continue;
                }
                pattern_names(child, source, names);
            }
        }
    }
}

fn body_bindings(node: &SyntaxNode, source: &str, names: &mut HashSet<String>) {
    for child in &node.children {
        match child.kind {
            kind if FUNCTION_KINDS.contains(&kind) => {
                if let Some(name) = child.child_by_field("name") {
                    if kind != "method_definition" {
                        names.insert(name.text(source).to_string());
                    }
                }
                continue;
            }
            "class_declaration" | "class" => {
                if let Some(name) = child.child_by_field("name") {
                    names.insert(name.text(source).to_string());
                }
                continue;
            }
            "variable_declarator" => {
                if let Some(name) = child.child_by_field("name") {
                    pattern_names(name, source, names);
                }
            }
            "catch_clause" => {
                if let Some(param) = child.child_by_field("parameter") {
                    pattern_names(param, source, names);
                }
            }
            "for_in_statement" => {
                if let Some(left) = child.child_by_field("left") {
                    pattern_names(left, source, names);
                }
            }
            _ => {}
        }
        body_bindings(child, source, names);
    }
}

impl ScopeRules for TypeScriptSupport {
    fn function_bindings(&self, node: &SyntaxNode, source: &str) -> HashSet<String> {
        let mut names = HashSet::new();
        if let Some(param) = node.child_by_field("parameter") {
            pattern_names(param, source, &mut names);
        }
        if let Some(params) = node.child_by_field("parameters") {
            for param in &params.children {
                match param.child_by_field("pattern") {
                    Some(pattern) => pattern_names(pattern, source, &mut names),
                    None => pattern_names(param, source, &mut names),
                }
            }
        }
        if let Some(type_params) = node.child_by_field("type_parameters") {
            for param in &type_params.children {
                if let Some(name) = param.child_by_field("name") {
                    names.insert(name.text(source).to_string());
                }
            }
        }
        if let Some(body) = node.child_by_field("body") {
            body_bindings(body, source, &mut names);
        }
        names
    }

    fn member_object_field(&self) -> &'static str {
        "object"
    }

    fn member_property_field(&self) -> &'static str {
        "property"
    }

    fn generic_name_field(&self) -> Option<&'static str> {
        Some("name")
    }
}

// ============================================================================
// Language hooks
// ============================================================================

impl LanguageSupport for TypeScriptSupport {
    fn language(&self) -> Language {
        Language::TypeScript
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

        for (index, stmt) in stmts.iter().enumerate() {
            if stmt.kind == "comment" {
                continue;
            }
            out.statements.push(stmt.range);

            let mut entities = match stmt.kind {
                "import_statement" => {
                    out.entities.extend(import_entities(stmt, source));
                    continue;
                }
                "export_statement" => self.export(stmt, source),
                _ => self.declaration(stmt, stmt, source),
            };
            let dynamic = dynamic_imports(stmt, source);
            if entities.is_empty() {
                out.references.extend(self.collect(stmt, source, &[]));
                out.entities.extend(dynamic);
                continue;
            }
            for import in dynamic {
                out.entities.extend(nest_import(&mut entities, import));
            }

            // export statements without a declaration have no symbol
            let has_symbol = entities.iter().any(|e| e.symbol_name().is_some());
            if !has_symbol && stmt.kind == "export_statement" {
                if let Some(value) = stmt.child_by_field("value") {
                    if value.kind != "identifier" {
                        out.references.extend(self.collect(value, source, &[]));
                    }
                }
            }

            let docstring = leading_comments(stmts, index, source);
            let inline = trailing_comment(stmts, index, source);
            for entity in &mut entities {
                if let EntityKind::Symbol { data, .. } = &mut entity.kind {
                    data.docstring = docstring.clone();
                    data.inline_comment = inline.clone();
                }
            }
            out.entities.extend(entities);
        }

        // `export { a }` marks the local declaration as exported
        let exported: HashSet<String> = out
            .entities
            .iter()
            .filter_map(|e| match &e.kind {
                EntityKind::Export(x) if x.kind == ExportKind::Named => x.local_name.clone(),
                EntityKind::Export(x) if x.kind == ExportKind::Default && x.module.is_none() => {
                    x.local_name.clone()
                }
                _ => None,
            })
            .collect();
        for entity in &mut out.entities {
            if let EntityKind::Symbol { data, .. } = &mut entity.kind {
                if exported.contains(&data.name) {
                    data.is_exported = true;
                }
            }
        }

        out
    }

    fn module_name(&self, path: &str) -> String {
        let stem = strip_extension(path);
        stem.strip_suffix("/index")
            .or_else(|| if stem == "index" { Some("") } else { None })
            .unwrap_or(stem)
            .to_string()
    }

    fn absolute_module(&self, importer: &str, module: &str) -> String {
        if module.starts_with("./") || module.starts_with("../") || module == "." || module == ".."
        {
            join_relative(parent_dir(importer), module).unwrap_or_else(|| module.to_string())
        } else {
            module.to_string()
        }
    }

    fn module_separator(&self) -> char {
        '/'
    }

    fn module_candidates(&self, module: &str) -> Vec<String> {
        let module = module.trim_end_matches('/');
        let mut bases = vec![module.to_string()];
        // ESM-style specifiers name the emitted `.js` file
        for ext in [".js", ".jsx", ".mjs", ".cjs"] {
            if let Some(stem) = module.strip_suffix(ext) {
                bases.push(stem.to_string());
            }
        }

        let mut candidates = Vec::new();
        for base in &bases {
            if Language::from_path(std::path::Path::new(base)) == Some(Language::TypeScript) {
                candidates.push(base.clone());
            }
        }
        for base in &bases {
            for ext in EXTENSIONS {
                candidates.push(format!("{}{}", base, ext));
            }
        }
        for base in &bases {
            let prefix = if base.is_empty() {
                "index".to_string()
            } else {
                format!("{}/index", base)
            };
            for ext in EXTENSIONS {
                candidates.push(format!("{}{}", prefix, ext));
            }
        }
        candidates
    }

    fn exports_all_top_level(&self) -> bool {
        false
    }

    fn import_string(
        &self,
        module: &str,
        name: Option<&str>,
        alias: Option<&str>,
        is_type_only: bool,
    ) -> String {
        let keyword = if is_type_only { "import type" } else { "import" };
        match (name, alias) {
            (None, None) => format!("import \"{}\";", module),
            (None, Some(alias)) => format!("{} * as {} from \"{}\";", keyword, alias, module),
            (Some("default"), Some(alias)) => {
                format!("{} {} from \"{}\";", keyword, alias, module)
            }
            (Some(name), Some(alias)) if alias != name => {
                format!("{} {{ {} as {} }} from \"{}\";", keyword, name, alias, module)
            }
            (Some(name), _) => format!("{} {{ {} }} from \"{}\";", keyword, name, module),
        }
    }

    fn module_specifier(&self, importer: &str, target: &str) -> String {
        let target = self.module_name(target);
        let from: Vec<&str> = parent_dir(importer)
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

        let common = from
            .iter()
            .zip(to.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let mut parts: Vec<&str> = Vec::new();
        for _ in common..from.len() {
            parts.push("..");
        }
        parts.extend(&to[common..]);

        if parts.is_empty() {
            return ".".to_string();
        }
        let joined = parts.join("/");
        if joined.starts_with("..") {
            joined
        } else {
            format!("./{}", joined)
        }
    }

    fn comment_prefix(&self) -> &'static str {
        "//"
    }
}

fn strip_extension(path: &str) -> &str {
    for ext in [".d.ts", ".tsx", ".ts", ".mts", ".cts", ".jsx", ".js", ".mjs", ".cjs"] {
        if let Some(stem) = path.strip_suffix(ext) {
            return stem;
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Grammar;

    fn extract(source: &str) -> Extraction {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&Grammar::TypeScript.tree_sitter_language())
            .unwrap();
        let tree = parser.parse(source, None).unwrap();
        let root = SyntaxNode::build(tree.root_node(), class_table());
        support().extract(&root, source)
    }

    fn describe(entity: &Entity) -> String {
        match &entity.kind {
            EntityKind::Symbol { data, export } => format!(
                "{}:{}{}",
                data.kind.as_str(),
                data.name,
                if export.is_some() { "+export" } else { "" }
            ),
            EntityKind::Import(i) => format!("import:{:?}:{}", i.kind, i.local_name().unwrap_or("")),
            EntityKind::Export(x) => format!(
                "export:{:?}:{}",
                x.kind,
                x.exported_name.as_deref().unwrap_or("")
            ),
        }
    }

    #[test]
    fn test_import_forms() {
        let source = "import React, { useState as us, type FC } from \"react\";\nimport * as path from \"path\";\nimport \"./polyfill\";\nimport type { T } from \"./types\";\n";
        let out = extract(source);
        let described: Vec<String> = out.entities.iter().map(describe).collect();
        assert_eq!(
            described,
            vec![
                "import:Default:React",
                "import:Named:us",
                "import:Named:FC",
                "import:Namespace:path",
                "import:SideEffect:",
                "import:Named:T",
            ]
        );
        match &out.entities[5].kind {
            EntityKind::Import(i) => {
                assert!(i.is_type_only);
                assert_eq!(i.module, "./types");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_export_forms() {
        let source = "export function f() {}\nconst a = 1;\nexport { a as b };\nexport * from \"./m\";\nexport { x } from \"./n\";\nexport default f;\nexport class K extends Base implements I {}\n";
        let out = extract(source);
        let described: Vec<String> = out.entities.iter().map(describe).collect();
        assert_eq!(
            described,
            vec![
                "function:f+export",
                "variable:a",
                "export:Named:b",
                "export:Wildcard:",
                "export:ReExport:x",
                "export:Default:default",
                "class:K+export",
            ]
        );
        match &out.entities[6].kind {
            EntityKind::Symbol { data, .. } => {
                let supers: Vec<&str> =
                    data.superclasses.iter().map(|r| r.head.name.as_str()).collect();
                assert_eq!(supers, vec!["Base", "I"]);
            }
            _ => unreachable!(),
        }
        match &out.entities[1].kind {
            EntityKind::Symbol { data, .. } => assert!(data.is_exported),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_symbols_and_members() {
        let source = "interface Shape { area(): number }\ntype Id = string;\nenum Color { Red }\nconst handler = (e: Event) => process(e);\nclass Box {\n  size = 1;\n  open(): void { this.close(); }\n}\n";
        let out = extract(source);
        let described: Vec<String> = out.entities.iter().map(describe).collect();
        assert_eq!(
            described,
            vec![
                "interface:Shape",
                "type_alias:Id",
                "enum:Color",
                "function:handler",
                "class:Box",
            ]
        );
        let members: Vec<String> = out.entities[4].children.iter().map(describe).collect();
        assert_eq!(members, vec!["variable:size", "function:open"]);

        match &out.entities[3].kind {
            EntityKind::Symbol { data, .. } => {
                let names: Vec<&str> =
                    data.references.iter().map(|r| r.head.name.as_str()).collect();
                assert_eq!(names, vec!["Event", "process"]);
                assert_eq!(data.references[0].position, UsagePosition::Typed);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_resolution_candidates_order() {
        let ts = support();
        assert_eq!(ts.absolute_module("src/app.ts", "./util"), "src/util");
        assert_eq!(ts.absolute_module("src/app.ts", "../lib/x"), "lib/x");
        let candidates = ts.module_candidates("src/util");
        assert_eq!(
            &candidates[..6],
            &[
                "src/util.ts",
                "src/util.tsx",
                "src/util.d.ts",
                "src/util.js",
                "src/util.jsx",
                "src/util/index.ts",
            ]
        );
        assert_eq!(ts.module_candidates("src/util.js")[0], "src/util.js");
        assert!(ts.module_candidates("src/util.js").contains(&"src/util.ts".to_string()));
    }

    #[test]
    fn test_module_specifier() {
        let ts = support();
        assert_eq!(ts.module_specifier("src/a.ts", "src/b.ts"), "./b");
        assert_eq!(ts.module_specifier("src/a.ts", "lib/c.tsx"), "../lib/c");
        assert_eq!(ts.module_specifier("src/a.ts", "src/util/index.ts"), "./util");
        assert_eq!(ts.module_name("src/util/index.ts"), "src/util");
    }

    #[test]
    fn test_import_strings() {
        let ts = support();
        assert_eq!(
            ts.import_string("./m", Some("n"), None, false),
            "import { n } from \"./m\";"
        );
        assert_eq!(
            ts.import_string("./m", Some("n"), Some("k"), true),
            "import type { n as k } from \"./m\";"
        );
        assert_eq!(ts.import_string("fs", None, Some("fs"), false), "import * as fs from \"fs\";");
    }

    #[test]
    fn test_dynamic_imports_are_nested_and_dynamic() {
        let source = "import { a } from \"./a\";\n\nexport async function load() {\n  const m = await import(\"./lazy\");\n  return m;\n}\n\nclass Loader {\n  run() {\n    try {\n      return import('./inner');\n    } catch (e) {}\n  }\n}\n\nconst pick = () => (a ? import(\"./x\") : null);\n\nif (a) {\n  import(\"./side\");\n}\n";
        let out = extract(source);
        let described: Vec<String> = out.entities.iter().map(describe).collect();
        assert_eq!(
            described,
            vec![
                "import:Named:a",
                "function:load+export",
                "class:Loader",
                "function:pick",
                "import:SideEffect:",
            ]
        );

        let import = |entity: &Entity| match &entity.kind {
            EntityKind::Import(i) => i.clone(),
            _ => unreachable!(),
        };
        assert!(!import(&out.entities[0]).is_dynamic);

        let lazy = import(&out.entities[1].children[0]);
        assert!(lazy.is_dynamic);
        assert_eq!(lazy.module, "./lazy");
        assert_eq!(
            lazy.module_range.and_then(|r| r.slice(source)),
            Some("./lazy")
        );

        let method = &out.entities[2].children[0];
        assert_eq!(method.symbol_name(), Some("run"));
        let inner = import(&method.children[0]);
        assert!(inner.is_dynamic);
        assert_eq!(inner.module, "./inner");

        assert_eq!(import(&out.entities[3].children[0]).module, "./x");

        let side = import(&out.entities[4]);
        assert!(side.is_dynamic);
        assert_eq!(side.module, "./side");
        assert_eq!(side.statement_range.slice(source), Some("import(\"./side\")"));
    }
}
