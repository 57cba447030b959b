//! Editing operations through the session API.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package codemorph-core --test editing
//! ```

mod common;

use codemorph_config::SessionOptions;
use codemorph_core::{ChangeType, CodebaseError, EdgeType, Editable, MoveStrategy, NodeType};
use common::TestRepo;
use pretty_assertions::assert_eq;

// ============================================================================
// Moves
// ============================================================================

#[test]
fn test_move_with_back_edge_leaves_importers_alone() {
    let mut repo = TestRepo::new(&[
        ("a.py", "def f():\n    return 1\n"),
        ("b.py", "x = 2\n"),
        ("c.py", "from a import f\n\nf()\n"),
    ]);

    repo.codebase
        .with_session(|s| {
            let b = s.get_file("b.py")?;
            s.get_file("a.py")?.move_symbol(&s.get_function("f")?, &b, MoveStrategy::AddBackEdge)
        })
        .unwrap();

    assert_eq!(repo.read("a.py"), "from b import f\n");
    assert_eq!(repo.read("b.py"), "x = 2\n\n\ndef f():\n    return 1\n");
    assert_eq!(repo.read("c.py"), "from a import f\n\nf()\n");

    // c.py still reaches f through the back import
    let resolved = repo.codebase.read(|s| {
        s.get_file("c.py")
            .unwrap()
            .get_import("f")
            .and_then(|i| i.resolved())
            .map(|n| (n.node_type(), n.name().map(str::to_string)))
    });
    assert!(resolved.is_some());
}

#[test]
fn test_move_typescript_function_repoints_importers() {
    let mut repo = TestRepo::new(&[
        (
            "a.ts",
            "export function f(): number {\n  return 1;\n}\n\nexport function g(): number {\n  return f();\n}\n",
        ),
        ("b.ts", ""),
        ("c.ts", "import { f } from \"./a\";\n\nf();\n"),
    ]);

    repo.codebase
        .with_session(|s| {
            let b = s.get_file("b.ts")?;
            s.get_file("a.ts")?
                .get_function("f")?
                .move_to_file(&b, false, MoveStrategy::UpdateAllImports)
        })
        .unwrap();

    assert_eq!(
        repo.read("a.ts"),
        "import { f } from \"./b\";\n\nexport function g(): number {\n  return f();\n}\n"
    );
    assert_eq!(repo.read("b.ts"), "export function f(): number {\n  return 1;\n}\n");
    assert_eq!(repo.read("c.ts"), "import { f } from \"./b\";\n\nf();\n");
}

#[test]
fn test_move_rejects_language_mismatch() {
    let mut repo = TestRepo::new(&[
        ("a.py", "def f():\n    pass\n"),
        ("b.ts", "export const x = 1;\n"),
    ]);
    let before = repo.snapshot();

    let err = repo
        .codebase
        .with_session(|s| {
            let b = s.get_file("b.ts")?;
            s.get_function("f")?
                .move_to_file(&b, false, MoveStrategy::UpdateAllImports)
        })
        .unwrap_err();

    assert!(matches!(err, CodebaseError::InvalidOperation(_)), "{:?}", err);
    assert_eq!(repo.snapshot(), before);
}

// ============================================================================
// Renames and imports
// ============================================================================

#[test]
fn test_rename_typescript_class_across_reexport() {
    let mut repo = TestRepo::new(&[
        ("src/shape.ts", "export class Square {\n  side = 1;\n}\n"),
        ("src/index.ts", "export { Square } from \"./shape\";\n"),
        (
            "src/app.ts",
            "import { Square } from \"./shape\";\n\nconst s: Square = new Square();\n",
        ),
    ]);

    repo.codebase
        .with_session(|s| s.get_class("Square")?.rename("Block"))
        .unwrap();

    assert_eq!(repo.read("src/shape.ts"), "export class Block {\n  side = 1;\n}\n");
    assert_eq!(repo.read("src/index.ts"), "export { Block } from \"./shape\";\n");
    assert_eq!(
        repo.read("src/app.ts"),
        "import { Block } from \"./shape\";\n\nconst s: Block = new Block();\n"
    );
}

#[test]
fn test_set_module_keeps_quotes() {
    let mut repo = TestRepo::new(&[
        ("a.ts", "export const v = 1;\n"),
        ("lib/b.ts", "export const v = 2;\n"),
        ("c.ts", "import { v } from './a';\n\nconsole.log(v);\n"),
        ("d.py", "from os import path\n"),
    ]);

    repo.codebase
        .with_session(|s| {
            s.get_file("c.ts")?.get_import("v").unwrap().set_module("./lib/b")?;
            s.get_file("d.py")?.get_import("path").unwrap().set_module("posixpath")
        })
        .unwrap();

    assert_eq!(repo.read("c.ts"), "import { v } from './lib/b';\n\nconsole.log(v);\n");
    assert_eq!(repo.read("d.py"), "from posixpath import path\n");

    let target = repo.codebase.read(|s| {
        s.get_file("c.ts")
            .unwrap()
            .get_import("v")
            .and_then(|i| i.resolved())
            .and_then(|n| n.as_symbol())
            .map(|sym| sym.file_path().to_string())
    });
    assert_eq!(target.as_deref(), Some("lib/b.ts"));
}

#[test]
fn test_remove_one_typescript_specifier() {
    let mut repo = TestRepo::new(&[
        ("m.ts", "export const a = 1;\nexport const b = 2;\nexport const c = 3;\n"),
        ("u.ts", "import { a, b, c } from \"./m\";\n\nconsole.log(a + c);\n"),
    ]);

    repo.codebase
        .with_session(|s| s.get_file("u.ts")?.get_import("b").unwrap().remove())
        .unwrap();

    assert_eq!(repo.read("u.ts"), "import { a, c } from \"./m\";\n\nconsole.log(a + c);\n");
}

#[test]
fn test_unused_imports() {
    let repo = TestRepo::new(&[(
        "a.py",
        "import os\nimport sys\n\nprint(sys.argv)\n",
    )]);

    let unused: Vec<String> = repo.codebase.read(|s| {
        s.get_file("a.py")
            .unwrap()
            .imports()
            .into_iter()
            .filter(|i| i.is_unused())
            .filter_map(|i| i.local_name().map(str::to_string))
            .collect()
    });
    assert_eq!(unused, vec!["os".to_string()]);
}

#[test]
fn test_typescript_dynamic_import_resolves_module() {
    let repo = TestRepo::new(&[
        ("src/lazy.ts", "export const x = 1;\n"),
        (
            "src/main.ts",
            "export async function load() {\n  return import(\"./lazy\");\n}\n",
        ),
    ]);

    let graph = repo.codebase.graph();
    let import = graph.nodes_of_type(NodeType::Import).next().unwrap();
    assert!(import.as_import().unwrap().is_dynamic);
    assert!(import.parent.is_some());

    let targets: Vec<&str> = graph
        .successors(import.id, Some(EdgeType::ImportSymbolResolution))
        .into_iter()
        .filter_map(|id| graph.file_path_of(id))
        .collect();
    assert_eq!(targets, vec!["src/lazy.ts"]);

    let modules: Vec<(String, bool)> = repo.codebase.read(|s| {
        s.get_file("src/main.ts")
            .unwrap()
            .imports()
            .iter()
            .map(|i| (i.module().to_string(), i.is_dynamic()))
            .collect()
    });
    assert_eq!(modules, vec![("./lazy".to_string(), true)]);
}

// ============================================================================
// Superclasses
// ============================================================================

#[test]
fn test_add_superclass_typescript() {
    let mut repo = TestRepo::new(&[(
        "t.ts",
        "interface Shape {}\nclass Base {}\nclass Square implements Shape {}\nclass Plain {}\n",
    )]);

    repo.codebase
        .with_session(|s| {
            s.get_class("Square")?.add_superclass("Base")?;
            s.get_class("Plain")?.add_superclass("Base")
        })
        .unwrap();

    assert_eq!(
        repo.read("t.ts"),
        "interface Shape {}\nclass Base {}\nclass Square extends Base implements Shape {}\nclass Plain extends Base {}\n"
    );

    let subclasses = repo.codebase.read(|s| {
        let mut names: Vec<String> = s
            .get_class("Base")
            .unwrap()
            .subclasses()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        names.sort();
        names
    });
    assert_eq!(subclasses, vec!["Plain", "Square"]);
}

#[test]
fn test_add_superclass_twice_is_rejected() {
    let mut repo = TestRepo::new(&[(
        "t.ts",
        "class A {}\nclass B {}\nclass C extends A {}\n",
    )]);

    let err = repo
        .codebase
        .with_session(|s| s.get_class("C")?.add_superclass("B"))
        .unwrap_err();
    assert!(matches!(err, CodebaseError::InvalidOperation(_)));
}

// ============================================================================
// File operations
// ============================================================================

#[test]
fn test_file_operations_report_diffs() {
    let mut repo = TestRepo::new(&[
        ("a.py", "def f():\n    pass\n"),
        ("b.py", "x = 1\n"),
    ]);

    let outcome = repo
        .codebase
        .with_session(|s| {
            s.create_file("pkg/new.py", "from a import f\n")?;
            s.get_file("a.py")?.rename("lib/a.py")?;
            s.get_file("b.py")?.remove()
        })
        .unwrap();

    let mut changes: Vec<(ChangeType, String, Option<String>)> = outcome
        .diffs
        .iter()
        .map(|d| (d.change_type, d.path.clone(), d.rename_from.clone()))
        .collect();
    changes.sort_by(|a, b| a.1.cmp(&b.1));
    assert_eq!(
        changes,
        vec![
            (ChangeType::Removed, "b.py".to_string(), None),
            (ChangeType::Renamed, "lib/a.py".to_string(), Some("a.py".to_string())),
            (ChangeType::Added, "pkg/new.py".to_string(), None),
        ]
    );
    assert!(!repo.exists("a.py"));
    assert!(!repo.exists("b.py"));
    assert_eq!(repo.read("lib/a.py"), "def f():\n    pass\n");

    let files: Vec<String> = repo
        .codebase
        .read(|s| s.files().iter().map(|f| f.path().to_string()).collect());
    assert_eq!(files, vec!["lib/a.py", "pkg/new.py"]);

    let listed = repo.codebase.read(|s| {
        s.directory("pkg")
            .map(|d| d.files().iter().map(|f| f.name().to_string()).collect::<Vec<_>>())
    });
    assert_eq!(listed, Some(vec!["new.py".to_string()]));
}

#[test]
fn test_create_existing_file_is_rejected() {
    let mut repo = TestRepo::new(&[("a.py", "x = 1\n")]);
    let err = repo
        .codebase
        .with_session(|s| s.create_file("a.py", "y = 2\n"))
        .unwrap_err();
    assert!(matches!(err, CodebaseError::InvalidOperation(_)));
    assert_eq!(repo.read("a.py"), "x = 1\n");
}

// ============================================================================
// Undo
// ============================================================================

#[test]
fn test_reset_restores_files_and_graph() {
    let mut repo = TestRepo::new(&[
        ("a.py", "def f():\n    return 1\n"),
        ("b.py", "from a import f\n\nf()\n"),
    ]);
    let before = repo.snapshot();
    let canonical = repo.canonical();

    repo.codebase
        .with_session(|s| s.get_function("f")?.rename("g"))
        .unwrap();
    repo.codebase
        .with_session(|s| s.create_file("c.py", "from a import g\n"))
        .unwrap();
    assert_eq!(repo.codebase.applied_diffs().len(), 3);

    repo.codebase.reset().unwrap();

    assert_eq!(repo.snapshot(), before);
    assert_eq!(repo.canonical(), canonical);
    assert!(repo.codebase.applied_diffs().is_empty());
}

#[test]
fn test_undo_applied_diffs_keeps_pending() {
    let mut config = codemorph_config::CodebaseConfig::for_tests();
    config.feature_flags.sync_enabled = false;
    let mut repo = TestRepo::with_config(&[("a.py", "x = 1\n")], config);

    repo.codebase
        .with_session(|s| s.get_file("a.py")?.edit_range(codemorph_core::ByteRange::new(4, 5), "2"))
        .unwrap();
    assert_eq!(repo.codebase.pending_diffs().len(), 1);

    assert!(repo.codebase.undo_applied_diffs().unwrap().is_none());
    assert_eq!(repo.read("a.py"), "x = 2\n");
    assert_eq!(repo.codebase.pending_diffs().len(), 1);
}

// ============================================================================
// Limits
// ============================================================================

#[test]
fn test_time_budget_aborts_session() {
    let mut repo = TestRepo::new(&[("a.py", "def f():\n    pass\n")]);

    let err = repo
        .codebase
        .session(SessionOptions::default().with_max_seconds(0), |s| {
            s.get_function("f")?.rename("g")
        })
        .unwrap_err();

    assert!(matches!(err, CodebaseError::TimeBudgetExceeded { .. }), "{:?}", err);
    assert_eq!(repo.read("a.py"), "def f():\n    pass\n");
}

#[test]
fn test_max_transactions_aborts_session() {
    let mut repo = TestRepo::new(&[
        ("a.py", "def f():\n    pass\n"),
        ("b.py", "from a import f\nf()\nf()\n"),
    ]);

    let err = repo
        .codebase
        .session(SessionOptions::default().with_max_transactions(2), |s| {
            s.get_function("f")?.rename("g")
        })
        .unwrap_err();

    assert!(matches!(err, CodebaseError::MaxTransactionsExceeded { limit: 2 }));
    assert_eq!(repo.read("b.py"), "from a import f\nf()\nf()\n");
}

#[test]
fn test_ambiguous_lookup_lists_candidates() {
    let repo = TestRepo::new(&[
        ("a.py", "def f():\n    pass\n"),
        ("b.py", "def f():\n    pass\n"),
    ]);

    let err = repo.codebase.read(|s| s.get_function("f").map(|f| f.id())).unwrap_err();
    match err {
        CodebaseError::AmbiguousSymbol { name, candidates } => {
            assert_eq!(name, "f");
            assert_eq!(candidates, vec!["a.py:f", "b.py:f"]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let kinds = repo.codebase.read(|s| {
        s.get_file("b.py")
            .unwrap()
            .symbols()
            .iter()
            .map(|sym| sym.node().node_type())
            .collect::<Vec<_>>()
    });
    assert_eq!(kinds, vec![NodeType::Symbol]);
}
