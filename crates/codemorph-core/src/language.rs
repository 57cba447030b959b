//! Supported languages and grammar selection.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tree_sitter::Language as TsLanguage;

use crate::lang::{self, LanguageSupport};

// ============================================================================
// Languages
// ============================================================================

/// A language the engine can build a graph for.
///
/// A language is one node-class table plus a list of file extensions; see
/// [`LanguageSupport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    TypeScript,
}

impl Language {
    /// All supported languages.
    pub const ALL: [Language; 2] = [Language::Python, Language::TypeScript];

    /// Lowercase language name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
        }
    }

    /// File extensions owned by this language.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py", "pyi"],
            Language::TypeScript => &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"],
        }
    }

    /// Detect language from file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        Grammar::from_path(path).map(|g| g.language())
    }

    /// Per-language parsing and resolution hooks.
    pub fn support(&self) -> &'static dyn LanguageSupport {
        match self {
            Language::Python => lang::python::support(),
            Language::TypeScript => lang::typescript::support(),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the set of parsed languages is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LanguageSelection {
    /// Pick the language with the most files in the repository
    #[default]
    Auto,
    /// Parse only this language
    Explicit(Language),
    /// Parse every supported language
    All,
}

impl LanguageSelection {
    /// Resolve the selection against per-language file counts.
    pub fn resolve(&self, counts: &HashMap<Language, usize>) -> Vec<Language> {
        match self {
            LanguageSelection::Explicit(lang) => vec![*lang],
            LanguageSelection::All => Language::ALL.to_vec(),
            LanguageSelection::Auto => {
                let best = Language::ALL
                    .iter()
                    .copied()
                    .max_by_key(|lang| {
                        // ties favour the earlier language
                        let rank = Language::ALL.len()
                            - Language::ALL.iter().position(|l| l == lang).unwrap_or(0);
                        (counts.get(lang).copied().unwrap_or(0), rank)
                    })
                    .unwrap_or(Language::Python);
                vec![best]
            }
        }
    }
}

// ============================================================================
// Grammars
// ============================================================================

/// Concrete tree-sitter grammar used for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grammar {
    Python,
    TypeScript,
    Tsx,
}

impl Grammar {
    /// Language this grammar belongs to.
    pub fn language(&self) -> Language {
        match self {
            Grammar::Python => Language::Python,
            Grammar::TypeScript | Grammar::Tsx => Language::TypeScript,
        }
    }

    /// Get the tree-sitter Language for this grammar.
    pub fn tree_sitter_language(&self) -> TsLanguage {
        match self {
            Grammar::Python => tree_sitter_python::LANGUAGE.into(),
            Grammar::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Grammar::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    /// Detect grammar from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        get_extension_map()
            .get(ext.to_lowercase().as_str())
            .copied()
    }

    /// Detect grammar from file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Static extension to grammar mapping.
static EXTENSION_MAP: OnceLock<HashMap<&'static str, Grammar>> = OnceLock::new();

fn get_extension_map() -> &'static HashMap<&'static str, Grammar> {
    EXTENSION_MAP.get_or_init(|| {
        let mut map = HashMap::new();
        // Python
        map.insert("py", Grammar::Python);
        map.insert("pyi", Grammar::Python);
        // TypeScript
        map.insert("ts", Grammar::TypeScript);
        map.insert("mts", Grammar::TypeScript);
        map.insert("cts", Grammar::TypeScript);
        // TSX grammar also covers plain JavaScript
        map.insert("tsx", Grammar::Tsx);
        map.insert("js", Grammar::Tsx);
        map.insert("jsx", Grammar::Tsx);
        map.insert("mjs", Grammar::Tsx);
        map.insert("cjs", Grammar::Tsx);
        map
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path(Path::new("a/b.py")), Some(Language::Python));
        assert_eq!(Language::from_path(Path::new("x.tsx")), Some(Language::TypeScript));
        assert_eq!(Grammar::from_path(Path::new("x.js")), Some(Grammar::Tsx));
        assert_eq!(Grammar::from_path(Path::new("x.TS")), Some(Grammar::TypeScript));
        assert_eq!(Language::from_path(Path::new("README.md")), None);
    }

    #[test]
    fn test_every_extension_maps_back() {
        for lang in Language::ALL {
            for ext in lang.extensions() {
                assert_eq!(Grammar::from_extension(ext).map(|g| g.language()), Some(lang));
            }
        }
    }

    #[test]
    fn test_auto_selection_majority() {
        let mut counts = HashMap::new();
        counts.insert(Language::Python, 2);
        counts.insert(Language::TypeScript, 5);
        assert_eq!(
            LanguageSelection::Auto.resolve(&counts),
            vec![Language::TypeScript]
        );

        counts.insert(Language::Python, 5);
        assert_eq!(LanguageSelection::Auto.resolve(&counts), vec![Language::Python]);

        assert_eq!(
            LanguageSelection::Auto.resolve(&HashMap::new()),
            vec![Language::Python]
        );
    }

    #[test]
    fn test_grammars_load() {
        for grammar in [Grammar::Python, Grammar::TypeScript, Grammar::Tsx] {
            let mut parser = tree_sitter::Parser::new();
            assert!(parser.set_language(&grammar.tree_sitter_language()).is_ok());
        }
    }
}
