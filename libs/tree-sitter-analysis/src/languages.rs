//! Per-language tree-sitter grammar registration and structural node-kind
//! tables. Each language publishes which syntax node kinds become which
//! [`crate::UnitKind`], and under what ancestor constraint (e.g. a Rust
//! `function_item` is a `Method` only when nested in an `impl_item`, a
//! `Function` otherwise).

use crate::UnitKind;

/// One node-kind-to-unit-kind mapping rule.
pub(crate) struct NodeRule {
    /// tree-sitter node kind name, e.g. `"function_item"`.
    pub kind: &'static str,
    /// The unit kind this node becomes.
    pub unit: UnitKind,
    /// Field name used to look up the identifier child, e.g. `"name"`.
    pub name_field: &'static str,
    /// If set, this rule only applies when some ancestor node has this
    /// kind (used to distinguish free functions from methods).
    pub requires_ancestor: Option<&'static str>,
}

const fn rule(kind: &'static str, unit: UnitKind, name_field: &'static str) -> NodeRule {
    NodeRule {
        kind,
        unit,
        name_field,
        requires_ancestor: None,
    }
}

const fn rule_within(
    kind: &'static str,
    unit: UnitKind,
    name_field: &'static str,
    ancestor: &'static str,
) -> NodeRule {
    NodeRule {
        kind,
        unit,
        name_field,
        requires_ancestor: Some(ancestor),
    }
}

/// A registered grammar: how to obtain the `tree_sitter::Language` and which
/// rules apply to it.
pub(crate) struct LanguageSpec {
    pub language: fn() -> tree_sitter::Language,
    pub rules: &'static [NodeRule],
}

/// Canonical (capitalized, matching the host crate's `Language::as_str`)
/// language name -> grammar spec. Only languages with a tree-sitter grammar
/// dependency are listed here; everything else (SQL, JSON, YAML, TOML, and
/// any language whose grammar is absent) goes through the fallback chunker.
pub(crate) fn spec_for(language: &str) -> Option<LanguageSpec> {
    match language {
        "Rust" => Some(LanguageSpec {
            language: || tree_sitter_rust::LANGUAGE.into(),
            rules: &[
                rule_within("function_item", UnitKind::Method, "name", "impl_item"),
                rule("function_item", UnitKind::Function, "name"),
                rule("struct_item", UnitKind::Struct, "name"),
                rule("trait_item", UnitKind::Protocol, "name"),
                rule("mod_item", UnitKind::Module, "name"),
            ],
        }),
        "Python" => Some(LanguageSpec {
            language: || tree_sitter_python::LANGUAGE.into(),
            rules: &[
                rule_within("function_definition", UnitKind::Method, "name", "class_definition"),
                rule("function_definition", UnitKind::Function, "name"),
                rule("class_definition", UnitKind::Class, "name"),
            ],
        }),
        "JavaScript" => Some(LanguageSpec {
            language: || tree_sitter_javascript::LANGUAGE.into(),
            rules: &[
                rule("method_definition", UnitKind::Method, "name"),
                rule("function_declaration", UnitKind::Function, "name"),
                rule("class_declaration", UnitKind::Class, "name"),
            ],
        }),
        "TypeScript" => Some(LanguageSpec {
            language: || tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            rules: &[
                rule("method_definition", UnitKind::Method, "name"),
                rule("function_declaration", UnitKind::Function, "name"),
                rule("class_declaration", UnitKind::Class, "name"),
                rule("interface_declaration", UnitKind::Protocol, "name"),
            ],
        }),
        "Go" => Some(LanguageSpec {
            language: || tree_sitter_go::LANGUAGE.into(),
            rules: &[
                rule("method_declaration", UnitKind::Method, "name"),
                rule("function_declaration", UnitKind::Function, "name"),
                rule("type_spec", UnitKind::Struct, "name"),
            ],
        }),
        "Java" => Some(LanguageSpec {
            language: || tree_sitter_java::LANGUAGE.into(),
            rules: &[
                rule("method_declaration", UnitKind::Method, "name"),
                rule("class_declaration", UnitKind::Class, "name"),
                rule("interface_declaration", UnitKind::Protocol, "name"),
            ],
        }),
        "Ruby" => Some(LanguageSpec {
            language: || tree_sitter_ruby::LANGUAGE.into(),
            // Only instance methods (`method` node) are extracted; singleton
            // methods (`def self.foo`) are a documented parser limit, not a
            // bug (spec.md §4.6).
            rules: &[
                rule("method", UnitKind::Method, "name"),
                rule("class", UnitKind::Class, "name"),
            ],
        }),
        "Php" => Some(LanguageSpec {
            language: || tree_sitter_php::LANGUAGE_PHP.into(),
            rules: &[
                rule_within("method_declaration", UnitKind::Method, "name", "class_declaration"),
                rule("function_definition", UnitKind::Function, "name"),
                rule("class_declaration", UnitKind::Class, "name"),
            ],
        }),
        "Swift" => Some(LanguageSpec {
            language: || tree_sitter_swift::LANGUAGE.into(),
            // Swift extracts protocol/struct/class only; free functions are
            // a documented parser limit (spec.md §4.6), so no rule targets
            // `function_declaration` here.
            rules: &[
                rule("class_declaration", UnitKind::Class, "name"),
                rule("protocol_declaration", UnitKind::Protocol, "name"),
                rule("struct_declaration", UnitKind::Struct, "name"),
            ],
        }),
        "Kotlin" => Some(LanguageSpec {
            language: || tree_sitter_kotlin_ng::LANGUAGE.into(),
            rules: &[
                rule_within("function_declaration", UnitKind::Method, "name", "class_body"),
                rule("function_declaration", UnitKind::Function, "name"),
                rule("class_declaration", UnitKind::Class, "name"),
            ],
        }),
        "C" => Some(LanguageSpec {
            language: || tree_sitter_c::LANGUAGE.into(),
            rules: &[
                rule("function_definition", UnitKind::Function, "declarator"),
                rule("struct_specifier", UnitKind::Struct, "name"),
            ],
        }),
        "Cpp" => Some(LanguageSpec {
            language: || tree_sitter_cpp::LANGUAGE.into(),
            rules: &[
                rule("function_definition", UnitKind::Function, "declarator"),
                rule("class_specifier", UnitKind::Class, "name"),
                rule("struct_specifier", UnitKind::Struct, "name"),
            ],
        }),
        "CSharp" => Some(LanguageSpec {
            language: || tree_sitter_c_sharp::LANGUAGE.into(),
            rules: &[
                rule("method_declaration", UnitKind::Method, "name"),
                rule("class_declaration", UnitKind::Class, "name"),
                rule("interface_declaration", UnitKind::Protocol, "name"),
            ],
        }),
        _ => None,
    }
}
