//! Import target extraction
//!
//! Turns an import-like node into the raw target strings written in the
//! source. Resolution against the file set happens later, in the
//! architecture analyzer.

use super::Language;
use tree_sitter::Node;

/// Raw targets named by an import node. Empty when the node is not an import
/// (e.g. a JavaScript call that is not `require`).
pub(super) fn targets(lang: Language, node: &Node, source: &[u8]) -> Vec<String> {
    match lang {
        Language::Python => python_targets(node, source),
        Language::JavaScript | Language::TypeScript => js_targets(node, source),
        Language::Rust => rust_targets(node, source),
        Language::Go => go_targets(node, source),
        Language::Java => java_targets(node, source),
    }
}

fn text<'s>(node: &Node, source: &'s [u8]) -> &'s str {
    node.utf8_text(source).unwrap_or("")
}

fn unquote(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn python_targets(node: &Node, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.children_by_field_name("name", &mut cursor) {
                let module = match child.kind() {
                    "aliased_import" => child
                        .child_by_field_name("name")
                        .map(|n| text(&n, source))
                        .unwrap_or(""),
                    _ => text(&child, source),
                };
                if !module.is_empty() {
                    out.push(module.to_string());
                }
            }
        }
        "import_from_statement" => {
            let Some(module) = node.child_by_field_name("module_name") else {
                return out;
            };
            let module = text(&module, source);
            // `from pkg import mod` may name a submodule; the resolver falls
            // back to `pkg` when `pkg.mod` is not a module
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let name = match name.kind() {
                    "aliased_import" => name
                        .child_by_field_name("name")
                        .map(|n| text(&n, source))
                        .unwrap_or(""),
                    _ => text(&name, source),
                };
                if name.is_empty() {
                    continue;
                }
                if module.ends_with('.') {
                    out.push(format!("{}{}", module, name));
                } else {
                    out.push(format!("{}.{}", module, name));
                }
            }
            if out.is_empty() && !module.chars().all(|c| c == '.') {
                out.push(module.to_string());
            }
        }
        _ => {}
    }
    out
}

fn js_targets(node: &Node, source: &[u8]) -> Vec<String> {
    match node.kind() {
        "import_statement" | "export_statement" => node
            .child_by_field_name("source")
            .map(|s| vec![unquote(text(&s, source))])
            .unwrap_or_default(),
        "call_expression" => {
            let is_require = node
                .child_by_field_name("function")
                .map(|f| matches!(text(&f, source), "require" | "import"))
                .unwrap_or(false);
            if !is_require {
                return Vec::new();
            }
            let Some(args) = node.child_by_field_name("arguments") else {
                return Vec::new();
            };
            let mut cursor = args.walk();
            let first = args.named_children(&mut cursor).next();
            match first {
                Some(arg) if arg.kind() == "string" => vec![unquote(text(&arg, source))],
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

fn rust_targets(node: &Node, source: &[u8]) -> Vec<String> {
    match node.kind() {
        "use_declaration" => node
            .child_by_field_name("argument")
            .map(|a| vec![text(&a, source).to_string()])
            .unwrap_or_default(),
        // `mod foo;` pulls in a sibling file; `mod foo { .. }` is inline
        "mod_item" if node.child_by_field_name("body").is_none() => node
            .child_by_field_name("name")
            .map(|n| vec![format!("mod {}", text(&n, source))])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn go_targets(node: &Node, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![*node];
    while let Some(current) = stack.pop() {
        if current.kind() == "import_spec" {
            if let Some(path) = current.child_by_field_name("path") {
                out.push(unquote(text(&path, source)));
            }
            continue;
        }
        let mut cursor = current.walk();
        let children: Vec<Node> = current.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

fn java_targets(node: &Node, source: &[u8]) -> Vec<String> {
    let raw = text(node, source);
    let target = raw
        .trim()
        .trim_start_matches("import")
        .trim()
        .trim_start_matches("static ")
        .trim_end_matches(';')
        .trim();
    if target.is_empty() {
        Vec::new()
    } else {
        vec![target.to_string()]
    }
}
