//! Generic tree walk shared by every language
//!
//! Reads the node-kind tables of a [`GrammarSpec`] to find definitions and
//! imports, and measures each function's cyclomatic and cognitive complexity
//! in a single pass over its body. Nested definitions are measured on their
//! own and do not add to the enclosing function.
//!
//! Both passes walk with an explicit stack, so nesting depth in the source
//! never grows the thread stack, and both give up once the file's
//! [`Deadline`] expires.

use super::grammar::GrammarSpec;
use super::imports;
use super::{ClassDef, Deadline, FunctionDef, ImportRef, Language, StructuralSummary};
use std::cell::Cell;
use tree_sitter::Node;

/// Nodes visited between deadline checks
const DEADLINE_CHECK_INTERVAL: usize = 64;

/// Parent kinds that give a function expression its name
const BINDING_PARENTS: &[(&str, &str)] = &[
    ("variable_declarator", "name"),
    ("public_field_definition", "name"),
    ("field_definition", "property"),
    ("pair", "key"),
    ("assignment_expression", "left"),
];

/// The walk ran past its deadline
#[derive(Debug)]
pub(super) struct Expired;

/// Fraction of source bytes covered by ERROR nodes
pub(super) fn error_ratio(root: &Node, source_len: usize) -> f64 {
    if source_len == 0 {
        return 0.0;
    }
    let mut error_bytes = 0usize;
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            error_bytes += node.end_byte().saturating_sub(node.start_byte());
            continue;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
    }
    (error_bytes as f64 / source_len as f64).min(1.0)
}

/// Walk a parsed tree and fill `summary` with definitions and imports
pub(super) fn walk(
    lang: Language,
    root: &Node,
    source: &[u8],
    summary: &mut StructuralSummary,
    deadline: Deadline<'_>,
) -> Result<(), Expired> {
    let mut walker = Walker {
        lang,
        spec: lang.grammar(),
        source,
        deadline,
        visited: Cell::new(0),
        functions: Vec::new(),
        classes: Vec::new(),
        imports: Vec::new(),
    };
    walker.visit(*root)?;

    let Walker {
        functions,
        mut classes,
        imports,
        ..
    } = walker;

    for class in &mut classes {
        class.method_count = functions
            .iter()
            .filter(|f| f.container.as_deref() == Some(class.name.as_str()))
            .count() as u32;
    }

    summary.functions = functions;
    summary.classes = classes;
    summary.imports = imports;
    Ok(())
}

#[derive(Default)]
struct Complexity {
    cyclomatic: u32,
    cognitive: u32,
    max_nesting: u32,
}

/// A node waiting to be measured, with what it inherits from its parent
struct Pending<'t> {
    node: Node<'t>,
    nesting: u32,
    /// Kind of the parent when the parent is a short-circuit operator
    boolean_parent: Option<&'static str>,
    /// Continues an if/else chain: scored flat, without a nesting level
    else_if: bool,
}

struct Walker<'a> {
    lang: Language,
    spec: &'static GrammarSpec,
    source: &'a [u8],
    deadline: Deadline<'a>,
    visited: Cell<usize>,
    functions: Vec<FunctionDef>,
    classes: Vec<ClassDef>,
    imports: Vec<ImportRef>,
}

impl<'a> Walker<'a> {
    fn tick(&self) -> Result<(), Expired> {
        let visited = self.visited.get();
        self.visited.set(visited + 1);
        if visited % DEADLINE_CHECK_INTERVAL == 0 && self.deadline.expired() {
            return Err(Expired);
        }
        Ok(())
    }

    fn text(&self, node: &Node) -> Option<String> {
        node.utf8_text(self.source).ok().map(|s| s.to_string())
    }

    fn field_text(&self, node: &Node, field: &str) -> Option<String> {
        node.child_by_field_name(field).and_then(|n| self.text(&n))
    }

    /// Pre-order walk collecting definitions and imports.
    ///
    /// Stack entries carry an index into `scopes`, the names of the
    /// enclosing function, class or impl target.
    fn visit(&mut self, root: Node) -> Result<(), Expired> {
        let mut scopes: Vec<String> = Vec::new();
        let mut stack: Vec<(Node, Option<usize>)> = vec![(root, None)];

        while let Some((node, scope)) = stack.pop() {
            self.tick()?;
            let kind = node.kind();

            if self.spec.import_kinds.contains(&kind) {
                let line = node.start_position().row as u32 + 1;
                for target in imports::targets(self.lang, &node, self.source) {
                    self.imports.push(ImportRef { target, line });
                }
            }

            let mut inner_scope = scope;
            if let Some(name) = self.definition_name(&node) {
                let enclosing = scope.map(|i| scopes[i].as_str());
                let def = self.function_def(&node, name, enclosing)?;
                scopes.push(def.name.clone());
                self.functions.push(def);
                inner_scope = Some(scopes.len() - 1);
            } else if self.spec.is_class(kind) {
                if let Some(name) = self.field_text(&node, "name") {
                    self.classes.push(ClassDef {
                        name: name.clone(),
                        line_start: node.start_position().row as u32 + 1,
                        line_end: node.end_position().row as u32 + 1,
                        method_count: 0,
                    });
                    scopes.push(name);
                    inner_scope = Some(scopes.len() - 1);
                }
            } else if self.spec.impl_kinds.contains(&kind) {
                if let Some(target) = self.field_text(&node, "type") {
                    scopes.push(base_type_name(&target));
                    inner_scope = Some(scopes.len() - 1);
                }
            }

            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev().map(|child| (child, inner_scope)));
        }
        Ok(())
    }

    /// Name of the function defined by `node`, if it defines one
    fn definition_name(&self, node: &Node) -> Option<String> {
        let kind = node.kind();
        if self.spec.is_function(kind) {
            return Some(
                self.field_text(node, "name")
                    .unwrap_or_else(|| "<anonymous>".to_string()),
            );
        }
        if self.spec.anonymous_function_kinds.contains(&kind) {
            let parent = node.parent()?;
            let (_, field) = BINDING_PARENTS
                .iter()
                .find(|(parent_kind, _)| *parent_kind == parent.kind())?;
            return self.field_text(&parent, field);
        }
        None
    }

    fn function_def(&self, node: &Node, name: String, scope: Option<&str>) -> Result<FunctionDef, Expired> {
        let container = self
            .receiver_type(node)
            .or_else(|| scope.map(|s| s.to_string()));
        let qualified_name = match &container {
            Some(c) => format!("{}.{}", c, name),
            None => name.clone(),
        };

        let complexity = self.measure(node)?;

        Ok(FunctionDef {
            name,
            qualified_name,
            container,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            parameter_count: self.parameter_count(node),
            cyclomatic: 1 + complexity.cyclomatic,
            cognitive: complexity.cognitive,
            max_nesting: complexity.max_nesting,
        })
    }

    /// Go methods belong to their receiver type
    fn receiver_type(&self, node: &Node) -> Option<String> {
        if self.lang != Language::Go || node.kind() != "method_declaration" {
            return None;
        }
        let receiver = self.field_text(node, "receiver")?;
        let last = receiver
            .trim_matches(|c| c == '(' || c == ')')
            .split_whitespace()
            .last()?
            .trim_start_matches('*')
            .to_string();
        let name = base_type_name(&last);
        (!name.is_empty()).then_some(name)
    }

    fn parameter_count(&self, node: &Node) -> u32 {
        let params = match node
            .child_by_field_name("parameters")
            .or_else(|| node.child_by_field_name("parameter"))
        {
            Some(p) => p,
            None => return 0,
        };
        if params.kind() == "identifier" {
            return 1;
        }

        let mut cursor = params.walk();
        let mut count = 0;
        for child in params.named_children(&mut cursor) {
            match child.kind() {
                "comment" | "self_parameter" => {}
                "parameter_declaration" => {
                    let mut inner = child.walk();
                    let names = child.children_by_field_name("name", &mut inner).count();
                    count += names.max(1) as u32;
                }
                _ => {
                    let text = child.utf8_text(self.source).unwrap_or("");
                    if text != "self" && text != "cls" {
                        count += 1;
                    }
                }
            }
        }
        count
    }

    fn is_boolean(&self, node: &Node) -> bool {
        let kind = node.kind();
        if self.spec.boolean_kinds.contains(&kind) {
            return true;
        }
        if !self.spec.binary_kinds.contains(&kind) {
            return false;
        }
        node.child_by_field_name("operator")
            .map(|op| self.spec.boolean_operators.contains(&op.kind()))
            .unwrap_or(false)
    }

    /// The `if` that continues an if/else chain from `node`: an if's
    /// `alternative` that is itself an if, or the sole content of an `else`
    fn chained_if<'t>(&self, node: &Node<'t>) -> Option<Node<'t>> {
        let kind = node.kind();
        let candidate = if self.spec.if_kinds.contains(&kind) {
            node.child_by_field_name("alternative")?
        } else if self.spec.else_kinds.contains(&kind) && node.named_child_count() == 1 {
            node.named_child(0)?
        } else {
            return None;
        };
        self.spec
            .if_kinds
            .contains(&candidate.kind())
            .then_some(candidate)
    }

    fn push_children<'t>(&self, node: &Node<'t>, nesting: u32, stack: &mut Vec<Pending<'t>>) {
        let boolean_parent = self.is_boolean(node).then(|| node.kind());
        let chained = self.chained_if(node);
        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev().map(|child| Pending {
            node: child,
            nesting,
            boolean_parent,
            else_if: chained == Some(child),
        }));
    }

    fn measure(&self, function: &Node) -> Result<Complexity, Expired> {
        let mut acc = Complexity::default();
        let mut stack = Vec::new();
        self.push_children(function, 0, &mut stack);

        while let Some(Pending {
            node,
            nesting,
            boolean_parent,
            else_if,
        }) = stack.pop()
        {
            self.tick()?;
            let kind = node.kind();

            if self.definition_name(&node).is_some() {
                continue;
            }

            let inner = if else_if {
                acc.cyclomatic += 1;
                acc.cognitive += 1;
                nesting
            } else if self.spec.nesting_branches.contains(&kind) {
                acc.cyclomatic += 1;
                acc.cognitive += 1 + nesting;
                acc.max_nesting = acc.max_nesting.max(nesting + 1);
                nesting + 1
            } else if self.spec.flat_branches.contains(&kind) {
                acc.cyclomatic += 1;
                acc.cognitive += 1;
                nesting
            } else if self.spec.else_kinds.contains(&kind) {
                // an `else if` is scored once, by the if
                if self.chained_if(&node).is_none() {
                    acc.cognitive += 1;
                }
                nesting
            } else if self.spec.nesting_only.contains(&kind) {
                acc.max_nesting = acc.max_nesting.max(nesting + 1);
                nesting + 1
            } else if self.is_boolean(&node) {
                acc.cyclomatic += 1;
                // a run of the same operator counts once
                if boolean_parent != Some(kind) {
                    acc.cognitive += 1;
                }
                nesting
            } else {
                nesting
            };

            self.push_children(&node, inner, &mut stack);
        }
        Ok(acc)
    }
}

/// `Vec<T>` -> `Vec`, `pkg.Type[T]` -> `pkg.Type`
fn base_type_name(raw: &str) -> String {
    raw.split(['<', '['])
        .next()
        .unwrap_or(raw)
        .trim()
        .to_string()
}
