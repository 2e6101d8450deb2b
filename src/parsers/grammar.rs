//! Per-language node-kind tables
//!
//! Each supported language is described by one static [`GrammarSpec`].
//! The generic walker in `walker.rs` reads these tables; no language gets
//! its own traversal code.

/// Node kinds and lexical conventions for one tree-sitter grammar
#[derive(Debug)]
pub struct GrammarSpec {
    /// Named function/method definitions
    pub function_kinds: &'static [&'static str],
    /// Function expressions that only count as definitions when bound to a
    /// name (`const f = () => {}`); otherwise they belong to the enclosing function
    pub anonymous_function_kinds: &'static [&'static str],
    /// Class-like type definitions
    pub class_kinds: &'static [&'static str],
    /// Blocks that scope methods to a type without defining it (Rust `impl`)
    pub impl_kinds: &'static [&'static str],
    /// Import-like statements, interpreted by `imports.rs`
    pub import_kinds: &'static [&'static str],
    /// Branches and loops: +1 cyclomatic, +1 plus nesting cognitive, open a nesting level
    pub nesting_branches: &'static [&'static str],
    /// Case arms and chained conditions: +1 cyclomatic, +1 cognitive
    pub flat_branches: &'static [&'static str],
    /// `if` kinds whose `alternative` may be another `if` (an `else if`)
    pub if_kinds: &'static [&'static str],
    /// `else` arms: +1 cognitive only
    pub else_kinds: &'static [&'static str],
    /// Structures that open a nesting level without scoring (switch/match bodies)
    pub nesting_only: &'static [&'static str],
    /// Node kinds that are themselves short-circuit boolean operators
    pub boolean_kinds: &'static [&'static str],
    /// Binary expression kinds whose operator child decides if they short-circuit
    pub binary_kinds: &'static [&'static str],
    pub boolean_operators: &'static [&'static str],
    /// Prefixes that start a comment line
    pub line_comments: &'static [&'static str],
    /// Block comment delimiters
    pub block_comment: Option<(&'static str, &'static str)>,
}

impl GrammarSpec {
    pub fn is_function(&self, kind: &str) -> bool {
        self.function_kinds.contains(&kind)
    }

    pub fn is_class(&self, kind: &str) -> bool {
        self.class_kinds.contains(&kind)
    }
}

pub static PYTHON: GrammarSpec = GrammarSpec {
    function_kinds: &["function_definition"],
    anonymous_function_kinds: &[],
    class_kinds: &["class_definition"],
    impl_kinds: &[],
    import_kinds: &["import_statement", "import_from_statement"],
    nesting_branches: &[
        "if_statement",
        "for_statement",
        "while_statement",
        "except_clause",
        "conditional_expression",
    ],
    flat_branches: &["elif_clause", "case_clause", "if_clause"],
    if_kinds: &["if_statement"],
    else_kinds: &["else_clause"],
    nesting_only: &["match_statement"],
    boolean_kinds: &["boolean_operator"],
    binary_kinds: &[],
    boolean_operators: &[],
    line_comments: &["#"],
    block_comment: Some(("\"\"\"", "\"\"\"")),
};

const JS_FUNCTIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "method_definition",
];

const JS_ANONYMOUS: &[&str] = &["arrow_function", "function_expression", "generator_function"];

const JS_NESTING: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "catch_clause",
    "ternary_expression",
];

pub static JAVASCRIPT: GrammarSpec = GrammarSpec {
    function_kinds: JS_FUNCTIONS,
    anonymous_function_kinds: JS_ANONYMOUS,
    class_kinds: &["class_declaration", "class"],
    impl_kinds: &[],
    import_kinds: &["import_statement", "export_statement", "call_expression"],
    nesting_branches: JS_NESTING,
    flat_branches: &["switch_case"],
    if_kinds: &["if_statement"],
    else_kinds: &["else_clause"],
    nesting_only: &["switch_statement"],
    boolean_kinds: &[],
    binary_kinds: &["binary_expression"],
    boolean_operators: &["&&", "||", "??"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
};

pub static TYPESCRIPT: GrammarSpec = GrammarSpec {
    function_kinds: JS_FUNCTIONS,
    anonymous_function_kinds: JS_ANONYMOUS,
    class_kinds: &[
        "class_declaration",
        "abstract_class_declaration",
        "class",
        "interface_declaration",
    ],
    impl_kinds: &[],
    import_kinds: &["import_statement", "export_statement", "call_expression"],
    nesting_branches: JS_NESTING,
    flat_branches: &["switch_case"],
    if_kinds: &["if_statement"],
    else_kinds: &["else_clause"],
    nesting_only: &["switch_statement"],
    boolean_kinds: &[],
    binary_kinds: &["binary_expression"],
    boolean_operators: &["&&", "||", "??"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
};

pub static RUST: GrammarSpec = GrammarSpec {
    function_kinds: &["function_item"],
    anonymous_function_kinds: &[],
    class_kinds: &["struct_item", "enum_item", "trait_item", "union_item"],
    impl_kinds: &["impl_item"],
    import_kinds: &["use_declaration", "mod_item"],
    nesting_branches: &[
        "if_expression",
        "for_expression",
        "while_expression",
        "loop_expression",
    ],
    flat_branches: &["match_arm"],
    if_kinds: &["if_expression"],
    else_kinds: &["else_clause"],
    nesting_only: &["match_expression", "closure_expression"],
    boolean_kinds: &[],
    binary_kinds: &["binary_expression"],
    boolean_operators: &["&&", "||"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
};

pub static GO: GrammarSpec = GrammarSpec {
    function_kinds: &["function_declaration", "method_declaration"],
    anonymous_function_kinds: &[],
    class_kinds: &["type_spec"],
    impl_kinds: &[],
    import_kinds: &["import_declaration"],
    nesting_branches: &["if_statement", "for_statement"],
    flat_branches: &["expression_case", "type_case", "communication_case"],
    if_kinds: &["if_statement"],
    else_kinds: &[],
    nesting_only: &[
        "expression_switch_statement",
        "type_switch_statement",
        "select_statement",
        "func_literal",
    ],
    boolean_kinds: &[],
    binary_kinds: &["binary_expression"],
    boolean_operators: &["&&", "||"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
};

pub static JAVA: GrammarSpec = GrammarSpec {
    function_kinds: &["method_declaration", "constructor_declaration"],
    anonymous_function_kinds: &[],
    class_kinds: &[
        "class_declaration",
        "interface_declaration",
        "enum_declaration",
        "record_declaration",
    ],
    impl_kinds: &[],
    import_kinds: &["import_declaration"],
    nesting_branches: &[
        "if_statement",
        "for_statement",
        "enhanced_for_statement",
        "while_statement",
        "do_statement",
        "catch_clause",
        "ternary_expression",
    ],
    flat_branches: &["switch_block_statement_group", "switch_rule"],
    if_kinds: &["if_statement"],
    else_kinds: &[],
    nesting_only: &["switch_expression", "lambda_expression"],
    boolean_kinds: &[],
    binary_kinds: &["binary_expression"],
    boolean_operators: &["&&", "||"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
};
