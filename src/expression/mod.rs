//! Template expressions.
//!
//! Expressions are JavaScript-like: literals, names resolved through the scope
//! chain, member and index access, calls to scope functions and a safelisted
//! set of value methods, arithmetic, comparison, logical and ternary operators,
//! plus array and object literals. Event handlers use the statement grammar,
//! which adds assignments (`=`, `+=`, ...) and `++`/`--`.
//!
//! Compilation is cached process-wide per source string, failures included.
//! Evaluation never fails outward: [`evaluate`] logs and yields `null`.
//!
//! # Usage
//!
//! ```ignore
//! let scope = Scope::standalone(None);
//! scope.set("user", json!({"name": "Ada", "tags": ["x"]}));
//!
//! assert_eq!(evaluate("user.name.toUpperCase()", scope), json!("ADA"));
//! assert_eq!(evaluate("user.tags.length > 0 ? 'tagged' : 'none'", scope), json!("tagged"));
//! assert_eq!(evaluate("user.missing.deep", scope), Value::Null);
//!
//! execute("user.name = 'Grace'; visits += 1", scope, None)?;
//! ```

mod eval;
mod lexer;
mod parser;

use std::sync::{Arc, LazyLock};

use papaya::HashMap as PapayaHashMap;
use serde_json::{Map, Value};

use crate::error::ExprError;
use crate::hash::FastIndexSet;
use crate::scope::Scope;
use crate::value::to_display;
use eval::Env;
use parser::{Expr, Statement};

/// Compiled expressions keyed by source text.
static EXPRESSIONS: LazyLock<PapayaHashMap<String, Arc<CompiledExpression>>> =
    LazyLock::new(PapayaHashMap::new);

/// Compiled statement lists keyed by source text.
static PROGRAMS: LazyLock<PapayaHashMap<String, Arc<CompiledProgram>>> =
    LazyLock::new(PapayaHashMap::new);

/// An expression compiled once and shared by every evaluation of its source.
#[derive(Debug)]
pub struct CompiledExpression {
    source: String,
    ast: Result<Expr, ExprError>,
    paths: Vec<String>,
}

impl CompiledExpression {
    fn new(source: &str) -> Self {
        let ast = parser::parse_expression(source);
        let paths = match &ast {
            Ok(expr) => {
                let mut paths = FastIndexSet::default();
                collect_paths(expr, &mut paths);
                paths.into_iter().collect()
            }
            Err(_) => Vec::new(),
        };
        Self {
            source: source.to_owned(),
            ast,
            paths,
        }
    }

    /// The source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The compile error, if compilation failed.
    pub fn error(&self) -> Option<&ExprError> {
        self.ast.as_ref().err()
    }

    /// Dotted dependency paths read by the expression, every prefix of a
    /// member chain included (`user.name` yields `user` and `user.name`).
    pub fn dependency_paths(&self) -> &[String] {
        &self.paths
    }

    /// Evaluate against a scope, with optional extra locals that shadow the
    /// scope (for instance `$event`).
    pub fn evaluate(&self, scope: Scope, locals: &Map<String, Value>) -> Result<Value, ExprError> {
        let expr = self.ast.as_ref().map_err(Clone::clone)?;
        eval::evaluate(expr, &Env::new(scope, locals))
    }
}

#[derive(Debug)]
struct CompiledProgram {
    statements: Result<Vec<Statement>, ExprError>,
}

/// Compile (or fetch from the cache) an expression.
pub fn compile(source: &str) -> Arc<CompiledExpression> {
    let cache = EXPRESSIONS.pin();
    if let Some(hit) = cache.get(source) {
        cov_mark::hit!(expression_cache_hit);
        return hit.clone();
    }
    let compiled = Arc::new(CompiledExpression::new(source));
    if let Some(error) = compiled.error() {
        tracing::warn!(target: "bindery::expression", expression = source, %error, "failed to compile expression");
    }
    cache.get_or_insert(source.to_owned(), compiled).clone()
}

fn compile_program(source: &str) -> Arc<CompiledProgram> {
    let cache = PROGRAMS.pin();
    if let Some(hit) = cache.get(source) {
        return hit.clone();
    }
    let program = Arc::new(CompiledProgram {
        statements: parser::parse_statements(source),
    });
    if let Err(error) = &program.statements {
        tracing::warn!(target: "bindery::expression", statement = source, %error, "failed to compile statement");
    }
    cache.get_or_insert(source.to_owned(), program).clone()
}

/// Evaluate, reporting errors to the caller.
pub fn try_evaluate(source: &str, scope: Scope) -> Result<Value, ExprError> {
    compile(source).evaluate(scope, &Map::new())
}

/// Evaluate an expression. Failures are logged and yield `null`.
pub fn evaluate(source: &str, scope: Scope) -> Value {
    evaluate_with(source, scope, &Map::new())
}

/// Evaluate with extra locals shadowing the scope. Failures are logged and
/// yield `null`.
pub fn evaluate_with(source: &str, scope: Scope, locals: &Map<String, Value>) -> Value {
    let compiled = compile(source);
    if compiled.error().is_some() {
        // already reported when compiled
        return Value::Null;
    }
    compiled.evaluate(scope, locals).unwrap_or_else(|error| {
        tracing::warn!(target: "bindery::expression", expression = source, %error, "expression evaluation failed");
        Value::Null
    })
}

/// Run handler statements against a scope.
///
/// `event` is visible to the statements as `$event` without ever being
/// written into the scope. Statements run in order; the first failing one
/// stops the rest.
pub fn execute(source: &str, scope: Scope, event: Option<Value>) -> Result<(), ExprError> {
    execute_tracked(source, scope, event).1
}

/// Like [`execute`], also returning every scope the statements assigned to,
/// including those written before a failing statement.
pub(crate) fn execute_tracked(
    source: &str,
    scope: Scope,
    event: Option<Value>,
) -> (Vec<Scope>, Result<(), ExprError>) {
    let program = compile_program(source);
    let statements = match program.statements.as_ref() {
        Ok(statements) => statements,
        Err(error) => return (Vec::new(), Err(error.clone())),
    };
    let mut locals = Map::new();
    if let Some(event) = event {
        locals.insert("$event".to_owned(), event);
    }
    let env = Env::new(scope, &locals);
    let result = statements
        .iter()
        .try_for_each(|statement| eval::execute(statement, &env));
    (env.written.into_inner(), result)
}

/// Dependency paths of an expression; empty if it does not compile.
pub fn dependency_paths(source: &str) -> Vec<String> {
    compile(source).dependency_paths().to_vec()
}

fn member_path(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident(name) => Some(name.clone()),
        Expr::Member(base, name) => member_path(base).map(|path| format!("{path}.{name}")),
        Expr::Index(base, index) => match &**index {
            Expr::Literal(key @ (Value::Number(_) | Value::String(_))) => {
                member_path(base).map(|path| format!("{path}.{}", to_display(key)))
            }
            _ => None,
        },
        _ => None,
    }
}

fn collect_paths(expr: &Expr, out: &mut FastIndexSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Ident(_) | Expr::Member(..) | Expr::Index(..) => {
            if let Some(path) = member_path(expr) {
                let mut prefix = String::new();
                for segment in path.split('.') {
                    if !prefix.is_empty() {
                        prefix.push('.');
                    }
                    prefix.push_str(segment);
                    out.insert(prefix.clone());
                }
            } else if let Expr::Member(base, _) = expr {
                collect_paths(base, out);
            }
            if let Expr::Index(base, index) = expr {
                if member_path(expr).is_none() {
                    collect_paths(base, out);
                }
                collect_paths(index, out);
            }
        }
        Expr::Call(callee, args) => {
            match &**callee {
                Expr::Ident(_) => {}
                Expr::Member(base, _) => collect_paths(base, out),
                other => collect_paths(other, out),
            }
            for arg in args {
                collect_paths(arg, out);
            }
        }
        Expr::Unary(_, inner) => collect_paths(inner, out),
        Expr::Binary(_, left, right) | Expr::Logical(_, left, right) => {
            collect_paths(left, out);
            collect_paths(right, out);
        }
        Expr::Conditional(condition, then, otherwise) => {
            collect_paths(condition, out);
            collect_paths(then, out);
            collect_paths(otherwise, out);
        }
        Expr::Array(items) => items.iter().for_each(|item| collect_paths(item, out)),
        Expr::Object(entries) => entries
            .iter()
            .for_each(|(_, entry)| collect_paths(entry, out)),
    }
}

/// A `key: expression` pair from an object-literal-like attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// The key, quotes removed.
    pub key: String,
    /// The expression text, trimmed.
    pub expression: String,
}

/// Shape of a directive attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpressionShape {
    /// A plain expression.
    Simple(String),
    /// A top-level ternary expression.
    Ternary(String),
    /// Object-literal-like `key: expression` pairs, braces optional.
    Object(Vec<Binding>),
}

/// Split `text` at top-level occurrences of `separator`, ignoring separators
/// inside quotes and brackets.
fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Byte offset of the bracket closing the one that opens `text`.
fn closing_bracket(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_braces(text: &str) -> &str {
    let trimmed = text.trim();
    // `{a} + {b}` is not a single brace group
    if trimmed.starts_with('{') && closing_bracket(trimmed) == Some(trimmed.len() - 1) {
        return &trimmed[1..trimmed.len() - 1];
    }
    trimmed
}

fn split_pair(part: &str) -> Option<Binding> {
    // a `?` before the first top-level `:` means the colon belongs to a ternary
    let colon_pieces = split_top_level(part, ':');
    if colon_pieces.len() < 2 {
        return None;
    }
    let key = colon_pieces[0].trim();
    if key.is_empty() || key.contains('?') {
        return None;
    }
    let expression = part[colon_pieces[0].len() + 1..].trim();
    Some(Binding {
        key: key.trim_matches(['\'', '"']).to_owned(),
        expression: expression.to_owned(),
    })
}

/// Split object-literal-like text (`a: x, 'b-c': y ? 1 : 2`) into pairs.
///
/// Returns an empty list if any top-level part is not a `key: expression`
/// pair.
pub fn parse_bindings(text: &str) -> Vec<Binding> {
    let inner = strip_braces(text);
    let parts: Vec<_> = split_top_level(inner, ',')
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect();
    let pairs: Option<Vec<_>> = parts.iter().map(|part| split_pair(part)).collect();
    pairs.unwrap_or_default()
}

/// Classify a directive attribute value.
pub fn classify(text: &str) -> ExpressionShape {
    let pairs = parse_bindings(text);
    if !pairs.is_empty() {
        return ExpressionShape::Object(pairs);
    }
    let trimmed = text.trim();
    if split_top_level(trimmed, '?').len() > 1 {
        ExpressionShape::Ternary(trimmed.to_owned())
    } else {
        ExpressionShape::Simple(trimmed.to_owned())
    }
}

/// Piece of a text with `{{ }}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Literal(String),
    /// Placeholder expression, trimmed.
    Expression(String),
}

/// Whether `text` contains a `{{ }}` placeholder.
pub fn has_interpolation(text: &str) -> bool {
    parse_interpolation(text)
        .iter()
        .any(|segment| matches!(segment, Segment::Expression(_)))
}

/// Split `text` into literal and placeholder segments. An unclosed `{{` is
/// kept as literal text.
pub fn parse_interpolation(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_owned()));
        }
        let expression = rest[open + 2..open + 2 + close].trim();
        segments.push(Segment::Expression(expression.to_owned()));
        rest = &rest[open + 2 + close + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_owned()));
    }
    segments
}

/// Render placeholder text against a scope.
pub fn interpolate(text: &str, scope: Scope) -> String {
    render_segments(&parse_interpolation(text), scope)
}

pub(crate) fn render_segments(segments: &[Segment], scope: Scope) -> String {
    segments
        .iter()
        .map(|segment| match segment {
            Segment::Literal(text) => text.clone(),
            Segment::Expression(expression) => to_display(&evaluate(expression, scope)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope_with(vars: Value) -> Scope {
        let scope = Scope::standalone(None);
        if let Value::Object(vars) = vars {
            for (key, value) in vars {
                scope.set(&key, value);
            }
        }
        scope
    }

    #[test]
    fn evaluates_member_chains_and_tolerates_missing_properties() {
        let scope = scope_with(json!({"user": {"name": "Ada", "tags": ["a", "b"]}}));
        assert_eq!(evaluate("user.name", scope), json!("Ada"));
        assert_eq!(evaluate("user.tags[1]", scope), json!("b"));
        assert_eq!(evaluate("user.tags.length", scope), json!(2));
        assert_eq!(evaluate("user.address.city", scope), Value::Null);
        assert_eq!(evaluate("nobody", scope), Value::Null);
    }

    #[test]
    fn operators() {
        let scope = scope_with(json!({"a": 2, "b": "3", "s": "x"}));
        assert_eq!(evaluate("a * 3 + 1", scope), json!(7));
        assert_eq!(evaluate("a + b", scope), json!("23"));
        assert_eq!(evaluate("a == b - 1", scope), json!(true));
        assert_eq!(evaluate("a === 2.0", scope), json!(true));
        assert_eq!(evaluate("a !== '2'", scope), json!(true));
        assert_eq!(evaluate("missing || 'fallback'", scope), json!("fallback"));
        assert_eq!(evaluate("s && a", scope), json!(2));
        assert_eq!(evaluate("missing ?? 0", scope), json!(0));
        assert_eq!(evaluate("!missing", scope), json!(true));
        assert_eq!(evaluate("a > 1 ? 'big' : 'small'", scope), json!("big"));
        assert_eq!(evaluate("[a, {k: s}]", scope), json!([2, {"k": "x"}]));
        assert_eq!(evaluate("7 % 4", scope), json!(3));
    }

    #[test]
    fn calls_scope_functions_and_value_methods() {
        let parent = scope_with(json!({}));
        parent.define_fn("greet", |scope, args| {
            json!(format!("{} {}", to_display(&scope.get("greeting")), to_display(&args[0])))
        });
        let scope = Scope::standalone(Some(parent));
        scope.set("greeting", "hi");
        scope.set("items", json!([1, 2, 3]));

        assert_eq!(evaluate("greet('Ada')", scope), json!("hi Ada"));
        assert_eq!(evaluate("$parent.greet('Ada')", scope), json!(" Ada"));
        assert_eq!(evaluate("items.includes(2)", scope), json!(true));
        assert_eq!(evaluate("items.indexOf(5)", scope), json!(-1));
        assert_eq!(evaluate("items.join('-')", scope), json!("1-2-3"));
        assert_eq!(evaluate("' Ada '.trim().toLowerCase()", scope), json!("ada"));
        assert_eq!(evaluate("(2.5).toFixed(2)", scope), json!("2.50"));
    }

    #[test]
    fn failures_yield_null() {
        let scope = scope_with(json!({"x": 1}));
        scope.define_fn("explode", |_, _| panic!("scope function failed"));
        assert_eq!(evaluate("x +", scope), Value::Null);
        assert_eq!(evaluate("notAFunction()", scope), Value::Null);
        assert_eq!(evaluate("explode()", scope), Value::Null);
        assert_eq!(
            try_evaluate("explode()", scope),
            Err(ExprError::CallPanicked {
                name: "explode".into()
            })
        );
        assert_eq!(evaluate("x.push(1)", scope), Value::Null);
    }

    #[test]
    fn compile_cache_is_shared() {
        cov_mark::check!(expression_cache_hit);
        let first = compile("cache_probe.value + 1");
        let second = compile("cache_probe.value + 1");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn dependency_paths_include_every_prefix() {
        assert_eq!(
            dependency_paths("user.address.city + count"),
            vec!["user", "user.address", "user.address.city", "count"]
        );
        assert_eq!(
            dependency_paths("format(item.price, currency)"),
            vec!["item", "item.price", "currency"]
        );
        assert_eq!(dependency_paths("items[0].name"), vec!["items", "items.0", "items.0.name"]);
        assert_eq!(dependency_paths("items[idx]"), vec!["items", "idx"]);
        assert!(dependency_paths("(").is_empty());
    }

    #[test]
    fn statements_write_local_owner_and_parent_scopes() {
        let parent = scope_with(json!({"user": {"name": "Ada"}, "total": 1}));
        let scope = Scope::standalone(Some(parent));

        execute("count = 1; count += 2; count++", scope, None).unwrap();
        assert_eq!(scope.get_own("count"), Some(json!(4)));

        execute("user.name = 'Grace'", scope, None).unwrap();
        assert_eq!(parent.lookup_path("user.name"), json!("Grace"));
        assert!(!scope.has_own("user"));

        execute("$parent.total = total + 10", scope, None).unwrap();
        assert_eq!(parent.get("total"), json!(11));

        execute("last = $event.type", scope, Some(json!({"type": "click"}))).unwrap();
        assert_eq!(scope.get("last"), json!("click"));
        assert!(!scope.has("$event"));

        assert_eq!(
            execute("$event = 1", scope, Some(json!({}))),
            Err(ExprError::InvalidAssignmentTarget)
        );
    }

    #[test]
    fn bindings_split_only_top_level_pairs() {
        assert_eq!(
            parse_bindings("active: isOn, 'text-bold': n > 1 ? a : b, list: f(a, b)"),
            vec![
                Binding { key: "active".into(), expression: "isOn".into() },
                Binding { key: "text-bold".into(), expression: "n > 1 ? a : b".into() },
                Binding { key: "list".into(), expression: "f(a, b)".into() },
            ]
        );
        assert_eq!(parse_bindings("{ color: c }").len(), 1);
        assert!(parse_bindings("flag ? 'a' : 'b'").is_empty());
        assert_eq!(classify("flag ? 'a' : 'b'"), ExpressionShape::Ternary("flag ? 'a' : 'b'".into()));
        assert_eq!(classify("classes"), ExpressionShape::Simple("classes".into()));
        assert!(matches!(classify("{a: 1}"), ExpressionShape::Object(_)));
    }

    #[test]
    fn interpolation_segments() {
        assert_eq!(
            parse_interpolation("Hello {{ user.name }}! {{ count }}"),
            vec![
                Segment::Literal("Hello ".into()),
                Segment::Expression("user.name".into()),
                Segment::Literal("! ".into()),
                Segment::Expression("count".into()),
            ]
        );
        assert_eq!(
            parse_interpolation("open {{ never closed"),
            vec![Segment::Literal("open {{ never closed".into())]
        );
        let scope = scope_with(json!({"n": 3, "obj": {"a": 1}}));
        assert_eq!(interpolate("{{n}} items {{missing}}{{obj}}", scope), r#"3 items {"a":1}"#);
        assert!(has_interpolation("a {{b}}"));
        assert!(!has_interpolation("plain"));
    }
}
