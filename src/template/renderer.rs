//! Template evaluation against a variable scope.
//!
//! Nodes from the parser render into a string. The scope is an ordered map
//! of JSON values and stays immutable during rendering; loops bind their
//! variable in a per-iteration copy.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::TemplateError;
use crate::template::parser::{CompareOp, Expr, Node};

/// Variables visible to a template.
pub type Scope = IndexMap<String, Value>;

/// Cap for `@while` bodies. The scope never changes during a render, so a
/// condition that starts true stays true; the cap turns that into an error
/// instead of a hang.
pub const MAX_LOOP_ITERATIONS: usize = 10_000;

/// Render a parsed node list against a scope.
pub fn render_nodes(nodes: &[Node], scope: &Scope) -> Result<String, TemplateError> {
    let mut out = String::new();

    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output { expr, escaped } => {
                let value = evaluate(expr, scope);
                let text = value_to_string(&value);
                if *escaped {
                    out.push_str(&html_escape(&text));
                } else {
                    out.push_str(&text);
                }
            }
            Node::If {
                branches,
                else_body,
            } => {
                let mut taken = false;
                for (condition, body) in branches {
                    if is_truthy(&evaluate(condition, scope)) {
                        out.push_str(&render_nodes(body, scope)?);
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    if let Some(body) = else_body {
                        out.push_str(&render_nodes(body, scope)?);
                    }
                }
            }
            Node::Foreach {
                var,
                iterable,
                body,
            } => {
                let value = evaluate(iterable, scope);
                match value {
                    Value::Array(items) => {
                        for item in items {
                            let mut inner = scope.clone();
                            inner.insert(var.clone(), item);
                            out.push_str(&render_nodes(body, &inner)?);
                        }
                    }
                    Value::Object(map) => {
                        // Objects iterate as [key, value] pairs
                        for (key, item) in map {
                            let mut inner = scope.clone();
                            inner.insert(
                                var.clone(),
                                Value::Array(vec![Value::String(key), item]),
                            );
                            out.push_str(&render_nodes(body, &inner)?);
                        }
                    }
                    other => return Err(TemplateError::NotIterable(type_name(&other))),
                }
            }
            Node::For {
                var,
                start,
                end,
                body,
            } => {
                let start = evaluate(start, scope).as_i64().unwrap_or(0);
                let end = evaluate(end, scope).as_i64().unwrap_or(0);
                for i in start..end {
                    let mut inner = scope.clone();
                    inner.insert(var.clone(), Value::from(i));
                    out.push_str(&render_nodes(body, &inner)?);
                }
            }
            Node::While { condition, body } => {
                let mut iterations = 0;
                while is_truthy(&evaluate(condition, scope)) {
                    if iterations >= MAX_LOOP_ITERATIONS {
                        return Err(TemplateError::LoopLimit(MAX_LOOP_ITERATIONS));
                    }
                    out.push_str(&render_nodes(body, scope)?);
                    iterations += 1;
                }
            }
        }
    }

    Ok(out)
}

/// Evaluate an expression. Missing variables and fields are null, never an
/// error.
pub fn evaluate(expr: &Expr, scope: &Scope) -> Value {
    match expr {
        Expr::StringLit(s) => Value::String(s.clone()),
        Expr::IntLit(n) => Value::from(*n),
        Expr::FloatLit(n) => Value::from(*n),
        Expr::BoolLit(b) => Value::Bool(*b),
        Expr::Null => Value::Null,
        Expr::Var(name) => scope.get(name).cloned().unwrap_or(Value::Null),
        Expr::Field(base, field) => {
            let base = evaluate(base, scope);
            base.get(field).cloned().unwrap_or(Value::Null)
        }
        Expr::Index(base, key) => {
            let base = evaluate(base, scope);
            let key = evaluate(key, scope);
            match &key {
                Value::Number(n) => n
                    .as_u64()
                    .and_then(|i| base.get(i as usize).cloned())
                    .unwrap_or(Value::Null),
                Value::String(s) => base.get(s).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            }
        }
        Expr::Compare(left, op, right) => {
            let left = evaluate(left, scope);
            let right = evaluate(right, scope);
            Value::Bool(compare_values(&left, *op, &right))
        }
        Expr::And(left, right) => {
            let ok = is_truthy(&evaluate(left, scope)) && is_truthy(&evaluate(right, scope));
            Value::Bool(ok)
        }
        Expr::Or(left, right) => {
            let ok = is_truthy(&evaluate(left, scope)) || is_truthy(&evaluate(right, scope));
            Value::Bool(ok)
        }
        Expr::Not(inner) => Value::Bool(!is_truthy(&evaluate(inner, scope))),
        Expr::Length(inner) => {
            let value = evaluate(inner, scope);
            let len = match &value {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => 0,
            };
            Value::from(len as i64)
        }
    }
}

fn compare_values(left: &Value, op: CompareOp, right: &Value) -> bool {
    // Numbers compare numerically even across int/float representations
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return match op {
            CompareOp::Eq => l == r,
            CompareOp::Ne => l != r,
            CompareOp::Lt => l < r,
            CompareOp::Le => l <= r,
            CompareOp::Gt => l > r,
            CompareOp::Ge => l >= r,
        };
    }

    match op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            match (left.as_str(), right.as_str()) {
                (Some(l), Some(r)) => match op {
                    CompareOp::Lt => l < r,
                    CompareOp::Le => l <= r,
                    CompareOp::Gt => l > r,
                    _ => l >= r,
                },
                _ => false,
            }
        }
    }
}

/// Truthiness used by conditions: null and empty collections are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Output formatting: null prints nothing, strings print verbatim, other
/// values print as JSON text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Escape HTML special characters for safe interpolation.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::parser::parse_template;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scope_of(pairs: &[(&str, Value)]) -> Scope {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn render(source: &str, scope: &Scope) -> String {
        let nodes = parse_template(source).unwrap();
        render_nodes(&nodes, scope).unwrap()
    }

    #[test]
    fn test_escaped_output() {
        let scope = scope_of(&[("name", json!("<b>Ada</b>"))]);
        assert_eq!(
            render("Hello {{ name }}", &scope),
            "Hello &lt;b&gt;Ada&lt;/b&gt;"
        );
    }

    #[test]
    fn test_raw_output() {
        let scope = scope_of(&[("name", json!("<b>Ada</b>"))]);
        assert_eq!(render("Hello {{name}}", &scope), "Hello <b>Ada</b>");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let scope = Scope::new();
        assert_eq!(render("[{{ ghost }}]", &scope), "[]");
    }

    #[test]
    fn test_if_branches() {
        let scope = scope_of(&[("n", json!(5))]);
        let tpl = "@if(n > 10)big@elseif(n > 3)medium@else small@endif";
        assert_eq!(render(tpl, &scope), "medium");

        let scope = scope_of(&[("n", json!(1))]);
        assert_eq!(render(tpl, &scope), " small");
    }

    #[test]
    fn test_foreach_array() {
        let scope = scope_of(&[("items", json!(["a", "b", "c"]))]);
        assert_eq!(
            render("@foreach(x in items)({{ x }})@endforeach", &scope),
            "(a)(b)(c)"
        );
    }

    #[test]
    fn test_foreach_object_binds_pairs() {
        let scope = scope_of(&[("map", json!({"k1": "v1", "k2": "v2"}))]);
        assert_eq!(
            render(
                "@foreach(pair in map){{ pair[0] }}={{ pair[1] }};@endforeach",
                &scope
            ),
            "k1=v1;k2=v2;"
        );
    }

    #[test]
    fn test_foreach_non_iterable_errors() {
        let nodes = parse_template("@foreach(x in n)x@endforeach").unwrap();
        let scope = scope_of(&[("n", json!(42))]);
        assert!(matches!(
            render_nodes(&nodes, &scope),
            Err(TemplateError::NotIterable("a number"))
        ));
    }

    #[test]
    fn test_for_range() {
        let scope = Scope::new();
        assert_eq!(render("@for(i in 1..4){{ i }}@endfor", &scope), "123");
    }

    #[test]
    fn test_while_false_condition_skips_body() {
        let scope = scope_of(&[("go", json!(false))]);
        assert_eq!(render("@while(go)never@endwhile", &scope), "");
    }

    #[test]
    fn test_while_true_condition_hits_cap() {
        let nodes = parse_template("@while(true)x@endwhile").unwrap();
        let scope = Scope::new();
        assert!(matches!(
            render_nodes(&nodes, &scope),
            Err(TemplateError::LoopLimit(MAX_LOOP_ITERATIONS))
        ));
    }

    #[test]
    fn test_length_in_condition() {
        let scope = scope_of(&[("items", json!(["a"]))]);
        assert_eq!(
            render("@if(items.length == 1)one@endif", &scope),
            "one"
        );
    }

    #[test]
    fn test_nested_field_access() {
        let scope = scope_of(&[("user", json!({"address": {"city": "Paris"}}))]);
        assert_eq!(render("{{ user.address.city }}", &scope), "Paris");
    }

    #[test]
    fn test_html_escape_set() {
        assert_eq!(
            html_escape(r#"<a href="x" onclick='y'>&"#),
            "&lt;a href=&quot;x&quot; onclick=&#x27;y&#x27;&gt;&amp;"
        );
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!({"k": 1})));
    }
}
