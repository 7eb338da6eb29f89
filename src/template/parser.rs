//! Directive-template parser.
//!
//! Parses templates with syntax like:
//! - `{{ expr }}` - HTML-escaped output (spaces inside the braces)
//! - `{{expr}}` - Raw/unescaped output
//! - `@if(cond)` / `@elseif(cond)` / `@else` / `@endif`
//! - `@foreach(item in items)` / `@endforeach`
//! - `@for(i in 0..10)` / `@endfor`
//! - `@while(cond)` / `@endwhile`
//!
//! Anything that does not parse as a known directive stays in the output as
//! literal text, so compiling plain text is a fixed point.

use crate::error::TemplateError;

/// Pre-compiled expression for fast evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String literal: "hello"
    StringLit(String),
    /// Integer literal: 42
    IntLit(i64),
    /// Float literal: 3.14
    FloatLit(f64),
    /// Boolean literal: true/false
    BoolLit(bool),
    /// Null literal
    Null,
    /// Simple variable lookup: name
    Var(String),
    /// Field access: expr.field
    Field(Box<Expr>, String),
    /// Index access: expr[key]
    Index(Box<Expr>, Box<Expr>),
    /// Comparison: expr op expr
    Compare(Box<Expr>, CompareOp, Box<Expr>),
    /// Logical AND: expr && expr
    And(Box<Expr>, Box<Expr>),
    /// Logical OR: expr || expr
    Or(Box<Expr>, Box<Expr>),
    /// Logical NOT: !expr
    Not(Box<Expr>),
    /// Length of a string, array or object: expr.length
    Length(Box<Expr>),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    Eq, // ==
    Ne, // !=
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=
}

/// A node in the template AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Raw text content
    Text(String),
    /// Output expression, escaped or raw
    Output { expr: Expr, escaped: bool },
    /// If/elseif chain with optional else
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        else_body: Option<Vec<Node>>,
    },
    /// Iterate a collection, binding `var` per element
    Foreach {
        var: String,
        iterable: Expr,
        body: Vec<Node>,
    },
    /// Integer range loop
    For {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<Node>,
    },
    /// Condition-driven loop
    While { condition: Expr, body: Vec<Node> },
}

/// Token types during lexing
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Output { expr: String, escaped: bool },
    Directive { name: String, arg: Option<String> },
}

/// Parse a template into an AST.
pub fn parse_template(source: &str) -> Result<Vec<Node>, TemplateError> {
    let tokens = tokenize(source)?;
    let mut pos = 0;
    parse_nodes(&tokens, &mut pos, None)
}

const INNER_DIRECTIVES: &[&str] = &[
    "elseif",
    "else",
    "endif",
    "endforeach",
    "endfor",
    "endwhile",
];

/// Tokenize the source into text, output tags and directives.
fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '{' && chars.get(i + 1) == Some(&'{') {
            let close = find_close_braces(&chars, i + 2).ok_or(TemplateError::UnclosedTag)?;
            let inner: String = chars[i + 2..close].iter().collect();
            // Spaced braces escape; tight braces emit raw.
            let escaped = inner.starts_with(' ') && inner.ends_with(' ') && inner.trim() != "";
            if !text.is_empty() {
                tokens.push(Token::Text(std::mem::take(&mut text)));
            }
            tokens.push(Token::Output {
                expr: inner.trim().to_string(),
                escaped,
            });
            i = close + 2;
        } else if chars[i] == '@' {
            match scan_directive(&chars, i) {
                Some((name, arg, next)) => {
                    if !text.is_empty() {
                        tokens.push(Token::Text(std::mem::take(&mut text)));
                    }
                    tokens.push(Token::Directive { name, arg });
                    i = next;
                }
                None => {
                    // Unknown word after '@', keep it as text
                    text.push(chars[i]);
                    i += 1;
                }
            }
        } else {
            text.push(chars[i]);
            i += 1;
        }
    }

    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }

    Ok(tokens)
}

/// Position of the `}}` closing an output tag opened before `from`.
fn find_close_braces(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == '}' && chars[i + 1] == '}' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Try to read a directive at `start` (which points at '@'). Returns the
/// directive name, its parenthesized argument if the directive takes one,
/// and the index just past the directive. Words after '@' that are not
/// known directives are left for the caller to treat as text.
fn scan_directive(chars: &[char], start: usize) -> Option<(String, Option<String>, usize)> {
    let mut i = start + 1;
    let mut name = String::new();
    while i < chars.len() && chars[i].is_ascii_alphabetic() {
        name.push(chars[i]);
        i += 1;
    }

    let takes_arg = matches!(name.as_str(), "if" | "elseif" | "foreach" | "for" | "while");
    let bare = matches!(
        name.as_str(),
        "else" | "endif" | "endforeach" | "endfor" | "endwhile"
    );

    if bare {
        return Some((name, None, i));
    }
    if !takes_arg {
        return None;
    }

    // Argument directives need a balanced parenthesized argument right after
    // the name; otherwise the text passes through untouched.
    if chars.get(i) != Some(&'(') {
        return None;
    }
    let mut depth = 0;
    let mut in_string = false;
    let mut string_char = ' ';
    let mut arg = String::new();
    let mut j = i;
    while j < chars.len() {
        let c = chars[j];
        if in_string {
            if c == string_char {
                in_string = false;
            }
            if depth > 0 {
                arg.push(c);
            }
            j += 1;
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = true;
                string_char = c;
                arg.push(c);
            }
            '(' => {
                if depth > 0 {
                    arg.push(c);
                }
                depth += 1;
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((name, Some(arg), j + 1));
                }
                arg.push(c);
            }
            _ => arg.push(c),
        }
        j += 1;
    }
    None
}

/// Parse tokens into nodes until a closing directive for `block` (or the end
/// of input at top level). Leaves `pos` at the unconsumed closer.
fn parse_nodes(
    tokens: &[Token],
    pos: &mut usize,
    block: Option<&'static str>,
) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();

    while *pos < tokens.len() {
        match &tokens[*pos] {
            Token::Text(s) => {
                nodes.push(Node::Text(s.clone()));
                *pos += 1;
            }
            Token::Output { expr, escaped } => {
                nodes.push(Node::Output {
                    expr: compile_expr(expr),
                    escaped: *escaped,
                });
                *pos += 1;
            }
            Token::Directive { name, arg } => match name.as_str() {
                "if" => {
                    let node = parse_if(tokens, pos, arg.as_deref().unwrap_or(""))?;
                    nodes.push(node);
                }
                "foreach" => {
                    let node = parse_foreach(tokens, pos, arg.as_deref().unwrap_or(""))?;
                    nodes.push(node);
                }
                "for" => {
                    let node = parse_for(tokens, pos, arg.as_deref().unwrap_or(""))?;
                    nodes.push(node);
                }
                "while" => {
                    let condition = compile_expr(arg.as_deref().unwrap_or(""));
                    *pos += 1;
                    let body = parse_nodes(tokens, pos, Some("while"))?;
                    expect_closer(tokens, pos, "endwhile", "while")?;
                    nodes.push(Node::While { condition, body });
                }
                other if INNER_DIRECTIVES.contains(&other) => {
                    // Belongs to the enclosing block; stop here so the block
                    // parser can consume it. At top level it is an error.
                    if block.is_some() {
                        return Ok(nodes);
                    }
                    return Err(TemplateError::UnexpectedDirective(other.to_string()));
                }
                other => {
                    return Err(TemplateError::UnexpectedDirective(other.to_string()));
                }
            },
        }
    }

    if let Some(open) = block {
        return Err(TemplateError::UnclosedBlock(open));
    }
    Ok(nodes)
}

fn expect_closer(
    tokens: &[Token],
    pos: &mut usize,
    closer: &str,
    open: &'static str,
) -> Result<(), TemplateError> {
    match tokens.get(*pos) {
        Some(Token::Directive { name, .. }) if name == closer => {
            *pos += 1;
            Ok(())
        }
        _ => Err(TemplateError::UnclosedBlock(open)),
    }
}

/// Parse an `@if` chain. `pos` points at the `if` directive on entry.
fn parse_if(tokens: &[Token], pos: &mut usize, arg: &str) -> Result<Node, TemplateError> {
    let mut branches = vec![];
    let mut else_body = None;
    let mut condition = compile_expr(arg);
    *pos += 1;

    loop {
        let body = parse_nodes(tokens, pos, Some("if"))?;
        match tokens.get(*pos) {
            Some(Token::Directive { name, arg }) if name == "elseif" => {
                branches.push((condition, body));
                condition = compile_expr(arg.as_deref().unwrap_or(""));
                *pos += 1;
            }
            Some(Token::Directive { name, .. }) if name == "else" => {
                branches.push((condition, body));
                *pos += 1;
                let body = parse_nodes(tokens, pos, Some("if"))?;
                expect_closer(tokens, pos, "endif", "if")?;
                else_body = Some(body);
                break;
            }
            Some(Token::Directive { name, .. }) if name == "endif" => {
                branches.push((condition, body));
                *pos += 1;
                break;
            }
            _ => return Err(TemplateError::UnclosedBlock("if")),
        }
    }

    Ok(Node::If {
        branches,
        else_body,
    })
}

/// Parse `@foreach(item in items)`. `pos` points at the directive on entry.
fn parse_foreach(tokens: &[Token], pos: &mut usize, arg: &str) -> Result<Node, TemplateError> {
    let sep = arg.find(" in ").ok_or(TemplateError::InvalidArgument {
        directive: "foreach",
        arg: arg.to_string(),
    })?;
    let var = arg[..sep].trim().to_string();
    let iterable_str = arg[sep + 4..].trim();
    if var.is_empty() || iterable_str.is_empty() {
        return Err(TemplateError::InvalidArgument {
            directive: "foreach",
            arg: arg.to_string(),
        });
    }
    let iterable = compile_expr(iterable_str);

    *pos += 1;
    let body = parse_nodes(tokens, pos, Some("foreach"))?;
    expect_closer(tokens, pos, "endforeach", "foreach")?;

    Ok(Node::Foreach {
        var,
        iterable,
        body,
    })
}

/// Parse `@for(i in a..b)`. `pos` points at the directive on entry.
fn parse_for(tokens: &[Token], pos: &mut usize, arg: &str) -> Result<Node, TemplateError> {
    let invalid = || TemplateError::InvalidArgument {
        directive: "for",
        arg: arg.to_string(),
    };
    let sep = arg.find(" in ").ok_or_else(invalid)?;
    let var = arg[..sep].trim().to_string();
    let range = arg[sep + 4..].trim();
    let (start_str, end_str) = range.split_once("..").ok_or_else(invalid)?;
    if var.is_empty() || start_str.trim().is_empty() || end_str.trim().is_empty() {
        return Err(invalid());
    }

    let start = compile_expr(start_str);
    let end = compile_expr(end_str);

    *pos += 1;
    let body = parse_nodes(tokens, pos, Some("for"))?;
    expect_closer(tokens, pos, "endfor", "for")?;

    Ok(Node::For {
        var,
        start,
        end,
        body,
    })
}

/// Compile an expression string into a pre-compiled Expr AST.
pub fn compile_expr(expr: &str) -> Expr {
    let expr = expr.trim();

    // String literals
    if (expr.starts_with('"') && expr.ends_with('"') && expr.len() >= 2)
        || (expr.starts_with('\'') && expr.ends_with('\'') && expr.len() >= 2)
    {
        return Expr::StringLit(expr[1..expr.len() - 1].to_string());
    }

    // Numeric literals
    if let Ok(n) = expr.parse::<i64>() {
        return Expr::IntLit(n);
    }
    if let Ok(n) = expr.parse::<f64>() {
        return Expr::FloatLit(n);
    }

    if expr == "true" {
        return Expr::BoolLit(true);
    }
    if expr == "false" {
        return Expr::BoolLit(false);
    }
    if expr == "null" {
        return Expr::Null;
    }

    // Logical operators bind loosest
    if let Some(pos) = find_logical_op(expr, " && ") {
        let left = compile_expr(&expr[..pos]);
        let right = compile_expr(&expr[pos + 4..]);
        return Expr::And(Box::new(left), Box::new(right));
    }
    if let Some(pos) = find_logical_op(expr, " || ") {
        let left = compile_expr(&expr[..pos]);
        let right = compile_expr(&expr[pos + 4..]);
        return Expr::Or(Box::new(left), Box::new(right));
    }

    // Comparisons
    for (op_str, op) in [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        (">=", CompareOp::Ge),
        ("<=", CompareOp::Le),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
    ] {
        if let Some(pos) = expr.find(op_str) {
            let left = compile_expr(&expr[..pos]);
            let right = compile_expr(&expr[pos + op_str.len()..]);
            return Expr::Compare(Box::new(left), op, Box::new(right));
        }
    }

    // Negation
    if let Some(inner) = expr.strip_prefix('!') {
        return Expr::Not(Box::new(compile_expr(inner)));
    }

    compile_variable_access(expr)
}

/// Find a logical operator position, respecting bracket/quote nesting
fn find_logical_op(expr: &str, op: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut string_char = ' ';
    let bytes = expr.as_bytes();
    let op_bytes = op.as_bytes();

    for i in 0..expr.len() {
        let c = bytes[i] as char;

        if in_string {
            if c == string_char && (i == 0 || bytes[i - 1] != b'\\') {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                in_string = true;
                string_char = c;
            }
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            _ => {
                if depth == 0 && i + op.len() <= expr.len() && &bytes[i..i + op.len()] == op_bytes {
                    return Some(i);
                }
            }
        }
    }
    None
}

/// Compile variable access like `user`, `user["name"]`, or `user.name`
fn compile_variable_access(expr: &str) -> Expr {
    let expr = expr.trim();

    // Bracket notation first
    if let Some(bracket_pos) = find_first_bracket(expr) {
        let base = &expr[..bracket_pos];
        let rest = &expr[bracket_pos..];

        if let Some(close_pos) = find_matching_bracket(rest) {
            let key_expr = &rest[1..close_pos];
            let after_bracket = &rest[close_pos + 1..];

            let base_expr = if base.is_empty() {
                return Expr::Var(expr.to_string());
            } else {
                compile_variable_access(base)
            };

            let key = compile_expr(key_expr);
            let indexed = Expr::Index(Box::new(base_expr), Box::new(key));

            if after_bracket.is_empty() {
                return indexed;
            } else if let Some(rest) = after_bracket.strip_prefix('.') {
                return compile_chained_access(indexed, rest);
            } else if after_bracket.starts_with('[') {
                return compile_further_brackets(indexed, after_bracket);
            }
        }
    }

    // Dot notation
    if let Some(dot_pos) = expr.find('.') {
        let base = &expr[..dot_pos];
        let field = &expr[dot_pos + 1..];

        let base_expr = Expr::Var(base.to_string());
        return compile_chained_access(base_expr, field);
    }

    Expr::Var(expr.to_string())
}

/// Find the first bracket that's not inside quotes
fn find_first_bracket(expr: &str) -> Option<usize> {
    let mut in_string = false;
    let mut string_char = ' ';

    for (i, c) in expr.chars().enumerate() {
        if in_string {
            if c == string_char {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = true;
                string_char = c;
            }
            '[' => return Some(i),
            _ => {}
        }
    }
    None
}

/// Find the matching closing bracket/paren for the opener at position 0
fn find_matching_bracket(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut string_char = ' ';

    for (i, c) in s.chars().enumerate() {
        if in_string {
            if c == string_char {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                in_string = true;
                string_char = c;
            }
            '[' | '(' => depth += 1,
            ']' | ')' => {
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

/// Compile chained field access after a dot
fn compile_chained_access(base: Expr, field: &str) -> Expr {
    let (current_field, rest) = if let Some(dot_pos) = field.find('.') {
        (&field[..dot_pos], Some(&field[dot_pos + 1..]))
    } else if let Some(bracket_pos) = find_first_bracket(field) {
        (&field[..bracket_pos], Some(&field[bracket_pos..]))
    } else {
        (field, None)
    };

    let current = match current_field {
        "length" | "len" | "size" => Expr::Length(Box::new(base)),
        _ => Expr::Field(Box::new(base), current_field.to_string()),
    };

    match rest {
        Some(r) if r.starts_with('[') => compile_further_brackets(current, r),
        Some(r) => compile_chained_access(current, r),
        None => current,
    }
}

/// Compile further bracket access
fn compile_further_brackets(base: Expr, brackets: &str) -> Expr {
    if !brackets.starts_with('[') {
        return base;
    }

    if let Some(close_pos) = find_matching_bracket(brackets) {
        let key_expr = &brackets[1..close_pos];
        let after = &brackets[close_pos + 1..];

        let key = compile_expr(key_expr);
        let indexed = Expr::Index(Box::new(base), Box::new(key));

        if after.is_empty() {
            indexed
        } else if let Some(rest) = after.strip_prefix('.') {
            compile_chained_access(indexed, rest)
        } else if after.starts_with('[') {
            compile_further_brackets(indexed, after)
        } else {
            indexed
        }
    } else {
        base
    }
}
