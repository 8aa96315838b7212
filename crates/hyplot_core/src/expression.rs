//! Expression parsing and evaluation.
//!
//! Axis formulas, phase time bounds, variable bindings and parameter
//! descriptors all arrive as text. They are parsed once into an `Expr` tree
//! and evaluated later against a `Scope` that maps names to numbers or to
//! further expressions.

use crate::error::PlotError;
use std::fmt;

const MAX_EVAL_DEPTH: usize = 64;
const MAX_PARSE_DEPTH: usize = 256;

const KNOWN_FUNCTIONS: &[&str] = &[
    "sin", "cos", "tan", "exp", "log", "ln", "sqrt", "abs", "asin", "acos", "atan", "sinh",
    "cosh", "tanh",
];

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // -
    Call(String, Box<Expr>),            // functions like sin(x)
}

/// What a name resolves to inside a `Scope`.
#[derive(Debug, Clone, Copy)]
pub enum Binding<'a> {
    Value(f64),
    Expr(&'a Expr),
}

/// Name resolution for expression evaluation.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Binding<'_>>;
}

/// A scope with no bindings. Only constant expressions evaluate in it.
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn lookup(&self, _name: &str) -> Option<Binding<'_>> {
        None
    }
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Expr::Number(value)
    }

    pub fn plus(left: Expr, right: Expr) -> Self {
        Expr::Binary(Box::new(left), '+', Box::new(right))
    }

    /// Evaluates the expression. Names are resolved through `scope`; a name
    /// bound to another expression is evaluated in the same scope.
    pub fn evaluate(&self, scope: &dyn Scope) -> Result<f64, PlotError> {
        self.evaluate_at_depth(scope, 0)
    }

    // `depth` counts bindings being resolved, not tree nodes.
    fn evaluate_at_depth(&self, scope: &dyn Scope, depth: usize) -> Result<f64, PlotError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Variable(name) => match scope.lookup(name) {
                Some(Binding::Value(value)) => Ok(value),
                Some(Binding::Expr(_)) if depth >= MAX_EVAL_DEPTH => {
                    Err(PlotError::Evaluation(format!(
                        "binding chain exceeds {MAX_EVAL_DEPTH} levels (cyclic binding?)"
                    )))
                }
                Some(Binding::Expr(expr)) => expr.evaluate_at_depth(scope, depth + 1),
                None => Err(PlotError::Evaluation(format!("Unknown variable: {name}"))),
            },
            Expr::Binary(left, op, right) => {
                let a = left.evaluate_at_depth(scope, depth)?;
                let b = right.evaluate_at_depth(scope, depth)?;
                match op {
                    '+' => Ok(a + b),
                    '-' => Ok(a - b),
                    '*' => Ok(a * b),
                    '/' => Ok(a / b),
                    '^' => Ok(a.powf(b)),
                    _ => Err(PlotError::Evaluation(format!(
                        "Unknown binary operator: {op}"
                    ))),
                }
            }
            Expr::Unary(op, operand) => {
                let a = operand.evaluate_at_depth(scope, depth)?;
                match op {
                    '-' => Ok(-a),
                    _ => Err(PlotError::Evaluation(format!("Unknown unary operator: {op}"))),
                }
            }
            Expr::Call(func, arg) => {
                let a = arg.evaluate_at_depth(scope, depth)?;
                apply_function(func, a)
            }
        }
    }
}

fn apply_function(func: &str, a: f64) -> Result<f64, PlotError> {
    let value = match func {
        "sin" => a.sin(),
        "cos" => a.cos(),
        "tan" => a.tan(),
        "exp" => a.exp(),
        "log" | "ln" => a.ln(),
        "sqrt" => a.sqrt(),
        "abs" => a.abs(),
        "asin" => a.asin(),
        "acos" => a.acos(),
        "atan" => a.atan(),
        "sinh" => a.sinh(),
        "cosh" => a.cosh(),
        "tanh" => a.tanh(),
        _ => return Err(PlotError::Evaluation(format!("Unknown function: {func}"))),
    };
    Ok(value)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Variable(name) => write!(f, "{name}"),
            Expr::Binary(left, op, right) => write!(f, "({left} {op} {right})"),
            Expr::Unary(op, operand) => write!(f, "{op}{operand}"),
            Expr::Call(func, arg) => write!(f, "{func}({arg})"),
        }
    }
}

/// Strips whitespace so `p[y, 0, 1]` and `p[y,0,1]` name the same symbol.
pub fn normalize_symbol(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

// --- Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("Empty expression".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!("Unexpected trailing input at token {}", parser.pos));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent part, e.g. 1.5e-3. A bare `E` after a number is left alone.
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    while j < chars.len() && chars[j].is_ascii_digit() {
                        j += 1;
                    }
                    i = j;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| format!("Invalid number: {text}"))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                ident.push(chars[i]);
                i += 1;
            }
            while i < chars.len() && chars[i] == '\'' {
                ident.push('\'');
                i += 1;
            }
            if i < chars.len() && chars[i] == '[' {
                let mut level = 0usize;
                loop {
                    let Some(&d) = chars.get(i) else {
                        return Err(format!("Unclosed '[' in {ident}"));
                    };
                    i += 1;
                    match d {
                        '[' => level += 1,
                        ']' => level -= 1,
                        _ => {}
                    }
                    if !d.is_whitespace() {
                        ident.push(d);
                    }
                    if level == 0 {
                        break;
                    }
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(format!("Unexpected character '{c}'")),
            };
            tokens.push(token);
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open parentheses, calls and unary signs on the current descent.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(format!("Expression nested deeper than {MAX_PARSE_DEPTH} levels"));
        }
        Ok(())
    }

    fn parse_expression(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_factor()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                self.enter()?;
                let expr = self.parse_unary()?;
                self.depth -= 1;
                Ok(Expr::Unary('-', Box::new(expr)))
            }
            Some(Token::Plus) => {
                self.consume();
                self.enter()?;
                let expr = self.parse_unary()?;
                self.depth -= 1;
                Ok(expr)
            }
            _ => self.parse_power(),
        }
    }

    // Right associative: 2^3^2 == 2^(3^2), and -t^2 == -(t^2).
    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            self.enter()?;
            let exponent = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    if !KNOWN_FUNCTIONS.contains(&name.as_str()) {
                        return Err(format!("Unknown function: {name}"));
                    }
                    self.enter()?;
                    let arg = self.parse_expression()?;
                    self.depth -= 1;
                    if let Some(Token::RParen) = self.consume() {
                        Ok(Expr::Call(name, Box::new(arg)))
                    } else {
                        Err("Expected ')'".to_string())
                    }
                } else {
                    Ok(match name.as_str() {
                        "Pi" => Expr::Number(std::f64::consts::PI),
                        "E" => Expr::Number(std::f64::consts::E),
                        "Infinity" => Expr::Number(f64::INFINITY),
                        _ => Expr::Variable(name),
                    })
                }
            }
            Some(Token::LParen) => {
                self.enter()?;
                let expr = self.parse_expression()?;
                self.depth -= 1;
                if let Some(Token::RParen) = self.consume() {
                    Ok(expr)
                } else {
                    Err("Expected ')'".to_string())
                }
            }
            _ => Err("Unexpected token".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapScope(HashMap<String, Expr>);

    impl Scope for MapScope {
        fn lookup(&self, name: &str) -> Option<Binding<'_>> {
            self.0.get(name).map(Binding::Expr)
        }
    }

    fn eval(input: &str) -> f64 {
        parse(input).expect("parse").evaluate(&EmptyScope).expect("eval")
    }

    #[test]
    fn precedence_and_associativity() {
        assert!((eval("1 + 2 * 3") - 7.0).abs() < 1e-12);
        assert!((eval("2^3^2") - 512.0).abs() < 1e-12);
        assert!((eval("-2^2") + 4.0).abs() < 1e-12);
        assert!((eval("(1 + 2) * 3") - 9.0).abs() < 1e-12);
        assert!((eval("8 / 4 / 2") - 1.0).abs() < 1e-12);
        assert!((eval("-1/2*4") + 2.0).abs() < 1e-12);
    }

    #[test]
    fn functions_and_constants() {
        assert!((eval("sin(Pi/2)") - 1.0).abs() < 1e-12);
        assert!((eval("sqrt(16)") - 4.0).abs() < 1e-12);
        assert!((eval("ln(E)") - 1.0).abs() < 1e-12);
        assert!(eval("Infinity").is_infinite());
        assert!((eval("1.5e-3 * 2") - 0.003).abs() < 1e-15);
    }

    #[test]
    fn identifiers_with_primes_and_brackets() {
        let expr = parse("y' + p[y, 0, 1]").expect("parse");
        match expr {
            Expr::Binary(left, '+', right) => {
                assert_eq!(*left, Expr::Variable("y'".to_string()));
                assert_eq!(*right, Expr::Variable("p[y,0,1]".to_string()));
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn nested_bindings_resolve_through_scope() {
        let mut map = HashMap::new();
        map.insert("x".to_string(), parse("2 * t + 1").expect("parse"));
        map.insert("t".to_string(), Expr::constant(3.0));
        let scope = MapScope(map);
        let value = parse("x ^ 2").expect("parse").evaluate(&scope).expect("eval");
        assert!((value - 49.0).abs() < 1e-12);
    }

    #[test]
    fn cyclic_binding_fails_instead_of_overflowing() {
        let mut map = HashMap::new();
        map.insert("x".to_string(), parse("x + 1").expect("parse"));
        let scope = MapScope(map);
        let err = parse("x").expect("parse").evaluate(&scope).expect_err("cycle");
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn long_sums_are_not_mistaken_for_cycles() {
        let input = vec!["1"; 80].join(" + ");
        assert!((eval(&input) - 80.0).abs() < 1e-12);

        let mut map = HashMap::new();
        map.insert("x".to_string(), parse(&vec!["t"; 200].join(" * ")).expect("parse"));
        map.insert("t".to_string(), Expr::constant(1.0));
        let scope = MapScope(map);
        let value = parse("-(x + x)").expect("parse").evaluate(&scope).expect("eval");
        assert!((value + 2.0).abs() < 1e-12);
    }

    #[test]
    fn deep_nesting_is_rejected_instead_of_overflowing() {
        let open = "(".repeat(100_000);
        let err = parse(&format!("{open}1")).expect_err("nesting");
        assert!(err.contains("nested deeper"));
        assert!(parse(&"-".repeat(100_000)).is_err());
        assert!(parse(&vec!["2"; 100_000].join("^")).is_err());

        let shallow = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!((eval(&shallow) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let err = parse("q").expect("parse").evaluate(&EmptyScope).expect_err("unknown");
        assert!(err.to_string().contains("Unknown variable: q"));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(parse("1 +").is_err());
        assert!(parse("(1 + 2").is_err());
        assert!(parse("1 2").is_err());
        assert!(parse("foo(1)").is_err());
        assert!(parse("1 $ 2").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn plus_constructor_matches_parsed_sum() {
        let start = parse("3").expect("parse");
        let end = Expr::plus(Expr::constant(2.0), start);
        assert!((end.evaluate(&EmptyScope).expect("eval") - 5.0).abs() < 1e-12);
    }
}
