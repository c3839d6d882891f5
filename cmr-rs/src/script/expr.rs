//! Safe arithmetic expression evaluator for `=expr` values.
//!
//! Scripts are shared as data, so this evaluator is deliberately tiny: it
//! knows numbers, variables, arithmetic and a fixed set of math functions.
//! Every other construct a user might type (comparisons, subscripts,
//! attribute access, strings, lambdas, assignment) is recognised by the
//! lexer only so it can be rejected by name.
//!
//! Operator precedence (lowest → highest):
//!   additive  →  multiplicative  →  unary  →  power  →  primary
//!
//! `**` is right-associative and binds tighter than a unary minus on its
//! left, so `-2**2` is `-4`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::value::{type_name, Num};
use crate::error::EvalError;
use crate::var::VarStore;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Variable lookup used by the evaluator.
pub trait EvalContext {
    fn get_var(&self, name: &str) -> Option<&Value>;
}

impl EvalContext for VarStore {
    fn get_var(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

// ── Whitelist ─────────────────────────────────────────────────────────────────

const FUNCTIONS: &[&str] = &["abs", "round", "min", "max", "int", "float", "pow"];

const MATH_FUNCTIONS: &[&str] = &[
    "sqrt", "floor", "ceil", "trunc", "fabs", "exp", "log", "log10", "log2", "sin", "cos", "tan",
    "asin", "acos", "atan", "atan2", "hypot", "degrees", "radians", "pow", "fmod", "copysign",
];

fn math_constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        "tau" => Some(std::f64::consts::TAU),
        "inf" => Some(f64::INFINITY),
        _ => None,
    }
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Ident(String),

    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
    Comma,
    Dot,

    /// Recognised but never allowed; carries the construct's name.
    Forbidden(&'static str),
    Unknown(char),
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
    }

    fn read_number(&mut self, start: usize) -> Result<Token, EvalError> {
        let mut is_float = self.src[start] == b'.';
        self.take_while(|c| c.is_ascii_digit() || c == b'_');
        if self.peek() == Some(b'.') && self.peek2().map_or(true, |c| c.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.take_while(|c| c.is_ascii_digit());
            } else {
                self.pos = save;
            }
        }
        let text: String = self.src[start..self.pos]
            .iter()
            .filter(|&&c| c != b'_')
            .map(|&c| c as char)
            .collect();
        let bad = || EvalError::Syntax(format!("invalid number literal '{text}'"));
        if is_float {
            text.parse().map(Token::Float).map_err(|_| bad())
        } else {
            text.parse().map(Token::Int).map_err(|_| bad())
        }
    }

    fn read_ident(&mut self, start: usize) -> Token {
        self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        let word = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        match word.as_str() {
            "lambda" => Token::Forbidden("lambda"),
            "and" | "or" | "not" => Token::Forbidden("boolean operator"),
            "if" | "else" => Token::Forbidden("conditional expression"),
            "for" | "in" | "is" => Token::Forbidden("comprehension or membership test"),
            "import" | "from" => Token::Forbidden("import"),
            _ => Token::Ident(word),
        }
    }

    fn next_token(&mut self) -> Result<Token, EvalError> {
        self.take_while(|c| c.is_ascii_whitespace());
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };
        self.pos += 1;

        Ok(match ch {
            b'0'..=b'9' => return self.read_number(start),
            b'.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                return self.read_number(start)
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.read_ident(start),
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => {
                if self.eat(b'*') {
                    Token::StarStar
                } else {
                    Token::Star
                }
            }
            b'/' => {
                if self.eat(b'/') {
                    Token::SlashSlash
                } else {
                    Token::Slash
                }
            }
            b'%' => Token::Percent,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b',' => Token::Comma,
            b'.' => Token::Dot,
            b'<' | b'>' => {
                self.eat(b'=');
                Token::Forbidden("comparison")
            }
            b'!' if self.eat(b'=') => Token::Forbidden("comparison"),
            b'=' => {
                if self.eat(b'=') {
                    Token::Forbidden("comparison")
                } else {
                    Token::Forbidden("assignment")
                }
            }
            b'[' | b']' => Token::Forbidden("subscript"),
            b'{' | b'}' => Token::Forbidden("collection literal"),
            b'"' | b'\'' => Token::Forbidden("string literal"),
            b':' => Token::Forbidden("lambda or slice"),
            b'&' | b'|' | b'^' | b'~' => Token::Forbidden("bitwise operator"),
            b'@' => Token::Forbidden("matrix operator"),
            b'$' => Token::Forbidden("unresolved variable reference"),
            _ => {
                let c = std::str::from_utf8(&self.src[start..])
                    .ok()
                    .and_then(|s| s.chars().next())
                    .unwrap_or(ch as char);
                Token::Unknown(c)
            }
        })
    }

    fn tokenize(mut self) -> Result<Vec<Token>, EvalError> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token()?;
            let done = t == Token::Eof;
            tokens.push(t);
            if done {
                return Ok(tokens);
            }
        }
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Num),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Whitelisted call; the name is `abs`, `math.sqrt`, ...
    Call(String, Vec<Expr>),
}

// ── Parser ────────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(tok: Token) -> EvalError {
        match tok {
            Token::Forbidden(what) => EvalError::Disallowed(what.to_owned()),
            Token::Unknown(c) => EvalError::Syntax(format!("unexpected character '{c}'")),
            Token::Eof => EvalError::Syntax("unexpected end of expression".into()),
            other => EvalError::Syntax(format!("unexpected token {other:?}")),
        }
    }

    fn parse_all(&mut self) -> Result<Expr, EvalError> {
        let expr = self.parse_additive()?;
        match self.advance() {
            Token::Eof => Ok(expr),
            // A top-level comma builds a tuple.
            Token::Comma => Err(EvalError::Disallowed("tuple".into())),
            other => Err(Self::unexpected(other)),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        match self.peek() {
            Token::Minus => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)))
            }
            Token::Plus => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, EvalError> {
        let base = self.parse_primary()?;
        if self.eat(&Token::StarStar) {
            let exp = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_args(&mut self, name: &str) -> Result<Vec<Expr>, EvalError> {
        let mut args = Vec::new();
        if self.peek() != &Token::RParen {
            args.push(self.parse_additive()?);
            while self.eat(&Token::Comma) {
                args.push(self.parse_additive()?);
            }
        }
        match self.advance() {
            Token::RParen => Ok(args),
            Token::Forbidden(what) => Err(EvalError::Disallowed(what.to_owned())),
            _ => Err(EvalError::Syntax(format!("expected ')' after arguments to {name}"))),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Num::Int(n))),
            Token::Float(x) => Ok(Expr::Literal(Num::Float(x))),
            Token::Ident(name) if name == "math" => self.parse_math(),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    if !FUNCTIONS.contains(&name.as_str()) {
                        return Err(EvalError::FunctionNotAllowed(name));
                    }
                    let args = self.parse_args(&name)?;
                    Ok(Expr::Call(name, args))
                } else if self.peek() == &Token::Dot {
                    Err(EvalError::Disallowed(format!("attribute access on '{name}'")))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Token::LParen => {
                let inner = self.parse_additive()?;
                match self.advance() {
                    Token::RParen => Ok(inner),
                    Token::Comma => Err(EvalError::Disallowed("tuple".into())),
                    Token::Forbidden(what) => Err(EvalError::Disallowed(what.to_owned())),
                    _ => Err(EvalError::Syntax("expected ')'".into())),
                }
            }
            other => Err(Self::unexpected(other)),
        }
    }

    /// `math.<fn>(...)` or `math.<const>`; anything else under `math` is an
    /// attribute access we do not allow.
    fn parse_math(&mut self) -> Result<Expr, EvalError> {
        if !self.eat(&Token::Dot) {
            return Err(EvalError::Disallowed("bare reference to module 'math'".into()));
        }
        let Token::Ident(attr) = self.advance() else {
            return Err(EvalError::Syntax("expected a name after 'math.'".into()));
        };
        let qualified = format!("math.{attr}");
        if self.eat(&Token::LParen) {
            if !MATH_FUNCTIONS.contains(&attr.as_str()) {
                return Err(EvalError::FunctionNotAllowed(qualified));
            }
            let args = self.parse_args(&qualified)?;
            return Ok(Expr::Call(qualified, args));
        }
        match math_constant(&attr) {
            Some(v) => Ok(Expr::Literal(Num::Float(v))),
            None => Err(EvalError::Disallowed(format!("attribute access '{qualified}'"))),
        }
    }
}

/// Parse an expression whose `$name` references are already bare names.
pub fn parse(src: &str) -> Result<Expr, EvalError> {
    let tokens = Lexer::new(src).tokenize()?;
    Parser::new(tokens).parse_all()
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

fn var_ref() -> Result<&'static Regex, EvalError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)"))
        .as_ref()
        .map_err(|e| EvalError::Syntax(e.to_string()))
}

/// Strip the `$` from variable references, failing on any reference to a
/// variable that does not exist.
pub fn substitute_vars(src: &str, ctx: &dyn EvalContext) -> Result<String, EvalError> {
    let re = var_ref()?;
    if let Some(missing) = re
        .captures_iter(src)
        .map(|c| c[1].to_owned())
        .find(|name| ctx.get_var(name).is_none())
    {
        return Err(EvalError::UndefinedVariable(missing));
    }
    Ok(re.replace_all(src, "${1}").into_owned())
}

/// Evaluate an arithmetic expression such as `$x * 2 + math.sqrt(9)`.
pub fn evaluate(src: &str, ctx: &dyn EvalContext) -> Result<Num, EvalError> {
    let bare = substitute_vars(src, ctx)?;
    let expr = parse(&bare)?;
    eval_expr(&expr, ctx)
}

pub fn eval_expr(expr: &Expr, ctx: &dyn EvalContext) -> Result<Num, EvalError> {
    match expr {
        Expr::Literal(n) => Ok(*n),

        Expr::Var(name) => match ctx.get_var(name) {
            Some(v) => Num::from_json(v).ok_or_else(|| EvalError::NotNumeric {
                name: name.clone(),
                found: type_name(v),
            }),
            None => math_constant(name)
                .filter(|_| matches!(name.as_str(), "pi" | "e"))
                .map(Num::Float)
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
        },

        Expr::Unary(op, inner) => {
            let v = eval_expr(inner, ctx)?;
            Ok(match op {
                UnaryOp::Neg => v.neg(),
                UnaryOp::Pos => v,
            })
        }

        Expr::Binary(op, lhs, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            match op {
                BinOp::Add => Ok(l.add(r)),
                BinOp::Sub => Ok(l.sub(r)),
                BinOp::Mul => Ok(l.mul(r)),
                BinOp::Div => l.div(r),
                BinOp::FloorDiv => l.floor_div(r),
                BinOp::Rem => l.rem(r),
                BinOp::Pow => l.pow(r),
            }
        }

        Expr::Call(name, arg_exprs) => {
            let args = arg_exprs
                .iter()
                .map(|a| eval_expr(a, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &args)
        }
    }
}

// ── Functions ─────────────────────────────────────────────────────────────────

fn arity(name: &str, args: &[Num], min: usize, max: usize) -> Result<(), EvalError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = match (min, max) {
        (1, 1) => "1",
        (2, 2) => "2",
        (1, 2) => "1 or 2",
        _ => "at least 1",
    };
    Err(EvalError::Arity {
        func: name.to_owned(),
        expected,
        got: args.len(),
    })
}

fn float_to_int(name: &str, x: f64) -> Result<Num, EvalError> {
    if x.is_finite() && x.abs() < 9.2e18 {
        Ok(Num::Int(x as i64))
    } else {
        Err(EvalError::Domain(name.to_owned()))
    }
}

fn unary_float(name: &str, args: &[Num], f: fn(f64) -> f64) -> Result<Num, EvalError> {
    arity(name, args, 1, 1)?;
    let out = f(args[0].as_f64());
    if out.is_nan() && !args[0].as_f64().is_nan() {
        return Err(EvalError::Domain(name.to_owned()));
    }
    Ok(Num::Float(out))
}

fn call(name: &str, args: &[Num]) -> Result<Num, EvalError> {
    let f = |i: usize| args[i].as_f64();
    match name {
        "abs" => {
            arity(name, args, 1, 1)?;
            Ok(match args[0] {
                Num::Int(n) => n.checked_abs().map_or(Num::Float((n as f64).abs()), Num::Int),
                Num::Float(x) => Num::Float(x.abs()),
            })
        }
        "round" => {
            arity(name, args, 1, 2)?;
            if args.len() == 1 {
                return match args[0] {
                    Num::Int(n) => Ok(Num::Int(n)),
                    Num::Float(x) => float_to_int(name, x.round_ties_even()),
                };
            }
            let digits = match args[1] {
                Num::Int(d) => d,
                Num::Float(_) => return Err(EvalError::Domain(name.to_owned())),
            };
            let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
            Ok(Num::Float((f(0) * scale).round_ties_even() / scale))
        }
        "min" | "max" => {
            if args.is_empty() {
                return arity(name, args, 1, usize::MAX).map(|_| Num::Int(0));
            }
            let pick_max = name == "max";
            Ok(args.iter().copied().fold(args[0], |best, n| {
                let better = if pick_max {
                    n.as_f64() > best.as_f64()
                } else {
                    n.as_f64() < best.as_f64()
                };
                if better {
                    n
                } else {
                    best
                }
            }))
        }
        "int" => {
            arity(name, args, 1, 1)?;
            match args[0] {
                Num::Int(n) => Ok(Num::Int(n)),
                Num::Float(x) => float_to_int(name, x.trunc()),
            }
        }
        "float" => {
            arity(name, args, 1, 1)?;
            Ok(Num::Float(f(0)))
        }
        "pow" | "math.pow" => {
            arity(name, args, 2, 2)?;
            if name == "math.pow" {
                return Ok(Num::Float(f(0).powf(f(1))));
            }
            args[0].pow(args[1])
        }
        "math.sqrt" => {
            arity(name, args, 1, 1)?;
            if f(0) < 0.0 {
                return Err(EvalError::Domain(name.to_owned()));
            }
            Ok(Num::Float(f(0).sqrt()))
        }
        "math.floor" | "math.ceil" | "math.trunc" => {
            arity(name, args, 1, 1)?;
            if let Num::Int(n) = args[0] {
                return Ok(Num::Int(n));
            }
            let x = match name {
                "math.floor" => f(0).floor(),
                "math.ceil" => f(0).ceil(),
                _ => f(0).trunc(),
            };
            float_to_int(name, x)
        }
        "math.log" => {
            arity(name, args, 1, 2)?;
            let base_ok = args.len() == 1 || (f(1) > 0.0 && f(1) != 1.0);
            if f(0) <= 0.0 || !base_ok {
                return Err(EvalError::Domain(name.to_owned()));
            }
            Ok(Num::Float(if args.len() == 2 {
                f(0).ln() / f(1).ln()
            } else {
                f(0).ln()
            }))
        }
        "math.log10" | "math.log2" => {
            arity(name, args, 1, 1)?;
            if f(0) <= 0.0 {
                return Err(EvalError::Domain(name.to_owned()));
            }
            Ok(Num::Float(if name == "math.log10" {
                f(0).log10()
            } else {
                f(0).log2()
            }))
        }
        "math.fabs" => unary_float(name, args, f64::abs),
        "math.exp" => unary_float(name, args, f64::exp),
        "math.sin" => unary_float(name, args, f64::sin),
        "math.cos" => unary_float(name, args, f64::cos),
        "math.tan" => unary_float(name, args, f64::tan),
        "math.asin" => unary_float(name, args, f64::asin),
        "math.acos" => unary_float(name, args, f64::acos),
        "math.atan" => unary_float(name, args, f64::atan),
        "math.degrees" => unary_float(name, args, f64::to_degrees),
        "math.radians" => unary_float(name, args, f64::to_radians),
        "math.atan2" => {
            arity(name, args, 2, 2)?;
            Ok(Num::Float(f(0).atan2(f(1))))
        }
        "math.hypot" => {
            arity(name, args, 2, 2)?;
            Ok(Num::Float(f(0).hypot(f(1))))
        }
        "math.fmod" => {
            arity(name, args, 2, 2)?;
            if f(1) == 0.0 {
                return Err(EvalError::Domain(name.to_owned()));
            }
            Ok(Num::Float(f(0) % f(1)))
        }
        "math.copysign" => {
            arity(name, args, 2, 2)?;
            Ok(Num::Float(f(0).copysign(f(1))))
        }
        other => Err(EvalError::FunctionNotAllowed(other.to_owned())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct TestCtx(HashMap<String, Value>);

    impl EvalContext for TestCtx {
        fn get_var(&self, name: &str) -> Option<&Value> {
            self.0.get(name)
        }
    }

    fn ctx(pairs: &[(&str, Value)]) -> TestCtx {
        TestCtx(pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect())
    }

    fn eval(src: &str) -> Num {
        evaluate(src, &ctx(&[])).unwrap()
    }

    fn err(src: &str) -> EvalError {
        evaluate(src, &ctx(&[("x", json!(1))])).unwrap_err()
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("2+3*4"), Num::Int(14));
        assert_eq!(eval("(2+3)*4"), Num::Int(20));
        assert_eq!(eval("2**3**2"), Num::Int(512));
        assert_eq!(eval("-2**2"), Num::Int(-4));
        assert_eq!(eval("2**-1"), Num::Float(0.5));
        assert_eq!(eval("10 - 4 - 3"), Num::Int(3));
    }

    #[test]
    fn division_operators() {
        assert_eq!(eval("7/2"), Num::Float(3.5));
        assert_eq!(eval("7//2"), Num::Int(3));
        assert_eq!(eval("-7//2"), Num::Int(-4));
        assert_eq!(eval("7%3"), Num::Int(1));
        assert_eq!(evaluate("1/0", &ctx(&[])), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn variables() {
        let c = ctx(&[("x", json!(10)), ("f", json!(true)), ("s", json!("hi"))]);
        assert_eq!(evaluate("$x/2", &c).unwrap(), 5.0);
        assert_eq!(evaluate("$x + $f", &c).unwrap(), Num::Int(11));
        assert_eq!(
            evaluate("$s + 1", &c),
            Err(EvalError::NotNumeric {
                name: "s".into(),
                found: "string"
            })
        );
        assert_eq!(
            evaluate("$nope * 2", &c),
            Err(EvalError::UndefinedVariable("nope".into()))
        );
    }

    #[test]
    fn math_namespace() {
        assert_eq!(eval("math.sqrt(16)"), Num::Float(4.0));
        assert_eq!(eval("math.floor(2.7)"), Num::Int(2));
        assert_eq!(eval("math.ceil(2.1)"), Num::Int(3));
        assert_eq!(eval("math.pi"), Num::Float(std::f64::consts::PI));
        assert_eq!(eval("pi"), Num::Float(std::f64::consts::PI));
        assert_eq!(eval("math.log(8, 2)"), Num::Float(3.0));
        assert!(matches!(
            evaluate("math.sqrt(-1)", &ctx(&[])),
            Err(EvalError::Domain(_))
        ));
    }

    #[test]
    fn builtins() {
        assert_eq!(eval("abs(-3)"), Num::Int(3));
        assert_eq!(eval("round(2.5)"), Num::Int(2));
        assert_eq!(eval("round(3.5)"), Num::Int(4));
        assert_eq!(eval("round(1.25, 1)"), Num::Float(1.2));
        assert_eq!(eval("max(1, 5.5, 3)"), Num::Float(5.5));
        assert_eq!(eval("min(4, 2, 8)"), Num::Int(2));
        assert_eq!(eval("int(-3.9)"), Num::Int(-3));
        assert_eq!(eval("float(2)"), Num::Float(2.0));
        assert!(matches!(
            evaluate("abs()", &ctx(&[])),
            Err(EvalError::Arity { .. })
        ));
    }

    #[test]
    fn rejects_calls_outside_whitelist() {
        assert_eq!(
            evaluate("open($x)", &ctx(&[("x", json!(1))])),
            Err(EvalError::FunctionNotAllowed("open".into()))
        );
        assert_eq!(err("__import__(x)"), EvalError::FunctionNotAllowed("__import__".into()));
        assert_eq!(err("math.system(1)"), EvalError::FunctionNotAllowed("math.system".into()));
    }

    #[test]
    fn rejects_non_arithmetic_constructs() {
        let cases = [
            ("x < 2", "comparison"),
            ("x == 1", "comparison"),
            ("x = 3", "assignment"),
            ("x[0]", "subscript"),
            ("'a'", "string literal"),
            ("lambda: 1", "lambda"),
            ("x and 1", "boolean operator"),
            ("1 if x else 2", "conditional expression"),
            ("(1, 2)", "tuple"),
        ];
        for (src, construct) in cases {
            match err(src) {
                EvalError::Disallowed(what) => assert!(what.contains(construct), "{src}: {what}"),
                other => panic!("{src}: expected disallowed, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_attribute_access() {
        assert!(matches!(err("x.real"), EvalError::Disallowed(w) if w.contains("attribute")));
        assert!(matches!(err("math.__dict__"), EvalError::Disallowed(w) if w.contains("math.__dict__")));
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(err("1 +"), EvalError::Syntax(_)));
        assert!(matches!(err("(1"), EvalError::Syntax(_)));
        assert!(matches!(err("1 # 2"), EvalError::Syntax(_)));
        assert!(matches!(err(""), EvalError::Syntax(_)));
    }

    #[test]
    fn float_literals() {
        assert_eq!(eval("1.5e2"), Num::Float(150.0));
        assert_eq!(eval(".5 + 1"), Num::Float(1.5));
        assert_eq!(eval("1_000"), Num::Int(1000));
    }
}
