//! Compiles user-supplied text into a function of a single variable `x`.
//!
//! The rest of the crate only talks to the [`Compiler`] and [`Evaluator`]
//! traits, so any other expression engine can be substituted by implementing
//! them. [`ExprCompiler`] is the built-in implementation, understanding
//! ordinary infix arithmetic:
//! - decimal numbers with optional exponent (`1.5e-3`)
//! - the variable `x` and the constants `pi`, `e`, `tau`
//! - `+ - * / ^` (`^` is right-associative and binds tighter than unary minus)
//! - implicit multiplication (`2x`, `3(x + 1)`, `x(1 - x)`)
//! - the functions listed in [`Func`]
//! - `integrate(body, var, start, end[, step])`, the midpoint-rule integral of
//!   `body` as `var` runs from `start` to `end` (see [`crate::math::integrate`];
//!   `step` defaults to [`DEFAULT_STEP`])
//!
//! Expressions nested deeper than [`MAX_DEPTH`] are rejected at compile time.
//!
//! Compilation never evaluates anything. Evaluation errors, such as an
//! undefined symbol or a negative base raised to a fractional power, are
//! reported per call to [`Evaluator::evaluate`]; operations that merely
//! overflow or divide by zero return non-finite values instead.

use std::{
    f64::consts,
    fmt,
    rc::Rc,
    str::FromStr,
};
use regex::Regex;
use thiserror::Error;
use crate::math::integrate::{
    self,
    IntegrateError,
    DEFAULT_STEP,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    BadChar { ch: char, pos: usize },

    #[error("unexpected '{tok}' at position {pos}")]
    UnexpectedToken { tok: String, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' takes {expected} argument(s) but got {got}")]
    Arity { name: String, expected: usize, got: usize },

    #[error("couldn't parse number '{0}'")]
    BadNumber(String),

    #[error("expected a variable name but got '{tok}' at position {pos}")]
    NotAVariable { tok: String, pos: usize },

    #[error("expression is nested more than {} levels deep", MAX_DEPTH)]
    TooDeep,

    #[error("{0}")]
    Other(String),
}
pub type CompileResult<T> = Result<T, CompileError>;

/// Deepest nesting of brackets, signs, and operators that [`ExprCompiler`]
/// will accept.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("undefined symbol {0}")]
    UndefinedSymbol(String),

    #[error("{func}({arg}) is not a real number")]
    Domain { func: &'static str, arg: f64 },

    #[error("{base} ^ {exp} is not a real number")]
    ComplexPower { base: f64, exp: f64 },

    #[error("{0}")]
    Integrate(#[from] IntegrateError),

    #[error("{0}")]
    Other(String),
}
pub type EvalResult<T> = Result<T, EvalError>;

/// A compiled function of one real variable.
pub trait Evaluator {
    fn evaluate(&self, x: f64) -> EvalResult<f64>;
}

impl<T> Evaluator for Rc<T>
where T: Evaluator + ?Sized
{
    fn evaluate(&self, x: f64) -> EvalResult<f64> { (**self).evaluate(x) }
}

impl<T> Evaluator for &T
where T: Evaluator + ?Sized
{
    fn evaluate(&self, x: f64) -> EvalResult<f64> { (**self).evaluate(x) }
}

/// Turns expression text into an [`Evaluator`].
pub trait Compiler {
    type Output: Evaluator + 'static;

    fn compile(&self, text: &str) -> CompileResult<Self::Output>;
}

/// Wraps a plain closure as an evaluator that never fails.
#[derive(Clone, Copy, Debug)]
pub struct FnDensity<F>(pub F);

impl<F> Evaluator for FnDensity<F>
where F: Fn(f64) -> f64
{
    fn evaluate(&self, x: f64) -> EvalResult<f64> { Ok((self.0)(x)) }
}

/// Built-in functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Sin, Cos, Tan,
    Asin, Acos, Atan,
    Sinh, Cosh, Tanh,
    Exp,
    /// Natural logarithm, also available as `ln`.
    Log,
    Log2, Log10,
    Sqrt, Cbrt,
    Abs, Floor, Ceil, Round, Sign,
    Pow, Min, Max,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        return match name {
            "sin" => Some(Self::Sin),
            "cos" => Some(Self::Cos),
            "tan" => Some(Self::Tan),
            "asin" => Some(Self::Asin),
            "acos" => Some(Self::Acos),
            "atan" => Some(Self::Atan),
            "sinh" => Some(Self::Sinh),
            "cosh" => Some(Self::Cosh),
            "tanh" => Some(Self::Tanh),
            "exp" => Some(Self::Exp),
            "log" | "ln" => Some(Self::Log),
            "log2" => Some(Self::Log2),
            "log10" => Some(Self::Log10),
            "sqrt" => Some(Self::Sqrt),
            "cbrt" => Some(Self::Cbrt),
            "abs" => Some(Self::Abs),
            "floor" => Some(Self::Floor),
            "ceil" => Some(Self::Ceil),
            "round" => Some(Self::Round),
            "sign" => Some(Self::Sign),
            "pow" => Some(Self::Pow),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        };
    }

    pub fn name(&self) -> &'static str {
        return match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Log2 => "log2",
            Self::Log10 => "log10",
            Self::Sqrt => "sqrt",
            Self::Cbrt => "cbrt",
            Self::Abs => "abs",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Sign => "sign",
            Self::Pow => "pow",
            Self::Min => "min",
            Self::Max => "max",
        };
    }

    pub fn arity(&self) -> usize {
        return match self {
            Self::Pow | Self::Min | Self::Max => 2,
            _ => 1,
        };
    }

    fn apply(&self, args: &[f64]) -> EvalResult<f64> {
        let a: f64 = args[0];
        let domain = |func: &'static str| EvalError::Domain { func, arg: a };
        return match self {
            Self::Sin => Ok(a.sin()),
            Self::Cos => Ok(a.cos()),
            Self::Tan => Ok(a.tan()),
            Self::Asin | Self::Acos if !(-1.0..=1.0).contains(&a) => {
                Err(domain(self.name()))
            },
            Self::Asin => Ok(a.asin()),
            Self::Acos => Ok(a.acos()),
            Self::Atan => Ok(a.atan()),
            Self::Sinh => Ok(a.sinh()),
            Self::Cosh => Ok(a.cosh()),
            Self::Tanh => Ok(a.tanh()),
            Self::Exp => Ok(a.exp()),
            Self::Log | Self::Log2 | Self::Log10 | Self::Sqrt if a < 0.0 => {
                Err(domain(self.name()))
            },
            Self::Log => Ok(a.ln()),
            Self::Log2 => Ok(a.log2()),
            Self::Log10 => Ok(a.log10()),
            Self::Sqrt => Ok(a.sqrt()),
            Self::Cbrt => Ok(a.cbrt()),
            Self::Abs => Ok(a.abs()),
            Self::Floor => Ok(a.floor()),
            Self::Ceil => Ok(a.ceil()),
            Self::Round => Ok(a.round()),
            Self::Sign => Ok(if a == 0.0 { 0.0 } else { a.signum() }),
            Self::Pow => pow(a, args[1]),
            Self::Min => Ok(a.min(args[1])),
            Self::Max => Ok(a.max(args[1])),
        };
    }
}

fn pow(base: f64, exp: f64) -> EvalResult<f64> {
    if base < 0.0 && exp.is_finite() && exp.fract() != 0.0 {
        return Err(EvalError::ComplexPower { base, exp });
    }
    return Ok(base.powf(exp));
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Num(f64),
    Var(String),
    Neg(Box<Node>),
    Bin(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
    Integrate {
        body: Box<Node>,
        var: String,
        start: Box<Node>,
        end: Box<Node>,
        step: Option<Box<Node>>,
    },
}

/// Variable bindings visible to a node, innermost first.
struct Scope<'a> {
    name: &'a str,
    value: f64,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, name: &str) -> Option<f64> {
        let mut scope: Option<&Scope> = Some(self);
        while let Some(s) = scope {
            if s.name == name {
                return Some(s.value);
            }
            scope = s.parent;
        }
        return None;
    }
}

impl Node {
    fn eval(&self, scope: &Scope<'_>) -> EvalResult<f64> {
        return match self {
            Node::Num(v) => Ok(*v),
            Node::Var(name) => {
                scope.lookup(name)
                    .ok_or_else(|| EvalError::UndefinedSymbol(name.clone()))
            },
            Node::Neg(arg) => arg.eval(scope).map(|v| -v),
            Node::Bin(op, lhs, rhs) => {
                let l: f64 = lhs.eval(scope)?;
                let r: f64 = rhs.eval(scope)?;
                match op {
                    BinOp::Add => Ok(l + r),
                    BinOp::Sub => Ok(l - r),
                    BinOp::Mul => Ok(l * r),
                    BinOp::Div => Ok(l / r),
                    BinOp::Pow => pow(l, r),
                }
            },
            Node::Call(func, args) => {
                let vals: Vec<f64>
                    = args.iter()
                    .map(|arg| arg.eval(scope))
                    .collect::<EvalResult<_>>()?;
                func.apply(&vals)
            },
            Node::Integrate { body, var, start, end, step } => {
                let a: f64 = start.eval(scope)?;
                let b: f64 = end.eval(scope)?;
                let h: f64
                    = match step {
                        Some(step) => step.eval(scope)?,
                        None => DEFAULT_STEP,
                    };
                // an empty or reversed interval contributes nothing
                if a.is_finite() && b.is_finite() && !(a < b) {
                    return Ok(0.0);
                }
                integrate::try_integrate(
                    |t| {
                        body.eval(
                            &Scope { name: var.as_str(), value: t, parent: Some(scope) })
                    },
                    a,
                    b,
                    h,
                )
            },
        };
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Sym(char),
}

#[derive(Clone, Debug)]
struct Lexeme {
    tok: Tok,
    text: String,
    pos: usize,
}

/// A parsed subtree along with its height.
type Parsed = (Node, usize);

fn grown(height: usize) -> CompileResult<usize> {
    return if height > MAX_DEPTH { Err(CompileError::TooDeep) } else { Ok(height) };
}

struct Parser {
    lexemes: Vec<Lexeme>,
    cur: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> { self.lexemes.get(self.cur) }

    fn peek_sym(&self) -> Option<char> {
        return match self.peek() {
            Some(Lexeme { tok: Tok::Sym(c), .. }) => Some(*c),
            _ => None,
        };
    }

    fn next(&mut self) -> CompileResult<Lexeme> {
        let lex: Lexeme
            = self.lexemes.get(self.cur).cloned()
            .ok_or(CompileError::UnexpectedEnd)?;
        self.cur += 1;
        return Ok(lex);
    }

    fn expect_sym(&mut self, sym: char) -> CompileResult<()> {
        let lex: Lexeme = self.next()?;
        return if lex.tok == Tok::Sym(sym) {
            Ok(())
        } else {
            Err(unexpected(&lex))
        };
    }

    // bounds the recursion of the descent itself; bracket nesting doesn't
    // show up in the height of the tree
    fn enter(&mut self) -> CompileResult<()> {
        self.nesting += 1;
        return if self.nesting > MAX_DEPTH { Err(CompileError::TooDeep) } else { Ok(()) };
    }

    fn leave(&mut self) { self.nesting -= 1; }

    fn starts_operand(&self) -> bool {
        return match self.peek() {
            Some(Lexeme { tok: Tok::Num(_), .. })
                | Some(Lexeme { tok: Tok::Ident(_), .. })
                | Some(Lexeme { tok: Tok::Sym('('), .. })
                => true,
            _ => false,
        };
    }

    fn parse_sum(&mut self) -> CompileResult<Parsed> {
        let (mut acc, mut height): Parsed = self.parse_product()?;
        loop {
            let op: BinOp
                = match self.peek_sym() {
                    Some('+') => BinOp::Add,
                    Some('-') => BinOp::Sub,
                    _ => return Ok((acc, height)),
                };
            self.cur += 1;
            let (rhs, h): Parsed = self.parse_product()?;
            height = grown(height.max(h) + 1)?;
            acc = Node::Bin(op, Box::new(acc), Box::new(rhs));
        }
    }

    fn parse_product(&mut self) -> CompileResult<Parsed> {
        let (mut acc, mut height): Parsed = self.parse_unary()?;
        loop {
            let (op, (rhs, h)): (BinOp, Parsed)
                = match self.peek_sym() {
                    Some('*') => {
                        self.cur += 1;
                        (BinOp::Mul, self.parse_unary()?)
                    },
                    Some('/') => {
                        self.cur += 1;
                        (BinOp::Div, self.parse_unary()?)
                    },
                    // implicit multiplication; the right operand can't carry
                    // a sign or `2 -x` would be read as a product
                    _ if self.starts_operand() => {
                        (BinOp::Mul, self.parse_power()?)
                    },
                    _ => return Ok((acc, height)),
                };
            height = grown(height.max(h) + 1)?;
            acc = Node::Bin(op, Box::new(acc), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> CompileResult<Parsed> {
        return match self.peek_sym() {
            Some('-') => {
                self.cur += 1;
                self.enter()?;
                let (arg, h): Parsed = self.parse_unary()?;
                self.leave();
                Ok((Node::Neg(Box::new(arg)), grown(h + 1)?))
            },
            Some('+') => {
                self.cur += 1;
                self.enter()?;
                let parsed: Parsed = self.parse_unary()?;
                self.leave();
                Ok(parsed)
            },
            _ => self.parse_power(),
        };
    }

    fn parse_power(&mut self) -> CompileResult<Parsed> {
        let (base, hb): Parsed = self.parse_primary()?;
        if self.peek_sym() == Some('^') {
            self.cur += 1;
            self.enter()?;
            let (exp, he): Parsed = self.parse_unary()?;
            self.leave();
            let height: usize = grown(hb.max(he) + 1)?;
            return Ok((Node::Bin(BinOp::Pow, Box::new(base), Box::new(exp)), height));
        }
        return Ok((base, hb));
    }

    fn parse_primary(&mut self) -> CompileResult<Parsed> {
        let lex: Lexeme = self.next()?;
        return match lex.tok {
            Tok::Num(v) => Ok((Node::Num(v), 0)),
            Tok::Sym('(') => {
                self.enter()?;
                let inner: Parsed = self.parse_sum()?;
                self.expect_sym(')')?;
                self.leave();
                Ok(inner)
            },
            Tok::Ident(name) => {
                if self.peek_sym() == Some('(') {
                    if name == INTEGRATE {
                        return self.parse_integrate();
                    }
                    if let Some(func) = Func::from_name(&name) {
                        return self.parse_call(func);
                    }
                    if !is_value_name(&name) {
                        return Err(CompileError::UnknownFunction(name));
                    }
                } else if Func::from_name(&name).is_some() || name == INTEGRATE {
                    return match self.peek() {
                        Some(next) => Err(unexpected(next)),
                        None => Err(CompileError::UnexpectedEnd),
                    };
                }
                Ok((value_node(name), 0))
            },
            Tok::Sym(_) => Err(unexpected(&lex)),
        };
    }

    fn parse_call(&mut self, func: Func) -> CompileResult<Parsed> {
        self.expect_sym('(')?;
        self.enter()?;
        let (first, mut height): Parsed = self.parse_sum()?;
        let mut args: Vec<Node> = vec![first];
        while self.peek_sym() == Some(',') {
            self.cur += 1;
            let (arg, h): Parsed = self.parse_sum()?;
            height = height.max(h);
            args.push(arg);
        }
        self.expect_sym(')')?;
        self.leave();
        if args.len() != func.arity() {
            return Err(
                CompileError::Arity {
                    name: func.name().to_string(),
                    expected: func.arity(),
                    got: args.len(),
                }
            );
        }
        return Ok((Node::Call(func, args), grown(height + 1)?));
    }

    // integrate(body, var, start, end[, step])
    fn parse_integrate(&mut self) -> CompileResult<Parsed> {
        self.expect_sym('(')?;
        self.enter()?;
        let (body, hbody): Parsed = self.parse_sum()?;
        self.expect_sym(',')?;
        let lex: Lexeme = self.next()?;
        let var: String
            = match lex.tok {
                Tok::Ident(name) if is_bindable(&name) => name,
                _ => {
                    return Err(
                        CompileError::NotAVariable { tok: lex.text, pos: lex.pos });
                },
            };
        self.expect_sym(',')?;
        let (start, hstart): Parsed = self.parse_sum()?;
        self.expect_sym(',')?;
        let (end, hend): Parsed = self.parse_sum()?;
        let step: Option<Parsed>
            = if self.peek_sym() == Some(',') {
                self.cur += 1;
                Some(self.parse_sum()?)
            } else {
                None
            };
        self.expect_sym(')')?;
        self.leave();
        let height: usize
            = hbody.max(hstart).max(hend)
            .max(step.as_ref().map_or(0, |(_, h)| *h));
        let node = Node::Integrate {
            body: Box::new(body),
            var,
            start: Box::new(start),
            end: Box::new(end),
            step: step.map(|(node, _)| Box::new(node)),
        };
        return Ok((node, grown(height + 1)?));
    }
}

const INTEGRATE: &str = "integrate";

fn unexpected(lex: &Lexeme) -> CompileError {
    return CompileError::UnexpectedToken { tok: lex.text.clone(), pos: lex.pos };
}

fn is_value_name(name: &str) -> bool {
    return matches!(name, "x" | "pi" | "e" | "tau");
}

fn is_bindable(name: &str) -> bool {
    return !matches!(name, "pi" | "e" | "tau" | INTEGRATE)
        && Func::from_name(name).is_none();
}

fn value_node(name: String) -> Node {
    return match name.as_str() {
        "pi" => Node::Num(consts::PI),
        "e" => Node::Num(consts::E),
        "tau" => Node::Num(consts::TAU),
        _ => Node::Var(name),
    };
}

/// A compiled expression.
///
/// Symbols other than `x` and the built-in constants are accepted at compile
/// time and reported as [`EvalError::UndefinedSymbol`] when evaluated.
#[derive(Clone, Debug)]
pub struct Expr {
    text: String,
    root: Node,
}

impl Expr {
    /// The text the expression was compiled from.
    pub fn text(&self) -> &str { &self.text }
}

impl Evaluator for Expr {
    fn evaluate(&self, x: f64) -> EvalResult<f64> {
        return self.root.eval(&Scope { name: "x", value: x, parent: None });
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        return f.write_str(self.text.trim());
    }
}

impl FromStr for Expr {
    type Err = CompileError;

    fn from_str(s: &str) -> CompileResult<Self> {
        return ExprCompiler::new().compile(s);
    }
}

/// The built-in [`Compiler`].
#[derive(Clone, Debug)]
pub struct ExprCompiler {
    token: Regex,
}

impl Default for ExprCompiler {
    fn default() -> Self { Self::new() }
}

impl ExprCompiler {
    pub fn new() -> Self {
        const NUM: &str = r"(?:\d+\.?\d*|\.\d+)(?:[eE][+\-]?\d+)?";
        const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_]*";
        const SYM: &str = r"[-+*/^(),]";
        let rgx: String = format!(
            r"^\s*(?:(?P<num>{n})|(?P<ident>{i})|(?P<sym>{s}))",
            n=NUM, i=IDENT, s=SYM,
        );
        return Self { token: Regex::new(&rgx).unwrap() };
    }

    fn lex(&self, text: &str) -> CompileResult<Vec<Lexeme>> {
        let mut lexemes: Vec<Lexeme> = Vec::new();
        let mut pos: usize = 0;
        while pos < text.len() {
            let rest: &str = &text[pos..];
            let Some(cap) = self.token.captures(rest) else {
                let skipped: usize = rest.len() - rest.trim_start().len();
                return match rest.trim_start().chars().next() {
                    Some(ch) => Err(CompileError::BadChar { ch, pos: pos + skipped }),
                    None => Ok(lexemes),
                };
            };
            let whole = cap.get(0).map_or(0, |m| m.end());
            if let Some(m) = cap.name("num") {
                let val: f64
                    = m.as_str().parse()
                    .map_err(|_| CompileError::BadNumber(m.as_str().to_string()))?;
                lexemes.push(
                    Lexeme { tok: Tok::Num(val), text: m.as_str().to_string(), pos: pos + m.start() }
                );
            } else if let Some(m) = cap.name("ident") {
                lexemes.push(
                    Lexeme {
                        tok: Tok::Ident(m.as_str().to_string()),
                        text: m.as_str().to_string(),
                        pos: pos + m.start(),
                    }
                );
            } else if let Some(m) = cap.name("sym") {
                let ch: char = m.as_str().chars().next().unwrap_or(' ');
                lexemes.push(
                    Lexeme { tok: Tok::Sym(ch), text: m.as_str().to_string(), pos: pos + m.start() }
                );
            }
            pos += whole;
        }
        return Ok(lexemes);
    }
}

impl Compiler for ExprCompiler {
    type Output = Expr;

    fn compile(&self, text: &str) -> CompileResult<Expr> {
        let lexemes: Vec<Lexeme> = self.lex(text)?;
        if lexemes.is_empty() {
            return Err(CompileError::Empty);
        }
        let mut parser = Parser { lexemes, cur: 0, nesting: 0 };
        let (root, _): Parsed = parser.parse_sum()?;
        if let Some(lex) = parser.peek() {
            return Err(unexpected(lex));
        }
        return Ok(Expr { text: text.to_string(), root });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn eval(text: &str, x: f64) -> EvalResult<f64> {
        let expr: Expr = text.parse().unwrap();
        return expr.evaluate(x);
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_abs_diff_eq!(eval("1 + 2 * 3", 0.0).unwrap(), 7.0);
        assert_abs_diff_eq!(eval("(1 + 2) * 3", 0.0).unwrap(), 9.0);
        assert_abs_diff_eq!(eval("8 / 4 / 2", 0.0).unwrap(), 1.0);
        assert_abs_diff_eq!(eval("10 - 4 - 3", 0.0).unwrap(), 3.0);
        assert_abs_diff_eq!(eval("2 ^ 3 ^ 2", 0.0).unwrap(), 512.0);
        assert_abs_diff_eq!(eval("-x^2", 3.0).unwrap(), -9.0);
        assert_abs_diff_eq!(eval("2^-1", 0.0).unwrap(), 0.5);
        assert_abs_diff_eq!(eval("1.5e1 + .5", 0.0).unwrap(), 15.5);
        assert_abs_diff_eq!(eval("+x - -x", 2.0).unwrap(), 4.0);
    }

    #[test]
    fn implicit_multiplication() {
        assert_abs_diff_eq!(eval("2x", 0.25).unwrap(), 0.5);
        assert_abs_diff_eq!(eval("3(x + 1)", 1.0).unwrap(), 6.0);
        assert_abs_diff_eq!(eval("6x(1 - x)", 0.5).unwrap(), 1.5);
        assert_abs_diff_eq!(eval("2x^2", 3.0).unwrap(), 18.0);
        assert_abs_diff_eq!(eval("2e", 0.0).unwrap(), 2.0 * consts::E);
        assert_abs_diff_eq!(eval("2 -x", 0.5).unwrap(), 1.5);
    }

    #[test]
    fn functions_and_constants() {
        assert_abs_diff_eq!(eval("sin(pi / 2)", 0.0).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval("ln(e)", 0.0).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval("log(exp(x))", 0.3).unwrap(), 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(eval("sqrt(x) * 1.5", 4.0).unwrap(), 3.0);
        assert_abs_diff_eq!(eval("pow(x, 3)", 2.0).unwrap(), 8.0);
        assert_abs_diff_eq!(eval("max(x, 1 - x)", 0.2).unwrap(), 0.8);
        assert_abs_diff_eq!(eval("abs(x - 0.5) * 4", 0.0).unwrap(), 2.0);
        assert_abs_diff_eq!(eval("sign(x - 1)", 0.0).unwrap(), -1.0);
        assert_abs_diff_eq!(eval("tau / pi", 0.0).unwrap(), 2.0);
    }

    #[test]
    fn compile_errors() {
        let compiler = ExprCompiler::new();
        assert_eq!(compiler.compile("").unwrap_err(), CompileError::Empty);
        assert_eq!(compiler.compile("   ").unwrap_err(), CompileError::Empty);
        assert_eq!(compiler.compile("2 *").unwrap_err(), CompileError::UnexpectedEnd);
        assert_eq!(compiler.compile("(x + 1").unwrap_err(), CompileError::UnexpectedEnd);
        assert_eq!(
            compiler.compile("x $ 2").unwrap_err(),
            CompileError::BadChar { ch: '$', pos: 2 },
        );
        assert_eq!(
            compiler.compile("x + 1)").unwrap_err(),
            CompileError::UnexpectedToken { tok: ")".to_string(), pos: 5 },
        );
        assert_eq!(
            compiler.compile("foo(x)").unwrap_err(),
            CompileError::UnknownFunction("foo".to_string()),
        );
        assert_eq!(
            compiler.compile("pow(x)").unwrap_err(),
            CompileError::Arity { name: "pow".to_string(), expected: 2, got: 1 },
        );
        assert!(compiler.compile("sin + 1").is_err());
        assert!(compiler.compile("*x").is_err());
    }

    #[test]
    fn evaluation_errors() {
        assert_eq!(eval("y * x", 1.0), Err(EvalError::UndefinedSymbol("y".to_string())));
        assert_eq!(
            eval("x ^ 0.5", -4.0),
            Err(EvalError::ComplexPower { base: -4.0, exp: 0.5 }),
        );
        assert_eq!(eval("x ^ 2", -4.0), Ok(16.0));
        assert_eq!(eval("sqrt(x)", -1.0), Err(EvalError::Domain { func: "sqrt", arg: -1.0 }));
        assert!(eval("asin(x)", 2.0).is_err());
        assert!(eval("log(x)", -0.5).is_err());
    }

    #[test]
    fn overflow_is_not_an_error() {
        assert!(eval("1 / x", 0.0).unwrap().is_infinite());
        assert!(eval("log(x)", 0.0).unwrap().is_infinite());
        assert!(eval("0 / x", 0.0).unwrap().is_nan());
    }

    #[test]
    fn expressions_remember_their_text() {
        let expr: Expr = " 2*x ".parse().unwrap();
        assert_eq!(expr.text(), " 2*x ");
        assert_eq!(expr.to_string(), "2*x");
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let compiler = ExprCompiler::new();
        let parens: String = "(".repeat(10_000) + "x" + &")".repeat(10_000);
        assert_eq!(compiler.compile(&parens).unwrap_err(), CompileError::TooDeep);
        let signs: String = "-".repeat(10_000) + "x";
        assert_eq!(compiler.compile(&signs).unwrap_err(), CompileError::TooDeep);
        let powers: String = "x^".repeat(10_000) + "x";
        assert_eq!(compiler.compile(&powers).unwrap_err(), CompileError::TooDeep);
        let calls: String = "sin(".repeat(10_000) + "x" + &")".repeat(10_000);
        assert_eq!(compiler.compile(&calls).unwrap_err(), CompileError::TooDeep);
        // long flat chains build deep trees too
        let sum: String = vec!["x"; 10_000].join(" + ");
        assert_eq!(compiler.compile(&sum).unwrap_err(), CompileError::TooDeep);

        let ok: String = "(".repeat(100) + "x" + &")".repeat(100);
        assert_abs_diff_eq!(compiler.compile(&ok).unwrap().evaluate(0.5).unwrap(), 0.5);
        let ok: String = vec!["x"; 100].join(" + ");
        assert_abs_diff_eq!(compiler.compile(&ok).unwrap().evaluate(0.5).unwrap(), 50.0);
    }

    #[test]
    fn integrals_bind_their_variable() {
        assert_abs_diff_eq!(eval("integrate(2*t, t, 0, 2)", 0.0).unwrap(), 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            eval("integrate(2*t, t, 0, 2, 0.001)", 0.0).unwrap(), 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            eval("integrate(3t^2, t, 0, 1, 0.5)", 0.0).unwrap(), 0.9375, epsilon = 1e-12);
        // the bound variable shadows x inside the body only
        assert_abs_diff_eq!(
            eval("integrate(2*x, x, 0, 2) + x", 0.5).unwrap(), 4.5, epsilon = 1e-9);
        // bounds and the body can refer to the enclosing x
        assert_abs_diff_eq!(eval("integrate(1, t, 0, x)", 0.25).unwrap(), 0.25, epsilon = 1e-9);
        assert_abs_diff_eq!(
            eval("integrate(x * t, t, 0, 1)", 4.0).unwrap(), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            eval("integrate(integrate(1, s, 0, t), t, 0, 1)", 0.0).unwrap(),
            0.5,
            epsilon = 1e-9,
        );
    }

    #[test]
    fn integral_edge_cases() {
        assert_eq!(eval("integrate(t, t, 1, 0)", 0.0), Ok(0.0));
        assert_eq!(eval("integrate(t, t, 1, 1)", 0.0), Ok(0.0));
        assert_eq!(
            eval("integrate(t, t, 0, 1, 0)", 0.0),
            Err(EvalError::Integrate(IntegrateError::BadStep)),
        );
        assert_eq!(
            eval("integrate(t, t, 0, 1/x)", 0.0),
            Err(EvalError::Integrate(IntegrateError::BadBounds)),
        );
        assert_eq!(
            eval("integrate(y, t, 0, 1)", 0.0),
            Err(EvalError::UndefinedSymbol("y".to_string())),
        );
        assert_eq!(
            eval("integrate(t, t, 0, 1) + t", 0.0),
            Err(EvalError::UndefinedSymbol("t".to_string())),
        );
    }

    #[test]
    fn integral_syntax_errors() {
        let compiler = ExprCompiler::new();
        assert_eq!(
            compiler.compile("integrate(x, 2, 0, 1)").unwrap_err(),
            CompileError::NotAVariable { tok: "2".to_string(), pos: 13 },
        );
        assert_eq!(
            compiler.compile("integrate(x, pi, 0, 1)").unwrap_err(),
            CompileError::NotAVariable { tok: "pi".to_string(), pos: 13 },
        );
        assert_eq!(
            compiler.compile("integrate(x, sin, 0, 1)").unwrap_err(),
            CompileError::NotAVariable { tok: "sin".to_string(), pos: 13 },
        );
        assert_eq!(
            compiler.compile("integrate(x, x, 0)").unwrap_err(),
            CompileError::UnexpectedToken { tok: ")".to_string(), pos: 17 },
        );
        assert!(compiler.compile("integrate(x, x, 0, 1, 0.1, 2)").is_err());
        assert!(compiler.compile("integrate + 1").is_err());
    }

    #[test]
    fn closures_and_shared_handles_evaluate() {
        let density = FnDensity(|x: f64| 2.0 * x);
        assert_eq!(density.evaluate(0.5), Ok(1.0));
        let shared: Rc<dyn Evaluator> = Rc::new("3x^2".parse::<Expr>().unwrap());
        assert_abs_diff_eq!(shared.evaluate(1.0).unwrap(), 3.0);
    }
}
