use crate::autodiff::Dual;
use crate::error::{DomainError, ParseError};
use crate::traits::{RealFunction, Scalar};
use std::f64::consts;
use std::fmt;

// --- AST ---

/// Binary operators of the accepted grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Named functions of the accepted grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sqrt" => Some(Self::Sqrt),
            "exp" => Some(Self::Exp),
            "log" => Some(Self::Log),
            "sin" => Some(Self::Sin),
            "cos" => Some(Self::Cos),
            "tan" => Some(Self::Tan),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
        }
    }
}

/// Named mathematical constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Pi,
    E,
}

impl Constant {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pi" => Some(Self::Pi),
            "E" => Some(Self::E),
            _ => None,
        }
    }

    pub fn value(self) -> f64 {
        match self {
            Self::Pi => consts::PI,
            Self::E => consts::E,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Pi => "pi",
            Self::E => "E",
        }
    }
}

/// Abstract syntax tree of a single-variable expression.
///
/// There is exactly one free variable, so `Var` carries no name; the name
/// lives on the [`Compiler`] and is only needed for printing.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Named(Constant),
    Var,
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Box<Expr>),
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn call(func: Function, arg: Expr) -> Self {
        Expr::Call(func, Box::new(arg))
    }

    pub fn neg(expr: Expr) -> Self {
        Expr::Neg(Box::new(expr))
    }

    /// True if the variable does not occur in the tree.
    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Const(_) | Expr::Named(_) => true,
            Expr::Var => false,
            Expr::Neg(inner) | Expr::Call(_, inner) => inner.is_constant(),
            Expr::Binary(_, lhs, rhs) => lhs.is_constant() && rhs.is_constant(),
        }
    }

    /// Returns the literal value for `Const` nodes.
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(value) => Some(*value),
            _ => None,
        }
    }

    /// Recursively evaluates the tree at `x`.
    ///
    /// Every intermediate result is checked, so an undefined operation is
    /// reported at the node where it happens instead of surfacing as NaN.
    pub fn eval<T: Scalar>(&self, x: T) -> Result<T, DomainError> {
        match self {
            Expr::Const(value) => Ok(T::constant(*value)),
            Expr::Named(constant) => Ok(T::constant(constant.value())),
            Expr::Var => Ok(x),
            Expr::Neg(inner) => Ok(-inner.eval(x)?),
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(x)?;
                let b = rhs.eval(x)?;
                apply_binary(*op, a, b)
            }
            Expr::Call(func, arg) => {
                let a = arg.eval(x)?;
                apply_function(*func, a)
            }
        }
    }

    /// Printable form using `variable` as the name of the free variable.
    pub fn display<'a>(&'a self, variable: &'a str) -> ExprDisplay<'a> {
        ExprDisplay {
            expr: self,
            variable,
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary(BinaryOp::Add | BinaryOp::Sub, _, _) => 1,
            Expr::Binary(BinaryOp::Mul | BinaryOp::Div, _, _) => 2,
            Expr::Neg(_) => 3,
            Expr::Const(value) if *value < 0.0 => 3,
            Expr::Binary(BinaryOp::Pow, _, _) => 4,
            _ => 5,
        }
    }
}

fn apply_binary<T: Scalar>(op: BinaryOp, a: T, b: T) -> Result<T, DomainError> {
    let (av, bv) = (a.value(), b.value());
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if bv == 0.0 {
                return Err(DomainError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::Pow => {
            if av < 0.0 && bv.fract() != 0.0 {
                return Err(DomainError::ComplexPower {
                    base: av,
                    exponent: bv,
                });
            }
            if av == 0.0 && bv < 0.0 {
                return Err(DomainError::DivisionByZero);
            }
            a.powf(b)
        }
    };
    let value = result.value();
    if !value.is_finite() {
        let operation = match op {
            BinaryOp::Add => "addition",
            BinaryOp::Sub => "subtraction",
            BinaryOp::Mul => "multiplication",
            BinaryOp::Div => "division",
            BinaryOp::Pow => "power",
        };
        return Err(DomainError::overflow(operation, av));
    }
    Ok(result)
}

fn apply_function<T: Scalar>(func: Function, a: T) -> Result<T, DomainError> {
    let arg = a.value();
    let result = match func {
        Function::Sqrt => {
            if arg < 0.0 {
                return Err(DomainError::SqrtOfNegative { arg });
            }
            a.sqrt()
        }
        Function::Log => {
            if arg <= 0.0 {
                return Err(DomainError::LogOfNonPositive { arg });
            }
            a.ln()
        }
        Function::Exp => a.exp(),
        Function::Sin => a.sin(),
        Function::Cos => a.cos(),
        Function::Tan => a.tan(),
    };
    if !result.value().is_finite() {
        return Err(DomainError::overflow(func.name(), arg));
    }
    Ok(result)
}

/// Formats an [`Expr`] in the accepted grammar, with `**` for powers.
pub struct ExprDisplay<'a> {
    expr: &'a Expr,
    variable: &'a str,
}

impl<'a> ExprDisplay<'a> {
    fn child(&self, expr: &'a Expr) -> Self {
        Self {
            expr,
            variable: self.variable,
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter<'_>, expr: &'a Expr, parens: bool) -> fmt::Result {
        if parens {
            write!(f, "({})", self.child(expr))
        } else {
            write!(f, "{}", self.child(expr))
        }
    }
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expr {
            Expr::Const(value) => write_number(f, *value),
            Expr::Named(constant) => f.write_str(constant.name()),
            Expr::Var => f.write_str(self.variable),
            Expr::Neg(inner) => {
                f.write_str("-")?;
                self.write_operand(f, inner, inner.precedence() < 2)
            }
            Expr::Call(func, arg) => write!(f, "{}({})", func.name(), self.child(arg)),
            Expr::Binary(op, lhs, rhs) => {
                let prec = self.expr.precedence();
                match op {
                    BinaryOp::Pow => {
                        self.write_operand(f, lhs, lhs.precedence() <= prec)?;
                        f.write_str("**")?;
                        // A signed exponent only binds a power or an atom.
                        let parens = rhs.precedence() < 3
                            || matches!(&**rhs, Expr::Neg(inner) if inner.precedence() < 4);
                        self.write_operand(f, rhs, parens)
                    }
                    _ => {
                        let (symbol, strict) = match op {
                            BinaryOp::Add => (" + ", false),
                            BinaryOp::Sub => (" - ", true),
                            BinaryOp::Mul => ("*", false),
                            BinaryOp::Div => ("/", true),
                            BinaryOp::Pow => unreachable!(),
                        };
                        self.write_operand(f, lhs, lhs.precedence() < prec)?;
                        f.write_str(symbol)?;
                        let rhs_prec = rhs.precedence();
                        // Unary signs after a binary operator read badly and
                        // `a - -b` is easy to misread, so they get parentheses.
                        let parens = rhs_prec < prec
                            || (strict && rhs_prec == prec)
                            || rhs_prec == 3;
                        self.write_operand(f, rhs, parens)
                    }
                }
            }
        }
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        write!(f, "{}", value as i64)
    } else {
        write!(f, "{}", value)
    }
}

// --- Parser ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Identifier(name) => write!(f, "'{}'", name),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::Power => f.write_str("'**'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    literal.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            // Exponent part, only when a digit follows so `2*E` stays a product.
            if let Some(&(_, 'e' | 'E')) = chars.peek() {
                let mut lookahead = chars.clone();
                let mut exponent = String::new();
                if let Some((_, marker)) = lookahead.next() {
                    exponent.push(marker);
                }
                if let Some(&(_, sign @ ('+' | '-'))) = lookahead.peek() {
                    exponent.push(sign);
                    lookahead.next();
                }
                if matches!(lookahead.peek(), Some((_, d)) if d.is_ascii_digit()) {
                    while let Some(&(_, d)) = lookahead.peek() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        exponent.push(d);
                        lookahead.next();
                    }
                    literal.push_str(&exponent);
                    chars = lookahead;
                }
            }
            let value = literal
                .parse::<f64>()
                .map_err(|_| ParseError::InvalidNumber {
                    literal: literal.clone(),
                    pos,
                })?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            chars.next();
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => {
                    if let Some(&(_, '*')) = chars.peek() {
                        chars.next();
                        Token::Power
                    } else {
                        Token::Star
                    }
                }
                '/' => Token::Slash,
                '^' => Token::Power,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(ParseError::UnexpectedCharacter { ch: c, pos }),
            };
            tokens.push(token);
        }
    }
    Ok(tokens)
}

/// Bounds on parser input. Evaluation, printing and differentiation all
/// recurse over the tree, so its depth must stay well inside the stack.
pub const MAX_NESTING: usize = 128;
pub const MAX_TOKENS: usize = 2048;

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    variable: &'a str,
}

impl Parser<'_> {
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

    fn expect_rparen(&mut self) -> Result<(), ParseError> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            Some(other) => Err(ParseError::UnexpectedToken {
                expected: "')'",
                found: other.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd { expected: "')'" }),
        }
    }

    fn parse_complete(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expression()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(ParseError::UnexpectedToken {
                expected: "an operator or end of expression",
                found: token.to_string(),
            }),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        // Every nesting level (parentheses, call arguments, signs, exponents)
        // passes through here.
        if self.depth >= MAX_NESTING {
            return Err(ParseError::TooDeep { limit: MAX_NESTING });
        }
        self.depth += 1;
        let expr = self.parse_signed();
        self.depth -= 1;
        expr
    }

    fn parse_signed(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(Expr::neg(self.parse_unary()?))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        if let Some(Token::Power) = self.peek() {
            self.consume();
            // Right-associative; the exponent may carry its own sign.
            let exponent = self.parse_unary()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        const OPERAND: &str = "a number, variable, function call or '('";
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Const(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    let func = Function::from_name(&name)
                        .ok_or(ParseError::UnsupportedFunction { name })?;
                    self.consume();
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::call(func, arg))
                } else if name == self.variable {
                    Ok(Expr::Var)
                } else if let Some(constant) = Constant::from_name(&name) {
                    Ok(Expr::Named(constant))
                } else if Function::from_name(&name).is_some() {
                    Err(ParseError::MissingArgument { name })
                } else {
                    Err(ParseError::UnknownVariable {
                        name,
                        expected: self.variable.to_string(),
                    })
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(other) => Err(ParseError::UnexpectedToken {
                expected: OPERAND,
                found: other.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd { expected: OPERAND }),
        }
    }
}

// --- Compiler ---

/// Turns expression text over one designated variable into evaluable functions.
#[derive(Debug, Clone)]
pub struct Compiler {
    variable: String,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new("x")
    }
}

impl Compiler {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Parses `input` into an AST.
    pub fn parse(&self, input: &str) -> Result<Expr, ParseError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ParseError::Empty);
        }
        if tokens.len() > MAX_TOKENS {
            return Err(ParseError::TooLong { limit: MAX_TOKENS });
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            variable: &self.variable,
        };
        parser.parse_complete()
    }

    /// Parses and compiles `input`, keeping its trimmed text as the source.
    pub fn compile(&self, input: &str) -> Result<CompiledFunction, ParseError> {
        let expr = self.parse(input)?;
        Ok(CompiledFunction {
            expr,
            variable: self.variable.clone(),
            source: input.trim().to_string(),
        })
    }

    /// Wraps an already built tree; its source text is the printed tree.
    pub fn compile_expr(&self, expr: Expr) -> CompiledFunction {
        let source = expr.display(&self.variable).to_string();
        CompiledFunction {
            expr,
            variable: self.variable.clone(),
            source,
        }
    }
}

/// An evaluable real function of one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    expr: Expr,
    variable: String,
    source: String,
}

impl CompiledFunction {
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// The text this function was compiled from (or its printed form when
    /// it was built from a tree).
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, x: f64) -> Result<f64, DomainError> {
        self.expr.eval(x)
    }

    /// Value and exact slope at `x` in a single dual-number pass.
    pub fn eval_with_slope(&self, x: f64) -> Result<(f64, f64), DomainError> {
        let out = self.expr.eval(Dual::variable(x))?;
        if !out.eps.is_finite() {
            return Err(DomainError::overflow("slope", x));
        }
        Ok((out.val, out.eps))
    }
}

impl RealFunction for CompiledFunction {
    fn eval(&self, x: f64) -> Result<f64, DomainError> {
        CompiledFunction::eval(self, x)
    }
}

impl fmt::Display for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr.display(&self.variable))
    }
}
