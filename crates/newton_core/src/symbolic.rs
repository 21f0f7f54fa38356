//! Symbolic differentiation over the closed expression grammar.
//!
//! [`differentiate`] applies the textbook rules node by node and hands the
//! raw result to [`simplify`], which folds constants and removes the `0`/`1`
//! noise the rules leave behind so `x**2 - 4` comes out as `2*x`.

use crate::expression::{BinaryOp, Expr, Function};

/// d/dx of `expr` with respect to the single free variable, simplified.
pub fn differentiate(expr: &Expr) -> Expr {
    simplify(&derive(expr))
}

fn derive(expr: &Expr) -> Expr {
    use BinaryOp::*;

    match expr {
        Expr::Const(_) | Expr::Named(_) => Expr::Const(0.0),
        Expr::Var => Expr::Const(1.0),
        Expr::Neg(u) => Expr::neg(derive(u)),
        Expr::Binary(op, u, v) => {
            let (u, v) = (u.as_ref(), v.as_ref());
            match op {
                Add | Sub => Expr::binary(*op, derive(u), derive(v)),
                Mul => Expr::binary(
                    Add,
                    Expr::binary(Mul, derive(u), v.clone()),
                    Expr::binary(Mul, u.clone(), derive(v)),
                ),
                Div => Expr::binary(
                    Div,
                    Expr::binary(
                        Sub,
                        Expr::binary(Mul, derive(u), v.clone()),
                        Expr::binary(Mul, u.clone(), derive(v)),
                    ),
                    Expr::binary(Pow, v.clone(), Expr::Const(2.0)),
                ),
                Pow if v.is_constant() => {
                    // n * u^(n - 1) * u'
                    Expr::binary(
                        Mul,
                        Expr::binary(
                            Mul,
                            v.clone(),
                            Expr::binary(
                                Pow,
                                u.clone(),
                                Expr::binary(Sub, v.clone(), Expr::Const(1.0)),
                            ),
                        ),
                        derive(u),
                    )
                }
                Pow if u.is_constant() => {
                    // a^v * log(a) * v'
                    Expr::binary(
                        Mul,
                        Expr::binary(
                            Mul,
                            expr.clone(),
                            Expr::call(Function::Log, u.clone()),
                        ),
                        derive(v),
                    )
                }
                Pow => {
                    // u^v * (v' * log(u) + v * u' / u)
                    Expr::binary(
                        Mul,
                        expr.clone(),
                        Expr::binary(
                            Add,
                            Expr::binary(Mul, derive(v), Expr::call(Function::Log, u.clone())),
                            Expr::binary(
                                Div,
                                Expr::binary(Mul, v.clone(), derive(u)),
                                u.clone(),
                            ),
                        ),
                    )
                }
            }
        }
        Expr::Call(func, u) => {
            let u = u.as_ref();
            let outer = match func {
                Function::Sqrt => Expr::binary(
                    Div,
                    Expr::Const(1.0),
                    Expr::binary(Mul, Expr::Const(2.0), expr.clone()),
                ),
                Function::Exp => expr.clone(),
                Function::Log => Expr::binary(Div, Expr::Const(1.0), u.clone()),
                Function::Sin => Expr::call(Function::Cos, u.clone()),
                Function::Cos => Expr::neg(Expr::call(Function::Sin, u.clone())),
                Function::Tan => Expr::binary(
                    Add,
                    Expr::binary(Pow, expr.clone(), Expr::Const(2.0)),
                    Expr::Const(1.0),
                ),
            };
            Expr::binary(Mul, outer, derive(u))
        }
    }
}

/// Bottom-up algebraic clean-up. Never changes the value of the expression
/// where it is defined.
pub fn simplify(expr: &Expr) -> Expr {
    match expr {
        Expr::Const(_) | Expr::Named(_) | Expr::Var => expr.clone(),
        Expr::Neg(inner) => simplify_neg(simplify(inner)),
        Expr::Call(func, arg) => Expr::call(*func, simplify(arg)),
        Expr::Binary(op, lhs, rhs) => simplify_binary(*op, simplify(lhs), simplify(rhs)),
    }
}

fn simplify_neg(inner: Expr) -> Expr {
    match inner {
        Expr::Const(c) => Expr::Const(-c),
        Expr::Neg(e) => *e,
        // -(a - b) reads better as b - a
        Expr::Binary(BinaryOp::Sub, a, b) => Expr::Binary(BinaryOp::Sub, b, a),
        other => Expr::neg(other),
    }
}

fn is_const(expr: &Expr, value: f64) -> bool {
    expr.as_const() == Some(value)
}

/// Folds `a op b` for literal operands, keeping the tree when the result is
/// not a clean finite number (e.g. `1/0`, `(-8)**(1/3)`).
fn fold(op: BinaryOp, a: f64, b: f64) -> Option<Expr> {
    Expr::binary(op, Expr::Const(a), Expr::Const(b))
        .eval(0.0)
        .ok()
        .map(Expr::Const)
}

fn simplify_binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    use BinaryOp::*;

    if let (Some(a), Some(b)) = (lhs.as_const(), rhs.as_const()) {
        if let Some(folded) = fold(op, a, b) {
            return folded;
        }
    }

    match op {
        Add => {
            if is_const(&lhs, 0.0) {
                return rhs;
            }
            if is_const(&rhs, 0.0) {
                return lhs;
            }
            match rhs {
                Expr::Neg(b) => Expr::Binary(Sub, Box::new(lhs), b),
                Expr::Const(c) if c < 0.0 => Expr::binary(Sub, lhs, Expr::Const(-c)),
                rhs => match lhs {
                    // -a + b reads better as b - a
                    Expr::Neg(a) => Expr::Binary(Sub, Box::new(rhs), a),
                    lhs => Expr::binary(Add, lhs, rhs),
                },
            }
        }
        Sub => {
            if is_const(&rhs, 0.0) {
                return lhs;
            }
            if is_const(&lhs, 0.0) {
                return simplify_neg(rhs);
            }
            if lhs == rhs {
                return Expr::Const(0.0);
            }
            match rhs {
                Expr::Neg(b) => Expr::Binary(Add, Box::new(lhs), b),
                Expr::Const(c) if c < 0.0 => Expr::binary(Add, lhs, Expr::Const(-c)),
                rhs => Expr::binary(Sub, lhs, rhs),
            }
        }
        Mul => {
            if is_const(&lhs, 0.0) || is_const(&rhs, 0.0) {
                return Expr::Const(0.0);
            }
            if is_const(&lhs, 1.0) {
                return rhs;
            }
            if is_const(&rhs, 1.0) {
                return lhs;
            }
            if is_const(&lhs, -1.0) {
                return simplify_neg(rhs);
            }
            if is_const(&rhs, -1.0) {
                return simplify_neg(lhs);
            }
            match (lhs, rhs) {
                (Expr::Neg(a), b) | (b, Expr::Neg(a)) => {
                    simplify_neg(simplify_binary(Mul, *a, b))
                }
                // constants to the left: x*2 -> 2*x
                (a, Expr::Const(c)) if a.as_const().is_none() => {
                    simplify_binary(Mul, Expr::Const(c), a)
                }
                // c1*(c2*a) -> (c1*c2)*a
                (Expr::Const(c1), Expr::Binary(Mul, inner_lhs, inner_rhs))
                    if inner_lhs.as_const().is_some() =>
                {
                    let c2 = inner_lhs.as_const().unwrap_or(1.0);
                    match fold(Mul, c1, c2) {
                        Some(c) => simplify_binary(Mul, c, *inner_rhs),
                        None => Expr::binary(
                            Mul,
                            Expr::Const(c1),
                            Expr::Binary(Mul, inner_lhs, inner_rhs),
                        ),
                    }
                }
                // u*u -> u**2
                (a, b) if a == b => Expr::binary(Pow, a, Expr::Const(2.0)),
                (a, b) => Expr::binary(Mul, a, b),
            }
        }
        Div => {
            if is_const(&rhs, 1.0) {
                return lhs;
            }
            if is_const(&lhs, 0.0) && !is_const(&rhs, 0.0) {
                return Expr::Const(0.0);
            }
            match (lhs, rhs) {
                (Expr::Neg(a), b) => simplify_neg(simplify_binary(Div, *a, b)),
                (a, Expr::Neg(b)) => simplify_neg(simplify_binary(Div, a, *b)),
                (a, b) => Expr::binary(Div, a, b),
            }
        }
        Pow => {
            if is_const(&rhs, 0.0) {
                return Expr::Const(1.0);
            }
            if is_const(&rhs, 1.0) {
                return lhs;
            }
            if is_const(&lhs, 1.0) {
                return Expr::Const(1.0);
            }
            match lhs {
                // (u^a)^b -> u^(a*b) only for integer literals, where it is exact
                Expr::Binary(Pow, base, inner_exp)
                    if is_integer_literal(&inner_exp) && is_integer_literal(&rhs) =>
                {
                    let exponent = simplify_binary(Mul, *inner_exp, rhs);
                    simplify_binary(Pow, *base, exponent)
                }
                lhs => Expr::binary(Pow, lhs, rhs),
            }
        }
    }
}

fn is_integer_literal(expr: &Expr) -> bool {
    matches!(expr.as_const(), Some(c) if c.fract() == 0.0)
}
