//! Built-in predicates
//!
//! The evaluator treats built-ins as opaque: a built-in exposes its predicate
//! identity, how many unbound variables it can resolve, and an `evaluate`
//! function that receives the argument tuple with all bound positions already
//! substituted with constants. The full catalog of date/string/list functions
//! lives outside this crate; the arithmetic and comparison set below is what
//! the engine itself ships.

use std::sync::Arc;

use thiserror::Error;

use crate::model::{Predicate, Term, Tuple, Value};

/// Failure modes of built-in evaluation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuiltinError {
    #[error("divide by zero")]
    DivideByZero,

    /// A position the built-in cannot resolve was left unbound. Rules passing
    /// the safety check never trigger this.
    #[error("unbound variable ?{0}")]
    UnboundVariable(String),
}

pub type BuiltinResult = std::result::Result<Option<Tuple>, BuiltinError>;

/// The evaluate/compute contract of a built-in predicate.
pub trait Builtin: Send + Sync {
    /// The predicate identity of this built-in.
    fn predicate(&self) -> Predicate;

    /// How many distinct unbound variables `evaluate` can resolve.
    fn max_unknown_variables(&self) -> usize {
        0
    }

    /// Evaluate the built-in for a tuple whose bound positions hold ground
    /// terms. Returns the fully ground tuple on success, `None` when the
    /// built-in is unsatisfiable for these bindings.
    fn evaluate(&self, tuple: &Tuple) -> BuiltinResult;
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
enum ComparisonKind {
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

struct Comparison {
    kind: ComparisonKind,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self.kind {
            ComparisonKind::NotEqual => "NOT_EQUAL",
            ComparisonKind::Less => "LESS",
            ComparisonKind::LessEqual => "LESS_EQUAL",
            ComparisonKind::Greater => "GREATER",
            ComparisonKind::GreaterEqual => "GREATER_EQUAL",
        }
    }
}

impl Builtin for Comparison {
    fn predicate(&self) -> Predicate {
        Predicate::new(self.symbol(), 2)
    }

    fn evaluate(&self, tuple: &Tuple) -> BuiltinResult {
        let (a, b) = binary_ground(tuple)?;

        let holds = match self.kind {
            ComparisonKind::NotEqual => a != b,
            ComparisonKind::Less => a < b,
            ComparisonKind::LessEqual => a <= b,
            ComparisonKind::Greater => a > b,
            ComparisonKind::GreaterEqual => a >= b,
        };

        Ok(if holds { Some(tuple.clone()) } else { None })
    }
}

/// Equality with single-sided assignment: `EQUAL(?X, 'a')` binds `?X`.
struct Equal;

impl Builtin for Equal {
    fn predicate(&self) -> Predicate {
        Predicate::new("EQUAL", 2)
    }

    fn max_unknown_variables(&self) -> usize {
        1
    }

    fn evaluate(&self, tuple: &Tuple) -> BuiltinResult {
        debug_assert_eq!(tuple.arity(), 2);
        let a = &tuple.terms()[0];
        let b = &tuple.terms()[1];

        match (a.is_ground(), b.is_ground()) {
            (true, true) => Ok(if a == b { Some(tuple.clone()) } else { None }),
            (true, false) => assign(b, a),
            (false, true) => assign(a, b),
            (false, false) => Err(unbound(a)),
        }
    }
}

fn assign(open: &Term, ground: &Term) -> BuiltinResult {
    match open {
        Term::Variable(_) => Ok(Some(Tuple::new(vec![ground.clone(), ground.clone()]))),
        // A constructed term with variables inside cannot be assigned wholesale.
        _ => Err(unbound(open)),
    }
}

fn unbound(term: &Term) -> BuiltinError {
    let mut vars = Vec::new();
    term.collect_variables(&mut vars);
    BuiltinError::UnboundVariable(vars.into_iter().next().unwrap_or_default())
}

fn binary_ground(tuple: &Tuple) -> std::result::Result<(&Term, &Term), BuiltinError> {
    debug_assert_eq!(tuple.arity(), 2);
    let a = &tuple.terms()[0];
    let b = &tuple.terms()[1];
    if !a.is_ground() {
        return Err(unbound(a));
    }
    if !b.is_ground() {
        return Err(unbound(b));
    }
    Ok((a, b))
}

// ---------------------------------------------------------------------------
// Ternary integer arithmetic: a OP b = c
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

struct Arithmetic {
    op: ArithmeticOp,
}

impl Arithmetic {
    fn symbol(&self) -> &'static str {
        match self.op {
            ArithmeticOp::Add => "ADD",
            ArithmeticOp::Subtract => "SUBTRACT",
            ArithmeticOp::Multiply => "MULTIPLY",
            ArithmeticOp::Divide => "DIVIDE",
        }
    }

    /// `a OP b`, or `None` when undefined over the integers (overflow,
    /// inexact division).
    fn forward(&self, a: i64, b: i64) -> std::result::Result<Option<i64>, BuiltinError> {
        match self.op {
            ArithmeticOp::Add => Ok(a.checked_add(b)),
            ArithmeticOp::Subtract => Ok(a.checked_sub(b)),
            ArithmeticOp::Multiply => Ok(a.checked_mul(b)),
            ArithmeticOp::Divide => {
                if b == 0 {
                    return Err(BuiltinError::DivideByZero);
                }
                // Division is exact: a / b = c only when c * b = a.
                Ok(a.checked_div(b).filter(|q| q.checked_mul(b) == Some(a)))
            }
        }
    }

    /// Solve for the operand at `position` (0 = a, 1 = b) given the result.
    fn solve(&self, position: usize, other: i64, result: i64) -> Option<i64> {
        match (self.op, position) {
            (ArithmeticOp::Add, _) => result.checked_sub(other),
            (ArithmeticOp::Subtract, 0) => result.checked_add(other),
            (ArithmeticOp::Subtract, _) => other.checked_sub(result),
            (ArithmeticOp::Multiply, _) => exact_quotient(result, other),
            (ArithmeticOp::Divide, 0) => result.checked_mul(other),
            (ArithmeticOp::Divide, _) => {
                // b with a / b = c; b = 0 is never a solution.
                exact_quotient(other, result).filter(|b| *b != 0)
            }
        }
    }
}

impl Builtin for Arithmetic {
    fn predicate(&self) -> Predicate {
        Predicate::new(self.symbol(), 3)
    }

    fn max_unknown_variables(&self) -> usize {
        1
    }

    fn evaluate(&self, tuple: &Tuple) -> BuiltinResult {
        debug_assert_eq!(tuple.arity(), 3);

        let mut known: [Option<i64>; 3] = [None; 3];
        let mut open: Option<usize> = None;

        for (i, term) in tuple.iter().enumerate() {
            match term {
                Term::Variable(name) => {
                    if open.is_some() {
                        return Err(BuiltinError::UnboundVariable(name.clone()));
                    }
                    open = Some(i);
                }
                Term::Constant(Value::Int(v)) => known[i] = Some(*v),
                // Non-numeric ground operand: unsatisfiable, not an error.
                t if t.is_ground() => return Ok(None),
                t => return Err(unbound(t)),
            }
        }

        let computed = match open {
            None => {
                let (a, b, c) = (known[0].unwrap(), known[1].unwrap(), known[2].unwrap());
                return Ok(match self.forward(a, b)? {
                    Some(r) if r == c => Some(tuple.clone()),
                    _ => None,
                });
            }
            Some(2) => self.forward(known[0].unwrap(), known[1].unwrap())?,
            Some(0) => self.solve(0, known[1].unwrap(), known[2].unwrap()),
            _ => self.solve(1, known[0].unwrap(), known[2].unwrap()),
        };

        let value = match computed {
            Some(v) => v,
            None => return Ok(None),
        };

        let terms = tuple
            .iter()
            .enumerate()
            .map(|(i, term)| {
                if open == Some(i) {
                    Term::constant(value)
                } else {
                    term.clone()
                }
            })
            .collect();

        Ok(Some(Tuple::new(terms)))
    }
}

/// `dividend / divisor` when the division is exact, otherwise `None`.
fn exact_quotient(dividend: i64, divisor: i64) -> Option<i64> {
    if divisor == 0 {
        return None;
    }
    dividend
        .checked_div(divisor)
        .filter(|q| q.checked_mul(divisor) == Some(dividend))
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

pub fn equal() -> Arc<dyn Builtin> {
    Arc::new(Equal)
}

pub fn not_equal() -> Arc<dyn Builtin> {
    Arc::new(Comparison {
        kind: ComparisonKind::NotEqual,
    })
}

pub fn less() -> Arc<dyn Builtin> {
    Arc::new(Comparison {
        kind: ComparisonKind::Less,
    })
}

pub fn less_equal() -> Arc<dyn Builtin> {
    Arc::new(Comparison {
        kind: ComparisonKind::LessEqual,
    })
}

pub fn greater() -> Arc<dyn Builtin> {
    Arc::new(Comparison {
        kind: ComparisonKind::Greater,
    })
}

pub fn greater_equal() -> Arc<dyn Builtin> {
    Arc::new(Comparison {
        kind: ComparisonKind::GreaterEqual,
    })
}

pub fn add() -> Arc<dyn Builtin> {
    Arc::new(Arithmetic {
        op: ArithmeticOp::Add,
    })
}

pub fn subtract() -> Arc<dyn Builtin> {
    Arc::new(Arithmetic {
        op: ArithmeticOp::Subtract,
    })
}

pub fn multiply() -> Arc<dyn Builtin> {
    Arc::new(Arithmetic {
        op: ArithmeticOp::Multiply,
    })
}

pub fn divide() -> Arc<dyn Builtin> {
    Arc::new(Arithmetic {
        op: ArithmeticOp::Divide,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Term {
        Term::constant(v)
    }

    #[test]
    fn add_computes_each_position() {
        let b = add();
        // 1 + 2 = ?Z
        let out = b
            .evaluate(&Tuple::new(vec![int(1), int(2), Term::var("Z")]))
            .unwrap()
            .unwrap();
        assert_eq!(out.terms()[2], int(3));

        // ?X + 2 = 3
        let out = b
            .evaluate(&Tuple::new(vec![Term::var("X"), int(2), int(3)]))
            .unwrap()
            .unwrap();
        assert_eq!(out.terms()[0], int(1));

        // 1 + ?Y = 3
        let out = b
            .evaluate(&Tuple::new(vec![int(1), Term::var("Y"), int(3)]))
            .unwrap()
            .unwrap();
        assert_eq!(out.terms()[1], int(2));
    }

    #[test]
    fn add_checks_when_fully_bound() {
        let b = add();
        assert!(b
            .evaluate(&Tuple::new(vec![int(1), int(2), int(3)]))
            .unwrap()
            .is_some());
        assert!(b
            .evaluate(&Tuple::new(vec![int(1), int(2), int(4)]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn multiply_requires_exact_factorization() {
        let b = multiply();
        // ?X * 2 = 7 has no integer solution
        assert!(b
            .evaluate(&Tuple::new(vec![Term::var("X"), int(2), int(7)]))
            .unwrap()
            .is_none());
        let out = b
            .evaluate(&Tuple::new(vec![Term::var("X"), int(2), int(8)]))
            .unwrap()
            .unwrap();
        assert_eq!(out.terms()[0], int(4));
    }

    #[test]
    fn divide_by_zero_is_an_error() {
        let b = divide();
        assert_eq!(
            b.evaluate(&Tuple::new(vec![int(6), int(0), Term::var("Z")])),
            Err(BuiltinError::DivideByZero)
        );
    }

    #[test]
    fn non_numeric_operand_is_unsatisfiable() {
        let b = add();
        assert!(b
            .evaluate(&Tuple::new(vec![Term::constant("a"), int(2), Term::var("Z")]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn equal_assigns_the_open_side() {
        let b = equal();
        let out = b
            .evaluate(&Tuple::new(vec![Term::var("X"), Term::constant("a")]))
            .unwrap()
            .unwrap();
        assert_eq!(out.terms()[0], Term::constant("a"));

        assert!(b
            .evaluate(&Tuple::new(vec![Term::constant("a"), Term::constant("b")]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn comparisons_follow_term_order() {
        assert!(less()
            .evaluate(&Tuple::new(vec![int(1), int(2)]))
            .unwrap()
            .is_some());
        assert!(greater()
            .evaluate(&Tuple::new(vec![int(1), int(2)]))
            .unwrap()
            .is_none());
        assert!(not_equal()
            .evaluate(&Tuple::new(vec![int(1), int(2)]))
            .unwrap()
            .is_some());
    }

    #[test]
    fn unbound_comparison_operand_is_rejected() {
        assert_eq!(
            less().evaluate(&Tuple::new(vec![Term::var("X"), int(2)])),
            Err(BuiltinError::UnboundVariable("X".to_string()))
        );
    }

    #[test]
    fn two_unknowns_are_rejected() {
        assert!(matches!(
            add().evaluate(&Tuple::new(vec![Term::var("X"), Term::var("Y"), int(3)])),
            Err(BuiltinError::UnboundVariable(_))
        ));
    }
}
