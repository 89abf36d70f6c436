//! RDDB - in-memory deductive database engine
//!
//! # Architecture
//!
//! - **Data model**: terms, tuples, predicates, atoms, literals, rules
//! - **Fact store**: deduplicated, timestamped relations per predicate
//! - **Stratifier**: orders rules so negation only reads finished predicates
//! - **Rule compiler**: one rule becomes a pipeline of view/join/anti-join/
//!   built-in/head-substitution elements
//! - **Semi-naive evaluator**: drives each stratum to a fixpoint through
//!   delta relations; a naive reference evaluator computes the same model
//!
//! # Usage example
//!
//! ```
//! use rddb::{Atom, Config, Facts, KnowledgeBase, Literal, Rule, Term};
//!
//! # fn main() -> rddb::Result<()> {
//! let mut facts = Facts::new();
//! facts.add_fact(&Atom::new("edge", vec![Term::constant("a"), Term::constant("b")]))?;
//! facts.add_fact(&Atom::new("edge", vec![Term::constant("b"), Term::constant("c")]))?;
//!
//! // path(X, Y) :- edge(X, Y).
//! // path(X, Y) :- path(X, Z), edge(Z, Y).
//! let rules = vec![
//!     Rule::new(
//!         Atom::new("path", vec![Term::var("X"), Term::var("Y")]),
//!         vec![Literal::positive(Atom::new("edge", vec![Term::var("X"), Term::var("Y")]))],
//!     ),
//!     Rule::new(
//!         Atom::new("path", vec![Term::var("X"), Term::var("Y")]),
//!         vec![
//!             Literal::positive(Atom::new("path", vec![Term::var("X"), Term::var("Z")])),
//!             Literal::positive(Atom::new("edge", vec![Term::var("Z"), Term::var("Y")])),
//!         ],
//!     ),
//! ];
//!
//! let kb = KnowledgeBase::new(facts, rules, Config::default())?;
//! let (result, variables) = kb.query(&[Literal::positive(Atom::new(
//!     "path",
//!     vec![Term::constant("a"), Term::var("Y")],
//! ))])?;
//! assert_eq!(variables, vec!["Y"]);
//! assert_eq!(result.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod builtins;
pub mod compiler;
pub mod config;
pub mod error;
pub mod eval;
pub mod facts;
pub mod model;
pub mod safety;
pub mod stratify;

pub use compiler::{CompiledRule, RuleCompiler};
pub use config::{Config, DivideByZeroBehaviour, EvaluatorKind};
pub use error::{EvalError, Result};
pub use eval::{KnowledgeBase, NaiveEvaluator, RuleEvaluator, SemiNaiveEvaluator};
pub use facts::{Facts, Relation, ALWAYS_VALID};
pub use model::{Atom, BuiltinAtom, Literal, Predicate, Rule, Term, Tuple, Value};
pub use stratify::{stratify, DependencyGraph, Stratification};

pub use builtins::Builtin;
