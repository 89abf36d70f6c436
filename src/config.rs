//! Evaluation configuration
//!
//! All knobs are plain fields on [`Config`]; a `Config` value is passed
//! explicitly wherever it is needed. There is no process-wide configuration
//! state.

/// What to do when a built-in divides by zero during evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DivideByZeroBehaviour {
    /// Abort the evaluation with an error.
    Stop,
    /// Silently drop the offending tuple and continue.
    DiscardAndIgnore,
}

/// Which fixpoint strategy drives each stratum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluatorKind {
    /// Delta-driven iteration (the default).
    SemiNaive,
    /// Full re-evaluation each round. Slower; kept as the reference strategy.
    Naive,
}

/// Knowledge-base configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Wall-clock budget for one evaluation run, in milliseconds. 0 = unlimited.
    pub evaluation_timeout_ms: u64,

    /// Upper bound on the total number of stored tuples. 0 = unlimited.
    pub evaluation_max_tuples: usize,

    /// Upper bound on constructed-term nesting depth in derived tuples.
    /// 0 = unlimited.
    pub evaluation_max_complexity: usize,

    /// Divide-by-zero policy for arithmetic built-ins.
    pub evaluation_divide_by_zero_behaviour: DivideByZeroBehaviour,

    /// Accept rules whose negated ordinary literals contain variables that are
    /// not bound by any positive literal.
    pub rule_safety_allow_unlimited_variables_in_negated_ordinary_predicates: bool,

    /// Treat the computable position of a ternary arithmetic built-in as
    /// limited, e.g. `?Z` in `?X + ?Y = ?Z` when `?X` and `?Y` are limited.
    pub rule_safety_ternary_targets_imply_limited: bool,

    /// Fixpoint strategy.
    pub evaluator: EvaluatorKind,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            evaluation_timeout_ms: 0,
            evaluation_max_tuples: 0,
            evaluation_max_complexity: 0,
            evaluation_divide_by_zero_behaviour: DivideByZeroBehaviour::DiscardAndIgnore,
            rule_safety_allow_unlimited_variables_in_negated_ordinary_predicates: false,
            rule_safety_ternary_targets_imply_limited: true,
            evaluator: EvaluatorKind::SemiNaive,
        }
    }
}
