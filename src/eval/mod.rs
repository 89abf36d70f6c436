//! Stratified bottom-up evaluation
//!
//! The [`KnowledgeBase`] drives the whole pipeline: rule safety check and
//! stratification up front (fail fast, before any facts are touched), then
//! per stratum compile-and-run to a fixpoint with the configured evaluator.
//! Streamed facts enter through [`KnowledgeBase::add_facts`], which re-runs
//! the evaluation at the facts' logical timestamp; expired tuples leave
//! through [`KnowledgeBase::clean`].

mod naive;
mod seminaive;

pub use naive::NaiveEvaluator;
pub use seminaive::SemiNaiveEvaluator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::compiler::{CompiledRule, RuleCompiler};
use crate::config::{Config, EvaluatorKind};
use crate::error::{EvalError, Result};
use crate::facts::{Facts, Relation, ALWAYS_VALID};
use crate::model::{Literal, Predicate, Rule};
use crate::safety;
use crate::stratify;

/// Per-stratum evaluation context: configuration, the run's logical
/// timestamp, and the shared limits.
pub struct EvalContext<'a> {
    pub(crate) config: &'a Config,
    pub(crate) stratum: usize,
    pub(crate) timestamp: i64,
    pub(crate) started: Instant,
    pub(crate) cancel: &'a AtomicBool,
}

impl EvalContext<'_> {
    /// Enforce the timeout and tuple-count limits at a round boundary.
    pub(crate) fn check_limits(&self, facts: &Facts, round: usize) -> Result<()> {
        if self.config.evaluation_timeout_ms > 0
            && self.started.elapsed() >= Duration::from_millis(self.config.evaluation_timeout_ms)
        {
            return Err(EvalError::Timeout {
                stratum: self.stratum,
                round,
            });
        }

        if self.config.evaluation_max_tuples > 0 {
            let count = facts.tuple_count();
            if count > self.config.evaluation_max_tuples {
                return Err(EvalError::TupleLimitExceeded {
                    stratum: self.stratum,
                    round,
                    count,
                });
            }
        }

        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// A fixpoint strategy for one stratum's compiled rules.
///
/// Returns the number of delta rounds executed. The facts store is mutated
/// only by merging each round's deltas, strictly round-by-round.
pub trait RuleEvaluator {
    fn evaluate_rules(
        &self,
        rules: &[CompiledRule],
        facts: &mut Facts,
        ctx: &EvalContext<'_>,
    ) -> Result<usize>;
}

/// A set of facts and rules evaluated to its minimal model.
pub struct KnowledgeBase {
    facts: Facts,
    strata: Vec<Vec<Rule>>,
    config: Config,
    cancel: Arc<AtomicBool>,
    last_round_counts: Vec<usize>,
}

impl KnowledgeBase {
    /// Create a knowledge base and evaluate it.
    ///
    /// Rule safety and stratification failures are reported before any
    /// evaluation work begins. The initial model is stamped as permanent;
    /// facts injected later via [`add_facts`](Self::add_facts) carry their
    /// own timestamps.
    pub fn new(facts: Facts, rules: Vec<Rule>, config: Config) -> Result<Self> {
        safety::check_rules(&rules, &config)?;
        let stratification = stratify::stratify(&rules)?;

        let mut kb = KnowledgeBase {
            facts,
            strata: stratification.strata,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            last_round_counts: Vec::new(),
        };
        kb.evaluate(ALWAYS_VALID)?;

        Ok(kb)
    }

    /// Inject ground facts with a logical timestamp and re-evaluate.
    ///
    /// This is the sole entry point for streamed facts; it must only be
    /// called between evaluation runs, and each run works on the snapshot
    /// taken when it starts. On error the store keeps whatever partial
    /// state the run reached.
    pub fn add_facts(&mut self, new_facts: Facts, timestamp: i64) -> Result<()> {
        self.facts.add_all(&new_facts, timestamp)?;
        self.evaluate(timestamp)
    }

    /// Purge every tuple whose timestamp is older than `threshold`.
    /// Permanent tuples are kept. Returns how many tuples were removed.
    pub fn clean(&mut self, threshold: i64) -> usize {
        let removed = self.facts.clean(threshold);
        debug!(removed, threshold, "cleaned expired tuples");
        removed
    }

    /// Run a query against the final model: compile the literals, evaluate
    /// once, and return the result relation together with the ordered
    /// output variable names.
    pub fn query(&self, literals: &[Literal]) -> Result<(Relation, Vec<String>)> {
        let compiler = RuleCompiler::new(&self.config);
        let compiled = compiler.compile_query(literals)?;
        let result = compiled.evaluate(&self.facts)?;
        Ok((result, compiled.output_variables()))
    }

    /// The final relation for a predicate, if any tuples were derived or
    /// stored for it.
    pub fn relation(&self, predicate: &Predicate) -> Option<&Relation> {
        self.facts.relation(predicate)
    }

    /// The full fact store.
    pub fn facts(&self) -> &Facts {
        &self.facts
    }

    /// Cooperative cancellation token. Setting it makes a running
    /// evaluation exit at the next round or stratum boundary, leaving the
    /// store consistent but possibly incomplete.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Delta rounds per stratum from the most recent evaluation run.
    pub fn last_round_counts(&self) -> &[usize] {
        &self.last_round_counts
    }

    fn evaluate(&mut self, timestamp: i64) -> Result<()> {
        let compiler = RuleCompiler::new(&self.config);
        let started = Instant::now();
        self.last_round_counts.clear();

        for (stratum, rules) in self.strata.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                debug!(stratum, "evaluation cancelled before stratum");
                break;
            }

            let compiled = rules
                .iter()
                .map(|rule| compiler.compile(rule))
                .collect::<Result<Vec<_>>>()?;

            let ctx = EvalContext {
                config: &self.config,
                stratum,
                timestamp,
                started,
                cancel: self.cancel.as_ref(),
            };

            let rounds = match self.config.evaluator {
                EvaluatorKind::SemiNaive => {
                    SemiNaiveEvaluator.evaluate_rules(&compiled, &mut self.facts, &ctx)?
                }
                EvaluatorKind::Naive => {
                    NaiveEvaluator.evaluate_rules(&compiled, &mut self.facts, &ctx)?
                }
            };
            self.last_round_counts.push(rounds);

            debug!(
                stratum,
                rounds,
                tuples = self.facts.tuple_count(),
                "stratum evaluated"
            );
        }

        Ok(())
    }
}
