//! Naive fixpoint evaluation
//!
//! Re-runs every rule against the full store each round until nothing new
//! is derived. Slower than the semi-naive strategy but trivially correct;
//! the two must compute identical models.

use tracing::trace;

use crate::compiler::CompiledRule;
use crate::error::Result;
use crate::facts::Facts;

use super::{EvalContext, RuleEvaluator};

pub struct NaiveEvaluator;

impl RuleEvaluator for NaiveEvaluator {
    fn evaluate_rules(
        &self,
        rules: &[CompiledRule],
        facts: &mut Facts,
        ctx: &EvalContext<'_>,
    ) -> Result<usize> {
        let mut rounds = 0;

        loop {
            ctx.check_limits(facts, rounds)?;
            if ctx.is_cancelled() {
                break;
            }

            let mut derived_round = Facts::new();

            for rule in rules {
                let Some(predicate) = rule.head_predicate() else {
                    continue;
                };
                let derived = rule.evaluate(facts)?;
                for tuple in derived.iter() {
                    if !facts.contains(predicate, tuple) {
                        derived_round.relation_mut(predicate).add(tuple.clone());
                    }
                }
            }

            if derived_round.is_empty() {
                break;
            }

            trace!(
                stratum = ctx.stratum,
                round = rounds,
                new_tuples = derived_round.tuple_count(),
                "naive round finished"
            );

            facts.merge(&derived_round, ctx.timestamp);
            rounds += 1;
        }

        Ok(rounds)
    }
}
