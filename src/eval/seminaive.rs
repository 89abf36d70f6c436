//! Semi-naive fixpoint evaluation
//!
//! One full pass seeds the deltas, then each round re-derives only through
//! the previous round's newly derived tuples. See Ullman, vol. 1.

use tracing::{debug, trace};

use crate::compiler::CompiledRule;
use crate::error::Result;
use crate::facts::{Facts, ALWAYS_VALID};

use super::{EvalContext, RuleEvaluator};

pub struct SemiNaiveEvaluator;

impl RuleEvaluator for SemiNaiveEvaluator {
    fn evaluate_rules(
        &self,
        rules: &[CompiledRule],
        facts: &mut Facts,
        ctx: &EvalContext<'_>,
    ) -> Result<usize> {
        // Seed pass: every rule runs against the full store once; only
        // tuples not already known become the first delta.
        let mut deltas = Facts::new();
        for rule in rules {
            let Some(predicate) = rule.head_predicate() else {
                continue;
            };
            let derived = rule.evaluate(facts)?;
            for tuple in derived.iter() {
                if !facts.contains(predicate, tuple) {
                    deltas.relation_mut(predicate).add(tuple.clone());
                }
            }
        }
        facts.merge(&deltas, ctx.timestamp);

        let mut rounds = 0;

        while !deltas.is_empty() {
            ctx.check_limits(facts, rounds)?;
            if ctx.is_cancelled() {
                debug!(stratum = ctx.stratum, "evaluation cancelled mid-stratum");
                break;
            }
            rounds += 1;

            let mut next = Facts::new();

            for rule in rules {
                let Some(predicate) = rule.head_predicate() else {
                    continue;
                };

                let derived = rule.evaluate_delta(facts, &deltas)?;

                for tuple in derived.iter() {
                    if facts.contains(predicate, tuple) {
                        // Already known: discard, but stamp a previously
                        // unstamped tuple so the streaming cleanup sees it
                        // as re-derived at this timestamp.
                        if ctx.timestamp != ALWAYS_VALID {
                            let relation = facts.relation_mut(predicate);
                            if relation.timestamp(tuple) == Some(ALWAYS_VALID) {
                                relation.set_timestamp(tuple, ctx.timestamp);
                            }
                        }
                    } else {
                        next.relation_mut(predicate).add(tuple.clone());
                    }
                }
            }

            trace!(
                stratum = ctx.stratum,
                round = rounds,
                new_tuples = next.tuple_count(),
                "semi-naive round finished"
            );

            facts.merge(&next, ctx.timestamp);
            deltas = next;
        }

        Ok(rounds)
    }
}
