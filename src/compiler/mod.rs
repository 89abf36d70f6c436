//! Rule compilation
//!
//! Turns one rule into a linear pipeline of elements: a view of the first
//! subgoal, joins/anti-joins/built-ins for the remaining literals, and a
//! head substitution producing the derived tuples. Literals whose variables
//! are not yet bound are skipped and retried once later literals have bound
//! them, so a body like `not s(?X), r(?X)` still compiles correctly.

mod element;

use std::collections::HashSet;

use crate::config::Config;
use crate::error::{EvalError, Result};
use crate::facts::{Facts, Relation};
use crate::model::{Literal, Predicate, Rule, Tuple};

use element::{AntiJoin, BuiltinElement, HeadSubstitution, Join, Row, RuleElement, View};

/// A rule compiled into an executable pipeline.
#[derive(Debug)]
pub struct CompiledRule {
    elements: Vec<RuleElement>,
    head_predicate: Option<Predicate>,
}

impl CompiledRule {
    /// The predicate this rule derives into; `None` for compiled queries.
    pub fn head_predicate(&self) -> Option<&Predicate> {
        self.head_predicate.as_ref()
    }

    /// The ordered variable names of the final accumulated row. Only
    /// meaningful for compiled queries, where it names the result columns.
    pub fn output_variables(&self) -> Vec<String> {
        self.elements
            .last()
            .map(|e| e.output_variables().to_vec())
            .unwrap_or_default()
    }

    /// Run the pipeline against the full fact store.
    pub fn evaluate(&self, facts: &Facts) -> Result<Relation> {
        self.run(facts, None)
    }

    /// Run the delta-substituted variants of the pipeline: one run per
    /// element that can read the delta store, unioned. Elements without a
    /// meaningful delta version are skipped, so a rule over predicates
    /// absent from the deltas derives nothing.
    pub fn evaluate_delta(&self, facts: &Facts, deltas: &Facts) -> Result<Relation> {
        let mut union = Relation::new();

        for (position, element) in self.elements.iter().enumerate() {
            if let Some(substitute) = element.delta_substitution(deltas) {
                let result = self.run(facts, Some((position, &substitute, deltas)))?;
                for tuple in result.iter() {
                    union.add(tuple.clone());
                }
            }
        }

        Ok(union)
    }

    fn run(
        &self,
        facts: &Facts,
        substitution: Option<(usize, &RuleElement, &Facts)>,
    ) -> Result<Relation> {
        // The pipeline is seeded with a single zero-length row.
        let mut rows: Vec<Row> = vec![Vec::new()];

        for (position, element) in self.elements.iter().enumerate() {
            let (element, deltas) = match substitution {
                Some((p, substitute, deltas)) if p == position => (substitute, Some(deltas)),
                _ => (element, None),
            };

            rows = element.process(&rows, facts, deltas)?;

            // Literals are conjunctive: an empty intermediate ends the run.
            if rows.is_empty() {
                break;
            }

            if rows.len() > 1 {
                let mut seen = HashSet::with_capacity(rows.len());
                rows.retain(|row| seen.insert(row.clone()));
            }
        }

        let mut relation = Relation::new();
        for row in rows {
            relation.add(Tuple::new(row));
        }

        if let Some(predicate) = &self.head_predicate {
            debug_assert!(relation
                .iter()
                .all(|tuple| predicate.matches_arity(tuple.arity())));
        }

        Ok(relation)
    }
}

/// Compiles rules and queries against a configuration.
pub struct RuleCompiler {
    config: Config,
}

impl RuleCompiler {
    /// Create a new compiler.
    pub fn new(config: &Config) -> Self {
        RuleCompiler {
            config: config.clone(),
        }
    }

    /// Compile a rule. The rule is assumed to have passed the safety check;
    /// violations that surface anyway are reported as unsafe-rule errors.
    pub fn compile(&self, rule: &Rule) -> Result<CompiledRule> {
        let label = rule.to_string();
        let (mut elements, variables) = self.compile_body(rule.body(), &label)?;

        let head = HeadSubstitution::new(
            variables,
            rule.head().tuple(),
            self.config.evaluation_max_complexity,
            &label,
        )?;
        elements.push(RuleElement::Head(head));

        Ok(CompiledRule {
            elements,
            head_predicate: Some(rule.predicate()),
        })
    }

    /// Compile a query: a rule body without a head. The result relation
    /// holds the accumulated bindings, named by `output_variables`.
    pub fn compile_query(&self, literals: &[Literal]) -> Result<CompiledRule> {
        let label = literals
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let (elements, _) = self.compile_body(literals, &format!("?- {}", label))?;

        Ok(CompiledRule {
            elements,
            head_predicate: None,
        })
    }

    fn compile_body(
        &self,
        literals: &[Literal],
        label: &str,
    ) -> Result<(Vec<RuleElement>, Vec<String>)> {
        // Variables some positive ordinary literal will eventually bind;
        // negated literals wait for these before they compile.
        let mut positive_variables = Vec::new();
        for literal in literals {
            if literal.is_positive() && !literal.atom().is_builtin() {
                literal
                    .atom()
                    .tuple()
                    .collect_variables(&mut positive_variables);
            }
        }

        let mut remaining: Vec<&Literal> = literals.iter().collect();
        let mut elements: Vec<RuleElement> = Vec::new();
        let mut variables: Vec<String> = Vec::new();

        while !remaining.is_empty() {
            let mut compiled: Option<(usize, RuleElement)> = None;
            let mut last_error: Option<EvalError> = None;

            for (i, literal) in remaining.iter().enumerate() {
                match self.try_element(literal, &variables, &positive_variables, label) {
                    Ok(element) => {
                        compiled = Some((i, element));
                        break;
                    }
                    // Try the next literal; this one may compile after more
                    // variables are bound.
                    Err(error) => last_error = Some(error),
                }
            }

            match compiled {
                Some((i, element)) => {
                    variables = element.output_variables().to_vec();
                    elements.push(element);
                    remaining.remove(i);
                }
                None => {
                    // No literal made progress, so the last error is real.
                    return Err(last_error.unwrap_or_else(|| EvalError::RuleUnsafe {
                        rule: label.to_string(),
                        reason: "no literal could be compiled".to_string(),
                    }));
                }
            }
        }

        Ok((elements, variables))
    }

    fn try_element(
        &self,
        literal: &Literal,
        variables: &[String],
        positive_variables: &[String],
        label: &str,
    ) -> Result<RuleElement> {
        let atom = literal.atom();

        if let Some(builtin) = atom.as_builtin() {
            let element = BuiltinElement::new(
                variables,
                builtin.clone(),
                literal.is_positive(),
                self.config.evaluation_divide_by_zero_behaviour,
                label,
            )?;
            return Ok(RuleElement::Builtin(element));
        }

        let predicate = atom.predicate();
        let criteria = atom.tuple().clone();

        if literal.is_positive() {
            if variables.is_empty() {
                Ok(RuleElement::View(View::new(predicate, criteria)))
            } else {
                Ok(RuleElement::Join(Join::new(variables, predicate, criteria)))
            }
        } else {
            for variable in atom.variables() {
                if positive_variables.contains(&variable) && !variables.contains(&variable) {
                    return Err(EvalError::RuleUnsafe {
                        rule: label.to_string(),
                        reason: format!(
                            "negated {} evaluated before ?{} is bound",
                            atom, variable
                        ),
                    });
                }
            }
            Ok(RuleElement::AntiJoin(AntiJoin::new(
                variables, predicate, criteria,
            )))
        }
    }
}
