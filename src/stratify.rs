//! Predicate dependency graph and global stratification
//!
//! A rule's body predicates point at its head predicate. A program is
//! stratifiable iff no dependency cycle crosses a negative edge; the strata
//! order guarantees that a negated predicate is fully evaluated before any
//! rule reading it negatively runs.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{EvalError, Result};
use crate::model::{Predicate, Rule};

/// Edge polarity in the dependency graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

/// Predicate dependency graph over an index arena.
///
/// Nodes are predicates interned to dense indices; edges run from a body
/// predicate to the head predicate of the rule containing it. Self-loops are
/// allowed (recursive rules).
#[derive(Debug, Default)]
pub struct DependencyGraph {
    predicates: Vec<Predicate>,
    indices: HashMap<Predicate, usize>,
    edges: Vec<(usize, usize, Polarity)>,
}

impl DependencyGraph {
    /// Build the graph for a rule set. Built-in literals contribute no edges.
    pub fn from_rules(rules: &[Rule]) -> Self {
        let mut graph = DependencyGraph::default();

        for rule in rules {
            let head = graph.intern(rule.predicate());

            for literal in rule.body() {
                if literal.atom().is_builtin() {
                    continue;
                }
                let body = graph.intern(literal.atom().predicate());
                let polarity = if literal.is_positive() {
                    Polarity::Positive
                } else {
                    Polarity::Negative
                };
                graph.edges.push((body, head, polarity));
            }
        }

        graph
    }

    fn intern(&mut self, predicate: Predicate) -> usize {
        if let Some(&index) = self.indices.get(&predicate) {
            return index;
        }
        let index = self.predicates.len();
        self.indices.insert(predicate.clone(), index);
        self.predicates.push(predicate);
        index
    }

    /// The interned predicates, by index.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// The dependency edges as (body, head, polarity) index triples.
    pub fn edges(&self) -> &[(usize, usize, Polarity)] {
        &self.edges
    }

    fn index_of(&self, predicate: &Predicate) -> Option<usize> {
        self.indices.get(predicate).copied()
    }
}

/// The result of stratifying a rule set.
#[derive(Clone, Debug)]
pub struct Stratification {
    /// Rules grouped by stratum, in evaluation order. Original rule order is
    /// preserved inside each group; empty groups are dropped.
    pub strata: Vec<Vec<Rule>>,
    /// Stratum number per head predicate.
    pub predicate_strata: HashMap<Predicate, usize>,
}

/// Partition `rules` into ordered strata.
///
/// Stratum numbers are computed by relaxation: a positive edge forces the
/// head's stratum up to the body's, a negative edge strictly above it. A
/// stratum can only legitimately exceed the rule count when a negative cycle
/// keeps pushing it, so that is the failure bound.
pub fn stratify(rules: &[Rule]) -> Result<Stratification> {
    let graph = DependencyGraph::from_rules(rules);
    let mut strata = vec![0usize; graph.predicates().len()];
    let limit = rules.len();

    loop {
        let mut change = false;

        for &(body, head, polarity) in graph.edges() {
            let required = match polarity {
                Polarity::Positive => strata[body],
                Polarity::Negative => strata[body] + 1,
            };
            if strata[head] < required {
                if required > limit {
                    return Err(EvalError::NotStratifiable(
                        graph.predicates()[head].symbol().to_string(),
                    ));
                }
                strata[head] = required;
                change = true;
            }
        }

        if !change {
            break;
        }
    }

    let highest = rules
        .iter()
        .filter_map(|rule| graph.index_of(&rule.predicate()))
        .map(|index| strata[index])
        .max()
        .unwrap_or(0);

    let mut groups: Vec<Vec<Rule>> = vec![Vec::new(); highest + 1];
    for rule in rules {
        let index = graph
            .index_of(&rule.predicate())
            .unwrap_or_default();
        groups[strata[index]].push(rule.clone());
    }
    groups.retain(|group| !group.is_empty());

    let predicate_strata = graph
        .predicates()
        .iter()
        .cloned()
        .zip(strata.iter().copied())
        .collect();

    debug!(
        rules = rules.len(),
        strata = groups.len(),
        "stratified rule set"
    );

    Ok(Stratification {
        strata: groups,
        predicate_strata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Atom, Literal, Term};

    fn atom(symbol: &str, vars: &[&str]) -> Atom {
        Atom::new(symbol, vars.iter().map(|v| Term::var(v)).collect())
    }

    #[test]
    fn single_stratum_without_negation() {
        // path(X,Y) :- edge(X,Y).  path(X,Y) :- path(X,Z), edge(Z,Y).
        let rules = vec![
            Rule::new(
                atom("path", &["X", "Y"]),
                vec![Literal::positive(atom("edge", &["X", "Y"]))],
            ),
            Rule::new(
                atom("path", &["X", "Y"]),
                vec![
                    Literal::positive(atom("path", &["X", "Z"])),
                    Literal::positive(atom("edge", &["Z", "Y"])),
                ],
            ),
        ];

        let result = stratify(&rules).unwrap();
        assert_eq!(result.strata.len(), 1);
        assert_eq!(result.strata[0].len(), 2);
    }

    #[test]
    fn negation_forces_a_higher_stratum() {
        // q(X) :- s(X), not p(X).  p(X) :- r(X).
        let rules = vec![
            Rule::new(
                atom("q", &["X"]),
                vec![
                    Literal::positive(atom("s", &["X"])),
                    Literal::negative(atom("p", &["X"])),
                ],
            ),
            Rule::new(
                atom("p", &["X"]),
                vec![Literal::positive(atom("r", &["X"]))],
            ),
        ];

        let result = stratify(&rules).unwrap();
        assert_eq!(result.strata.len(), 2);
        // The p rule must run first.
        assert_eq!(result.strata[0][0].predicate().symbol(), "p");
        assert_eq!(result.strata[1][0].predicate().symbol(), "q");

        let p = result.predicate_strata[&Predicate::new("p", 1)];
        let q = result.predicate_strata[&Predicate::new("q", 1)];
        assert!(q > p);
    }

    #[test]
    fn negative_cycle_is_rejected() {
        // p(X) :- r(X), not q(X).  q(X) :- r(X), not p(X).
        let rules = vec![
            Rule::new(
                atom("p", &["X"]),
                vec![
                    Literal::positive(atom("r", &["X"])),
                    Literal::negative(atom("q", &["X"])),
                ],
            ),
            Rule::new(
                atom("q", &["X"]),
                vec![
                    Literal::positive(atom("r", &["X"])),
                    Literal::negative(atom("p", &["X"])),
                ],
            ),
        ];

        assert!(matches!(
            stratify(&rules),
            Err(EvalError::NotStratifiable(_))
        ));
    }

    #[test]
    fn positive_self_loop_is_fine() {
        // p(X) :- p(X).
        let rules = vec![Rule::new(
            atom("p", &["X"]),
            vec![Literal::positive(atom("p", &["X"]))],
        )];
        assert_eq!(stratify(&rules).unwrap().strata.len(), 1);
    }

    #[test]
    fn negative_self_loop_is_rejected() {
        // p(X) :- r(X), not p(X).
        let rules = vec![Rule::new(
            atom("p", &["X"]),
            vec![
                Literal::positive(atom("r", &["X"])),
                Literal::negative(atom("p", &["X"])),
            ],
        )];
        assert!(matches!(
            stratify(&rules),
            Err(EvalError::NotStratifiable(_))
        ));
    }

    #[test]
    fn facts_form_stratum_zero() {
        let rules = vec![
            Rule::new(
                atom("q", &["X"]),
                vec![
                    Literal::positive(atom("s", &["X"])),
                    Literal::negative(atom("p", &["X"])),
                ],
            ),
            Rule::fact(Atom::new("p", vec![Term::constant("a")])),
        ];

        let result = stratify(&rules).unwrap();
        assert_eq!(result.strata[0][0].predicate().symbol(), "p");
        assert!(result.strata[0][0].is_fact());
    }

    #[test]
    fn body_strata_never_exceed_head_strata() {
        // t(X) :- u(X).  r(X) :- s(X), not t(X).  p(X) :- q(X), not r(X).
        let rules = vec![
            Rule::new(
                atom("t", &["X"]),
                vec![Literal::positive(atom("u", &["X"]))],
            ),
            Rule::new(
                atom("r", &["X"]),
                vec![
                    Literal::positive(atom("s", &["X"])),
                    Literal::negative(atom("t", &["X"])),
                ],
            ),
            Rule::new(
                atom("p", &["X"]),
                vec![
                    Literal::positive(atom("q", &["X"])),
                    Literal::negative(atom("r", &["X"])),
                ],
            ),
        ];

        let result = stratify(&rules).unwrap();
        for rule in &rules {
            let head = result.predicate_strata[&rule.predicate()];
            for literal in rule.body() {
                let body = result.predicate_strata[&literal.atom().predicate()];
                if literal.is_negative() {
                    assert!(body < head);
                } else {
                    assert!(body <= head);
                }
            }
        }
    }
}
