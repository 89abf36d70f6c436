//! Rule safety: every variable must be limited before a rule is evaluated
//!
//! A variable is limited when a positive ordinary body literal binds it, or
//! when a built-in can compute it from already-limited variables. Unsafe
//! rules are rejected outright; there is no silent rewrite.

use crate::config::Config;
use crate::error::{EvalError, Result};
use crate::model::{Literal, Rule};

/// Check a whole rule set. Fails on the first unsafe rule.
pub fn check_rules(rules: &[Rule], config: &Config) -> Result<()> {
    for rule in rules {
        check_rule(rule, config)?;
    }
    Ok(())
}

/// Check a single rule.
pub fn check_rule(rule: &Rule, config: &Config) -> Result<()> {
    if rule.is_fact() {
        if !rule.head().is_ground() {
            return Err(unsafe_rule(rule, "fact heads must be ground"));
        }
        return Ok(());
    }

    let mut limited = rule.positive_body_variables();

    if config.rule_safety_ternary_targets_imply_limited {
        propagate_through_builtins(rule, &mut limited);
    }

    for variable in rule.head().variables() {
        if !limited.contains(&variable) {
            return Err(unsafe_rule(
                rule,
                &format!("head variable ?{} is not limited", variable),
            ));
        }
    }

    for literal in rule.body() {
        match literal {
            Literal::Positive(atom) if atom.is_builtin() => {
                for variable in atom.variables() {
                    if !limited.contains(&variable) {
                        return Err(unsafe_rule(
                            rule,
                            &format!("built-in variable ?{} is not limited", variable),
                        ));
                    }
                }
            }
            Literal::Negative(atom) => {
                if atom.is_builtin()
                    || !config.rule_safety_allow_unlimited_variables_in_negated_ordinary_predicates
                {
                    for variable in atom.variables() {
                        if !limited.contains(&variable) {
                            return Err(unsafe_rule(
                                rule,
                                &format!("variable ?{} in negated {} is not limited", variable, atom),
                            ));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Mark variables computable by a built-in as limited, to a fixpoint.
///
/// A positive built-in with no more unknown variables than it can resolve
/// makes those variables limited, which may in turn unlock another built-in
/// (`?X + 1 = ?Y, ?Y * 2 = ?Z`).
fn propagate_through_builtins(rule: &Rule, limited: &mut Vec<String>) {
    loop {
        let mut change = false;

        for literal in rule.body() {
            let Literal::Positive(atom) = literal else {
                continue;
            };
            let Some(builtin) = atom.as_builtin() else {
                continue;
            };

            let unknown: Vec<String> = atom
                .variables()
                .into_iter()
                .filter(|v| !limited.contains(v))
                .collect();

            let max = builtin.builtin().max_unknown_variables();

            if !unknown.is_empty() && unknown.len() <= max {
                limited.extend(unknown);
                change = true;
            }
        }

        if !change {
            break;
        }
    }
}

fn unsafe_rule(rule: &Rule, reason: &str) -> EvalError {
    EvalError::RuleUnsafe {
        rule: rule.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins;
    use crate::model::{Atom, Term};

    fn atom(symbol: &str, vars: &[&str]) -> Atom {
        Atom::new(symbol, vars.iter().map(|v| Term::var(v)).collect())
    }

    #[test]
    fn head_variable_must_be_limited() {
        // p(X, Y) :- q(X).
        let rule = Rule::new(
            atom("p", &["X", "Y"]),
            vec![Literal::positive(atom("q", &["X"]))],
        );
        assert!(matches!(
            check_rule(&rule, &Config::default()),
            Err(EvalError::RuleUnsafe { .. })
        ));
    }

    #[test]
    fn facts_must_be_ground() {
        let rule = Rule::fact(atom("p", &["X"]));
        assert!(check_rule(&rule, &Config::default()).is_err());

        let ground = Rule::fact(Atom::new("p", vec![Term::constant("a")]));
        assert!(check_rule(&ground, &Config::default()).is_ok());
    }

    #[test]
    fn negated_variables_must_be_limited() {
        // p(X) :- q(X), not r(X, W).
        let rule = Rule::new(
            atom("p", &["X"]),
            vec![
                Literal::positive(atom("q", &["X"])),
                Literal::negative(atom("r", &["X", "W"])),
            ],
        );
        assert!(check_rule(&rule, &Config::default()).is_err());

        let mut relaxed = Config::default();
        relaxed.rule_safety_allow_unlimited_variables_in_negated_ordinary_predicates = true;
        assert!(check_rule(&rule, &relaxed).is_ok());
    }

    #[test]
    fn ternary_builtin_limits_its_target() {
        // s(Z) :- n(X), ADD(X, 1, Z).
        let rule = Rule::new(
            atom("s", &["Z"]),
            vec![
                Literal::positive(atom("n", &["X"])),
                Literal::positive(Atom::builtin(
                    builtins::add(),
                    vec![Term::var("X"), Term::constant(1), Term::var("Z")],
                )),
            ],
        );
        assert!(check_rule(&rule, &Config::default()).is_ok());

        let mut strict = Config::default();
        strict.rule_safety_ternary_targets_imply_limited = false;
        assert!(check_rule(&rule, &strict).is_err());
    }

    #[test]
    fn builtin_chain_propagates_limitedness() {
        // s(Z) :- n(X), ADD(X, 1, Y), MULTIPLY(Y, 2, Z).
        let rule = Rule::new(
            atom("s", &["Z"]),
            vec![
                Literal::positive(atom("n", &["X"])),
                Literal::positive(Atom::builtin(
                    builtins::add(),
                    vec![Term::var("X"), Term::constant(1), Term::var("Y")],
                )),
                Literal::positive(Atom::builtin(
                    builtins::multiply(),
                    vec![Term::var("Y"), Term::constant(2), Term::var("Z")],
                )),
            ],
        );
        assert!(check_rule(&rule, &Config::default()).is_ok());
    }

    #[test]
    fn too_many_unknowns_in_a_builtin_is_unsafe() {
        // p(Z) :- n(X), ADD(Y, W, Z).
        let rule = Rule::new(
            atom("p", &["Z"]),
            vec![
                Literal::positive(atom("n", &["X"])),
                Literal::positive(Atom::builtin(
                    builtins::add(),
                    vec![Term::var("Y"), Term::var("W"), Term::var("Z")],
                )),
            ],
        );
        assert!(check_rule(&rule, &Config::default()).is_err());
    }
}
