//! Pipeline elements
//!
//! A compiled rule is a chain of elements. Each element consumes the rows
//! accumulated so far (one column per bound variable, in the order given by
//! `output_variables` of the preceding element) and produces the next row
//! set. Elements hold only immutable configuration; relation contents are
//! looked up in the `Facts` passed to `process`, which is what makes the
//! round-by-round delta substitution sound.

use std::collections::{HashMap, HashSet};

use crate::builtins::BuiltinError;
use crate::config::DivideByZeroBehaviour;
use crate::error::{EvalError, Result};
use crate::facts::{Facts, Relation};
use crate::model::{BuiltinAtom, Predicate, Term, Tuple};

/// One accumulated binding row: the ground values of the bound variables.
pub(crate) type Row = Vec<Term>;

/// Where a view reads its tuples from during one pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    /// The full fact store.
    Full,
    /// The previous round's delta store.
    Delta,
}

/// Match a criteria term against a ground term, accumulating bindings.
fn unify(pattern: &Term, ground: &Term, bindings: &mut HashMap<String, Term>) -> bool {
    match pattern {
        Term::Variable(name) => match bindings.get(name) {
            Some(existing) => existing == ground,
            None => {
                bindings.insert(name.clone(), ground.clone());
                true
            }
        },
        Term::Constant(_) => pattern == ground,
        Term::Constructed(functor, args) => match ground {
            Term::Constructed(ground_functor, ground_args)
                if functor == ground_functor && args.len() == ground_args.len() =>
            {
                args.iter()
                    .zip(ground_args)
                    .all(|(p, g)| unify(p, g, bindings))
            }
            _ => false,
        },
    }
}

/// Project a relation through a criteria tuple: one output row per stored
/// tuple that matches the constants and repeated variables of the criteria,
/// with one column per distinct criteria variable.
fn view_rows(relation: Option<&Relation>, criteria: &Tuple, variables: &[String]) -> Vec<Row> {
    let mut rows = Vec::new();
    let Some(relation) = relation else {
        return rows;
    };

    'tuples: for tuple in relation.iter() {
        if tuple.arity() != criteria.arity() {
            continue;
        }
        let mut bindings = HashMap::new();
        for (pattern, ground) in criteria.iter().zip(tuple.iter()) {
            if !unify(pattern, ground, &mut bindings) {
                continue 'tuples;
            }
        }
        rows.push(variables.iter().map(|v| bindings[v.as_str()].clone()).collect());
    }

    rows
}

/// The filtered, projected view of one literal's relation.
#[derive(Clone, Debug)]
pub(crate) struct View {
    predicate: Predicate,
    criteria: Tuple,
    variables: Vec<String>,
    source: Source,
}

impl View {
    pub(crate) fn new(predicate: Predicate, criteria: Tuple) -> Self {
        let variables = criteria.variables();
        View {
            predicate,
            criteria,
            variables,
            source: Source::Full,
        }
    }

    pub(crate) fn variables(&self) -> &[String] {
        &self.variables
    }

    fn rows(&self, facts: &Facts, deltas: Option<&Facts>) -> Vec<Row> {
        let relation = match self.source {
            Source::Full => facts.relation(&self.predicate),
            Source::Delta => deltas.and_then(|d| d.relation(&self.predicate)),
        };
        view_rows(relation, &self.criteria, &self.variables)
    }

    fn delta(&self, deltas: &Facts) -> Option<View> {
        match deltas.relation(&self.predicate) {
            Some(relation) if !relation.is_empty() => Some(View {
                source: Source::Delta,
                ..self.clone()
            }),
            _ => None,
        }
    }

    fn process(&self, input: &[Row], facts: &Facts, deltas: Option<&Facts>) -> Vec<Row> {
        debug_assert!(input.len() <= 1, "a view seeds the pipeline");
        self.rows(facts, deltas)
    }
}

/// Natural join of the accumulated rows with one positive literal.
#[derive(Clone, Debug)]
pub(crate) struct Join {
    view: View,
    /// Columns of the accumulated row forming the join key.
    key_left: Vec<usize>,
    /// Columns of the view row forming the join key.
    key_right: Vec<usize>,
    /// View columns appended to the output (variables not yet bound).
    append_right: Vec<usize>,
    output_variables: Vec<String>,
}

impl Join {
    pub(crate) fn new(input_variables: &[String], predicate: Predicate, criteria: Tuple) -> Self {
        let view = View::new(predicate, criteria);

        let mut key_left = Vec::new();
        let mut key_right = Vec::new();
        let mut append_right = Vec::new();
        let mut output_variables = input_variables.to_vec();

        for (right, variable) in view.variables().iter().enumerate() {
            match input_variables.iter().position(|v| v == variable) {
                Some(left) => {
                    key_left.push(left);
                    key_right.push(right);
                }
                None => {
                    append_right.push(right);
                    output_variables.push(variable.clone());
                }
            }
        }

        Join {
            view,
            key_left,
            key_right,
            append_right,
            output_variables,
        }
    }

    pub(crate) fn output_variables(&self) -> &[String] {
        &self.output_variables
    }

    fn delta(&self, deltas: &Facts) -> Option<Join> {
        self.view.delta(deltas).map(|view| Join {
            view,
            ..self.clone()
        })
    }

    fn process(&self, input: &[Row], facts: &Facts, deltas: Option<&Facts>) -> Vec<Row> {
        let right_rows = self.view.rows(facts, deltas);

        let mut index: HashMap<Vec<Term>, Vec<usize>> = HashMap::new();
        for (i, row) in right_rows.iter().enumerate() {
            let key = self.key_right.iter().map(|&c| row[c].clone()).collect();
            index.entry(key).or_default().push(i);
        }

        let mut output = Vec::new();
        for left in input {
            let key: Vec<Term> = self.key_left.iter().map(|&c| left[c].clone()).collect();
            let Some(matches) = index.get(&key) else {
                continue;
            };
            for &i in matches {
                let right = &right_rows[i];
                let mut row = left.clone();
                row.extend(self.append_right.iter().map(|&c| right[c].clone()));
                output.push(row);
            }
        }

        output
    }
}

/// Negation as failure over one literal: keeps an accumulated row only when
/// no tuple of the negated literal's view agrees with it on the shared
/// variables. Sound because strata are evaluated in order, so the negated
/// relation is already complete.
#[derive(Clone, Debug)]
pub(crate) struct AntiJoin {
    view: View,
    key_left: Vec<usize>,
    key_right: Vec<usize>,
    output_variables: Vec<String>,
}

impl AntiJoin {
    pub(crate) fn new(input_variables: &[String], predicate: Predicate, criteria: Tuple) -> Self {
        let view = View::new(predicate, criteria);

        let mut key_left = Vec::new();
        let mut key_right = Vec::new();

        for (right, variable) in view.variables().iter().enumerate() {
            if let Some(left) = input_variables.iter().position(|v| v == variable) {
                key_left.push(left);
                key_right.push(right);
            }
        }

        AntiJoin {
            view,
            key_left,
            key_right,
            output_variables: input_variables.to_vec(),
        }
    }

    pub(crate) fn output_variables(&self) -> &[String] {
        &self.output_variables
    }

    fn process(&self, input: &[Row], facts: &Facts, deltas: Option<&Facts>) -> Vec<Row> {
        let right_rows = self.view.rows(facts, deltas);

        let keys: HashSet<Vec<Term>> = right_rows
            .iter()
            .map(|row| self.key_right.iter().map(|&c| row[c].clone()).collect())
            .collect();

        input
            .iter()
            .filter(|left| {
                let key: Vec<Term> = self.key_left.iter().map(|&c| left[c].clone()).collect();
                !keys.contains(&key)
            })
            .cloned()
            .collect()
    }
}

/// A built-in literal: evaluates the built-in per accumulated row, possibly
/// extending the row with computed values.
#[derive(Clone)]
pub(crate) struct BuiltinElement {
    atom: BuiltinAtom,
    positive: bool,
    /// Per built-in tuple position: the accumulated column supplying the
    /// value, or `None` to use the atom's own term.
    input_columns: Vec<Option<usize>>,
    /// Positions whose computed values extend the output row, one per newly
    /// bound variable.
    extend_positions: Vec<usize>,
    output_variables: Vec<String>,
    divide_by_zero: DivideByZeroBehaviour,
    rule: String,
}

impl BuiltinElement {
    pub(crate) fn new(
        input_variables: &[String],
        atom: BuiltinAtom,
        positive: bool,
        divide_by_zero: DivideByZeroBehaviour,
        rule: &str,
    ) -> Result<Self> {
        let mut input_columns = Vec::with_capacity(atom.tuple().arity());
        let mut unbound: Vec<String> = Vec::new();
        let mut extend_positions = Vec::new();

        for (position, term) in atom.tuple().iter().enumerate() {
            match term {
                Term::Variable(name) => {
                    match input_variables.iter().position(|v| v == name) {
                        Some(column) => input_columns.push(Some(column)),
                        None => {
                            input_columns.push(None);
                            if !unbound.contains(name) {
                                unbound.push(name.clone());
                                extend_positions.push(position);
                            }
                        }
                    }
                }
                _ => input_columns.push(None),
            }
        }

        if unbound.len() > atom.builtin().max_unknown_variables() {
            return Err(EvalError::RuleUnsafe {
                rule: rule.to_string(),
                reason: format!(
                    "built-in {} cannot resolve {} unbound variables",
                    atom.predicate(),
                    unbound.len()
                ),
            });
        }

        if !positive && !unbound.is_empty() {
            return Err(EvalError::RuleUnsafe {
                rule: rule.to_string(),
                reason: format!(
                    "negated built-in {} has unbound variable ?{}",
                    atom.predicate(),
                    unbound[0]
                ),
            });
        }

        let mut output_variables = input_variables.to_vec();
        output_variables.extend(unbound);

        Ok(BuiltinElement {
            atom,
            positive,
            input_columns,
            extend_positions,
            output_variables,
            divide_by_zero,
            rule: rule.to_string(),
        })
    }

    pub(crate) fn output_variables(&self) -> &[String] {
        &self.output_variables
    }

    fn process(&self, input: &[Row]) -> Result<Vec<Row>> {
        let mut output = Vec::new();

        for left in input {
            let terms: Vec<Term> = self
                .input_columns
                .iter()
                .zip(self.atom.tuple().iter())
                .map(|(column, term)| match column {
                    Some(c) => left[*c].clone(),
                    None => term.clone(),
                })
                .collect();

            match self.atom.builtin().evaluate(&Tuple::new(terms)) {
                Ok(Some(result)) => {
                    if self.positive {
                        debug_assert!(result.is_ground());
                        let mut row = left.clone();
                        row.extend(
                            self.extend_positions
                                .iter()
                                .map(|&p| result.terms()[p].clone()),
                        );
                        output.push(row);
                    }
                }
                Ok(None) => {
                    if !self.positive {
                        output.push(left.clone());
                    }
                }
                Err(BuiltinError::DivideByZero) => match self.divide_by_zero {
                    // Dropping the tuple here is the documented behaviour,
                    // not an error.
                    DivideByZeroBehaviour::DiscardAndIgnore => {}
                    DivideByZeroBehaviour::Stop => {
                        return Err(EvalError::BuiltinFailure(format!(
                            "divide by zero in {}",
                            self.atom.predicate()
                        )));
                    }
                },
                Err(BuiltinError::UnboundVariable(name)) => {
                    return Err(EvalError::RuleUnsafe {
                        rule: self.rule.clone(),
                        reason: format!(
                            "built-in {} saw unbound variable ?{}",
                            self.atom.predicate(),
                            name
                        ),
                    });
                }
            }
        }

        Ok(output)
    }
}

impl std::fmt::Debug for BuiltinElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinElement")
            .field("atom", &self.atom)
            .field("positive", &self.positive)
            .finish()
    }
}

/// How one head position is produced from an accumulated row.
#[derive(Clone, Debug)]
enum HeadBinding {
    /// A ground term copied verbatim.
    Constant(Term),
    /// The value of a bound variable.
    Column(usize),
    /// A constructed term instantiated from the row.
    Template(Term),
}

/// The final element: maps an accumulated row onto the head's argument
/// positions. For an empty rule body this emits the (ground) head once.
#[derive(Clone, Debug)]
pub(crate) struct HeadSubstitution {
    bindings: Vec<HeadBinding>,
    input_variables: Vec<String>,
    max_depth: usize,
    output_variables: Vec<String>,
}

impl HeadSubstitution {
    pub(crate) fn new(
        input_variables: Vec<String>,
        head: &Tuple,
        max_depth: usize,
        rule: &str,
    ) -> Result<Self> {
        let mut bindings = Vec::with_capacity(head.arity());

        for term in head.iter() {
            if term.is_ground() {
                bindings.push(HeadBinding::Constant(term.clone()));
                continue;
            }
            match term {
                Term::Variable(name) => {
                    match input_variables.iter().position(|v| v == name) {
                        Some(column) => bindings.push(HeadBinding::Column(column)),
                        None => {
                            return Err(EvalError::RuleUnsafe {
                                rule: rule.to_string(),
                                reason: format!("head variable ?{} is not bound by the body", name),
                            });
                        }
                    }
                }
                _ => {
                    let mut variables = Vec::new();
                    term.collect_variables(&mut variables);
                    for variable in variables {
                        if !input_variables.contains(&variable) {
                            return Err(EvalError::RuleUnsafe {
                                rule: rule.to_string(),
                                reason: format!(
                                    "head variable ?{} is not bound by the body",
                                    variable
                                ),
                            });
                        }
                    }
                    bindings.push(HeadBinding::Template(term.clone()));
                }
            }
        }

        Ok(HeadSubstitution {
            bindings,
            input_variables,
            max_depth,
            output_variables: Vec::new(),
        })
    }

    pub(crate) fn output_variables(&self) -> &[String] {
        &self.output_variables
    }

    fn instantiate(&self, template: &Term, row: &Row) -> Term {
        match template {
            Term::Variable(name) => {
                // Validated at construction: every template variable is bound.
                let column = self.input_variables.iter().position(|v| v == name);
                debug_assert!(column.is_some());
                row[column.unwrap_or_default()].clone()
            }
            Term::Constant(_) => template.clone(),
            Term::Constructed(functor, args) => Term::Constructed(
                functor.clone(),
                args.iter().map(|a| self.instantiate(a, row)).collect(),
            ),
        }
    }

    fn process(&self, input: &[Row]) -> Result<Vec<Row>> {
        let mut output = Vec::with_capacity(input.len());

        for left in input {
            let row: Row = self
                .bindings
                .iter()
                .map(|binding| match binding {
                    HeadBinding::Constant(term) => term.clone(),
                    HeadBinding::Column(column) => left[*column].clone(),
                    HeadBinding::Template(term) => self.instantiate(term, left),
                })
                .collect();

            if self.max_depth > 0 {
                let depth = row.iter().map(Term::depth).max().unwrap_or(0);
                if depth > self.max_depth {
                    return Err(EvalError::TooComplex { depth });
                }
            }

            output.push(row);
        }

        Ok(output)
    }
}

/// A node of a compiled rule pipeline.
#[derive(Clone, Debug)]
pub(crate) enum RuleElement {
    View(View),
    Join(Join),
    AntiJoin(AntiJoin),
    Builtin(BuiltinElement),
    Head(HeadSubstitution),
}

impl RuleElement {
    /// The ordered variables bound after this element.
    pub(crate) fn output_variables(&self) -> &[String] {
        match self {
            RuleElement::View(e) => e.variables(),
            RuleElement::Join(e) => e.output_variables(),
            RuleElement::AntiJoin(e) => e.output_variables(),
            RuleElement::Builtin(e) => e.output_variables(),
            RuleElement::Head(e) => e.output_variables(),
        }
    }

    /// Run this element over the accumulated rows.
    pub(crate) fn process(
        &self,
        input: &[Row],
        facts: &Facts,
        deltas: Option<&Facts>,
    ) -> Result<Vec<Row>> {
        match self {
            RuleElement::View(e) => Ok(e.process(input, facts, deltas)),
            RuleElement::Join(e) => Ok(e.process(input, facts, deltas)),
            RuleElement::AntiJoin(e) => Ok(e.process(input, facts, deltas)),
            RuleElement::Builtin(e) => e.process(input),
            RuleElement::Head(e) => e.process(input),
        }
    }

    /// An equivalent element reading the delta store instead of the full
    /// store, or `None` when delta evaluation is meaningless for this
    /// element (negation, built-ins, head substitution) or the delta holds
    /// nothing for its predicate.
    pub(crate) fn delta_substitution(&self, deltas: &Facts) -> Option<RuleElement> {
        match self {
            RuleElement::View(e) => e.delta(deltas).map(RuleElement::View),
            RuleElement::Join(e) => e.delta(deltas).map(RuleElement::Join),
            _ => None,
        }
    }
}
