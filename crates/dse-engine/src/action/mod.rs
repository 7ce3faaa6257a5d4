//! Compiled rule effects.
//!
//! An [`Action`] is an ordered list of [`ActionLiteral`]s together with a
//! static allocation plan: every variable a literal reads or produces is
//! assigned a slot. Slots `[0, arity)` hold the rule parameters, taken from the
//! activation tuple; slots from `arity` upwards are local registers filled by
//! literal outputs. The plan is model independent and is checked once, when the
//! action is built.
//!
//! ```text
//! parameters: (a, b)           slots 0, 1
//! new(c)     -> outputs c      slot 2
//! put(a, c)  -> inputs  a, c   slots 0, 2
//! ```

mod bound;
mod literals;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dse_store::{Model, ModelStore, Tuple};
use tracing::debug;

use crate::error::{DseError, DseResult};

pub use bound::BoundAction;
pub use literals::{CheckLiteral, CreateObjectLiteral, DeleteObjectLiteral, PutLiteral};
pub(crate) use literals::allocate_node;

/// Name of a rule parameter or local variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(Arc<str>);

impl Variable {
    /// Create a variable.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Variable {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// One effect of a rule, independent of any model.
pub trait ActionLiteral: fmt::Debug + Send + Sync {
    /// Variables read by this literal, in the order its input tuple lists them.
    fn input_variables(&self) -> &[Variable];

    /// Variables produced by this literal, in the order its output tuple lists them.
    fn output_variables(&self) -> &[Variable] {
        &[]
    }

    /// Reject literals that refer to symbols the store does not know.
    fn check_store(&self, _store: &ModelStore) -> DseResult<()> {
        Ok(())
    }

    /// Resolve this literal against `model`.
    fn bind(&self, model: &Model) -> DseResult<Box<dyn BoundActionLiteral>>;
}

/// A literal resolved against a model, ready to fire.
pub trait BoundActionLiteral: Send {
    /// Apply the literal to `input`.
    ///
    /// Returns the output tuple, whose arity must equal the number of output
    /// variables, or `None` when a guard failed and the firing must abort.
    fn fire(&mut self, model: &mut Model, input: &Tuple) -> DseResult<Option<Tuple>>;
}

/// Where a literal's input tuple comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAllocation {
    /// The input is the activation tuple itself.
    PassThrough,
    /// Gather the input from these slots.
    Slots(Box<[usize]>),
}

/// Where a literal's outputs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputAllocation {
    /// The literal produces nothing.
    Empty,
    /// Scatter the output tuple into these local slots.
    Slots(Box<[usize]>),
}

/// Immutable, model-independent plan for a rule's effects.
pub struct Action {
    parameters: Vec<Variable>,
    literals: Vec<Arc<dyn ActionLiteral>>,
    input_allocation: Vec<InputAllocation>,
    output_allocation: Vec<OutputAllocation>,
    local_variable_count: usize,
}

impl Action {
    /// Start building an action.
    pub fn builder() -> ActionBuilder {
        ActionBuilder::default()
    }

    /// Compile `literals` against `parameters`.
    pub fn new<P, V>(parameters: P, literals: Vec<Arc<dyn ActionLiteral>>) -> DseResult<Self>
    where
        P: IntoIterator<Item = V>,
        V: Into<Variable>,
    {
        let parameters: Vec<Variable> = parameters.into_iter().map(Into::into).collect();
        let mut slots: HashMap<&Variable, usize> = HashMap::with_capacity(parameters.len());
        for (slot, parameter) in parameters.iter().enumerate() {
            if slots.insert(parameter, slot).is_some() {
                return Err(DseError::DuplicateParameter {
                    variable: parameter.to_string(),
                });
            }
        }

        let arity = parameters.len();
        let mut next_slot = arity;
        let mut input_allocation = Vec::with_capacity(literals.len());
        let mut output_allocation = Vec::with_capacity(literals.len());

        for (index, literal) in literals.iter().enumerate() {
            let inputs = literal.input_variables();
            if inputs == parameters.as_slice() {
                input_allocation.push(InputAllocation::PassThrough);
            } else {
                let resolved = inputs
                    .iter()
                    .map(|variable| {
                        slots
                            .get(variable)
                            .copied()
                            .ok_or_else(|| DseError::UnboundVariable {
                                literal: index,
                                variable: variable.to_string(),
                            })
                    })
                    .collect::<DseResult<Box<[usize]>>>()?;
                input_allocation.push(InputAllocation::Slots(resolved));
            }

            let outputs = literal.output_variables();
            if outputs.is_empty() {
                output_allocation.push(OutputAllocation::Empty);
                continue;
            }
            for (position, variable) in outputs.iter().enumerate() {
                if outputs[..position].contains(variable) {
                    return Err(DseError::DuplicateOutputVariable {
                        literal: index,
                        variable: variable.to_string(),
                    });
                }
                if slots.contains_key(variable) {
                    return Err(DseError::VariableAlreadyBound {
                        literal: index,
                        variable: variable.to_string(),
                    });
                }
            }
            let mut allocated = Vec::with_capacity(outputs.len());
            for variable in outputs {
                slots.insert(variable, next_slot);
                allocated.push(next_slot);
                next_slot += 1;
            }
            output_allocation.push(OutputAllocation::Slots(allocated.into_boxed_slice()));
        }

        let local_variable_count = next_slot - arity;
        drop(slots);
        debug!(
            arity,
            literals = literals.len(),
            locals = local_variable_count,
            "action_compiled"
        );

        Ok(Self {
            parameters,
            literals,
            input_allocation,
            output_allocation,
            local_variable_count,
        })
    }

    /// Number of rule parameters.
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Rule parameters in slot order.
    pub fn parameters(&self) -> &[Variable] {
        &self.parameters
    }

    /// Literals in firing order.
    pub fn literals(&self) -> &[Arc<dyn ActionLiteral>] {
        &self.literals
    }

    /// Input plan of literal `index`.
    pub fn input_allocation(&self, index: usize) -> Option<&InputAllocation> {
        self.input_allocation.get(index)
    }

    /// Output plan of literal `index`.
    pub fn output_allocation(&self, index: usize) -> Option<&OutputAllocation> {
        self.output_allocation.get(index)
    }

    /// Number of local registers a bound instance needs.
    pub fn local_variable_count(&self) -> usize {
        self.local_variable_count
    }

    /// Check every literal against the schema of `store`.
    pub fn check_store(&self, store: &ModelStore) -> DseResult<()> {
        self.literals
            .iter()
            .try_for_each(|literal| literal.check_store(store))
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("parameters", &self.parameters)
            .field("literals", &self.literals)
            .field("local_variable_count", &self.local_variable_count)
            .finish()
    }
}

/// Builder for [`Action`].
#[derive(Debug, Default)]
pub struct ActionBuilder {
    parameters: Vec<Variable>,
    literals: Vec<Arc<dyn ActionLiteral>>,
}

impl ActionBuilder {
    /// Append a rule parameter.
    pub fn parameter(mut self, variable: impl Into<Variable>) -> Self {
        self.parameters.push(variable.into());
        self
    }

    /// Append several rule parameters.
    pub fn parameters<I, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Variable>,
    {
        self.parameters
            .extend(variables.into_iter().map(Into::into));
        self
    }

    /// Append a literal.
    pub fn literal(mut self, literal: impl ActionLiteral + 'static) -> Self {
        self.literals.push(Arc::new(literal));
        self
    }

    /// Compile the action.
    pub fn build(self) -> DseResult<Action> {
        Action::new(self.parameters, self.literals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dse_store::Symbol;

    fn person() -> Symbol<bool> {
        Symbol::relation("Person", 1)
    }

    #[test]
    fn test_parameter_inputs_pass_through() {
        let action = Action::builder()
            .parameter("x")
            .literal(PutLiteral::add(&person(), ["x"]))
            .build()
            .unwrap();

        assert_eq!(
            action.input_allocation(0),
            Some(&InputAllocation::PassThrough)
        );
        assert_eq!(action.output_allocation(0), Some(&OutputAllocation::Empty));
        assert_eq!(action.local_variable_count(), 0);
    }

    #[test]
    fn test_locals_are_dense_after_parameters() {
        let friend = Symbol::relation("friend", 2);
        let action = Action::builder()
            .parameters(["a", "b"])
            .literal(CreateObjectLiteral::new("c"))
            .literal(CreateObjectLiteral::new("d"))
            .literal(PutLiteral::add(&friend, ["a", "d"]))
            .literal(PutLiteral::add(&friend, ["c", "b"]))
            .build()
            .unwrap();

        assert_eq!(
            action.output_allocation(0),
            Some(&OutputAllocation::Slots(vec![2].into()))
        );
        assert_eq!(
            action.output_allocation(1),
            Some(&OutputAllocation::Slots(vec![3].into()))
        );
        assert_eq!(
            action.input_allocation(2),
            Some(&InputAllocation::Slots(vec![0, 3].into()))
        );
        assert_eq!(
            action.input_allocation(3),
            Some(&InputAllocation::Slots(vec![2, 1].into()))
        );
        assert_eq!(action.local_variable_count(), 2);
    }

    #[test]
    fn test_unbound_variable_rejected() {
        let err = Action::builder()
            .parameter("x")
            .literal(PutLiteral::add(&person(), ["y"]))
            .build()
            .unwrap_err();

        assert!(matches!(
            err,
            DseError::UnboundVariable { literal: 0, ref variable } if variable == "y"
        ));
    }

    #[test]
    fn test_variable_produced_twice_rejected() {
        let err = Action::builder()
            .literal(CreateObjectLiteral::new("n"))
            .literal(CreateObjectLiteral::new("n"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DseError::VariableAlreadyBound { literal: 1, .. }));

        let err = Action::builder()
            .parameter("x")
            .literal(CreateObjectLiteral::new("x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DseError::VariableAlreadyBound { literal: 0, .. }));
    }

    #[test]
    fn test_duplicate_output_in_one_literal_rejected() {
        #[derive(Debug)]
        struct Pair(Vec<Variable>);

        impl ActionLiteral for Pair {
            fn input_variables(&self) -> &[Variable] {
                &[]
            }

            fn output_variables(&self) -> &[Variable] {
                &self.0
            }

            fn bind(&self, _model: &Model) -> DseResult<Box<dyn BoundActionLiteral>> {
                unreachable!("never bound")
            }
        }

        let err = Action::builder()
            .literal(Pair(vec!["p".into(), "p".into()]))
            .build()
            .unwrap_err();
        assert!(matches!(err, DseError::DuplicateOutputVariable { literal: 0, .. }));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = Action::builder()
            .parameters(["x", "x"])
            .build()
            .unwrap_err();
        assert!(matches!(err, DseError::DuplicateParameter { .. }));
    }
}
