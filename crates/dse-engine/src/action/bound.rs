use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use dse_store::{Model, NodeId, Tuple};
use tracing::trace;

use super::{Action, BoundActionLiteral, InputAllocation, OutputAllocation};
use crate::error::{DseError, DseResult};

/// An [`Action`] instantiated for one model.
///
/// Literals are bound lazily on first use and cached for the lifetime of the
/// bound action. A panic inside a literal leaves the action marked as firing,
/// so later calls fail with [`DseError::ReentrantFire`].
pub struct BoundAction {
    action: Arc<Action>,
    bound: Vec<Option<Box<dyn BoundActionLiteral>>>,
    locals: Vec<NodeId>,
    firing: bool,
}

impl BoundAction {
    /// Create an unbound instance of `action`.
    pub fn new(action: Arc<Action>) -> Self {
        let bound = (0..action.literals().len()).map(|_| None).collect();
        let locals = vec![0; action.local_variable_count()];
        Self {
            action,
            bound,
            locals,
            firing: false,
        }
    }

    /// The compiled plan.
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    /// Whether a firing is in progress.
    pub fn is_firing(&self) -> bool {
        self.firing
    }

    /// Fire every literal in order against `activation`.
    ///
    /// Returns `Ok(false)` when a guard literal rejected the activation. Writes
    /// made by literals before the rejecting one are kept.
    pub fn fire(&mut self, model: &mut Model, activation: &Tuple) -> DseResult<bool> {
        model.check_cancelled()?;
        if self.firing {
            return Err(DseError::ReentrantFire);
        }
        if activation.arity() != self.action.arity() {
            return Err(DseError::ArityMismatch {
                name: "activation".to_string(),
                expected: self.action.arity(),
                actual: activation.arity(),
            });
        }
        self.firing = true;
        let outcome = self.fire_literals(model, activation);
        self.firing = false;
        outcome
    }

    fn fire_literals(&mut self, model: &mut Model, activation: &Tuple) -> DseResult<bool> {
        let action = Arc::clone(&self.action);
        for (index, literal) in action.literals().iter().enumerate() {
            let input = match &action.input_allocation[index] {
                InputAllocation::PassThrough => Cow::Borrowed(activation),
                InputAllocation::Slots(slots) => Cow::Owned(self.gather(slots, activation)),
            };

            let bound = match &mut self.bound[index] {
                Some(bound) => bound,
                slot @ None => slot.insert(literal.bind(model)?),
            };

            let Some(output) = bound.fire(model, &input)? else {
                trace!(literal = index, input = %input, "action_literal_rejected");
                return Ok(false);
            };

            if let OutputAllocation::Slots(slots) = &action.output_allocation[index] {
                if output.arity() != slots.len() {
                    return Err(DseError::ArityMismatch {
                        name: format!("{literal:?}"),
                        expected: slots.len(),
                        actual: output.arity(),
                    });
                }
                let arity = action.arity();
                for (slot, value) in slots.iter().zip(output.iter()) {
                    self.locals[slot - arity] = value;
                }
            }
        }
        Ok(true)
    }

    fn gather(&self, slots: &[usize], activation: &Tuple) -> Tuple {
        let arity = activation.arity();
        let read = |slot: usize| {
            if slot < arity {
                activation[slot]
            } else {
                self.locals[slot - arity]
            }
        };
        match *slots {
            [] => Tuple::of0(),
            [a] => Tuple::of1(read(a)),
            [a, b] => Tuple::of2(read(a), read(b)),
            [a, b, c] => Tuple::of3(read(a), read(b), read(c)),
            [a, b, c, d] => Tuple::of4(read(a), read(b), read(c), read(d)),
            _ => slots.iter().map(|slot| read(*slot)).collect(),
        }
    }
}

impl fmt::Debug for BoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAction")
            .field("action", &self.action)
            .field("locals", &self.locals)
            .field("firing", &self.firing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{CheckLiteral, CreateObjectLiteral, PutLiteral};
    use dse_store::{ModelStore, Symbol};

    #[test]
    fn test_created_object_flows_into_later_literals() {
        let friend = Symbol::relation("friend", 2);
        let store = ModelStore::builder().symbol(&friend).build().unwrap();
        let mut model = store.create_model();
        let action = Action::builder()
            .parameter("a")
            .literal(CreateObjectLiteral::new("b"))
            .literal(PutLiteral::add(&friend, ["a", "b"]))
            .literal(PutLiteral::add(&friend, ["b", "a"]))
            .build()
            .unwrap();
        let mut bound = BoundAction::new(Arc::new(action));

        assert!(bound.fire(&mut model, &Tuple::of1(7)).unwrap());

        let interpretation = model.interpretation(&friend).unwrap();
        assert!(model.get(&interpretation, &Tuple::of2(7, 0)).unwrap());
        assert!(model.get(&interpretation, &Tuple::of2(0, 7)).unwrap());
        assert!(!bound.is_firing());
    }

    #[test]
    fn test_failed_guard_keeps_earlier_writes() {
        let marked = Symbol::relation("marked", 1);
        let store = ModelStore::builder().symbol(&marked).build().unwrap();
        let mut model = store.create_model();
        let action = Action::builder()
            .parameter("x")
            .literal(PutLiteral::add(&marked, ["x"]))
            .literal(CheckLiteral::new("never", ["x"], |_, _| Ok(false)))
            .literal(CreateObjectLiteral::new("y"))
            .build()
            .unwrap();
        let mut bound = BoundAction::new(Arc::new(action));

        assert!(!bound.fire(&mut model, &Tuple::of1(3)).unwrap());

        let interpretation = model.interpretation(&marked).unwrap();
        assert!(model.get(&interpretation, &Tuple::of1(3)).unwrap());
        let size = model.interpretation(store.node_count_symbol()).unwrap();
        assert_eq!(model.get(&size, &Tuple::of0()).unwrap(), 0);
    }

    #[test]
    fn test_activation_arity_checked() {
        let store = ModelStore::builder().build().unwrap();
        let mut model = store.create_model();
        let action = Action::builder().parameters(["a", "b"]).build().unwrap();
        let mut bound = BoundAction::new(Arc::new(action));

        assert!(matches!(
            bound.fire(&mut model, &Tuple::of1(0)),
            Err(DseError::ArityMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_wide_inputs_use_general_path() {
        let wide = Symbol::relation("wide", 5);
        let store = ModelStore::builder().symbol(&wide).build().unwrap();
        let mut model = store.create_model();
        let action = Action::builder()
            .parameters(["a", "b", "c", "d", "e"])
            .literal(PutLiteral::add(&wide, ["e", "d", "c", "b", "a"]))
            .build()
            .unwrap();
        let mut bound = BoundAction::new(Arc::new(action));

        let activation = Tuple::from_slice(&[1, 2, 3, 4, 5]);
        assert!(bound.fire(&mut model, &activation).unwrap());

        let interpretation = model.interpretation(&wide).unwrap();
        let written = Tuple::from_slice(&[5, 4, 3, 2, 1]);
        assert!(model.get(&interpretation, &written).unwrap());
    }
}
