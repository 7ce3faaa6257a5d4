use std::fmt;
use std::sync::Arc;

use dse_store::{Interpretation, Model, ModelStore, StoreError, Symbol, Tuple, Value};

use super::{ActionLiteral, BoundActionLiteral, Variable};
use crate::error::{DseError, DseResult};

fn variables<I, V>(arguments: I) -> Vec<Variable>
where
    I: IntoIterator<Item = V>,
    V: Into<Variable>,
{
    arguments.into_iter().map(Into::into).collect()
}

fn check_symbol<T: Value>(
    store: &ModelStore,
    symbol: &Symbol<T>,
    arguments: &[Variable],
) -> DseResult<()> {
    if !store.contains_symbol(symbol) {
        return Err(StoreError::UnknownSymbol {
            name: symbol.name().to_string(),
        }
        .into());
    }
    if arguments.len() != symbol.arity() {
        return Err(DseError::ArityMismatch {
            name: symbol.name().to_string(),
            expected: symbol.arity(),
            actual: arguments.len(),
        });
    }
    Ok(())
}

/// Read the node counter, bump it and return the old value as a 1-tuple.
pub(crate) fn allocate_node(model: &mut Model, size: &Interpretation<u32>) -> DseResult<Tuple> {
    let id = model.get(size, &Tuple::of0())?;
    let next = id.checked_add(1).ok_or(DseError::NodeIdsExhausted)?;
    model.put(size, Tuple::of0(), next)?;
    Ok(Tuple::of1(id))
}

/// Writes a fixed value under the tuple of its argument variables.
pub struct PutLiteral<T> {
    symbol: Symbol<T>,
    arguments: Vec<Variable>,
    value: T,
}

impl<T: Value> PutLiteral<T> {
    /// Write `value` into `symbol` at `arguments`.
    pub fn new<I, V>(symbol: &Symbol<T>, arguments: I, value: T) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Variable>,
    {
        Self {
            symbol: symbol.clone(),
            arguments: variables(arguments),
            value,
        }
    }
}

impl PutLiteral<bool> {
    /// Make `relation` hold at `arguments`.
    pub fn add<I, V>(relation: &Symbol<bool>, arguments: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Variable>,
    {
        Self::new(relation, arguments, true)
    }

    /// Make `relation` stop holding at `arguments`.
    pub fn remove<I, V>(relation: &Symbol<bool>, arguments: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Variable>,
    {
        Self::new(relation, arguments, false)
    }
}

impl<T: Value> fmt::Debug for PutLiteral<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "put {}(", self.symbol.name())?;
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{argument}")?;
        }
        write!(f, ") = {:?}", self.value)
    }
}

impl<T: Value> ActionLiteral for PutLiteral<T> {
    fn input_variables(&self) -> &[Variable] {
        &self.arguments
    }

    fn check_store(&self, store: &ModelStore) -> DseResult<()> {
        check_symbol(store, &self.symbol, &self.arguments)
    }

    fn bind(&self, model: &Model) -> DseResult<Box<dyn BoundActionLiteral>> {
        Ok(Box::new(BoundPut {
            interpretation: model.interpretation(&self.symbol)?,
            value: self.value.clone(),
        }))
    }
}

struct BoundPut<T> {
    interpretation: Interpretation<T>,
    value: T,
}

impl<T: Value> BoundActionLiteral for BoundPut<T> {
    fn fire(&mut self, model: &mut Model, input: &Tuple) -> DseResult<Option<Tuple>> {
        model.put(&self.interpretation, input.clone(), self.value.clone())?;
        Ok(Some(Tuple::of0()))
    }
}

type Predicate = dyn Fn(&Model, &Tuple) -> DseResult<bool> + Send + Sync;

/// Guard evaluated at fire time. A false result aborts the firing.
#[derive(Clone)]
pub struct CheckLiteral {
    name: Arc<str>,
    arguments: Vec<Variable>,
    predicate: Arc<Predicate>,
}

impl CheckLiteral {
    /// Guard `arguments` with an arbitrary predicate.
    pub fn new<I, V, F>(name: impl Into<Arc<str>>, arguments: I, predicate: F) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Variable>,
        F: Fn(&Model, &Tuple) -> DseResult<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arguments: variables(arguments),
            predicate: Arc::new(predicate),
        }
    }

    /// Pass only if `relation` holds at `arguments`.
    pub fn holds<I, V>(relation: &Symbol<bool>, arguments: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Variable>,
    {
        Self::relation(relation, arguments, true)
    }

    /// Pass only if `relation` does not hold at `arguments`.
    pub fn not<I, V>(relation: &Symbol<bool>, arguments: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Variable>,
    {
        Self::relation(relation, arguments, false)
    }

    fn relation<I, V>(relation: &Symbol<bool>, arguments: I, expected: bool) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Variable>,
    {
        let symbol = relation.clone();
        let name = if expected {
            relation.name().to_string()
        } else {
            format!("!{}", relation.name())
        };
        Self::new(name, arguments, move |model, input| {
            let interpretation = model.interpretation(&symbol)?;
            Ok(model.get(&interpretation, input)? == expected)
        })
    }
}

impl fmt::Debug for CheckLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckLiteral")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish()
    }
}

impl ActionLiteral for CheckLiteral {
    fn input_variables(&self) -> &[Variable] {
        &self.arguments
    }

    fn bind(&self, _model: &Model) -> DseResult<Box<dyn BoundActionLiteral>> {
        Ok(Box::new(self.clone()))
    }
}

impl BoundActionLiteral for CheckLiteral {
    fn fire(&mut self, model: &mut Model, input: &Tuple) -> DseResult<Option<Tuple>> {
        if (self.predicate)(model, input)? {
            Ok(Some(Tuple::of0()))
        } else {
            Ok(None)
        }
    }
}

/// Allocates a fresh node id into its output variable.
#[derive(Debug)]
pub struct CreateObjectLiteral {
    output: [Variable; 1],
}

impl CreateObjectLiteral {
    /// Bind the new node id to `variable`.
    pub fn new(variable: impl Into<Variable>) -> Self {
        Self {
            output: [variable.into()],
        }
    }
}

impl ActionLiteral for CreateObjectLiteral {
    fn input_variables(&self) -> &[Variable] {
        &[]
    }

    fn output_variables(&self) -> &[Variable] {
        &self.output
    }

    fn bind(&self, model: &Model) -> DseResult<Box<dyn BoundActionLiteral>> {
        let size = model.interpretation(model.store().node_count_symbol())?;
        Ok(Box::new(BoundCreateObject { size }))
    }
}

struct BoundCreateObject {
    size: Interpretation<u32>,
}

impl BoundActionLiteral for BoundCreateObject {
    fn fire(&mut self, model: &mut Model, _input: &Tuple) -> DseResult<Option<Tuple>> {
        allocate_node(model, &self.size).map(Some)
    }
}

/// Marks a node as deleted.
///
/// Deletion is a tombstone: node ids are never reused and the node counter
/// never shrinks, so firing leaves the model unchanged.
#[derive(Debug)]
pub struct DeleteObjectLiteral {
    input: [Variable; 1],
}

impl DeleteObjectLiteral {
    /// Delete the node bound to `variable`.
    pub fn new(variable: impl Into<Variable>) -> Self {
        Self {
            input: [variable.into()],
        }
    }
}

impl ActionLiteral for DeleteObjectLiteral {
    fn input_variables(&self) -> &[Variable] {
        &self.input
    }

    fn bind(&self, _model: &Model) -> DseResult<Box<dyn BoundActionLiteral>> {
        Ok(Box::new(BoundDeleteObject))
    }
}

struct BoundDeleteObject;

impl BoundActionLiteral for BoundDeleteObject {
    fn fire(&mut self, _model: &mut Model, _input: &Tuple) -> DseResult<Option<Tuple>> {
        Ok(Some(Tuple::of0()))
    }
}
