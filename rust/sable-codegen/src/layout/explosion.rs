use std::collections::VecDeque;

use crate::ir::Value;

/// An ordered queue of primitive values making up one or more decomposed
/// source values. Values are claimed in the order they were added; a
/// consumer of known arity must drain it exactly.
#[derive(Debug, Clone, Default)]
pub struct Explosion {
    values: VecDeque<Value>,
}

impl Explosion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: Value) {
        self.values.push_back(value);
    }

    pub fn add_all(&mut self, values: impl IntoIterator<Item = Value>) {
        self.values.extend(values);
    }

    pub fn claim_next(&mut self) -> Value {
        self.values
            .pop_front()
            .unwrap_or_else(|| panic!("explosion exhausted"))
    }

    pub fn claim(&mut self, count: usize) -> Vec<Value> {
        assert!(
            count <= self.values.len(),
            "claiming {count} values from an explosion of {}",
            self.values.len()
        );
        self.values.drain(..count).collect()
    }

    pub fn claim_all(&mut self) -> Vec<Value> {
        self.values.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Assert that every value has been consumed.
    pub fn finish(&self) {
        assert!(
            self.values.is_empty(),
            "explosion has {} unclaimed values",
            self.values.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_in_insertion_order() {
        let mut ex = Explosion::new();
        ex.add(Value(3));
        ex.add_all([Value(1), Value(2)]);
        assert_eq!(ex.claim_next(), Value(3));
        assert_eq!(ex.claim(2), vec![Value(1), Value(2)]);
        ex.finish();
    }

    #[test]
    #[should_panic(expected = "explosion exhausted")]
    fn premature_exhaustion_panics() {
        let mut ex = Explosion::new();
        ex.claim_next();
    }

    #[test]
    #[should_panic(expected = "1 unclaimed values")]
    fn leftovers_panic() {
        let mut ex = Explosion::new();
        ex.add(Value(0));
        ex.finish();
    }
}
