//! Metadata graphs with shared, possibly cyclic, mappings.
//!
//! Embedders that build metadata programmatically can hand the engine a [`SharedValue`]
//! instead of plain JSON. Mappings are reference-counted, so the same mapping may appear
//! under several keys or even inside itself. [`flatten`](super::flatten::flatten) and
//! [`SharedValue::to_value`] both cut cycles with the circular-reference sentinel.

use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::flatten::MetadataNode;
use crate::constants::CIRCULAR_REFERENCE_SENTINEL;

pub type SharedMap = Rc<RefCell<BTreeMap<String, SharedValue>>>;

#[derive(Debug, Clone)]
pub enum SharedValue {
    Scalar(Value),
    List(Vec<SharedValue>),
    Map(SharedMap),
}

impl SharedValue {
    pub fn new_map() -> SharedMap {
        Rc::new(RefCell::new(BTreeMap::new()))
    }

    pub fn scalar(value: impl Into<Value>) -> Self {
        SharedValue::Scalar(value.into())
    }

    /// Convert to plain JSON, replacing any mapping already on the descent path with the
    /// circular-reference sentinel.
    pub fn to_value(&self) -> Value {
        let mut on_path = Vec::new();
        self.to_value_inner(&mut on_path)
    }

    fn to_value_inner(&self, on_path: &mut Vec<usize>) -> Value {
        match self {
            SharedValue::Scalar(value) => value.clone(),
            SharedValue::List(items) => {
                Value::Array(items.iter().map(|item| item.to_value_inner(on_path)).collect())
            }
            SharedValue::Map(map) => {
                let id = Rc::as_ptr(map) as usize;
                if on_path.contains(&id) {
                    return Value::String(CIRCULAR_REFERENCE_SENTINEL.to_string());
                }
                on_path.push(id);
                let converted: Map<String, Value> = map
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value_inner(on_path)))
                    .collect();
                on_path.pop();
                Value::Object(converted)
            }
        }
    }
}

impl From<&Value> for SharedValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Array(items) => SharedValue::List(items.iter().map(SharedValue::from).collect()),
            Value::Object(map) => {
                let shared = SharedValue::new_map();
                shared
                    .borrow_mut()
                    .extend(map.iter().map(|(k, v)| (k.clone(), SharedValue::from(v))));
                SharedValue::Map(shared)
            }
            other => SharedValue::Scalar(other.clone()),
        }
    }
}

impl MetadataNode for SharedValue {
    fn container_id(&self) -> Option<usize> {
        match self {
            SharedValue::Map(map) => Some(Rc::as_ptr(map) as usize),
            _ => None,
        }
    }

    fn entries(&self) -> Option<Vec<(String, Self)>> {
        match self {
            SharedValue::Map(map) => {
                Some(map.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            }
            _ => None,
        }
    }

    fn to_leaf(&self) -> Value {
        self.to_value()
    }
}
