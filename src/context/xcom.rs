// ABOUTME: Cross-task communication slots holding FIFO queues of result values
// ABOUTME: Each registered task owns one slot keyed by task name

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XcomError {
    #[error("xcom slot {slot:?} is empty")]
    Empty { slot: String },
}

/// A FIFO of values published by one task and consumed by others.
///
/// Slots are cheap handles; clones share the same queue. The engine
/// pushes each task's final return value here, and user actions may
/// push or pop values at well-defined points.
#[derive(Clone, Debug)]
pub struct Xcom {
    inner: Arc<Mutex<XcomInner>>,
}

#[derive(Debug)]
struct XcomInner {
    slot: String,
    items: VecDeque<JsonValue>,
    capacity: Option<usize>,
}

impl Xcom {
    pub fn new(slot: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(XcomInner {
                slot: slot.into(),
                items: VecDeque::new(),
                capacity: None,
            })),
        }
    }

    /// A slot that keeps at most `capacity` values, dropping the oldest
    /// on overflow.
    pub fn bounded(slot: impl Into<String>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(XcomInner {
                slot: slot.into(),
                items: VecDeque::new(),
                capacity: Some(capacity),
            })),
        }
    }

    pub fn slot(&self) -> String {
        self.inner.lock().expect("xcom lock poisoned").slot.clone()
    }

    pub fn push(&self, value: JsonValue) {
        let mut inner = self.inner.lock().expect("xcom lock poisoned");
        if let Some(capacity) = inner.capacity {
            while inner.items.len() >= capacity {
                inner.items.pop_front();
            }
        }
        inner.items.push_back(value);
    }

    /// Pop the oldest value.
    pub fn pop(&self) -> Result<JsonValue, XcomError> {
        let mut inner = self.inner.lock().expect("xcom lock poisoned");
        inner.items.pop_front().ok_or_else(|| XcomError::Empty {
            slot: inner.slot.clone(),
        })
    }

    /// Read the oldest value without removing it.
    pub fn peek(&self) -> Result<JsonValue, XcomError> {
        let inner = self.inner.lock().expect("xcom lock poisoned");
        inner.items.front().cloned().ok_or_else(|| XcomError::Empty {
            slot: inner.slot.clone(),
        })
    }

    pub fn clear(&self) {
        self.inner.lock().expect("xcom lock poisoned").items.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("xcom lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_pop_peek_order() {
        let xcom = Xcom::new("task");
        xcom.push(json!(1));
        xcom.push(json!(2));

        assert_eq!(xcom.peek().unwrap(), json!(1));
        assert_eq!(xcom.pop().unwrap(), json!(1));
        assert_eq!(xcom.pop().unwrap(), json!(2));
        assert!(xcom.is_empty());
    }

    #[test]
    fn test_peek_empty_is_an_error() {
        let xcom = Xcom::new("task");
        let err = xcom.peek().unwrap_err();
        assert!(err.to_string().contains("task"));
    }

    #[test]
    fn test_bounded_slot_drops_oldest() {
        let xcom = Xcom::bounded("task", 2);
        xcom.push(json!(1));
        xcom.push(json!(2));
        xcom.push(json!(3));

        assert_eq!(xcom.len(), 2);
        assert_eq!(xcom.peek().unwrap(), json!(2));
    }

    #[test]
    fn test_clones_share_the_queue() {
        let xcom = Xcom::new("task");
        let other = xcom.clone();
        xcom.push(json!("value"));
        assert_eq!(other.peek().unwrap(), json!("value"));
    }
}
