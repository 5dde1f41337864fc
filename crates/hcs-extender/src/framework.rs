//! Scheduling statuses and per-cycle scratch state.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Outcome kind of one plugin operation for one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Code {
    Success,
    /// The node cannot host the pod right now; a later cycle may succeed.
    Unschedulable,
    /// The pod/node pair will never succeed without external change.
    UnschedulableAndUnresolvable,
    /// Internal failure; terminal for this pod this cycle.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn success() -> Self {
        Status {
            code: Code::Success,
            message: String::new(),
        }
    }

    pub fn unschedulable(message: impl Into<String>) -> Self {
        Status {
            code: Code::Unschedulable,
            message: message.into(),
        }
    }

    pub fn unresolvable(message: impl Into<String>) -> Self {
        Status {
            code: Code::UnschedulableAndUnresolvable,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Status {
            code: Code::Error,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// A value that can live in [`CycleState`]: deep-clonable and downcastable.
pub trait StateData: Any + Send + Sync {
    fn clone_box(&self) -> Box<dyn StateData + 'static>;
    fn as_any(&self) -> &(dyn Any + 'static);
}

impl<T: Any + Clone + Send + Sync> StateData for T {
    fn clone_box(&self) -> Box<dyn StateData + 'static> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &(dyn Any + 'static) {
        self
    }
}

/// Scratch space shared by the plugin operations across one
/// filter → score → reserve sequence for a single pod.
///
/// Keys are namespaced by their writing plugin to avoid collisions. The
/// whole state clones deeply.
#[derive(Default)]
pub struct CycleState {
    data: HashMap<String, Box<dyn StateData + 'static>>,
}

impl CycleState {
    pub fn new() -> Self {
        CycleState::default()
    }

    pub fn write<T: StateData>(&mut self, key: &str, value: T) {
        self.data.insert(key.to_string(), Box::new(value));
    }

    pub fn read<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| {
            let v: &(dyn StateData + 'static) = &**v;
            v.as_any().downcast_ref()
        })
    }

    pub fn remove(&mut self, key: &str) {
        self.data.remove(key);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Clone for CycleState {
    fn clone(&self) -> Self {
        CycleState {
            data: self
                .data
                .iter()
                .map(|(k, v)| {
                    let v: &(dyn StateData + 'static) = &**v;
                    (k.clone(), v.clone_box())
                })
                .collect(),
        }
    }
}
