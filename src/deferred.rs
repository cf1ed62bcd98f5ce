// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::value::Value;

use core::fmt;
use std::cell::RefCell;

use anyhow::{bail, Result};

/// What a resolver hands back: either a concrete value or a deferred
/// computation to be drained by the executor's run queue after the
/// synchronous pass.
pub enum Resolved {
    Value(Value),
    Deferred(Deferred),
}

impl<T: Into<Value>> From<T> for Resolved {
    fn from(v: T) -> Self {
        Resolved::Value(v.into())
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Resolved::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

enum DeferredState {
    Pending(Box<dyn FnOnce() -> Result<Resolved>>),
    Settled,
}

/// A one-shot asynchronous computation wrapper. The wrapped computation is
/// evaluated exactly once, by the executor's per-execution run queue; the
/// computation may itself return another `Deferred`, which the queue
/// flattens iteratively instead of recursing.
pub struct Deferred {
    state: RefCell<DeferredState>,
}

impl Deferred {
    pub fn new(callback: impl FnOnce() -> Result<Resolved> + 'static) -> Self {
        Self {
            state: RefCell::new(DeferredState::Pending(Box::new(callback))),
        }
    }

    /// An already-computed deferred, useful in tests and adapters.
    pub fn value(value: Value) -> Self {
        Self::new(move || Ok(Resolved::Value(value)))
    }

    /// Runs the wrapped computation. Settles exactly once; a second run is
    /// a programmer error.
    pub(crate) fn run(&self) -> Result<Resolved> {
        let state = std::mem::replace(&mut *self.state.borrow_mut(), DeferredState::Settled);
        match state {
            DeferredState::Pending(callback) => callback(),
            DeferredState::Settled => bail!("internal error: deferred already settled"),
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.state.borrow() {
            DeferredState::Pending(_) => f.write_str("Deferred(pending)"),
            DeferredState::Settled => f.write_str("Deferred(settled)"),
        }
    }
}
