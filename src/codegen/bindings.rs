//! Binding registry: symbol keys to shared emission units
//!
//! The registry is the arena of the code generator: units never point at
//! each other, they record dependency edges as key lists and every edge is
//! resolved through a registry lookup. Shallow clones share unit instances,
//! which is what lets experiment variants rebind a handful of symbols while
//! reusing the rest of the model's units.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::coder::Coder;
use crate::error::CompilerError;

/// Shared handle to an emission unit
pub type CoderRef = Rc<RefCell<Coder>>;

/// Ordered map from symbol key to emission unit
///
/// Delegated units created during dependency discovery are bound under
/// synthetic keys `"#" + variable_name`.
#[derive(Debug, Default)]
pub struct Bindings {
    map: BTreeMap<String, CoderRef>,
    compiled: bool,
}

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    /// Bind `key` to a new unit, replacing any previous binding
    pub fn bind(&mut self, key: impl Into<String>, coder: Coder) -> CoderRef {
        let rc = Rc::new(RefCell::new(coder));
        self.map.insert(key.into(), rc.clone());
        rc
    }

    /// Bind `key` to an existing unit handle
    pub fn bind_ref(&mut self, key: impl Into<String>, coder: CoderRef) {
        self.map.insert(key.into(), coder);
    }

    /// Look up the unit bound to `key`
    pub fn get(&self, key: &str) -> Option<CoderRef> {
        self.map.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Iterate bindings in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CoderRef)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Shallow clone sharing the unit instances
    ///
    /// Rejected once this registry has been compiled: the per-round state of
    /// its units is no longer a clean slate to branch from.
    pub fn try_clone(&self) -> Result<Bindings, CompilerError> {
        if self.compiled {
            return Err(CompilerError::FrozenBindings);
        }
        Ok(Bindings {
            map: self.map.clone(),
            compiled: false,
        })
    }

    pub(crate) fn freeze(&mut self) {
        self.compiled = true;
    }
}
