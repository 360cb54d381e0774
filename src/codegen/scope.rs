use std::collections::HashMap;

use crate::{ir::SlotId, util::intern::Symbol};

/// Variable storage visible at the current point of lowering, one frame per
/// lexical nesting level.
#[derive(Debug, Default)]
pub struct Scopes {
    frames: Vec<HashMap<Symbol, SlotId>>,
}

impl Scopes {
    pub fn enter(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn leave(&mut self) {
        let frame = self.frames.pop();
        debug_assert!(frame.is_some(), "left a scope that was never entered");
    }

    /// Whether the innermost frame already binds `name`.
    pub fn defined_here(&self, name: Symbol) -> bool {
        self.frames
            .last()
            .is_some_and(|frame| frame.contains_key(&name))
    }

    /// Binds `name` in the innermost frame. Returns `false` if the frame
    /// already binds it.
    pub fn define(&mut self, name: Symbol, slot: SlotId) -> bool {
        let frame = self
            .frames
            .last_mut()
            .expect("defining a variable outside of any scope");
        if frame.contains_key(&name) {
            return false;
        }
        frame.insert(name, slot);
        true
    }

    /// Finds the innermost binding of `name`.
    pub fn lookup(&self, name: Symbol) -> Option<SlotId> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(&name).copied())
    }
}
