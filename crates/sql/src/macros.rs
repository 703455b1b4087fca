//! Macro functions and the engine that expands them.

mod builtins;
mod context;
mod engine;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::SqlResult;

pub use builtins::{TimeFilterMacro, TimeGroupMacro, TIME_FILTER_MACRO, TIME_GROUP_MACRO};
pub use context::MacroExpansionContext;
pub use engine::{MacroEngine, PreparedRequest};

/// A named SQL placeholder function.
///
/// `expand` receives the call's arguments rendered back to SQL text (string
/// literals unquoted) and returns the SQL expression that replaces the call.
pub trait MacroFunction: Send + Sync {
    fn name(&self) -> &str;

    fn expand(&self, args: &[String], context: &mut MacroExpansionContext<'_>) -> SqlResult<String>;
}

/// Macros known to one engine instance. Lookup ignores ASCII case.
#[derive(Clone, Default)]
pub struct MacroRegistry {
    macros: IndexMap<String, Arc<dyn MacroFunction>>,
}

impl MacroRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `__timeFilter` and `__timeGroup`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(TimeFilterMacro));
        registry.register(Arc::new(TimeGroupMacro));
        registry
    }

    /// Add a macro, replacing any previous one with the same name.
    pub fn register(&mut self, function: Arc<dyn MacroFunction>) {
        self.macros
            .insert(function.name().to_ascii_lowercase(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn MacroFunction>> {
        self.macros.get(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.macros.values().map(|m| m.name())
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

impl std::fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
