//! Name-keyed collection of tool instances.
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::Tool;
use crate::error::ToolError;

/// In-memory registry of tools.
///
/// Registration takes the write lock; every accessor takes the read lock and
/// returns shared handles or a fresh snapshot, never a mutable reference.
/// Registering a second tool under an existing name replaces the first.
#[derive(Debug, Default)]
pub struct Registry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tool`, replacing any tool already registered under its name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidToolName`] if the name is empty.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(ToolError::InvalidToolName(name));
        }
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Snapshot of every tool, ordered by name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of enabled tools, ordered by name.
    #[must_use]
    pub fn list_enabled(&self) -> Vec<Arc<dyn Tool>> {
        self.list().into_iter().filter(|t| t.is_enabled()).collect()
    }

    /// Enabled tools ascending by priority, ties by name.
    #[must_use]
    pub fn by_priority(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools = self.list_enabled();
        tools.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        tools
    }

    /// Registered names, ordered.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Drop the tool named `name`; unknown names are ignored.
    pub fn remove(&self, name: &str) {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub mod test_helpers {
    use std::sync::Mutex;

    use crate::error::ToolError;
    use crate::tools::{Context, Tool};
    use crate::types::{ItemStatus, Operation, OperationResult, ToolItem, ToolStatus};

    /// Configurable fake tool recording the operations it receives.
    #[derive(Debug)]
    pub struct FakeTool {
        pub name: String,
        pub priority: i32,
        pub enabled: bool,
        pub fail_sync: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeTool {
        pub fn new(name: &str, priority: i32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                enabled: true,
                fail_sync: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn disabled(mut self) -> Self {
            self.enabled = false;
            self
        }

        pub fn failing(mut self) -> Self {
            self.fail_sync = true;
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map_or_else(|_| vec![], |g| g.clone())
        }

        fn note(&self, op: &str) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(op.to_string());
            }
        }
    }

    impl Tool for FakeTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn validate(&self) -> Result<(), ToolError> {
            Ok(())
        }
        fn status(&self, ctx: &Context) -> Result<ToolStatus, ToolError> {
            ctx.cancel.check()?;
            self.note("status");
            let mut status = ToolStatus::new(&self.name, self.enabled);
            let mut item = ToolItem::new("item", ItemStatus::Installed);
            item.installed = true;
            status.items.push(item);
            Ok(status)
        }
        fn install(&self, _: &Context, _: &[String]) -> OperationResult {
            self.note("install");
            OperationResult::new(&self.name, Operation::Install)
        }
        fn update(&self, _: &Context, _: &[String]) -> OperationResult {
            self.note("update");
            OperationResult::new(&self.name, Operation::Update)
        }
        fn remove(&self, _: &Context, _: &[String]) -> OperationResult {
            self.note("remove");
            OperationResult::new(&self.name, Operation::Remove)
        }
        fn list<'a>(
            &'a self,
            _: &'a Context,
        ) -> Result<Box<dyn Iterator<Item = ToolItem> + 'a>, ToolError> {
            Ok(Box::new(std::iter::empty()))
        }
        fn sync(&self, _: &Context) -> OperationResult {
            self.note("sync");
            if self.fail_sync {
                OperationResult::failure(
                    &self.name,
                    Operation::Sync,
                    ToolError::failed("scripted failure"),
                )
            } else {
                OperationResult::new(&self.name, Operation::Sync).with_message("synced")
            }
        }
    }
}
