//! Per-class hook catalog.
//!
//! The discovery collaborator hands over one `ClassDeclaration` per class in
//! the inheritance chain, root ancestor first. `HookCatalog::build` checks
//! that the chain is well formed and freezes it into `HierarchyLevel`s.
//!
//! Hooks stay with the level that declared them. Extensions accumulate:
//! the extensions visible at a level are every ancestor's registrations in
//! root-to-here order followed by the level's own.

use crate::callbacks::{DEFAULT_TEST_LABEL, ExtensionCallback, HookMethod};
use crate::errors::{DiscoveryError, NO_PARENT};
use std::collections::HashMap;
use tracing::debug;

/// One class as reported by discovery, before validation.
pub struct ClassDeclaration {
    name: String,
    parent: Option<String>,
    setup: Vec<Box<dyn HookMethod>>,
    teardown: Vec<Box<dyn HookMethod>>,
    extensions: Vec<Box<dyn ExtensionCallback>>,
}

impl ClassDeclaration {
    /// Declare a class with no parent and no callbacks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            setup: Vec::new(),
            teardown: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Set the direct superclass.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Append a class-level setup hook (declaration order is preserved).
    pub fn with_setup(self, hook: impl HookMethod + 'static) -> Self {
        self.with_boxed_setup(Box::new(hook))
    }

    /// Append a class-level teardown hook (declaration order is preserved).
    pub fn with_teardown(self, hook: impl HookMethod + 'static) -> Self {
        self.with_boxed_teardown(Box::new(hook))
    }

    /// Register an extension on this class.
    pub fn with_extension(self, extension: impl ExtensionCallback + 'static) -> Self {
        self.with_boxed_extension(Box::new(extension))
    }

    pub fn with_boxed_setup(mut self, hook: Box<dyn HookMethod>) -> Self {
        self.setup.push(hook);
        self
    }

    pub fn with_boxed_teardown(mut self, hook: Box<dyn HookMethod>) -> Self {
        self.teardown.push(hook);
        self
    }

    pub fn with_boxed_extension(mut self, extension: Box<dyn ExtensionCallback>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }
}

impl std::fmt::Debug for ClassDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDeclaration")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("setup", &self.setup.len())
            .field("teardown", &self.teardown.len())
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

/// One validated class in the ancestor-to-descendant chain.
pub struct HierarchyLevel {
    ordinal: usize,
    name: String,
    setup: Vec<Box<dyn HookMethod>>,
    teardown: Vec<Box<dyn HookMethod>>,
    extensions: Vec<Box<dyn ExtensionCallback>>,
}

impl HierarchyLevel {
    /// Position in the chain, 0 being the root ancestor.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setup_hooks(&self) -> &[Box<dyn HookMethod>] {
        &self.setup
    }

    pub fn teardown_hooks(&self) -> &[Box<dyn HookMethod>] {
        &self.teardown
    }

    /// Extensions newly registered at this level (not inherited ones).
    pub fn local_extensions(&self) -> &[Box<dyn ExtensionCallback>] {
        &self.extensions
    }

    pub fn setup_ids(&self) -> Vec<&str> {
        self.setup.iter().map(|h| h.name()).collect()
    }

    pub fn teardown_ids(&self) -> Vec<&str> {
        self.teardown.iter().map(|h| h.name()).collect()
    }

    pub fn extension_ids(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }
}

impl std::fmt::Debug for HierarchyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyLevel")
            .field("ordinal", &self.ordinal)
            .field("name", &self.name)
            .field("setup", &self.setup_ids())
            .field("teardown", &self.teardown_ids())
            .field("extensions", &self.extension_ids())
            .finish()
    }
}

/// A registered extension together with the level that registered it.
#[derive(Clone, Copy)]
pub struct ExtensionSlot<'a> {
    /// Ordinal of the registering level
    pub level: usize,
    /// Name of the registering class
    pub class_name: &'a str,
    pub extension: &'a dyn ExtensionCallback,
}

impl ExtensionSlot<'_> {
    pub fn name(&self) -> &str {
        self.extension.name()
    }
}

/// Immutable, validated view of one class hierarchy. Root first, leaf last.
#[derive(Debug)]
pub struct HookCatalog {
    levels: Vec<HierarchyLevel>,
}

impl HookCatalog {
    /// Validate the root-first declarations and build the catalog.
    ///
    /// Fails on an empty hierarchy, duplicate classes, cyclic inheritance, or
    /// a chain where a class does not extend the class directly before it.
    pub fn build(declarations: Vec<ClassDeclaration>) -> Result<Self, DiscoveryError> {
        if declarations.is_empty() {
            return Err(DiscoveryError::EmptyHierarchy);
        }

        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(declarations.len());
        for (index, decl) in declarations.iter().enumerate() {
            if let Some(&first) = positions.get(decl.name()) {
                return Err(DiscoveryError::DuplicateLevel {
                    name: decl.name().to_string(),
                    first,
                    second: index,
                });
            }
            positions.insert(decl.name(), index);
        }

        for (index, decl) in declarations.iter().enumerate() {
            let expected = index.checked_sub(1).map(|prev| declarations[prev].name());
            if decl.parent() == expected {
                continue;
            }
            let broken = || DiscoveryError::BrokenChain {
                class: decl.name().to_string(),
                level: index,
                parent: decl.parent().unwrap_or(NO_PARENT).to_string(),
                expected: expected.unwrap_or(NO_PARENT).to_string(),
            };
            return Err(match decl.parent() {
                Some(parent) => match positions.get(parent) {
                    Some(&at) if at >= index => DiscoveryError::CyclicInheritance {
                        class: decl.name().to_string(),
                        parent: parent.to_string(),
                    },
                    _ => broken(),
                },
                None => broken(),
            });
        }

        let levels: Vec<HierarchyLevel> = declarations
            .into_iter()
            .enumerate()
            .map(|(ordinal, decl)| HierarchyLevel {
                ordinal,
                name: decl.name,
                setup: decl.setup,
                teardown: decl.teardown,
                extensions: decl.extensions,
            })
            .collect();

        let catalog = Self { levels };
        debug!(
            leaf = %catalog.leaf().name(),
            levels = catalog.depth(),
            extensions = catalog.extension_order().len(),
            "Built hook catalog"
        );
        Ok(catalog)
    }

    pub fn levels(&self) -> &[HierarchyLevel] {
        &self.levels
    }

    pub fn level(&self, ordinal: usize) -> Option<&HierarchyLevel> {
        self.levels.get(ordinal)
    }

    /// Number of levels in the chain.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn root(&self) -> &HierarchyLevel {
        &self.levels[0]
    }

    /// The concrete class under execution.
    pub fn leaf(&self) -> &HierarchyLevel {
        &self.levels[self.levels.len() - 1]
    }

    /// Cumulative extension order visible at `ordinal`: every ancestor's
    /// registrations root-first, then the level's own.
    ///
    /// Returns an empty list for an ordinal outside the chain.
    pub fn cumulative_extensions(&self, ordinal: usize) -> Vec<ExtensionSlot<'_>> {
        if ordinal >= self.levels.len() {
            return Vec::new();
        }
        self.levels[..=ordinal]
            .iter()
            .flat_map(|level| {
                level.extensions.iter().map(move |ext| ExtensionSlot {
                    level: level.ordinal,
                    class_name: level.name.as_str(),
                    extension: ext.as_ref(),
                })
            })
            .collect()
    }

    /// Cumulative extension order of the leaf class, the order used for
    /// `on_enter` (and reversed for `on_exit`).
    pub fn extension_order(&self) -> Vec<ExtensionSlot<'_>> {
        self.cumulative_extensions(self.levels.len() - 1)
    }

    /// Labels a fully successful run would record, in order.
    pub fn planned_sequence(&self, test_label: &str) -> Vec<String> {
        let extensions = self.extension_order();
        let mut labels: Vec<String> = extensions
            .iter()
            .map(|slot| enter_label(slot.name()))
            .collect();
        labels.extend(
            self.levels
                .iter()
                .flat_map(|level| level.setup.iter().map(|h| h.name().to_string())),
        );
        labels.push(test_label.to_string());
        labels.extend(
            self.levels
                .iter()
                .rev()
                .flat_map(|level| level.teardown.iter().map(|h| h.name().to_string())),
        );
        labels.extend(extensions.iter().rev().map(|slot| exit_label(slot.name())));
        labels
    }

    /// `planned_sequence` with the default test label.
    pub fn default_planned_sequence(&self) -> Vec<String> {
        self.planned_sequence(DEFAULT_TEST_LABEL)
    }
}

/// Label recorded for an extension's `on_enter`.
pub fn enter_label(name: &str) -> String {
    format!("{name}.enter")
}

/// Label recorded for an extension's `on_exit`.
pub fn exit_label(name: &str) -> String {
    format!("{name}.exit")
}
