//! Virtual-tree reconciliation: normalize tree descriptions, diff them into
//! ordered patches, and apply the patches to a live output tree.
//!
//! ```text
//! Description --normalize--> Node --diff--> Vec<Patch> --apply--> live tree
//! ```
//!
//! Normalization and diffing are pure. Only [`applier::apply`] touches the
//! live tree, through the [`applier::Backend`] primitives. The whole
//! pipeline is synchronous and single-threaded; callers serialize updates
//! to any one output tree.
pub mod applier;
pub mod config;
pub mod converters;
pub mod description;
pub mod diff_engine;
pub mod document;
pub mod errors;
pub mod html_generator;
pub mod keyed_list;
pub mod normalizer;
pub mod types;

pub use applier::{ApplyReport, Backend, Mount, PatchApplier, PatchWarning, PropOp, apply};
pub use config::ReconcilerConfig;
pub use description::{Attr, Attributes, Body, Deferred, Description};
pub use diff_engine::{DiffEngine, diff, diff_with_config};
pub use document::{Document, LiveId};
pub use errors::ReconcilerError;
pub use keyed_list::diff_children;
pub use normalizer::{Normalizer, normalize};
pub use types::{Element, Handler, Key, Node, NodeKind, Patch, PatchAction, Path, PropValue};

use std::collections::HashMap;

pub const MAIN_CONTEXT: &str = "main";

/// Reconciliation session that remembers the last canonical tree rendered
/// for each context key, so each update only needs the new description.
#[derive(Debug)]
pub struct Reconciler {
    config: ReconcilerConfig,
    contexts: HashMap<String, Option<Node>>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        log::info!(
            "Reconciler initialized (max_depth={}, bail_out_ratio={}, rediff_moved={})",
            config.max_depth,
            config.bail_out_ratio,
            config.rediff_moved
        );
        let mut contexts = HashMap::new();
        contexts.insert(MAIN_CONTEXT.to_string(), None);
        Reconciler { config, contexts }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn normalize(&self, description: &Description) -> Option<Node> {
        Normalizer::from_config(&self.config).normalize(description)
    }

    pub fn diff(&self, old: Option<&Node>, new: Option<&Node>) -> Vec<Patch> {
        diff_with_config(&self.config, old, new, &[])
    }

    /// Last canonical tree reconciled under `context_key`.
    pub fn previous(&self, context_key: &str) -> Option<&Node> {
        self.contexts.get(context_key).and_then(Option::as_ref)
    }

    /// Normalize `description`, diff it against the tree stored for
    /// `context_key`, and store it as the new previous tree.
    pub fn reconcile(&mut self, context_key: &str, description: &Description) -> Vec<Patch> {
        let next = self.normalize(description);
        let patches = diff_with_config(&self.config, self.previous(context_key), next.as_ref(), &[]);
        log::debug!("reconcile '{}': {} patches", context_key, patches.len());
        self.contexts.insert(context_key.to_string(), next);
        patches
    }

    /// Reconcile and apply the resulting patches to the tree at `mount`.
    pub fn update<B: Backend>(
        &mut self,
        backend: &mut B,
        mount: &mut Mount<B::Handle>,
        context_key: &str,
        description: &Description,
    ) -> ApplyReport {
        let patches = self.reconcile(context_key, description);
        apply(backend, mount, patches)
    }

    pub fn clear_context(&mut self, context_key: &str) {
        self.contexts.remove(context_key);
    }

    pub fn clear_all_contexts(&mut self) {
        self.contexts.clear();
        self.contexts.insert(MAIN_CONTEXT.to_string(), None);
        log::info!("Reconciler: cleared all contexts");
    }
}
