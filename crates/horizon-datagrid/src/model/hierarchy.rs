//! Hierarchical row model and its flattened projection.
//!
//! The [`HierarchicalModel`] owns a tree of row items in a slotmap arena and
//! maintains a *flattened projection*: the depth-first, visibility-filtered
//! linearization of the tree that the grid addresses by row index. A node is
//! visible when every ancestor is expanded; roots are always visible.
//!
//! Every structural mutation, from expand and collapse to children changes
//! and sibling reordering, is translated into a minimal splice against the projection
//! and reported through [`flattened_changed`](HierarchicalModel::flattened_changed)
//! as a [`FlattenedChange`], so the slot table and selection can shift
//! indices instead of rebuilding.
//!
//! Node handles are generational [`NodeKey`]s: replacing the root set (or
//! removing a subtree) invalidates the affected keys, and operations on a
//! stale key are logged no-ops rather than corruption.

use std::collections::HashMap;
use std::sync::Arc;

use horizon_datagrid_core::{Signal, ThreadAffinity};
use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};

use crate::model::changes::{ChildrenChange, FlattenedChange, FlattenedChangeKind};
use crate::model::column::SortComparer;

new_key_type! {
    /// Generational handle to a node in the hierarchy.
    pub struct NodeKey;
}

/// How persisted expanded state is keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpandedKeyMode {
    /// Key by the value of the item key selector.
    #[default]
    Identity,
    /// Key by the value of the item path selector, so state survives item
    /// instances being rebuilt as long as their path is stable.
    Path,
}

/// Configuration for a [`HierarchicalModel`].
///
/// Only the children selector is mandatory. Without an `is_leaf` selector,
/// leaf status is probed by asking the children selector for children, so
/// supply one when child production is expensive.
pub struct HierarchicalOptions<T> {
    children_selector: Arc<dyn Fn(&T) -> Vec<T> + Send + Sync>,
    is_leaf_selector: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
    is_expanded_selector: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
    is_expanded_setter: Option<Arc<dyn Fn(&T, bool) + Send + Sync>>,
    item_key_selector: Option<Arc<dyn Fn(&T) -> u64 + Send + Sync>>,
    item_path_selector: Option<Arc<dyn Fn(&T) -> String + Send + Sync>>,
    expanded_key_mode: ExpandedKeyMode,
    auto_expand_root: bool,
    /// Nodes shallower than this depth are expanded during population.
    max_auto_expand_depth: usize,
    /// Defer child materialization until a node is first expanded.
    virtualize_children: bool,
    sibling_comparer: Option<SortComparer<T>>,
    /// Reserved for grouping integration; the flattening itself treats all
    /// nodes uniformly.
    pub treat_groups_as_nodes: bool,
}

impl<T> HierarchicalOptions<T> {
    pub fn new<F>(children_selector: F) -> Self
    where
        F: Fn(&T) -> Vec<T> + Send + Sync + 'static,
    {
        Self {
            children_selector: Arc::new(children_selector),
            is_leaf_selector: None,
            is_expanded_selector: None,
            is_expanded_setter: None,
            item_key_selector: None,
            item_path_selector: None,
            expanded_key_mode: ExpandedKeyMode::default(),
            auto_expand_root: false,
            max_auto_expand_depth: 0,
            virtualize_children: true,
            sibling_comparer: None,
            treat_groups_as_nodes: false,
        }
    }

    pub fn with_is_leaf<F>(mut self, selector: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.is_leaf_selector = Some(Arc::new(selector));
        self
    }

    /// Read expansion state from the item itself instead of internal
    /// tracking.
    pub fn with_is_expanded<F>(mut self, selector: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.is_expanded_selector = Some(Arc::new(selector));
        self
    }

    /// Write expansion state back to the item when it is toggled.
    pub fn with_expanded_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&T, bool) + Send + Sync + 'static,
    {
        self.is_expanded_setter = Some(Arc::new(setter));
        self
    }

    /// Stable per-item key; enables expanded-state persistence across
    /// repopulation under [`ExpandedKeyMode::Identity`].
    pub fn with_item_key<F>(mut self, selector: F) -> Self
    where
        F: Fn(&T) -> u64 + Send + Sync + 'static,
    {
        self.item_key_selector = Some(Arc::new(selector));
        self
    }

    /// Stable per-item path; enables expanded-state persistence under
    /// [`ExpandedKeyMode::Path`].
    pub fn with_item_path<F>(mut self, selector: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.item_path_selector = Some(Arc::new(selector));
        self
    }

    pub fn with_expanded_key_mode(mut self, mode: ExpandedKeyMode) -> Self {
        self.expanded_key_mode = mode;
        self
    }

    pub fn auto_expand_root(mut self) -> Self {
        self.auto_expand_root = true;
        self
    }

    pub fn with_max_auto_expand_depth(mut self, depth: usize) -> Self {
        self.max_auto_expand_depth = depth;
        self
    }

    /// Materialize all children eagerly at population time.
    pub fn eager_children(mut self) -> Self {
        self.virtualize_children = false;
        self
    }

    /// Order siblings at every level with this comparer.
    pub fn with_sibling_comparer<F>(mut self, comparer: F) -> Self
    where
        F: Fn(&T, &T) -> std::cmp::Ordering + Send + Sync + 'static,
    {
        self.sibling_comparer = Some(Arc::new(comparer));
        self
    }

    pub fn treating_groups_as_nodes(mut self) -> Self {
        self.treat_groups_as_nodes = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum StateKey {
    Identity(u64),
    Path(String),
}

struct Node<T> {
    item: T,
    parent: Option<NodeKey>,
    /// `None` until materialized (virtualized children).
    children: Option<Vec<NodeKey>>,
    expanded: bool,
    leaf: bool,
    depth: usize,
    /// Children changed while unmaterialized; rematerialize on next expand.
    pending_resync: bool,
}

/// Tree of row items with a flattened, index-addressable projection.
pub struct HierarchicalModel<T> {
    affinity: ThreadAffinity,
    options: HierarchicalOptions<T>,
    arena: RwLock<SlotMap<NodeKey, Node<T>>>,
    roots: RwLock<Vec<NodeKey>>,
    flattened: RwLock<Vec<NodeKey>>,
    positions: RwLock<HashMap<NodeKey, usize>>,
    expanded_state: RwLock<HashMap<StateKey, bool>>,
    comparer: RwLock<Option<SortComparer<T>>>,
    /// Emitted after every edit to the flattened projection.
    pub flattened_changed: Signal<FlattenedChange>,
}

impl<T: Clone + 'static> HierarchicalModel<T> {
    pub fn new(options: HierarchicalOptions<T>) -> Self {
        let comparer = options.sibling_comparer.clone();
        Self {
            affinity: ThreadAffinity::current(),
            options,
            arena: RwLock::new(SlotMap::with_key()),
            roots: RwLock::new(Vec::new()),
            flattened: RwLock::new(Vec::new()),
            positions: RwLock::new(HashMap::new()),
            expanded_state: RwLock::new(HashMap::new()),
            comparer: RwLock::new(comparer),
            flattened_changed: Signal::new(),
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Number of visible rows.
    pub fn len(&self) -> usize {
        self.flattened.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flattened.read().is_empty()
    }

    /// The node at a visible row index.
    pub fn node_at(&self, index: usize) -> Option<NodeKey> {
        self.flattened.read().get(index).copied()
    }

    /// The visible row index of a node, `None` when the node is hidden
    /// under a collapsed ancestor or the key is stale.
    pub fn index_of(&self, key: NodeKey) -> Option<usize> {
        self.positions.read().get(&key).copied()
    }

    /// Clone of the item at a visible row index.
    pub fn item_at(&self, index: usize) -> Option<T> {
        let key = self.node_at(index)?;
        self.arena.read().get(key).map(|n| n.item.clone())
    }

    /// Run `f` against the item behind `key`.
    pub fn with_item<U>(&self, key: NodeKey, f: impl FnOnce(&T) -> U) -> Option<U> {
        self.arena.read().get(key).map(|n| f(&n.item))
    }

    pub fn depth_of(&self, key: NodeKey) -> Option<usize> {
        self.arena.read().get(key).map(|n| n.depth)
    }

    pub fn parent_of(&self, key: NodeKey) -> Option<NodeKey> {
        self.arena.read().get(key).and_then(|n| n.parent)
    }

    pub fn is_expanded(&self, key: NodeKey) -> bool {
        self.arena.read().get(key).map(|n| n.expanded).unwrap_or(false)
    }

    pub fn is_leaf(&self, key: NodeKey) -> bool {
        self.arena.read().get(key).map(|n| n.leaf).unwrap_or(true)
    }

    /// Materialized children of a node (empty when virtualized and never
    /// expanded).
    pub fn children_of(&self, key: NodeKey) -> Vec<NodeKey> {
        self.arena
            .read()
            .get(key)
            .and_then(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn root_nodes(&self) -> Vec<NodeKey> {
        self.roots.read().clone()
    }

    /// Clones of all visible items, in row order.
    pub fn visible_items(&self) -> Vec<T> {
        let arena = self.arena.read();
        self.flattened
            .read()
            .iter()
            .filter_map(|k| arena.get(*k).map(|n| n.item.clone()))
            .collect()
    }

    /// First visible node whose item satisfies `pred`.
    pub fn find_visible(&self, pred: impl Fn(&T) -> bool) -> Option<(usize, NodeKey)> {
        let arena = self.arena.read();
        self.flattened
            .read()
            .iter()
            .enumerate()
            .find(|(_, k)| arena.get(**k).map(|n| pred(&n.item)).unwrap_or(false))
            .map(|(i, k)| (i, *k))
    }

    // ------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------

    /// Replace the entire tree. All previously handed-out [`NodeKey`]s
    /// become stale. Persisted expanded state (keyed by item identity or
    /// path) is retained and re-applied to the new items.
    pub fn set_roots(&self, items: Vec<T>) {
        self.affinity.assert_same_thread();
        let old_len;
        let new_len;
        {
            let mut arena = self.arena.write();
            let mut state = self.expanded_state.write();
            let comparer = self.comparer.read().clone();
            arena.clear();

            let mut items = items;
            if let Some(cmp) = &comparer {
                items.sort_by(|a, b| cmp(a, b));
            }
            let mut roots = Vec::with_capacity(items.len());
            for item in items {
                roots.push(self.create_subtree(&mut arena, &mut state, &comparer, item, None, 0, true));
            }
            *self.roots.write() = roots;

            let mut flattened = self.flattened.write();
            old_len = flattened.len();
            *flattened = flatten_all(&arena, &self.roots.read());
            new_len = flattened.len();
            rebuild_positions(&flattened, &mut self.positions.write());
        }
        tracing::debug!(
            target: crate::logging::targets::HIERARCHY,
            rows = new_len,
            "hierarchy repopulated"
        );
        self.flattened_changed.emit(FlattenedChange::reset(old_len, new_len));
    }

    /// Convenience for a single (or no) root.
    pub fn set_root(&self, item: Option<T>) {
        self.set_roots(item.into_iter().collect());
    }

    // ------------------------------------------------------------------
    // Expand / collapse
    // ------------------------------------------------------------------

    /// Expand a node, splicing its visible subtree into the projection when
    /// the node itself is visible. Returns `false` for stale keys, leaves,
    /// and already-expanded nodes.
    pub fn expand(&self, key: NodeKey) -> bool {
        self.affinity.assert_same_thread();
        let change;
        {
            let mut arena = self.arena.write();
            let Some(node) = arena.get(key) else {
                tracing::debug!(
                    target: crate::logging::targets::HIERARCHY,
                    "expand on stale node key ignored"
                );
                return false;
            };
            if node.leaf || node.expanded {
                return false;
            }

            let needs_children =
                node.children.is_none() || node.pending_resync;
            if needs_children {
                self.rematerialize_children(&mut arena, key);
            }
            {
                let node = &mut arena[key];
                node.expanded = true;
                node.pending_resync = false;
            }
            let item = arena[key].item.clone();
            self.persist_expanded(&item, true);

            change = self.splice_after_expand(&arena, key);
        }
        if let Some(change) = change {
            self.flattened_changed.emit(change);
        }
        true
    }

    /// Collapse a node, removing its contiguous visible descendants from
    /// the projection. Returns `false` for stale keys and nodes that are
    /// not expanded.
    pub fn collapse(&self, key: NodeKey) -> bool {
        self.affinity.assert_same_thread();
        let change;
        {
            let mut arena = self.arena.write();
            let Some(node) = arena.get(key) else {
                tracing::debug!(
                    target: crate::logging::targets::HIERARCHY,
                    "collapse on stale node key ignored"
                );
                return false;
            };
            if !node.expanded {
                return false;
            }
            arena[key].expanded = false;
            let item = arena[key].item.clone();
            self.persist_expanded(&item, false);

            change = match self.index_of(key) {
                Some(pos) => {
                    let depth = arena[key].depth;
                    let mut flattened = self.flattened.write();
                    let mut end = pos + 1;
                    while end < flattened.len() {
                        match arena.get(flattened[end]) {
                            Some(n) if n.depth > depth => end += 1,
                            _ => break,
                        }
                    }
                    let removed = end - (pos + 1);
                    flattened.drain(pos + 1..end);
                    rebuild_positions(&flattened, &mut self.positions.write());
                    (removed > 0).then_some(FlattenedChange {
                        index: pos + 1,
                        removed,
                        inserted: 0,
                        kind: FlattenedChangeKind::Collapse,
                    })
                }
                None => None,
            };
        }
        if let Some(change) = change {
            self.flattened_changed.emit(change);
        }
        true
    }

    /// Expand if collapsed, collapse if expanded.
    pub fn toggle(&self, key: NodeKey) -> bool {
        if self.is_expanded(key) {
            self.collapse(key)
        } else {
            self.expand(key)
        }
    }

    /// Expand every non-leaf node, materializing the whole tree.
    pub fn expand_all(&self) {
        self.affinity.assert_same_thread();
        let old_len;
        let new_len;
        {
            let mut arena = self.arena.write();
            // Fixpoint: expanding materializes new nodes that need
            // expanding themselves.
            loop {
                let targets: Vec<NodeKey> = arena
                    .iter()
                    .filter(|(_, n)| !n.leaf && (!n.expanded || n.children.is_none()))
                    .map(|(k, _)| k)
                    .collect();
                if targets.is_empty() {
                    break;
                }
                for key in targets {
                    if arena[key].children.is_none() || arena[key].pending_resync {
                        self.rematerialize_children(&mut arena, key);
                    }
                    arena[key].expanded = true;
                    arena[key].pending_resync = false;
                    let item = arena[key].item.clone();
                    self.persist_expanded(&item, true);
                }
            }
            let mut flattened = self.flattened.write();
            old_len = flattened.len();
            *flattened = flatten_all(&arena, &self.roots.read());
            new_len = flattened.len();
            rebuild_positions(&flattened, &mut self.positions.write());
        }
        self.flattened_changed.emit(FlattenedChange::reset(old_len, new_len));
    }

    /// Collapse every node; the projection reduces to the roots.
    pub fn collapse_all(&self) {
        self.affinity.assert_same_thread();
        let old_len;
        let new_len;
        {
            let mut arena = self.arena.write();
            let keys: Vec<NodeKey> = arena
                .iter()
                .filter(|(_, n)| n.expanded)
                .map(|(k, _)| k)
                .collect();
            for key in keys {
                arena[key].expanded = false;
                let item = arena[key].item.clone();
                self.persist_expanded(&item, false);
            }
            let mut flattened = self.flattened.write();
            old_len = flattened.len();
            *flattened = flatten_all(&arena, &self.roots.read());
            new_len = flattened.len();
            rebuild_positions(&flattened, &mut self.positions.write());
        }
        self.flattened_changed.emit(FlattenedChange::reset(old_len, new_len));
    }

    /// Expand ancestors until `key` is visible, then return its row index.
    pub fn expand_to(&self, key: NodeKey) -> Option<usize> {
        self.affinity.assert_same_thread();
        let mut chain = Vec::new();
        {
            let arena = self.arena.read();
            let mut cursor = arena.get(key)?.parent;
            while let Some(parent) = cursor {
                chain.push(parent);
                cursor = arena.get(parent)?.parent;
            }
        }
        for ancestor in chain.into_iter().rev() {
            self.expand(ancestor);
        }
        self.index_of(key)
    }

    // ------------------------------------------------------------------
    // Sibling ordering
    // ------------------------------------------------------------------

    /// Install (or clear) the sibling comparer and re-order the tree with
    /// it. The visible set is unchanged; only the order shifts, reported as
    /// a single `Reorder`. With `recursive` false only the roots are
    /// re-ordered.
    pub fn apply_sibling_comparer(&self, comparer: Option<SortComparer<T>>, recursive: bool) {
        self.affinity.assert_same_thread();
        *self.comparer.write() = comparer.clone();
        let Some(cmp) = comparer else { return };

        let len;
        {
            let mut arena = self.arena.write();
            let mut roots = self.roots.write();
            sort_keys_by_item(&arena, &mut roots, &cmp);
            if recursive {
                let parents: Vec<NodeKey> = arena
                    .iter()
                    .filter(|(_, n)| n.children.as_ref().is_some_and(|c| c.len() > 1))
                    .map(|(k, _)| k)
                    .collect();
                for key in parents {
                    let mut children = arena[key].children.clone().unwrap_or_default();
                    sort_keys_by_item(&arena, &mut children, &cmp);
                    arena[key].children = Some(children);
                }
            }
            let mut flattened = self.flattened.write();
            *flattened = flatten_all(&arena, &roots);
            len = flattened.len();
            rebuild_positions(&flattened, &mut self.positions.write());
        }
        self.flattened_changed.emit(FlattenedChange {
            index: 0,
            removed: len,
            inserted: len,
            kind: FlattenedChangeKind::Reorder,
        });
    }

    // ------------------------------------------------------------------
    // Children changes
    // ------------------------------------------------------------------

    /// Apply an external mutation of a node's children (or of the root set
    /// when `parent` is `None`), splicing the flattened projection
    /// minimally.
    ///
    /// Indices in `change` refer to the children collection as produced by
    /// the children selector. For an unmaterialized parent the change is
    /// deferred: the node is marked for resynchronization and picks up the
    /// fresh children on its next expand.
    pub fn apply_children_change(&self, parent: Option<NodeKey>, change: ChildrenChange) {
        self.affinity.assert_same_thread();
        let events = {
            let mut arena = self.arena.write();

            if let Some(parent_key) = parent {
                let Some(node) = arena.get(parent_key) else {
                    tracing::debug!(
                        target: crate::logging::targets::HIERARCHY,
                        "children change on stale node key ignored"
                    );
                    return;
                };
                if node.children.is_none() {
                    let node = &mut arena[parent_key];
                    node.pending_resync = true;
                    node.leaf = false;
                    return;
                }
            }

            match change {
                ChildrenChange::Reset => self.apply_children_reset(&mut arena, parent),
                ChildrenChange::Inserted { index, count } => {
                    self.apply_children_insert(&mut arena, parent, index, count)
                }
                ChildrenChange::Removed { index, count } => {
                    self.apply_children_remove(&mut arena, parent, index, count)
                }
                ChildrenChange::Moved { from, to } => {
                    // A move is a remove plus an insert; the node at `to` is
                    // re-created from the selector's fresh children.
                    let mut events = self.apply_children_remove(&mut arena, parent, from, 1);
                    events.extend(self.apply_children_insert(&mut arena, parent, to, 1));
                    events
                }
            }
        };
        for event in events {
            self.flattened_changed.emit(event);
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn state_key(&self, item: &T) -> Option<StateKey> {
        match self.options.expanded_key_mode {
            ExpandedKeyMode::Identity => self
                .options
                .item_key_selector
                .as_ref()
                .map(|f| StateKey::Identity(f(item))),
            ExpandedKeyMode::Path => self
                .options
                .item_path_selector
                .as_ref()
                .map(|f| StateKey::Path(f(item))),
        }
    }

    fn persist_expanded(&self, item: &T, expanded: bool) {
        if let Some(setter) = &self.options.is_expanded_setter {
            setter(item, expanded);
        }
        if let Some(key) = self.state_key(item) {
            self.expanded_state.write().insert(key, expanded);
        }
    }

    fn resolve_expanded(
        &self,
        state: &HashMap<StateKey, bool>,
        item: &T,
        depth: usize,
        populating: bool,
    ) -> bool {
        if let Some(selector) = &self.options.is_expanded_selector {
            return selector(item);
        }
        if let Some(key) = self.state_key(item) {
            if let Some(expanded) = state.get(&key) {
                return *expanded;
            }
        }
        populating
            && ((depth == 0 && self.options.auto_expand_root)
                || depth < self.options.max_auto_expand_depth)
    }

    fn resolve_leaf(&self, item: &T, children: Option<&[T]>) -> bool {
        if let Some(selector) = &self.options.is_leaf_selector {
            return selector(item);
        }
        match children {
            Some(children) => children.is_empty(),
            None => (self.options.children_selector)(item).is_empty(),
        }
    }

    /// Create a node and, when it is expanded or children are eager, its
    /// whole subtree.
    fn create_subtree(
        &self,
        arena: &mut SlotMap<NodeKey, Node<T>>,
        state: &mut HashMap<StateKey, bool>,
        comparer: &Option<SortComparer<T>>,
        item: T,
        parent: Option<NodeKey>,
        depth: usize,
        populating: bool,
    ) -> NodeKey {
        let expanded = self.resolve_expanded(state, &item, depth, populating);
        let materialize = expanded || !self.options.virtualize_children;

        let child_items = if materialize {
            let mut children = (self.options.children_selector)(&item);
            if let Some(cmp) = comparer {
                children.sort_by(|a, b| cmp(a, b));
            }
            Some(children)
        } else {
            None
        };
        let leaf = self.resolve_leaf(&item, child_items.as_deref());

        let key = arena.insert(Node {
            item,
            parent,
            children: None,
            expanded: expanded && !leaf,
            leaf,
            depth,
            pending_resync: false,
        });

        if let Some(child_items) = child_items {
            let children: Vec<NodeKey> = child_items
                .into_iter()
                .map(|child| {
                    self.create_subtree(arena, state, comparer, child, Some(key), depth + 1, populating)
                })
                .collect();
            arena[key].children = Some(children);
        }
        key
    }

    /// Replace a node's children from the selector, destroying old child
    /// subtrees.
    fn rematerialize_children(&self, arena: &mut SlotMap<NodeKey, Node<T>>, key: NodeKey) {
        let old = arena[key].children.take().unwrap_or_default();
        for child in old {
            destroy_subtree(arena, child);
        }
        let item = arena[key].item.clone();
        let depth = arena[key].depth;
        let comparer = self.comparer.read().clone();
        let mut child_items = (self.options.children_selector)(&item);
        if let Some(cmp) = &comparer {
            child_items.sort_by(|a, b| cmp(a, b));
        }
        let mut state = self.expanded_state.write();
        let children: Vec<NodeKey> = child_items
            .into_iter()
            .map(|child| {
                self.create_subtree(arena, &mut state, &comparer, child, Some(key), depth + 1, false)
            })
            .collect();
        drop(state);
        arena[key].leaf = match &self.options.is_leaf_selector {
            Some(f) => f(&arena[key].item),
            None => children.is_empty(),
        };
        arena[key].children = Some(children);
    }

    /// Splice a freshly-expanded node's visible subtree into the
    /// projection. `None` when the node itself is hidden.
    fn splice_after_expand(
        &self,
        arena: &SlotMap<NodeKey, Node<T>>,
        key: NodeKey,
    ) -> Option<FlattenedChange> {
        let pos = self.index_of(key)?;
        let mut revealed = Vec::new();
        collect_visible_descendants(arena, key, &mut revealed);
        if revealed.is_empty() {
            return None;
        }
        let mut flattened = self.flattened.write();
        let inserted = revealed.len();
        flattened.splice(pos + 1..pos + 1, revealed);
        rebuild_positions(&flattened, &mut self.positions.write());
        Some(FlattenedChange {
            index: pos + 1,
            removed: 0,
            inserted,
            kind: FlattenedChangeKind::Expand,
        })
    }

    /// Whether `parent`'s children participate in the projection, and the
    /// flat index where its child at `child_index` would start.
    fn child_flat_start(
        &self,
        arena: &SlotMap<NodeKey, Node<T>>,
        parent: Option<NodeKey>,
        child_index: usize,
        siblings: &[NodeKey],
    ) -> Option<usize> {
        let base = match parent {
            None => 0,
            Some(key) => {
                let node = arena.get(key)?;
                if !node.expanded {
                    return None;
                }
                self.index_of(key)? + 1
            }
        };
        let mut start = base;
        for sibling in siblings.iter().take(child_index) {
            start += visible_size(arena, *sibling);
        }
        Some(start)
    }

    fn sibling_keys(&self, arena: &SlotMap<NodeKey, Node<T>>, parent: Option<NodeKey>) -> Vec<NodeKey> {
        match parent {
            None => self.roots.read().clone(),
            Some(key) => arena
                .get(key)
                .and_then(|n| n.children.clone())
                .unwrap_or_default(),
        }
    }

    fn set_sibling_keys(
        &self,
        arena: &mut SlotMap<NodeKey, Node<T>>,
        parent: Option<NodeKey>,
        keys: Vec<NodeKey>,
    ) {
        match parent {
            None => *self.roots.write() = keys,
            Some(parent_key) => {
                let node = &mut arena[parent_key];
                node.leaf = if let Some(f) = &self.options.is_leaf_selector {
                    f(&node.item)
                } else {
                    keys.is_empty()
                };
                node.children = Some(keys);
            }
        }
    }

    fn fresh_child_items(&self, arena: &SlotMap<NodeKey, Node<T>>, parent: Option<NodeKey>) -> Vec<T> {
        match parent {
            None => Vec::new(),
            Some(key) => (self.options.children_selector)(&arena[key].item),
        }
    }

    fn apply_children_reset(
        &self,
        arena: &mut SlotMap<NodeKey, Node<T>>,
        parent: Option<NodeKey>,
    ) -> Vec<FlattenedChange> {
        match parent {
            None => {
                // Root reset without new items means "clear".
                let old_len = self.flattened.read().len();
                for root in self.roots.write().drain(..) {
                    destroy_subtree(arena, root);
                }
                self.flattened.write().clear();
                self.positions.write().clear();
                vec![FlattenedChange::reset(old_len, 0)]
            }
            Some(key) => {
                let was_expanded = arena[key].expanded;
                let visible_at = self.index_of(key).filter(|_| was_expanded);
                let old_span = visible_at.map(|_| visible_size(arena, key) - 1);

                self.rematerialize_children(arena, key);
                if arena[key].leaf {
                    arena[key].expanded = false;
                }

                match (visible_at, old_span) {
                    (Some(pos), Some(removed)) => {
                        let mut revealed = Vec::new();
                        collect_visible_descendants(arena, key, &mut revealed);
                        let inserted = revealed.len();
                        let mut flattened = self.flattened.write();
                        flattened.splice(pos + 1..pos + 1 + removed, revealed);
                        rebuild_positions(&flattened, &mut self.positions.write());
                        vec![FlattenedChange {
                            index: pos + 1,
                            removed,
                            inserted,
                            kind: FlattenedChangeKind::Reset,
                        }]
                    }
                    _ => Vec::new(),
                }
            }
        }
    }

    fn apply_children_insert(
        &self,
        arena: &mut SlotMap<NodeKey, Node<T>>,
        parent: Option<NodeKey>,
        index: usize,
        count: usize,
    ) -> Vec<FlattenedChange> {
        let fresh = match parent {
            None => Vec::new(),
            Some(_) => self.fresh_child_items(arena, parent),
        };
        let new_items: Vec<T> = match parent {
            // Root inserts must come through set_roots; an insert against
            // the root set with no item source is ignored.
            None => {
                tracing::warn!(
                    target: crate::logging::targets::HIERARCHY,
                    "root-level children insert requires set_roots"
                );
                return Vec::new();
            }
            Some(_) => {
                if index + count > fresh.len() {
                    tracing::warn!(
                        target: crate::logging::targets::HIERARCHY,
                        index,
                        count,
                        available = fresh.len(),
                        "children insert out of range, resetting subtree"
                    );
                    return self.apply_children_reset(arena, parent);
                }
                fresh[index..index + count].to_vec()
            }
        };

        let comparer = self.comparer.read().clone();
        let mut created = Vec::with_capacity(count);
        {
            let parent_key = parent;
            let depth = parent_key
                .and_then(|k| arena.get(k))
                .map(|n| n.depth + 1)
                .unwrap_or(0);
            let mut state = self.expanded_state.write();
            for item in new_items {
                created.push(self.create_subtree(
                    arena, &mut state, &comparer, item, parent_key, depth, false,
                ));
            }
        }

        let mut siblings = self.sibling_keys(arena, parent);
        let index = index.min(siblings.len());
        let flat_start = self.child_flat_start(arena, parent, index, &siblings);
        siblings.splice(index..index, created.iter().copied());
        self.set_sibling_keys(arena, parent, siblings);

        match flat_start {
            Some(start) => {
                let mut inserted_rows = Vec::new();
                for key in &created {
                    inserted_rows.push(*key);
                    collect_visible_descendants(arena, *key, &mut inserted_rows);
                }
                let inserted = inserted_rows.len();
                let mut flattened = self.flattened.write();
                flattened.splice(start..start, inserted_rows);
                rebuild_positions(&flattened, &mut self.positions.write());
                vec![FlattenedChange {
                    index: start,
                    removed: 0,
                    inserted,
                    kind: FlattenedChangeKind::Insert,
                }]
            }
            None => Vec::new(),
        }
    }

    fn apply_children_remove(
        &self,
        arena: &mut SlotMap<NodeKey, Node<T>>,
        parent: Option<NodeKey>,
        index: usize,
        count: usize,
    ) -> Vec<FlattenedChange> {
        let mut siblings = self.sibling_keys(arena, parent);
        if index >= siblings.len() {
            return Vec::new();
        }
        let count = count.min(siblings.len() - index);
        let flat_start = self.child_flat_start(arena, parent, index, &siblings);
        let removed_keys: Vec<NodeKey> = siblings.drain(index..index + count).collect();
        let removed_rows = flat_start.map(|_| {
            removed_keys
                .iter()
                .map(|k| visible_size(arena, *k))
                .sum::<usize>()
        });
        self.set_sibling_keys(arena, parent, siblings);
        for key in removed_keys {
            destroy_subtree(arena, key);
        }

        match (flat_start, removed_rows) {
            (Some(start), Some(removed)) if removed > 0 => {
                let mut flattened = self.flattened.write();
                flattened.drain(start..start + removed);
                rebuild_positions(&flattened, &mut self.positions.write());
                vec![FlattenedChange {
                    index: start,
                    removed,
                    inserted: 0,
                    kind: FlattenedChangeKind::Remove,
                }]
            }
            _ => Vec::new(),
        }
    }
}

impl<T> std::fmt::Debug for HierarchicalModel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchicalModel")
            .field("nodes", &self.arena.read().len())
            .field("roots", &self.roots.read().len())
            .field("visible_rows", &self.flattened.read().len())
            .finish()
    }
}

/// Depth-first visibility-filtered linearization of the whole tree.
fn flatten_all<T>(arena: &SlotMap<NodeKey, Node<T>>, roots: &[NodeKey]) -> Vec<NodeKey> {
    let mut out = Vec::new();
    for root in roots {
        out.push(*root);
        collect_visible_descendants(arena, *root, &mut out);
    }
    out
}

/// Append the visible descendants of an (assumed visible) node.
fn collect_visible_descendants<T>(
    arena: &SlotMap<NodeKey, Node<T>>,
    key: NodeKey,
    out: &mut Vec<NodeKey>,
) {
    let Some(node) = arena.get(key) else { return };
    if !node.expanded {
        return;
    }
    if let Some(children) = &node.children {
        for child in children {
            out.push(*child);
            collect_visible_descendants(arena, *child, out);
        }
    }
}

/// Rows this node contributes to the projection: itself plus visible
/// descendants.
fn visible_size<T>(arena: &SlotMap<NodeKey, Node<T>>, key: NodeKey) -> usize {
    let mut rows = Vec::new();
    collect_visible_descendants(arena, key, &mut rows);
    1 + rows.len()
}

fn destroy_subtree<T>(arena: &mut SlotMap<NodeKey, Node<T>>, key: NodeKey) {
    let Some(node) = arena.remove(key) else { return };
    for child in node.children.into_iter().flatten() {
        destroy_subtree(arena, child);
    }
}

fn rebuild_positions(flattened: &[NodeKey], positions: &mut HashMap<NodeKey, usize>) {
    positions.clear();
    for (i, key) in flattened.iter().enumerate() {
        positions.insert(*key, i);
    }
}

fn sort_keys_by_item<T>(
    arena: &SlotMap<NodeKey, Node<T>>,
    keys: &mut [NodeKey],
    cmp: &SortComparer<T>,
) {
    keys.sort_by(|a, b| match (arena.get(*a), arena.get(*b)) {
        (Some(na), Some(nb)) => cmp(&na.item, &nb.item),
        _ => std::cmp::Ordering::Equal,
    });
}
