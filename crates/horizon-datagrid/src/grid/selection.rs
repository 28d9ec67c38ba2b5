//! Row selection keyed by row identity.
//!
//! Selection is stored as a set of row *keys* (the stable identity the
//! grid's row-key function produces), never as row indices. Sorting,
//! filtering, and hierarchy changes reorder and hide rows freely; the
//! selection follows the surviving rows, and the grid translates keys to
//! slots on demand.

use std::collections::HashSet;

use horizon_datagrid_core::{Signal, ThreadAffinity};
use parking_lot::RwLock;

/// Which selection gestures are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    NoSelection,
    #[default]
    SingleSelection,
    /// Plain clicks toggle membership.
    MultiSelection,
    /// Plain click replaces; modifiers extend.
    ExtendedSelection,
}

/// How a select operation combines with the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionFlags {
    /// Clear the current selection first.
    pub clear: bool,
    /// Select the key (deselect when `toggle` and already selected).
    pub select: bool,
    /// Remove the key from the selection.
    pub deselect: bool,
    /// Flip the key's membership.
    pub toggle: bool,
    /// Also make the key current.
    pub current: bool,
}

impl SelectionFlags {
    /// Clear-and-select, the plain click in single selection.
    pub fn replace() -> Self {
        Self {
            clear: true,
            select: true,
            deselect: false,
            toggle: false,
            current: true,
        }
    }

    pub fn add() -> Self {
        Self {
            clear: false,
            select: true,
            deselect: false,
            toggle: false,
            current: true,
        }
    }

    pub fn toggle() -> Self {
        Self {
            clear: false,
            select: false,
            deselect: false,
            toggle: true,
            current: true,
        }
    }
}

/// Payload of [`SelectionModel::selection_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub selected: Vec<u64>,
    pub deselected: Vec<u64>,
}

/// Identity-keyed selection state.
pub struct SelectionModel {
    affinity: ThreadAffinity,
    mode: RwLock<SelectionMode>,
    selected: RwLock<HashSet<u64>>,
    current: RwLock<Option<u64>>,
    anchor: RwLock<Option<u64>>,
    /// Emitted with the keys that entered and left the selection.
    pub selection_changed: Signal<SelectionChange>,
    /// Emitted with the new current key.
    pub current_changed: Signal<Option<u64>>,
}

impl Default for SelectionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionModel {
    pub fn new() -> Self {
        Self {
            affinity: ThreadAffinity::current(),
            mode: RwLock::new(SelectionMode::default()),
            selected: RwLock::new(HashSet::new()),
            current: RwLock::new(None),
            anchor: RwLock::new(None),
            selection_changed: Signal::new(),
            current_changed: Signal::new(),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        *self.mode.read()
    }

    /// Change the mode. Shrinks the selection when the new mode is
    /// stricter.
    pub fn set_mode(&self, mode: SelectionMode) {
        self.affinity.assert_same_thread();
        *self.mode.write() = mode;
        match mode {
            SelectionMode::NoSelection => self.clear(),
            SelectionMode::SingleSelection => {
                let keep = *self.current.read();
                let extra: Vec<u64> = self
                    .selected
                    .read()
                    .iter()
                    .copied()
                    .filter(|k| Some(*k) != keep)
                    .collect();
                if !extra.is_empty() {
                    let mut selected = self.selected.write();
                    for key in &extra {
                        selected.remove(key);
                    }
                    drop(selected);
                    self.selection_changed.emit(SelectionChange {
                        selected: Vec::new(),
                        deselected: extra,
                    });
                }
            }
            _ => {}
        }
    }

    pub fn is_selected(&self, key: u64) -> bool {
        self.selected.read().contains(&key)
    }

    pub fn selected_keys(&self) -> Vec<u64> {
        self.selected.read().iter().copied().collect()
    }

    pub fn selection_count(&self) -> usize {
        self.selected.read().len()
    }

    pub fn has_selection(&self) -> bool {
        !self.selected.read().is_empty()
    }

    pub fn current_key(&self) -> Option<u64> {
        *self.current.read()
    }

    pub fn anchor_key(&self) -> Option<u64> {
        *self.anchor.read()
    }

    pub fn set_anchor(&self, key: Option<u64>) {
        *self.anchor.write() = key;
    }

    /// Apply a selection gesture to `key`.
    ///
    /// In `SingleSelection` mode any select implies clearing first; in
    /// `NoSelection` mode only `current` takes effect.
    pub fn select(&self, key: u64, flags: SelectionFlags) {
        self.affinity.assert_same_thread();
        let mode = self.mode();
        let mut newly_selected = Vec::new();
        let mut newly_deselected = Vec::new();
        {
            let mut selected = self.selected.write();

            let clear = flags.clear
                || (mode == SelectionMode::SingleSelection
                    && (flags.select || flags.toggle));
            if clear {
                for existing in selected.iter().copied() {
                    if existing != key || flags.deselect {
                        newly_deselected.push(existing);
                    }
                }
                selected.retain(|k| *k == key && !flags.deselect);
            }

            if mode != SelectionMode::NoSelection {
                let want_select = flags.select
                    || (flags.toggle && !selected.contains(&key) && !newly_deselected.contains(&key));
                let want_deselect =
                    flags.deselect || (flags.toggle && selected.contains(&key));
                if want_deselect && selected.remove(&key) {
                    newly_deselected.push(key);
                } else if want_select && selected.insert(key) {
                    newly_selected.push(key);
                }
            }
        }

        if flags.current {
            self.set_current(Some(key));
        }
        if !newly_selected.is_empty() || !newly_deselected.is_empty() {
            self.selection_changed.emit(SelectionChange {
                selected: newly_selected,
                deselected: newly_deselected,
            });
        }
    }

    /// Set the current key without touching the selection.
    pub fn set_current(&self, key: Option<u64>) {
        let changed = {
            let mut current = self.current.write();
            let changed = *current != key;
            *current = key;
            changed
        };
        if changed {
            self.current_changed.emit(key);
        }
    }

    /// Replace the selection wholesale (range selection, select-all).
    pub fn select_exactly(&self, keys: impl IntoIterator<Item = u64>) {
        self.affinity.assert_same_thread();
        if self.mode() == SelectionMode::NoSelection {
            return;
        }
        let target: HashSet<u64> = keys.into_iter().collect();
        let (newly_selected, newly_deselected) = {
            let mut selected = self.selected.write();
            let added: Vec<u64> = target.difference(&selected).copied().collect();
            let removed: Vec<u64> = selected.difference(&target).copied().collect();
            *selected = target;
            (added, removed)
        };
        if !newly_selected.is_empty() || !newly_deselected.is_empty() {
            self.selection_changed.emit(SelectionChange {
                selected: newly_selected,
                deselected: newly_deselected,
            });
        }
    }

    /// Drop keys that no longer exist in the data, keeping the rest of the
    /// selection intact. Called by the grid after structural changes.
    pub fn retain_keys(&self, is_alive: impl Fn(u64) -> bool) {
        self.affinity.assert_same_thread();
        let removed: Vec<u64> = {
            let mut selected = self.selected.write();
            let dead: Vec<u64> = selected.iter().copied().filter(|k| !is_alive(*k)).collect();
            for key in &dead {
                selected.remove(key);
            }
            dead
        };
        {
            let mut current = self.current.write();
            if current.is_some_and(|k| !is_alive(k)) {
                *current = None;
                drop(current);
                self.current_changed.emit(None);
            }
        }
        {
            let mut anchor = self.anchor.write();
            if anchor.is_some_and(|k| !is_alive(k)) {
                *anchor = None;
            }
        }
        if !removed.is_empty() {
            self.selection_changed.emit(SelectionChange {
                selected: Vec::new(),
                deselected: removed,
            });
        }
    }

    pub fn clear(&self) {
        self.affinity.assert_same_thread();
        let removed: Vec<u64> = {
            let mut selected = self.selected.write();
            let removed = selected.iter().copied().collect();
            selected.clear();
            removed
        };
        self.set_current(None);
        *self.anchor.write() = None;
        if !removed.is_empty() {
            self.selection_changed.emit(SelectionChange {
                selected: Vec::new(),
                deselected: removed,
            });
        }
    }
}

impl std::fmt::Debug for SelectionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionModel")
            .field("mode", &self.mode())
            .field("count", &self.selection_count())
            .field("current", &self.current_key())
            .finish()
    }
}
