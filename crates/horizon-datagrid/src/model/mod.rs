//! Grid-level models: the authoritative description of sorting, filtering,
//! searching, and hierarchy, independent of any particular view.

pub mod changes;
pub mod column;
pub mod filtering;
pub mod hierarchy;
pub mod search;
pub mod sorting;
pub mod value;

pub use changes::{ChildrenChange, FlattenedChange, FlattenedChangeKind, ViewChange};
pub use column::{Column, ColumnHandle, ColumnId, SortComparer, SortDirection, ValueAccessor};
pub use filtering::{FilterOperator, FilterPredicate, FilteringDescriptor, FilteringModel};
pub use hierarchy::{
    ExpandedKeyMode, HierarchicalModel, HierarchicalOptions, NodeKey,
};
pub use search::{
    CompiledSearch, MatchSpan, SearchDescriptor, SearchError, SearchMatchMode, SearchModel,
    SearchResult, SearchScope, TermCombineMode,
};
pub use sorting::{
    SortCycleMode, SortKey, SortingChange, SortingDescriptor, SortingModel, SortingModifiers,
};
pub use value::{CellValue, TextCompare};
