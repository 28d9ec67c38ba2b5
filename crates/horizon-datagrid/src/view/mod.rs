//! The collection view layer: sorted/filtered/grouped projections over flat
//! row collections, addressed by view index.

pub mod collection_view;
pub mod sort_description;

pub use collection_view::{
    CollectionView, DeferRefreshGuard, GroupDescription, GroupRun, ViewError,
};
pub use sort_description::{sorts_equal, ViewSortDescription, ViewSortKey};
