//! Static menu content and the update dispatcher that renders it.

pub mod catalog;
pub mod dispatcher;

pub use catalog::{
    is_home_selection, MenuCatalog, MenuItem, DEFAULT_BACK_LABEL, DEFAULT_HOME_TEXT,
    HOME_SELECTION_ID, INVALID_SELECTION_TEXT, LEGACY_HOME_SELECTION_ID,
};
pub use dispatcher::{DispatchOutcome, UpdateDispatcher};
