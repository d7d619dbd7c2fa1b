mod initial;
mod merge;
mod multi_manager;
mod single_manager;
mod tagged_model;

pub use initial::{InitialTagReport, load_initial_tags};
pub use merge::{MergeEngine, MergeReport};
pub use multi_manager::MultiTagManager;
pub use single_manager::SingleTagManager;
pub use tagged_model::{FieldManager, TaggedInstance, TaggedModel};
