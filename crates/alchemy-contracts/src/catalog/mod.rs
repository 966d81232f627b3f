mod registry;
mod selectors;

pub use registry::{
    AuxiliaryKind, AuxiliaryModel, AuxiliaryModels, Checkpoint, ModelCatalog, ModelFamily,
    FOCUS_ASPECTS,
};
pub use selectors::{CheckpointSelection, CheckpointSelector};
