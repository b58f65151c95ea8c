pub mod action;
pub mod behavior;
pub mod interrupt;
pub mod workflow;

pub use action::{
    AccessAction, Action, ActionContext, ConfigurationAction, EditUsedDataAction, OfferingAction,
    PermissionAction, ProcessingExecutionAction, SynchronizationAction, UploadAction,
};
pub use behavior::Behavior;
pub use interrupt::InterruptSignal;
pub use workflow::Workflow;
