pub mod engine;
pub mod states;

pub use engine::RequestLifecycle;
pub use states::{
    InspectionResult, LifecycleCommand, LifecycleEvent, LifecycleOperation, Submission,
    TransitionOutcome,
};
