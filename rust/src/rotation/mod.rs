//! Schedule generation: break skeleton, slot resolution, validation and repair.

pub mod balance;
pub mod core;
pub mod priority;
pub mod repair;
pub mod resolver;
pub mod skeleton;
pub mod state;
pub mod validate;

pub use self::core::{GenerationOutcome, GenerationRequest, RotationEngine};
pub use repair::{RepairReport, RepairRule, RuleContext, RuleTally};
pub use resolver::ResolveReport;
pub use skeleton::BreakSkeleton;
pub use state::{PunishmentState, WorkerRuntimeState, WorkerStates};
pub use validate::{validate, ValidationScope, Violation};
