// Service modules
pub mod audit_trail;
pub mod deduction_service;
pub mod grant_service;
pub mod recovery_service;
pub mod sweep_scheduler;

pub use deduction_service::DeductionService;
pub use grant_service::GrantService;
pub use recovery_service::RecoveryService;
pub use sweep_scheduler::SweepScheduler;
