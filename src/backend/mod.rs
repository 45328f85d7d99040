/// Supervision générique des process enfants.
pub mod process;
/// Attente de disponibilité HTTP.
pub mod readiness;
/// Lancement et arrêt du backend.
pub mod supervisor;

pub use readiness::ReadinessState;
pub use supervisor::ExecutionMode;
