/// Types du domaine de localisation des modèles.
pub mod types;

mod locator;
mod packaged;
mod platform;

pub use locator::{find_in_folder, locate};
pub use packaged::PackagedAssets;
pub use platform::{managed_model_dir, BaseDirs, Platform};
pub use types::{CandidateReason, LocateResult, ModelSpec};
