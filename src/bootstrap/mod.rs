//! Séquence de démarrage de l'application de bureau.

pub mod config;
pub mod controller;
pub mod session;
pub mod shell;
pub mod state;

pub use config::{BootstrapConfig, SummaryEngine};
pub use controller::{BootstrapContext, BootstrapController, BootstrapOutcome};
pub use session::SessionSlot;
pub use shell::DesktopShell;
pub use state::{BootstrapStatus, SharedStatus};
