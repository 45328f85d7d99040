use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::backend::ReadinessState;
use crate::provision::progress::ProgressEvent;

/// Étapes du démarrage, dans l'ordre où elles peuvent être traversées.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    Init,
    LocatingAsset,
    /// Moteur sans modèle local, ou pack hors-ligne complet.
    SkippingAsset,
    Provisioning,
    Resolving,
    StartingBackend,
    AwaitingReady,
    ShowingWindow,
    Running,
    ShuttingDown,
    Terminated,
}

/// Disponibilité d'une capacité optionnelle (résumés).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CapabilityState {
    Pending,
    Available,
    Unavailable(String),
}

impl CapabilityState {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Vue sérialisable du démarrage, exposée au frontend.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapStatus {
    pub phase: BootstrapPhase,
    pub history: Vec<BootstrapPhase>,
    pub summary: CapabilityState,
    pub summary_engine: Option<String>,
    pub model_path: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub readiness: ReadinessState,
    pub last_error: Option<String>,
    /// Dernier événement de progression, relu par une fenêtre ouverte après son émission.
    pub progress: Option<ProgressEvent>,
}

impl Default for BootstrapStatus {
    fn default() -> Self {
        Self {
            phase: BootstrapPhase::Init,
            history: vec![BootstrapPhase::Init],
            summary: CapabilityState::Pending,
            summary_engine: None,
            model_path: None,
            backend_url: None,
            readiness: ReadinessState::Pending,
            last_error: None,
            progress: None,
        }
    }
}

impl BootstrapStatus {
    /// Passe à la phase suivante; `Terminated` est définitif.
    pub fn enter(&mut self, phase: BootstrapPhase) -> bool {
        if self.phase == BootstrapPhase::Terminated || self.phase == phase {
            return false;
        }
        log::info!("bootstrap phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.history.push(phase);
        true
    }
}

/// Statut partagé entre la tâche de démarrage, l'arrêt et les commandes IPC.
#[derive(Clone, Default)]
pub struct SharedStatus(Arc<Mutex<BootstrapStatus>>);

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applique une modification; un verrou empoisonné est récupéré tel quel.
    pub fn update<T>(&self, f: impl FnOnce(&mut BootstrapStatus) -> T) -> T {
        let mut guard = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn enter(&self, phase: BootstrapPhase) -> bool {
        self.update(|status| status.enter(phase))
    }

    pub fn snapshot(&self) -> BootstrapStatus {
        self.update(|status| status.clone())
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.update(|status| status.phase)
    }

    pub fn record_progress(&self, event: &ProgressEvent) {
        self.update(|status| status.progress = Some(event.clone()));
    }
}
