use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::backend::process::SupervisedChild;
use crate::backend::supervisor::{BackendSupervisor, STOP_GRACE};

use super::state::{BootstrapPhase, SharedStatus};

/// Process possédés par une instance démarrée: le backend et, si lancé ici, le serveur du runtime.
pub struct DesktopSession {
    backend: BackendSupervisor,
    runtime_daemon: Option<SupervisedChild>,
}

impl DesktopSession {
    pub fn new(backend: BackendSupervisor, runtime_daemon: Option<SupervisedChild>) -> Self {
        Self {
            backend,
            runtime_daemon,
        }
    }

    pub fn backend_pid(&mut self) -> Option<u32> {
        self.backend.handle_mut().and_then(|handle| handle.pid())
    }

    /// Serveur du runtime lancé pour cette session, absent s'il tournait déjà.
    pub fn runtime_daemon_pid(&self) -> Option<u32> {
        self.runtime_daemon.as_ref().and_then(SupervisedChild::id)
    }

    /// Environnement avec lequel le backend a été lancé.
    pub fn backend_env(&mut self) -> Option<&[(String, String)]> {
        self.backend.handle_mut().map(|handle| handle.env())
    }

    /// Arrête le backend puis le serveur du runtime, chacun avec un délai borné.
    pub async fn shutdown(mut self) {
        if let Some(state) = self.backend.stop().await {
            log::info!("backend stopped: {:?}", state);
        }
        if let Some(mut daemon) = self.runtime_daemon.take() {
            let state = daemon.stop(STOP_GRACE).await;
            log::info!("runtime server stopped: {:?}", state);
        }
    }
}

/// Emplacement de la session partagé avec le hook de fermeture de l'application.
pub struct SessionSlot {
    session: Mutex<Option<DesktopSession>>,
    shutting_down: AtomicBool,
    status: SharedStatus,
}

impl SessionSlot {
    pub fn new(status: SharedStatus) -> Self {
        Self {
            session: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
            status,
        }
    }

    pub fn status(&self) -> &SharedStatus {
        &self.status
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Vrai uniquement pour le premier appelant: l'arrêt n'est entrepris qu'une fois.
    pub fn begin_shutdown(&self) -> bool {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.status.enter(BootstrapPhase::ShuttingDown);
        true
    }

    /// Range la session démarrée; si l'arrêt a déjà commencé, elle est arrêtée aussitôt.
    pub async fn install(&self, session: DesktopSession) {
        let mut slot = self.session.lock().await;
        if self.is_shutting_down() {
            drop(slot);
            log::info!("application closing during startup, stopping the new session");
            session.shutdown().await;
            return;
        }
        *slot = Some(session);
    }

    /// Arrête la session éventuelle puis marque la fin du cycle de vie.
    pub async fn shutdown(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.shutdown().await;
        }
        self.status.enter(BootstrapPhase::Terminated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_is_entered_exactly_once() {
        let status = SharedStatus::new();
        let slot = SessionSlot::new(status.clone());

        assert!(slot.begin_shutdown());
        assert!(!slot.begin_shutdown());
        slot.shutdown().await;

        let history = status.snapshot().history;
        assert_eq!(
            history
                .iter()
                .filter(|phase| **phase == BootstrapPhase::ShuttingDown)
                .count(),
            1
        );
        assert_eq!(status.phase(), BootstrapPhase::Terminated);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn late_session_is_stopped_when_shutdown_already_began() {
        use crate::backend::supervisor::{BackendSpec, ExecutionMode};
        use std::path::PathBuf;

        let mut backend = BackendSupervisor::new();
        backend
            .start(&BackendSpec {
                mode: ExecutionMode::Development {
                    interpreter: PathBuf::from("sleep"),
                    script: PathBuf::from("30"),
                },
                port: 8125,
                env: Vec::new(),
            })
            .expect("start");

        let slot = SessionSlot::new(SharedStatus::new());
        assert!(slot.begin_shutdown());
        slot.install(DesktopSession::new(backend, None)).await;

        assert!(slot.session.lock().await.is_none());
    }
}
