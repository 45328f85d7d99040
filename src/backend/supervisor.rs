use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use super::process::{ProcessState, SupervisedChild};
use crate::utils::process::configure_async_command_no_window;

/// Port d'écoute du backend.
pub const PORT_ENV: &str = "PORT";
/// Chemin du fichier GGUF résolu.
pub const MODEL_PATH_ENV: &str = "LLM_MODEL_PATH";
/// Moteur de résumé sélectionné.
pub const ENGINE_ENV: &str = "SUMMARY_ENGINE";

/// Délai laissé au backend pour se terminer après le signal d'arrêt.
pub const STOP_GRACE: Duration = Duration::from_secs(3);

/// Mode d'exécution du backend.
#[derive(Clone, Debug)]
pub enum ExecutionMode {
    /// Binaire pré-construit embarqué dans les ressources.
    Packaged { executable: PathBuf },
    /// Interpréteur de développement lançant le script serveur.
    Development { interpreter: PathBuf, script: PathBuf },
}

/// Paramètres de lancement du backend.
#[derive(Clone, Debug)]
pub struct BackendSpec {
    pub mode: ExecutionMode,
    pub port: u16,
    /// Variables ajoutées à l'environnement hérité du parent.
    pub env: Vec<(String, String)>,
}

impl BackendSpec {
    /// URL de base locale du backend.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Environnement complet passé au backend, port inclus.
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut env = self.env.clone();
        env.retain(|(key, _)| key != PORT_ENV);
        env.push((PORT_ENV.to_string(), self.port.to_string()));
        env
    }

    fn command(&self) -> Result<Command, BackendStartError> {
        let mut cmd = match &self.mode {
            ExecutionMode::Packaged { executable } => {
                if !executable.is_file() {
                    return Err(BackendStartError::MissingExecutable(executable.clone()));
                }
                let mut cmd = Command::new(executable);
                if let Some(dir) = non_empty_parent(executable) {
                    cmd.current_dir(dir);
                }
                cmd
            }
            ExecutionMode::Development {
                interpreter,
                script,
            } => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(script).env("PYTHONUNBUFFERED", "1");
                if let Some(dir) = non_empty_parent(script) {
                    cmd.current_dir(dir);
                }
                cmd
            }
        };
        cmd.envs(self.environment());
        configure_async_command_no_window(&mut cmd);
        Ok(cmd)
    }
}

/// Dossier parent utilisable comme répertoire de travail.
fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|dir| !dir.as_os_str().is_empty())
}

/// Échec de démarrage du backend; toujours fatal pour le bootstrap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendStartError {
    /// Binaire absent en mode packagé: défaut de packaging.
    MissingExecutable(PathBuf),
    /// Un backend est déjà en cours d'exécution.
    AlreadyRunning,
    Spawn(String),
}

impl BackendStartError {
    /// Code stable exposé au frontend et aux logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingExecutable(_) => "BACKEND_NOT_FOUND",
            Self::AlreadyRunning => "BACKEND_ALREADY_RUNNING",
            Self::Spawn(_) => "BACKEND_SPAWN_FAILED",
        }
    }
}

impl fmt::Display for BackendStartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingExecutable(path) => write!(
                f,
                "Backend executable not found at {}. The installation is incomplete; please reinstall the application.",
                path.to_string_lossy()
            ),
            Self::AlreadyRunning => write!(f, "A backend process is already running"),
            Self::Spawn(detail) => write!(f, "Backend could not be started: {}", detail),
        }
    }
}

/// Process backend vivant et environnement avec lequel il a été lancé.
pub struct BackendHandle {
    process: SupervisedChild,
    env: Vec<(String, String)>,
    url: String,
}

impl BackendHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.id()
    }

    pub fn state(&mut self) -> ProcessState {
        self.process.refresh()
    }

    pub fn mark_running(&mut self) {
        self.process.mark_running();
    }
}

/// Propriétaire unique du process backend d'une instance de l'application.
#[derive(Default)]
pub struct BackendSupervisor {
    handle: Option<BackendHandle>,
}

impl BackendSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Démarre le backend; refuse un second démarrage tant que le premier est vivant.
    pub fn start(&mut self, spec: &BackendSpec) -> Result<&mut BackendHandle, BackendStartError> {
        if let Some(handle) = self.handle.as_mut() {
            if handle.state().is_live() {
                return Err(BackendStartError::AlreadyRunning);
            }
        }

        let cmd = spec.command()?;
        let process =
            SupervisedChild::spawn("backend", cmd).map_err(BackendStartError::Spawn)?;
        log::info!("backend listening target {}", spec.url());

        Ok(self.handle.insert(BackendHandle {
            process,
            env: spec.environment(),
            url: spec.url(),
        }))
    }

    pub fn handle_mut(&mut self) -> Option<&mut BackendHandle> {
        self.handle.as_mut()
    }

    /// Arrête le backend s'il existe et libère la référence.
    pub async fn stop(&mut self) -> Option<ProcessState> {
        let mut handle = self.handle.take()?;
        Some(handle.process.stop(STOP_GRACE).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packaged(executable: PathBuf) -> BackendSpec {
        BackendSpec {
            mode: ExecutionMode::Packaged { executable },
            port: 8123,
            env: vec![
                (ENGINE_ENV.to_string(), "llama_cpp".to_string()),
                (PORT_ENV.to_string(), "1".to_string()),
            ],
        }
    }

    #[test]
    fn environment_always_carries_the_configured_port() {
        let spec = packaged(PathBuf::from("/missing"));
        let env = spec.environment();
        assert_eq!(
            env.iter().filter(|(key, _)| key == PORT_ENV).collect::<Vec<_>>(),
            vec![&(PORT_ENV.to_string(), "8123".to_string())]
        );
        assert_eq!(spec.url(), "http://127.0.0.1:8123");
    }

    #[tokio::test]
    async fn start_fails_before_spawn_when_packaged_binary_is_missing() {
        let td = tempfile::tempdir().expect("tempdir");
        let missing = td.path().join("backend").join("ai_meeting_backend");
        let mut supervisor = BackendSupervisor::new();

        let err = supervisor.start(&packaged(missing.clone())).err().expect("error");
        assert_eq!(err, BackendStartError::MissingExecutable(missing));
        assert_eq!(err.code(), "BACKEND_NOT_FOUND");
        assert!(supervisor.handle_mut().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn only_one_backend_is_live_at_a_time() {
        let mut supervisor = BackendSupervisor::new();
        let spec = BackendSpec {
            mode: ExecutionMode::Development {
                interpreter: PathBuf::from("sleep"),
                script: PathBuf::from("30"),
            },
            port: 8124,
            env: Vec::new(),
        };

        supervisor.start(&spec).expect("first start");
        assert_eq!(
            supervisor.start(&spec).err(),
            Some(BackendStartError::AlreadyRunning)
        );
        assert_eq!(supervisor.stop().await, Some(ProcessState::Killed));
        assert!(supervisor.stop().await.is_none());
    }
}
