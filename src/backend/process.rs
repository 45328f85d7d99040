use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Cycle de vie observé d'un process enfant supervisé.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", content = "code", rename_all = "snake_case")]
pub enum ProcessState {
    Starting,
    Running,
    Exited(Option<i32>),
    Killed,
}

impl ProcessState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

/// Process enfant dont la sortie est relayée dans les logs et qui est tué à l'arrêt.
pub struct SupervisedChild {
    label: &'static str,
    child: Child,
    state: ProcessState,
}

/// Relaye chaque ligne d'un flux de sortie du process vers `log`.
async fn forward_lines<R: AsyncRead + Unpin>(label: &'static str, reader: R, is_stderr: bool) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if is_stderr => log::warn!("[{}] {}", label, line),
            Ok(Some(line)) => log::info!("[{}] {}", label, line),
            Ok(None) => break,
            Err(error) => {
                log::debug!("[{}] output stream closed: {}", label, error);
                break;
            }
        }
    }
}

impl SupervisedChild {
    /// Lance la commande avec stdout/stderr relayés et `kill_on_drop` actif.
    pub fn spawn(label: &'static str, mut cmd: Command) -> Result<Self, String> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("Failed to start {}: {}", label, e))?;
        log::info!("{} started (pid {:?})", label, child.id());

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(label, stdout, false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(label, stderr, true));
        }

        Ok(Self {
            label,
            child,
            state: ProcessState::Starting,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn mark_running(&mut self) {
        if self.state == ProcessState::Starting {
            self.state = ProcessState::Running;
        }
    }

    /// Met à jour l'état si le process s'est terminé de lui-même.
    pub fn refresh(&mut self) -> ProcessState {
        if self.state.is_live() {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    log::warn!("{} exited with {}", self.label, status);
                    self.state = ProcessState::Exited(status.code());
                }
                Ok(None) => {}
                Err(error) => log::warn!("{} status check failed: {}", self.label, error),
            }
        }
        self.state
    }

    /// Envoie la termination puis attend au plus `grace`; ne bloque jamais indéfiniment.
    pub async fn stop(&mut self, grace: Duration) -> ProcessState {
        if !self.refresh().is_live() {
            return self.state;
        }

        if let Err(error) = self.child.start_kill() {
            log::warn!("failed to signal {}: {}", self.label, error);
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => log::info!("{} stopped ({})", self.label, status),
            Ok(Err(error)) => log::warn!("waiting for {} failed: {}", self.label, error),
            Err(_) => log::warn!(
                "{} did not exit within {} ms, abandoning it",
                self.label,
                grace.as_millis()
            ),
        }
        self.state = ProcessState::Killed;
        self.state
    }
}
