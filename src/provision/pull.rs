use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::utils::process::configure_async_command_no_window;

use super::progress::{parse_progress, strip_terminal_escapes, ProgressSink};

/// Délai de lecture des sorties après la fin du process.
///
/// Un process détaché par un installeur hérite des pipes et les garde ouverts.
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);

/// Commande externe opaque du runtime (pull, serve, installeur).
#[derive(Clone, Debug)]
pub struct RuntimeCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl RuntimeCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Représentation courte pour les logs et messages d'erreur.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Construit la commande tokio correspondante.
    pub fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        configure_async_command_no_window(&mut cmd);
        cmd
    }
}

/// Lit un flux de sortie et publie chaque segment (`\n` ou `\r`) comme progression.
///
/// Retourne le dernier segment non vide, utilisé pour décrire un échec.
async fn forward_progress<R: AsyncRead + Unpin>(mut reader: R, sink: ProgressSink) -> Option<String> {
    let mut buf = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    let mut last: Option<String> = None;

    let flush = |pending: &mut Vec<u8>, last: &mut Option<String>| {
        if pending.is_empty() {
            return;
        }
        let text = strip_terminal_escapes(&String::from_utf8_lossy(pending));
        pending.clear();
        let text = text.trim();
        if text.is_empty() || last.as_deref() == Some(text) {
            return;
        }
        sink.send(parse_progress(text));
        *last = Some(text.to_string());
    };

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(error) => {
                log::warn!("progress stream read failed: {}", error);
                break;
            }
        };
        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                flush(&mut pending, &mut last);
            } else {
                pending.push(byte);
            }
        }
    }
    flush(&mut pending, &mut last);
    last
}

/// Attend la fin d'un lecteur de sortie, abandonné au-delà de `OUTPUT_DRAIN`.
async fn drain(task: Option<JoinHandle<Option<String>>>) -> Option<String> {
    let mut task = task?;
    match tokio::time::timeout(OUTPUT_DRAIN, &mut task).await {
        Ok(joined) => joined.ok().flatten(),
        Err(_) => {
            log::debug!("output pipe still held open by a detached process, not waiting");
            task.abort();
            None
        }
    }
}

/// Exécute une commande en relayant stdout/stderr comme progression.
///
/// Réussit si et seulement si le process se termine avec le statut zéro.
pub async fn run_streaming(command: &RuntimeCommand, sink: &ProgressSink) -> Result<(), String> {
    log::info!("running {}", command.display());
    let mut cmd = command.to_tokio();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| format!("Failed to start '{}': {}", command.display(), e))?;

    let stdout_task = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(forward_progress(stdout, sink.clone())));
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(forward_progress(stderr, sink.clone())));

    let status = child
        .wait()
        .await
        .map_err(|e| format!("Failed to wait for '{}': {}", command.display(), e))?;

    let (_, last_error_line) = tokio::join!(drain(stdout_task), drain(stderr_task));

    if status.success() {
        return Ok(());
    }

    let code = status
        .code()
        .map(|code| code.to_string())
        .unwrap_or_else(|| "signal".to_string());
    Err(match last_error_line {
        Some(line) => format!("'{}' exited with status {}: {}", command.display(), code, line),
        None => format!("'{}' exited with status {}", command.display(), code),
    })
}
