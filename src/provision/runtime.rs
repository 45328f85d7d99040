use std::path::{Path, PathBuf};
use std::process::Stdio;

use super::progress::ProgressSink;
use super::pull::{run_streaming, RuntimeCommand};
use super::store::ModelRef;
use crate::utils::process::sanitize_cmd_error;

/// Adresse d'écoute par défaut du serveur Ollama.
pub const DEFAULT_RUNTIME_HOST: &str = "127.0.0.1:11434";
/// Endpoint utilisé pour vérifier que le serveur du runtime répond.
pub const RUNTIME_HEALTH_PATH: &str = "/api/tags";

/// Runtime local de modèles de langage piloté via sa CLI.
#[derive(Clone, Debug)]
pub struct OllamaRuntime {
    binary: PathBuf,
    store_root: PathBuf,
    host: String,
}

impl OllamaRuntime {
    pub fn new(binary: impl Into<PathBuf>, store_root: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            store_root: store_root.into(),
            host: DEFAULT_RUNTIME_HOST.to_string(),
        }
    }

    /// Serveur écoutant sur une autre adresse que celle par défaut.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// URL de base de l'API HTTP du runtime.
    pub fn api_url(&self) -> String {
        format!("http://{}", self.host)
    }

    fn command(&self) -> RuntimeCommand {
        RuntimeCommand::new(&self.binary)
            .env("OLLAMA_MODELS", self.store_root.to_string_lossy())
            .env("OLLAMA_HOST", &self.host)
    }

    /// Commande `pull` d'un modèle.
    pub fn pull_command(&self, model: &ModelRef) -> RuntimeCommand {
        self.command().arg("pull").arg(model.as_tag())
    }

    /// Commande `serve` démarrant le serveur du runtime.
    pub fn serve_command(&self) -> RuntimeCommand {
        self.command().arg("serve")
    }

    /// Liste les modèles installés via `list`.
    pub async fn list_installed(&self) -> Result<Vec<String>, String> {
        let command = self.command().arg("list");
        let output = command
            .to_tokio()
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("Failed to run '{}': {}", command.display(), e))?;
        if !output.status.success() {
            return Err(format!(
                "'{}' failed: {}",
                command.display(),
                sanitize_cmd_error(&output)
            ));
        }
        Ok(parse_list_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Extrait la colonne `NAME` de la sortie tabulaire de `list`.
pub fn parse_list_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("NAME"))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Vrai si la liste contient exactement le modèle demandé.
pub fn list_contains(installed: &[String], model: &ModelRef) -> bool {
    let tag = model.as_tag();
    installed.iter().any(|name| {
        name == &tag || (model.tag == "latest" && name == &model.name)
    })
}

/// Exécute l'installeur embarqué du runtime en mode silencieux.
pub async fn run_installer(installer: &Path, sink: &ProgressSink) -> Result<(), String> {
    if !installer.is_file() {
        return Err(format!(
            "Runtime installer not found at {}",
            installer.to_string_lossy()
        ));
    }

    let extension = installer
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let command = match extension.as_str() {
        "exe" => RuntimeCommand::new(installer)
            .arg("/VERYSILENT")
            .arg("/NORESTART")
            .arg("/SUPPRESSMSGBOXES"),
        "sh" => RuntimeCommand::new("sh").arg(installer.to_string_lossy()),
        _ => {
            return Err(format!(
                "Unsupported runtime installer format: {}",
                installer.to_string_lossy()
            ))
        }
    };

    sink.status("Installing the local language-model runtime...");
    run_streaming(&command, sink).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_output_skips_header() {
        let stdout = "NAME            ID              SIZE      MODIFIED\n\
                      qwen2.5:1.5b    65ec06548149    986 MB    2 days ago\n\
                      llama3:latest   365c0bd3c000    4.7 GB    3 weeks ago\n";
        assert_eq!(parse_list_output(stdout), vec!["qwen2.5:1.5b", "llama3:latest"]);
    }

    #[test]
    fn list_contains_matches_exact_tag_only() {
        let installed = vec!["qwen2.5:7b".to_string(), "llama3".to_string()];
        let qwen = ModelRef::parse("qwen2.5:1.5b").expect("parse");
        assert!(!list_contains(&installed, &qwen));
        assert!(list_contains(&installed, &ModelRef::parse("llama3").expect("parse")));
    }

    #[test]
    fn pull_command_targets_the_configured_store() {
        let runtime = OllamaRuntime::new("/opt/ollama/ollama", "/data/ollama-store");
        let command = runtime.pull_command(&ModelRef::parse("qwen2.5:1.5b").expect("parse"));
        assert_eq!(command.args, vec!["pull", "qwen2.5:1.5b"]);
        assert!(command
            .envs
            .contains(&("OLLAMA_MODELS".to_string(), "/data/ollama-store".to_string())));
    }

    #[test]
    fn serve_command_listens_on_the_configured_host() {
        let runtime = OllamaRuntime::new("ollama", "/store").with_host("127.0.0.1:21434");
        assert_eq!(runtime.api_url(), "http://127.0.0.1:21434");
        assert!(runtime
            .serve_command()
            .envs
            .contains(&("OLLAMA_HOST".to_string(), "127.0.0.1:21434".to_string())));
    }

    #[tokio::test]
    async fn run_installer_rejects_missing_file() {
        let (sink, _rx) = ProgressSink::channel();
        let err = run_installer(Path::new("/nonexistent/OllamaSetup.exe"), &sink)
            .await
            .unwrap_err();
        assert!(err.contains("not found"));
    }
}
