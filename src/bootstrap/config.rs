use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::provision::runtime::DEFAULT_RUNTIME_HOST;

/// Fichier de configuration du pack de modèles, à la racine des ressources.
pub const CONFIG_FILE_NAME: &str = "model_pack_config.json";

pub const ENGINE_OVERRIDE_ENV: &str = "MEETING_ASSISTANT_SUMMARY_ENGINE";
pub const PORT_OVERRIDE_ENV: &str = "MEETING_ASSISTANT_BACKEND_PORT";
pub const READY_TIMEOUT_OVERRIDE_ENV: &str = "MEETING_ASSISTANT_READY_TIMEOUT_MS";
/// Chemin du script serveur à lancer avec l'interpréteur en développement.
pub const DEV_BACKEND_ENV: &str = "MEETING_ASSISTANT_DEV_BACKEND";

/// Moteur de résumé demandé au backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryEngine {
    /// Fichier GGUF chargé par le backend.
    LlamaCpp,
    /// Runtime Ollama local.
    Ollama,
    /// Aucun modèle local: résumés désactivés.
    Disabled,
}

impl SummaryEngine {
    /// Parse la valeur de configuration; les alias courants sont acceptés.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "llama_cpp" | "llamacpp" | "gguf" => Ok(Self::LlamaCpp),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(format!(
                "Unknown summary engine '{}'. Expected llama_cpp, ollama or disabled",
                other
            )),
        }
    }

    /// Valeur transmise au backend dans `SUMMARY_ENGINE`.
    pub fn as_env_value(&self) -> &'static str {
        match self {
            Self::LlamaCpp => "llama_cpp",
            Self::Ollama => "ollama",
            Self::Disabled => "disabled",
        }
    }

    /// Vrai si le moteur a besoin d'un modèle présent sur la machine.
    pub fn needs_local_assets(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl<'de> Deserialize<'de> for SummaryEngine {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Configuration de démarrage lue depuis `model_pack_config.json`.
///
/// Chaque champ a une valeur par défaut: un fichier absent ou partiel reste utilisable.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BootstrapConfig {
    pub model_name: String,
    pub gguf_filename: String,
    pub version_label: String,
    pub ollama_model: String,
    pub summary_engine: SummaryEngine,
    /// Sans modèle, l'application quitte au lieu de continuer sans résumés.
    pub llm_required: bool,
    pub backend_port: u16,
    pub ready_timeout_ms: u64,
    pub download_url: String,
    pub runtime_download_url: String,
    /// Nom de l'installeur du runtime dans `installers/`.
    pub runtime_installer: Option<String>,
    /// Adresse `hôte:port` du serveur du runtime.
    pub runtime_host: String,
    pub bundled_import: bool,
    pub network_pull: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            model_name: "qwen2.5-1.5b-instruct".to_string(),
            gguf_filename: "qwen2.5-1.5b-instruct-q4_k_m.gguf".to_string(),
            version_label: "v1".to_string(),
            ollama_model: "qwen2.5:1.5b".to_string(),
            summary_engine: SummaryEngine::LlamaCpp,
            llm_required: true,
            backend_port: 8000,
            ready_timeout_ms: 30_000,
            download_url: "https://huggingface.co/Qwen/Qwen2.5-1.5B-Instruct-GGUF".to_string(),
            runtime_download_url: "https://ollama.com/download".to_string(),
            runtime_installer: None,
            runtime_host: DEFAULT_RUNTIME_HOST.to_string(),
            bundled_import: true,
            network_pull: true,
        }
    }
}

impl BootstrapConfig {
    /// Lit la configuration embarquée; un fichier absent donne les valeurs par défaut.
    pub fn load(resource_dir: &Path) -> Result<Self, String> {
        let path = resource_dir.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            log::info!(
                "{} not found, using default bootstrap configuration",
                path.to_string_lossy()
            );
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {}", path.to_string_lossy(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| format!("Invalid {}: {}", path.to_string_lossy(), e))
    }

    /// Applique les surcharges d'environnement fournies par `lookup`.
    ///
    /// Une valeur invalide est ignorée avec un avertissement.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENGINE_OVERRIDE_ENV) {
            match SummaryEngine::parse(&raw) {
                Ok(engine) => self.summary_engine = engine,
                Err(error) => log::warn!("{}: {}", ENGINE_OVERRIDE_ENV, error),
            }
        }
        if let Some(raw) = lookup(PORT_OVERRIDE_ENV) {
            match raw.trim().parse::<u16>() {
                Ok(port) if port > 0 => self.backend_port = port,
                _ => log::warn!("{}: invalid port '{}'", PORT_OVERRIDE_ENV, raw),
            }
        }
        if let Some(raw) = lookup(READY_TIMEOUT_OVERRIDE_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.ready_timeout_ms = ms,
                Err(_) => log::warn!("{}: invalid timeout '{}'", READY_TIMEOUT_OVERRIDE_ENV, raw),
            }
        }
    }

    /// Charge la configuration puis applique l'environnement du process.
    pub fn from_resources(resource_dir: &Path) -> Result<Self, String> {
        let mut config = Self::load(resource_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));
        Ok(config)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Chemin complet de l'installeur du runtime embarqué, s'il est configuré.
    pub fn runtime_installer_path(&self, resource_dir: &Path) -> Option<PathBuf> {
        self.runtime_installer
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| resource_dir.join("installers").join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let td = tempfile::tempdir().expect("tempdir");
        let config = BootstrapConfig::load(td.path()).expect("load");
        assert_eq!(config.backend_port, 8000);
        assert_eq!(config.ready_timeout(), Duration::from_secs(30));
        assert_eq!(config.summary_engine, SummaryEngine::LlamaCpp);
        assert!(config.llm_required);
        assert_eq!(config.runtime_host, "127.0.0.1:11434");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let td = tempfile::tempdir().expect("tempdir");
        fs::write(
            td.path().join(CONFIG_FILE_NAME),
            r#"{ "summaryEngine": "ollama", "llmRequired": false, "runtimeInstaller": "OllamaSetup.exe" }"#,
        )
        .expect("write");

        let config = BootstrapConfig::load(td.path()).expect("load");
        assert_eq!(config.summary_engine, SummaryEngine::Ollama);
        assert!(!config.llm_required);
        assert_eq!(config.ollama_model, "qwen2.5:1.5b");
        assert_eq!(
            config.runtime_installer_path(td.path()),
            Some(td.path().join("installers").join("OllamaSetup.exe"))
        );
    }

    #[test]
    fn invalid_engine_is_reported() {
        let td = tempfile::tempdir().expect("tempdir");
        fs::write(td.path().join(CONFIG_FILE_NAME), r#"{ "summaryEngine": "gpt" }"#).expect("write");
        let err = BootstrapConfig::load(td.path()).unwrap_err();
        assert!(err.contains("Unknown summary engine"));
    }

    #[test]
    fn overrides_apply_and_invalid_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            (ENGINE_OVERRIDE_ENV, "disabled"),
            (PORT_OVERRIDE_ENV, "not-a-port"),
            (READY_TIMEOUT_OVERRIDE_ENV, "1500"),
        ]
        .into_iter()
        .collect();

        let mut config = BootstrapConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.summary_engine, SummaryEngine::Disabled);
        assert_eq!(config.backend_port, 8000);
        assert_eq!(config.ready_timeout_ms, 1500);
    }

    #[test]
    fn from_resources_reads_process_environment() {
        let _g = env_lock().lock().unwrap();
        let td = tempfile::tempdir().expect("tempdir");
        std::env::set_var(PORT_OVERRIDE_ENV, "8765");
        std::env::remove_var(ENGINE_OVERRIDE_ENV);

        let config = BootstrapConfig::from_resources(td.path()).expect("config");
        std::env::remove_var(PORT_OVERRIDE_ENV);
        assert_eq!(config.backend_port, 8765);
    }
}
