use tauri::Manager;

use crate::app::shell::remembered_model_folder;
use crate::assets::{locate, LocateResult, PackagedAssets};
use crate::backend::ExecutionMode;
use crate::binaries;
use crate::bootstrap::controller::RUNTIME_BINARY;
use crate::bootstrap::{BootstrapConfig, BootstrapContext, SummaryEngine};
use crate::provision::store::{ModelRef, ModelStore};

/// Vue de diagnostic des modèles et binaires utilisés au démarrage.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAssetsDiagnostic {
    pub summary_engine: SummaryEngine,
    /// Candidats du fichier GGUF, dans l'ordre de priorité.
    pub model: LocateResult,
    pub packaged: PackagedAssets,
    pub backend_executable: Option<String>,
    pub backend_executable_exists: bool,
    /// Historique de résolution de la CLI du runtime.
    pub runtime: binaries::BinaryResolveDebugInfo,
    pub runtime_store: Option<String>,
    pub runtime_model: String,
    pub runtime_model_installed: bool,
}

/// Collecte le diagnostic pour un contexte donné. Bloquant.
pub fn collect_model_diagnostics(ctx: &BootstrapContext) -> ModelAssetsDiagnostic {
    let config = &ctx.config;
    let (backend_executable, backend_executable_exists) = match ctx.backend_mode() {
        ExecutionMode::Packaged { executable } => {
            let exists = executable.is_file();
            (Some(executable.to_string_lossy().to_string()), exists)
        }
        ExecutionMode::Development { script, .. } => {
            let exists = script.is_file();
            (Some(script.to_string_lossy().to_string()), exists)
        }
    };

    let runtime_store = ctx.runtime_store_root();
    let runtime_model_installed = match (&runtime_store, ModelRef::parse(&config.ollama_model)) {
        (Some(root), Ok(model)) => ModelStore::new(root).is_registered(&model),
        _ => false,
    };

    ModelAssetsDiagnostic {
        summary_engine: config.summary_engine,
        model: locate(&ctx.model_spec()),
        packaged: PackagedAssets::detect(&ctx.resource_dir, &config.gguf_filename),
        backend_executable,
        backend_executable_exists,
        runtime: binaries::resolve_binary_debug(RUNTIME_BINARY, Some(&ctx.resource_dir)),
        runtime_store: runtime_store.map(|root| root.to_string_lossy().to_string()),
        runtime_model: config.ollama_model.clone(),
        runtime_model_installed,
    }
}

/// Commande IPC de diagnostic des modèles, du backend et du runtime.
#[tauri::command]
pub async fn diagnose_model_assets(
    app_handle: tauri::AppHandle,
) -> Result<ModelAssetsDiagnostic, String> {
    let resource_dir = app_handle
        .path()
        .resource_dir()
        .map_err(|e| e.to_string())?;
    let remembered = remembered_model_folder(&app_handle);

    tokio::task::spawn_blocking(move || {
        let config = BootstrapConfig::from_resources(&resource_dir)?;
        let ctx = BootstrapContext::from_environment(resource_dir, config, remembered);
        Ok(collect_model_diagnostics(&ctx))
    })
    .await
    .map_err(|e| format!("Diagnostic task failed: {}", e))?
}
