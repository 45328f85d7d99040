use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assets::{
    locate, managed_model_dir, BaseDirs, CandidateReason, LocateResult, ModelSpec, PackagedAssets,
    Platform,
};
use crate::backend::process::SupervisedChild;
use crate::backend::readiness::{join_url, ReadinessGate};
use crate::backend::supervisor::{
    BackendSpec, BackendSupervisor, ExecutionMode, ENGINE_ENV, MODEL_PATH_ENV, STOP_GRACE,
};
use crate::backend::ReadinessState;
use crate::binaries;
use crate::provision::progress::ProgressSink;
use crate::provision::runtime::{run_installer, OllamaRuntime, RUNTIME_HEALTH_PATH};
use crate::provision::store::{default_store_root, ModelRef, ModelStore};
use crate::provision::{ProvisionOutcome, Provisioner, Strategies};
use crate::resolver::{resolve_model_interactively, resolve_runtime_install};
use crate::utils::path::env_path;

use super::config::{BootstrapConfig, SummaryEngine, DEV_BACKEND_ENV};
use super::session::DesktopSession;
use super::shell::DesktopShell;
use super::state::{BootstrapPhase, CapabilityState, SharedStatus};

/// Nom du binaire backend dans `backend/`.
pub const BACKEND_BINARY: &str = "ai_meeting_backend";
/// CLI du runtime de modèles de langage.
pub const RUNTIME_BINARY: &str = "ollama";

pub const SHERPA_DIR_ENV: &str = "SHERPA_ONNX_MODEL_DIR";
pub const OLLAMA_MODEL_ENV: &str = "OLLAMA_MODEL";
pub const OLLAMA_STORE_ENV: &str = "OLLAMA_MODELS";
pub const SUMMARY_AVAILABLE_ENV: &str = "SUMMARY_AVAILABLE";

const RUNTIME_READY_TIMEOUT: Duration = Duration::from_secs(20);
const RUNTIME_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Retourne le nom de l'interpréteur Python système selon l'OS.
fn python_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}

fn lookup_runtime_binary(resource_dir: &Path) -> Option<PathBuf> {
    binaries::resolve_binary(RUNTIME_BINARY, Some(resource_dir))
}

/// Entrées du démarrage, figées avant le lancement de la séquence.
#[derive(Clone, Debug)]
pub struct BootstrapContext {
    pub resource_dir: PathBuf,
    pub platform: Platform,
    pub base_dirs: BaseDirs,
    pub config: BootstrapConfig,
    /// `LLM_MODEL_PATH`: fichier ou dossier du modèle.
    pub model_override: Option<PathBuf>,
    /// Dossier choisi lors d'un lancement précédent.
    pub remembered_folder: Option<PathBuf>,
    pub runtime_binary: Option<PathBuf>,
    /// `OLLAMA_MODELS` du parent.
    pub runtime_store: Option<PathBuf>,
    /// Script serveur lancé avec l'interpréteur au lieu du binaire embarqué.
    pub dev_backend: Option<PathBuf>,
    /// Recherche du binaire du runtime, refaite après une installation.
    pub runtime_lookup: fn(&Path) -> Option<PathBuf>,
}

impl BootstrapContext {
    /// Contexte minimal sans dépendance à l'environnement du process.
    pub fn new(resource_dir: impl Into<PathBuf>, config: BootstrapConfig) -> Self {
        Self {
            resource_dir: resource_dir.into(),
            platform: Platform::current(),
            base_dirs: BaseDirs::default(),
            config,
            model_override: None,
            remembered_folder: None,
            runtime_binary: None,
            runtime_store: None,
            dev_backend: None,
            runtime_lookup: lookup_runtime_binary,
        }
    }

    /// Complète le contexte depuis l'environnement et le système de fichiers.
    ///
    /// Bloquant: la résolution du runtime exécute `--version`.
    pub fn from_environment(
        resource_dir: PathBuf,
        config: BootstrapConfig,
        remembered_folder: Option<PathBuf>,
    ) -> Self {
        let mut ctx = Self::new(resource_dir, config);
        ctx.base_dirs = BaseDirs::from_system();
        ctx.model_override = env_path(MODEL_PATH_ENV);
        ctx.runtime_store = env_path(OLLAMA_STORE_ENV);
        ctx.dev_backend = env_path(DEV_BACKEND_ENV);
        ctx.remembered_folder = remembered_folder;
        if ctx.config.summary_engine.needs_local_assets() {
            ctx.runtime_binary = (ctx.runtime_lookup)(&ctx.resource_dir);
        }
        ctx
    }

    /// Décrit le fichier GGUF attendu et ses emplacements de recherche.
    pub fn model_spec(&self) -> ModelSpec {
        let config = &self.config;
        let mut spec = ModelSpec::new(&config.model_name, &config.gguf_filename, &config.version_label)
            .with_location(
                CandidateReason::Packaged,
                self.resource_dir.join("models").join("llm"),
            );
        if let Some(path) = &self.model_override {
            spec = spec.with_location(CandidateReason::EnvOverride, path);
        }
        if let Some(dir) = managed_model_dir(self.platform, &self.base_dirs) {
            spec = spec.with_location(CandidateReason::Managed, dir);
        }
        if let Some(dir) = &self.remembered_folder {
            spec = spec.with_location(CandidateReason::UserPicked, dir);
        }
        spec
    }

    pub fn backend_mode(&self) -> ExecutionMode {
        match &self.dev_backend {
            Some(script) => ExecutionMode::Development {
                interpreter: PathBuf::from(python_command()),
                script: script.clone(),
            },
            None => ExecutionMode::Packaged {
                executable: self
                    .resource_dir
                    .join("backend")
                    .join(binaries::executable_name(BACKEND_BINARY)),
            },
        }
    }

    pub(crate) fn runtime_store_root(&self) -> Option<PathBuf> {
        default_store_root(self.runtime_store.clone(), &self.base_dirs)
    }
}

/// Issue de la séquence de démarrage.
pub enum BootstrapOutcome {
    /// La fenêtre principale est ouverte; la session possède les process.
    Running(DesktopSession),
    /// L'application doit quitter avec ce code.
    Quit(i32),
}

/// Ce que la phase de préparation a obtenu pour le backend.
struct AssetPlan {
    engine: SummaryEngine,
    model_path: Option<PathBuf>,
    sherpa_dir: Option<PathBuf>,
    store_root: Option<PathBuf>,
    summary: CapabilityState,
    runtime_daemon: Option<SupervisedChild>,
}

impl AssetPlan {
    async fn stop_daemon(&mut self) {
        if let Some(mut daemon) = self.runtime_daemon.take() {
            daemon.stop(STOP_GRACE).await;
        }
    }
}

/// Séquence localisation, provisionnement, résolution, backend, disponibilité puis fenêtre.
pub struct BootstrapController<S> {
    shell: S,
    ctx: BootstrapContext,
    status: SharedStatus,
    progress: ProgressSink,
    backend_gate: ReadinessGate,
    runtime_gate: ReadinessGate,
}

impl<S: DesktopShell> BootstrapController<S> {
    pub fn new(shell: S, ctx: BootstrapContext, status: SharedStatus, progress: ProgressSink) -> Self {
        Self {
            shell,
            ctx,
            status,
            progress,
            backend_gate: ReadinessGate::backend(),
            runtime_gate: ReadinessGate::new(RUNTIME_HEALTH_PATH),
        }
    }

    #[cfg(test)]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.backend_gate = self.backend_gate.with_interval(interval);
        self.runtime_gate = self.runtime_gate.with_interval(interval);
        self
    }

    #[cfg(test)]
    pub fn shell(&self) -> &S {
        &self.shell
    }

    #[cfg(test)]
    pub fn status(&self) -> &SharedStatus {
        &self.status
    }

    /// Exécute toute la séquence; aucune erreur ne s'en échappe.
    pub async fn run(&self) -> BootstrapOutcome {
        self.progress.percent(0, "Preparing AI Meeting Assistant...");
        match self.prepare_assets().await {
            Some(plan) => self.launch(plan).await,
            None => BootstrapOutcome::Quit(0),
        }
    }

    /// Rend les modèles disponibles; `None` si un modèle obligatoire reste introuvable.
    async fn prepare_assets(&self) -> Option<AssetPlan> {
        let config = &self.ctx.config;
        let resource_dir = self.ctx.resource_dir.clone();
        let gguf_filename = config.gguf_filename.clone();
        let packaged = tokio::task::spawn_blocking(move || {
            PackagedAssets::detect(&resource_dir, &gguf_filename)
        })
        .await
        .unwrap_or_default();

        let mut plan = AssetPlan {
            engine: config.summary_engine,
            model_path: None,
            sherpa_dir: packaged.sherpa_dir_for_backend().map(Path::to_path_buf),
            store_root: None,
            summary: CapabilityState::Pending,
            runtime_daemon: None,
        };

        match config.summary_engine {
            SummaryEngine::Disabled => {
                self.status.enter(BootstrapPhase::SkippingAsset);
                plan.summary = CapabilityState::Unavailable("Summaries are disabled".to_string());
            }
            SummaryEngine::LlamaCpp => match (&packaged.gguf, &packaged.sherpa_root) {
                (Some(gguf), Some(_)) => {
                    log::info!("offline bundle complete, skipping model acquisition");
                    self.status.enter(BootstrapPhase::SkippingAsset);
                    plan.model_path = Some(gguf.clone());
                    plan.summary = CapabilityState::Available;
                }
                _ => {
                    if !self.acquire_gguf(&mut plan, &packaged).await {
                        return None;
                    }
                }
            },
            SummaryEngine::Ollama => {
                self.status.enter(BootstrapPhase::LocatingAsset);
                self.status.enter(BootstrapPhase::Provisioning);
                let snapshot = packaged.ollama_snapshot.clone();
                match self.acquire_ollama(&mut plan, snapshot, true).await {
                    Ok(()) => plan.summary = CapabilityState::Available,
                    Err(reason) if config.llm_required => {
                        log::error!("required runtime model unavailable, quitting: {}", reason);
                        plan.stop_daemon().await;
                        self.status.update(|status| status.last_error = Some(reason));
                        return None;
                    }
                    Err(reason) => {
                        log::warn!("summaries unavailable: {}", reason);
                        plan.stop_daemon().await;
                        plan.summary = CapabilityState::Unavailable(reason);
                    }
                }
            }
        }

        let engine = plan.engine.as_env_value().to_string();
        self.status.update(|status| {
            status.summary_engine = Some(engine);
            status.summary = plan.summary.clone();
            status.model_path = plan.model_path.clone();
        });
        Some(plan)
    }

    /// Localise le fichier GGUF, tente le runtime en repli, puis demande à l'utilisateur.
    async fn acquire_gguf(&self, plan: &mut AssetPlan, packaged: &PackagedAssets) -> bool {
        self.status.enter(BootstrapPhase::LocatingAsset);
        self.progress.status("Looking for the language model...");
        let spec = self.ctx.model_spec();
        let lookup = spec.clone();
        let located = tokio::task::spawn_blocking(move || locate(&lookup))
            .await
            .unwrap_or_else(|error| {
                log::warn!("model lookup task failed: {}", error);
                LocateResult {
                    found: None,
                    candidates: Vec::new(),
                }
            });
        if let Some(path) = located.found.clone() {
            plan.model_path = Some(path);
            plan.summary = CapabilityState::Available;
            return true;
        }

        self.status.enter(BootstrapPhase::Provisioning);
        if self.ctx.runtime_binary.is_some() {
            self.progress
                .status("Model file missing, trying the local language-model runtime...");
            match self
                .acquire_ollama(plan, packaged.ollama_snapshot.clone(), false)
                .await
            {
                Ok(()) => {
                    log::info!("falling back to the ollama engine");
                    plan.engine = SummaryEngine::Ollama;
                    plan.summary = CapabilityState::Available;
                    return true;
                }
                Err(reason) => {
                    log::warn!("runtime fallback failed: {}", reason);
                    plan.stop_daemon().await;
                }
            }
        } else {
            self.progress
                .status("No automatic way to obtain the language model on this machine");
        }

        self.status.enter(BootstrapPhase::Resolving);
        self.progress.status("Waiting for the language model location...");
        let resolved = resolve_model_interactively(
            &self.shell,
            &spec,
            &located,
            &self.ctx.config.download_url,
        )
        .await;

        match resolved {
            Some(path) => {
                plan.model_path = Some(path);
                plan.summary = CapabilityState::Available;
                true
            }
            None if self.ctx.config.llm_required => {
                log::error!("required language model '{}' unresolved, quitting", spec.name);
                self.status.update(|status| {
                    status.last_error = Some(format!("Language model {} is required", spec.filename))
                });
                false
            }
            None => {
                plan.summary = CapabilityState::Unavailable("Language model not selected".to_string());
                true
            }
        }
    }

    /// Prépare le runtime: binaire (installation si permise), serveur, puis modèle.
    async fn acquire_ollama(
        &self,
        plan: &mut AssetPlan,
        snapshot: Option<PathBuf>,
        allow_install: bool,
    ) -> Result<(), String> {
        let binary = match self.ctx.runtime_binary.clone() {
            Some(binary) => binary,
            None if allow_install => resolve_runtime_install(
                &self.shell,
                &self.ctx.config.runtime_download_url,
                || self.install_runtime(),
            )
            .await
            .ok_or_else(|| "The local language-model runtime is not installed".to_string())?,
            None => return Err("The local language-model runtime is not installed".to_string()),
        };

        let store_root = self
            .ctx
            .runtime_store_root()
            .ok_or_else(|| "Cannot determine the runtime model store location".to_string())?;
        let model = ModelRef::parse(&self.ctx.config.ollama_model)?;
        let runtime =
            OllamaRuntime::new(&binary, &store_root).with_host(&self.ctx.config.runtime_host);
        plan.runtime_daemon = self.ensure_runtime_server(&runtime).await?;

        let provisioner = Provisioner::new(
            ModelStore::new(&store_root),
            Some(runtime),
            snapshot,
            Strategies {
                bundled_import: self.ctx.config.bundled_import,
                network_pull: self.ctx.config.network_pull,
            },
            self.progress.clone(),
        );
        match provisioner.provision(&model).await {
            outcome if outcome.is_available() => {
                if let Some(manifest) = outcome.path() {
                    log::info!("runtime model ready ({})", manifest.to_string_lossy());
                }
                plan.store_root = Some(store_root);
                Ok(())
            }
            ProvisionOutcome::Failed(reason) => Err(reason),
            _ => Err(format!("Language model {} is not available", model.as_tag())),
        }
    }

    /// Retrouve le runtime s'il a été installé entre-temps, sinon exécute l'installeur embarqué.
    async fn install_runtime(&self) -> Result<PathBuf, String> {
        let lookup = self.ctx.runtime_lookup;
        let resource_dir = self.ctx.resource_dir.clone();
        let find = move || {
            let dir = resource_dir.clone();
            tokio::task::spawn_blocking(move || lookup(&dir))
        };

        if let Ok(Some(binary)) = find().await {
            return Ok(binary);
        }

        let installer = self
            .ctx
            .config
            .runtime_installer_path(&self.ctx.resource_dir)
            .ok_or_else(|| "No runtime installer is bundled with this build".to_string())?;
        run_installer(&installer, &self.progress).await?;

        find().await.ok().flatten().ok_or_else(|| {
            format!(
                "The installer finished but the {} binary was not found",
                RUNTIME_BINARY
            )
        })
    }

    /// Réutilise un serveur déjà joignable, sinon lance `serve` et attend qu'il réponde.
    async fn ensure_runtime_server(
        &self,
        runtime: &OllamaRuntime,
    ) -> Result<Option<SupervisedChild>, String> {
        let api = runtime.api_url();
        if self
            .runtime_gate
            .probe(&join_url(&api, RUNTIME_HEALTH_PATH), RUNTIME_PROBE_TIMEOUT)
            .await
        {
            log::info!("runtime server already reachable at {}", api);
            return Ok(None);
        }

        self.progress.status("Starting the local language-model runtime...");
        let mut daemon = SupervisedChild::spawn("ollama", runtime.serve_command().to_tokio())?;
        match self.runtime_gate.await_ready(&api, RUNTIME_READY_TIMEOUT).await {
            ReadinessState::Ready => {
                daemon.mark_running();
                Ok(Some(daemon))
            }
            _ => {
                daemon.stop(STOP_GRACE).await;
                Err(format!("The local runtime did not answer on {} in time", api))
            }
        }
    }

    fn backend_spec(&self, plan: &AssetPlan) -> BackendSpec {
        let mut env = vec![(ENGINE_ENV.to_string(), plan.engine.as_env_value().to_string())];
        if let Some(path) = &plan.model_path {
            env.push((MODEL_PATH_ENV.to_string(), path.to_string_lossy().to_string()));
        }
        if let Some(dir) = &plan.sherpa_dir {
            env.push((SHERPA_DIR_ENV.to_string(), dir.to_string_lossy().to_string()));
        }
        if plan.engine == SummaryEngine::Ollama {
            env.push((OLLAMA_MODEL_ENV.to_string(), self.ctx.config.ollama_model.clone()));
            if let Some(root) = &plan.store_root {
                env.push((OLLAMA_STORE_ENV.to_string(), root.to_string_lossy().to_string()));
            }
        }
        let available = if plan.summary.is_available() { "1" } else { "0" };
        env.push((SUMMARY_AVAILABLE_ENV.to_string(), available.to_string()));

        BackendSpec {
            mode: self.ctx.backend_mode(),
            port: self.ctx.config.backend_port,
            env,
        }
    }

    /// Démarre le backend, attend sa disponibilité puis ouvre la fenêtre principale.
    async fn launch(&self, mut plan: AssetPlan) -> BootstrapOutcome {
        self.status.enter(BootstrapPhase::StartingBackend);
        self.progress.percent(80, "Starting the meeting assistant backend...");
        let spec = self.backend_spec(&plan);
        let mut backend = BackendSupervisor::new();
        let url = match backend.start(&spec) {
            Ok(handle) => handle.url().to_string(),
            Err(error) => {
                log::error!("[{}] {}", error.code(), error);
                let message = error.to_string();
                self.status
                    .update(|status| status.last_error = Some(message.clone()));
                self.shell.show_error("Installation problem", &message).await;
                plan.stop_daemon().await;
                return BootstrapOutcome::Quit(1);
            }
        };
        self.status
            .update(|status| status.backend_url = Some(url.clone()));

        self.status.enter(BootstrapPhase::AwaitingReady);
        self.progress.percent(90, "Waiting for the backend to become ready...");
        let timeout = self.ctx.config.ready_timeout();
        let readiness = self.backend_gate.await_ready(&url, timeout).await;
        self.status.update(|status| status.readiness = readiness);
        if readiness == ReadinessState::Ready {
            if let Some(handle) = backend.handle_mut() {
                handle.mark_running();
            }
        } else {
            let message = format!(
                "The backend did not respond at {} within {} seconds. \
                 The window opens anyway; some features may stay unavailable until it finishes starting.",
                url,
                timeout.as_secs()
            );
            self.status
                .update(|status| status.last_error = Some(message.clone()));
            self.shell.notify_error("Backend is slow to start", &message);
        }

        self.status.enter(BootstrapPhase::ShowingWindow);
        self.progress.percent(100, "Opening the main window...");
        if let Err(error) = self.shell.show_main_window(&url) {
            log::error!("main window creation failed: {}", error);
            self.shell.show_error("Cannot open window", &error).await;
            backend.stop().await;
            plan.stop_daemon().await;
            return BootstrapOutcome::Quit(1);
        }
        self.shell.close_progress();
        self.status.enter(BootstrapPhase::Running);

        BootstrapOutcome::Running(DesktopSession::new(backend, plan.runtime_daemon.take()))
    }
}
