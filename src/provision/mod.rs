//! Provisionnement automatique du modèle de langage dans le store du runtime.
//!
//! Ordre: modèle déjà enregistré, import de l'instantané embarqué, puis `pull` réseau.
//! Aucun échec n'est propagé: l'appelant reçoit un `ProvisionOutcome`.

pub mod progress;
pub mod pull;
pub mod runtime;
pub mod store;

use std::path::{Path, PathBuf};

use progress::ProgressSink;
use pull::run_streaming;
use runtime::{list_contains, OllamaRuntime};
use store::{ModelRef, ModelStore};

/// Résultat d'une tentative de provisionnement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Déjà présent.
    Found(PathBuf),
    /// Importé depuis l'instantané embarqué.
    Imported(PathBuf),
    /// Téléchargé par le runtime.
    Downloaded(PathBuf),
    /// Aucune stratégie applicable.
    Skipped,
    Failed(String),
}

impl ProvisionOutcome {
    pub fn is_available(&self) -> bool {
        matches!(
            self,
            Self::Found(_) | Self::Imported(_) | Self::Downloaded(_)
        )
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Found(path) | Self::Imported(path) | Self::Downloaded(path) => Some(path),
            Self::Skipped | Self::Failed(_) => None,
        }
    }
}

/// Stratégies activables indépendamment.
#[derive(Clone, Copy, Debug)]
pub struct Strategies {
    pub bundled_import: bool,
    pub network_pull: bool,
}

/// Rend un modèle disponible dans le store du runtime sans interaction utilisateur.
pub struct Provisioner {
    store: ModelStore,
    runtime: Option<OllamaRuntime>,
    snapshot: Option<PathBuf>,
    strategies: Strategies,
    progress: ProgressSink,
}

impl Provisioner {
    pub fn new(
        store: ModelStore,
        runtime: Option<OllamaRuntime>,
        snapshot: Option<PathBuf>,
        strategies: Strategies,
        progress: ProgressSink,
    ) -> Self {
        Self {
            store,
            runtime,
            snapshot,
            strategies,
            progress,
        }
    }

    /// Vérifie si le modèle est déjà enregistré (manifest, puis `list` du runtime).
    pub async fn is_installed(&self, model: &ModelRef) -> bool {
        let store = self.store.clone();
        let probe = model.clone();
        let registered = tokio::task::spawn_blocking(move || store.is_registered(&probe))
            .await
            .unwrap_or(false);
        if registered {
            return true;
        }

        let Some(runtime) = &self.runtime else {
            return false;
        };
        match runtime.list_installed().await {
            Ok(installed) => list_contains(&installed, model),
            Err(error) => {
                log::warn!("runtime model listing failed: {}", error);
                false
            }
        }
    }

    /// Tente chaque stratégie configurée jusqu'au premier succès.
    pub async fn provision(&self, model: &ModelRef) -> ProvisionOutcome {
        let tag = model.as_tag();
        self.progress.status(format!("Checking language model {}...", tag));
        if self.is_installed(model).await {
            log::info!("model {} already installed", tag);
            return ProvisionOutcome::Found(self.store.manifest_path(model));
        }

        let mut last_failure: Option<String> = None;

        if self.strategies.bundled_import {
            if let Some(snapshot) = &self.snapshot {
                self.progress.status(format!("Importing bundled model {}...", tag));
                match self.import_bundled(snapshot, model).await {
                    Ok(()) => {
                        self.progress.percent(100, format!("Bundled model {} imported", tag));
                        return ProvisionOutcome::Imported(self.store.manifest_path(model));
                    }
                    Err(error) => {
                        log::warn!("bundled import of {} failed: {}", tag, error);
                        self.progress.status(format!(
                            "Bundled model import failed ({}). Falling back to download.",
                            error
                        ));
                        last_failure = Some(error);
                    }
                }
            }
        }

        if self.strategies.network_pull {
            if let Some(runtime) = &self.runtime {
                self.progress.status(format!("Downloading language model {}...", tag));
                match run_streaming(&runtime.pull_command(model), &self.progress).await {
                    Ok(()) => {
                        self.progress.percent(100, format!("Language model {} downloaded", tag));
                        return ProvisionOutcome::Downloaded(self.store.manifest_path(model));
                    }
                    Err(error) => {
                        log::warn!("pull of {} failed: {}", tag, error);
                        self.progress
                            .status(format!("Language model download failed: {}", error));
                        last_failure = Some(error);
                    }
                }
            }
        }

        match last_failure {
            Some(reason) => ProvisionOutcome::Failed(reason),
            None => {
                self.progress
                    .status(format!("No automatic way to obtain {} on this machine", tag));
                ProvisionOutcome::Skipped
            }
        }
    }

    async fn import_bundled(&self, snapshot: &Path, model: &ModelRef) -> Result<(), String> {
        let store = self.store.clone();
        let source = snapshot.to_path_buf();
        let copied = tokio::task::spawn_blocking(move || store.import_snapshot(&source))
            .await
            .map_err(|e| format!("Import task failed: {}", e))??;
        log::info!(
            "imported {} file(s) into {}",
            copied,
            self.store.root().to_string_lossy()
        );

        if self.store.is_registered(model) {
            Ok(())
        } else {
            Err(format!(
                "Bundled snapshot does not contain {}",
                model.as_tag()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn model() -> ModelRef {
        ModelRef::parse("qwen2.5:1.5b").expect("parse")
    }

    fn write(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, b"{}").expect("write");
    }

    fn all_strategies() -> Strategies {
        Strategies {
            bundled_import: true,
            network_pull: true,
        }
    }

    #[tokio::test]
    async fn provision_short_circuits_when_already_registered() {
        let td = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(td.path());
        write(&store.manifest_path(&model()));
        let (sink, _rx) = ProgressSink::channel();

        let provisioner = Provisioner::new(store.clone(), None, None, all_strategies(), sink);
        assert_eq!(
            provisioner.provision(&model()).await,
            ProvisionOutcome::Found(store.manifest_path(&model()))
        );
    }

    #[tokio::test]
    async fn provision_imports_bundled_snapshot() {
        let snapshot = tempfile::tempdir().expect("tempdir");
        write(&ModelStore::new(snapshot.path()).manifest_path(&model()));
        write(&snapshot.path().join("blobs").join("sha256-abc"));
        let target = tempfile::tempdir().expect("tempdir");
        let store = ModelStore::new(target.path());
        let (sink, _rx) = ProgressSink::channel();

        let provisioner = Provisioner::new(
            store.clone(),
            None,
            Some(snapshot.path().to_path_buf()),
            all_strategies(),
            sink,
        );
        let outcome = provisioner.provision(&model()).await;
        assert!(matches!(outcome, ProvisionOutcome::Imported(_)));
        assert!(provisioner.is_installed(&model()).await);
    }

    #[tokio::test]
    async fn failed_import_without_runtime_reports_failure_and_fallback_message() {
        let snapshot = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(snapshot.path().join("manifests")).expect("mkdir");
        fs::create_dir_all(snapshot.path().join("blobs")).expect("mkdir");
        let target = tempfile::tempdir().expect("tempdir");
        let (sink, mut rx) = ProgressSink::channel();

        let provisioner = Provisioner::new(
            ModelStore::new(target.path()),
            None,
            Some(snapshot.path().to_path_buf()),
            all_strategies(),
            sink,
        );
        let outcome = provisioner.provision(&model()).await;
        assert!(matches!(outcome, ProvisionOutcome::Failed(ref reason) if reason.contains("does not contain")));

        let messages: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.message)
            .collect();
        assert!(messages.iter().any(|m| m.contains("Falling back to download")));
    }

    #[tokio::test]
    async fn provision_is_skipped_when_no_strategy_applies() {
        let target = tempfile::tempdir().expect("tempdir");
        let (sink, _rx) = ProgressSink::channel();
        let provisioner = Provisioner::new(
            ModelStore::new(target.path()),
            None,
            None,
            all_strategies(),
            sink,
        );
        assert_eq!(provisioner.provision(&model()).await, ProvisionOutcome::Skipped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn provision_pulls_with_runtime_cli() {
        use std::os::unix::fs::PermissionsExt;

        let td = tempfile::tempdir().expect("tempdir");
        let fake_cli = td.path().join("ollama");
        fs::write(
            &fake_cli,
            "#!/bin/sh\nif [ \"$1\" = list ]; then echo NAME; exit 0; fi\necho 'pulling 100%'\n",
        )
        .expect("write");
        fs::set_permissions(&fake_cli, fs::Permissions::from_mode(0o755)).expect("chmod");
        let store_root = td.path().join("store");
        let (sink, _rx) = ProgressSink::channel();

        let provisioner = Provisioner::new(
            ModelStore::new(&store_root),
            Some(OllamaRuntime::new(&fake_cli, &store_root)),
            None,
            all_strategies(),
            sink,
        );
        assert!(matches!(
            provisioner.provision(&model()).await,
            ProvisionOutcome::Downloaded(_)
        ));
    }
}
