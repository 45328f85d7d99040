//! Résolution interactive quand aucune stratégie automatique n'a abouti.
//!
//! Chaque tour de boucle attend un choix de l'utilisateur: pas de compteur ni de délai.

use std::future::Future;
use std::path::PathBuf;

use crate::assets::{find_in_folder, LocateResult, ModelSpec};
use crate::bootstrap::shell::DesktopShell;

/// Choix proposés quand le modèle de langage est introuvable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelAction {
    PickFolder,
    OpenDownloadPage,
    /// Annulation explicite ou dialogue fermé.
    Abort,
}

/// Choix proposés quand l'installation du runtime a échoué.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallAction {
    Retry,
    OpenDownloadPage,
    ContinueWithout,
}

/// Message affiché au-dessus des choix de résolution du modèle.
pub fn missing_model_message(spec: &ModelSpec, located: &LocateResult) -> String {
    format!(
        "The language model '{}' ({}) was not found.\n\nSearched:\n{}\n\n\
         Choose a folder containing {} (or models/llm/{}), open the download page, or quit.",
        spec.name,
        spec.version,
        located.describe_candidates(),
        spec.filename,
        spec.filename
    )
}

/// Boucle jusqu'à un dossier valide ou une annulation explicite.
///
/// Un dossier valide est mémorisé via le shell avant d'être retourné.
pub async fn resolve_model_interactively<S: DesktopShell>(
    shell: &S,
    spec: &ModelSpec,
    located: &LocateResult,
    download_url: &str,
) -> Option<PathBuf> {
    let message = missing_model_message(spec, located);

    loop {
        match shell.choose_model_action(&message).await {
            ModelAction::PickFolder => {
                let Some(folder) = shell.pick_folder().await else {
                    log::info!("model folder selection cancelled");
                    continue;
                };
                let lookup_spec = spec.clone();
                let lookup_folder = folder.clone();
                let found = tokio::task::spawn_blocking(move || {
                    find_in_folder(&lookup_spec, &lookup_folder)
                })
                .await
                .unwrap_or(None);

                match found {
                    Some(path) => {
                        log::info!("model selected at {}", path.to_string_lossy());
                        if let Some(dir) = path.parent() {
                            shell.remember_model_folder(dir);
                        }
                        return Some(path);
                    }
                    None => {
                        log::warn!(
                            "model {} not found in picked folder {}",
                            spec.filename,
                            folder.to_string_lossy()
                        );
                        shell
                            .show_error(
                                "Model not found",
                                &format!(
                                    "{} was not found in:\n{}\n\nExpected {} directly in that folder or in its models/llm subfolder.",
                                    spec.filename,
                                    folder.to_string_lossy(),
                                    spec.filename
                                ),
                            )
                            .await;
                    }
                }
            }
            ModelAction::OpenDownloadPage => {
                if let Err(error) = shell.open_url(download_url) {
                    log::warn!("failed to open {}: {}", download_url, error);
                    shell
                        .show_error(
                            "Cannot open browser",
                            &format!("Please open {} manually.\n\n{}", download_url, error),
                        )
                        .await;
                }
            }
            ModelAction::Abort => {
                log::info!("model resolution aborted by user");
                return None;
            }
        }
    }
}

/// Installe le runtime via `install`, puis boucle sur les choix de l'utilisateur en cas d'échec.
///
/// `None` signifie que l'utilisateur continue sans la capacité.
pub async fn resolve_runtime_install<S, T, F, Fut>(
    shell: &S,
    download_url: &str,
    mut install: F,
) -> Option<T>
where
    S: DesktopShell,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let mut failure = match install().await {
        Ok(value) => return Some(value),
        Err(error) => error,
    };

    loop {
        log::warn!("runtime installation failed: {}", failure);
        match shell.choose_install_action(&failure).await {
            InstallAction::Retry => match install().await {
                Ok(value) => return Some(value),
                Err(error) => failure = error,
            },
            InstallAction::OpenDownloadPage => {
                if let Err(error) = shell.open_url(download_url) {
                    log::warn!("failed to open {}: {}", download_url, error);
                    failure = format!("{}\n\nPlease open {} manually.", failure, download_url);
                }
            }
            InstallAction::ContinueWithout => {
                log::info!("continuing without the language-model runtime");
                return None;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedShell;
    use super::*;
    use crate::assets::{locate, CandidateReason};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spec(root: &std::path::Path) -> ModelSpec {
        ModelSpec::new("qwen", "model.gguf", "v1").with_location(CandidateReason::Packaged, root.join("packaged"))
    }

    #[tokio::test]
    async fn abort_ends_the_loop_without_resolution() {
        let td = tempfile::tempdir().expect("tempdir");
        let spec = spec(td.path());
        let shell = ScriptedShell::new().with_model_actions([ModelAction::OpenDownloadPage, ModelAction::Abort]);

        let resolved = resolve_model_interactively(&shell, &spec, &locate(&spec), "https://example.test/model").await;
        assert!(resolved.is_none());
        assert_eq!(
            shell.calls(),
            vec![
                "choose_model_action",
                "open_url: https://example.test/model",
                "choose_model_action"
            ]
        );
    }

    #[tokio::test]
    async fn wrong_folder_shows_error_then_nested_pack_is_accepted() {
        let td = tempfile::tempdir().expect("tempdir");
        let spec = spec(td.path());
        let empty = td.path().join("empty");
        fs::create_dir_all(&empty).expect("mkdir");
        let pack = td.path().join("pack");
        let nested = pack.join("models").join("llm");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(nested.join("model.gguf"), b"gguf").expect("write");

        let shell = ScriptedShell::new()
            .with_model_actions([ModelAction::PickFolder, ModelAction::PickFolder])
            .with_picks([Some(empty), Some(pack)]);

        let resolved = resolve_model_interactively(&shell, &spec, &locate(&spec), "https://example.test").await;
        assert_eq!(resolved, Some(nested.join("model.gguf")));
        assert!(shell.called("show_error: Model not found"));
        assert_eq!(shell.remembered(), Some(nested));
    }

    #[tokio::test]
    async fn cancelled_picker_asks_again() {
        let td = tempfile::tempdir().expect("tempdir");
        let spec = spec(td.path());
        let shell = ScriptedShell::new()
            .with_model_actions([ModelAction::PickFolder, ModelAction::Abort])
            .with_picks([None]);

        assert!(resolve_model_interactively(&shell, &spec, &locate(&spec), "u").await.is_none());
        assert_eq!(shell.calls().iter().filter(|c| *c == "choose_model_action").count(), 2);
        assert!(!shell.called("show_error"));
    }

    #[tokio::test]
    async fn install_retry_succeeds_after_failure() {
        let shell = ScriptedShell::new().with_install_actions([InstallAction::OpenDownloadPage, InstallAction::Retry]);
        let attempts = AtomicUsize::new(0);

        let result = resolve_runtime_install(&shell, "https://example.test/runtime", || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err("installer exited with code 1".to_string())
                } else {
                    Ok("ollama")
                }
            }
        })
        .await;

        assert_eq!(result, Some("ollama"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(shell.called("open_url: https://example.test/runtime"));
    }

    #[tokio::test]
    async fn continue_without_returns_none() {
        let shell = ScriptedShell::new().with_install_actions([InstallAction::ContinueWithout]);
        let result: Option<()> =
            resolve_runtime_install(&shell, "u", || async { Err("missing installer".to_string()) }).await;
        assert!(result.is_none());
        assert!(shell.called("choose_install_action: missing installer"));
    }
}
