use std::path::{Path, PathBuf};

use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindowBuilder};
use tauri_plugin_dialog::{
    DialogExt, MessageDialogButtons, MessageDialogKind, MessageDialogResult,
};
use tauri_plugin_opener::OpenerExt;
use tauri_plugin_store::StoreExt;
use tokio::sync::oneshot;

use crate::bootstrap::DesktopShell;
use crate::resolver::{InstallAction, ModelAction};
use crate::utils::path::normalize_input_path;

/// Fichier du store de préférences.
pub const SETTINGS_STORE: &str = "settings.json";
/// Clé du dernier dossier de modèle choisi.
pub const MODEL_DIR_KEY: &str = "llmModelDir";

pub const PROGRESS_WINDOW: &str = "bootstrap";
pub const MAIN_WINDOW: &str = "main";
const APP_TITLE: &str = "AI Meeting Assistant";

const PICK_FOLDER_LABEL: &str = "Choose folder...";
const DOWNLOAD_LABEL: &str = "Open download page";
const QUIT_LABEL: &str = "Quit";
const RETRY_LABEL: &str = "Retry";
const CONTINUE_LABEL: &str = "Continue without summaries";

/// Lit le dossier de modèle mémorisé lors d'un lancement précédent.
pub fn remembered_model_folder(app: &AppHandle) -> Option<PathBuf> {
    let store = app.store(SETTINGS_STORE).ok()?;
    let raw = store.get(MODEL_DIR_KEY)?;
    let path = normalize_input_path(raw.as_str()?);
    path.is_dir().then_some(path)
}

/// Crée la fenêtre de progression affichée pendant le démarrage.
pub fn open_progress_window(app: &AppHandle) -> tauri::Result<()> {
    WebviewWindowBuilder::new(app, PROGRESS_WINDOW, WebviewUrl::App("bootstrap.html".into()))
        .title(APP_TITLE)
        .inner_size(480.0, 200.0)
        .resizable(false)
        .center()
        .build()?;
    Ok(())
}

/// Traduit le bouton cliqué en choix; les plateformes ne renvoient pas toutes le label.
fn pressed(result: &MessageDialogResult, labels: [&str; 3]) -> Option<usize> {
    match result {
        MessageDialogResult::Custom(label) => labels.iter().position(|l| l == label),
        MessageDialogResult::Yes | MessageDialogResult::Ok => Some(0),
        MessageDialogResult::No => Some(1),
        MessageDialogResult::Cancel => Some(2),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Implémentation de la surface de bureau avec les plugins Tauri.
#[derive(Clone)]
pub struct TauriShell {
    app: AppHandle,
}

impl TauriShell {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    /// Dialogue à trois boutons personnalisés; `None` si fermé sans choix.
    async fn ask(&self, title: &str, message: &str, labels: [&str; 3]) -> Option<usize> {
        let (tx, rx) = oneshot::channel();
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Warning)
            .buttons(MessageDialogButtons::YesNoCancelCustom(
                labels[0].to_string(),
                labels[1].to_string(),
                labels[2].to_string(),
            ))
            .show_with_result(move |result| {
                let _ = tx.send(result);
            });
        let result = rx.await.ok()?;
        pressed(&result, labels)
    }
}

impl DesktopShell for TauriShell {
    async fn choose_model_action(&self, message: &str) -> ModelAction {
        match self
            .ask(
                "Language model not found",
                message,
                [PICK_FOLDER_LABEL, DOWNLOAD_LABEL, QUIT_LABEL],
            )
            .await
        {
            Some(0) => ModelAction::PickFolder,
            Some(1) => ModelAction::OpenDownloadPage,
            _ => ModelAction::Abort,
        }
    }

    async fn pick_folder(&self) -> Option<PathBuf> {
        let (tx, rx) = oneshot::channel();
        self.app
            .dialog()
            .file()
            .set_title("Select the folder containing the language model")
            .pick_folder(move |folder| {
                let _ = tx.send(folder);
            });
        let folder = rx.await.ok()??;
        match folder.into_path() {
            Ok(path) => Some(path),
            Err(error) => {
                log::warn!("unusable folder selection: {}", error);
                None
            }
        }
    }

    async fn choose_install_action(&self, detail: &str) -> InstallAction {
        let message = format!(
            "The local language-model runtime could not be installed.\n\n{}\n\n\
             Retry, download it manually, or continue without meeting summaries.",
            detail
        );
        match self
            .ask(
                "Runtime installation failed",
                &message,
                [RETRY_LABEL, DOWNLOAD_LABEL, CONTINUE_LABEL],
            )
            .await
        {
            Some(0) => InstallAction::Retry,
            Some(1) => InstallAction::OpenDownloadPage,
            _ => InstallAction::ContinueWithout,
        }
    }

    async fn show_error(&self, title: &str, message: &str) {
        let (tx, rx) = oneshot::channel();
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Error)
            .show(move |_| {
                let _ = tx.send(());
            });
        let _ = rx.await;
    }

    fn notify_error(&self, title: &str, message: &str) {
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Error)
            .show(|_| {});
    }

    fn open_url(&self, url: &str) -> Result<(), String> {
        self.app
            .opener()
            .open_url(url, None::<&str>)
            .map_err(|e| e.to_string())
    }

    fn remember_model_folder(&self, folder: &Path) {
        let result = self.app.store(SETTINGS_STORE).and_then(|store| {
            store.set(
                MODEL_DIR_KEY,
                serde_json::json!(folder.to_string_lossy().to_string()),
            );
            store.save()
        });
        if let Err(error) = result {
            log::warn!("failed to remember model folder: {}", error);
        }
    }

    fn show_main_window(&self, url: &str) -> Result<(), String> {
        if let Some(window) = self.app.get_webview_window(MAIN_WINDOW) {
            return window.set_focus().map_err(|e| e.to_string());
        }
        let url = url
            .parse()
            .map_err(|e| format!("Invalid backend URL '{}': {}", url, e))?;
        WebviewWindowBuilder::new(&self.app, MAIN_WINDOW, WebviewUrl::External(url))
            .title(APP_TITLE)
            .inner_size(1280.0, 820.0)
            .min_inner_size(900.0, 600.0)
            .center()
            .build()
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn close_progress(&self) {
        if let Some(window) = self.app.get_webview_window(PROGRESS_WINDOW) {
            if let Err(error) = window.close() {
                log::warn!("failed to close progress window: {}", error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressed_maps_labels_and_native_buttons() {
        let labels = [RETRY_LABEL, DOWNLOAD_LABEL, CONTINUE_LABEL];
        assert_eq!(
            pressed(&MessageDialogResult::Custom(DOWNLOAD_LABEL.to_string()), labels),
            Some(1)
        );
        assert_eq!(pressed(&MessageDialogResult::Yes, labels), Some(0));
        assert_eq!(pressed(&MessageDialogResult::Cancel, labels), Some(2));
        assert_eq!(
            pressed(&MessageDialogResult::Custom("other".to_string()), labels),
            None
        );
    }
}
