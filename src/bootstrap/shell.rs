use std::future::Future;
use std::path::{Path, PathBuf};

use crate::resolver::{InstallAction, ModelAction};

/// Surface de bureau pilotée par le démarrage: dialogues, fenêtres, navigateur.
///
/// Les dialogues modaux sont asynchrones; l'implémentation Tauri relaie leurs
/// callbacks vers un canal `oneshot`.
pub trait DesktopShell: Send + Sync {
    /// Demande quoi faire quand le modèle est introuvable. Fermer le dialogue vaut `Abort`.
    fn choose_model_action(&self, message: &str) -> impl Future<Output = ModelAction> + Send;

    /// Sélecteur de dossier; `None` si l'utilisateur annule.
    fn pick_folder(&self) -> impl Future<Output = Option<PathBuf>> + Send;

    /// Demande quoi faire après l'échec d'installation du runtime.
    fn choose_install_action(&self, detail: &str) -> impl Future<Output = InstallAction> + Send;

    /// Dialogue d'erreur modal, attendu jusqu'à sa fermeture.
    fn show_error(&self, title: &str, message: &str) -> impl Future<Output = ()> + Send;

    /// Dialogue d'erreur non bloquant.
    fn notify_error(&self, title: &str, message: &str);

    fn open_url(&self, url: &str) -> Result<(), String>;

    /// Mémorise un dossier de modèle choisi pour les lancements suivants.
    fn remember_model_folder(&self, folder: &Path);

    fn show_main_window(&self, url: &str) -> Result<(), String>;

    fn close_progress(&self);
}
