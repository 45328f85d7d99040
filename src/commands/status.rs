use crate::bootstrap::{BootstrapStatus, SessionSlot};

/// Commande IPC: phase courante, historique et disponibilité des résumés.
#[tauri::command]
pub fn get_bootstrap_status(session: tauri::State<'_, SessionSlot>) -> BootstrapStatus {
    session.status().snapshot()
}
