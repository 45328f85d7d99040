//! Entrypoint de la bibliothèque Tauri AI Meeting Assistant.
//!
//! Cette unité reste volontairement mince: elle déclare les modules de domaine
//! puis délègue l'exécution à `app::run()`.

mod app;
mod assets;
mod backend;
mod binaries;
mod bootstrap;
mod commands;
mod provision;
mod resolver;
mod utils;

/// Lance l'application Tauri.
pub fn run() {
    app::run();
}
