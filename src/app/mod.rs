use std::sync::Mutex;

use tauri::async_runtime::JoinHandle;
use tauri::{AppHandle, Emitter, Manager, RunEvent};

use crate::bootstrap::{
    BootstrapConfig, BootstrapContext, BootstrapController, BootstrapOutcome, DesktopShell,
    SessionSlot, SharedStatus,
};
use crate::provision::progress::ProgressSink;

mod invoke;
pub mod shell;

use shell::{open_progress_window, remembered_model_folder, TauriShell, MAIN_WINDOW, PROGRESS_WINDOW};

/// Événement consommé par la fenêtre de progression.
const PROGRESS_EVENT: &str = "bootstrap-progress";

/// Tâche de démarrage, annulée si l'application se ferme avant la fin.
#[derive(Default)]
struct BootstrapTask(Mutex<Option<JoinHandle<()>>>);

impl BootstrapTask {
    fn set(&self, task: JoinHandle<()>) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(task);
        }
    }

    fn take(&self) -> Option<JoinHandle<()>> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Prépare le contexte puis exécute la séquence de démarrage.
async fn bootstrap(app: AppHandle, status: SharedStatus, progress: ProgressSink) {
    let shell = TauriShell::new(app.clone());

    let resource_dir = match app.path().resource_dir() {
        Ok(dir) => dir,
        Err(error) => {
            log::error!("resource directory unavailable: {}", error);
            shell
                .show_error(
                    "Installation problem",
                    &format!("Application resources could not be located: {}", error),
                )
                .await;
            app.exit(1);
            return;
        }
    };
    let remembered = remembered_model_folder(&app);

    // La résolution du runtime exécute des process: hors du thread async.
    let prepared = tokio::task::spawn_blocking(move || {
        let config = BootstrapConfig::from_resources(&resource_dir)?;
        Ok::<_, String>(BootstrapContext::from_environment(resource_dir, config, remembered))
    })
    .await
    .map_err(|e| format!("Startup task failed: {}", e))
    .and_then(|prepared| prepared);

    let ctx = match prepared {
        Ok(ctx) => ctx,
        Err(error) => {
            log::error!("invalid bootstrap configuration: {}", error);
            status.update(|s| s.last_error = Some(error.clone()));
            shell.show_error("Installation problem", &error).await;
            app.exit(1);
            return;
        }
    };
    log::info!(
        "bootstrap: engine={:?} port={} resources={}",
        ctx.config.summary_engine,
        ctx.config.backend_port,
        ctx.resource_dir.to_string_lossy()
    );

    let controller = BootstrapController::new(shell, ctx, status, progress);
    match controller.run().await {
        BootstrapOutcome::Running(mut session) => {
            log::info!(
                "application running, backend pid {:?}, runtime server pid {:?}",
                session.backend_pid(),
                session.runtime_daemon_pid()
            );
            app.state::<SessionSlot>().install(session).await;
        }
        BootstrapOutcome::Quit(code) => {
            log::info!("bootstrap ended without a running session (code {})", code);
            app.exit(code);
        }
    }
}

/// Arrête la session une seule fois, puis termine le process.
fn handle_exit_requested(app: &AppHandle, api: &tauri::ExitRequestApi, code: Option<i32>) {
    let slot = app.state::<SessionSlot>();
    let phase = slot.status().phase();
    if !slot.begin_shutdown() {
        return;
    }
    log::info!("exit requested during {:?}", phase);
    api.prevent_exit();
    if let Some(task) = app.state::<BootstrapTask>().take() {
        task.abort();
    }

    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        app.state::<SessionSlot>().shutdown().await;
        log::info!("shutdown complete");
        app.exit(code.unwrap_or(0));
    });
}

/// Construit et lance l'application Tauri avec plugins, setup et commandes IPC.
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let builder = tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, _argv, _cwd| {
            // Une seconde instance lancerait un second backend: on ramène la première au premier plan.
            let window = app
                .get_webview_window(MAIN_WINDOW)
                .or_else(|| app.get_webview_window(PROGRESS_WINDOW));
            if let Some(window) = window {
                let _ = window.unminimize();
                let _ = window.set_focus();
            }
        }))
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_store::Builder::new().build())
        .plugin(tauri_plugin_opener::init());
    let builder = invoke::register_invoke_handler(builder);

    builder
        .setup(|app| {
            let level = if cfg!(debug_assertions) {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            };
            app.handle()
                .plugin(tauri_plugin_log::Builder::default().level(level).build())?;

            let status = SharedStatus::new();
            app.manage(SessionSlot::new(status.clone()));
            app.manage(BootstrapTask::default());
            open_progress_window(app.handle())?;

            // Relais FIFO des événements de progression vers la fenêtre de démarrage.
            // Le dernier est conservé pour une page chargée après son émission.
            let (progress, mut events) = ProgressSink::channel();
            let handle = app.handle().clone();
            let latest = status.clone();
            tauri::async_runtime::spawn(async move {
                while let Some(event) = events.recv().await {
                    latest.record_progress(&event);
                    if let Err(error) = handle.emit_to(PROGRESS_WINDOW, PROGRESS_EVENT, &event) {
                        log::debug!("progress event dropped: {}", error);
                    }
                }
            });

            let task = tauri::async_runtime::spawn(bootstrap(app.handle().clone(), status, progress));
            app.state::<BootstrapTask>().set(task);
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let RunEvent::ExitRequested { api, code, .. } = event {
                handle_exit_requested(app, &api, code);
            }
        });
}
