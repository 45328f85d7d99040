#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Configure la commande pour éviter l'ouverture d'une fenêtre console sur Windows.
#[allow(unused_variables)]
pub fn configure_command_no_window(cmd: &mut std::process::Command) {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
}

/// Variante de `configure_command_no_window` pour `tokio::process`.
#[allow(unused_variables)]
pub fn configure_async_command_no_window(cmd: &mut tokio::process::Command) {
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
}

/// Extrait un message d'erreur lisible depuis la sortie d'un process.
pub fn sanitize_cmd_error(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !stdout.is_empty() {
        return stdout;
    }
    match output.status.code() {
        Some(code) => format!("process exited with status {}", code),
        None => "process terminated by signal".to_string(),
    }
}

/// Retourne la premiere ligne non vide d'un texte.
pub fn first_non_empty_line(text: &str) -> String {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| text.trim().to_string())
}
