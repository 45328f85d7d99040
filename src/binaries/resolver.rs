use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::utils::process::{configure_command_no_window, first_non_empty_line};

use super::diagnostics::{BinaryResolutionAttempt, BinaryResolveDebugInfo, BinaryResolveError};

/// Ajoute l'extension `.exe` sous Windows.
pub fn executable_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Retourne la liste ordonnee des emplacements candidats pour un binaire donne.
///
/// Les copies embarquees passent avant les emplacements d'installation connus du runtime.
fn binary_candidates(bin: &str, resource_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(resource_dir) = resource_dir {
        paths.push(resource_dir.join("runtime").join(bin));
        paths.push(resource_dir.join("binaries").join(bin));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            paths.push(dir.join("runtime").join(bin));

            #[cfg(target_os = "macos")]
            {
                paths.push(dir.join("../Resources/runtime").join(bin));
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(local) = dirs::data_local_dir() {
            paths.push(local.join("Programs").join("Ollama").join(bin));
        }
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(Path::new("/usr/local/bin").join(bin));
        paths.push(Path::new("/usr/bin").join(bin));
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(Path::new("/Applications/Ollama.app/Contents/Resources").join(bin));
        paths.push(Path::new("/opt/homebrew/bin").join(bin));
        paths.push(Path::new("/usr/local/bin").join(bin));
    }

    dedupe_paths(paths)
}

/// Supprime les chemins dupliques en conservant l'ordre.
fn dedupe_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for path in paths {
        let key = path.to_string_lossy().to_string();
        if seen.insert(key) {
            deduped.push(path);
        }
    }
    deduped
}

/// Classe une erreur de lancement de process en resultat applicatif stable.
fn classify_spawn_error(error: &std::io::Error) -> (&'static str, String) {
    if error.kind() == ErrorKind::NotFound {
        return ("missing", "Binary not found".to_string());
    }

    if error.kind() == ErrorKind::PermissionDenied {
        return (
            "not_executable",
            "Permission denied while executing binary".to_string(),
        );
    }

    let msg = error.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("exec format error")
        || lower.contains("bad cpu type")
        || lower.contains("cannot execute")
    {
        return ("not_executable", msg);
    }

    ("exec_failed", msg)
}

/// Verifie qu'un binaire repond a `--version` et renvoie un diagnostic exploitable.
fn probe_binary_version(binary: &str) -> Result<String, (String, String)> {
    let mut cmd = Command::new(binary);
    cmd.arg("--version");
    configure_command_no_window(&mut cmd);
    match cmd.output() {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if output.status.success() {
                let line = first_non_empty_line(&stdout);
                Ok(if line.is_empty() {
                    first_non_empty_line(&stderr)
                } else {
                    line
                })
            } else {
                let detail = first_non_empty_line(&stderr);
                let detail = if detail.is_empty() {
                    first_non_empty_line(&stdout)
                } else {
                    detail
                };
                Err((
                    "exec_failed".to_string(),
                    if detail.is_empty() {
                        "Binary returned non-zero exit status".to_string()
                    } else {
                        detail
                    },
                ))
            }
        }
        Err(error) => {
            let (outcome, detail) = classify_spawn_error(&error);
            Err((outcome.to_string(), detail))
        }
    }
}

/// Tente de resoudre un binaire et retourne le chemin retenu plus les tentatives.
fn resolve_binary_with_attempts(
    name: &str,
    resource_dir: Option<&Path>,
) -> Result<(PathBuf, Vec<BinaryResolutionAttempt>), BinaryResolveError> {
    let bin = executable_name(name);
    let mut attempts = Vec::new();

    for path in binary_candidates(&bin, resource_dir) {
        if !path.exists() {
            attempts.push(BinaryResolutionAttempt {
                candidate: path.to_string_lossy().to_string(),
                source: "bundled_or_known_path".to_string(),
                outcome: "missing".to_string(),
                detail: None,
            });
            continue;
        }

        let canonical = path.canonicalize().unwrap_or(path);
        let candidate = canonical.to_string_lossy().to_string();
        match probe_binary_version(&candidate) {
            Ok(version) => {
                attempts.push(BinaryResolutionAttempt {
                    candidate,
                    source: "bundled_or_known_path".to_string(),
                    outcome: "ok".to_string(),
                    detail: Some(version),
                });
                return Ok((canonical, attempts));
            }
            Err((outcome, detail)) => {
                attempts.push(BinaryResolutionAttempt {
                    candidate,
                    source: "bundled_or_known_path".to_string(),
                    outcome,
                    detail: Some(detail),
                });
            }
        }
    }

    match probe_binary_version(&bin) {
        Ok(version) => {
            attempts.push(BinaryResolutionAttempt {
                candidate: bin.clone(),
                source: "system_path".to_string(),
                outcome: "ok".to_string(),
                detail: Some(version),
            });
            return Ok((PathBuf::from(bin), attempts));
        }
        Err((outcome, detail)) => {
            attempts.push(BinaryResolutionAttempt {
                candidate: bin.clone(),
                source: "system_path".to_string(),
                outcome,
                detail: Some(detail),
            });
        }
    }

    let has_not_executable = attempts.iter().any(|a| a.outcome == "not_executable");
    let has_exec_failed = attempts.iter().any(|a| a.outcome == "exec_failed");
    let details = attempts
        .iter()
        .filter(|a| a.outcome != "missing")
        .find_map(|a| a.detail.clone())
        .unwrap_or_else(|| format!("No usable binary found for {name}"));
    let code = if has_not_executable {
        "BINARY_NOT_EXECUTABLE"
    } else if has_exec_failed {
        "BINARY_EXEC_FAILED"
    } else {
        "BINARY_NOT_FOUND"
    };

    Err(BinaryResolveError {
        code: code.to_string(),
        details,
        attempts,
    })
}

/// Retourne le chemin du binaire ou une erreur structuree.
fn resolve_binary_detailed(
    name: &str,
    resource_dir: Option<&Path>,
) -> Result<PathBuf, BinaryResolveError> {
    resolve_binary_with_attempts(name, resource_dir).map(|(path, _)| path)
}

/// Retourne le chemin du binaire quand il est resolu, sinon `None`.
pub fn resolve_binary(name: &str, resource_dir: Option<&Path>) -> Option<PathBuf> {
    match resolve_binary_detailed(name, resource_dir) {
        Ok(path) => Some(path),
        Err(err) => {
            log::info!("{} not resolved: {} ({})", name, err.code, err.details);
            None
        }
    }
}

/// Retourne un diagnostic complet de resolution d'un binaire.
pub fn resolve_binary_debug(name: &str, resource_dir: Option<&Path>) -> BinaryResolveDebugInfo {
    match resolve_binary_with_attempts(name, resource_dir) {
        Ok((path, attempts)) => BinaryResolveDebugInfo {
            name: name.to_string(),
            resolved_path: Some(path.to_string_lossy().to_string()),
            error_code: None,
            error_details: None,
            attempts,
        },
        Err(err) => BinaryResolveDebugInfo {
            name: name.to_string(),
            resolved_path: None,
            error_code: Some(err.code),
            error_details: Some(err.details),
            attempts: err.attempts,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_runtime_dir_is_searched_first() {
        let td = tempfile::tempdir().expect("tempdir");
        let bin = executable_name("ollama");
        let candidates = binary_candidates(&bin, Some(td.path()));
        assert_eq!(candidates[0], td.path().join("runtime").join(&bin));
        assert_eq!(candidates[1], td.path().join("binaries").join(&bin));
    }

    #[test]
    fn dedupe_paths_keeps_first_occurrence_order() {
        let paths = vec![
            PathBuf::from("/a"),
            PathBuf::from("/b"),
            PathBuf::from("/a"),
        ];
        assert_eq!(dedupe_paths(paths), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn unknown_binary_reports_not_found_with_attempt_trail() {
        let td = tempfile::tempdir().expect("tempdir");
        let err = resolve_binary_detailed("meeting-assistant-no-such-tool", Some(td.path()))
            .unwrap_err();
        assert_eq!(err.code, "BINARY_NOT_FOUND");
        assert!(err.attempts.iter().any(|a| a.source == "system_path"));
        assert!(err.attempts.iter().all(|a| a.outcome == "missing"));
    }
}
