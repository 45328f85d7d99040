use std::path::{Path, PathBuf};

use super::types::{CandidateReason, LocateResult, ModelSpec, ResolutionCandidate};

/// Sous-chemin fixe d'un pack de modèles à l'intérieur d'un dossier choisi.
pub const MODEL_PACK_SUBPATH: [&str; 2] = ["models", "llm"];

/// Construit le chemin de fichier attendu pour un emplacement de recherche.
fn candidate_path(spec: &ModelSpec, location: &Path, reason: CandidateReason) -> PathBuf {
    match reason {
        // L'override peut désigner le fichier lui-même ou son dossier.
        CandidateReason::EnvOverride if !location.is_dir() => location.to_path_buf(),
        _ => location.join(&spec.filename),
    }
}

/// Produit la liste ordonnée des candidats d'un `ModelSpec`, par priorité de raison.
pub fn candidates_for(spec: &ModelSpec) -> Vec<ResolutionCandidate> {
    let mut locations: Vec<_> = spec.locations.iter().collect();
    locations.sort_by_key(|location| location.reason);

    locations
        .into_iter()
        .map(|location| {
            let path = candidate_path(spec, &location.path, location.reason);
            let exists = spec.matches_file(&path);
            ResolutionCandidate {
                path,
                reason: location.reason,
                exists,
            }
        })
        .collect()
}

/// Localise le fichier de modèle: premier candidat existant, sinon `None` et tous les candidats.
///
/// Une absence n'est pas une erreur; le fichier n'est jamais substitué par un nom différent.
pub fn locate(spec: &ModelSpec) -> LocateResult {
    let candidates = candidates_for(spec);
    let found = candidates
        .iter()
        .find(|candidate| candidate.exists)
        .map(|candidate| candidate.path.clone());

    match &found {
        Some(path) => log::info!(
            "model '{}' located at {}",
            spec.name,
            path.to_string_lossy()
        ),
        None => log::info!(
            "model '{}' not found in {} candidate location(s)",
            spec.name,
            candidates.len()
        ),
    }

    LocateResult { found, candidates }
}

/// Cherche le fichier attendu directement dans un dossier ou sous `models/llm`.
pub fn find_in_folder(spec: &ModelSpec, folder: &Path) -> Option<PathBuf> {
    let direct = folder.join(&spec.filename);
    if spec.matches_file(&direct) {
        return Some(direct);
    }

    let nested = MODEL_PACK_SUBPATH
        .iter()
        .fold(folder.to_path_buf(), |acc, part| acc.join(part))
        .join(&spec.filename);
    if spec.matches_file(&nested) {
        return Some(nested);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn spec_with_dirs(root: &Path) -> ModelSpec {
        ModelSpec::new("qwen", "model.gguf", "v1")
            .with_location(CandidateReason::Managed, root.join("managed"))
            .with_location(CandidateReason::EnvOverride, root.join("env"))
            .with_location(CandidateReason::Packaged, root.join("packaged"))
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, b"gguf").expect("write");
    }

    #[test]
    fn locate_returns_none_with_ordered_candidates_when_nothing_exists() {
        let td = tempfile::tempdir().expect("tempdir");
        let result = locate(&spec_with_dirs(td.path()));

        assert!(result.found.is_none());
        let reasons: Vec<_> = result.candidates.iter().map(|c| c.reason).collect();
        assert_eq!(
            reasons,
            vec![
                CandidateReason::EnvOverride,
                CandidateReason::Packaged,
                CandidateReason::Managed
            ]
        );
        assert_eq!(result.candidates[1].path, td.path().join("packaged").join("model.gguf"));
        assert!(result.candidates.iter().all(|c| !c.exists));
    }

    #[test]
    fn locate_prefers_highest_priority_existing_candidate() {
        let td = tempfile::tempdir().expect("tempdir");
        touch(&td.path().join("packaged").join("model.gguf"));
        touch(&td.path().join("managed").join("model.gguf"));

        let result = locate(&spec_with_dirs(td.path()));
        assert_eq!(result.found, Some(td.path().join("packaged").join("model.gguf")));
    }

    #[test]
    fn env_override_may_point_at_the_file_itself() {
        let td = tempfile::tempdir().expect("tempdir");
        let file = td.path().join("custom").join("model.gguf");
        touch(&file);
        touch(&td.path().join("packaged").join("model.gguf"));

        let spec = ModelSpec::new("qwen", "model.gguf", "v1")
            .with_location(CandidateReason::Packaged, td.path().join("packaged"))
            .with_location(CandidateReason::EnvOverride, &file);
        assert_eq!(locate(&spec).found, Some(file));
    }

    #[test]
    fn env_override_with_another_filename_is_rejected() {
        let td = tempfile::tempdir().expect("tempdir");
        let other = td.path().join("other-model.gguf");
        touch(&other);

        let spec = ModelSpec::new("qwen", "model.gguf", "v1")
            .with_location(CandidateReason::EnvOverride, &other);
        let result = locate(&spec);
        assert!(result.found.is_none());
        assert_eq!(result.candidates[0].path, other);
    }

    #[test]
    fn find_in_folder_checks_direct_then_model_pack_subpath() {
        let td = tempfile::tempdir().expect("tempdir");
        let spec = ModelSpec::new("qwen", "model.gguf", "v1");
        assert!(find_in_folder(&spec, td.path()).is_none());

        let nested = td.path().join("models").join("llm").join("model.gguf");
        touch(&nested);
        assert_eq!(find_in_folder(&spec, td.path()), Some(nested));

        let direct = td.path().join("model.gguf");
        touch(&direct);
        assert_eq!(find_in_folder(&spec, td.path()), Some(direct));
    }
}
