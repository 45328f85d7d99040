use std::fs;
use std::path::{Path, PathBuf};

/// Dossier des modèles de reconnaissance Sherpa-ONNX dans les ressources.
const SHERPA_RELATIVE_DIR: [&str; 2] = ["models", "sherpa-onnx"];
/// Instantané de store Ollama embarqué.
const OLLAMA_SNAPSHOT_DIR: &str = "ollama-models";

/// Ressources de modèles détectées dans le paquet.
#[derive(Clone, Debug, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagedAssets {
    /// Fichier GGUF embarqué avec le nom attendu.
    pub gguf: Option<PathBuf>,
    /// Dossier `models/sherpa-onnx` embarqué.
    pub sherpa_root: Option<PathBuf>,
    /// Dossier de modèle Sherpa complet, si un sous-dossier valide est trouvé.
    pub sherpa_model_dir: Option<PathBuf>,
    /// Instantané `ollama-models` contenant `manifests` et `blobs`.
    pub ollama_snapshot: Option<PathBuf>,
}

impl PackagedAssets {
    /// Inspecte le dossier de ressources du paquet.
    pub fn detect(resource_dir: &Path, gguf_filename: &str) -> Self {
        let gguf = resource_dir.join("models").join("llm").join(gguf_filename);
        let gguf = gguf.is_file().then_some(gguf);

        let sherpa_root = SHERPA_RELATIVE_DIR
            .iter()
            .fold(resource_dir.to_path_buf(), |acc, part| acc.join(part));
        let sherpa_root = sherpa_root.is_dir().then_some(sherpa_root);
        let sherpa_model_dir = sherpa_root.as_deref().and_then(find_sherpa_model_dir);
        if sherpa_root.is_some() && sherpa_model_dir.is_none() {
            log::warn!("bundled sherpa-onnx directory has no complete model (tokens/encoder/joiner/decoder)");
        }

        let snapshot = resource_dir.join(OLLAMA_SNAPSHOT_DIR);
        let ollama_snapshot = (snapshot.join("manifests").is_dir() && snapshot.join("blobs").is_dir())
            .then_some(snapshot);

        Self {
            gguf,
            sherpa_root,
            sherpa_model_dir,
            ollama_snapshot,
        }
    }

    /// Chemin à transmettre au backend pour les modèles de reconnaissance.
    pub fn sherpa_dir_for_backend(&self) -> Option<&Path> {
        self.sherpa_model_dir
            .as_deref()
            .or(self.sherpa_root.as_deref())
    }
}

/// Vérifie qu'un dossier contient un modèle Sherpa-ONNX streaming complet.
pub fn is_complete_sherpa_model(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    let names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    let has_onnx = |prefix: &str| {
        names
            .iter()
            .any(|name| name.starts_with(prefix) && name.ends_with(".onnx"))
    };

    names.iter().any(|name| name == "tokens.txt")
        && has_onnx("encoder")
        && has_onnx("joiner")
        && has_onnx("decoder")
}

/// Retourne le dossier lui-même s'il est complet, sinon le premier sous-dossier complet.
fn find_sherpa_model_dir(root: &Path) -> Option<PathBuf> {
    if is_complete_sherpa_model(root) {
        return Some(root.to_path_buf());
    }
    let mut children: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    children.sort();
    children
        .into_iter()
        .find(|path| is_complete_sherpa_model(path))
}
