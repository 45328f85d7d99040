use std::fs;
use std::path::{Path, PathBuf};

use crate::assets::BaseDirs;

/// Registre par défaut des manifests Ollama.
const REGISTRY_PATH: [&str; 2] = ["registry.ollama.ai", "library"];

/// Référence `nom:tag` d'un modèle du runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelRef {
    pub name: String,
    pub tag: String,
}

impl ModelRef {
    /// Parse `qwen2.5:1.5b`; le tag vaut `latest` quand il est omis.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let (name, tag) = match raw.split_once(':') {
            Some((name, tag)) => (name.trim(), tag.trim()),
            None => (raw, "latest"),
        };
        if name.is_empty() || tag.is_empty() || name.contains(['/', '\\']) {
            return Err(format!(
                "Invalid model reference '{}'. Expected 'name:tag', e.g. qwen2.5:1.5b",
                raw
            ));
        }
        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Forme canonique `nom:tag` utilisée par la CLI.
    pub fn as_tag(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

/// Retourne la racine du store Ollama: `OLLAMA_MODELS` sinon `~/.ollama/models`.
pub fn default_store_root(env_override: Option<PathBuf>, base: &BaseDirs) -> Option<PathBuf> {
    env_override.or_else(|| {
        base.home
            .as_ref()
            .map(|home| home.join(".ollama").join("models"))
    })
}

/// Store de modèles d'un runtime (`manifests/` + `blobs/`).
#[derive(Clone, Debug)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Chemin du manifest d'un modèle dans ce store.
    pub fn manifest_path(&self, model: &ModelRef) -> PathBuf {
        REGISTRY_PATH
            .iter()
            .fold(self.root.join("manifests"), |acc, part| acc.join(part))
            .join(&model.name)
            .join(&model.tag)
    }

    /// Vrai si le manifest du modèle est présent.
    pub fn is_registered(&self, model: &ModelRef) -> bool {
        self.manifest_path(model).is_file()
    }

    /// Copie les arbres `manifests` et `blobs` d'un instantané dans ce store.
    ///
    /// Les fichiers déjà présents avec la même taille sont conservés. Retourne le nombre de
    /// fichiers copiés.
    pub fn import_snapshot(&self, snapshot: &Path) -> Result<usize, String> {
        let mut copied = 0;
        for tree in ["manifests", "blobs"] {
            let source = snapshot.join(tree);
            if !source.is_dir() {
                return Err(format!(
                    "Bundled model snapshot is missing '{}'",
                    source.to_string_lossy()
                ));
            }
            copied += copy_tree(&source, &self.root.join(tree))?;
        }
        Ok(copied)
    }
}

/// Copie récursive d'un dossier, sans écraser les fichiers identiques en taille.
fn copy_tree(source: &Path, destination: &Path) -> Result<usize, String> {
    fs::create_dir_all(destination).map_err(|e| {
        format!(
            "Failed to create '{}': {}",
            destination.to_string_lossy(),
            e
        )
    })?;

    let entries = fs::read_dir(source)
        .map_err(|e| format!("Failed to read '{}': {}", source.to_string_lossy(), e))?;
    let mut copied = 0;
    for entry in entries {
        let entry =
            entry.map_err(|e| format!("Failed to read '{}': {}", source.to_string_lossy(), e))?;
        let from = entry.path();
        let to = destination.join(entry.file_name());
        if from.is_dir() {
            copied += copy_tree(&from, &to)?;
            continue;
        }

        let same_size = match (fs::metadata(&from), fs::metadata(&to)) {
            (Ok(src), Ok(dst)) => src.len() == dst.len(),
            _ => false,
        };
        if same_size {
            continue;
        }
        fs::copy(&from, &to).map_err(|e| {
            format!(
                "Failed to copy '{}' to '{}': {}",
                from.to_string_lossy(),
                to.to_string_lossy(),
                e
            )
        })?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    fn snapshot_with(root: &Path, model: &ModelRef) {
        let snapshot_store = ModelStore::new(root);
        write(&snapshot_store.manifest_path(model), br#"{"layers":[]}"#);
        write(&root.join("blobs").join("sha256-abc"), b"weights");
    }

    #[test]
    fn model_ref_parses_name_and_tag() {
        let model = ModelRef::parse("qwen2.5:1.5b").expect("parse");
        assert_eq!(model.name, "qwen2.5");
        assert_eq!(model.tag, "1.5b");
        assert_eq!(ModelRef::parse("llama3").expect("parse").as_tag(), "llama3:latest");
        assert!(ModelRef::parse(":1.5b").is_err());
    }

    #[test]
    fn import_snapshot_registers_model_in_empty_store() {
        let model = ModelRef::parse("qwen2.5:1.5b").expect("parse");
        let snapshot = tempfile::tempdir().expect("tempdir");
        let target = tempfile::tempdir().expect("tempdir");
        snapshot_with(snapshot.path(), &model);

        let store = ModelStore::new(target.path().join("models"));
        assert!(!store.is_registered(&model));

        let copied = store.import_snapshot(snapshot.path()).expect("import");
        assert_eq!(copied, 2);
        assert!(store.is_registered(&model));
        assert!(store.root().join("blobs").join("sha256-abc").is_file());

        assert_eq!(store.import_snapshot(snapshot.path()).expect("reimport"), 0);
    }

    #[test]
    fn import_snapshot_fails_without_blobs_tree() {
        let snapshot = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(snapshot.path().join("manifests")).expect("mkdir");
        let target = tempfile::tempdir().expect("tempdir");

        let err = ModelStore::new(target.path())
            .import_snapshot(snapshot.path())
            .unwrap_err();
        assert!(err.contains("blobs"));
    }

    #[test]
    fn default_store_root_prefers_env_override() {
        let base = BaseDirs {
            home: Some(PathBuf::from("/home/ana")),
            ..BaseDirs::default()
        };
        assert_eq!(
            default_store_root(None, &base),
            Some(PathBuf::from("/home/ana/.ollama/models"))
        );
        assert_eq!(
            default_store_root(Some(PathBuf::from("/srv/ollama")), &base),
            Some(PathBuf::from("/srv/ollama"))
        );
    }
}
