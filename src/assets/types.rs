use std::path::{Path, PathBuf};

/// Raison pour laquelle un emplacement candidat est essayé.
///
/// L'ordre des variantes est l'ordre de priorité de résolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateReason {
    /// Chemin explicite fourni par l'environnement.
    EnvOverride,
    /// Copie embarquée dans les ressources du paquet.
    Packaged,
    /// Dossier géré par l'application dans le profil utilisateur.
    Managed,
    /// Dossier choisi par l'utilisateur lors d'un lancement précédent.
    UserPicked,
}

impl CandidateReason {
    /// Retourne le label humain affiché dans les diagnostics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::EnvOverride => "environment override",
            Self::Packaged => "packaged resources",
            Self::Managed => "managed model directory",
            Self::UserPicked => "previously selected folder",
        }
    }
}

/// Emplacement de recherche déclaré par un `ModelSpec`.
#[derive(Clone, Debug)]
pub struct SearchLocation {
    /// Dossier à inspecter, ou fichier exact pour un override d'environnement.
    pub path: PathBuf,
    /// Origine de l'emplacement.
    pub reason: CandidateReason,
}

/// Artefact de modèle requis par le moteur de résumé.
#[derive(Clone, Debug)]
pub struct ModelSpec {
    /// Nom logique du modèle.
    pub name: String,
    /// Nom de fichier attendu, comparé exactement.
    pub filename: String,
    /// Label de version du pack de modèle.
    pub version: String,
    /// Emplacements de recherche déclarés.
    pub locations: Vec<SearchLocation>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, filename: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            version: version.into(),
            locations: Vec::new(),
        }
    }

    /// Ajoute un emplacement de recherche.
    pub fn with_location(mut self, reason: CandidateReason, path: impl Into<PathBuf>) -> Self {
        self.locations.push(SearchLocation {
            path: path.into(),
            reason,
        });
        self
    }

    /// Vérifie qu'un chemin désigne exactement le fichier attendu.
    pub fn matches_file(&self, path: &Path) -> bool {
        path.is_file()
            && path
                .file_name()
                .map(|name| name.to_string_lossy() == self.filename.as_str())
                .unwrap_or(false)
    }
}

/// Chemin candidat et raison de la tentative.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionCandidate {
    pub path: PathBuf,
    pub reason: CandidateReason,
    /// Vrai si le fichier existe avec le nom attendu.
    pub exists: bool,
}

/// Résultat de la localisation: premier chemin existant et liste complète des candidats.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocateResult {
    pub found: Option<PathBuf>,
    pub candidates: Vec<ResolutionCandidate>,
}

impl LocateResult {
    /// Formate la liste des candidats pour un message de diagnostic.
    pub fn describe_candidates(&self) -> String {
        self.candidates
            .iter()
            .map(|c| format!("- {} ({})", c.path.to_string_lossy(), c.reason.as_label()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
