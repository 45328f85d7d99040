use std::path::PathBuf;

/// Nom du dossier applicatif dans les répertoires utilisateur.
pub const APP_DIR_NAME: &str = "AI Meeting Assistant";

/// Plateforme cible pour la construction des chemins gérés.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Retourne la plateforme de compilation courante.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }
}

/// Répertoires de base de l'utilisateur, injectés pour garder les calculs de chemins purs.
#[derive(Clone, Debug, Default)]
pub struct BaseDirs {
    pub home: Option<PathBuf>,
    /// `%LOCALAPPDATA%` sous Windows.
    pub local_app_data: Option<PathBuf>,
    /// `$XDG_DATA_HOME` sous Linux.
    pub data_home: Option<PathBuf>,
}

impl BaseDirs {
    /// Lit les répertoires de base depuis le système.
    pub fn from_system() -> Self {
        Self {
            home: dirs::home_dir(),
            local_app_data: dirs::data_local_dir(),
            data_home: dirs::data_dir(),
        }
    }
}

/// Retourne la racine de données gérée par l'application pour une plateforme donnée.
pub fn managed_data_root(platform: Platform, base: &BaseDirs) -> Option<PathBuf> {
    let root = match platform {
        Platform::Windows => base.local_app_data.clone().or_else(|| {
            base.home
                .as_ref()
                .map(|home| home.join("AppData").join("Local"))
        })?,
        Platform::MacOs => base.home.as_ref()?.join("Library").join("Application Support"),
        Platform::Linux => base
            .data_home
            .clone()
            .or_else(|| base.home.as_ref().map(|home| home.join(".local").join("share")))?,
    };
    Some(root.join(APP_DIR_NAME))
}

/// Retourne le dossier géré où un pack de modèles GGUF est installé.
pub fn managed_model_dir(platform: Platform, base: &BaseDirs) -> Option<PathBuf> {
    managed_data_root(platform, base).map(|root| root.join("models").join("llm"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BaseDirs {
        BaseDirs {
            home: Some(PathBuf::from("/home/ana")),
            local_app_data: Some(PathBuf::from("C:/Users/ana/AppData/Local")),
            data_home: Some(PathBuf::from("/home/ana/.data")),
        }
    }

    #[test]
    fn managed_root_uses_local_app_data_on_windows() {
        let got = managed_data_root(Platform::Windows, &base()).expect("root");
        assert_eq!(got, PathBuf::from("C:/Users/ana/AppData/Local").join(APP_DIR_NAME));
    }

    #[test]
    fn managed_root_uses_application_support_on_macos() {
        let got = managed_data_root(Platform::MacOs, &base()).expect("root");
        assert_eq!(
            got,
            PathBuf::from("/home/ana/Library/Application Support").join(APP_DIR_NAME)
        );
    }

    #[test]
    fn managed_root_falls_back_to_local_share_on_linux() {
        let mut dirs = base();
        dirs.data_home = None;
        let got = managed_model_dir(Platform::Linux, &dirs).expect("root");
        assert_eq!(
            got,
            PathBuf::from("/home/ana/.local/share")
                .join(APP_DIR_NAME)
                .join("models")
                .join("llm")
        );
    }

    #[test]
    fn managed_root_is_none_without_any_base_dir() {
        assert!(managed_data_root(Platform::MacOs, &BaseDirs::default()).is_none());
    }
}
