/// Commandes de diagnostic des modèles et binaires.
pub mod diagnostics;
/// Commandes d'état du démarrage.
pub mod status;
