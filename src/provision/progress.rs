use lazy_static::lazy_static;
use regex::Regex;
use tokio::sync::mpsc;

lazy_static! {
    static ref PERCENT_RE: Regex = Regex::new(r"(\d+)%").expect("valid percent regex");
    static ref ANSI_ESCAPE_RE: Regex =
        Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ansi regex");
}

/// Événement de progression affiché par la fenêtre de démarrage.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ProgressEvent {
    /// Pourcentage 0-100 quand il a pu être extrait.
    pub percent: Option<u8>,
    pub message: String,
}

impl ProgressEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            percent: None,
            message: message.into(),
        }
    }
}

/// Extrait un pourcentage d'un texte libre; le texte est toujours transmis tel quel.
pub fn parse_progress(text: &str) -> ProgressEvent {
    let percent = PERCENT_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .map(|value| value.min(100) as u8);
    ProgressEvent {
        percent,
        message: text.to_string(),
    }
}

/// Retire les séquences d'échappement de terminal d'une ligne de sortie.
pub fn strip_terminal_escapes(text: &str) -> String {
    ANSI_ESCAPE_RE.replace_all(text, "").to_string()
}

/// Émetteur FIFO d'événements de progression vers la surface d'affichage.
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink {
    /// Crée un émetteur et le récepteur consommé par l'UI.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: ProgressEvent) {
        log::debug!("progress {:?}: {}", event.percent, event.message);
        // Le récepteur disparaît quand la fenêtre de progression est fermée.
        let _ = self.tx.send(event);
    }

    pub fn status(&self, message: impl Into<String>) {
        self.send(ProgressEvent::status(message));
    }

    pub fn percent(&self, percent: u8, message: impl Into<String>) {
        self.send(ProgressEvent {
            percent: Some(percent.min(100)),
            message: message.into(),
        });
    }
}
