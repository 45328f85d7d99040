use std::path::PathBuf;

/// Convertit un caractère hexadécimal ASCII en valeur binaire.
fn from_hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Décode les séquences `%xx` d'une chaîne de chemin URI.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h1), Some(h2)) = (from_hex(bytes[i + 1]), from_hex(bytes[i + 2])) {
                out.push((h1 << 4) | h2);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).to_string()
}

/// Normalise un chemin brut provenant de l'environnement, de l'UI ou d'un URI `file://`.
///
/// Les guillemets entourant une valeur copiée depuis l'explorateur Windows sont retirés.
pub fn normalize_input_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim().trim_matches('"');
    let mut path = trimmed;

    if let Some(rest) = trimmed.strip_prefix("file://") {
        path = rest;
    }

    if let Some(rest) = path.strip_prefix("localhost/") {
        path = rest;
    }

    #[cfg(target_os = "windows")]
    {
        let bytes = path.as_bytes();
        if bytes.len() > 2 && bytes[0] == b'/' && bytes[2] == b':' {
            path = &path[1..];
        }
    }

    if trimmed.starts_with("file://") {
        PathBuf::from(percent_decode(path))
    } else {
        PathBuf::from(path)
    }
}

/// Lit une variable d'environnement de chemin, `None` si absente ou vide.
pub fn env_path(key: &str) -> Option<PathBuf> {
    let raw = std::env::var(key).ok()?;
    if raw.trim().is_empty() {
        return None;
    }
    Some(normalize_input_path(&raw))
}

#[cfg(test)]
mod tests {
    use super::normalize_input_path;
    use std::path::PathBuf;

    #[test]
    fn normalize_input_path_decodes_file_uri() {
        let got = normalize_input_path("file:///opt/models/my%20model.gguf");
        assert_eq!(got, PathBuf::from("/opt/models/my model.gguf"));
    }

    #[test]
    fn normalize_input_path_keeps_plain_paths_verbatim() {
        let got = normalize_input_path("  \"/data/100%25/model.gguf\" ");
        assert_eq!(got, PathBuf::from("/data/100%25/model.gguf"));
    }
}
