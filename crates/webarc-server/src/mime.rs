use std::path::Path;

/// Extension to MIME type, covering the formats the legacy web-game
/// corpus actually contains.
const TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=UTF-8"),
    ("htm", "text/html; charset=UTF-8"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain; charset=UTF-8"),
    ("swf", "application/x-shockwave-flash"),
    ("dcr", "application/x-director"),
    ("dir", "application/x-director"),
    ("dxr", "application/x-director"),
    ("unity3d", "application/vnd.unity"),
    ("jar", "application/java-archive"),
    ("class", "application/java-vm"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("bmp", "image/bmp"),
    ("wav", "audio/wav"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("mid", "audio/midi"),
    ("mp4", "video/mp4"),
    ("flv", "video/x-flv"),
    ("zip", "application/zip"),
    ("pdf", "application/pdf"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
];

pub const DEFAULT: &str = "application/octet-stream";

/// MIME type for a path or lookup key, by extension.
pub fn content_type_for(path: &str) -> &'static str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let Some((_, ext)) = name.rsplit_once('.') else {
        return DEFAULT;
    };
    TYPES
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT)
}

pub fn content_type_for_path(path: &Path) -> &'static str {
    content_type_for(&path.to_string_lossy())
}
