/// Make an uploaded filename safe to join onto the upload directory.
///
/// Keeps ASCII alphanumerics, `.`, `_` and `-`; whitespace becomes `_`; everything
/// else (path separators included) is dropped. Leading dots are stripped so the
/// result can never be hidden or climb out of the directory.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();

    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// Extension (without the dot) for a MIME content type such as `image/jpeg`.
pub fn extension_for_content_type(content_type: &str) -> String {
    let essence = content_type.split(';').next().unwrap_or("").trim();

    match essence {
        "image/jpeg" => return "jpg".to_string(),
        "application/pdf" => return "pdf".to_string(),
        _ => {}
    }

    mime_guess::get_mime_extensions_str(essence)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| {
            essence
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or("bin")
                .to_string()
        })
}

/// Extension guessed from the last path segment of a URL, capped at 6 chars.
pub fn extension_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let last = path.rsplit('/').next().unwrap_or("");

    match last.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.chars().take(6).collect(),
        _ => "bin".to_string(),
    }
}
