/// Case-fold and drop every whitespace character. Matching keys and
/// prompts are compared in this form.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Filesystem-safe slug: lowercase ASCII alphanumerics, every other run of
/// characters collapsed to a single `_`, outer `_` trimmed. Never empty.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;

    for c in text.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c);
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        "viz".to_string()
    } else {
        slug
    }
}
