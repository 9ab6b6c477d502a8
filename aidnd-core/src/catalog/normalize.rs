use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold text for matching: strip diacritics, lowercase, drop apostrophes and
/// collapse every other run of non-alphanumerics into one space.
///
/// `"Tasha's Hideous Laughter"` and `"tashas-hideous-laughter"` both fold to
/// `"tashas hideous laughter"`.
pub fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut gap = false;

    for c in text.nfd().filter(|c| !is_combining_mark(*c)) {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_alphanumeric() {
            if gap && !out.is_empty() {
                out.push(' ');
            }
            gap = false;
            out.extend(c.to_lowercase());
        } else {
            gap = true;
        }
    }
    out
}

/// Slug form of a name or slug: [`fold`] with dashes for spaces.
pub fn slugify(text: &str) -> String {
    fold(text).replace(' ', "-")
}
