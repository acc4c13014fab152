//! Language-code normalization for legacy description blocks.
//!
//! The v4 corpus mixes two- and three-letter codes (and the occasional
//! region-tagged value like `en-US`). The v5 schema wants the shortest
//! ISO 639 form, so three-letter codes with a two-letter equivalent are
//! narrowed and everything is lowercased.

/// Normalize a legacy language code to its shortest lowercase form.
///
/// `eng` -> `en`, `EN` -> `en`, `fr-FR` -> `fr`. Codes with no known
/// two-letter equivalent (or free-form garbage) pass through lowercased
/// rather than failing the record.
pub fn narrow_lang_code(code: &str) -> String {
    let primary = code
        .split(['-', '_'])
        .next()
        .unwrap_or(code)
        .trim()
        .to_lowercase();

    if primary.len() == 3
        && let Some(two) = isolang::Language::from_639_3(&primary).and_then(|l| l.to_639_1())
    {
        return two.to_string();
    }

    primary
}
