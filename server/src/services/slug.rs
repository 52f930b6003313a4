use uuid::Uuid;

use crate::db::EventRepository;
use crate::utils::AppError;

const FALLBACK_SLUG: &str = "event";

fn strip_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Lowercases the title, strips Latin diacritics and joins the remaining
/// alphanumeric runs with single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars().flat_map(char::to_lowercase).map(strip_diacritic) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Finds the first free slug among `base`, `base-1`, `base-2`, ...
///
/// `exclude` is the event being renamed, so it never collides with itself.
/// Two concurrent allocations can still pick the same value; the unique
/// index on `events.slug` turns the loser into a conflict.
pub async fn allocate_slug(
    events: &dyn EventRepository,
    title: &str,
    exclude: Option<Uuid>,
) -> Result<String, AppError> {
    let base = slugify(title);
    if !events.slug_exists(&base, exclude).await? {
        return Ok(base);
    }

    let mut suffix: u32 = 1;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !events.slug_exists(&candidate, exclude).await? {
            tracing::debug!(slug = %candidate, "allocated suffixed slug");
            return Ok(candidate);
        }
        suffix += 1;
    }
}
