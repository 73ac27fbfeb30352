use regex::Regex;
use std::sync::LazyLock;

/// A compass qualifier forming a whole `›`/`:` segment, followed by the end or another separator.
static RE_DIRECTIONAL_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*[›:]\s*(?:north-west|north-east|south-west|south-east|north|south|east|west)\s*(?P<tail>$|[:›])",
    )
    .unwrap()
});

/// A match consumes the following separator, so back-to-back qualifiers need another pass.
fn strip_directional_segments(title: &str) -> String {
    let mut cleaned = title.to_string();
    loop {
        let next = RE_DIRECTIONAL_SUFFIX.replace_all(&cleaned, "$tail").into_owned();
        if next == cleaned {
            return cleaned;
        }
        cleaned = next;
    }
}

/// Derives a geocodable "place, region" string from a free-text webcam title.
///
/// Best effort: the result may still be ungeocodable, which the geocoder
/// reports as not-found.
pub fn parse_location_from_title(title: &str) -> String {
    let cleaned = strip_directional_segments(title);
    let cleaned = cleaned.trim();

    if cleaned.contains(':') && cleaned.contains('-') {
        let mut parts = cleaned.split(':');
        let city = parts.next().unwrap_or_default().trim();
        let rest = parts.next().unwrap_or_default();
        let mut rest = rest.split('-');
        let place = rest.next().unwrap_or_default().trim();
        let country = rest.next().map(str::trim).unwrap_or_default();
        return if country.is_empty() {
            format!("{}, {}", place, city)
        } else {
            format!("{}, {}, {}", place, city, country)
        };
    }

    if cleaned.contains(':') {
        let mut parts = cleaned.split(':');
        let first = parts.next().unwrap_or_default().trim();
        let second = parts.next().unwrap_or_default().trim();
        return format!("{}, {}", second, first);
    }

    if cleaned.contains('-') {
        return cleaned.replace('-', ",");
    }

    cleaned.to_string()
}
