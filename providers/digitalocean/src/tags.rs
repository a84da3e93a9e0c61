use std::collections::BTreeMap;

/// DigitalOcean rejects tags longer than this.
const MAX_TAG_LEN: usize = 255;

/// Replace every character that DigitalOcean does not allow in a tag name with `_`. Tags may only
/// contain letters, numbers, colons, dashes and underscores.
pub(crate) fn sanitize(tag: &str) -> String {
    tag.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ':' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TAG_LEN)
        .collect()
}

/// The cluster tag set as DigitalOcean tag names, `key:value`.
pub(crate) fn tag_names(tags: &BTreeMap<String, String>) -> Vec<String> {
    tags.iter()
        .map(|(key, value)| sanitize(&format!("{}:{}", key, value)))
        .collect()
}
