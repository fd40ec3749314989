use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// RFC 3339 string for provenance notes stored as JSON
pub fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

/// Append an automated annotation to free-form session notes
pub fn append_note(existing: Option<&str>, note: &str) -> String {
    match existing {
        Some(prev) if !prev.is_empty() => format!("{}\n{}", prev, note),
        _ => note.to_string(),
    }
}
