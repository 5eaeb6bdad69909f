//! Fuzzy appointment matching
//!
//! An appointment counts as belonging to a lead when the contact's last name
//! or the street portion of the address appears as a case-insensitive
//! substring of the event title, description or location.

/// Minimum needle lengths; shorter fragments match too much.
const MIN_NAME_NEEDLE_LEN: usize = 3;
const MIN_STREET_NEEDLE_LEN: usize = 4;

/// Build search needles from the lead's contact name and address.
pub fn search_needles(contact_name: Option<&str>, address: Option<&str>) -> Vec<String> {
    let mut needles = Vec::new();

    if let Some(name) = contact_name {
        if let Some(last) = name.split_whitespace().last() {
            if last.len() >= MIN_NAME_NEEDLE_LEN {
                needles.push(last.to_lowercase());
            }
        }
    }

    if let Some(address) = address {
        // Street portion only: everything before the first comma.
        let street = address.split(',').next().unwrap_or(address).trim();
        if street.len() >= MIN_STREET_NEEDLE_LEN {
            needles.push(street.to_lowercase());
        }
    }

    needles
}

/// True when any needle appears in any of the event's text fields.
pub fn event_matches(
    needles: &[String],
    title: &str,
    description: Option<&str>,
    location: Option<&str>,
) -> bool {
    if needles.is_empty() {
        return false;
    }

    let haystacks = [
        title.to_lowercase(),
        description.unwrap_or_default().to_lowercase(),
        location.unwrap_or_default().to_lowercase(),
    ];

    needles
        .iter()
        .any(|needle| haystacks.iter().any(|hay| hay.contains(needle.as_str())))
}
