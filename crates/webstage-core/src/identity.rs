//! Site identifier derivation from a request identifier.

const UUID_GROUP_LENGTHS: [usize; 5] = [8, 4, 4, 4, 12];

/// Derive the hosting site identifier for a request.
///
/// The part before the first underscore is taken. If it is a hyphenated
/// 8-4-4-4-12 hex UUID, the first four groups are concatenated (20 chars,
/// no hyphens, case preserved); anything else is returned unchanged.
pub fn resolve_site_id(request_id: &str) -> String {
    let prefix = request_id.split('_').next().unwrap_or(request_id);
    match uuid_groups(prefix) {
        Some(groups) => groups[..4].concat(),
        None => prefix.to_string(),
    }
}

fn uuid_groups(candidate: &str) -> Option<[&str; 5]> {
    let mut groups = [""; 5];
    let mut parts = candidate.split('-');
    for (slot, expected) in groups.iter_mut().zip(UUID_GROUP_LENGTHS) {
        let part = parts.next()?;
        if part.len() != expected || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        *slot = part;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(groups)
}
