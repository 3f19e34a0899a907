//! Subset descriptors: CIDSet bitsets and Type 1 CharSet strings.

/// CIDSet stream data: bit `cid` set, most significant bit first.
pub fn cidset_bytes(cids: &[u32]) -> Vec<u8> {
    let Some(max) = cids.iter().max() else {
        return Vec::new();
    };
    let mut bytes = vec![0u8; (*max as usize / 8) + 1];
    for cid in cids {
        bytes[*cid as usize / 8] |= 0x80 >> (cid % 8);
    }
    bytes
}

/// CIDs whose bit is set in CIDSet data.
pub fn cidset_members(bytes: &[u8]) -> Vec<u32> {
    bytes
        .iter()
        .enumerate()
        .flat_map(|(index, byte)| {
            (0..8u32).filter_map(move |bit| {
                (byte & (0x80 >> bit) != 0).then_some(index as u32 * 8 + bit)
            })
        })
        .collect()
}

/// CharSet string `/a/b/c`: names deduplicated, in the given order.
pub fn charset_string(glyph_names: &[String]) -> String {
    let mut seen = std::collections::HashSet::new();
    glyph_names
        .iter()
        .map(|name| name.trim_start_matches('/'))
        .filter(|name| !name.is_empty() && seen.insert(name.to_string()))
        .map(|name| format!("/{}", name))
        .collect()
}
