//! Minimal sfnt reader for the `cmap` table directory.

use serde::{Deserialize, Serialize};

/// One encoding subtable of a TrueType/OpenType `cmap` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmapSubtable {
    pub platform_id: u16,
    pub encoding_id: u16,
    pub format: u16,
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Offset of a table in an sfnt font program.
fn table_offset(data: &[u8], tag: &[u8; 4]) -> Option<usize> {
    let num_tables = read_u16(data, 4)? as usize;
    (0..num_tables).find_map(|i| {
        let record = 12 + i * 16;
        (data.get(record..record + 4)? == tag)
            .then(|| read_u32(data, record + 8))
            .flatten()
            .map(|offset| offset as usize)
    })
}

/// Whether the bytes start with an sfnt version tag.
pub fn is_sfnt(data: &[u8]) -> bool {
    matches!(
        data.get(0..4),
        Some([0x00, 0x01, 0x00, 0x00]) | Some(b"true") | Some(b"OTTO")
    )
}

/// Subtables of the `cmap` table; empty when the program has none or is
/// not an sfnt.
pub fn cmap_subtables(data: &[u8]) -> Vec<CmapSubtable> {
    if !is_sfnt(data) {
        return Vec::new();
    }
    let Some(cmap) = table_offset(data, b"cmap") else {
        return Vec::new();
    };
    let count = read_u16(data, cmap + 2).unwrap_or(0) as usize;
    (0..count)
        .map_while(|i| {
            let record = cmap + 4 + i * 8;
            let platform_id = read_u16(data, record)?;
            let encoding_id = read_u16(data, record + 2)?;
            let offset = read_u32(data, record + 4)? as usize;
            let format = read_u16(data, cmap + offset)?;
            Some(CmapSubtable {
                platform_id,
                encoding_id,
                format,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An sfnt with a single `cmap` table holding two subtables.
    fn sample_font() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&[0x00, 0x01, 0x00, 0x00]);
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&[0; 6]);
        // table record: tag, checksum, offset, length
        data.extend_from_slice(b"cmap");
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&28u32.to_be_bytes());
        data.extend_from_slice(&32u32.to_be_bytes());
        // cmap header at 28
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&22u32.to_be_bytes());
        // subtable formats
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&6u16.to_be_bytes());
        data
    }

    #[test]
    fn test_reads_subtables() {
        let subtables = cmap_subtables(&sample_font());
        assert_eq!(
            subtables,
            vec![
                CmapSubtable { platform_id: 3, encoding_id: 1, format: 4 },
                CmapSubtable { platform_id: 1, encoding_id: 0, format: 6 },
            ]
        );
    }

    #[test]
    fn test_non_sfnt_is_empty() {
        assert!(cmap_subtables(b"%!PS-AdobeFont-1.0").is_empty());
        assert!(cmap_subtables(&[0, 1, 0, 0, 0, 5]).is_empty());
    }
}
