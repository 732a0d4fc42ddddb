#![allow(dead_code)]

use std::collections::BTreeMap;

pub const IMAGE_WIDTH: u16 = 256;
pub const IMAGE_LENGTH: u16 = 257;
pub const BITS_PER_SAMPLE: u16 = 258;
pub const COMPRESSION: u16 = 259;
pub const PHOTOMETRIC: u16 = 262;
pub const STRIP_OFFSETS: u16 = 273;
pub const SAMPLES_PER_PIXEL: u16 = 277;
pub const STRIP_BYTE_COUNTS: u16 = 279;
pub const PAGE_NUMBER: u16 = 297;

/// One directory entry: field type, count and the raw 4-byte value slot.
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    pub kind: u16,
    pub count: u32,
    pub slot: [u8; 4],
}

impl Entry {
    /// First value of a SHORT or LONG entry.
    pub fn value(&self) -> u32 {
        match self.kind {
            3 => u16::from_le_bytes([self.slot[0], self.slot[1]]) as u32,
            _ => u32::from_le_bytes(self.slot),
        }
    }
}

pub struct Ifd {
    pub offset: usize,
    pub entries: BTreeMap<u16, Entry>,
}

impl Ifd {
    pub fn get(&self, tag: u16) -> u32 {
        self.entries
            .get(&tag)
            .unwrap_or_else(|| panic!("tag {tag} missing"))
            .value()
    }

    pub fn strip<'a>(&self, file: &'a [u8]) -> &'a [u8] {
        let offset = self.get(STRIP_OFFSETS) as usize;
        let len = self.get(STRIP_BYTE_COUNTS) as usize;
        &file[offset..offset + len]
    }
}

fn u16_at(data: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([data[pos], data[pos + 1]])
}

fn u32_at(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap())
}

/// Follows the IFD chain of a little-endian TIFF.
pub fn read_ifds(file: &[u8]) -> Vec<Ifd> {
    assert_eq!(&file[..4], b"II*\0", "not a little-endian TIFF");
    let mut out = Vec::new();
    let mut at = u32_at(file, 4) as usize;
    while at != 0 {
        assert!(at + 2 <= file.len(), "IFD offset {at} past end of file");
        let count = u16_at(file, at) as usize;
        let mut entries = BTreeMap::new();
        for i in 0..count {
            let e = at + 2 + i * 12;
            entries.insert(
                u16_at(file, e),
                Entry {
                    kind: u16_at(file, e + 2),
                    count: u32_at(file, e + 4),
                    slot: file[e + 8..e + 12].try_into().unwrap(),
                },
            );
        }
        out.push(Ifd { offset: at, entries });
        at = u32_at(file, at + 2 + count * 12) as usize;
        assert!(out.len() < 10_000, "IFD chain loops");
    }
    out
}
