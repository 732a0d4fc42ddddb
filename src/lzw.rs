//! TIFF-flavoured LZW: MSB-first code packing with the "early change"
//! width switch that TIFF readers expect.

use crate::bits::BitWriter;
use std::collections::HashMap;

const CLEAR: u16 = 256;
const EOI: u16 = 257;
const FIRST_FREE: u16 = 258;
const MIN_BITS: u8 = 9;
/// The table is reset once the next free code would reach this value.
const TABLE_LIMIT: u16 = 4094;

struct Encoder {
    writer: BitWriter,
    table: HashMap<(u16, u8), u16>,
    next: u16,
    width: u8,
}

impl Encoder {
    fn new(capacity: usize) -> Self {
        let mut encoder = Self {
            writer: BitWriter::with_capacity(capacity),
            table: HashMap::with_capacity(TABLE_LIMIT as usize),
            next: FIRST_FREE,
            width: MIN_BITS,
        };
        encoder.writer.put(CLEAR, MIN_BITS);
        encoder
    }

    fn emit(&mut self, code: u16) {
        self.writer.put(code, self.width);
    }

    /// Accounts for one new table entry, widening codes or resetting the
    /// table as the decoder will.
    fn grow(&mut self) {
        self.next += 1;
        if self.next == TABLE_LIMIT {
            self.emit(CLEAR);
            self.table.clear();
            self.next = FIRST_FREE;
            self.width = MIN_BITS;
        } else if self.next == 1 << self.width {
            self.width += 1;
        }
    }
}

/// Compresses `data` into a single LZW strip.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut enc = Encoder::new(data.len() / 2 + 16);
    let Some((&first, rest)) = data.split_first() else {
        enc.emit(EOI);
        return enc.writer.finish();
    };

    let mut prefix = first as u16;
    for &byte in rest {
        if let Some(&code) = enc.table.get(&(prefix, byte)) {
            prefix = code;
            continue;
        }
        enc.emit(prefix);
        let next = enc.next;
        enc.table.insert((prefix, byte), next);
        enc.grow();
        prefix = byte as u16;
    }
    enc.emit(prefix);
    enc.grow();
    enc.emit(EOI);
    enc.writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_codes(data: &[u8], width: u8) -> Vec<u16> {
        let mut codes = Vec::new();
        let mut acc = 0u32;
        let mut bits = 0u8;
        for &byte in data {
            acc = (acc << 8) | byte as u32;
            bits += 8;
            if bits >= width {
                bits -= width;
                codes.push((acc >> bits) as u16 & ((1 << width) - 1));
            }
        }
        codes
    }

    /// Reference decoder following the TIFF 6.0 description.
    fn decode(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut table: Vec<Vec<u8>> = Vec::new();
        let reset = |table: &mut Vec<Vec<u8>>| {
            table.clear();
            table.extend((0..=255u8).map(|b| vec![b]));
            table.push(Vec::new());
            table.push(Vec::new());
        };
        reset(&mut table);
        let mut width = 9u8;
        let mut pos = 0usize;
        let mut prev: Option<Vec<u8>> = None;
        let read = |pos: &mut usize, width: u8| -> Option<u16> {
            let mut code = 0u16;
            for _ in 0..width {
                let byte = *data.get(*pos / 8)?;
                let bit = (byte >> (7 - (*pos % 8))) & 1;
                code = (code << 1) | bit as u16;
                *pos += 1;
            }
            Some(code)
        };
        while let Some(code) = read(&mut pos, width) {
            match code {
                EOI => break,
                CLEAR => {
                    reset(&mut table);
                    width = 9;
                    prev = None;
                    continue;
                }
                _ => {}
            }
            let entry = match (table.get(code as usize), &prev) {
                (Some(entry), _) => entry.clone(),
                (None, Some(p)) => {
                    let mut e = p.clone();
                    e.push(p[0]);
                    e
                }
                (None, None) => panic!("bad first code {code}"),
            };
            if let Some(p) = prev.take() {
                let mut added = p;
                added.push(entry[0]);
                table.push(added);
            }
            out.extend_from_slice(&entry);
            prev = Some(entry);
            width = match table.len() {
                n if n >= 2047 => 12,
                n if n >= 1023 => 11,
                n if n >= 511 => 10,
                _ => 9,
            };
        }
        out
    }

    #[test]
    fn matches_tiff_reference_sequence() {
        let encoded = encode(&[7, 7, 7, 8, 8, 7, 7, 6, 6]);
        assert_eq!(
            read_codes(&encoded, 9),
            vec![256, 7, 258, 8, 8, 258, 6, 6, 257]
        );
    }

    #[test]
    fn empty_input_is_clear_then_eoi() {
        assert_eq!(read_codes(&encode(&[]), 9), vec![256, 257]);
    }

    #[test]
    fn long_noisy_input_survives_width_changes_and_resets() {
        let mut state = 0x1234_5678u32;
        let data: Vec<u8> = (0..200_000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state % 7) as u8 * 40
            })
            .collect();
        assert_eq!(decode(&encode(&data)), data);
    }

    #[test]
    fn uniform_rows_compress() {
        let data = vec![255u8; 1700 * 4 * 50];
        let encoded = encode(&data);
        assert!(encoded.len() < data.len() / 50);
        assert_eq!(decode(&encoded), data);
    }
}
