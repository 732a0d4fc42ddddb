//! CCITT Modified Huffman run-length coding (TIFF compression 2).
//!
//! Every row starts byte-aligned with a white run, which may be empty.
//! Runs alternate colour to the end of the row; there are no EOL codes.

use crate::bitonal::BitonalBuffer;
use crate::bits::BitWriter;

/// Longest run a single makeup code can express.
const MAX_MAKEUP: u32 = 2560;

/// White run lengths 0 to 63.
const WHITE_TERMINATING: [(u16, u8); 64] = [
    (0b00110101, 8), (0b000111, 6), (0b0111, 4), (0b1000, 4),
    (0b1011, 4), (0b1100, 4), (0b1110, 4), (0b1111, 4),
    (0b10011, 5), (0b10100, 5), (0b00111, 5), (0b01000, 5),
    (0b001000, 6), (0b000011, 6), (0b110100, 6), (0b110101, 6),
    (0b101010, 6), (0b101011, 6), (0b0100111, 7), (0b0001100, 7),
    (0b0001000, 7), (0b0010111, 7), (0b0000011, 7), (0b0000100, 7),
    (0b0101000, 7), (0b0101011, 7), (0b0010011, 7), (0b0100100, 7),
    (0b0011000, 7), (0b00000010, 8), (0b00000011, 8), (0b00011010, 8),
    (0b00011011, 8), (0b00010010, 8), (0b00010011, 8), (0b00010100, 8),
    (0b00010101, 8), (0b00010110, 8), (0b00010111, 8), (0b00101000, 8),
    (0b00101001, 8), (0b00101010, 8), (0b00101011, 8), (0b00101100, 8),
    (0b00101101, 8), (0b00000100, 8), (0b00000101, 8), (0b00001010, 8),
    (0b00001011, 8), (0b01010010, 8), (0b01010011, 8), (0b01010100, 8),
    (0b01010101, 8), (0b00100100, 8), (0b00100101, 8), (0b01011000, 8),
    (0b01011001, 8), (0b01011010, 8), (0b01011011, 8), (0b01001010, 8),
    (0b01001011, 8), (0b00110010, 8), (0b00110011, 8), (0b00110100, 8),
];

/// White run lengths 64 to 1728, in steps of 64.
const WHITE_MAKEUP: [(u16, u8); 27] = [
    (0b11011, 5), (0b10010, 5), (0b010111, 6), (0b0110111, 7),
    (0b00110110, 8), (0b00110111, 8), (0b01100100, 8), (0b01100101, 8),
    (0b01101000, 8), (0b01100111, 8), (0b011001100, 9), (0b011001101, 9),
    (0b011010010, 9), (0b011010011, 9), (0b011010100, 9), (0b011010101, 9),
    (0b011010110, 9), (0b011010111, 9), (0b011011000, 9), (0b011011001, 9),
    (0b011011010, 9), (0b011011011, 9), (0b010011000, 9), (0b010011001, 9),
    (0b010011010, 9), (0b011000, 6), (0b010011011, 9),
];

/// Black run lengths 0 to 63.
const BLACK_TERMINATING: [(u16, u8); 64] = [
    (0b0000110111, 10), (0b010, 3), (0b11, 2), (0b10, 2),
    (0b011, 3), (0b0011, 4), (0b0010, 4), (0b00011, 5),
    (0b000101, 6), (0b000100, 6), (0b0000100, 7), (0b0000101, 7),
    (0b0000111, 7), (0b00000100, 8), (0b00000111, 8), (0b000011000, 9),
    (0b0000010111, 10), (0b0000011000, 10), (0b0000001000, 10), (0b00001100111, 11),
    (0b00001101000, 11), (0b00001101100, 11), (0b00000110111, 11), (0b00000101000, 11),
    (0b00000010111, 11), (0b00000011000, 11), (0b000011001010, 12), (0b000011001011, 12),
    (0b000011001100, 12), (0b000011001101, 12), (0b000001101000, 12), (0b000001101001, 12),
    (0b000001101010, 12), (0b000001101011, 12), (0b000011010010, 12), (0b000011010011, 12),
    (0b000011010100, 12), (0b000011010101, 12), (0b000011010110, 12), (0b000011010111, 12),
    (0b000001101100, 12), (0b000001101101, 12), (0b000011011010, 12), (0b000011011011, 12),
    (0b000001010100, 12), (0b000001010101, 12), (0b000001010110, 12), (0b000001010111, 12),
    (0b000001100100, 12), (0b000001100101, 12), (0b000001010010, 12), (0b000001010011, 12),
    (0b000000100100, 12), (0b000000110111, 12), (0b000000111000, 12), (0b000000100111, 12),
    (0b000000101000, 12), (0b000001011000, 12), (0b000001011001, 12), (0b000000101011, 12),
    (0b000000101100, 12), (0b000001011010, 12), (0b000001100110, 12), (0b000001100111, 12),
];

/// Black run lengths 64 to 1728, in steps of 64.
const BLACK_MAKEUP: [(u16, u8); 27] = [
    (0b0000001111, 10), (0b000011001000, 12), (0b000011001001, 12), (0b000001011011, 12),
    (0b000000110011, 12), (0b000000110100, 12), (0b000000110101, 12), (0b0000001101100, 13),
    (0b0000001101101, 13), (0b0000001001010, 13), (0b0000001001011, 13), (0b0000001001100, 13),
    (0b0000001001101, 13), (0b0000001110010, 13), (0b0000001110011, 13), (0b0000001110100, 13),
    (0b0000001110101, 13), (0b0000001110110, 13), (0b0000001110111, 13), (0b0000001010010, 13),
    (0b0000001010011, 13), (0b0000001010100, 13), (0b0000001010101, 13), (0b0000001011010, 13),
    (0b0000001011011, 13), (0b0000001100100, 13), (0b0000001100101, 13),
];

/// Run lengths 1792 to 2560 shared by both colors.
const EXTENDED_MAKEUP: [(u16, u8); 13] = [
    (0b00000001000, 11), (0b00000001100, 11), (0b00000001101, 11), (0b000000010010, 12),
    (0b000000010011, 12), (0b000000010100, 12), (0b000000010101, 12), (0b000000010110, 12),
    (0b000000010111, 12), (0b000000011100, 12), (0b000000011101, 12), (0b000000011110, 12),
    (0b000000011111, 12),
];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Run {
    White,
    Black,
}

impl Run {
    fn flip(self) -> Self {
        match self {
            Run::White => Run::Black,
            Run::Black => Run::White,
        }
    }

    fn terminating(self) -> &'static [(u16, u8); 64] {
        match self {
            Run::White => &WHITE_TERMINATING,
            Run::Black => &BLACK_TERMINATING,
        }
    }

    fn makeup(self, length: u32) -> (u16, u8) {
        let index = (length / 64) as usize;
        if length >= 1792 {
            return EXTENDED_MAKEUP[(length - 1792) as usize / 64];
        }
        match self {
            Run::White => WHITE_MAKEUP[index - 1],
            Run::Black => BLACK_MAKEUP[index - 1],
        }
    }
}

fn put_run(writer: &mut BitWriter, color: Run, mut length: u32) {
    while length >= MAX_MAKEUP + 64 {
        let (code, bits) = color.makeup(MAX_MAKEUP);
        writer.put(code, bits);
        length -= MAX_MAKEUP;
    }
    if length >= 64 {
        let makeup = length / 64 * 64;
        let (code, bits) = color.makeup(makeup);
        writer.put(code, bits);
        length -= makeup;
    }
    let (code, bits) = color.terminating()[length as usize];
    writer.put(code, bits);
}

/// Encodes one bitonal image as a single strip. Set bits are white.
pub fn encode(image: &BitonalBuffer) -> Vec<u8> {
    let mut writer = BitWriter::with_capacity(image.stride() * image.height() as usize / 4 + 16);
    for row in image.rows() {
        encode_row(&mut writer, row, image.width());
        writer.align();
    }
    writer.finish()
}

fn encode_row(writer: &mut BitWriter, row: &[u8], width: u32) {
    let is_white = |x: u32| row[(x / 8) as usize] & (0x80 >> (x % 8)) != 0;
    let mut color = Run::White;
    let mut x = 0u32;
    while x < width {
        let start = x;
        while x < width && is_white(x) == (color == Run::White) {
            x += 1;
        }
        put_run(writer, color, x - start);
        color = color.flip();
    }
    if width == 0 {
        put_run(writer, Run::White, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitonal::{PixelLayout, quantize_pixels};

    fn bitonal(width: u32, gray: &[u8]) -> BitonalBuffer {
        let height = gray.len() as u32 / width;
        quantize_pixels(gray, width, height, PixelLayout::Gray8, 500).unwrap()
    }

    /// Decodes one colour's code from the front of `bits`.
    fn match_code(bits: &str, color: Run) -> (u32, usize) {
        let tables: [(&[(u16, u8)], u32, u32); 3] = match color {
            Run::White => [
                (&WHITE_TERMINATING[..], 0, 1),
                (&WHITE_MAKEUP[..], 64, 64),
                (&EXTENDED_MAKEUP[..], 1792, 64),
            ],
            Run::Black => [
                (&BLACK_TERMINATING[..], 0, 1),
                (&BLACK_MAKEUP[..], 64, 64),
                (&EXTENDED_MAKEUP[..], 1792, 64),
            ],
        };
        for (table, base, step) in tables {
            for (i, (code, len)) in table.iter().enumerate() {
                let pattern = format!("{:0width$b}", code, width = *len as usize);
                if bits.starts_with(&pattern) {
                    return (base + i as u32 * step, pattern.len());
                }
            }
        }
        panic!("no code matches {}", &bits[..bits.len().min(16)]);
    }

    /// Reference decoder: returns one bool per pixel (true = white).
    fn decode(data: &[u8], width: u32, height: u32) -> Vec<Vec<bool>> {
        let bits: String = data.iter().map(|b| format!("{b:08b}")).collect();
        let mut pos = 0usize;
        let mut rows = Vec::new();
        for _ in 0..height {
            let mut row = Vec::new();
            let mut color = Run::White;
            while row.len() < width as usize || (row.is_empty() && width == 0) {
                let mut run = 0;
                loop {
                    let (length, used) = match_code(&bits[pos..], color);
                    pos += used;
                    run += length;
                    if length < 64 {
                        break;
                    }
                }
                row.extend(std::iter::repeat_n(color == Run::White, run as usize));
                color = color.flip();
                if width == 0 {
                    break;
                }
            }
            pos = pos.div_ceil(8) * 8;
            rows.push(row);
        }
        rows
    }

    #[test]
    fn white_row_of_eight() {
        assert_eq!(encode(&bitonal(8, &[255; 8])), vec![0b1001_1000]);
    }

    #[test]
    fn black_row_starts_with_empty_white_run() {
        // white 0 (00110101) then black 8 (000101), padded.
        assert_eq!(encode(&bitonal(8, &[0; 8])), vec![0b0011_0101, 0b0001_0100]);
    }

    #[test]
    fn rows_are_byte_aligned() {
        let gray = [255, 255, 0, 255, 255, 255, 0, 0];
        let encoded = encode(&bitonal(4, &gray));
        // 13 bits for the first row, 6 for the second, each padded.
        assert_eq!(encoded.len(), 3);
        let rows = decode(&encoded, 4, 2);
        assert_eq!(rows[0], vec![true, true, false, true]);
        assert_eq!(rows[1], vec![true, true, false, false]);
    }

    #[test]
    fn long_runs_use_makeup_codes() {
        let width = 5200;
        let mut gray = vec![255u8; width];
        for px in gray.iter_mut().skip(100).take(2700) {
            *px = 0;
        }
        let encoded = encode(&bitonal(width as u32, &gray));
        let rows = decode(&encoded, width as u32, 1);
        let expected: Vec<bool> = gray.iter().map(|v| *v == 255).collect();
        assert_eq!(rows[0], expected);
    }
}
