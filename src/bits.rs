/// MSB-first bit packer shared by the strip codecs.
pub(crate) struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    bits: u8,
}

impl BitWriter {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            acc: 0,
            bits: 0,
        }
    }

    /// Appends the low `width` bits of `code` (at most 16).
    pub(crate) fn put(&mut self, code: u16, width: u8) {
        self.acc = (self.acc << width) | (code as u32 & ((1 << width) - 1));
        self.bits += width;
        while self.bits >= 8 {
            self.bits -= 8;
            self.out.push((self.acc >> self.bits) as u8);
        }
        self.acc &= (1 << self.bits) - 1;
    }

    /// Pads with zero bits up to the next byte boundary.
    pub(crate) fn align(&mut self) {
        if self.bits > 0 {
            self.out.push((self.acc << (8 - self.bits)) as u8);
            self.acc = 0;
            self.bits = 0;
        }
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        self.align();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_msb_first_across_bytes() {
        let mut w = BitWriter::with_capacity(4);
        w.put(0b101, 3);
        w.put(0b1_1111_0000, 9);
        w.put(0b1, 1);
        assert_eq!(w.finish(), vec![0b1011_1111, 0b0000_1000]);
    }

    #[test]
    fn align_pads_with_zeros() {
        let mut w = BitWriter::with_capacity(2);
        w.put(0b11, 2);
        w.align();
        w.put(0xFF, 8);
        w.align();
        assert_eq!(w.finish(), vec![0b1100_0000, 0xFF]);
    }
}
