//! OptPFD: per-block optimal patching, after Yan, Ding & Suel
//! (`Inverted index compression and query processing with optimized
//! document ordering`, WWW'09), with Simple16 as the secondary coder.
//!
//! Where [`crate::fastpfor`] amortizes exceptions over a whole page, OptPFD
//! spends more encoding effort per block: for every allowed width it prices
//! the Simple16-coded exception payload exactly and keeps the cheapest
//! total. Each block is self-contained: a header word, the Simple16 words,
//! then the packed low bits.

use std::fmt;

use itertools::izip;

use crate::bitpacking::{pack32, unpack32};
use crate::{bits, simple16, word, Error, IntegerCodec, BLOCK_SIZE};

const PAGE_SIZE: usize = 65536;

/// the allowed packed widths
const BITS: [usize; 17] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 16, 20, 32];

/// smallest index into [`BITS`] whose width covers a given exact width
const INVBITS: [usize; 33] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 14, 14, 15, 15, 15, 15, 16, 16, 16, 16, 16,
    16, 16, 16, 16, 16, 16, 16,
];

/// The OptPFD codec.
///
/// Owns a staging buffer for exception payloads, reused across calls but
/// carrying no state between them. Not safe to share across threads; give
/// each worker its own instance.
pub struct OptPFD {
    /// `2n` staged values per block: `n` exception high bits, then their
    /// `n` positions
    except_buffer: [u32; 2 * BLOCK_SIZE],
}

impl OptPFD {
    /// Codec with the fixed 65536-integer page.
    pub fn new() -> Self {
        OptPFD {
            except_buffer: [0; 2 * BLOCK_SIZE],
        }
    }

    /// Pick the width index for one block by total cost: packed low bits
    /// plus the exact Simple16 size of the staged exception payload.
    ///
    /// Returns `(besti, nexcept)`. Candidates below
    /// `BITS[INVBITS[maxbits]] - 28` are never tried because Simple16 tops
    /// out at 28-bit values; the all-exceptions case is skipped outright.
    /// Ties go to the later (wider) candidate, and width 32 with no
    /// exceptions is the baseline.
    fn best_b_from_data(&mut self, block: &[u32]) -> (usize, usize) {
        let mb = bits(block.iter().fold(0, |acc, &v| acc | v)) as usize;
        let mut mini = 0;
        if mini + 28 < BITS[INVBITS[mb]] {
            mini = BITS[INVBITS[mb]] - 28;
        }
        let mut besti = BITS.len() - 1;
        let mut bestcost = BITS[besti] * 4;
        let mut nexcept = 0;
        for i in mini..BITS.len() - 1 {
            let b = BITS[i];
            let count = block.iter().filter(|&&v| v >> b != 0).count();
            if count == BLOCK_SIZE {
                continue;
            }
            let mut c = 0;
            for (k, &v) in block.iter().enumerate() {
                if v >> b != 0 {
                    self.except_buffer[count + c] = k as u32;
                    self.except_buffer[c] = v >> b;
                    c += 1;
                }
            }
            let cost = b * 4 + simple16::estimate(&self.except_buffer[..2 * count]);
            if cost <= bestcost {
                bestcost = cost;
                besti = i;
                nexcept = count;
            }
        }
        (besti, nexcept)
    }

    fn encode_page(
        &mut self,
        input: &[u32],
        inpos: &mut usize,
        thissize: usize,
        output: &mut [u32],
        outpos: &mut usize,
    ) {
        let mut tmpoutpos = *outpos;
        let base = *inpos;
        for block in input[base..base + thissize].chunks_exact(BLOCK_SIZE) {
            let (besti, nexcept) = self.best_b_from_data(block);
            let b = BITS[besti];
            let mut exceptsize = 0;
            let headerpos = tmpoutpos;
            tmpoutpos += 1;
            if nexcept > 0 {
                let mut c = 0;
                for (k, &v) in block.iter().enumerate() {
                    if v >> b != 0 {
                        self.except_buffer[c + nexcept] = k as u32;
                        self.except_buffer[c] = v >> b;
                        c += 1;
                    }
                }
                exceptsize =
                    simple16::compress(&self.except_buffer[..2 * nexcept], &mut output[tmpoutpos..]);
                tmpoutpos += exceptsize;
            }
            output[headerpos] = (besti | (nexcept << 8) | (exceptsize << 16)) as u32;
            for group in block.chunks_exact(32) {
                pack32(group, &mut output[tmpoutpos..], b);
                tmpoutpos += b;
            }
        }
        *inpos += thissize;
        *outpos = tmpoutpos;
    }

    fn decode_page(
        &mut self,
        input: &[u32],
        inpos: &mut usize,
        output: &mut [u32],
        outpos: &mut usize,
        thissize: usize,
    ) -> Result<(), Error> {
        let mut tmpinpos = *inpos;
        let mut tmpoutpos = *outpos;
        for _ in 0..thissize / BLOCK_SIZE {
            let header = word(input, tmpinpos)?;
            tmpinpos += 1;
            let besti = (header & 0xFF) as usize;
            let nexcept = ((header >> 8) & 0xFF) as usize;
            let exceptsize = (header >> 16) as usize;
            if besti >= BITS.len() {
                return Err(Error::MalformedStream("width selector out of range"));
            }
            let b = BITS[besti];
            if nexcept > 127 {
                return Err(Error::MalformedStream("more than 127 exceptions in a block"));
            }
            if nexcept > 0 && b == 32 {
                return Err(Error::MalformedStream("exceptions above a 32-bit width"));
            }
            if tmpinpos + exceptsize > input.len() {
                return Err(Error::MalformedStream("exception payload past end of input"));
            }
            if nexcept > 0 {
                simple16::uncompress(
                    &input[tmpinpos..tmpinpos + exceptsize],
                    &mut self.except_buffer[..2 * nexcept],
                )?;
            }
            tmpinpos += exceptsize;
            if tmpinpos + 4 * b > input.len() {
                return Err(Error::MalformedStream("packed block past end of input"));
            }
            for k in (0..BLOCK_SIZE).step_by(32) {
                unpack32(&input[tmpinpos..], &mut output[tmpoutpos + k..], b);
                tmpinpos += b;
            }
            let (highs, positions) = self.except_buffer.split_at(nexcept);
            for (&high, &pos) in izip!(highs, &positions[..nexcept]) {
                let pos = pos as usize;
                if pos >= BLOCK_SIZE {
                    return Err(Error::MalformedStream("exception position out of block"));
                }
                output[tmpoutpos + pos] |= high << b;
            }
            tmpoutpos += BLOCK_SIZE;
        }
        *inpos = tmpinpos;
        *outpos = tmpoutpos;
        Ok(())
    }
}

impl IntegerCodec for OptPFD {
    fn compress(
        &mut self,
        input: &[u32],
        inpos: &mut usize,
        inlen: usize,
        output: &mut [u32],
        outpos: &mut usize,
    ) {
        let inlen = inlen / BLOCK_SIZE * BLOCK_SIZE;
        if inlen == 0 {
            return;
        }
        output[*outpos] = inlen as u32;
        *outpos += 1;
        let finalinpos = *inpos + inlen;
        while *inpos != finalinpos {
            let thissize = PAGE_SIZE.min(finalinpos - *inpos);
            self.encode_page(input, inpos, thissize, output, outpos);
        }
    }

    fn uncompress(
        &mut self,
        input: &[u32],
        inpos: &mut usize,
        inlen: usize,
        output: &mut [u32],
        outpos: &mut usize,
    ) -> Result<(), Error> {
        if inlen == 0 {
            return Ok(());
        }
        let nvalues = word(input, *inpos)? as usize;
        *inpos += 1;
        if nvalues % BLOCK_SIZE != 0 {
            return Err(Error::MalformedStream("value count not a multiple of 128"));
        }
        if *outpos + nvalues > output.len() {
            return Err(Error::MalformedStream("value count exceeds output buffer"));
        }
        let finalout = *outpos + nvalues;
        while *outpos != finalout {
            let thissize = PAGE_SIZE.min(finalout - *outpos);
            self.decode_page(input, inpos, output, outpos, thissize)?;
        }
        Ok(())
    }
}

impl Default for OptPFD {
    fn default() -> Self {
        OptPFD::new()
    }
}

impl fmt::Display for OptPFD {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OptPFD")
    }
}
