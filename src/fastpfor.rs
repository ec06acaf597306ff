//! FastPFOR: a patching scheme designed for speed.
//!
//! Integers are encoded in blocks of 128 within pages of up to 65536. Each
//! block stores the low `b` bits of all values bit-packed; values needing
//! more bits ("exceptions") have their high bits collected per page,
//! bucketed by how many bits they need, and bit-packed once per bucket at
//! the end of the page. The per-block metadata (width, exception count and
//! positions) lives in a little-endian byte container between the packed
//! low bits and the buckets.
//!
//! see Lemire & Boytsov, `Decoding billions of integers per second through
//! vectorization`, <https://arxiv.org/abs/1209.2137>

use std::fmt;

use itertools::izip;

use crate::bitpacking::{pack32, unpack32};
use crate::{bits, round_to_multiple, word, Error, IntegerCodec, BLOCK_SIZE};

/// amortized cost in bits of storing one exception's position
const OVERHEAD_OF_EACH_EXCEPT: usize = 8;

/// Default number of integers per page.
pub const DEFAULT_PAGE_SIZE: usize = 65536;

/// The FastPFOR codec.
///
/// Owns its scratch buffers (exception buckets, the page byte container),
/// which are reused across calls but carry no state between them. Not safe
/// to share across threads; give each worker its own instance.
///
/// Compressed streams are only decodable with the same page size they were
/// encoded with.
pub struct FastPFOR {
    page_size: usize,
    /// exception high bits collected per page, bucketed by `maxb - b`
    /// (bucket 0 stays empty: a block with `b = maxb` has no exceptions)
    data_to_be_packed: [Vec<u32>; 33],
    /// per-block metadata bytes, reinterpreted as little-endian words on
    /// the wire
    byte_container: Vec<u8>,
    /// write cursors into the buckets while encoding, read cursors while
    /// decoding
    data_pointers: [usize; 33],
}

impl FastPFOR {
    /// Codec for pages of `page_size` integers (any multiple of 128; for
    /// expert use, the default is right for most workloads).
    ///
    /// # Panics
    /// If `page_size` is zero or not a multiple of 128.
    pub fn new(page_size: usize) -> Self {
        assert!(
            page_size > 0 && page_size % BLOCK_SIZE == 0,
            "page size must be a positive multiple of 128"
        );
        // initial bucket capacity is a heuristic; buckets grow on demand
        let bucket_size = round_to_multiple(page_size / 32 * 4, 32);
        FastPFOR {
            page_size,
            data_to_be_packed: std::array::from_fn(|k| {
                if k == 0 {
                    Vec::new()
                } else {
                    vec![0; bucket_size]
                }
            }),
            byte_container: Vec::with_capacity(3 * page_size / BLOCK_SIZE + page_size),
            data_pointers: [0; 33],
        }
    }

    fn encode_page(
        &mut self,
        input: &[u32],
        inpos: &mut usize,
        thissize: usize,
        output: &mut [u32],
        outpos: &mut usize,
    ) {
        let headerpos = *outpos;
        let mut tmpoutpos = headerpos + 1;

        self.data_pointers.fill(0);
        self.byte_container.clear();

        let base = *inpos;
        for block in input[base..base + thissize].chunks_exact(BLOCK_SIZE) {
            let (b, cexcept, maxb) = best_b_from_data(block);
            self.byte_container.push(b as u8);
            self.byte_container.push(cexcept as u8);
            if cexcept > 0 {
                self.byte_container.push(maxb as u8);
                let index = maxb - b;
                let needed = self.data_pointers[index] + cexcept;
                if round_to_multiple(needed, 32) > self.data_to_be_packed[index].len() {
                    let newsize = round_to_multiple(2 * needed, 32);
                    self.data_to_be_packed[index].resize(newsize, 0);
                }
                for (k, &v) in block.iter().enumerate() {
                    if v >> b != 0 {
                        // exception: position byte here, high bits to the bucket
                        self.byte_container.push(k as u8);
                        self.data_to_be_packed[index][self.data_pointers[index]] = v >> b;
                        self.data_pointers[index] += 1;
                    }
                }
            }
            for group in block.chunks_exact(32) {
                pack32(group, &mut output[tmpoutpos..], b);
                tmpoutpos += b;
            }
        }
        *inpos += thissize;
        output[headerpos] = (tmpoutpos - headerpos) as u32;

        let bytesize = self.byte_container.len();
        while self.byte_container.len() % 4 != 0 {
            self.byte_container.push(0);
        }
        output[tmpoutpos] = bytesize as u32;
        tmpoutpos += 1;
        for chunk in self.byte_container.chunks_exact(4) {
            output[tmpoutpos] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            tmpoutpos += 1;
        }

        let mut bitmap = 0_u32;
        for k in 1..=32 {
            if self.data_pointers[k] != 0 {
                bitmap |= 1 << (k - 1);
            }
        }
        output[tmpoutpos] = bitmap;
        tmpoutpos += 1;

        for k in 1..=32 {
            let size = self.data_pointers[k];
            if size == 0 {
                continue;
            }
            output[tmpoutpos] = size as u32;
            tmpoutpos += 1;
            let padded = round_to_multiple(size, 32);
            // zero the ragged tail so output only depends on the input
            self.data_to_be_packed[k][size..padded].fill(0);
            for group in self.data_to_be_packed[k][..padded].chunks_exact(32) {
                pack32(group, &mut output[tmpoutpos..], k);
                tmpoutpos += k;
            }
        }
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
        let initpos = *inpos;
        let wheremeta = word(input, initpos)? as usize;
        *inpos += 1;
        let mut inexcept = initpos + wheremeta;

        let bytesize = word(input, inexcept)? as usize;
        inexcept += 1;
        let metawords = bytesize.div_ceil(4);
        if inexcept + metawords > input.len() {
            return Err(Error::MalformedStream("metadata bytes past end of input"));
        }
        self.byte_container.clear();
        for &w in &input[inexcept..inexcept + metawords] {
            self.byte_container.extend_from_slice(&w.to_le_bytes());
        }
        inexcept += metawords;

        let bitmap = word(input, inexcept)?;
        inexcept += 1;
        for k in 1..=32_usize {
            if bitmap & (1 << (k - 1)) == 0 {
                continue;
            }
            let size = word(input, inexcept)? as usize;
            inexcept += 1;
            let padded = round_to_multiple(size, 32);
            if inexcept + padded / 32 * k > input.len() {
                return Err(Error::MalformedStream("exception bucket past end of input"));
            }
            if self.data_to_be_packed[k].len() < padded {
                self.data_to_be_packed[k].resize(padded, 0);
            }
            for j in (0..padded).step_by(32) {
                unpack32(&input[inexcept..], &mut self.data_to_be_packed[k][j..], k);
                inexcept += k;
            }
        }

        // bucket cursors restart from the front for this page
        self.data_pointers.fill(0);
        let mut bpos = 0;
        let mut tmpoutpos = *outpos;
        let mut tmpinpos = *inpos;

        for _ in 0..thissize / BLOCK_SIZE {
            if bpos + 2 > self.byte_container.len() {
                return Err(Error::MalformedStream("block header past metadata"));
            }
            let b = self.byte_container[bpos] as usize;
            let cexcept = self.byte_container[bpos + 1] as usize;
            bpos += 2;
            if b > 32 {
                return Err(Error::MalformedStream("packed width above 32 bits"));
            }
            if tmpinpos + 4 * b > input.len() {
                return Err(Error::MalformedStream("packed block past end of input"));
            }
            for k in (0..BLOCK_SIZE).step_by(32) {
                unpack32(&input[tmpinpos..], &mut output[tmpoutpos + k..], b);
                tmpinpos += b;
            }
            if cexcept > 0 {
                if cexcept > 127 {
                    return Err(Error::MalformedStream("more than 127 exceptions in a block"));
                }
                if bpos + 1 + cexcept > self.byte_container.len() {
                    return Err(Error::MalformedStream("exception positions past metadata"));
                }
                let maxb = self.byte_container[bpos] as usize;
                bpos += 1;
                if maxb > 32 || maxb <= b {
                    return Err(Error::MalformedStream("exception width out of range"));
                }
                let index = maxb - b;
                let dp = self.data_pointers[index];
                if dp + cexcept > self.data_to_be_packed[index].len() {
                    return Err(Error::MalformedStream("exception bucket exhausted"));
                }
                let positions = &self.byte_container[bpos..bpos + cexcept];
                let highs = &self.data_to_be_packed[index][dp..dp + cexcept];
                for (&pos, &high) in izip!(positions, highs) {
                    let pos = pos as usize;
                    if pos >= BLOCK_SIZE {
                        return Err(Error::MalformedStream("exception position out of block"));
                    }
                    output[tmpoutpos + pos] |= high << b;
                }
                bpos += cexcept;
                self.data_pointers[index] += cexcept;
            }
            tmpoutpos += BLOCK_SIZE;
        }
        *outpos = tmpoutpos;
        *inpos = inexcept;
        Ok(())
    }
}

/// Pick the packed width for one block by cost over the bit-width histogram.
///
/// Returns `(b, cexcept, maxb)`: chosen width, exception count, and the
/// width the largest value actually needs. Cost of a candidate width is
/// position overhead plus bucket bits for each exception, plus the packed
/// low bits, plus one byte for storing `maxb`; ties keep the larger width.
/// The descent stops before the exception count could exceed 127 (it must
/// fit a byte, with 128 reserved as impossible).
fn best_b_from_data(block: &[u32]) -> (usize, usize, usize) {
    let mut freqs = [0_usize; 33];
    for &v in block {
        freqs[bits(v) as usize] += 1;
    }
    let mut maxb = 32;
    while freqs[maxb] == 0 {
        maxb -= 1;
    }
    let mut best_b = maxb;
    let mut best_cexcept = 0;
    let mut best_cost = maxb * BLOCK_SIZE;
    let mut cexcept = 0;
    for b in (0..maxb).rev() {
        cexcept += freqs[b + 1];
        if cexcept > 127 {
            break;
        }
        let cost = cexcept * OVERHEAD_OF_EACH_EXCEPT + cexcept * (maxb - b) + b * BLOCK_SIZE + 8;
        if cost < best_cost {
            best_cost = cost;
            best_b = b;
            best_cexcept = cexcept;
        }
    }
    (best_b, best_cexcept, maxb)
}

impl IntegerCodec for FastPFOR {
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
            let thissize = self.page_size.min(finalinpos - *inpos);
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
            let thissize = self.page_size.min(finalout - *outpos);
            self.decode_page(input, inpos, output, outpos, thissize)?;
        }
        Ok(())
    }
}

impl Default for FastPFOR {
    fn default() -> Self {
        FastPFOR::new(DEFAULT_PAGE_SIZE)
    }
}

impl fmt::Display for FastPFOR {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FastPFOR")
    }
}
