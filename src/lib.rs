//! Crate implementing patched frame-of-reference (PFOR) compression of integers
//! see `Decoding billions of integers per second through vectorization`,
//! <https://arxiv.org/abs/1209.2137>
//!
//! Two codecs are provided: [`fastpfor::FastPFOR`], a patching scheme designed
//! for speed which groups exception values per page, and [`optpfd::OptPFD`],
//! which picks a per-block optimal width and codes exceptions with Simple16.
//!
//! Both work on blocks of exactly 128 integers; input lengths are truncated
//! down to a multiple of 128 (chain a variable-byte codec for the tail).
//! Neither applies differential coding, so sorted inputs should be
//! delta-encoded beforehand.
#![deny(missing_docs)]
pub mod bitpacking;
pub mod fastpfor;
pub mod optpfd;
pub mod simple16;

use thiserror::Error;

/// Number of integers in a block, the unit of width selection and packing.
pub const BLOCK_SIZE: usize = 128;

/// Errors reported when decoding a compressed stream.
///
/// Compression cannot fail (its input is plain integers), so only
/// [`IntegerCodec::uncompress`] returns this: the decoders validate the
/// stream and report corruption instead of running off the provided slices.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The stream is inconsistent with the format; the message names the
    /// violated rule.
    #[error("malformed stream: {0}")]
    MalformedStream(&'static str),
}

/// read one word of the stream, turning an overrun into a decode error
pub(crate) fn word(input: &[u32], pos: usize) -> Result<u32, Error> {
    input
        .get(pos)
        .copied()
        .ok_or(Error::MalformedStream("unexpected end of input"))
}

/// Number of bits needed to represent `x` (0 for the value 0).
/// ```rust
/// use pfor::bits;
/// assert_eq!(bits(0), 0);
/// assert_eq!(bits(1), 1);
/// assert_eq!(bits(255), 8);
/// assert_eq!(bits(u32::MAX), 32);
/// ```
pub fn bits(x: u32) -> u32 {
    u32::BITS - x.leading_zeros()
}

/// round an integer to the next bigger multiple
/// ```rust
///  use pfor::round_to_multiple;
///  assert_eq!(round_to_multiple(10,10), 10);
///  assert_eq!(round_to_multiple(11,10), 20);
///  assert_eq!(round_to_multiple(6,5), 10);
/// ```
pub fn round_to_multiple(i: usize, multiple: usize) -> usize {
    ((i + multiple - 1) / multiple) * multiple
}

/// An integer codec: compresses `[u32]` slices into self-describing `[u32]`
/// streams and back, bit-exactly.
///
/// Input and output positions are explicit cursors advanced in place, so
/// codecs can be chained over the same buffers. A codec instance owns scratch
/// buffers that are reused across calls; it carries no semantic state between
/// calls but is **not** safe to share across threads (use one instance per
/// worker).
///
/// # Example
/// ```rust
/// use pfor::{fastpfor::FastPFOR, IntegerCodec};
/// let data: Vec<u32> = (0..1280).map(|x| x % 77).collect();
/// let mut codec = FastPFOR::default();
///
/// let mut compressed = vec![0_u32; data.len() + data.len() / 128 * 8 + 1024];
/// let (mut inpos, mut outpos) = (0, 0);
/// codec.compress(&data, &mut inpos, data.len(), &mut compressed, &mut outpos);
/// compressed.truncate(outpos);
///
/// let mut decoded = vec![0_u32; data.len()];
/// let (mut inpos, mut outpos) = (0, 0);
/// codec
///     .uncompress(&compressed, &mut inpos, compressed.len(), &mut decoded, &mut outpos)
///     .unwrap();
/// assert_eq!(decoded, data);
/// ```
pub trait IntegerCodec {
    /// Compress `inlen` values from `input[*inpos..]` into `output[*outpos..]`,
    /// advancing both cursors. `inlen` is rounded down to a multiple of 128;
    /// leftover tail values are neither consumed nor encoded. With fewer than
    /// 128 values nothing is written and the cursors stay put.
    ///
    /// The caller sizes `output`; `inlen + inlen / 128 * 8 + 1024` words are
    /// always enough. Running out of output space is a programming error and
    /// panics.
    fn compress(
        &mut self,
        input: &[u32],
        inpos: &mut usize,
        inlen: usize,
        output: &mut [u32],
        outpos: &mut usize,
    );

    /// Decompress from `input[*inpos..]` into `output[*outpos..]`, advancing
    /// both cursors. The number of values produced is read from the stream
    /// itself; `inlen` only distinguishes the empty input (compressing zero
    /// values writes zero words, and decoding zero words yields zero values).
    ///
    /// Corrupt streams are reported as [`Error::MalformedStream`]. A failed
    /// call leaves both cursors at an unspecified position.
    fn uncompress(
        &mut self,
        input: &[u32],
        inpos: &mut usize,
        inlen: usize,
        output: &mut [u32],
        outpos: &mut usize,
    ) -> Result<(), Error>;
}
