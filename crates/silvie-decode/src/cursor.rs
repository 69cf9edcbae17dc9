//! Sequential little/big-endian reader over memory or any `Read`.
//!
//! Reads only move forward. A read that cannot be satisfied fails with
//! [`DecodeError::Truncated`] and leaves the position where it was, so the
//! caller never observes a half-decoded value. A streaming source cannot give
//! back bytes it already handed out, so after a truncated stream read the
//! cursor keeps failing with that same error.

use std::io::{self, Read};

use glam::Vec3;

use crate::error::{DecodeError, DecodeResult};

/// Upper bound on speculative pre-allocation when the source length is unknown.
const UNKNOWN_LENGTH_CAPACITY: usize = 4096;

/// Something the cursor can pull bytes from.
pub trait ByteSource {
    /// Fill `buf` completely or fail with `UnexpectedEof` without consuming
    /// anything the caller can observe.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Bytes left, when the source knows its length.
    fn remaining(&self) -> Option<usize>;
}

/// In-memory byte source.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl ByteSource for SliceSource<'_> {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let end = self
            .pos
            .checked_add(buf.len())
            .filter(|&end| end <= self.bytes.len())
            .ok_or(io::ErrorKind::UnexpectedEof)?;
        buf.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.bytes.len() - self.pos)
    }
}

/// Streaming byte source over any reader (typically a buffered file).
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.reader.read_exact(buf)
    }

    fn remaining(&self) -> Option<usize> {
        None
    }
}

/// Per-read byte transform: receives the stream offset of the first byte and
/// the freshly read bytes, which it may rewrite in place.
pub type Transform = Box<dyn FnMut(usize, &mut [u8])>;

/// Positioned reader with explicit-endianness primitive decoding.
pub struct Cursor<S> {
    source: S,
    pos: usize,
    transform: Option<Transform>,
    /// `(offset, requested)` of a truncated stream read.
    failed: Option<(usize, usize)>,
}

impl<'a> Cursor<SliceSource<'a>> {
    /// Cursor over an in-memory buffer.
    #[must_use]
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self::new(SliceSource { bytes, pos: 0 })
    }
}

impl<R: Read> Cursor<ReaderSource<R>> {
    /// Cursor over a reader. Wrap files in a `BufReader`.
    pub fn from_reader(reader: R) -> Self {
        Self::new(ReaderSource { reader })
    }
}

impl<S: ByteSource> Cursor<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            pos: 0,
            transform: None,
            failed: None,
        }
    }

    /// Install a transform invoked after every read.
    #[must_use]
    pub fn with_transform(mut self, transform: impl FnMut(usize, &mut [u8]) + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Number of bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left in the source, if known.
    #[must_use]
    pub fn remaining(&self) -> Option<usize> {
        self.source.remaining()
    }

    /// How many elements of `element_size` bytes are worth reserving for a
    /// declared `count`. Bogus counts in corrupt files must not turn into
    /// huge allocations before the read fails.
    #[must_use]
    pub fn capacity_hint(&self, count: usize, element_size: usize) -> usize {
        match self.source.remaining() {
            Some(remaining) => count.min(remaining / element_size.max(1)),
            None => count.min(UNKNOWN_LENGTH_CAPACITY),
        }
    }

    /// Fill `buf` from the stream.
    pub fn read_into(&mut self, buf: &mut [u8]) -> DecodeResult<()> {
        self.check_failed()?;
        if let Err(e) = self.source.read_exact(buf) {
            return Err(self.read_error(e, self.pos, buf.len()));
        }
        self.advance(buf);
        Ok(())
    }

    fn check_failed(&self) -> DecodeResult<()> {
        match self.failed {
            Some((offset, requested)) => Err(DecodeError::Truncated { offset, requested }),
            None => Ok(()),
        }
    }

    /// Map a source error for a read of `requested` bytes at `offset`.
    fn read_error(&mut self, error: io::Error, offset: usize, requested: usize) -> DecodeError {
        if error.kind() != io::ErrorKind::UnexpectedEof {
            return DecodeError::Io(error);
        }
        if self.source.remaining().is_none() {
            self.failed = Some((offset, requested));
        }
        DecodeError::Truncated { offset, requested }
    }

    fn advance(&mut self, buf: &mut [u8]) {
        if let Some(transform) = self.transform.as_mut() {
            transform(self.pos, buf);
        }
        self.pos += buf.len();
    }

    fn read_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut buf = [0; N];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Read `len` bytes into a new buffer.
    pub fn read_bytes(&mut self, len: usize) -> DecodeResult<Vec<u8>> {
        if let Some(remaining) = self.source.remaining() {
            if len > remaining {
                return Err(DecodeError::Truncated {
                    offset: self.pos,
                    requested: len,
                });
            }
            let mut buf = vec![0; len];
            self.read_into(&mut buf)?;
            return Ok(buf);
        }

        // Unknown length: grow as data actually arrives.
        self.check_failed()?;
        let start = self.pos;
        let mut buf = Vec::with_capacity(len.min(UNKNOWN_LENGTH_CAPACITY));
        let mut block = [0; UNKNOWN_LENGTH_CAPACITY];
        while buf.len() < len {
            let take = (len - buf.len()).min(block.len());
            if let Err(e) = self.source.read_exact(&mut block[..take]) {
                self.pos = start;
                return Err(self.read_error(e, start, len));
            }
            self.advance(&mut block[..take]);
            buf.extend_from_slice(&block[..take]);
        }
        Ok(buf)
    }

    /// Consume and discard `len` bytes.
    pub fn skip(&mut self, len: usize) -> DecodeResult<()> {
        self.read_bytes(len).map(drop)
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        self.read_array::<1>().map(|[b]| b)
    }

    pub fn read_i8(&mut self) -> DecodeResult<i8> {
        self.read_array().map(i8::from_le_bytes)
    }

    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> DecodeResult<i16> {
        self.read_array().map(i16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_u16_be(&mut self) -> DecodeResult<u16> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_i16_be(&mut self) -> DecodeResult<i16> {
        self.read_array().map(i16::from_be_bytes)
    }

    pub fn read_u32_be(&mut self) -> DecodeResult<u32> {
        self.read_array().map(u32::from_be_bytes)
    }

    pub fn read_i32_be(&mut self) -> DecodeResult<i32> {
        self.read_array().map(i32::from_be_bytes)
    }

    /// Little-endian IEEE-754 single, decoded by hand.
    pub fn read_f32(&mut self) -> DecodeResult<f32> {
        self.read_array().map(f32_from_le_bytes)
    }

    /// Big-endian IEEE-754 single, decoded by hand.
    pub fn read_f32_be(&mut self) -> DecodeResult<f32> {
        self.read_array::<4>().map(|mut bytes| {
            bytes.reverse();
            f32_from_le_bytes(bytes)
        })
    }

    pub fn read_vec3(&mut self) -> DecodeResult<Vec3> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_f32_array(&mut self, count: usize) -> DecodeResult<Vec<f32>> {
        let mut values = Vec::with_capacity(self.capacity_hint(count, 4));
        for _ in 0..count {
            values.push(self.read_f32()?);
        }
        Ok(values)
    }

    pub fn read_u32_array(&mut self, count: usize) -> DecodeResult<Vec<u32>> {
        let mut values = Vec::with_capacity(self.capacity_hint(count, 4));
        for _ in 0..count {
            values.push(self.read_u32()?);
        }
        Ok(values)
    }

    pub fn read_i32_array(&mut self, count: usize) -> DecodeResult<Vec<i32>> {
        let mut values = Vec::with_capacity(self.capacity_hint(count, 4));
        for _ in 0..count {
            values.push(self.read_i32()?);
        }
        Ok(values)
    }

    pub fn read_vec3_array(&mut self, count: usize) -> DecodeResult<Vec<Vec3>> {
        let mut values = Vec::with_capacity(self.capacity_hint(count, 12));
        for _ in 0..count {
            values.push(self.read_vec3()?);
        }
        Ok(values)
    }

    /// Null-terminated byte string, terminator consumed but not returned.
    /// The bytes are handed back raw; their encoding is format specific.
    pub fn read_cstr(&mut self) -> DecodeResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(32);
        loop {
            match self.read_u8()? {
                0 => return Ok(bytes),
                b => bytes.push(b),
            }
        }
    }
}

/// Rebuild an IEEE-754 single from its little-endian bytes without
/// reinterpreting memory: sign, biased exponent and mantissa are pulled apart
/// and recombined arithmetically.
///
/// NaNs keep their sign but come back as the canonical quiet NaN; the
/// payload bits are not carried over.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_from_le_bytes(bytes: [u8; 4]) -> f32 {
    let sign = if bytes[3] & 0x80 == 0 { 1.0 } else { -1.0 };
    let exponent = (i32::from(bytes[3] & 0x7f) << 1) | i32::from(bytes[2] >> 7);
    let mantissa =
        (u32::from(bytes[2] & 0x7f) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[0]);
    let fraction = f64::from(mantissa) / f64::from(1_u32 << 23);

    let magnitude = match exponent {
        // Zero and subnormals.
        0 => fraction * 2_f64.powi(-126),
        0xff if mantissa == 0 => f64::INFINITY,
        0xff => return f32::NAN.copysign(if sign < 0.0 { -1.0 } else { 1.0 }),
        _ => (fraction + 1.0) * 2_f64.powi(exponent - 127),
    };
    (sign * magnitude) as f32
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn integers_respect_endianness() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0xff, 0xfe, 0x12, 0x34];
        let mut cursor = Cursor::from_slice(&bytes);
        assert_eq!(cursor.read_u32().unwrap(), 0x0403_0201);
        assert_eq!(cursor.read_i16().unwrap(), -257);
        assert_eq!(cursor.read_u16_be().unwrap(), 0x1234);
        assert_eq!(cursor.position(), 8);
        assert_eq!(cursor.remaining(), Some(0));

        let mut cursor = Cursor::from_slice(&bytes);
        assert_eq!(cursor.read_u32_be().unwrap(), 0x0102_0304);
        assert_eq!(cursor.read_i32_be().unwrap(), 0xfffe_1234_u32 as i32);
    }

    #[test]
    fn truncated_read_keeps_position() {
        let bytes = [1, 2, 3];
        let mut cursor = Cursor::from_slice(&bytes);
        assert_eq!(cursor.read_u8().unwrap(), 1);

        let err = cursor.read_u32().unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                offset: 1,
                requested: 4
            }
        ));
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 0x0302);
    }

    #[test]
    fn oversized_byte_run_fails_before_allocating() {
        let bytes = [0; 16];
        let mut cursor = Cursor::from_slice(&bytes);
        assert!(matches!(
            cursor.read_bytes(usize::MAX),
            Err(DecodeError::Truncated { offset: 0, .. })
        ));
        assert_eq!(cursor.capacity_hint(1_000_000, 4), 4);
    }

    #[test]
    fn transform_sees_offsets_after_every_read() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let bytes = [0x10 ^ 0xaa, 0x20 ^ 0xaa, 0x30 ^ 0xaa];
        let mut cursor = Cursor::from_slice(&bytes).with_transform(move |offset, buf| {
            log.borrow_mut().push((offset, buf.len()));
            for b in buf {
                *b ^= 0xaa;
            }
        });

        assert_eq!(cursor.read_u8().unwrap(), 0x10);
        assert_eq!(cursor.read_u16().unwrap(), 0x3020);
        assert_eq!(*seen.borrow(), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn reader_source_behaves_like_slice() {
        let bytes = b"CHR\0\x2a\x00\x00\x00".to_vec();
        let mut cursor = Cursor::from_reader(io::Cursor::new(bytes));
        assert_eq!(cursor.read_cstr().unwrap(), b"CHR");
        assert_eq!(cursor.read_u32().unwrap(), 42);
        assert_eq!(cursor.remaining(), None);
        assert!(matches!(
            cursor.read_u8(),
            Err(DecodeError::Truncated { offset: 8, .. })
        ));
    }

    #[test]
    fn reader_source_reads_long_runs_in_blocks() {
        let bytes: Vec<u8> = (0..10_000_u32).map(|i| (i % 251) as u8).collect();
        let mut cursor = Cursor::from_reader(io::Cursor::new(bytes.clone()));
        assert_eq!(cursor.read_bytes(9_000).unwrap(), bytes[..9_000]);
        cursor.skip(1_000).unwrap();
        assert_eq!(cursor.position(), 10_000);
    }

    #[test]
    fn truncated_stream_run_reports_whole_request() {
        let mut cursor = Cursor::from_reader(io::Cursor::new(vec![7_u8; 5_000]));
        let err = cursor.read_bytes(9_000).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                offset: 0,
                requested: 9_000
            }
        ));
        assert_eq!(cursor.position(), 0);

        // The partial block is gone from the reader, so the failure sticks.
        assert!(matches!(
            cursor.read_u8(),
            Err(DecodeError::Truncated {
                offset: 0,
                requested: 9_000
            })
        ));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn truncated_stream_read_stays_failed() {
        let bytes = [1_u8, 2, 3];
        let mut cursor = Cursor::from_reader(&bytes[..]);
        assert!(matches!(
            cursor.read_u32(),
            Err(DecodeError::Truncated {
                offset: 0,
                requested: 4
            })
        ));
        assert_eq!(cursor.position(), 0);
        assert!(matches!(
            cursor.read_u8(),
            Err(DecodeError::Truncated {
                offset: 0,
                requested: 4
            })
        ));
    }

    #[test]
    fn float_reference_patterns() {
        let patterns: [u32; 6] = [
            0x0000_0000, // 0.0
            0x8000_0000, // -0.0
            0x3f80_0000, // 1.0
            0x0000_0001, // smallest subnormal
            0x7f80_0000, // +inf
            0xff80_0000, // -inf
        ];
        for bits in patterns {
            let ours = f32_from_le_bytes(bits.to_le_bytes());
            assert_eq!(ours.to_bits(), bits, "pattern {bits:#010x}");
        }
        assert!(f32_from_le_bytes(0x7fc0_0000_u32.to_le_bytes()).is_nan());
        assert!(f32_from_le_bytes(0xffff_ffff_u32.to_le_bytes()).is_nan());
    }

    #[test]
    fn nan_keeps_its_sign() {
        let negative = f32_from_le_bytes(0xffc0_0000_u32.to_le_bytes());
        assert!(negative.is_nan() && negative.is_sign_negative());
        let signalling = f32_from_le_bytes(0x7f80_0001_u32.to_le_bytes());
        assert!(signalling.is_nan() && signalling.is_sign_positive());
    }

    #[test]
    fn big_endian_float() {
        let bytes = (-2.5_f32).to_be_bytes();
        let mut cursor = Cursor::from_slice(&bytes);
        assert_eq!(cursor.read_f32_be().unwrap(), -2.5);
    }

    proptest! {
        #[test]
        fn float_matches_native_interpretation(bits in any::<u32>()) {
            let native = f32::from_bits(bits);
            let ours = f32_from_le_bytes(bits.to_le_bytes());
            if native.is_nan() {
                prop_assert!(ours.is_nan());
            } else {
                prop_assert_eq!(ours.to_bits(), bits);
            }
        }
    }
}
