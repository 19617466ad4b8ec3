//! Deterministic, length-prefixed binary serialization.
//!
//! This is the wire and on-disk format shared by every domain type in the
//! workspace: transactions, blocks, peer messages, and persisted snapshots.
//! It is hand-rolled rather than delegated to `serde`/`bincode` because its
//! byte layout *is* the specification — block and transaction hashes are
//! computed over it, so any ambiguity here (trailing padding, varint vs.
//! fixed width, map iteration order) would make two otherwise-identical
//! nodes disagree about a hash.
//!
//! Primitive encodings:
//! * Unsigned integers — fixed-width little-endian.
//! * Bytes/strings — `u32` length prefix, then raw bytes.
//! * Fixed-size arrays — raw bytes, no length prefix.
//! * Sequences — `u32` count, then concatenated element encodings.
//! * Options — `u8` tag (0 = absent, 1 = present) then the value.
//!
//! `decode(encode(v)) == v` for every type in this crate that implements
//! [`Encode`]/[`Decode`]; this is the property the rest of the crate leans
//! on for hashing and for wire/disk round-trips.

use std::collections::HashSet;
use std::hash::Hash as StdHash;

use thiserror::Error;

/// Errors produced while reading from an [`IArchive`].
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum ArchiveError {
    /// The buffer ended before the expected value could be read.
    #[error("archive truncated")]
    Truncated,

    /// The archive was expected to be fully consumed but bytes remained.
    #[error("trailing garbage after decode")]
    TrailingGarbage,

    /// An enum tag did not match any known variant.
    #[error("unknown enum variant {0}")]
    UnknownVariant(u8),

    /// A set-typed sequence contained a duplicate element.
    #[error("duplicate element in set")]
    DuplicateInSet,

    /// A length prefix claimed more bytes than remain in the buffer.
    #[error("length prefix exceeds remaining buffer")]
    LengthOverflow,
}

pub type Result<T> = core::result::Result<T, ArchiveError>;

/// A growable output buffer that domain types serialize into.
#[derive(Debug, Default, Clone)]
pub struct OArchive {
    buf: Vec<u8>,
}

impl OArchive {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a fixed-size byte array with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes `u32` length followed by the raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(if v { 1 } else { 0 });
    }

    pub fn write_option<T>(&mut self, v: &Option<T>, write_inner: impl FnOnce(&mut Self, &T)) {
        match v {
            Some(inner) => {
                self.write_u8(1);
                write_inner(self, inner);
            }
            None => self.write_u8(0),
        }
    }

    /// Writes a `u32` count followed by each element's encoding.
    pub fn write_seq<T>(&mut self, items: &[T], mut write_item: impl FnMut(&mut Self, &T)) {
        self.write_u32(items.len() as u32);
        for item in items {
            write_item(self, item);
        }
    }
}

/// An immutable byte buffer with a read cursor.
#[derive(Debug, Clone, Copy)]
pub struct IArchive<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> IArchive<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Errors with [`ArchiveError::TrailingGarbage`] if bytes remain.
    pub fn finish(self) -> Result<()> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(ArchiveError::TrailingGarbage)
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ArchiveError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        if len > self.remaining() {
            return Err(ArchiveError::LengthOverflow);
        }
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_str(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| ArchiveError::Truncated)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ArchiveError::UnknownVariant(other)),
        }
    }

    pub fn read_option<T>(&mut self, read_inner: impl FnOnce(&mut Self) -> Result<T>) -> Result<Option<T>> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(read_inner(self)?)),
            other => Err(ArchiveError::UnknownVariant(other)),
        }
    }

    /// Reads a `u32` count then that many elements.
    pub fn read_seq<T>(&mut self, mut read_item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let count = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            out.push(read_item(self)?);
        }
        Ok(out)
    }

    /// Reads a sequence, rejecting duplicate keys (as produced by `key_of`).
    pub fn read_set<T, K: StdHash + Eq>(
        &mut self,
        mut read_item: impl FnMut(&mut Self) -> Result<T>,
        key_of: impl Fn(&T) -> K,
    ) -> Result<Vec<T>> {
        let count = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(count.min(1 << 20));
        let mut seen = HashSet::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            let item = read_item(self)?;
            if !seen.insert(key_of(&item)) {
                return Err(ArchiveError::DuplicateInSet);
            }
            out.push(item);
        }
        Ok(out)
    }
}

/// Implemented by every domain type that participates in the wire/disk
/// format. Kept as a pair of free functions rather than a trait method on
/// most call sites because several types (e.g. [`crate::transaction::Transaction`])
/// need to serialize a header subset distinct from the full value.
pub trait Encode {
    fn encode(&self, oa: &mut OArchive);
}

pub trait Decode: Sized {
    fn decode(ia: &mut IArchive) -> Result<Self>;
}

impl Encode for [u8; 32] {
    fn encode(&self, oa: &mut OArchive) {
        oa.write_raw(self);
    }
}

impl Decode for [u8; 32] {
    fn decode(ia: &mut IArchive) -> Result<Self> {
        let bytes = ia.read_raw(32)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

impl Encode for [u8; 20] {
    fn encode(&self, oa: &mut OArchive) {
        oa.write_raw(self);
    }
}

impl Decode for [u8; 20] {
    fn decode(ia: &mut IArchive) -> Result<Self> {
        let bytes = ia.read_raw(20)?;
        let mut out = [0u8; 20];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

impl Encode for primitive_types::U256 {
    fn encode(&self, oa: &mut OArchive) {
        let mut buf = [0u8; 32];
        self.to_big_endian(&mut buf);
        oa.write_raw(&buf);
    }
}

impl Decode for primitive_types::U256 {
    fn decode(ia: &mut IArchive) -> Result<Self> {
        let bytes = ia.read_raw(32)?;
        Ok(primitive_types::U256::from_big_endian(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_round_trip() {
        let mut oa = OArchive::new();
        oa.write_u8(7);
        oa.write_u16(1000);
        oa.write_u32(1_000_000);
        oa.write_u64(u64::MAX);
        let bytes = oa.into_bytes();

        let mut ia = IArchive::new(&bytes);
        assert_eq!(ia.read_u8().unwrap(), 7);
        assert_eq!(ia.read_u16().unwrap(), 1000);
        assert_eq!(ia.read_u32().unwrap(), 1_000_000);
        assert_eq!(ia.read_u64().unwrap(), u64::MAX);
        ia.finish().unwrap();
    }

    #[test]
    fn bytes_and_str_round_trip() {
        let mut oa = OArchive::new();
        oa.write_bytes(b"hello");
        oa.write_str("world");
        let bytes = oa.into_bytes();

        let mut ia = IArchive::new(&bytes);
        assert_eq!(ia.read_bytes().unwrap(), b"hello".to_vec());
        assert_eq!(ia.read_str().unwrap(), "world");
        ia.finish().unwrap();
    }

    #[test]
    fn option_round_trip() {
        let mut oa = OArchive::new();
        oa.write_option(&Some(42u32), |oa, v| oa.write_u32(*v));
        oa.write_option(&None::<u32>, |oa, v| oa.write_u32(*v));
        let bytes = oa.into_bytes();

        let mut ia = IArchive::new(&bytes);
        assert_eq!(ia.read_option(|ia| ia.read_u32()).unwrap(), Some(42));
        assert_eq!(ia.read_option(|ia| ia.read_u32()).unwrap(), None);
        ia.finish().unwrap();
    }

    #[test]
    fn truncated_read_errors() {
        let bytes = [0u8; 2];
        let mut ia = IArchive::new(&bytes);
        assert_eq!(ia.read_u32(), Err(ArchiveError::Truncated));
    }

    #[test]
    fn trailing_garbage_detected() {
        let mut oa = OArchive::new();
        oa.write_u8(1);
        oa.write_u8(2);
        let bytes = oa.into_bytes();
        let mut ia = IArchive::new(&bytes);
        ia.read_u8().unwrap();
        assert_eq!(ia.finish(), Err(ArchiveError::TrailingGarbage));
    }

    #[test]
    fn length_overflow_rejected() {
        let mut oa = OArchive::new();
        oa.write_u32(1000);
        oa.write_raw(&[1, 2, 3]);
        let bytes = oa.into_bytes();
        let mut ia = IArchive::new(&bytes);
        assert_eq!(ia.read_bytes(), Err(ArchiveError::LengthOverflow));
    }

    #[test]
    fn duplicate_set_rejected() {
        let mut oa = OArchive::new();
        oa.write_seq(&[1u32, 1u32], |oa, v| oa.write_u32(*v));
        let bytes = oa.into_bytes();
        let mut ia = IArchive::new(&bytes);
        let result = ia.read_set(|ia| ia.read_u32(), |v| *v);
        assert_eq!(result, Err(ArchiveError::DuplicateInSet));
    }
}
