// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Little-endian cursor for the historical bincode-layout structures:
//! fixed-width integers, `u64`-length-prefixed sequences and strings,
//! `u8`-tagged options and `u32`-tagged enums. There is no ecosystem crate
//! for these layouts; the decoder below is the explicit reading of them.

use super::SolanaError;

pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], SolanaError> {
        let out = self
            .buf
            .get(self.pos..self.pos.checked_add(n).ok_or(SolanaError::Truncated(self.pos))?)
            .ok_or(SolanaError::Truncated(self.pos))?;
        self.pos += n;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], SolanaError> {
        Ok(self.bytes(N)?.try_into().expect("exact length"))
    }

    pub fn u8(&mut self) -> Result<u8, SolanaError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, SolanaError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, SolanaError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, SolanaError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64, SolanaError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> Result<f64, SolanaError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    pub fn bool(&mut self) -> Result<bool, SolanaError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SolanaError::malformed("bool", other)),
        }
    }

    /// `u64`-length-prefixed sequence length, sanity-capped against the
    /// remaining input so corrupt prefixes cannot trigger huge allocations.
    pub fn seq_len(&mut self) -> Result<usize, SolanaError> {
        let len = self.u64()?;
        if len > self.remaining() as u64 {
            return Err(SolanaError::malformed(
                "sequence",
                format!("declares {len} elements with {} bytes left", self.remaining()),
            ));
        }
        Ok(len as usize)
    }

    pub fn byte_vec(&mut self) -> Result<Vec<u8>, SolanaError> {
        let len = self.seq_len()?;
        Ok(self.bytes(len)?.to_vec())
    }

    pub fn string(&mut self) -> Result<String, SolanaError> {
        let raw = self.byte_vec()?;
        String::from_utf8(raw).map_err(|e| SolanaError::malformed("string", e))
    }

    pub fn option<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, SolanaError>,
    ) -> Result<Option<T>, SolanaError> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(read(self)?)),
            other => Err(SolanaError::malformed("option tag", other)),
        }
    }

    pub fn vec<T>(
        &mut self,
        mut read: impl FnMut(&mut Self) -> Result<T, SolanaError>,
    ) -> Result<Vec<T>, SolanaError> {
        let len = self.seq_len()?;
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(read(self)?);
        }
        Ok(out)
    }

    /// Require that the structure consumed the input exactly.
    pub fn finish(self, what: &'static str) -> Result<(), SolanaError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SolanaError::TrailingBytes(what))
        }
    }
}

/// Encoding mirror of [`Decoder`], used by the index builders' test
/// fixtures and the meta round-trip tooling.
pub struct Encoder {
    out: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { out: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.out.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    pub fn byte_vec(&mut self, bytes: &[u8]) -> &mut Self {
        self.u64(bytes.len() as u64);
        self.raw(bytes)
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.byte_vec(s.as_bytes())
    }

    pub fn option<T>(
        &mut self,
        value: Option<&T>,
        write: impl FnOnce(&mut Self, &T),
    ) -> &mut Self {
        match value {
            None => {
                self.u8(0);
            }
            Some(v) => {
                self.u8(1);
                write(self, v);
            }
        }
        self
    }

    pub fn vec<T>(
        &mut self,
        items: &[T],
        mut write: impl FnMut(&mut Self, &T),
    ) -> &mut Self {
        self.u64(items.len() as u64);
        for item in items {
            write(self, item);
        }
        self
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_roundtrip() {
        let mut enc = Encoder::new();
        enc.u8(7)
            .u32(0xdead_beef)
            .u64(42)
            .i64(-5)
            .bool(true)
            .string("memo")
            .option(Some(&9u8), |e, v| {
                e.u8(*v);
            })
            .option(None::<&u8>, |e, v| {
                e.u8(*v);
            })
            .vec(&[1u8, 2, 3], |e, v| {
                e.u8(*v);
            });
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.u8().unwrap(), 7);
        assert_eq!(dec.u32().unwrap(), 0xdead_beef);
        assert_eq!(dec.u64().unwrap(), 42);
        assert_eq!(dec.i64().unwrap(), -5);
        assert!(dec.bool().unwrap());
        assert_eq!(dec.string().unwrap(), "memo");
        assert_eq!(dec.option(|d| d.u8()).unwrap(), Some(9));
        assert_eq!(dec.option(|d| d.u8()).unwrap(), None);
        assert_eq!(dec.vec(|d| d.u8()).unwrap(), vec![1, 2, 3]);
        dec.finish("test").unwrap();
    }

    #[test]
    fn truncation_is_detected() {
        let mut dec = Decoder::new(&[1, 2]);
        assert!(dec.u32().is_err());
    }

    #[test]
    fn sequence_length_is_sanity_checked() {
        let mut enc = Encoder::new();
        enc.u64(u64::MAX);
        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);
        assert!(dec.seq_len().is_err());
    }
}
