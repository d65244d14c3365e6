//! Bounds-checked little-endian reader over a byte slice.
//!
//! Every read either returns the requested bytes and advances, or fails with
//! [OutOfBounds] and leaves the position untouched.

use std::fmt;

/// A read ran past the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
  pub offset: usize,
  pub needed: usize,
  pub len: usize,
}

impl fmt::Display for OutOfBounds {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "read out of bounds: offset={} needed={} len={}",
      self.offset, self.needed, self.len
    )
  }
}

impl std::error::Error for OutOfBounds {}

/// Cursor with an explicit read position.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
  buf: &'a [u8],
  pos: usize,
}

impl<'a> ByteCursor<'a> {
  pub fn new(buf: &'a [u8]) -> Self {
    Self { buf, pos: 0 }
  }

  pub fn position(&self) -> usize {
    self.pos
  }

  pub fn len(&self) -> usize {
    self.buf.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buf.is_empty()
  }

  pub fn remaining(&self) -> usize {
    self.buf.len() - self.pos
  }

  /// Moves to an absolute offset; `offset == len` is allowed (end of buffer).
  pub fn seek(&mut self, offset: usize) -> Result<(), OutOfBounds> {
    if offset > self.buf.len() {
      return Err(self.out_of_bounds(offset, 0));
    }
    self.pos = offset;
    Ok(())
  }

  pub fn skip(&mut self, n: usize) -> Result<(), OutOfBounds> {
    self.take(n).map(|_| ())
  }

  /// Returns the next `n` bytes and advances past them.
  pub fn take(&mut self, n: usize) -> Result<&'a [u8], OutOfBounds> {
    let bytes = self.peek(n)?;
    self.pos += n;
    Ok(bytes)
  }

  /// Returns the next `n` bytes without advancing.
  pub fn peek(&self, n: usize) -> Result<&'a [u8], OutOfBounds> {
    let end = self
      .pos
      .checked_add(n)
      .filter(|end| *end <= self.buf.len())
      .ok_or_else(|| self.out_of_bounds(self.pos, n))?;
    Ok(&self.buf[self.pos..end])
  }

  pub fn peek_u32_le(&self) -> Result<u32, OutOfBounds> {
    let b = self.peek(4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
  }

  pub fn read_u16_le(&mut self) -> Result<u16, OutOfBounds> {
    let b = self.take(2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
  }

  pub fn read_u32_le(&mut self) -> Result<u32, OutOfBounds> {
    let b = self.take(4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
  }

  fn out_of_bounds(&self, offset: usize, needed: usize) -> OutOfBounds {
    OutOfBounds {
      offset,
      needed,
      len: self.buf.len(),
    }
  }
}
