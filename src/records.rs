//! Byte-order-correcting decoding of fixed-layout records.
//!
//! Resource payloads are borrowed straight out of the container buffer and
//! decoded field by field into host-endian values. Decoding a single record
//! never allocates; only the array helpers collect into a `Vec`.

use glam::Vec3;

use crate::error::{FourCC, LoadError, LoadResult};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn decode_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        }
    }

    pub fn decode_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        }
    }

    pub fn decode_u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        }
    }

    pub fn encode_u16(self, value: u16) -> [u8; 2] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    pub fn encode_u32(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    pub fn encode_u64(self, value: u64) -> [u8; 8] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

/// Raised when a reader runs off the end of its slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortRead {
    pub needed: usize,
    pub available: usize,
}

/// Classic QuickDraw rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    pub top: i16,
    pub left: i16,
    pub bottom: i16,
    pub right: i16,
}

/// Cursor over a borrowed record payload.
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    data: &'a [u8],
    cursor: usize,
    endian: Endian,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            cursor: 0,
            endian,
        }
    }

    pub fn big_endian(data: &'a [u8]) -> Self {
        Self::new(data, Endian::Big)
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn bytes<const N: usize>(&mut self) -> Result<[u8; N], ShortRead> {
        if self.cursor + N > self.data.len() {
            return Err(ShortRead {
                needed: self.cursor + N,
                available: self.data.len(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.cursor..self.cursor + N]);
        self.cursor += N;
        Ok(out)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), ShortRead> {
        if self.cursor + count > self.data.len() {
            return Err(ShortRead {
                needed: self.cursor + count,
                available: self.data.len(),
            });
        }
        self.cursor += count;
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8, ShortRead> {
        Ok(self.bytes::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ShortRead> {
        let bytes = self.bytes::<2>()?;
        Ok(self.endian.decode_u16(bytes))
    }

    pub fn i16(&mut self) -> Result<i16, ShortRead> {
        Ok(self.u16()? as i16)
    }

    pub fn u32(&mut self) -> Result<u32, ShortRead> {
        let bytes = self.bytes::<4>()?;
        Ok(self.endian.decode_u32(bytes))
    }

    pub fn i32(&mut self) -> Result<i32, ShortRead> {
        Ok(self.u32()? as i32)
    }

    pub fn i64(&mut self) -> Result<i64, ShortRead> {
        let bytes = self.bytes::<8>()?;
        Ok(self.endian.decode_u64(bytes) as i64)
    }

    pub fn f32(&mut self) -> Result<f32, ShortRead> {
        Ok(f32::from_bits(self.u32()?))
    }

    pub fn vec3(&mut self) -> Result<Vec3, ShortRead> {
        let x = self.f32()?;
        let y = self.f32()?;
        let z = self.f32()?;
        Ok(Vec3::new(x, y, z))
    }

    pub fn rect(&mut self) -> Result<Rect, ShortRead> {
        Ok(Rect {
            top: self.i16()?,
            left: self.i16()?,
            bottom: self.i16()?,
            right: self.i16()?,
        })
    }
}

/// Fixed-size on-disk record with a declared field layout.
pub trait Record: Sized {
    const SIZE: usize;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead>;
}

impl Record for u8 {
    const SIZE: usize = 1;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        reader.u8()
    }
}

impl Record for u16 {
    const SIZE: usize = 2;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        reader.u16()
    }
}

impl Record for i16 {
    const SIZE: usize = 2;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        reader.i16()
    }
}

impl Record for f32 {
    const SIZE: usize = 4;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        reader.f32()
    }
}

impl Record for Vec3 {
    const SIZE: usize = 12;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        reader.vec3()
    }
}

fn truncated(tag: FourCC, id: i16, expected: usize, actual: usize) -> LoadError {
    LoadError::Truncated {
        tag,
        id,
        expected,
        actual,
    }
}

/// Decodes exactly one record from the start of `bytes`.
pub fn decode_record<T: Record>(tag: FourCC, id: i16, bytes: &[u8]) -> LoadResult<T> {
    if bytes.len() < T::SIZE {
        return Err(truncated(tag, id, T::SIZE, bytes.len()));
    }
    let mut reader = RecordReader::big_endian(bytes);
    T::decode(&mut reader).map_err(|short| truncated(tag, id, short.needed, short.available))
}

/// Decodes `count` consecutive records, swapping each element individually.
pub fn decode_records<T: Record>(
    tag: FourCC,
    id: i16,
    bytes: &[u8],
    count: usize,
) -> LoadResult<Vec<T>> {
    let expected = count
        .checked_mul(T::SIZE)
        .ok_or_else(|| LoadError::Malformed(format!("record count {count} overflows")))?;
    if bytes.len() < expected {
        return Err(truncated(tag, id, expected, bytes.len()));
    }
    let mut reader = RecordReader::big_endian(&bytes[..expected]);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let record =
            T::decode(&mut reader).map_err(|short| truncated(tag, id, short.needed, short.available))?;
        out.push(record);
    }
    Ok(out)
}

/// Decodes as many whole records as the payload holds.
pub fn decode_all_records<T: Record>(tag: FourCC, id: i16, bytes: &[u8]) -> LoadResult<Vec<T>> {
    decode_records(tag, id, bytes, bytes.len() / T::SIZE)
}

/// Converts a signed on-disk count into a length, rejecting negatives.
pub fn checked_count(what: &str, value: i64) -> LoadResult<usize> {
    usize::try_from(value).map_err(|_| LoadError::Malformed(format!("negative {what}: {value}")))
}

/// Reads a Pascal string stored in a fixed-width field.
pub fn pascal_string(len: u8, field: &[u8]) -> String {
    let len = (len as usize).min(field.len());
    String::from_utf8_lossy(&field[..len]).into_owned()
}

/// Reads a NUL-padded C string stored in a fixed-width field.
pub fn c_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Big-endian record encoder used by writers and test fixtures.
#[derive(Debug, Default, Clone)]
pub struct RecordWriter {
    buffer: Vec<u8>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buffer.extend_from_slice(&Endian::Big.encode_u16(value));
        self
    }

    pub fn i16(&mut self, value: i16) -> &mut Self {
        self.u16(value as u16)
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buffer.extend_from_slice(&Endian::Big.encode_u32(value));
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.u32(value as u32)
    }

    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.buffer
            .extend_from_slice(&Endian::Big.encode_u64(value as u64));
        self
    }

    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.u32(value.to_bits())
    }

    pub fn vec3(&mut self, value: Vec3) -> &mut Self {
        self.f32(value.x).f32(value.y).f32(value.z)
    }

    pub fn rect(&mut self, rect: Rect) -> &mut Self {
        self.i16(rect.top)
            .i16(rect.left)
            .i16(rect.bottom)
            .i16(rect.right)
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(bytes);
        self
    }

    pub fn zeros(&mut self, count: usize) -> &mut Self {
        self.buffer.resize(self.buffer.len() + count, 0);
        self
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}
