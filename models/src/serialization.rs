use crate::error::ModelsError;
use integer_encoding::VarInt;
use std::convert::TryInto;

/// Types with a canonical compact binary form. The compact form is what gets
/// hashed into ids and written to the block log, so it must be deterministic.
pub trait SerializeCompact {
    fn to_bytes_compact(&self) -> Result<Vec<u8>, ModelsError>;
}

/// Mirror of `SerializeCompact`. Returns the value and the number of bytes
/// read; the buffer may be longer than needed.
pub trait DeserializeCompact: Sized {
    fn from_bytes_compact(buffer: &[u8]) -> Result<(Self, usize), ModelsError>;
}

pub trait SerializeVarInt {
    fn to_varint_bytes(self) -> Vec<u8>;
}

impl SerializeVarInt for u32 {
    fn to_varint_bytes(self) -> Vec<u8> {
        self.encode_var_vec()
    }
}

impl SerializeVarInt for u64 {
    fn to_varint_bytes(self) -> Vec<u8> {
        self.encode_var_vec()
    }
}

pub trait DeserializeVarInt: Sized {
    /// Deserialize a varint from the start of the buffer.
    /// In case of success, return the value and the number of bytes read.
    fn from_varint_bytes(buffer: &[u8]) -> Result<(Self, usize), ModelsError>;

    /// Same as `from_varint_bytes` but also enforces an upper bound.
    fn from_varint_bytes_bounded(
        buffer: &[u8],
        max_value: Self,
    ) -> Result<(Self, usize), ModelsError>;
}

impl DeserializeVarInt for u32 {
    fn from_varint_bytes(buffer: &[u8]) -> Result<(Self, usize), ModelsError> {
        u32::decode_var(buffer)
            .ok_or_else(|| ModelsError::DeserializeError("could not deserialize varint".into()))
    }

    fn from_varint_bytes_bounded(
        buffer: &[u8],
        max_value: Self,
    ) -> Result<(Self, usize), ModelsError> {
        let (res, res_size) = Self::from_varint_bytes(buffer)?;
        if res > max_value {
            return Err(ModelsError::DeserializeError(
                "deserialized varint u32 out of bounds".into(),
            ));
        }
        Ok((res, res_size))
    }
}

impl DeserializeVarInt for u64 {
    fn from_varint_bytes(buffer: &[u8]) -> Result<(Self, usize), ModelsError> {
        u64::decode_var(buffer)
            .ok_or_else(|| ModelsError::DeserializeError("could not deserialize varint".into()))
    }

    fn from_varint_bytes_bounded(
        buffer: &[u8],
        max_value: Self,
    ) -> Result<(Self, usize), ModelsError> {
        let (res, res_size) = Self::from_varint_bytes(buffer)?;
        if res > max_value {
            return Err(ModelsError::DeserializeError(
                "deserialized varint u64 out of bounds".into(),
            ));
        }
        Ok((res, res_size))
    }
}

/// Copy a fixed-size array from the start of a buffer.
pub fn array_from_slice<const N: usize>(buffer: &[u8]) -> Result<[u8; N], ModelsError> {
    if buffer.len() < N {
        return Err(ModelsError::DeserializeError(
            "buffer too small to contain array".into(),
        ));
    }
    buffer[..N]
        .try_into()
        .map_err(|_| ModelsError::DeserializeError("could not deserialize array".into()))
}

pub fn u8_from_slice(buffer: &[u8]) -> Result<u8, ModelsError> {
    buffer
        .first()
        .copied()
        .ok_or_else(|| ModelsError::DeserializeError("buffer too small to contain u8".into()))
}

/// Little-endian u32 from the start of a buffer, as used by TAPoS prefixes.
pub fn u32_from_slice_le(buffer: &[u8]) -> Result<u32, ModelsError> {
    Ok(u32::from_le_bytes(array_from_slice::<4>(buffer)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let bytes = value.to_varint_bytes();
            let (decoded, size) = u64::from_varint_bytes(&bytes).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(size, bytes.len());
        }
    }

    #[test]
    fn test_varint_bounded() {
        let bytes = 300u32.to_varint_bytes();
        assert!(u32::from_varint_bytes_bounded(&bytes, 299).is_err());
        assert_eq!(
            u32::from_varint_bytes_bounded(&bytes, 300).unwrap().0,
            300u32
        );
    }
}
