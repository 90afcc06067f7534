//! Little-endian primitive read/write helpers built on top of [`Cursor`],
//! used throughout the state serializer.

use std::io::{Cursor, Read, Write};

use crate::error::Error;

pub fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    let mut buffer = [0u8; 1];
    cursor
        .read_exact(&mut buffer)
        .map_err(|_| Error::StateSizeMismatch)?;
    Ok(buffer[0])
}

pub fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, Error> {
    let mut buffer = [0u8; 2];
    cursor
        .read_exact(&mut buffer)
        .map_err(|_| Error::StateSizeMismatch)?;
    Ok(u16::from_le_bytes(buffer))
}

pub fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, Error> {
    let mut buffer = [0u8; 4];
    cursor
        .read_exact(&mut buffer)
        .map_err(|_| Error::StateSizeMismatch)?;
    Ok(u32::from_le_bytes(buffer))
}

pub fn read_bytes(cursor: &mut Cursor<&[u8]>, count: usize) -> Result<Vec<u8>, Error> {
    let mut buffer = vec![0u8; count];
    cursor
        .read_exact(&mut buffer)
        .map_err(|_| Error::StateSizeMismatch)?;
    Ok(buffer)
}

pub fn write_u8(cursor: &mut Cursor<&mut Vec<u8>>, value: u8) -> Result<(), Error> {
    cursor.write_all(&[value]).map_err(Error::from)
}

pub fn write_u16(cursor: &mut Cursor<&mut Vec<u8>>, value: u16) -> Result<(), Error> {
    cursor.write_all(&value.to_le_bytes()).map_err(Error::from)
}

pub fn write_u32(cursor: &mut Cursor<&mut Vec<u8>>, value: u32) -> Result<(), Error> {
    cursor.write_all(&value.to_le_bytes()).map_err(Error::from)
}

pub fn write_bytes(cursor: &mut Cursor<&mut Vec<u8>>, value: &[u8]) -> Result<(), Error> {
    cursor.write_all(value).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut buffer = Vec::new();
        let mut writer = Cursor::new(&mut buffer);
        write_u8(&mut writer, 0x42).unwrap();
        write_u16(&mut writer, 0x1234).unwrap();
        write_u32(&mut writer, 0xdead_beef).unwrap();

        let mut reader = Cursor::new(buffer.as_slice());
        assert_eq!(read_u8(&mut reader).unwrap(), 0x42);
        assert_eq!(read_u16(&mut reader).unwrap(), 0x1234);
        assert_eq!(read_u32(&mut reader).unwrap(), 0xdead_beef);
    }
}
