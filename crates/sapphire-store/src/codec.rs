//! On-disk record and frame encoding.
//!
//! Per-entity record files carry a small header (magic, version, checksum)
//! followed by a bincode body. Append-only log files (messages, demos) use
//! length-prefixed frames with a per-frame CRC32 so a truncated or
//! corrupted tail is detected and skipped instead of crashing the load.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;

/// `SAPH` in ASCII.
const RECORD_MAGIC: u32 = 0x5341_5048;
const RECORD_VERSION: u16 = 1;

/// Upper bound on a single frame payload. Messages are a few hundred
/// bytes and demos a few KiB; a length prefix beyond this is corruption
/// and must be rejected before anything is allocated for it.
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Record files
// ---------------------------------------------------------------------------

/// Serialize a record and replace the file at `path` atomically from the
/// reader's perspective: the full new content is written to a sibling
/// temp file which is then renamed over the target.
pub fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let body = bincode::serialize(record)?;

    let mut buf = Vec::with_capacity(body.len() + 10);
    buf.write_u32::<BigEndian>(RECORD_MAGIC)?;
    buf.write_u16::<BigEndian>(RECORD_VERSION)?;
    buf.write_u32::<BigEndian>(crc32fast::hash(&body))?;
    buf.extend_from_slice(&body);

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &buf)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a record file. Missing, partially written or corrupt files yield
/// `Ok(None)` with a warning; only genuine I/O faults are errors.
pub fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let buf = match fs::read(path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut cursor = io::Cursor::new(buf.as_slice());
    let header = (|| -> io::Result<(u32, u16, u32)> {
        Ok((
            cursor.read_u32::<BigEndian>()?,
            cursor.read_u16::<BigEndian>()?,
            cursor.read_u32::<BigEndian>()?,
        ))
    })();

    let (magic, version, crc) = match header {
        Ok(h) => h,
        Err(_) => {
            warn!(path = %path.display(), "record file too short, skipping");
            return Ok(None);
        }
    };
    if magic != RECORD_MAGIC || version != RECORD_VERSION {
        warn!(path = %path.display(), magic, version, "unrecognized record header, skipping");
        return Ok(None);
    }

    let body = &buf[10..];
    if crc32fast::hash(body) != crc {
        warn!(path = %path.display(), "record checksum mismatch, skipping");
        return Ok(None);
    }

    match bincode::deserialize(body) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "record body undecodable, skipping");
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Framed append-only files
// ---------------------------------------------------------------------------

/// Append one frame: length prefix, CRC32, payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    writer.write_u32::<BigEndian>(payload.len() as u32)?;
    writer.write_u32::<BigEndian>(crc32fast::hash(payload))?;
    writer.write_all(payload)?;
    Ok(())
}

/// Read the next frame. Clean EOF at a frame boundary yields `Ok(None)`;
/// a torn frame or checksum mismatch is an `InvalidData` error the caller
/// can treat as "stop here".
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let len = match reader.read_u32::<BigEndian>() {
        Ok(len) => len as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(implausible_len(len as u64));
    }
    let crc = reader
        .read_u32::<BigEndian>()
        .map_err(|e| torn_frame("frame checksum", e))?;

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .map_err(|e| torn_frame("frame payload", e))?;

    if crc32fast::hash(&payload) != crc {
        return Err(io::Error::new(ErrorKind::InvalidData, "frame checksum mismatch").into());
    }
    Ok(Some(payload))
}

/// Skip over one frame without decoding it. Returns the number of bytes
/// consumed, or `None` on clean EOF.
pub fn skip_frame(file: &mut File) -> Result<Option<u64>> {
    use std::io::Seek;

    let len = match file.read_u32::<BigEndian>() {
        Ok(len) => len as u64,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN as u64 {
        return Err(implausible_len(len));
    }
    file.seek(io::SeekFrom::Current(4 + len as i64))?;
    Ok(Some(8 + len))
}

fn implausible_len(len: u64) -> crate::error::StoreError {
    io::Error::new(
        ErrorKind::InvalidData,
        format!("frame length {len} exceeds the {MAX_FRAME_LEN} byte limit"),
    )
    .into()
}

fn torn_frame(context: &str, e: io::Error) -> crate::error::StoreError {
    if e.kind() == ErrorKind::UnexpectedEof {
        io::Error::new(ErrorKind::InvalidData, format!("torn frame: {context}")).into()
    } else {
        e.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Cursor;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        id: u64,
        name: String,
    }

    #[test]
    fn record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample");
        let record = Sample {
            id: 7,
            name: "seven".into(),
        };

        write_record(&path, &record).unwrap();
        let loaded: Option<Sample> = read_record(&path).unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Sample> = read_record(&dir.path().join("absent")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample");
        let record = Sample {
            id: 7,
            name: "seven".into(),
        };
        write_record(&path, &record).unwrap();

        // Flip a byte in the body.
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let loaded: Option<Sample> = read_record(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn short_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        std::fs::write(&path, [0x53, 0x41]).unwrap();

        let loaded: Option<Sample> = read_record(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn frames_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"first").unwrap();
        write_frame(&mut buf, b"second").unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), b"first");
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), b"second");
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn garbage_frame_length_is_rejected_without_allocating() {
        // A corrupt tail whose length prefix claims 4 GiB. It must be
        // rejected up front, not trusted as an allocation size.
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(u32::MAX).unwrap();
        buf.write_u32::<BigEndian>(0).unwrap();

        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn torn_frame_is_an_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"payload").unwrap();
        buf.truncate(buf.len() - 3);

        let mut cursor = Cursor::new(buf);
        assert!(read_frame(&mut cursor).is_err());
    }
}
