//! Tar stream codec for snapshot archives.
//!
//! A snapshot archive is a plain POSIX tar stream in which every entry is a
//! regular file: the entry name is the literal backend key (leading slash
//! preserved) and the body is the raw value bytes. No directory entries, no
//! compression; compression is the registry layer's concern.

use std::io::{Read, Write};

use tar::{EntryType, Header};

use crate::error::Result;

const BLOCK_SIZE: usize = 512;
const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

/// Name used by GNU long-name records.
const GNU_LONG_NAME: &[u8] = b"././@LongLink";

/// Maximum key length that fits the fixed tar name field.
const SHORT_NAME_MAX: usize = 100;

/// Streaming writer appending `(key, value)` records to a tar stream.
pub struct ArchiveWriter<W: Write> {
    writer: W,
}

impl<W: Write> ArchiveWriter<W> {
    /// Create a writer wrapping the given output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Append one key/value record.
    ///
    /// Keys longer than the fixed tar name field are preceded by a GNU
    /// long-name record, which is how the original archives carry long
    /// registry keys.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > SHORT_NAME_MAX {
            let mut header = Header::new_gnu();
            set_name(&mut header, GNU_LONG_NAME);
            header.set_entry_type(EntryType::GNULongName);
            header.set_mode(0o666);
            header.set_size((key.len() + 1) as u64);
            header.set_cksum();

            self.writer.write_all(header.as_bytes())?;
            self.writer.write_all(key)?;
            self.writer.write_all(&[0])?;
            self.pad(key.len() + 1)?;
        }

        let mut header = Header::new_gnu();
        set_name(&mut header, key);
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o666);
        header.set_size(value.len() as u64);
        header.set_cksum();

        self.writer.write_all(header.as_bytes())?;
        self.writer.write_all(value)?;
        self.pad(value.len())?;
        Ok(())
    }

    /// Write the end-of-archive marker and return the inner stream.
    pub fn finish(mut self) -> Result<W> {
        self.writer.write_all(&ZERO_BLOCK)?;
        self.writer.write_all(&ZERO_BLOCK)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn pad(&mut self, written: usize) -> Result<()> {
        let remainder = written % BLOCK_SIZE;
        if remainder != 0 {
            self.writer.write_all(&ZERO_BLOCK[..BLOCK_SIZE - remainder])?;
        }
        Ok(())
    }
}

/// Copy the name bytes into the fixed header field, truncating past the
/// field width. Callers emit a long-name record first when truncation
/// would lose data.
fn set_name(header: &mut Header, name: &[u8]) {
    let gnu = header.as_gnu_mut().expect("header was created as gnu");
    let len = name.len().min(SHORT_NAME_MAX);
    gnu.name[..len].copy_from_slice(&name[..len]);
}

/// Streaming reader yielding `(key, value)` records from a tar stream.
pub struct ArchiveReader<R: Read> {
    reader: R,
    done: bool,
}

impl<R: Read> ArchiveReader<R> {
    /// Create a reader wrapping the given input stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` at the end of the archive: a zero block, a bare
    /// end-of-stream, or an entry with an empty name all end the archive.
    pub fn read_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.done {
            return Ok(None);
        }

        let mut long_name: Option<Vec<u8>> = None;
        loop {
            let block = match self.read_block()? {
                Some(block) => block,
                None => {
                    self.done = true;
                    return Ok(None);
                }
            };
            if block.iter().all(|b| *b == 0) {
                self.done = true;
                return Ok(None);
            }

            let header = Header::from_byte_slice(&block);
            let size = header.entry_size()? as usize;
            let payload = self.read_payload(size)?;

            if header.entry_type() == EntryType::GNULongName {
                let mut name = payload;
                while name.last() == Some(&0) {
                    name.pop();
                }
                long_name = Some(name);
                continue;
            }

            let name = match long_name.take() {
                Some(name) => name,
                None => header.path_bytes().into_owned(),
            };
            if name.is_empty() {
                self.done = true;
                return Ok(None);
            }
            return Ok(Some((name, payload)));
        }
    }

    fn read_block(&mut self) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let mut block = [0u8; BLOCK_SIZE];
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            let n = self.reader.read(&mut block[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "truncated tar header",
                )
                .into());
            }
            filled += n;
        }
        Ok(Some(block))
    }

    fn read_payload(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; size];
        self.reader.read_exact(&mut payload)?;

        let remainder = size % BLOCK_SIZE;
        if remainder != 0 {
            let mut padding = [0u8; BLOCK_SIZE];
            self.reader.read_exact(&mut padding[..BLOCK_SIZE - remainder])?;
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(entries: &[(&[u8], &[u8])]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut writer = ArchiveWriter::new(Vec::new());
        for (key, value) in entries {
            writer.append(key, value).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let mut reader = ArchiveReader::new(&bytes[..]);
        let mut out = Vec::new();
        while let Some(entry) = reader.read_entry().unwrap() {
            out.push(entry);
        }
        out
    }

    #[test]
    fn test_roundtrip_preserves_keys_and_values() {
        let entries: &[(&[u8], &[u8])] = &[
            (b"/registry/configmaps/default/x", b"value-1"),
            (b"/config/foo", b"bar"),
            (b"/registry/secrets/kube-system/token", &[0u8, 1, 2, 255]),
        ];
        let out = roundtrip(entries);
        assert_eq!(out.len(), 3);
        for ((key, value), (out_key, out_value)) in entries.iter().zip(&out) {
            assert_eq!(out_key.as_slice(), *key);
            assert_eq!(out_value.as_slice(), *value);
        }
    }

    #[test]
    fn test_leading_slash_preserved() {
        let out = roundtrip(&[(b"/registry/pods/default/web", b"spec")]);
        assert_eq!(out[0].0.first(), Some(&b'/'));
    }

    #[test]
    fn test_long_key_uses_long_name_record() {
        let long_key = format!(
            "/registry/apiregistration.k8s.io/apiservices/{}",
            "v".repeat(120)
        );
        let out = roundtrip(&[(long_key.as_bytes(), b"payload")]);
        assert_eq!(out[0].0, long_key.as_bytes());
        assert_eq!(out[0].1, b"payload");
    }

    #[test]
    fn test_empty_value_allowed() {
        let out = roundtrip(&[(b"/registry/configmaps/ns/empty", b"")]);
        assert_eq!(out[0].1, b"");
    }

    #[test]
    fn test_empty_archive_yields_eof() {
        let writer = ArchiveWriter::new(Vec::new());
        let bytes = writer.finish().unwrap();

        let mut reader = ArchiveReader::new(&bytes[..]);
        assert!(reader.read_entry().unwrap().is_none());
        // EOF is sticky.
        assert!(reader.read_entry().unwrap().is_none());
    }

    #[test]
    fn test_bare_end_of_stream_is_eof() {
        let mut reader = ArchiveReader::new(&[][..]);
        assert!(reader.read_entry().unwrap().is_none());
    }

    #[test]
    fn test_truncated_header_is_an_error() {
        let mut writer = ArchiveWriter::new(Vec::new());
        writer.append(b"/config/foo", b"bar").unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ArchiveReader::new(&bytes[..100]);
        assert!(reader.read_entry().is_err());
    }

    #[test]
    fn test_output_is_readable_by_stock_tar() {
        let mut writer = ArchiveWriter::new(Vec::new());
        writer
            .append(b"/registry/configmaps/default/x", b"hello")
            .unwrap();
        let bytes = writer.finish().unwrap();

        let mut archive = tar::Archive::new(&bytes[..]);
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(
            entry.header().path_bytes().as_ref(),
            b"/registry/configmaps/default/x"
        );
        let mut body = Vec::new();
        entry.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"hello");
        assert!(entries.next().is_none());
    }
}
