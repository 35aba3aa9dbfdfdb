//! Keyed result collection on disk
//!
//! A result collection is a data file plus `<data>.index`. Every record is
//! the hit list of one target, one `query_id\tscore\tdiagonal\n` line per
//! hit, followed by a `\0` terminator. With compression enabled the record
//! body is a gzip member instead. The index has one
//! `key\toffset\tlength` line per record, where `length` counts the
//! terminator.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Result, SearchError};
use crate::search::group::{Hit, HitSink};

/// Path of the index file belonging to a data file
pub fn index_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(".index");
    PathBuf::from(name)
}

fn format_hits(hits: &[Hit], buf: &mut Vec<u8>) -> io::Result<()> {
    for hit in hits {
        writeln!(buf, "{}\t{}\t{}", hit.query_id, hit.score, hit.diagonal)?;
    }
    Ok(())
}

/// [`HitSink`] writing a keyed result collection
pub struct ResultDbWriter {
    data_path: PathBuf,
    data: BufWriter<File>,
    index: BufWriter<File>,
    offset: u64,
    compressed: bool,
    buf: Vec<u8>,
    records: usize,
}

impl ResultDbWriter {
    /// Create `path` and `path.index`, truncating existing files
    pub fn create(path: impl AsRef<Path>, compressed: bool) -> Result<Self> {
        let data_path = path.as_ref().to_path_buf();
        let data = BufWriter::with_capacity(1024 * 1024, File::create(&data_path)?);
        let index = BufWriter::new(File::create(index_path(&data_path))?);
        Ok(Self {
            data_path,
            data,
            index,
            offset: 0,
            compressed,
            buf: Vec::new(),
            records: 0,
        })
    }

    /// Data file path
    pub fn path(&self) -> &Path {
        &self.data_path
    }

    /// Records written so far
    pub fn num_records(&self) -> usize {
        self.records
    }
}

impl HitSink for ResultDbWriter {
    fn write_target(&mut self, target_id: u32, hits: &[Hit]) -> Result<()> {
        self.buf.clear();
        format_hits(hits, &mut self.buf)?;
        let length = if self.compressed {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&self.buf)?;
            let body = encoder.finish()?;
            self.data.write_all(&body)?;
            body.len()
        } else {
            self.data.write_all(&self.buf)?;
            self.buf.len()
        };
        self.data.write_all(&[0])?;
        let length = length as u64 + 1;
        writeln!(self.index, "{}\t{}\t{}", target_id, self.offset, length)?;
        self.offset += length;
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.data.flush()?;
        self.index.flush()?;
        Ok(())
    }
}

/// Read a result collection back into `(target id, hits)` pairs in file order
pub fn read_result_db(path: impl AsRef<Path>, compressed: bool) -> Result<Vec<(u32, Vec<Hit>)>> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let index = BufReader::new(File::open(index_path(path))?);

    let invalid = |line: &str| {
        SearchError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed result line {line:?} in {}", path.display()),
        ))
    };
    let mut records = Vec::new();
    for line in index.lines() {
        let line = line?;
        let fields: Vec<&str> = line.split('\t').collect();
        let [key, offset, length] = fields.as_slice() else {
            return Err(invalid(line.as_str()));
        };
        let key: u32 = key.parse().map_err(|_| invalid(line.as_str()))?;
        let offset: usize = offset.parse().map_err(|_| invalid(line.as_str()))?;
        let length: usize = length.parse().map_err(|_| invalid(line.as_str()))?;
        let end = offset
            .checked_add(length)
            .filter(|&end| length > 0 && end <= data.len())
            .ok_or_else(|| invalid(line.as_str()))?;
        // Drop the terminator
        let body = &data[offset..end - 1];
        let text = if compressed {
            let mut out = String::new();
            GzDecoder::new(body).read_to_string(&mut out)?;
            out
        } else {
            String::from_utf8_lossy(body).into_owned()
        };

        let mut hits = Vec::new();
        for hit_line in text.lines() {
            let mut parts = hit_line.split('\t');
            let mut next = || parts.next().ok_or_else(|| invalid(hit_line));
            let query_id: u32 = next()?.parse().map_err(|_| invalid(hit_line))?;
            let score: u8 = next()?.parse().map_err(|_| invalid(hit_line))?;
            let diagonal: i32 = next()?.parse().map_err(|_| invalid(hit_line))?;
            hits.push(Hit { query_id, score, diagonal });
        }
        records.push((key, hits));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hits() -> Vec<(u32, Vec<Hit>)> {
        vec![
            (
                3,
                vec![
                    Hit { query_id: 1, score: 0, diagonal: -4 },
                    Hit { query_id: 8, score: 1, diagonal: 17 },
                ],
            ),
            (9, vec![Hit { query_id: 9, score: 0, diagonal: 0 }]),
        ]
    }

    fn write(path: &Path, compressed: bool) {
        let mut writer = ResultDbWriter::create(path, compressed).unwrap();
        for (target, target_hits) in hits() {
            writer.write_target(target, &target_hits).unwrap();
        }
        writer.finish().unwrap();
        assert_eq!(writer.num_records(), 2);
    }

    #[test]
    fn test_plain_layout() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("result");
        write(&path, false);

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data, b"1\t0\t-4\n8\t1\t17\n\09\t0\t0\n\0");
        let index = std::fs::read_to_string(index_path(&path)).unwrap();
        assert_eq!(index, "3\t0\t15\n9\t15\t7\n");
        assert_eq!(read_result_db(&path, false).unwrap(), hits());
    }

    #[test]
    fn test_compressed_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("result.gz");
        write(&path, true);

        let data = std::fs::read(&path).unwrap();
        // gzip magic at the start of the first record
        assert_eq!(&data[..2], &[0x1f_u8, 0x8b]);
        assert_eq!(read_result_db(&path, true).unwrap(), hits());
    }

    #[test]
    fn test_malformed_index_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("result");
        write(&path, false);

        for line in [
            format!("3\t{}\t2\n", usize::MAX),
            "3\t0\t0\n".to_string(),
            "3\t0\t999\n".to_string(),
            "3\t0\n".to_string(),
        ] {
            std::fs::write(index_path(&path), &line).unwrap();
            match read_result_db(&path, false) {
                Err(SearchError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidData, "{line:?}"),
                other => panic!("unexpected result for {line:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_index_path() {
        assert_eq!(index_path(Path::new("/tmp/out")), PathBuf::from("/tmp/out.index"));
    }
}
