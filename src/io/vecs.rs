use crate::types::{Error, Matrix, Result, Vector};
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Contract for a pluggable vector-file reader.
///
/// Implementations read files of repeated `int32 dim` + `dim` payload
/// records where every record in a file agrees on `dim`.
pub trait VectorReader {
    /// Opens `path`, reading just enough to learn its dimension and row
    /// count without loading every row.
    fn open(path: &Path) -> Result<Self>
    where
        Self: Sized;

    /// Dimension shared by every record in the file.
    fn dim(&self) -> usize;

    /// Number of records in the file.
    fn len(&self) -> usize;

    /// Reads every record into a matrix of shape `(len, dim)`.
    fn read_all(&mut self) -> Result<Matrix>;
}

/// Reader for `.fvecs` files: repeated `int32 dim` + `dim x float32` records.
pub struct FvecsReader {
    reader: BufReader<File>,
    dim: usize,
    len: usize,
}

impl VectorReader for FvecsReader {
    fn open(path: &Path) -> Result<Self> {
        let (dim, len) = probe::<f32>(path)?;
        let file = File::open(path)?;
        Ok(FvecsReader { reader: BufReader::new(file), dim, len })
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.len
    }

    fn read_all(&mut self) -> Result<Matrix> {
        read_records(&mut self.reader, self.dim, self.len, read_f32_payload)
    }
}

/// Reader for `.ivecs` files: repeated `int32 dim` + `dim x int32` records,
/// exposed as a `Matrix` of floats for uniform downstream handling (used
/// for ground-truth neighbor lists, which the driver reads as integer ids).
pub struct IvecsReader {
    reader: BufReader<File>,
    dim: usize,
    len: usize,
}

impl VectorReader for IvecsReader {
    fn open(path: &Path) -> Result<Self> {
        let (dim, len) = probe::<i32>(path)?;
        let file = File::open(path)?;
        Ok(IvecsReader { reader: BufReader::new(file), dim, len })
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.len
    }

    fn read_all(&mut self) -> Result<Matrix> {
        read_records(&mut self.reader, self.dim, self.len, read_i32_payload)
    }
}

fn read_f32_payload(
    reader: &mut BufReader<File>,
    dim: usize,
) -> std::io::Result<Vec<f32>> {
    let mut row = vec![0.0f32; dim];
    for value in row.iter_mut() {
        *value = reader.read_f32::<LittleEndian>()?;
    }
    Ok(row)
}

fn read_i32_payload(
    reader: &mut BufReader<File>,
    dim: usize,
) -> std::io::Result<Vec<f32>> {
    let mut row = vec![0.0f32; dim];
    for value in row.iter_mut() {
        *value = reader.read_i32::<LittleEndian>()? as f32;
    }
    Ok(row)
}

fn read_records(
    reader: &mut BufReader<File>,
    dim: usize,
    len: usize,
    read_payload: fn(&mut BufReader<File>, usize) -> std::io::Result<Vec<f32>>,
) -> Result<Matrix> {
    let mut rows = Vec::with_capacity(len);
    for _ in 0..len {
        let record_dim = reader.read_i32::<LittleEndian>()? as usize;
        if record_dim != dim {
            return Err(Error::corrupt(format!(
                "Record dimension {record_dim} does not match file dimension {dim}."
            )));
        }

        rows.push(Vector::from(read_payload(reader, dim)?));
    }

    Ok(Matrix::from_rows(rows))
}

/// Reads the file once to learn `dim` (from the first record) and `n`
/// (from the file size), without materializing every row.
fn probe<T>(path: &Path) -> Result<(usize, usize)> {
    let record_width = std::mem::size_of::<i32>() + std::mem::size_of::<T>();
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len() as usize;

    let mut header = [0u8; 4];
    let read = file.read(&mut header)?;
    if read < 4 {
        return Ok((0, 0));
    }

    let dim = i32::from_le_bytes(header) as usize;
    let record_bytes = 4 + dim * (record_width - 4);
    if record_bytes == 0 || file_len % record_bytes != 0 {
        return Err(Error::corrupt("File size is not a multiple of the record size."));
    }

    Ok((dim, file_len / record_bytes))
}

/// Maps a file extension (or explicit tag) to a reader constructor.
///
/// A plain value owned by the driver, not a global registry — a factory
/// keyed by format tag without any runtime class registration.
pub struct ReaderRegistry {
    constructors: HashMap<String, fn(&Path) -> Result<Matrix>>,
}

impl ReaderRegistry {
    /// Registry preloaded with the `fvecs` and `ivecs` formats.
    pub fn with_defaults() -> Self {
        let mut registry = ReaderRegistry { constructors: HashMap::new() };
        registry.register("fvecs", |path| FvecsReader::open(path)?.read_all());
        registry.register("ivecs", |path| IvecsReader::open(path)?.read_all());
        registry
    }

    /// Registers a constructor for an additional format, keyed by tag.
    pub fn register(&mut self, tag: &str, constructor: fn(&Path) -> Result<Matrix>) {
        self.constructors.insert(tag.to_string(), constructor);
    }

    /// Reads `path` using the constructor registered for its extension.
    pub fn read(&self, path: &Path) -> Result<Matrix> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| Error::invalid_argument("File has no extension to key the reader registry on."))?;

        let constructor = self.constructors.get(ext).ok_or_else(|| {
            Error::invalid_argument(format!("No reader registered for extension '{ext}'."))
        })?;

        constructor(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_fvecs(rows: &[Vec<f32>]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for row in rows {
            file.write_i32::<LittleEndian>(row.len() as i32).unwrap();
            for &value in row {
                file.write_f32::<LittleEndian>(value).unwrap();
            }
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_fvecs_rows() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let file = write_fvecs(&rows);

        let mut reader = FvecsReader::open(file.path()).unwrap();
        assert_eq!(reader.dim(), 3);
        assert_eq!(reader.len(), 2);

        let matrix = reader.read_all().unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.row(0).as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(matrix.row(1).as_slice(), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn registry_dispatches_by_extension() {
        let rows = vec![vec![1.0, 2.0]];
        let file = write_fvecs(&rows);
        let path = file.path().with_extension("fvecs");
        std::fs::copy(file.path(), &path).unwrap();

        let registry = ReaderRegistry::with_defaults();
        let matrix = registry.read(&path).unwrap();
        assert_eq!(matrix.row(0).as_slice(), &[1.0, 2.0]);

        std::fs::remove_file(&path).ok();
    }
}
