use crate::types::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const MAGIC: &[u8; 8] = b"IVFADC\0\x01";

/// Flat, language-agnostic representation of a trained+populated index's
/// on-disk layout, field for field. The engine assembles one of these
/// before writing and interprets one after reading; it carries no
/// quantizer/engine logic of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIndex {
    pub dim: usize,
    pub num_coarse: usize,
    pub num_subquantizers: usize,
    pub num_pq_centroids: usize,
    pub n_total: i64,

    /// `num_coarse * dim` values, row-major.
    pub coarse_centroids: Vec<f32>,
    /// `num_subquantizers * num_pq_centroids * (dim / num_subquantizers)`
    /// values, grouped by subspace then centroid.
    pub pq_centroids: Vec<f32>,

    /// One entry per coarse cell: ids in insertion order and a flat,
    /// `size * num_subquantizers`-byte code buffer.
    pub cells: Vec<CellData>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellData {
    pub ids: Vec<i64>,
    pub codes: Vec<u8>,
}

/// Writes `raw` using the exact little-endian layout documented above.
pub fn write<W: Write>(writer: &mut W, raw: &RawIndex) -> Result<()> {
    writer.write_all(MAGIC)?;

    writer.write_i32::<LittleEndian>(raw.dim as i32)?;
    writer.write_i32::<LittleEndian>(raw.num_coarse as i32)?;
    writer.write_i32::<LittleEndian>(raw.num_subquantizers as i32)?;
    writer.write_i32::<LittleEndian>(raw.num_pq_centroids as i32)?;
    writer.write_i64::<LittleEndian>(raw.n_total)?;

    for &value in &raw.coarse_centroids {
        writer.write_f32::<LittleEndian>(value)?;
    }

    for &value in &raw.pq_centroids {
        writer.write_f32::<LittleEndian>(value)?;
    }

    for cell in &raw.cells {
        writer.write_i64::<LittleEndian>(cell.ids.len() as i64)?;
    }

    for cell in &raw.cells {
        for &id in &cell.ids {
            writer.write_i64::<LittleEndian>(id)?;
        }
        writer.write_all(&cell.codes)?;
    }

    Ok(())
}

/// Reads a `RawIndex`, validating the magic/version and cross-checking
/// `sum(cell sizes) == n_total`. Fails with `Corrupt` on mismatch.
pub fn read<R: Read>(reader: &mut R) -> Result<RawIndex> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::corrupt("Bad magic bytes or unsupported format version."));
    }

    let dim = reader.read_i32::<LittleEndian>()? as usize;
    let num_coarse = reader.read_i32::<LittleEndian>()? as usize;
    let num_subquantizers = reader.read_i32::<LittleEndian>()? as usize;
    let num_pq_centroids = reader.read_i32::<LittleEndian>()? as usize;
    let n_total = reader.read_i64::<LittleEndian>()?;

    let mut coarse_centroids = vec![0.0f32; num_coarse * dim];
    for value in coarse_centroids.iter_mut() {
        *value = reader.read_f32::<LittleEndian>()?;
    }

    let sub_dim = if num_subquantizers == 0 { 0 } else { dim / num_subquantizers };
    let mut pq_centroids = vec![0.0f32; num_subquantizers * num_pq_centroids * sub_dim];
    for value in pq_centroids.iter_mut() {
        *value = reader.read_f32::<LittleEndian>()?;
    }

    let mut sizes = Vec::with_capacity(num_coarse);
    for _ in 0..num_coarse {
        sizes.push(reader.read_i64::<LittleEndian>()?);
    }

    let total: i64 = sizes.iter().sum();
    if total != n_total {
        return Err(Error::corrupt(format!(
            "Cell sizes sum to {total}, but header declares N_total = {n_total}."
        )));
    }

    let mut cells = Vec::with_capacity(num_coarse);
    for &size in &sizes {
        let size = size as usize;
        let mut ids = Vec::with_capacity(size);
        for _ in 0..size {
            ids.push(reader.read_i64::<LittleEndian>()?);
        }

        let mut codes = vec![0u8; size * num_subquantizers];
        reader.read_exact(&mut codes)?;

        cells.push(CellData { ids, codes });
    }

    Ok(RawIndex {
        dim,
        num_coarse,
        num_subquantizers,
        num_pq_centroids,
        n_total,
        coarse_centroids,
        pq_centroids,
        cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_raw() -> RawIndex {
        RawIndex {
            dim: 4,
            num_coarse: 2,
            num_subquantizers: 2,
            num_pq_centroids: 3,
            n_total: 2,
            coarse_centroids: vec![0.0; 2 * 4],
            pq_centroids: vec![0.0; 2 * 3 * 2],
            cells: vec![
                CellData { ids: vec![0], codes: vec![1, 2] },
                CellData { ids: vec![1], codes: vec![0, 1] },
            ],
        }
    }

    #[test]
    fn round_trips() {
        let raw = sample_raw();
        let mut buf = Vec::new();
        write(&mut buf, &raw).unwrap();

        let read_back = read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(read_back, raw);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let mut buf = Vec::new();
        write(&mut buf, &sample_raw()).unwrap();
        buf[0] = b'X';

        let err = read(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), crate::types::ErrorKind::Corrupt);
    }

    #[test]
    fn size_mismatch_is_corrupt() {
        let mut raw = sample_raw();
        raw.n_total = 99;

        let mut buf = Vec::new();
        write(&mut buf, &raw).unwrap();

        let err = read(&mut Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), crate::types::ErrorKind::Corrupt);
    }
}
