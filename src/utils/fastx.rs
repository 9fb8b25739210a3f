use seq_io::fastq::Reader as FastqReader;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use flate2::read::MultiGzDecoder;
use crate::utils::file::is_gzipped;


/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

/// Opens a file, transparently decompressing gzip content.
pub fn file_reader(path: &Path) -> io::Result<FileReader> {
    let gz = is_gzipped(path)?;
    let file = BufReader::new(File::open(path)?);
    if gz {
        Ok(FileReader::Gzipped(MultiGzDecoder::new(file)))
    } else {
        Ok(FileReader::Uncompressed(file))
    }
}


/// Counts the number of records in a FASTQ (plain or gzipped).
///
///
/// # Arguments
///
/// * `path` - Valid path to a fastq file.
///
/// # Returns
/// u64: Number of records in the FASTQ.
///
pub fn count_fastq_reads(path: &Path) -> io::Result<u64> {
    let reader = FastqReader::new(file_reader(path)?);
    let mut counter = 0;
    for record in reader.into_records() {
        record.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        counter += 1;
    }
    Ok(counter)
}


/// Counts reads in a SOLiD csfasta (or qual) file: one `>` header per read,
/// `#` lines are run comments written by the instrument.
pub fn count_csfasta_reads(path: &Path) -> io::Result<u64> {
    let reader = BufReader::new(file_reader(path)?);
    let mut counter = 0;
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        if line.starts_with('>') {
            counter += 1;
        }
    }
    Ok(counter)
}
