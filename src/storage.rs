use crate::Result;
use crate::cache::PrimeStore;
use chrono::Local;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

pub const PRIMES_TEXT_FILE: &str = "primes.txt";
pub const PRIMES_BINARY_FILE: &str = "primes.bin";
pub const EXECUTION_LOG_FILE: &str = "execution_log.txt";

/// `$XDG_DATA_HOME/primefinder`, falling back to `~/.local/share/primefinder`.
pub fn data_dir() -> io::Result<PathBuf> {
    let xdg_data_home = env::var("XDG_DATA_HOME")
        .ok()
        .and_then(|path| {
            if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            }
        })
        .or_else(|| {
            env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".local/share"))
        })
        .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "Could not determine data directory"))?;

    Ok(xdg_data_home.join("primefinder"))
}

/// Write one prime per line.
pub fn save_primes_text(path: &Path, primes: &[u64]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(256 * 1024, file);
    write_primes_text(&mut writer, primes)?;
    writer.flush()
}

/// One prime per line, formatted with itoa.
pub fn write_primes_text<W: Write>(writer: &mut W, primes: &[u64]) -> io::Result<()> {
    let mut itoa_buf = itoa::Buffer::new();
    for &prime in primes {
        writer.write_all(itoa_buf.format(prime).as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Write primes as 8-byte little-endian words.
pub fn save_primes_binary(path: &Path, primes: &[u64]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(256 * 1024, file);
    for &prime in primes {
        writer.write_all(&prime.to_le_bytes())?;
    }
    writer.flush()
}

/// Read little-endian primes, stopping at the first one above `limit`.
///
/// A missing file reads as empty.
pub fn load_primes_binary(path: &Path, limit: u64) -> io::Result<Vec<u64>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::with_capacity(256 * 1024, file);
    let mut primes = Vec::new();
    let mut word = [0_u8; 8];

    loop {
        match reader.read_exact(&mut word) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let prime = u64::from_le_bytes(word);
        if prime > limit {
            break;
        }
        primes.push(prime);
    }

    Ok(primes)
}

/// Append "timestamp | command | limit | algorithm | duration" to the log.
pub fn log_execution(
    dir: &Path,
    command: &str,
    limit: u64,
    algorithm: &str,
    duration_us: u128,
) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    let log_path = dir.join(EXECUTION_LOG_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

    writeln!(
        file,
        "{} | {} | {} | {} | {}us",
        timestamp, command, limit, algorithm, duration_us
    )?;

    Ok(())
}

pub fn read_execution_log(dir: &Path) -> io::Result<Vec<String>> {
    let file = match File::open(dir.join(EXECUTION_LOG_FILE)) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    BufReader::new(file).lines().collect()
}

/// [`PrimeStore`] backed by a binary prime file.
///
/// Writes go to a sibling temp file that is renamed into place, so a failed
/// write leaves the previous contents readable.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `primes.bin` in [`data_dir`].
    pub fn in_data_dir() -> io::Result<Self> {
        Ok(Self::new(data_dir()?.join(PRIMES_BINARY_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PrimeStore for FileStore {
    fn put(&mut self, primes: &[u64]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("bin.tmp");
        save_primes_binary(&tmp, primes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn range_up_to(&self, limit: u64) -> Result<Vec<u64>> {
        Ok(load_primes_binary(&self.path, limit)?)
    }
}
