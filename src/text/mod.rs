//! Character-level corpus ingestion.
//!
//! Text is reduced to a fixed 87-symbol alphabet: space, common punctuation,
//! ASCII letters, and digits. Any whitespace normalizes to a single space
//! (consecutive runs collapse), and characters outside the alphabet are
//! skipped entirely. A symbol is an index into the alphabet; the one-hot
//! encoding dimension equals the alphabet size.

use std::fs::File;
use std::io::{self, BufReader, Bytes, Read};
use std::path::Path;

use thiserror::Error;

/// Every representable character, in index order.
const ALPHABET: &[u8] =
    b" .!?\"'()[]{}-@#$%&*<>:;/\\abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Error)]
pub enum TextError {
    #[error("failed to open corpus {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read corpus: {0}")]
    Read(#[from] io::Error),
}

/// Dimension of the one-hot symbol encoding.
pub const fn vector_dim() -> usize {
    ALPHABET.len()
}

/// The alphabet index of a character, if it is representable. Whitespace is
/// normalized to the space symbol first.
pub fn encode(ch: char) -> Option<usize> {
    let normalized = if ch.is_whitespace() { b' ' } else {
        u8::try_from(ch).ok()?
    };
    ALPHABET.iter().position(|&a| a == normalized)
}

/// The character for a symbol index. Panics on an out-of-range symbol, which
/// can only come from a distribution wider than the alphabet.
pub fn decode(symbol: usize) -> char {
    assert!(
        symbol < ALPHABET.len(),
        "symbol {symbol} out of range for alphabet of {}",
        ALPHABET.len()
    );
    char::from(ALPHABET[symbol])
}

/// Streaming reader that maps a text file to alphabet symbols.
pub struct CharacterStream {
    bytes: Bytes<BufReader<File>>,
    /// Last emitted byte, for collapsing whitespace runs.
    prev: u8,
}

impl CharacterStream {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TextError> {
        let file = File::open(path.as_ref()).map_err(|source| TextError::Open {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Ok(Self {
            bytes: BufReader::new(file).bytes(),
            prev: 0,
        })
    }

    /// The next alphabet symbol, or `None` at end of file.
    ///
    /// Whitespace runs collapse to one space symbol; bytes outside the
    /// alphabet are skipped without resetting the run.
    pub fn next_symbol(&mut self) -> Result<Option<usize>, TextError> {
        while let Some(byte) = self.bytes.next().transpose()? {
            let normalized = if byte.is_ascii_whitespace() { b' ' } else { byte };
            if normalized == b' ' && self.prev == b' ' {
                continue;
            }

            let Some(index) = ALPHABET.iter().position(|&a| a == normalized) else {
                continue;
            };

            self.prev = normalized;
            return Ok(Some(index));
        }
        Ok(None)
    }

    /// Up to `max` symbols; shorter only at end of file. `max` may be
    /// `usize::MAX` to read everything, so the preallocation is capped.
    pub fn read_symbols(&mut self, max: usize) -> Result<Vec<usize>, TextError> {
        let mut symbols = Vec::with_capacity(max.min(4096));
        while symbols.len() < max {
            match self.next_symbol()? {
                Some(symbol) => symbols.push(symbol),
                None => break,
            }
        }
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn stream_over(text: &str) -> (tempfile::NamedTempFile, CharacterStream) {
        let mut file = tempfile::NamedTempFile::new().expect("temp corpus");
        file.write_all(text.as_bytes()).expect("write corpus");
        let stream = CharacterStream::open(file.path()).expect("open corpus");
        (file, stream)
    }

    fn decode_all(stream: &mut CharacterStream) -> String {
        let symbols = stream.read_symbols(usize::MAX).expect("read corpus");
        symbols.into_iter().map(decode).collect()
    }

    #[test]
    fn test_encode_decode_round_trip_over_alphabet() {
        for symbol in 0..vector_dim() {
            assert_eq!(encode(decode(symbol)), Some(symbol));
        }
    }

    #[test]
    fn test_whitespace_collapses_to_single_space() {
        let (_file, mut stream) = stream_over("a \t\n  b");
        assert_eq!(decode_all(&mut stream), "a b");
    }

    #[test]
    fn test_unmapped_characters_are_skipped() {
        let (_file, mut stream) = stream_over("c,af\u{e9}e!");
        assert_eq!(decode_all(&mut stream), "cafe!");
    }

    #[test]
    fn test_unbounded_max_reads_to_eof() {
        // usize::MAX means "everything"; it must not be treated as a
        // capacity to allocate up front.
        let (_file, mut stream) = stream_over("hello world");
        let symbols = stream.read_symbols(usize::MAX).expect("read corpus");
        let rendered: String = symbols.into_iter().map(decode).collect();
        assert_eq!(rendered, "hello world");
    }

    #[test]
    fn test_read_symbols_stops_at_eof() {
        let (_file, mut stream) = stream_over("abc");
        let symbols = stream.read_symbols(10).expect("read corpus");
        assert_eq!(symbols.len(), 3);
        assert!(stream.read_symbols(10).expect("read corpus").is_empty());
    }

    #[test]
    fn test_read_symbols_respects_max() {
        let (_file, mut stream) = stream_over("abcdef");
        assert_eq!(stream.read_symbols(4).expect("read corpus").len(), 4);
        assert_eq!(decode_all(&mut stream), "ef");
    }

    #[test]
    fn test_open_missing_file_is_recoverable() {
        let err = CharacterStream::open("/nonexistent/corpus.txt");
        assert!(matches!(err, Err(TextError::Open { .. })));
    }
}
