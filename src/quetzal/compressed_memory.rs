//! `CMem` encoding of dynamic memory
//!
//! Memory is XORed against the story file's original bytes. Each nonzero
//! result is stored as is; a run of zeros becomes `0, run - 1`.

use log::debug;

use crate::error::BlorbError;

/// Longest run one `0, n` pair can describe
const MAX_RUN: usize = 256;

fn push_run(out: &mut Vec<u8>, mut run: usize) {
    while run > 0 {
        let part = run.min(MAX_RUN);
        out.push(0);
        out.push((part - 1) as u8);
        run -= part;
    }
}

/// Encode `current` against `original`. Unchanged bytes at the end are not
/// written.
pub fn compress_memory(current: &[u8], original: &[u8]) -> Result<Vec<u8>, BlorbError> {
    if current.len() != original.len() {
        return Err(BlorbError::Save(format!(
            "cannot diff {} bytes of memory against {} original bytes",
            current.len(),
            original.len()
        )));
    }

    let mut out = Vec::new();
    let mut zeros = 0;
    for diff in current.iter().zip(original).map(|(c, o)| c ^ o) {
        if diff == 0 {
            zeros += 1;
            continue;
        }
        push_run(&mut out, zeros);
        zeros = 0;
        out.push(diff);
    }

    debug!("CMem: {} bytes of memory encoded in {}", current.len(), out.len());
    Ok(out)
}

/// Rebuild memory from `CMem` data. Anything the data does not cover is
/// copied from `original`.
pub fn decompress_memory(encoded: &[u8], original: &[u8]) -> Result<Vec<u8>, BlorbError> {
    let mut memory = Vec::with_capacity(original.len());
    let mut bytes = encoded.iter();

    while let Some(&b) = bytes.next() {
        let at = memory.len();
        if b != 0 {
            let base = original.get(at).ok_or_else(|| {
                BlorbError::Save(format!("CMem data runs past {} bytes of memory", original.len()))
            })?;
            memory.push(base ^ b);
            continue;
        }

        let run = match bytes.next() {
            Some(&n) => n as usize + 1,
            None => return Err(BlorbError::Save("CMem data ends inside a run".to_string())),
        };
        let unchanged = original.get(at..at + run).ok_or_else(|| {
            BlorbError::Save(format!("CMem run of {} at {} runs past memory", run, at))
        })?;
        memory.extend_from_slice(unchanged);
    }

    let done = memory.len();
    memory.extend_from_slice(&original[done..]);
    Ok(memory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn two_changed_bytes() {
        let original = vec![0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80];
        let current = vec![0x10, 0x21, 0x30, 0x40, 0x50, 0x60, 0x71, 0x80];

        let encoded = compress_memory(&current, &original).unwrap();
        assert_eq!(encoded, vec![0, 0, 0x01, 0, 3, 0x01]);
        assert_eq!(decompress_memory(&encoded, &original).unwrap(), current);
    }

    #[test]
    fn runs_longer_than_256() {
        let original = vec![0xFF; 1000];
        let mut current = original.clone();
        current[600] = 0xFE;

        let encoded = compress_memory(&current, &original).unwrap();
        // 600 unchanged bytes take three pairs
        assert_eq!(encoded, vec![0, 255, 0, 255, 0, 87, 0x01]);
        assert_eq!(decompress_memory(&encoded, &original).unwrap(), current);
    }

    #[test]
    fn unchanged_memory_encodes_to_nothing() {
        let original = vec![7u8; 64];
        assert!(compress_memory(&original, &original).unwrap().is_empty());
        assert_eq!(decompress_memory(&[], &original).unwrap(), original);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(compress_memory(&[1, 2], &[1]).is_err());
        assert!(decompress_memory(&[0], &[1, 2]).is_err());
        assert!(decompress_memory(&[0, 5], &[1, 2]).is_err());
        assert!(decompress_memory(&[1, 1, 1], &[1, 2]).is_err());
    }
}
