

pub use ::std::io::{Read, Write};
use lebe::prelude::*;
use crate::error::{PassiveResult, Result};


/// Skip `count` bytes of a reader without allocating a buffer for them.
/// Used to jump from the start of the file to `data_offset` before reading
/// the raster, instead of reading and discarding the header bytes twice.
pub fn skip_bytes(read: &mut impl Read, count: u64) -> PassiveResult {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count),
        &mut std::io::sink()
    )?;

    debug_assert_eq!(skipped, count);
    Ok(())
}

/// Read `count` samples of the tile's on-disk pixel width, widened uniformly
/// to `i32` regardless of whether the source was 16 or 32 bit. Bytes are
/// interpreted little-endian, matching `Bytes/pixel` from `TileHeader`.
///
/// `bytes_per_pixel` must already have been validated to be `2` or `4` by
/// the caller (see `RawWidth`); any other value panics rather than silently
/// reading garbage. `bytes` being shorter than `count` samples requires,
/// however, is a real-world condition (a header lying about its own raster
/// dimensions) and is propagated as an error rather than panicking.
pub fn read_raw_samples_widened(bytes: &[u8], bytes_per_pixel: u32, count: usize) -> Result<Vec<i32>> {
    match bytes_per_pixel {
        2 => {
            let mut samples = vec![0_i16; count];
            let mut cursor = bytes;
            cursor.read_from_little_endian_into(&mut samples)?;
            Ok(samples.into_iter().map(i32::from).collect())
        },

        4 => {
            let mut samples = vec![0_i32; count];
            let mut cursor = bytes;
            cursor.read_from_little_endian_into(&mut samples)?;
            Ok(samples)
        },

        other => unreachable!("unsupported bytes_per_pixel {} should have been rejected earlier", other),
    }
}

/// Pack `raw` samples (already widened to `i32` by the decoder) back down to
/// the on-disk pixel width and serialize them little-endian.
pub fn write_raw_samples_narrowed(write: &mut impl Write, bytes_per_pixel: u32, raw: &[i32]) -> PassiveResult {
    match bytes_per_pixel {
        2 => {
            let narrowed: Vec<i16> = raw.iter().map(|&sample| sample as i16).collect();
            write.write_as_little_endian(&narrowed)?;
        },

        4 => {
            write.write_as_little_endian(raw)?;
        },

        other => unreachable!("unsupported bytes_per_pixel {} should have been rejected earlier", other),
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn widen_then_narrow_round_trips_16_bit() {
        let samples: Vec<i16> = vec![-32768, -1, 0, 1, 32767];
        let mut bytes = Vec::new();
        bytes.write_as_little_endian(&samples[..]).unwrap();

        let widened = read_raw_samples_widened(&bytes, 2, samples.len()).unwrap();
        assert_eq!(widened, samples.iter().map(|&s| i32::from(s)).collect::<Vec<_>>());

        let mut packed = Vec::new();
        write_raw_samples_narrowed(&mut packed, 2, &widened).unwrap();
        assert_eq!(packed, bytes);
    }

    #[test]
    fn widen_then_narrow_round_trips_32_bit() {
        let samples: Vec<i32> = vec![i32::MIN, -1, 0, 1, i32::MAX];
        let mut bytes = Vec::new();
        bytes.write_as_little_endian(&samples[..]).unwrap();

        let widened = read_raw_samples_widened(&bytes, 4, samples.len()).unwrap();
        assert_eq!(widened, samples);

        let mut packed = Vec::new();
        write_raw_samples_narrowed(&mut packed, 4, &widened).unwrap();
        assert_eq!(packed, bytes);
    }
}
