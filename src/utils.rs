use crate::error::Error;

use std::ops::{Range, RangeFrom};

/// Slice extension methods.
pub trait SliceExt<T> {
    /// Tries to obtain an element or subslice of `self`, returning an
    /// appropriate error if the range is out of bounds.
    fn try_get<R>(&self, range: R) -> Result<&R::Output, Error>
    where
        R: SliceIndex<T>;
}

impl<T> SliceExt<T> for [T] {
    fn try_get<R>(&self, range: R) -> Result<&R::Output, Error>
    where
        R: SliceIndex<T>,
    {
        range.get(self)
    }
}

/// A type that can be used to index a slice.
pub trait SliceIndex<T> {
    type Output: ?Sized;

    /// Get the element or subslice of `slice` at the position indicated by `self`.
    fn get(self, slice: &[T]) -> Result<&Self::Output, Error>;
}

// Headers of every supported format use 32-bit offsets, so only `u32` indexing
// is supported. Care must be taken when calculating addresses as that might
// lead to overflows when using `u32`.

impl<T> SliceIndex<T> for u32 {
    type Output = T;

    fn get(self, slice: &[T]) -> Result<&T, Error> {
        slice.get(self as usize).ok_or_else(|| {
            Error::Malformed(format!(
                "offset points outside buffer (index {} out of bounds of slice with length {})",
                self,
                slice.len()
            ))
        })
    }
}

impl<T> SliceIndex<T> for Range<u32> {
    type Output = [T];

    fn get(self, slice: &[T]) -> Result<&[T], Error> {
        slice
            .get(self.start as usize..self.end as usize)
            .ok_or_else(|| {
                Error::Malformed(format!(
                    "offset points outside buffer (range {}..{} out of bounds of slice with length {})",
                    self.start,
                    self.end,
                    slice.len()
                ))
            })
    }
}

impl<T> SliceIndex<T> for RangeFrom<u32> {
    type Output = [T];

    fn get(self, slice: &[T]) -> Result<&[T], Error> {
        slice.get(self.start as usize..).ok_or_else(|| {
            Error::Malformed(format!(
                "offset points outside buffer (range {}.. out of bounds of slice with length {})",
                self.start,
                slice.len()
            ))
        })
    }
}

/// Rounds `value` up to the next multiple of 64.
pub fn align64(value: u64) -> u64 {
    (value + 63) & !63
}

/// Decodes a NUL-padded Latin-1 string, stopping at the first NUL.
pub fn latin1_cstr(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect()
}

/// Decodes a NUL-padded UTF-16 string, stopping at the first NUL word.
///
/// Invalid UTF-16 is replaced with replacement characters.
pub fn utf16_cstr(words: &[u16]) -> String {
    let end = words.iter().position(|w| *w == 0).unwrap_or(words.len());
    String::from_utf16_lossy(&words[..end])
}

/// Formats a byte count the way file managers do ("12 bytes", "1.5 MiB").
pub fn format_file_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];

    if size < 1024 {
        return if size == 1 {
            "1 byte".to_string()
        } else {
            format!("{} bytes", size)
        };
    }

    let mut value = size as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value < 10.0 {
        format!("{:.2} {}", value, UNITS[unit])
    } else if value < 100.0 {
        format!("{:.1} {}", value, UNITS[unit])
    } else {
        format!("{:.0} {}", value, UNITS[unit])
    }
}

/// The two publisher letters in the high bytes of an Xbox title id.
///
/// Non-printable bytes are shown as `\xNN`.
pub fn title_id_letters(title_id: u32) -> String {
    let mut out = String::new();
    for b in title_id.to_be_bytes().iter().take(2) {
        if b.is_ascii_graphic() || *b == b' ' {
            out.push(*b as char);
        } else {
            out.push_str(&format!("\\x{:02X}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_get_reports_out_of_bounds() {
        let data = [1u8, 2, 3, 4];
        assert_eq!(data.try_get(1..3).unwrap(), &[2, 3]);
        assert_eq!(*data.try_get(3u32).unwrap(), 4);
        assert!(data.try_get(2..5).is_err());
        assert!(data.try_get(5..).is_err());
    }

    #[test]
    fn align() {
        assert_eq!(align64(0), 0);
        assert_eq!(align64(1), 64);
        assert_eq!(align64(64), 64);
        assert_eq!(align64(0x2020), 0x2040);
    }

    #[test]
    fn strings() {
        assert_eq!(latin1_cstr(b"ABC\0DEF"), "ABC");
        assert_eq!(latin1_cstr(b"\xE9t\xE9"), "\u{e9}t\u{e9}");
        assert_eq!(utf16_cstr(&[0x48, 0x69, 0, 0x41]), "Hi");
        assert_eq!(utf16_cstr(&[0x48, 0x69]), "Hi");
    }

    #[test]
    fn title_id_letters_escape_unprintable() {
        assert_eq!(title_id_letters(0x4D53_0001), "MS");
        assert_eq!(title_id_letters(0x0141_0001), "\\x01A");
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(1), "1 byte");
        assert_eq!(format_file_size(512), "512 bytes");
        assert_eq!(format_file_size(1536), "1.50 KiB");
        assert_eq!(format_file_size(128 * 1024 * 1024), "128 MiB");
    }
}
