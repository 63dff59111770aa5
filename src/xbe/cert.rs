//! Contains the certificate data structures.
//!
//! The certificate contains a lot of metadata for the game (such as the
//! human-readable name of the title, which is useful for display purposes).

use super::raw;
use crate::utils::utf16_cstr;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A certificate included in an XBE image.
///
/// The certificate contains various information about the game (such as its
/// title, region and ratings), as well as a few signing keys.
#[derive(Debug)]
pub struct Certificate {
    /// Creation time of the certificate.
    time_date: SystemTime,
    /// The primary title identifier code.
    title_id: u32,
    /// Title name of the application.
    title_name: String,
    /// Array of alternative `title_id`s (or zeros).
    alt_title_ids: [u32; 16],
    /// Raw allowed media mask. Known bits are listed as `MediaTypes`.
    allowed_media: u32,
    game_region: GameRegion,
    disk_number: u32,
    version: u32,
}

impl Certificate {
    pub(crate) fn from_raw(raw: &raw::Certificate) -> Self {
        Self {
            time_date: UNIX_EPOCH + Duration::from_secs(raw.time_date.into()),
            title_id: raw.title_id,
            title_name: utf16_cstr(&raw.title_name.0),
            alt_title_ids: raw.alt_title_ids,
            allowed_media: {
                let flags = MediaTypes::from_bits_truncate(raw.allowed_media);
                if flags.bits() != raw.allowed_media {
                    warn!(
                        "unknown media type flags: known flags: {:#X}, raw flags: {:#X}",
                        flags.bits(),
                        raw.allowed_media
                    );
                }
                raw.allowed_media
            },
            game_region: {
                let flags = GameRegion::from_bits_truncate(raw.game_region);
                if flags.bits() != raw.game_region {
                    warn!(
                        "unknown game region flags: known flags: {:#X}, raw flags: {:#X}",
                        flags.bits(),
                        raw.game_region
                    );
                }
                flags
            },
            disk_number: raw.disk_number,
            version: raw.version,
        }
    }

    /// Returns the time at which this certificate was created.
    pub fn creation_time(&self) -> &SystemTime {
        &self.time_date
    }

    pub fn title_name(&self) -> &str {
        &self.title_name
    }

    /// Returns the primary title ID of the game.
    ///
    /// For homebrew, this might be 0.
    pub fn title_id(&self) -> u32 {
        self.title_id
    }

    /// Returns the alternate title IDs of the game.
    ///
    /// Likely, not all of these are used, with the rest being set to 0.
    pub fn alt_title_ids(&self) -> &[u32; 16] {
        &self.alt_title_ids
    }

    /// The allowed media mask, including bits without a name.
    pub fn allowed_media(&self) -> u32 {
        self.allowed_media
    }

    /// Bit flags of regions in which this game is available.
    pub fn game_region(&self) -> GameRegion {
        self.game_region
    }

    /// Disc this certificate was created for, counting from 0.
    pub fn disk_number(&self) -> u32 {
        self.disk_number
    }

    /// Certificate version / revision.
    pub fn version(&self) -> u32 {
        self.version
    }
}

bitflags! {
    /// Media type mask used for the `allowed_media` field in `Certificate`.
    pub struct MediaTypes: u32 {
        const HARD_DISK           = 0x00000001;
        const DVD_X2              = 0x00000002;
        const DVD_CD              = 0x00000004;
        const CD                  = 0x00000008;
        const DVD_5_RO            = 0x00000010;
        const DVD_9_RO            = 0x00000020;
        const DVD_5_RW            = 0x00000040;
        const DVD_9_RW            = 0x00000080;
        const DONGLE              = 0x00000100;
        const MEDIA_BOARD         = 0x00000200;
        const NONSECURE_HARD_DISK = 0x40000000;
        const NONSECURE_MODE      = 0x80000000;
    }
}

/// Display names of the `MediaTypes` bits, by bit index.
pub const MEDIA_TYPE_NAMES: &[(u32, &str)] = &[
    (0, "Hard Disk"),
    (1, "XGD1"),
    (2, "DVD/CD"),
    (3, "CD-ROM"),
    (4, "DVD-5 ROM"),
    (5, "DVD-9 ROM"),
    (6, "DVD-5 RW"),
    (7, "DVD-9 RW"),
    (8, "USB"),
    (9, "Media Board"),
    (30, "Nonsecure Hard Disk"),
    (31, "Nonsecure Mode"),
];

bitflags! {
    /// Region flags used in the `game_region` field of `Certificate`.
    pub struct GameRegion: u32 {
        const NA            = 0x00000001;
        const JAPAN         = 0x00000002;
        const REST_OF_WORLD = 0x00000004;
        const MANUFACTURING = 0x80000000;
    }
}

/// Region bitfield names. The manufacturing flag is shown as the fourth bit.
pub const REGION_NAMES: [Option<&str>; 4] = [
    Some("North America"),
    Some("Japan"),
    Some("Rest of World"),
    Some("Manufacturing"),
];

impl GameRegion {
    /// Packs the region into the bit layout of `REGION_NAMES`.
    pub fn display_bits(self) -> u32 {
        let mut bits = self.bits() & 0x7;
        if self.contains(GameRegion::MANUFACTURING) {
            bits |= 1 << 3;
        }
        bits
    }
}

/// Names of the set bits of an allowed media mask.
pub fn media_type_names(media: u32) -> Vec<String> {
    (0..32)
        .filter(|bit| media & (1 << bit) != 0)
        .map(|bit| {
            MEDIA_TYPE_NAMES
                .iter()
                .find(|(b, _)| *b == bit)
                .map_or_else(|| bit.to_string(), |(_, name)| name.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_display_bits() {
        let region = GameRegion::NA | GameRegion::MANUFACTURING;
        assert_eq!(region.display_bits(), 0b1001);
        assert_eq!(GameRegion::all().display_bits(), 0b1111);
    }

    #[test]
    fn media_names() {
        assert_eq!(media_type_names(0x8000_0005), vec!["Hard Disk", "DVD/CD", "Nonsecure Mode"]);
        assert_eq!(media_type_names(1 << 12), vec!["12"]);
        assert!(media_type_names(0).is_empty());
    }
}
