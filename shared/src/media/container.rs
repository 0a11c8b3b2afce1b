use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Video container families we can recognise from their leading bytes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Debug)]
pub enum MediaContainer {
    /// ISO base media (MP4, M4V, MOV).
    IsoBaseMedia,
    /// Matroska and WebM.
    Matroska,
    Ogg,
}

impl MediaContainer {
    /// Number of leading bytes needed to recognise every supported container.
    pub const SIGNATURE_LENGTH: usize = 12;

    pub fn sniff(leading_bytes: &[u8]) -> Option<Self> {
        if leading_bytes.len() >= 8 && &leading_bytes[4..8] == b"ftyp" {
            Some(Self::IsoBaseMedia)
        } else if leading_bytes.starts_with(&EBML_MAGIC) {
            Some(Self::Matroska)
        } else if leading_bytes.starts_with(b"OggS") {
            Some(Self::Ogg)
        } else {
            None
        }
    }
}

impl Display for MediaContainer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaContainer::IsoBaseMedia => "mp4",
            MediaContainer::Matroska => "matroska",
            MediaContainer::Ogg => "ogg",
        };

        f.write_str(name)
    }
}
