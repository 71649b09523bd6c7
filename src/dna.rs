//! Avatar appearance descriptors.
//!
//! The DNA is an opaque 16-byte descriptor produced by the client's avatar
//! maker. The server never interprets it beyond structural and range checks,
//! plus deriving the placeholder name ("Peach Dog") a fresh avatar carries
//! until it is named.
//!
//! ```text
//! [0]  't'            [6]  arm color     [10] top texture      [13] sleeve color
//! [1]  species        [7]  glove color   [11] top color        [14] bottom texture
//! [2]  head shape     [8]  leg color     [12] sleeve texture   [15] bottom color
//! [3]  torso          [9]  head color
//! [4]  legs
//! [5]  gender
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use thiserror::Error;

/// Encoded DNA length in bytes.
pub const DNA_LEN: usize = 16;

/// Leading type byte for avatar DNA.
const DNA_TAG: u8 = b't';

/// Species names, indexed by DNA byte 1.
pub const SPECIES: &[&str] = &[
    "Dog", "Cat", "Horse", "Mouse", "Rabbit", "Duck", "Monkey", "Bear", "Pig",
];

/// Body colors, indexed by the arm/leg/head color bytes.
pub const COLORS: &[&str] = &[
    "White",
    "Peach",
    "Bright Red",
    "Red",
    "Maroon",
    "Sienna",
    "Brown",
    "Tan",
    "Coral",
    "Orange",
    "Yellow",
    "Cream",
    "Citrine",
    "Lime",
    "Sea Green",
    "Green",
    "Light Blue",
    "Aqua",
    "Blue",
    "Periwinkle",
    "Royal Blue",
    "Slate Blue",
    "Purple",
    "Lavender",
    "Pink",
    "Plum",
    "Black",
];

const HEAD_SHAPES: u8 = 4;
const TORSOS: u8 = 9;
const LEG_SIZES: u8 = 3;
const GENDERS: u8 = 2;
const SHIRT_TEXTURES: u8 = 64;
const CLOTH_COLORS: u8 = 32;
const BOTTOM_TEXTURES: u8 = 32;

/// Structural or range violation in a DNA descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnaError {
    #[error("dna must be {DNA_LEN} bytes, got {0}")]
    Length(usize),
    #[error("dna type tag {0:#04x} is not an avatar")]
    Tag(u8),
    #[error("dna field {field} out of range: {value}")]
    Range { field: &'static str, value: u8 },
    #[error("gloves must be white")]
    GloveColor,
}

/// A validated appearance descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct AvatarDna(Vec<u8>);

impl AvatarDna {
    /// Validate raw client bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, DnaError> {
        if bytes.len() != DNA_LEN {
            return Err(DnaError::Length(bytes.len()));
        }
        if bytes[0] != DNA_TAG {
            return Err(DnaError::Tag(bytes[0]));
        }

        let color_count = COLORS.len() as u8;
        let limits: [(&'static str, usize, u8); 14] = [
            ("species", 1, SPECIES.len() as u8),
            ("head", 2, HEAD_SHAPES),
            ("torso", 3, TORSOS),
            ("legs", 4, LEG_SIZES),
            ("gender", 5, GENDERS),
            ("arm_color", 6, color_count),
            ("leg_color", 8, color_count),
            ("head_color", 9, color_count),
            ("top_texture", 10, SHIRT_TEXTURES),
            ("top_color", 11, CLOTH_COLORS),
            ("sleeve_texture", 12, SHIRT_TEXTURES),
            ("sleeve_color", 13, CLOTH_COLORS),
            ("bottom_texture", 14, BOTTOM_TEXTURES),
            ("bottom_color", 15, CLOTH_COLORS),
        ];
        for (field, index, limit) in limits {
            if bytes[index] >= limit {
                return Err(DnaError::Range {
                    field,
                    value: bytes[index],
                });
            }
        }

        if bytes[7] != 0 {
            return Err(DnaError::GloveColor);
        }

        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn species(&self) -> &'static str {
        SPECIES[self.0[1] as usize]
    }

    pub fn head_color(&self) -> &'static str {
        COLORS[self.0[9] as usize]
    }

    /// Name given to a freshly created avatar: head color plus species.
    pub fn placeholder_name(&self) -> String {
        format!("{} {}", self.head_color(), self.species())
    }

    /// Lowercase hex rendering for audit events.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 2);
        for byte in &self.0 {
            let _ = write!(out, "{:02x}", byte);
        }
        out
    }
}

impl TryFrom<Vec<u8>> for AvatarDna {
    type Error = DnaError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::parse(&bytes)
    }
}

impl From<AvatarDna> for Vec<u8> {
    fn from(dna: AvatarDna) -> Self {
        dna.0
    }
}
