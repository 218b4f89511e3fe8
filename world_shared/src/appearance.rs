//! Player appearance and its validation.

use anyhow::bail;
use serde::{Deserialize, Serialize};

pub const CREW_HEAD: u8 = 1;
pub const METAL_HEAD: u8 = 4;
pub const DOWNS_HEAD: u8 = 6;
pub const BEARD_HEAD: u8 = 7;
pub const BALD_HEAD: u8 = 8;
pub const MALE_BODY: u8 = 2;
pub const FEMALE_BODY: u8 = 5;
pub const LEGS: u8 = 3;

const VALID_HEADS: [u8; 5] = [CREW_HEAD, METAL_HEAD, DOWNS_HEAD, BEARD_HEAD, BALD_HEAD];
const VALID_BODIES: [u8; 2] = [MALE_BODY, FEMALE_BODY];
/// Palette sizes; colours are sent as palette indices.
const HEAD_COLOURS: u8 = 10;
const BODY_LEG_COLOURS: u8 = 15;
const SKIN_COLOURS: u8 = 5;

/// How a player looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appearance {
    pub head: u8,
    pub body: u8,
    pub legs: u8,
    pub male: bool,
    pub head_colour: u8,
    pub body_colour: u8,
    pub legs_colour: u8,
    pub skin_colour: u8,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            head: CREW_HEAD,
            body: MALE_BODY,
            legs: LEGS,
            male: true,
            head_colour: 2,
            body_colour: 8,
            legs_colour: 14,
            skin_colour: 0,
        }
    }
}

impl Appearance {
    /// Checks a requested appearance. Out-of-range values are rejected;
    /// female characters asking for male-only parts are corrected.
    pub fn validated(mut self) -> anyhow::Result<Self> {
        if !VALID_HEADS.contains(&self.head)
            || !VALID_BODIES.contains(&self.body)
            || self.legs != LEGS
            || self.head_colour >= HEAD_COLOURS
            || self.body_colour >= BODY_LEG_COLOURS
            || self.legs_colour >= BODY_LEG_COLOURS
            || self.skin_colour >= SKIN_COLOURS
        {
            bail!("invalid appearance {:?}", self);
        }
        if !self.male {
            self.body = FEMALE_BODY;
            if self.head == BEARD_HEAD {
                self.head = METAL_HEAD;
            }
        }
        Ok(self)
    }
}
