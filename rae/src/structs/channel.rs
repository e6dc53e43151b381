//! Actuator channels and the RAE bit chart.
//!
//! Chart numbers are 1-based as printed on the bit chart; [`Channel::bit`] is
//! always 0-based.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::structs::config::CodecConfig;
use crate::utils::errors::ConfigError;

/// One of the two independent control tracks, each carried on its own audio
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Track {
    Td,
    Bd,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Td, Track::Bd];

    pub fn name(&self) -> &'static str {
        match self {
            Track::Td => "TD",
            Track::Bd => "BD",
        }
    }
}

impl Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A (track, bit) assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Channel {
    pub track: Track,
    pub bit: u32,
}

impl Channel {
    pub fn new(track: Track, bit: u32) -> Self {
        Self { track, bit }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bit {}", self.track, self.bit)
    }
}

/// Named channels plus character/movement aliases.
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    names: BTreeMap<String, Channel>,
    owners: BTreeMap<Channel, String>,
    aliases: HashMap<(String, String), Channel>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The Rock-afire Explosion bit chart with its character aliases.
    pub fn rae() -> Self {
        let mut map = Self::new();
        for (track, chart) in [(Track::Td, TD_CHART), (Track::Bd, BD_CHART)] {
            for &(name, number) in chart {
                map.names.insert(name.to_string(), Channel::new(track, number - 1));
                map.owners.insert(Channel::new(track, number - 1), name.to_string());
            }
        }
        for &(character, track, movements) in CHARACTERS {
            for &(movement, bit) in movements {
                map.aliases.insert(
                    (normalize(character), normalize(movement)),
                    Channel::new(track, bit),
                );
            }
        }
        map
    }

    /// Adds a named channel. Names and (track, bit) slots must both be unique.
    pub fn insert(&mut self, name: &str, channel: Channel) -> Result<(), ConfigError> {
        let name = normalize(name);
        if let Some(existing) = self.owners.get(&channel) {
            return Err(ConfigError::DuplicateChannel {
                first: existing.clone(),
                second: name,
                track: channel.track,
                bit: channel.bit,
            });
        }
        if let Some(previous) = self.names.get(&name) {
            return Err(ConfigError::DuplicateChannel {
                first: name.clone(),
                second: name,
                track: previous.track,
                bit: previous.bit,
            });
        }
        self.owners.insert(channel, name.clone());
        self.names.insert(name, channel);
        Ok(())
    }

    pub fn insert_alias(&mut self, character: &str, movement: &str, channel: Channel) {
        self.aliases
            .insert((normalize(character), normalize(movement)), channel);
    }

    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.names.get(&normalize(name)).copied()
    }

    pub fn name_of(&self, channel: Channel) -> Option<&str> {
        self.owners.get(&channel).map(String::as_str)
    }

    /// Looks up an event target.
    ///
    /// Tries the alias table, then the channel `{character}_{movement}`, then a
    /// bare channel name given as the movement.
    pub fn resolve(&self, character: &str, movement: &str) -> Option<Channel> {
        let character = normalize(character);
        let movement = normalize(movement);

        if let Some(&channel) = self.aliases.get(&(character.clone(), movement.clone())) {
            return Some(channel);
        }
        if !character.is_empty() {
            if let Some(&channel) = self.names.get(&format!("{character}_{movement}")) {
                return Some(channel);
            }
        }
        self.names.get(&movement).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Named channels in (track, bit) order.
    pub fn iter(&self) -> impl Iterator<Item = (Channel, &str)> {
        self.owners.iter().map(|(c, n)| (*c, n.as_str()))
    }

    /// Checks every assignment against the frame layout of `config`.
    pub fn validate(&self, config: &CodecConfig) -> Result<(), ConfigError> {
        let aliases = self
            .aliases
            .iter()
            .map(|((c, m), channel)| (format!("{c}/{m}"), *channel));
        let named = self.names.iter().map(|(n, channel)| (n.clone(), *channel));

        for (name, channel) in named.chain(aliases) {
            let layout = config.layout(channel.track);
            if channel.bit >= layout.bits {
                return Err(ConfigError::ChannelOutOfRange {
                    name,
                    track: channel.track,
                    bit: channel.bit,
                    bits: layout.bits,
                });
            }
            if layout.is_reserved(channel.bit) {
                return Err(ConfigError::ChannelOnBlankBit {
                    name,
                    track: channel.track,
                    bit: channel.bit,
                });
            }
        }
        Ok(())
    }
}

fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '.')
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_fits_legacy_layout() -> anyhow::Result<()> {
        let map = ChannelMap::rae();
        assert_eq!(map.len(), 91 + 95);
        map.validate(&CodecConfig::legacy_v1())?;
        map.validate(&CodecConfig::hardware_v2())?;
        Ok(())
    }

    #[test]
    fn resolves_aliases_and_names() {
        let map = ChannelMap::rae();
        assert_eq!(map.resolve("Rolfe", "mouth"), Some(Channel::new(Track::Td, 0)));
        assert_eq!(
            map.resolve("Dook LaRue", "bass_drum"),
            Some(Channel::new(Track::Td, 62))
        );
        assert_eq!(
            map.resolve("Billy Bob", "mouth"),
            Some(Channel::new(Track::Bd, 45))
        );
        assert_eq!(map.resolve("mitzi", "mouth"), Some(Channel::new(Track::Bd, 34)));
        assert_eq!(
            map.resolve("", "spot_guitar"),
            Some(Channel::new(Track::Bd, 95))
        );
        assert_eq!(map.resolve("Rolfe", "tail"), None);
        assert_eq!(map.name_of(Channel::new(Track::Td, 93)), Some("curtain_stage_left_close"));
    }

    #[test]
    fn blank_slots_are_unnamed() {
        let map = ChannelMap::rae();
        for bit in [55, 64, 69] {
            assert_eq!(map.name_of(Channel::new(Track::Td, bit)), None);
        }
        assert_eq!(map.name_of(Channel::new(Track::Bd, 44)), None);
    }

    #[test]
    fn conflicting_assignments_are_rejected() {
        let mut map = ChannelMap::new();
        assert!(map.insert("x", Channel::new(Track::Td, 0)).is_ok());
        assert!(matches!(
            map.insert("y", Channel::new(Track::Td, 0)),
            Err(ConfigError::DuplicateChannel { .. })
        ));
        assert!(matches!(
            map.insert("x", Channel::new(Track::Bd, 1)),
            Err(ConfigError::DuplicateChannel { .. })
        ));

        let mut map = ChannelMap::new();
        assert!(map.insert("lamp", Channel::new(Track::Td, 55)).is_ok());
        assert!(matches!(
            map.validate(&CodecConfig::legacy_v1()),
            Err(ConfigError::ChannelOnBlankBit { .. })
        ));

        let mut map = ChannelMap::new();
        map.insert_alias("Ghost", "wave", Channel::new(Track::Bd, 96));
        assert!(matches!(
            map.validate(&CodecConfig::legacy_v1()),
            Err(ConfigError::ChannelOutOfRange { .. })
        ));
    }
}

#[rustfmt::skip]
const TD_CHART: &[(&str, u32)] = &[
    ("rolfe_mouth", 1), ("rolfe_left_eyelid", 2), ("rolfe_right_eyelid", 3),
    ("rolfe_eyes_left", 4), ("rolfe_eyes_right", 5), ("rolfe_head_left", 6),
    ("rolfe_head_right", 7), ("rolfe_head_up", 8), ("rolfe_left_ear", 9),
    ("rolfe_right_ear", 10), ("rolfe_left_arm_raise", 11), ("rolfe_left_arm_twist", 12),
    ("rolfe_left_elbow", 13), ("rolfe_body_twist_left", 14), ("rolfe_body_twist_right", 15),
    ("rolfe_body_lean", 16), ("rolfe_right_arm_raise", 17), ("rolfe_right_arm_twist", 18),
    ("rolfe_right_elbow_twist", 19), ("rolfe_earl_head_tilt", 20), ("duke_head_right", 21),
    ("duke_head_up", 22), ("duke_left_ear", 23), ("duke_right_ear", 24), ("duke_head_left", 25),
    ("duke_left_eyelid", 26), ("duke_right_eyelid", 27), ("duke_eyes_left", 28),
    ("duke_eyes_right", 29), ("duke_mouth", 30), ("duke_right_elbow", 31),
    ("duke_left_foot_hihat", 32), ("duke_left_arm_swing", 33), ("duke_right_arm_swing", 34),
    ("duke_left_elbow", 35), ("earl_mouth", 36), ("earl_eyebrow", 37), ("props_sun_mouth", 38),
    ("props_sun_raise", 39), ("specials_dual_pressure_td", 40), ("fats_left_eyelid", 41),
    ("fats_right_eyelid", 42), ("fats_eyes_left", 43), ("fats_eyes_right", 44),
    ("fats_mouth", 45), ("props_moon_mouth", 46), ("props_moon_raise", 47),
    ("props_looney_bird_hands", 48), ("props_antioch_down", 49), ("props_baby_bear_raise", 50),
    ("fats_head_tip_left", 51), ("fats_head_tip_right", 52), ("fats_head_up", 53),
    ("fats_head_left", 54), ("fats_head_right", 55), ("fats_left_arm_swing", 57),
    ("fats_right_arm_swing", 58), ("fats_left_elbow", 59), ("fats_right_elbow", 60),
    ("fats_foot_tap", 61), ("fats_body_lean", 62), ("duke_right_foot_bass_drum", 63),
    ("duke_body_lean", 64), ("organ_top_blue", 66), ("organ_top_red", 67),
    ("organ_top_amber", 68), ("organ_top_green", 69), ("organ_leg_top", 71),
    ("organ_leg_mid", 72), ("organ_leg_bottom", 73), ("organ_cont_strobe", 74),
    ("organ_flash_strobe", 75), ("sign_inner", 76), ("sign_mid", 77), ("sign_outer", 78),
    ("sign_cont_strobe", 79), ("sign_flash_strobe", 80), ("spot_mitzi", 81),
    ("spot_beach_bear", 82), ("spot_looney_bird", 83), ("spot_billy_bob", 84),
    ("spot_fats", 85), ("spot_duke", 86), ("spot_rolfe", 87), ("spot_earl", 88),
    ("curtain_stage_right_open", 89), ("curtain_stage_right_close", 90),
    ("curtain_center_stage_open", 91), ("curtain_center_stage_close", 92),
    ("curtain_stage_left_open", 93), ("curtain_stage_left_close", 94),
];

#[rustfmt::skip]
const BD_CHART: &[(&str, u32)] = &[
    ("beachbear_left_eyelid", 1), ("beachbear_right_eyelid", 2), ("beachbear_eye_cross", 3),
    ("beachbear_left_hand_slide", 4), ("beachbear_guitar_raise", 5), ("beachbear_head_left", 6),
    ("beachbear_head_right", 7), ("beachbear_head_up", 8), ("beachbear_left_leg_kick", 9),
    ("beachbear_right_leg_kick", 10), ("beachbear_right_arm_raise", 11),
    ("beachbear_right_arm_twist", 12), ("beachbear_right_elbow_twist", 13),
    ("beachbear_right_wrist", 14), ("beachbear_body_lean", 15), ("beachbear_mouth", 16),
    ("looneybird_mouth", 17), ("mitzi_right_arm_raise", 18), ("mitzi_right_elbow", 19),
    ("mitzi_right_arm_twist", 20), ("looneybird_head_right", 21), ("looneybird_raise", 22),
    ("mitzi_left_arm_raise", 23), ("mitzi_left_elbow", 24), ("mitzi_left_arm_twist", 25),
    ("mitzi_left_ear", 26), ("mitzi_right_ear", 27), ("mitzi_head_left", 28),
    ("mitzi_head_right", 29), ("mitzi_head_up", 30), ("mitzi_left_eyelid", 31),
    ("mitzi_right_eyelid", 32), ("mitzi_eyes_left", 33), ("mitzi_eyes_right", 34),
    ("mitzi_mouth", 35), ("mitzi_body_twist_left", 36), ("mitzi_body_twist_right", 37),
    ("mitzi_body_lean", 38), ("billybob_left_arm_slide", 39), ("billybob_guitar_raise", 40),
    ("looneybird_left_eyelid", 41), ("looneybird_right_eyelid", 42),
    ("looneybird_eye_cross", 43), ("billybob_foot_tap", 44), ("billybob_mouth", 46),
    ("billybob_left_eyelid", 47), ("billybob_right_eyelid", 48), ("billybob_eyes_left", 49),
    ("billybob_eyes_right", 50), ("billybob_head_left", 51), ("billybob_head_right", 52),
    ("billybob_head_tip_left", 53), ("billybob_head_tip_right", 54), ("billybob_head_up", 55),
    ("billybob_right_arm_raise", 56), ("billybob_right_arm_twist", 57),
    ("billybob_right_elbow_twist", 58), ("billybob_right_wrist", 59),
    ("specials_dual_pressure_bd", 60), ("billybob_body_twist_left", 61),
    ("billybob_body_twist_right", 62), ("billybob_body_lean", 63), ("specials_tape_stop", 64),
    ("specials_tape_rewind", 65), ("flood_stage_right_blue", 66),
    ("flood_stage_right_green", 67), ("flood_stage_right_amber", 68),
    ("flood_stage_right_red", 69), ("prop_light_applause", 70), ("flood_center_stage_blue", 71),
    ("flood_center_stage_green", 72), ("flood_center_stage_amber", 73),
    ("flood_center_stage_red", 74), ("prop_light_drums", 75), ("flood_stage_left_blue", 76),
    ("flood_stage_left_green", 77), ("flood_stage_left_amber", 78),
    ("flood_stage_left_red", 79), ("prop_light_fire_still", 80),
    ("flood_backdrop_outside_blue", 81), ("flood_backdrop_inside_amber", 82),
    ("flood_treeline_blue", 83), ("flood_backdrop_inside_blue", 84), ("flood_treeline_red", 85),
    ("flood_bushes_green", 86), ("flood_bushes_red_amber", 87), ("spot_sun", 88),
    ("spot_moon", 89), ("spot_spider", 90), ("prop_light_gas_pump", 91),
    ("stage_light_service_stn_red", 92), ("stage_light_service_stn_blue", 93),
    ("stage_light_rainbow_1_red", 94), ("stage_light_rainbow_2_yellow", 95),
    ("spot_guitar", 96),
];

#[rustfmt::skip]
const CHARACTERS: &[(&str, Track, &[(&str, u32)])] = &[
    ("Rolfe", Track::Td, &[
        ("mouth", 0), ("eyelid_left", 1), ("eyelid_right", 2), ("eye_left", 3),
        ("eye_right", 4), ("head_left", 5), ("head_right", 6), ("head_up", 7), ("ear_left", 8),
        ("ear_right", 9), ("arm_left_raise", 10), ("arm_left_twist", 11), ("elbow_left", 12),
        ("body_twist_left", 13), ("body_twist_right", 14), ("body_lean", 15),
        ("arm_right_raise", 16), ("arm_right_twist", 17), ("elbow_right_twist", 18),
    ]),
    ("Earl", Track::Td, &[
        ("head_tilt", 19), ("mouth", 35), ("eyebrow", 36),
    ]),
    ("Dook LaRue", Track::Td, &[
        ("head_right", 20), ("head_up", 21), ("ear_left", 22), ("ear_right", 23),
        ("head_left", 24), ("eyelid_left", 25), ("eyelid_right", 26), ("eye_left", 27),
        ("eye_right", 28), ("mouth", 29), ("elbow_right", 30), ("hi_hat", 31),
        ("arm_left_swing", 32), ("arm_right_swing", 33), ("elbow_left", 34), ("bass_drum", 62),
        ("body_lean", 63),
    ]),
    ("Fatz", Track::Td, &[
        ("eyelid_left", 40), ("eyelid_right", 41), ("eye_left", 42), ("eye_right", 43),
        ("mouth", 44), ("head_tip_left", 50), ("head_tip_right", 51), ("head_up", 52),
        ("head_left", 53), ("head_right", 54), ("arm_left_swing", 56), ("arm_right_swing", 57),
        ("elbow_left", 58), ("elbow_right", 59), ("foot_tap", 60), ("body_lean", 61),
    ]),
    ("Lights", Track::Td, &[
        ("sun_mouth", 37), ("sun_raise", 38), ("moon_mouth", 45), ("moon_raise", 46),
        ("looney_bird_hands", 47), ("antioch_down", 48), ("baby_bear_raise", 49),
        ("spotlight_mitzi", 80), ("spotlight_beach", 81), ("spotlight_looney", 82),
        ("spotlight_bob", 83), ("spotlight_fats", 84), ("spotlight_duke", 85),
        ("spotlight_rolfe", 86), ("spotlight_earl", 87),
    ]),
    ("Beach Bear", Track::Bd, &[
        ("eyelid_left", 0), ("eyelid_right", 1), ("eye_cross", 2), ("hand_left_slide", 3),
        ("guitar_raise", 4), ("head_left", 5), ("head_right", 6), ("head_up", 7),
        ("leg_left_kick", 8), ("leg_right_kick", 9), ("arm_right_raise", 10),
        ("arm_right_twist", 11), ("elbow_right_twist", 12), ("wrist_right", 13),
        ("body_lean", 14), ("mouth", 15),
    ]),
    ("Looney Bird", Track::Bd, &[
        ("mouth", 16), ("head_right", 20), ("raise", 21), ("eyelid_left", 40),
        ("eyelid_right", 41), ("eye_cross", 42),
    ]),
    ("Mitzi", Track::Bd, &[
        ("arm_right_raise", 17), ("elbow_right", 18), ("arm_right_twist", 19),
        ("arm_left_raise", 22), ("elbow_left", 23), ("arm_left_twist", 24), ("ear_left", 25),
        ("ear_right", 26), ("head_left", 27), ("head_right", 28), ("head_up", 29),
        ("eyelid_left", 30), ("eyelid_right", 31), ("eye_left", 32), ("eye_right", 33),
        ("mouth", 34), ("body_twist_left", 35), ("body_twist_right", 36), ("body_lean", 37),
    ]),
    ("Billy Bob", Track::Bd, &[
        ("arm_left_slide", 38), ("guitar_raise", 39), ("foot_tap", 43), ("mouth", 45),
        ("eyelid_left", 46), ("eyelid_right", 47), ("eye_left", 48), ("eye_right", 49),
        ("head_left", 50), ("head_right", 51), ("head_tip_left", 52), ("head_tip_right", 53),
        ("head_up", 54), ("arm_right_raise", 55), ("arm_right_twist", 56),
        ("elbow_right_twist", 57), ("wrist_right", 58), ("body_twist_left", 60),
        ("body_twist_right", 61), ("body_lean", 62),
    ]),
];
