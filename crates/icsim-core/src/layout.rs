//! Field layout: which CAN identifier and payload byte carries each channel
//!
//! Exactly one layout is active for the process lifetime. It is either the
//! compiled default, a randomized assignment sampled from a seed, or the
//! default with a named vehicle model's overrides applied.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default door-lock frame (0x19B), state byte 2
pub const DEFAULT_DOOR_ID: u32 = 0x19B;
pub const DEFAULT_DOOR_BYTE: usize = 2;
/// Default turn-signal frame (0x188), state byte 0
pub const DEFAULT_SIGNAL_ID: u32 = 0x188;
pub const DEFAULT_SIGNAL_BYTE: usize = 0;
/// Default speed frame (0x244), bytes 3 and 4
pub const DEFAULT_SPEED_ID: u32 = 0x244;
pub const DEFAULT_SPEED_BYTE: usize = 3;

/// Functional diagnostic request ID (OBD-II broadcast)
pub const DIAG_REQUEST_ID: u32 = 0x7DF;
/// Diagnostic response ID
pub const DIAG_RESPONSE_ID: u32 = 0x7E8;

/// BMW X1 speed frame
const BMW_SPEED_ID: u32 = 0x1B4;
const BMW_SPEED_BYTE: usize = 0;

/// Highest identifier handed out by the randomizer (inclusive)
const RANDOM_ID_MAX: u32 = 2046;

/// Logical channels a frame can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Door,
    Signal,
    Speed,
    Diagnostic,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Door,
        Channel::Signal,
        Channel::Speed,
        Channel::Diagnostic,
    ];
}

/// CAN identifier and payload byte offset of one telemetry channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    pub id: u32,
    pub offset: usize,
}

/// Active channel mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub door: ChannelSpec,
    pub signal: ChannelSpec,
    pub speed: ChannelSpec,
    /// Identifier the SecurityAccess requests arrive on
    pub diagnostic_id: u32,
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self {
            door: ChannelSpec {
                id: DEFAULT_DOOR_ID,
                offset: DEFAULT_DOOR_BYTE,
            },
            signal: ChannelSpec {
                id: DEFAULT_SIGNAL_ID,
                offset: DEFAULT_SIGNAL_BYTE,
            },
            speed: ChannelSpec {
                id: DEFAULT_SPEED_ID,
                offset: DEFAULT_SPEED_BYTE,
            },
            diagnostic_id: DIAG_REQUEST_ID,
        }
    }
}

impl FieldLayout {
    /// Sample a layout from `seed`.
    ///
    /// Identifiers are uniform in `[1, 2046]`. Door and signal offsets fall
    /// in `[0, 8]`, the speed offset in `[0, 7]`. An offset past the end of a
    /// classic frame only ever matches CAN-FD traffic.
    pub fn randomized(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let door_id = rng.gen_range(1..=RANDOM_ID_MAX);
        let signal_id = rng.gen_range(1..=RANDOM_ID_MAX);
        let speed_id = rng.gen_range(1..=RANDOM_ID_MAX);

        Self {
            door: ChannelSpec {
                id: door_id,
                offset: rng.gen_range(0..=8),
            },
            signal: ChannelSpec {
                id: signal_id,
                offset: rng.gen_range(0..=8),
            },
            speed: ChannelSpec {
                id: speed_id,
                offset: rng.gen_range(0..=7),
            },
            diagnostic_id: DIAG_REQUEST_ID,
        }
    }

    /// Default layout with the model's channel overrides applied
    pub fn for_model(model: VehicleModel) -> Self {
        let mut layout = Self::default();
        match model {
            VehicleModel::Bmw => {
                layout.speed = ChannelSpec {
                    id: BMW_SPEED_ID,
                    offset: BMW_SPEED_BYTE,
                };
            }
        }
        layout
    }

    /// Override the diagnostic request identifier
    pub fn with_diagnostic_id(mut self, id: u32) -> Self {
        self.diagnostic_id = id;
        self
    }

    pub fn id_of(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Door => self.door.id,
            Channel::Signal => self.signal.id,
            Channel::Speed => self.speed.id,
            Channel::Diagnostic => self.diagnostic_id,
        }
    }

    /// Every channel routed to `id`.
    ///
    /// Randomized layouts may assign one identifier to several channels; the
    /// frame then feeds each of them.
    pub fn channels_for(&self, id: u32) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL
            .into_iter()
            .filter(move |channel| self.id_of(*channel) == id)
    }
}

/// Named vehicle models selectable at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleModel {
    /// BMW X1: speed on 0x1B4 with the vendor encoding
    Bmw,
}

impl VehicleModel {
    pub const NAMES: &'static [&'static str] = &["bmw"];

    /// Look up a model by name. Matching is by prefix, so `bmw-x1` selects `bmw`.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.starts_with("bmw") {
            Some(Self::Bmw)
        } else {
            None
        }
    }

    pub fn speed_model(self) -> SpeedModel {
        match self {
            Self::Bmw => SpeedModel::Bmw,
        }
    }
}

/// Speed decoding strategy, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedModel {
    /// Big-endian hundredths of km/h, reported in mph
    #[default]
    Metric,
    /// `((b[1] - 208) * 256 + b[0]) / 16`
    Bmw,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = FieldLayout::default();
        assert_eq!(layout.door.id, 0x19B);
        assert_eq!(layout.signal.id, 0x188);
        assert_eq!(layout.speed.id, 0x244);
        assert_eq!(layout.speed.offset, 3);
        assert_eq!(layout.diagnostic_id, 0x7DF);
    }

    #[test]
    fn test_randomized_is_reproducible() {
        assert_eq!(FieldLayout::randomized(1234), FieldLayout::randomized(1234));
    }

    #[test]
    fn test_randomized_bounds() {
        for seed in 0..500 {
            let layout = FieldLayout::randomized(seed);
            for spec in [layout.door, layout.signal, layout.speed] {
                assert!((1..=2046).contains(&spec.id), "seed {seed}: id {}", spec.id);
            }
            assert!(layout.door.offset <= 8);
            assert!(layout.signal.offset <= 8);
            assert!(layout.speed.offset <= 7);
            assert_eq!(layout.diagnostic_id, DIAG_REQUEST_ID);
        }
    }

    #[test]
    fn test_bmw_remaps_speed_only() {
        let layout = FieldLayout::for_model(VehicleModel::Bmw);
        let default = FieldLayout::default();
        assert_eq!(layout.speed, ChannelSpec { id: 0x1B4, offset: 0 });
        assert_eq!(layout.door, default.door);
        assert_eq!(layout.signal, default.signal);
    }

    #[test]
    fn test_model_lookup() {
        assert_eq!(VehicleModel::from_name("bmw"), Some(VehicleModel::Bmw));
        assert_eq!(VehicleModel::from_name("bmw-x1"), Some(VehicleModel::Bmw));
        assert_eq!(VehicleModel::from_name("audi"), None);
        assert_eq!(VehicleModel::from_name(""), None);
    }

    #[test]
    fn test_channels_for_shared_id() {
        let mut layout = FieldLayout::default();
        layout.signal.id = layout.door.id;

        let channels: Vec<_> = layout.channels_for(DEFAULT_DOOR_ID).collect();
        assert_eq!(channels, vec![Channel::Door, Channel::Signal]);
        assert_eq!(layout.channels_for(0x123).count(), 0);
    }
}
