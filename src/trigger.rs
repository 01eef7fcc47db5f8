//! Trigger descriptors.
//!
//! Every hardware action of note (activation, low-power toggle,
//! configuration commit, frame-boundary marking) is gated by a trigger: the
//! action takes effect immediately, or on an edge of a sideband signal bit,
//! or on an edge of the end-of-packet signal. A one-shot trigger disables
//! itself after a single event. The descriptor types here make illegal
//! combinations unrepresentable: a sideband bit only exists when the source
//! is a sideband edge.

use crate::error::{Error, Result};
use crate::regs;
use serde::{Deserialize, Serialize};

/// Event source gating a trigger.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TriggerSource {
    /// Fire as soon as the trigger is armed.
    #[default]
    Immediate,
    /// Fire on an edge of the selected sideband signal bit.
    SidebandEdge {
        /// Sideband bit to watch, `[0-7]`.
        bit: u8,
    },
    /// Fire on an edge of the end-of-packet signal.
    EndOfPacketEdge,
}

/// Signal edge a trigger reacts to.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Edge {
    /// Rising edge.
    #[default]
    Rising,
    /// Falling edge.
    Falling,
    /// Either edge.
    Both,
}

/// A trigger descriptor.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Trigger {
    /// Whether the trigger is armed.
    pub enabled: bool,
    /// Gating source.
    pub source: TriggerSource,
    /// Edge selection. Meaningful for the edge-gated sources.
    pub edge: Edge,
    /// Whether the trigger disables itself after a single event.
    pub one_shot: bool,
}

impl Trigger {
    /// A disabled immediate trigger, the hardware default.
    pub fn disabled() -> Trigger {
        Trigger::default()
    }

    /// An armed immediate one-shot trigger.
    pub fn immediate_one_shot() -> Trigger {
        Trigger {
            enabled: true,
            source: TriggerSource::Immediate,
            edge: Edge::Rising,
            one_shot: true,
        }
    }

    /// Checks the descriptor's field domains.
    pub fn validate(&self) -> Result<()> {
        if let TriggerSource::SidebandEdge { bit } = self.source {
            if bit > 7 {
                return Err(Error::OutOfRange {
                    field: "sideband_bit",
                    value: bit.into(),
                });
            }
        }
        Ok(())
    }

    /// Encodes the descriptor into its register word.
    pub(crate) fn to_word(self) -> u32 {
        use crate::regs::trigger as t;
        let mut word = 0;
        if self.enabled {
            word |= t::ENABLE_BIT;
        }
        let (source, sideband_bit) = match self.source {
            TriggerSource::Immediate => (t::SOURCE_IMMEDIATE, 0),
            TriggerSource::SidebandEdge { bit } => (t::SOURCE_SIDEBAND, u32::from(bit)),
            TriggerSource::EndOfPacketEdge => (t::SOURCE_END_OF_PACKET, 0),
        };
        word |= source << t::SOURCE_SHIFT;
        word |= (sideband_bit & t::SIDEBAND_BIT_MASK) << t::SIDEBAND_BIT_SHIFT;
        let edge = match self.edge {
            Edge::Rising => t::EDGE_RISING,
            Edge::Falling => t::EDGE_FALLING,
            Edge::Both => t::EDGE_BOTH,
        };
        word |= edge << t::EDGE_SHIFT;
        if self.one_shot {
            word |= t::ONE_SHOT_BIT;
        }
        word
    }

    /// Decodes a register word into a descriptor.
    pub(crate) fn from_word(word: u32) -> Result<Trigger> {
        use crate::regs::trigger as t;
        let source = match (word >> t::SOURCE_SHIFT) & t::SOURCE_MASK {
            t::SOURCE_IMMEDIATE => TriggerSource::Immediate,
            t::SOURCE_SIDEBAND => TriggerSource::SidebandEdge {
                bit: ((word >> t::SIDEBAND_BIT_SHIFT) & t::SIDEBAND_BIT_MASK) as u8,
            },
            t::SOURCE_END_OF_PACKET => TriggerSource::EndOfPacketEdge,
            value => {
                return Err(Error::OutOfRange {
                    field: "trigger_source",
                    value,
                })
            }
        };
        let edge = match (word >> t::EDGE_SHIFT) & t::EDGE_MASK {
            t::EDGE_RISING => Edge::Rising,
            t::EDGE_FALLING => Edge::Falling,
            t::EDGE_BOTH => Edge::Both,
            value => {
                return Err(Error::OutOfRange {
                    field: "trigger_edge",
                    value,
                })
            }
        };
        Ok(Trigger {
            enabled: word & t::ENABLE_BIT != 0,
            source,
            edge,
            one_shot: word & t::ONE_SHOT_BIT != 0,
        })
    }
}

/// The named triggers of an instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TriggerKind {
    /// Toggles between the initialized state and operational.
    Activate,
    /// Toggles between low-power and operational.
    LowPower,
    /// Applies the shadow carrier/channel configuration.
    ConfigUpdate,
    /// Marks the boundary of a frame.
    FrameMark,
}

impl TriggerKind {
    /// Returns the register offset of this trigger's descriptor.
    pub(crate) fn offset(self) -> u32 {
        match self {
            TriggerKind::Activate => regs::trigger::ACTIVATE,
            TriggerKind::LowPower => regs::trigger::LOW_POWER,
            TriggerKind::ConfigUpdate => regs::trigger::CONFIG_UPDATE,
            TriggerKind::FrameMark => regs::trigger::FRAME_MARK,
        }
    }
}

/// Descriptors for all four named triggers.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TriggerCfg {
    /// Activate trigger.
    pub activate: Trigger,
    /// Low-power trigger.
    pub low_power: Trigger,
    /// Configuration-update trigger.
    pub config_update: Trigger,
    /// Frame-boundary marker trigger.
    pub frame_mark: Trigger,
}

impl TriggerCfg {
    /// Checks every descriptor's field domains.
    pub fn validate(&self) -> Result<()> {
        self.activate.validate()?;
        self.low_power.validate()?;
        self.config_update.validate()?;
        self.frame_mark.validate()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn word_round_trip() {
        let triggers = [
            Trigger::disabled(),
            Trigger::immediate_one_shot(),
            Trigger {
                enabled: true,
                source: TriggerSource::SidebandEdge { bit: 5 },
                edge: Edge::Falling,
                one_shot: false,
            },
            Trigger {
                enabled: true,
                source: TriggerSource::EndOfPacketEdge,
                edge: Edge::Both,
                one_shot: true,
            },
        ];
        for trigger in triggers {
            assert_eq!(Trigger::from_word(trigger.to_word()).unwrap(), trigger);
        }
    }

    #[test]
    fn sideband_bit_domain() {
        let trigger = Trigger {
            enabled: true,
            source: TriggerSource::SidebandEdge { bit: 8 },
            edge: Edge::Rising,
            one_shot: false,
        };
        assert!(matches!(
            trigger.validate(),
            Err(Error::OutOfRange {
                field: "sideband_bit",
                ..
            })
        ));
    }

    #[test]
    fn invalid_source_encoding_rejected() {
        // source field value 3 is reserved
        let word = 3 << regs::trigger::SOURCE_SHIFT;
        assert!(Trigger::from_word(word).is_err());
        // edge field value 3 is reserved
        let word = 3 << regs::trigger::EDGE_SHIFT;
        assert!(Trigger::from_word(word).is_err());
    }
}
