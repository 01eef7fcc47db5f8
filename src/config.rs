//! Configuration data model.
//!
//! This module contains the value types that describe the PRACH core
//! configuration: validated id newtypes, the immutable model parameters, and
//! the per-carrier and per-channel configuration structures held in the
//! current/shadow double buffer. All types are serde-derived so that the CLI
//! can load them from JSON files.

use crate::error::{Error, Result};
use crate::sequence::CcSequence;
use serde::{Deserialize, Serialize};

/// Maximum number of logical carriers.
pub const MAX_CC: usize = 16;
/// Maximum number of detection channels.
pub const MAX_RC: usize = 16;
/// Maximum number of antennas.
pub const MAX_ANTENNA: usize = 8;

macro_rules! impl_id {
    ($(#[$doc:meta])* $name:ident, $max:expr, $field:literal) => {
        $(#[$doc])*
        #[derive(
            Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Ord, PartialOrd,
            Hash,
        )]
        #[serde(try_from = "u8", into = "u8")]
        pub struct $name(u8);

        impl $name {
            /// Creates a validated id. Fails with [`Error::OutOfRange`] if
            /// the value is outside the hardware id space.
            pub fn new(value: u8) -> Result<$name> {
                if usize::from(value) < $max {
                    Ok($name(value))
                } else {
                    Err(Error::OutOfRange {
                        field: $field,
                        value: value.into(),
                    })
                }
            }

            /// Returns the raw id value.
            pub fn value(self) -> u8 {
                self.0
            }

            /// Returns the id as an array index.
            pub fn index(self) -> usize {
                self.0.into()
            }
        }

        impl TryFrom<u8> for $name {
            type Error = Error;

            fn try_from(value: u8) -> Result<$name> {
                $name::new(value)
            }
        }

        impl From<$name> for u8 {
            fn from(id: $name) -> u8 {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_id!(
    /// Logical carrier id (0-15).
    CcId,
    MAX_CC,
    "cc_id"
);
impl_id!(
    /// Detection channel id (0-15).
    RcId,
    MAX_RC,
    "rc_id"
);
impl_id!(
    /// Physical detection lane (0-15).
    RachLane,
    MAX_RC,
    "rach_lane"
);
impl_id!(
    /// Antenna index (0-7).
    Antenna,
    MAX_ANTENNA,
    "antenna"
);

/// Model parameters of the IP core.
///
/// These describe the hardware build and are immutable for the lifetime of
/// an instance. They are read from the model parameters register at
/// configuration time.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ModelParams {
    /// Number of antennas, `[1-8]`.
    pub num_antenna: u8,
    /// Number of carriers per antenna, `[1-8]`.
    pub num_cc_per_antenna: u8,
    /// Number of physical detection channels, `[1-16]`.
    pub num_rach_channels: u8,
    /// Whether the core has a control stream interface.
    pub has_axis_ctrl: bool,
    /// Whether the core has an interrupt output.
    pub has_irq: bool,
}

impl ModelParams {
    /// Checks that every parameter is within its documented domain.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ANTENNA as u8).contains(&self.num_antenna) {
            return Err(Error::OutOfRange {
                field: "num_antenna",
                value: self.num_antenna.into(),
            });
        }
        if !(1..=MAX_ANTENNA as u8).contains(&self.num_cc_per_antenna) {
            return Err(Error::OutOfRange {
                field: "num_cc_per_antenna",
                value: self.num_cc_per_antenna.into(),
            });
        }
        if !(1..=MAX_RC as u8).contains(&self.num_rach_channels) {
            return Err(Error::OutOfRange {
                field: "num_rach_channels",
                value: self.num_rach_channels.into(),
            });
        }
        Ok(())
    }
}

/// Configuration of a single carrier.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CarrierCfg {
    /// Whether the carrier is enabled. Set by the allocation operations.
    pub enabled: bool,
    /// Sub-carrier-spacing class, `[0-4]` (15, 30, 60, 120, 240 kHz).
    pub scs: u8,
    /// Sample-rate class, `[0-3]`, implying a x1/x2/x4/x8 rate multiple
    /// relative to the reference clock.
    pub rate_class: u8,
}

impl CarrierCfg {
    /// Checks the SCS and rate class domains.
    pub fn validate(&self) -> Result<()> {
        if self.scs > 4 {
            return Err(Error::OutOfRange {
                field: "scs",
                value: self.scs.into(),
            });
        }
        if self.rate_class > 3 {
            return Err(Error::OutOfRange {
                field: "rate_class",
                value: self.rate_class.into(),
            });
        }
        Ok(())
    }

    /// Returns the rate multiple implied by the sample-rate class.
    pub fn rate_multiple(&self) -> u32 {
        1 << self.rate_class
    }
}

/// One snapshot of the carrier-side configuration.
///
/// Two of these exist per instance: "current" (last committed, mirrors the
/// hardware as best known to software) and "shadow" (under construction).
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct CcCfg {
    /// The TDM slot sequence.
    pub sequence: CcSequence,
    /// Per-carrier configuration, indexed by carrier id.
    pub carriers: [CarrierCfg; MAX_CC],
    /// Antenna TDM slot enablement.
    pub antenna_cfg: [bool; MAX_ANTENNA],
}

/// NCO parameters of a detection channel.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct NcoCfg {
    /// Phase offset applied to the phase accumulator.
    pub phase_offset: u32,
    /// Initial phase accumulator value.
    pub phase_acc: u32,
    /// Initial dual-modulus count, for fractional frequencies.
    pub dual_mod_count: u32,
    /// Initial dual-modulus select, `[0-1]`.
    pub dual_mod_sel: u8,
    /// Frequency word in multiples of the PRACH SCS, `[0-2^24)`.
    pub frequency: u32,
    /// Output gain, `[0-3]` (0, -3, -6, -9 dB).
    pub nco_gain: u8,
}

impl NcoCfg {
    /// Checks every field against its documented domain.
    pub fn validate(&self) -> Result<()> {
        if self.dual_mod_sel > 1 {
            return Err(Error::OutOfRange {
                field: "dual_mod_sel",
                value: self.dual_mod_sel.into(),
            });
        }
        if self.frequency >= 1 << 24 {
            return Err(Error::OutOfRange {
                field: "frequency",
                value: self.frequency,
            });
        }
        if self.nco_gain > 3 {
            return Err(Error::OutOfRange {
                field: "nco_gain",
                value: self.nco_gain.into(),
            });
        }
        Ok(())
    }
}

/// Decimation filter parameters of a detection channel.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DdcCfg {
    /// Decimation-rate code, one of `{0,1,2,3,4,8,9,10,11}` decoding to
    /// x1/x2/x4/x8/x16/x3/x6/x12/x24.
    pub decimation_code: u8,
    /// Sub-carrier spacing of the transmission this channel decimates,
    /// `[0-4]` or `[12-15]`.
    pub scs: u8,
    /// Per-stage gains. Entry 0 is the mixer stage, `[0-3]`; entries 1-5
    /// are decimation stages, `[0-1]`, applied only when the total
    /// decimation activates the stage.
    pub stage_gains: [u8; 6],
}

/// Static capture schedule of a detection channel.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Schedule {
    /// Duration in frames of the repeating enablement pattern, `[1-256]`.
    pub pattern_period: u16,
    /// First frame within the pattern enabled for capture. Must be less
    /// than `pattern_period`.
    pub frame_id: u8,
    /// Subframe at which a capture begins, `[0-9]`.
    pub subframe_id: u8,
    /// Slot at which a capture begins. The carrier's SCS class constrains
    /// the legal range.
    pub slot_id: u8,
    /// Duration of a single capture, in slots, `[1-4096]`.
    pub duration: u16,
    /// Number of consecutive captures, `[1-256]`.
    pub repeats: u16,
}

/// Configuration of a single detection channel.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RcCfg {
    /// Whether this channel is enabled.
    pub enabled: bool,
    /// Channel id, the identifier on the detection output interface.
    pub rc_id: RcId,
    /// Physical detection lane bound to this channel.
    pub lane: RachLane,
    /// Carrier the channel takes its input from.
    pub cc_id: CcId,
    /// Whether hardware must reinitialize the channel's phase state at the
    /// next configuration update.
    pub restart: bool,
    /// NCO parameters.
    pub nco: NcoCfg,
    /// Decimation parameters.
    pub ddc: DdcCfg,
    /// Optional static capture schedule.
    pub schedule: Option<Schedule>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn id_bounds() {
        assert!(CcId::new(15).is_ok());
        assert!(CcId::new(16).is_err());
        assert!(RcId::new(15).is_ok());
        assert!(RcId::new(16).is_err());
        assert!(Antenna::new(7).is_ok());
        assert!(Antenna::new(8).is_err());
    }

    #[test]
    fn id_serde_rejects_out_of_range() {
        assert!(serde_json::from_str::<CcId>("3").is_ok());
        assert!(serde_json::from_str::<CcId>("16").is_err());
    }

    #[test]
    fn model_params_domain() {
        let params = ModelParams {
            num_antenna: 4,
            num_cc_per_antenna: 4,
            num_rach_channels: 8,
            has_axis_ctrl: true,
            has_irq: true,
        };
        assert!(params.validate().is_ok());
        let bad = ModelParams {
            num_antenna: 9,
            ..params
        };
        assert!(bad.validate().is_err());
        let bad = ModelParams {
            num_rach_channels: 0,
            ..params
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn carrier_cfg_domain() {
        let cfg = CarrierCfg {
            enabled: true,
            scs: 1,
            rate_class: 2,
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.rate_multiple(), 4);
        assert!(CarrierCfg { scs: 5, ..cfg }.validate().is_err());
        assert!(CarrierCfg {
            rate_class: 4,
            ..cfg
        }
        .validate()
        .is_err());
    }

    #[test]
    fn nco_domain() {
        let nco = NcoCfg::default();
        assert!(nco.validate().is_ok());
        assert!(NcoCfg {
            frequency: 1 << 24,
            ..nco
        }
        .validate()
        .is_err());
        assert!(NcoCfg {
            nco_gain: 4,
            ..nco
        }
        .validate()
        .is_err());
    }
}
