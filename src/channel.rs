//! Detection channel validation.
//!
//! A detection channel binds a carrier to a physical lane together with NCO
//! and decimation parameters. The hardware only supports certain total
//! decimation factors (the product of the carrier's rate multiple and the
//! channel's decoded decimation code), and the number of active decimation
//! filter stages follows from that total. This module holds the pure
//! validation rules; the configuration manager applies them before any
//! shadow mutation.

use crate::config::{DdcCfg, RachLane, RcCfg, Schedule};
use crate::error::{Error, Result};

/// Total decimation factors realizable by the hardware filter chain.
pub const SUPPORTED_TOTAL_DECIMATION: [u32; 12] = [1, 2, 3, 4, 6, 8, 12, 16, 24, 32, 48, 96];

/// Decodes a decimation-rate code into its decimation factor.
///
/// Returns `None` for codes outside the hardware's encoding.
pub fn decimation_factor(code: u8) -> Option<u32> {
    Some(match code {
        0 => 1,
        1 => 2,
        2 => 4,
        3 => 8,
        4 => 16,
        8 => 3,
        9 => 6,
        10 => 12,
        11 => 24,
        _ => return None,
    })
}

/// Computes the total decimation of a channel bound to a carrier.
///
/// Fails with [`Error::UnsupportedDecimation`] if the code does not decode
/// or the combined factor is not realizable by the filter chain.
pub fn total_decimation(code: u8, rate_class: u8) -> Result<u32> {
    let unsupported = Error::UnsupportedDecimation { code, rate_class };
    let factor = decimation_factor(code).ok_or(unsupported)?;
    let total = factor * (1 << rate_class);
    if SUPPORTED_TOTAL_DECIMATION.contains(&total) {
        Ok(total)
    } else {
        Err(Error::UnsupportedDecimation { code, rate_class })
    }
}

/// Returns how many gain stages are active for a total decimation factor.
///
/// The mixer stage (entry 0) always applies; each further halving of the
/// rate enables one more decimating filter, up to six stages at x96.
pub fn active_gain_stages(total: u32) -> usize {
    match total {
        96.. => 6,
        32.. => 5,
        16.. => 4,
        8.. => 3,
        4.. => 2,
        _ => 1,
    }
}

/// Validates a channel's decimation parameters against its carrier's
/// sample-rate class, returning the total decimation factor.
pub fn validate_ddc(ddc: &DdcCfg, rate_class: u8) -> Result<u32> {
    let total = total_decimation(ddc.decimation_code, rate_class)?;
    if !((0..=4).contains(&ddc.scs) || (12..=15).contains(&ddc.scs)) {
        return Err(Error::OutOfRange {
            field: "ddc_scs",
            value: ddc.scs.into(),
        });
    }
    // The mixer stage gain spans [0,3]; decimation stage gains span [0,1].
    // Stages beyond the active count are ignored by hardware but must still
    // be in range.
    if ddc.stage_gains[0] > 3 {
        return Err(Error::OutOfRange {
            field: "stage_gains[0]",
            value: ddc.stage_gains[0].into(),
        });
    }
    for &gain in ddc.stage_gains.iter().skip(1) {
        if gain > 1 {
            return Err(Error::OutOfRange {
                field: "stage_gains",
                value: gain.into(),
            });
        }
    }
    Ok(total)
}

/// Returns the number of slots per subframe permitted by a carrier's SCS
/// class for static scheduling.
fn slots_for_scs(carrier_scs: u8) -> u8 {
    match carrier_scs {
        0 => 1,
        1 => 2,
        2 => 4,
        // the 240 kHz range is unused by scheduling; accept the full field
        3 => 8,
        _ => 16,
    }
}

/// Validates a static schedule against its carrier's SCS class.
pub fn validate_schedule(schedule: &Schedule, carrier_scs: u8) -> Result<()> {
    if !(1..=256).contains(&schedule.pattern_period) {
        return Err(Error::OutOfRange {
            field: "pattern_period",
            value: schedule.pattern_period.into(),
        });
    }
    if u16::from(schedule.frame_id) >= schedule.pattern_period {
        return Err(Error::OutOfRange {
            field: "frame_id",
            value: schedule.frame_id.into(),
        });
    }
    if schedule.subframe_id > 9 {
        return Err(Error::OutOfRange {
            field: "subframe_id",
            value: schedule.subframe_id.into(),
        });
    }
    if schedule.slot_id >= slots_for_scs(carrier_scs) {
        return Err(Error::OutOfRange {
            field: "slot_id",
            value: schedule.slot_id.into(),
        });
    }
    if !(1..=4096).contains(&schedule.duration) {
        return Err(Error::OutOfRange {
            field: "duration",
            value: schedule.duration.into(),
        });
    }
    if !(1..=256).contains(&schedule.repeats) {
        return Err(Error::OutOfRange {
            field: "repeats",
            value: schedule.repeats.into(),
        });
    }
    Ok(())
}

/// Returns whether a physical lane is bound to an enabled channel other
/// than `except`.
pub fn lane_in_use(channels: &[RcCfg], lane: RachLane, except: Option<usize>) -> bool {
    channels
        .iter()
        .enumerate()
        .any(|(index, rc)| rc.enabled && rc.lane == lane && Some(index) != except)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::RcId;

    #[test]
    fn decimation_code_decode() {
        assert_eq!(decimation_factor(0), Some(1));
        assert_eq!(decimation_factor(4), Some(16));
        assert_eq!(decimation_factor(8), Some(3));
        assert_eq!(decimation_factor(11), Some(24));
        assert_eq!(decimation_factor(5), None);
        assert_eq!(decimation_factor(12), None);
    }

    #[test]
    fn total_decimation_supported_set() {
        // x12 at carrier x2 = 24, realizable
        assert_eq!(total_decimation(10, 1).unwrap(), 24);
        // x24 at carrier x8 = 192, not realizable
        assert!(matches!(
            total_decimation(11, 3),
            Err(Error::UnsupportedDecimation {
                code: 11,
                rate_class: 3
            })
        ));
        // x8 at carrier x8 = 64, not realizable
        assert!(total_decimation(3, 3).is_err());
    }

    #[test]
    fn gain_stage_activation() {
        assert_eq!(active_gain_stages(1), 1);
        assert_eq!(active_gain_stages(3), 1);
        assert_eq!(active_gain_stages(4), 2);
        assert_eq!(active_gain_stages(6), 2);
        assert_eq!(active_gain_stages(12), 3);
        assert_eq!(active_gain_stages(16), 4);
        assert_eq!(active_gain_stages(48), 5);
        assert_eq!(active_gain_stages(96), 6);
    }

    #[test]
    fn ddc_gain_ranges() {
        let mut ddc = DdcCfg {
            decimation_code: 2,
            scs: 0,
            stage_gains: [3, 1, 1, 0, 0, 0],
        };
        assert!(validate_ddc(&ddc, 1).is_ok());
        ddc.stage_gains[0] = 4;
        assert!(validate_ddc(&ddc, 1).is_err());
        ddc.stage_gains[0] = 0;
        ddc.stage_gains[5] = 2;
        assert!(validate_ddc(&ddc, 1).is_err());
    }

    #[test]
    fn ddc_scs_domain() {
        let ddc = DdcCfg {
            decimation_code: 1,
            scs: 12,
            stage_gains: [0; 6],
        };
        assert!(validate_ddc(&ddc, 0).is_ok());
        let ddc = DdcCfg { scs: 5, ..ddc };
        assert!(validate_ddc(&ddc, 0).is_err());
    }

    fn schedule() -> Schedule {
        Schedule {
            pattern_period: 10,
            frame_id: 3,
            subframe_id: 1,
            slot_id: 0,
            duration: 12,
            repeats: 2,
        }
    }

    #[test]
    fn schedule_ranges() {
        assert!(validate_schedule(&schedule(), 0).is_ok());
        let s = Schedule {
            pattern_period: 0,
            ..schedule()
        };
        assert!(validate_schedule(&s, 0).is_err());
        let s = Schedule {
            frame_id: 10,
            ..schedule()
        };
        assert!(validate_schedule(&s, 0).is_err());
        let s = Schedule {
            subframe_id: 10,
            ..schedule()
        };
        assert!(validate_schedule(&s, 0).is_err());
        let s = Schedule {
            duration: 4097,
            ..schedule()
        };
        assert!(validate_schedule(&s, 0).is_err());
        let s = Schedule {
            repeats: 257,
            ..schedule()
        };
        assert!(validate_schedule(&s, 0).is_err());
    }

    #[test]
    fn schedule_slot_constrained_by_scs() {
        let s = Schedule {
            slot_id: 1,
            ..schedule()
        };
        assert!(validate_schedule(&s, 0).is_err());
        assert!(validate_schedule(&s, 1).is_ok());
        let s = Schedule { slot_id: 7, ..s };
        assert!(validate_schedule(&s, 2).is_err());
        assert!(validate_schedule(&s, 3).is_ok());
        let s = Schedule { slot_id: 15, ..s };
        assert!(validate_schedule(&s, 4).is_ok());
    }

    #[test]
    fn lane_collision_detection() {
        let mut channels = [RcCfg::default(); 4];
        channels[1].enabled = true;
        channels[1].rc_id = RcId::new(1).unwrap();
        channels[1].lane = RachLane::new(5).unwrap();
        let lane = RachLane::new(5).unwrap();
        assert!(lane_in_use(&channels, lane, None));
        assert!(!lane_in_use(&channels, lane, Some(1)));
        assert!(!lane_in_use(&channels, RachLane::new(6).unwrap(), None));
    }
}
