//! Register map of the PRACH IP core.
//!
//! Byte offsets within the UIO mapping, plus the packed-field layout of each
//! register. Writes to the `next` block land in the hardware's shadow
//! configuration and only take effect when the ConfigUpdate trigger fires.

/// Core identification and control registers.
pub mod core {
    /// Hardware version: major `[23:16]`, minor `[15:8]`, patch `[7:0]`.
    pub const VERSION: u32 = 0x0000;
    /// Soft reset. Writing 1 resets the core.
    pub const RESET: u32 = 0x0004;
    /// Model parameters, fixed at hardware build time.
    pub const MODEL_PARAMS: u32 = 0x0008;
    /// Reads 1 while the core is operational.
    pub const OPERATIONAL: u32 = 0x000c;
    /// Reads 1 while the core is in the low-power state.
    pub const LOW_POWER: u32 = 0x0010;
    /// Product identification word.
    pub const PRODUCT_ID: u32 = 0x0018;

    /// Expected value of [`PRODUCT_ID`] (`"PRCH"`).
    pub const PRODUCT_ID_VALUE: u32 = 0x5052_4348;

    /// Shift of the version major field.
    pub const VERSION_MAJOR_SHIFT: u32 = 16;
    /// Shift of the version minor field.
    pub const VERSION_MINOR_SHIFT: u32 = 8;
    /// Mask of each version field.
    pub const VERSION_FIELD_MASK: u32 = 0xff;

    /// Shift of the antenna count field.
    pub const MODEL_NUM_ANTENNA_SHIFT: u32 = 0;
    /// Mask of the antenna count field.
    pub const MODEL_NUM_ANTENNA_MASK: u32 = 0xf;
    /// Shift of the carriers-per-antenna field.
    pub const MODEL_NUM_CC_SHIFT: u32 = 4;
    /// Mask of the carriers-per-antenna field.
    pub const MODEL_NUM_CC_MASK: u32 = 0xf;
    /// Shift of the detection channel count field.
    pub const MODEL_NUM_RACH_SHIFT: u32 = 8;
    /// Mask of the detection channel count field.
    pub const MODEL_NUM_RACH_MASK: u32 = 0x1f;
    /// Control-stream capability flag.
    pub const MODEL_HAS_CTRL_BIT: u32 = 1 << 16;
    /// Interrupt capability flag.
    pub const MODEL_HAS_IRQ_BIT: u32 = 1 << 17;
}

/// Trigger descriptor registers, one per named trigger.
///
/// Each register packs a full trigger descriptor: enable bit 0, source
/// `[2:1]`, sideband bit select `[6:4]`, edge `[9:8]`, one-shot bit 12.
pub mod trigger {
    /// Activate trigger (Ready/Operational toggle).
    pub const ACTIVATE: u32 = 0x0020;
    /// Low-power trigger.
    pub const LOW_POWER: u32 = 0x0024;
    /// Configuration-update trigger.
    pub const CONFIG_UPDATE: u32 = 0x0028;
    /// Frame-boundary marker trigger.
    pub const FRAME_MARK: u32 = 0x002c;

    /// Trigger enable.
    pub const ENABLE_BIT: u32 = 1 << 0;
    /// Shift of the source field.
    pub const SOURCE_SHIFT: u32 = 1;
    /// Mask of the source field.
    pub const SOURCE_MASK: u32 = 0x3;
    /// Source: fire immediately on arming.
    pub const SOURCE_IMMEDIATE: u32 = 0;
    /// Source: edge on a sideband signal bit.
    pub const SOURCE_SIDEBAND: u32 = 1;
    /// Source: edge on the end-of-packet signal.
    pub const SOURCE_END_OF_PACKET: u32 = 2;
    /// Shift of the sideband bit select field.
    pub const SIDEBAND_BIT_SHIFT: u32 = 4;
    /// Mask of the sideband bit select field.
    pub const SIDEBAND_BIT_MASK: u32 = 0x7;
    /// Shift of the edge field.
    pub const EDGE_SHIFT: u32 = 8;
    /// Mask of the edge field.
    pub const EDGE_MASK: u32 = 0x3;
    /// Edge: rising.
    pub const EDGE_RISING: u32 = 0;
    /// Edge: falling.
    pub const EDGE_FALLING: u32 = 1;
    /// Edge: both.
    pub const EDGE_BOTH: u32 = 2;
    /// One-shot: trigger auto-disables after a single event.
    pub const ONE_SHOT_BIT: u32 = 1 << 12;
}

/// Shadow ("next") configuration registers.
///
/// The hardware buffers these internally; the live configuration is not
/// disturbed until the ConfigUpdate trigger fires.
pub mod next {
    /// Declared TDM sequence length, `[1-16]` (0 when empty).
    pub const SEQ_LENGTH: u32 = 0x0040;
    /// First of 16 sequence slot entries, 4 bytes apart.
    pub const SEQ_BASE: u32 = 0x0044;
    /// First of 16 per-carrier configuration words, 4 bytes apart.
    pub const CARRIER_BASE: u32 = 0x0090;
    /// Antenna TDM slot enablement bitmap, one bit per antenna.
    pub const ANTENNA: u32 = 0x00d0;
    /// First per-channel register block.
    pub const RC_BASE: u32 = 0x0100;
    /// Stride between per-channel register blocks.
    pub const RC_STRIDE: u32 = 0x40;

    /// Sequence slot entry valid flag (entry holds a carrier id when set).
    pub const SEQ_VALID_BIT: u32 = 1 << 8;
    /// Mask of the sequence slot carrier id field.
    pub const SEQ_CCID_MASK: u32 = 0xf;

    /// Carrier enable.
    pub const CARRIER_ENABLE_BIT: u32 = 1 << 0;
    /// Shift of the carrier sub-carrier-spacing class field.
    pub const CARRIER_SCS_SHIFT: u32 = 4;
    /// Mask of the carrier sub-carrier-spacing class field.
    pub const CARRIER_SCS_MASK: u32 = 0x7;
    /// Shift of the carrier sample-rate class field.
    pub const CARRIER_RATE_SHIFT: u32 = 8;
    /// Mask of the carrier sample-rate class field.
    pub const CARRIER_RATE_MASK: u32 = 0x3;

    /// Channel control word.
    pub const RC_CTRL: u32 = 0x00;
    /// NCO phase offset.
    pub const RC_NCO_PHASE_OFFSET: u32 = 0x04;
    /// NCO initial phase accumulator.
    pub const RC_NCO_PHASE_ACC: u32 = 0x08;
    /// NCO dual-modulus count.
    pub const RC_NCO_DUAL_MOD_COUNT: u32 = 0x0c;
    /// NCO dual-modulus select.
    pub const RC_NCO_DUAL_MOD_SEL: u32 = 0x10;
    /// NCO frequency word.
    pub const RC_NCO_FREQUENCY: u32 = 0x14;
    /// NCO output gain.
    pub const RC_NCO_GAIN: u32 = 0x18;
    /// DDC control word.
    pub const RC_DDC_CTRL: u32 = 0x1c;
    /// DDC per-stage gain word.
    pub const RC_DDC_GAIN: u32 = 0x20;
    /// Static schedule control word.
    pub const RC_SCHED_CTRL: u32 = 0x24;
    /// Static schedule start position word.
    pub const RC_SCHED_START: u32 = 0x28;
    /// Static schedule capture word.
    pub const RC_SCHED_CAPTURE: u32 = 0x2c;

    /// Channel enable (control word bit 0).
    pub const RC_CTRL_ENABLE_BIT: u32 = 1 << 0;
    /// Channel restart request (control word bit 1).
    pub const RC_CTRL_RESTART_BIT: u32 = 1 << 1;
    /// Shift of the channel id field in the control word.
    pub const RC_CTRL_RCID_SHIFT: u32 = 4;
    /// Shift of the physical lane field in the control word.
    pub const RC_CTRL_LANE_SHIFT: u32 = 8;
    /// Shift of the carrier id field in the control word.
    pub const RC_CTRL_CCID_SHIFT: u32 = 12;
    /// Mask of each id field in the control word.
    pub const RC_CTRL_ID_MASK: u32 = 0xf;

    /// Shift of the decimation-rate code in the DDC control word.
    pub const RC_DDC_RATE_SHIFT: u32 = 0;
    /// Mask of the decimation-rate code.
    pub const RC_DDC_RATE_MASK: u32 = 0xf;
    /// Shift of the DDC sub-carrier-spacing code.
    pub const RC_DDC_SCS_SHIFT: u32 = 4;
    /// Mask of the DDC sub-carrier-spacing code.
    pub const RC_DDC_SCS_MASK: u32 = 0xf;

    /// Bits per DDC gain stage field; stage `n` sits at `[2n+1:2n]`.
    pub const RC_DDC_GAIN_STAGE_BITS: u32 = 2;
    /// Mask of one DDC gain stage field.
    pub const RC_DDC_GAIN_STAGE_MASK: u32 = 0x3;

    /// Static scheduling mode (schedule control word bit 0).
    pub const RC_SCHED_MODE_BIT: u32 = 1 << 0;
    /// Shift of the pattern-period-minus-one field.
    pub const RC_SCHED_PERIOD_SHIFT: u32 = 8;
    /// Mask of the pattern-period-minus-one field.
    pub const RC_SCHED_PERIOD_MASK: u32 = 0xff;

    /// Shift of the first-enabled-frame field.
    pub const RC_SCHED_FRAME_SHIFT: u32 = 0;
    /// Mask of the first-enabled-frame field.
    pub const RC_SCHED_FRAME_MASK: u32 = 0xff;
    /// Shift of the subframe field.
    pub const RC_SCHED_SUBFRAME_SHIFT: u32 = 8;
    /// Mask of the subframe field.
    pub const RC_SCHED_SUBFRAME_MASK: u32 = 0xf;
    /// Shift of the slot field.
    pub const RC_SCHED_SLOT_SHIFT: u32 = 12;
    /// Mask of the slot field.
    pub const RC_SCHED_SLOT_MASK: u32 = 0xf;

    /// Shift of the capture-duration-minus-one field.
    pub const RC_SCHED_DURATION_SHIFT: u32 = 0;
    /// Mask of the capture-duration-minus-one field.
    pub const RC_SCHED_DURATION_MASK: u32 = 0xfff;
    /// Shift of the repeats-minus-one field.
    pub const RC_SCHED_REPEATS_SHIFT: u32 = 16;
    /// Mask of the repeats-minus-one field.
    pub const RC_SCHED_REPEATS_MASK: u32 = 0xff;
}

/// Overflow/overrun status registers.
///
/// Each status word packs: flag bit 0, first offending antenna `[6:4]`,
/// first offending channel `[11:8]`.
pub mod status {
    /// Mixer overflow status.
    pub const MIXER_OVERFLOW: u32 = 0x0500;
    /// Decimator overflow status.
    pub const DECIMATOR_OVERFLOW: u32 = 0x0504;
    /// Mixer overrun status.
    pub const MIXER_OVERRUN: u32 = 0x0508;
    /// Decimator overrun status.
    pub const DECIMATOR_OVERRUN: u32 = 0x050c;
    /// Write 1 to clear all status registers.
    pub const CLEAR: u32 = 0x0510;

    /// Event-occurred flag.
    pub const FLAG_BIT: u32 = 1 << 0;
    /// Shift of the first offending antenna field.
    pub const ANTENNA_SHIFT: u32 = 4;
    /// Mask of the first offending antenna field.
    pub const ANTENNA_MASK: u32 = 0x7;
    /// Shift of the first offending channel field.
    pub const RCID_SHIFT: u32 = 8;
    /// Mask of the first offending channel field.
    pub const RCID_MASK: u32 = 0xf;
}

/// Interrupt mask and status registers.
pub mod irq {
    /// Per-cause interrupt enable bits.
    pub const MASK: u32 = 0x0540;
    /// Latched interrupt causes. Write 1 bits to clear.
    pub const STATUS: u32 = 0x0544;

    /// Decimator overflow cause.
    pub const DECIMATOR_OVERFLOW_BIT: u32 = 1 << 0;
    /// Mixer overflow cause.
    pub const MIXER_OVERFLOW_BIT: u32 = 1 << 1;
    /// Decimator overrun cause.
    pub const DECIMATOR_OVERRUN_BIT: u32 = 1 << 2;
    /// Selector overrun cause.
    pub const SELECTOR_OVERRUN_BIT: u32 = 1 << 3;
    /// Configuration update applied.
    pub const CONFIG_UPDATE_BIT: u32 = 1 << 4;
    /// Carrier sequence error.
    pub const SEQUENCE_ERROR_BIT: u32 = 1 << 5;
    /// Subframe schedule update.
    pub const SUBFRAME_UPDATE_BIT: u32 = 1 << 6;
}

/// NCO phase capture registers.
pub mod capture {
    /// Write 1 to snapshot the NCO phase state of every lane.
    pub const CONTROL: u32 = 0x0580;
    /// First per-lane captured NCO block.
    pub const NCO_BASE: u32 = 0x0600;
    /// Stride between per-lane captured NCO blocks.
    pub const NCO_STRIDE: u32 = 0x20;

    /// Captured phase offset.
    pub const PHASE_OFFSET: u32 = 0x00;
    /// Captured phase accumulator.
    pub const PHASE_ACC: u32 = 0x04;
    /// Captured dual-modulus count.
    pub const DUAL_MOD_COUNT: u32 = 0x08;
    /// Captured dual-modulus select.
    pub const DUAL_MOD_SEL: u32 = 0x0c;
    /// Captured frequency word.
    pub const FREQUENCY: u32 = 0x10;
    /// Captured gain.
    pub const GAIN: u32 = 0x14;
}
