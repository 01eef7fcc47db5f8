//! PRACH IP core configuration manager.
//!
//! This module contains the userspace driver for the PRACH detection IP
//! core. The driver owns a double-buffered view of the carrier/channel
//! configuration: allocation operations mutate the in-RAM shadow copy, and
//! [`Prach::commit_configuration`] pushes the shadow copy to the hardware's
//! buffered registers and arms the ConfigUpdate trigger. The hardware
//! applies the swap at the next qualifying trigger event without disturbing
//! channels that are not being changed.
//!
//! A single logical owner is assumed: nothing here locks. Callers that
//! share an instance between threads must serialize access around the whole
//! manager.

use crate::channel;
use crate::config::{
    CarrierCfg, CcCfg, CcId, DdcCfg, ModelParams, NcoCfg, RachLane, RcCfg, RcId, Schedule,
    MAX_ANTENNA, MAX_RC,
};
use crate::error::{Error, Result};
use crate::event::{EventQueue, InterruptHandler};
use crate::mmio::{Mapping, RegisterIo, Uio};
use crate::regs;
use crate::sequence::{CcSequence, SlotPolicy};
use crate::trigger::{Trigger, TriggerCfg, TriggerKind};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an instance.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum State {
    /// Created but not yet reset.
    NotReady,
    /// Reset done; awaiting model parameters.
    Ready,
    /// Model parameters recorded.
    Configured,
    /// Buffers and default triggers installed.
    Initialised,
    /// Running.
    Operational,
    /// Running with the datapath in low power.
    LowPower,
}

/// A hardware or software version number.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version {
    /// Major version number.
    pub major: u8,
    /// Minor version number.
    pub minor: u8,
    /// Patch number.
    pub patch: u8,
}

impl Version {
    /// Returns the version of this driver.
    pub fn software() -> Version {
        let mut parts = env!("CARGO_PKG_VERSION").split('.');
        let mut next = || parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Version {
            major: next(),
            minor: next(),
            patch: next(),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// One overflow or overrun indication.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct OverflowStatus {
    /// Whether the event has occurred since the last clear.
    pub occurred: bool,
    /// Lowest antenna in which the event occurred.
    pub first_antenna: u8,
    /// Lowest channel in which the event occurred.
    pub first_rc: u8,
}

impl OverflowStatus {
    fn from_word(word: u32) -> OverflowStatus {
        use crate::regs::status as s;
        OverflowStatus {
            occurred: word & s::FLAG_BIT != 0,
            first_antenna: ((word >> s::ANTENNA_SHIFT) & s::ANTENNA_MASK) as u8,
            first_rc: ((word >> s::RCID_SHIFT) & s::RCID_MASK) as u8,
        }
    }
}

/// Overflow/overrun status of the core.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Status {
    /// Overflow in the mixer.
    pub mixer_overflow: OverflowStatus,
    /// Overflow in the decimator.
    pub decimator_overflow: OverflowStatus,
    /// Overrun in the mixer.
    pub mixer_overrun: OverflowStatus,
    /// Overrun in the decimator.
    pub decimator_overrun: OverflowStatus,
}

/// Per-cause interrupt enablement.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct InterruptMask {
    /// Decimator overflow.
    pub decimator_overflow: bool,
    /// Mixer overflow.
    pub mixer_overflow: bool,
    /// Decimator overrun.
    pub decimator_overrun: bool,
    /// Selector overrun.
    pub selector_overrun: bool,
    /// Configuration update applied.
    pub config_update: bool,
    /// Carrier sequence error.
    pub sequence_error: bool,
    /// Subframe schedule update.
    pub subframe_update: bool,
}

impl InterruptMask {
    fn to_word(self) -> u32 {
        use crate::regs::irq as i;
        let mut word = 0;
        let bits = [
            (self.decimator_overflow, i::DECIMATOR_OVERFLOW_BIT),
            (self.mixer_overflow, i::MIXER_OVERFLOW_BIT),
            (self.decimator_overrun, i::DECIMATOR_OVERRUN_BIT),
            (self.selector_overrun, i::SELECTOR_OVERRUN_BIT),
            (self.config_update, i::CONFIG_UPDATE_BIT),
            (self.sequence_error, i::SEQUENCE_ERROR_BIT),
            (self.subframe_update, i::SUBFRAME_UPDATE_BIT),
        ];
        for (enabled, bit) in bits {
            if enabled {
                word |= bit;
            }
        }
        word
    }

    fn from_word(word: u32) -> InterruptMask {
        use crate::regs::irq as i;
        InterruptMask {
            decimator_overflow: word & i::DECIMATOR_OVERFLOW_BIT != 0,
            mixer_overflow: word & i::MIXER_OVERFLOW_BIT != 0,
            decimator_overrun: word & i::DECIMATOR_OVERRUN_BIT != 0,
            selector_overrun: word & i::SELECTOR_OVERRUN_BIT != 0,
            config_update: word & i::CONFIG_UPDATE_BIT != 0,
            sequence_error: word & i::SEQUENCE_ERROR_BIT != 0,
            subframe_update: word & i::SUBFRAME_UPDATE_BIT != 0,
        }
    }
}

/// One full configuration snapshot: carrier side plus channel set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Snapshot {
    cc: CcCfg,
    rc: [RcCfg; MAX_RC],
}

/// PRACH IP core driver.
///
/// Generic over the register transport so that tests and simulation can run
/// against a [`RegisterFile`](crate::mmio::RegisterFile) while hardware uses
/// the UIO [`Mapping`].
#[derive(Debug)]
pub struct Prach<R> {
    io: R,
    state: State,
    model: Option<ModelParams>,
    current: Snapshot,
    shadow: Snapshot,
    policy: SlotPolicy,
}

impl Prach<Mapping> {
    /// Opens the PRACH IP core on its UIO device.
    ///
    /// Returns the driver together with the interrupt handler and the event
    /// queue it feeds. The interrupt handler must be run concurrently (for
    /// instance in a Tokio task) for events to be received.
    pub async fn open(uio_name: &str) -> Result<(Prach<Mapping>, InterruptHandler, EventQueue)> {
        let uio = Uio::from_name(uio_name).await?;
        let mapping = uio.map(0).await?;
        let phys_addr = uio.map_addr(0).await?;
        let prach = Prach::new(mapping.clone())?;
        tracing::info!(
            "opened PRACH IP core version {} at physical address {:#08x}",
            prach.hw_version()?,
            phys_addr
        );
        let (handler, queue) = InterruptHandler::new(uio, mapping);
        Ok((prach, handler, queue))
    }
}

impl<R: RegisterIo> Prach<R> {
    /// Creates a driver over a register transport.
    ///
    /// Verifies the product identification word; a mapping that does not
    /// answer with the PRACH product id is rejected.
    pub fn new(io: R) -> Result<Prach<R>> {
        let prach = Prach {
            io,
            state: State::NotReady,
            model: None,
            current: Snapshot::default(),
            shadow: Snapshot::default(),
            policy: SlotPolicy::default(),
        };
        prach.check_product_id()?;
        Ok(prach)
    }

    fn check_product_id(&self) -> Result<()> {
        let product_id = self.io.read_reg(regs::core::PRODUCT_ID)?;
        if product_id != regs::core::PRODUCT_ID_VALUE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("wrong product id {product_id:#010x}"),
            )
            .into());
        }
        Ok(())
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns the model parameters recorded by `configure`.
    pub fn model_params(&self) -> Option<ModelParams> {
        self.model
    }

    /// Returns the slot placement policy.
    pub fn slot_policy(&self) -> SlotPolicy {
        self.policy
    }

    /// Sets the slot placement policy used by subsequent carrier additions.
    pub fn set_slot_policy(&mut self, policy: SlotPolicy) {
        self.policy = policy;
    }

    /// Reads the hardware version register.
    pub fn hw_version(&self) -> Result<Version> {
        use crate::regs::core as c;
        let word = self.io.read_reg(c::VERSION)?;
        Ok(Version {
            major: ((word >> c::VERSION_MAJOR_SHIFT) & c::VERSION_FIELD_MASK) as u8,
            minor: ((word >> c::VERSION_MINOR_SHIFT) & c::VERSION_FIELD_MASK) as u8,
            patch: (word & c::VERSION_FIELD_MASK) as u8,
        })
    }

    /// Returns the software and hardware versions.
    pub fn versions(&self) -> Result<(Version, Version)> {
        Ok((Version::software(), self.hw_version()?))
    }

    /// Decodes the model parameters register.
    ///
    /// The decoded parameters describe the hardware build and are the usual
    /// argument to [`Prach::configure`].
    pub fn read_model_params(&self) -> Result<ModelParams> {
        use crate::regs::core as c;
        let word = self.io.read_reg(c::MODEL_PARAMS)?;
        let params = ModelParams {
            num_antenna: ((word >> c::MODEL_NUM_ANTENNA_SHIFT) & c::MODEL_NUM_ANTENNA_MASK) as u8,
            num_cc_per_antenna: ((word >> c::MODEL_NUM_CC_SHIFT) & c::MODEL_NUM_CC_MASK) as u8,
            num_rach_channels: ((word >> c::MODEL_NUM_RACH_SHIFT) & c::MODEL_NUM_RACH_MASK) as u8,
            has_axis_ctrl: word & c::MODEL_HAS_CTRL_BIT != 0,
            has_irq: word & c::MODEL_HAS_IRQ_BIT != 0,
        };
        params.validate()?;
        Ok(params)
    }

    fn require(&self, allowed: &[State]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState { state: self.state })
        }
    }

    fn require_shadow_access(&self) -> Result<()> {
        self.require(&[State::Initialised, State::Operational, State::LowPower])
    }

    fn require_model(&self) -> Result<ModelParams> {
        self.model.ok_or(Error::InvalidState { state: self.state })
    }

    /// Soft-resets the core.
    ///
    /// Clears both configuration buffers and the recorded model parameters.
    /// Valid from any state; this is the recovery path.
    pub fn reset(&mut self) -> Result<()> {
        self.io.write_reg(regs::core::RESET, 1)?;
        self.current = Snapshot::default();
        self.shadow = Snapshot::default();
        self.model = None;
        self.state = State::Ready;
        tracing::info!("PRACH core reset");
        Ok(())
    }

    /// Records the immutable model parameters.
    ///
    /// Only valid from the Ready state; reconfiguring requires a reset.
    pub fn configure(&mut self, params: ModelParams) -> Result<()> {
        self.require(&[State::Ready])?;
        params.validate()?;
        self.model = Some(params);
        self.state = State::Configured;
        tracing::debug!(
            "configured: {} antennas, {} carriers/antenna, {} channels",
            params.num_antenna,
            params.num_cc_per_antenna,
            params.num_rach_channels
        );
        Ok(())
    }

    /// Installs empty configuration buffers and the default (disabled,
    /// immediate) trigger descriptors.
    pub fn initialise(&mut self) -> Result<()> {
        self.require(&[State::Configured])?;
        for kind in [
            TriggerKind::Activate,
            TriggerKind::LowPower,
            TriggerKind::ConfigUpdate,
            TriggerKind::FrameMark,
        ] {
            self.write_trigger(kind, Trigger::disabled())?;
        }
        self.current = Snapshot::default();
        self.shadow = Snapshot::default();
        self.write_shadow_registers()?;
        self.state = State::Initialised;
        tracing::info!("PRACH core initialised");
        Ok(())
    }

    /// Brings the core to the Operational state.
    ///
    /// Arms the Activate trigger as a one-shot per the hardware contract.
    /// With `low_power` the LowPower trigger is armed as well, so the core
    /// drops into low power between detection slots. Valid from the
    /// Initialised or LowPower states.
    pub fn activate(&mut self, low_power: bool) -> Result<()> {
        self.require(&[State::Initialised, State::LowPower])?;
        self.arm_trigger(TriggerKind::Activate, true)?;
        if low_power {
            self.arm_trigger(TriggerKind::LowPower, false)?;
        }
        self.state = State::Operational;
        tracing::info!("PRACH core activated (low_power = {low_power})");
        Ok(())
    }

    /// Leaves the Operational state. Low power must be left first.
    pub fn deactivate(&mut self) -> Result<()> {
        self.require(&[State::Operational])?;
        self.arm_trigger(TriggerKind::Activate, true)?;
        self.state = State::Initialised;
        tracing::info!("PRACH core deactivated");
        Ok(())
    }

    /// Toggles the low-power sub-state via the LowPower trigger.
    pub fn set_low_power(&mut self, enable: bool) -> Result<()> {
        if enable {
            self.require(&[State::Operational])?;
        } else {
            self.require(&[State::LowPower])?;
        }
        self.arm_trigger(TriggerKind::LowPower, false)?;
        self.state = if enable {
            State::LowPower
        } else {
            State::Operational
        };
        Ok(())
    }

    /// Allocates TDM sequence slots to a carrier and records its
    /// configuration in the shadow buffer.
    ///
    /// Returns the slot positions assigned to the carrier. The operation is
    /// all-or-nothing; on failure the shadow buffer is untouched.
    pub fn add_cc(&mut self, cc_id: CcId, cfg: CarrierCfg) -> Result<Vec<usize>> {
        self.require_shadow_access()?;
        cfg.validate()?;
        let positions = self
            .shadow
            .cc
            .sequence
            .add(cc_id, cfg.rate_class, self.policy)?;
        self.shadow.cc.carriers[cc_id.index()] = CarrierCfg {
            enabled: true,
            ..cfg
        };
        Ok(positions)
    }

    /// Releases a carrier's sequence slots and disables it in the shadow
    /// buffer.
    ///
    /// Channels still referencing the carrier are caught by the commit
    /// consistency check, not here.
    pub fn remove_cc(&mut self, cc_id: CcId) -> Result<()> {
        self.require_shadow_access()?;
        self.shadow.cc.sequence.remove(cc_id);
        self.shadow.cc.carriers[cc_id.index()].enabled = false;
        Ok(())
    }

    /// Reallocates a carrier with a new configuration.
    ///
    /// Equivalent to remove followed by add, with strong exception safety:
    /// if the new rate class does not fit, the prior allocation stays.
    pub fn update_cc(&mut self, cc_id: CcId, cfg: CarrierCfg) -> Result<Vec<usize>> {
        self.require_shadow_access()?;
        cfg.validate()?;
        let positions = self
            .shadow
            .cc
            .sequence
            .update(cc_id, cfg.rate_class, self.policy)?;
        self.shadow.cc.carriers[cc_id.index()] = CarrierCfg {
            enabled: true,
            ..cfg
        };
        Ok(positions)
    }

    /// Sets the antenna TDM slot enablement in the shadow buffer.
    pub fn set_antenna_cfg(&mut self, antenna_cfg: [bool; MAX_ANTENNA]) -> Result<()> {
        self.require_shadow_access()?;
        self.shadow.cc.antenna_cfg = antenna_cfg;
        Ok(())
    }

    fn check_lane(&self, lane: RachLane, except: Option<usize>) -> Result<()> {
        let model = self.require_model()?;
        if lane.index() >= usize::from(model.num_rach_channels) {
            return Err(Error::OutOfRange {
                field: "rach_lane",
                value: lane.value().into(),
            });
        }
        if channel::lane_in_use(&self.shadow.rc, lane, except) {
            return Err(Error::LaneInUse(lane));
        }
        Ok(())
    }

    /// Binds a detection channel in the shadow buffer.
    ///
    /// The carrier must be enabled and present in the shadow sequence, the
    /// physical lane must be free, and the NCO/decimation/schedule
    /// parameters must be legal for that carrier. All checks run before any
    /// mutation; on failure the shadow buffer is byte-for-byte unchanged.
    /// Returns the assigned channel id.
    pub fn add_rc(
        &mut self,
        rc_id: RcId,
        cc_id: CcId,
        lane: RachLane,
        nco: NcoCfg,
        ddc: DdcCfg,
        schedule: Option<Schedule>,
    ) -> Result<RcId> {
        self.require_shadow_access()?;
        let carrier = self.shadow.cc.carriers[cc_id.index()];
        if !carrier.enabled || !self.shadow.cc.sequence.contains(cc_id) {
            return Err(Error::InvalidCarrier(cc_id));
        }
        self.check_lane(lane, Some(rc_id.index()))?;
        nco.validate()?;
        channel::validate_ddc(&ddc, carrier.rate_class)?;
        if let Some(schedule) = &schedule {
            channel::validate_schedule(schedule, carrier.scs)?;
        }
        self.shadow.rc[rc_id.index()] = RcCfg {
            enabled: true,
            rc_id,
            lane,
            cc_id,
            restart: false,
            nco,
            ddc,
            schedule,
        };
        Ok(rc_id)
    }

    /// Disables a channel in the shadow buffer and releases its lane.
    ///
    /// The carrier sequence is untouched; other channels may still
    /// reference the same carrier.
    pub fn remove_rc(&mut self, rc_id: RcId) -> Result<()> {
        self.require_shadow_access()?;
        self.shadow.rc[rc_id.index()].enabled = false;
        Ok(())
    }

    /// Rebinds an enabled channel to another physical lane.
    ///
    /// Carrier, NCO and decimation parameters are untouched. The channel's
    /// restart flag is set so hardware reinitializes its phase state
    /// cleanly at the next configuration update.
    pub fn move_rc(&mut self, rc_id: RcId, lane: RachLane) -> Result<()> {
        self.require_shadow_access()?;
        let index = rc_id.index();
        if !self.shadow.rc[index].enabled {
            return Err(Error::InconsistentShadow(format!(
                "channel {rc_id} is not enabled"
            )));
        }
        self.check_lane(lane, Some(index))?;
        self.shadow.rc[index].lane = lane;
        self.shadow.rc[index].restart = true;
        Ok(())
    }

    /// Seeds the shadow buffer with a copy of the committed configuration.
    ///
    /// Used to make incremental edits without rebuilding from empty.
    pub fn clone_current_into_shadow(&mut self) -> Result<()> {
        self.require_shadow_access()?;
        self.shadow = self.current.clone();
        Ok(())
    }

    fn buffer(&self, next: bool) -> &Snapshot {
        if next {
            &self.shadow
        } else {
            &self.current
        }
    }

    /// Returns a carrier configuration from the shadow (`next = true`) or
    /// committed (`next = false`) buffer. This is a cache read; no
    /// registers are touched.
    pub fn get_cc_cfg(&self, next: bool, cc_id: CcId) -> CarrierCfg {
        self.buffer(next).cc.carriers[cc_id.index()]
    }

    /// Returns a channel configuration from the shadow or committed buffer.
    pub fn get_rc_cfg(&self, next: bool, rc_id: RcId) -> RcCfg {
        self.buffer(next).rc[rc_id.index()]
    }

    /// Returns the TDM sequence of the shadow or committed buffer.
    pub fn sequence(&self, next: bool) -> &CcSequence {
        &self.buffer(next).cc.sequence
    }

    /// Returns the antenna enablement of the shadow or committed buffer.
    pub fn antenna_cfg(&self, next: bool) -> [bool; MAX_ANTENNA] {
        self.buffer(next).cc.antenna_cfg
    }

    fn read_trigger(&self, kind: TriggerKind) -> Result<Trigger> {
        Trigger::from_word(self.io.read_reg(kind.offset())?)
    }

    fn write_trigger(&self, kind: TriggerKind, trigger: Trigger) -> Result<()> {
        self.io.write_reg(kind.offset(), trigger.to_word())
    }

    /// Arms a trigger, keeping its configured source and edge.
    fn arm_trigger(&self, kind: TriggerKind, one_shot: bool) -> Result<()> {
        let mut trigger = self.read_trigger(kind)?;
        trigger.enabled = true;
        if one_shot {
            trigger.one_shot = true;
        }
        self.write_trigger(kind, trigger)
    }

    /// Reads the four trigger descriptors from the hardware.
    pub fn get_trigger_cfg(&self) -> Result<TriggerCfg> {
        Ok(TriggerCfg {
            activate: self.read_trigger(TriggerKind::Activate)?,
            low_power: self.read_trigger(TriggerKind::LowPower)?,
            config_update: self.read_trigger(TriggerKind::ConfigUpdate)?,
            frame_mark: self.read_trigger(TriggerKind::FrameMark)?,
        })
    }

    /// Writes the four trigger descriptors.
    ///
    /// Writing a disabled descriptor disarms a pending one-shot trigger,
    /// provided the qualifying edge has not occurred yet.
    pub fn set_trigger_cfg(&self, cfg: &TriggerCfg) -> Result<()> {
        cfg.validate()?;
        self.write_trigger(TriggerKind::Activate, cfg.activate)?;
        self.write_trigger(TriggerKind::LowPower, cfg.low_power)?;
        self.write_trigger(TriggerKind::ConfigUpdate, cfg.config_update)?;
        self.write_trigger(TriggerKind::FrameMark, cfg.frame_mark)
    }

    /// Commits the shadow configuration to the hardware.
    ///
    /// The shadow buffer is first checked for self-consistency; an
    /// inconsistent shadow fails without modification so the caller can
    /// correct it. The shadow is then written to the buffered registers and
    /// the ConfigUpdate trigger is armed with its configured source, edge
    /// and one-shot settings; the hardware swaps to the new configuration
    /// at the next qualifying event. This function does not wait for that
    /// swap: the local committed snapshot is updated optimistically, and
    /// the hardware-side swap is observed through the ConfigUpdate event.
    ///
    /// A transport failure mid-write aborts the commit, leaving the shadow
    /// buffer as-is and the committed snapshot unadvanced; the same commit
    /// can be retried.
    pub fn commit_configuration(&mut self) -> Result<()> {
        self.require_shadow_access()?;
        self.validate_shadow()?;
        self.write_shadow_registers()?;
        self.arm_trigger(TriggerKind::ConfigUpdate, false)?;
        self.current = self.shadow.clone();
        tracing::info!(
            "committed configuration: sequence length {}, {} channels enabled",
            self.current.cc.sequence.length(),
            self.current.rc.iter().filter(|rc| rc.enabled).count()
        );
        Ok(())
    }

    /// Checks shadow self-consistency ahead of a commit.
    fn validate_shadow(&self) -> Result<()> {
        let shadow = &self.shadow;
        for (cc_index, carrier) in shadow.cc.carriers.iter().enumerate() {
            if !carrier.enabled {
                continue;
            }
            let cc_id = CcId::new(cc_index as u8).unwrap();
            let expected = carrier.rate_multiple() as usize;
            if shadow.cc.sequence.occupancy(cc_id) != expected {
                return Err(Error::InconsistentShadow(format!(
                    "carrier {cc_id} occupies {} sequence slots, expected {expected}",
                    shadow.cc.sequence.occupancy(cc_id)
                )));
            }
        }
        for (index, rc) in shadow.rc.iter().enumerate() {
            if !rc.enabled {
                continue;
            }
            let carrier = shadow.cc.carriers[rc.cc_id.index()];
            if !carrier.enabled || !shadow.cc.sequence.contains(rc.cc_id) {
                return Err(Error::InconsistentShadow(format!(
                    "channel {} references missing carrier {}",
                    rc.rc_id, rc.cc_id
                )));
            }
            // parameters may have become illegal through an update_cc after
            // the channel was added
            if channel::validate_ddc(&rc.ddc, carrier.rate_class).is_err() {
                return Err(Error::InconsistentShadow(format!(
                    "channel {} decimation code {} illegal for carrier {} rate class {}",
                    rc.rc_id, rc.ddc.decimation_code, rc.cc_id, carrier.rate_class
                )));
            }
            if let Some(schedule) = &rc.schedule {
                if channel::validate_schedule(schedule, carrier.scs).is_err() {
                    return Err(Error::InconsistentShadow(format!(
                        "channel {} schedule illegal for carrier {} SCS class {}",
                        rc.rc_id, rc.cc_id, carrier.scs
                    )));
                }
            }
            if channel::lane_in_use(&shadow.rc, rc.lane, Some(index)) {
                return Err(Error::InconsistentShadow(format!(
                    "lane {} bound to more than one enabled channel",
                    rc.lane
                )));
            }
        }
        Ok(())
    }

    /// Writes the shadow buffer to the hardware's buffered registers.
    fn write_shadow_registers(&self) -> Result<()> {
        use crate::regs::next as n;
        let shadow = &self.shadow;
        let sequence = &shadow.cc.sequence;
        self.io
            .write_reg(n::SEQ_LENGTH, sequence.length() as u32)?;
        for (position, slot) in sequence.slots().iter().enumerate() {
            let word = match slot {
                Some(cc_id) => n::SEQ_VALID_BIT | u32::from(cc_id.value()),
                None => 0,
            };
            self.io.write_reg(n::SEQ_BASE + 4 * position as u32, word)?;
        }
        for (cc_index, carrier) in shadow.cc.carriers.iter().enumerate() {
            self.io.write_reg(
                n::CARRIER_BASE + 4 * cc_index as u32,
                pack_carrier(carrier),
            )?;
        }
        let antenna = shadow
            .cc
            .antenna_cfg
            .iter()
            .enumerate()
            .fold(0u32, |word, (bit, &enabled)| {
                word | (u32::from(enabled) << bit)
            });
        self.io.write_reg(n::ANTENNA, antenna)?;
        for (rc_index, rc) in shadow.rc.iter().enumerate() {
            let base = n::RC_BASE + n::RC_STRIDE * rc_index as u32;
            self.io.write_reg(base + n::RC_CTRL, pack_rc_ctrl(rc))?;
            if !rc.enabled {
                continue;
            }
            self.io
                .write_reg(base + n::RC_NCO_PHASE_OFFSET, rc.nco.phase_offset)?;
            self.io
                .write_reg(base + n::RC_NCO_PHASE_ACC, rc.nco.phase_acc)?;
            self.io
                .write_reg(base + n::RC_NCO_DUAL_MOD_COUNT, rc.nco.dual_mod_count)?;
            self.io
                .write_reg(base + n::RC_NCO_DUAL_MOD_SEL, rc.nco.dual_mod_sel.into())?;
            self.io
                .write_reg(base + n::RC_NCO_FREQUENCY, rc.nco.frequency)?;
            self.io
                .write_reg(base + n::RC_NCO_GAIN, rc.nco.nco_gain.into())?;
            self.io.write_reg(base + n::RC_DDC_CTRL, pack_ddc(&rc.ddc))?;
            self.io
                .write_reg(base + n::RC_DDC_GAIN, pack_ddc_gains(&rc.ddc))?;
            let (ctrl, start, capture) = pack_schedule(rc.schedule.as_ref());
            self.io.write_reg(base + n::RC_SCHED_CTRL, ctrl)?;
            self.io.write_reg(base + n::RC_SCHED_START, start)?;
            self.io.write_reg(base + n::RC_SCHED_CAPTURE, capture)?;
        }
        Ok(())
    }

    /// Reads the hardware operational and low-power flags.
    ///
    /// These reflect the state machine inside the core, which can lag the
    /// driver state until an armed trigger fires.
    pub fn hw_state(&self) -> Result<(bool, bool)> {
        Ok((
            self.io.read_reg(regs::core::OPERATIONAL)? & 1 != 0,
            self.io.read_reg(regs::core::LOW_POWER)? & 1 != 0,
        ))
    }

    /// Reads the overflow/overrun status registers.
    pub fn status(&self) -> Result<Status> {
        use crate::regs::status as s;
        Ok(Status {
            mixer_overflow: OverflowStatus::from_word(self.io.read_reg(s::MIXER_OVERFLOW)?),
            decimator_overflow: OverflowStatus::from_word(
                self.io.read_reg(s::DECIMATOR_OVERFLOW)?,
            ),
            mixer_overrun: OverflowStatus::from_word(self.io.read_reg(s::MIXER_OVERRUN)?),
            decimator_overrun: OverflowStatus::from_word(self.io.read_reg(s::DECIMATOR_OVERRUN)?),
        })
    }

    /// Clears the overflow/overrun status registers.
    pub fn clear_status(&self) -> Result<()> {
        self.io.write_reg(regs::status::CLEAR, 1)
    }

    /// Reads the interrupt mask.
    pub fn interrupt_mask(&self) -> Result<InterruptMask> {
        Ok(InterruptMask::from_word(
            self.io.read_reg(regs::irq::MASK)?,
        ))
    }

    /// Writes the interrupt mask.
    pub fn set_interrupt_mask(&self, mask: &InterruptMask) -> Result<()> {
        self.io.write_reg(regs::irq::MASK, mask.to_word())
    }

    /// Requests a snapshot of the NCO phase state of every lane.
    pub fn capture_phase(&self) -> Result<()> {
        self.require_model()?;
        self.io.write_reg(regs::capture::CONTROL, 1)
    }

    /// Reads the captured NCO phase state of a lane.
    pub fn captured_phase(&self, lane: RachLane) -> Result<NcoCfg> {
        use crate::regs::capture as c;
        let model = self.require_model()?;
        if lane.index() >= usize::from(model.num_rach_channels) {
            return Err(Error::OutOfRange {
                field: "rach_lane",
                value: lane.value().into(),
            });
        }
        let base = c::NCO_BASE + c::NCO_STRIDE * lane.index() as u32;
        Ok(NcoCfg {
            phase_offset: self.io.read_reg(base + c::PHASE_OFFSET)?,
            phase_acc: self.io.read_reg(base + c::PHASE_ACC)?,
            dual_mod_count: self.io.read_reg(base + c::DUAL_MOD_COUNT)?,
            dual_mod_sel: self.io.read_reg(base + c::DUAL_MOD_SEL)? as u8,
            frequency: self.io.read_reg(base + c::FREQUENCY)?,
            nco_gain: self.io.read_reg(base + c::GAIN)? as u8,
        })
    }
}

fn pack_carrier(carrier: &CarrierCfg) -> u32 {
    use crate::regs::next as n;
    let mut word = 0;
    if carrier.enabled {
        word |= n::CARRIER_ENABLE_BIT;
    }
    word |= (u32::from(carrier.scs) & n::CARRIER_SCS_MASK) << n::CARRIER_SCS_SHIFT;
    word |= (u32::from(carrier.rate_class) & n::CARRIER_RATE_MASK) << n::CARRIER_RATE_SHIFT;
    word
}

fn pack_rc_ctrl(rc: &RcCfg) -> u32 {
    use crate::regs::next as n;
    let mut word = 0;
    if rc.enabled {
        word |= n::RC_CTRL_ENABLE_BIT;
    }
    if rc.restart {
        word |= n::RC_CTRL_RESTART_BIT;
    }
    word |= u32::from(rc.rc_id.value()) << n::RC_CTRL_RCID_SHIFT;
    word |= u32::from(rc.lane.value()) << n::RC_CTRL_LANE_SHIFT;
    word |= u32::from(rc.cc_id.value()) << n::RC_CTRL_CCID_SHIFT;
    word
}

fn pack_ddc(ddc: &DdcCfg) -> u32 {
    use crate::regs::next as n;
    (u32::from(ddc.decimation_code) & n::RC_DDC_RATE_MASK) << n::RC_DDC_RATE_SHIFT
        | (u32::from(ddc.scs) & n::RC_DDC_SCS_MASK) << n::RC_DDC_SCS_SHIFT
}

fn pack_ddc_gains(ddc: &DdcCfg) -> u32 {
    use crate::regs::next as n;
    ddc.stage_gains
        .iter()
        .enumerate()
        .fold(0u32, |word, (stage, &gain)| {
            word | (u32::from(gain) & n::RC_DDC_GAIN_STAGE_MASK)
                << (stage as u32 * n::RC_DDC_GAIN_STAGE_BITS)
        })
}

fn pack_schedule(schedule: Option<&Schedule>) -> (u32, u32, u32) {
    use crate::regs::next as n;
    let Some(s) = schedule else {
        return (0, 0, 0);
    };
    let ctrl = n::RC_SCHED_MODE_BIT
        | (u32::from(s.pattern_period - 1) & n::RC_SCHED_PERIOD_MASK) << n::RC_SCHED_PERIOD_SHIFT;
    let start = (u32::from(s.frame_id) & n::RC_SCHED_FRAME_MASK) << n::RC_SCHED_FRAME_SHIFT
        | (u32::from(s.subframe_id) & n::RC_SCHED_SUBFRAME_MASK) << n::RC_SCHED_SUBFRAME_SHIFT
        | (u32::from(s.slot_id) & n::RC_SCHED_SLOT_MASK) << n::RC_SCHED_SLOT_SHIFT;
    let capture = (u32::from(s.duration - 1) & n::RC_SCHED_DURATION_MASK)
        << n::RC_SCHED_DURATION_SHIFT
        | (u32::from(s.repeats - 1) & n::RC_SCHED_REPEATS_MASK) << n::RC_SCHED_REPEATS_SHIFT;
    (ctrl, start, capture)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mmio::RegisterFile;
    use crate::trigger::TriggerSource;
    use std::sync::Arc;

    fn register_file() -> Arc<RegisterFile> {
        use crate::regs::core as c;
        let rf = Arc::new(RegisterFile::default());
        rf.write_reg(c::PRODUCT_ID, c::PRODUCT_ID_VALUE).unwrap();
        rf.write_reg(c::VERSION, (1 << 16) | (2 << 8) | 3).unwrap();
        // 4 antennas, 4 carriers per antenna, 8 channels, irq present
        rf.write_reg(c::MODEL_PARAMS, 4 | (4 << 4) | (8 << 8) | c::MODEL_HAS_IRQ_BIT)
            .unwrap();
        rf
    }

    fn initialised(rf: &Arc<RegisterFile>) -> Prach<Arc<RegisterFile>> {
        let mut prach = Prach::new(Arc::clone(rf)).unwrap();
        prach.reset().unwrap();
        let model = prach.read_model_params().unwrap();
        prach.configure(model).unwrap();
        prach.initialise().unwrap();
        prach
    }

    fn cc(id: u8) -> CcId {
        CcId::new(id).unwrap()
    }

    fn rc(id: u8) -> RcId {
        RcId::new(id).unwrap()
    }

    fn lane(id: u8) -> RachLane {
        RachLane::new(id).unwrap()
    }

    fn carrier(scs: u8, rate_class: u8) -> CarrierCfg {
        CarrierCfg {
            enabled: false,
            scs,
            rate_class,
        }
    }

    #[test]
    fn rejects_wrong_product_id() {
        let rf = RegisterFile::default();
        assert!(Prach::new(rf).is_err());
    }

    #[test]
    fn reads_versions() {
        let rf = register_file();
        let prach = Prach::new(Arc::clone(&rf)).unwrap();
        let (sw, hw) = prach.versions().unwrap();
        assert_eq!(
            hw,
            Version {
                major: 1,
                minor: 2,
                patch: 3
            }
        );
        assert_eq!(sw, Version::software());
    }

    #[test]
    fn lifecycle_state_gating() {
        let rf = register_file();
        let mut prach = Prach::new(Arc::clone(&rf)).unwrap();
        let model = prach.read_model_params().unwrap();
        // configure before reset
        assert!(matches!(
            prach.configure(model),
            Err(Error::InvalidState { .. })
        ));
        prach.reset().unwrap();
        // commit before initialise
        assert!(matches!(
            prach.commit_configuration(),
            Err(Error::InvalidState { .. })
        ));
        prach.configure(model).unwrap();
        // configure twice requires a reset in between
        assert!(matches!(
            prach.configure(model),
            Err(Error::InvalidState { .. })
        ));
        // activate before initialise
        assert!(matches!(
            prach.activate(false),
            Err(Error::InvalidState { .. })
        ));
        prach.initialise().unwrap();
        prach.activate(false).unwrap();
        assert_eq!(prach.state(), State::Operational);
        prach.set_low_power(true).unwrap();
        assert_eq!(prach.state(), State::LowPower);
        prach.set_low_power(false).unwrap();
        prach.deactivate().unwrap();
        assert_eq!(prach.state(), State::Initialised);
    }

    #[test]
    fn activate_arms_one_shot_trigger() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        prach.activate(false).unwrap();
        let triggers = prach.get_trigger_cfg().unwrap();
        assert!(triggers.activate.enabled);
        assert!(triggers.activate.one_shot);
    }

    #[test]
    fn commit_round_trip_updates_current() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        prach.activate(false).unwrap();
        prach.add_cc(cc(0), carrier(0, 0)).unwrap();
        prach.add_cc(cc(1), carrier(1, 2)).unwrap();
        prach.set_antenna_cfg([true, true, true, true, false, false, false, false])
            .unwrap();
        prach
            .add_rc(rc(0), cc(0), lane(2), NcoCfg::default(), DdcCfg::default(), None)
            .unwrap();
        let shadow_seq = prach.sequence(true).clone();
        let shadow_cc0 = prach.get_cc_cfg(true, cc(0));
        let shadow_cc1 = prach.get_cc_cfg(true, cc(1));
        let shadow_rc0 = prach.get_rc_cfg(true, rc(0));
        prach.commit_configuration().unwrap();
        assert_eq!(*prach.sequence(false), shadow_seq);
        assert_eq!(prach.get_cc_cfg(false, cc(0)), shadow_cc0);
        assert_eq!(prach.get_cc_cfg(false, cc(1)), shadow_cc1);
        assert_eq!(prach.get_rc_cfg(false, rc(0)), shadow_rc0);
        // the ConfigUpdate trigger is armed
        assert!(prach.get_trigger_cfg().unwrap().config_update.enabled);
    }

    #[test]
    fn commit_arms_configured_trigger_source() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        let mut triggers = prach.get_trigger_cfg().unwrap();
        triggers.config_update = Trigger {
            enabled: false,
            source: TriggerSource::SidebandEdge { bit: 3 },
            edge: crate::trigger::Edge::Falling,
            one_shot: true,
        };
        prach.set_trigger_cfg(&triggers).unwrap();
        prach.add_cc(cc(0), carrier(0, 0)).unwrap();
        prach.commit_configuration().unwrap();
        let armed = prach.get_trigger_cfg().unwrap().config_update;
        assert!(armed.enabled);
        assert_eq!(armed.source, TriggerSource::SidebandEdge { bit: 3 });
        assert!(armed.one_shot);
    }

    #[test]
    fn lane_in_use_leaves_shadow_unchanged() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        prach.add_cc(cc(0), carrier(0, 0)).unwrap();
        prach
            .add_rc(rc(0), cc(0), lane(2), NcoCfg::default(), DdcCfg::default(), None)
            .unwrap();
        let shadow = prach.shadow.clone();
        assert!(matches!(
            prach.add_rc(rc(1), cc(0), lane(2), NcoCfg::default(), DdcCfg::default(), None),
            Err(Error::LaneInUse(_))
        ));
        assert_eq!(prach.shadow, shadow);
        assert!(!prach.get_rc_cfg(true, rc(1)).enabled);
    }

    #[test]
    fn add_rc_requires_present_carrier() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        assert!(matches!(
            prach.add_rc(rc(0), cc(3), lane(0), NcoCfg::default(), DdcCfg::default(), None),
            Err(Error::InvalidCarrier(_))
        ));
    }

    #[test]
    fn add_rc_rejects_unsupported_decimation() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        prach.add_cc(cc(0), carrier(0, 3)).unwrap();
        // x24 on a x8 carrier is a total of 192
        let ddc = DdcCfg {
            decimation_code: 11,
            ..DdcCfg::default()
        };
        assert!(matches!(
            prach.add_rc(rc(0), cc(0), lane(0), NcoCfg::default(), ddc, None),
            Err(Error::UnsupportedDecimation { .. })
        ));
    }

    #[test]
    fn add_rc_rejects_lane_beyond_model() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        prach.add_cc(cc(0), carrier(0, 0)).unwrap();
        // the model has 8 channels; lane 9 does not exist in this build
        assert!(matches!(
            prach.add_rc(rc(0), cc(0), lane(9), NcoCfg::default(), DdcCfg::default(), None),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn move_rc_sets_restart_and_checks_collision() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        prach.add_cc(cc(0), carrier(0, 0)).unwrap();
        prach
            .add_rc(rc(0), cc(0), lane(0), NcoCfg::default(), DdcCfg::default(), None)
            .unwrap();
        prach
            .add_rc(rc(1), cc(0), lane(1), NcoCfg::default(), DdcCfg::default(), None)
            .unwrap();
        assert!(matches!(
            prach.move_rc(rc(0), lane(1)),
            Err(Error::LaneInUse(_))
        ));
        prach.move_rc(rc(0), lane(3)).unwrap();
        let moved = prach.get_rc_cfg(true, rc(0));
        assert_eq!(moved.lane, lane(3));
        assert!(moved.restart);
        assert_eq!(moved.cc_id, cc(0));
    }

    #[test]
    fn move_rc_requires_enabled_channel() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        // the id itself is in range; only the channel's enablement is wrong
        assert!(matches!(
            prach.move_rc(rc(0), lane(1)),
            Err(Error::InconsistentShadow(_))
        ));
    }

    #[test]
    fn commit_rejects_channel_with_removed_carrier() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        prach.add_cc(cc(0), carrier(0, 0)).unwrap();
        prach
            .add_rc(rc(0), cc(0), lane(0), NcoCfg::default(), DdcCfg::default(), None)
            .unwrap();
        prach.remove_cc(cc(0)).unwrap();
        assert!(matches!(
            prach.commit_configuration(),
            Err(Error::InconsistentShadow(_))
        ));
        // shadow left for caller correction
        assert!(prach.get_rc_cfg(true, rc(0)).enabled);
    }

    #[test]
    fn commit_rejects_decimation_made_illegal_by_update_cc() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        prach.add_cc(cc(0), carrier(0, 0)).unwrap();
        let ddc = DdcCfg {
            decimation_code: 11,
            ..DdcCfg::default()
        };
        // x24 on a x1 carrier is legal
        prach
            .add_rc(rc(0), cc(0), lane(0), NcoCfg::default(), ddc, None)
            .unwrap();
        // raising the carrier to x8 makes the total 192
        prach.update_cc(cc(0), carrier(0, 3)).unwrap();
        assert!(matches!(
            prach.commit_configuration(),
            Err(Error::InconsistentShadow(_))
        ));
    }

    #[test]
    fn transport_failure_leaves_commit_retryable() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        prach.add_cc(cc(0), carrier(0, 1)).unwrap();
        let shadow = prach.shadow.clone();
        rf.fail_writes_after(4);
        assert!(matches!(
            prach.commit_configuration(),
            Err(Error::Transport(_))
        ));
        assert_eq!(prach.shadow, shadow);
        assert!(!prach.get_cc_cfg(false, cc(0)).enabled);
        rf.clear_write_failure();
        prach.commit_configuration().unwrap();
        assert!(prach.get_cc_cfg(false, cc(0)).enabled);
    }

    #[test]
    fn clone_current_into_shadow_restores_edits() {
        let rf = register_file();
        let mut prach = initialised(&rf);
        prach.add_cc(cc(0), carrier(0, 0)).unwrap();
        prach.commit_configuration().unwrap();
        prach.remove_cc(cc(0)).unwrap();
        assert!(!prach.get_cc_cfg(true, cc(0)).enabled);
        prach.clone_current_into_shadow().unwrap();
        assert!(prach.get_cc_cfg(true, cc(0)).enabled);
        assert_eq!(prach.sequence(true), prach.sequence(false));
    }

    #[test]
    fn status_and_interrupt_mask_round_trip() {
        use crate::regs::{irq, status as s};
        let rf = register_file();
        let prach = initialised(&rf);
        rf.write_reg(s::MIXER_OVERFLOW, s::FLAG_BIT | (2 << s::ANTENNA_SHIFT) | (5 << s::RCID_SHIFT))
            .unwrap();
        let status = prach.status().unwrap();
        assert!(status.mixer_overflow.occurred);
        assert_eq!(status.mixer_overflow.first_antenna, 2);
        assert_eq!(status.mixer_overflow.first_rc, 5);
        assert!(!status.decimator_overrun.occurred);

        let mask = InterruptMask {
            config_update: true,
            mixer_overflow: true,
            ..InterruptMask::default()
        };
        prach.set_interrupt_mask(&mask).unwrap();
        assert_eq!(prach.interrupt_mask().unwrap(), mask);
        assert_eq!(
            rf.read_reg(irq::MASK).unwrap(),
            irq::CONFIG_UPDATE_BIT | irq::MIXER_OVERFLOW_BIT
        );
    }

    #[test]
    fn captured_phase_read_back() {
        use crate::regs::capture as c;
        let rf = register_file();
        let prach = initialised(&rf);
        let base = c::NCO_BASE + c::NCO_STRIDE * 3;
        rf.write_reg(base + c::PHASE_ACC, 0x1234_5678).unwrap();
        rf.write_reg(base + c::FREQUENCY, 4096).unwrap();
        rf.write_reg(base + c::GAIN, 2).unwrap();
        prach.capture_phase().unwrap();
        let nco = prach.captured_phase(lane(3)).unwrap();
        assert_eq!(nco.phase_acc, 0x1234_5678);
        assert_eq!(nco.frequency, 4096);
        assert_eq!(nco.nco_gain, 2);
        // lane 8 and beyond do not exist in this model
        assert!(prach.captured_phase(lane(8)).is_err());
    }
}
