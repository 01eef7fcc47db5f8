//! prach-ctl application.
//!
//! This module contains a top-level structure [`App`] that represents the
//! whole prach-ctl application, and the JSON configuration schema
//! ([`ApplyConfig`]) consumed by the `apply` and `monitor` subcommands.

use crate::{
    args::{Args, Command},
    config::{CarrierCfg, CcId, DdcCfg, ModelParams, NcoCfg, RachLane, RcId, Schedule, MAX_ANTENNA},
    event::{EventQueue, InterruptHandler},
    mmio::{Mapping, RegisterIo},
    prach::{InterruptMask, Prach, Status, Version},
    sequence::SlotPolicy,
    trigger::TriggerCfg,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// prach-ctl application.
///
/// This struct represents the prach-ctl application. It owns the PRACH
/// driver and the interrupt plumbing, and runs the selected subcommand.
#[derive(Debug)]
pub struct App {
    prach: Prach<Mapping>,
    interrupt_handler: InterruptHandler,
    events: EventQueue,
    command: Command,
}

impl App {
    /// Creates a new application.
    #[tracing::instrument(name = "App::new", level = "debug")]
    pub async fn new(args: &Args) -> Result<App> {
        let (mut prach, interrupt_handler, events) = Prach::open(&args.uio).await?;
        prach.set_slot_policy(if args.contiguous {
            SlotPolicy::Contiguous
        } else {
            SlotPolicy::EvenlySpaced
        });
        Ok(App {
            prach,
            interrupt_handler,
            events,
            command: args.command.clone(),
        })
    }

    /// Runs the application.
    #[tracing::instrument(name = "App::run", level = "debug", skip_all)]
    pub async fn run(self) -> Result<()> {
        let App {
            mut prach,
            interrupt_handler,
            mut events,
            command,
        } = self;
        match command {
            Command::Status => print_status(&prach),
            Command::Apply { config } => {
                bring_up(&mut prach)?;
                let config = read_config(&config).await?;
                apply_config(&mut prach, &config)?;
                Ok(())
            }
            Command::Monitor { config } => {
                bring_up(&mut prach)?;
                if let Some(path) = &config {
                    let config = read_config(path).await?;
                    apply_config(&mut prach, &config)?;
                }
                tokio::select! {
                    ret = interrupt_handler.run() => Ok(ret?),
                    ret = async {
                        while let Some(event) = events.recv().await {
                            tracing::info!("{event}");
                        }
                        Ok::<(), anyhow::Error>(())
                    } => ret,
                }
            }
        }
    }
}

/// Top level of the JSON configuration file.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyConfig {
    /// Whether to arm the low-power trigger on activation.
    #[serde(default)]
    pub low_power: bool,
    /// Trigger descriptors written before the configuration is built.
    #[serde(default)]
    pub triggers: Option<TriggerCfg>,
    /// Interrupt mask to install.
    #[serde(default)]
    pub interrupt_mask: Option<InterruptMask>,
    /// Antenna TDM slot enablement.
    #[serde(default)]
    pub antenna_cfg: Option<[bool; MAX_ANTENNA]>,
    /// Carriers to allocate, in order.
    pub carriers: Vec<CarrierEntry>,
    /// Detection channels to bind.
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

/// One carrier in the configuration file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CarrierEntry {
    /// Carrier id.
    pub cc_id: CcId,
    /// Sub-carrier-spacing class.
    #[serde(default)]
    pub scs: u8,
    /// Sample-rate class.
    #[serde(default)]
    pub rate_class: u8,
}

/// One detection channel in the configuration file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    /// Channel id.
    pub rc_id: RcId,
    /// Carrier the channel listens on.
    pub cc_id: CcId,
    /// Physical lane to bind.
    pub lane: RachLane,
    /// NCO parameters.
    #[serde(default)]
    pub nco: NcoCfg,
    /// Decimation parameters.
    #[serde(default)]
    pub ddc: DdcCfg,
    /// Optional static capture schedule.
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

async fn read_config(path: &Path) -> Result<ApplyConfig> {
    let json = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&json)?)
}

/// Walks the core from power-on to the Initialised state.
fn bring_up<R: RegisterIo>(prach: &mut Prach<R>) -> Result<()> {
    prach.reset()?;
    let model = prach.read_model_params()?;
    prach.configure(model)?;
    prach.initialise()?;
    Ok(())
}

/// Builds the shadow configuration from a file, activates the core and
/// commits.
fn apply_config<R: RegisterIo>(prach: &mut Prach<R>, config: &ApplyConfig) -> Result<()> {
    if let Some(triggers) = &config.triggers {
        prach.set_trigger_cfg(triggers)?;
    }
    if let Some(mask) = &config.interrupt_mask {
        prach.set_interrupt_mask(mask)?;
    }
    for carrier in &config.carriers {
        let slots = prach.add_cc(
            carrier.cc_id,
            CarrierCfg {
                enabled: false,
                scs: carrier.scs,
                rate_class: carrier.rate_class,
            },
        )?;
        tracing::info!("carrier {} assigned sequence slots {slots:?}", carrier.cc_id);
    }
    if let Some(antenna_cfg) = config.antenna_cfg {
        prach.set_antenna_cfg(antenna_cfg)?;
    }
    for channel in &config.channels {
        prach.add_rc(
            channel.rc_id,
            channel.cc_id,
            channel.lane,
            channel.nco,
            channel.ddc,
            channel.schedule,
        )?;
    }
    prach.activate(config.low_power)?;
    prach.commit_configuration()?;
    Ok(())
}

#[derive(Serialize, Debug)]
struct StatusReport {
    software_version: Version,
    hardware_version: Version,
    model: ModelParams,
    operational: bool,
    low_power: bool,
    status: Status,
    interrupt_mask: InterruptMask,
}

fn print_status<R: RegisterIo>(prach: &Prach<R>) -> Result<()> {
    let (software_version, hardware_version) = prach.versions()?;
    let (operational, low_power) = prach.hw_state()?;
    let report = StatusReport {
        software_version,
        hardware_version,
        model: prach.read_model_params()?,
        operational,
        low_power,
        status: prach.status()?,
        interrupt_mask: prach.interrupt_mask()?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mmio::RegisterFile;
    use crate::prach::State;
    use crate::regs;
    use std::sync::Arc;

    fn prach() -> Prach<Arc<RegisterFile>> {
        use crate::regs::core as c;
        let rf = Arc::new(RegisterFile::default());
        rf.write_reg(c::PRODUCT_ID, c::PRODUCT_ID_VALUE).unwrap();
        rf.write_reg(c::MODEL_PARAMS, 2 | (4 << 4) | (16 << 8))
            .unwrap();
        Prach::new(rf).unwrap()
    }

    #[test]
    fn apply_config_from_json() {
        let json = r#"
        {
            "low_power": false,
            "antenna_cfg": [true, true, false, false, false, false, false, false],
            "carriers": [
                { "cc_id": 0, "scs": 0, "rate_class": 1 },
                { "cc_id": 5, "scs": 1, "rate_class": 0 }
            ],
            "channels": [
                { "rc_id": 0, "cc_id": 0, "lane": 3,
                  "ddc": { "decimation_code": 2, "scs": 0,
                           "stage_gains": [1, 0, 0, 0, 0, 0] } }
            ]
        }
        "#;
        let config: ApplyConfig = serde_json::from_str(json).unwrap();
        let mut prach = prach();
        bring_up(&mut prach).unwrap();
        apply_config(&mut prach, &config).unwrap();
        assert_eq!(prach.state(), State::Operational);
        assert!(prach.get_cc_cfg(false, CcId::new(0).unwrap()).enabled);
        assert!(prach.get_cc_cfg(false, CcId::new(5).unwrap()).enabled);
        let rc = prach.get_rc_cfg(false, RcId::new(0).unwrap());
        assert!(rc.enabled);
        assert_eq!(rc.lane, RachLane::new(3).unwrap());
        assert_eq!(
            prach.antenna_cfg(false),
            [true, true, false, false, false, false, false, false]
        );
    }

    #[test]
    fn apply_config_rejects_out_of_range_id() {
        assert!(serde_json::from_str::<ApplyConfig>(
            r#"{ "carriers": [ { "cc_id": 16 } ] }"#
        )
        .is_err());
    }
}
