//! prach-ctl is a userspace driver and CLI for a PRACH detection pipeline
//! FPGA IP core. It talks to the core through a UIO memory mapping, manages
//! the TDM carrier sequence and the detection channel bindings in a
//! double-buffered configuration, and commits configuration changes
//! atomically through the hardware's trigger mechanism.

#![warn(missing_docs)]

pub mod app;
pub mod args;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod mmio;
pub mod prach;
pub mod regs;
pub mod sequence;
pub mod trigger;
