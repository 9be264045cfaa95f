//! Device definition and APIs
//!
//! # Purpose
//! This module defines handles to the instruments of a transport measurement rig. Each handle owns
//! a [`Transport`](crate::transport::Transport) and provides high-level RPCs for:
//!   - Sourcing voltages and currents
//!   - Taking readings
//!   - Sequencing the instruments' own measurement programs (delta mode, autocalibration)
//!
//! Instruments share very little beyond the transport, so each handle has its own API which
//! mirrors what the instrument can do. Arguments are validated before anything is sent: asking a
//! DAC for 12 V or a bridge for a range it does not have results in a runtime error and no
//! command(s) sent to the device.
//!
//! # Cancel Safety
//! **Unless otherwise stated, the device RPCs are not cancel safe,** i.e. they should not be used
//! in a `tokio::select!` call. Most RPCs are a write followed by a read, so cancelling in between
//! leaves the reply in the stream where it will be taken as the reply to the next RPC.
//!
//! Multi-command sequences such as [`Keithley6221::delta_setup`] and [`Seekat::get_voltage`] are
//! _extremely_ non-cancel safe, since they may be abandoned with the instrument half configured.
//!
//! # Supported Devices
//! Handles are named after a camel-case version of the model:
//!   - OpenDacs Seekat: [`Seekat`]
//!   - OpenDacs DAC_ADC: [`DacAdc`]
//!   - Keithley 6221 current source: [`Keithley6221`]
//!   - Keithley 2182A nanovoltmeter: [`Keithley2182a`]
//!   - Lakeshore LR-700 resistance bridge: [`Lr700`]
//!   - SRS SIM900 mainframe: [`Sim900`]
//!   - SRS DC205 voltage source: [`Dc205`]
//!   - Agilent XGS-600 gauge controller: [`Xgs600`]
//!   - Quantum Design cryostats through MultiVu: [`Cryostat`]

pub mod dac_adc;
pub mod dc205;
pub mod keithley_2182a;
pub mod keithley_6221;
pub mod lr_700;
pub mod ppms;
pub mod seekat;
pub mod sim900;
pub mod xgs600;

pub use dac_adc::{ DacAdc, DacChannel };
pub use dc205::{ Dc205, Dc205Range };
pub use keithley_2182a::{ Keithley2182a, SenseMode, TempUnit };
pub use keithley_6221::{ DeltaConfig, DeltaReadings, DeltaSweep, DeltaUnit, DiffConductanceConfig, Keithley6221 };
pub use lr_700::Lr700;
pub use ppms::{ Cryostat, MultiVu };
pub use seekat::{ Seekat, SeekatTiming };
pub use sim900::Sim900;
pub use xgs600::{ PressureUnit, Xgs600 };
