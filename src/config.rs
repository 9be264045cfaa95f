//! Session configuration
//!
//! A configuration file lists the instruments on a given rig, e.g.
//!
//! ```toml
//! [[instruments]]
//! name = "seekat"
//! kind = "seekat"
//! connection = { type = "serial", port = "/dev/ttyACM0" }
//!
//! [[instruments]]
//! name = "k6"
//! kind = "keithley_6221"
//! connection = { type = "tcp", host = "gpib-bridge.local", port = 1234 }
//! timeout_ms = 8000
//! ```
//!
//! Files are read with `figment`; environment variables prefixed with `NPLAB_` are merged on top.

use figment::{
    providers::{ Env, Format, Toml },
    Figment,
};
use serde::{ Deserialize, Serialize };
use std::{ path::Path, time::Duration };
use crate::{
    error::Result,
    transport::DEFAULT_TIMEOUT,
};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config
{
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InstrumentConfig
{
    /// Name the instrument is registered under in a session
    pub name: String,
    pub kind: InstrumentKind,
    pub connection: ConnectionConfig,
    /// Per-read timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Put the instrument into its reset state as soon as it is connected
    #[serde(default)]
    pub reset_on_connect: bool,
}

impl InstrumentConfig
{
    pub fn timeout(&self) -> Duration
    {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_TIMEOUT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind
{
    Seekat,
    DacAdc,
    Keithley6221,
    Keithley2182a,
    Lr700,
    Sim900,
    Dc205,
    Xgs600,
}

impl InstrumentKind
{
    /// Baud rate the instrument's firmware ships with
    pub fn default_baud(&self) -> u32
    {
        match self {
            InstrumentKind::DacAdc | InstrumentKind::Dc205 => 115_200,
            _ => 9600,
        }
    }

    pub fn as_str(&self) -> &'static str
    {
        match self {
            InstrumentKind::Seekat => "seekat",
            InstrumentKind::DacAdc => "dac_adc",
            InstrumentKind::Keithley6221 => "keithley_6221",
            InstrumentKind::Keithley2182a => "keithley_2182a",
            InstrumentKind::Lr700 => "lr_700",
            InstrumentKind::Sim900 => "sim900",
            InstrumentKind::Dc205 => "dc205",
            InstrumentKind::Xgs600 => "xgs600",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity
{
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig
{
    Serial
    {
        port: String,
        #[serde(default)]
        baud_rate: Option<u32>,
        #[serde(default)]
        data_bits: Option<u8>,
        #[serde(default)]
        parity: Option<Parity>,
        #[serde(default)]
        stop_bits: Option<u8>,
    },
    Tcp
    {
        host: String,
        port: u16,
    },
}

impl Config
{
    /// Loads a TOML file and merges `NPLAB_*` environment variables over it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self>
    {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("NPLAB_").split("__"))
            .extract()?;

        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self>
    {
        let config = Figment::new().merge(Toml::string(toml)).extract()?;
        Ok(config)
    }

    pub fn instrument(&self, name: &str) -> Option<&InstrumentConfig>
    {
        self.instruments.iter().find(|instrument| instrument.name == name)
    }
}
