//! Agilent XGS-600 gauge controller
//!
//! Commands are `#<address><code>` and end in `\r`, as do replies. Only the pressure unit query
//! is supported.

use std::{ fmt, str::FromStr };
use crate::{
    error::{ Error, Result },
    transport::Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureUnit
{
    Torr,
    Millibar,
    Pascal,
}

impl fmt::Display for PressureUnit
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self {
            PressureUnit::Torr => "Torr",
            PressureUnit::Millibar => "mbar",
            PressureUnit::Pascal => "Pa",
        })
    }
}

impl FromStr for PressureUnit
{
    type Err = Error;

    /// Parses a `>` acknowledged reply such as `>TORR`
    fn from_str(s: &str) -> Result<Self>
    {
        let unit = s.trim().trim_start_matches('>').to_ascii_uppercase();

        match unit.as_str() {
            "TORR" | "00" => Ok(PressureUnit::Torr),
            "MBAR" | "01" => Ok(PressureUnit::Millibar),
            "PASCAL" | "PA" | "02" => Ok(PressureUnit::Pascal),
            _ => Err(Error::parse(s, "TORR, MBAR or PASCAL")),
        }
    }
}

/// Command: `#00<code>`, the controller answering on address 00
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmd
{
    PressureUnits,
}

impl fmt::Display for Cmd
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Cmd::PressureUnits => write!(f, "#0013"),
        }
    }
}

pub struct Xgs600<S>
{
    transport: S,
}

impl <S> Xgs600<S>
    where S: Transport
{
    /// Construct a new device handle
    ///
    /// The transport must use `\r` in both directions.
    pub fn with(transport: S) -> Self
    {
        Self {
            transport: transport,
        }
    }

    pub fn into_inner(self) -> S
    {
        self.transport
    }

    pub async fn pressure_units(&mut self) -> Result<PressureUnit>
    {
        self.transport.query(&Cmd::PressureUnits.to_string()).await?.parse()
    }
}
