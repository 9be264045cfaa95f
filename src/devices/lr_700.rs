//! Lakeshore LR-700 AC resistance bridge
//!
//! Range and excitation are selected by index; the driver takes the physical value and looks the
//! index up, so only the values printed on the front panel are accepted.

use std::fmt;
use crate::{
    error::{ Error, Result },
    scpi::{ self, Switch },
    transport::Transport,
};

/// Full-scale resistance in ohms, by range index
pub const RANGES: [f64; 10] = [2e-3, 20e-3, 200e-3, 2.0, 20.0, 200.0, 2e3, 20e3, 200e3, 2e6];

/// Excitation voltage in volts, by excitation index
pub const EXCITATIONS: [f64; 7] = [20e-6, 60e-6, 200e-6, 600e-6, 2e-3, 6e-3, 20e-3];

const TOLERANCE: f64 = 1e-9;

fn table_index(table: &[f64], name: &'static str, value: f64) -> Result<usize>
{
    table
        .iter()
        .position(|entry| (entry - value).abs() <= TOLERANCE * entry.abs())
        .ok_or(Error::OutOfRange {
            name: name,
            value: value,
            min: table[0],
            max: table[table.len() - 1],
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmd
{
    Range(usize),
    Autorange(bool),
    Excitation(usize),
    ExcitationPercent(u8),
    ExcitationPercentEnabled(bool),
    /// Command: `Get 0` for resistance, `Get 1` for reactance
    Get(u8),
}

impl fmt::Display for Cmd
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Cmd::Range(index) => write!(f, "Range {}", index),
            Cmd::Autorange(on) => write!(f, "Autorange {}", Switch(*on)),
            Cmd::Excitation(index) => write!(f, "Excitation {}", index),
            Cmd::ExcitationPercent(percent) => write!(f, "Varexc ={}", percent),
            Cmd::ExcitationPercentEnabled(on) => write!(f, "Varexc {}", Switch(*on)),
            Cmd::Get(quantity) => write!(f, "Get {}", quantity),
        }
    }
}

pub struct Lr700<S>
{
    transport: S,
}

impl <S> Lr700<S>
    where S: Transport
{
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

    /// Selects the full-scale range, which must be one of [`RANGES`]
    pub async fn set_range(&mut self, ohms: f64) -> Result<()>
    {
        let index = table_index(&RANGES, "LR-700 range", ohms)?;
        self.transport.write(&Cmd::Range(index).to_string()).await
    }

    pub async fn set_autorange(&mut self, on: bool) -> Result<()>
    {
        self.transport.write(&Cmd::Autorange(on).to_string()).await
    }

    /// Selects the excitation voltage, which must be one of [`EXCITATIONS`]
    pub async fn set_excitation(&mut self, volts: f64) -> Result<()>
    {
        let index = table_index(&EXCITATIONS, "LR-700 excitation", volts)?;
        self.transport.write(&Cmd::Excitation(index).to_string()).await
    }

    /// Sets the fraction of full excitation used while variable excitation is enabled
    pub async fn set_excitation_percent(&mut self, percent: u8) -> Result<()>
    {
        scpi::check_range("LR-700 excitation percent", percent as f64, 5.0, 99.0)?;
        self.transport.write(&Cmd::ExcitationPercent(percent).to_string()).await
    }

    /// Switches between 100 % excitation and the percentage set above
    pub async fn set_excitation_percent_enabled(&mut self, on: bool) -> Result<()>
    {
        self.transport.write(&Cmd::ExcitationPercentEnabled(on).to_string()).await
    }

    pub async fn resistance(&mut self) -> Result<f64>
    {
        scpi::parse_f64(&self.transport.query(&Cmd::Get(0).to_string()).await?)
    }

    pub async fn reactance(&mut self) -> Result<f64>
    {
        scpi::parse_f64(&self.transport.query(&Cmd::Get(1).to_string()).await?)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::transport::LineTransport;
    use tokio_test::io::Builder;

    #[test]
    fn table_lookup()
    {
        assert_eq!(table_index(&RANGES, "range", 2e-3).unwrap(), 0);
        assert_eq!(table_index(&RANGES, "range", 20.0).unwrap(), 4);
        assert_eq!(table_index(&RANGES, "range", 2e6).unwrap(), 9);
        assert_eq!(table_index(&EXCITATIONS, "excitation", 0.0006).unwrap(), 3);
        assert!(table_index(&RANGES, "range", 3.0).is_err());
        assert!(table_index(&EXCITATIONS, "excitation", 0.0).is_err());
    }

    #[tokio::test]
    async fn settings()
    {
        let mock = Builder::new()
            .write(b"Range 6\n")
            .write(b"Excitation 2\n")
            .write(b"Autorange 0\n")
            .write(b"Varexc =50\n")
            .write(b"Varexc 1\n")
            .build();
        let mut bridge = Lr700::with(LineTransport::with(mock));

        bridge.set_range(2000.0).await.unwrap();
        bridge.set_excitation(200e-6).await.unwrap();
        bridge.set_autorange(false).await.unwrap();
        bridge.set_excitation_percent(50).await.unwrap();
        bridge.set_excitation_percent_enabled(true).await.unwrap();
        assert!(bridge.set_excitation_percent(100).await.is_err());
    }

    #[tokio::test]
    async fn readings()
    {
        let mock = Builder::new()
            .write(b"Get 0\n")
            .read(b"  1234.5\r\n")
            .write(b"Get 1\n")
            .read(b"-0.25\r\n")
            .build();
        let mut bridge = Lr700::with(LineTransport::with(mock));

        assert_eq!(bridge.resistance().await.unwrap(), 1234.5);
        assert_eq!(bridge.reactance().await.unwrap(), -0.25);
    }
}
