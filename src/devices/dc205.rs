//! SRS DC205 precision voltage source (USB serial, 115200 baud)

use std::fmt;
use crate::{
    error::{ Error, Result },
    scpi::{ self, Idn, Switch },
    transport::Transport,
};

/// Output range selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dc205Range
{
    /// ±1 V
    One,
    /// ±10 V
    Ten,
    /// ±100 V
    Hundred,
}

impl Dc205Range
{
    fn index(&self) -> u8
    {
        match self {
            Dc205Range::One => 0,
            Dc205Range::Ten => 1,
            Dc205Range::Hundred => 2,
        }
    }

    fn from_index(index: i64) -> Option<Self>
    {
        match index {
            0 => Some(Dc205Range::One),
            1 => Some(Dc205Range::Ten),
            2 => Some(Dc205Range::Hundred),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cmd
{
    Set(&'static str, String),
    Query(&'static str),
    Identify,
}

impl fmt::Display for Cmd
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Cmd::Set(header, value) => write!(f, "{} {}", header, value),
            Cmd::Query(header) => write!(f, "{}?", header),
            Cmd::Identify => write!(f, "*IDN?"),
        }
    }
}

pub struct Dc205<S>
{
    transport: S,
}

impl <S> Dc205<S>
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

    async fn ask(&mut self, header: &'static str) -> Result<String>
    {
        self.transport.query(&Cmd::Query(header).to_string()).await
    }

    async fn set(&mut self, header: &'static str, value: String) -> Result<()>
    {
        self.transport.write(&Cmd::Set(header, value).to_string()).await
    }

    pub async fn voltage(&mut self) -> Result<f64>
    {
        scpi::parse_f64(&self.ask("VOLT").await?)
    }

    /// Sets the output voltage, rounded to 0.1 µV
    pub async fn set_voltage(&mut self, volts: f64) -> Result<()>
    {
        let volts = scpi::check_range("DC205 voltage", volts, -100.0, 100.0)?;
        self.set("VOLT", scpi::round_to(volts, 7).to_string()).await
    }

    pub async fn range(&mut self) -> Result<Dc205Range>
    {
        let reply = self.ask("RNGE").await?;
        Dc205Range::from_index(scpi::parse_i64(&reply)?).ok_or_else(|| Error::parse(&reply, "a range index (0-2)"))
    }

    pub async fn set_range(&mut self, range: Dc205Range) -> Result<()>
    {
        self.set("RNGE", range.index().to_string()).await
    }

    pub async fn output(&mut self) -> Result<bool>
    {
        scpi::parse_bool(&self.ask("SOUT").await?)
    }

    pub async fn set_output(&mut self, on: bool) -> Result<()>
    {
        self.set("SOUT", Switch(on).to_string()).await
    }

    /// Whether the output floats (`true`) or is tied to chassis ground
    pub async fn isolation(&mut self) -> Result<bool>
    {
        scpi::parse_bool(&self.ask("ISOL").await?)
    }

    pub async fn set_isolation(&mut self, floating: bool) -> Result<()>
    {
        self.set("ISOL", Switch(floating).to_string()).await
    }

    pub async fn idn(&mut self) -> Result<Idn>
    {
        let reply = self.transport.query(&Cmd::Identify.to_string()).await?;
        Ok(Idn::parse(&reply))
    }
}
