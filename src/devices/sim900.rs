//! SRS SIM900 mainframe with SIM928 voltage source modules
//!
//! The mainframe forwards `SNDT <port>,"<message>"` to the module in slot `port`. Which slots hold
//! voltage sources depends on how the rack is populated, so the driver is told at construction.
//! Modules need a moment to digest each forwarded message.

use std::{ fmt, time::Duration };
use crate::{
    error::{ Error, Result },
    scpi::{ self, Idn, Switch },
    transport::Transport,
};

const PORT_SETTLE: Duration = Duration::from_millis(50);

/// Slots holding voltage sources unless told otherwise
pub const DEFAULT_SOURCE_PORTS: [u8; 2] = [1, 5];

#[derive(Debug, Clone, PartialEq)]
enum Cmd
{
    /// Command: `SNDT <port>,"<message> <value>"`
    SendTo(u8, &'static str, String),
    /// Command: `SNDT <port>,"<message>"`
    AskPort(u8, &'static str),
    Identify,
    Reset,
}

impl fmt::Display for Cmd
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Cmd::SendTo(port, message, value) => write!(f, "SNDT {},\"{} {}\"", port, message, value),
            Cmd::AskPort(port, message) => write!(f, "SNDT {},\"{}\"", port, message),
            Cmd::Identify => write!(f, "*IDN?"),
            Cmd::Reset => write!(f, "*RST"),
        }
    }
}

pub struct Sim900<S>
{
    transport: S,
    source_ports: Vec<u8>,
}

impl <S> Sim900<S>
    where S: Transport
{
    /// Construct a new device handle with sources in [`DEFAULT_SOURCE_PORTS`]
    pub fn with(transport: S) -> Self
    {
        Self {
            transport: transport,
            source_ports: DEFAULT_SOURCE_PORTS.to_vec(),
        }
    }

    pub fn source_ports(mut self, ports: &[u8]) -> Self
    {
        self.source_ports = ports.to_vec();
        self
    }

    pub fn ports(&self) -> &[u8]
    {
        &self.source_ports
    }

    pub fn into_inner(self) -> S
    {
        self.transport
    }

    fn check_port(&self, port: u8) -> Result<()>
    {
        if self.source_ports.contains(&port) {
            Ok(())
        }
        else {
            Err(Error::InvalidChannel {
                device: "SIM900",
                channel: port.to_string(),
            })
        }
    }

    async fn write_to_port(&mut self, port: u8, message: &'static str, value: String) -> Result<()>
    {
        self.transport.write(&Cmd::SendTo(port, message, value).to_string()).await?;
        tokio::time::sleep(PORT_SETTLE).await;
        Ok(())
    }

    async fn ask_port(&mut self, port: u8, message: &'static str) -> Result<String>
    {
        let reply = self.transport.query(&Cmd::AskPort(port, message).to_string()).await?;
        tokio::time::sleep(PORT_SETTLE).await;
        Ok(reply)
    }

    /// Sets up the link to the modules
    ///
    /// The first source is told to terminate replies with `\n`. This is sent twice since the first
    /// message after power up is sometimes lost.
    pub async fn connect(&mut self) -> Result<()>
    {
        if let Some(&port) = self.source_ports.first() {
            self.write_to_port(port, "TERM", "2".to_owned()).await?;
            self.write_to_port(port, "TERM", "2".to_owned()).await?;
        }

        log::info!("SIM900 ready with sources in slots {:?}", self.source_ports);
        Ok(())
    }

    /// Sets a source's voltage, rounded to the module's 1 mV resolution
    pub async fn set_voltage(&mut self, port: u8, volts: f64) -> Result<()>
    {
        self.check_port(port)?;
        let volts = scpi::check_range("SIM928 voltage", volts, -20.0, 20.0)?;
        self.write_to_port(port, "VOLT", scpi::round_to(volts, 3).to_string()).await
    }

    pub async fn voltage(&mut self, port: u8) -> Result<f64>
    {
        self.check_port(port)?;
        scpi::parse_f64(&self.ask_port(port, "VOLT?").await?)
    }

    pub async fn set_output(&mut self, port: u8, on: bool) -> Result<()>
    {
        self.check_port(port)?;
        self.write_to_port(port, "EXON", Switch(on).to_string()).await
    }

    pub async fn output(&mut self, port: u8) -> Result<bool>
    {
        self.check_port(port)?;
        scpi::parse_bool(&self.ask_port(port, "EXON?").await?)
    }

    /// Identifies the mainframe, not the modules
    pub async fn idn(&mut self) -> Result<Idn>
    {
        let reply = self.transport.query(&Cmd::Identify.to_string()).await?;
        Ok(Idn::parse(&reply))
    }

    /// Resets every source (0 V, output off) and then the mainframe
    pub async fn reset(&mut self) -> Result<()>
    {
        for port in self.source_ports.clone() {
            self.transport.write(&Cmd::AskPort(port, "*RST").to_string()).await?;
            tokio::time::sleep(PORT_SETTLE).await;
        }

        self.transport.write(&Cmd::Reset.to_string()).await
    }
}
