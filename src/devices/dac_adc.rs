//! OpenDacs DAC_ADC (AD5764 DAC + AD7734 ADC on an Arduino Due)
//!
//! Plain ASCII over USB serial at 115200 baud. Commands end in `\r`, replies in `\r\n`. The
//! firmware numbers its channels in board order, which is not the order printed on the front
//! panel, so both DAC and ADC channels are remapped before being sent.

use std::{ fmt, str::FromStr };
use crate::{
    error::{ Error, Result },
    scpi,
    transport::Transport,
};

/// Front panel DAC outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DacChannel
{
    A,
    B,
    C,
    D,
}

impl DacChannel
{
    pub const ALL: [DacChannel; 4] = [DacChannel::A, DacChannel::B, DacChannel::C, DacChannel::D];

    fn firmware(&self) -> u8
    {
        match self {
            DacChannel::A => 1,
            DacChannel::B => 3,
            DacChannel::C => 0,
            DacChannel::D => 2,
        }
    }
}

impl FromStr for DacChannel
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(DacChannel::A),
            "B" => Ok(DacChannel::B),
            "C" => Ok(DacChannel::C),
            "D" => Ok(DacChannel::D),
            _ => Err(Error::InvalidChannel {
                device: "DAC_ADC DAC",
                channel: s.to_owned(),
            }),
        }
    }
}

fn adc_firmware(channel: u8) -> Result<u8>
{
    match channel {
        0 => Ok(2),
        1 => Ok(0),
        2 => Ok(3),
        3 => Ok(1),
        _ => Err(Error::InvalidChannel {
            device: "DAC_ADC ADC",
            channel: channel.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cmd
{
    /// Command: `SET,<fw_channel>,<volts>`
    Set(DacChannel, f64),
    /// Command: `GET_ADC,<fw_channel>`
    GetAdc(u8),
    /// Command: `*RDY?`
    Ready,
}

impl fmt::Display for Cmd
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Cmd::Set(channel, volts) => write!(f, "SET,{},{}", channel.firmware(), volts),
            Cmd::GetAdc(fw_channel) => write!(f, "GET_ADC,{}", fw_channel),
            Cmd::Ready => write!(f, "*RDY?"),
        }
    }
}

/// Splits `DAC 1 UPDATED TO 1.0000V` into the channel token and the voltage
fn parse_set_reply(reply: &str) -> Result<(String, f64)>
{
    let tokens: Vec<&str> = reply.split(' ').collect();

    match (tokens.get(1), tokens.get(4)) {
        (Some(channel), Some(volts)) => {
            let volts = volts.split('V').next().unwrap_or_default();
            let volts = volts
                .parse::<f64>()
                .map_err(|_| Error::parse(reply, "a DAC update acknowledgement"))?;
            Ok(((*channel).to_owned(), volts))
        },
        _ => Err(Error::parse(reply, "a DAC update acknowledgement")),
    }
}

pub struct DacAdc<S>
{
    transport: S,
}

impl <S> DacAdc<S>
    where S: Transport
{
    /// Construct a new device handle
    ///
    /// The transport must write `\r` after each command.
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

    /// Drives a DAC output and returns the firmware's channel and voltage acknowledgement
    pub async fn set_voltage(&mut self, channel: DacChannel, volts: f64) -> Result<(String, f64)>
    {
        let volts = scpi::check_range("DAC voltage", volts, -10.0, 10.0)?;
        let reply = self.transport.query(&Cmd::Set(channel, volts).to_string()).await?;
        parse_set_reply(&reply)
    }

    /// Reads ADC input `channel` (0-3)
    pub async fn get_voltage(&mut self, channel: u8) -> Result<f64>
    {
        let fw_channel = adc_firmware(channel)?;
        let reply = self.transport.query(&Cmd::GetAdc(fw_channel).to_string()).await?;
        scpi::parse_f64(&reply)
    }

    pub async fn is_ready(&mut self) -> Result<bool>
    {
        let reply = self.transport.query(&Cmd::Ready.to_string()).await?;
        Ok(reply.trim() == "READY")
    }

    /// Sets every DAC output to 0 V
    pub async fn reset(&mut self) -> Result<()>
    {
        for channel in DacChannel::ALL {
            self.set_voltage(channel, 0.0).await?;
        }

        Ok(())
    }

    /// Reads every ADC input, index 0 being ADC 0
    pub async fn get_all(&mut self) -> Result<[f64; 4]>
    {
        let mut volts = [0.0; 4];

        for (channel, volt) in volts.iter_mut().enumerate() {
            *volt = self.get_voltage(channel as u8).await?;
        }

        Ok(volts)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::transport::LineTransport;
    use tokio_test::io::Builder;

    #[test]
    fn channel_names()
    {
        assert_eq!("a".parse::<DacChannel>().unwrap(), DacChannel::A);
        assert_eq!(" D ".parse::<DacChannel>().unwrap(), DacChannel::D);
        assert!("E".parse::<DacChannel>().is_err());
    }

    #[test]
    fn commands_use_firmware_numbering()
    {
        assert_eq!(Cmd::Set(DacChannel::A, 1.5).to_string(), "SET,1,1.5");
        assert_eq!(Cmd::Set(DacChannel::C, -2.0).to_string(), "SET,0,-2");
        assert_eq!(Cmd::GetAdc(adc_firmware(0).unwrap()).to_string(), "GET_ADC,2");
        assert_eq!(Cmd::GetAdc(adc_firmware(3).unwrap()).to_string(), "GET_ADC,1");
        assert!(adc_firmware(4).is_err());
    }

    #[test]
    fn acknowledgement()
    {
        let (channel, volts) = parse_set_reply("DAC 3 UPDATED TO -2.5000V").unwrap();
        assert_eq!(channel, "3");
        assert_eq!(volts, -2.5);
        assert!(parse_set_reply("NOP").is_err());
        assert!(parse_set_reply("DAC 3 UPDATED TO xV").is_err());
    }

    #[tokio::test]
    async fn set_and_read()
    {
        let mock = Builder::new()
            .write(b"SET,3,2.5\r")
            .read(b"DAC 3 UPDATED TO 2.5000V\r\n")
            .write(b"GET_ADC,0\r")
            .read(b"2.4998\r\n")
            .build();
        let mut dac = DacAdc::with(LineTransport::with(mock).line_ending("\r"));

        assert_eq!(dac.set_voltage(DacChannel::B, 2.5).await.unwrap(), ("3".to_owned(), 2.5));
        assert_eq!(dac.get_voltage(1).await.unwrap(), 2.4998);
    }

    #[tokio::test]
    async fn out_of_range_is_not_sent()
    {
        let mock = Builder::new().build();
        let mut dac = DacAdc::with(LineTransport::with(mock).line_ending("\r"));

        assert!(matches!(dac.set_voltage(DacChannel::A, 10.5).await, Err(Error::OutOfRange { .. })));
    }

    #[tokio::test]
    async fn ready()
    {
        let mock = Builder::new()
            .write(b"*RDY?\r")
            .read(b"READY\r\n")
            .write(b"*RDY?\r")
            .read(b"BUSY\r\n")
            .build();
        let mut dac = DacAdc::with(LineTransport::with(mock).line_ending("\r"));

        assert!(dac.is_ready().await.unwrap());
        assert!(!dac.is_ready().await.unwrap());
    }
}
