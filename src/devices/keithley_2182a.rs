//! Keithley 2182A nanovoltmeter
//!
//! Several settings exist once per measurement function (`SENS:VOLT:NPLC`, `SENS:TEMP:NPLC`) and
//! some once per function and input channel (`SENS:VOLT:CHAN1:RANG`). Those accessors ask the
//! instrument for its present function and channel first and address the matching setting.

use std::{ fmt, str::FromStr };
use crate::{
    error::{ Error, Result },
    scpi::{ self, Idn, Switch },
    transport::Transport,
};

const VOLT_RANGES: [&[f64]; 2] = [&[0.01, 0.1, 1.0, 10.0, 100.0], &[0.1, 1.0, 10.0]];

/// Range the low-level calibration has to be run on
const ACAL_RANGE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseMode
{
    Volt,
    Temp,
}

impl fmt::Display for SenseMode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self {
            SenseMode::Volt => "VOLT",
            SenseMode::Temp => "TEMP",
        })
    }
}

impl FromStr for SenseMode
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        match scpi::clean_reply(s).to_ascii_uppercase().as_str() {
            "VOLT" => Ok(SenseMode::Volt),
            "TEMP" => Ok(SenseMode::Temp),
            _ => Err(Error::parse(s, "VOLT or TEMP")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempUnit
{
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl fmt::Display for TempUnit
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self {
            TempUnit::Celsius => "C",
            TempUnit::Fahrenheit => "F",
            TempUnit::Kelvin => "K",
        })
    }
}

impl FromStr for TempUnit
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        match scpi::clean_reply(s).to_ascii_uppercase().as_str() {
            "C" => Ok(TempUnit::Celsius),
            "F" => Ok(TempUnit::Fahrenheit),
            "K" => Ok(TempUnit::Kelvin),
            _ => Err(Error::parse(s, "C, F or K")),
        }
    }
}

/// Temperatures reported when an autocalibration is started, in °C
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutocalTemperatures
{
    /// Internal temperature at the last autocalibration
    pub previous: f64,
    pub current: f64,
}

impl AutocalTemperatures
{
    /// How far the instrument has drifted since it was last calibrated
    pub fn drift(&self) -> f64
    {
        (self.current - self.previous).abs()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cmd
{
    Mode(SenseMode),
    ModeQuery,
    Channel(u8),
    ChannelQuery,
    /// Command: `SENS:<mode>:<setting> <value>`
    ModeSetting(SenseMode, &'static str, String),
    /// Command: `SENS:<mode>:<setting>?`
    ModeSettingQuery(SenseMode, &'static str),
    /// Command: `SENS:<mode>:CHAN<channel>:<setting> <value>`
    ChannelSetting(SenseMode, u8, &'static str, String),
    ChannelSettingQuery(SenseMode, u8, &'static str),
    /// Any plain `<header> <value>` setting
    Set(&'static str, String),
    Query(&'static str),
    Fetch,
    Reset,
    LastError,
    Identify,
    AcalInit,
    AcalPreviousTemp,
    InternalTemp,
    AcalStep2,
    AcalDone,
}

impl fmt::Display for Cmd
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Cmd::Mode(mode) => write!(f, "SENS:FUNC {}", mode),
            Cmd::ModeQuery => write!(f, "SENS:FUNC?"),
            Cmd::Channel(channel) => write!(f, "SENS:CHAN {}", channel),
            Cmd::ChannelQuery => write!(f, "SENS:CHAN?"),
            Cmd::ModeSetting(mode, setting, value) => write!(f, "SENS:{}:{} {}", mode, setting, value),
            Cmd::ModeSettingQuery(mode, setting) => write!(f, "SENS:{}:{}?", mode, setting),
            Cmd::ChannelSetting(mode, channel, setting, value) => {
                write!(f, "SENS:{}:CHAN{}:{} {}", mode, channel, setting, value)
            },
            Cmd::ChannelSettingQuery(mode, channel, setting) => {
                write!(f, "SENS:{}:CHAN{}:{}?", mode, channel, setting)
            },
            Cmd::Set(header, value) => write!(f, "{} {}", header, value),
            Cmd::Query(header) => write!(f, "{}?", header),
            Cmd::Fetch => write!(f, "SENS:DATA:FRES?"),
            Cmd::Reset => write!(f, "*RST"),
            Cmd::LastError => write!(f, "STAT:QUE:NEXT?"),
            Cmd::Identify => write!(f, "*IDN?"),
            Cmd::AcalInit => write!(f, "CAL:UNPR:ACAL:INIT"),
            Cmd::AcalPreviousTemp => write!(f, "CAL:UNPR:ACAL:TEMP?"),
            Cmd::InternalTemp => write!(f, "SENS:TEMP:RTEM?"),
            Cmd::AcalStep2 => write!(f, "CAL:UNPR:ACAL:STEP2"),
            Cmd::AcalDone => write!(f, "CAL:UNPR:ACAL:DONE"),
        }
    }
}

const LINE_SYNC: &str = "SYST:LSYN";
const FRONT_AUTOZERO: &str = "SYST:FAZ";
const AUTOZERO: &str = "SYST:AZER";
const TEMP_UNIT: &str = "UNIT:TEMP";
const DISPLAY: &str = "DISP:ENAB";
const BEEPER: &str = "SYST:BEEP";

pub struct Keithley2182a<S>
{
    transport: S,
}

impl <S> Keithley2182a<S>
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

    async fn send(&mut self, cmd: Cmd) -> Result<()>
    {
        self.transport.write(&cmd.to_string()).await
    }

    async fn ask(&mut self, cmd: Cmd) -> Result<String>
    {
        self.transport.query(&cmd.to_string()).await
    }

    async fn ask_bool(&mut self, header: &'static str) -> Result<bool>
    {
        scpi::parse_bool(&self.ask(Cmd::Query(header)).await?)
    }

    async fn set_bool(&mut self, header: &'static str, on: bool) -> Result<()>
    {
        self.send(Cmd::Set(header, Switch(on).to_string())).await
    }

    pub async fn mode(&mut self) -> Result<SenseMode>
    {
        self.ask(Cmd::ModeQuery).await?.parse()
    }

    pub async fn set_mode(&mut self, mode: SenseMode) -> Result<()>
    {
        self.send(Cmd::Mode(mode)).await
    }

    /// Selected input channel, 0 being the internal temperature sensor
    pub async fn channel(&mut self) -> Result<u8>
    {
        let reply = self.ask(Cmd::ChannelQuery).await?;
        match scpi::parse_i64(&reply)? {
            channel @ 0..=2 => Ok(channel as u8),
            _ => Err(Error::parse(&reply, "a channel number (0-2)")),
        }
    }

    pub async fn set_channel(&mut self, channel: u8) -> Result<()>
    {
        if channel > 2 {
            return Err(Error::InvalidChannel {
                device: "2182A",
                channel: channel.to_string(),
            });
        }

        self.send(Cmd::Channel(channel)).await
    }

    /// Range of the present function on the present channel
    pub async fn range(&mut self) -> Result<f64>
    {
        let mode = self.mode().await?;
        let channel = self.channel().await?;
        scpi::parse_f64(&self.ask(Cmd::ChannelSettingQuery(mode, channel, "RANG")).await?)
    }

    /// Sets the range of the present function on the present channel
    ///
    /// The instrument picks the lowest range which holds `upper`.
    pub async fn set_range(&mut self, upper: f64) -> Result<()>
    {
        let upper = scpi::check_range("range", upper, 0.0, 120.0)?;
        let mode = self.mode().await?;
        let channel = self.channel().await?;
        self.send(Cmd::ChannelSetting(mode, channel, "RANG", upper.to_string())).await
    }

    pub async fn auto_range(&mut self) -> Result<bool>
    {
        let mode = self.mode().await?;
        scpi::parse_bool(&self.ask(Cmd::ModeSettingQuery(mode, "RANG:AUTO")).await?)
    }

    pub async fn set_auto_range(&mut self, on: bool) -> Result<()>
    {
        let mode = self.mode().await?;
        self.send(Cmd::ModeSetting(mode, "RANG:AUTO", Switch(on).to_string())).await
    }

    /// Integration time in power line cycles
    pub async fn nplc(&mut self) -> Result<f64>
    {
        let mode = self.mode().await?;
        scpi::parse_f64(&self.ask(Cmd::ModeSettingQuery(mode, "NPLC")).await?)
    }

    pub async fn set_nplc(&mut self, cycles: f64) -> Result<()>
    {
        let cycles = scpi::check_range("nplc", cycles, 0.01, 60.0)?;
        let mode = self.mode().await?;
        self.send(Cmd::ModeSetting(mode, "NPLC", cycles.to_string())).await
    }

    /// Ranges selectable on the present function and channel, in volts
    pub async fn available_ranges(&mut self) -> Result<Vec<f64>>
    {
        let channel = self.channel().await?;
        if channel == 0 {
            return Err(Error::InvalidChannel {
                device: "2182A (ranges exist on channels 1 and 2)",
                channel: channel.to_string(),
            });
        }

        match self.mode().await? {
            SenseMode::Volt => Ok(VOLT_RANGES[channel as usize - 1].to_vec()),
            SenseMode::Temp => Err(Error::InvalidState("temperature measurements have no selectable range")),
        }
    }

    pub async fn line_sync(&mut self) -> Result<bool>
    {
        self.ask_bool(LINE_SYNC).await
    }

    pub async fn set_line_sync(&mut self, on: bool) -> Result<()>
    {
        self.set_bool(LINE_SYNC, on).await
    }

    pub async fn front_autozero(&mut self) -> Result<bool>
    {
        self.ask_bool(FRONT_AUTOZERO).await
    }

    pub async fn set_front_autozero(&mut self, on: bool) -> Result<()>
    {
        self.set_bool(FRONT_AUTOZERO, on).await
    }

    pub async fn autozero(&mut self) -> Result<bool>
    {
        self.ask_bool(AUTOZERO).await
    }

    pub async fn set_autozero(&mut self, on: bool) -> Result<()>
    {
        self.set_bool(AUTOZERO, on).await
    }

    pub async fn temp_unit(&mut self) -> Result<TempUnit>
    {
        self.ask(Cmd::Query(TEMP_UNIT)).await?.parse()
    }

    pub async fn set_temp_unit(&mut self, unit: TempUnit) -> Result<()>
    {
        self.send(Cmd::Set(TEMP_UNIT, unit.to_string())).await
    }

    pub async fn display(&mut self) -> Result<bool>
    {
        self.ask_bool(DISPLAY).await
    }

    pub async fn set_display(&mut self, on: bool) -> Result<()>
    {
        self.set_bool(DISPLAY, on).await
    }

    pub async fn beeper(&mut self) -> Result<bool>
    {
        self.ask_bool(BEEPER).await
    }

    pub async fn set_beeper(&mut self, on: bool) -> Result<()>
    {
        self.set_bool(BEEPER, on).await
    }

    /// Takes a fresh reading in the present function's unit
    pub async fn measure(&mut self) -> Result<f64>
    {
        scpi::parse_f64(&self.ask(Cmd::Fetch).await?)
    }

    pub async fn reset(&mut self) -> Result<()>
    {
        self.send(Cmd::Reset).await
    }

    pub async fn last_error(&mut self) -> Result<String>
    {
        self.ask(Cmd::LastError).await
    }

    pub async fn idn(&mut self) -> Result<Idn>
    {
        Ok(Idn::parse(&self.ask(Cmd::Identify).await?))
    }

    /// Starts an autocalibration and reports the temperatures to decide on the low-level step
    ///
    /// Low-level calibration takes about five minutes and is worth it when the drift exceeds 1 °C.
    /// Must be followed by [`Keithley2182a::finish_autocalibration`].
    pub async fn begin_autocalibration(&mut self) -> Result<AutocalTemperatures>
    {
        self.send(Cmd::AcalInit).await?;
        let previous = scpi::parse_f64(&self.ask(Cmd::AcalPreviousTemp).await?)?;
        let current = scpi::parse_f64(&self.ask(Cmd::InternalTemp).await?)?;

        log::info!("2182A last autocalibrated at {} °C, now at {} °C", previous, current);

        Ok(AutocalTemperatures {
            previous: previous,
            current: current,
        })
    }

    /// Ends an autocalibration, running the low-level step first if `proceed` is set
    ///
    /// The low-level step needs voltage mode on the 10 mV range; otherwise it is skipped. Returns
    /// whether it ran.
    pub async fn finish_autocalibration(&mut self, proceed: bool) -> Result<bool>
    {
        let mut ran = false;

        if proceed {
            if self.mode().await? == SenseMode::Volt && self.range().await? == ACAL_RANGE {
                self.send(Cmd::AcalStep2).await?;
                ran = true;
            }
            else {
                log::warn!("2182A low-level calibration needs voltage mode on the 10 mV range; skipped");
            }
        }

        self.send(Cmd::AcalDone).await?;
        Ok(ran)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::transport::LineTransport;
    use tokio_test::io::Builder;

    #[test]
    fn mode_replies()
    {
        assert_eq!("\"VOLT:DC\"".parse::<SenseMode>().unwrap(), SenseMode::Volt);
        assert_eq!("TEMP".parse::<SenseMode>().unwrap(), SenseMode::Temp);
        assert!("RES".parse::<SenseMode>().is_err());
        assert_eq!("k".parse::<TempUnit>().unwrap(), TempUnit::Kelvin);
    }

    #[test]
    fn drift()
    {
        let temps = AutocalTemperatures { previous: 31.5, current: 30.0 };
        assert_eq!(temps.drift(), 1.5);
    }

    #[tokio::test]
    async fn channel_dependent_range()
    {
        let mock = Builder::new()
            .write(b"SENS:FUNC?\n")
            .read(b"\"VOLT:DC\"\n")
            .write(b"SENS:CHAN?\n")
            .read(b"2\n")
            .write(b"SENS:VOLT:CHAN2:RANG 10\n")
            .build();
        let mut k2 = Keithley2182a::with(LineTransport::with(mock));

        k2.set_range(10.0).await.unwrap();
    }

    #[tokio::test]
    async fn mode_dependent_nplc()
    {
        let mock = Builder::new()
            .write(b"SENS:FUNC?\n")
            .read(b"\"TEMP\"\n")
            .write(b"SENS:TEMP:NPLC?\n")
            .read(b"+5.000000E+00\n")
            .write(b"SENS:FUNC?\n")
            .read(b"\"VOLT:DC\"\n")
            .write(b"SENS:VOLT:NPLC 1\n")
            .build();
        let mut k2 = Keithley2182a::with(LineTransport::with(mock));

        assert_eq!(k2.nplc().await.unwrap(), 5.0);
        k2.set_nplc(1.0).await.unwrap();
        assert!(k2.set_nplc(61.0).await.is_err());
    }

    #[tokio::test]
    async fn ranges_per_channel()
    {
        let mock = Builder::new()
            .write(b"SENS:CHAN?\n")
            .read(b"1\n")
            .write(b"SENS:FUNC?\n")
            .read(b"\"VOLT:DC\"\n")
            .write(b"SENS:CHAN?\n")
            .read(b"0\n")
            .build();
        let mut k2 = Keithley2182a::with(LineTransport::with(mock));

        assert_eq!(k2.available_ranges().await.unwrap(), vec![0.01, 0.1, 1.0, 10.0, 100.0]);
        assert!(matches!(k2.available_ranges().await, Err(Error::InvalidChannel { .. })));
    }

    #[tokio::test]
    async fn booleans_and_units()
    {
        let mock = Builder::new()
            .write(b"SYST:LSYN 1\n")
            .write(b"SYST:AZER?\n")
            .read(b"0\n")
            .write(b"UNIT:TEMP K\n")
            .write(b"UNIT:TEMP?\n")
            .read(b"K\n")
            .write(b"SENS:DATA:FRES?\n")
            .read(b"-1.234567E-06\n")
            .build();
        let mut k2 = Keithley2182a::with(LineTransport::with(mock));

        k2.set_line_sync(true).await.unwrap();
        assert!(!k2.autozero().await.unwrap());
        k2.set_temp_unit(TempUnit::Kelvin).await.unwrap();
        assert_eq!(k2.temp_unit().await.unwrap(), TempUnit::Kelvin);
        assert_eq!(k2.measure().await.unwrap(), -1.234567e-6);
    }

    #[tokio::test]
    async fn autocalibration_on_10mv_range()
    {
        let mock = Builder::new()
            .write(b"CAL:UNPR:ACAL:INIT\n")
            .write(b"CAL:UNPR:ACAL:TEMP?\n")
            .read(b"+2.850000E+01\n")
            .write(b"SENS:TEMP:RTEM?\n")
            .read(b"+3.010000E+01\n")
            .write(b"SENS:FUNC?\n")
            .read(b"\"VOLT:DC\"\n")
            .write(b"SENS:FUNC?\n")
            .read(b"\"VOLT:DC\"\n")
            .write(b"SENS:CHAN?\n")
            .read(b"1\n")
            .write(b"SENS:VOLT:CHAN1:RANG?\n")
            .read(b"+1.000000E-02\n")
            .write(b"CAL:UNPR:ACAL:STEP2\n")
            .write(b"CAL:UNPR:ACAL:DONE\n")
            .build();
        let mut k2 = Keithley2182a::with(LineTransport::with(mock));

        let temps = k2.begin_autocalibration().await.unwrap();
        assert_eq!(temps.previous, 28.5);
        assert!(k2.finish_autocalibration(true).await.unwrap());
    }

    #[tokio::test]
    async fn autocalibration_declined()
    {
        let mock = Builder::new()
            .write(b"CAL:UNPR:ACAL:DONE\n")
            .build();
        let mut k2 = Keithley2182a::with(LineTransport::with(mock));

        assert!(!k2.finish_autocalibration(false).await.unwrap());
    }

    #[tokio::test]
    async fn autocalibration_wrong_range_still_finishes()
    {
        let mock = Builder::new()
            .write(b"SENS:FUNC?\n")
            .read(b"\"TEMP\"\n")
            .write(b"CAL:UNPR:ACAL:DONE\n")
            .build();
        let mut k2 = Keithley2182a::with(LineTransport::with(mock));

        assert!(!k2.finish_autocalibration(true).await.unwrap());
    }
}
