//! The instruments of one rig, opened together and looked up by name
//!
//! A [`Session`] owns every handle; there is no global instrument registry. Handles are stored as
//! an [`Instrument`] over a boxed transport so that serial and TCP instruments sit side by side,
//! and are borrowed back with the typed accessors:
//!
//! ```no_run
//! # async fn run() -> nplab_drivers::Result<()> {
//! use nplab_drivers::{ config::Config, session::Session };
//!
//! let config = Config::load("rig.toml")?;
//! let mut session = Session::connect(&config).await?;
//! session.seekat("seekat")?.set_voltage(1, 0.25).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use crate::{
    config::{ Config, InstrumentConfig, InstrumentKind },
    connection,
    devices::{
        dac_adc::DacChannel,
        ppms::MultiVu,
        Cryostat, DacAdc, Dc205, Keithley2182a, Keithley6221, Lr700, Seekat, Sim900, Xgs600,
    },
    error::{ Error, Result },
    scpi::Idn,
    transport::{ LineTransport, Transport },
};

pub type BoxTransport = Box<dyn Transport>;

pub enum Instrument
{
    Seekat(Seekat<BoxTransport>),
    DacAdc(DacAdc<BoxTransport>),
    Keithley6221(Keithley6221<BoxTransport>),
    Keithley2182a(Keithley2182a<BoxTransport>),
    Lr700(Lr700<BoxTransport>),
    Sim900(Sim900<BoxTransport>),
    Dc205(Dc205<BoxTransport>),
    Xgs600(Xgs600<BoxTransport>),
    Cryostat(Cryostat<Box<dyn MultiVu>>),
}

fn parse_channel(device: &'static str, channel: &str) -> Result<u8>
{
    channel.trim().parse::<u8>().map_err(|_| Error::InvalidChannel {
        device: device,
        channel: channel.to_owned(),
    })
}

impl Instrument
{
    /// Wraps a freshly opened transport in the handle for `kind`
    pub fn from_transport(kind: InstrumentKind, transport: BoxTransport) -> Self
    {
        match kind {
            InstrumentKind::Seekat => Instrument::Seekat(Seekat::with(transport)),
            InstrumentKind::DacAdc => Instrument::DacAdc(DacAdc::with(transport)),
            InstrumentKind::Keithley6221 => Instrument::Keithley6221(Keithley6221::with(transport)),
            InstrumentKind::Keithley2182a => Instrument::Keithley2182a(Keithley2182a::with(transport)),
            InstrumentKind::Lr700 => Instrument::Lr700(Lr700::with(transport)),
            InstrumentKind::Sim900 => Instrument::Sim900(Sim900::with(transport)),
            InstrumentKind::Dc205 => Instrument::Dc205(Dc205::with(transport)),
            InstrumentKind::Xgs600 => Instrument::Xgs600(Xgs600::with(transport)),
        }
    }

    pub fn kind_name(&self) -> &'static str
    {
        match self {
            Instrument::Seekat(_) => "Seekat",
            Instrument::DacAdc(_) => "DAC_ADC",
            Instrument::Keithley6221(_) => "Keithley 6221",
            Instrument::Keithley2182a(_) => "Keithley 2182A",
            Instrument::Lr700(_) => "LR-700",
            Instrument::Sim900(_) => "SIM900",
            Instrument::Dc205(_) => "DC205",
            Instrument::Xgs600(_) => "XGS-600",
            Instrument::Cryostat(_) => "QD cryostat",
        }
    }

    /// Puts the instrument in its power-on state; a no-op for instruments without one
    pub async fn reset(&mut self) -> Result<()>
    {
        match self {
            Instrument::Seekat(seekat) => seekat.reset().await,
            Instrument::DacAdc(dac) => dac.reset().await,
            Instrument::Keithley6221(k6) => k6.reset().await,
            Instrument::Keithley2182a(k2) => k2.reset().await,
            Instrument::Sim900(sim) => sim.reset().await,
            Instrument::Dc205(source) => source.set_voltage(0.0).await,
            Instrument::Lr700(_) | Instrument::Xgs600(_) | Instrument::Cryostat(_) => {
                log::debug!("{} has no reset state", self.kind_name());
                Ok(())
            },
        }
    }

    /// Sets the primary output of `channel`
    ///
    /// What a channel is depends on the instrument: 1-8 on a Seekat, A-D on a DAC_ADC, a slot on a
    /// SIM900. Single output instruments ignore it.
    pub async fn set(&mut self, channel: &str, value: f64) -> Result<()>
    {
        match self {
            Instrument::Seekat(seekat) => seekat.set_voltage(parse_channel("Seekat", channel)?, value).await,
            Instrument::DacAdc(dac) => dac.set_voltage(channel.parse::<DacChannel>()?, value).await.map(|_| ()),
            Instrument::Sim900(sim) => sim.set_voltage(parse_channel("SIM900", channel)?, value).await,
            Instrument::Dc205(source) => source.set_voltage(value).await,
            Instrument::Keithley6221(k6) => k6.set_current(value).await,
            Instrument::Cryostat(cryostat) => cryostat.set_temperature_stable(value, false).await,
            _ => Err(Error::InvalidState("instrument has no settable output")),
        }
    }

    /// Reads the primary quantity of `channel`
    pub async fn get(&mut self, channel: &str) -> Result<f64>
    {
        match self {
            Instrument::Seekat(seekat) => seekat.get_voltage(parse_channel("Seekat", channel)?).await,
            Instrument::DacAdc(dac) => dac.get_voltage(parse_channel("DAC_ADC ADC", channel)?).await,
            Instrument::Sim900(sim) => sim.voltage(parse_channel("SIM900", channel)?).await,
            Instrument::Dc205(source) => source.voltage().await,
            Instrument::Keithley6221(k6) => k6.current().await,
            Instrument::Keithley2182a(k2) => k2.measure().await,
            Instrument::Lr700(bridge) => match channel.trim() {
                "1" | "X" | "x" => bridge.reactance().await,
                _ => bridge.resistance().await,
            },
            Instrument::Cryostat(cryostat) => cryostat.temperature().await,
            Instrument::Xgs600(_) => Err(Error::InvalidState("the XGS-600 driver only reports pressure units")),
        }
    }

    /// Reads every channel, or the single reading of a single channel instrument
    pub async fn get_all(&mut self) -> Result<Vec<f64>>
    {
        match self {
            Instrument::Seekat(seekat) => Ok(seekat.get_all().await?.to_vec()),
            Instrument::DacAdc(dac) => Ok(dac.get_all().await?.to_vec()),
            Instrument::Sim900(sim) => {
                let mut volts = Vec::new();
                for port in sim.ports().to_vec() {
                    volts.push(sim.voltage(port).await?);
                }
                Ok(volts)
            },
            other => Ok(vec![other.get("0").await?]),
        }
    }

    pub async fn idn(&mut self) -> Result<Idn>
    {
        match self {
            Instrument::Keithley6221(k6) => k6.idn().await,
            Instrument::Keithley2182a(k2) => k2.idn().await,
            Instrument::Sim900(sim) => sim.idn().await,
            Instrument::Dc205(source) => source.idn().await,
            _ => Err(Error::InvalidState("instrument does not answer *IDN?")),
        }
    }
}

/// Builds the line framing each instrument's firmware expects
fn frame(kind: InstrumentKind, config: &InstrumentConfig, stream: Box<dyn connection::Stream>) -> BoxTransport
{
    let transport = LineTransport::with(stream).timeout(config.timeout());

    match kind {
        InstrumentKind::DacAdc => Box::new(transport.line_ending("\r")),
        InstrumentKind::Xgs600 => Box::new(transport.line_ending("\r").read_terminator(b'\r')),
        _ => Box::new(transport),
    }
}

macro_rules! accessor {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $handle:ty, $expected:literal) => {
        $(#[$doc])*
        pub fn $name(&mut self, name: &str) -> Result<&mut $handle>
        {
            match self.get_mut(name)? {
                Instrument::$variant(handle) => Ok(handle),
                _ => Err(Error::WrongKind {
                    name: name.to_owned(),
                    expected: $expected,
                }),
            }
        }
    };
}

#[derive(Default)]
pub struct Session
{
    instruments: BTreeMap<String, Instrument>,
}

impl Session
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Opens every instrument in `config`
    ///
    /// Instruments marked `reset_on_connect` are reset once open. A SIM900 always has its link to
    /// the modules set up.
    pub async fn connect(config: &Config) -> Result<Self>
    {
        let mut session = Self::new();

        for instrument_config in &config.instruments {
            let kind = instrument_config.kind;
            let stream = connection::open(
                &instrument_config.connection,
                kind.default_baud(),
                instrument_config.timeout()
            ).await?;

            let mut instrument = Instrument::from_transport(kind, frame(kind, instrument_config, stream));

            if let Instrument::Sim900(sim) = &mut instrument {
                sim.connect().await?;
            }

            if instrument_config.reset_on_connect {
                instrument.reset().await?;
            }

            log::info!("connected {} as {:?}", kind.as_str(), instrument_config.name);
            session.insert(&instrument_config.name, instrument);
        }

        Ok(session)
    }

    /// Adds an instrument, returning whatever was registered under `name` before
    pub fn insert(&mut self, name: &str, instrument: Instrument) -> Option<Instrument>
    {
        self.instruments.insert(name.to_owned(), instrument)
    }

    pub fn remove(&mut self, name: &str) -> Option<Instrument>
    {
        self.instruments.remove(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str>
    {
        self.instruments.keys().map(String::as_str).collect()
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Instrument>
    {
        self.instruments
            .get_mut(name)
            .ok_or_else(|| Error::UnknownInstrument(name.to_owned()))
    }

    /// Borrows several distinct instruments at once, in the order of `names`
    ///
    /// This is how a sweep gets a source to set and meters to read out of one session.
    pub fn get_many_mut(&mut self, names: &[&str]) -> Result<Vec<&mut Instrument>>
    {
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::InvalidState("an instrument can only be borrowed once"));
            }
            if !self.instruments.contains_key(*name) {
                return Err(Error::UnknownInstrument((*name).to_owned()));
            }
        }

        let mut found: Vec<(usize, &mut Instrument)> = self.instruments
            .iter_mut()
            .filter_map(|(name, instrument)| {
                names.iter().position(|wanted| *wanted == name.as_str()).map(|i| (i, instrument))
            })
            .collect();
        found.sort_by_key(|(i, _)| *i);

        Ok(found.into_iter().map(|(_, instrument)| instrument).collect())
    }

    accessor!(seekat, Seekat, Seekat<BoxTransport>, "Seekat");
    accessor!(dac_adc, DacAdc, DacAdc<BoxTransport>, "DAC_ADC");
    accessor!(keithley_6221, Keithley6221, Keithley6221<BoxTransport>, "Keithley 6221");
    accessor!(keithley_2182a, Keithley2182a, Keithley2182a<BoxTransport>, "Keithley 2182A");
    accessor!(lr_700, Lr700, Lr700<BoxTransport>, "LR-700");
    accessor!(sim900, Sim900, Sim900<BoxTransport>, "SIM900");
    accessor!(dc205, Dc205, Dc205<BoxTransport>, "DC205");
    accessor!(xgs600, Xgs600, Xgs600<BoxTransport>, "XGS-600");
    accessor!(
        /// The cryostat is never opened from a configuration file; [`Session::insert`] it
        cryostat, Cryostat, Cryostat<Box<dyn MultiVu>>, "QD cryostat"
    );
}
