//! Keithley 6221 AC/DC current source
//!
//! Besides sourcing current, the 6221 drives a Keithley 2182A nanovoltmeter over an RS-232 link
//! for delta and differential conductance measurements. In those modes the 6221 runs the whole
//! sweep on its own once armed and triggered, and buffers the 2182A's readings for retrieval.
//!
//! # Delta Sequencing
//! A delta measurement is set up with [`Keithley6221::delta_setup`] or
//! [`Keithley6221::diff_conductance_setup`], which arm the instrument and return a
//! [`DeltaSweep`]. Passing that to [`Keithley6221::trigger`] runs it and collects the readings. The
//! instrument stays armed after a run; call [`Keithley6221::abort_arm`] when done.

use std::{ fmt, str::FromStr, time::Duration };
use crate::{
    error::{ Error, Result },
    scpi::{ self, Idn, Switch },
    transport::Transport,
};

/// Times `*OPC?` is asked before a delta run is given up on
const OPC_POLLS: usize = 6;
const OPC_INTERVAL: Duration = Duration::from_secs(1);
/// Seconds; longer sweeps get half a second per point
const OPC_MIN_TIMEOUT: f64 = 5.0;

/// What the 6221 reports for readings taken by the attached 2182A
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaUnit
{
    Volts,
    Ohms,
    Siemens,
}

impl fmt::Display for DeltaUnit
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(match self {
            DeltaUnit::Volts => "V",
            DeltaUnit::Ohms => "OHMS",
            DeltaUnit::Siemens => "SIEM",
        })
    }
}

impl FromStr for DeltaUnit
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self>
    {
        match scpi::clean_reply(s).to_ascii_uppercase().as_str() {
            "V" | "VOLT" | "VOLTS" => Ok(DeltaUnit::Volts),
            "OHMS" | "OHM" => Ok(DeltaUnit::Ohms),
            "SIEM" | "S" | "SIEMENS" => Ok(DeltaUnit::Siemens),
            _ => Err(Error::parse(s, "V, OHMS or SIEM")),
        }
    }
}

/// Settings forwarded to the attached 2182A
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NanovoltSetting
{
    /// Command: `VOLT:RANG <volts>`
    Range(f64),
    /// Command: `VOLT:NPLC <cycles>`
    Nplc(f64),
    /// Command: `SYST:LSYN <1|0>`
    LineSync(bool),
    /// Command: `SYST:FAZ <1|0>`
    FrontAutozero(bool),
    /// Command: `SYST:AZER <1|0>`
    Autozero(bool),
}

impl fmt::Display for NanovoltSetting
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            NanovoltSetting::Range(volts) => write!(f, "VOLT:RANG {}", volts),
            NanovoltSetting::Nplc(cycles) => write!(f, "VOLT:NPLC {}", cycles),
            NanovoltSetting::LineSync(on) => write!(f, "SYST:LSYN {}", Switch(*on)),
            NanovoltSetting::FrontAutozero(on) => write!(f, "SYST:FAZ {}", Switch(*on)),
            NanovoltSetting::Autozero(on) => write!(f, "SYST:AZER {}", Switch(*on)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cmd
{
    Current(f64),
    CurrentQuery,
    Output(bool),
    OutputQuery,
    Delay(f64),
    DelayQuery,
    Display(bool),
    DisplayQuery,
    Beeper(bool),
    BeeperQuery,
    Unit(DeltaUnit),
    UnitQuery,
    Compliance(f64),
    ComplianceQuery,
    NanovoltPresent,
    DeltaArmed,
    DiffArmed,
    /// Command: `SYST:COMM:SER:SEND "<setting>"`
    Forward(NanovoltSetting),
    AbortArm,
    Reset,
    LastError,
    Identify,
    DeltaHigh(f64),
    DeltaLow(f64),
    DeltaAbortOnCompliance(bool),
    DeltaDelay(f64),
    DeltaCount(u32),
    DeltaArm,
    DiffStart(f64),
    DiffStop(f64),
    DiffStep(f64),
    DiffDelta(f64),
    DiffDelay(f64),
    DiffAbortOnCompliance(bool),
    DiffArm,
    TracePoints(u32),
    Initiate,
    OperationComplete,
    TraceData,
}

impl fmt::Display for Cmd
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Cmd::Current(amps) => write!(f, "SOUR:CURR {}", amps),
            Cmd::CurrentQuery => write!(f, "SOUR:CURR?"),
            Cmd::Output(on) => write!(f, "OUTP:STAT {}", Switch(*on)),
            Cmd::OutputQuery => write!(f, "OUTP:STAT?"),
            Cmd::Delay(seconds) => write!(f, "SOUR:DEL {}", seconds),
            Cmd::DelayQuery => write!(f, "SOUR:DEL?"),
            Cmd::Display(on) => write!(f, "DISP:ENAB {}", Switch(*on)),
            Cmd::DisplayQuery => write!(f, "DISP:ENAB?"),
            Cmd::Beeper(on) => write!(f, "SYST:BEEP {}", Switch(*on)),
            Cmd::BeeperQuery => write!(f, "SYST:BEEP?"),
            Cmd::Unit(unit) => write!(f, "UNIT {}", unit),
            Cmd::UnitQuery => write!(f, "UNIT?"),
            Cmd::Compliance(volts) => write!(f, "SOUR:CURR:COMP {}", volts),
            Cmd::ComplianceQuery => write!(f, "SOUR:CURR:COMP?"),
            Cmd::NanovoltPresent => write!(f, "SOUR:DELT:NVPR?"),
            Cmd::DeltaArmed => write!(f, "SOUR:DELT:ARM?"),
            Cmd::DiffArmed => write!(f, "SOUR:DCON:ARM?"),
            Cmd::Forward(setting) => write!(f, "SYST:COMM:SER:SEND \"{}\"", setting),
            Cmd::AbortArm => write!(f, "SOUR:SWE:ABOR"),
            Cmd::Reset => write!(f, "*RST"),
            Cmd::LastError => write!(f, "SYST:ERR?"),
            Cmd::Identify => write!(f, "*IDN?"),
            Cmd::DeltaHigh(amps) => write!(f, "SOUR:DELT:HIGH {}", amps),
            Cmd::DeltaLow(amps) => write!(f, "SOUR:DELT:LOW {}", amps),
            Cmd::DeltaAbortOnCompliance(on) => write!(f, "SOUR:DELT:CAB {}", Switch(*on)),
            Cmd::DeltaDelay(seconds) => write!(f, "SOUR:DELT:DEL {}", seconds),
            Cmd::DeltaCount(points) => write!(f, "SOUR:DELT:COUN {}", points),
            Cmd::DeltaArm => write!(f, "SOUR:DELT:ARM"),
            Cmd::DiffStart(amps) => write!(f, "SOUR:DCON:STAR {}", amps),
            Cmd::DiffStop(amps) => write!(f, "SOUR:DCON:STOP {}", amps),
            Cmd::DiffStep(amps) => write!(f, "SOUR:DCON:STEP {}", amps),
            Cmd::DiffDelta(amps) => write!(f, "SOUR:DCON:DELT {}", amps),
            Cmd::DiffDelay(seconds) => write!(f, "SOUR:DCON:DEL {}", seconds),
            Cmd::DiffAbortOnCompliance(on) => write!(f, "SOUR:DCON:CAB {}", Switch(*on)),
            Cmd::DiffArm => write!(f, "SOUR:DCON:ARM"),
            Cmd::TracePoints(points) => write!(f, "TRAC:POIN {}", points),
            Cmd::Initiate => write!(f, "INIT:IMM"),
            Cmd::OperationComplete => write!(f, "*OPC?"),
            Cmd::TraceData => write!(f, "TRAC:DATA?"),
        }
    }
}

/// Parameters of a constant-current delta measurement
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaConfig
{
    /// High current in amps
    pub high: f64,
    /// Low current in amps, `-high` when not given
    pub low: Option<f64>,
    pub points: u32,
    /// Settling time after each current reversal, in seconds
    pub delay: f64,
    pub abort_on_compliance: bool,
    /// Also return the 6221's timestamp for each reading
    pub measure_time: bool,
}

impl DeltaConfig
{
    pub fn new(high: f64, points: u32) -> Self
    {
        Self {
            high: high,
            low: None,
            points: points,
            delay: 0.0,
            abort_on_compliance: false,
            measure_time: false,
        }
    }
}

/// Parameters of a differential conductance sweep
#[derive(Debug, Clone, PartialEq)]
pub struct DiffConductanceConfig
{
    pub start: f64,
    pub stop: f64,
    pub step: f64,
    /// Amount the current alternates above and below each step
    pub delta: f64,
    pub delay: f64,
    pub abort_on_compliance: bool,
    pub measure_time: bool,
}

impl DiffConductanceConfig
{
    pub fn new(start: f64, stop: f64, step: f64) -> Self
    {
        Self {
            start: start,
            stop: stop,
            step: step,
            delta: 1e-6,
            delay: 0.0,
            abort_on_compliance: false,
            measure_time: false,
        }
    }
}

/// An armed delta measurement, ready to be triggered
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaSweep
{
    /// Mean current of each reading
    pub setpoints: Vec<f64>,
    pub points: u32,
    pub delay: f64,
    pub measure_time: bool,
}

/// Readings collected from the 6221's trace buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaReadings
{
    pub values: Vec<f64>,
    /// Seconds since the first reading, when the sweep measures time
    pub times: Option<Vec<f64>>,
}

/// Splits a `TRAC:DATA?` reply of `value,timestamp` pairs
fn parse_trace(reply: &str, measure_time: bool) -> Result<DeltaReadings>
{
    let numbers = reply
        .split(',')
        .filter(|field| !field.trim().is_empty())
        .map(scpi::parse_f64)
        .collect::<Result<Vec<f64>>>()?;

    let values = numbers.iter().step_by(2).copied().collect();
    let times = if measure_time {
        Some(numbers.iter().skip(1).step_by(2).copied().collect())
    }
    else {
        None
    };

    Ok(DeltaReadings {
        values: values,
        times: times,
    })
}

/// `start, start + step, ...` stopping short of `stop`
///
/// This rounds the count up where the 6221's point count truncates, so the two differ by one when
/// `step` does not divide the span.
fn arange(start: f64, stop: f64, step: f64) -> Vec<f64>
{
    let count = ((stop - start) / step).ceil().max(0.0) as usize;
    (0..count).map(|i| start + i as f64 * step).collect()
}

pub struct Keithley6221<S>
{
    transport: S,
}

impl <S> Keithley6221<S>
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

    pub async fn current(&mut self) -> Result<f64>
    {
        scpi::parse_f64(&self.ask(Cmd::CurrentQuery).await?)
    }

    /// Sets the DC output current in amps (±105 mA)
    pub async fn set_current(&mut self, amps: f64) -> Result<()>
    {
        let amps = scpi::check_range("current", amps, -0.105, 0.105)?;
        self.send(Cmd::Current(amps)).await
    }

    pub async fn output(&mut self) -> Result<bool>
    {
        scpi::parse_bool(&self.ask(Cmd::OutputQuery).await?)
    }

    pub async fn set_output(&mut self, on: bool) -> Result<()>
    {
        self.send(Cmd::Output(on)).await
    }

    pub async fn delay(&mut self) -> Result<f64>
    {
        scpi::parse_f64(&self.ask(Cmd::DelayQuery).await?)
    }

    /// Sets the source delay in seconds
    pub async fn set_delay(&mut self, seconds: f64) -> Result<()>
    {
        let seconds = scpi::check_range("delay", seconds, 0.001, 999_999.999)?;
        self.send(Cmd::Delay(seconds)).await
    }

    pub async fn display(&mut self) -> Result<bool>
    {
        scpi::parse_bool(&self.ask(Cmd::DisplayQuery).await?)
    }

    pub async fn set_display(&mut self, on: bool) -> Result<()>
    {
        self.send(Cmd::Display(on)).await
    }

    pub async fn beeper(&mut self) -> Result<bool>
    {
        scpi::parse_bool(&self.ask(Cmd::BeeperQuery).await?)
    }

    pub async fn set_beeper(&mut self, on: bool) -> Result<()>
    {
        self.send(Cmd::Beeper(on)).await
    }

    pub async fn unit(&mut self) -> Result<DeltaUnit>
    {
        self.ask(Cmd::UnitQuery).await?.parse()
    }

    pub async fn set_unit(&mut self, unit: DeltaUnit) -> Result<()>
    {
        self.send(Cmd::Unit(unit)).await
    }

    pub async fn compliance(&mut self) -> Result<f64>
    {
        scpi::parse_f64(&self.ask(Cmd::ComplianceQuery).await?)
    }

    /// Sets the voltage compliance in volts
    pub async fn set_compliance(&mut self, volts: f64) -> Result<()>
    {
        let volts = scpi::check_range("compliance", volts, 0.1, 105.0)?;
        self.send(Cmd::Compliance(volts)).await
    }

    /// Whether a 2182A answers on the 6221's RS-232 port
    pub async fn k2182_present(&mut self) -> Result<bool>
    {
        scpi::parse_bool(&self.ask(Cmd::NanovoltPresent).await?)
    }

    pub async fn delta_armed(&mut self) -> Result<bool>
    {
        scpi::parse_bool(&self.ask(Cmd::DeltaArmed).await?)
    }

    pub async fn diff_armed(&mut self) -> Result<bool>
    {
        scpi::parse_bool(&self.ask(Cmd::DiffArmed).await?)
    }

    /// Forwards a setting to the attached 2182A
    ///
    /// These cannot be read back through the 6221.
    pub async fn set_nanovoltmeter(&mut self, setting: NanovoltSetting) -> Result<()>
    {
        match setting {
            NanovoltSetting::Range(volts) => {
                scpi::check_range("2182A range", volts, 0.0, 120.0)?;
            },
            NanovoltSetting::Nplc(cycles) => {
                scpi::check_range("2182A NPLC", cycles, 0.01, 60.0)?;
            },
            _ => {},
        }

        self.send(Cmd::Forward(setting)).await
    }

    /// Disarms a delta or differential conductance measurement
    pub async fn abort_arm(&mut self) -> Result<()>
    {
        self.send(Cmd::AbortArm).await
    }

    pub async fn reset(&mut self) -> Result<()>
    {
        self.send(Cmd::Reset).await
    }

    /// Pops the oldest entry of the error queue
    pub async fn last_error(&mut self) -> Result<String>
    {
        self.ask(Cmd::LastError).await
    }

    pub async fn idn(&mut self) -> Result<Idn>
    {
        Ok(Idn::parse(&self.ask(Cmd::Identify).await?))
    }

    async fn ensure_ready_to_arm(&mut self) -> Result<()>
    {
        if self.delta_armed().await? {
            return Err(Error::InvalidState("delta mode is already armed; abort or trigger it first"));
        }

        if self.diff_armed().await? {
            return Err(Error::InvalidState("differential conductance is armed; abort it first"));
        }

        if !self.k2182_present().await? {
            return Err(Error::InvalidState("no 2182A is connected to the 6221's RS-232 port"));
        }

        Ok(())
    }

    /// Arms a constant-current delta measurement
    pub async fn delta_setup(&mut self, config: DeltaConfig) -> Result<DeltaSweep>
    {
        scpi::check_range("delta points", config.points as f64, 1.0, 65_536.0)?;
        scpi::check_range("delta delay", config.delay, 0.0, 9_999.999)?;

        self.ensure_ready_to_arm().await?;

        self.send(Cmd::DeltaHigh(config.high)).await?;
        let low = match config.low {
            Some(low) => {
                self.send(Cmd::DeltaLow(low)).await?;
                low
            },
            None => -config.high,
        };
        self.send(Cmd::DeltaAbortOnCompliance(config.abort_on_compliance)).await?;
        self.send(Cmd::DeltaDelay(config.delay)).await?;
        self.send(Cmd::DeltaCount(config.points)).await?;
        self.send(Cmd::TracePoints(config.points)).await?;
        self.send(Cmd::DeltaArm).await?;

        log::info!("6221 armed for {} delta points at {} A / {} A", config.points, config.high, low);

        Ok(DeltaSweep {
            setpoints: vec![(config.high - low) / 2.0; config.points as usize],
            points: config.points,
            delay: config.delay,
            measure_time: config.measure_time,
        })
    }

    /// Arms a differential conductance sweep from `start` towards `stop`
    pub async fn diff_conductance_setup(&mut self, config: DiffConductanceConfig) -> Result<DeltaSweep>
    {
        let span = config.stop - config.start;

        if config.step == 0.0 || !config.step.is_finite() || span * config.step < 0.0 {
            return Err(Error::OutOfRange {
                name: "differential conductance step",
                value: config.step,
                min: span.min(0.0),
                max: span.max(0.0),
            });
        }
        scpi::check_range("differential conductance delay", config.delay, 0.0, 9_999.999)?;

        let points = (span / config.step).abs().trunc();
        scpi::check_range("differential conductance points", points, 1.0, 65_536.0)?;
        let points = points as u32;

        self.ensure_ready_to_arm().await?;

        self.send(Cmd::DiffStart(config.start)).await?;
        self.send(Cmd::DiffStop(config.stop)).await?;
        self.send(Cmd::DiffStep(config.step)).await?;
        self.send(Cmd::DiffDelta(config.delta)).await?;
        self.send(Cmd::DiffDelay(config.delay)).await?;
        self.send(Cmd::DiffAbortOnCompliance(config.abort_on_compliance)).await?;
        self.send(Cmd::TracePoints(points)).await?;
        self.send(Cmd::DiffArm).await?;

        log::info!(
            "6221 armed for differential conductance {} A to {} A in {} A steps",
            config.start,
            config.stop,
            config.step
        );

        Ok(DeltaSweep {
            setpoints: arange(config.start, config.stop, config.step),
            points: points,
            delay: config.delay,
            measure_time: config.measure_time,
        })
    }

    /// Runs an armed sweep and returns its readings
    pub async fn trigger(&mut self, sweep: &DeltaSweep) -> Result<DeltaReadings>
    {
        if !self.delta_armed().await? && !self.diff_armed().await? {
            return Err(Error::InvalidState("no delta or differential conductance measurement is armed"));
        }

        self.send(Cmd::Initiate).await?;
        tokio::time::sleep(Duration::from_secs_f64(sweep.delay.max(0.0) * sweep.points as f64)).await;

        // *OPC? is held by the instrument until the sweep is done
        let opc_timeout = Duration::from_secs_f64((sweep.points as f64 / 2.0).max(OPC_MIN_TIMEOUT));
        let opc = Cmd::OperationComplete.to_string();

        let mut finished = false;
        for _ in 0..OPC_POLLS {
            match self.transport.query_within(&opc, opc_timeout).await {
                Ok(reply) => {
                    if scpi::parse_bool(&reply)? {
                        finished = true;
                        break;
                    }
                    tokio::time::sleep(OPC_INTERVAL).await;
                },
                Err(Error::Timeout { .. }) => {
                    log::debug!("no *OPC? reply within {:?}", opc_timeout);
                    break;
                },
                Err(err) => return Err(err),
            }
        }

        if !finished {
            log::warn!("6221 delta sweep did not report completion; reading the buffer anyway");
        }

        let reply = self.ask(Cmd::TraceData).await?;
        parse_trace(&reply, sweep.measure_time)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::transport::LineTransport;
    use approx::assert_relative_eq;
    use tokio_test::io::Builder;

    #[test]
    fn forwarded_settings()
    {
        assert_eq!(
            Cmd::Forward(NanovoltSetting::Nplc(5.0)).to_string(),
            "SYST:COMM:SER:SEND \"VOLT:NPLC 5\""
        );
        assert_eq!(
            Cmd::Forward(NanovoltSetting::Autozero(false)).to_string(),
            "SYST:COMM:SER:SEND \"SYST:AZER 0\""
        );
    }

    #[test]
    fn units()
    {
        assert_eq!("OHMS".parse::<DeltaUnit>().unwrap(), DeltaUnit::Ohms);
        assert_eq!("siem\n".parse::<DeltaUnit>().unwrap(), DeltaUnit::Siemens);
        assert!("A".parse::<DeltaUnit>().is_err());
        assert_eq!(Cmd::Unit(DeltaUnit::Volts).to_string(), "UNIT V");
    }

    #[test]
    fn trace_pairs()
    {
        let readings = parse_trace("1.0E-06,0.0,2.0E-06,0.5,3.0E-06,1.0", true).unwrap();
        assert_eq!(readings.values, vec![1e-6, 2e-6, 3e-6]);
        assert_eq!(readings.times, Some(vec![0.0, 0.5, 1.0]));

        let readings = parse_trace("1.0E-06,0.0,2.0E-06,0.5", false).unwrap();
        assert_eq!(readings.values, vec![1e-6, 2e-6]);
        assert_eq!(readings.times, None);

        assert!(parse_trace("1.0,nope", false).is_err());
    }

    #[test]
    fn arange_stops_short()
    {
        let points = arange(0.0, 1e-6, 2.5e-7);
        assert_eq!(points.len(), 4);
        assert_relative_eq!(points[3], 7.5e-7);
        assert_eq!(arange(1.0, 0.0, -0.5), vec![1.0, 0.5]);
        assert!(arange(0.0, 0.0, 1.0).is_empty());
    }

    fn idle(builder: &mut Builder) -> &mut Builder
    {
        builder
            .write(b"SOUR:DELT:ARM?\n")
            .read(b"0\n")
            .write(b"SOUR:DCON:ARM?\n")
            .read(b"0\n")
            .write(b"SOUR:DELT:NVPR?\n")
            .read(b"1\n")
    }

    #[tokio::test]
    async fn delta_setup_arms()
    {
        let mut builder = Builder::new();
        idle(&mut builder)
            .write(b"SOUR:DELT:HIGH 0.001\n")
            .write(b"SOUR:DELT:CAB 1\n")
            .write(b"SOUR:DELT:DEL 0.002\n")
            .write(b"SOUR:DELT:COUN 3\n")
            .write(b"TRAC:POIN 3\n")
            .write(b"SOUR:DELT:ARM\n");
        let mut k6 = Keithley6221::with(LineTransport::with(builder.build()));

        let mut config = DeltaConfig::new(1e-3, 3);
        config.delay = 2e-3;
        config.abort_on_compliance = true;

        let sweep = k6.delta_setup(config).await.unwrap();
        assert_eq!(sweep.setpoints, vec![1e-3; 3]);
        assert_eq!(sweep.points, 3);
    }

    #[tokio::test]
    async fn delta_setup_with_low()
    {
        let mut builder = Builder::new();
        idle(&mut builder)
            .write(b"SOUR:DELT:HIGH 0.003\n")
            .write(b"SOUR:DELT:LOW 0.001\n")
            .write(b"SOUR:DELT:CAB 0\n")
            .write(b"SOUR:DELT:DEL 0\n")
            .write(b"SOUR:DELT:COUN 2\n")
            .write(b"TRAC:POIN 2\n")
            .write(b"SOUR:DELT:ARM\n");
        let mut k6 = Keithley6221::with(LineTransport::with(builder.build()));

        let mut config = DeltaConfig::new(3e-3, 2);
        config.low = Some(1e-3);

        let sweep = k6.delta_setup(config).await.unwrap();
        assert_relative_eq!(sweep.setpoints[0], 1e-3);
    }

    #[tokio::test]
    async fn setup_refused_while_armed()
    {
        let mock = Builder::new()
            .write(b"SOUR:DELT:ARM?\n")
            .read(b"1\n")
            .build();
        let mut k6 = Keithley6221::with(LineTransport::with(mock));

        assert!(matches!(k6.delta_setup(DeltaConfig::new(1e-3, 3)).await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn setup_refused_without_nanovoltmeter()
    {
        let mock = Builder::new()
            .write(b"SOUR:DELT:ARM?\n")
            .read(b"0\n")
            .write(b"SOUR:DCON:ARM?\n")
            .read(b"0\n")
            .write(b"SOUR:DELT:NVPR?\n")
            .read(b"0\n")
            .build();
        let mut k6 = Keithley6221::with(LineTransport::with(mock));

        let config = DiffConductanceConfig::new(0.0, 1e-6, 1e-7);
        assert!(matches!(k6.diff_conductance_setup(config).await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn diff_conductance_setup_arms()
    {
        let mut builder = Builder::new();
        idle(&mut builder)
            .write(b"SOUR:DCON:STAR 0\n")
            .write(b"SOUR:DCON:STOP 0.00001\n")
            .write(b"SOUR:DCON:STEP 0.0000025\n")
            .write(b"SOUR:DCON:DELT 0.000001\n")
            .write(b"SOUR:DCON:DEL 0\n")
            .write(b"SOUR:DCON:CAB 0\n")
            .write(b"TRAC:POIN 4\n")
            .write(b"SOUR:DCON:ARM\n");
        let mut k6 = Keithley6221::with(LineTransport::with(builder.build()));

        let sweep = k6.diff_conductance_setup(DiffConductanceConfig::new(0.0, 1e-5, 2.5e-6)).await.unwrap();
        assert_eq!(sweep.points, 4);
        assert_eq!(sweep.setpoints.len(), 4);
        assert_relative_eq!(sweep.setpoints[1], 2.5e-6);
    }

    #[tokio::test]
    async fn bad_step_is_rejected_before_io()
    {
        let mock = Builder::new().build();
        let mut k6 = Keithley6221::with(LineTransport::with(mock));

        let zero = DiffConductanceConfig::new(0.0, 1e-6, 0.0);
        assert!(matches!(k6.diff_conductance_setup(zero).await, Err(Error::OutOfRange { .. })));

        let backwards = DiffConductanceConfig::new(0.0, 1e-6, -1e-7);
        assert!(matches!(k6.diff_conductance_setup(backwards).await, Err(Error::OutOfRange { .. })));
    }

    #[tokio::test]
    async fn point_count_is_checked_before_io()
    {
        let mock = Builder::new().build();
        let mut k6 = Keithley6221::with(LineTransport::with(mock));

        let shorter_than_step = DiffConductanceConfig::new(0.0, 1e-6, 2e-6);
        assert!(matches!(k6.diff_conductance_setup(shorter_than_step).await, Err(Error::OutOfRange { .. })));

        let no_span = DiffConductanceConfig::new(1e-6, 1e-6, 1e-7);
        assert!(matches!(k6.diff_conductance_setup(no_span).await, Err(Error::OutOfRange { .. })));

        let too_many = DiffConductanceConfig::new(0.0, 1e-3, 1e-9);
        assert!(matches!(k6.diff_conductance_setup(too_many).await, Err(Error::OutOfRange { .. })));
    }

    #[tokio::test]
    async fn setpoints_can_outnumber_points()
    {
        let mut builder = Builder::new();
        idle(&mut builder)
            .write(b"SOUR:DCON:STAR 0\n")
            .write(b"SOUR:DCON:STOP 0.00001\n")
            .write(b"SOUR:DCON:STEP 0.000003\n")
            .write(b"SOUR:DCON:DELT 0.000001\n")
            .write(b"SOUR:DCON:DEL 0\n")
            .write(b"SOUR:DCON:CAB 0\n")
            .write(b"TRAC:POIN 3\n")
            .write(b"SOUR:DCON:ARM\n");
        let mut k6 = Keithley6221::with(LineTransport::with(builder.build()));

        let sweep = k6.diff_conductance_setup(DiffConductanceConfig::new(0.0, 1e-5, 3e-6)).await.unwrap();
        assert_eq!(sweep.points, 3);
        assert_eq!(sweep.setpoints.len(), 4);
        assert_relative_eq!(sweep.setpoints[3], 9e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn long_sweep_waits_for_completion()
    {
        let mock = Builder::new()
            .write(b"SOUR:DELT:ARM?\n")
            .read(b"1\n")
            .write(b"INIT:IMM\n")
            .write(b"*OPC?\n")
            .wait(Duration::from_secs(8))
            .read(b"1\n")
            .write(b"TRAC:DATA?\n")
            .read(b"1.0E-03,0.0,1.1E-03,0.1\n")
            .build();
        let mut k6 = Keithley6221::with(LineTransport::with(mock));

        let sweep = DeltaSweep {
            setpoints: vec![1e-3; 40],
            points: 40,
            delay: 0.0,
            measure_time: false,
        };

        let readings = k6.trigger(&sweep).await.unwrap();
        assert_eq!(readings.values, vec![1e-3, 1.1e-3]);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_polls_until_complete()
    {
        let mock = Builder::new()
            .write(b"SOUR:DELT:ARM?\n")
            .read(b"1\n")
            .write(b"INIT:IMM\n")
            .write(b"*OPC?\n")
            .read(b"0\n")
            .write(b"*OPC?\n")
            .read(b"1\n")
            .write(b"TRAC:DATA?\n")
            .read(b"1.5E-03,0.000,1.6E-03,0.105\n")
            .build();
        let mut k6 = Keithley6221::with(LineTransport::with(mock));

        let sweep = DeltaSweep {
            setpoints: vec![1e-3; 2],
            points: 2,
            delay: 0.1,
            measure_time: true,
        };

        let readings = k6.trigger(&sweep).await.unwrap();
        assert_eq!(readings.values, vec![1.5e-3, 1.6e-3]);
        assert_eq!(readings.times, Some(vec![0.0, 0.105]));
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_gives_up_polling()
    {
        let mut builder = Builder::new();
        builder
            .write(b"SOUR:DELT:ARM?\n")
            .read(b"0\n")
            .write(b"SOUR:DCON:ARM?\n")
            .read(b"1\n")
            .write(b"INIT:IMM\n");
        for _ in 0..OPC_POLLS {
            builder.write(b"*OPC?\n").read(b"0\n");
        }
        builder.write(b"TRAC:DATA?\n").read(b"2.0E-03,0.0\n");
        let mut k6 = Keithley6221::with(LineTransport::with(builder.build()));

        let sweep = DeltaSweep {
            setpoints: vec![0.0],
            points: 1,
            delay: 0.0,
            measure_time: false,
        };

        let readings = k6.trigger(&sweep).await.unwrap();
        assert_eq!(readings.values, vec![2e-3]);
    }

    #[tokio::test]
    async fn trigger_requires_arming()
    {
        let mock = Builder::new()
            .write(b"SOUR:DELT:ARM?\n")
            .read(b"0\n")
            .write(b"SOUR:DCON:ARM?\n")
            .read(b"0\n")
            .build();
        let mut k6 = Keithley6221::with(LineTransport::with(mock));

        let sweep = DeltaSweep {
            setpoints: vec![],
            points: 0,
            delay: 0.0,
            measure_time: false,
        };
        assert!(matches!(k6.trigger(&sweep).await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn plain_attributes()
    {
        let mock = Builder::new()
            .write(b"SOUR:CURR 0.0001\n")
            .write(b"SOUR:CURR?\n")
            .read(b"1.000000E-04\n")
            .write(b"OUTP:STAT 1\n")
            .write(b"UNIT?\n")
            .read(b"OHMS\n")
            .build();
        let mut k6 = Keithley6221::with(LineTransport::with(mock));

        k6.set_current(1e-4).await.unwrap();
        assert_eq!(k6.current().await.unwrap(), 1e-4);
        k6.set_output(true).await.unwrap();
        assert_eq!(k6.unit().await.unwrap(), DeltaUnit::Ohms);
        assert!(k6.set_delay(0.0).await.is_err());
    }
}
