//! Quantum Design cryostats (PPMS, DynaCool, VersaLab, MPMS3)
//!
//! The cryostats are run by MultiVu, which only exposes a COM automation server on the control PC.
//! [`MultiVu`] is the capability the driver needs from it; implement it over whatever bridge the
//! rig uses (a COM shim, a socket server on the MultiVu PC, a simulator). [`Cryostat`] builds the
//! wait-until-stable behaviour on top.
//!
//! MultiVu works in oersted; [`Cryostat`] takes and reports millitesla.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use crate::{
    error::{ Error, Result },
    scpi,
};

const TEMPERATURE_POLL: Duration = Duration::from_millis(50);
const FIELD_POLL: Duration = Duration::from_millis(100);
const TEMPERATURE_GRACE: f64 = 240.0;
const FIELD_GRACE: f64 = 8.0;
const OERSTED_PER_MILLITESLA: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureStatus
{
    Unknown,
    Stable,
    Tracking,
    Near,
    Chasing,
    Filling,
    Standby,
    Disabled,
    ImpedanceNotFunctioning,
    Failure,
    Other(i32),
}

impl TemperatureStatus
{
    pub fn from_code(code: i32) -> Self
    {
        match code {
            0 => TemperatureStatus::Unknown,
            1 => TemperatureStatus::Stable,
            2 => TemperatureStatus::Tracking,
            5 => TemperatureStatus::Near,
            6 => TemperatureStatus::Chasing,
            7 => TemperatureStatus::Filling,
            10 => TemperatureStatus::Standby,
            13 => TemperatureStatus::Disabled,
            14 => TemperatureStatus::ImpedanceNotFunctioning,
            15 => TemperatureStatus::Failure,
            other => TemperatureStatus::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus
{
    /// Magnet has not been driven since power up
    Unknown,
    StablePersistent,
    WarmingSwitch,
    CoolingSwitch,
    /// Settled, for magnets without a persistent switch
    StableDriven,
    Iterating,
    Charging,
    Discharging,
    CurrentError,
    Failure,
    Other(i32),
}

impl FieldStatus
{
    pub fn from_code(code: i32) -> Self
    {
        match code {
            0 => FieldStatus::Unknown,
            1 => FieldStatus::StablePersistent,
            2 => FieldStatus::WarmingSwitch,
            3 => FieldStatus::CoolingSwitch,
            4 => FieldStatus::StableDriven,
            5 => FieldStatus::Iterating,
            6 => FieldStatus::Charging,
            7 => FieldStatus::Discharging,
            8 => FieldStatus::CurrentError,
            15 => FieldStatus::Failure,
            other => FieldStatus::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureMode
{
    FastSettle,
    NoOvershoot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldApproach
{
    Linear,
    NoOvershoot,
    Oscillate,
}

/// The MultiVu automation calls the driver relies on
#[async_trait]
pub trait MultiVu: Send
{
    /// `rate` in K/min
    async fn set_temperature(&mut self, kelvin: f64, rate: f64, mode: TemperatureMode) -> Result<()>;

    async fn temperature(&mut self) -> Result<(f64, TemperatureStatus)>;

    /// `rate` in Oe/s
    async fn set_field(&mut self, oersted: f64, rate: f64, approach: FieldApproach) -> Result<()>;

    async fn field(&mut self) -> Result<(f64, FieldStatus)>;

    async fn set_chamber(&mut self, code: i32) -> Result<()>;

    async fn chamber(&mut self) -> Result<i32>;
}

#[async_trait]
impl <M> MultiVu for Box<M>
    where M: MultiVu + ?Sized
{
    async fn set_temperature(&mut self, kelvin: f64, rate: f64, mode: TemperatureMode) -> Result<()>
    {
        (**self).set_temperature(kelvin, rate, mode).await
    }

    async fn temperature(&mut self) -> Result<(f64, TemperatureStatus)>
    {
        (**self).temperature().await
    }

    async fn set_field(&mut self, oersted: f64, rate: f64, approach: FieldApproach) -> Result<()>
    {
        (**self).set_field(oersted, rate, approach).await
    }

    async fn field(&mut self) -> Result<(f64, FieldStatus)>
    {
        (**self).field().await
    }

    async fn set_chamber(&mut self, code: i32) -> Result<()>
    {
        (**self).set_chamber(code).await
    }

    async fn chamber(&mut self) -> Result<i32>
    {
        (**self).chamber().await
    }
}

/// A cryostat behind a [`MultiVu`] bridge
pub struct Cryostat<M>
{
    multivu: M,
    /// K/min
    pub temperature_rate: f64,
    /// Oe/s
    pub field_rate: f64,
}

impl <M> Cryostat<M>
    where M: MultiVu
{
    pub fn with(multivu: M) -> Self
    {
        Self {
            multivu: multivu,
            temperature_rate: 10.0,
            field_rate: 10.0,
        }
    }

    pub fn into_inner(self) -> M
    {
        self.multivu
    }

    pub async fn temperature(&mut self) -> Result<f64>
    {
        Ok(self.multivu.temperature().await?.0)
    }

    /// Present field in millitesla
    pub async fn field(&mut self) -> Result<f64>
    {
        Ok(self.multivu.field().await?.0 / OERSTED_PER_MILLITESLA)
    }

    pub async fn set_chamber(&mut self, code: i32) -> Result<()>
    {
        self.multivu.set_chamber(code).await
    }

    pub async fn chamber(&mut self) -> Result<i32>
    {
        self.multivu.chamber().await
    }

    /// Drives to `kelvin` and waits until the temperature is stable
    ///
    /// With `near_is_enough`, returning as soon as the controller reports Near saves the last
    /// minutes of settling.
    pub async fn set_temperature_stable(&mut self, kelvin: f64, near_is_enough: bool) -> Result<()>
    {
        let kelvin = scpi::check_range("temperature", kelvin, 1.7, 400.0)?;
        let (start, _) = self.multivu.temperature().await?;

        let timeout = Duration::from_secs_f64((start - kelvin).abs() / self.temperature_rate * 3.0 + TEMPERATURE_GRACE);
        let deadline = Instant::now() + timeout;

        self.multivu.set_temperature(kelvin, self.temperature_rate, TemperatureMode::FastSettle).await?;
        log::info!("cryostat: {} K -> {} K", start, kelvin);

        loop {
            let (_, status) = self.multivu.temperature().await?;

            if status == TemperatureStatus::Stable || (near_is_enough && status == TemperatureStatus::Near) {
                return Ok(());
            }

            if Instant::now() >= deadline {
                log::warn!("cryostat temperature not stable after {:?} ({:?})", timeout, status);
                return Err(Error::Timeout { after: timeout });
            }

            tokio::time::sleep(TEMPERATURE_POLL).await;
        }
    }

    /// Ramps linearly to `millitesla` and waits until the magnet settles
    pub async fn set_field_stable(&mut self, millitesla: f64) -> Result<()>
    {
        let millitesla = scpi::check_range("field", millitesla, -9000.0, 9000.0)?;
        let start = self.field().await?;

        let rate = self.field_rate / OERSTED_PER_MILLITESLA;
        let timeout = Duration::from_secs_f64((start - millitesla).abs() / rate * 3.0 + FIELD_GRACE);
        let deadline = Instant::now() + timeout;

        self.multivu
            .set_field(millitesla * OERSTED_PER_MILLITESLA, self.field_rate, FieldApproach::Linear)
            .await?;
        log::info!("cryostat: {} mT -> {} mT", start, millitesla);

        loop {
            let (_, status) = self.multivu.field().await?;

            if status == FieldStatus::StableDriven {
                return Ok(());
            }

            if Instant::now() >= deadline {
                log::warn!("cryostat field not stable after {:?} ({:?})", timeout, status);
                return Err(Error::Timeout { after: timeout });
            }

            tokio::time::sleep(FIELD_POLL).await;
        }
    }
}
