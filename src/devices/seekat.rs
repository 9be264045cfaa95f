//! OpenDacs Seekat 8-channel ±10 V DAC
//!
//! The Seekat is an Arduino shield carrying two dual DAC/ADC chips. It has no text protocol;
//! every request is a fixed 9-byte frame:
//!
//! ```text
//! [0xFF, 0xFE, 0xFD, select_1, high_1, low_1, select_2, high_2, low_2]
//! ```
//!
//! The first half addresses channels 1-4, the second half channels 5-8. The half which does not
//! address the target channel carries zeros. Voltages are carried as 16-bit codes, see
//! [`crate::codec`].
//!
//! Reading a channel back is a three frame exchange: the read request (select byte + 128) is sent
//! twice, then an all-zero frame clocks the result out. The Arduino answers with twelve lines, each
//! a decimal byte. Bytes 7/8 and 10/11 carry the code for the first and second chip; only one of
//! them is non-zero so the larger of the two is the reading.

use std::{ ops::RangeInclusive, time::Duration };
use crate::{
    codec,
    error::{ Error, Result },
    scpi,
    transport::Transport,
};

pub const CHANNELS: RangeInclusive<u8> = 1..=8;

const HEADER: [u8; 3] = [0xFF, 0xFE, 0xFD];
const READ_FLAG: u8 = 128;
const REPLY_LINES: usize = 12;

/// Pauses the Arduino firmware needs between frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekatTiming
{
    /// Before writing a set frame
    pub before_set: Duration,
    /// Around each frame of the read-back sequence
    pub between_reads: Duration,
}

impl Default for SeekatTiming
{
    fn default() -> Self
    {
        Self {
            before_set: Duration::from_millis(5),
            between_reads: Duration::from_millis(20),
        }
    }
}

/// Which half of the frame a channel lives in, and its select byte there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route
{
    First(u8),
    Second(u8),
}

impl Route
{
    fn of(channel: u8) -> Result<Self>
    {
        match channel {
            1..=4 => Ok(Route::First(20 - channel)),
            5..=8 => Ok(Route::Second(24 - channel)),
            _ => Err(Error::InvalidChannel {
                device: "Seekat",
                channel: channel.to_string(),
            }),
        }
    }
}

/// The frames understood by the Seekat firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame
{
    /// Drive the routed channel to the given code
    Set(Route, u16),
    /// Latch the routed channel's current value for read-back
    ReadRequest(Route),
    /// Clock out whatever was latched
    Flush,
}

impl Frame
{
    fn to_bytes(&self) -> [u8; 9]
    {
        let [h0, h1, h2] = HEADER;

        match *self {
            Frame::Set(Route::First(select), code) => {
                let [high, low] = codec::to_bytes(code);
                [h0, h1, h2, select, high, low, 0, 0, 0]
            },
            Frame::Set(Route::Second(select), code) => {
                let [high, low] = codec::to_bytes(code);
                [h0, h1, h2, 0, 0, 0, select, high, low]
            },
            Frame::ReadRequest(Route::First(select)) => [h0, h1, h2, select + READ_FLAG, 0, 0, 0, 0, 0],
            Frame::ReadRequest(Route::Second(select)) => [h0, h1, h2, 0, 0, 0, select + READ_FLAG, 0, 0],
            Frame::Flush => [h0, h1, h2, 0, 0, 0, 0, 0, 0],
        }
    }
}

/// A connected Seekat
pub struct Seekat<S>
{
    transport: S,
    timing: SeekatTiming,
}

impl <S> Seekat<S>
    where S: Transport
{
    /// Construct a new device handle from a transport
    ///
    /// The Seekat enumerates as a USB serial port at 9600 baud.
    pub fn with(transport: S) -> Self
    {
        Self {
            transport: transport,
            timing: SeekatTiming::default(),
        }
    }

    pub fn timing(mut self, timing: SeekatTiming) -> Self
    {
        self.timing = timing;
        self
    }

    pub fn into_inner(self) -> S
    {
        self.transport
    }

    /// Drives `channel` (1-8) to `volts`
    ///
    /// Voltages beyond ±10 V are clamped to the rail, not rejected.
    pub async fn set_voltage(&mut self, channel: u8, volts: f64) -> Result<()>
    {
        let route = Route::of(channel)?;

        if volts.abs() > codec::FULL_SCALE {
            log::warn!("Seekat channel {}: {} V clamped to ±{} V", channel, volts, codec::FULL_SCALE);
        }

        let frame = Frame::Set(route, codec::encode(volts));
        log::debug!("Seekat channel {} -> {} V", channel, volts);

        tokio::time::sleep(self.timing.before_set).await;
        self.transport.write_raw(&frame.to_bytes()).await
    }

    /// Reads back the voltage of `channel` (1-8)
    pub async fn get_voltage(&mut self, channel: u8) -> Result<f64>
    {
        let route = Route::of(channel)?;
        let pause = self.timing.between_reads;

        self.transport.clear_input().await?;

        tokio::time::sleep(pause).await;
        self.transport.write_raw(&Frame::ReadRequest(route).to_bytes()).await?;
        tokio::time::sleep(pause).await;
        self.transport.write_raw(&Frame::ReadRequest(route).to_bytes()).await?;
        tokio::time::sleep(pause).await;
        self.transport.write_raw(&Frame::Flush.to_bytes()).await?;
        tokio::time::sleep(pause / 2).await;

        let mut reply = [0u8; REPLY_LINES];
        for byte in reply.iter_mut() {
            let line = self.transport.read_line().await?;
            *byte = match scpi::parse_i64(&line)? {
                value @ 0..=255 => value as u8,
                _ => return Err(Error::parse(&line, "a byte value (0-255)")),
            };
        }

        self.transport.clear_input().await?;

        let first = codec::from_bytes(reply[7], reply[8]);
        let second = codec::from_bytes(reply[10], reply[11]);
        let volts = codec::decode(first.max(second));
        log::debug!("Seekat channel {} <- {} V", channel, volts);

        Ok(volts)
    }

    /// Sets every channel to 0 V
    pub async fn reset(&mut self) -> Result<()>
    {
        for channel in CHANNELS {
            self.set_voltage(channel, 0.0).await?;
        }

        Ok(())
    }

    /// Reads every channel, index 0 being channel 1
    pub async fn get_all(&mut self) -> Result<[f64; 8]>
    {
        let mut volts = [0.0; 8];

        for (index, channel) in CHANNELS.enumerate() {
            volts[index] = self.get_voltage(channel).await?;
        }

        Ok(volts)
    }
}
