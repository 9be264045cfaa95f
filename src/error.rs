//! Crate-wide error type

use std::{ io, time::Duration };
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error
{
    /// Reading from or writing to the instrument's stream failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The instrument did not finish replying in time
    #[error("timed out after {after:?} waiting for the instrument")]
    Timeout
    {
        after: Duration,
    },

    #[error("unable to open serial port: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// The instrument replied with something that could not be interpreted
    #[error("unexpected reply {reply:?}, expected {expected}")]
    Parse
    {
        reply: String,
        expected: &'static str,
    },

    #[error("{device} has no channel {channel}")]
    InvalidChannel
    {
        device: &'static str,
        channel: String,
    },

    /// An argument was rejected before anything was sent to the instrument
    #[error("{name} = {value} is outside of [{min}, {max}]")]
    OutOfRange
    {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The instrument is not in a state where the request makes sense
    #[error("{0}")]
    InvalidState(&'static str),

    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("no instrument named {0:?} in this session")]
    UnknownInstrument(String),

    #[error("instrument {name:?} is not a {expected}")]
    WrongKind
    {
        name: String,
        expected: &'static str,
    },

    #[error("unable to write data set: {0}")]
    Csv(#[from] csv::Error),

    /// Array arguments to an analysis routine do not line up
    #[error("shape mismatch: {0}")]
    Shape(String),
}

impl Error
{
    pub(crate) fn parse(reply: &str, expected: &'static str) -> Self
    {
        Error::Parse {
            reply: reply.to_owned(),
            expected: expected,
        }
    }
}
