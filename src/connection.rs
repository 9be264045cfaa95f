//! Opening byte streams to instruments
//!
//! Serial instruments are opened through `tokio-serial`. GPIB and VISA instruments are reached
//! through a TCP bridge (a GPIB-Ethernet adapter or a VISA socket server), so from here they are
//! plain TCP streams.

use std::time::Duration;
use tokio::{
    io::{ AsyncRead, AsyncWrite },
    net::TcpStream,
};
use tokio_serial::SerialPortBuilderExt;
use crate::{
    config::{ ConnectionConfig, Parity },
    error::{ Error, Result },
};

/// Any bidirectional byte stream an instrument can sit behind
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl <T> Stream for T
    where T: AsyncRead + AsyncWrite + Unpin + Send
{}

/// Opens the stream described by `config`
///
/// `default_baud` is used for serial ports whose configuration does not name a baud rate; each
/// device knows what its firmware expects.
pub async fn open(config: &ConnectionConfig, default_baud: u32, timeout: Duration) -> Result<Box<dyn Stream>>
{
    match config {
        ConnectionConfig::Serial { port, baud_rate, data_bits, parity, stop_bits } => {
            let baud_rate = baud_rate.unwrap_or(default_baud);
            log::debug!("opening {} at {} baud", port, baud_rate);

            let data_bits = match data_bits {
                Some(5) => tokio_serial::DataBits::Five,
                Some(6) => tokio_serial::DataBits::Six,
                Some(7) => tokio_serial::DataBits::Seven,
                _ => tokio_serial::DataBits::Eight,
            };

            let parity = match parity {
                Some(Parity::Even) => tokio_serial::Parity::Even,
                Some(Parity::Odd) => tokio_serial::Parity::Odd,
                _ => tokio_serial::Parity::None,
            };

            let stop_bits = match stop_bits {
                Some(2) => tokio_serial::StopBits::Two,
                _ => tokio_serial::StopBits::One,
            };

            let stream = tokio_serial::new(port.as_str(), baud_rate)
                .data_bits(data_bits)
                .parity(parity)
                .stop_bits(stop_bits)
                .flow_control(tokio_serial::FlowControl::None)
                .timeout(timeout)
                .open_native_async()?;

            log::info!("opened serial port {}", port);
            Ok(Box::new(stream))
        },
        ConnectionConfig::Tcp { host, port } => {
            let addr = format!("{}:{}", host, port);
            log::debug!("connecting to {}", addr);

            let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
                .await
                .map_err(|_| Error::Timeout { after: timeout })??;

            if let Err(err) = stream.set_nodelay(true) {
                log::warn!("unable to set TCP_NODELAY on {}: {}", addr, err);
            }

            log::info!("connected to {}", addr);
            Ok(Box::new(stream))
        },
    }
}
