//! Asynchronous drivers for the instruments of a low-temperature transport rig
//!
//! Every driver is a handle over a [`transport::Transport`], so the same code talks to a USB
//! serial port, a TCP bridge, or a scripted mock in tests. The [`session::Session`] opens a whole
//! rig from a [`config::Config`], [`sweep`] runs measurement loops over it, and [`analysis`]
//! post-processes the resulting 2D data.
//!
//! The Seekat voltage codec lives in [`codec`] and is usable without any hardware.

pub mod analysis;
pub mod codec;
pub mod config;
pub mod connection;
pub mod devices;
pub mod error;
pub mod scpi;
pub mod session;
pub mod sweep;
pub mod transport;

pub use error::{ Error, Result };
