//! Seekat voltage codec
//!
//! The OpenDacs Seekat board represents a voltage in [-10 V, +10 V] as a 16-bit code. Codes below
//! 2^15 are positive voltages scaled by 2^15 - 1. Codes at or above 2^15 are negative voltages,
//! stored as `2^16 - |v| / 10 * 2^15`. This looks like two's complement but is not: the positive and
//! negative halves use different denominators (2^15 - 1 vs 2^15). Existing calibrations depend on
//! that asymmetry, so it is reproduced exactly.
//!
//! Both directions are total. Out-of-range voltages are clamped rather than rejected.

/// Magnitude of the largest voltage the board can produce
pub const FULL_SCALE: f64 = 10.0;

/// Resolution of the positive half of the transfer function (≈305 µV)
pub const STEP: f64 = FULL_SCALE / POSITIVE_SPAN;

const POSITIVE_SPAN: f64 = 32767.0;
const NEGATIVE_SPAN: f64 = 32768.0;
const WRAP: f64 = 65536.0;

/// Converts a voltage into the board's 16-bit code
///
/// Voltages beyond ±10 V are clamped and exact halves round to the even code. `NaN` is treated
/// as 0 V so that a bad reading can never command an arbitrary output.
pub fn encode(volts: f64) -> u16
{
    let volts = if volts.is_nan() { 0.0 } else { volts.clamp(-FULL_SCALE, FULL_SCALE) };

    let code = if volts >= 0.0 {
        (POSITIVE_SPAN * volts / FULL_SCALE).round_ties_even()
    }
    else {
        (WRAP - volts.abs() / FULL_SCALE * NEGATIVE_SPAN).round_ties_even()
    };

    // tiny negative voltages round up to 2^16, which the board cannot take
    if code >= WRAP {
        0
    }
    else {
        code as u16
    }
}

/// Converts a 16-bit code read back from the board into a voltage
pub fn decode(code: u16) -> f64
{
    let code = code as f64;

    if code < NEGATIVE_SPAN {
        FULL_SCALE * code / POSITIVE_SPAN
    }
    else {
        -FULL_SCALE * (WRAP - code) / NEGATIVE_SPAN
    }
}

/// Splits a code into its `[high, low]` bytes as they appear on the wire
pub fn to_bytes(code: u16) -> [u8; 2]
{
    code.to_be_bytes()
}

/// Rebuilds a code from the `high` and `low` bytes reported by the board
pub fn from_bytes(high: u8, low: u8) -> u16
{
    u16::from_be_bytes([high, low])
}

/// Encodes a voltage straight to its `[high, low]` wire bytes
pub fn encode_bytes(volts: f64) -> [u8; 2]
{
    to_bytes(encode(volts))
}
