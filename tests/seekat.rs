use nplab_drivers::{
    codec,
    config::InstrumentKind,
    session::{ Instrument, Session },
    sweep::{ self, Channel },
    transport::LineTransport,
};
use std::time::Duration;
use tokio_test::io::Builder;

fn set_frame(select: u8, volts: f64) -> Vec<u8>
{
    let [high, low] = codec::encode_bytes(volts);
    vec![255, 254, 253, select, high, low, 0, 0, 0]
}

fn readback(code: u16) -> Vec<u8>
{
    let mut bytes = [0u8; 12];
    bytes[7..9].copy_from_slice(&code.to_be_bytes());

    bytes.iter().map(|byte| format!("{}\r\n", byte)).collect::<String>().into_bytes()
}

#[tokio::test(start_paused = true)]
async fn set_and_read_back_through_a_session()
{
    let code = codec::encode(-2.5);
    let mock = Builder::new()
        .write(&set_frame(18, -2.5))
        .write(&[255, 254, 253, 146, 0, 0, 0, 0, 0])
        .write(&[255, 254, 253, 146, 0, 0, 0, 0, 0])
        .write(&[255, 254, 253, 0, 0, 0, 0, 0, 0])
        .read(&readback(code))
        .build();

    let mut session = Session::new();
    session.insert("seekat", Instrument::from_transport(InstrumentKind::Seekat, Box::new(LineTransport::with(mock))));

    let seekat = session.get_mut("seekat").unwrap();
    seekat.set("2", -2.5).await.unwrap();
    assert_eq!(seekat.get("2").await.unwrap(), codec::decode(code));
}

#[tokio::test(start_paused = true)]
async fn gate_sweep_reads_the_nanovoltmeter()
{
    let gate = Builder::new()
        .write(&set_frame(19, 0.5))
        .write(&set_frame(19, 1.0))
        .build();
    let meter = Builder::new()
        .write(b"SENS:DATA:FRES?\n")
        .read(b"+1.250000E-06\n")
        .write(b"SENS:DATA:FRES?\n")
        .read(b"+2.500000E-06\n")
        .build();

    let mut session = Session::new();
    session.insert("seekat", Instrument::from_transport(InstrumentKind::Seekat, Box::new(LineTransport::with(gate))));
    session.insert("nvm", Instrument::from_transport(InstrumentKind::Keithley2182a, Box::new(LineTransport::with(meter))));

    let mut borrowed = session.get_many_mut(&["seekat", "nvm"]).unwrap().into_iter();
    let mut gate = Channel::new("gate", borrowed.next().unwrap(), "1");
    let mut voltage = Channel::new("voltage", borrowed.next().unwrap(), "0");

    let data = sweep::single_sweep(&mut gate, &[0.5, 1.0], Duration::from_millis(100), &mut [&mut voltage])
        .await
        .unwrap();

    assert_eq!(data.columns, vec!["gate_set", "voltage"]);
    assert_eq!(data.column("voltage").unwrap(), vec![1.25e-6, 2.5e-6]);
}
