//! Command line access to a single instrument of a rig
//!
//! ```text
//! nplab --config rig.toml set seekat 3 0.25
//! nplab --config rig.toml get-all seekat
//! nplab encode -- -1.5
//! ```

use clap::{ Parser, Subcommand };
use nplab_drivers::{
    codec,
    config::Config,
    error::{ Error, Result },
    session::Session,
};
use std::{ path::{ Path, PathBuf }, process::ExitCode };

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args
{
    /// Rig configuration file
    #[arg(short, long, default_value = "nplab.toml")]
    config: PathBuf,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action
{
    /// Set the output of one channel
    Set
    {
        instrument: String,
        channel: String,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
    /// Read one channel
    Get
    {
        instrument: String,
        channel: String,
    },
    /// Read every channel
    GetAll
    {
        instrument: String,
    },
    /// Return the instrument to its power-on state
    Reset
    {
        instrument: String,
    },
    /// Print the identification string
    Idn
    {
        instrument: String,
    },
    /// Print the Seekat code and wire bytes for a voltage
    Encode
    {
        #[arg(allow_negative_numbers = true)]
        volts: f64,
    },
    /// Print the voltage a Seekat code stands for
    Decode
    {
        code: u16,
    },
}

impl Action
{
    fn instrument(&self) -> Option<&str>
    {
        match self {
            Action::Set { instrument, .. }
            | Action::Get { instrument, .. }
            | Action::GetAll { instrument }
            | Action::Reset { instrument }
            | Action::Idn { instrument } => Some(instrument.as_str()),
            Action::Encode { .. } | Action::Decode { .. } => None,
        }
    }
}

/// Opens just the instrument the action is about
async fn open(config_path: &Path, name: &str) -> Result<Session>
{
    let config = Config::load(config_path)?;
    let instrument = config
        .instrument(name)
        .cloned()
        .ok_or_else(|| Error::UnknownInstrument(name.to_owned()))?;

    Session::connect(&Config { instruments: vec![instrument] }).await
}

async fn run(args: Args) -> Result<()>
{
    let mut session = match args.action.instrument() {
        Some(name) => open(&args.config, name).await?,
        None => Session::new(),
    };

    match args.action {
        Action::Set { instrument, channel, value } => {
            session.get_mut(&instrument)?.set(&channel, value).await?;
        },
        Action::Get { instrument, channel } => {
            println!("{}", session.get_mut(&instrument)?.get(&channel).await?);
        },
        Action::GetAll { instrument } => {
            for (i, value) in session.get_mut(&instrument)?.get_all().await?.iter().enumerate() {
                println!("{}\t{}", i + 1, value);
            }
        },
        Action::Reset { instrument } => {
            session.get_mut(&instrument)?.reset().await?;
        },
        Action::Idn { instrument } => {
            let idn = session.get_mut(&instrument)?.idn().await?;
            println!("{}", idn);
        },
        Action::Encode { volts } => {
            let code = codec::encode(volts);
            let [high, low] = codec::to_bytes(code);
            println!("{}\t0x{:02X} 0x{:02X}", code, high, low);
        },
        Action::Decode { code } => {
            println!("{}", codec::decode(code));
        },
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        },
    }
}
