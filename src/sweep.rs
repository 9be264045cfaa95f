//! Measurement loops
//!
//! Loops are written against two capabilities: a [`Settable`] swept through a list of values, and
//! [`Gettable`]s read at each point. Instruments take part through [`Channel`], plain closures
//! through [`settable_fn`] / [`gettable_fn`], and elapsed time through [`Stopwatch`]. Every loop
//! returns a [`DataSet`], one row per point.

use async_trait::async_trait;
use chrono::{
    format::{ Item, StrftimeItems },
    Local, TimeZone,
};
use std::{ io, path::Path, time::Duration };
use tokio::time::Instant;
use crate::{
    analysis::Grid2d,
    error::{ Error, Result },
    session::Instrument,
};

/// `time.time()`-style timestamps rendered with microseconds
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S:%6f";

#[async_trait]
pub trait Settable: Send
{
    fn name(&self) -> &str;

    async fn set(&mut self, value: f64) -> Result<()>;
}

#[async_trait]
pub trait Gettable: Send
{
    fn name(&self) -> &str;

    async fn get(&mut self) -> Result<f64>;
}

/// One channel of an instrument as a sweep parameter
///
/// See [`Instrument::set`] and [`Instrument::get`] for what a channel is on each instrument.
pub struct Channel<'a>
{
    name: String,
    instrument: &'a mut Instrument,
    channel: String,
}

impl <'a> Channel<'a>
{
    pub fn new(name: &str, instrument: &'a mut Instrument, channel: &str) -> Self
    {
        Self {
            name: name.to_owned(),
            instrument: instrument,
            channel: channel.to_owned(),
        }
    }
}

#[async_trait]
impl <'a> Settable for Channel<'a>
{
    fn name(&self) -> &str
    {
        &self.name
    }

    async fn set(&mut self, value: f64) -> Result<()>
    {
        self.instrument.set(&self.channel, value).await
    }
}

#[async_trait]
impl <'a> Gettable for Channel<'a>
{
    fn name(&self) -> &str
    {
        &self.name
    }

    async fn get(&mut self) -> Result<f64>
    {
        self.instrument.get(&self.channel).await
    }
}

pub struct FnSettable<F>
{
    name: String,
    f: F,
}

pub struct FnGettable<F>
{
    name: String,
    f: F,
}

/// A settable which calls `f` with each value, e.g. to record a setpoint no instrument knows about
pub fn settable_fn<F>(name: &str, f: F) -> FnSettable<F>
    where F: FnMut(f64) -> Result<()> + Send
{
    FnSettable {
        name: name.to_owned(),
        f: f,
    }
}

/// A gettable computed by `f`, e.g. a resistance derived from a fixed bias
pub fn gettable_fn<F>(name: &str, f: F) -> FnGettable<F>
    where F: FnMut() -> Result<f64> + Send
{
    FnGettable {
        name: name.to_owned(),
        f: f,
    }
}

#[async_trait]
impl <F> Settable for FnSettable<F>
    where F: FnMut(f64) -> Result<()> + Send
{
    fn name(&self) -> &str
    {
        &self.name
    }

    async fn set(&mut self, value: f64) -> Result<()>
    {
        (self.f)(value)
    }
}

#[async_trait]
impl <F> Gettable for FnGettable<F>
    where F: FnMut() -> Result<f64> + Send
{
    fn name(&self) -> &str
    {
        &self.name
    }

    async fn get(&mut self) -> Result<f64>
    {
        (self.f)()
    }
}

/// Seconds since creation or the last [`Stopwatch::reset`]
pub struct Stopwatch
{
    name: String,
    start: Instant,
}

impl Stopwatch
{
    pub fn new(name: &str) -> Self
    {
        Self {
            name: name.to_owned(),
            start: Instant::now(),
        }
    }

    pub fn reset(&mut self)
    {
        self.start = Instant::now();
    }

    pub fn elapsed(&self) -> f64
    {
        self.start.elapsed().as_secs_f64()
    }
}

#[async_trait]
impl Gettable for Stopwatch
{
    fn name(&self) -> &str
    {
        &self.name
    }

    async fn get(&mut self) -> Result<f64>
    {
        Ok(self.elapsed())
    }
}

/// Rows of readings under named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet
{
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl DataSet
{
    pub fn new(columns: Vec<String>) -> Self
    {
        Self {
            columns: columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<f64>) -> Result<()>
    {
        if row.len() != self.columns.len() {
            return Err(Error::Shape(format!(
                "row of {} values for {} columns",
                row.len(),
                self.columns.len()
            )));
        }

        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize
    {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.rows.is_empty()
    }

    /// Every value of the column called `name`
    pub fn column(&self, name: &str) -> Option<Vec<f64>>
    {
        let index = self.columns.iter().position(|column| column == name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    pub fn write_csv_to<W: io::Write>(&self, writer: W) -> Result<()>
    {
        let mut writer = csv::Writer::from_writer(writer);

        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|value| value.to_string()))?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()>
    {
        let file = std::fs::File::create(path.as_ref())?;
        self.write_csv_to(file)?;
        log::info!("wrote {} rows to {}", self.rows.len(), path.as_ref().display());
        Ok(())
    }

    /// Reshapes a 2D sweep into a grid, one grid row per `outer` value
    ///
    /// `inner` values are taken from the first outer row. A sweep stopped early leaves its last
    /// row padded with `NaN`.
    pub fn to_grid(&self, outer: &str, inner: &str, measure: &str) -> Result<Grid2d>
    {
        let find = |name: &str| {
            self.columns
                .iter()
                .position(|column| column == name)
                .ok_or_else(|| Error::Shape(format!("no column named {:?}", name)))
        };
        let (outer, inner, measure) = (find(outer)?, find(inner)?, find(measure)?);

        let mut y: Vec<f64> = Vec::new();
        let mut z: Vec<Vec<f64>> = Vec::new();
        for row in &self.rows {
            if y.last() != Some(&row[outer]) {
                y.push(row[outer]);
                z.push(Vec::new());
            }
            if let Some(z_row) = z.last_mut() {
                z_row.push(row[measure]);
            }
        }

        let width = z.first().map_or(0, Vec::len);
        let x: Vec<f64> = self.rows.iter().take(width).map(|row| row[inner]).collect();
        for z_row in z.iter_mut() {
            z_row.resize(width, f64::NAN);
        }

        Grid2d::new(x, y, z)
    }
}

/// How long [`data_log`] runs for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLength
{
    Count(usize),
    Minutes(f64),
}

impl LogLength
{
    /// Number of points to take with `delay` between them
    pub fn points(&self, delay: Duration) -> Result<usize>
    {
        match *self {
            LogLength::Count(count) => Ok(count),
            LogLength::Minutes(minutes) => {
                let delay = delay.as_secs_f64();
                if delay <= 0.0 || !minutes.is_finite() || minutes < 0.0 {
                    return Err(Error::OutOfRange {
                        name: "data log minutes",
                        value: minutes,
                        min: 0.0,
                        max: f64::INFINITY,
                    });
                }
                Ok((minutes * 60.0 / delay).ceil() as usize)
            },
        }
    }
}

fn set_column(set: &dyn Settable) -> String
{
    format!("{}_set", set.name())
}

/// Sets `set` to each of `values`, waits `delay`, and reads every one of `measures`
pub async fn single_sweep(
    set: &mut dyn Settable,
    values: &[f64],
    delay: Duration,
    measures: &mut [&mut dyn Gettable]
) -> Result<DataSet>
{
    let mut columns = vec![set_column(set)];
    columns.extend(measures.iter().map(|measure| measure.name().to_owned()));
    let mut data = DataSet::new(columns);

    log::info!("sweeping {} over {} points", set.name(), values.len());

    for &value in values {
        set.set(value).await?;
        tokio::time::sleep(delay).await;

        let mut row = Vec::with_capacity(measures.len() + 1);
        row.push(value);
        for measure in measures.iter_mut() {
            row.push(measure.get().await?);
        }
        data.push_row(row)?;
    }

    Ok(data)
}

/// Sweeps `inner` through `inner_values` at each of `outer_values`
pub async fn sweep_2d(
    outer: &mut dyn Settable,
    outer_values: &[f64],
    outer_delay: Duration,
    inner: &mut dyn Settable,
    inner_values: &[f64],
    inner_delay: Duration,
    measure: &mut dyn Gettable
) -> Result<DataSet>
{
    let mut data = DataSet::new(vec![set_column(outer), set_column(inner), measure.name().to_owned()]);

    log::info!(
        "2D sweep of {} ({} points) by {} ({} points)",
        outer.name(),
        outer_values.len(),
        inner.name(),
        inner_values.len()
    );

    for &outer_value in outer_values {
        outer.set(outer_value).await?;
        tokio::time::sleep(outer_delay).await;

        for &inner_value in inner_values {
            inner.set(inner_value).await?;
            tokio::time::sleep(inner_delay).await;
            data.push_row(vec![outer_value, inner_value, measure.get().await?])?;
        }
    }

    Ok(data)
}

/// Reads `measures` every `delay`, recording a point count and the time since the first point
pub async fn data_log(delay: Duration, length: LogLength, measures: &mut [&mut dyn Gettable]) -> Result<DataSet>
{
    let points = length.points(delay)?;

    let mut columns = vec!["count".to_owned(), "time".to_owned()];
    columns.extend(measures.iter().map(|measure| measure.name().to_owned()));
    let mut data = DataSet::new(columns);

    log::info!("logging {} points every {:?}", points, delay);

    let stopwatch = Stopwatch::new("time");
    for count in 1..=points {
        let mut row = vec![count as f64, stopwatch.elapsed()];
        for measure in measures.iter_mut() {
            row.push(measure.get().await?);
        }
        data.push_row(row)?;

        tokio::time::sleep(delay).await;
    }

    Ok(data)
}

/// Renders Unix timestamps (seconds) as local date strings
pub fn format_timestamps(values: &[f64], format: &str) -> Result<Vec<String>>
{
    format_timestamps_in(values, format, &Local)
}

pub fn format_timestamps_in<Tz>(values: &[f64], format: &str, tz: &Tz) -> Result<Vec<String>>
    where Tz: TimeZone,
          Tz::Offset: std::fmt::Display
{
    let items: Vec<Item> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(Error::InvalidState("invalid timestamp format"));
    }

    values
        .iter()
        .map(|&value| {
            let secs = value.floor();
            let nanos = ((value - secs) * 1e9).round().min(999_999_999.0) as u32;

            let time = if value.is_finite() { tz.timestamp_opt(secs as i64, nanos).single() } else { None };

            time.map(|time| time.format_with_items(items.iter()).to_string())
                .ok_or(Error::OutOfRange {
                    name: "timestamp",
                    value: value,
                    min: i64::MIN as f64,
                    max: i64::MAX as f64,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests
{
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::Utc;
    use std::sync::{ Arc, Mutex };

    /// Reads back whatever was last set, scaled
    struct Ohmic
    {
        name: &'static str,
        last: Arc<Mutex<f64>>,
        scale: f64,
    }

    #[async_trait]
    impl Gettable for Ohmic
    {
        fn name(&self) -> &str
        {
            self.name
        }

        async fn get(&mut self) -> Result<f64>
        {
            Ok(*self.last.lock().unwrap() * self.scale)
        }
    }

    fn source(last: &Arc<Mutex<f64>>) -> FnSettable<impl FnMut(f64) -> Result<()> + Send>
    {
        let last = last.clone();
        settable_fn("bias", move |value| {
            *last.lock().unwrap() = value;
            Ok(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn single_sweep_reads_each_point()
    {
        let last = Arc::new(Mutex::new(0.0));
        let mut bias = source(&last);
        let mut current = Ohmic { name: "current", last: last.clone(), scale: 1e-3 };
        let mut doubled = Ohmic { name: "doubled", last: last.clone(), scale: 2.0 };

        let data = single_sweep(
            &mut bias,
            &[0.0, 0.5, 1.0],
            Duration::from_millis(10),
            &mut [&mut current, &mut doubled]
        ).await.unwrap();

        assert_eq!(data.columns, vec!["bias_set", "current", "doubled"]);
        assert_eq!(data.column("bias_set").unwrap(), vec![0.0, 0.5, 1.0]);
        assert_eq!(data.column("doubled").unwrap(), vec![0.0, 1.0, 2.0]);
        assert!(data.column("voltage").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_2d_nests_inner_loop()
    {
        let outer_log = Arc::new(Mutex::new(Vec::new()));
        let recorded = outer_log.clone();
        let mut gate = settable_fn("gate", move |value| {
            recorded.lock().unwrap().push(value);
            Ok(())
        });

        let last = Arc::new(Mutex::new(0.0));
        let mut bias = source(&last);
        let mut reading = Ohmic { name: "v", last: last.clone(), scale: 1.0 };

        let data = sweep_2d(
            &mut gate,
            &[1.0, 2.0],
            Duration::from_secs(1),
            &mut bias,
            &[0.1, 0.2, 0.3],
            Duration::ZERO,
            &mut reading
        ).await.unwrap();

        assert_eq!(*outer_log.lock().unwrap(), vec![1.0, 2.0]);
        assert_eq!(data.len(), 6);
        assert_eq!(data.rows[4], vec![2.0, 0.2, 0.2]);

        let grid = data.to_grid("gate_set", "bias_set", "v").unwrap();
        assert_eq!(grid.x, vec![0.1, 0.2, 0.3]);
        assert_eq!(grid.y, vec![1.0, 2.0]);
        assert_eq!(grid.z[1], vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test(start_paused = true)]
    async fn data_log_counts_and_times()
    {
        let mut constant = gettable_fn("temperature", || Ok(4.2));

        let data = data_log(Duration::from_secs(2), LogLength::Count(3), &mut [&mut constant]).await.unwrap();

        assert_eq!(data.columns, vec!["count", "time", "temperature"]);
        assert_eq!(data.column("count").unwrap(), vec![1.0, 2.0, 3.0]);
        for (time, expected) in data.column("time").unwrap().iter().zip([0.0, 2.0, 4.0]) {
            assert_abs_diff_eq!(*time, expected, epsilon = 0.01);
        }
    }

    #[test]
    fn minutes_round_up_to_whole_points()
    {
        assert_eq!(LogLength::Minutes(1.0).points(Duration::from_secs(7)).unwrap(), 9);
        assert_eq!(LogLength::Minutes(0.5).points(Duration::from_secs(1)).unwrap(), 30);
        assert_eq!(LogLength::Count(4).points(Duration::ZERO).unwrap(), 4);
        assert!(LogLength::Minutes(1.0).points(Duration::ZERO).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stopwatch_resets()
    {
        let mut stopwatch = Stopwatch::new("t");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_abs_diff_eq!(stopwatch.get().await.unwrap(), 3.0, epsilon = 0.01);

        stopwatch.reset();
        assert_abs_diff_eq!(stopwatch.get().await.unwrap(), 0.0, epsilon = 0.01);
    }

    #[test]
    fn rows_must_match_columns()
    {
        let mut data = DataSet::new(vec!["a".to_owned(), "b".to_owned()]);
        assert!(data.push_row(vec![1.0, 2.0]).is_ok());
        assert!(matches!(data.push_row(vec![1.0]), Err(Error::Shape(_))));
    }

    #[test]
    fn csv_export()
    {
        let mut data = DataSet::new(vec!["bias_set".to_owned(), "current".to_owned()]);
        data.push_row(vec![0.5, 1e-6]).unwrap();
        data.push_row(vec![1.0, -2.5]).unwrap();

        let mut out = Vec::new();
        data.write_csv_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "bias_set,current\n0.5,0.000001\n1,-2.5\n");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.csv");
        data.write_csv(&path).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.records().count(), 2);
    }

    #[test]
    fn timestamps()
    {
        let strings = format_timestamps_in(&[0.0, 86_400.25], DEFAULT_TIMESTAMP_FORMAT, &Utc).unwrap();
        assert_eq!(strings, vec!["1970-01-01 00:00:00:000000", "1970-01-02 00:00:00:250000"]);

        assert!(format_timestamps_in(&[f64::NAN], "%Y", &Utc).is_err());
        assert!(format_timestamps_in(&[0.0], "%Q", &Utc).is_err());
        assert_eq!(format_timestamps(&[], "%Y").unwrap(), Vec::<String>::new());
    }
}
