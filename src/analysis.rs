//! Post-processing of 2D sweeps
//!
//! A [`Grid2d`] is the `pcolormesh` layout: `x` along each row (the inner sweep), `y` per row
//! (the outer sweep), and `z[row][column]`. Unfinished rows of an interrupted sweep carry a `NaN`
//! `y`.

use crate::error::{ Error, Result };

#[derive(Debug, Clone, PartialEq)]
pub struct Grid2d
{
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<Vec<f64>>,
}

impl Grid2d
{
    /// Checks that `z` has one row per `y` and one column per `x`
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<Vec<f64>>) -> Result<Self>
    {
        if z.len() != y.len() {
            return Err(Error::Shape(format!("{} rows of z for {} y values", z.len(), y.len())));
        }
        if let Some(row) = z.iter().find(|row| row.len() != x.len()) {
            return Err(Error::Shape(format!("z row of {} values for {} x values", row.len(), x.len())));
        }

        Ok(Self {
            x: x,
            y: y,
            z: z,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivative
{
    /// Differential resistance
    DvDi,
    /// Differential conductance
    DiDv,
}

/// Numerical derivative with unit spacing
///
/// Central differences inside, one-sided differences at both ends.
pub fn gradient(values: &[f64]) -> Result<Vec<f64>>
{
    let n = values.len();
    if n < 2 {
        return Err(Error::Shape(format!("gradient needs at least 2 points, got {}", n)));
    }

    let mut out = Vec::with_capacity(n);
    out.push(values[1] - values[0]);
    for i in 1..n - 1 {
        out.push((values[i + 1] - values[i - 1]) / 2.0);
    }
    out.push(values[n - 1] - values[n - 2]);

    Ok(out)
}

/// dV/dI or dI/dV of a current-biased 2D sweep
///
/// `current` is the bias swept along every row of `voltage_rows`, `y` the outer parameter.
pub fn differential_2d(
    current: &[f64],
    y: &[f64],
    voltage_rows: &[Vec<f64>],
    derivative: Derivative
) -> Result<Grid2d>
{
    let grid = Grid2d::new(current.to_vec(), y.to_vec(), voltage_rows.to_vec())?;
    let d_current = gradient(current)?;

    let mut z = Vec::with_capacity(grid.z.len());
    for row in &grid.z {
        let d_voltage = gradient(row)?;
        z.push(
            d_voltage
                .iter()
                .zip(&d_current)
                .map(|(dv, di)| match derivative {
                    Derivative::DvDi => dv / di,
                    Derivative::DiDv => di / dv,
                })
                .collect()
        );
    }

    Ok(Grid2d { z: z, ..grid })
}

/// Merges 2D sweeps taken one after another over the same inner axis
///
/// Rows of the first grid are kept up to its first `NaN` `y`. Each later grid, up to its own
/// first `NaN` `y`, overwrites rows with an equal `y` and adds the rest. The result is sorted by
/// `y` and uses the first grid's `x`.
pub fn concat_2d(grids: &[Grid2d]) -> Result<Grid2d>
{
    let (first, rest) = match grids {
        [first, rest @ ..] if !rest.is_empty() => (first, rest),
        _ => return Err(Error::Shape("need at least 2 grids to concatenate".to_owned())),
    };

    if rest.iter().any(|grid| grid.x.len() != first.x.len()) {
        return Err(Error::Shape("grids must have the same length in x".to_owned()));
    }

    let mut rows: Vec<(f64, Vec<f64>)> = first.y
        .iter()
        .zip(&first.z)
        .take_while(|(y, _)| !y.is_nan())
        .map(|(&y, z)| (y, z.clone()))
        .collect();

    for grid in rest {
        for (&y, z) in grid.y.iter().zip(&grid.z).take_while(|(y, _)| !y.is_nan()) {
            match rows.iter_mut().find(|(existing, _)| *existing == y) {
                Some(row) => row.1 = z.clone(),
                None => rows.push((y, z.clone())),
            }
        }
    }

    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (y, z) = rows.into_iter().unzip();

    Grid2d::new(first.x.clone(), y, z)
}

/// Index of the element nearest to `target`, ignoring `NaN`s
pub fn value_to_index(values: &[f64], target: f64) -> Option<usize>
{
    values
        .iter()
        .enumerate()
        .filter(|(_, value)| !value.is_nan())
        .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gradient_edges_and_interior()
    {
        let g = gradient(&[1.0, 2.0, 4.0, 7.0, 11.0]).unwrap();
        assert_eq!(g, vec![1.0, 1.5, 2.5, 3.5, 4.0]);

        assert_eq!(gradient(&[3.0, 1.0]).unwrap(), vec![-2.0, -2.0]);
        assert!(matches!(gradient(&[1.0]), Err(Error::Shape(_))));
    }

    #[test]
    fn differential_resistance_of_a_resistor()
    {
        let current = [0.0, 1e-6, 2e-6, 3e-6];
        let rows = vec![
            current.iter().map(|i| i * 1000.0).collect::<Vec<f64>>(),
            current.iter().map(|i| i * 2500.0).collect::<Vec<f64>>(),
        ];

        let dvdi = differential_2d(&current, &[0.0, 1.0], &rows, Derivative::DvDi).unwrap();
        assert_eq!(dvdi.x, current.to_vec());
        for value in &dvdi.z[0] {
            assert_relative_eq!(*value, 1000.0, max_relative = 1e-9);
        }

        let didv = differential_2d(&current, &[0.0, 1.0], &rows, Derivative::DiDv).unwrap();
        for value in &didv.z[1] {
            assert_relative_eq!(*value, 4e-4, max_relative = 1e-9);
        }
    }

    #[test]
    fn differential_shape_mismatch()
    {
        let rows = vec![vec![0.0, 1.0]];
        assert!(matches!(
            differential_2d(&[0.0, 1.0, 2.0], &[0.0], &rows, Derivative::DvDi),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            differential_2d(&[0.0, 1.0], &[0.0, 1.0], &rows, Derivative::DvDi),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn concat_replaces_and_sorts()
    {
        let first = Grid2d::new(
            vec![0.0, 1.0],
            vec![0.0, 1.0, 2.0, f64::NAN],
            vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, f64::NAN], vec![f64::NAN, f64::NAN]],
        ).unwrap();
        let second = Grid2d::new(
            vec![5.0, 6.0],
            vec![-1.0, 2.0, 3.0, f64::NAN],
            vec![vec![-1.0, -1.0], vec![2.0, 2.0], vec![3.0, 3.0], vec![9.0, 9.0]],
        ).unwrap();

        let merged = concat_2d(&[first, second]).unwrap();
        assert_eq!(merged.x, vec![0.0, 1.0]);
        assert_eq!(merged.y, vec![-1.0, 0.0, 1.0, 2.0, 3.0]);
        assert_eq!(merged.z[3], vec![2.0, 2.0]);
        assert_eq!(merged.z[0], vec![-1.0, -1.0]);
    }

    #[test]
    fn concat_needs_matching_grids()
    {
        let a = Grid2d::new(vec![0.0, 1.0], vec![0.0], vec![vec![0.0, 0.0]]).unwrap();
        let b = Grid2d::new(vec![0.0], vec![1.0], vec![vec![0.0]]).unwrap();

        assert!(matches!(concat_2d(&[a.clone()]), Err(Error::Shape(_))));
        assert!(matches!(concat_2d(&[a, b]), Err(Error::Shape(_))));
    }

    #[test]
    fn nearest_index()
    {
        let values = [0.0, 0.5, f64::NAN, 1.0, 1.5];
        assert_eq!(value_to_index(&values, 0.9), Some(3));
        assert_eq!(value_to_index(&values, -4.0), Some(0));
        assert_eq!(value_to_index(&[], 1.0), None);
        assert_eq!(value_to_index(&[f64::NAN], 1.0), None);
    }
}
