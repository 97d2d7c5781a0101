use std::fmt::Display;

use indexmap::IndexMap;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{AcmorphError, AcmorphResult};

/// A point in coupling space: an ordered set of named real coupling values.
///
/// Points are immutable once constructed. Two points are equal when they hold the same names with
/// the same values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CouplingPoint {
    values: IndexMap<String, f64>,
}

impl CouplingPoint {
    /// Construct a point from `(name, value)` pairs. Later duplicates overwrite earlier ones but
    /// keep the position of the first occurrence.
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
    /// Get the value of a named coupling.
    pub fn get(&self, name: &str) -> AcmorphResult<f64> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| AcmorphError::MissingCouplingError {
                name: name.to_string(),
            })
    }
    /// Iterate over the `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
    /// The coupling names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|name| name.as_str())
    }
    /// The number of couplings in this point.
    pub fn len(&self) -> usize {
        self.values.len()
    }
    /// Whether the point holds no couplings at all.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Display for CouplingPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = self
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({})", body)
    }
}

/// One term of a polynomial expansion in the couplings, stored as ordered
/// `(coupling name, exponent)` pairs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Monomial {
    factors: Vec<(String, u32)>,
}

impl Monomial {
    /// Construct a monomial from `(name, exponent)` pairs. Zero exponents are kept so that the
    /// monomials of one expansion all list the same names.
    pub fn new<I, S>(factors: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        Self {
            factors: factors
                .into_iter()
                .map(|(name, exponent)| (name.into(), exponent))
                .collect(),
        }
    }
    /// The `(name, exponent)` pairs.
    pub fn factors(&self) -> &[(String, u32)] {
        &self.factors
    }
    /// The exponent of a named coupling (zero if it does not appear).
    pub fn exponent(&self, name: &str) -> u32 {
        self.factors
            .iter()
            .find(|(factor, _)| factor == name)
            .map(|(_, exponent)| *exponent)
            .unwrap_or(0)
    }
    /// The total degree.
    pub fn degree(&self) -> u32 {
        self.factors.iter().map(|(_, exponent)| exponent).sum()
    }
    /// Evaluate the monomial at a coupling point: the product of each named value raised to its
    /// exponent. A zero exponent contributes exactly 1, including for a zero coupling.
    pub fn evaluate(&self, point: &CouplingPoint) -> AcmorphResult<f64> {
        self.factors
            .iter()
            .try_fold(1.0, |acc, (name, exponent)| {
                Ok(acc * point.get(name)?.powi(*exponent as i32))
            })
    }
}

impl Display for Monomial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let terms: Vec<String> = self
            .factors
            .iter()
            .filter(|(_, exponent)| *exponent > 0)
            .map(|(name, exponent)| match exponent {
                1 => name.clone(),
                e => format!("{}^{}", name, e),
            })
            .collect();
        if terms.is_empty() {
            write!(f, "1")
        } else {
            write!(f, "{}", terms.join("*"))
        }
    }
}

/// Enumerate every monomial of total degree `degree` in the given couplings.
///
/// # Ordering
///
/// The first name is the reference coupling. The exponent of the *last* name is the outermost,
/// slowest-varying loop and runs upwards from zero; inside it the second-to-last name does the
/// same, and so on down to the second name. The reference coupling takes whatever degree is left.
/// For `[g1, g4]` at degree 2 this gives `g1^2, g1*g4, g4^2`; for `[g1, gi, gj]` it gives the
/// exponent triples `(2,0,0) (1,1,0) (0,2,0) (1,0,1) (0,1,1) (0,0,2)`.
///
/// Basis templates, sample matrices and the probability terms of the categorization all index
/// into this order, so it must not change.
pub fn monomials<S: AsRef<str>>(names: &[S], degree: u32) -> Vec<Monomial> {
    let mut result = Vec::new();
    if names.is_empty() {
        return result;
    }
    let mut exponents = vec![0; names.len()];
    distribute(names, names.len() - 1, degree, &mut exponents, &mut result);
    result
}

fn distribute<S: AsRef<str>>(
    names: &[S],
    position: usize,
    remaining: u32,
    exponents: &mut [u32],
    result: &mut Vec<Monomial>,
) {
    if position == 0 {
        exponents[0] = remaining;
        result.push(Monomial::new(
            names
                .iter()
                .map(|name| name.as_ref())
                .zip(exponents.iter().copied()),
        ));
        return;
    }
    for exponent in 0..=remaining {
        exponents[position] = exponent;
        distribute(names, position - 1, remaining - exponent, exponents, result);
    }
}

/// Evaluate every monomial at one point.
pub fn evaluate_all(monomials: &[Monomial], point: &CouplingPoint) -> AcmorphResult<Vec<f64>> {
    monomials.iter().map(|m| m.evaluate(point)).collect()
}

/// Build the square sample→monomial matrix whose row `i` holds every monomial evaluated at
/// `points[i]`.
///
/// Fails with [`AcmorphError::DegenerateBasisError`] when the number of points differs from the
/// number of monomials, when two points coincide, or when the equilibrated matrix has a reciprocal
/// condition number below `tolerance`.
pub fn build_matrix(
    points: &[CouplingPoint],
    monomials: &[Monomial],
    tolerance: f64,
) -> AcmorphResult<DMatrix<f64>> {
    if points.len() != monomials.len() {
        return Err(AcmorphError::DegenerateBasisError {
            reason: format!(
                "{} sample points cannot determine {} monomial coefficients",
                points.len(),
                monomials.len()
            ),
        });
    }
    for (i, a) in points.iter().enumerate() {
        for (j, b) in points.iter().enumerate().skip(i + 1) {
            if a == b {
                return Err(AcmorphError::DegenerateBasisError {
                    reason: format!("sample points {} and {} are identical: {}", i, j, a),
                });
            }
        }
    }
    let mut matrix = DMatrix::zeros(points.len(), monomials.len());
    for (i, point) in points.iter().enumerate() {
        for (k, monomial) in monomials.iter().enumerate() {
            matrix[(i, k)] = monomial.evaluate(point)?;
        }
    }
    check_conditioning(&matrix, tolerance)?;
    Ok(matrix)
}

/// Invert a sample→monomial matrix.
///
/// The same conditioning check as [`build_matrix`] is applied, so a matrix which passes one passes
/// the other. The inverse is computed from the equilibrated matrix $`S = D_r M D_c`$ as
/// $`M^{-1} = D_c S^{-1} D_r`$, which keeps rows belonging to high powers of large couplings
/// accurate.
pub fn invert(matrix: &DMatrix<f64>, tolerance: f64) -> AcmorphResult<DMatrix<f64>> {
    if !matrix.is_square() {
        return Err(AcmorphError::DegenerateBasisError {
            reason: format!(
                "cannot invert a {}x{} matrix",
                matrix.nrows(),
                matrix.ncols()
            ),
        });
    }
    check_conditioning(matrix, tolerance)?;
    let (row_scales, column_scales, scaled) = equilibrate(matrix);
    let mut inverse = scaled
        .try_inverse()
        .ok_or_else(|| AcmorphError::DegenerateBasisError {
            reason: "matrix is singular".to_string(),
        })?;
    // rows of the inverse are indexed by monomial (columns of M), columns by sample
    for (k, column_scale) in column_scales.iter().enumerate() {
        for (i, row_scale) in row_scales.iter().enumerate() {
            inverse[(k, i)] *= column_scale * row_scale;
        }
    }
    Ok(inverse)
}

/// Snap entries of an inverted matrix which are numerically 0 or 1.
///
/// An entry is compared with the largest magnitude in its row, since the rows belonging to high
/// powers of large couplings are uniformly tiny. Returns the number of entries changed.
pub fn snap_entries(matrix: &mut DMatrix<f64>, tolerance: f64) -> usize {
    let mut snapped = 0;
    for mut row in matrix.row_iter_mut() {
        let scale = row.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
        for x in row.iter_mut() {
            if *x != 0.0 && x.abs() < tolerance * scale {
                *x = 0.0;
                snapped += 1;
            } else if *x != 1.0 && (*x - 1.0).abs() < tolerance {
                *x = 1.0;
                snapped += 1;
            }
        }
    }
    snapped
}

/// Reciprocal condition number of the row- and column-equilibrated matrix.
///
/// Equilibrating first keeps the check meaningful when couplings of very different magnitudes
/// (say `g1 = 1` and `g1prime2 = -12100`) are raised to the fourth power in the same matrix.
pub fn reciprocal_condition(matrix: &DMatrix<f64>) -> f64 {
    let (_, _, scaled) = equilibrate(matrix);
    let singular_values = scaled.singular_values();
    let max = singular_values.max();
    let min = singular_values.min();
    if max > 0.0 && max.is_finite() {
        min / max
    } else {
        0.0
    }
}

// row scales, column scales, and the scaled matrix D_r M D_c with unit max-norm rows and columns
fn equilibrate(matrix: &DMatrix<f64>) -> (Vec<f64>, Vec<f64>, DMatrix<f64>) {
    let mut scaled = matrix.clone();
    let mut row_scales = vec![1.0; matrix.nrows()];
    for (mut row, row_scale) in scaled.row_iter_mut().zip(row_scales.iter_mut()) {
        let max = row.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
        if max > 0.0 {
            *row_scale = 1.0 / max;
            row *= *row_scale;
        }
    }
    let mut column_scales = vec![1.0; matrix.ncols()];
    for (mut column, column_scale) in scaled.column_iter_mut().zip(column_scales.iter_mut()) {
        let max = column.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
        if max > 0.0 {
            *column_scale = 1.0 / max;
            column *= *column_scale;
        }
    }
    (row_scales, column_scales, scaled)
}

fn check_conditioning(matrix: &DMatrix<f64>, tolerance: f64) -> AcmorphResult<()> {
    let rcond = reciprocal_condition(matrix);
    if !rcond.is_finite() || rcond < tolerance {
        return Err(AcmorphError::DegenerateBasisError {
            reason: format!(
                "reciprocal condition number {:e} is below the tolerance {:e}",
                rcond, tolerance
            ),
        });
    }
    Ok(())
}
