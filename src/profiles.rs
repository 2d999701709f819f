//! Profile matrix validation and column statistics
//!
//! A profile matrix is a 2D `f64` array: rows are ordered timesteps, columns
//! are independent profile instances.

use ndarray::{Array2, ArrayBase, ArrayView2, Axis, Data, Dimension, Ix2};

use crate::{PerturbationError, Result};

/// Views an array of any rank as a profile matrix, rejecting anything that is
/// not 2D or that has no rows or no columns.
pub fn as_profile_matrix<S, D>(profiles: &ArrayBase<S, D>) -> Result<ArrayView2<'_, f64>>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let ndim = profiles.ndim();
    let view = profiles
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| PerturbationError::WrongRank { ndim })?;
    validate_profiles(view)?;
    Ok(view)
}

/// Rejects empty profile matrices.
pub fn validate_profiles(profiles: ArrayView2<'_, f64>) -> Result<()> {
    let (rows, cols) = profiles.dim();
    if rows == 0 || cols == 0 {
        return Err(PerturbationError::EmptyProfiles { rows, cols });
    }
    Ok(())
}

/// Mean absolute value of every column, shaped `(1, n_columns)` so it
/// broadcasts over the rows of the matrix it came from.
pub fn column_mean_abs(profiles: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    let (rows, cols) = profiles.dim();
    let means = profiles
        .mapv(f64::abs)
        .mean_axis(Axis(0))
        .ok_or(PerturbationError::EmptyProfiles { rows, cols })?;
    Ok(means.insert_axis(Axis(0)))
}

/// Requires `profiles` to have exactly the shape a transformation was
/// inferred for.
pub fn ensure_shape(
    context: &'static str,
    expected: (usize, usize),
    profiles: ArrayView2<'_, f64>,
) -> Result<()> {
    let got = profiles.dim();
    if got != expected {
        return Err(PerturbationError::ShapeMismatch {
            context,
            expected,
            got,
        });
    }
    Ok(())
}

/// Requires a row of per-column constants to match the columns of
/// `profiles`. Any number of rows is accepted.
pub fn ensure_columns(
    context: &'static str,
    constants: (usize, usize),
    profiles: ArrayView2<'_, f64>,
) -> Result<()> {
    let expected = (1, profiles.ncols());
    if constants != expected {
        return Err(PerturbationError::ShapeMismatch {
            context,
            expected,
            got: constants,
        });
    }
    Ok(())
}
