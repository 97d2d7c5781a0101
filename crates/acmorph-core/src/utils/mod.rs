use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::AcmorphResult;

/// Useful enumerations for various analysis setups
pub mod enums;

/// Serialize `value` to `path` with `bincode`.
///
/// The value is written to a sibling temporary file which is renamed into place, so an artifact
/// which exists on disk is always complete.
pub fn write_artifact<T: Serialize>(path: &Path, value: &T) -> AcmorphResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("bin.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        bincode::serde::encode_into_std_write(value, &mut writer, bincode::config::standard())?;
        writer.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Deserialize a value written by [`write_artifact`].
pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> AcmorphResult<T> {
    let mut reader = BufReader::new(File::open(path)?);
    Ok(bincode::serde::decode_from_std_read(
        &mut reader,
        bincode::config::standard(),
    )?)
}

/// A helper method to get evenly spaced bin edges across a range
///
/// # See Also
/// [`get_bin_index`]
pub fn get_bin_edges(bins: usize, range: (f64, f64)) -> Vec<f64> {
    let bin_width = (range.1 - range.0) / (bins as f64);
    (0..=bins)
        .map(|i| range.0 + (i as f64 * bin_width))
        .collect()
}

/// A helper method to obtain the index of a bin where a value should go in a histogram with evenly
/// spaced `bins` over a given `range`
///
/// # See Also
/// [`get_bin_edges`]
pub fn get_bin_index(value: f64, bins: usize, limits: (f64, f64)) -> Option<usize> {
    if bins == 0 {
        return None;
    }
    if value >= limits.0 && value < limits.1 {
        let bin_width = (limits.1 - limits.0) / bins as f64;
        let bin_index = ((value - limits.0) / bin_width).floor() as usize;
        Some(bin_index.min(bins - 1))
    } else {
        None
    }
}

/// Format a fraction the way sample names spell it: `0.5`, `0.33`, `0.25`, `0.2`.
pub(crate) fn fraction_label(n: usize) -> String {
    match n {
        2 => "0.5".to_string(),
        3 => "0.33".to_string(),
        4 => "0.25".to_string(),
        n => format!("{}", (100.0 / n as f64).floor() / 100.0),
    }
}
