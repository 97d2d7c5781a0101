use accurate::{sum::Klein, traits::*};
use auto_ops::{impl_op_ex, impl_op_ex_commutative};
use serde::{Deserialize, Serialize};

use crate::{
    utils::{get_bin_edges, get_bin_index},
    AcmorphError, AcmorphResult,
};

/// What to do with values outside of an axis range.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowPolicy {
    /// Discard under- and overflow entries.
    Drop,
    /// Add under- and overflow entries to the first and last bins.
    #[default]
    Fold,
}

/// A uniformly binned axis over a named event variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// The name of the event variable filled along this axis
    pub name: String,
    /// The number of bins
    pub bins: usize,
    /// The lower and upper edges
    pub range: (f64, f64),
}

impl Axis {
    /// Create a new axis.
    pub fn new(name: &str, bins: usize, range: (f64, f64)) -> Self {
        Self {
            name: name.to_string(),
            bins,
            range,
        }
    }
    /// Check that the axis can hold entries: at least one bin over a finite, non-empty range.
    pub fn validate(&self) -> AcmorphResult<()> {
        if self.bins == 0 {
            return Err(AcmorphError::InvalidBinningError {
                reason: format!("axis {} has no bins", self.name),
            });
        }
        let (low, high) = self.range;
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(AcmorphError::InvalidBinningError {
                reason: format!("axis {} has the range ({}, {})", self.name, low, high),
            });
        }
        Ok(())
    }
    /// The `bins + 1` bin edges.
    pub fn edges(&self) -> Vec<f64> {
        get_bin_edges(self.bins, self.range)
    }
    /// The bin a value falls in, following `flow` for out-of-range values. `NaN` never has a bin.
    pub fn index(&self, value: f64, flow: FlowPolicy) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        match get_bin_index(value, self.bins, self.range) {
            Some(index) => Some(index),
            None => match flow {
                FlowPolicy::Drop => None,
                FlowPolicy::Fold if value < self.range.0 => Some(0),
                FlowPolicy::Fold => self.bins.checked_sub(1),
            },
        }
    }
}

/// The binning of a template: three axes and a flow policy shared by all of them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateBinning {
    /// The three axes, outermost first
    pub axes: [Axis; 3],
    /// Treatment of under- and overflow
    pub flow: FlowPolicy,
}

impl Default for TemplateBinning {
    fn default() -> Self {
        Self {
            axes: [
                Axis::new("D_bkg", 40, (0.0, 1.0)),
                Axis::new("D_0minus_decay", 40, (0.0, 1.0)),
                Axis::new("D_CP_decay", 40, (-1.0, 1.0)),
            ],
            flow: FlowPolicy::Fold,
        }
    }
}

impl TemplateBinning {
    /// Create a binning from three axes.
    pub fn new(axes: [Axis; 3], flow: FlowPolicy) -> Self {
        Self { axes, flow }
    }
    /// Check every axis, see [`Axis::validate`].
    pub fn validate(&self) -> AcmorphResult<()> {
        self.axes.iter().try_for_each(Axis::validate)
    }
    /// The total number of bins.
    pub fn len(&self) -> usize {
        self.axes.iter().map(|a| a.bins).product()
    }
    /// Whether any axis has no bins.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// The names of the three axis variables.
    pub fn variables(&self) -> [&str; 3] {
        [
            self.axes[0].name.as_str(),
            self.axes[1].name.as_str(),
            self.axes[2].name.as_str(),
        ]
    }
    /// The flat index of a triple of values, or `None` if it is dropped.
    pub fn index(&self, values: [f64; 3]) -> Option<usize> {
        let i = self.axes[0].index(values[0], self.flow)?;
        let j = self.axes[1].index(values[1], self.flow)?;
        let k = self.axes[2].index(values[2], self.flow)?;
        Some(self.flat_index(i, j, k))
    }
    /// Flatten a bin triple.
    pub fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.axes[1].bins + j) * self.axes[2].bins + k
    }
}

/// A weighted three-dimensional histogram with per-bin sums of squared weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histogram3D {
    binning: TemplateBinning,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
}

impl Histogram3D {
    /// An empty histogram.
    pub fn new(binning: TemplateBinning) -> Self {
        let n = binning.len();
        Self {
            binning,
            contents: vec![0.0; n],
            sumw2: vec![0.0; n],
        }
    }
    /// Build a histogram from flat bin contents (sum of squared weights starts at zero).
    pub fn from_contents(binning: TemplateBinning, contents: Vec<f64>) -> AcmorphResult<Self> {
        if contents.len() != binning.len() {
            return Err(AcmorphError::BinningMismatchError {
                reason: format!(
                    "{} bin contents given for a binning with {} bins",
                    contents.len(),
                    binning.len()
                ),
            });
        }
        let sumw2 = vec![0.0; contents.len()];
        Ok(Self {
            binning,
            contents,
            sumw2,
        })
    }
    /// Add one weighted entry. Returns whether it landed in a bin.
    pub fn fill(&mut self, values: [f64; 3], weight: f64) -> bool {
        match self.binning.index(values) {
            Some(index) => {
                self.contents[index] += weight;
                self.sumw2[index] += weight * weight;
                true
            }
            None => false,
        }
    }
    /// The binning.
    pub fn binning(&self) -> &TemplateBinning {
        &self.binning
    }
    /// The flat bin contents.
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }
    /// The flat per-bin sums of squared weights.
    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }
    /// The content of bin `(i, j, k)`.
    pub fn bin(&self, i: usize, j: usize, k: usize) -> f64 {
        self.contents[self.binning.flat_index(i, j, k)]
    }
    /// The sum of all bin contents.
    pub fn integral(&self) -> f64 {
        self.contents
            .iter()
            .copied()
            .sum_with_accumulator::<Klein<f64>>()
    }
    /// Multiply every bin by `factor`.
    pub fn scale(&mut self, factor: f64) {
        self.contents.iter_mut().for_each(|c| *c *= factor);
        self.sumw2.iter_mut().for_each(|w| *w *= factor * factor);
    }
    /// A copy where every bin below `epsilon` is raised to `epsilon`, together with the number of
    /// bins which were raised.
    pub fn floored(&self, epsilon: f64) -> (Self, usize) {
        let mut result = self.clone();
        let mut raised = 0;
        for content in result.contents.iter_mut() {
            if *content < epsilon {
                *content = epsilon;
                raised += 1;
            }
        }
        (result, raised)
    }
    /// The number of bins with negative content.
    pub fn negative_bins(&self) -> usize {
        self.contents.iter().filter(|c| **c < 0.0).count()
    }
    /// The largest absolute bin-by-bin difference to another histogram.
    pub fn max_abs_difference(&self, other: &Histogram3D) -> AcmorphResult<f64> {
        self.check_binning(other)?;
        Ok(self
            .contents
            .iter()
            .zip(&other.contents)
            .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs())))
    }
    /// The largest absolute bin content.
    pub fn max_abs(&self) -> f64 {
        self.contents.iter().fold(0.0_f64, |acc, c| acc.max(c.abs()))
    }
    /// Project onto one axis, summing over the other two.
    pub fn project(&self, axis: usize) -> Vec<f64> {
        let bins = [
            self.binning.axes[0].bins,
            self.binning.axes[1].bins,
            self.binning.axes[2].bins,
        ];
        let mut result = vec![0.0; bins[axis.min(2)]];
        for i in 0..bins[0] {
            for j in 0..bins[1] {
                for k in 0..bins[2] {
                    let index = [i, j, k][axis.min(2)];
                    result[index] += self.bin(i, j, k);
                }
            }
        }
        result
    }
    /// Bin-by-bin linear combination $`\sum_i c_i h_i`$ of histograms with identical binning.
    ///
    /// Variances combine as $`\sum_i c_i^2 \sigma_i^2`$, treating the inputs as independent.
    pub fn linear_combination(terms: &[(f64, &Histogram3D)]) -> AcmorphResult<Self> {
        let (_, first) = terms.first().ok_or_else(|| AcmorphError::BinningMismatchError {
            reason: "cannot combine an empty list of histograms".to_string(),
        })?;
        let mut result = Histogram3D::new(first.binning.clone());
        for (coefficient, histogram) in terms {
            result.check_binning(histogram)?;
            if *coefficient == 0.0 {
                continue;
            }
            for (index, (content, w2)) in histogram
                .contents
                .iter()
                .zip(&histogram.sumw2)
                .enumerate()
            {
                result.contents[index] += coefficient * content;
                result.sumw2[index] += coefficient * coefficient * w2;
            }
        }
        Ok(result)
    }
    fn check_binning(&self, other: &Histogram3D) -> AcmorphResult<()> {
        if self.binning != other.binning {
            return Err(AcmorphError::BinningMismatchError {
                reason: format!(
                    "histograms over {:?} and {:?} cannot be combined",
                    self.binning.variables(),
                    other.binning.variables()
                ),
            });
        }
        Ok(())
    }
}

impl_op_ex!(+ |a: &Histogram3D, b: &Histogram3D| -> Histogram3D {
    debug_assert_eq!(a.binning, b.binning);
    Histogram3D {
        binning: a.binning.clone(),
        contents: a.contents.iter().zip(&b.contents).map(|(x, y)| x + y).collect(),
        sumw2: a.sumw2.iter().zip(&b.sumw2).map(|(x, y)| x + y).collect(),
    }
});
impl_op_ex!(-|a: &Histogram3D, b: &Histogram3D| -> Histogram3D {
    debug_assert_eq!(a.binning, b.binning);
    Histogram3D {
        binning: a.binning.clone(),
        contents: a.contents.iter().zip(&b.contents).map(|(x, y)| x - y).collect(),
        sumw2: a.sumw2.iter().zip(&b.sumw2).map(|(x, y)| x + y).collect(),
    }
});
impl_op_ex_commutative!(*|a: &Histogram3D, b: &f64| -> Histogram3D {
    let mut result = a.clone();
    result.scale(*b);
    result
});
