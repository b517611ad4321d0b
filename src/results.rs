//! Posterior samples produced by a sampler run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::math::percentile;
use crate::system::{ParamIndex, System};

/// Which sampler produced a [`Results`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    Ofti,
    Mcmc,
}

/// Median and central 68% interval of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSummary {
    pub label: String,
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Accepted samples, one row per sample and one column per free parameter.
///
/// Rows are kept in insertion order. For MCMC that is chronological, one
/// block of `num_walkers` rows per retained step.
#[derive(Debug, Clone)]
pub struct Results {
    sampler: SamplerKind,
    labels: Arc<ParamIndex>,
    fixed: Vec<(String, f64)>,
    post: Vec<f64>,
    lnlike: Vec<f64>,
    weights: Option<Vec<f64>>,
}

impl Results {
    pub fn new(
        sampler: SamplerKind,
        labels: Arc<ParamIndex>,
        fixed: Vec<(String, f64)>,
        weighted: bool,
    ) -> Self {
        Results {
            sampler,
            labels,
            fixed,
            post: Vec::new(),
            lnlike: Vec::new(),
            weights: weighted.then(Vec::new),
        }
    }

    /// Empty results sharing the free label map of `system`.
    pub fn for_system(system: &System, sampler: SamplerKind, weighted: bool) -> Self {
        let fixed = system
            .fixed_values()
            .into_iter()
            .map(|(idx, value)| (system.labels()[idx].clone(), value))
            .collect();
        Self::new(sampler, system.free_param_idx().clone(), fixed, weighted)
    }

    /// Add one sample. Weights are stored only for weighted results, where a
    /// missing weight counts as 1.
    pub fn append(&mut self, row: &[f64], lnlike: f64, weight: Option<f64>) {
        assert!(row.len() == self.dim());
        self.post.extend_from_slice(row);
        self.lnlike.push(lnlike);
        if let Some(weights) = self.weights.as_mut() {
            weights.push(weight.unwrap_or(1.));
        }
    }

    pub fn sampler(&self) -> SamplerKind {
        self.sampler
    }

    pub fn labels(&self) -> &Arc<ParamIndex> {
        &self.labels
    }

    /// Number of columns.
    pub fn dim(&self) -> usize {
        self.labels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.lnlike.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lnlike.is_empty()
    }

    /// The sample matrix, row-major.
    pub fn post(&self) -> &[f64] {
        &self.post
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        let dim = self.dim();
        &self.post[idx * dim..(idx + 1) * dim]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.post.chunks_exact(self.dim().max(1))
    }

    pub fn lnlike(&self) -> &[f64] {
        &self.lnlike
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    /// Every sampled value of column `k`.
    pub fn column(&self, k: usize) -> Vec<f64> {
        assert!(k < self.dim());
        self.rows().map(|row| row[k]).collect()
    }

    pub fn column_by_label(&self, label: &str) -> Option<Vec<f64>> {
        self.labels.get(label).map(|k| self.column(k))
    }

    /// Like [`Results::column_by_label`], but fixed parameters yield their
    /// value repeated once per sample.
    pub fn full_column(&self, label: &str) -> Option<Vec<f64>> {
        if let Some(column) = self.column_by_label(label) {
            return Some(column);
        }
        self.fixed
            .iter()
            .find(|(name, _)| name == label)
            .map(|&(_, value)| vec![value; self.num_samples()])
    }

    /// New results holding only the rows in `range`.
    pub fn slice_rows(&self, range: Range<usize>) -> Results {
        assert!(range.end <= self.num_samples());
        let dim = self.dim();
        Results {
            sampler: self.sampler,
            labels: self.labels.clone(),
            fixed: self.fixed.clone(),
            post: self.post[range.start * dim..range.end * dim].to_vec(),
            lnlike: self.lnlike[range.clone()].to_vec(),
            weights: self.weights.as_ref().map(|w| w[range].to_vec()),
        }
    }

    /// Median and 16th/84th percentiles of every column.
    pub fn summary(&self) -> Vec<ParamSummary> {
        self.labels
            .labels()
            .iter()
            .enumerate()
            .map(|(k, label)| {
                let mut values = self.column(k);
                values.sort_by(f64::total_cmp);
                ParamSummary {
                    label: label.clone(),
                    median: percentile(&values, 50.),
                    lower: percentile(&values, 16.),
                    upper: percentile(&values, 84.),
                }
            })
            .collect()
    }

    /// Write the samples as CSV: one column per free parameter, then
    /// `lnlike` and, for weighted results, `weight`.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P, precision: usize) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file: {:?}", path))?;
        let mut writer = BufWriter::new(file);

        let mut headers: Vec<&str> = self.labels.labels().iter().map(String::as_str).collect();
        headers.push("lnlike");
        if self.weights.is_some() {
            headers.push("weight");
        }
        writeln!(writer, "{}", headers.join(","))?;

        for (i, row) in self.rows().enumerate() {
            let mut values: Vec<String> = row
                .iter()
                .map(|v| format!("{:.prec$}", v, prec = precision))
                .collect();
            values.push(format!("{:.prec$}", self.lnlike[i], prec = precision));
            if let Some(weights) = &self.weights {
                values.push(format!("{:.prec$}", weights[i], prec = precision));
            }
            writeln!(writer, "{}", values.join(","))?;
        }
        writer.flush().context("Failed to flush CSV file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn results(weighted: bool) -> Results {
        let labels = ParamIndex::new(vec!["sma1".into(), "ecc1".into()]).unwrap();
        let mut res = Results::new(
            SamplerKind::Ofti,
            Arc::new(labels),
            vec![("plx".into(), 50.)],
            weighted,
        );
        res.append(&[10., 0.1], -3., None);
        res.append(&[12., 0.2], -2., Some(0.5));
        res.append(&[11., 0.3], -1., None);
        res
    }

    #[test]
    fn columns_follow_labels() {
        let res = results(false);
        assert_eq!(res.num_samples(), 3);
        assert_eq!(res.column(0), vec![10., 12., 11.]);
        assert_eq!(res.column_by_label("ecc1"), Some(vec![0.1, 0.2, 0.3]));
        assert_eq!(res.column_by_label("inc1"), None);
        assert_eq!(res.full_column("plx"), Some(vec![50.; 3]));
        assert_eq!(res.row(1), &[12., 0.2]);
        assert_eq!(res.weights(), None);
    }

    #[test]
    fn weights_default_to_one() {
        let res = results(true);
        assert_eq!(res.weights(), Some(&[1., 0.5, 1.][..]));
    }

    #[test]
    fn slicing_keeps_order() {
        let res = results(true).slice_rows(1..3);
        assert_eq!(res.num_samples(), 2);
        assert_eq!(res.post(), &[12., 0.2, 11., 0.3]);
        assert_eq!(res.lnlike(), &[-2., -1.]);
        assert_eq!(res.weights(), Some(&[0.5, 1.][..]));
    }

    #[test]
    fn summary_reports_median() {
        let summary = results(false).summary();
        assert_eq!(summary[0].label, "sma1");
        assert_eq!(summary[0].median, 11.);
        assert!(summary[1].lower < summary[1].median);
        assert!(summary[1].upper > summary[1].median);
    }

    #[test]
    fn csv_has_header_and_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posterior.csv");
        results(true).write_csv(&path, 3)?;
        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "sma1,ecc1,lnlike,weight");
        assert_eq!(lines[2], "12.000,0.200,-2.000,0.500");
        assert_eq!(lines.len(), 4);
        Ok(())
    }
}
