//! Genre aggregation and summary.
//!
//! Reduces a per-window activation tensor to its `K` strongest classes:
//! column means across windows, then the `K` highest means. Results are in
//! ascending activation order, weakest first; a caller that wants the
//! strongest genre first iterates in reverse.
//!
//! Ties between equal means are broken by taxonomy index: the lower index
//! ranks higher, so it is the last of the tied classes to be dropped.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use sonority_core::model::{ActivationRecord, ActivationTensor};
use sonority_core::taxonomy::{GenreTaxonomy, SharedTaxonomy};
use sonority_core::{Error, Result};

use crate::store::EmbeddingStore;

/// Classes kept in a summary.
pub const DEFAULT_TOP_K: usize = 5;

/// Top-K genres of one track, weakest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreSummary {
    pub class_names: Vec<String>,
    pub activations: Vec<f32>,
    pub title: String,
    pub artist: String,
}

/// Mean activation of each class across all windows.
///
/// # Errors
///
/// Returns [`Error::DataUnavailable`] for an empty or ragged tensor.
pub fn mean_activations(tensor: &ActivationTensor) -> Result<Vec<f64>> {
    let width = tensor.num_classes()?;
    let rows = tensor.rows();
    let mut sums = vec![0.0_f64; width];
    for row in &rows {
        for (sum, value) in sums.iter_mut().zip(row.iter()) {
            *sum += f64::from(*value);
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let count = rows.len() as f64;
    Ok(sums.into_iter().map(|s| s / count).collect())
}

/// Indices of the `k` largest values of `means`, in ascending order of
/// value. Equal values rank the lower index higher.
#[must_use]
pub fn top_k_indices(means: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..means.len()).collect();
    order.sort_by(|&a, &b| means[a].total_cmp(&means[b]).then(b.cmp(&a)));
    let start = order.len().saturating_sub(k);
    order.split_off(start)
}

/// Summarize `record` against `taxonomy`.
///
/// # Errors
///
/// Returns [`Error::DataUnavailable`] if the record has no activations,
/// the tensor is malformed, or its width differs from the taxonomy length.
pub fn aggregate(
    record: &ActivationRecord,
    taxonomy: &GenreTaxonomy,
    k: usize,
) -> Result<GenreSummary> {
    let tensor = record.predictions.as_ref().ok_or_else(|| {
        Error::DataUnavailable(format!("no genre activations stored for {}", record.path))
    })?;
    let means = mean_activations(tensor)?;
    if means.len() != taxonomy.len() {
        return Err(Error::DataUnavailable(format!(
            "activation tensor has {} classes but the taxonomy has {}",
            means.len(),
            taxonomy.len()
        )));
    }

    let indices = top_k_indices(&means, k);
    let class_names = indices
        .iter()
        .map(|&i| taxonomy.name(i).map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::DataUnavailable("taxonomy index out of range".into()))?;
    #[allow(clippy::cast_possible_truncation)]
    let activations = indices.iter().map(|&i| means[i] as f32).collect();

    Ok(GenreSummary {
        class_names,
        activations,
        title: record.title.clone(),
        artist: record.artist.clone(),
    })
}

const WIDTH: f32 = 600.0;
const HEIGHT: f32 = 200.0;
const LABEL_WIDTH: f32 = 130.0;
const TOP: f32 = 34.0;
const BOTTOM: f32 = 12.0;
const RIGHT: f32 = 20.0;
const BACKGROUND: &str = "#111827";
const BAR_FILL: &str = "#60a5fa";
const FOREGROUND: &str = "#cbd5e1";

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Horizontal bar chart of a summary as SVG.
///
/// Bars are laid out bottom to top in summary order, so the strongest
/// genre is drawn on top.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn render_svg(summary: &GenreSummary) -> String {
    let rows = summary.class_names.len().max(1) as f32;
    let row_height = (HEIGHT - TOP - BOTTOM) / rows;
    let bar_height = row_height * 0.7;
    let scale_max = summary
        .activations
        .iter()
        .copied()
        .fold(0.0_f32, f32::max)
        .max(f32::EPSILON);
    let plot_width = WIDTH - LABEL_WIDTH - RIGHT;

    let mut lines = vec![
        format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
        ),
        format!(r#"<rect width="100%" height="100%" fill="{BACKGROUND}"/>"#),
        format!(
            r#"<text x="{}" y="20" fill="{FOREGROUND}" font-family="sans-serif" font-size="13" text-anchor="middle">Genres for {} by {}</text>"#,
            WIDTH / 2.0,
            escape_xml(&summary.title),
            escape_xml(&summary.artist)
        ),
    ];

    let slots = summary.class_names.len();
    for (i, (name, value)) in summary
        .class_names
        .iter()
        .zip(&summary.activations)
        .enumerate()
    {
        let slot_from_top = (slots - 1 - i) as f32;
        let y = TOP + slot_from_top * row_height + (row_height - bar_height) / 2.0;
        let width = (value.max(0.0) / scale_max) * plot_width;
        lines.push(format!(
            r#"<text x="{}" y="{}" fill="{FOREGROUND}" font-family="sans-serif" font-size="11" text-anchor="end">{}</text>"#,
            LABEL_WIDTH - 6.0,
            y + bar_height * 0.75,
            escape_xml(name)
        ));
        lines.push(format!(
            r#"<rect x="{LABEL_WIDTH}" y="{y}" width="{width}" height="{bar_height}" fill="{BAR_FILL}" stroke="{FOREGROUND}"/>"#
        ));
    }
    lines.push("</svg>\n".to_string());
    lines.join("\n")
}

/// Base64 (standard alphabet, padded) for `text/plain` image payloads.
#[must_use]
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Genre summaries for tracks in the activation collection.
#[derive(Debug, Clone)]
pub struct GenreSummarizer {
    store: EmbeddingStore,
    taxonomy: Arc<SharedTaxonomy>,
    top_k: usize,
}

impl GenreSummarizer {
    #[must_use]
    pub fn new(store: EmbeddingStore, taxonomy: Arc<SharedTaxonomy>) -> Self {
        Self {
            store,
            taxonomy,
            top_k: DEFAULT_TOP_K,
        }
    }

    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Top-K genres for the track stored at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the track has no activation record,
    /// [`Error::DataUnavailable`] if its activations are missing or do not
    /// fit the taxonomy, [`Error::Unavailable`] if the index is down.
    pub async fn summarize_path(&self, path: &str) -> Result<GenreSummary> {
        let record = self
            .store
            .genre_activations()
            .await?
            .query_by_path(path)
            .await?;
        let taxonomy = self.taxonomy.snapshot();
        aggregate(&record, &taxonomy, self.top_k)
    }

    /// Bar chart of [`Self::summarize_path`], base64-encoded SVG.
    ///
    /// # Errors
    ///
    /// Same as [`Self::summarize_path`].
    pub async fn plot_path(&self, path: &str) -> Result<String> {
        let summary = self.summarize_path(path).await?;
        Ok(encode_base64(render_svg(&summary).as_bytes()))
    }
}
