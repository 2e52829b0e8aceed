//! ZIP export of cached artifacts.
//!
//! Each exported video gets its own folder in the archive holding the
//! transcript, the comment set, one markdown file per cached analysis and a
//! combined `AI_Analysis.txt`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::cache::{CacheError, CacheStore};
use crate::models::{AnalysisMode, AnalysisRecord, CommentSet, TranscriptRecord, UNTITLED};
use crate::video_id::VideoId;

/// Name of the combined analysis file inside each video folder.
pub const COMBINED_ANALYSIS_FILE: &str = "AI_Analysis.txt";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to encode comments: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("nothing cached to export")]
    Empty,
}

/// What went into an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub videos: usize,
    pub transcripts: usize,
    pub comment_sets: usize,
    pub analyses: usize,
}

#[derive(Default)]
struct VideoBundle {
    transcript: Option<TranscriptRecord>,
    comments: Option<CommentSet>,
    analyses: Vec<AnalysisRecord>,
}

/// Make a model id usable inside a file name.
pub fn model_file_component(model_id: &str) -> String {
    model_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Archive path for one analysis. Model ids that sanitize to the same
/// component get a short hash of the raw id appended.
fn analysis_entry_name(
    id: &VideoId,
    record: &AnalysisRecord,
    used: &mut HashSet<String>,
) -> String {
    let component = model_file_component(&record.model_id);
    let mut name = format!("{}/{}_{}_{}.md", id, id, record.mode, component);
    if !used.insert(name.clone()) {
        let digest = hex::encode(Sha256::digest(record.model_id.as_bytes()));
        name = format!("{}/{}_{}_{}_{}.md", id, id, record.mode, component, &digest[..8]);
        used.insert(name.clone());
    }
    name
}

/// Comments analyses come first, then transcript analyses.
fn mode_rank(mode: AnalysisMode) -> u8 {
    match mode {
        AnalysisMode::Comments => 0,
        AnalysisMode::Transcript => 1,
    }
}

/// Render the combined analysis document for one video.
pub fn combined_analysis_text(records: &[AnalysisRecord]) -> String {
    let mut sorted: Vec<&AnalysisRecord> = records
        .iter()
        .filter(|r| !r.result_text.trim().is_empty())
        .collect();
    sorted.sort_by(|a, b| {
        mode_rank(a.mode)
            .cmp(&mode_rank(b.mode))
            .then_with(|| a.model_id.cmp(&b.model_id))
    });

    let mut out = String::new();
    for record in sorted {
        let title = record.title.as_deref().unwrap_or(UNTITLED);
        out.push_str(&format!(
            "===== AI ANALYSIS: {} for '{}' =====\n\n{}\n\n",
            record.mode.as_str().to_uppercase(),
            title,
            record.result_text.trim_end()
        ));
    }
    out
}

/// Write cached artifacts to a ZIP archive at `output`.
///
/// With `only` set, videos outside the list are skipped. The archive is
/// written next to `output` first and moved into place when complete.
pub fn export_zip(
    cache: &CacheStore,
    output: &Path,
    only: Option<&[VideoId]>,
) -> Result<ExportSummary, ExportError> {
    let wanted: Option<BTreeSet<&VideoId>> = only.map(|ids| ids.iter().collect());
    let keep = |id: &VideoId| wanted.as_ref().map_or(true, |w| w.contains(id));

    let mut bundles: BTreeMap<VideoId, VideoBundle> = BTreeMap::new();
    for record in cache.transcripts()? {
        if keep(&record.video_id) {
            let id = record.video_id.clone();
            bundles.entry(id).or_default().transcript = Some(record);
        }
    }
    for set in cache.comment_sets()? {
        if keep(&set.video_id) {
            let id = set.video_id.clone();
            bundles.entry(id).or_default().comments = Some(set);
        }
    }
    for record in cache.analyses()? {
        if keep(&record.video_id) && !record.result_text.trim().is_empty() {
            bundles
                .entry(record.video_id.clone())
                .or_default()
                .analyses
                .push(record);
        }
    }

    if bundles.is_empty() {
        return Err(ExportError::Empty);
    }

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|source| ExportError::Io {
        path: parent.clone(),
        source,
    })?;
    let tmp = NamedTempFile::new_in(&parent).map_err(|source| ExportError::Io {
        path: parent.clone(),
        source,
    })?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(tmp.reopen().map_err(|source| ExportError::Io {
        path: tmp.path().to_path_buf(),
        source,
    })?);

    let mut summary = ExportSummary {
        path: output.to_path_buf(),
        videos: bundles.len(),
        ..Default::default()
    };

    for (id, bundle) in &bundles {
        debug!("Exporting {}", id);
        if let Some(transcript) = &bundle.transcript {
            zip.start_file(format!("{}/transcript_{}.txt", id, id), options)?;
            write_entry(&mut zip, transcript.text.as_bytes(), output)?;
            summary.transcripts += 1;
        }
        if let Some(set) = &bundle.comments {
            zip.start_file(format!("{}/comments_{}.json", id, id), options)?;
            let json = serde_json::to_vec_pretty(&set.comments)?;
            write_entry(&mut zip, &json, output)?;
            summary.comment_sets += 1;
        }
        let mut used_names = HashSet::new();
        for record in &bundle.analyses {
            zip.start_file(analysis_entry_name(id, record, &mut used_names), options)?;
            write_entry(&mut zip, record.result_text.as_bytes(), output)?;
            summary.analyses += 1;
        }
        if !bundle.analyses.is_empty() {
            zip.start_file(format!("{}/{}", id, COMBINED_ANALYSIS_FILE), options)?;
            let combined = combined_analysis_text(&bundle.analyses);
            write_entry(&mut zip, combined.as_bytes(), output)?;
        }
    }

    zip.finish()?;
    tmp.persist(output).map_err(|e| ExportError::Io {
        path: output.to_path_buf(),
        source: e.error,
    })?;

    info!(
        "Exported {} videos ({} transcripts, {} comment sets, {} analyses) to {}",
        summary.videos,
        summary.transcripts,
        summary.comment_sets,
        summary.analyses,
        output.display()
    );
    Ok(summary)
}

fn write_entry<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    bytes: &[u8],
    output: &Path,
) -> Result<(), ExportError> {
    zip.write_all(bytes).map_err(|source| ExportError::Io {
        path: output.to_path_buf(),
        source,
    })
}
