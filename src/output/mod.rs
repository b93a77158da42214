use anyhow::Result;
use console::style;
use serde::Serialize;

use crate::acquire::{AcquisitionResult, MediaSource};
use crate::cli::OutputFormat;
use crate::extractors::FormatInfo;
use crate::link::VideoRef;
use crate::metadata::{MetadataOutcome, TrackCard};
use crate::resolver::PlayOutcome;
use crate::utils::format_file_size;
use crate::StageFailure;

/// Render any result as pretty JSON
pub fn format_as_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn emit<T: Serialize + ?Sized>(value: &T, format: OutputFormat, text: impl FnOnce() -> String) -> Result<()> {
    let content = match format {
        OutputFormat::Text => text(),
        OutputFormat::Json => format_as_json(value)?,
    };
    println!("{}", content);
    Ok(())
}

pub fn print_video_ref(video: &VideoRef, format: OutputFormat) -> Result<()> {
    emit(video, format, || format_video_ref(video))
}

pub fn print_metadata(outcome: &MetadataOutcome, format: OutputFormat) -> Result<()> {
    emit(outcome, format, || format_metadata(outcome))
}

pub fn print_track(card: &TrackCard, format: OutputFormat) -> Result<()> {
    emit(card, format, || format_track(card))
}

pub fn print_formats(formats: &[FormatInfo], format: OutputFormat) -> Result<()> {
    emit(formats, format, || format_formats(formats))
}

pub fn print_acquisition(result: &AcquisitionResult, format: OutputFormat) -> Result<()> {
    emit(result, format, || format_acquisition(result))
}

pub fn print_play(outcome: &PlayOutcome, format: OutputFormat) -> Result<()> {
    emit(outcome, format, || {
        format!(
            "{}\n\n{}",
            format_metadata(&outcome.metadata),
            format_acquisition(&outcome.acquisition)
        )
    })
}

pub fn format_video_ref(video: &VideoRef) -> String {
    let mut lines = vec![format!("{} {}", style("Input:").bold(), video.raw_input)];

    match (&video.canonical_id, &video.canonical_url) {
        (Some(id), Some(url)) => {
            lines.push(format!("{} {}", style("Video ID:").bold(), id));
            lines.push(format!("{} {}", style("Link:").bold(), url));
        }
        _ if video.is_link() => {
            lines.push(format!("{} no video id found in link", style("Note:").yellow()));
        }
        _ => {
            lines.push(format!("{} {}", style("Search:").bold(), video.extractor_target()));
        }
    }

    lines.join("\n")
}

pub fn format_metadata(outcome: &MetadataOutcome) -> String {
    let metadata = &outcome.metadata;
    let mut lines = vec![
        format!("{} {}", style("Title:").bold(), style(&metadata.title).cyan()),
        format!(
            "{} {} ({}s)",
            style("Duration:").bold(),
            metadata.duration_display,
            metadata.duration_seconds
        ),
        format!("{} {}", style("Video ID:").bold(), or_dash(&metadata.video_id)),
        format!("{} {}", style("Thumbnail:").bold(), or_dash(&metadata.thumbnail_url)),
        format!("{} {}", style("Source:").bold(), outcome.stage),
    ];
    lines.extend(format_failures(&outcome.failures));
    lines.join("\n")
}

pub fn format_track(card: &TrackCard) -> String {
    [
        format!("{} {}", style("Title:").bold(), style(&card.title).cyan()),
        format!("{} {}", style("Link:").bold(), card.link),
        format!("{} {}", style("Video ID:").bold(), or_dash(&card.video_id)),
        format!("{} {}", style("Duration:").bold(), card.duration_display),
        format!("{} {}", style("Thumbnail:").bold(), or_dash(&card.thumbnail_url)),
    ]
    .join("\n")
}

pub fn format_formats(formats: &[FormatInfo]) -> String {
    if formats.is_empty() {
        return "No downloadable formats found".to_string();
    }

    formats
        .iter()
        .map(|f| {
            let size = f.filesize.map(format_file_size).unwrap_or_else(|| "?".to_string());
            format!(
                "{:>6}  {:<5} {:<12} {:>10}  {}",
                f.format_id,
                f.ext,
                f.format_note.as_deref().unwrap_or("-"),
                size,
                f.format
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_acquisition(result: &AcquisitionResult) -> String {
    let mut lines = match &result.source {
        MediaSource::RemoteStream(url) => vec![
            format!("{} remote stream", style("✓").green()),
            format!("{} {}", style("URL:").bold(), url),
        ],
        MediaSource::LocalFile(path) => vec![
            format!("{} local file", style("✓").green()),
            format!("{} {}", style("Path:").bold(), path.display()),
        ],
        MediaSource::None => vec![format!("{} no playable source", style("✗").red())],
    };
    lines.extend(format_failures(&result.failures));
    lines.join("\n")
}

fn format_failures(failures: &[StageFailure]) -> Vec<String> {
    failures
        .iter()
        .map(|failure| format!("  {} {}", style("•").dim(), style(failure).dim()))
        .collect()
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
