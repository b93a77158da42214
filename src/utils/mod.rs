use once_cell::sync::Lazy;
use regex::Regex;

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("valid ANSI escape pattern")
});

/// Format a duration in seconds as "M:SS", or "H:MM:SS" from one hour up
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Parse a display duration ("M:SS", "H:MM:SS", plain seconds) into seconds.
///
/// Search backends report live streams as the literal string "None"; that,
/// anything unparseable and anything overflowing count as zero.
pub fn parse_duration(display: &str) -> u64 {
    let display = display.trim();
    if display.is_empty() || display.eq_ignore_ascii_case("none") {
        return 0;
    }

    display
        .split(':')
        .try_fold(0u64, |total, part| {
            let value = part.trim().parse::<u64>().ok()?;
            total.checked_mul(60)?.checked_add(value)
        })
        .unwrap_or(0)
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Remove terminal colour codes from extractor output before logging it
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Last non-empty line of a process' stderr, which is where yt-dlp reports the cause
pub fn last_error_line(stderr: &[u8]) -> String {
    let text = strip_ansi(&String::from_utf8_lossy(stderr));
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no error output")
        .to_string()
}

/// Check if the current environment has required tools
pub async fn check_dependencies(yt_dlp_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp_path).await {
        missing.push(format!("{} - required for local extraction and search", yt_dlp_path));
    }

    // ffmpeg re-encodes audio and merges video+audio downloads
    if !check_command_available("ffmpeg").await {
        missing.push("ffmpeg - required for mp3 conversion and mp4 merging".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    let flag = if command.ends_with("ffmpeg") { "-version" } else { "--version" };

    Command::new(command)
        .arg(flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
