//! Timecode display formatting
//!
//! Provides consistent `HH:MM:SS:FF` formatting for frame-based and
//! seconds-based durations across the engine and its UI collaborators.

/// Frame rate used for the frame digit when formatting plain seconds.
const SECONDS_DISPLAY_FPS: f64 = 30.0;

/// Format a frame count as `HH:MM:SS:FF` at the given sample rate.
///
/// `FF` is the frame-within-second at `fps`. A non-positive rate formats as
/// zero timecode rather than dividing by it.
///
/// # Examples
///
/// ```
/// use cuedeck_common::timecode::format_frames;
///
/// assert_eq!(format_frames(0, 30.0), "00:00:00:00");
/// assert_eq!(format_frames(29, 30.0), "00:00:00:29");
/// assert_eq!(format_frames(30, 30.0), "00:00:01:00");
/// assert_eq!(format_frames(3661 * 30, 30.0), "01:01:01:00");
/// ```
pub fn format_frames(frames: u64, fps: f64) -> String {
    if fps <= 0.0 {
        return "00:00:00:00".to_string();
    }
    let total_seconds = frames as f64 / fps;
    let hours = (total_seconds / 3600.0) as u64;
    let minutes = ((total_seconds % 3600.0) / 60.0) as u64;
    let seconds = (total_seconds % 60.0) as u64;
    let frame = (frames as f64 % fps) as u64;
    format!("{:02}:{:02}:{:02}:{:02}", hours, minutes, seconds, frame)
}

/// Format a duration in seconds as `HH:MM:SS:FF`.
///
/// The frame digit is derived from the fractional second at a 30 fps display
/// rate. Negative or zero durations format as zero timecode.
///
/// # Examples
///
/// ```
/// use cuedeck_common::timecode::format_seconds;
///
/// assert_eq!(format_seconds(0.0), "00:00:00:00");
/// assert_eq!(format_seconds(90.5), "00:01:30:15");
/// assert_eq!(format_seconds(3600.0), "01:00:00:00");
/// ```
pub fn format_seconds(seconds: f64) -> String {
    if seconds <= 0.0 {
        return "00:00:00:00".to_string();
    }
    let hours = (seconds / 3600.0) as u64;
    let minutes = ((seconds % 3600.0) / 60.0) as u64;
    let secs = (seconds % 60.0) as u64;
    let frame = ((seconds % 1.0) * SECONDS_DISPLAY_FPS) as u64;
    format!("{:02}:{:02}:{:02}:{:02}", hours, minutes, secs, frame)
}
