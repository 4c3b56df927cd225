use std::io::{self, Write};

use crate::engine::timing::format_duration;
use crate::engine::ChipDevice;
use crate::error::{ErrorSeverity, PlayerError};
use crate::library::TrackHit;
use crate::models::{Game, PlaybackPhase, PlaybackSnapshot};
use crate::session::SessionEvent;
use crate::spectrum::layout;

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Display the full player status: track, transport and settings
    pub fn display_full_status(snapshot: &PlaybackSnapshot) {
        println!("┌─ Player Status ─────────────────────────────────────────┐");

        match snapshot.current_track() {
            Some(_) => {
                Self::display_track_info(snapshot);
                Self::display_playback_info(snapshot);
            }
            None => {
                println!("│ No track loaded");
                println!("│ Status: {}", snapshot.phase.as_str());
            }
        }

        Self::display_settings(snapshot);
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// One line: phase, title and time
    pub fn compact_status(snapshot: &PlaybackSnapshot) -> String {
        if snapshot.current_track().is_none() {
            return format!("{} | No track loaded", snapshot.phase.as_str());
        }
        format!(
            "{} | {} | {}/{} ({}%)",
            snapshot.phase.as_str(),
            Self::truncate(&snapshot.title(), 40),
            format_duration(snapshot.position_seconds()),
            format_duration(snapshot.duration_seconds()),
            (snapshot.progress() * 100.0) as u8
        )
    }

    fn display_track_info(snapshot: &PlaybackSnapshot) {
        println!("│ Track: {}", Self::truncate(&snapshot.title(), 50));
        match &snapshot.tags {
            Some(tags) => {
                println!("│ Game: {}", Self::truncate(&tags.display_game(), 51));
                println!("│ System: {}", Self::truncate(&tags.display_system(), 49));
                println!("│ Author: {}", Self::truncate(&tags.display_author(), 49));
                if !tags.date.is_empty() {
                    println!("│ Date: {}", tags.date);
                }
            }
            None => {
                if let Some(game) = &snapshot.game {
                    println!("│ Game: {}", Self::truncate(&game.display_name(), 51));
                }
            }
        }
        if let (Some(game), Some(index)) = (&snapshot.game, snapshot.track_index) {
            println!("│ Number: {}/{}", index + 1, game.len());
        }
    }

    fn display_playback_info(snapshot: &PlaybackSnapshot) {
        println!("│");
        println!("│ Status: {}", Self::format_phase(snapshot.phase));
        println!(
            "│ Position: {} / {}",
            format_duration(snapshot.position_seconds()),
            format_duration(snapshot.duration_seconds())
        );
        println!("│ [{}]", Self::create_progress_bar(snapshot.progress(), 40));
    }

    fn display_settings(snapshot: &PlaybackSnapshot) {
        println!("│");
        println!("│ Volume: {}%", (snapshot.volume * 100.0).round() as u8);
        println!(
            "│ Mode: {} | Repeat: {}",
            snapshot.sequence_mode, snapshot.repeat
        );
        println!(
            "│ Bass: {} | Reverb: {}",
            Self::on_off(snapshot.effects.bass),
            Self::on_off(snapshot.effects.reverb)
        );
        println!("│ Rate: {} Hz", snapshot.sample_rate);
    }

    /// Carriage-return progress line for the live view
    pub fn display_position_update(snapshot: &PlaybackSnapshot, spectrum: &[f32]) {
        if snapshot.current_track().is_none() {
            return;
        }
        print!(
            "\r{} {} [{}] {}/{}   ",
            Self::format_phase(snapshot.phase),
            Self::spectrum_line(spectrum),
            Self::create_progress_bar(snapshot.progress(), 30),
            format_duration(snapshot.position_seconds()),
            format_duration(snapshot.duration_seconds()),
        );
        let _ = io::stdout().flush();
    }

    /// Spectrum as block characters, one per bin
    pub fn spectrum_line(bins: &[f32]) -> String {
        const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
        let max = (LEVELS.len() - 1) as f32;
        layout::mirrored_bars(bins, 2.0 * max)
            .iter()
            .skip(bins.len())
            .map(|bar| LEVELS[bar.half_height.round().clamp(0.0, max) as usize])
            .collect()
    }

    pub fn display_games(games: &[std::sync::Arc<Game>], current: Option<i64>) {
        if games.is_empty() {
            println!("Library is empty");
            return;
        }
        for (number, game) in games.iter().enumerate() {
            let marker = if Some(game.id) == current { '>' } else { ' ' };
            println!(
                "{} {:>3}. {} [{}] ({} tracks)",
                marker,
                number + 1,
                Self::truncate(&game.display_name(), 40),
                game.system,
                game.len()
            );
        }
    }

    pub fn display_tracks(game: &Game, current: Option<usize>, sample_rate: u32) {
        println!("{}", game.display_name());
        for (index, track) in game.tracks.iter().enumerate() {
            let marker = if Some(index) == current { '>' } else { ' ' };
            let duration = if track.has_duration() {
                format_duration(track.duration_seconds(sample_rate))
            } else {
                "--:--".to_string()
            };
            println!(
                "{} {:>3}. {}{} {}",
                marker,
                index + 1,
                Self::truncate(&track.display_name(), 45),
                if track.favorite { " ★" } else { "" },
                duration
            );
        }
    }

    pub fn display_search_results(hits: &[TrackHit]) {
        if hits.is_empty() {
            println!("No matching tracks");
            return;
        }
        for hit in hits {
            if let Some(track) = hit.track() {
                println!(
                    "  {} / {:>3}. {}",
                    Self::truncate(&hit.game.display_name(), 30),
                    hit.index + 1,
                    track.display_name()
                );
            }
        }
    }

    pub fn display_chips(devices: &[ChipDevice]) {
        if devices.is_empty() {
            println!("No sound chips reported");
            return;
        }
        for device in devices {
            println!("  {:>2}: {} (volume {})", device.id, device.name, device.volume);
        }
    }

    pub fn display_outputs(devices: &[String], current: Option<&str>) {
        if devices.is_empty() {
            println!("No audio output devices found");
            return;
        }
        for name in devices {
            let marker = if Some(name.as_str()) == current { "▶" } else { " " };
            println!("{} {}", marker, name);
        }
    }

    /// Session notifications as a single line
    pub fn display_event(event: &SessionEvent) {
        if event.is_error() {
            eprintln!("\n⚠ {}", event.describe());
        } else {
            println!("\n{}", event.describe());
        }
    }

    /// Display error message with formatting and recovery suggestions
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!("┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon, severity.as_str());

        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    eprintln!("│   {}", line);
                }
            }
        }

        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    /// Display a simple error message for non-interactive contexts
    pub fn display_simple_error(error: &PlayerError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());
        if let Some(suggestion) = error.recovery_suggestions().first() {
            eprintln!("Suggestion: {}", suggestion);
        }
    }

    /// Wrap text to fit within specified width
    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.chars().count() + word.chars().count() < width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current_line));
                current_line = word.to_string();
            }
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }
        lines
    }

    /// Truncate to `max_len` characters, ending in "..."
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    pub fn create_progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    pub fn format_phase(phase: PlaybackPhase) -> String {
        match phase {
            PlaybackPhase::Playing => "▶ Playing".to_string(),
            PlaybackPhase::Paused => "⏸ Paused".to_string(),
            PlaybackPhase::Loading => "… Loading".to_string(),
            PlaybackPhase::Ended => "⏹ Ended".to_string(),
            PlaybackPhase::Idle => "⏹ Idle".to_string(),
        }
    }

    fn on_off(value: bool) -> &'static str {
        if value {
            "on"
        } else {
            "off"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Tags;
    use crate::models::{EffectToggles, Track};
    use std::sync::Arc;

    fn create_test_snapshot() -> PlaybackSnapshot {
        let game = Game::new(1, "Sonic the Hedgehog")
            .with_system("Mega Drive")
            .with_tracks(vec![
                Track::new(1, "/rips/sonic/01.vgm", "Title", 1),
                Track::new(2, "/rips/sonic/02.vgm", "Green Hill", 2),
            ]);
        let mut snapshot = PlaybackSnapshot::idle(44_100, 0.8, EffectToggles::default());
        snapshot.phase = PlaybackPhase::Playing;
        snapshot.game = Some(Arc::new(game));
        snapshot.track_index = Some(1);
        snapshot.total_samples = 44_100 * 100;
        snapshot.position = 44_100 * 50;
        snapshot
    }

    #[test]
    fn test_compact_status() {
        let snapshot = create_test_snapshot();
        assert_eq!(
            StatusDisplay::compact_status(&snapshot),
            "Playing | Green Hill | 0:50/1:40 (50%)"
        );

        let idle = PlaybackSnapshot::idle(44_100, 0.8, EffectToggles::default());
        assert_eq!(StatusDisplay::compact_status(&idle), "Idle | No track loaded");
    }

    #[test]
    fn test_compact_status_prefers_tags() {
        let mut snapshot = create_test_snapshot();
        snapshot.tags = Some(Tags {
            track_en: "Green Hill Zone".to_string(),
            ..Default::default()
        });
        assert!(StatusDisplay::compact_status(&snapshot).contains("Green Hill Zone"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(StatusDisplay::truncate("Short", 10), "Short");
        assert_eq!(StatusDisplay::truncate("This is a very long title", 10), "This is...");
        assert_eq!(StatusDisplay::truncate("ドラゴンクエストの序曲", 6), "ドラゴ...");
        assert_eq!(StatusDisplay::truncate("Test", 3), "Test");
    }

    #[test]
    fn test_create_progress_bar() {
        assert_eq!(StatusDisplay::create_progress_bar(0.0, 4), "░░░░");
        assert_eq!(StatusDisplay::create_progress_bar(0.5, 4), "██░░");
        assert_eq!(StatusDisplay::create_progress_bar(1.7, 4), "████");
    }

    #[test]
    fn test_format_phase() {
        assert_eq!(StatusDisplay::format_phase(PlaybackPhase::Playing), "▶ Playing");
        assert_eq!(StatusDisplay::format_phase(PlaybackPhase::Paused), "⏸ Paused");
        assert_eq!(StatusDisplay::format_phase(PlaybackPhase::Idle), "⏹ Idle");
    }

    #[test]
    fn test_spectrum_line() {
        assert_eq!(StatusDisplay::spectrum_line(&[0.0, 40.0, 100.0]), "▁██");
        assert_eq!(StatusDisplay::spectrum_line(&[20.0]).chars().count(), 1);
        assert!(StatusDisplay::spectrum_line(&[]).is_empty());
    }

    #[test]
    fn test_wrap_text() {
        let lines = StatusDisplay::wrap_text("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);
    }

    #[test]
    fn test_display_functions_dont_panic() {
        let snapshot = create_test_snapshot();
        StatusDisplay::display_full_status(&snapshot);
        StatusDisplay::display_position_update(&snapshot, &[1.0, 2.0]);
        StatusDisplay::display_full_status(&PlaybackSnapshot::idle(44_100, 0.5, EffectToggles::default()));

        let game = snapshot.game.clone().unwrap();
        StatusDisplay::display_games(&[Arc::clone(&game)], Some(1));
        StatusDisplay::display_tracks(&game, Some(0), 44_100);
        StatusDisplay::display_chips(&[ChipDevice {
            id: 0,
            name: "YM2612".to_string(),
            volume: 100,
        }]);
        StatusDisplay::display_event(&SessionEvent::EndOfQueue { game_id: 1 });
    }
}
