//! Parsing of the engine's raw tag string.
//!
//! The engine reports tags as eleven `|||`-separated fields:
//!
//! ```text
//! track EN ||| track JP ||| game EN ||| game JP ||| system EN ||| system JP |||
//! author EN ||| author JP ||| date ||| creator ||| notes
//! ```
//!
//! Short or malformed strings never fail: absent fields are empty.

use serde::{Deserialize, Serialize};

pub const TAG_SEPARATOR: &str = "|||";
pub const TAG_FIELD_COUNT: usize = 11;

const UNKNOWN_TRACK: &str = "Unknown Track";
const UNKNOWN_GAME: &str = "Unknown Game";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    pub track_en: String,
    pub track_jp: String,
    pub game_en: String,
    pub game_jp: String,
    pub system_en: String,
    pub system_jp: String,
    pub author_en: String,
    pub author_jp: String,
    pub date: String,
    pub creator: String,
    pub notes: String,
}

impl Tags {
    pub fn parse(raw: &str) -> Self {
        let mut fields = raw.split(TAG_SEPARATOR).map(str::trim);
        let mut next = || fields.next().unwrap_or_default().to_string();

        Self {
            track_en: next(),
            track_jp: next(),
            game_en: next(),
            game_jp: next(),
            system_en: next(),
            system_jp: next(),
            author_en: next(),
            author_jp: next(),
            date: next(),
            creator: next(),
            notes: next(),
        }
    }

    /// Inverse of `parse`, used by engines that build the raw string themselves
    pub fn to_raw(&self) -> String {
        [
            &self.track_en,
            &self.track_jp,
            &self.game_en,
            &self.game_jp,
            &self.system_en,
            &self.system_jp,
            &self.author_en,
            &self.author_jp,
            &self.date,
            &self.creator,
            &self.notes,
        ]
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(TAG_SEPARATOR)
    }

    pub fn has_track_title(&self) -> bool {
        !self.track_en.is_empty() || !self.track_jp.is_empty()
    }

    pub fn display_title(&self) -> String {
        prefer(&self.track_en, &self.track_jp, UNKNOWN_TRACK)
    }

    pub fn display_game(&self) -> String {
        prefer(&self.game_en, &self.game_jp, UNKNOWN_GAME)
    }

    pub fn display_system(&self) -> String {
        prefer(&self.system_en, &self.system_jp, "")
    }

    pub fn display_author(&self) -> String {
        prefer(&self.author_en, &self.author_jp, "")
    }
}

fn prefer(en: &str, jp: &str, fallback: &str) -> String {
    if !en.is_empty() {
        en.to_string()
    } else if !jp.is_empty() {
        jp.to_string()
    } else {
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_string() {
        let raw = "Green Hill|||緑の丘|||Sonic|||ソニック|||Mega Drive|||メガドライブ|||Masato Nakamura|||中村正人|||1991|||ripper|||loops twice|||";
        let tags = Tags::parse(raw);
        assert_eq!(tags.track_en, "Green Hill");
        assert_eq!(tags.game_jp, "ソニック");
        assert_eq!(tags.author_en, "Masato Nakamura");
        assert_eq!(tags.date, "1991");
        assert_eq!(tags.creator, "ripper");
        assert_eq!(tags.notes, "loops twice");
    }

    #[test]
    fn test_short_strings_never_fail() {
        for count in 0..TAG_FIELD_COUNT {
            let raw = (0..count)
                .map(|i| format!("  field{}  ", i))
                .collect::<Vec<_>>()
                .join(TAG_SEPARATOR);
            let tags = Tags::parse(&raw);
            let fields = [
                &tags.track_en,
                &tags.track_jp,
                &tags.game_en,
                &tags.game_jp,
                &tags.system_en,
                &tags.system_jp,
                &tags.author_en,
                &tags.author_jp,
                &tags.date,
                &tags.creator,
                &tags.notes,
            ];
            for (i, field) in fields.iter().enumerate() {
                if i < count {
                    assert_eq!(field.as_str(), format!("field{}", i));
                } else {
                    assert!(field.is_empty(), "field {} should be empty for count {}", i, count);
                }
            }
        }
    }

    #[test]
    fn test_empty_string_uses_fallbacks() {
        let tags = Tags::parse("");
        assert_eq!(tags, Tags::default());
        assert_eq!(tags.display_title(), "Unknown Track");
        assert_eq!(tags.display_game(), "Unknown Game");
        assert_eq!(tags.display_system(), "");
        assert_eq!(tags.display_author(), "");
    }

    #[test]
    fn test_japanese_fallback() {
        let tags = Tags::parse(" |||タイトル||| |||ゲーム|||||| システム");
        assert_eq!(tags.display_title(), "タイトル");
        assert_eq!(tags.display_game(), "ゲーム");
        assert_eq!(tags.display_system(), "システム");
    }

    #[test]
    fn test_raw_round_trip_of_built_tags() {
        let tags = Tags {
            track_en: "Stage 1".to_string(),
            author_en: "Koshiro".to_string(),
            notes: "a|b".to_string(),
            ..Default::default()
        };
        assert_eq!(Tags::parse(&tags.to_raw()), tags);
    }
}
