// src/data.rs
use std::fmt;

use serde::{Deserialize, Deserializer};

/// Genre arrives as a single string or as a list of them.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Genre {
    One(String),
    Many(Vec<String>),
}

impl Genre {
    pub fn to_label(&self) -> String {
        match self {
            Genre::One(genre) => genre.clone(),
            Genre::Many(list) => list.join(", "),
        }
    }
}

/// One entry of a category listing. A movie has no season or episode; an
/// episode of a series carries both.
#[derive(Debug, Clone, Deserialize)]
pub struct Media {
    pub title_id: String,
    pub title: String,
    pub rating: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub poster_url: String,
    pub air_year: Option<u32>,
    pub genre: Option<Genre>,
    pub plot: Option<String>,
}

impl PartialEq for Media {
    // Same title and episode coordinates; presentation fields don't count.
    fn eq(&self, other: &Self) -> bool {
        self.title_id == other.title_id
            && self.season == other.season
            && self.episode == other.episode
    }
}

impl Eq for Media {}

impl fmt::Display for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => {
                write!(f, "{} {}x{:02}", self.title, season, episode)
            }
            _ => f.write_str(&self.title),
        }
    }
}

/// Full record for one title, with per-season episode listings for series.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Title {
    pub title_id: String,
    pub title: String,
    pub rating: Option<String>,
    pub air_year: Option<u32>,
    pub genre: Option<Genre>,
    pub plot: Option<String>,
    pub poster_url: Option<String>,
    /// Empty for movies.
    #[serde(default)]
    pub seasons: Vec<Season>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Season {
    pub season: u32,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Episode {
    pub season: u32,
    pub episode: u32,
    pub title: Option<String>,
    pub plot: Option<String>,
    /// URL of the episode still, when the server has one.
    pub still: Option<String>,
}

/// State of a media's video file on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum VideoStatus {
    Downloaded,
    Downloading,
    Missing,
    Error,
}

impl TryFrom<u8> for VideoStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, String> {
        match code {
            0 => Ok(VideoStatus::Downloaded),
            1 => Ok(VideoStatus::Downloading),
            2 => Ok(VideoStatus::Missing),
            3 => Ok(VideoStatus::Error),
            other => Err(format!("unknown media status {other}")),
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VideoStatus::Downloaded => "downloaded",
            VideoStatus::Downloading => "downloading",
            VideoStatus::Missing => "missing",
            VideoStatus::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MediaStatus {
    pub status: VideoStatus,
    pub message: String,
    /// Download progress, clamped to 0..=100 like the server intends.
    #[serde(deserialize_with = "clamped_progress")]
    pub progress: u8,
}

fn clamped_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(raw.clamp(0, 100) as u8)
}

#[cfg(test)]
mod tests {
    use super::{Genre, Media, MediaStatus, Title, VideoStatus};
    use serde_json::json;

    #[test]
    fn media_displays_episode_coordinates() {
        let movie: Media = serde_json::from_value(json!({
            "title_id": "tt0133093",
            "title": "The Matrix",
            "rating": "8.7",
            "poster_url": "http://server/pictures/tt0133093.jpg"
        }))
        .unwrap();
        assert_eq!(movie.to_string(), "The Matrix");

        let episode: Media = serde_json::from_value(json!({
            "title_id": "tt0903747",
            "title": "Breaking Bad",
            "season": 1,
            "episode": 2,
            "poster_url": "http://server/pictures/tt0903747.jpg"
        }))
        .unwrap();
        assert_eq!(episode.to_string(), "Breaking Bad 1x02");
    }

    #[test]
    fn media_identity_ignores_presentation_fields() {
        let a: Media = serde_json::from_value(json!({
            "title_id": "tt0903747",
            "title": "Breaking Bad",
            "season": 1,
            "episode": 2,
            "rating": "9.5",
            "poster_url": "http://server/a.jpg"
        }))
        .unwrap();
        let mut b = a.clone();
        b.rating = None;
        b.poster_url = "http://server/b.jpg".into();
        assert_eq!(a, b);
        b.episode = Some(3);
        assert_ne!(a, b);
    }

    #[test]
    fn genre_accepts_string_or_list() {
        let one: Genre = serde_json::from_str("\"Drama\"").unwrap();
        assert_eq!(one.to_label(), "Drama");
        let many: Genre = serde_json::from_str(r#"["Crime", "Drama"]"#).unwrap();
        assert_eq!(many.to_label(), "Crime, Drama");
    }

    #[test]
    fn title_parses_season_listings() {
        let title: Title = serde_json::from_value(json!({
            "title_id": "tt0903747",
            "title": "Breaking Bad",
            "seasons": [
                {"season": 1, "episodes": [
                    {"season": 1, "episode": 1, "title": "Pilot",
                     "still": "http://server/stills/s1e1.jpg"},
                    {"season": 1, "episode": 2, "title": "Cat's in the Bag..."}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(title.seasons.len(), 1);
        assert_eq!(title.seasons[0].episodes.len(), 2);
        assert_eq!(
            title.seasons[0].episodes[0].still.as_deref(),
            Some("http://server/stills/s1e1.jpg")
        );
        assert!(title.seasons[0].episodes[1].still.is_none());
    }

    #[test]
    fn status_codes_map_to_variants() {
        let status: MediaStatus = serde_json::from_value(json!({
            "status": 1, "message": "downloading torrent", "progress": 150
        }))
        .unwrap();
        assert_eq!(status.status, VideoStatus::Downloading);
        assert_eq!(status.progress, 100);

        let unknown = serde_json::from_value::<MediaStatus>(json!({
            "status": 9, "message": "", "progress": 0
        }));
        assert!(unknown.is_err());
    }
}
