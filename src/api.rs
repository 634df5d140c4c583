// src/api.rs
use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::core::cache::FetchError;
use crate::data::{Media, MediaStatus, Title};

const HTTP_TIMEOUT_SECS: u64 = 15;

/// Everything a backend call can fail with. Cloneable because requests hand
/// copies of their captured outcome to whoever asks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The server answered the envelope with a nonzero code.
    #[error("server error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("bad server response: {0}")]
    Decode(String),
    #[error("no profile selected")]
    NoProfile,
    #[error(transparent)]
    Picture(#[from] FetchError),
}

// Every reply wraps its payload in this envelope.
#[derive(Deserialize)]
struct Envelope {
    code: i64,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ProfilesReply {
    profiles: Vec<String>,
}

#[derive(Deserialize)]
struct CategoriesReply {
    categories: Vec<String>,
}

#[derive(Deserialize)]
struct TopReply {
    top: Vec<Media>,
}

#[derive(Deserialize)]
struct TitleReply {
    title: Title,
}

#[derive(Deserialize)]
struct StatusReply {
    status: MediaStatus,
}

/// Blocking client for the tvfamily API.
pub struct Server {
    base: String,
    client: Client,
}

impl Server {
    pub fn new(address: &str) -> Result<Self, ServiceError> {
        let base = address.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| ServiceError::Transport(format!("http client: {e}")))?;
        Ok(Self { base, client })
    }

    pub fn get_profiles(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.get_json::<ProfilesReply>("getprofiles", &[])?.profiles)
    }

    /// URL a profile's picture is served from; fetching it goes through the
    /// picture cache, not this client.
    pub fn profile_picture_url(&self, name: &str) -> String {
        self.api_url("getprofilepicture", &[("name", name)])
    }

    pub fn create_profile(&self, name: &str, picture: Option<Vec<u8>>) -> Result<(), ServiceError> {
        match picture {
            Some(bytes) => self.post_picture("createprofile", name, bytes),
            None => self.get_ok("createprofile", &[("name", name)]),
        }
    }

    pub fn set_profile_picture(&self, name: &str, picture: Vec<u8>) -> Result<(), ServiceError> {
        self.post_picture("setprofilepicture", name, picture)
    }

    pub fn delete_profile(&self, name: &str) -> Result<(), ServiceError> {
        self.get_ok("deleteprofile", &[("name", name)])
    }

    pub fn get_categories(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .get_json::<CategoriesReply>("getcategories", &[])?
            .categories)
    }

    pub fn get_top(&self, profile: &str, category: &str) -> Result<Vec<Media>, ServiceError> {
        Ok(self
            .get_json::<TopReply>("gettop", &[("profile", profile), ("category", category)])?
            .top)
    }

    pub fn get_title(&self, title_id: &str) -> Result<Title, ServiceError> {
        Ok(self
            .get_json::<TitleReply>("gettitle", &[("id", title_id)])?
            .title)
    }

    /// Season and episode travel together or not at all; a movie's status is
    /// asked with the bare title id.
    pub fn get_media_status(
        &self,
        title_id: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<MediaStatus, ServiceError> {
        let season_value;
        let episode_value;
        let mut query: Vec<(&str, &str)> = vec![("id", title_id)];
        if let (Some(season), Some(episode)) = (season, episode) {
            season_value = season.to_string();
            episode_value = episode.to_string();
            query.push(("season", &season_value));
            query.push(("episode", &episode_value));
        }
        Ok(self
            .get_json::<StatusReply>("getmediastatus", &query)?
            .status)
    }

    fn api_url(&self, function: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!("{}/api/{}", self.base, function);
        for (i, (key, value)) in query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    fn get_json<P: DeserializeOwned>(
        &self,
        function: &str,
        query: &[(&str, &str)],
    ) -> Result<P, ServiceError> {
        let url = self.api_url(function, query);
        debug!("GET {url}");
        let body = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| ServiceError::Transport(format!("GET {function}: {e}")))?;
        decode_reply(&body)
    }

    fn get_ok(&self, function: &str, query: &[(&str, &str)]) -> Result<(), ServiceError> {
        self.get_json::<Envelope>(function, query).map(|_| ())
    }

    // Profile pictures are uploaded the way the server expects them: one
    // multipart part named "file", sent as profile.png.
    fn post_picture(&self, function: &str, name: &str, bytes: Vec<u8>) -> Result<(), ServiceError> {
        let url = self.api_url(function, &[("name", name)]);
        debug!("POST {url} ({} bytes)", bytes.len());
        let part = multipart::Part::bytes(bytes)
            .file_name("profile.png")
            .mime_str("image/png")
            .map_err(|e| ServiceError::Transport(format!("multipart: {e}")))?;
        let form = multipart::Form::new().part("file", part);
        let body = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| ServiceError::Transport(format!("POST {function}: {e}")))?;
        decode_reply::<Envelope>(&body).map(|_| ())
    }
}

// Check the envelope first, then decode the payload out of the same body.
fn decode_reply<P: DeserializeOwned>(body: &str) -> Result<P, ServiceError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| ServiceError::Decode(format!("envelope: {e}")))?;
    if envelope.code != 0 {
        return Err(ServiceError::Api {
            code: envelope.code,
            message: envelope
                .error
                .unwrap_or_else(|| "unknown server error".into()),
        });
    }
    serde_json::from_str(body).map_err(|e| ServiceError::Decode(format!("payload: {e}")))
}
