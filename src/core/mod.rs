// src/core/mod.rs
pub mod cache;
pub mod mainloop;
pub mod requests;

use std::path::PathBuf;
use std::sync::RwLock;

use tracing::info;

use crate::api::{Server, ServiceError};
use crate::data::{Episode, Media, MediaStatus, Title};

use self::cache::{FetchError, PictureCache};

/// What the UI talks to: the API client, the picture cache and the selected
/// profile, behind one object that worker threads can share.
pub struct Core {
    server: Server,
    pictures: PictureCache,
    profile: RwLock<Option<String>>,
}

impl Core {
    pub fn new(address: &str, cache_dir: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        info!("using server at {address}");
        Ok(Self {
            server: Server::new(address)?,
            pictures: PictureCache::new(cache_dir)?,
            profile: RwLock::new(None),
        })
    }

    // ---- profiles ----

    pub fn get_profiles(&self) -> Result<Vec<String>, ServiceError> {
        self.server.get_profiles()
    }

    /// Local path of a profile's picture, downloaded on first use. The
    /// server's API error comes through when the profile has none; callers
    /// fall back to their default artwork.
    pub fn get_profile_picture(&self, name: &str) -> Result<PathBuf, ServiceError> {
        Ok(self.pictures.fetch(&self.server.profile_picture_url(name))?)
    }

    pub fn create_profile(&self, name: &str, picture: Option<Vec<u8>>) -> Result<(), ServiceError> {
        self.server.create_profile(name, picture)
    }

    /// Replace the selected profile's picture.
    pub fn set_profile_picture(&self, picture: Vec<u8>) -> Result<(), ServiceError> {
        let profile = self.get_profile().ok_or(ServiceError::NoProfile)?;
        self.server.set_profile_picture(&profile, picture)
    }

    /// Delete the selected profile on the server. The selection itself is
    /// the caller's to clear, together with its views.
    pub fn delete_profile(&self) -> Result<(), ServiceError> {
        let profile = self.get_profile().ok_or(ServiceError::NoProfile)?;
        self.server.delete_profile(&profile)
    }

    pub fn set_profile(&self, name: Option<&str>) {
        *self.profile.write().unwrap() = name.map(str::to_string);
    }

    pub fn get_profile(&self) -> Option<String> {
        self.profile.read().unwrap().clone()
    }

    // ---- browsing ----

    pub fn get_categories(&self) -> Result<Vec<String>, ServiceError> {
        self.server.get_categories()
    }

    /// Top medias of a category for the selected profile.
    pub fn get_medias(&self, category: &str) -> Result<Vec<Media>, ServiceError> {
        let profile = self.get_profile().ok_or(ServiceError::NoProfile)?;
        self.server.get_top(&profile, category)
    }

    /// Local path of a media's poster, downloaded on first use. Blocks, so
    /// it belongs inside a request.
    pub fn get_poster(&self, media: &Media) -> Result<PathBuf, ServiceError> {
        Ok(self.pictures.fetch(&media.poster_url)?)
    }

    pub fn get_title(&self, title_id: &str) -> Result<Title, ServiceError> {
        self.server.get_title(title_id)
    }

    pub fn get_still(&self, episode: &Episode) -> Result<PathBuf, ServiceError> {
        let url = episode.still.as_deref().ok_or(FetchError::NoPicture)?;
        Ok(self.pictures.fetch(url)?)
    }

    pub fn get_media_status(
        &self,
        title_id: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<MediaStatus, ServiceError> {
        self.server.get_media_status(title_id, season, episode)
    }
}

#[cfg(test)]
mod tests {
    use super::cache::FetchError;
    use super::Core;
    use crate::api::ServiceError;
    use crate::data::{Episode, Media};
    use httpmock::prelude::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn profile_scoped_calls_need_a_profile() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/gettop")
                .query_param("profile", "alice")
                .query_param("category", "Movies");
            then.status(200).json_body(json!({"code": 0, "top": []}));
        });
        let dir = tempfile::tempdir().unwrap();
        let core = Core::new(&server.base_url(), dir.path()).unwrap();

        assert!(matches!(
            core.get_medias("Movies"),
            Err(ServiceError::NoProfile)
        ));
        core.set_profile(Some("alice"));
        assert_eq!(core.get_profile().as_deref(), Some("alice"));
        assert_eq!(core.get_medias("Movies").unwrap(), vec![]);
        core.set_profile(None);
        assert!(matches!(
            core.get_medias("Movies"),
            Err(ServiceError::NoProfile)
        ));
    }

    #[test]
    fn posters_come_from_the_cache() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/pictures/tt0133093.jpg");
            then.status(200).body("jpeg-bytes");
        });
        let dir = tempfile::tempdir().unwrap();
        let core = Core::new(&server.base_url(), dir.path()).unwrap();
        let media: Media = serde_json::from_value(json!({
            "title_id": "tt0133093",
            "title": "The Matrix",
            "poster_url": server.url("/pictures/tt0133093.jpg")
        }))
        .unwrap();

        let path = core.get_poster(&media).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"jpeg-bytes");
        // Second ask never leaves the disk.
        assert_eq!(core.get_poster(&media).unwrap(), path);
        mock.assert();
    }

    #[test]
    fn profile_pictures_resolve_through_the_api_url() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/getprofilepicture")
                .query_param("name", "alice");
            then.status(200).body("profile-png");
        });
        let dir = tempfile::tempdir().unwrap();
        let core = Core::new(&server.base_url(), dir.path()).unwrap();

        let path = core.get_profile_picture("alice").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"profile-png");
    }

    #[test]
    fn still_fetch_needs_a_still_url() {
        let server = MockServer::start();
        let dir = tempfile::tempdir().unwrap();
        let core = Core::new(&server.base_url(), dir.path()).unwrap();
        let episode: Episode =
            serde_json::from_value(json!({"season": 1, "episode": 1})).unwrap();
        assert_eq!(
            core.get_still(&episode).unwrap_err(),
            ServiceError::Picture(FetchError::NoPicture)
        );
    }

    #[test]
    fn picture_operations_need_a_profile_too() {
        let server = MockServer::start();
        let dir = tempfile::tempdir().unwrap();
        let core = Core::new(&server.base_url(), dir.path()).unwrap();
        assert!(matches!(
            core.set_profile_picture(b"png".to_vec()),
            Err(ServiceError::NoProfile)
        ));
        assert!(matches!(core.delete_profile(), Err(ServiceError::NoProfile)));
    }
}
