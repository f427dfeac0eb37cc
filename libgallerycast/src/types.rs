//! Core types for Gallerycast

use serde::{Deserialize, Deserializer, Serialize};

/// Host serving cover images for albums
pub const IMAGE_HOST: &str = "http://i.imgur.com";

/// Public gallery page prefix
pub const GALLERY_URL: &str = "http://imgur.com/gallery";

/// One entry of the gallery feed: a single image, or an album with a cover
///
/// Field names on the wire follow the Imgur v3 gallery models. The same
/// JSON shape is used as the queued task payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(rename = "cover", default, skip_serializing_if = "Option::is_none")]
    pub cover_id: Option<String>,

    #[serde(rename = "link", default, skip_serializing_if = "Option::is_none")]
    pub direct_link: Option<String>,

    /// Image size in bytes. Zero means the feed did not say.
    #[serde(rename = "size", default, deserialize_with = "null_as_default")]
    pub size_bytes: u64,

    #[serde(rename = "nsfw", default, deserialize_with = "null_as_default")]
    pub is_sensitive: bool,
}

impl GalleryItem {
    /// Cover image when the item has one, otherwise the direct link
    pub fn image_link(&self) -> Option<String> {
        if let Some(cover) = self.cover_id.as_deref().filter(|c| !c.is_empty()) {
            return Some(format!("{}/{}.jpg", IMAGE_HOST, cover));
        }

        self.direct_link.clone().filter(|l| !l.is_empty())
    }

    /// Public gallery page for this item
    pub fn gallery_url(&self) -> String {
        format!("{}/{}", GALLERY_URL, self.id)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A queued unit of work. The name is the gallery item ID, which makes
/// adding the same item twice a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub name: String,
    pub payload: Vec<u8>,
    /// `"true"` or `"false"`, copied from the item's sensitivity
    pub tag: String,
}

impl QueuedTask {
    /// Serialize an item into a task named after its ID
    pub fn from_item(item: &GalleryItem) -> serde_json::Result<Self> {
        Ok(Self {
            name: item.id.clone(),
            payload: serde_json::to_vec(item)?,
            tag: item.is_sensitive.to_string(),
        })
    }

    pub fn decode(&self) -> serde_json::Result<GalleryItem> {
        serde_json::from_slice(&self.payload)
    }

    pub fn is_sensitive(&self) -> bool {
        self.tag == "true"
    }
}

/// Remaining posting quota and the platform's media reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub remaining_calls: u32,
    pub chars_reserved_per_media: usize,
    /// Unix seconds of the last successful refresh
    pub refreshed_at: Option<i64>,
    /// Unix seconds until which processing stays paused after a failed post
    pub cooldown_until: Option<i64>,
}

impl QuotaState {
    /// Used until the first refresh succeeds
    pub const DEFAULT_REMAINING_CALLS: u32 = 180;
    pub const DEFAULT_CHARS_RESERVED_PER_MEDIA: usize = 23;

    pub fn is_cooling_down(&self, now: i64) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}

impl Default for QuotaState {
    fn default() -> Self {
        Self {
            remaining_calls: Self::DEFAULT_REMAINING_CALLS,
            chars_reserved_per_media: Self::DEFAULT_CHARS_RESERVED_PER_MEDIA,
            refreshed_at: None,
            cooldown_until: None,
        }
    }
}
