//! Status text generation
//!
//! Turns a gallery item into the text of a post. The title is the only
//! part whose length varies, so it gets a budget: 105 characters, minus
//! room for an inline image link when no media is attached, or minus the
//! platform's per-media reservation when it is. Titles over budget are cut
//! to `budget - 1` characters plus an ellipsis.
//!
//! With 7-character IDs the composed text never exceeds 140 characters.

use crate::types::GalleryItem;

/// Characters available to the title before any reservation
pub const TITLE_BUDGET: usize = 105;

/// Room kept for `" " + image link` when the image is not attached
pub const INLINE_LINK_RESERVATION: usize = 31;

/// Hard limit of the reference posting service
pub const STATUS_LIMIT: usize = 140;

pub const ELLIPSIS: char = '…';

/// Formats statuses for one platform configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFormatter {
    chars_reserved_per_media: usize,
}

impl StatusFormatter {
    pub fn new(chars_reserved_per_media: usize) -> Self {
        Self {
            chars_reserved_per_media,
        }
    }

    /// Title budget for the given attachment state
    pub fn title_budget(&self, media_attached: bool) -> usize {
        let reserved = if media_attached {
            self.chars_reserved_per_media
        } else {
            INLINE_LINK_RESERVATION
        };
        TITLE_BUDGET.saturating_sub(reserved)
    }

    pub fn format(&self, item: &GalleryItem, media_attached: bool) -> String {
        let mut status = truncate_title(&item.title, self.title_budget(media_attached));

        if !media_attached {
            if let Some(link) = item.image_link() {
                status.push(' ');
                status.push_str(&link);
            }
        }

        status.push_str(&format!(" ({})", item.gallery_url()));
        status
    }
}

/// Cut `title` to `budget - 1` characters plus an ellipsis when it is
/// longer than `budget`. Counts characters, not bytes.
pub fn truncate_title(title: &str, budget: usize) -> String {
    if title.chars().count() <= budget {
        return title.to_string();
    }

    let mut cut: String = title.chars().take(budget.saturating_sub(1)).collect();
    cut.push(ELLIPSIS);
    cut
}
