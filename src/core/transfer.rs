//! Network transfer collaborator
//!
//! The engine never speaks HTTP itself. A [`Transfer`] implementation is
//! injected into the core and called from worker threads; URLs are built
//! from the configured [`UrlScheme`] templates.

use crate::artifact::{ArtifactKind, Locator};
use crate::error::{EngineError, Result};
use crate::pool::CancelToken;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub high_priority: bool,
}

pub trait Transfer: Send + Sync {
    /// Fetch `request.url`, returning the response body
    ///
    /// Implementations should return [`EngineError::Cancelled`] when they
    /// notice `cancel` was triggered.
    fn fetch(&self, request: &TransferRequest, cancel: &CancelToken) -> Result<Vec<u8>>;
}

/// Transfer that is never connected
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTransfer;

impl Transfer for OfflineTransfer {
    fn fetch(&self, request: &TransferRequest, _cancel: &CancelToken) -> Result<Vec<u8>> {
        Err(EngineError::Transfer {
            url: request.url.clone(),
            message: "no network transfer configured".to_string(),
        })
    }
}

/// URL templates
///
/// Placeholders: `{type}` (item type, or picture type for pictures),
/// `{item}` (percent-encoded item id) and `{color}` (color id, `0` if none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlScheme {
    pub picture: String,
    pub large_picture: String,
    pub price_guide: String,
}

impl Default for UrlScheme {
    fn default() -> Self {
        UrlScheme {
            picture: "https://img.bricklink.com/ItemImage/{type}N/{color}/{item}.png".to_string(),
            large_picture: "https://img.bricklink.com/ItemImage/{type}L/{item}.png".to_string(),
            price_guide:
                "https://www.bricklink.com/priceGuideSummary.asp?a={type}&itemID={item}&colorID={color}&vatInc=Y"
                    .to_string(),
        }
    }
}

impl UrlScheme {
    pub fn url_for(&self, kind: ArtifactKind, locator: &Locator) -> String {
        let (template, type_char) = match kind {
            ArtifactKind::Picture if locator.large => (&self.large_picture, locator.picture_type),
            ArtifactKind::Picture => (&self.picture, locator.picture_type),
            ArtifactKind::PriceGuide => (&self.price_guide, locator.item_type),
        };

        template
            .replace("{type}", &type_char.to_string())
            .replace("{item}", &urlencoding::encode(&locator.item_id))
            .replace("{color}", &locator.color_id.unwrap_or(0).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator(id: &str, color: Option<u32>, large: bool) -> Locator {
        Locator {
            item_type: 'M',
            picture_type: 'M',
            item_id: id.to_string(),
            color_id: color,
            large,
        }
    }

    #[test]
    fn test_templates_expand() {
        let urls = UrlScheme {
            picture: "http://x/{type}/{color}/{item}".to_string(),
            large_picture: "http://x/{type}/large/{item}".to_string(),
            price_guide: "http://x/pg?t={type}&i={item}&c={color}".to_string(),
        };

        assert_eq!(
            urls.url_for(ArtifactKind::Picture, &locator("cty0001", Some(7), false)),
            "http://x/M/7/cty0001"
        );
        assert_eq!(
            urls.url_for(ArtifactKind::Picture, &locator("cty0001", None, true)),
            "http://x/M/large/cty0001"
        );
        assert_eq!(
            urls.url_for(ArtifactKind::PriceGuide, &locator("a b&c", None, false)),
            "http://x/pg?t=M&i=a%20b%26c&c=0"
        );
    }

    #[test]
    fn test_offline_transfer_fails() {
        let request = TransferRequest {
            url: "http://example.invalid/".to_string(),
            high_priority: false,
        };
        assert!(matches!(
            OfflineTransfer.fetch(&request, &CancelToken::new()),
            Err(EngineError::Transfer { .. })
        ));
    }
}
