//! HTTP tile source backed by curl's easy interface.

use std::time::Duration;

use super::{expand_template, TileSource};
use crate::retry::FetchError;
use crate::tile::TileCoord;

/// Fetches tiles with a single GET per tile.
#[derive(Debug, Clone)]
pub struct CurlTileSource {
    template: String,
    user_agent: String,
    timeout: Duration,
}

impl CurlTileSource {
    pub fn new(template: impl Into<String>, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            template: template.into(),
            user_agent: user_agent.into(),
            timeout,
        }
    }

    pub fn url_for(&self, coord: TileCoord) -> String {
        expand_template(&self.template, coord)
    }
}

impl TileSource for CurlTileSource {
    fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(coord);
        let mut body = Vec::new();

        let mut easy = curl::easy::Easy::new();
        easy.url(&url)?;
        easy.follow_location(true)?;
        easy.max_redirections(5)?;
        easy.useragent(&self.user_agent)?;
        easy.connect_timeout(self.timeout.min(Duration::from_secs(10)))?;
        easy.timeout(self.timeout)?;

        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(FetchError::Http(code));
        }
        if body.is_empty() {
            return Err(FetchError::EmptyBody);
        }
        tracing::trace!(url = %url, bytes = body.len(), "tile fetched");
        Ok(body)
    }
}
