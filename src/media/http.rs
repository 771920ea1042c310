//! Blocking HTTP fetch of media bodies.

use std::io::Read;

use log::{debug, info};

use super::{MediaDownloadReader, MediaError, MediaProvider};
use crate::config::WireConfig;

/// Body reader returned by [`download`].
pub type HttpBody = Box<dyn Read + Send + Sync + 'static>;

/// Resolve the download URL: the direct path on the media host, else the descriptor URL.
pub fn media_url<P: MediaProvider + ?Sized>(provider: &P, config: &WireConfig) -> Result<String, MediaError> {
    if let Some(direct_path) = provider.media_direct_path() {
        let separator = if direct_path.starts_with('/') { "" } else { "/" };
        return Ok(format!("https://{}{}{}", config.media_host, separator, direct_path));
    }
    provider
        .media_url()
        .map(str::to_string)
        .ok_or_else(|| MediaError::InvalidArgument("descriptor has neither a direct path nor a URL".to_string()))
}

/// Open a verified download stream for the descriptor's media.
pub fn download<P: MediaProvider + ?Sized>(
    provider: &P,
    config: &WireConfig,
) -> Result<MediaDownloadReader<HttpBody>, MediaError> {
    let url = media_url(provider, config)?;
    info!("downloading {} media", provider.media_kind());
    debug!("GET {}", url);

    let agent = ureq::AgentBuilder::new().user_agent(&config.user_agent).build();
    let response = agent.get(&url).call().map_err(|err| match err {
        ureq::Error::Status(code, _) => MediaError::Http(format!("unexpected status {}", code)),
        ureq::Error::Transport(transport) => MediaError::Http(transport.to_string()),
    })?;
    if response.status() != 200 {
        return Err(MediaError::Http(format!("unexpected status {}", response.status())));
    }
    let length: u64 = response
        .header("Content-Length")
        .ok_or_else(|| MediaError::Http("response has no Content-Length".to_string()))?
        .trim()
        .parse()
        .map_err(|_| MediaError::Http("invalid Content-Length".to_string()))?;

    MediaDownloadReader::with_buffer_size(response.into_reader(), length, provider, config.media_buffer_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaDescriptor, MediaKind};

    #[test]
    fn test_direct_path_wins() {
        let config = WireConfig::default();
        let descriptor = MediaDescriptor {
            url: Some("https://example.invalid/file.enc".to_string()),
            ..MediaDescriptor::new(MediaKind::Image).with_direct_path("/v/t62.7118-24/abc?ccb=11-4")
        };
        assert_eq!(
            media_url(&descriptor, &config).unwrap(),
            "https://mmg.whatsapp.net/v/t62.7118-24/abc?ccb=11-4"
        );
    }

    #[test]
    fn test_url_fallback() {
        let config = WireConfig::default().with_media_host("media.example.test");
        let descriptor = MediaDescriptor {
            url: Some("https://example.invalid/file.enc".to_string()),
            ..MediaDescriptor::new(MediaKind::Image)
        };
        assert_eq!(media_url(&descriptor, &config).unwrap(), "https://example.invalid/file.enc");

        let relative = MediaDescriptor::new(MediaKind::Image).with_direct_path("mms/image/abc");
        assert_eq!(
            media_url(&relative, &config).unwrap(),
            "https://media.example.test/mms/image/abc"
        );
        assert!(media_url(&MediaDescriptor::new(MediaKind::Image), &config).is_err());
    }
}
