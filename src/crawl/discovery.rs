use std::collections::BTreeSet;

use tracing::{info, instrument};

use super::extract::extract_volume_links;
use super::layout::CompiledLayout;
use crate::article::VolumeLink;
use crate::fetch::{FetchError, PageFetcher};

/// Unique volume links on an already-fetched archive page.
#[must_use]
pub fn discover_links(html: &str, page_url: &str, layout: &CompiledLayout) -> BTreeSet<VolumeLink> {
    extract_volume_links(html, page_url, layout)
}

/// Fetches the archive page at `listing_url` in a fresh session and returns
/// its volume links.
///
/// The page counts as rendered once a volume-link anchor is present; a page
/// without any fails with [`FetchError::NotReady`].
///
/// # Errors
///
/// Returns [`FetchError`] when the session cannot be opened or the page does
/// not load within the layout's bounded wait.
#[instrument(skip(fetcher, layout))]
pub async fn discover_volumes(
    fetcher: &dyn PageFetcher,
    listing_url: &str,
    layout: &CompiledLayout,
) -> Result<BTreeSet<VolumeLink>, FetchError> {
    let mut session = fetcher.open_session().await?;
    let html = session.fetch(listing_url, layout.volume_ready()).await?;
    drop(session);

    let links = discover_links(&html, listing_url, layout);
    info!(count = links.len(), "volume links discovered");
    Ok(links)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fetch::{FetchSession, ReadyCondition};
    use async_trait::async_trait;

    struct ArchivePage(&'static str);

    struct ArchiveSession(&'static str);

    #[async_trait]
    impl PageFetcher for ArchivePage {
        async fn open_session(&self) -> Result<Box<dyn FetchSession>, FetchError> {
            Ok(Box::new(ArchiveSession(self.0)))
        }
    }

    #[async_trait]
    impl FetchSession for ArchiveSession {
        async fn fetch(&mut self, url: &str, ready: &ReadyCondition) -> Result<String, FetchError> {
            if ready.is_satisfied_by(self.0) {
                Ok(self.0.to_string())
            } else {
                Err(FetchError::not_ready(url, ready.selector()))
            }
        }
    }

    #[tokio::test]
    async fn test_discover_volumes_collects_unique_links() {
        let fetcher = ArchivePage(
            r#"<div class="issue-details-past-tabs">
                 <a href="/xpl/tocresult.jsp?isnumber=2">2024</a>
                 <a href="/xpl/tocresult.jsp?isnumber=1">2023</a>
                 <a href="/xpl/tocresult.jsp?isnumber=2">2024 again</a>
               </div>"#,
        );
        let layout = CompiledLayout::default_layout().unwrap();

        let links = discover_volumes(&fetcher, "https://site.example/archive", &layout)
            .await
            .unwrap();

        let urls: Vec<&str> = links.iter().map(VolumeLink::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://site.example/xpl/tocresult.jsp?isnumber=1",
                "https://site.example/xpl/tocresult.jsp?isnumber=2",
            ]
        );
    }

    #[tokio::test]
    async fn test_discover_volumes_fails_without_volume_links() {
        let fetcher = ArchivePage("<p>maintenance</p>");
        let layout = CompiledLayout::default_layout().unwrap();

        let err = discover_volumes(&fetcher, "https://site.example/archive", &layout)
            .await
            .unwrap_err();

        assert!(err.is_not_rendered());
    }
}
