//! Stage 6: downloading images and attachments referenced by posts.

use std::fs;

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::error::{FetchError, JobError, JobResult};
use crate::pipeline::runner::{StageFlow, StageRunner};
use crate::types::state::Stage;

/// Absolute URL of a reference found in post HTML.
pub fn resolve_asset_url(base_url: &str, raw: &str) -> Option<String> {
    let base = Url::parse(&format!("{}/", base_url)).ok()?;
    let mut url = base.join(&raw.replace("&amp;", "&")).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.into())
}

/// Local file name for an asset: SHA-256 of the URL plus its extension.
pub fn local_asset_name(url: &str) -> String {
    let hash = hex::encode(Sha256::digest(url.as_bytes()));
    let extension = Url::parse(url)
        .ok()
        .and_then(|u| {
            let name = u.path_segments()?.next_back()?.to_string();
            let (_, ext) = name.rsplit_once('.')?;
            Some(ext.to_ascii_lowercase())
        })
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= 5
                && ext.bytes().all(|b| b.is_ascii_alphanumeric())
                && ext != "php"
        });
    match extension {
        Some(ext) => format!("{}.{}", hash, ext),
        None => hash,
    }
}

impl StageRunner {
    pub(crate) async fn download_files(&mut self) -> JobResult<StageFlow> {
        let stage = Stage::DownloadFiles;
        if !self.state.settings.download_files {
            return Ok(StageFlow::Done);
        }

        if !self.state.downloads.collected {
            self.collect_assets(stage)?;
        }

        loop {
            let Some(url) = self.state.downloads.pending().into_iter().next() else {
                break;
            };
            self.download_one(&url).await?;
            self.status.progress(format!(
                "Downloaded {} of {} files",
                self.state.downloads.downloaded.len(),
                self.state.downloads.files.len()
            ));

            if self.maybe_chain()? {
                return Ok(StageFlow::Chained);
            }
        }

        if !self.state.downloads.rewritten {
            self.rewrite_asset_refs();
        }
        Ok(StageFlow::Done)
    }

    fn collect_assets(&mut self, stage: Stage) -> JobResult<()> {
        fs::create_dir_all(&self.paths.assets_dir).map_err(|e| {
            JobError::fatal(
                stage,
                format!(
                    "cannot create asset directory {}: {}",
                    self.paths.assets_dir.display(),
                    e
                ),
            )
        })?;

        let base_url = self.state.settings.base_url.clone();
        for thread in self.state.threads.values_mut() {
            for post in thread.posts.values_mut() {
                let Some(content) = &post.content else {
                    continue;
                };
                let urls: Vec<String> = self
                    .adapter
                    .asset_refs(content)
                    .iter()
                    .filter_map(|raw| resolve_asset_url(&base_url, raw))
                    .collect();
                for url in &urls {
                    self.state
                        .downloads
                        .files
                        .entry(url.clone())
                        .or_insert_with(|| local_asset_name(url));
                }
                post.attachments = urls;
            }
        }
        self.state.downloads.collected = true;
        info!(files = self.state.downloads.files.len(), "Collected downloadable files");
        Ok(())
    }

    async fn download_one(&mut self, url: &str) -> JobResult<()> {
        let Some(local) = self.state.downloads.files.get(url).cloned() else {
            return Ok(());
        };
        let response = match self.client.fetch(url).await {
            Ok(response) => response,
            Err(FetchError::Cancelled) => return Err(JobError::Cancelled),
            Err(e) => {
                self.status.error(format!("Could not download {}: {}", url, e));
                self.state.downloads.failed.insert(url.to_string());
                return Ok(());
            }
        };

        let path = self.paths.assets_dir.join(&local);
        match fs::write(&path, &response.body) {
            Ok(()) => {
                debug!(url, path = %path.display(), bytes = response.body.len(), "File saved");
                self.state.downloads.downloaded.insert(url.to_string());
            }
            Err(e) => {
                self.status
                    .error(format!("Could not save {} to {}: {}", url, path.display(), e));
                self.state.downloads.failed.insert(url.to_string());
            }
        }
        Ok(())
    }

    /// Point downloaded references at the local copies.
    fn rewrite_asset_refs(&mut self) {
        let base_url = self.state.settings.base_url.clone();
        let dir = self.paths.assets_dir_name();
        let downloads = &self.state.downloads;
        for thread in self.state.threads.values_mut() {
            for post in thread.posts.values_mut() {
                let Some(content) = post.content.as_mut() else {
                    continue;
                };
                for raw in self.adapter.asset_refs(content) {
                    let Some(url) = resolve_asset_url(&base_url, &raw) else {
                        continue;
                    };
                    if !downloads.downloaded.contains(&url) {
                        continue;
                    }
                    if let Some(local) = downloads.files.get(&url) {
                        *content = content.replace(&raw, &format!("{}/{}", dir, local));
                    }
                }
            }
        }
        self.state.downloads.rewritten = true;
    }

    pub(crate) fn skip_download(&mut self) -> Option<String> {
        let url = self.state.downloads.pending().into_iter().next()?;
        self.state.downloads.failed.insert(url.clone());
        Some(format!("download of {}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_asset_url() {
        let base = "https://forum.test/community";
        assert_eq!(
            resolve_asset_url(base, "./images/smilies/smile.gif").as_deref(),
            Some("https://forum.test/community/images/smilies/smile.gif")
        );
        assert_eq!(
            resolve_asset_url(base, "./download/file.php?id=12&amp;mode=view").as_deref(),
            Some("https://forum.test/community/download/file.php?id=12&mode=view")
        );
        assert_eq!(
            resolve_asset_url(base, "https://pics.example.net/a.jpg#x").as_deref(),
            Some("https://pics.example.net/a.jpg")
        );
        assert!(resolve_asset_url(base, "data:image/png;base64,AAAA").is_none());
    }

    #[test]
    fn test_local_asset_name() {
        let name = local_asset_name("https://pics.example.net/a.JPG");
        assert_eq!(name.len(), 64 + 4);
        assert!(name.ends_with(".jpg"));
        assert_eq!(name, local_asset_name("https://pics.example.net/a.JPG"));

        let attachment = local_asset_name("https://forum.test/download/file.php?id=12");
        assert_eq!(attachment.len(), 64);
    }
}
