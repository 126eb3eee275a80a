//! GitHub repository source.
//!
//! Lists a branch's full tree through the REST API
//! (`GET /repos/{owner}/{repo}/git/trees/{branch}?recursive=1`), keeps the
//! blobs whose extension is supported, and downloads each one from the raw
//! content host into a local folder, preserving repository-relative paths.
//!
//! A failed listing aborts the processing action. A failed download only
//! skips that file. Nothing here retries.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::config::GitHubConfig;
use crate::models::DocumentFormat;
use crate::progress::{ProgressEvent, ProgressReporter};

const USER_AGENT: &str = concat!("docchat/", env!("CARGO_PKG_VERSION"));

/// `owner/repo@branch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl RepoRef {
    pub fn new(owner: &str, repo: &str, branch: &str) -> Result<Self> {
        let owner = owner.trim();
        let repo = repo.trim();
        let branch = branch.trim();
        if owner.is_empty() || repo.is_empty() || branch.is_empty() {
            bail!("GitHub owner, repository and branch are all required");
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

/// One entry of a git tree listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A supported file in the repository, ready to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Repository-relative path.
    pub path: String,
    pub format: DocumentFormat,
    pub download_url: String,
}

/// Result of downloading a set of [`RemoteFile`]s.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Local paths written, in listing order.
    pub downloaded: Vec<PathBuf>,
    /// `(repository path, reason)` for every file that was skipped.
    pub failures: Vec<(String, String)>,
}

pub struct GitHubSource {
    client: reqwest::Client,
    api_url: String,
    raw_url: String,
    token: Option<String>,
}

impl GitHubSource {
    /// Uses `GITHUB_TOKEN` from the environment when set.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::with_token(config, token)
    }

    pub fn with_token(config: &GitHubConfig, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            raw_url: config.raw_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Full recursive tree of `repo`'s branch.
    pub async fn list_tree(&self, repo: &RepoRef) -> Result<Vec<TreeEntry>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_url, repo.owner, repo.repo, repo.branch
        );
        tracing::info!(%repo, "listing repository tree");

        let response = self
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .with_context(|| format!("Failed to reach GitHub API for {}", repo))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or(body);
            bail!(
                "Failed to fetch repository tree for {} (HTTP {}): {}",
                repo,
                status,
                message.trim()
            );
        }

        let tree: TreeResponse = response
            .json()
            .await
            .context("Invalid GitHub tree response")?;
        if tree.truncated {
            tracing::warn!(%repo, "tree listing truncated by GitHub; some files are missing");
        }
        Ok(tree.tree)
    }

    /// Supported files of `repo`, in listing order.
    pub async fn list_supported(&self, repo: &RepoRef) -> Result<Vec<RemoteFile>> {
        let entries = self.list_tree(repo).await?;
        filter_supported(repo, &entries, &self.raw_url)
    }

    /// Download every file into `dest`. Per-file failures are collected.
    pub async fn download_all(
        &self,
        files: &[RemoteFile],
        dest: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<DownloadReport> {
        std::fs::create_dir_all(dest)
            .with_context(|| format!("Failed to create download folder {}", dest.display()))?;

        let total = files.len() as u64;
        let mut report = DownloadReport::default();
        for (i, file) in files.iter().enumerate() {
            progress.report(ProgressEvent::Downloading {
                file: file.path.clone(),
                n: i as u64 + 1,
                total,
            });
            match self.download_one(file, dest).await {
                Ok(path) => {
                    tracing::info!(file = %file.path, "downloaded");
                    report.downloaded.push(path);
                }
                Err(e) => {
                    tracing::warn!(file = %file.path, error = %e, "download failed");
                    report.failures.push((file.path.clone(), format!("{:#}", e)));
                }
            }
        }
        Ok(report)
    }

    async fn download_one(&self, file: &RemoteFile, dest: &Path) -> Result<PathBuf> {
        let target = dest.join(safe_relative_path(&file.path)?);

        let response = self
            .get(&file.download_url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", file.path))?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} for {}", status, file.download_url);
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&target, &bytes)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        Ok(target)
    }
}

/// Keep blobs with a supported extension and attach their raw download URL.
pub fn filter_supported(
    repo: &RepoRef,
    entries: &[TreeEntry],
    raw_url: &str,
) -> Result<Vec<RemoteFile>> {
    let mut files = Vec::new();
    for entry in entries {
        if entry.kind != "blob" {
            continue;
        }
        let Some(format) = DocumentFormat::from_path(Path::new(&entry.path)) else {
            continue;
        };
        files.push(RemoteFile {
            path: entry.path.clone(),
            format,
            download_url: raw_download_url(raw_url, repo, &entry.path)?,
        });
    }
    Ok(files)
}

/// `{raw}/{owner}/{repo}/{branch}/{path}` with each segment percent-encoded.
pub fn raw_download_url(raw_url: &str, repo: &RepoRef, path: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(raw_url)
        .with_context(|| format!("Invalid raw content URL: {}", raw_url))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Raw content URL cannot be a base: {}", raw_url))?;
        segments.pop_if_empty();
        segments.push(&repo.owner).push(&repo.repo);
        segments.extend(repo.branch.split('/'));
        segments.extend(path.split('/'));
    }
    Ok(url.to_string())
}

/// Matched files grouped by format, paths in listing order.
pub fn group_by_format(files: &[RemoteFile]) -> BTreeMap<DocumentFormat, Vec<String>> {
    let mut groups: BTreeMap<DocumentFormat, Vec<String>> = BTreeMap::new();
    for file in files {
        groups.entry(file.format).or_default().push(file.path.clone());
    }
    groups
}

pub fn print_summary(repo: &RepoRef, files: &[RemoteFile]) {
    println!("repository {}", repo);
    println!("  supported files: {}", files.len());
    for (format, paths) in group_by_format(files) {
        println!("  .{}: {}", format.extension(), paths.len());
        for path in paths {
            println!("    {}", path);
        }
    }
}

fn safe_relative_path(path: &str) -> Result<PathBuf> {
    let relative = PathBuf::from(path);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !safe || path.is_empty() {
        bail!("Refusing to write outside the download folder: {}", path);
    }
    Ok(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, kind: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            kind: kind.to_string(),
        }
    }

    fn repo() -> RepoRef {
        RepoRef::new("octo", "library", "main").unwrap()
    }

    #[test]
    fn filters_to_supported_blobs() {
        let entries = vec![
            entry("README.md", "blob"),
            entry("books", "tree"),
            entry("books/novel.epub", "blob"),
            entry("books/slides.PPTX", "blob"),
            entry("src/main.rs", "blob"),
            entry("notes.txt", "blob"),
            entry("fake.pdf", "commit"),
        ];
        let files =
            filter_supported(&repo(), &entries, "https://raw.githubusercontent.com").unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["books/novel.epub", "books/slides.PPTX", "notes.txt"]);
        assert_eq!(
            files[0].download_url,
            "https://raw.githubusercontent.com/octo/library/main/books/novel.epub"
        );
    }

    #[test]
    fn raw_url_encodes_segments() {
        let repo = RepoRef::new("octo", "library", "release/v1").unwrap();
        let url = raw_download_url("http://127.0.0.1:8080/", &repo, "my docs/a#1.pdf").unwrap();
        assert_eq!(
            url,
            "http://127.0.0.1:8080/octo/library/release/v1/my%20docs/a%231.pdf"
        );
    }

    #[test]
    fn groups_by_format() {
        let entries = vec![
            entry("b.pdf", "blob"),
            entry("a.epub", "blob"),
            entry("c.pdf", "blob"),
        ];
        let files = filter_supported(&repo(), &entries, "https://raw.example").unwrap();
        let groups = group_by_format(&files);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&DocumentFormat::Pdf], vec!["b.pdf", "c.pdf"]);
        assert_eq!(groups[&DocumentFormat::Epub], vec!["a.epub"]);
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(safe_relative_path("../etc/passwd").is_err());
        assert!(safe_relative_path("/abs.pdf").is_err());
        assert!(safe_relative_path("docs/ok.pdf").is_ok());
    }

    #[test]
    fn repo_ref_requires_all_parts() {
        assert!(RepoRef::new("octo", " ", "main").is_err());
        assert_eq!(repo().to_string(), "octo/library@main");
    }
}
