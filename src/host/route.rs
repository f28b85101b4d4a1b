//! Page URLs understood by the render host.
//!
//! Only two schemes exist: `http(s)://host:port/path` when assets are served, and
//! `file:///abs/dir/route` when the page is booted straight from an asset directory.

use std::path::{Path, PathBuf};

use crate::foundation::error::{SpinloopError, SpinloopResult};

/// Entry point that boots only the Scene Driver and the Recorder.
pub const RECORD_ROUTE: &str = "/record";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageUrl {
    Http {
        scheme: String,
        authority: String,
        path: String,
    },
    File {
        path: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Record,
}

/// Where a scene resource is fetched from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetSource {
    Http(String),
    File(PathBuf),
}

impl std::fmt::Display for AssetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(url) => f.write_str(url),
            Self::File(path) => write!(f, "file://{}", path.display()),
        }
    }
}

impl PageUrl {
    pub fn parse(url: &str) -> SpinloopResult<Self> {
        if let Some(rest) = url.strip_prefix("file://") {
            if !rest.starts_with('/') {
                return Err(SpinloopError::validation(format!(
                    "file url must be absolute: '{url}'"
                )));
            }
            return Ok(Self::File {
                path: PathBuf::from(rest),
            });
        }

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| SpinloopError::validation(format!("url has no scheme: '{url}'")))?;
        if scheme != "http" && scheme != "https" {
            return Err(SpinloopError::validation(format!(
                "unsupported url scheme '{scheme}'"
            )));
        }
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(SpinloopError::validation(format!("url has no host: '{url}'")));
        }
        let path = path.split(['?', '#']).next().unwrap_or("/");
        Ok(Self::Http {
            scheme: scheme.to_owned(),
            authority: authority.to_owned(),
            path: path.to_owned(),
        })
    }

    /// Page URL for `route` under a served origin.
    pub fn served(host: &str, port: u16, route: &str) -> String {
        format!("http://{host}:{port}{route}")
    }

    /// Page URL for `route` booted from a local asset directory.
    pub fn local(asset_dir: &Path, route: &str) -> String {
        format!("file://{}{}", asset_dir.display(), route)
    }

    pub fn route(&self) -> SpinloopResult<Route> {
        let matched = match self {
            Self::Http { path, .. } => path.trim_end_matches('/') == RECORD_ROUTE,
            Self::File { path } => path
                .to_str()
                .is_some_and(|p| p.trim_end_matches('/').ends_with(RECORD_ROUTE)),
        };
        if matched {
            Ok(Route::Record)
        } else {
            Err(SpinloopError::validation(format!("no page at '{self}'")))
        }
    }

    /// Resolve a resource reference relative to this page.
    pub fn resolve(&self, reference: &str) -> SpinloopResult<AssetSource> {
        if let Some(rest) = reference.strip_prefix("file://") {
            return Ok(AssetSource::File(PathBuf::from(rest)));
        }
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Ok(AssetSource::Http(reference.to_owned()));
        }
        if reference.is_empty() {
            return Err(SpinloopError::validation("empty asset reference"));
        }

        match self {
            Self::File { path } => {
                if reference.starts_with('/') {
                    return Ok(AssetSource::File(PathBuf::from(reference)));
                }
                let dir = path.parent().unwrap_or_else(|| Path::new("/"));
                Ok(AssetSource::File(dir.join(reference)))
            }
            Self::Http {
                scheme,
                authority,
                path,
            } => {
                let joined = if reference.starts_with('/') {
                    reference.to_owned()
                } else {
                    let dir = path.rfind('/').map_or("/", |i| &path[..=i]);
                    format!("{dir}{reference}")
                };
                Ok(AssetSource::Http(format!("{scheme}://{authority}{joined}")))
            }
        }
    }
}

impl std::fmt::Display for PageUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                scheme,
                authority,
                path,
            } => write!(f, "{scheme}://{authority}{path}"),
            Self::File { path } => write!(f, "file://{}", path.display()),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/host/route.rs"]
mod tests;
