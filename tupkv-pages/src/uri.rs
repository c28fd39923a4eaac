//! Dataset URI parsing.

use tupkv_result::{Error, Result};

/// A parsed `kv://<pool>/<container>` URI. The pool label contains no
/// slash; the container label is everything after the first one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetUri {
    pub pool: String,
    pub container: String,
}

impl DatasetUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("kv://")
            .ok_or_else(|| Error::InvalidUri(uri.to_string()))?;
        let (pool, container) = rest
            .split_once('/')
            .ok_or_else(|| Error::InvalidUri(uri.to_string()))?;
        if pool.is_empty() || container.is_empty() {
            return Err(Error::InvalidUri(uri.to_string()));
        }
        Ok(Self {
            pool: pool.to_string(),
            container: container.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pool_and_container() {
        let uri = DatasetUri::parse("kv://mypool/mycont").unwrap();
        assert_eq!(uri.pool, "mypool");
        assert_eq!(uri.container, "mycont");
    }

    #[test]
    fn container_may_contain_slashes() {
        let uri = DatasetUri::parse("kv://p/a/b/c").unwrap();
        assert_eq!(uri.pool, "p");
        assert_eq!(uri.container, "a/b/c");
    }

    #[test]
    fn rejects_malformed_uris() {
        for bad in [
            "daos://p/c",
            "kv://",
            "kv://pool",
            "kv:///c",
            "kv://p/",
            "p/c",
        ] {
            assert!(matches!(DatasetUri::parse(bad), Err(Error::InvalidUri(_))), "{bad}");
        }
    }
}
