//! Argument parsing helpers

use anyhow::{anyhow, bail, Context, Result};
use shardwright_cluster::{NodeAddr, ShardRange};

/// Parse `min-max`, `min-inf` or `min-` into a shard range
pub fn parse_range(s: &str) -> Result<ShardRange> {
    let (min, max) = s
        .trim()
        .split_once('-')
        .ok_or_else(|| anyhow!("expected a range like 0-999 or 3000-inf, got '{}'", s))?;
    let min: u64 = min
        .trim()
        .parse()
        .with_context(|| format!("invalid range start in '{}'", s))?;

    match max.trim().to_ascii_lowercase().as_str() {
        "" | "inf" | "infinity" => Ok(ShardRange::unbounded(min)),
        max => {
            let max: u64 = max
                .parse()
                .with_context(|| format!("invalid range end in '{}'", s))?;
            Ok(ShardRange::bounded(min, max)?)
        }
    }
}

pub fn parse_optional_range(s: Option<&str>) -> Result<Option<ShardRange>> {
    s.map(parse_range).transpose()
}

/// Node addresses are `host:port`
pub fn parse_addr(s: &str) -> Result<NodeAddr> {
    let s = s.trim();
    match s.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(NodeAddr::new(s))
        }
        _ => bail!("expected host:port, got '{}'", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bounded_and_open_ranges() {
        assert_eq!(
            parse_range("0-999").unwrap(),
            ShardRange::bounded(0, 999).unwrap()
        );
        assert_eq!(parse_range("3000-inf").unwrap(), ShardRange::unbounded(3000));
        assert_eq!(parse_range("3000-").unwrap(), ShardRange::unbounded(3000));
        assert!(parse_optional_range(None).unwrap().is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_range("999").is_err());
        assert!(parse_range("10-5").is_err());
        assert!(parse_range("a-5").is_err());
        assert!(parse_addr("10.0.0.1").is_err());
        assert_eq!(parse_addr("10.0.0.1:3306").unwrap().as_str(), "10.0.0.1:3306");
    }
}
