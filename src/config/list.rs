//! Parsing of `key=value;key=value` list values.

use super::error::{ConfigError, ConfigResult};
use crate::models::PortMapping;

/// Split a `;`-delimited list of `key=value` entries, preserving order.
///
/// A single trailing `;` is accepted. Any other empty entry, an entry
/// without `=`, or an empty key is rejected. Values may contain `=`.
pub fn parse_pairs(field: &str, raw: &str) -> ConfigResult<Vec<(String, String)>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let body = raw.strip_suffix(';').unwrap_or(raw);
    let mut pairs = Vec::new();

    for entry in body.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(malformed(field, entry, "empty entry"));
        }

        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| malformed(field, entry, "expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed(field, entry, "empty key"));
        }

        pairs.push((key.to_string(), value.trim().to_string()));
    }

    Ok(pairs)
}

/// Parse `port_mapping`: container port (optionally `/tcp` or `/udp`) to host port.
pub fn parse_port_mappings(raw: &str) -> ConfigResult<Vec<PortMapping>> {
    parse_pairs("port_mapping", raw)?
        .into_iter()
        .map(|(container_port, host_port)| {
            let host_port: u16 = host_port.parse().map_err(|_| ConfigError::InvalidPort {
                container_port: container_port.clone(),
                value: host_port.clone(),
            })?;
            PortMapping::new(&container_port, host_port)
        })
        .collect()
}

fn malformed(field: &str, entry: &str, reason: &str) -> ConfigError {
    ConfigError::MalformedList {
        field: field.to_string(),
        entry: entry.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_in_declared_order() {
        let pairs = parse_pairs("container_env", "B=2;A=1;C=3").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("B".to_string(), "2".to_string()),
                ("A".to_string(), "1".to_string()),
                ("C".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn trailing_separator_and_whitespace_are_accepted() {
        let pairs = parse_pairs("container_env", " POSTGRES_PASSWORD = 123456 ; ").unwrap();
        assert_eq!(
            pairs,
            vec![("POSTGRES_PASSWORD".to_string(), "123456".to_string())]
        );
    }

    #[test]
    fn value_keeps_everything_after_first_equals() {
        let pairs = parse_pairs("container_env", "OPTS=a=b").unwrap();
        assert_eq!(pairs, vec![("OPTS".to_string(), "a=b".to_string())]);
    }

    #[test]
    fn empty_value_list_is_empty() {
        assert!(parse_pairs("container_env", "   ").unwrap().is_empty());
    }

    #[test]
    fn rejects_entry_without_equals() {
        let err = parse_pairs("container_env", "A=1;B").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MalformedList { ref entry, .. } if entry == "B"
        ));
    }

    #[test]
    fn rejects_empty_entries() {
        for raw in ["A=1;;B=2", ";A=1", "A=1;;", ";"] {
            let err = parse_pairs("container_env", raw).unwrap_err();
            assert!(
                matches!(err, ConfigError::MalformedList { .. }),
                "expected failure for {raw:?}"
            );
        }
    }

    #[test]
    fn rejects_empty_key() {
        assert!(matches!(
            parse_pairs("container_env", "=value"),
            Err(ConfigError::MalformedList { .. })
        ));
    }

    #[test]
    fn parses_port_mappings() {
        let ports = parse_port_mappings("5432=5433;53/udp=5353").unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].container_port(), "5432/tcp");
        assert_eq!(ports[0].host_port, 5433);
        assert_eq!(ports[1].container_port(), "53/udp");
        assert_eq!(ports[1].host_port, 5353);
    }

    #[test]
    fn rejects_non_numeric_host_port() {
        assert!(matches!(
            parse_port_mappings("5432=db"),
            Err(ConfigError::InvalidPort { .. })
        ));
        assert!(matches!(
            parse_port_mappings("5432=70000"),
            Err(ConfigError::InvalidPort { .. })
        ));
    }

    #[test]
    fn rejects_bad_container_port() {
        assert!(matches!(
            parse_port_mappings("postgres=5432"),
            Err(ConfigError::MalformedList { .. })
        ));
        assert!(matches!(
            parse_port_mappings("5432/sctp=5432"),
            Err(ConfigError::MalformedList { .. })
        ));
    }
}
