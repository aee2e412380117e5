/// Utility functions and helpers
use std::collections::BTreeMap;

/// Interpret an environment-style boolean flag (`true`, `1`, `t`)
pub fn parse_bool_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "t")
}

/// Canonical `host:port` identifier
pub fn format_host_id(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

/// Decode key bytes for display, replacing invalid UTF-8 sequences
pub fn lossy_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Parse INFO output (`field:value` lines under `# Section` headers)
pub fn parse_info(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect()
}

/// Parse CLIENT LIST output into one map per connected client
pub fn parse_client_list(text: &str) -> Vec<BTreeMap<String, String>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split(' ')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_flag() {
        assert!(parse_bool_flag("true"));
        assert!(parse_bool_flag("1"));
        assert!(parse_bool_flag("t"));
        assert!(parse_bool_flag("TRUE"));
        assert!(!parse_bool_flag("false"));
        assert!(!parse_bool_flag("yes"));
        assert!(!parse_bool_flag(""));
    }

    #[test]
    fn test_format_host_id() {
        assert_eq!(format_host_id("127.0.0.1", 6379), "127.0.0.1:6379");
    }

    #[test]
    fn test_lossy_utf8() {
        assert_eq!(lossy_utf8(b"user:1"), "user:1");
        assert_eq!(lossy_utf8(&[0x66, 0xff, 0x6f]), "f\u{fffd}o");
    }

    #[test]
    fn test_parse_info() {
        let info = parse_info(
            "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n\r\n# Clients\r\nconnected_clients:3\r\n",
        );
        assert_eq!(info.get("redis_version").map(String::as_str), Some("7.2.4"));
        assert_eq!(info.get("connected_clients").map(String::as_str), Some("3"));
        assert_eq!(info.len(), 3);
    }

    #[test]
    fn test_parse_info_keeps_colons_in_values() {
        let info = parse_info("executable:/usr/bin/redis-server\nconfig_file:C:\\redis.conf\n");
        assert_eq!(info.get("config_file").map(String::as_str), Some("C:\\redis.conf"));
    }

    #[test]
    fn test_parse_client_list() {
        let clients = parse_client_list(
            "id=3 addr=127.0.0.1:50412 name= db=0 cmd=client|list\nid=4 addr=10.0.0.2:40000 name=worker db=1 cmd=get\n",
        );
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].get("id").map(String::as_str), Some("3"));
        assert_eq!(clients[0].get("name").map(String::as_str), Some(""));
        assert_eq!(clients[1].get("db").map(String::as_str), Some("1"));
    }
}
