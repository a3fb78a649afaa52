//! Common utilities shared between driver and debuggee modes

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Split a `host:port` address, treating a bare port as localhost.
pub fn parse_agent_address(addr: &str) -> Option<(String, u16)> {
    let addr = addr.trim();
    if let Ok(port) = addr.parse::<u16>() {
        return Some(("127.0.0.1".to_string(), port));
    }
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse().ok()?;
    // Handle IPv6 format [::1]:PORT
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() { "127.0.0.1" } else { host };
    Some((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agent_address() {
        assert_eq!(
            parse_agent_address("8000"),
            Some(("127.0.0.1".to_string(), 8000))
        );
        assert_eq!(
            parse_agent_address("vmhost:5005"),
            Some(("vmhost".to_string(), 5005))
        );
        assert_eq!(parse_agent_address("[::1]:9"), Some(("::1".to_string(), 9)));
        assert_eq!(parse_agent_address(":7"), Some(("127.0.0.1".to_string(), 7)));
        assert_eq!(parse_agent_address("nohost"), None);
        assert_eq!(parse_agent_address("host:notaport"), None);
    }
}
