//! SSDP (Simple Service Discovery Protocol) message handling.
//!
//! Builds the M-SEARCH request and parses the unicast replies devices send
//! back. Socket handling lives in the [`prober`](crate::prober) module.

use std::collections::HashMap;

use crate::description::host_url_from_location;
use crate::error::Result;

/// Build an M-SEARCH request.
///
/// `host` is the value of the `HOST` header, normally the multicast group.
pub fn build_msearch(search_target: &str, mx: u8, host: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {host}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx}\r\n\
         ST: {search_target}\r\n\
         \r\n"
    )
}

/// Headers of a single M-SEARCH reply.
///
/// Header names are matched case-insensitively.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    headers: HashMap<String, String>,
}

impl SearchResponse {
    /// Parse a reply datagram.
    ///
    /// The status line is skipped and every following `Name: value` line is
    /// recorded, split at its first colon. Returns `None` unless both `USN`
    /// and `LOCATION` are present.
    pub fn parse(text: &str) -> Option<Self> {
        let headers: HashMap<String, String> = text
            .lines()
            .skip(1)
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_ascii_uppercase(), value.trim().to_string()))
            })
            .collect();

        let response = Self { headers };
        match (response.usn(), response.location()) {
            (Some(usn), Some(location)) if !usn.is_empty() && !location.is_empty() => {
                Some(response)
            }
            _ => None,
        }
    }

    /// Value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Unique service name, the deduplication key.
    pub fn usn(&self) -> Option<&str> {
        self.header("USN")
    }

    /// URL of the device description document.
    pub fn location(&self) -> Option<&str> {
        self.header("LOCATION")
    }

    /// Search target the device answered for.
    pub fn st(&self) -> Option<&str> {
        self.header("ST")
    }

    pub fn server(&self) -> Option<&str> {
        self.header("SERVER")
    }

    /// `host[:port]` of the description location.
    pub fn host_url(&self) -> Result<String> {
        host_url_from_location(self.location().unwrap_or_default())
    }
}
