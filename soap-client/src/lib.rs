//! Blocking SOAP client for UPnP service actions
//!
//! Invokes actions on a [`ServiceDescriptor`] produced by discovery and
//! returns the output arguments as a name to value map. UPnP faults are
//! decoded into [`SoapError::Fault`].
//!
//! ```no_run
//! use soap_client::SoapClient;
//! # fn example(service: &sonos_discovery::ServiceDescriptor) -> Result<(), soap_client::SoapError> {
//! let client = SoapClient::new();
//! let volume = client.execute_action(
//!     service,
//!     "GetVolume",
//!     &[("InstanceID", "0"), ("Channel", "Master")],
//! )?;
//! println!("volume: {}", volume["CurrentVolume"]);
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::SoapError;

use std::collections::HashMap;
use std::time::Duration;

use quick_xml::escape::escape;
use sonos_discovery::ServiceDescriptor;
use tracing::debug;
use xmltree::{Element, XMLNode};

/// A minimal SOAP client for UPnP device communication
#[derive(Debug, Clone)]
pub struct SoapClient {
    agent: ureq::Agent,
}

impl SoapClient {
    /// Create a new SOAP client with default configuration
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(10))
    }

    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .build(),
        }
    }

    /// Invoke `action` on `service` with the given input arguments.
    ///
    /// Arguments are sent in order and XML-escaped. On success the children
    /// of `<{action}Response>` are returned by name; empty elements map to
    /// `""`.
    pub fn execute_action(
        &self,
        service: &ServiceDescriptor,
        action: &str,
        arguments: &[(&str, &str)],
    ) -> Result<HashMap<String, String>, SoapError> {
        let body = envelope(&service.service_type, action, arguments);
        let url = service.control_endpoint();
        let soap_action = format!("\"{}#{}\"", service.service_type, action);

        debug!(%url, action, "SOAP request");

        let xml_text = match self
            .agent
            .post(&url)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .set("SOAPACTION", &soap_action)
            .send_string(&body)
        {
            Ok(response) => response
                .into_string()
                .map_err(|e| SoapError::Network(e.to_string()))?,
            // Faults arrive as HTTP 500 with an envelope body
            Err(ureq::Error::Status(status, response)) => {
                let text = response
                    .into_string()
                    .map_err(|e| SoapError::Network(e.to_string()))?;
                if !text.contains("Fault") {
                    return Err(SoapError::Network(format!("{url} returned HTTP {status}")));
                }
                text
            }
            Err(e) => return Err(SoapError::Network(e.to_string())),
        };

        let xml = Element::parse(xml_text.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))?;
        let response = extract_response(&xml, action)?;

        Ok(output_arguments(&response))
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

fn envelope(service_type: &str, action: &str, arguments: &[(&str, &str)]) -> String {
    let payload: String = arguments
        .iter()
        .map(|(name, value)| format!("<{name}>{}</{name}>", escape(*value)))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{service_type}">{payload}</u:{action}></s:Body></s:Envelope>"#
    )
}

fn extract_response(xml: &Element, action: &str) -> Result<Element, SoapError> {
    let body = xml
        .get_child("Body")
        .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))?;

    // Check for SOAP fault first
    if let Some(fault) = body.get_child("Fault") {
        let upnp_error = fault
            .get_child("detail")
            .and_then(|d| d.get_child("UPnPError").or_else(|| d.get_child("UpnPError")));

        let code = upnp_error
            .and_then(|e| e.get_child("errorCode"))
            .and_then(|c| c.get_text())
            .and_then(|t| t.trim().parse::<u16>().ok())
            .unwrap_or(500);
        let description = upnp_error
            .and_then(|e| e.get_child("errorDescription"))
            .or_else(|| fault.get_child("faultstring"))
            .and_then(|d| d.get_text())
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        return Err(SoapError::Fault { code, description });
    }

    let response_name = format!("{action}Response");
    body.get_child(response_name.as_str())
        .cloned()
        .ok_or_else(|| SoapError::Parse(format!("Missing {response_name} element")))
}

fn output_arguments(response: &Element) -> HashMap<String, String> {
    response
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .map(|child| {
            let value = child.get_text().map(|t| t.into_owned()).unwrap_or_default();
            (child.name.clone(), value)
        })
        .collect()
}
