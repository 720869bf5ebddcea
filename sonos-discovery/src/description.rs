//! Device description normalization.
//!
//! A UPnP device description nests sub-devices under `deviceList/device` and
//! services under `serviceList/service`, and either list may be missing, hold
//! one entry, or hold many. Normalization replaces both with maps keyed by a
//! short type name derived from the URN, so callers can write
//! `zone_player.device("mediaRenderer")?.service("avTransport")` without
//! caring about the original shape.

use std::collections::BTreeMap;
use std::sync::Arc;

use url::Url;

use crate::error::{DiscoveryError, Result};
use crate::scpd::ServiceDescription;
use crate::xml::{camel_case, parse_root, sequence, TagCase, XmlValue};

/// A normalized UPnP device and everything nested under it.
///
/// Every descriptor in one tree carries the `host_url` of the root device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    /// Unique device name, e.g. `uuid:RINCON_000E58A0123401400`
    pub udn: String,
    /// Device type URN
    pub device_type: String,
    pub friendly_name: String,
    /// Room the player is assigned to. Only root ZonePlayers carry one.
    pub room_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    /// `host:port` of the root device, e.g. `192.168.1.10:1400`
    pub host_url: String,
    /// Sub-devices keyed by normalized type name, in document order
    pub devices: BTreeMap<String, Vec<DeviceDescriptor>>,
    /// Services keyed by normalized type name
    pub services: BTreeMap<String, Arc<ServiceDescriptor>>,
}

/// A service exposed by a device.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    /// Service type URN, e.g. `urn:schemas-upnp-org:service:AVTransport:1`
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub event_sub_url: String,
    pub scpd_url: String,
    /// `host:port` of the owning root device
    pub host_url: String,
    /// Parsed SCPD, when the prober was able to fetch it
    pub description: Option<ServiceDescription>,
}

impl DeviceDescriptor {
    /// Parse and normalize a device description document.
    ///
    /// `host_url` is the `host:port` the document was fetched from.
    pub fn from_xml(xml: &str, host_url: &str) -> Result<Self> {
        let root = parse_root(xml, TagCase::CamelCase, "root")?;
        let device = root
            .get("device")
            .ok_or_else(|| DiscoveryError::InvalidDevice("description has no <device>".to_string()))?;

        let descriptor = normalize_device(device, host_url);
        if descriptor.udn.is_empty() {
            return Err(DiscoveryError::InvalidDevice(
                "root device has no UDN".to_string(),
            ));
        }

        Ok(descriptor)
    }

    /// First sub-device of the given normalized type.
    pub fn device(&self, type_name: &str) -> Option<&DeviceDescriptor> {
        self.devices.get(type_name).and_then(|devices| devices.first())
    }

    /// All sub-devices of the given normalized type.
    pub fn devices_of_type(&self, type_name: &str) -> &[DeviceDescriptor] {
        self.devices
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Service of the given normalized type on this device (not sub-devices).
    pub fn service(&self, type_name: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.services.get(type_name)
    }

    /// Every service in the tree, depth first.
    pub fn all_services(&self) -> Vec<&Arc<ServiceDescriptor>> {
        let mut services: Vec<&Arc<ServiceDescriptor>> = self.services.values().collect();
        for children in self.devices.values() {
            for child in children {
                services.extend(child.all_services());
            }
        }
        services
    }

    pub(crate) fn all_services_mut(&mut self) -> Vec<&mut Arc<ServiceDescriptor>> {
        let mut services: Vec<&mut Arc<ServiceDescriptor>> = self.services.values_mut().collect();
        for children in self.devices.values_mut() {
            for child in children.iter_mut() {
                services.extend(child.all_services_mut());
            }
        }
        services
    }

    /// Host part of `host_url`, without the port.
    pub fn host(&self) -> &str {
        split_host(&self.host_url)
    }

    /// Display name: the room when known, the friendly name otherwise.
    pub fn display_name(&self) -> &str {
        self.room_name.as_deref().unwrap_or(&self.friendly_name)
    }
}

impl ServiceDescriptor {
    /// Absolute URL for SOAP control requests.
    pub fn control_endpoint(&self) -> String {
        absolute_url(&self.host_url, &self.control_url)
    }

    /// Absolute URL for GENA subscription requests.
    pub fn event_endpoint(&self) -> String {
        absolute_url(&self.host_url, &self.event_sub_url)
    }

    /// Absolute URL of the SCPD document.
    pub fn scpd_endpoint(&self) -> String {
        absolute_url(&self.host_url, &self.scpd_url)
    }

    /// Normalized type name, e.g. `avTransport`.
    pub fn type_name(&self) -> Option<String> {
        format_type_name(&self.service_type)
    }
}

/// Derive a normalized type name from a device or service type URN.
///
/// Takes the next-to-last colon-separated segment and converts it to lower
/// camel case: `urn:schemas-upnp-org:device:MediaRenderer:1` becomes
/// `mediaRenderer`. Returns `None` when the URN has no such segment.
pub fn format_type_name(urn: &str) -> Option<String> {
    let parts: Vec<&str> = urn.split(':').collect();
    if parts.len() < 2 {
        return None;
    }

    let name = camel_case(parts[parts.len() - 2]);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// `host[:port]` of a description `LOCATION` URL.
pub fn host_url_from_location(location: &str) -> Result<String> {
    let url = Url::parse(location)
        .map_err(|e| DiscoveryError::Parse(format!("invalid LOCATION {location}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| DiscoveryError::Parse(format!("LOCATION has no host: {location}")))?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Normalize one `<device>` element and everything beneath it.
///
/// Missing fields become empty strings; sub-devices or services whose type
/// URN cannot be reduced to a name are skipped.
pub fn normalize_device(node: &XmlValue, host_url: &str) -> DeviceDescriptor {
    let mut devices: BTreeMap<String, Vec<DeviceDescriptor>> = BTreeMap::new();
    for child in sequence(node.get("deviceList").and_then(|l| l.get("device"))) {
        let Some(name) = child.text("deviceType").and_then(format_type_name) else {
            continue;
        };
        devices
            .entry(name)
            .or_default()
            .push(normalize_device(child, host_url));
    }

    let mut services = BTreeMap::new();
    for service in sequence(node.get("serviceList").and_then(|l| l.get("service"))) {
        let Some(name) = service.text("serviceType").and_then(format_type_name) else {
            continue;
        };
        services.insert(name, Arc::new(normalize_service(service, host_url)));
    }

    DeviceDescriptor {
        udn: text_or_empty(node, "UDN"),
        device_type: text_or_empty(node, "deviceType"),
        friendly_name: text_or_empty(node, "friendlyName"),
        room_name: node.non_empty_text("roomName"),
        manufacturer: node.non_empty_text("manufacturer"),
        model_name: node.non_empty_text("modelName"),
        model_number: node.non_empty_text("modelNumber"),
        host_url: host_url.to_string(),
        devices,
        services,
    }
}

fn normalize_service(node: &XmlValue, host_url: &str) -> ServiceDescriptor {
    ServiceDescriptor {
        service_type: text_or_empty(node, "serviceType"),
        service_id: text_or_empty(node, "serviceId"),
        control_url: text_or_empty(node, "controlUrl"),
        event_sub_url: text_or_empty(node, "eventSubUrl"),
        scpd_url: text_or_empty(node, "SCPDURL"),
        host_url: host_url.to_string(),
        description: None,
    }
}

fn text_or_empty(node: &XmlValue, key: &str) -> String {
    node.text(key).unwrap_or_default().to_string()
}

fn absolute_url(host_url: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("http://{host_url}{path}")
    } else {
        format!("http://{host_url}/{path}")
    }
}

fn split_host(host_url: &str) -> &str {
    match host_url.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => host_url,
    }
}
