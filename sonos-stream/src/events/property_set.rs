//! Decoding of GENA property-set bodies.
//!
//! ```xml
//! <e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
//!   <e:property><Volume>30</Volume></e:property>
//!   <e:property><Mute>0</Mute></e:property>
//! </e:propertyset>
//! ```
//!
//! decodes to `{"Volume": "30", "Mute": "0"}`. State variable names keep
//! their exact spelling. Values are returned verbatim, so Sonos `LastChange`
//! payloads arrive as the unescaped inner XML string.

use std::collections::HashMap;

use sonos_discovery::xml::{parse_root, sequence, TagCase, XmlValue};
use tracing::debug;

use crate::error::{Result, StreamError};

/// Decode a property set into a single variable map.
///
/// Every `<property>` element is merged into the result in document order;
/// a variable reported more than once keeps its last value.
pub fn decode_property_set(xml: &str) -> Result<HashMap<String, String>> {
    let root = parse_root(xml, TagCase::Preserve, "propertyset")
        .map_err(|e| StreamError::Parse(e.to_string()))?;

    let mut data = HashMap::new();
    for property in sequence(root.get("property")) {
        let Some(variables) = property.as_object() else {
            continue;
        };
        for (name, value) in variables {
            merge_variable(&mut data, name, value);
        }
    }

    Ok(data)
}

fn merge_variable(data: &mut HashMap<String, String>, name: &str, value: &XmlValue) {
    match value {
        XmlValue::Text(text) => {
            data.insert(name.to_string(), text.clone());
        }
        XmlValue::Array(values) => {
            for value in values {
                merge_variable(data, name, value);
            }
        }
        XmlValue::Object(_) => {
            debug!(variable = name, "skipping structured state variable");
        }
    }
}
