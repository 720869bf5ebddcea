//! Service control protocol descriptions (SCPD).
//!
//! Each service advertises an SCPD document listing its actions and state
//! variables. The prober attaches the parsed form to every
//! [`ServiceDescriptor`](crate::ServiceDescriptor) when enrichment is enabled.

use crate::error::Result;
use crate::xml::{parse_root, sequence, TagCase, XmlValue};

/// Parsed SCPD document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceDescription {
    pub actions: Vec<Action>,
    pub state_variables: Vec<StateVariable>,
}

/// An invocable action.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub arguments: Vec<Argument>,
}

/// Direction of an action argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentDirection {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub direction: ArgumentDirection,
    pub related_state_variable: Option<String>,
}

/// Numeric bounds of a state variable.
#[derive(Debug, Clone, PartialEq)]
pub struct AllowedValueRange {
    pub minimum: Option<String>,
    pub maximum: Option<String>,
    pub step: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateVariable {
    pub name: String,
    pub data_type: String,
    pub default_value: Option<String>,
    /// Enumerated values; empty when the variable is unrestricted
    pub allowed_values: Vec<String>,
    pub allowed_range: Option<AllowedValueRange>,
}

impl ServiceDescription {
    /// Parse an SCPD document.
    ///
    /// Missing action or state tables produce empty lists.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let scpd = parse_root(xml, TagCase::CamelCase, "scpd")?;

        let actions = sequence(scpd.get("actionList").and_then(|l| l.get("action")))
            .into_iter()
            .filter_map(parse_action)
            .collect();

        let state_variables = sequence(
            scpd.get("serviceStateTable")
                .and_then(|t| t.get("stateVariable")),
        )
        .into_iter()
        .filter_map(parse_state_variable)
        .collect();

        Ok(Self {
            actions,
            state_variables,
        })
    }

    /// Look up an action by name.
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Look up a state variable by name.
    pub fn state_variable(&self, name: &str) -> Option<&StateVariable> {
        self.state_variables.iter().find(|v| v.name == name)
    }
}

impl Action {
    /// Input arguments in declaration order.
    pub fn inputs(&self) -> impl Iterator<Item = &Argument> {
        self.arguments
            .iter()
            .filter(|a| a.direction == ArgumentDirection::In)
    }

    /// Output arguments in declaration order.
    pub fn outputs(&self) -> impl Iterator<Item = &Argument> {
        self.arguments
            .iter()
            .filter(|a| a.direction == ArgumentDirection::Out)
    }
}

fn parse_action(node: &XmlValue) -> Option<Action> {
    let name = node.non_empty_text("name")?;
    let arguments = sequence(node.get("argumentList").and_then(|l| l.get("argument")))
        .into_iter()
        .filter_map(|arg| {
            let direction = match arg.text("direction")? {
                d if d.eq_ignore_ascii_case("out") => ArgumentDirection::Out,
                _ => ArgumentDirection::In,
            };
            Some(Argument {
                name: arg.non_empty_text("name")?,
                direction,
                related_state_variable: arg.non_empty_text("relatedStateVariable"),
            })
        })
        .collect();

    Some(Action { name, arguments })
}

fn parse_state_variable(node: &XmlValue) -> Option<StateVariable> {
    let allowed_values = sequence(
        node.get("allowedValueList")
            .and_then(|l| l.get("allowedValue")),
    )
    .into_iter()
    .filter_map(|v| v.as_text().map(str::to_string))
    .collect();

    let allowed_range = node.get("allowedValueRange").map(|range| AllowedValueRange {
        minimum: range.non_empty_text("minimum"),
        maximum: range.non_empty_text("maximum"),
        step: range.non_empty_text("step"),
    });

    Some(StateVariable {
        name: node.non_empty_text("name")?,
        data_type: node.text("dataType").unwrap_or("string").to_string(),
        default_value: node.non_empty_text("defaultValue"),
        allowed_values,
        allowed_range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCPD: &str = include_str!("../tests/fixtures/rendering_control_scpd.xml");

    #[test]
    fn test_parse_actions() {
        let description = ServiceDescription::from_xml(SCPD).unwrap();
        assert_eq!(description.actions.len(), 2);

        let get_volume = description.action("GetVolume").unwrap();
        let inputs: Vec<_> = get_volume.inputs().map(|a| a.name.as_str()).collect();
        let outputs: Vec<_> = get_volume.outputs().map(|a| a.name.as_str()).collect();
        assert_eq!(inputs, vec!["InstanceID", "Channel"]);
        assert_eq!(outputs, vec!["CurrentVolume"]);
        assert_eq!(
            get_volume.arguments[2].related_state_variable.as_deref(),
            Some("Volume")
        );

        // An action without an argument list
        assert!(description.action("ResetBasicEQ").unwrap().arguments.is_empty());
    }

    #[test]
    fn test_parse_state_variables() {
        let description = ServiceDescription::from_xml(SCPD).unwrap();
        assert_eq!(description.state_variables.len(), 5);

        let channel = description.state_variable("A_ARG_TYPE_Channel").unwrap();
        assert_eq!(channel.data_type, "string");
        assert_eq!(channel.default_value.as_deref(), Some("Master"));
        assert_eq!(channel.allowed_values, vec!["Master", "LF", "RF"]);

        let volume = description.state_variable("Volume").unwrap();
        let range = volume.allowed_range.as_ref().unwrap();
        assert_eq!(range.maximum.as_deref(), Some("100"));
        assert!(volume.allowed_values.is_empty());

        let mute = description.state_variable("Mute").unwrap();
        assert!(mute.allowed_range.is_none());
        assert!(mute.default_value.is_none());
    }

    #[test]
    fn test_parse_empty_scpd() {
        let description = ServiceDescription::from_xml("<scpd><specVersion/></scpd>").unwrap();
        assert!(description.actions.is_empty());
        assert!(description.state_variables.is_empty());
    }

    #[test]
    fn test_parse_rejects_other_documents() {
        assert!(ServiceDescription::from_xml("<root><device/></root>").is_err());
    }
}
