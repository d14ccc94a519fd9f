//! `fmiModelDescription` XML rendering and parsing.
//!
//! Attribute order is fixed, so the same description always renders to
//! the same bytes.

use std::fs;
use std::io::Write;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};

use super::{
    Capabilities, Causality, Clock, DescriptionHeader, ModelDescription, ModelVariable,
    OutputDependency, Signal,
};
use crate::ValueReference;
use crate::error::DescriptionError;

const INDENT: usize = 2;

impl ModelDescription {
    /// Renders the description as an XML string.
    ///
    /// # Errors
    ///
    /// Returns a `DescriptionError` if the writer fails.
    pub fn to_xml(&self) -> Result<String, DescriptionError> {
        let mut buf = Vec::new();
        self.write_xml(&mut buf)?;
        // The writer only ever receives `&str` input.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Writes the description to a file, replacing it if present.
    ///
    /// # Errors
    ///
    /// Returns a `DescriptionError` if the file cannot be written.
    pub fn write_to_file(&self, path: &Path) -> Result<(), DescriptionError> {
        let xml = self.to_xml()?;
        fs::write(path, xml)?;
        Ok(())
    }

    /// Writes the description as XML to any writer.
    ///
    /// # Errors
    ///
    /// Returns a `DescriptionError` if the underlying writer fails.
    pub fn write_xml<W: Write>(&self, out: W) -> Result<(), DescriptionError> {
        let mut writer = Writer::new_with_indent(out, b' ', INDENT);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("fmiModelDescription");
        root.push_attribute(("fmiVersion", self.header.fmi_version.as_str()));
        root.push_attribute(("modelName", self.header.model_name.as_str()));
        root.push_attribute((
            "instantiationToken",
            self.header.instantiation_token.as_str(),
        ));
        writer.write_event(Event::Start(root))?;

        let mut co_sim = BytesStart::new("CoSimulation");
        co_sim.push_attribute(("modelIdentifier", self.header.model_identifier.as_str()));
        co_sim.push_attribute((
            "canHandleVariableCommunicationStepSize",
            flag(self.capabilities.can_handle_variable_communication_step_size),
        ));
        co_sim.push_attribute((
            "canReturnEarlyAfterIntermediateUpdate",
            flag(self.capabilities.can_return_early_after_intermediate_update),
        ));
        co_sim.push_attribute(("hasEventMode", flag(self.capabilities.has_event_mode)));
        writer.write_event(Event::Empty(co_sim))?;

        writer.write_event(Event::Start(BytesStart::new("ModelVariables")))?;
        for variable in &self.variables {
            writer.write_event(Event::Empty(variable_element(variable)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("ModelVariables")))?;

        writer.write_event(Event::Start(BytesStart::new("ModelStructure")))?;
        for output in &self.outputs {
            let mut element = BytesStart::new("Output");
            element.push_attribute((
                "valueReference",
                output.value_reference.to_string().as_str(),
            ));
            element.push_attribute(("dependencies", join(&output.dependencies).as_str()));
            writer.write_event(Event::Empty(element))?;
        }
        writer.write_event(Event::End(BytesEnd::new("ModelStructure")))?;

        writer.write_event(Event::End(BytesEnd::new("fmiModelDescription")))?;
        writer.get_mut().write_all(b"\n")?;
        Ok(())
    }

    /// Reads a description from a file.
    ///
    /// # Errors
    ///
    /// Returns a `DescriptionError` on IO failure or malformed XML.
    pub fn from_xml_file(path: &Path) -> Result<Self, DescriptionError> {
        let content = fs::read_to_string(path)?;
        Self::from_xml_str(&content)
    }

    /// Parses a description document.
    ///
    /// Elements outside the subset this crate writes are skipped.
    ///
    /// # Errors
    ///
    /// Returns a `DescriptionError` on malformed XML, missing required
    /// attributes, or a missing root element.
    pub fn from_xml_str(xml: &str) -> Result<Self, DescriptionError> {
        let mut reader = Reader::from_str(xml);
        let mut header: Option<DescriptionHeader> = None;
        let mut capabilities = Capabilities::default();
        let mut variables = Vec::new();
        let mut outputs = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) => {
                    let element = Element::parse(&e)?;
                    match element.name.as_str() {
                        "fmiModelDescription" => {
                            header = Some(DescriptionHeader {
                                fmi_version: element.required("fmiVersion")?.to_string(),
                                model_name: element.required("modelName")?.to_string(),
                                instantiation_token: element
                                    .optional("instantiationToken")
                                    .unwrap_or_default()
                                    .to_string(),
                                model_identifier: String::new(),
                            });
                        }
                        "CoSimulation" => {
                            if let Some(h) = header.as_mut() {
                                h.model_identifier =
                                    element.required("modelIdentifier")?.to_string();
                            }
                            capabilities = Capabilities {
                                can_handle_variable_communication_step_size: element
                                    .flag("canHandleVariableCommunicationStepSize")?,
                                can_return_early_after_intermediate_update: element
                                    .flag("canReturnEarlyAfterIntermediateUpdate")?,
                                has_event_mode: element.flag("hasEventMode")?,
                            };
                        }
                        "Int32" => variables.push(ModelVariable::Int32(Signal {
                            name: element.required("name")?.to_string(),
                            value_reference: element.reference("valueReference")?,
                            causality: element.causality()?,
                            clock: element.reference("clocks")?,
                        })),
                        "Clock" => variables.push(ModelVariable::Clock(Clock {
                            name: element.required("name")?.to_string(),
                            value_reference: element.reference("valueReference")?,
                            causality: element.causality()?,
                        })),
                        "Output" => outputs.push(OutputDependency {
                            value_reference: element.reference("valueReference")?,
                            dependencies: element.references("dependencies")?,
                        }),
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let header = header.ok_or(DescriptionError::MissingRoot)?;
        Ok(ModelDescription {
            header,
            capabilities,
            variables,
            outputs,
        })
    }
}

fn variable_element(variable: &ModelVariable) -> BytesStart<'static> {
    match variable {
        ModelVariable::Int32(signal) => {
            let mut e = BytesStart::new("Int32");
            e.push_attribute(("name", signal.name.as_str()));
            e.push_attribute((
                "valueReference",
                signal.value_reference.to_string().as_str(),
            ));
            e.push_attribute(("causality", signal.causality.as_str()));
            e.push_attribute(("variability", "discrete"));
            e.push_attribute(("clocks", signal.clock.to_string().as_str()));
            e
        }
        ModelVariable::Clock(clock) => {
            let mut e = BytesStart::new("Clock");
            e.push_attribute(("name", clock.name.as_str()));
            e.push_attribute(("valueReference", clock.value_reference.to_string().as_str()));
            e.push_attribute(("causality", clock.causality.as_str()));
            e.push_attribute(("variability", "discrete"));
            e.push_attribute(("interval", "triggered"));
            e
        }
    }
}

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn join(references: &[ValueReference]) -> String {
    references
        .iter()
        .map(ValueReference::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Owned view of one start tag: its name and unescaped attributes.
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
}

impl Element {
    fn parse(start: &BytesStart<'_>) -> Result<Self, DescriptionError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self { name, attributes })
    }

    fn optional(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == attribute)
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, attribute: &'static str) -> Result<&str, DescriptionError> {
        self.optional(attribute)
            .ok_or_else(|| DescriptionError::MissingAttribute {
                element: self.name.clone(),
                attribute,
            })
    }

    fn invalid(&self, attribute: &'static str, value: &str) -> DescriptionError {
        DescriptionError::InvalidAttribute {
            element: self.name.clone(),
            attribute,
            value: value.to_string(),
        }
    }

    fn reference(&self, attribute: &'static str) -> Result<ValueReference, DescriptionError> {
        let raw = self.required(attribute)?;
        raw.trim().parse().map_err(|_| self.invalid(attribute, raw))
    }

    fn references(&self, attribute: &'static str) -> Result<Vec<ValueReference>, DescriptionError> {
        let Some(raw) = self.optional(attribute) else {
            return Ok(Vec::new());
        };
        raw.split_whitespace()
            .map(|part| part.parse().map_err(|_| self.invalid(attribute, raw)))
            .collect()
    }

    fn causality(&self) -> Result<Causality, DescriptionError> {
        let raw = self.required("causality")?;
        Causality::parse(raw).ok_or_else(|| self.invalid("causality", raw))
    }

    /// Missing capability flags read as `false`.
    fn flag(&self, attribute: &'static str) -> Result<bool, DescriptionError> {
        match self.optional(attribute) {
            None | Some("false") => Ok(false),
            Some("true") => Ok(true),
            Some(other) => Err(self.invalid(attribute, other)),
        }
    }
}
