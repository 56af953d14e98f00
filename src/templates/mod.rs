//! Form templates and top-level commands
//!
//! A command either opens a form directly or asks a follow-up question whose
//! answer picks the form. Templates are fixed at startup.

use crate::error::LedgerError;
use crate::models::ParsedRecord;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Field used for routing; checked before any other validation.
pub const ID_FIELD: &str = "ID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormTemplate {
    pub id: String,
    /// Routing base code, e.g. `CO` for every `CO_<BANK>` form.
    pub base: String,
    /// Informational lines shown pre-filled, e.g. `BANCO: Pichincha`.
    #[serde(default)]
    pub preset: Vec<PresetField>,
    pub fields: Vec<String>,
    pub mandatory: Vec<String>,
}

impl FormTemplate {
    /// Empty form, one `FIELD:` line per field.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for preset in &self.preset {
            out.push_str(&format!("{}: {}\n", preset.name, preset.value));
        }
        for field in &self.fields {
            out.push_str(&format!("{}:\n", field));
        }
        out
    }

    /// Mandatory fields absent or empty in `record`, in template order.
    pub fn missing_fields(&self, record: &ParsedRecord) -> Vec<String> {
        self.mandatory
            .iter()
            .filter(|field| !record.has_value(field))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub token: String,
    pub label: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandSpec {
    Form {
        template: String,
    },
    SubChoice {
        /// Name of the thing being chosen, used in the re-prompt.
        label: String,
        prompt: String,
        choices: Vec<Choice>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub token: String,
    #[serde(flatten)]
    pub spec: CommandSpec,
}

/// Template registry, with commands kept in declaration order for help text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRegistry {
    templates: Vec<FormTemplate>,
    commands: Vec<Command>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TemplateRegistry {
    pub fn new(templates: Vec<FormTemplate>, commands: Vec<Command>) -> Result<Self> {
        let mut registry = Self {
            templates,
            commands,
            index: HashMap::new(),
        };
        registry.build_index()?;
        Ok(registry)
    }

    /// Validates cross references and rebuilds the lookup index. Needed after
    /// deserializing.
    pub fn build_index(&mut self) -> Result<()> {
        self.index = index_templates(&self.templates);

        for command in &self.commands {
            let referenced: Vec<&str> = match &command.spec {
                CommandSpec::Form { template } => vec![template.as_str()],
                CommandSpec::SubChoice { choices, .. } => {
                    choices.iter().map(|c| c.template.as_str()).collect()
                }
            };
            for id in referenced {
                if !self.index.contains_key(&id.to_uppercase()) {
                    return Err(LedgerError::Config(format!(
                        "command {} references unknown template {}",
                        command.token, id
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn template(&self, id: &str) -> Option<&FormTemplate> {
        self.index
            .get(&id.to_uppercase())
            .map(|i| &self.templates[*i])
    }

    pub fn render(&self, id: &str) -> Option<String> {
        self.template(id).map(FormTemplate::render)
    }

    pub fn mandatory_fields(&self, id: &str) -> Option<&[String]> {
        self.template(id).map(|t| t.mandatory.as_slice())
    }

    /// Exact, case-insensitive match on the whole message.
    pub fn command(&self, token: &str) -> Option<&Command> {
        let token = token.trim();
        self.commands
            .iter()
            .find(|c| c.token.eq_ignore_ascii_case(token))
    }

    /// Template picked by `token` after `command` asked its follow-up question.
    pub fn resolve_choice(&self, command: &str, token: &str) -> Result<&FormTemplate> {
        let Some(CommandSpec::SubChoice { label, choices, .. }) =
            self.command(command).map(|c| &c.spec)
        else {
            return Err(LedgerError::Config(format!(
                "{} is not a sub-choice command",
                command
            )));
        };

        let token = token.trim();
        choices
            .iter()
            .find(|c| c.token.eq_ignore_ascii_case(token))
            .and_then(|c| self.template(&c.template))
            .ok_or_else(|| LedgerError::InvalidSubChoice {
                label: label.clone(),
                choices: choices.iter().map(|c| c.label.clone()).collect(),
            })
    }

    pub fn help_text(&self) -> String {
        let tokens: Vec<&str> = self.commands.iter().map(|c| c.token.as_str()).collect();
        let listed = match tokens.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} o {}", rest.join(", "), last),
            Some((last, _)) => last.to_string(),
            None => String::new(),
        };
        format!("❌ No entendí tu mensaje.\nEscribe: {}.", listed)
    }

    /// `MissingIdentifier` first, then the mandatory-field check.
    pub fn validate(&self, id: &str, record: &ParsedRecord) -> Result<()> {
        let template = self
            .template(id)
            .ok_or_else(|| LedgerError::Config(format!("unknown template {}", id)))?;

        if !record.has_value(ID_FIELD) {
            return Err(LedgerError::MissingIdentifier);
        }

        let missing = template.missing_fields(record);
        if !missing.is_empty() {
            return Err(LedgerError::MissingMandatoryFields(missing));
        }

        Ok(())
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        let (templates, commands) = default_catalog();
        // The built-in catalog is self-consistent.
        Self {
            index: index_templates(&templates),
            templates,
            commands,
        }
    }
}

fn index_templates(templates: &[FormTemplate]) -> HashMap<String, usize> {
    templates
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.to_uppercase(), i))
        .collect()
}

/// Colon-delimited form body: `FIELD: value` per line, split at the first
/// colon. Lines without a colon are ignored.
pub fn parse_form(text: &str) -> ParsedRecord {
    let mut record = ParsedRecord::new();
    for line in text.lines() {
        if let Some((field, value)) = line.split_once(':') {
            record.insert(field, value);
        }
    }
    record
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn form(id: &str, base: &str, fields: &[&str]) -> FormTemplate {
    FormTemplate {
        id: id.to_string(),
        base: base.to_string(),
        preset: vec![],
        fields: strings(fields),
        mandatory: strings(fields),
    }
}

const BANK_FIELDS: &[&str] = &[
    "TELEFONO", "CODIGO", "CEDULA", "MONTO", "USUARIO", "RETIRAR HASTA", "ID",
];

const GUAYAQUIL_FIELDS: &[&str] = &[
    "TELEFONO", "CLAVE RETIRO", "CLAVE ENVIO", "MONTO", "USUARIO", "RETIRAR HASTA", "ID",
];

const BANKS: &[(&str, &str, &[&str])] = &[
    ("PICHINCHA", "Pichincha", BANK_FIELDS),
    ("GUAYAQUIL", "Guayaquil", GUAYAQUIL_FIELDS),
    ("PACIFICO", "Pacifico", BANK_FIELDS),
    ("PRODUBANCO", "Produbanco", BANK_FIELDS),
];

fn default_catalog() -> (Vec<FormTemplate>, Vec<Command>) {
    let mut templates = vec![
        form("V", "V", &["CLIENTE", "BANCO", "NOMBRE", "VALOR", "USUARIO", "ID"]),
        form("G", "G", &["CATEGORIA", "DESCRIPCION", "VALOR", "MONEDA", "ID"]),
        form("C", "C", &["CREDITOS", "ID"]),
    ];

    let mut choices = Vec::with_capacity(BANKS.len());
    for (token, label, fields) in BANKS {
        let id = format!("CO_{}", token);
        let mut template = form(&id, "CO", fields);
        template.preset.push(PresetField {
            name: "BANCO".to_string(),
            value: label.to_string(),
        });
        templates.push(template);
        choices.push(Choice {
            token: token.to_string(),
            label: label.to_string(),
            template: id,
        });
    }

    let labels: Vec<&str> = BANKS.iter().map(|(_, label, _)| *label).collect();
    let commands = vec![
        Command {
            token: "V".into(),
            spec: CommandSpec::Form { template: "V".into() },
        },
        Command {
            token: "G".into(),
            spec: CommandSpec::Form { template: "G".into() },
        },
        Command {
            token: "C".into(),
            spec: CommandSpec::Form { template: "C".into() },
        },
        Command {
            token: "CO".into(),
            spec: CommandSpec::SubChoice {
                label: "Banco".into(),
                prompt: format!(
                    "¿De qué banco necesitas el formato? ({})",
                    labels.join(" / ")
                ),
                choices,
            },
        },
    ];

    (templates, commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_is_consistent() {
        let mut registry = TemplateRegistry::default();
        assert!(registry.build_index().is_ok());
        assert!(registry.template("co_pichincha").is_some());
        assert_eq!(registry.mandatory_fields("C").map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_render_lists_fields_with_colons() {
        let registry = TemplateRegistry::default();
        assert_eq!(registry.render("C").as_deref(), Some("CREDITOS:\nID:\n"));

        let bank = registry.render("CO_GUAYAQUIL").unwrap_or_default();
        assert!(bank.starts_with("BANCO: Guayaquil\nTELEFONO:\nCLAVE RETIRO:\n"));
        assert!(bank.ends_with("ID:\n"));
    }

    #[test]
    fn test_parse_form_splits_on_first_colon() {
        let record = parse_form("banco: Pichincha\n  retirar hasta : 10:30 \nsin separador\nID: f");
        assert_eq!(record.get("BANCO"), Some("Pichincha"));
        assert_eq!(record.get("RETIRAR HASTA"), Some("10:30"));
        assert_eq!(record.get("ID"), Some("f"));
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_missing_id_is_reported_before_other_fields() {
        let registry = TemplateRegistry::default();
        let record = parse_form("CREDITOS:\nID:");
        assert!(matches!(
            registry.validate("C", &record),
            Err(LedgerError::MissingIdentifier)
        ));
    }

    #[test]
    fn test_missing_mandatory_fields_in_template_order() {
        let registry = TemplateRegistry::default();
        let record = parse_form("TELEFONO: 0999\nUSUARIO: ana\nID: F");
        match registry.validate("CO_PICHINCHA", &record) {
            Err(LedgerError::MissingMandatoryFields(missing)) => {
                assert_eq!(missing, vec!["CODIGO", "CEDULA", "MONTO", "RETIRAR HASTA"]);
            }
            other => panic!("unexpected validation result: {:?}", other),
        }
    }

    #[test]
    fn test_complete_record_is_valid() {
        let registry = TemplateRegistry::default();
        let record = parse_form("CREDITOS: 50\nID: D");
        assert!(registry.validate("C", &record).is_ok());
    }

    #[test]
    fn test_resolve_choice() {
        let registry = TemplateRegistry::default();
        let template = registry.resolve_choice("CO", " pacifico ");
        assert_eq!(template.map(|t| t.id.as_str()).ok(), Some("CO_PACIFICO"));

        match registry.resolve_choice("CO", "Bolivariano") {
            Err(LedgerError::InvalidSubChoice { label, choices }) => {
                assert_eq!(label, "Banco");
                assert_eq!(choices.len(), 4);
            }
            other => panic!("unexpected choice result: {:?}", other),
        }
    }

    #[test]
    fn test_help_lists_commands() {
        let registry = TemplateRegistry::default();
        assert_eq!(
            registry.help_text(),
            "❌ No entendí tu mensaje.\nEscribe: V, G, C o CO."
        );
    }

    #[test]
    fn test_dangling_template_reference_is_rejected() {
        let result = TemplateRegistry::new(
            vec![],
            vec![Command {
                token: "X".into(),
                spec: CommandSpec::Form { template: "missing".into() },
            }],
        );
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }
}
