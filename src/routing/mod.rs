//! Destination routing
//!
//! One strategy is active per deployment, selected from configuration:
//!
//! - `suffix_coded`: form base code + the record's `ID` letter → one sheet
//! - `prefix_coded`: leading token of the message → one sheet
//! - `mode_toggle`: per-sender persistent flag picks one of two sheets
//! - `static_fan_out`: sender → every sheet in its list

use crate::error::LedgerError;
use crate::models::{ParsedRecord, RoutingDecision, Sender};
use crate::templates::ID_FIELD;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixRoute {
    pub base: String,
    pub suffix: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRoute {
    pub prefix: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOption {
    pub code: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeToggle {
    /// Senders allowed to switch their flag.
    pub privileged: Vec<Sender>,
    pub options: Vec<ToggleOption>,
    /// Flag value for senders who never switched.
    pub default_code: String,
    /// Senders that ignore the flag entirely.
    #[serde(default)]
    pub bypass: Vec<Sender>,
    #[serde(default)]
    pub bypass_destination: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutRoute {
    pub sender: Sender,
    pub destinations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RoutingStrategy {
    SuffixCoded { table: Vec<SuffixRoute> },
    PrefixCoded { table: Vec<PrefixRoute> },
    ModeToggle(ModeToggle),
    StaticFanOut { table: Vec<FanOutRoute> },
}

impl Default for RoutingStrategy {
    fn default() -> Self {
        let mut table = Vec::new();
        for (base, name) in [("V", "INGRESOS"), ("G", "GASTOS"), ("C", "CREDITOS"), ("CO", "CODIGOS")] {
            for suffix in ["F", "D"] {
                table.push(SuffixRoute {
                    base: base.to_string(),
                    suffix: suffix.to_string(),
                    destination: format!("{}_{}", name, suffix),
                });
            }
        }
        RoutingStrategy::SuffixCoded { table }
    }
}

/// What the engine knows about the message besides the record itself.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    /// Base code of the form being submitted.
    pub base: Option<String>,
    /// Prefix token the message started with.
    pub prefix: Option<String>,
    /// Sender's mode-toggle flag, if ever set.
    pub toggle: Option<String>,
}

/// A matched prefix and the message text after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatch<'a> {
    pub prefix: String,
    pub rest: &'a str,
}

const PREFIX_SEPARATORS: &[char] = &[':', '-', '.', ','];

/// Routing policy
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    strategy: RoutingStrategy,
}

impl RoutingPolicy {
    pub fn new(strategy: RoutingStrategy) -> Result<Self> {
        let empty = match &strategy {
            RoutingStrategy::SuffixCoded { table } => table.is_empty(),
            RoutingStrategy::PrefixCoded { table } => table.is_empty(),
            RoutingStrategy::ModeToggle(toggle) => {
                if toggle.options.len() != 2 {
                    return Err(LedgerError::Config(
                        "mode_toggle needs exactly two options".to_string(),
                    ));
                }
                if toggle.option(&toggle.default_code).is_none() {
                    return Err(LedgerError::Config(format!(
                        "mode_toggle default {} is not one of its options",
                        toggle.default_code
                    )));
                }
                if !toggle.bypass.is_empty() && toggle.bypass_destination.is_none() {
                    return Err(LedgerError::Config(
                        "mode_toggle bypass senders need a bypass_destination".to_string(),
                    ));
                }
                false
            }
            RoutingStrategy::StaticFanOut { table } => {
                table.is_empty() || table.iter().any(|r| r.destinations.is_empty())
            }
        };

        if empty {
            return Err(LedgerError::Config(
                "routing table must not be empty".to_string(),
            ));
        }

        Ok(Self { strategy })
    }

    pub fn strategy(&self) -> &RoutingStrategy {
        &self.strategy
    }

    /// Suffix-coded deployments collect records through multi-turn forms;
    /// every other strategy takes one-shot free text.
    pub fn is_form_driven(&self) -> bool {
        matches!(self.strategy, RoutingStrategy::SuffixCoded { .. })
    }

    /// Every destination the configuration can produce.
    pub fn destinations(&self) -> Vec<String> {
        let mut out: Vec<String> = match &self.strategy {
            RoutingStrategy::SuffixCoded { table } => {
                table.iter().map(|r| r.destination.clone()).collect()
            }
            RoutingStrategy::PrefixCoded { table } => {
                table.iter().map(|r| r.destination.clone()).collect()
            }
            RoutingStrategy::ModeToggle(toggle) => toggle
                .options
                .iter()
                .map(|o| o.destination.clone())
                .chain(toggle.bypass_destination.clone())
                .collect(),
            RoutingStrategy::StaticFanOut { table } => table
                .iter()
                .flat_map(|r| r.destinations.iter().cloned())
                .collect(),
        };
        out.sort();
        out.dedup();
        out
    }

    /// Only prefix-coded routing splits the message. The leading alphabetic
    /// token must equal a configured prefix; one separator after it is dropped.
    pub fn split_prefix<'a>(&self, body: &'a str) -> Result<Option<PrefixMatch<'a>>> {
        let RoutingStrategy::PrefixCoded { table } = &self.strategy else {
            return Ok(None);
        };

        let body = body.trim_start();
        let token_len: usize = body
            .chars()
            .take_while(|c| c.is_alphabetic())
            .map(char::len_utf8)
            .sum();
        let token = &body[..token_len];

        let Some(route) = table
            .iter()
            .find(|r| !token.is_empty() && r.prefix.eq_ignore_ascii_case(token))
        else {
            return Err(LedgerError::UnknownPrefix(
                table.iter().map(|r| r.prefix.to_uppercase()).collect(),
            ));
        };

        let rest = body[token_len..].trim_start();
        let rest = rest.strip_prefix(PREFIX_SEPARATORS).unwrap_or(rest).trim();

        Ok(Some(PrefixMatch {
            prefix: route.prefix.to_uppercase(),
            rest,
        }))
    }

    /// A privileged sender's one-letter switch command, normalized to the option code.
    pub fn toggle_code(&self, sender: &Sender, body: &str) -> Option<String> {
        let RoutingStrategy::ModeToggle(toggle) = &self.strategy else {
            return None;
        };
        if !toggle.privileged.contains(sender) {
            return None;
        }
        toggle.option(body.trim()).map(|o| o.code.to_uppercase())
    }

    /// Destination a toggle code points at.
    pub fn toggle_destination(&self, code: &str) -> Option<&str> {
        match &self.strategy {
            RoutingStrategy::ModeToggle(toggle) => {
                toggle.option(code).map(|o| o.destination.as_str())
            }
            _ => None,
        }
    }

    pub fn resolve(
        &self,
        sender: &Sender,
        record: &ParsedRecord,
        context: &RouteContext,
    ) -> Result<RoutingDecision> {
        match &self.strategy {
            RoutingStrategy::SuffixCoded { table } => {
                let base = context.base.as_deref().ok_or_else(|| {
                    LedgerError::UnresolvedDestination("form without base code".to_string())
                })?;
                let suffix = record.get(ID_FIELD).unwrap_or_default();

                table
                    .iter()
                    .find(|r| {
                        r.base.eq_ignore_ascii_case(base) && r.suffix.eq_ignore_ascii_case(suffix)
                    })
                    .map(|r| RoutingDecision::single(r.destination.clone()))
                    .ok_or_else(|| {
                        LedgerError::UnresolvedDestination(format!(
                            "{} / ID {}",
                            base.to_uppercase(),
                            suffix.to_uppercase()
                        ))
                    })
            }

            RoutingStrategy::PrefixCoded { table } => {
                let prefix = context.prefix.as_deref().unwrap_or_default();
                table
                    .iter()
                    .find(|r| !prefix.is_empty() && r.prefix.eq_ignore_ascii_case(prefix))
                    .map(|r| RoutingDecision::single(r.destination.clone()))
                    .ok_or_else(|| {
                        LedgerError::UnknownPrefix(
                            table.iter().map(|r| r.prefix.to_uppercase()).collect(),
                        )
                    })
            }

            RoutingStrategy::ModeToggle(toggle) => {
                if toggle.bypass.contains(sender) {
                    return toggle
                        .bypass_destination
                        .clone()
                        .map(RoutingDecision::single)
                        .ok_or_else(|| {
                            LedgerError::UnresolvedDestination("bypass".to_string())
                        });
                }

                let code = if toggle.privileged.contains(sender) {
                    context.toggle.as_deref().unwrap_or(toggle.default_code.as_str())
                } else {
                    toggle.default_code.as_str()
                };

                toggle
                    .option(code)
                    .map(|o| RoutingDecision::single(o.destination.clone()))
                    .ok_or_else(|| LedgerError::UnresolvedDestination(format!("modo {}", code)))
            }

            RoutingStrategy::StaticFanOut { table } => table
                .iter()
                .find(|r| r.sender == *sender)
                .filter(|r| !r.destinations.is_empty())
                .map(|r| RoutingDecision::fan_out(r.destinations.clone()))
                .ok_or_else(|| LedgerError::UnresolvedDestination(sender.to_string())),
        }
    }
}

impl ModeToggle {
    fn option(&self, code: &str) -> Option<&ToggleOption> {
        self.options
            .iter()
            .find(|o| o.code.eq_ignore_ascii_case(code))
    }
}
