//! Message engine - one inbound message in, one reply out
//!
//! AUTHORIZE → COMMAND? → FORM | FREE TEXT → ROUTE → UPLOAD → APPEND → REPLY
//!
//! Per-sender state is only touched under that sender's lock. The lock is
//! released once the routing decision is taken and the state transition is
//! committed; uploads and appends run without it.

use crate::classifier::CategoryClassifier;
use crate::config::Config;
use crate::error::LedgerError;
use crate::models::{
    InboundMessage, Mode, ParsedRecord, RoutingDecision, Sender, FREE_TEXT_FIELDS,
};
use crate::money;
use crate::routing::{RouteContext, RoutingPolicy};
use crate::sinks::{BlobStore, DisabledBlobStore, HttpBlobStore, HttpSink, InMemorySink, Sink};
use crate::state::{InMemoryStateStore, StateStore};
use crate::templates::{parse_form, CommandSpec, TemplateRegistry};
use crate::Result;
use chrono::Local;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extra field carrying the attachment link on form records.
pub const FORM_MEDIA_FIELD: &str = "COMPROBANTE";

/// Everything the engine decides with; built once from configuration.
pub struct EngineSettings {
    pub allowed_senders: HashSet<Sender>,
    pub templates: TemplateRegistry,
    pub classifier: CategoryClassifier,
    pub routing: RoutingPolicy,
    /// Bound on each sink and blob call.
    pub external_timeout: Duration,
}

/// Main engine that coordinates state, parsing, routing and the collaborators
pub struct LedgerEngine {
    settings: EngineSettings,
    state_store: Arc<dyn StateStore>,
    sink: Arc<dyn Sink>,
    blobs: Arc<dyn BlobStore>,
}

impl LedgerEngine {
    pub fn new(
        settings: EngineSettings,
        state_store: Arc<dyn StateStore>,
        sink: Arc<dyn Sink>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            settings,
            state_store,
            sink,
            blobs,
        }
    }

    /// Wires collaborators from configuration: HTTP bridges when their URLs
    /// are set, otherwise an in-memory sink and no uploads.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = config.engine_settings()?;
        let state_store = Arc::new(InMemoryStateStore::with_ttl(config.state_ttl));

        let sink: Arc<dyn Sink> = match &config.sink_url {
            Some(url) => {
                info!(url = %url, "Using HTTP sink");
                Arc::new(HttpSink::new(url, config.external_timeout)?)
            }
            None => {
                warn!("LEDGER_SINK_URL not set, rows are kept in memory");
                Arc::new(InMemorySink::new(settings.routing.destinations()))
            }
        };

        let blobs: Arc<dyn BlobStore> = match &config.blob_url {
            Some(url) => Arc::new(HttpBlobStore::new(url, config.external_timeout)?),
            None => Arc::new(DisabledBlobStore),
        };

        Ok(Self::new(settings, state_store, sink, blobs))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Handle one inbound message. Always exactly one reply; errors become
    /// reply text.
    pub async fn handle(&self, message: InboundMessage) -> String {
        let message_id = Uuid::new_v4();

        info!(
            %message_id,
            sender = %message.sender,
            has_media = message.media_url.is_some(),
            "Engine: message received"
        );

        match self.process(&message, message_id).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    %message_id,
                    sender = %message.sender,
                    error = %e,
                    "Engine: message rejected"
                );
                e.reply_text()
            }
        }
    }

    async fn process(&self, message: &InboundMessage, message_id: Uuid) -> Result<String> {
        // Checked before any state is read or parsed.
        if !self.settings.allowed_senders.contains(&message.sender) {
            return Err(LedgerError::Unauthorized);
        }

        if self.settings.routing.is_form_driven() {
            self.handle_form_flow(message, message_id).await
        } else {
            self.handle_free_text(message, message_id).await
        }
    }

    // =============================
    // Template-driven flow
    // =============================

    async fn handle_form_flow(&self, message: &InboundMessage, message_id: Uuid) -> Result<String> {
        let sender = &message.sender;
        let body = message.body.trim();
        let templates = &self.settings.templates;

        let guard = self.state_store.lock(sender).await;
        let mut state = self.state_store.get(sender).await?;

        // === COMMAND === (replaces whatever flow was active)
        if let Some(command) = templates.command(body) {
            let reply = match &command.spec {
                CommandSpec::Form { template } => {
                    state.mode = Mode::AwaitingForm {
                        template_id: template.clone(),
                    };
                    templates.render(template).ok_or_else(|| {
                        LedgerError::Config(format!("unknown template {}", template))
                    })?
                }
                CommandSpec::SubChoice { prompt, .. } => {
                    state.mode = Mode::AwaitingSubChoice {
                        command: command.token.clone(),
                    };
                    prompt.clone()
                }
            };

            debug!(%message_id, sender = %sender, mode = ?state.mode, "Command accepted");
            self.state_store.set(sender, state).await?;
            return Ok(reply);
        }

        let template_id = match state.mode.clone() {
            Mode::Idle => return Ok(templates.help_text()),

            // === SUB-CHOICE ===
            Mode::AwaitingSubChoice { command } => {
                let template = self
                    .keep_alive(sender, templates.resolve_choice(&command, body))
                    .await?;
                state.mode = Mode::AwaitingForm {
                    template_id: template.id.clone(),
                };
                debug!(%message_id, sender = %sender, template = %template.id, "Sub-choice resolved");
                self.state_store.set(sender, state).await?;
                return Ok(template.render());
            }

            Mode::AwaitingForm { template_id } => template_id,
        };

        // === FORM === (a rejected submission keeps the form, and its clock)
        let mut record = parse_form(body);
        let context = RouteContext {
            base: templates.template(&template_id).map(|t| t.base.clone()),
            ..RouteContext::default()
        };
        let decision = templates
            .validate(&template_id, &record)
            .and_then(|_| self.settings.routing.resolve(sender, &record, &context));
        let decision = self.keep_alive(sender, decision).await?;

        self.state_store.clear(sender).await?;
        drop(guard);

        if let Some(url) = media_url(message) {
            let link = self.media_link(url, message_id).await;
            record.insert(FORM_MEDIA_FIELD, &link);
        }

        match self.deliver(&decision, &record.labelled_row(), message_id).await {
            Ok(delivered) => Ok(format!("✅ Registro exitoso en {}", bold_list(&delivered))),
            Err(e) => {
                self.restore_form(sender, template_id).await;
                Err(e)
            }
        }
    }

    /// A sender answering a prompt, even wrongly, has not abandoned the flow.
    async fn keep_alive<T>(&self, sender: &Sender, result: Result<T>) -> Result<T> {
        if result.is_err() {
            if let Err(e) = self.state_store.touch(sender).await {
                warn!(sender = %sender, error = %e, "Could not refresh conversation");
            }
        }
        result
    }

    /// Puts a failed submission's form back, unless the sender already moved on.
    async fn restore_form(&self, sender: &Sender, template_id: String) {
        let _guard = self.state_store.lock(sender).await;

        let mut state = match self.state_store.get(sender).await {
            Ok(state) => state,
            Err(e) => {
                warn!(sender = %sender, error = %e, "Could not reload state to restore form");
                return;
            }
        };
        if state.mode != Mode::Idle {
            return;
        }

        state.mode = Mode::AwaitingForm { template_id };
        if let Err(e) = self.state_store.set(sender, state).await {
            warn!(sender = %sender, error = %e, "Could not restore form state");
        }
    }

    // =============================
    // Free-text flow
    // =============================

    async fn handle_free_text(&self, message: &InboundMessage, message_id: Uuid) -> Result<String> {
        let sender = &message.sender;
        let routing = &self.settings.routing;

        let (decision, mut record) = {
            let _guard = self.state_store.lock(sender).await;
            let mut state = self.state_store.get(sender).await?;

            // === TOGGLE ===
            if let Some(code) = routing.toggle_code(sender, &message.body) {
                let destination = routing.toggle_destination(&code).unwrap_or_default().to_string();
                state.toggle = Some(code.clone());
                self.state_store.set(sender, state).await?;

                info!(%message_id, sender = %sender, code = %code, "Routing mode switched");
                return Ok(format!(
                    "✅ Modo {} activado. Los registros irán a *{}*",
                    code, destination
                ));
            }

            // === PARSE ===
            let (prefix, text) = match routing.split_prefix(&message.body)? {
                Some(matched) => (Some(matched.prefix), matched.rest),
                None => (None, message.body.trim()),
            };
            let record = self.free_text_record(sender, text);

            // === ROUTE ===
            let context = RouteContext {
                prefix,
                toggle: state.toggle.clone(),
                ..RouteContext::default()
            };
            (routing.resolve(sender, &record, &context)?, record)
        };

        if let Some(url) = media_url(message) {
            let link = self.media_link(url, message_id).await;
            record.insert("MEDIA_LINK", &link);
        }

        let delivered = self.deliver(&decision, &record.value_row(), message_id).await?;
        Ok(free_text_reply(&delivered, &record))
    }

    fn free_text_record(&self, sender: &Sender, text: &str) -> ParsedRecord {
        let extracted = money::extract(text);

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let values = [
            timestamp.as_str(),
            sender.as_str(),
            self.settings.classifier.classify(text),
            text,
            extracted.amount.as_deref().unwrap_or_default(),
            extracted.currency.unwrap_or_default(),
            "",
        ];

        let mut record = ParsedRecord::new();
        for (key, value) in FREE_TEXT_FIELDS.iter().zip(values) {
            record.insert(key, value);
        }
        record
    }

    // =============================
    // Collaborators
    // =============================

    /// An upload failure is logged and collapsed into an empty link; the
    /// record is still appended.
    async fn media_link(&self, url: &str, message_id: Uuid) -> String {
        match self.upload_media(url).await {
            Ok(link) => link,
            Err(e) => {
                warn!(%message_id, error = %e, "Media upload failed, recording empty link");
                String::new()
            }
        }
    }

    async fn upload_media(&self, url: &str) -> Result<String> {
        match timeout(self.settings.external_timeout, self.blobs.upload(url)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::UploadFailure(format!(
                "timed out after {:?}",
                self.settings.external_timeout
            ))),
        }
    }

    async fn sink_call<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.settings.external_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e @ (LedgerError::SinkFailure(_) | LedgerError::UnknownDestination(_)))) => {
                Err(e)
            }
            Ok(Err(e)) => Err(LedgerError::SinkFailure(e.to_string())),
            Err(_) => Err(LedgerError::SinkFailure(format!(
                "timed out after {:?}",
                self.settings.external_timeout
            ))),
        }
    }

    /// Appends `row` to every destination of the decision, one attempt each.
    /// Single-destination decisions fail as a whole; fan-out skips
    /// destinations the sink does not know or that fail, and reports the rest.
    async fn deliver(
        &self,
        decision: &RoutingDecision,
        row: &[String],
        message_id: Uuid,
    ) -> Result<Vec<String>> {
        let known = self.sink_call(self.sink.known_destinations()).await?;

        if !decision.partial {
            if let Some(missing) = decision.destinations.iter().find(|d| !known.contains(*d)) {
                return Err(LedgerError::UnknownDestination(missing.clone()));
            }
        }

        let mut delivered = Vec::with_capacity(decision.destinations.len());
        let mut last_error = None;

        for destination in &decision.destinations {
            if !known.contains(destination) {
                warn!(%message_id, destination = %destination, "Skipping destination unknown to the sink");
                last_error = Some(LedgerError::UnknownDestination(destination.clone()));
                continue;
            }

            match self.sink_call(self.sink.append(destination, row)).await {
                Ok(()) => {
                    info!(%message_id, destination = %destination, cells = row.len(), "Row appended");
                    delivered.push(destination.clone());
                }
                Err(e) if decision.partial => {
                    warn!(%message_id, destination = %destination, error = %e, "Fan-out append failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        if delivered.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                LedgerError::UnresolvedDestination("sin destinos".to_string())
            }));
        }

        Ok(delivered)
    }
}

fn media_url(message: &InboundMessage) -> Option<&str> {
    message
        .media_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
}

fn bold_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("*{}*", n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn free_text_reply(delivered: &[String], record: &ParsedRecord) -> String {
    let field = |key: &str| record.get(key).unwrap_or_default().to_string();

    let amount = match (field("AMOUNT"), field("CURRENCY")) {
        (amount, _) if amount.is_empty() => "sin monto".to_string(),
        (amount, currency) => format!("{} {}", amount, currency),
    };

    let mut reply = format!(
        "✅ Registro exitoso en {}\nCategoría: {}\nMonto: {}\nDescripción: {}",
        bold_list(delivered),
        field("CATEGORY"),
        amount,
        field("DESCRIPTION"),
    );

    let link = field("MEDIA_LINK");
    if !link.is_empty() {
        reply.push_str(&format!("\nComprobante: {}", link));
    }
    reply
}
