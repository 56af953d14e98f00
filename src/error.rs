//! Error types for the chat ledger

use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {

    // =============================
    // Conversation Errors
    // =============================

    #[error("Sender not authorized")]
    Unauthorized,

    #[error("Invalid {label} choice, expected one of {choices:?}")]
    InvalidSubChoice { label: String, choices: Vec<String> },

    #[error("Record is missing the ID field")]
    MissingIdentifier,

    #[error("Record is missing mandatory fields: {0:?}")]
    MissingMandatoryFields(Vec<String>),

    // =============================
    // Routing Errors
    // =============================

    #[error("No destination configured for {0}")]
    UnresolvedDestination(String),

    #[error("Unknown message prefix, expected one of {0:?}")]
    UnknownPrefix(Vec<String>),

    #[error("Destination not present in the sink: {0}")]
    UnknownDestination(String),

    // =============================
    // Collaborator Errors
    // =============================

    #[error("Upload failed: {0}")]
    UploadFailure(String),

    #[error("Append failed: {0}")]
    SinkFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Text sent back to the sender when handling stops on this error.
    pub fn reply_text(&self) -> String {
        match self {
            LedgerError::Unauthorized => "❌ No autorizado.".to_string(),
            LedgerError::InvalidSubChoice { label, choices } => {
                format!("❌ {} no válido. Usa: {}.", label, choices.join(", "))
            }
            LedgerError::MissingIdentifier => "❌ Falta el campo obligatorio ID.".to_string(),
            LedgerError::MissingMandatoryFields(fields) => {
                let list = fields
                    .iter()
                    .map(|f| format!("• {}", f))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("❌ Faltan campos obligatorios:\n{}", list)
            }
            LedgerError::UnresolvedDestination(key) => {
                format!("❌ Hoja destino no encontrada: {}", key)
            }
            LedgerError::UnknownDestination(name) => {
                format!("❌ Hoja destino no encontrada: {}", name)
            }
            LedgerError::UnknownPrefix(prefixes) => {
                format!("❌ Prefijo no reconocido. Usa: {}.", prefixes.join(", "))
            }
            LedgerError::UploadFailure(_) => {
                "⚠️ No se pudo subir el archivo adjunto.".to_string()
            }
            LedgerError::SinkFailure(reason) => {
                format!("❌ No se pudo registrar: {}", reason)
            }
            LedgerError::Config(_)
            | LedgerError::Serialization(_)
            | LedgerError::Http(_)
            | LedgerError::Io(_) => "❌ Error interno. Intenta de nuevo.".to_string(),
        }
    }
}
