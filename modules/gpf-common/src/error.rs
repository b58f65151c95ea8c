use thiserror::Error;

pub type Result<T> = std::result::Result<T, GpfError>;

/// Error taxonomy of the SDK. Low layers (auth, requester) produce the
/// HTTP-shaped variants; actions and the workflow driver translate them only
/// when the message gains context.
#[derive(Debug, Error)]
pub enum GpfError {
    /// Token acquisition exhausted its attempts or the credentials are invalid.
    #[error("{0}")]
    Authentification(String),

    /// The route table does not define the requested route name.
    #[error("La route '{route_name}' est absente de la section [routing] de la configuration. Contactez le support.")]
    RouteNotFound { route_name: String },

    /// HTTP 404.
    #[error("L'entité demandée n'existe pas sur l'Entrepôt ({url})")]
    NotFound { url: String },

    /// HTTP 409. Carries the response body text.
    #[error("La requête envoyée à l'Entrepôt génère un conflit : {message}")]
    Conflict { message: String },

    /// HTTP 400, with the server message when one was provided.
    #[error("La requête formulée par le programme est incorrecte ({message}). Contactez le support.")]
    BadRequest { message: String },

    /// Any other SDK-level problem: retry exhaustion, unreachable server,
    /// malformed URL, unexpected server shape.
    #[error("{0}")]
    Sdk(String),

    /// An action precondition failed or the reconciliation state machine
    /// rejected the selected behavior.
    #[error("{0}")]
    StepAction(String),

    /// The workflow document is malformed or references unknown steps/actions.
    #[error("{0}")]
    Workflow(String),

    /// The user interrupted a monitoring loop; raised after the abort/cleanup
    /// protocol has completed so callers can exit cleanly.
    #[error("Interruption demandée par l'utilisateur")]
    Interrupted,
}

impl GpfError {
    pub fn sdk(message: impl Into<String>) -> Self {
        GpfError::Sdk(message.into())
    }

    pub fn step_action(message: impl Into<String>) -> Self {
        GpfError::StepAction(message.into())
    }

    pub fn workflow(message: impl Into<String>) -> Self {
        GpfError::Workflow(message.into())
    }
}
