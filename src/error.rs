#[derive(Debug, Clone)]
pub enum ConductorError {
    Transient(String),
    Permanent(String),
}

impl ConductorError {
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        Self::Transient(msg.into())
    }
    pub fn permanent<S: Into<String>>(msg: S) -> Self {
        Self::Permanent(msg.into())
    }
    pub fn is_transient(&self) -> bool {
        matches!(self, ConductorError::Transient(_))
    }
    pub fn message(&self) -> &str {
        match self {
            ConductorError::Transient(s) | ConductorError::Permanent(s) => s.as_str(),
        }
    }
}

/// Transient probe failures are retried with backoff; permanent ones fail the
/// task immediately.
pub fn classify_probe_error<E: std::fmt::Display>(e: &E) -> ConductorError {
    let s = e.to_string();
    if s.contains("connect") || s.contains("timeout") || s.contains("broken pipe") {
        ConductorError::transient(s)
    } else {
        ConductorError::permanent(s)
    }
}
