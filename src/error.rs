#[derive(Debug)]
pub enum TodoError {
    /// Malformed persisted JSON, timestamp or color.
    Format(String),
    StoreUnavailable(String),
    PermissionDenied(String),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl TodoError {
    pub fn format<M: Into<String>>(message: M) -> Self {
        Self::Format(message.into())
    }

    pub fn store_unavailable<M: Into<String>>(message: M) -> Self {
        Self::StoreUnavailable(message.into())
    }

    pub fn permission_denied<M: Into<String>>(message: M) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Format(_) | Self::Json(_) => "format_error",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Io(_) => "io_error",
        }
    }
}

impl std::fmt::Display for TodoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TodoError::Format(message) => write!(f, "format error: {message}"),
            TodoError::StoreUnavailable(message) => write!(f, "store unavailable: {message}"),
            TodoError::PermissionDenied(message) => write!(f, "permission denied: {message}"),
            TodoError::Io(err) => write!(f, "io error: {err}"),
            TodoError::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for TodoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TodoError::Io(err) => Some(err),
            TodoError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TodoError {
    fn from(value: std::io::Error) -> Self {
        TodoError::Io(value)
    }
}

impl From<serde_json::Error> for TodoError {
    fn from(value: serde_json::Error) -> Self {
        TodoError::Json(value)
    }
}
