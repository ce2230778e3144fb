/// Crate level error for callers that do not care which component failed.
#[derive(Debug, thiserror::Error)]
pub enum NsinitError {
    #[error(transparent)]
    Signal(#[from] crate::signal::SignalError),
    #[error(transparent)]
    Supervisor(#[from] crate::supervisor::SupervisorError),
    #[error(transparent)]
    Namespace(#[from] crate::namespaces::NamespaceError),
    #[error(transparent)]
    Foreground(#[from] crate::foreground::ForegroundError),
}
