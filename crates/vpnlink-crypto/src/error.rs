//! Certificate error types.

/// Errors from certificate generation and inspection.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// An error occurred during key or certificate generation.
    #[error("Certificate generation error: {0}")]
    Generation(String),

    #[error("common name must not be empty")]
    EmptyCommonName,

    #[error("no CERTIFICATE block found in PEM data")]
    NoCertificate,

    #[error("Certificate parse error: {0}")]
    Parse(String),
}
