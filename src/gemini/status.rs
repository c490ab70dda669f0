//! Gemini response status codes

/// Two-digit Gemini status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Input,
    SensitiveInput,
    Success,
    RedirectTemporary,
    RedirectPermanent,
    TemporaryFailure,
    ServerUnavailable,
    CgiError,
    ProxyError,
    SlowDown,
    PermanentFailure,
    NotFound,
    Gone,
    ProxyRequestRefused,
    BadRequest,
    ClientCertificateRequired,
    CertificateNotAuthorised,
    CertificateNotValid,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Self::Input => 10,
            Self::SensitiveInput => 11,
            Self::Success => 20,
            Self::RedirectTemporary => 30,
            Self::RedirectPermanent => 31,
            Self::TemporaryFailure => 40,
            Self::ServerUnavailable => 41,
            Self::CgiError => 42,
            Self::ProxyError => 43,
            Self::SlowDown => 44,
            Self::PermanentFailure => 50,
            Self::NotFound => 51,
            Self::Gone => 52,
            Self::ProxyRequestRefused => 53,
            Self::BadRequest => 59,
            Self::ClientCertificateRequired => 60,
            Self::CertificateNotAuthorised => 61,
            Self::CertificateNotValid => 62,
        }
    }

    /// Response header line: `<code> <meta>\r\n`
    pub fn header(self, meta: &str) -> String {
        format!("{} {}\r\n", self.code(), meta)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
