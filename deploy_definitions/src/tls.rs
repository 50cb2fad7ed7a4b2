use chrono::{DateTime, Utc};

/// CA + leaf material, either loaded or freshly generated. Owned
/// exclusively by the TLS manager; everywhere else it is read-only.
#[derive(Clone)]
pub struct TlsMaterial {
    pub ca_cert: String,
    pub ca_key: String,
    pub leaf_cert: String,
    pub leaf_key: String,
    pub acquired: DateTime<Utc>,
}

impl std::fmt::Debug for TlsMaterial {
    /// PEM material never belongs in a log line or a `Debug` dump of an
    /// error chain; only the acquisition time is printed.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("acquired", &self.acquired)
            .finish()
    }
}
