//! Certificate trust policy shared by the socket and HTTP clients.

use std::io;

use native_tls::TlsConnector;

/// How strictly server certificates are checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Validate certificates and hostnames against the system roots.
    Verify,
    /// Accept any certificate and hostname.
    #[default]
    AcceptInvalid,
}

impl TrustPolicy {
    pub fn from_accept_invalid(accept_invalid: bool) -> Self {
        if accept_invalid {
            Self::AcceptInvalid
        } else {
            Self::Verify
        }
    }

    /// Build a connector honouring this policy.
    pub fn connector(self) -> io::Result<TlsConnector> {
        let mut builder = TlsConnector::builder();
        if self == Self::AcceptInvalid {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        builder.build().map_err(io::Error::other)
    }
}
