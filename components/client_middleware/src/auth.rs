//! Authentication middleware
//!
//! Selects the auth flow for a call and drives it. Sits outside the
//! redirect middleware in the standard stack.

use std::sync::Arc;

use auth_flows::{AuthFunction, BasicAuth, Credentials, DigestAuth, DigestFlow, DigestStep};
use client_errors::ClientResult;
use client_types::{Request, Response};
use tracing::debug;
use url::Url;

enum AuthKind {
    Passthrough,
    Basic(BasicAuth),
    Function(AuthFunction),
    Digest {
        auth: Arc<DigestAuth>,
        flow: Option<DigestFlow>,
    },
}

/// Middleware that applies the effective authentication for a call
pub struct AuthMiddleware {
    kind: AuthKind,
}

impl AuthMiddleware {
    /// Resolve the auth flow for a request
    ///
    /// Selection order: explicit credentials, then URL userinfo, then a
    /// pre-resolved netrc entry, then passthrough.
    pub fn select(
        credentials: Option<Credentials>,
        request_url: &Url,
        netrc_credentials: Option<(String, String)>,
    ) -> Self {
        let kind = match credentials {
            Some(Credentials::Basic { username, password }) => {
                AuthKind::Basic(BasicAuth::new(&username, &password))
            }
            Some(Credentials::Function(func)) => AuthKind::Function(func),
            Some(Credentials::Digest(auth)) => AuthKind::Digest { auth, flow: None },
            None => {
                if let Some(basic) = BasicAuth::from_url(request_url) {
                    AuthKind::Basic(basic)
                } else if let Some((username, password)) = netrc_credentials {
                    debug!("using netrc credentials for {}", request_url);
                    AuthKind::Basic(BasicAuth::new(&username, &password))
                } else {
                    AuthKind::Passthrough
                }
            }
        };
        Self { kind }
    }
}

impl super::Middleware for AuthMiddleware {
    fn start(&mut self, mut request: Request) -> ClientResult<super::Action> {
        match &mut self.kind {
            AuthKind::Passthrough => Ok(super::Action::Send(request)),
            AuthKind::Basic(basic) => {
                basic.apply(&mut request);
                Ok(super::Action::Send(request))
            }
            AuthKind::Function(func) => Ok(super::Action::Send(func(request)?)),
            AuthKind::Digest { auth, flow } => {
                // The replay check happens before the first send.
                *flow = Some(DigestFlow::begin(auth.clone(), &request)?);
                Ok(super::Action::Send(request))
            }
        }
    }

    fn on_response(&mut self, response: Response) -> ClientResult<super::Action> {
        match &mut self.kind {
            AuthKind::Digest {
                flow: Some(flow), ..
            } => match flow.on_response(response)? {
                DigestStep::Retry(request) => Ok(super::Action::Send(request)),
                DigestStep::Finished(response) => Ok(super::Action::Return(response)),
            },
            _ => Ok(super::Action::Return(response)),
        }
    }
}
