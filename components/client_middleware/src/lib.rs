//! client_middleware component
//!
//! The middleware pipeline: an ordered chain of state machines that issue
//! sub-requests one at a time, observe each response, and eventually
//! return a final response.
//!
//! Auth and redirect flows need multiple network round-trips per client
//! call, so a middleware is not a simple function wrapper: it is driven
//! step by step, receiving the response to each sub-request it yielded.
//! Every sub-request yielded by an outer layer enters the inner layers
//! with fresh state, so a digest retry begins its own redirect flow.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

use std::future::Future;
use std::pin::Pin;

use client_cookies::SharedCookieJar;
use client_errors::ClientResult;
use client_types::{Request, Response, Timeout, Transport};

use auth_flows::Credentials;

mod auth;
mod redirect;

pub use auth::AuthMiddleware;
pub use redirect::RedirectMiddleware;

/// What a middleware wants the driver to do next
#[derive(Debug)]
pub enum Action {
    /// Feed this sub-request to the next inner layer
    Send(Request),
    /// The pipeline is finished; propagate this response outward
    Return(Response),
}

/// One layer of the pipeline, driven as a state machine
///
/// `start` receives the initial request; the response to every yielded
/// sub-request comes back through `on_response`. Failures travel as `Err`
/// and abort the whole call.
pub trait Middleware: Send {
    /// Begin the flow for a request
    fn start(&mut self, request: Request) -> ClientResult<Action>;

    /// Observe the response produced by the inner layers
    fn on_response(&mut self, response: Response) -> ClientResult<Action>;
}

/// Builds one middleware instance per sub-request entering its layer
pub type MiddlewareFactory = Box<dyn Fn() -> Box<dyn Middleware> + Send + Sync>;

/// The per-call context threaded through the pipeline
#[derive(Debug, Clone)]
pub struct Context {
    /// Whether redirect responses are followed
    pub allow_redirects: bool,
    /// Effective credentials for this call
    pub auth: Option<Credentials>,
    /// The client's shared cookie jar
    pub cookies: SharedCookieJar,
    /// Whether environment-derived configuration may be consulted
    pub trust_env: bool,
}

/// An ordered chain of middleware layers, outermost first
///
/// The stack holds factories rather than instances: layer state lives for
/// exactly one flow through that layer.
#[derive(Default)]
pub struct MiddlewareStack {
    factories: Vec<MiddlewareFactory>,
}

impl MiddlewareStack {
    /// An empty stack; driving it calls the transport directly
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer inside every previously added layer
    pub fn add(&mut self, factory: impl Fn() -> Box<dyn Middleware> + Send + Sync + 'static) {
        self.factories.push(Box::new(factory));
    }

    /// Drive the pipeline to completion against a transport
    ///
    /// Cancelling the returned future drops the in-flight response, which
    /// releases its connection lease; no further sub-requests are issued.
    pub async fn drive(
        &self,
        transport: &dyn Transport,
        request: Request,
        timeout: &Timeout,
    ) -> ClientResult<Response> {
        self.drive_from(0, transport, request, timeout).await
    }

    fn drive_from<'a>(
        &'a self,
        index: usize,
        transport: &'a dyn Transport,
        request: Request,
        timeout: &'a Timeout,
    ) -> Pin<Box<dyn Future<Output = ClientResult<Response>> + Send + 'a>> {
        Box::pin(async move {
            let Some(factory) = self.factories.get(index) else {
                return transport.send(request, timeout).await;
            };
            let mut layer = factory();
            let mut action = layer.start(request)?;
            loop {
                match action {
                    Action::Send(request) => {
                        let response = self
                            .drive_from(index + 1, transport, request, timeout)
                            .await?;
                        action = layer.on_response(response)?;
                    }
                    Action::Return(response) => return Ok(response),
                }
            }
        })
    }
}

/// Build the standard pipeline for one client call
///
/// Auth sits outside redirect so that a redirect to a different origin
/// begins a fresh auth flow. `netrc_credentials` is the pre-resolved
/// (user, password) entry for the request authority, when `trust_env`
/// allowed a netrc lookup.
pub fn build_stack(
    context: &Context,
    request_url: &url::Url,
    max_redirects: usize,
    netrc_credentials: Option<(String, String)>,
) -> MiddlewareStack {
    let mut stack = MiddlewareStack::new();

    let auth = context.auth.clone();
    let url = request_url.clone();
    let netrc = if context.trust_env {
        netrc_credentials
    } else {
        None
    };
    stack.add(move || Box::new(AuthMiddleware::select(auth.clone(), &url, netrc.clone())));

    let allow_redirects = context.allow_redirects;
    let cookies = context.cookies.clone();
    stack.add(move || {
        Box::new(RedirectMiddleware::new(
            allow_redirects,
            max_redirects,
            cookies.clone(),
        ))
    });

    stack
}
