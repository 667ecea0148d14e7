//! Redirect following
//!
//! Follows 301/302/303/307/308 responses, transforming method and body
//! per legacy browser conventions, carrying cookies between hops, and
//! enforcing loop and hop limits.

use std::collections::HashSet;

use client_cookies::SharedCookieJar;
use client_errors::{ClientError, ClientResult};
use client_types::{Request, RequestBody, Response};
use http::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION, PROXY_AUTHORIZATION,
    TRANSFER_ENCODING,
};
use http::{Extensions, Method, StatusCode};
use tracing::debug;
use url::Url;

/// Middleware that follows redirect responses
///
/// Every intermediate response is recorded on the final response's
/// `history`, oldest first. Cookies set by intermediate responses go into
/// the shared jar and are re-applied to each next hop.
pub struct RedirectMiddleware {
    allow_redirects: bool,
    max_redirects: usize,
    cookies: SharedCookieJar,
    history: Vec<Response>,
    visited: HashSet<(Method, Url)>,
    hops: usize,
    // Replay source for the body of the most recent sub-request, when the
    // body was replayable. 307/308 need it to re-send the body.
    current_body: Option<RequestBody>,
}

impl RedirectMiddleware {
    /// Create the middleware for one client call
    pub fn new(allow_redirects: bool, max_redirects: usize, cookies: SharedCookieJar) -> Self {
        Self {
            allow_redirects,
            max_redirects,
            cookies,
            history: Vec::new(),
            visited: HashSet::new(),
            hops: 0,
            current_body: None,
        }
    }

    /// Build the follow-up request for a redirect response
    ///
    /// Fails with `NotRedirectResponse` when the response is not a
    /// followable redirect.
    fn build_redirect(&mut self, response: &Response) -> ClientResult<Request> {
        if !response.is_redirect() {
            return Err(ClientError::NotRedirectResponse);
        }

        let previous = response.request();
        let location = response
            .headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ClientError::Protocol("Redirect Location header is not valid ASCII".to_string())
            })?;
        let url = previous
            .url
            .join(location)
            .map_err(|error| ClientError::InvalidUrl(format!("bad Location: {}", error)))?;

        let method = redirect_method(response.status, &previous.method);
        let drops_body = method != previous.method || response.status == StatusCode::SEE_OTHER;

        let body = if drops_body {
            RequestBody::empty()
        } else {
            match &self.current_body {
                Some(body) => body.replay()?,
                None => return Err(ClientError::RedirectBodyUnavailable),
            }
        };

        let mut headers = previous.headers.clone();
        headers.remove(HOST);
        headers.remove(COOKIE);
        if drops_body {
            headers.remove(CONTENT_LENGTH);
            headers.remove(CONTENT_TYPE);
            headers.remove(TRANSFER_ENCODING);
        }
        if !same_authority(&previous.url, &url) {
            headers.remove(AUTHORIZATION);
            headers.remove(PROXY_AUTHORIZATION);
        }

        let mut request = Request {
            method,
            url,
            headers,
            body,
            extensions: Extensions::new(),
        };
        request.prepare()?;
        self.cookies
            .apply_to_request(&request.url, &mut request.headers);
        Ok(request)
    }

    fn note_request(&mut self, request: &Request) -> ClientResult<()> {
        self.current_body = if request.body.can_replay() {
            Some(request.body.replay()?)
        } else {
            None
        };
        Ok(())
    }
}

impl super::Middleware for RedirectMiddleware {
    fn start(&mut self, request: Request) -> ClientResult<super::Action> {
        self.visited
            .insert((request.method.clone(), request.url.clone()));
        self.note_request(&request)?;
        Ok(super::Action::Send(request))
    }

    fn on_response(&mut self, mut response: Response) -> ClientResult<super::Action> {
        self.cookies
            .extract_from_response(&response.request().url, &response.headers);

        if !self.allow_redirects || !response.is_redirect() {
            response.history = std::mem::take(&mut self.history);
            return Ok(super::Action::Return(response));
        }

        if self.hops >= self.max_redirects {
            return Err(ClientError::TooManyRedirects);
        }
        self.hops += 1;

        let next = self.build_redirect(&response)?;
        if !self
            .visited
            .insert((next.method.clone(), next.url.clone()))
        {
            return Err(ClientError::RedirectLoop);
        }

        debug!(
            status = response.status.as_u16(),
            location = %next.url,
            hop = self.hops,
            "following redirect"
        );

        self.note_request(&next)?;
        self.history.push(response);
        Ok(super::Action::Send(next))
    }
}

/// The method for the follow-up request
///
/// 301/302 on POST and 303 on any method downgrade to GET; 307/308
/// preserve the method.
fn redirect_method(status: StatusCode, method: &Method) -> Method {
    match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND if *method == Method::POST => Method::GET,
        StatusCode::SEE_OTHER => Method::GET,
        _ => method.clone(),
    }
}

fn same_authority(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
}
