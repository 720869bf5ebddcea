//! HTTP server for receiving UPnP event notifications.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use warp::http::{HeaderMap, Method, StatusCode};
use warp::Filter;

use crate::error::{CallbackServerError, Result};
use crate::router::{EventRouter, NotificationPayload};

/// Where the callback server listens and what address it advertises.
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Inclusive range of ports to try, in order. `(0, 0)` lets the OS pick.
    pub port_range: (u16, u16),
    /// Local interface to bind
    pub bind_ip: IpAddr,
    /// Address placed in callback URLs. Detected from the default route when
    /// `None`.
    pub advertised_ip: Option<IpAddr>,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            port_range: (3400, 3500),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertised_ip: None,
        }
    }
}

impl CallbackConfig {
    pub fn validate(&self) -> Result<()> {
        let (start, end) = self.port_range;
        if start > end {
            return Err(CallbackServerError::Configuration(format!(
                "port range start {start} is greater than end {end}"
            )));
        }
        if start == 0 && end != 0 {
            return Err(CallbackServerError::Configuration(
                "port 0 is only valid as the range (0, 0)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_port_range(mut self, start: u16, end: u16) -> Self {
        self.port_range = (start, end);
        self
    }

    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    pub fn with_advertised_ip(mut self, ip: IpAddr) -> Self {
        self.advertised_ip = Some(ip);
        self
    }
}

/// HTTP callback server for receiving UPnP event notifications.
///
/// Accepts `NOTIFY` on any path. Every request carrying a `SID` header is
/// acknowledged with `200 OK` and forwarded through the [`EventRouter`],
/// whether or not the subscription is known to the consumer.
///
/// # Example
///
/// ```no_run
/// use tokio::sync::mpsc;
/// use callback_server::{CallbackConfig, CallbackServer, NotificationPayload};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
///
///     let server = CallbackServer::start(CallbackConfig::default(), tx)
///         .await
///         .expect("Failed to start callback server");
///
///     println!("CALLBACK: <{}>", server.base_url());
///
///     while let Some(notification) = rx.recv().await {
///         println!("event for {}", notification.subscription_id);
///     }
/// }
/// ```
pub struct CallbackServer {
    local_addr: SocketAddr,
    base_url: String,
    router: Arc<EventRouter>,
    shutdown: Arc<Notify>,
    server_handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the first free port in the configured range and start serving.
    ///
    /// Fails if no port can be bound or, without an explicit
    /// `advertised_ip`, if the local address cannot be determined.
    pub async fn start(
        config: CallbackConfig,
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self> {
        config.validate()?;

        let advertised_ip = match config.advertised_ip {
            Some(ip) => ip,
            None => detect_local_ip().ok_or(CallbackServerError::LocalAddress)?,
        };

        let router = Arc::new(EventRouter::new(event_sender));
        let shutdown = Arc::new(Notify::new());
        let routes = notify_route(Arc::clone(&router)).recover(handle_rejection);

        let (start, end) = config.port_range;
        let mut last_error = String::new();

        for port in start..=end {
            let signal = {
                let shutdown = Arc::clone(&shutdown);
                async move { shutdown.notified().await }
            };

            match warp::serve(routes.clone())
                .try_bind_with_graceful_shutdown(SocketAddr::new(config.bind_ip, port), signal)
            {
                Ok((local_addr, server)) => {
                    let server_handle = tokio::spawn(server);
                    let base_url = format!(
                        "http://{}/",
                        SocketAddr::new(advertised_ip, local_addr.port())
                    );
                    info!(%local_addr, %base_url, "callback server listening");

                    return Ok(Self {
                        local_addr,
                        base_url,
                        router,
                        shutdown,
                        server_handle: Some(server_handle),
                    });
                }
                Err(e) => {
                    debug!(port, error = %e, "callback port unavailable");
                    last_error = e.to_string();
                }
            }
        }

        Err(CallbackServerError::NoAvailablePort {
            ip: config.bind_ip,
            start,
            end,
            last_error,
        })
    }

    /// URL to place in the `CALLBACK` header of subscriptions,
    /// e.g. `http://192.168.1.20:3400/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the port the server is bound to.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!(local_addr = %self.local_addr, "callback server stopped");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if self.server_handle.is_some() {
            self.shutdown.notify_one();
        }
    }
}

/// Detect the local IP address used for outbound traffic.
///
/// Connects a UDP socket toward a public address to let the OS pick a route.
/// No data is sent.
fn detect_local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let local_addr = socket.local_addr().ok()?;
    Some(local_addr.ip())
}

/// NOTIFY on any path, with headers and body captured.
fn notify_route(
    router: Arc<EventRouter>,
) -> impl Filter<Extract = (warp::reply::WithStatus<&'static str>,), Error = warp::Rejection>
       + Clone
       + Send
       + Sync
       + 'static {
    warp::method()
        .and(warp::path::full())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and_then(
            move |method: Method, path: warp::path::FullPath, headers: HeaderMap, body: Bytes| {
                let router = Arc::clone(&router);
                async move { handle_notify(&router, &method, path.as_str(), &headers, &body) }
            },
        )
}

fn handle_notify(
    router: &EventRouter,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> std::result::Result<warp::reply::WithStatus<&'static str>, warp::Rejection> {
    if method.as_str() != "NOTIFY" {
        return Err(warp::reject::custom(UnsupportedMethod));
    }

    let sid = validate_upnp_headers(
        header_value(headers, "sid"),
        header_value(headers, "nt"),
        header_value(headers, "nts"),
    )
    .map_err(warp::reject::custom)?;

    let seq = header_value(headers, "seq").and_then(|s| s.parse::<u32>().ok());

    debug!(%sid, ?seq, path, bytes = body.len(), "NOTIFY received");

    router.route(NotificationPayload {
        subscription_id: sid.to_string(),
        seq,
        event_xml: String::from_utf8_lossy(body).into_owned(),
    });

    Ok(warp::reply::with_status("", StatusCode::OK))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

/// Validate UPnP event notification headers.
///
/// `SID` is required. `NT` and `NTS` are optional but must carry the GENA
/// values when present. Returns the SID.
fn validate_upnp_headers<'a>(
    sid: Option<&'a str>,
    nt: Option<&str>,
    nts: Option<&str>,
) -> std::result::Result<&'a str, InvalidUpnpHeaders> {
    let sid = sid
        .filter(|sid| !sid.is_empty())
        .ok_or(InvalidUpnpHeaders("missing SID"))?;

    if nt.map_or(false, |nt| nt != "upnp:event") {
        return Err(InvalidUpnpHeaders("unexpected NT"));
    }
    if nts.map_or(false, |nts| nts != "upnp:propchange") {
        return Err(InvalidUpnpHeaders("unexpected NTS"));
    }

    Ok(sid)
}

/// Custom rejection for invalid UPnP headers.
#[derive(Debug, PartialEq)]
struct InvalidUpnpHeaders(&'static str);

impl warp::reject::Reject for InvalidUpnpHeaders {}

/// Custom rejection for anything other than NOTIFY.
#[derive(Debug)]
struct UnsupportedMethod;

impl warp::reject::Reject for UnsupportedMethod {}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(
    err: warp::Rejection,
) -> std::result::Result<impl warp::Reply, Infallible> {
    let (code, message) = if let Some(InvalidUpnpHeaders(reason)) = err.find::<InvalidUpnpHeaders>() {
        debug!(reason, "rejecting NOTIFY");
        (StatusCode::PRECONDITION_FAILED, *reason)
    } else if err.find::<UnsupportedMethod>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Only NOTIFY is supported")
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else {
        (StatusCode::BAD_REQUEST, "Bad request")
    };

    Ok(warp::reply::with_status(message, code))
}
