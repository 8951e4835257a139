//! Mixing console OSC client
//!
//! Talks to the Behringer Wing over connectionless OSC/UDP. Queries go
//! out on one persistent socket bound to a fixed local port (the console
//! replies to the sender), with a single request in flight at a time;
//! fire-and-forget sets use a throwaway socket per call and never wait.
//!
//! Query timeouts are a normal steady-state occurrence while polling and
//! are reported as absent data, not errors.

use crate::config::ConsoleConfig;
use crate::curve;
use async_trait::async_trait;
use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Query paths probed when looking for a responsive console, in order.
const PROBE_PATHS: &[&str] = &["/", "/info/name", "/info", "/status"];

/// The console's string sentinel for a fader at negative infinity.
const NEG_INFINITY: &str = "-oo";

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("failed to bind local query port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// A console fader address: input channel or matrix output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaderTarget {
    Channel(u8),
    Matrix(u8),
}

impl FaderTarget {
    fn kind(&self) -> &'static str {
        match self {
            FaderTarget::Channel(_) => "ch",
            FaderTarget::Matrix(_) => "mtx",
        }
    }

    fn number(&self) -> u8 {
        match self {
            FaderTarget::Channel(n) | FaderTarget::Matrix(n) => *n,
        }
    }

    fn fader_address(&self) -> String {
        format!("/{}/{}/fdr", self.kind(), self.number())
    }

    fn mute_address(&self) -> String {
        format!("/{}/{}/mute", self.kind(), self.number())
    }
}

impl fmt::Display for FaderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind(), self.number())
    }
}

/// Physical input source feeding a logical channel.
///
/// Routing can change on the console at any time, so lookups are never
/// cached beyond one gain read/write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSource {
    /// Source group: "LCL", "AUX", "A", "B", "C", "SC", "USB", ...
    pub group: String,
    pub number: u8,
}

impl InputSource {
    fn gain_address(&self) -> String {
        format!("/io/in/{}/{}/g", self.group, self.number)
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.number)
    }
}

/// Console operations the sync engine depends on.
///
/// Faders speak the normalized 0-1000 position domain; the dB
/// conversion happens inside the client.
#[async_trait]
pub trait ConsolePort: Send + Sync {
    /// Probe the console; caches the first query path that answers.
    async fn check_connection(&self) -> bool;

    /// Read a fader position. Absent on timeout or unparseable reply.
    async fn fader(&self, target: FaderTarget) -> Option<u16>;

    /// Set a fader position (fire-and-forget).
    async fn set_fader(&self, target: FaderTarget, position: u16) -> bool;

    /// Read mute state. Absent replies read as unmuted.
    async fn mute(&self, target: FaderTarget) -> bool;

    /// Set mute state (fire-and-forget).
    async fn set_mute(&self, target: FaderTarget, muted: bool) -> bool;

    /// Read preamp gain of an input source, in dB.
    async fn gain(&self, source: &InputSource) -> Option<f32>;

    /// Set preamp gain of an input source, clamped to the configured range.
    async fn set_gain(&self, source: &InputSource, gain_db: f32) -> bool;

    /// Which input source feeds a logical channel, if readable.
    async fn channel_input_source(&self, channel: u8) -> Option<InputSource>;
}

/// OSC/UDP client for the mixing console.
pub struct ConsoleClient {
    target: String,
    local_port: u16,
    query_timeout: Duration,
    gain_min: f32,
    gain_max: f32,
    /// Persistent query socket; one request in flight at a time.
    query_sock: tokio::sync::Mutex<UdpSocket>,
    /// Query path that last got an answer, tried first on health checks.
    working_path: parking_lot::Mutex<Option<&'static str>>,
    failed_queries: AtomicU32,
    connection_ok: AtomicBool,
}

impl ConsoleClient {
    pub async fn new(config: &ConsoleConfig) -> Result<Self, ConsoleError> {
        let sock = Self::bind_query_socket(config.local_port).await?;
        info!(
            "Console client ready for {}:{} (replies on local port {})",
            config.host, config.port, config.local_port
        );
        Ok(Self {
            target: format!("{}:{}", config.host, config.port),
            local_port: config.local_port,
            query_timeout: config.query_timeout(),
            gain_min: config.gain_min,
            gain_max: config.gain_max,
            query_sock: tokio::sync::Mutex::new(sock),
            working_path: parking_lot::Mutex::new(None),
            failed_queries: AtomicU32::new(0),
            connection_ok: AtomicBool::new(true),
        })
    }

    async fn bind_query_socket(port: u16) -> Result<UdpSocket, ConsoleError> {
        UdpSocket::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ConsoleError::Bind { port, source })
    }

    /// Send a query and wait briefly for the reply.
    ///
    /// Returns the first argument of the reply message, or `None` on
    /// timeout, send failure, or an undecodable packet.
    async fn query(&self, address: &str) -> Option<OscType> {
        let sock = self.query_sock.lock().await;

        let packet = OscPacket::Message(OscMessage {
            addr: address.to_string(),
            args: vec![],
        });
        let bytes = match encoder::encode(&packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("OSC encode failed for {address}: {e:?}");
                return None;
            }
        };

        if let Err(e) = sock.send_to(&bytes, self.target.as_str()).await {
            debug!("Query send to {address} failed: {e}");
            self.failed_queries.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let mut buf = [0u8; 4096];
        match timeout(self.query_timeout, sock.recv_from(&mut buf)).await {
            Ok(Ok((len, _peer))) => match decoder::decode_udp(&buf[..len]) {
                Ok((_, OscPacket::Message(reply))) => {
                    self.failed_queries.store(0, Ordering::Relaxed);
                    self.connection_ok.store(true, Ordering::Relaxed);
                    reply.args.into_iter().next()
                }
                Ok((_, OscPacket::Bundle(_))) => {
                    debug!("Unexpected OSC bundle reply to {address}");
                    None
                }
                Err(e) => {
                    debug!("Undecodable reply to {address}: {e:?}");
                    self.failed_queries.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(Err(e)) => {
                debug!("Query receive for {address} failed: {e}");
                self.failed_queries.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(_) => {
                debug!("Query timeout for {address}");
                self.failed_queries.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Fire-and-forget OSC send on a throwaway socket.
    async fn send(&self, address: &str, value: OscType) -> bool {
        let packet = OscPacket::Message(OscMessage {
            addr: address.to_string(),
            args: vec![value],
        });
        let bytes = match encoder::encode(&packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("OSC encode failed for {address}: {e:?}");
                return false;
            }
        };

        let sock = match UdpSocket::bind(("0.0.0.0", 0)).await {
            Ok(sock) => sock,
            Err(e) => {
                error!("Failed to open send socket: {e}");
                return false;
            }
        };
        match sock.send_to(&bytes, self.target.as_str()).await {
            Ok(_) => true,
            Err(e) => {
                error!("Send to {address} failed: {e}");
                false
            }
        }
    }

    fn mark_up(&self, path: &'static str) {
        *self.working_path.lock() = Some(path);
        self.connection_ok.store(true, Ordering::Relaxed);
        self.failed_queries.store(0, Ordering::Relaxed);
    }

    /// Whether the last connectivity probe (or query) succeeded.
    pub fn is_connected(&self) -> bool {
        self.connection_ok.load(Ordering::Relaxed)
    }

    /// Consecutive failed queries since the last success.
    pub fn failed_queries(&self) -> u32 {
        self.failed_queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConsolePort for ConsoleClient {
    async fn check_connection(&self) -> bool {
        // The path that answered last time usually still works
        let cached = *self.working_path.lock();
        if let Some(path) = cached {
            if self.query(path).await.is_some() {
                self.mark_up(path);
                return true;
            }
        }

        debug!("Probing console query paths...");
        for &path in PROBE_PATHS {
            if self.query(path).await.is_some() {
                info!("✓ Console answers on {path}");
                self.mark_up(path);
                return true;
            }
        }

        error!("No OSC reply from console at {}", self.target);
        error!("Possible causes:");
        error!("  1. Console OSC is not enabled (Setup -> Network -> OSC)");
        error!("  2. A firewall is blocking the console port");
        error!("  3. The console listens on a different port");
        error!("  4. Local port {} is already taken", self.local_port);
        self.connection_ok.store(false, Ordering::Relaxed);

        // Rebind to clear any wedged socket state
        match Self::bind_query_socket(self.local_port).await {
            Ok(sock) => {
                *self.query_sock.lock().await = sock;
                debug!("Query socket reinitialized");
            }
            Err(e) => error!("Query socket reinit failed: {e}"),
        }

        false
    }

    async fn fader(&self, target: FaderTarget) -> Option<u16> {
        let arg = self.query(&target.fader_address()).await?;
        if let OscType::String(ref s) = arg {
            if s == NEG_INFINITY {
                return Some(0);
            }
        }
        let db = osc_number(&arg)?;
        Some(curve::db_to_position(db))
    }

    async fn set_fader(&self, target: FaderTarget, position: u16) -> bool {
        let position = if position > curve::FADER_MAX {
            warn!("Fader value {position} out of range for {target}, clamping");
            curve::FADER_MAX
        } else {
            position
        };
        let db = curve::position_to_db(position);
        let ok = self.send(&target.fader_address(), OscType::Float(db)).await;
        if ok {
            debug!("Fader {target} -> {db:.1} dB ({position}/1000)");
        }
        ok
    }

    async fn mute(&self, target: FaderTarget) -> bool {
        match self.query(&target.mute_address()).await {
            Some(arg) => osc_truthy(&arg),
            None => false,
        }
    }

    async fn set_mute(&self, target: FaderTarget, muted: bool) -> bool {
        let value = if muted { 1.0 } else { 0.0 };
        let ok = self.send(&target.mute_address(), OscType::Float(value)).await;
        if ok {
            debug!("Mute {target} -> {}", if muted { "ON" } else { "OFF" });
        }
        ok
    }

    async fn gain(&self, source: &InputSource) -> Option<f32> {
        let arg = self.query(&source.gain_address()).await?;
        let gain = osc_number(&arg)?;
        Some(gain.clamp(self.gain_min, self.gain_max))
    }

    async fn set_gain(&self, source: &InputSource, gain_db: f32) -> bool {
        let gain_db = gain_db.clamp(self.gain_min, self.gain_max);
        let ok = self.send(&source.gain_address(), OscType::Float(gain_db)).await;
        if ok {
            debug!("Input gain {source} -> {gain_db:.1} dB");
        }
        ok
    }

    async fn channel_input_source(&self, channel: u8) -> Option<InputSource> {
        let group = self.query(&format!("/ch/{channel}/in/conn/grp")).await?;
        let number = self.query(&format!("/ch/{channel}/in/conn/in")).await?;

        let group = osc_text(&group)?;
        let number = osc_number(&number)? as u8;
        Some(InputSource { group, number })
    }
}

/// Coerce an OSC argument to a number; the console mixes float, int,
/// and stringified encodings across firmware versions.
fn osc_number(arg: &OscType) -> Option<f32> {
    match arg {
        OscType::Float(f) => Some(*f),
        OscType::Double(d) => Some(*d as f32),
        OscType::Int(i) => Some(*i as f32),
        OscType::Long(l) => Some(*l as f32),
        OscType::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Coerce an OSC argument to text.
fn osc_text(arg: &OscType) -> Option<String> {
    match arg {
        OscType::String(s) => Some(s.clone()),
        OscType::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

/// Truthiness for mute replies: numeric > 0, or one of the console's
/// string spellings.
fn osc_truthy(arg: &OscType) -> bool {
    match arg {
        OscType::String(s) => {
            matches!(s.to_uppercase().as_str(), "ON" | "MUTE" | "TRUE" | "1")
        }
        OscType::Bool(b) => *b,
        _ => osc_number(arg).map(|n| n > 0.0).unwrap_or(false),
    }
}
