//! SOCKS5 front-end
//!
//! Accepts local clients, negotiates no-auth, parses the request and hands
//! CONNECT to the direct or relay tunnel picked by the router.
//! BIND and UDP ASSOCIATE are answered with "command not supported".

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lightsword_proto::{
    negotiate, reply, Command, Socks5Request, MAX_GREETING_SIZE, MAX_REQUEST_SIZE,
    REP_CMD_NOT_SUPPORTED,
};

use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::random::{OsRandom, RandomSource};
use crate::router::Route;
use crate::stats::{TrafficSnapshot, TrafficStats};
use crate::tunnel;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

struct Listening {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
}

pub struct Socks5ServerBuilder {
    config: ServerConfig,
    runtime: Option<Handle>,
    random: Option<Arc<dyn RandomSource>>,
}

impl Socks5ServerBuilder {
    /// Scheduler for the accept loop and every connection task.
    /// Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Source of IVs and handshake padding. Defaults to the OS CSPRNG.
    pub fn random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    pub fn build(self) -> Result<Socks5Server> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| Error::NoRuntime)?,
        };
        let random = self.random.unwrap_or_else(|| Arc::new(OsRandom));
        let stats = Arc::new(TrafficStats::new());

        Ok(Socks5Server {
            context: Arc::new(Context::new(self.config, stats, random, runtime)),
            running: Arc::new(AtomicBool::new(false)),
            listening: Mutex::new(None),
        })
    }
}

/// Local SOCKS5 proxy server
pub struct Socks5Server {
    context: Arc<Context>,
    running: Arc<AtomicBool>,
    listening: Mutex<Option<Listening>>,
}

impl Socks5Server {
    pub fn builder(config: ServerConfig) -> Socks5ServerBuilder {
        Socks5ServerBuilder {
            config,
            runtime: None,
            random: None,
        }
    }

    pub fn new(config: ServerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Bind the listen address and start accepting in the background.
    ///
    /// Returns the bound address. On bind failure the server stays stopped.
    /// Calling `start` on a running server returns its current address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut listening = self.listening.lock().await;
        if let Some(current) = listening.as_ref() {
            return Ok(current.local_addr);
        }

        let config = self.context.config();
        let listener = TcpListener::bind((config.listen_addr.as_str(), config.listen_port))
            .await
            .map_err(|source| Error::Bind {
                addr: format!("{}:{}", config.listen_addr, config.listen_port),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        self.running.store(true, Ordering::SeqCst);
        let accept_task = self.context.runtime().spawn(accept_loop(
            listener,
            self.context.clone(),
            self.running.clone(),
            shutdown.clone(),
        ));

        *listening = Some(Listening {
            local_addr,
            shutdown,
            accept_task,
        });

        info!("🚀 SOCKS5 proxy listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Stop accepting and close the listening socket.
    ///
    /// Established tunnels keep running until their sockets close.
    /// Safe to call repeatedly or on a server that never started.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(listening) = self.listening.lock().await.take() else {
            return;
        };

        listening.shutdown.cancel();
        if let Err(e) = listening.accept_task.await {
            error!("Accept loop ended abnormally: {}", e);
        }
        info!("SOCKS5 proxy on {} stopped", listening.local_addr);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.lock().await.as_ref().map(|l| l.local_addr)
    }

    pub fn config(&self) -> &ServerConfig {
        self.context.config()
    }

    pub fn sent_bytes(&self) -> u64 {
        self.context.stats().sent_bytes()
    }

    pub fn received_bytes(&self) -> u64 {
        self.context.stats().received_bytes()
    }

    pub fn stats(&self) -> TrafficSnapshot {
        self.context.stats().snapshot()
    }
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<Context>,
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    debug!("New SOCKS5 connection from {}", addr);
                    let context = context.clone();
                    context.runtime().clone().spawn(async move {
                        if let Err(e) = handle_socks5_connection(stream, context).await {
                            log_connection_error(addr, &e);
                        }
                    });
                }
                Err(e) => {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    error!("SOCKS5 accept error: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    }
    // listener dropped here, closing the socket
}

fn log_connection_error(addr: SocketAddr, e: &Error) {
    match e {
        Error::UpstreamConnect { .. } | Error::UpstreamRead(_) | Error::Cipher(_) => {
            warn!("SOCKS5 {}: {}", addr, e)
        }
        _ => debug!("SOCKS5 {}: {}", addr, e),
    }
}

/// Read whatever the peer sends next, up to `buf.len()` bytes.
/// EOF and timeout count as failures.
async fn read_some(stream: &mut TcpStream, buf: &mut [u8], limit: Duration) -> Result<usize> {
    match timeout(limit, stream.read(buf)).await {
        Ok(Ok(0)) => Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into()),
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(std::io::Error::from(std::io::ErrorKind::TimedOut).into()),
    }
}

async fn handle_socks5_connection(mut stream: TcpStream, ctx: Arc<Context>) -> Result<()> {
    // Step 1: method selection
    let mut greeting = vec![0u8; MAX_GREETING_SIZE];
    let n = read_some(&mut stream, &mut greeting, ctx.timeout()).await?;

    let negotiation = negotiate(&greeting[..n]);
    stream.write_all(&negotiation.reply).await?;
    if !negotiation.accepted {
        return Err(if n < 2 {
            Error::HandshakeMalformed(n)
        } else {
            Error::NoAcceptableAuth
        });
    }

    // Step 2: request
    let mut request_buf = vec![0u8; MAX_REQUEST_SIZE];
    let n = read_some(&mut stream, &mut request_buf, ctx.timeout()).await?;
    request_buf.truncate(n);

    let request = Socks5Request::parse(&request_buf).map_err(Error::RequestUnparseable)?;

    if request.command != Command::Connect {
        stream.write_all(&reply(REP_CMD_NOT_SUPPORTED)).await?;
        return Err(Error::UnsupportedCommand(request.command));
    }

    // Step 3: connect, directly or through the relay
    let route = ctx.router().route(&request.host);
    debug!("CONNECT {}:{} via {:?}", request.host, request.port, route);

    match route {
        Route::Direct => tunnel::connect_direct(&ctx, stream, &request, &request_buf).await,
        Route::Relay => tunnel::connect_relay(&ctx, stream, &request, &request_buf).await,
    }
}
