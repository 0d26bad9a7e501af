use crate::codec::{Codec, Value};
use crate::error::{Result, RpcError};
use crate::node::{LOCAL_GID, Node, Reply};

use std::error::Error as _;
use std::io;
use std::time::Duration;

/// Target of one remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct Remote {
    pub node: Node,
    pub service: String,
    pub method: String,
    /// `None` means `local`.
    pub gid: Option<String>,
}

impl Remote {
    pub fn new(node: Node, service: &str, method: &str) -> Self {
        Self {
            node,
            service: service.to_string(),
            method: method.to_string(),
            gid: None,
        }
    }

    pub fn with_gid(mut self, gid: &str) -> Self {
        self.gid = Some(gid.to_string());
        self
    }

    pub fn gid(&self) -> &str {
        self.gid.as_deref().unwrap_or(LOCAL_GID)
    }

    pub fn path(&self) -> String {
        format!("/{}/{}/{}", self.gid(), self.service, self.method)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.ip.trim().is_empty() {
            return Err(RpcError::Validation("target node has no address".into()));
        }
        if self.node.port == 0 {
            return Err(RpcError::Validation("target node has no port".into()));
        }
        if self.service.trim().is_empty() {
            return Err(RpcError::Validation("target has no service".into()));
        }
        if self.method.trim().is_empty() {
            return Err(RpcError::Validation("target has no method".into()));
        }
        Ok(())
    }

    /// Parses `{node: {ip, port}, service, method, gid?}` as received by the
    /// `comm` service. Missing fields are validation errors.
    pub fn from_value(value: &Value) -> Result<Self> {
        let field = |name: &str| -> Result<Value> {
            value
                .get(name)
                .filter(|v| !v.is_nullish())
                .ok_or_else(|| RpcError::Validation(format!("target is missing '{}'", name)))
        };
        let node = field("node")?;
        let ip = node
            .get("ip")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| RpcError::Validation("target node is missing 'ip'".into()))?;
        let port = node
            .get("port")
            .and_then(|v| v.as_f64())
            .filter(|p| p.fract() == 0.0 && *p > 0.0 && *p <= u16::MAX as f64)
            .ok_or_else(|| RpcError::Validation("target node is missing 'port'".into()))?;
        let text = |name: &str| -> Result<String> {
            field(name)?
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| RpcError::Validation(format!("target '{}' must be a string", name)))
        };
        let remote = Remote {
            node: Node::new(ip, port as u16),
            service: text("service")?,
            method: text("method")?,
            gid: value.get("gid").and_then(|v| v.as_str().map(str::to_string)),
        };
        remote.validate()?;
        Ok(remote)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

#[derive(Clone)]
pub struct CommClient {
    http: reqwest::Client,
    codec: Codec,
    policy: RetryPolicy,
    timeout: Duration,
}

impl CommClient {
    pub fn new(codec: Codec, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            codec,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Sends `message` with this client's default retry policy.
    pub async fn send(&self, message: Vec<Value>, remote: &Remote) -> Result<Reply> {
        self.send_with(message, remote, self.policy).await
    }

    /// Like [`CommClient::send`] but turns an error slot into `Err`.
    pub async fn call(&self, message: Vec<Value>, remote: &Remote) -> Result<Value> {
        self.send(message, remote).await?.into_result()
    }

    pub async fn send_with(
        &self,
        message: Vec<Value>,
        remote: &Remote,
        policy: RetryPolicy,
    ) -> Result<Reply> {
        remote.validate()?;
        let body = self.codec.encode(&Value::array(message))?;
        let url = format!("{}{}", remote.node.base_url(), remote.path());

        let mut delay = policy.backoff;
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .put(&url)
                .body(body.clone())
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return self.read_reply(resp, remote).await,
                Err(e) if is_unreachable(&e) && attempt < policy.retries => {
                    attempt += 1;
                    let jitter_ms = rand::random::<u64>() % (delay.as_millis() as u64 / 10 + 1);
                    tracing::debug!(
                        "Connection to {} lost ({}), retry {}/{} in {:?}",
                        remote.node,
                        e,
                        attempt,
                        policy.retries,
                        delay
                    );
                    tokio::time::sleep(delay + Duration::from_millis(jitter_ms)).await;
                    delay *= 2;
                }
                Err(e) if is_unreachable(&e) || e.is_timeout() => {
                    return Err(RpcError::Transport(format!(
                        "{} {}: {}",
                        remote.node,
                        remote.path(),
                        e
                    )));
                }
                Err(e) => {
                    return Err(RpcError::Protocol(format!(
                        "{} {}: {}",
                        remote.node,
                        remote.path(),
                        e
                    )));
                }
            }
        }
    }

    async fn read_reply(&self, resp: reqwest::Response, remote: &Remote) -> Result<Reply> {
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RpcError::Transport(format!("{}: {}", remote.node, e)))?;

        if !status.is_success() {
            return Err(RpcError::Protocol(format!(
                "{} {} answered {}: {}",
                remote.node,
                remote.path(),
                status,
                text
            )));
        }

        let value = self.codec.decode(&text).map_err(|e| {
            RpcError::Protocol(format!(
                "undecodable body from {} {}: {}",
                remote.node,
                remote.path(),
                e
            ))
        })?;
        Ok(Reply::from_value(value))
    }
}

/// Refused, reset or closed before any reply arrived.
fn is_unreachable(e: &reqwest::Error) -> bool {
    if e.is_connect() {
        return true;
    }
    let mut source = e.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        if let Some(hyper) = cause.downcast_ref::<hyper::Error>() {
            if hyper.is_incomplete_message() {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
