use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use ingest_api::{Batch, BatchId, BatchSender, RejectedRecord, SendReport, SinkError};

// ═══════════════════════════════════════════════════════════════
//  TcpSenderConfig
// ═══════════════════════════════════════════════════════════════

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9300
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_max_ack_length() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TcpSenderConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Максимальная длина строки ack в байтах (0 = без ограничения).
    #[serde(default = "default_max_ack_length")]
    pub max_ack_length: usize,
}

impl Default for TcpSenderConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_ack_length: default_max_ack_length(),
        }
    }
}

impl TcpSenderConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Wire format
// ═══════════════════════════════════════════════════════════════

/// One request line: `{"batch_id":1,"records":[{...},...]}`.
#[derive(serde::Serialize)]
struct WireRequest {
    batch_id: BatchId,
    records: Vec<serde_json::Value>,
}

/// One ack line: `{"accepted":2,"rejected":[{"index":1,"reason":"..."}]}`.
#[derive(serde::Deserialize)]
struct WireAck {
    #[serde(default)]
    batch_id: Option<BatchId>,
    accepted: usize,
    #[serde(default)]
    rejected: Vec<RejectedRecord>,
}

fn encode_request(batch: &Batch) -> Result<Vec<u8>, SinkError> {
    let request = WireRequest {
        batch_id: batch.id(),
        records: batch.records().iter().map(|r| r.to_json()).collect(),
    };
    let mut line = serde_json::to_vec(&request)
        .map_err(|e| SinkError::format_err(format!("encode batch {}: {e}", batch.id())))?;
    line.push(b'\n');
    Ok(line)
}

fn decode_ack(batch_id: BatchId, line: &str) -> Result<SendReport, SinkError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let ack: WireAck = serde_json::from_str(line)
        .map_err(|e| SinkError::logic(format!("invalid ack for batch {batch_id}: {e}")))?;

    if let Some(acked) = ack.batch_id {
        if acked != batch_id {
            return Err(SinkError::logic(format!("ack for batch {acked} while waiting for batch {batch_id}")));
        }
    }

    Ok(SendReport {
        accepted: ack.accepted,
        rejected: ack.rejected,
    })
}

// ═══════════════════════════════════════════════════════════════
//  TcpSender
// ═══════════════════════════════════════════════════════════════

/// `BatchSender` over a single TCP connection with a line-delimited JSON
/// request/ack protocol.
///
/// The connection is opened on first use and re-opened after any
/// failure. During a send it is taken out of the slot and only put back
/// after the ack was read, so a dropped send future closes it.
pub struct TcpSender {
    addr: String,
    connect_timeout: Duration,
    max_ack_length: usize,
    conn: Mutex<Option<BufReader<TcpStream>>>,
}

impl TcpSender {
    pub fn new(config: &TcpSenderConfig) -> Self {
        Self {
            addr: config.addr(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            max_ack_length: config.max_ack_length,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether a connection is currently held for reuse.
    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    async fn connect(&self) -> Result<BufReader<TcpStream>, SinkError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                SinkError::io(format!(
                    "TCP connect to {} timed out after {}ms",
                    self.addr,
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| SinkError::io(format!("TCP connect to {}: {e}", self.addr)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| SinkError::io(format!("set_nodelay: {e}")))?;

        tracing::info!(addr = %self.addr, "tcp sender connected");
        Ok(BufReader::new(stream))
    }

    async fn exchange(
        &self,
        conn: &mut BufReader<TcpStream>,
        batch_id: BatchId,
        request: &[u8],
    ) -> Result<SendReport, SinkError> {
        conn.get_mut()
            .write_all(request)
            .await
            .map_err(|e| SinkError::io(format!("write to {}: {e}", self.addr)))?;

        let mut line = String::new();
        let read = if self.max_ack_length > 0 {
            let limit = self.max_ack_length as u64 + 1;
            (&mut *conn).take(limit).read_line(&mut line).await
        } else {
            conn.read_line(&mut line).await
        }
        .map_err(|e| SinkError::io(format!("read ack from {}: {e}", self.addr)))?;

        if read == 0 {
            return Err(SinkError::io(format!("connection to {} closed before ack", self.addr)));
        }
        if !line.ends_with('\n') {
            if self.max_ack_length > 0 && line.len() > self.max_ack_length {
                return Err(SinkError::logic(format!(
                    "ack too long: more than {} bytes",
                    self.max_ack_length
                )));
            }
            return Err(SinkError::io(format!("connection to {} closed mid-ack", self.addr)));
        }

        decode_ack(batch_id, &line)
    }
}

impl BatchSender for TcpSender {
    fn send_batch(&self, batch: &Batch) -> Pin<Box<dyn Future<Output = Result<SendReport, SinkError>> + Send + '_>> {
        let batch_id = batch.id();
        let records = batch.len();
        let request = encode_request(batch);

        Box::pin(async move {
            let request = request?;

            let mut slot = self.conn.lock().await;
            let mut conn = match slot.take() {
                Some(conn) => conn,
                None => self.connect().await?,
            };

            match self.exchange(&mut conn, batch_id, &request).await {
                Ok(report) => {
                    *slot = Some(conn);
                    tracing::debug!(
                        batch_id,
                        records,
                        accepted = report.accepted,
                        rejected = report.rejected.len(),
                        "batch acked"
                    );
                    Ok(report)
                }
                Err(e) => {
                    tracing::warn!(batch_id, addr = %self.addr, error = %e, "dropping connection");
                    Err(e)
                }
            }
        })
    }
}
