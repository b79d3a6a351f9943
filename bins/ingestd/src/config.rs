use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use dead_letter_file::{FileDeadLetterConfig, PartitionBy};
use dead_letter_memory::MemoryDeadLetterConfig;
use ingest_engine::{BufferConfig, EngineConfig, RetryConfig};
use sender_tcp::TcpSenderConfig;

use crate::error::IngestdError;

#[derive(Parser)]
#[command(name = "ingestd", about = "Буферизованная загрузка записей с retry и dead-letter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Читать NDJSON из stdin (или --input) и отправлять батчами
    Run(RunArgs),
    /// Показать содержимое файлового dead-letter хранилища
    DeadLetters(DeadLettersArgs),
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "ingestd.toml", env = "INGESTD_CONFIG")]
    pub config: String,

    /// NDJSON файл; без указания читается stdin
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// Записей в батче
    #[arg(long, env = "INGESTD_CAPACITY")]
    pub capacity: Option<usize>,

    /// Период flush неполного буфера (0 = выключен)
    #[arg(long, env = "INGESTD_FLUSH_INTERVAL_MS")]
    pub flush_interval_ms: Option<u64>,

    #[arg(long, env = "INGESTD_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Хост TCP получателя
    #[arg(long, env = "INGESTD_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "INGESTD_PORT")]
    pub port: Option<u16>,

    /// Каталог файлового dead-letter хранилища (включает kind = "file")
    #[arg(long, env = "INGESTD_DEAD_LETTER_DIR")]
    pub dead_letter_dir: Option<PathBuf>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct DeadLettersArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "ingestd.toml", env = "INGESTD_CONFIG")]
    pub config: String,

    /// Каталог хранилища (по умолчанию из [dead_letter])
    #[arg(long, env = "INGESTD_DEAD_LETTER_DIR")]
    pub dir: Option<PathBuf>,

    /// date | reason
    #[arg(long)]
    pub partition_by: Option<String>,

    /// validation | transport_exhausted | non_retryable | cancelled
    #[arg(long)]
    pub reason: Option<String>,

    /// failed_at_ms >= from
    #[arg(long)]
    pub from_ms: Option<i64>,

    /// failed_at_ms < to
    #[arg(long)]
    pub to_ms: Option<i64>,

    /// Только последние N batch'ей
    #[arg(long)]
    pub limit: Option<usize>,

    /// Печатать количество batch'ей и записей по причинам вместо самих batch'ей
    #[arg(long)]
    pub summary: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SenderConfig {
    Tcp(TcpSenderConfig),
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig::Tcp(TcpSenderConfig::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeadLetterConfig {
    File(FileDeadLetterConfig),
    Memory(MemoryDeadLetterConfig),
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        DeadLetterConfig::File(FileDeadLetterConfig::default())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestdConfig {
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,
}

impl IngestdConfig {
    pub fn from_toml(content: &str) -> Result<Self, IngestdError> {
        toml::from_str(content).map_err(|e| IngestdError::Config { context: "parse", detail: e.to_string() })
    }

    /// Read `path`. A missing file means defaults; an unreadable or
    /// invalid one is an error.
    pub fn load(path: &str) -> Result<Self, IngestdError> {
        if !Path::new(path).exists() {
            tracing::debug!(config = %path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| IngestdError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        toml::from_str(&content)
            .map_err(|e| IngestdError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    /// Итоговая конфигурация после мержа: config.toml < env/CLI
    pub fn effective(args: &RunArgs) -> Result<Self, IngestdError> {
        let mut cfg = Self::load(&args.config)?;
        cfg.apply(args);
        cfg.engine().validate()?;
        Ok(cfg)
    }

    pub fn apply(&mut self, args: &RunArgs) {
        if let Some(capacity) = args.capacity {
            self.buffer.capacity = capacity;
        }
        if let Some(interval) = args.flush_interval_ms {
            self.buffer.flush_interval_ms = interval;
        }
        if let Some(max_retries) = args.max_retries {
            self.retry.max_retries = max_retries;
        }

        let SenderConfig::Tcp(tcp) = &mut self.sender;
        if let Some(host) = &args.host {
            tcp.host = host.clone();
        }
        if let Some(port) = args.port {
            tcp.port = port;
        }

        if let Some(dir) = &args.dead_letter_dir {
            if let DeadLetterConfig::File(file) = &mut self.dead_letter {
                file.data_dir = dir.clone();
            } else {
                self.dead_letter = DeadLetterConfig::File(FileDeadLetterConfig::new(dir, PartitionBy::default()));
            }
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            buffer: self.buffer.clone(),
            retry: self.retry.clone(),
        }
    }

    /// Файловое хранилище для `dead-letters`, с учётом CLI.
    pub fn file_dead_letter(&self, args: &DeadLettersArgs) -> Result<FileDeadLetterConfig, IngestdError> {
        let mut file = match &self.dead_letter {
            DeadLetterConfig::File(file) => file.clone(),
            DeadLetterConfig::Memory(_) if args.dir.is_some() => FileDeadLetterConfig::default(),
            DeadLetterConfig::Memory(_) => {
                return Err(IngestdError::Config {
                    context: "dead_letter",
                    detail: "memory dead-letter store cannot be inspected, pass --dir".into(),
                });
            }
        };
        if let Some(dir) = &args.dir {
            file.data_dir = dir.clone();
        }
        if let Some(partition_by) = &args.partition_by {
            file.partition_by = partition_by
                .parse()
                .map_err(|e: ingest_api::SinkError| IngestdError::Config { context: "partition_by", detail: e.to_string() })?;
        }
        Ok(file)
    }
}
